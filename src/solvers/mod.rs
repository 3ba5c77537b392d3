/// Statistics for a single relaxation step.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StepStats {
    pub step: usize,
    pub energy: f64,
    /// Novelty score of the structure, when the driver can compute it.
    pub novelty: Option<f64>,
    pub max_force: f64,
}

/// Events emitted by relaxation drivers.
#[derive(Debug, Clone)]
pub enum RelaxEvent {
    /// Diagnostic log message, tagged with the trajectory label.
    Log(String),

    /// A completed step.
    Step { label: String, stats: StepStats },

    /// Driver has finished; `converged` tells whether `fmax` was reached.
    Finished {
        label: String,
        steps: usize,
        converged: bool,
    },
}

pub mod fire;
