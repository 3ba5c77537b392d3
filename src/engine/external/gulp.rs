use std::io::Write;
use std::process::{Command, Stdio};
use std::sync::OnceLock;

use anyhow::{anyhow, bail, Context, Result};
use nalgebra::{Matrix3, Vector3};
use regex::Regex;

use crate::core::domain::Structure;
use crate::engine::potential::{Potential, Property, PropertyResults};

/// 1 eV/Å³ expressed in GPa.
const EV_PER_A3_IN_GPA: f64 = 160.217_663_4;

fn energy_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)total lattice energy\s*=\s*(-?\d+\.?\d*(?:[eE][-+]?\d+)?)\s*eV")
            .expect("static regex")
    })
}

/// Single-point GULP evaluation streamed over pipes.
/// Energy, forces and stress all come from one GULP run.
pub struct GulpPotential {
    executable: String,
    potential_parameters: String,
}

impl GulpPotential {
    /// Creates a new potential.
    ///
    /// # Arguments
    /// * `executable` - Path to GULP binary (e.g., "gulp").
    /// * `potential_parameters` - The potential block (buckingham, spring, etc.).
    pub fn new(executable: &str, potential_parameters: &str) -> Self {
        Self {
            executable: executable.to_string(),
            potential_parameters: potential_parameters.to_string(),
        }
    }

    /// Checks that the executable can be spawned at all.
    pub fn check_available(&self) -> Result<()> {
        Command::new(&self.executable)
            .arg("help")
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .output()
            .map(|_| ())
            .with_context(|| format!("'{}' executable not found in PATH", self.executable))
    }

    /// Constructs the GULP input string for a single-point gradient job.
    pub fn generate_input(&self, structure: &Structure) -> Result<String> {
        let mut s = String::with_capacity(1024);

        // 1. Header Keywords
        if structure.lattice.is_some() {
            s.push_str("gradients stress\n");
        } else {
            s.push_str("gradients\n");
        }

        // 2. Lattice Vectors (if periodic)
        if let Some(lat) = &structure.lattice {
            s.push_str("vectors\n");
            let v = lat.vectors;
            // GULP reads vectors as rows
            for c in 0..3 {
                s.push_str(&format!("{:.9} {:.9} {:.9}\n", v[(0, c)], v[(1, c)], v[(2, c)]));
            }
        }

        // 3. Coordinates
        s.push_str("cartesian\n");
        for atom in &structure.atoms {
            let spec = structure
                .species
                .get(atom.element_id)
                .ok_or_else(|| anyhow!("Invalid element_id {}", atom.element_id))?;
            let p = atom.position;
            s.push_str(&format!("{:<3} core {:.9} {:.9} {:.9}\n", spec.symbol, p.x, p.y, p.z));
        }

        // 4. Potentials
        s.push('\n');
        s.push_str(&self.potential_parameters);
        s.push('\n');

        Ok(s)
    }

    /// Executes GULP via stdin/stdout piping.
    fn run_process(&self, input_data: &str) -> Result<String> {
        let mut child = Command::new(&self.executable)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .context("Failed to spawn GULP executable")?;

        if let Some(mut stdin) = child.stdin.take() {
            stdin
                .write_all(input_data.as_bytes())
                .context("Failed to write to GULP stdin")?;
        }

        let output = child.wait_with_output().context("Failed to read GULP output")?;

        if !output.status.success() {
            let err_msg = String::from_utf8_lossy(&output.stderr);
            bail!("GULP exited with error: {}", err_msg);
        }

        Ok(String::from_utf8_lossy(&output.stdout).to_string())
    }

    /// Runs GULP on `structure` and parses everything it reports.
    pub fn run(&self, structure: &Structure) -> Result<PropertyResults> {
        let input = self.generate_input(structure)?;
        let output = self.run_process(&input)?;
        parse_output(&output, structure)
    }
}

/// Parses energy, forces and (for periodic structures) stress from GULP output.
pub fn parse_output(output: &str, structure: &Structure) -> Result<PropertyResults> {
    check_errors(output)?;
    let energy = parse_energy(output)?;
    let forces = parse_derivatives(output, structure.len())?
        .into_iter()
        .map(|d| -d)
        .collect();
    let stress = if structure.lattice.is_some() {
        parse_stress(output)?
    } else {
        Matrix3::zeros()
    };
    Ok(PropertyResults {
        energy: Some(energy),
        forces: Some(forces),
        stress: Some(stress),
    })
}

fn parse_energy(output: &str) -> Result<f64> {
    let caps = energy_regex()
        .captures(output)
        .ok_or_else(|| anyhow!("Could not find total lattice energy in GULP output"))?;
    caps[1].parse::<f64>().context("Failed to parse energy float")
}

/// Reads the last "Final Cartesian derivatives" table (eV/Å).
fn parse_derivatives(output: &str, expected_atoms: usize) -> Result<Vec<Vector3<f64>>> {
    let lines: Vec<&str> = output.lines().collect();
    let header = lines
        .iter()
        .rposition(|l| l.to_ascii_lowercase().contains("final cartesian derivatives"))
        .ok_or_else(|| anyhow!("No Cartesian derivatives found in GULP output"))?;

    let mut out = Vec::with_capacity(expected_atoms);
    let mut rules = 0;
    for line in lines.iter().skip(header + 1) {
        if line.trim_start().starts_with("----") {
            rules += 1;
            // header rule, column rule, closing rule
            if rules == 3 {
                break;
            }
            continue;
        }
        if rules < 2 {
            continue;
        }
        let parts: Vec<&str> = line.split_whitespace().collect();
        if parts.len() < 6 {
            continue;
        }
        // Skip shells if present (we only report cores)
        if parts[2].to_lowercase().starts_with('s') {
            continue;
        }
        let x: f64 = parts[3].parse().context("Bad x derivative")?;
        let y: f64 = parts[4].parse().context("Bad y derivative")?;
        let z: f64 = parts[5].parse().context("Bad z derivative")?;
        out.push(Vector3::new(x, y, z));
    }

    if out.len() != expected_atoms {
        bail!(
            "GULP atom count mismatch: expected {}, got {}",
            expected_atoms,
            out.len()
        );
    }
    Ok(out)
}

/// Reads the "Stress tensor components" block (GPa) and converts to eV/Å³.
fn parse_stress(output: &str) -> Result<Matrix3<f64>> {
    let lines: Vec<&str> = output.lines().collect();
    let header = lines
        .iter()
        .rposition(|l| l.to_ascii_lowercase().contains("stress tensor components"))
        .ok_or_else(|| anyhow!("No stress tensor found in GULP output"))?;

    let mut voigt: [Option<f64>; 6] = [None; 6];
    for line in lines.iter().skip(header + 1).take(12) {
        let parts: Vec<&str> = line.split_whitespace().collect();
        for pair in parts.chunks(2) {
            if let [label, value] = pair {
                let slot = match label.to_ascii_lowercase().as_str() {
                    "xx" => 0,
                    "yy" => 1,
                    "zz" => 2,
                    "yz" => 3,
                    "xz" => 4,
                    "xy" => 5,
                    _ => continue,
                };
                voigt[slot] = Some(value.parse().context("Bad stress component")?);
            }
        }
    }

    let mut v = [0.0; 6];
    for (slot, val) in voigt.iter().enumerate() {
        v[slot] = val.ok_or_else(|| anyhow!("Incomplete stress tensor in GULP output"))?
            / EV_PER_A3_IN_GPA;
    }
    Ok(Matrix3::new(
        v[0], v[5], v[4], //
        v[5], v[1], v[3], //
        v[4], v[3], v[2],
    ))
}

fn check_errors(output: &str) -> Result<()> {
    if output.contains("Interatomic distance too small") {
        bail!("Geometric collapse");
    }
    if output.contains("Dump of error info") {
        bail!("Internal GULP error");
    }
    Ok(())
}

impl Potential for GulpPotential {
    fn energy(&self, structure: &Structure) -> Result<f64> {
        self.run(structure)?.require_energy()
    }

    fn forces(&self, structure: &Structure) -> Result<Vec<Vector3<f64>>> {
        Ok(self.run(structure)?.require_forces()?.to_vec())
    }

    fn stress(&self, structure: &Structure) -> Result<Matrix3<f64>> {
        self.run(structure)?.require_stress()
    }

    fn calculate(&self, structure: &Structure, properties: &[Property]) -> Result<PropertyResults> {
        let all = self.run(structure)?;
        let mut out = PropertyResults::default();
        for p in properties {
            match p {
                Property::Energy => out.energy = all.energy,
                Property::Forces => out.forces = all.forces.clone(),
                Property::Stress => out.stress = all.stress,
            }
        }
        Ok(out)
    }

    fn name(&self) -> &str {
        "GULP (Pipe)"
    }
}
