use thiserror::Error;

/// Failures of the diversity engine itself (scoring, distances, clustering).
#[derive(Debug, Error, Clone, PartialEq)]
pub enum DiversityError {
    #[error("novelty needs at least 2 atoms, got {found}")]
    InsufficientAtoms { found: usize },

    #[error("batch entry {index} has {atoms} atoms but the species labeling covers {labels}")]
    InconsistentSpecies {
        index: usize,
        labels: usize,
        atoms: usize,
    },

    #[error("batch entry {index} disagrees with entry 0 on the species of atom {atom}")]
    SpeciesOrderMismatch { index: usize, atom: usize },

    #[error("clustering requested on an empty batch")]
    EmptyBatch,

    #[error("atoms {atom} and {neighbor} have numerically identical fingerprints")]
    DegenerateFingerprint { atom: usize, neighbor: usize },

    #[error("fingerprint shape mismatch: expected {expected}, found {found}")]
    FingerprintDimensionMismatch { expected: usize, found: usize },

    #[error("invalid distance matrix: {0}")]
    InvalidDistanceMatrix(String),

    #[error("non-finite fingerprint entry in batch entry {index}")]
    InvalidFingerprint { index: usize },

    #[error("invalid parameter: {0}")]
    InvalidParameter(String),
}

/// Failures of the built-in fingerprint provider.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum FingerprintError {
    #[error("structure has no atoms")]
    EmptyStructure,

    #[error("atom {atom} has {found} neighbours within the cutoff (limit {limit})")]
    TooManyNeighbors {
        atom: usize,
        found: usize,
        limit: usize,
    },

    #[error("atoms {first} and {second} overlap")]
    OverlappingAtoms { first: usize, second: usize },
}
