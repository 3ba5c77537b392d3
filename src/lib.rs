pub mod core {
    pub mod domain;
    pub mod error;
    pub mod spatial;
}

pub mod engine {
    pub mod adapter;
    pub mod fingerprint;
    pub mod lennard_jones;
    pub mod novelty;
    pub mod operators;
    pub mod potential;

    pub mod external {
        pub mod gulp;
    }
}

pub mod analysis {
    pub mod assignment;
    pub mod distance;
    pub mod medoids;
    pub mod pca;
    pub mod select;
}

pub mod solvers;

pub mod pipeline;
