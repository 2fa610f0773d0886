// src/exec/mod.rs

//! Job submission and queue queries.

pub mod backend;
pub mod slurm;

pub use backend::{JobId, JobScheduler};
pub use slurm::SlurmScheduler;
