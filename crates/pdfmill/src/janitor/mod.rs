pub mod scheduler;
pub mod sweeps;

pub use scheduler::{next_run, run_sweeps, JanitorScheduler};
pub use sweeps::{Janitor, JanitorError, SweepReport};
