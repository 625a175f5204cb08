//! Configuration models for scheduler instances.

pub mod scheduler;

pub use scheduler::SchedulerConfig;
