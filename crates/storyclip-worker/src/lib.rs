//! Clip planning and job supervision.
//!
//! This crate provides:
//! - The clip planner that splits a source into clip windows
//! - The job table behind the `JobRepository` trait
//! - The supervisor that runs per-job render pipelines with bounded concurrency
//! - The stall watchdog
//! - Job events, metrics and structured job logging

pub mod clip_pipeline;
pub mod config;
pub mod error;
pub mod events;
pub mod logging;
pub mod metrics;
pub mod repository;
pub mod retry;
pub mod supervisor;
pub mod watchdog;

pub use clip_pipeline::{plan, OutputLayout, PlanError, RenderTask};
pub use config::SupervisorConfig;
pub use error::{SupervisorError, SupervisorResult};
pub use events::ProgressChannel;
pub use logging::JobLogger;
pub use repository::{InMemoryJobRepository, JobRepository, JobUpdate, RepositoryError};
pub use retry::RetryPolicy;
pub use supervisor::{ActiveJobs, JobSupervisor, SupervisorOverview};
pub use watchdog::StalledJobDetector;
