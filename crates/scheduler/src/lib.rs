//! `scheduler` crate — `TaskScheduler` and cron parsing (spec.md §4.4).

pub mod cron;
pub mod error;
pub mod models;
pub mod task_scheduler;

pub use cron::CronSchedule;
pub use error::SchedulerError;
pub use models::{CronJob, ScheduledTask, TickReport};
pub use task_scheduler::{CronCallback, TaskScheduler, TaskSchedulerConfig};
