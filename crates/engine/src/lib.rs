//! `engine` crate — core domain models, DAG validation, and `WorkflowEngine`
//! (spec.md §4.1), the central orchestrator.

pub mod config;
pub mod dag;
pub mod error;
pub mod executor;
pub mod models;

pub use config::EngineConfig;
pub use dag::validate_dag;
pub use error::EngineError;
pub use executor::WorkflowEngine;
pub use models::{
    Edge, ErrorHandlingMode, ExecutionFilter, ExecutionStatus, NodeDefinition, NodeResult, NodeStatus,
    RetryPolicy, TriggerSpec, TriggerType, ValidationReport, WorkflowContext, WorkflowDefinition,
    WorkflowExecution, WorkflowSettings,
};

#[cfg(test)]
mod executor_tests;
