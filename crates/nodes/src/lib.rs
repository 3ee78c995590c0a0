//! `nodes` crate — the `ExecutableNode` trait and built-in node implementations.
//!
//! Every node — built-in and plugin alike — must implement [`ExecutableNode`].
//! The engine crate dispatches execution through this trait object.
//! `sub-workflow` is the one built-in node type with no implementation here;
//! it recurses into `WorkflowEngine` and so is handled as an engine
//! intrinsic (see `registry::is_engine_intrinsic`).

pub mod error;
pub mod traits;
pub mod mock;

pub mod condition;
pub mod trigger_nodes;
pub mod action_nodes;
pub mod flow_nodes;
pub mod registry;

#[cfg(test)]
mod test_support;

pub use error::NodeError;
pub use traits::{ExecutableNode, ExecutionContext};
pub use registry::{default_registry, is_engine_intrinsic, NodeRegistry};
