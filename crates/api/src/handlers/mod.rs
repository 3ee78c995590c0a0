pub mod executions;
pub mod status;
pub mod webhooks;
pub mod workflows;
