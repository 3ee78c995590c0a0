//! Shared test fixtures for node unit tests.

#![cfg(test)]

use crate::traits::ExecutionContext;

pub fn test_ctx() -> ExecutionContext {
    ExecutionContext::new(uuid::Uuid::new_v4(), uuid::Uuid::new_v4(), serde_json::json!({}))
}
