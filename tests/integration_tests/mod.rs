//! End-to-end tests for the health-check pipeline

pub mod distributed_test;
pub mod error_scenarios;
pub mod fixtures;
pub mod pipeline_test;
