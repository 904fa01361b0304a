//! Order Creation Load Generator
//!
//! Drives a fulfillment order-creation API at a constant arrival rate with
//! synthetic orders, classifies each response against the API contract and
//! aggregates outcome counts and latency percentiles.

pub mod catalog;
pub mod client;
pub mod config;
pub mod error;
pub mod metrics;
pub mod order;
pub mod report;
pub mod runner;
pub mod sampler;
pub mod scheduler;
pub mod synth;
pub mod validator;

pub use catalog::{Catalog, Product};
pub use client::{ApiResponse, HttpSubmitter, OrderSubmitter};
pub use config::{ConfigOverrides, LoadTestConfig};
pub use error::SetupError;
pub use metrics::{MetricsAggregator, MetricsSnapshot};
pub use report::LoadTestReport;
pub use runner::{LoadTest, RunSummary};
pub use scheduler::{ArrivalScheduler, StopSignal};
pub use validator::{Outcome, OutcomeKind, ResponseValidator};
