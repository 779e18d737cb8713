//! Observability: metric names and recording helpers.
//!
//! Metrics are emitted through the `metrics` facade. Installing a recorder
//! or exporter is left to the embedding process.

pub mod metrics;
