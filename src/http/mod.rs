//! HTTP layer for the download statistics service.
//!
//! Provides the axum-based server that parses and validates query
//! parameters, runs the aggregation pipeline, and formats results and
//! errors as JSON, alongside the health and metrics endpoints.

pub mod handler;
