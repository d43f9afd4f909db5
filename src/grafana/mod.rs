//! Grafana HTTP API: provisioning and data sources

mod client;
mod datasource;
mod provisioning;

#[cfg(test)]
pub(crate) mod mock;

pub use client::{ApiResponse, GrafanaClient, GrafanaError};
pub use datasource::{
    DataSource, Frame, FrameData, FrameField, FrameSchema, QueryResponse, QueryResult,
};
pub use provisioning::{CreateOutcome, DeleteOutcome, UpdateOutcome};
