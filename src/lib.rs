//! FOCUS-normalized ingestion adapter for a vendor cloud cost REST API.
//!
//! This crate fetches cloud cost and usage data from a paginated vendor
//! endpoint, maps each row into a canonical record conforming to FOCUS 1.2,
//! and hands the records to a caller-supplied [`sink::Sink`]. It supports
//! three ingestion modes driven by [`config::SyncConfig`]: incremental daily
//! pull, bounded historical backfill, and a best-effort periodic forecast
//! snapshot.
//!
//! The command-line wrapper, config-file parsing, secret loading, the
//! concrete sink implementation, and structured logging transport are all
//! out of scope — this crate exposes the interfaces they plug into
//! ([`sink::Sink`] and [`config::SyncConfig`]) and nothing more.
//!
//! ## Quick start
//!
//! ```rust,ignore
//! use std::time::Duration;
//! use tokio_util::sync::CancellationToken;
//! use vantage_cost_sync::config::SyncConfig;
//! use vantage_cost_sync::model::ReportScope;
//! use vantage_cost_sync::orchestrator::Orchestrator;
//! use vantage_cost_sync::transport::Transport;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = SyncConfig {
//!         token: std::env::var("VENDOR_TOKEN")?,
//!         scope: ReportScope::CostReportToken("rpt_abc123".to_string()),
//!         ..Default::default()
//!     };
//!
//!     let transport = Transport::new(
//!         "https://cost.vendor.example/v1",
//!         &config.token,
//!         Duration::from_secs(config.request_timeout_seconds),
//!     )?;
//!
//!     let sink = my_sink::DatabaseSink::connect().await?;
//!     let orchestrator = Orchestrator::new(transport, config.max_retries, sink);
//!
//!     orchestrator.sync(&config, &CancellationToken::new()).await?;
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod error;
pub mod mapper;
pub mod model;
pub mod orchestrator;
pub mod pager;
pub mod redact;
pub mod retry;
pub mod sink;
pub mod transport;

pub use config::SyncConfig;
pub use error::{SyncError, TransportError};
pub use model::{
    Bookmark, CanonicalRecord, DiagnosticsSummary, ForecastPage, ForecastRow, Granularity,
    GroupByDimension, MetricField, MetricType, Page, Query, RecordDiagnostics, ReportScope,
    VendorRow,
};
pub use orchestrator::Orchestrator;
pub use sink::Sink;
pub use transport::Transport;
