//! Validated configuration bundle consumed by the orchestrator.
//!
//! Loading this from a config file or environment is out of scope; callers
//! hand in an already-populated [`SyncConfig`] and [`SyncConfig::validate`]
//! is the one gate between "whatever the wrapper assembled" and "safe to
//! run".

use chrono::{DateTime, Utc};

use crate::error::SyncError;
use crate::model::{Granularity, GroupByDimension, MetricField, ReportScope};

const DEFAULT_PAGE_SIZE: u32 = 5000;
const DEFAULT_REQUEST_TIMEOUT_SECONDS: u64 = 60;
const DEFAULT_MAX_RETRIES: u32 = 5;
const MAX_PAGE_SIZE: u32 = 10_000;

/// Recognized options for one sync invocation (spec.md §6).
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Bearer token. Never logged; see [`crate::redact`].
    pub token: String,
    pub scope: ReportScope,
    /// Backfill bounds. `None` end date selects incremental mode.
    pub start_date: Option<DateTime<Utc>>,
    pub end_date: Option<DateTime<Utc>>,
    pub granularity: Granularity,
    pub group_bys: Vec<GroupByDimension>,
    pub metrics: Vec<MetricField>,
    pub include_forecast: bool,
    /// Allow-list prefixes for tag normalization. Empty means "allow all
    /// non-denied keys".
    pub tag_prefix_filters: Vec<String>,
    pub page_size: u32,
    pub request_timeout_seconds: u64,
    pub max_retries: u32,
}

impl SyncConfig {
    /// Validates the recognized-option constraints from spec.md §6.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::ConfigInvalid`] on the first violated
    /// constraint.
    pub fn validate(&self) -> Result<(), SyncError> {
        if self.token.is_empty() {
            return Err(SyncError::ConfigInvalid("token must not be empty".to_string()));
        }
        if self.scope.token().is_empty() {
            return Err(SyncError::ConfigInvalid(
                "workspace_token or cost_report_token must not be empty".to_string(),
            ));
        }
        if let (Some(start), Some(end)) = (self.start_date, self.end_date) {
            if start >= end {
                return Err(SyncError::ConfigInvalid(
                    "start_date must be before end_date".to_string(),
                ));
            }
        }
        if self.page_size == 0 || self.page_size > MAX_PAGE_SIZE {
            return Err(SyncError::ConfigInvalid(format!(
                "page_size must be in [1, {MAX_PAGE_SIZE}], got {}",
                self.page_size
            )));
        }
        if self.request_timeout_seconds == 0 {
            return Err(SyncError::ConfigInvalid(
                "request_timeout_seconds must be >= 1".to_string(),
            ));
        }
        Ok(())
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            token: String::new(),
            scope: ReportScope::WorkspaceToken(String::new()),
            start_date: None,
            end_date: None,
            granularity: Granularity::Day,
            group_bys: Vec::new(),
            metrics: vec![MetricField::Cost],
            include_forecast: false,
            tag_prefix_filters: Vec::new(),
            page_size: DEFAULT_PAGE_SIZE,
            request_timeout_seconds: DEFAULT_REQUEST_TIMEOUT_SECONDS,
            max_retries: DEFAULT_MAX_RETRIES,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid_config() -> SyncConfig {
        SyncConfig {
            token: "tok_abc".to_string(),
            scope: ReportScope::CostReportToken("rpt_1".to_string()),
            ..Default::default()
        }
    }

    #[test]
    fn validate_accepts_defaults_plus_required_fields() {
        assert!(valid_config().validate().is_ok());
    }

    #[test]
    fn validate_rejects_empty_token() {
        let config = SyncConfig {
            token: String::new(),
            ..valid_config()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn validate_rejects_empty_scope_token() {
        let config = SyncConfig {
            scope: ReportScope::WorkspaceToken(String::new()),
            ..valid_config()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn validate_rejects_page_size_out_of_range() {
        let config = SyncConfig {
            page_size: 0,
            ..valid_config()
        };
        assert!(config.validate().is_err());

        let config = SyncConfig {
            page_size: 10_001,
            ..valid_config()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn validate_rejects_inverted_date_range() {
        use chrono::TimeZone;
        let config = SyncConfig {
            start_date: Some(Utc.with_ymd_and_hms(2024, 2, 1, 0, 0, 0).unwrap()),
            end_date: Some(Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()),
            ..valid_config()
        };
        assert!(config.validate().is_err());
    }
}
