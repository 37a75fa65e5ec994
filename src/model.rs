//! Canonical data model: the vendor wire shapes, the FOCUS-aligned record
//! they map to, and the diagnostics attached along the way.
//!
//! Every nullable numeric field is a plain `Option<f64>` — an explicit
//! "absent" variant, never a sentinel zero. Zero and absence are different
//! facts and this model keeps them that way at the type level.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ============================================================================
// Query input
// ============================================================================

/// Time bucket granularity for a cost/forecast query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Granularity {
    Day,
    Month,
}

impl std::fmt::Display for Granularity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Day => write!(f, "day"),
            Self::Month => write!(f, "month"),
        }
    }
}

/// Dimensions the vendor can group cost buckets by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GroupByDimension {
    Provider,
    Service,
    Account,
    Project,
    Region,
    ResourceId,
    Tags,
}

impl std::fmt::Display for GroupByDimension {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Provider => write!(f, "provider"),
            Self::Service => write!(f, "service"),
            Self::Account => write!(f, "account"),
            Self::Project => write!(f, "project"),
            Self::Region => write!(f, "region"),
            Self::ResourceId => write!(f, "resource_id"),
            Self::Tags => write!(f, "tags"),
        }
    }
}

/// Metrics the vendor can report per bucket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MetricField {
    Cost,
    Usage,
    EffectiveUnitPrice,
    AmortizedCost,
    Taxes,
    Credits,
    Refunds,
}

impl std::fmt::Display for MetricField {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Cost => write!(f, "cost"),
            Self::Usage => write!(f, "usage"),
            Self::EffectiveUnitPrice => write!(f, "effective_unit_price"),
            Self::AmortizedCost => write!(f, "amortized_cost"),
            Self::Taxes => write!(f, "taxes"),
            Self::Credits => write!(f, "credits"),
            Self::Refunds => write!(f, "refunds"),
        }
    }
}

/// Which scope a query runs against. Exactly one of the two vendor-recognized
/// tokens — a curated cost report view, or the broader workspace.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReportScope {
    CostReportToken(String),
    WorkspaceToken(String),
}

impl ReportScope {
    /// The token value, regardless of which variant.
    #[must_use]
    pub fn token(&self) -> &str {
        match self {
            ReportScope::CostReportToken(t) | ReportScope::WorkspaceToken(t) => t,
        }
    }

    /// The query parameter name the vendor expects for this scope.
    #[must_use]
    pub fn query_param(&self) -> &'static str {
        match self {
            ReportScope::CostReportToken(_) => "cost_report_token",
            ReportScope::WorkspaceToken(_) => "workspace_token",
        }
    }

    /// True if this scope names a curated cost report (needed for the forecast branch).
    #[must_use]
    pub fn report_token(&self) -> Option<&str> {
        match self {
            ReportScope::CostReportToken(t) => Some(t),
            ReportScope::WorkspaceToken(_) => None,
        }
    }

    /// Bookmark key prefix distinguishing the two scope kinds.
    #[must_use]
    pub fn prefix(&self) -> &'static str {
        match self {
            ReportScope::CostReportToken(_) => "cost_report",
            ReportScope::WorkspaceToken(_) => "workspace",
        }
    }
}

/// A single cost-endpoint query, day-aligned and UTC throughout.
#[derive(Debug, Clone, PartialEq)]
pub struct Query {
    pub scope: ReportScope,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub granularity: Granularity,
    pub group_bys: Vec<GroupByDimension>,
    pub metrics: Vec<MetricField>,
    pub page_size: u32,
    pub cursor: String,
}

impl Query {
    /// Group-by dimensions in lexicographic (display) order, deduplicated.
    #[must_use]
    pub fn sorted_group_bys(&self) -> Vec<GroupByDimension> {
        let mut v = self.group_bys.clone();
        v.sort();
        v.dedup();
        v
    }

    /// Requested metrics in lexicographic (display) order, deduplicated.
    #[must_use]
    pub fn sorted_metrics(&self) -> Vec<MetricField> {
        let mut v = self.metrics.clone();
        v.sort();
        v.dedup();
        v
    }
}

// ============================================================================
// Vendor wire shapes
// ============================================================================

/// One bucket observation as returned by the vendor's cost endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct VendorRow {
    #[serde(default)]
    pub provider: String,
    #[serde(default)]
    pub service: String,
    #[serde(default)]
    pub account: String,
    #[serde(default)]
    pub project: String,
    #[serde(default)]
    pub region: String,
    #[serde(default)]
    pub resource_id: String,
    #[serde(default)]
    pub tags: HashMap<String, String>,
    #[serde(default)]
    pub cost: Option<f64>,
    #[serde(default)]
    pub usage_quantity: Option<f64>,
    #[serde(default)]
    pub usage_unit: Option<String>,
    #[serde(default)]
    pub effective_unit_price: Option<f64>,
    #[serde(default)]
    pub list_cost: Option<f64>,
    #[serde(default)]
    pub amortized_cost: Option<f64>,
    #[serde(default)]
    pub tax: Option<f64>,
    #[serde(default)]
    pub credit: Option<f64>,
    #[serde(default)]
    pub refund: Option<f64>,
    #[serde(default)]
    pub currency: String,
    pub bucket_start: DateTime<Utc>,
    pub bucket_end: DateTime<Utc>,
}

/// One page of the cost endpoint's response.
#[derive(Debug, Clone, Deserialize)]
pub struct Page {
    pub data: Vec<VendorRow>,
    #[serde(default)]
    pub next_cursor: String,
    #[serde(default)]
    pub has_more: bool,
}

/// A single forecast row, as returned by the forecast endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct ForecastRow {
    pub bucket_start: DateTime<Utc>,
    pub bucket_end: DateTime<Utc>,
    pub cost: f64,
    pub currency: String,
}

/// The forecast endpoint's response body.
#[derive(Debug, Clone, Deserialize)]
pub struct ForecastPage {
    pub data: Vec<ForecastRow>,
}

// ============================================================================
// Canonical record (FOCUS-aligned output)
// ============================================================================

/// Which logical stream a canonical record belongs to. Two records with the
/// same line item identifier but different `metric_type` are not
/// duplicates — they are distinct logical rows the sink must keep separate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MetricType {
    Cost,
    Forecast,
}

/// A canonical FOCUS-aligned cost record, ready for the sink.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CanonicalRecord {
    pub timestamp: DateTime<Utc>,
    pub provider: String,
    pub service: String,
    pub account: String,
    pub project: String,
    pub region: String,
    pub resource_id: String,
    pub labels: HashMap<String, String>,

    pub usage_amount: Option<f64>,
    pub usage_unit: Option<String>,
    pub list_cost: Option<f64>,
    pub net_cost: Option<f64>,
    pub amortized_cost: Option<f64>,
    pub effective_unit_price: Option<f64>,
    pub tax: Option<f64>,
    pub credit: Option<f64>,
    pub refund: Option<f64>,
    pub currency: String,

    pub source_report_token: String,
    pub query_fingerprint: String,
    pub line_item_id: String,
    pub metric_type: MetricType,

    pub diagnostics: Option<RecordDiagnostics>,
}

// ============================================================================
// Diagnostics
// ============================================================================

/// Per-record diagnostics: missing required fields and quality warnings.
///
/// A record with no issues must carry `None` here (see
/// [`CanonicalRecord::diagnostics`]), never a `Some` with empty vectors, so
/// downstream consumers can test "has issues" with a single null check.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RecordDiagnostics {
    /// Required field name -> human-readable reason it was flagged missing.
    pub missing_fields: Vec<(String, String)>,
    /// Quality warning tags (e.g. "usage_unit_mismatch").
    pub warnings: Vec<String>,
    /// Free-form source context (e.g. raw currency string before normalization).
    pub source_info: HashMap<String, String>,
}

impl RecordDiagnostics {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.missing_fields.is_empty() && self.warnings.is_empty()
    }
}

/// Accumulates diagnostics across an entire sync for the end-of-run summary
/// log. Transient — built fresh per [`crate::orchestrator::Orchestrator::sync`]
/// call and never persisted.
#[derive(Debug, Clone, Default)]
pub struct DiagnosticsSummary {
    pub total_records: u64,
    pub records_with_issues: u64,
    pub by_missing_field: HashMap<String, u64>,
    pub by_warning: HashMap<String, u64>,
}

impl DiagnosticsSummary {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold one record's diagnostics into the running summary.
    pub fn record(&mut self, diagnostics: Option<&RecordDiagnostics>) {
        self.total_records += 1;
        let Some(diagnostics) = diagnostics else {
            return;
        };
        if diagnostics.is_empty() {
            return;
        }
        self.records_with_issues += 1;
        for (field, _reason) in &diagnostics.missing_fields {
            *self.by_missing_field.entry(field.clone()).or_insert(0) += 1;
        }
        for warning in &diagnostics.warnings {
            *self.by_warning.entry(warning.clone()).or_insert(0) += 1;
        }
    }
}

impl std::fmt::Display for DiagnosticsSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} record(s), {} with issues",
            self.total_records, self.records_with_issues
        )
    }
}

// ============================================================================
// Bookmark
// ============================================================================

/// Persisted marker of the last end-instant successfully written for a
/// given query fingerprint. Wraps `DateTime<Utc>` so "parseable" (spec.md
/// §4.5 step 3) has a concrete, testable meaning rather than "any string".
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Bookmark(pub DateTime<Utc>);

impl Bookmark {
    /// Parse an RFC3339 instant. Returns `None` (not an error) on malformed
    /// input — an unparseable bookmark is treated as "no bookmark" by the
    /// orchestrator, not a fatal condition.
    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        DateTime::parse_from_rfc3339(value)
            .ok()
            .map(|dt| Self(dt.with_timezone(&Utc)))
    }

    #[must_use]
    pub fn to_rfc3339(self) -> String {
        self.0.to_rfc3339()
    }
}
