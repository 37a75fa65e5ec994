//! Pure per-row transformation from vendor rows to canonical records.
//!
//! Nothing in this module performs I/O or touches shared state: every
//! function here is a deterministic function of its arguments, which is
//! what makes the line item identifier reproducible across hosts and runs.

use std::collections::HashMap;
use std::sync::OnceLock;

use regex::Regex;
use sha2::{Digest, Sha256};

use crate::model::{
    CanonicalRecord, GroupByDimension, MetricField, MetricType, Query, RecordDiagnostics,
    VendorRow,
};

/// Known high-cardinality identifier key patterns the vendor sometimes
/// surfaces as tags (pod UID, container ID, and similar ephemeral
/// identifiers that would otherwise blow up cardinality downstream).
fn deny_list() -> &'static Regex {
    static DENY: OnceLock<Regex> = OnceLock::new();
    DENY.get_or_init(|| {
        Regex::new(r"^(pod-uid|pod-name|container-id|task-execution-id|request-id|trace-id|span-id|eks-amazonaws-com-pod-uid)$")
            .expect("deny-list regex is a fixed literal")
    })
}

/// Normalizes and filters a vendor row's raw tag map into record labels.
///
/// Applies, per key: lowercase, `_`/space -> `-`, collapse runs of `-`, trim
/// leading/trailing `-`. Then drops keys matching the high-cardinality deny
/// list, and — if an allow-list of prefixes was configured — drops any key
/// that does not start with one of them. Values pass through unchanged.
pub struct TagNormalizer {
    allow_prefixes: Vec<String>,
}

impl TagNormalizer {
    #[must_use]
    pub fn new(allow_prefixes: Vec<String>) -> Self {
        Self { allow_prefixes }
    }

    #[must_use]
    pub fn normalize(&self, raw: &HashMap<String, String>) -> HashMap<String, String> {
        if raw.is_empty() {
            return HashMap::new();
        }
        let mut out = HashMap::with_capacity(raw.len());
        for (key, value) in raw {
            let normalized = normalize_tag_key(key);
            if normalized.is_empty() || deny_list().is_match(&normalized) {
                continue;
            }
            if !self.allow_prefixes.is_empty()
                && !self
                    .allow_prefixes
                    .iter()
                    .any(|prefix| normalized.starts_with(prefix.as_str()))
            {
                continue;
            }
            out.insert(normalized, value.clone());
        }
        out
    }
}

fn normalize_tag_key(key: &str) -> String {
    let replaced: String = key
        .to_lowercase()
        .chars()
        .map(|c| if c == '_' || c == ' ' { '-' } else { c })
        .collect();

    let mut collapsed = String::with_capacity(replaced.len());
    let mut last_was_dash = false;
    for c in replaced.chars() {
        if c == '-' {
            if !last_was_dash {
                collapsed.push('-');
            }
            last_was_dash = true;
        } else {
            collapsed.push(c);
            last_was_dash = false;
        }
    }
    collapsed.trim_matches('-').to_string()
}

/// Formats a metric for inclusion in the identifier hash. `None` (absent)
/// and `Some(0.0)` (present, zero) must never collide, so absence is the
/// empty string and presence is always a 16-significant-digit scientific
/// notation rendering that is stable across hosts (1 digit before the
/// decimal point, 15 after).
fn format_metric(value: Option<f64>) -> String {
    match value {
        Some(v) => format!("{v:.15e}"),
        None => String::new(),
    }
}

/// Lifts a raw vendor numeric field to "present" only when it is non-zero.
/// See spec.md §9 open question 1 — kept deliberately, see DESIGN.md.
fn lift_nonzero(value: Option<f64>) -> Option<f64> {
    value.filter(|v| *v != 0.0)
}

/// Computes the deterministic 128-bit (32 lowercase hex char) line item
/// identifier for a mapped record.
#[allow(clippy::too_many_arguments)]
fn line_item_id(
    report_token: &str,
    bucket_start_date: &str,
    provider: &str,
    service: &str,
    account: &str,
    project: &str,
    region: &str,
    resource_id: &str,
    labels: &HashMap<String, String>,
    sorted_metric_names: &str,
    cost: Option<f64>,
    usage_quantity: Option<f64>,
    effective_unit_price: Option<f64>,
    list_cost: Option<f64>,
    amortized_cost: Option<f64>,
    tax: Option<f64>,
    credit: Option<f64>,
    refund: Option<f64>,
    usage_unit: &str,
    currency: &str,
) -> String {
    let mut tag_keys: Vec<&String> = labels.keys().collect();
    tag_keys.sort();
    let tags_serialized = tag_keys
        .into_iter()
        .map(|k| format!("{k}={}", labels[k]))
        .collect::<Vec<_>>()
        .join(";");

    let fields = [
        report_token.to_string(),
        bucket_start_date.to_string(),
        provider.to_string(),
        service.to_string(),
        account.to_string(),
        project.to_string(),
        region.to_string(),
        resource_id.to_string(),
        tags_serialized,
        sorted_metric_names.to_string(),
        format_metric(cost),
        format_metric(usage_quantity),
        format_metric(effective_unit_price),
        format_metric(list_cost),
        format_metric(amortized_cost),
        format_metric(tax),
        format_metric(credit),
        format_metric(refund),
        usage_unit.to_string(),
        currency.to_string(),
    ];
    let joined = fields.join("|");

    let digest = Sha256::digest(joined.as_bytes());
    hex::encode(&digest[..16])
}

fn sorted_metric_names(metrics: &[MetricField]) -> String {
    let mut names: Vec<String> = metrics.iter().map(MetricField::to_string).collect();
    names.sort();
    names.dedup();
    names.join(",")
}

/// Attaches diagnostics (missing fields, quality warnings) per the table in
/// spec.md §4.4. Returns `None` when the record has no issues at all.
fn diagnose(row: &VendorRow, net_cost: Option<f64>) -> Option<RecordDiagnostics> {
    let mut diagnostics = RecordDiagnostics::default();

    let mut missing = |field: &str, is_missing: bool| {
        if is_missing {
            diagnostics
                .missing_fields
                .push((field.to_string(), "required field was empty".to_string()));
        }
    };
    missing("provider", row.provider.is_empty());
    missing("service", row.service.is_empty());
    missing("account", row.account.is_empty());
    missing("region", row.region.is_empty());
    missing("currency", row.currency.is_empty());
    missing("net_cost", net_cost.is_none());

    let usage_amount_present = row.usage_quantity.is_some();
    let usage_unit_present = row.usage_unit.as_deref().is_some_and(|u| !u.is_empty());
    if usage_amount_present != usage_unit_present {
        diagnostics.warnings.push("usage_amount_unit_mismatch".to_string());
    }

    if let Some(net) = net_cost {
        if net < 0.0 {
            diagnostics.warnings.push("negative_net_cost".to_string());
        }
        if let Some(list) = row.list_cost {
            if list < net {
                diagnostics.warnings.push("list_cost_below_net_cost".to_string());
            }
        }
    }

    if row.resource_id.is_empty() && !row.service.is_empty() {
        diagnostics.warnings.push("missing_resource_id_for_service".to_string());
    }

    if diagnostics.is_empty() {
        None
    } else {
        Some(diagnostics)
    }
}

/// Maps one vendor row into a canonical record.
///
/// Pure: no I/O, no side effects, deterministic in the row/query/fingerprint
/// given. Zero-valued numeric metrics are lifted to "absent" per spec.md §4.4.
pub fn map_row(
    row: &VendorRow,
    query: &Query,
    query_fingerprint: &str,
    metric_type: MetricType,
    tag_normalizer: &TagNormalizer,
) -> CanonicalRecord {
    let labels = tag_normalizer.normalize(&row.tags);

    let net_cost = lift_nonzero(row.cost);
    let usage_amount = lift_nonzero(row.usage_quantity);
    let list_cost = lift_nonzero(row.list_cost);
    let amortized_cost = lift_nonzero(row.amortized_cost);
    let tax = lift_nonzero(row.tax);
    let credit = lift_nonzero(row.credit);
    let refund = lift_nonzero(row.refund);
    let effective_unit_price = lift_nonzero(row.effective_unit_price);

    let bucket_start_date = row.bucket_start.format("%Y-%m-%d").to_string();
    let metric_names = sorted_metric_names(&query.sorted_metrics());

    let line_item_id = line_item_id(
        query.scope.token(),
        &bucket_start_date,
        &row.provider,
        &row.service,
        &row.account,
        &row.project,
        &row.region,
        &row.resource_id,
        &labels,
        &metric_names,
        row.cost,
        row.usage_quantity,
        row.effective_unit_price,
        row.list_cost,
        row.amortized_cost,
        row.tax,
        row.credit,
        row.refund,
        row.usage_unit.as_deref().unwrap_or(""),
        &row.currency,
    );

    let diagnostics = diagnose(row, net_cost);

    CanonicalRecord {
        timestamp: row.bucket_start,
        provider: row.provider.clone(),
        service: row.service.clone(),
        account: row.account.clone(),
        project: row.project.clone(),
        region: row.region.clone(),
        resource_id: row.resource_id.clone(),
        labels,
        usage_amount,
        usage_unit: row.usage_unit.clone(),
        list_cost,
        net_cost,
        amortized_cost,
        tax,
        credit,
        refund,
        effective_unit_price,
        currency: row.currency.clone(),
        source_report_token: query.scope.token().to_string(),
        query_fingerprint: query_fingerprint.to_string(),
        line_item_id,
        metric_type,
        diagnostics,
    }
}

/// Computes the stable query fingerprint used both as the bookmark key and
/// the `query_fingerprint` stamped into every record.
#[must_use]
pub fn query_fingerprint(
    scope_token: &str,
    start: chrono::DateTime<chrono::Utc>,
    end: chrono::DateTime<chrono::Utc>,
    granularity: crate::model::Granularity,
    group_bys: &[GroupByDimension],
    metrics: &[MetricField],
) -> String {
    let mut group_names: Vec<String> = group_bys.iter().map(GroupByDimension::to_string).collect();
    group_names.sort();
    group_names.dedup();

    let metric_names = sorted_metric_names(metrics);

    let joined = format!(
        "{scope_token}|{}|{}|{granularity}|{}|{metric_names}",
        start.format("%Y-%m-%dT%H:%M:%SZ"),
        end.format("%Y-%m-%dT%H:%M:%SZ"),
        group_names.join(","),
    );

    let digest = Sha256::digest(joined.as_bytes());
    hex::encode(&digest[..16])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Granularity, Query, ReportScope};
    use chrono::{TimeZone, Utc};

    fn sample_row() -> VendorRow {
        VendorRow {
            provider: "aws".to_string(),
            service: "EC2".to_string(),
            account: "123".to_string(),
            project: String::new(),
            region: "us-east-1".to_string(),
            resource_id: "i-abc123".to_string(),
            tags: HashMap::from([
                ("Team_Name".to_string(), "platform".to_string()),
                ("kubernetes.io/pod-uid".to_string(), "ignored".to_string()),
            ]),
            cost: Some(50.25),
            usage_quantity: Some(24.0),
            usage_unit: Some("hours".to_string()),
            effective_unit_price: Some(2.09),
            list_cost: Some(60.0),
            amortized_cost: None,
            tax: None,
            credit: None,
            refund: None,
            currency: "USD".to_string(),
            bucket_start: Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
            bucket_end: Utc.with_ymd_and_hms(2024, 1, 2, 0, 0, 0).unwrap(),
        }
    }

    fn sample_query() -> Query {
        Query {
            scope: ReportScope::CostReportToken("rpt_1".to_string()),
            start: Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
            end: Utc.with_ymd_and_hms(2024, 1, 2, 0, 0, 0).unwrap(),
            granularity: Granularity::Day,
            group_bys: vec![GroupByDimension::Provider],
            metrics: vec![MetricField::Cost, MetricField::Usage],
            page_size: 1000,
            cursor: String::new(),
        }
    }

    #[test]
    fn tag_normalizer_lowercases_and_dedashes() {
        let normalizer = TagNormalizer::new(vec![]);
        let raw = HashMap::from([("Team_Name  Env".to_string(), "x".to_string())]);
        let out = normalizer.normalize(&raw);
        assert_eq!(out.get("team-name-env"), Some(&"x".to_string()));
    }

    #[test]
    fn tag_normalizer_drops_deny_listed_keys() {
        let normalizer = TagNormalizer::new(vec![]);
        let raw = HashMap::from([("pod_uid".to_string(), "abc".to_string())]);
        let out = normalizer.normalize(&raw);
        assert!(out.is_empty());
    }

    #[test]
    fn tag_normalizer_allow_list_filters_by_prefix() {
        let normalizer = TagNormalizer::new(vec!["team-".to_string()]);
        let raw = HashMap::from([
            ("team-name".to_string(), "platform".to_string()),
            ("cost-center".to_string(), "42".to_string()),
        ]);
        let out = normalizer.normalize(&raw);
        assert_eq!(out.len(), 1);
        assert!(out.contains_key("team-name"));
    }

    #[test]
    fn map_row_is_deterministic_regardless_of_tag_order() {
        let query = sample_query();
        let normalizer = TagNormalizer::new(vec![]);
        let fp = "fingerprint";

        let row_a = sample_row();
        let mut row_b = sample_row();
        // HashMap insertion order should not matter; rebuild with the same
        // contents inserted in a different order to approximate that.
        row_b.tags = HashMap::new();
        for (k, v) in row_a.tags.iter().rev() {
            row_b.tags.insert(k.clone(), v.clone());
        }

        let rec_a = map_row(&row_a, &query, fp, MetricType::Cost, &normalizer);
        let rec_b = map_row(&row_b, &query, fp, MetricType::Cost, &normalizer);
        assert_eq!(rec_a.line_item_id, rec_b.line_item_id);
    }

    #[test]
    fn map_row_lifts_zero_metrics_to_absent() {
        let mut row = sample_row();
        row.cost = Some(0.0);
        let query = sample_query();
        let normalizer = TagNormalizer::new(vec![]);
        let record = map_row(&row, &query, "fp", MetricType::Cost, &normalizer);
        assert!(record.net_cost.is_none());
    }

    #[test]
    fn map_row_flags_missing_net_cost_as_diagnostic() {
        let mut row = sample_row();
        row.cost = None;
        let query = sample_query();
        let normalizer = TagNormalizer::new(vec![]);
        let record = map_row(&row, &query, "fp", MetricType::Cost, &normalizer);
        let diagnostics = record.diagnostics.expect("expected diagnostics");
        assert!(diagnostics
            .missing_fields
            .iter()
            .any(|(field, _)| field == "net_cost"));
    }

    #[test]
    fn map_row_clean_row_has_no_diagnostics() {
        let row = sample_row();
        let query = sample_query();
        let normalizer = TagNormalizer::new(vec![]);
        let record = map_row(&row, &query, "fp", MetricType::Cost, &normalizer);
        assert!(record.diagnostics.is_none());
    }

    #[test]
    fn map_row_warns_on_list_cost_below_net_cost() {
        let mut row = sample_row();
        row.cost = Some(100.0);
        row.list_cost = Some(50.0);
        let query = sample_query();
        let normalizer = TagNormalizer::new(vec![]);
        let record = map_row(&row, &query, "fp", MetricType::Cost, &normalizer);
        let diagnostics = record.diagnostics.expect("expected diagnostics");
        assert!(diagnostics
            .warnings
            .contains(&"list_cost_below_net_cost".to_string()));
    }

    #[test]
    fn query_fingerprint_is_stable_and_ignores_group_by_order() {
        let a = query_fingerprint(
            "rpt_1",
            Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
            Utc.with_ymd_and_hms(2024, 1, 2, 0, 0, 0).unwrap(),
            Granularity::Day,
            &[GroupByDimension::Provider, GroupByDimension::Service],
            &[MetricField::Cost],
        );
        let b = query_fingerprint(
            "rpt_1",
            Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
            Utc.with_ymd_and_hms(2024, 1, 2, 0, 0, 0).unwrap(),
            Granularity::Day,
            &[GroupByDimension::Service, GroupByDimension::Provider],
            &[MetricField::Cost],
        );
        assert_eq!(a, b);
    }
}
