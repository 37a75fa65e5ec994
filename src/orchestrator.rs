//! Top-level sync execution: mode selection, chunking, bookmark read/write,
//! pager drive, sink write, and the best-effort forecast branch.

use chrono::{DateTime, Datelike, Duration as ChronoDuration, TimeZone, Utc};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::SyncConfig;
use crate::error::SyncError;
use crate::mapper::{self, TagNormalizer};
use crate::model::{CanonicalRecord, DiagnosticsSummary, MetricType, Query, VendorRow};
use crate::pager::Pager;
use crate::retry::Retrier;
use crate::sink::Sink;
use crate::transport::Transport;

const BACKFILL_CHUNK_THRESHOLD_DAYS: i64 = 30;
const INCREMENTAL_WINDOW_START_DAYS: i64 = 3;
const INCREMENTAL_WINDOW_END_DAYS: i64 = 1;

/// Drives one complete sync invocation against a configured [`Transport`]
/// and [`Sink`].
pub struct Orchestrator<S: Sink> {
    transport: Transport,
    retrier: Retrier,
    sink: S,
}

impl<S: Sink> Orchestrator<S> {
    #[must_use]
    pub fn new(transport: Transport, max_retries: u32, sink: S) -> Self {
        Self {
            transport,
            retrier: Retrier::new(max_retries),
            sink,
        }
    }

    /// Runs one sync to completion.
    ///
    /// # Errors
    ///
    /// Returns the first error encountered on any ranged operation; sink
    /// write and bookmark-read failures propagate, bookmark-write and
    /// forecast failures are logged and swallowed.
    pub async fn sync(
        &self,
        config: &SyncConfig,
        cancel: &CancellationToken,
    ) -> Result<(), SyncError> {
        config.validate()?;

        let mut summary = DiagnosticsSummary::new();
        let tag_normalizer = TagNormalizer::new(config.tag_prefix_filters.clone());

        let result = match config.end_date {
            None => {
                self.run_incremental(config, &tag_normalizer, Utc::now(), &mut summary, cancel)
                    .await
            }
            Some(end) => {
                let start = config.start_date.ok_or_else(|| {
                    SyncError::ConfigInvalid(
                        "start_date is required when end_date is set".to_string(),
                    )
                })?;
                self.run_backfill(config, &tag_normalizer, start, end, &mut summary, cancel)
                    .await
            }
        };

        match &result {
            Ok(()) => info!(%summary, "sync completed"),
            Err(err) => error!(error = %err, %summary, "sync failed"),
        }

        result
    }

    async fn run_incremental(
        &self,
        config: &SyncConfig,
        tag_normalizer: &TagNormalizer,
        now: DateTime<Utc>,
        summary: &mut DiagnosticsSummary,
        cancel: &CancellationToken,
    ) -> Result<(), SyncError> {
        let (start, end) = incremental_window(now);
        self.execute_range(config, tag_normalizer, start, end, false, summary, cancel)
            .await
    }

    async fn run_backfill(
        &self,
        config: &SyncConfig,
        tag_normalizer: &TagNormalizer,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        summary: &mut DiagnosticsSummary,
        cancel: &CancellationToken,
    ) -> Result<(), SyncError> {
        if (end - start).num_days() <= BACKFILL_CHUNK_THRESHOLD_DAYS {
            return self
                .execute_range(config, tag_normalizer, start, end, true, summary, cancel)
                .await;
        }

        for (chunk_start, chunk_end) in month_chunks(start, end) {
            self.execute_range(
                config,
                tag_normalizer,
                chunk_start,
                chunk_end,
                true,
                summary,
                cancel,
            )
            .await?;
        }
        Ok(())
    }

    async fn execute_range(
        &self,
        config: &SyncConfig,
        tag_normalizer: &TagNormalizer,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        is_backfill: bool,
        summary: &mut DiagnosticsSummary,
        cancel: &CancellationToken,
    ) -> Result<(), SyncError> {
        let fingerprint = mapper::query_fingerprint(
            config.scope.token(),
            start,
            end,
            config.granularity,
            &config.group_bys,
            &config.metrics,
        );
        let bookmark_key = format!("{}_{fingerprint}", config.scope.prefix());

        let mut query = Query {
            scope: config.scope.clone(),
            start,
            end,
            granularity: config.granularity,
            group_bys: config.group_bys.clone(),
            metrics: config.metrics.clone(),
            page_size: config.page_size,
            cursor: String::new(),
        };

        if !is_backfill {
            if let Some(raw) = self.sink.get_bookmark(&bookmark_key).await? {
                if let Some(bookmark) = crate::model::Bookmark::parse(&raw) {
                    query.start = bookmark.0;
                } else {
                    warn!(bookmark = %raw, "unparseable bookmark, ignoring");
                }
            }
        }

        let mut pager = Pager::new(query.clone());
        let mut records: Vec<CanonicalRecord> = Vec::new();

        while pager.has_more() {
            let page = pager
                .next_page(&self.transport, &self.retrier, cancel)
                .await
                .map_err(SyncError::from)?;

            for row in &page.data {
                let record = mapper::map_row(row, &query, &fingerprint, MetricType::Cost, tag_normalizer);
                summary.record(record.diagnostics.as_ref());
                records.push(record);
            }
        }

        debug!(count = records.len(), %bookmark_key, "writing cost records");
        self.sink.write(&records).await?;

        if !is_backfill {
            if let Err(err) = self.sink.set_bookmark(&bookmark_key, &end.to_rfc3339()).await {
                warn!(error = %err, %bookmark_key, "failed to advance bookmark");
            }
        }

        if config.include_forecast {
            self.run_forecast(config, tag_normalizer, &query, &fingerprint, summary, cancel)
                .await;
        }

        Ok(())
    }

    async fn run_forecast(
        &self,
        config: &SyncConfig,
        tag_normalizer: &TagNormalizer,
        query: &Query,
        fingerprint: &str,
        summary: &mut DiagnosticsSummary,
        cancel: &CancellationToken,
    ) {
        let Some(report_token) = query.scope.report_token() else {
            debug!("forecast skipped: no cost report token configured");
            return;
        };

        let outcome: Result<(), SyncError> = async {
            let forecast_page = self
                .retrier
                .call(cancel, || {
                    self.transport.fetch_forecast(
                        report_token,
                        query.start,
                        query.end,
                        config.granularity,
                        cancel,
                    )
                })
                .await
                .map_err(SyncError::from)?;

            let mut forecast_records = Vec::with_capacity(forecast_page.data.len());
            for forecast_row in &forecast_page.data {
                let vendor_row = VendorRow {
                    provider: String::new(),
                    service: String::new(),
                    account: String::new(),
                    project: String::new(),
                    region: String::new(),
                    resource_id: String::new(),
                    tags: std::collections::HashMap::new(),
                    cost: Some(forecast_row.cost),
                    usage_quantity: None,
                    usage_unit: None,
                    effective_unit_price: None,
                    list_cost: None,
                    amortized_cost: None,
                    tax: None,
                    credit: None,
                    refund: None,
                    currency: forecast_row.currency.clone(),
                    bucket_start: forecast_row.bucket_start,
                    bucket_end: forecast_row.bucket_end,
                };
                let record =
                    mapper::map_row(&vendor_row, query, fingerprint, MetricType::Forecast, tag_normalizer);
                summary.record(record.diagnostics.as_ref());
                forecast_records.push(record);
            }

            self.sink.write(&forecast_records).await
        }
        .await;

        if let Err(err) = outcome {
            warn!(error = %err, "forecast snapshot failed, continuing");
        }
    }
}

/// Computes `[now - 3d, now - 1d]` at day granularity (UTC calendar dates).
fn incremental_window(now: DateTime<Utc>) -> (DateTime<Utc>, DateTime<Utc>) {
    let start = truncate_to_day(now - ChronoDuration::days(INCREMENTAL_WINDOW_START_DAYS));
    let end = truncate_to_day(now - ChronoDuration::days(INCREMENTAL_WINDOW_END_DAYS));
    (start, end)
}

fn truncate_to_day(dt: DateTime<Utc>) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(dt.year(), dt.month(), dt.day(), 0, 0, 0)
        .single()
        .expect("calendar date extracted from a valid DateTime is always valid")
}

fn month_start(dt: DateTime<Utc>) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(dt.year(), dt.month(), 1, 0, 0, 0)
        .single()
        .expect("calendar date extracted from a valid DateTime is always valid")
}

fn next_month_start(dt: DateTime<Utc>) -> DateTime<Utc> {
    let (year, month) = if dt.month() == 12 {
        (dt.year() + 1, 1)
    } else {
        (dt.year(), dt.month() + 1)
    };
    Utc.with_ymd_and_hms(year, month, 1, 0, 0, 0)
        .single()
        .expect("calendar date extracted from a valid DateTime is always valid")
}

/// Walks `[start, end]` month-by-month starting at the calendar month
/// containing `start`.
fn month_chunks(start: DateTime<Utc>, end: DateTime<Utc>) -> Vec<(DateTime<Utc>, DateTime<Utc>)> {
    let mut chunks = Vec::new();
    let mut current = month_start(start);
    while current < end {
        let next = next_month_start(current);
        let chunk_end = next.min(end);
        chunks.push((current, chunk_end));
        current = next;
    }
    chunks
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn incremental_window_spans_three_to_one_days_back() {
        let now = Utc.with_ymd_and_hms(2024, 6, 15, 14, 30, 0).unwrap();
        let (start, end) = incremental_window(now);
        assert_eq!(start, Utc.with_ymd_and_hms(2024, 6, 12, 0, 0, 0).unwrap());
        assert_eq!(end, Utc.with_ymd_and_hms(2024, 6, 14, 0, 0, 0).unwrap());
    }

    #[test]
    fn month_chunks_splits_on_calendar_month_boundaries() {
        let start = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let end = Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap();
        let chunks = month_chunks(start, end);
        assert_eq!(
            chunks,
            vec![
                (
                    Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
                    Utc.with_ymd_and_hms(2024, 2, 1, 0, 0, 0).unwrap()
                ),
                (
                    Utc.with_ymd_and_hms(2024, 2, 1, 0, 0, 0).unwrap(),
                    Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap()
                ),
            ]
        );
    }

    #[test]
    fn month_chunks_yields_one_chunk_for_a_single_day_span() {
        let start = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let end = Utc.with_ymd_and_hms(2024, 1, 2, 0, 0, 0).unwrap();
        assert_eq!(month_chunks(start, end), vec![(start, end)]);
    }

    fn config() -> SyncConfig {
        SyncConfig {
            token: "tok_abc".to_string(),
            scope: crate::model::ReportScope::CostReportToken("rpt_1".to_string()),
            start_date: Some(Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()),
            end_date: Some(Utc.with_ymd_and_hms(2024, 1, 2, 0, 0, 0).unwrap()),
            ..Default::default()
        }
    }

    async fn empty_page_server() -> wiremock::MockServer {
        use wiremock::matchers::{method, path};
        use wiremock::{Mock, ResponseTemplate};

        let server = wiremock::MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/costs"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({"data": [], "next_cursor": "", "has_more": false})),
            )
            .mount(&server)
            .await;
        server
    }

    #[tokio::test]
    async fn sync_propagates_sink_write_failure() {
        let server = empty_page_server().await;
        let transport = Transport::new(server.uri(), "tok_abc", std::time::Duration::from_secs(5)).unwrap();

        let mut sink = crate::sink::MockSink::new();
        sink.expect_write()
            .returning(|_| Box::pin(async { Err(SyncError::SinkFailure("disk full".to_string())) }));
        sink.expect_get_bookmark().returning(|_| Box::pin(async { Ok(None) }));

        let orchestrator = Orchestrator::new(transport, 5, sink);
        let result = orchestrator.sync(&config(), &CancellationToken::new()).await;
        assert!(matches!(result, Err(SyncError::SinkFailure(_))));
    }

    #[tokio::test]
    async fn sync_swallows_bookmark_write_failure() {
        // Incremental mode (no end_date) is the only path that writes bookmarks.
        let server = empty_page_server().await;
        let transport = Transport::new(server.uri(), "tok_abc", std::time::Duration::from_secs(5)).unwrap();

        let mut sink = crate::sink::MockSink::new();
        sink.expect_write().returning(|_| Box::pin(async { Ok(()) }));
        sink.expect_get_bookmark().returning(|_| Box::pin(async { Ok(None) }));
        sink.expect_set_bookmark().returning(|_, _| {
            Box::pin(async { Err(SyncError::SinkFailure("bookmark store down".to_string())) })
        });

        let incremental_config = SyncConfig {
            end_date: None,
            start_date: None,
            ..config()
        };

        let orchestrator = Orchestrator::new(transport, 5, sink);
        let result = orchestrator
            .sync(&incremental_config, &CancellationToken::new())
            .await;
        assert!(result.is_ok());
    }
}
