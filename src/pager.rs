//! Cursor-driven iteration over the cost endpoint.

use tokio_util::sync::CancellationToken;

use crate::error::TransportError;
use crate::model::{Page, Query};
use crate::retry::Retrier;
use crate::transport::Transport;

/// Drives one [`Query`] to exhaustion, one page at a time, through a
/// [`Retrier`]-wrapped [`Transport`].
///
/// Holds the current cursor and whether a page has been fetched yet, so
/// `has_more` can distinguish "haven't started" from "terminal" — both
/// states have an empty cursor.
pub struct Pager {
    query: Query,
    cursor: String,
    fetched_any: bool,
    terminal: bool,
}

impl Pager {
    #[must_use]
    pub fn new(query: Query) -> Self {
        let cursor = query.cursor.clone();
        Self {
            query,
            cursor,
            fetched_any: false,
            terminal: false,
        }
    }

    /// True iff another call to [`Pager::next_page`] would fetch something:
    /// either no page has been fetched yet, or the last page had a non-empty
    /// next-cursor.
    #[must_use]
    pub fn has_more(&self) -> bool {
        !self.fetched_any || !self.terminal
    }

    /// Fetches the next page through `retrier`/`transport`, stamping the
    /// current cursor into a snapshot of the held query so no shared
    /// mutable state crosses the retrier boundary.
    ///
    /// # Errors
    ///
    /// Returns whatever [`TransportError`] the retrier ultimately surfaces.
    pub async fn next_page(
        &mut self,
        transport: &Transport,
        retrier: &Retrier,
        cancel: &CancellationToken,
    ) -> Result<Page, TransportError> {
        let mut snapshot = self.query.clone();
        snapshot.cursor = self.cursor.clone();

        let page = retrier
            .call(cancel, || transport.fetch_costs(&snapshot, cancel))
            .await?;

        self.fetched_any = true;
        self.cursor = page.next_cursor.clone();
        self.terminal = page.next_cursor.is_empty();

        Ok(page)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Granularity, MetricField, ReportScope};
    use chrono::{TimeZone, Utc};

    fn sample_query() -> Query {
        Query {
            scope: ReportScope::CostReportToken("rpt_1".to_string()),
            start: Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
            end: Utc.with_ymd_and_hms(2024, 1, 2, 0, 0, 0).unwrap(),
            granularity: Granularity::Day,
            group_bys: vec![],
            metrics: vec![MetricField::Cost],
            page_size: 1000,
            cursor: String::new(),
        }
    }

    #[test]
    fn has_more_is_true_before_first_fetch() {
        let pager = Pager::new(sample_query());
        assert!(pager.has_more());
    }

    #[test]
    fn has_more_is_false_once_terminal() {
        let mut pager = Pager::new(sample_query());
        pager.fetched_any = true;
        pager.terminal = true;
        assert!(!pager.has_more());
    }

    #[test]
    fn has_more_is_true_with_a_pending_cursor() {
        let mut pager = Pager::new(sample_query());
        pager.fetched_any = true;
        pager.terminal = false;
        pager.cursor = "c1".to_string();
        assert!(pager.has_more());
    }
}
