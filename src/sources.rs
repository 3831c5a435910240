//! Best-effort listing of the distinct sources stored in the vector store.
//!
//! There is no index over `metadata.source`, so the listing pages through the
//! stored records with a cursor and counts what it sees. Bounds keep the scan
//! cheap on large collections; when a bound cuts the scan short the output
//! says so.

use std::collections::HashMap;
use std::future::Future;

use anyhow::Result;
use tracing::{debug, warn};

/// One page of a cursor scan over stored records.
#[derive(Debug, Clone)]
pub struct ScrollPage<C> {
    /// `metadata.source` of each record on the page, `None` when absent.
    pub sources: Vec<Option<String>>,
    /// Cursor for the next page; `None` once the data is exhausted.
    pub next: Option<C>,
}

/// A store that can be paged through record by record.
pub trait SourceScroll {
    /// Opaque position token handed back by the store.
    type Cursor: Send;

    fn scroll_sources(
        &self,
        cursor: Option<Self::Cursor>,
        limit: u32,
    ) -> impl Future<Output = Result<ScrollPage<Self::Cursor>>> + Send;
}

/// Limits for a source scan.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScanBounds {
    /// Total records to look at.
    pub max_points: usize,
    /// Records requested per page.
    pub batch_size: u32,
    /// Distinct sources to track.
    pub max_sources: usize,
}

impl Default for ScanBounds {
    fn default() -> Self {
        Self {
            max_points: 10_000,
            batch_size: 256,
            max_sources: 1_000,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StopReason {
    EndOfData,
    MaxPoints,
    MaxSources,
}

/// Lists `"<source> (chunks=<count>)"` lines, most chunks first, ties by name.
///
/// Never fails: a store error yields a single advisory line instead.
pub async fn list_sources<S>(store: &S, bounds: &ScanBounds) -> Vec<String>
where
    S: SourceScroll + ?Sized,
{
    match scan(store, bounds).await {
        Ok(lines) => lines,
        Err(e) => {
            warn!(error = %format!("{:#}", e), "Source listing failed");
            vec![format!("(source listing unavailable: {:#})", e)]
        }
    }
}

async fn scan<S>(store: &S, bounds: &ScanBounds) -> Result<Vec<String>>
where
    S: SourceScroll + ?Sized,
{
    if bounds.max_points == 0 {
        debug!("Source scan bound is zero; nothing to scan");
        return Ok(Vec::new());
    }

    let mut counts: HashMap<String, usize> = HashMap::new();
    let mut cursor: Option<S::Cursor> = None;
    let mut scanned = 0usize;
    let batch_size = bounds.batch_size.max(1) as usize;

    let stop = 'scan: loop {
        if scanned >= bounds.max_points {
            break StopReason::MaxPoints;
        }

        let limit = batch_size.min(bounds.max_points - scanned) as u32;
        let page = store.scroll_sources(cursor.take(), limit).await?;
        debug!(records = page.sources.len(), scanned, "Scanned page of records");

        for source in page.sources {
            scanned += 1;
            let Some(source) = source.filter(|s| !s.is_empty()) else {
                continue;
            };
            if let Some(count) = counts.get_mut(&source) {
                *count += 1;
            } else if counts.len() >= bounds.max_sources {
                break 'scan StopReason::MaxSources;
            } else {
                counts.insert(source, 1);
            }
        }

        match page.next {
            Some(next) => cursor = Some(next),
            None => break StopReason::EndOfData,
        }
    };

    let mut entries: Vec<(String, usize)> = counts.into_iter().collect();
    entries.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));

    let mut lines: Vec<String> = entries
        .into_iter()
        .map(|(source, count)| format!("{} (chunks={})", source, count))
        .collect();

    match stop {
        StopReason::EndOfData => {}
        StopReason::MaxPoints => lines.push(format!(
            "(stopped after scanning {} points; counts may be incomplete)",
            bounds.max_points
        )),
        StopReason::MaxSources => lines.push(format!(
            "(stopped after tracking {} distinct sources; counts may be incomplete)",
            bounds.max_sources
        )),
    }

    Ok(lines)
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::bail;
    use std::sync::Mutex;

    /// In-memory store; the cursor is the index of the next record.
    struct FakeStore {
        records: Vec<Option<String>>,
        limits_seen: Mutex<Vec<u32>>,
    }

    impl FakeStore {
        fn new(records: &[&str]) -> Self {
            Self {
                records: records.iter().map(|s| Some(s.to_string())).collect(),
                limits_seen: Mutex::new(Vec::new()),
            }
        }
    }

    impl SourceScroll for FakeStore {
        type Cursor = usize;

        async fn scroll_sources(
            &self,
            cursor: Option<usize>,
            limit: u32,
        ) -> Result<ScrollPage<usize>> {
            self.limits_seen.lock().unwrap().push(limit);
            let start = cursor.unwrap_or(0);
            let end = (start + limit as usize).min(self.records.len());
            Ok(ScrollPage {
                sources: self.records[start..end].to_vec(),
                next: (end < self.records.len()).then_some(end),
            })
        }
    }

    struct BrokenStore;

    impl SourceScroll for BrokenStore {
        type Cursor = ();

        async fn scroll_sources(&self, _cursor: Option<()>, _limit: u32) -> Result<ScrollPage<()>> {
            bail!("collection has no payload")
        }
    }

    fn bounds(max_points: usize, batch_size: u32, max_sources: usize) -> ScanBounds {
        ScanBounds {
            max_points,
            batch_size,
            max_sources,
        }
    }

    #[tokio::test]
    async fn test_counts_sorted_by_count_then_name() {
        let store = FakeStore::new(&["a.pdf", "b.pdf", "a.pdf", "a.pdf"]);
        let lines = list_sources(&store, &bounds(10, 256, 100)).await;
        assert_eq!(lines, vec!["a.pdf (chunks=3)", "b.pdf (chunks=1)"]);
    }

    #[tokio::test]
    async fn test_ties_break_by_name() {
        let store = FakeStore::new(&["z.pdf", "m.pdf", "a.pdf", "m.pdf", "z.pdf"]);
        let lines = list_sources(&store, &bounds(100, 2, 100)).await;
        assert_eq!(
            lines,
            vec!["m.pdf (chunks=2)", "z.pdf (chunks=2)", "a.pdf (chunks=1)"]
        );
    }

    #[tokio::test]
    async fn test_max_points_bound_adds_advisory() {
        let store = FakeStore::new(&["a.pdf", "a.pdf", "b.pdf", "b.pdf", "b.pdf"]);
        let lines = list_sources(&store, &bounds(3, 2, 100)).await;
        assert_eq!(
            lines,
            vec![
                "a.pdf (chunks=2)",
                "b.pdf (chunks=1)",
                "(stopped after scanning 3 points; counts may be incomplete)",
            ]
        );
        // The last page is trimmed so the scan never exceeds the bound.
        assert_eq!(*store.limits_seen.lock().unwrap(), vec![2, 1]);
    }

    #[tokio::test]
    async fn test_exact_fit_is_end_of_data() {
        let store = FakeStore::new(&["a.pdf", "b.pdf"]);
        let lines = list_sources(&store, &bounds(2, 256, 100)).await;
        assert_eq!(lines, vec!["a.pdf (chunks=1)", "b.pdf (chunks=1)"]);
    }

    #[tokio::test]
    async fn test_max_sources_bound_adds_advisory() {
        let store = FakeStore::new(&["a.pdf", "b.pdf", "a.pdf", "c.pdf", "a.pdf"]);
        let lines = list_sources(&store, &bounds(100, 256, 2)).await;
        assert_eq!(
            lines,
            vec![
                "a.pdf (chunks=2)",
                "b.pdf (chunks=1)",
                "(stopped after tracking 2 distinct sources; counts may be incomplete)",
            ]
        );
    }

    #[tokio::test]
    async fn test_records_without_source_are_skipped() {
        let mut store = FakeStore::new(&["a.pdf"]);
        store.records.push(None);
        store.records.push(Some(String::new()));
        let lines = list_sources(&store, &bounds(10, 256, 100)).await;
        assert_eq!(lines, vec!["a.pdf (chunks=1)"]);
    }

    #[tokio::test]
    async fn test_zero_point_bound_scans_nothing() {
        let empty = FakeStore::new(&[]);
        assert!(list_sources(&empty, &bounds(0, 256, 100)).await.is_empty());
        assert!(empty.limits_seen.lock().unwrap().is_empty());

        let full = FakeStore::new(&["a.pdf", "b.pdf"]);
        assert!(list_sources(&full, &bounds(0, 256, 100)).await.is_empty());
        assert!(full.limits_seen.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_empty_store() {
        let store = FakeStore::new(&[]);
        assert!(list_sources(&store, &ScanBounds::default()).await.is_empty());
    }

    #[tokio::test]
    async fn test_store_error_becomes_advisory() {
        let lines = list_sources(&BrokenStore, &ScanBounds::default()).await;
        assert_eq!(
            lines,
            vec!["(source listing unavailable: collection has no payload)"]
        );
    }
}
