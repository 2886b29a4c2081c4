//! Upstream clients for the app stores and the exchange

pub mod appstore;
pub mod bvc;
pub mod playstore;

#[cfg(test)]
pub(crate) mod stub_server;

pub use appstore::AppStoreClient;
pub use bvc::{BvcClient, BvcService, MarketSource};
pub use playstore::PlayStoreClient;

use crate::types::{
    CompetitorEntry, CxError, FeedReview, RatingOutcome, RatingRecord, RatingSummary, Result,
    Review, Store,
};
use chrono::{DateTime, Duration, Utc};
use rayon::prelude::*;
use serde_json::Value;

/// Trailing window for "recent" reviews
pub const REVIEW_WINDOW_DAYS: i64 = 30;

/// Browser User-Agent; the store endpoints reject obvious bots
pub const BROWSER_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

/// One page of a newest-first feed
#[derive(Debug, Clone, PartialEq)]
pub struct Page<T, C> {
    pub items: Vec<T>,
    /// Cursor for the following page; `None` ends the feed
    pub next: Option<C>,
}

impl<T, C> Page<T, C> {
    pub fn last(items: Vec<T>) -> Self {
        Self { items, next: None }
    }
}

/// Item carrying the instant the cutoff is compared against
pub trait Timestamped {
    fn timestamp(&self) -> Option<DateTime<Utc>>;
}

impl Timestamped for FeedReview {
    fn timestamp(&self) -> Option<DateTime<Utc>> {
        self.timestamp
    }
}

/// Paginated source of items sorted newest-first
pub trait ReviewSource {
    type Item: Timestamped;
    type Cursor;

    /// Fetch the page at `cursor` (`None` = first page)
    fn fetch_page(&self, cursor: Option<&Self::Cursor>) -> Result<Page<Self::Item, Self::Cursor>>;

    /// Safety bound on the number of pages; `None` = follow cursors until empty
    fn max_pages(&self) -> Option<usize> {
        None
    }
}

/// Fetch every item newer than `cutoff_days` days ago.
///
/// See [`fetch_recent_since`].
pub fn fetch_recent<S: ReviewSource>(source: &S, cutoff_days: i64) -> Result<Vec<S::Item>> {
    let cutoff = Utc::now() - Duration::days(cutoff_days);
    fetch_recent_since(source, cutoff)
}

/// Walk the feed until an item older than `cutoff` shows up.
///
/// Because pages arrive newest-first, the first out-of-window item ends the
/// walk: it and everything after it are discarded. Items without a timestamp
/// are skipped and never trigger the cutoff. The walk also ends on an empty
/// cursor or when the source's page bound is reached.
pub fn fetch_recent_since<S: ReviewSource>(
    source: &S,
    cutoff: DateTime<Utc>,
) -> Result<Vec<S::Item>> {
    let mut collected = Vec::new();
    let mut cursor: Option<S::Cursor> = None;
    let mut pages = 0usize;

    loop {
        let page = source.fetch_page(cursor.as_ref())?;
        pages += 1;

        for item in page.items {
            let Some(ts) = item.timestamp() else {
                continue;
            };
            if ts < cutoff {
                return Ok(collected);
            }
            collected.push(item);
        }

        match page.next {
            Some(next) if source.max_pages().map_or(true, |max| pages < max) => {
                cursor = Some(next);
            }
            _ => return Ok(collected),
        }
    }
}

/// Rating and review access for one app store
pub trait StoreClient: Send + Sync {
    fn store(&self) -> Store;

    /// Country used when a caller does not give one
    fn default_country(&self) -> &str;

    /// Global rating of an app; missing fields default to `(0.0, 0)`
    fn rating(&self, app_id: &str, country: &str) -> Result<RatingSummary>;

    /// Feed reviews inside the trailing window, newest-first
    fn recent_feed_reviews(&self, app_id: &str, country: &str) -> Result<Vec<FeedReview>>;

    /// Recent reviews joined with the app-level rating
    fn reviews(&self, app_id: &str, country: &str) -> Result<Vec<Review>> {
        let rating = self.rating(app_id, country)?;
        let feed = self.recent_feed_reviews(app_id, country)?;
        Ok(feed
            .into_iter()
            .filter_map(|r| Review::from_feed(r, rating, self.store()))
            .collect())
    }

    /// Look up every competitor in parallel; one failure only affects its own record.
    /// Output order matches input order.
    fn ratings_batch(&self, entries: &[CompetitorEntry]) -> Vec<RatingRecord> {
        // Lookups block on HTTP inside the global rayon pool. Concurrent requests
        // share that pool, so a slow store delays other rayon work until its
        // timeout fires. Competitor lists are short, which keeps this bounded.
        entries
            .par_iter()
            .map(|entry| {
                let app_id = entry.identifier.clone().unwrap_or_default();
                let outcome = match entry.identifier.as_deref() {
                    Some(id) if !id.trim().is_empty() => {
                        let country = entry.country.as_deref().unwrap_or(self.default_country());
                        self.rating(id, country)
                    }
                    _ => Err(CxError::Config("app_id is required".into())),
                };
                let outcome = match outcome {
                    Ok(summary) => RatingOutcome::Found {
                        rating_global: crate::services::normalizer::round2(summary.rating_global),
                        total_votos: summary.total_votos,
                    },
                    Err(e) => {
                        tracing::warn!(store = self.store().as_str(), app_id = %app_id, "rating lookup failed: {}", e);
                        RatingOutcome::Failed {
                            error: e.to_string(),
                        }
                    }
                };
                RatingRecord {
                    app_name: entry.display_name(),
                    app_id,
                    outcome,
                    store: self.store(),
                }
            })
            .collect()
    }
}

/// Follow a path of array indexes through nested JSON arrays.
/// Negative indexes count from the end.
pub(crate) fn json_path<'a>(value: &'a Value, path: &[isize]) -> Option<&'a Value> {
    path.iter().try_fold(value, |current, &idx| {
        let items = current.as_array()?;
        let idx = if idx < 0 {
            items.len().checked_sub(idx.unsigned_abs())?
        } else {
            idx as usize
        };
        items.get(idx)
    })
}

/// Read a JSON value as `f64`, accepting numeric strings
pub(crate) fn as_f64_lenient(value: Option<&Value>) -> Option<f64> {
    match value? {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Read a JSON value as `u64`, accepting numeric strings and whole floats
pub(crate) fn as_u64_lenient(value: Option<&Value>) -> Option<u64> {
    match value? {
        Value::Number(n) => n
            .as_u64()
            .or_else(|| n.as_f64().filter(|f| *f >= 0.0).map(|f| f as u64)),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}
