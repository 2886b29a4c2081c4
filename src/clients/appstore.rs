//! App Store client
//!
//! Ratings come from the iTunes Lookup API; reviews from the iTunes
//! customer-reviews RSS feed (JSON flavour), newest first, 50 per page.

use super::{
    as_f64_lenient, as_u64_lenient, fetch_recent, Page, ReviewSource, StoreClient,
    BROWSER_USER_AGENT, REVIEW_WINDOW_DAYS,
};
use crate::services::normalizer::parse_timestamp;
use crate::types::{CxError, FeedReview, RatingSummary, Result, Store};
use serde_json::Value;
use std::time::Duration;

/// iTunes base URL
pub const ITUNES_BASE_URL: &str = "https://itunes.apple.com";

/// HTTP request timeout in seconds
const REQUEST_TIMEOUT_SECS: u64 = 30;

/// The RSS feed serves at most 10 pages
pub const MAX_FEED_PAGES: usize = 10;

/// Entries per full RSS page; a shorter page is the last one
const FEED_PAGE_SIZE: usize = 50;

/// App Store client
pub struct AppStoreClient {
    http: reqwest::blocking::Client,
    base_url: String,
    default_country: String,
}

impl AppStoreClient {
    /// Create a client against the public iTunes endpoints
    pub fn new(default_country: &str) -> Result<Self> {
        Self::with_base_url(ITUNES_BASE_URL, default_country)
    }

    /// Create a client against a custom base URL
    pub fn with_base_url(base_url: &str, default_country: &str) -> Result<Self> {
        let http = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .user_agent(BROWSER_USER_AGENT)
            .build()
            .map_err(|e| CxError::Transport(format!("HTTP client error: {}", e)))?;
        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            default_country: default_country.to_string(),
        })
    }

    fn lookup_url(&self, app_id: u64, country: &str) -> String {
        format!("{}/{}/lookup?id={}", self.base_url, country, app_id)
    }

    fn feed_url(&self, app_id: u64, country: &str, page: u32) -> String {
        format!(
            "{}/{}/rss/customerreviews/page={}/id={}/sortby=mostrecent/json",
            self.base_url, country, page, app_id
        )
    }

    fn get_json(&self, url: &str) -> Result<Value> {
        tracing::debug!("GET {}", url);
        let response = self.http.get(url).send()?.error_for_status()?;
        Ok(response.json()?)
    }
}

impl StoreClient for AppStoreClient {
    fn store(&self) -> Store {
        Store::Appstore
    }

    fn default_country(&self) -> &str {
        &self.default_country
    }

    fn rating(&self, app_id: &str, country: &str) -> Result<RatingSummary> {
        let id = parse_app_id(app_id)?;
        let body = self.get_json(&self.lookup_url(id, country))?;
        Ok(parse_lookup(&body))
    }

    fn recent_feed_reviews(&self, app_id: &str, country: &str) -> Result<Vec<FeedReview>> {
        let feed = RssFeed {
            client: self,
            app_id: parse_app_id(app_id)?,
            country,
        };
        let reviews = fetch_recent(&feed, REVIEW_WINDOW_DAYS)?;
        tracing::info!(app_id, country, count = reviews.len(), "fetched App Store reviews");
        Ok(reviews)
    }
}

fn parse_app_id(app_id: &str) -> Result<u64> {
    app_id
        .trim()
        .parse()
        .map_err(|_| CxError::Config(format!("invalid App Store app_id '{}'", app_id)))
}

/// RSS review feed of one app; the cursor is the 1-based page number
struct RssFeed<'a> {
    client: &'a AppStoreClient,
    app_id: u64,
    country: &'a str,
}

impl ReviewSource for RssFeed<'_> {
    type Item = FeedReview;
    type Cursor = u32;

    fn fetch_page(&self, cursor: Option<&u32>) -> Result<Page<FeedReview, u32>> {
        let page = cursor.copied().unwrap_or(1);
        let url = self.client.feed_url(self.app_id, self.country, page);
        // A page that cannot be fetched ends the feed
        match self.client.get_json(&url) {
            Ok(body) => Ok(parse_feed_page(&body, page)),
            Err(e) => {
                tracing::warn!(app_id = self.app_id, page, "RSS page failed, stopping: {}", e);
                Ok(Page::last(Vec::new()))
            }
        }
    }

    fn max_pages(&self) -> Option<usize> {
        Some(MAX_FEED_PAGES)
    }
}

/// Read rating and vote count from a Lookup API response.
/// Empty results and null fields yield `(0.0, 0)`.
pub fn parse_lookup(body: &Value) -> RatingSummary {
    let Some(app) = body
        .get("results")
        .and_then(Value::as_array)
        .and_then(|results| results.first())
    else {
        return RatingSummary::default();
    };

    RatingSummary {
        rating_global: as_f64_lenient(app.get("averageUserRating")).unwrap_or(0.0),
        total_votos: as_u64_lenient(app.get("userRatingCount")).unwrap_or(0),
    }
}

/// Parse one RSS page. The feed's app-metadata entry and unreadable
/// entries are dropped; the next cursor is set only for full pages.
pub fn parse_feed_page(body: &Value, page: u32) -> Page<FeedReview, u32> {
    let entries: Vec<&Value> = match body.get("feed").and_then(|f| f.get("entry")) {
        Some(Value::Array(items)) => items.iter().collect(),
        Some(single @ Value::Object(_)) => vec![single],
        _ => Vec::new(),
    };

    let next = (entries.len() >= FEED_PAGE_SIZE).then_some(page + 1);
    let items = entries.into_iter().filter_map(parse_entry).collect();

    Page { items, next }
}

fn parse_entry(entry: &Value) -> Option<FeedReview> {
    let obj = entry.as_object()?;

    // The first entry of page 1 describes the app itself
    if !obj.contains_key("content") && !obj.contains_key("im:rating") && !obj.contains_key("rating")
    {
        return None;
    }

    let updated = label(obj.get("updated"))?;
    if updated.is_empty() {
        return None;
    }

    let text = label(obj.get("content")).unwrap_or_default();
    let author = label(obj.get("author").and_then(|a| a.get("name"))).unwrap_or_default();

    Some(FeedReview {
        timestamp: parse_timestamp(&updated),
        text,
        author,
    })
}

/// RSS fields are either `{"label": "..."}` or a bare string
fn label(value: Option<&Value>) -> Option<String> {
    match value? {
        Value::Object(obj) => obj.get("label").and_then(Value::as_str).map(String::from),
        Value::String(s) => Some(s.clone()),
        _ => None,
    }
}
