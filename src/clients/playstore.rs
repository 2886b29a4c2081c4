//! Play Store client
//!
//! Ratings are scraped from the app details page (`AF_initDataCallback`
//! blocks); reviews come from the `UsvDTd` batchexecute RPC, which pages
//! with an opaque continuation token.

use super::{
    as_f64_lenient, as_u64_lenient, fetch_recent, json_path, Page, ReviewSource, StoreClient,
    BROWSER_USER_AGENT, REVIEW_WINDOW_DAYS,
};
use crate::types::{CxError, FeedReview, RatingSummary, Result, Store};
use chrono::DateTime;
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{json, Value};
use std::time::Duration;

/// Play Store base URL
pub const PLAY_BASE_URL: &str = "https://play.google.com";

/// HTTP request timeout in seconds
const REQUEST_TIMEOUT_SECS: u64 = 30;

/// Reviews requested per RPC call
const REVIEWS_PER_PAGE: u32 = 199;

/// Sort order id for "newest first"
const SORT_NEWEST: u32 = 2;

/// Dataset holding the rating histogram on the details page
const DETAILS_DATASET: &str = "ds:5";

static SCRIPT_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"AF_initDataCallback[\s\S]*?</script").expect("valid regex"));
static KEY_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(ds:.*?)'").expect("valid regex"));
static VALUE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"data:([\s\S]*?), sideChannel: \{\}\}\);</").expect("valid regex")
});
static RPC_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\)\]\}'\n\n([\s\S]+)").expect("valid regex"));

/// Play Store client
pub struct PlayStoreClient {
    http: reqwest::blocking::Client,
    base_url: String,
    lang: String,
    default_country: String,
}

impl PlayStoreClient {
    /// Create a client against the public Play Store
    pub fn new(lang: &str, default_country: &str) -> Result<Self> {
        Self::with_base_url(PLAY_BASE_URL, lang, default_country)
    }

    /// Create a client against a custom base URL
    pub fn with_base_url(base_url: &str, lang: &str, default_country: &str) -> Result<Self> {
        let http = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .user_agent(BROWSER_USER_AGENT)
            .build()
            .map_err(|e| CxError::Transport(format!("HTTP client error: {}", e)))?;
        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            lang: lang.to_string(),
            default_country: default_country.to_string(),
        })
    }

    fn details_page(&self, package: &str, country: &str) -> Result<String> {
        let url = format!("{}/store/apps/details", self.base_url);
        tracing::debug!("GET {} id={}", url, package);
        let response = self
            .http
            .get(&url)
            .query(&[("id", package), ("hl", self.lang.as_str()), ("gl", country)])
            .send()?
            .error_for_status()?;
        Ok(response.text()?)
    }

    fn review_page(&self, package: &str, country: &str, token: Option<&str>) -> Result<String> {
        let url = format!("{}/_/PlayStoreUi/data/batchexecute", self.base_url);
        tracing::debug!("POST {} id={} paginated={}", url, package, token.is_some());
        let response = self
            .http
            .post(&url)
            .query(&[("hl", self.lang.as_str()), ("gl", country)])
            .form(&[("f.req", reviews_request(package, token))])
            .send()?
            .error_for_status()?;
        Ok(response.text()?)
    }
}

impl StoreClient for PlayStoreClient {
    fn store(&self) -> Store {
        Store::Playstore
    }

    fn default_country(&self) -> &str {
        &self.default_country
    }

    fn rating(&self, app_id: &str, country: &str) -> Result<RatingSummary> {
        let html = self.details_page(app_id, country)?;
        parse_details(&html)
    }

    fn recent_feed_reviews(&self, app_id: &str, country: &str) -> Result<Vec<FeedReview>> {
        let feed = ReviewFeed {
            client: self,
            package: app_id,
            country,
        };
        let reviews = fetch_recent(&feed, REVIEW_WINDOW_DAYS)?;
        tracing::info!(app_id, country, count = reviews.len(), "fetched Play Store reviews");
        Ok(reviews)
    }
}

/// Review RPC feed of one package; the cursor is the continuation token
struct ReviewFeed<'a> {
    client: &'a PlayStoreClient,
    package: &'a str,
    country: &'a str,
}

impl ReviewSource for ReviewFeed<'_> {
    type Item = FeedReview;
    type Cursor = String;

    fn fetch_page(&self, cursor: Option<&String>) -> Result<Page<FeedReview, String>> {
        let body = self
            .client
            .review_page(self.package, self.country, cursor.map(String::as_str))?;
        parse_reviews_response(&body)
    }
}

/// Build the `f.req` form value of the review RPC
pub fn reviews_request(package: &str, token: Option<&str>) -> String {
    let inner = json!([
        null,
        null,
        [2, SORT_NEWEST, [REVIEWS_PER_PAGE, null, token], null, []],
        [package, 7]
    ]);
    json!([[["UsvDTd", inner.to_string(), null, "generic"]]]).to_string()
}

/// Extract the rating summary from the details page HTML
pub fn parse_details(html: &str) -> Result<RatingSummary> {
    let dataset = SCRIPT_RE
        .find_iter(html)
        .map(|m| m.as_str())
        .find(|script| {
            KEY_RE
                .captures(script)
                .is_some_and(|c| &c[1] == DETAILS_DATASET)
        })
        .ok_or_else(|| {
            CxError::MalformedResponse(format!("details page has no {} dataset", DETAILS_DATASET))
        })?;

    let raw = VALUE_RE
        .captures(dataset)
        .and_then(|c| c.get(1))
        .ok_or_else(|| CxError::MalformedResponse("unreadable details dataset".into()))?;
    let data: Value = serde_json::from_str(raw.as_str())?;

    Ok(RatingSummary {
        rating_global: as_f64_lenient(json_path(&data, &[1, 2, 51, 0, 1])).unwrap_or(0.0),
        total_votos: as_u64_lenient(json_path(&data, &[1, 2, 51, 2, 1])).unwrap_or(0),
    })
}

/// Parse a batchexecute reply into one page of reviews.
///
/// The RPC payload is a JSON document embedded as a string; reviews sit at
/// `[0]` and the continuation token at `[-2][-1]`.
pub fn parse_reviews_response(body: &str) -> Result<Page<FeedReview, String>> {
    let raw = RPC_RE
        .captures(body)
        .and_then(|c| c.get(1))
        .ok_or_else(|| CxError::MalformedResponse("missing batchexecute prefix".into()))?;
    let envelope: Value = serde_json::from_str(raw.as_str().trim())?;

    // A null payload means there is nothing (more) to read
    let Some(payload) = json_path(&envelope, &[0, 2]).and_then(Value::as_str) else {
        return Ok(Page::last(Vec::new()));
    };
    let data: Value = serde_json::from_str(payload)?;

    let items = data
        .get(0)
        .and_then(Value::as_array)
        .map(|reviews| reviews.iter().map(parse_review).collect())
        .unwrap_or_default();

    let next = json_path(&data, &[-2, -1])
        .and_then(Value::as_str)
        .filter(|t| !t.is_empty())
        .map(String::from);

    Ok(Page { items, next })
}

fn parse_review(review: &Value) -> FeedReview {
    let timestamp = json_path(review, &[5, 0])
        .and_then(Value::as_i64)
        .and_then(|secs| DateTime::from_timestamp(secs, 0));
    let text = json_path(review, &[4])
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();
    let author = json_path(review, &[1, 0])
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();

    FeedReview {
        timestamp,
        text,
        author,
    }
}
