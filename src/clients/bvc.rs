//! Bolsa de Valores de Colombia (BVC) market client
//!
//! Access is a two-host dance: a handshake on the public site issues a JWT,
//! which the REST host then expects as a cookie, as a bearer token and in
//! two custom headers. Both calls share one cookie jar. A 401 on the data
//! call gets exactly one fresh handshake and one retry.

use crate::config::BvcConfig;
use crate::services::normalizer::shape_rows;
use crate::types::{CxError, ExchangeRow, HttpDiagnostic, Market, Result};
use chrono::{Local, NaiveDate, Utc};
use parking_lot::Mutex;
use reqwest::blocking::Response;
use reqwest::cookie::Jar;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, ACCEPT_LANGUAGE, ORIGIN, REFERER};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;

/// Handshake timeout in seconds
const HANDSHAKE_TIMEOUT_SECS: u64 = 15;

/// Market data timeout in seconds
const API_TIMEOUT_SECS: u64 = 45;

/// Characters of the reply body kept in the diagnostic record
const BODY_PREVIEW_CHARS: usize = 500;

const MARKET_DATA_PATH: &str = "/market-information/rv/lvl-2";

/// Status code and body of one upstream reply
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpReply {
    pub status: u16,
    pub body: String,
}

impl HttpReply {
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    fn from_response(response: Response) -> Result<Self> {
        let status = response.status().as_u16();
        let body = response.text()?;
        Ok(Self { status, body })
    }
}

/// The two upstream calls of the BVC protocol.
///
/// `Err` means no reply was received at all (connect failure, timeout);
/// any HTTP status, including errors, comes back as `Ok`.
pub trait BvcTransport {
    fn handshake(&self) -> Result<HttpReply>;

    fn market_data(&self, token: &str, boards: &[&str], trade_date: NaiveDate)
        -> Result<HttpReply>;
}

impl<T: BvcTransport + ?Sized> BvcTransport for &T {
    fn handshake(&self) -> Result<HttpReply> {
        (**self).handshake()
    }

    fn market_data(
        &self,
        token: &str,
        boards: &[&str],
        trade_date: NaiveDate,
    ) -> Result<HttpReply> {
        (**self).market_data(token, boards, trade_date)
    }
}

/// reqwest-backed transport; one instance is one browser-like session
pub struct HttpTransport {
    http: reqwest::blocking::Client,
    jar: Arc<Jar>,
    config: BvcConfig,
    api_url: reqwest::Url,
}

impl HttpTransport {
    pub fn new(config: &BvcConfig) -> Result<Self> {
        let api_url = reqwest::Url::parse(&config.api_url)
            .map_err(|e| CxError::Config(format!("invalid BVC api_url: {}", e)))?;
        let jar = Arc::new(Jar::default());
        let http = reqwest::blocking::Client::builder()
            .default_headers(browser_headers(config)?)
            .user_agent(super::BROWSER_USER_AGENT)
            .cookie_provider(Arc::clone(&jar))
            .timeout(Duration::from_secs(API_TIMEOUT_SECS))
            .build()
            .map_err(|e| CxError::Transport(format!("HTTP client error: {}", e)))?;

        Ok(Self {
            http,
            jar,
            config: config.clone(),
            api_url,
        })
    }
}

/// Headers the site's own front-end sends; Referer and Origin are checked upstream
fn browser_headers(config: &BvcConfig) -> Result<HeaderMap> {
    let base = config.base_url.trim_end_matches('/');
    let value = |raw: String| {
        HeaderValue::from_str(&raw)
            .map_err(|e| CxError::Config(format!("invalid header value '{}': {}", raw, e)))
    };

    let mut headers = HeaderMap::new();
    headers.insert(REFERER, value(format!("{}/mercado-local-en-linea", base))?);
    headers.insert(ORIGIN, value(base.to_string())?);
    headers.insert(ACCEPT, HeaderValue::from_static("application/json, text/plain, */*"));
    headers.insert(ACCEPT_LANGUAGE, HeaderValue::from_static("es-ES,es;q=0.9,en;q=0.8"));
    headers.insert("Sec-Fetch-Dest", HeaderValue::from_static("empty"));
    headers.insert("Sec-Fetch-Mode", HeaderValue::from_static("cors"));
    headers.insert("Sec-Fetch-Site", HeaderValue::from_static("same-site"));
    Ok(headers)
}

impl BvcTransport for HttpTransport {
    fn handshake(&self) -> Result<HttpReply> {
        let url = format!("{}/api/handshake", self.config.base_url.trim_end_matches('/'));
        let ts = Utc::now().timestamp_millis().to_string();
        let nonce = uuid::Uuid::new_v4().to_string();
        tracing::debug!("GET {}", url);

        let response = self
            .http
            .get(&url)
            .query(&[("ts", ts.as_str()), ("r", nonce.as_str())])
            .timeout(Duration::from_secs(HANDSHAKE_TIMEOUT_SECS))
            .send()?;
        HttpReply::from_response(response)
    }

    fn market_data(
        &self,
        token: &str,
        boards: &[&str],
        trade_date: NaiveDate,
    ) -> Result<HttpReply> {
        self.jar.add_cookie_str(
            &format!("token={}; Domain={}; Path=/", token, self.config.cookie_domain),
            &self.api_url,
        );

        let url = format!(
            "{}{}",
            self.config.api_url.trim_end_matches('/'),
            MARKET_DATA_PATH
        );
        let mut query: Vec<(&str, String)> = vec![(
            "filters[marketDataRv][tradeDate]",
            trade_date.format("%Y-%m-%d").to_string(),
        )];
        query.extend(
            boards
                .iter()
                .map(|b| ("filters[marketDataRv][board]", b.to_string())),
        );
        query.push(("sorter[]", "tradeValue".to_string()));
        query.push(("sorter[]", "DESC".to_string()));
        tracing::debug!("GET {} boards={:?}", url, boards);

        // Which channel the API reads is unconfirmed, so the token goes in all of them
        let response = self
            .http
            .get(&url)
            .query(&query)
            .bearer_auth(token)
            .header("token", token)
            .header("x-jwt-token", token)
            .timeout(Duration::from_secs(API_TIMEOUT_SECS))
            .send()?;
        HttpReply::from_response(response)
    }
}

/// Holder of the most recent BVC reply that did not end in success
#[derive(Debug, Default)]
pub struct DiagnosticSlot(Mutex<Option<HttpDiagnostic>>);

impl DiagnosticSlot {
    pub const fn new() -> Self {
        Self(parking_lot::const_mutex(None))
    }

    pub fn record(&self, reply: &HttpReply) {
        *self.0.lock() = Some(HttpDiagnostic {
            status_code: reply.status,
            body_preview: reply.body.chars().take(BODY_PREVIEW_CHARS).collect(),
        });
    }

    pub fn clear(&self) {
        *self.0.lock() = None;
    }

    pub fn get(&self) -> Option<HttpDiagnostic> {
        self.0.lock().clone()
    }
}

/// Process-wide diagnostic record shared by the default entry points.
/// Concurrent fetches overwrite each other; last writer wins.
pub static LAST_BVC_ERROR: DiagnosticSlot = DiagnosticSlot::new();

/// Lifecycle of one market fetch
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Unauthenticated,
    Handshaking,
    Authenticated,
    Fetching,
    Reauthenticating,
    Done,
    Failed,
}

/// One market fetch: handshake, data call, optional re-auth, row shaping.
///
/// The token lives only as long as the client; nothing is reused across
/// fetches.
pub struct BvcClient<'d, T: BvcTransport> {
    transport: T,
    diagnostics: &'d DiagnosticSlot,
    state: SessionState,
}

impl<'d, T: BvcTransport> BvcClient<'d, T> {
    pub fn new(transport: T, diagnostics: &'d DiagnosticSlot) -> Self {
        Self {
            transport,
            diagnostics,
            state: SessionState::Unauthenticated,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Mercado local (EQTY, REPO, TTV)
    pub fn local_market(&mut self) -> Option<Vec<ExchangeRow>> {
        self.fetch(Market::Local)
    }

    /// Mercado Global Colombiano (MGC)
    pub fn global_market(&mut self) -> Option<Vec<ExchangeRow>> {
        self.fetch(Market::Global)
    }

    /// Fetch today's table for `market`; `None` when any step fails
    pub fn fetch(&mut self, market: Market) -> Option<Vec<ExchangeRow>> {
        self.fetch_on(market, Local::now().date_naive())
    }

    pub fn fetch_on(&mut self, market: Market, trade_date: NaiveDate) -> Option<Vec<ExchangeRow>> {
        match self.run(market.boards(), trade_date) {
            Ok(rows) => {
                self.state = SessionState::Done;
                tracing::info!(market = market.name(), rows = rows.len(), "BVC fetch done");
                Some(rows)
            }
            Err(e) => {
                self.state = SessionState::Failed;
                tracing::warn!(market = market.name(), "BVC fetch failed: {}", e);
                None
            }
        }
    }

    fn run(&mut self, boards: &[&str], trade_date: NaiveDate) -> Result<Vec<ExchangeRow>> {
        self.state = SessionState::Handshaking;
        let mut token = self.handshake()?;
        self.state = SessionState::Authenticated;
        let mut reauthenticated = false;

        loop {
            self.state = SessionState::Fetching;
            let reply = self.transport.market_data(&token, boards, trade_date)?;
            self.diagnostics.record(&reply);

            if reply.status == 401 {
                if reauthenticated {
                    return Err(CxError::Auth("token rejected after re-authentication".into()));
                }
                tracing::info!("BVC token rejected, re-authenticating once");
                self.state = SessionState::Reauthenticating;
                token = self.handshake()?;
                reauthenticated = true;
                continue;
            }

            if !reply.is_success() {
                return Err(CxError::Transport(format!(
                    "market data returned HTTP {}",
                    reply.status
                )));
            }

            let body: Value = serde_json::from_str(&reply.body)?;
            self.diagnostics.clear();

            let tab = body
                .get("data")
                .and_then(|d| d.get("tab"))
                .and_then(Value::as_array)
                .map(Vec::as_slice)
                .unwrap_or_default();
            return Ok(shape_rows(tab));
        }
    }

    fn handshake(&mut self) -> Result<String> {
        let reply = self.transport.handshake()?;
        self.diagnostics.record(&reply);

        if !reply.is_success() {
            return Err(CxError::Auth(format!(
                "handshake returned HTTP {}",
                reply.status
            )));
        }

        let body: Value = serde_json::from_str(&reply.body)
            .map_err(|e| CxError::Auth(format!("handshake body unreadable: {}", e)))?;
        body.get("token")
            .and_then(Value::as_str)
            .filter(|t| !t.is_empty())
            .map(String::from)
            .ok_or_else(|| CxError::Auth("handshake response has no token".into()))
    }
}

/// Source of exchange tables for the aggregation layer
pub trait MarketSource: Send + Sync {
    fn market(&self, market: Market) -> Option<Vec<ExchangeRow>>;

    /// Last recorded failure, for debug responses
    fn last_diagnostic(&self) -> Option<HttpDiagnostic>;
}

/// Default entry point: a fresh HTTP session per fetch, reporting into
/// [`LAST_BVC_ERROR`]
#[derive(Debug, Clone, Default)]
pub struct BvcService {
    config: BvcConfig,
}

impl BvcService {
    pub fn new(config: BvcConfig) -> Self {
        Self { config }
    }
}

impl MarketSource for BvcService {
    fn market(&self, market: Market) -> Option<Vec<ExchangeRow>> {
        let transport = match HttpTransport::new(&self.config) {
            Ok(t) => t,
            Err(e) => {
                tracing::error!("cannot build BVC session: {}", e);
                return None;
            }
        };
        BvcClient::new(transport, &LAST_BVC_ERROR).fetch(market)
    }

    fn last_diagnostic(&self) -> Option<HttpDiagnostic> {
        LAST_BVC_ERROR.get()
    }
}

/// Mercado local with the default configuration
pub fn local_market() -> Option<Vec<ExchangeRow>> {
    BvcService::default().market(Market::Local)
}

/// Mercado global with the default configuration
pub fn global_market() -> Option<Vec<ExchangeRow>> {
    BvcService::default().market(Market::Global)
}
