//! Exchange (BVC) market types

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Columns of the market table that are coerced to numbers
pub const NUMERIC_COLUMNS: [&str; 6] = [
    "lastPrice",
    "openPrice",
    "maximumPrice",
    "minimumPrice",
    "volume",
    "quantity",
];

/// Market segment requested from the exchange
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Market {
    /// Mercado local: equities, repos and title transfers
    Local,
    /// Mercado Global Colombiano
    Global,
}

impl Market {
    /// Board codes sent as `filters[marketDataRv][board]`
    pub fn boards(&self) -> &'static [&'static str] {
        match self {
            Market::Local => &["EQTY", "REPO", "TTV"],
            Market::Global => &["MGC"],
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Market::Local => "mercado-local",
            Market::Global => "mercado-global",
        }
    }
}

/// One row of the market table.
///
/// Non-numeric columns are passed through untouched; numeric columns hold a
/// JSON number or `null` when the source value could not be coerced.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ExchangeRow(pub Map<String, Value>);

impl ExchangeRow {
    pub fn get(&self, field: &str) -> Option<&Value> {
        self.0.get(field)
    }

    /// Numeric column value; `None` when missing or null
    pub fn number(&self, field: &str) -> Option<f64> {
        self.0.get(field).and_then(Value::as_f64)
    }

    /// Instrument symbol, when the row carries one
    pub fn symbol(&self) -> Option<&str> {
        self.0.get("symbol").and_then(Value::as_str)
    }
}

/// Last HTTP reply seen by the exchange client
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HttpDiagnostic {
    pub status_code: u16,
    pub body_preview: String,
}

/// Body of the `/bvc/*` responses
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MarketResponse {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub data: Vec<ExchangeRow>,
    /// Present only in debug mode; serializes as `null` when no record exists
    #[serde(skip_serializing_if = "Option::is_none")]
    pub debug: Option<Option<HttpDiagnostic>>,
}

impl MarketResponse {
    pub fn ok(data: Vec<ExchangeRow>) -> Self {
        Self {
            error: None,
            data,
            debug: None,
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            error: Some(error.into()),
            data: Vec::new(),
            debug: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_market_boards() {
        assert_eq!(Market::Local.boards(), &["EQTY", "REPO", "TTV"]);
        assert_eq!(Market::Global.boards(), &["MGC"]);
    }

    #[test]
    fn test_exchange_row_accessors() {
        let row: ExchangeRow = serde_json::from_value(json!({
            "symbol": "ECOPETROL",
            "lastPrice": 2450.0,
            "volume": null
        }))
        .unwrap();
        assert_eq!(row.symbol(), Some("ECOPETROL"));
        assert_eq!(row.number("lastPrice"), Some(2450.0));
        assert_eq!(row.number("volume"), None);
        assert_eq!(row.number("quantity"), None);
    }

    #[test]
    fn test_market_response_success_shape() {
        let value = serde_json::to_value(MarketResponse::ok(Vec::new())).unwrap();
        assert_eq!(value, json!({"data": []}));
    }

    #[test]
    fn test_market_response_debug_null() {
        let mut response = MarketResponse::failed("no data");
        response.debug = Some(None);
        let value = serde_json::to_value(&response).unwrap();
        assert_eq!(value, json!({"error": "no data", "data": [], "debug": null}));
    }

    #[test]
    fn test_market_response_debug_record() {
        let mut response = MarketResponse::failed("no data");
        response.debug = Some(Some(HttpDiagnostic {
            status_code: 500,
            body_preview: "oops".into(),
        }));
        let value = serde_json::to_value(&response).unwrap();
        assert_eq!(value["debug"]["status_code"], json!(500));
        assert_eq!(value["debug"]["body_preview"], json!("oops"));
    }
}
