//! Rating and review types for the app stores

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize, Serializer};

/// App store a record came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Store {
    Appstore,
    Playstore,
}

impl Store {
    pub fn as_str(&self) -> &'static str {
        match self {
            Store::Appstore => "appstore",
            Store::Playstore => "playstore",
        }
    }
}

/// Global rating of an app. Unknown values are reported as `0.0` / `0`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
pub struct RatingSummary {
    pub rating_global: f64,
    pub total_votos: u64,
}

impl RatingSummary {
    pub fn new(rating_global: f64, total_votos: u64) -> Self {
        Self {
            rating_global,
            total_votos,
        }
    }

    /// Same summary with the rating rounded to 2 decimals
    pub fn rounded(self) -> Self {
        Self {
            rating_global: crate::services::normalizer::round2(self.rating_global),
            ..self
        }
    }
}

/// A single review as read from a store feed, before it is joined with the app rating.
#[derive(Debug, Clone, PartialEq)]
pub struct FeedReview {
    /// `None` when the source timestamp is missing or unparseable
    pub timestamp: Option<DateTime<Utc>>,
    pub text: String,
    pub author: String,
}

/// Normalized review as published by the API
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Review {
    #[serde(rename = "Rating_Global")]
    pub rating_global: f64,
    #[serde(rename = "Total_Votos")]
    pub total_votos: u64,
    #[serde(rename = "Fecha_Review", serialize_with = "offset_rfc3339")]
    pub timestamp: DateTime<Utc>,
    #[serde(rename = "Comentario")]
    pub text: String,
    #[serde(rename = "Usuario")]
    pub author: String,
    pub store: Store,
}

impl Review {
    /// Join a feed review with the app-level rating. Returns `None` for
    /// reviews without a timestamp.
    pub fn from_feed(review: FeedReview, rating: RatingSummary, store: Store) -> Option<Self> {
        Some(Self {
            rating_global: rating.rating_global,
            total_votos: rating.total_votos,
            timestamp: review.timestamp?,
            text: review.text,
            author: review.author,
            store,
        })
    }
}

/// `2024-03-01T12:00:00+00:00`: an explicit offset, never `Z`
fn offset_rfc3339<S: Serializer>(ts: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&ts.to_rfc3339_opts(SecondsFormat::AutoSi, false))
}

/// Competitor app from configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompetitorEntry {
    /// Package name (Play Store) or numeric app id (App Store)
    #[serde(default)]
    pub identifier: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    /// Overrides the store's default country
    #[serde(default)]
    pub country: Option<String>,
}

impl CompetitorEntry {
    pub fn new(identifier: &str, name: &str) -> Self {
        Self {
            identifier: Some(identifier.to_string()),
            name: Some(name.to_string()),
            country: None,
        }
    }

    pub fn with_country(mut self, country: &str) -> Self {
        self.country = Some(country.to_string());
        self
    }

    /// Display name, falling back to the identifier
    pub fn display_name(&self) -> String {
        self.name
            .clone()
            .or_else(|| self.identifier.clone())
            .unwrap_or_default()
    }
}

/// Result of one competitor lookup in a batch
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RatingRecord {
    pub app_name: String,
    pub app_id: String,
    #[serde(flatten)]
    pub outcome: RatingOutcome,
    pub store: Store,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum RatingOutcome {
    Found {
        rating_global: f64,
        total_votos: u64,
    },
    Failed {
        error: String,
    },
}

impl RatingRecord {
    pub fn is_error(&self) -> bool {
        matches!(self.outcome, RatingOutcome::Failed { .. })
    }
}

/// One side of the `/trii` response: the rating or an error object
/// with null rating fields.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum StoreRating {
    Found(RatingSummary),
    Failed {
        error: String,
        rating_global: Option<f64>,
        total_votos: Option<u64>,
    },
}

impl StoreRating {
    pub fn failed(error: impl Into<String>) -> Self {
        StoreRating::Failed {
            error: error.into(),
            rating_global: None,
            total_votos: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    #[test]
    fn test_rating_summary_rounded() {
        let summary = RatingSummary::new(4.56789, 120).rounded();
        assert!((summary.rating_global - 4.57).abs() < 1e-9);
        assert_eq!(summary.total_votos, 120);
    }

    #[test]
    fn test_review_wire_names() {
        let review = Review {
            rating_global: 4.5,
            total_votos: 10,
            timestamp: Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap(),
            text: "Muy buena".into(),
            author: "ana".into(),
            store: Store::Playstore,
        };
        let value = serde_json::to_value(&review).unwrap();
        assert_eq!(value["Rating_Global"], json!(4.5));
        assert_eq!(value["Total_Votos"], json!(10));
        assert_eq!(value["Fecha_Review"], json!("2024-03-01T12:00:00+00:00"));
        assert_eq!(value["Comentario"], json!("Muy buena"));
        assert_eq!(value["Usuario"], json!("ana"));
        assert_eq!(value["store"], json!("playstore"));
    }

    #[test]
    fn test_review_timestamp_keeps_fraction_and_offset() {
        let review = Review {
            rating_global: 0.0,
            total_votos: 0,
            timestamp: Utc.timestamp_millis_opt(1_719_590_710_250).unwrap(),
            text: String::new(),
            author: String::new(),
            store: Store::Appstore,
        };
        let value = serde_json::to_value(&review).unwrap();
        assert_eq!(value["Fecha_Review"], json!("2024-06-28T16:05:10.250+00:00"));
    }

    #[test]
    fn test_review_from_feed_without_timestamp() {
        let feed = FeedReview {
            timestamp: None,
            text: String::new(),
            author: String::new(),
        };
        assert!(Review::from_feed(feed, RatingSummary::default(), Store::Appstore).is_none());
    }

    #[test]
    fn test_rating_record_shapes() {
        let ok = RatingRecord {
            app_name: "Flink".into(),
            app_id: "1303438003".into(),
            outcome: RatingOutcome::Found {
                rating_global: 4.7,
                total_votos: 900,
            },
            store: Store::Appstore,
        };
        assert_eq!(
            serde_json::to_value(&ok).unwrap(),
            json!({
                "app_name": "Flink",
                "app_id": "1303438003",
                "rating_global": 4.7,
                "total_votos": 900,
                "store": "appstore"
            })
        );

        let err = RatingRecord {
            app_name: "Hapi".into(),
            app_id: "com.hapicorp.imhapi".into(),
            outcome: RatingOutcome::Failed {
                error: "transport error: timeout".into(),
            },
            store: Store::Playstore,
        };
        assert!(err.is_error());
        assert_eq!(
            serde_json::to_value(&err).unwrap(),
            json!({
                "app_name": "Hapi",
                "app_id": "com.hapicorp.imhapi",
                "error": "transport error: timeout",
                "store": "playstore"
            })
        );
    }

    #[test]
    fn test_store_rating_failed_has_null_fields() {
        let value = serde_json::to_value(StoreRating::failed("boom")).unwrap();
        assert_eq!(
            value,
            json!({"error": "boom", "rating_global": null, "total_votos": null})
        );
    }

    #[test]
    fn test_competitor_display_name_fallback() {
        let entry = CompetitorEntry {
            identifier: Some("com.tyba.app".into()),
            name: None,
            country: None,
        };
        assert_eq!(entry.display_name(), "com.tyba.app");
        assert_eq!(
            CompetitorEntry::new("1", "Fintual").with_country("mx").country,
            Some("mx".to_string())
        );
    }
}
