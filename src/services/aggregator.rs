//! Aggregator service: merges per-store results into the API response shapes
//!
//! Every upstream failure is caught here and turned into an error field
//! scoped to the smallest unit affected, so one store never blocks another.

use crate::clients::{AppStoreClient, BvcService, MarketSource, PlayStoreClient, StoreClient};
use crate::config::ServiceConfig;
use crate::types::{Market, MarketResponse, RatingRecord, Result, Review, StoreRating};
use serde::Serialize;

/// Error text of a failed `/bvc/*` call
pub const MARKET_UNAVAILABLE: &str = "could not fetch market data (handshake or API failed)";

/// `GET /` body
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Health {
    pub service: &'static str,
    pub status: &'static str,
}

/// `GET /trii` body
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TriiRatings {
    pub playstore: StoreRating,
    pub appstore: StoreRating,
}

/// `GET /trii-comments` body
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TriiComments {
    pub playstore: Vec<Review>,
    pub appstore: Vec<Review>,
}

pub struct Aggregator {
    config: ServiceConfig,
    appstore: Box<dyn StoreClient>,
    playstore: Box<dyn StoreClient>,
    market: Box<dyn MarketSource>,
}

impl Aggregator {
    /// Build an aggregator backed by the live upstream clients
    pub fn new(config: ServiceConfig) -> Result<Self> {
        let appstore = AppStoreClient::new(&config.appstore.country)?;
        let playstore = PlayStoreClient::new(&config.playstore.lang, &config.playstore.country)?;
        let market = BvcService::new(config.bvc.clone());
        Ok(Self::with_clients(
            config,
            Box::new(appstore),
            Box::new(playstore),
            Box::new(market),
        ))
    }

    pub fn with_clients(
        config: ServiceConfig,
        appstore: Box<dyn StoreClient>,
        playstore: Box<dyn StoreClient>,
        market: Box<dyn MarketSource>,
    ) -> Self {
        Self {
            config,
            appstore,
            playstore,
            market,
        }
    }

    pub fn health(&self) -> Health {
        Health {
            service: "CX-service",
            status: "ok",
        }
    }

    /// Trii rating on both stores, rounded to 2 decimals
    pub fn trii_ratings(&self) -> TriiRatings {
        let trii = &self.config.trii;
        let side = |client: &dyn StoreClient, app_id: &str, country: &str| {
            match client.rating(app_id, country) {
                Ok(summary) => StoreRating::Found(summary.rounded()),
                Err(e) => {
                    tracing::warn!(store = client.store().as_str(), "Trii rating failed: {}", e);
                    StoreRating::failed(e.to_string())
                }
            }
        };

        let (playstore, appstore) = rayon::join(
            || {
                side(
                    self.playstore.as_ref(),
                    &trii.play_store_package,
                    self.playstore.default_country(),
                )
            },
            || side(self.appstore.as_ref(), &trii.app_store_id, &trii.app_store_country),
        );

        TriiRatings {
            playstore,
            appstore,
        }
    }

    /// Trii reviews of the last 30 days; a failing store yields an empty list
    pub fn trii_comments(&self) -> TriiComments {
        let trii = &self.config.trii;
        let side = |client: &dyn StoreClient, app_id: &str, country: &str| {
            client.reviews(app_id, country).unwrap_or_else(|e| {
                tracing::warn!(store = client.store().as_str(), "Trii reviews failed: {}", e);
                Vec::new()
            })
        };

        let (playstore, appstore) = rayon::join(
            || {
                side(
                    self.playstore.as_ref(),
                    &trii.play_store_package,
                    self.playstore.default_country(),
                )
            },
            || side(self.appstore.as_ref(), &trii.app_store_id, &trii.app_store_country),
        );

        TriiComments {
            playstore,
            appstore,
        }
    }

    /// Ratings of the configured Play Store competitors
    pub fn playstore_ratings(&self) -> Vec<RatingRecord> {
        self.playstore
            .ratings_batch(&self.config.playstore.competitors)
    }

    /// Ratings of the configured App Store competitors
    pub fn appstore_ratings(&self) -> Vec<RatingRecord> {
        self.appstore.ratings_batch(&self.config.appstore.competitors)
    }

    /// Exchange table for `market`; `debug` attaches the last upstream failure
    pub fn market(&self, market: Market, debug: bool) -> MarketResponse {
        match self.market.market(market) {
            Some(rows) => MarketResponse::ok(rows),
            None => {
                let mut response = MarketResponse::failed(MARKET_UNAVAILABLE);
                if debug {
                    response.debug = Some(self.market.last_diagnostic());
                }
                response
            }
        }
    }
}
