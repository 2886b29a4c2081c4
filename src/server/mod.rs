//! HTTP front-end: GET-only JSON routes over the aggregator

use crate::services::Aggregator;
use crate::types::Market;
use hyper::header::{HeaderValue, CONTENT_TYPE};
use hyper::service::{make_service_fn, service_fn};
use hyper::{Body, Method, Request, Response, Server, StatusCode};
use serde_json::{json, Value};
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;

/// Operation selected by an inbound request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    Health,
    Trii,
    TriiComments,
    PlaystoreRatings,
    AppstoreRatings,
    Market { market: Market, debug: bool },
}

/// Resolve method, path and query string to a route.
/// `Err` carries the status to answer with.
pub fn route(method: &Method, path: &str, query: Option<&str>) -> Result<Route, StatusCode> {
    let path = match path.trim_end_matches('/') {
        "" => "/",
        p => p,
    };

    let route = match path {
        "/" => Route::Health,
        "/trii" => Route::Trii,
        "/trii-comments" => Route::TriiComments,
        "/ratings/playstore" => Route::PlaystoreRatings,
        "/ratings/appstore" => Route::AppstoreRatings,
        "/bvc/mercado-local" => Route::Market {
            market: Market::Local,
            debug: debug_flag(query)?,
        },
        "/bvc/mercado-global" => Route::Market {
            market: Market::Global,
            debug: debug_flag(query)?,
        },
        _ => return Err(StatusCode::NOT_FOUND),
    };

    if method != Method::GET {
        return Err(StatusCode::METHOD_NOT_ALLOWED);
    }
    Ok(route)
}

fn debug_flag(query: Option<&str>) -> Result<bool, StatusCode> {
    let value = query
        .unwrap_or_default()
        .split('&')
        .filter_map(|pair| pair.split_once('=').or(Some((pair, ""))))
        .find(|(key, _)| *key == "debug")
        .map(|(_, value)| value);

    match value {
        None => Ok(false),
        Some(v) => parse_flag(v).ok_or(StatusCode::UNPROCESSABLE_ENTITY),
    }
}

/// Boolean query values, as accepted by common web frameworks
pub fn parse_flag(raw: &str) -> Option<bool> {
    match raw.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Run the operation for `route`. Blocks on upstream calls.
pub fn dispatch(aggregator: &Aggregator, route: Route) -> Value {
    let result = match route {
        Route::Health => serde_json::to_value(aggregator.health()),
        Route::Trii => serde_json::to_value(aggregator.trii_ratings()),
        Route::TriiComments => serde_json::to_value(aggregator.trii_comments()),
        Route::PlaystoreRatings => serde_json::to_value(aggregator.playstore_ratings()),
        Route::AppstoreRatings => serde_json::to_value(aggregator.appstore_ratings()),
        Route::Market { market, debug } => serde_json::to_value(aggregator.market(market, debug)),
    };
    result.unwrap_or_else(|e| {
        tracing::error!("response serialization failed: {}", e);
        json!({"detail": "Internal Server Error"})
    })
}

fn json_response(status: StatusCode, body: &Value) -> Response<Body> {
    let mut response = Response::new(Body::from(body.to_string()));
    *response.status_mut() = status;
    response
        .headers_mut()
        .insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    response
}

fn error_response(status: StatusCode) -> Response<Body> {
    let detail = status.canonical_reason().unwrap_or("Error");
    json_response(status, &json!({ "detail": detail }))
}

/// Handle one request; upstream work runs on the blocking pool
pub async fn handle(
    aggregator: Arc<Aggregator>,
    req: Request<Body>,
) -> Result<Response<Body>, Infallible> {
    let route = match route(req.method(), req.uri().path(), req.uri().query()) {
        Ok(route) => route,
        Err(status) => {
            tracing::debug!("{} {} -> {}", req.method(), req.uri(), status);
            return Ok(error_response(status));
        }
    };

    tracing::info!("{} {}", req.method(), req.uri());
    let response =
        match tokio::task::spawn_blocking(move || dispatch(&aggregator, route)).await {
            Ok(body) => json_response(StatusCode::OK, &body),
            Err(e) => {
                tracing::error!("request handler panicked: {}", e);
                error_response(StatusCode::INTERNAL_SERVER_ERROR)
            }
        };
    Ok(response)
}

/// Serve the API on `addr` until Ctrl-C
pub async fn serve(aggregator: Arc<Aggregator>, addr: SocketAddr) -> Result<(), hyper::Error> {
    let make_svc = make_service_fn(move |_conn| {
        let aggregator = Arc::clone(&aggregator);
        async move {
            Ok::<_, Infallible>(service_fn(move |req| handle(Arc::clone(&aggregator), req)))
        }
    });

    let server = Server::try_bind(&addr)?.serve(make_svc);
    tracing::info!("CX-service listening on http://{}", addr);

    server
        .with_graceful_shutdown(async {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::info!("shutting down");
            }
        })
        .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clients::{MarketSource, StoreClient};
    use crate::config::ServiceConfig;
    use crate::types::{
        CxError, ExchangeRow, FeedReview, HttpDiagnostic, RatingSummary, Result as CxResult,
        Store,
    };

    struct StaticStore(Store);

    impl StoreClient for StaticStore {
        fn store(&self) -> Store {
            self.0
        }

        fn default_country(&self) -> &str {
            "co"
        }

        fn rating(&self, _app_id: &str, _country: &str) -> CxResult<RatingSummary> {
            Ok(RatingSummary::new(4.0, 100))
        }

        fn recent_feed_reviews(&self, _app_id: &str, _country: &str) -> CxResult<Vec<FeedReview>> {
            Err(CxError::Transport("offline".into()))
        }
    }

    struct DownMarket;

    impl MarketSource for DownMarket {
        fn market(&self, _market: Market) -> Option<Vec<ExchangeRow>> {
            None
        }

        fn last_diagnostic(&self) -> Option<HttpDiagnostic> {
            Some(HttpDiagnostic {
                status_code: 500,
                body_preview: "down".into(),
            })
        }
    }

    fn aggregator() -> Arc<Aggregator> {
        Arc::new(Aggregator::with_clients(
            ServiceConfig::default(),
            Box::new(StaticStore(Store::Appstore)),
            Box::new(StaticStore(Store::Playstore)),
            Box::new(DownMarket),
        ))
    }

    // ========== route ==========

    #[test]
    fn test_route_known_paths() {
        let get = Method::GET;
        assert_eq!(route(&get, "/", None), Ok(Route::Health));
        assert_eq!(route(&get, "/trii", None), Ok(Route::Trii));
        assert_eq!(route(&get, "/trii/", None), Ok(Route::Trii));
        assert_eq!(route(&get, "/trii-comments", None), Ok(Route::TriiComments));
        assert_eq!(
            route(&get, "/ratings/playstore", None),
            Ok(Route::PlaystoreRatings)
        );
        assert_eq!(
            route(&get, "/ratings/appstore", None),
            Ok(Route::AppstoreRatings)
        );
        assert_eq!(
            route(&get, "/bvc/mercado-local", None),
            Ok(Route::Market {
                market: Market::Local,
                debug: false
            })
        );
    }

    #[test]
    fn test_route_debug_flag() {
        let get = Method::GET;
        assert_eq!(
            route(&get, "/bvc/mercado-global", Some("debug=true")),
            Ok(Route::Market {
                market: Market::Global,
                debug: true
            })
        );
        assert_eq!(
            route(&get, "/bvc/mercado-local", Some("use_browser=1&debug=1")),
            Ok(Route::Market {
                market: Market::Local,
                debug: true
            })
        );
        assert_eq!(
            route(&get, "/bvc/mercado-local", Some("debug=off")),
            Ok(Route::Market {
                market: Market::Local,
                debug: false
            })
        );
        assert_eq!(
            route(&get, "/bvc/mercado-local", Some("debug=maybe")),
            Err(StatusCode::UNPROCESSABLE_ENTITY)
        );
    }

    #[test]
    fn test_route_errors() {
        assert_eq!(
            route(&Method::GET, "/nope", None),
            Err(StatusCode::NOT_FOUND)
        );
        assert_eq!(
            route(&Method::POST, "/trii", None),
            Err(StatusCode::METHOD_NOT_ALLOWED)
        );
    }

    #[test]
    fn test_parse_flag() {
        assert_eq!(parse_flag("TRUE"), Some(true));
        assert_eq!(parse_flag("Yes"), Some(true));
        assert_eq!(parse_flag("0"), Some(false));
        assert_eq!(parse_flag(""), None);
    }

    // ========== dispatch / handle ==========

    #[test]
    fn test_dispatch_trii_comments_degrades() {
        let body = dispatch(&aggregator(), Route::TriiComments);
        assert_eq!(body, json!({"playstore": [], "appstore": []}));
    }

    #[test]
    fn test_dispatch_market_debug() {
        let body = dispatch(
            &aggregator(),
            Route::Market {
                market: Market::Local,
                debug: true,
            },
        );
        assert_eq!(body["data"], json!([]));
        assert_eq!(body["debug"]["status_code"], json!(500));
        assert!(body["error"].is_string());
    }

    #[tokio::test]
    async fn test_handle_health() {
        let req = Request::builder().uri("/").body(Body::empty()).unwrap();
        let response = handle(aggregator(), req).await.unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[CONTENT_TYPE], "application/json");
        let bytes = hyper::body::to_bytes(response.into_body()).await.unwrap();
        let body: Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body, json!({"service": "CX-service", "status": "ok"}));
    }

    #[tokio::test]
    async fn test_handle_not_found() {
        let req = Request::builder()
            .uri("/does-not-exist")
            .body(Body::empty())
            .unwrap();
        let response = handle(aggregator(), req).await.unwrap();

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        let bytes = hyper::body::to_bytes(response.into_body()).await.unwrap();
        let body: Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body, json!({"detail": "Not Found"}));
    }
}
