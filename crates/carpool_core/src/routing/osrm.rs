//! Road distances from an OSRM `/route` endpoint.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Url};
use serde::Deserialize;

use super::DistanceProvider;
use crate::error::RoutingError;
use crate::model::Position;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(3);

/// Thin async HTTP client for OSRM route distances.
#[derive(Debug, Clone)]
pub struct OsrmDistanceProvider {
    client: Client,
    endpoint: String,
}

impl OsrmDistanceProvider {
    /// Create a client for the given OSRM endpoint (e.g. `http://localhost:5000`).
    pub fn new(endpoint: &str) -> Result<Self, RoutingError> {
        let client = Client::builder().timeout(REQUEST_TIMEOUT).build()?;
        Ok(Self {
            client,
            endpoint: endpoint.trim_end_matches('/').to_string(),
        })
    }

    fn route_url(&self, from: Position, to: Position) -> Result<Url, RoutingError> {
        let base = format!(
            "{}/route/v1/driving/{:.6},{:.6};{:.6},{:.6}",
            self.endpoint,
            from.lng(),
            from.lat(),
            to.lng(),
            to.lat(),
        );
        let mut url = Url::parse(&base)
            .map_err(|err| RoutingError::Backend(format!("failed to build OSRM URL: {err}")))?;
        url.query_pairs_mut().append_pair("overview", "false");
        Ok(url)
    }
}

#[derive(Deserialize)]
struct OsrmRouteResponse {
    code: String,
    routes: Option<Vec<OsrmRoute>>,
}

#[derive(Deserialize)]
struct OsrmRoute {
    distance: f64, // metres
}

fn parse_route_response(
    resp: OsrmRouteResponse,
    from: Position,
    to: Position,
) -> Result<f64, RoutingError> {
    if resp.code != "Ok" {
        return Err(RoutingError::Backend(resp.code));
    }
    resp.routes
        .and_then(|routes| routes.into_iter().next())
        .map(|route| route.distance)
        .ok_or(RoutingError::NoRoute {
            from_lat: from.lat(),
            from_lng: from.lng(),
            to_lat: to.lat(),
            to_lng: to.lng(),
        })
}

#[async_trait]
impl DistanceProvider for OsrmDistanceProvider {
    async fn distance(&self, from: Position, to: Position) -> Result<f64, RoutingError> {
        let url = self.route_url(from, to)?;
        let parsed: OsrmRouteResponse = self.client.get(url).send().await?.json().await?;
        parse_route_response(parsed, from, to)
    }
}
