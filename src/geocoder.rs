use std::future::Future;

use anyhow::{Context, Result};
use reqwest::Client;
use tracing::debug;

use crate::types::{Address, Coordinate, ReverseResponse, SearchHit};

pub const NOMINATIM_URL: &str = "https://nominatim.openstreetmap.org";

/// Turns coordinates into addresses and free text into coordinates
pub trait LocationResolver: Send + Sync {
    fn reverse_geocode(&self, at: Coordinate) -> impl Future<Output = Result<Address>> + Send;

    /// `Ok(None)` when the search has no results
    fn forward_geocode(
        &self,
        query: &str,
    ) -> impl Future<Output = Result<Option<Coordinate>>> + Send;
}

/// Nominatim (OpenStreetMap) geocoder
#[derive(Debug, Clone)]
pub struct NominatimClient {
    http_client: Client,
    base_url: String,
}

impl NominatimClient {
    pub fn new(http_client: Client, base_url: impl Into<String>) -> Self {
        Self {
            http_client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }
}

impl LocationResolver for NominatimClient {
    async fn reverse_geocode(&self, at: Coordinate) -> Result<Address> {
        let url = format!("{}/reverse", self.base_url);
        debug!("Reverse geocoding ({}, {})", at.latitude, at.longitude);

        let response: ReverseResponse = self
            .http_client
            .get(&url)
            .query(&[
                ("format", "json".to_string()),
                ("lat", at.latitude.to_string()),
                ("lon", at.longitude.to_string()),
            ])
            .send()
            .await
            .context("Reverse geocoding request failed")?
            .error_for_status()?
            .json()
            .await
            .context("Failed to parse reverse geocoding response")?;

        if let Some(ref error) = response.error {
            debug!("Nominatim reported: {}", error);
        }

        Ok(response.into_address())
    }

    async fn forward_geocode(&self, query: &str) -> Result<Option<Coordinate>> {
        let url = format!("{}/search", self.base_url);
        debug!("Searching for {:?}", query);

        let hits: Vec<SearchHit> = self
            .http_client
            .get(&url)
            .query(&[("q", query), ("format", "json"), ("limit", "1")])
            .send()
            .await
            .context("Search request failed")?
            .error_for_status()?
            .json()
            .await
            .context("Failed to parse search response")?;

        let Some(hit) = hits.first() else {
            return Ok(None);
        };

        let at = hit.coordinate().with_context(|| {
            format!("Search hit has invalid coordinates: {}, {}", hit.lat, hit.lon)
        })?;
        Ok(Some(at))
    }
}
