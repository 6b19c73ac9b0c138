use std::future::Future;

use anyhow::{Context, Result};
use reqwest::Client;
use tracing::debug;

use crate::types::{CountryInfo, CountryRecord};

pub const RESTCOUNTRIES_URL: &str = "https://restcountries.com/v3.1";

/// Looks up country metadata by ISO alpha-2 code
pub trait CountryEnricher: Send + Sync {
    fn enrich(&self, country_code: &str) -> impl Future<Output = Result<CountryInfo>> + Send;
}

#[derive(Debug, Clone)]
pub struct RestCountriesClient {
    http_client: Client,
    base_url: String,
}

impl RestCountriesClient {
    pub fn new(http_client: Client, base_url: impl Into<String>) -> Self {
        Self {
            http_client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    fn alpha_url(&self, country_code: &str) -> String {
        format!("{}/alpha/{}", self.base_url, country_code.to_uppercase())
    }
}

impl CountryEnricher for RestCountriesClient {
    async fn enrich(&self, country_code: &str) -> Result<CountryInfo> {
        let url = self.alpha_url(country_code);
        debug!("Fetching country data from {}", url);

        let records: Vec<CountryRecord> = self
            .http_client
            .get(&url)
            .send()
            .await
            .context("Country data request failed")?
            .error_for_status()?
            .json()
            .await
            .context("Failed to parse country data")?;

        // Ambiguous codes can match several countries; the first one wins.
        let record = records
            .first()
            .with_context(|| format!("No country data for code {}", country_code))?;

        Ok(CountryInfo::from_record(record))
    }
}
