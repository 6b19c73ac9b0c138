use std::env;

use anyhow::{Context, Result};
use reqwest::Client;
use tracing::warn;

use crate::countries::{RESTCOUNTRIES_URL, RestCountriesClient};
use crate::geocoder::{NOMINATIM_URL, NominatimClient};
use crate::narrator::{DEFAULT_MODEL, OPENAI_URL, OpenAiNarrator};
use crate::session::{CommitPolicy, LookupSession};

/// Session wired to the live Nominatim, REST Countries and OpenAI services
pub type LiveSession = LookupSession<NominatimClient, RestCountriesClient, OpenAiNarrator>;

/// Configuration for the upstream service clients
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub nominatim_url: String,
    pub countries_url: String,
    pub openai_url: String,
    /// Bearer credential for the completion API; narration fails without it
    pub openai_api_key: Option<String>,
    pub model: String,
    /// Nominatim rejects requests without an identifying User-Agent
    pub user_agent: String,
    /// Proxy URL applied to all outbound requests
    pub proxy: Option<String>,
    pub commit_policy: CommitPolicy,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            nominatim_url: NOMINATIM_URL.to_string(),
            countries_url: RESTCOUNTRIES_URL.to_string(),
            openai_url: OPENAI_URL.to_string(),
            openai_api_key: None,
            model: DEFAULT_MODEL.to_string(),
            user_agent: format!("geofact/{}", env!("CARGO_PKG_VERSION")),
            proxy: None,
            commit_policy: CommitPolicy::default(),
        }
    }
}

impl ClientConfig {
    /// Read overrides from the environment, falling back to defaults
    pub fn from_env() -> Self {
        let defaults = Self::default();
        let var = |name: &str| env::var(name).ok().filter(|v| !v.trim().is_empty());

        let commit_policy = match var("GEOFACT_COMMIT_POLICY") {
            Some(value) => CommitPolicy::parse(&value).unwrap_or_else(|| {
                warn!(
                    "Unknown GEOFACT_COMMIT_POLICY '{}', using {:?}",
                    value, defaults.commit_policy
                );
                defaults.commit_policy
            }),
            None => defaults.commit_policy,
        };

        Self {
            nominatim_url: var("NOMINATIM_URL").unwrap_or(defaults.nominatim_url),
            countries_url: var("RESTCOUNTRIES_URL").unwrap_or(defaults.countries_url),
            openai_url: var("OPENAI_BASE_URL").unwrap_or(defaults.openai_url),
            openai_api_key: var("OPENAI_API_KEY"),
            model: var("OPENAI_MODEL").unwrap_or(defaults.model),
            user_agent: var("GEOFACT_USER_AGENT").unwrap_or(defaults.user_agent),
            proxy: var("GEOFACT_PROXY"),
            commit_policy,
        }
    }

    pub fn http_client(&self) -> Result<Client> {
        let mut builder = Client::builder().user_agent(&self.user_agent);

        if let Some(ref proxy) = self.proxy {
            builder = builder.proxy(
                reqwest::Proxy::all(proxy).with_context(|| format!("Invalid proxy '{}'", proxy))?,
            );
        }

        builder.build().context("Failed to build HTTP client")
    }
}

/// Build a session over the live services described by `config`
pub fn connect(config: &ClientConfig) -> Result<LiveSession> {
    let http_client = config.http_client()?;

    if config.openai_api_key.is_none() {
        warn!("OPENAI_API_KEY is not set; facts will show N/A");
    }

    Ok(LookupSession::new(
        NominatimClient::new(http_client.clone(), &config.nominatim_url),
        RestCountriesClient::new(http_client.clone(), &config.countries_url),
        OpenAiNarrator::new(
            http_client,
            &config.openai_url,
            config.openai_api_key.clone(),
            &config.model,
        ),
        config.commit_policy,
    ))
}
