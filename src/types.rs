use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Literal shown in place of any absent or unresolved field
pub const SENTINEL: &str = "N/A";

/// Ordered Nominatim keys per logical address field. The first key holding a
/// non-empty string wins.
pub mod address_keys {
    pub const COUNTRY: &[&str] = &["country"];
    pub const CITY: &[&str] = &["city", "town", "village"];
    pub const REGION: &[&str] = &["state", "region"];
    pub const POSTCODE: &[&str] = &["postcode"];
    pub const COUNTRY_CODE: &[&str] = &["country_code"];
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinate {
    pub latitude: f64,
    pub longitude: f64,
}

impl Coordinate {
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
        }
    }
}

/// Structured address produced by reverse geocoding
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Address {
    pub country: Option<String>,
    pub city: Option<String>,
    pub region: Option<String>,
    pub postcode: Option<String>,
    pub country_code: Option<String>,
}

impl Address {
    /// Build from Nominatim's `address` object
    pub fn from_nominatim(fields: &Map<String, Value>) -> Self {
        let pick = |keys: &[&str]| {
            keys.iter().find_map(|key| {
                fields
                    .get(*key)
                    .and_then(Value::as_str)
                    .filter(|s| !s.is_empty())
                    .map(str::to_string)
            })
        };

        Self {
            country: pick(address_keys::COUNTRY),
            city: pick(address_keys::CITY),
            region: pick(address_keys::REGION),
            postcode: pick(address_keys::POSTCODE),
            country_code: pick(address_keys::COUNTRY_CODE),
        }
    }
}

/// Country metadata from the country-data service
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CountryInfo {
    pub population: Option<u64>,
    pub primary_currency_name: Option<String>,
    pub primary_timezone: Option<String>,
    pub flag_image_url: Option<String>,
}

impl CountryInfo {
    pub fn from_record(record: &CountryRecord) -> Self {
        // Upstream map order is kept (serde_json preserve_order), so "first" means
        // first as sent by the service.
        let primary_currency_name = record
            .currencies
            .as_ref()
            .and_then(|currencies| currencies.values().next())
            .and_then(|detail| detail.get("name"))
            .and_then(Value::as_str)
            .map(str::to_string);

        Self {
            population: record.population,
            primary_currency_name,
            primary_timezone: record
                .timezones
                .as_ref()
                .and_then(|zones| zones.first())
                .cloned(),
            flag_image_url: record.flags.as_ref().and_then(|f| f.png.clone()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Fact {
    pub text: String,
}

/// Response from Nominatim's `/reverse` endpoint
#[derive(Debug, Deserialize)]
pub struct ReverseResponse {
    #[serde(default)]
    pub address: Option<Map<String, Value>>,
    #[serde(default)]
    pub error: Option<String>,
}

impl ReverseResponse {
    pub fn into_address(self) -> Address {
        self.address
            .as_ref()
            .map(Address::from_nominatim)
            .unwrap_or_default()
    }
}

/// Single hit from Nominatim's `/search` endpoint
#[derive(Debug, Clone, Deserialize)]
pub struct SearchHit {
    pub lat: String,
    pub lon: String,
}

impl SearchHit {
    pub fn coordinate(&self) -> Option<Coordinate> {
        let latitude = self.lat.trim().parse().ok()?;
        let longitude = self.lon.trim().parse().ok()?;
        Some(Coordinate::new(latitude, longitude))
    }
}

/// Element of the REST Countries `/alpha/{code}` response array
#[derive(Debug, Clone, Deserialize)]
pub struct CountryRecord {
    #[serde(default)]
    pub population: Option<u64>,
    /// Currency code -> {name, symbol}
    #[serde(default)]
    pub currencies: Option<Map<String, Value>>,
    #[serde(default)]
    pub timezones: Option<Vec<String>>,
    #[serde(default)]
    pub flags: Option<FlagImages>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FlagImages {
    pub png: Option<String>,
}

/// Chat-completion request body
#[derive(Debug, Serialize)]
pub struct ChatRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    pub temperature: f32,
    pub max_tokens: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    #[serde(default)]
    pub content: Option<String>,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".to_string(),
            content: Some(content.into()),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: Some(content.into()),
        }
    }
}

/// Chat-completion response body
#[derive(Debug, Deserialize)]
pub struct ChatResponse {
    #[serde(default)]
    pub choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
pub struct ChatChoice {
    pub message: ChatMessage,
}
