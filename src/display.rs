use std::fmt;

use serde::Serialize;

use crate::types::{Address, Coordinate, CountryInfo, Fact, SENTINEL};

/// Stable identifiers of the displayed fields
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldId {
    Country,
    City,
    Region,
    Zipcode,
    Coordinates,
    Population,
    Currency,
    Timezone,
    Flag,
    Fact,
}

impl FieldId {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Country => "country",
            Self::City => "city",
            Self::Region => "region",
            Self::Zipcode => "zipcode",
            Self::Coordinates => "coordinates",
            Self::Population => "population",
            Self::Currency => "currency",
            Self::Timezone => "timezone",
            Self::Flag => "flag",
            Self::Fact => "fact",
        }
    }
}

impl fmt::Display for FieldId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Flag image element: either visible with a source, or hidden
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "state", content = "src", rename_all = "lowercase")]
pub enum Flag {
    Hidden,
    Shown(String),
}

/// Every value currently on screen. Replaced field by field as a lookup
/// progresses; never merged across lookups.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DisplayState {
    pub country: String,
    pub city: String,
    pub region: String,
    pub zipcode: String,
    pub coordinates: String,
    pub population: String,
    pub currency: String,
    pub timezone: String,
    pub flag: Flag,
    pub fact: String,
}

impl Default for DisplayState {
    fn default() -> Self {
        Self {
            country: SENTINEL.to_string(),
            city: SENTINEL.to_string(),
            region: SENTINEL.to_string(),
            zipcode: SENTINEL.to_string(),
            coordinates: SENTINEL.to_string(),
            population: SENTINEL.to_string(),
            currency: SENTINEL.to_string(),
            timezone: SENTINEL.to_string(),
            flag: Flag::Hidden,
            fact: SENTINEL.to_string(),
        }
    }
}

fn or_sentinel(value: Option<&str>) -> String {
    value.unwrap_or(SENTINEL).to_string()
}

impl DisplayState {
    pub fn reset_fact(&mut self) {
        self.fact = SENTINEL.to_string();
    }

    pub fn show_address(&mut self, address: &Address, at: Coordinate) {
        self.country = or_sentinel(address.country.as_deref());
        self.city = or_sentinel(address.city.as_deref());
        self.region = or_sentinel(address.region.as_deref());
        self.zipcode = or_sentinel(address.postcode.as_deref());
        self.coordinates = format_coordinates(at);
    }

    pub fn show_country(&mut self, info: &CountryInfo) {
        self.population = info
            .population
            .filter(|p| *p > 0)
            .map(format_population)
            .unwrap_or_else(|| SENTINEL.to_string());
        self.currency = or_sentinel(info.primary_currency_name.as_deref());
        self.timezone = or_sentinel(info.primary_timezone.as_deref());
        self.flag = match &info.flag_image_url {
            Some(url) => Flag::Shown(url.clone()),
            None => Flag::Hidden,
        };
    }

    /// Country-dependent fields when no country code resolved. The zipcode is
    /// cleared too.
    pub fn clear_country(&mut self) {
        self.population = SENTINEL.to_string();
        self.currency = SENTINEL.to_string();
        self.timezone = SENTINEL.to_string();
        self.zipcode = SENTINEL.to_string();
        self.flag = Flag::Hidden;
    }

    pub fn show_fact(&mut self, fact: Option<Fact>) {
        self.fact = fact
            .map(|f| f.text)
            .unwrap_or_else(|| SENTINEL.to_string());
    }

    /// Render into `(field, value)` pairs. The flag renders as its image
    /// source, or `hidden`.
    pub fn fields(&self) -> Vec<(FieldId, String)> {
        let flag = match &self.flag {
            Flag::Shown(src) => src.clone(),
            Flag::Hidden => "hidden".to_string(),
        };

        vec![
            (FieldId::Country, self.country.clone()),
            (FieldId::City, self.city.clone()),
            (FieldId::Region, self.region.clone()),
            (FieldId::Zipcode, self.zipcode.clone()),
            (FieldId::Coordinates, self.coordinates.clone()),
            (FieldId::Population, self.population.clone()),
            (FieldId::Currency, self.currency.clone()),
            (FieldId::Timezone, self.timezone.clone()),
            (FieldId::Flag, flag),
            (FieldId::Fact, self.fact.clone()),
        ]
    }
}

impl fmt::Display for DisplayState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (id, value) in self.fields() {
            writeln!(f, "  {:<12} {}", format!("{}:", id), value)?;
        }
        Ok(())
    }
}

pub fn format_coordinates(at: Coordinate) -> String {
    format!("Lat: {:.4}, Lng: {:.4}", at.latitude, at.longitude)
}

/// Group digits in thousands with commas (en-US style)
pub fn format_population(population: u64) -> String {
    let digits = population.to_string();
    let mut grouped = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(c);
    }
    grouped
}
