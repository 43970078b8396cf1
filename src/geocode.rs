//! Address lookup through Nominatim (OpenStreetMap).

use once_cell::sync::Lazy;
use regex::Regex;
use reqwest::{Client, StatusCode, header};
use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, info};

use crate::catalog::to_finite;
use crate::geo::Coordinate;

pub const NOMINATIM_URL: &str = "https://nominatim.openstreetmap.org/search";
const ACCEPT_LANGUAGE: &str = "el-GR,el;q=0.9,en;q=0.8";

#[derive(Debug, Clone, PartialEq)]
pub struct GeocodeResult {
    pub lat: f64,
    pub lng: f64,
    pub label: String,
    /// Suburb or the closest wider area Nominatim reports.
    pub area: Option<String>,
    pub suburb: Option<String>,
    pub neighbourhood: Option<String>,
}

impl GeocodeResult {
    pub fn coordinate(&self) -> Coordinate {
        Coordinate::new(self.lat, self.lng)
    }
}

#[derive(Error, Debug)]
pub enum GeocodeError {
    #[error("no match for the address")]
    NotFound,

    #[error("geocoding service answered {0}")]
    Service(StatusCode),

    #[error("malformed geocoding response: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("geocoding request failed: {0}")]
    Transport(#[from] reqwest::Error),
}

impl GeocodeError {
    /// Only network failures are worth another attempt.
    pub fn is_retryable(&self) -> bool {
        matches!(self, GeocodeError::Transport(_))
    }
}

/// Resolves free-text addresses to coordinates.
#[async_trait::async_trait]
pub trait Geocoder {
    async fn geocode(&self, client: &Client, query: &str) -> Result<GeocodeResult, GeocodeError>;
}

pub struct NominatimGeocoder {
    url: String,
    country_codes: String,
    user_agent: String,
}

impl NominatimGeocoder {
    pub fn new(url: String, user_agent: String) -> Self {
        Self {
            url,
            country_codes: "GR".to_string(),
            user_agent,
        }
    }

    pub fn with_country_codes(mut self, country_codes: impl Into<String>) -> Self {
        self.country_codes = country_codes.into();
        self
    }
}

#[async_trait::async_trait]
impl Geocoder for NominatimGeocoder {
    async fn geocode(&self, client: &Client, query: &str) -> Result<GeocodeResult, GeocodeError> {
        let resp = client
            .get(&self.url)
            .header(header::USER_AGENT, &self.user_agent)
            .header(header::ACCEPT, "application/json")
            .header(header::ACCEPT_LANGUAGE, ACCEPT_LANGUAGE)
            .query(&[
                ("format", "jsonv2"),
                ("limit", "1"),
                ("addressdetails", "1"),
                ("countrycodes", self.country_codes.as_str()),
                ("q", query),
            ])
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            return Err(GeocodeError::Service(status));
        }

        let body = resp.text().await?;
        let result = parse_response(&body);
        match &result {
            Ok(r) => info!(query, lat = r.lat, lng = r.lng, "geocoded address"),
            Err(e) => debug!(query, error = %e, "geocoding gave no result"),
        }
        result
    }
}

#[derive(Debug, Deserialize)]
struct Place {
    #[serde(default)]
    lat: Option<serde_json::Value>,
    #[serde(default)]
    lon: Option<serde_json::Value>,
    #[serde(default)]
    display_name: String,
    #[serde(default)]
    address: Option<PlaceAddress>,
}

#[derive(Debug, Default, Deserialize)]
struct PlaceAddress {
    suburb: Option<String>,
    neighbourhood: Option<String>,
    city_district: Option<String>,
    town: Option<String>,
    city: Option<String>,
}

impl PlaceAddress {
    fn area(&self) -> Option<String> {
        [
            &self.suburb,
            &self.neighbourhood,
            &self.city_district,
            &self.town,
            &self.city,
        ]
        .into_iter()
        .find_map(|part| part.clone())
    }
}

/// Reads the first place of a Nominatim search response.
pub fn parse_response(body: &str) -> Result<GeocodeResult, GeocodeError> {
    let places: Vec<Place> = serde_json::from_str(body)?;
    let place = places.into_iter().next().ok_or(GeocodeError::NotFound)?;

    let (Some(lat), Some(lng)) = (to_finite(place.lat.as_ref()), to_finite(place.lon.as_ref()))
    else {
        return Err(GeocodeError::NotFound);
    };

    let address = place.address.unwrap_or_default();
    Ok(GeocodeResult {
        lat,
        lng,
        label: place.display_name,
        area: address.area(),
        suburb: address.suburb,
        neighbourhood: address.neighbourhood,
    })
}

static PARENTHESES_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\([^)]*\)").expect("parentheses pattern compiles"));

static STREET_WORD_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)(?:^|\s)(?:Λεωφόρος|Λεωφ\.?|Λ\.|Οδός|Οδ\.?|Δρόμος|Δρ\.)(?:\s|$)")
        .expect("street word pattern compiles")
});

static SEPARATOR_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\s*&\s*|\s+και\s+|\s+-\s+").expect("separator pattern compiles"));

/// Reduces a cinema address to a query Nominatim can match:
/// `"Λεωφ. Συγγρού 106 & Φραντζή (Νέος Κόσμος)"` becomes `"Συγγρού 106"`.
pub fn clean_address(address: &str) -> String {
    let without_notes = PARENTHESES_RE.replace_all(address, " ");
    let without_words = STREET_WORD_RE.replace_all(&without_notes, " ");
    let first = SEPARATOR_RE
        .split(&without_words)
        .next()
        .unwrap_or_default();
    first.split_whitespace().collect::<Vec<_>>().join(" ")
}
