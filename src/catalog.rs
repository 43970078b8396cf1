//! Normalized movie / cinema / showtime catalog.
//!
//! The catalog mirrors the two published documents: `movies.json`, a list of
//! single-element lists holding one movie record each, and `cinemas.json`, a
//! list of cinema groups indexed in parallel with the movies.

use std::collections::BTreeSet;
use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info};

use crate::error::Result;
use crate::geo::Coordinate;

pub const MOVIES_FILE: &str = "movies.json";
pub const CINEMAS_FILE: &str = "cinemas.json";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Movie {
    #[serde(default)]
    pub greek_title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub original_title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub athinorama_link: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub imdb_link: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub slug: Option<String>,
}

impl Movie {
    /// Greek title, followed by the original title in parentheses when one is known.
    pub fn display_title(&self) -> String {
        match non_blank(self.original_title.as_deref()) {
            Some(original) => format!("{} ({})", self.greek_title, original),
            None => self.greek_title.clone(),
        }
    }

    pub fn share_url(&self, origin: &str) -> String {
        if let Some(slug) = non_blank(self.slug.as_deref()) {
            format!("{}/movie/{}/index.html", origin.trim_end_matches('/'), slug)
        } else if let Some(link) = non_blank(self.athinorama_link.as_deref()) {
            link.to_string()
        } else {
            origin.to_string()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Room {
    pub room: String,
}

/// One cinema screening one movie, with its raw timetable.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(from = "RawCinemaShowing")]
pub struct CinemaShowing {
    pub cinema: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub region: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subregion: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub neighbourhood: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub website: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lat: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lng: Option<f64>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub rooms: Vec<Room>,
    /// One sub-list per source day or batch.
    pub timetable: Vec<Vec<String>>,
}

impl CinemaShowing {
    /// Both coordinates, when the record carries a valid pair.
    pub fn coordinate(&self) -> Option<Coordinate> {
        match (self.lat, self.lng) {
            (Some(lat), Some(lng)) => Some(Coordinate::new(lat, lng)),
            _ => None,
        }
    }

    pub fn flat_showtimes(&self) -> impl Iterator<Item = &str> {
        self.timetable.iter().flatten().map(String::as_str)
    }

    /// True when at least one non-blank showtime string is left.
    pub fn has_showtimes(&self) -> bool {
        self.flat_showtimes().any(|s| !s.trim().is_empty())
    }
}

#[derive(Deserialize)]
struct RawCinemaShowing {
    #[serde(default)]
    cinema: Option<String>,
    #[serde(default)]
    address: Option<String>,
    #[serde(default)]
    region: Option<String>,
    #[serde(default)]
    subregion: Option<String>,
    #[serde(default)]
    neighbourhood: Option<String>,
    #[serde(default)]
    website: Option<String>,
    #[serde(default)]
    lat: Option<Value>,
    #[serde(default)]
    lng: Option<Value>,
    #[serde(default)]
    lon: Option<Value>,
    #[serde(default)]
    rooms: Option<Vec<Room>>,
    #[serde(default)]
    timetable: Option<Vec<Vec<String>>>,
}

impl From<RawCinemaShowing> for CinemaShowing {
    fn from(raw: RawCinemaShowing) -> Self {
        // `lng` wins over `lon` whenever it is present at all.
        let lng = match raw.lng {
            Some(v) if !v.is_null() => Some(v),
            _ => raw.lon,
        };

        CinemaShowing {
            cinema: raw.cinema.unwrap_or_default(),
            address: raw.address,
            region: raw.region,
            subregion: raw.subregion,
            neighbourhood: raw.neighbourhood,
            website: raw.website,
            lat: to_finite(raw.lat.as_ref()),
            lng: to_finite(lng.as_ref()),
            rooms: raw.rooms.unwrap_or_default(),
            timetable: raw.timetable.unwrap_or_default(),
        }
    }
}

/// Coerces a JSON number or numeric string to a finite `f64`.
pub fn to_finite(value: Option<&Value>) -> Option<f64> {
    let n = match value? {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }?;
    n.is_finite().then_some(n)
}

fn non_blank(s: Option<&str>) -> Option<&str> {
    s.map(str::trim).filter(|s| !s.is_empty())
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Catalog {
    movies: Vec<Option<Movie>>,
    showings: Vec<Vec<CinemaShowing>>,
}

impl Catalog {
    /// Builds a catalog, aligning the cinema groups with the movie slots.
    pub fn new(movies: Vec<Option<Movie>>, mut showings: Vec<Vec<CinemaShowing>>) -> Self {
        if showings.len() != movies.len() {
            debug!(
                movies = movies.len(),
                groups = showings.len(),
                "cinema groups not aligned with movies"
            );
        }
        showings.resize_with(movies.len(), Vec::new);
        Self { movies, showings }
    }

    pub fn from_json(movies_json: &str, cinemas_json: &str) -> Result<Self> {
        let wrapped: Vec<Vec<Movie>> = serde_json::from_str(movies_json)?;
        let showings: Vec<Vec<CinemaShowing>> = serde_json::from_str(cinemas_json)?;
        let movies = wrapped.into_iter().map(|w| w.into_iter().next()).collect();

        let catalog = Self::new(movies, showings);
        info!(
            movies = catalog.len(),
            showings = catalog.all_showings().count(),
            "catalog loaded"
        );
        Ok(catalog)
    }

    /// Loads `movies.json` and `cinemas.json` from `dir`.
    pub fn from_files(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref();
        let movies = std::fs::read_to_string(dir.join(MOVIES_FILE))?;
        let cinemas = std::fs::read_to_string(dir.join(CINEMAS_FILE))?;
        Self::from_json(&movies, &cinemas)
    }

    /// Serializes back into the published `(movies.json, cinemas.json)` pair.
    pub fn to_json(&self) -> Result<(String, String)> {
        let wrapped: Vec<Vec<&Movie>> = self
            .movies
            .iter()
            .map(|m| m.iter().collect())
            .collect();
        Ok((
            serde_json::to_string_pretty(&wrapped)?,
            serde_json::to_string_pretty(&self.showings)?,
        ))
    }

    pub fn len(&self) -> usize {
        self.movies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.movies.is_empty()
    }

    pub fn movie(&self, index: usize) -> Option<&Movie> {
        self.movies.get(index).and_then(Option::as_ref)
    }

    pub fn movies(&self) -> impl Iterator<Item = (usize, &Movie)> {
        self.movies
            .iter()
            .enumerate()
            .filter_map(|(i, m)| m.as_ref().map(|m| (i, m)))
    }

    /// Cinema groups, indexed in parallel with the movie slots.
    pub fn showings(&self) -> &[Vec<CinemaShowing>] {
        &self.showings
    }

    pub fn all_showings(&self) -> impl Iterator<Item = &CinemaShowing> {
        self.showings.iter().flatten()
    }

    pub fn regions(&self) -> Vec<String> {
        self.all_showings()
            .filter_map(|c| non_blank(c.region.as_deref()))
            .map(str::to_string)
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    pub fn cinema_names(&self) -> Vec<String> {
        self.all_showings()
            .filter_map(|c| non_blank(Some(c.cinema.as_str())))
            .map(str::to_string)
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    /// Movie indices whose display title contains `query`, case-insensitively.
    pub fn search_movies(&self, query: &str) -> Vec<usize> {
        let q = query.trim().to_lowercase();
        self.movies()
            .filter(|(_, m)| m.display_title().to_lowercase().contains(&q))
            .map(|(i, _)| i)
            .collect()
    }

    pub fn search_cinemas(&self, query: &str) -> Vec<String> {
        let q = query.trim().to_lowercase();
        self.cinema_names()
            .into_iter()
            .filter(|name| name.to_lowercase().contains(&q))
            .collect()
    }
}
