//! Proximity matching of cinemas around a reference point.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::catalog::{Catalog, CinemaShowing};

/// Mean Earth radius used by the spherical approximation.
pub const EARTH_RADIUS_KM: f64 = 6371.0;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinate {
    pub lat: f64,
    pub lng: f64,
}

impl Coordinate {
    pub fn new(lat: f64, lng: f64) -> Self {
        Self { lat, lng }
    }
}

impl std::str::FromStr for Coordinate {
    type Err = String;

    /// Parses `"lat,lng"`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (lat, lng) = s
            .split_once(',')
            .ok_or_else(|| format!("expected LAT,LNG, got {s:?}"))?;
        let lat: f64 = lat.trim().parse().map_err(|e| format!("bad latitude: {e}"))?;
        let lng: f64 = lng.trim().parse().map_err(|e| format!("bad longitude: {e}"))?;
        if !lat.is_finite() || !lng.is_finite() {
            return Err(format!("non-finite coordinate {s:?}"));
        }
        Ok(Self::new(lat, lng))
    }
}

/// Great-circle distance in kilometres (haversine).
pub fn haversine_km(a: Coordinate, b: Coordinate) -> f64 {
    let d_lat = (b.lat - a.lat).to_radians();
    let d_lng = (b.lng - a.lng).to_radians();
    let h = (d_lat / 2.0).sin().powi(2)
        + a.lat.to_radians().cos() * b.lat.to_radians().cos() * (d_lng / 2.0).sin().powi(2);
    EARTH_RADIUS_KM * 2.0 * h.sqrt().atan2((1.0 - h).sqrt())
}

/// One entry per unique cinema name.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CinemaLocation {
    pub name: String,
    pub address: Option<String>,
    pub region: Option<String>,
    pub coordinate: Option<Coordinate>,
}

impl From<&CinemaShowing> for CinemaLocation {
    fn from(c: &CinemaShowing) -> Self {
        Self {
            name: c.cinema.clone(),
            address: c.address.clone(),
            region: c.region.clone(),
            coordinate: c.coordinate(),
        }
    }
}

/// Deduplicates the catalog's cinema records by name, in order of first appearance.
///
/// A name keeps the first valid coordinate pair seen for it. A later duplicate
/// replaces the entry only when the entry has no coordinates yet and the
/// duplicate does.
pub fn unique_locations(catalog: &Catalog) -> Vec<CinemaLocation> {
    let mut locations: Vec<CinemaLocation> = Vec::new();
    let mut by_name: HashMap<&str, usize> = HashMap::new();

    for showing in catalog.all_showings() {
        if showing.cinema.is_empty() {
            continue;
        }
        match by_name.get(showing.cinema.as_str()) {
            None => {
                by_name.insert(showing.cinema.as_str(), locations.len());
                locations.push(showing.into());
            }
            Some(&i) => {
                if locations[i].coordinate.is_none() && showing.coordinate().is_some() {
                    locations[i] = showing.into();
                }
            }
        }
    }

    locations
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NearbyCinema {
    pub name: String,
    pub distance_km: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct NearbySearch {
    /// Sorted by distance, then name.
    pub nearby: Vec<NearbyCinema>,
    pub without_coordinates: usize,
}

impl NearbySearch {
    /// `"A (2.4km) • B (3.0km)"` for the `n` closest cinemas.
    pub fn closest_label(&self, n: usize) -> String {
        self.nearby
            .iter()
            .take(n)
            .map(|c| format!("{} ({:.1}km)", c.name, c.distance_km))
            .collect::<Vec<_>>()
            .join(" • ")
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.nearby.iter().map(|c| c.name.as_str())
    }
}

/// Cinemas within `radius_km` (inclusive) of `origin`, closest first.
pub fn find_nearby(catalog: &Catalog, origin: Coordinate, radius_km: f64) -> NearbySearch {
    let mut search = NearbySearch::default();

    for location in unique_locations(catalog) {
        let Some(coordinate) = location.coordinate else {
            search.without_coordinates += 1;
            continue;
        };
        let distance_km = haversine_km(origin, coordinate);
        if distance_km.is_finite() && distance_km <= radius_km {
            search.nearby.push(NearbyCinema {
                name: location.name,
                distance_km,
            });
        }
    }

    search.nearby.sort_by(|a, b| {
        a.distance_km
            .total_cmp(&b.distance_km)
            .then_with(|| a.name.cmp(&b.name))
    });
    search
}
