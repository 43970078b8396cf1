use std::path::PathBuf;

use chrono::NaiveDateTime;
use clap::{Parser, ValueEnum};

use crate::filter::{FilterSelection, TimeWindow};
use crate::geo::Coordinate;

pub const DEFAULT_RADIUS_KM: f64 = 3.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Mode {
    All,
    Today,
    Next3,
}

impl From<Mode> for TimeWindow {
    fn from(mode: Mode) -> Self {
        match mode {
            Mode::All => TimeWindow::All,
            Mode::Today => TimeWindow::Today,
            Mode::Next3 => TimeWindow::Next3Hours,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
    Rss,
}

#[derive(Debug, Parser)]
#[command(name = "cinema-showtimes")]
#[command(about = "Athens cinema showtimes, filtered by movie, cinema, region, time or distance")]
pub struct Config {
    /// Directory holding movies.json and cinemas.json
    #[arg(long, env = "CINEMA_DATA_DIR", default_value = ".")]
    pub data_dir: PathBuf,

    /// Base URL serving movies.json and cinemas.json (instead of --data-dir)
    #[arg(long, env = "CINEMA_FEED_URL", conflicts_with = "scrape")]
    pub feed_url: Option<String>,

    /// Scrape the Athinorama guide instead of reading published data
    #[arg(long)]
    pub scrape: bool,

    /// Look up cinema addresses while scraping
    #[arg(long, requires = "scrape")]
    pub geocode_cinemas: bool,

    /// Write the loaded catalog as movies.json / cinemas.json into this directory
    #[arg(long)]
    pub save_to: Option<PathBuf>,

    #[arg(long, value_enum, default_value_t = Mode::All)]
    pub mode: Mode,

    /// Movie index to keep (repeatable)
    #[arg(long = "movie")]
    pub movies: Vec<usize>,

    /// Cinema name to keep (repeatable)
    #[arg(long = "cinema")]
    pub cinemas: Vec<String>,

    /// Region to keep (repeatable)
    #[arg(long = "region")]
    pub regions: Vec<String>,

    /// Reference point as LAT,LNG
    #[arg(long, conflicts_with = "address")]
    pub near: Option<Coordinate>,

    /// Address to geocode as the reference point
    #[arg(long, value_parser = parse_address)]
    pub address: Option<String>,

    /// Proximity radius in kilometres
    #[arg(long, default_value_t = DEFAULT_RADIUS_KM)]
    pub radius: f64,

    /// Nominatim search endpoint
    #[arg(long, env = "NOMINATIM_URL", default_value = crate::geocode::NOMINATIM_URL)]
    pub nominatim_url: String,

    /// Reference time, "YYYY-MM-DD HH:MM" (local time by default)
    #[arg(long, value_parser = parse_now)]
    pub now: Option<NaiveDateTime>,

    #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
    pub format: OutputFormat,
}

fn parse_now(s: &str) -> Result<NaiveDateTime, String> {
    NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M")
        .or_else(|_| NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M"))
        .map_err(|e| format!("expected YYYY-MM-DD HH:MM: {e}"))
}

fn parse_address(s: &str) -> Result<String, String> {
    let address = s.trim();
    if address.is_empty() {
        return Err("enter an address to search around".to_string());
    }
    Ok(address.to_string())
}

impl Config {
    /// Reference time for this run.
    pub fn reference_now(&self) -> NaiveDateTime {
        self.now
            .unwrap_or_else(|| chrono::Local::now().naive_local())
    }

    pub fn selection(&self) -> FilterSelection {
        FilterSelection {
            movies: self.movies.iter().copied().collect(),
            cinemas: self.cinemas.iter().cloned().collect(),
            regions: self.regions.iter().cloned().collect(),
            mode: self.mode.into(),
            nearby_only: false,
        }
    }

    pub fn wants_proximity(&self) -> bool {
        self.near.is_some() || self.address.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_arguments_into_selection() {
        let config = Config::try_parse_from([
            "cinema-showtimes",
            "--mode",
            "next3",
            "--movie",
            "2",
            "--cinema",
            "Άστορ",
            "--region",
            "Κέντρο",
            "--near",
            "37.97,23.73",
            "--now",
            "2025-03-10 18:00",
        ])
        .unwrap();

        let selection = config.selection();
        assert_eq!(selection.mode, TimeWindow::Next3Hours);
        assert!(selection.movies.contains(&2));
        assert!(selection.cinemas.contains("Άστορ"));
        assert!(selection.regions.contains("Κέντρο"));
        assert_eq!(config.near, Some(Coordinate::new(37.97, 23.73)));
        assert_eq!(config.radius, DEFAULT_RADIUS_KM);
        assert_eq!(config.reference_now().to_string(), "2025-03-10 18:00:00");
        assert!(config.wants_proximity());
    }

    #[test]
    fn test_near_and_address_conflict() {
        let parsed = Config::try_parse_from([
            "cinema-showtimes",
            "--near",
            "37.97,23.73",
            "--address",
            "Σύνταγμα",
        ]);
        assert!(parsed.is_err());
    }

    #[test]
    fn test_blank_address_is_rejected() {
        for blank in ["", "   "] {
            let parsed = Config::try_parse_from(["cinema-showtimes", "--address", blank]);
            assert!(parsed.is_err(), "{blank:?} accepted");
        }

        let config =
            Config::try_parse_from(["cinema-showtimes", "--address", "  Σύνταγμα "]).unwrap();
        assert_eq!(config.address.as_deref(), Some("Σύνταγμα"));
    }
}
