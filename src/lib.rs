use reqwest::Client;

pub mod athinorama;
pub mod catalog;
pub mod config;
pub mod error;
pub mod feed;
pub mod filter;
pub mod geo;
pub mod geocode;
pub mod json_feed;
pub mod logging;
pub mod showtime;

pub use catalog::{Catalog, CinemaShowing, Movie};
pub use error::{Error, Result};
pub use filter::{FilterSelection, MovieListing, MovieSummary, TimeWindow, select};
pub use geo::{Coordinate, NearbySearch, find_nearby};
pub use showtime::{Confidence, ResolvedShowtime, ShowtimeRecord};

pub const USER_AGENT: &str = concat!("cinema-showtimes/", env!("CARGO_PKG_VERSION"));

/// Trait that every catalog source implements
#[async_trait::async_trait]
pub trait CatalogSource {
    /// Fetch the movie and cinema catalog
    async fn fetch_catalog(&self, client: &Client) -> Result<Catalog>;

    /// Optional: warm-up request to get cookies/auth (default: no-op)
    async fn warm_up(&self, _client: &Client) -> Result<()> {
        Ok(())
    }

    /// Human-readable name, used in logs
    fn source_name(&self) -> String;
}
