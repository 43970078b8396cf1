use cinema_showtimes::athinorama::{AthinoramaScraper, GUIDE_URL};
use cinema_showtimes::catalog::{CINEMAS_FILE, MOVIES_FILE};
use cinema_showtimes::config::{Config, OutputFormat};
use cinema_showtimes::feed::generate_rss;
use cinema_showtimes::geocode::{Geocoder, NominatimGeocoder};
use cinema_showtimes::json_feed::JsonFeedSource;
use cinema_showtimes::{
    Catalog, CatalogSource, FilterSelection, MovieListing, USER_AGENT, find_nearby, logging, select,
};
use chrono::NaiveDateTime;
use clap::Parser;
use reqwest::Client;
use tracing::{debug, info, warn};

const CHANNEL_TITLE: &str = "Σινεμά Αθήνας – Ταινίες & Προβολές";
const CHANNEL_LINK: &str = "https://www.athinorama.gr/cinema/guide/";
const CHANNEL_DESCRIPTION: &str = "Ταινίες, ώρες προβολών και κινηματογράφοι της Αθήνας.";
const CLOSEST_SHOWN: usize = 3;

type DynSource = Box<dyn CatalogSource + Send + Sync>;

async fn load_catalog(
    config: &Config,
    client: &Client,
) -> Result<Catalog, Box<dyn std::error::Error>> {
    let source: Option<DynSource> = if config.scrape {
        let mut scraper = AthinoramaScraper::new(GUIDE_URL.to_string());
        if config.geocode_cinemas {
            scraper = scraper.with_geocoder(Box::new(NominatimGeocoder::new(
                config.nominatim_url.clone(),
                USER_AGENT.to_string(),
            )));
        }
        Some(Box::new(scraper) as DynSource)
    } else {
        config
            .feed_url
            .as_deref()
            .map(|url| Box::new(JsonFeedSource::from_base_url(url)) as DynSource)
    };

    let catalog = match source {
        Some(source) => {
            info!(source = %source.source_name(), "loading catalog");
            source.warm_up(client).await?;
            source.fetch_catalog(client).await?
        }
        None => Catalog::from_files(&config.data_dir)?,
    };

    if let Some(dir) = &config.save_to {
        let (movies, cinemas) = catalog.to_json()?;
        std::fs::create_dir_all(dir)?;
        std::fs::write(dir.join(MOVIES_FILE), movies)?;
        std::fs::write(dir.join(CINEMAS_FILE), cinemas)?;
        info!(dir = %dir.display(), "catalog saved");
    }

    Ok(catalog)
}

/// Narrows the selection to the cinemas around the requested point.
async fn apply_proximity(
    config: &Config,
    client: &Client,
    catalog: &Catalog,
    selection: FilterSelection,
) -> Result<FilterSelection, Box<dyn std::error::Error>> {
    let (origin, label) = match (&config.near, &config.address) {
        (Some(near), _) => (*near, format!("{:.4},{:.4}", near.lat, near.lng)),
        (None, Some(address)) => {
            let geocoder =
                NominatimGeocoder::new(config.nominatim_url.clone(), USER_AGENT.to_string());
            match geocoder.geocode(client, address).await {
                Ok(found) => (found.coordinate(), found.label),
                Err(e) if !e.is_retryable() => {
                    debug!(error = %e, "address not resolved");
                    eprintln!("❌ Δεν βρέθηκε η διεύθυνση. Δοκίμασε πιο συγκεκριμένα.");
                    return Ok(selection);
                }
                Err(e) => {
                    warn!(error = %e, "address lookup failed");
                    return Err(e.into());
                }
            }
        }
        (None, None) => return Ok(selection),
    };

    let search = find_nearby(catalog, origin, config.radius);
    if search.nearby.is_empty() {
        eprintln!(
            "ℹ️ Δεν βρέθηκαν σινεμά σε ακτίνα {}km από: {} (Χωρίς συντεταγμένες: {})",
            config.radius, label, search.without_coordinates
        );
    } else {
        eprintln!(
            "✅ Βρέθηκαν {} σινεμά σε ακτίνα {}km από: {}. Κοντινότερα: {}",
            search.nearby.len(),
            config.radius,
            label,
            search.closest_label(CLOSEST_SHOWN)
        );
    }
    Ok(selection.with_nearby(&search))
}

fn print_text(listings: &[MovieListing], now: NaiveDateTime) {
    if listings.is_empty() {
        println!("Δεν υπάρχουν διαθέσιμες προβολές.");
        return;
    }

    for listing in listings {
        println!("TITLE       : {}", listing.movie.display_title());
        let summary = &listing.summary;
        if let (Some(next), Some(cinemas)) = (&summary.next_showtime, &summary.cinema_names) {
            println!("NEXT        : {} - {}", next, cinemas);
        }
        for cinema in &listing.cinemas {
            let showing = &cinema.showing;
            println!("  CINEMA    : {}", showing.cinema);
            if let Some(address) = &showing.address {
                println!("  ADDRESS   : {}", address);
            }
            if let Some(region) = &showing.region {
                println!("  REGION    : {}", region);
            }
            let times: Vec<String> = cinema.showtimes.iter().map(|s| s.label(now)).collect();
            println!("  SHOWTIMES : {}", times.join(" • "));
        }
        println!();
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    logging::init_logging();
    let config = Config::parse();
    let now = config.reference_now();

    // Cookie store so the scraper's warm-up session carries over.
    let client = Client::builder().cookie_store(true).build()?;

    let catalog = load_catalog(&config, &client).await?;

    let mut selection = config.selection();
    if config.wants_proximity() {
        selection = apply_proximity(&config, &client, &catalog, selection).await?;
    }

    let listings = select(&catalog, &selection, now);
    info!(movies = listings.len(), mode = ?selection.mode, "filtered view ready");

    match config.format {
        OutputFormat::Text => print_text(&listings, now),
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&listings)?),
        OutputFormat::Rss => println!(
            "{}",
            generate_rss(&listings, now, CHANNEL_TITLE, CHANNEL_LINK, CHANNEL_DESCRIPTION)?
        ),
    }

    Ok(())
}
