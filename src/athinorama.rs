//! Scraper for the Athinorama cinema guide.
//! Guide: https://www.athinorama.gr/cinema/guide/
//! Each movie page lists the cinemas screening it, one `card-item` block per
//! cinema, with a `panel-inner` per day holding `daytimeschedule` entries.

use std::collections::{HashMap, HashSet};

use reqwest::{Client, header};
use scraper::{ElementRef, Html, Selector};
use tracing::{info, warn};
use unicode_normalization::UnicodeNormalization;

use crate::catalog::{Catalog, CinemaShowing, Movie, Room};
use crate::error::{Error, Result};
use crate::geocode::{GeocodeResult, Geocoder, clean_address};
use crate::{CatalogSource, USER_AGENT};

pub const BASE: &str = "https://www.athinorama.gr";
pub const GUIDE_URL: &str = "https://www.athinorama.gr/cinema/guide/";

const DEFAULT_ROOM: &str = "Main Room";

fn selector(css: &str) -> Result<Selector> {
    Selector::parse(css).map_err(|e| Error::Selector(format!("{css}: {e}")))
}

/// Trimmed text fragments of `el`, joined with `sep`.
fn element_text(el: ElementRef<'_>, sep: &str) -> String {
    el.text()
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .collect::<Vec<_>>()
        .join(sep)
}

fn absolute_url(href: &str) -> String {
    if href.starts_with("http") {
        href.to_string()
    } else if href.starts_with('/') {
        format!("{}{}", BASE, href)
    } else {
        format!("{}/{}", BASE, href)
    }
}

/// Cache key for a cinema name or address: NFKC, zero-width spaces dropped,
/// no-break spaces as plain spaces, trimmed and lowercased.
fn lookup_key(text: &str) -> String {
    text.nfkc()
        .filter(|c| *c != '\u{200b}')
        .map(|c| if c == '\u{a0}' { ' ' } else { c })
        .collect::<String>()
        .trim()
        .to_lowercase()
}

/// Movie page links of the guide, absolute and de-duplicated in page order.
pub fn extract_movie_links(html: &str) -> Result<Vec<String>> {
    let document = Html::parse_document(html);
    let link_selector = selector("div.item.horizontal.card-item h2.item-title a[href]")?;

    let mut seen = HashSet::new();
    let mut links = Vec::new();
    for a in document.select(&link_selector) {
        let Some(href) = a.value().attr("href").map(str::trim) else {
            continue;
        };
        if href.is_empty() {
            continue;
        }
        let url = absolute_url(href);
        if seen.insert(url.clone()) {
            links.push(url);
        }
    }
    Ok(links)
}

/// Movie record and its cinema showings from one movie page.
pub fn parse_movie_page(html: &str, url: &str) -> Result<(Movie, Vec<CinemaShowing>)> {
    let document = Html::parse_document(html);

    let greek_title = document
        .select(&selector("h1")?)
        .next()
        .map(|h1| element_text(h1, " "))
        .filter(|t| !t.is_empty())
        .unwrap_or_else(|| "Unknown Title".to_string());

    let original_title = document
        .select(&selector("ul.review-details span.original-title")?)
        .map(|span| element_text(span, " "))
        .find(|t| !t.is_empty());

    let imdb_link = document
        .select(&selector("a.imdb")?)
        .next()
        .and_then(|a| a.value().attr("href"))
        .map(str::to_string);

    let movie = Movie {
        greek_title,
        original_title,
        athinorama_link: Some(url.to_string()),
        imdb_link,
        slug: None,
    };

    let block_selector = selector("div.item.card-item")?;
    let name_selector = selector("h2.item-title")?;
    let details_selector = selector("div.details")?;
    let room_selector = selector("div.grid.schedule-grid")?;
    let span_selector = selector("span")?;
    let panel_selector = selector("div.panel-inner")?;
    let schedule_selector = selector(".daytimeschedule")?;

    let mut showings = Vec::new();
    for block in document.select(&block_selector) {
        let Some(cinema) = block
            .select(&name_selector)
            .next()
            .map(|h2| element_text(h2, " "))
            .filter(|n| !n.is_empty())
        else {
            continue;
        };

        let address = block
            .select(&details_selector)
            .next()
            .map(|d| element_text(d, " "))
            .filter(|a| !a.is_empty());

        let rooms = block
            .select(&room_selector)
            .map(|grid| Room {
                room: grid
                    .select(&span_selector)
                    .next()
                    .map(|s| element_text(s, " "))
                    .unwrap_or_else(|| DEFAULT_ROOM.to_string()),
            })
            .collect();

        let timetable = block
            .select(&panel_selector)
            .map(|panel| {
                panel
                    .select(&schedule_selector)
                    .map(|s| element_text(s, " "))
                    .filter(|t| !t.is_empty())
                    .collect::<Vec<_>>()
            })
            .filter(|times| !times.is_empty())
            .collect();

        showings.push(CinemaShowing {
            cinema,
            address,
            rooms,
            timetable,
            ..CinemaShowing::default()
        });
    }

    Ok((movie, showings))
}

/// Scraper for the Athinorama guide; coordinates come from an optional geocoder.
pub struct AthinoramaScraper {
    guide_url: String,
    geocoder: Option<Box<dyn Geocoder + Send + Sync>>,
}

impl AthinoramaScraper {
    pub fn new(guide_url: String) -> Self {
        Self {
            guide_url,
            geocoder: None,
        }
    }

    pub fn with_geocoder(mut self, geocoder: Box<dyn Geocoder + Send + Sync>) -> Self {
        self.geocoder = Some(geocoder);
        self
    }

    async fn fetch_page(client: &Client, url: &str) -> Result<String> {
        let resp = client
            .get(url)
            .header(header::USER_AGENT, USER_AGENT)
            .send()
            .await?
            .error_for_status()?;
        Ok(resp.text().await?)
    }

    /// Fills coordinates and the region fields, looking up each normalized
    /// (name, address) once.
    async fn locate(
        &self,
        client: &Client,
        showings: &mut [CinemaShowing],
        cache: &mut HashMap<(String, String), Option<GeocodeResult>>,
    ) {
        let Some(geocoder) = &self.geocoder else {
            return;
        };
        for showing in showings.iter_mut() {
            let address = showing.address.clone().unwrap_or_default();
            let key = (lookup_key(&showing.cinema), lookup_key(&address));
            if !cache.contains_key(&key) {
                let mut query = clean_address(&address);
                if query.is_empty() {
                    query = showing.cinema.clone();
                }
                let found = match geocoder.geocode(client, &query).await {
                    Ok(r) => Some(r),
                    Err(e) => {
                        warn!(
                            cinema = %showing.cinema,
                            query = %query,
                            error = %e,
                            "cinema location unknown"
                        );
                        None
                    }
                };
                cache.insert(key.clone(), found);
            }
            if let Some(Some(found)) = cache.get(&key) {
                showing.lat = Some(found.lat);
                showing.lng = Some(found.lng);
                showing.region = found.area.clone();
                showing.subregion = found.suburb.clone();
                showing.neighbourhood = found.neighbourhood.clone();
            }
        }
    }
}

#[async_trait::async_trait]
impl CatalogSource for AthinoramaScraper {
    async fn fetch_catalog(&self, client: &Client) -> Result<Catalog> {
        let body = Self::fetch_page(client, &self.guide_url).await?;
        let links = extract_movie_links(&body)?;
        info!(count = links.len(), "movie links in guide");

        let mut movies = Vec::new();
        let mut groups = Vec::new();
        let mut locations = HashMap::new();

        for url in links {
            let body = match Self::fetch_page(client, &url).await {
                Ok(b) => b,
                Err(e) => {
                    warn!(url = %url, error = %e, "skipping movie page");
                    continue;
                }
            };
            let (movie, mut showings) = match parse_movie_page(&body, &url) {
                Ok(parsed) => parsed,
                Err(e) => {
                    warn!(url = %url, error = %e, "could not parse movie page");
                    continue;
                }
            };
            self.locate(client, &mut showings, &mut locations).await;
            info!(title = %movie.greek_title, cinemas = showings.len(), "scraped movie");

            movies.push(Some(movie));
            groups.push(showings);
        }

        Ok(Catalog::new(movies, groups))
    }

    async fn warm_up(&self, client: &Client) -> Result<()> {
        // Session cookies from the home page.
        Self::fetch_page(client, BASE).await?;
        Ok(())
    }

    fn source_name(&self) -> String {
        format!("athinorama ({})", self.guide_url)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geocode::GeocodeError;
    use wiremock::{Mock, MockServer, ResponseTemplate, matchers};

    const GUIDE: &str = r#"
        <div class="item horizontal card-item">
          <h2 class="item-title"><a href="/cinema/movie/i_tainia-10071234/">Η Ταινία</a></h2>
        </div>
        <div class="item horizontal card-item">
          <h2 class="item-title">
            <a href="https://www.athinorama.gr/cinema/movie/alli-10071235/">Άλλη</a>
          </h2>
        </div>
        <div class="item horizontal card-item">
          <h2 class="item-title"><a href="/cinema/movie/i_tainia-10071234/">Η Ταινία</a></h2>
        </div>
        <div class="item card-item"><h2 class="item-title"><a href="/ignored/">x</a></h2></div>
    "#;

    const MOVIE: &str = r#"
        <h1> Η Ταινία </h1>
        <ul class="review-details"><li><span class="original-title">The Movie</span></li></ul>
        <a class="imdb" href="https://www.imdb.com/title/tt0000001/">IMDb</a>
        <div class="item card-item">
          <h2 class="item-title">Άστορ</h2>
          <div class="details">Σταδίου 28 <span>Αθήνα</span></div>
          <div class="grid schedule-grid"><span>Αίθουσα 1</span></div>
          <div class="panel-inner">
            <span class="daytimeschedule">Τρίτη 11 Μαρ 20:00</span>
            <span class="daytimeschedule">Τρίτη 11 Μαρ 22:10</span>
          </div>
          <div class="panel-inner"></div>
          <div class="panel-inner"><span class="daytimeschedule">Τετάρτη 12 Μαρ 21:00</span></div>
        </div>
        <div class="item card-item">
          <div class="details">χωρίς όνομα</div>
        </div>
    "#;

    #[test]
    fn test_extract_movie_links() {
        let links = extract_movie_links(GUIDE).unwrap();
        assert_eq!(
            links,
            vec![
                "https://www.athinorama.gr/cinema/movie/i_tainia-10071234/".to_string(),
                "https://www.athinorama.gr/cinema/movie/alli-10071235/".to_string(),
            ]
        );
    }

    #[test]
    fn test_parse_movie_page() {
        let url = "https://www.athinorama.gr/cinema/movie/i_tainia-10071234/";
        let (movie, showings) = parse_movie_page(MOVIE, url).unwrap();

        assert_eq!(movie.greek_title, "Η Ταινία");
        assert_eq!(movie.original_title.as_deref(), Some("The Movie"));
        assert_eq!(movie.imdb_link.as_deref(), Some("https://www.imdb.com/title/tt0000001/"));
        assert_eq!(movie.athinorama_link.as_deref(), Some(url));

        assert_eq!(showings.len(), 1);
        let astor = &showings[0];
        assert_eq!(astor.cinema, "Άστορ");
        assert_eq!(astor.address.as_deref(), Some("Σταδίου 28 Αθήνα"));
        assert_eq!(astor.rooms, vec![Room { room: "Αίθουσα 1".into() }]);
        assert_eq!(
            astor.timetable,
            vec![
                vec!["Τρίτη 11 Μαρ 20:00".to_string(), "Τρίτη 11 Μαρ 22:10".to_string()],
                vec!["Τετάρτη 12 Μαρ 21:00".to_string()],
            ]
        );
        assert!(astor.coordinate().is_none());
    }

    #[test]
    fn test_page_without_title_gets_placeholder() {
        let (movie, showings) = parse_movie_page("<p>nothing</p>", "u").unwrap();
        assert_eq!(movie.greek_title, "Unknown Title");
        assert!(movie.original_title.is_none());
        assert!(showings.is_empty());
    }

    struct FixedGeocoder;

    #[async_trait::async_trait]
    impl Geocoder for FixedGeocoder {
        async fn geocode(
            &self,
            _client: &Client,
            query: &str,
        ) -> std::result::Result<GeocodeResult, GeocodeError> {
            if query == "Σταδίου 28 Αθήνα" {
                Ok(GeocodeResult {
                    lat: 37.98,
                    lng: 23.73,
                    label: query.to_string(),
                    area: Some("Κέντρο".into()),
                    suburb: Some("Κολωνάκι".into()),
                    neighbourhood: Some("Σύνταγμα".into()),
                })
            } else {
                Err(GeocodeError::NotFound)
            }
        }
    }

    #[tokio::test]
    async fn test_locate_fills_coordinates_and_region() {
        let scraper =
            AthinoramaScraper::new(GUIDE_URL.to_string()).with_geocoder(Box::new(FixedGeocoder));
        let (_, mut showings) = parse_movie_page(MOVIE, "u").unwrap();
        showings.push(CinemaShowing {
            cinema: "Δαναός".into(),
            address: Some("Κηφισίας 109".into()),
            ..CinemaShowing::default()
        });

        let mut cache = HashMap::new();
        scraper.locate(&Client::new(), &mut showings, &mut cache).await;

        assert_eq!(showings[0].lat, Some(37.98));
        assert_eq!(showings[0].region.as_deref(), Some("Κέντρο"));
        assert_eq!(showings[0].subregion.as_deref(), Some("Κολωνάκι"));
        assert_eq!(showings[0].neighbourhood.as_deref(), Some("Σύνταγμα"));
        assert!(showings[1].coordinate().is_none());
        assert!(showings[1].subregion.is_none());
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn test_lookup_key_ignores_cosmetic_differences() {
        assert_eq!(lookup_key(" ΆΣΤΟΡ\u{200b}"), "άστορ");
        assert_eq!(lookup_key("Σταδίου\u{a0}28"), lookup_key("σταδίου 28"));
    }

    #[tokio::test]
    async fn test_locate_looks_up_name_variants_once() {
        let scraper =
            AthinoramaScraper::new(GUIDE_URL.to_string()).with_geocoder(Box::new(FixedGeocoder));
        let mut showings = vec![
            CinemaShowing {
                cinema: "Άστορ".into(),
                address: Some("Σταδίου 28 Αθήνα".into()),
                ..CinemaShowing::default()
            },
            CinemaShowing {
                cinema: "ΆΣΤΟΡ\u{200b}".into(),
                address: Some("Σταδίου\u{a0}28 Αθήνα ".into()),
                ..CinemaShowing::default()
            },
        ];

        let mut cache = HashMap::new();
        scraper.locate(&Client::new(), &mut showings, &mut cache).await;

        assert_eq!(cache.len(), 1);
        assert_eq!(showings[1].lat, Some(37.98));
        assert_eq!(showings[1].region.as_deref(), Some("Κέντρο"));
    }

    #[tokio::test]
    async fn test_fetch_catalog_skips_failing_movie_page() {
        let mock_server = MockServer::start().await;
        let guide = format!(
            r#"<div class="item horizontal card-item">
                 <h2 class="item-title"><a href="{0}/cinema/movie/broken/">Χαλασμένη</a></h2>
               </div>
               <div class="item horizontal card-item">
                 <h2 class="item-title"><a href="{0}/cinema/movie/ok/">Η Ταινία</a></h2>
               </div>"#,
            mock_server.uri()
        );

        Mock::given(matchers::method("GET"))
            .and(matchers::path("/cinema/guide/"))
            .respond_with(ResponseTemplate::new(200).set_body_string(guide))
            .mount(&mock_server)
            .await;
        Mock::given(matchers::path("/cinema/movie/broken/"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&mock_server)
            .await;
        Mock::given(matchers::path("/cinema/movie/ok/"))
            .respond_with(ResponseTemplate::new(200).set_body_string(MOVIE))
            .mount(&mock_server)
            .await;

        let scraper = AthinoramaScraper::new(format!("{}/cinema/guide/", mock_server.uri()));
        let catalog = scraper.fetch_catalog(&Client::new()).await.unwrap();

        assert_eq!(catalog.len(), 1);
        let movie = catalog.movie(0).unwrap();
        assert_eq!(movie.greek_title, "Η Ταινία");
        assert_eq!(
            movie.athinorama_link.as_deref(),
            Some(format!("{}/cinema/movie/ok/", mock_server.uri()).as_str())
        );
        assert_eq!(catalog.showings()[0][0].cinema, "Άστορ");
    }

    #[tokio::test]
    async fn test_fetch_catalog_fails_when_guide_is_unreachable() {
        let mock_server = MockServer::start().await;
        Mock::given(matchers::path("/cinema/guide/"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&mock_server)
            .await;

        let scraper = AthinoramaScraper::new(format!("{}/cinema/guide/", mock_server.uri()));
        let err = scraper.fetch_catalog(&Client::new()).await.unwrap_err();
        assert!(matches!(err, Error::Http(_)));
    }
}
