use crate::catalog::Catalog;
use crate::error::Result;
use crate::{CatalogSource, USER_AGENT};
use reqwest::{Client, header};
use tracing::info;

/// Catalog published as a `movies.json` / `cinemas.json` pair over HTTP.
pub struct JsonFeedSource {
    movies_url: String,
    cinemas_url: String,
}

impl JsonFeedSource {
    pub fn new(movies_url: String, cinemas_url: String) -> Self {
        Self {
            movies_url,
            cinemas_url,
        }
    }

    /// Both documents under one base URL.
    pub fn from_base_url(base: &str) -> Self {
        let base = base.trim_end_matches('/');
        Self::new(
            format!("{}/{}", base, crate::catalog::MOVIES_FILE),
            format!("{}/{}", base, crate::catalog::CINEMAS_FILE),
        )
    }

    async fn fetch_text(client: &Client, url: &str) -> Result<String> {
        let resp = client
            .get(url)
            .header(header::USER_AGENT, USER_AGENT)
            .header(header::ACCEPT, "application/json")
            .send()
            .await?
            .error_for_status()?;
        Ok(resp.text().await?)
    }
}

#[async_trait::async_trait]
impl CatalogSource for JsonFeedSource {
    async fn fetch_catalog(&self, client: &Client) -> Result<Catalog> {
        let (movies, cinemas) = tokio::try_join!(
            Self::fetch_text(client, &self.movies_url),
            Self::fetch_text(client, &self.cinemas_url),
        )?;
        info!(movies_url = %self.movies_url, "fetched catalog documents");
        Catalog::from_json(&movies, &cinemas)
    }

    fn source_name(&self) -> String {
        format!("json feed ({})", self.movies_url)
    }
}
