// ABOUTME: Day2Soap scraper: POST form search, .ml-item result grid, and watch
// ABOUTME: pages whose server buttons carry go('url') onclick handlers.

use std::sync::Arc;

use futures::future::BoxFuture;
use once_cell::sync::Lazy;
use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use tracing::{debug, warn};

use crate::error::ScrapeError;
use crate::metadata::MetadataClient;
use crate::providers::{
    best_match, display_title, resolve_servers, Details, Provider, SearchHit, ServerEntry,
    StreamRequest,
};
use crate::resolver::Resolver;
use crate::stream::{MediaType, Stream};

const DEFAULT_BASE_URL: &str = "https://day2soap.xyz";

const TRENDING_LIMIT: usize = 20;

static GO_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r#"go\(['"]([^'"]+)['"]\)"#).unwrap());

static BG_IMAGE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"url\(['"]?([^'")]+)['"]?\)"#).unwrap());

pub struct DaySoap {
    resolver: Arc<Resolver>,
    metadata: Arc<MetadataClient>,
    base_url: String,
}

impl DaySoap {
    pub fn new(resolver: Arc<Resolver>, metadata: Arc<MetadataClient>) -> Self {
        Self {
            resolver,
            metadata,
            base_url: DEFAULT_BASE_URL.to_string(),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    fn parse_grid_item(&self, item: ElementRef<'_>) -> Option<SearchHit> {
        let link_sel = Selector::parse("a.ml-mask").ok()?;
        let title_sel = Selector::parse("h2").ok()?;
        let year_sel = Selector::parse(".mli-quality").ok()?;
        let img_sel = Selector::parse("img").ok()?;

        let link = item.select(&link_sel).next()?;
        let href = link.value().attr("href")?;
        if href.is_empty() {
            return None;
        }

        let title = link
            .select(&title_sel)
            .next()
            .map(|el| el.text().collect::<String>().trim().to_string())
            .filter(|t| !t.is_empty())
            .or_else(|| link.value().attr("title").map(str::to_string))?;

        let year = item
            .select(&year_sel)
            .next()
            .and_then(|el| el.text().collect::<String>().trim().parse().ok());

        let poster = item.select(&img_sel).next().and_then(|img| {
            let src = img
                .value()
                .attr("data-original")
                .or_else(|| img.value().attr("src"))?;
            Some(if src.starts_with("http") {
                src.to_string()
            } else {
                format!("{}{}", self.base_url, src)
            })
        });

        Some(SearchHit {
            title,
            url: format!("{}{}", self.base_url, href),
            year,
            poster,
            media_type: Some(if href.contains("watch-tv") {
                MediaType::Tv
            } else {
                MediaType::Movie
            }),
        })
    }

    fn parse_grid(&self, body: &str, limit: usize) -> Vec<SearchHit> {
        let doc = Html::parse_document(body);
        let Ok(item_sel) = Selector::parse(".ml-item") else {
            return Vec::new();
        };
        doc.select(&item_sel)
            .filter_map(|item| self.parse_grid_item(item))
            .take(limit)
            .collect()
    }

    /// Search is a POST form, not a query string.
    pub async fn search(&self, query: &str, page: u32) -> Result<Vec<SearchHit>, ScrapeError> {
        let url = format!("{}/search", self.base_url);
        let page = page.to_string();
        let body = self
            .resolver
            .post_form(&url, &[("q", query), ("category", "movies"), ("page", &page)])
            .await?
            .text();
        Ok(self.parse_grid(&body, usize::MAX))
    }

    /// The trending endpoint is a POST too, answering the homepage grid.
    pub async fn trending(&self) -> Result<Vec<SearchHit>, ScrapeError> {
        let url = format!("{}/trending", self.base_url);
        let body = self
            .resolver
            .post_form(&url, &[("home", "home")])
            .await?
            .text();
        Ok(self.parse_grid(&body, TRENDING_LIMIT))
    }

    /// Scrape a watch page: display metadata plus its server buttons. The
    /// poster hides in the thumb element's background-image style.
    pub async fn details(&self, url: &str) -> Result<Details, ScrapeError> {
        let body = self.resolver.get(url, None).await?.text();
        let doc = Html::parse_document(&body);

        let title = Selector::parse(".mvic-desc h3, h3")
            .ok()
            .and_then(|sel| {
                doc.select(&sel)
                    .next()
                    .map(|el| el.text().collect::<String>().trim().to_string())
            })
            .unwrap_or_default();
        let description = Selector::parse(".desc").ok().and_then(|sel| {
            doc.select(&sel)
                .next()
                .map(|el| el.text().collect::<String>().trim().to_string())
                .filter(|s| !s.is_empty())
        });
        let poster = Selector::parse(".mvic-thumb").ok().and_then(|sel| {
            let style = doc.select(&sel).next()?.value().attr("style")?;
            let caps = BG_IMAGE_RE.captures(style)?;
            Some(caps[1].to_string())
        });

        Ok(Details {
            title,
            poster,
            description,
            servers: Self::parse_servers(&doc),
            episodes: Vec::new(),
        })
    }

    /// Server buttons on a watch page navigate via go('url') onclick handlers.
    pub async fn servers(&self, url: &str) -> Result<Vec<ServerEntry>, ScrapeError> {
        Ok(self.details(url).await?.servers)
    }

    fn parse_servers(doc: &Html) -> Vec<ServerEntry> {
        let Ok(server_sel) = Selector::parse(".les-content a") else {
            return Vec::new();
        };

        let mut servers = Vec::new();
        for (i, anchor) in doc.select(&server_sel).enumerate() {
            let Some(onclick) = anchor.value().attr("onclick") else {
                continue;
            };
            let Some(caps) = GO_RE.captures(onclick) else {
                continue;
            };
            let name = anchor
                .text()
                .collect::<String>()
                .split_whitespace()
                .collect::<Vec<_>>()
                .join(" ");
            let name = if name.is_empty() {
                format!("Server {}", i + 1)
            } else {
                name
            };
            servers.push(ServerEntry {
                name,
                embed_url: caps[1].to_string(),
            });
        }
        servers
    }

    async fn collect_streams(&self, request: &StreamRequest) -> Result<Vec<Stream>, ScrapeError> {
        let info = self
            .metadata
            .title_info(request.media_type, &request.tmdb_id)
            .await?;

        // Show watch pages are addressed directly by TMDB id; movies go
        // through search.
        let watch_url = if request.media_type == MediaType::Tv {
            let (season, episode) = match (request.season, request.episode) {
                (Some(s), Some(e)) => (s, e),
                _ => (1, 1),
            };
            format!(
                "{}/watch-tv?tmdb={}&season={}&episode={}",
                self.base_url, request.tmdb_id, season, episode
            )
        } else {
            let hits = self.search(&info.title, 1).await?;
            let Some(hit) = best_match(&hits, &info.title, info.year, Some(MediaType::Movie))
            else {
                debug!(title = info.title, "no day2soap search results");
                return Ok(Vec::new());
            };
            hit.url.clone()
        };

        let servers = self.servers(&watch_url).await?;
        let title = display_title(&info.title, info.year);
        Ok(resolve_servers(
            &self.resolver,
            &servers,
            self.id(),
            self.display_name(),
            &title,
            &self.base_url,
        )
        .await)
    }
}

impl Provider for DaySoap {
    fn id(&self) -> &'static str {
        "daysoap"
    }

    fn display_name(&self) -> &'static str {
        "Day2Soap"
    }

    fn streams<'a>(&'a self, request: &'a StreamRequest) -> BoxFuture<'a, Vec<Stream>> {
        Box::pin(async move {
            match self.collect_streams(request).await {
                Ok(streams) => streams,
                Err(err) => {
                    warn!(provider = self.id(), %err, "stream collection failed");
                    Vec::new()
                }
            }
        })
    }
}
