// ABOUTME: FiveMovieRulz scraper: movies only, WordPress search, and hoster
// ABOUTME: links (FileLions, StreamPlay, ...) harvested from the entry content.

use std::sync::Arc;

use futures::future::BoxFuture;
use once_cell::sync::Lazy;
use regex::Regex;
use scraper::{Html, Selector};
use tracing::{debug, warn};
use url::Url;

use crate::error::ScrapeError;
use crate::metadata::MetadataClient;
use crate::providers::{
    best_match, display_title, resolve_servers, Details, Provider, SearchHit, ServerEntry,
    StreamRequest,
};
use crate::resolver::Resolver;
use crate::stream::{link_quality, MediaType, Stream};

const DEFAULT_BASE_URL: &str = "https://5movierulz.mom";

static YEAR_IN_TITLE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\d{4}").unwrap());

pub struct MovieRulz {
    resolver: Arc<Resolver>,
    metadata: Arc<MetadataClient>,
    base_url: String,
}

impl MovieRulz {
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

    pub async fn search(&self, query: &str) -> Result<Vec<SearchHit>, ScrapeError> {
        let encoded: String = url::form_urlencoded::byte_serialize(query.as_bytes()).collect();
        let url = format!("{}/?s={}", self.base_url, encoded);
        let body = self.resolver.get_tolerant(&url).await?.text();

        let doc = Html::parse_document(&body);
        let Ok(item_sel) = Selector::parse("#main .cont_display") else {
            return Ok(Vec::new());
        };
        let Ok(link_sel) = Selector::parse("a") else {
            return Ok(Vec::new());
        };
        let Ok(img_sel) = Selector::parse("img") else {
            return Ok(Vec::new());
        };

        let mut hits = Vec::new();
        for item in doc.select(&item_sel) {
            let Some(link) = item.select(&link_sel).next() else {
                continue;
            };
            let Some(href) = link.value().attr("href") else {
                continue;
            };
            let Some(full_title) = link.value().attr("title") else {
                continue;
            };
            // "Inception (2010) HDRip..." -> title before the paren, year inside.
            let title = full_title
                .split('(')
                .next()
                .unwrap_or(full_title)
                .trim()
                .to_string();
            if title.is_empty() {
                continue;
            }
            let year = YEAR_IN_TITLE_RE
                .find(full_title)
                .and_then(|m| m.as_str().parse().ok());
            let poster = item
                .select(&img_sel)
                .next()
                .and_then(|img| img.value().attr("src"))
                .map(str::to_string);
            hits.push(SearchHit {
                title,
                url: href.to_string(),
                year,
                poster,
                media_type: Some(MediaType::Movie),
            });
        }
        Ok(hits)
    }

    /// Scrape a movie page: display metadata plus its hoster links.
    pub async fn details(&self, url: &str) -> Result<Details, ScrapeError> {
        let body = self.resolver.get_tolerant(url).await?.text();
        let doc = Html::parse_document(&body);

        let title = Selector::parse("h1.entry-title, h2.entry-title")
            .ok()
            .and_then(|sel| {
                doc.select(&sel).next().map(|el| {
                    let text = el.text().collect::<String>();
                    text.split('(').next().unwrap_or(&text).trim().to_string()
                })
            })
            .unwrap_or_default();
        let poster = Selector::parse(".entry-content img")
            .ok()
            .and_then(|sel| {
                doc.select(&sel)
                    .next()
                    .and_then(|img| img.value().attr("src"))
                    .map(str::to_string)
            });
        let description = Selector::parse(".entry-content p").ok().and_then(|sel| {
            doc.select(&sel)
                .next()
                .map(|el| el.text().collect::<String>().trim().to_string())
                .filter(|s| !s.is_empty())
        });

        Ok(Details {
            title,
            poster,
            description,
            servers: Self::parse_hoster_links(&doc),
            episodes: Vec::new(),
        })
    }

    /// Hoster links on a movie page. Known streaming hosts first, then any
    /// other download/stream anchors, deduplicated by URL.
    pub async fn hoster_links(&self, url: &str) -> Result<Vec<ServerEntry>, ScrapeError> {
        Ok(self.details(url).await?.servers)
    }

    fn parse_hoster_links(doc: &Html) -> Vec<ServerEntry> {
        let hoster_sel = Selector::parse(
            r#"a[href*="filelions.to"], a[href*="streamplay"], a[href*="doodstream"], a[href*="mixdrop"]"#,
        );
        let extra_sel = Selector::parse(r#"a[href*="download"], a[href*="stream"]"#);

        let mut entries: Vec<ServerEntry> = Vec::new();
        let mut push = |href: &str, text: &str| {
            if !href.starts_with("http") || entries.iter().any(|e| e.embed_url == href) {
                return;
            }
            entries.push(ServerEntry {
                name: format!("{} - {}", server_label(href), link_quality(text)),
                embed_url: href.to_string(),
            });
        };

        if let Ok(sel) = hoster_sel {
            for link in doc.select(&sel) {
                if let Some(href) = link.value().attr("href") {
                    push(href, &link.text().collect::<String>());
                }
            }
        }
        if let Ok(sel) = extra_sel {
            for link in doc.select(&sel) {
                if let Some(href) = link.value().attr("href") {
                    push(href, &link.text().collect::<String>());
                }
            }
        }
        entries
    }

    async fn collect_streams(&self, request: &StreamRequest) -> Result<Vec<Stream>, ScrapeError> {
        let info = self
            .metadata
            .title_info(request.media_type, &request.tmdb_id)
            .await?;

        let hits = self.search(&info.title).await?;
        let Some(hit) = best_match(&hits, &info.title, info.year, Some(MediaType::Movie)) else {
            debug!(title = info.title, "no movierulz search results");
            return Ok(Vec::new());
        };

        let servers = self.hoster_links(&hit.url).await?;
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

/// Human name for a hoster, from its hostname.
fn server_label(url: &str) -> String {
    let Ok(parsed) = Url::parse(url) else {
        return "Unknown Server".to_string();
    };
    let Some(host) = parsed.host_str() else {
        return "Unknown Server".to_string();
    };
    if host.contains("filelions") {
        "FileLions".to_string()
    } else if host.contains("streamplay") {
        "StreamPlay".to_string()
    } else if host.contains("doodstream") {
        "DoodStream".to_string()
    } else if host.contains("mixdrop") {
        "MixDrop".to_string()
    } else {
        host.to_string()
    }
}

impl Provider for MovieRulz {
    fn id(&self) -> &'static str {
        "movierulz"
    }

    fn display_name(&self) -> &'static str {
        "MovieRulz"
    }

    fn streams<'a>(&'a self, request: &'a StreamRequest) -> BoxFuture<'a, Vec<Stream>> {
        Box::pin(async move {
            // The site only carries movies.
            if request.media_type != MediaType::Movie {
                debug!(provider = self.id(), "shows are not supported");
                return Vec::new();
            }
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
