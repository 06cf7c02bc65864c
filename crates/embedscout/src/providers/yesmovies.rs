// ABOUTME: YesMoviesHub scraper: WordPress search grid, watch-page link harvest
// ABOUTME: sorted by quality, and a lazily cached site domain.

use std::sync::Arc;

use futures::future::BoxFuture;
use scraper::{ElementRef, Html, Selector};
use tracing::{debug, warn};
use url::Url;

use crate::cache::{CachedDomain, DOMAIN_CACHE_TTL};
use crate::error::ScrapeError;
use crate::metadata::MetadataClient;
use crate::providers::{
    best_match, display_title, resolve_servers, Details, Provider, SearchHit, ServerEntry,
    StreamRequest,
};
use crate::resolver::Resolver;
use crate::resource::FetchResult;
use crate::stream::{clean_title, extract_quality, extract_year, quality_rank, MediaType, Stream};

const DEFAULT_BASE_URL: &str = "https://yesmovieshub.online";

const TRENDING_LIMIT: usize = 20;

pub struct YesMovies {
    resolver: Arc<Resolver>,
    metadata: Arc<MetadataClient>,
    domain: CachedDomain,
}

impl YesMovies {
    pub fn new(resolver: Arc<Resolver>, metadata: Arc<MetadataClient>) -> Self {
        Self {
            resolver,
            metadata,
            domain: CachedDomain::new(DEFAULT_BASE_URL, DOMAIN_CACHE_TTL),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.domain = CachedDomain::new(base_url, DOMAIN_CACHE_TTL);
        self
    }

    /// Parse one tile of the site's movie grid. The `.meta` line carries
    /// "SS n" / "EP n" markers for shows.
    fn parse_grid_item(item: ElementRef<'_>, domain: &str) -> Option<SearchHit> {
        let link_sel = Selector::parse("a.title").ok()?;
        let meta_sel = Selector::parse(".meta").ok()?;
        let img_sel = Selector::parse("img").ok()?;

        let link = item.select(&link_sel).next()?;
        let href = link.value().attr("href")?;
        let title_text = link.text().collect::<String>().trim().to_string();
        if href.is_empty() || title_text.is_empty() {
            return None;
        }

        let meta_text = item
            .select(&meta_sel)
            .next()
            .map(|el| el.text().collect::<String>())
            .unwrap_or_default();
        let is_tv = meta_text.contains("SS ") || meta_text.contains("EP ");

        let url = if href.starts_with("http") {
            href.to_string()
        } else {
            format!("{}{}", domain, href)
        };

        // Grid posters are lazy-loaded; data-src holds the real image.
        let poster = item.select(&img_sel).next().and_then(|img| {
            img.value()
                .attr("data-src")
                .or_else(|| img.value().attr("src"))
                .map(str::to_string)
        });

        Some(SearchHit {
            title: clean_title(&title_text),
            year: extract_year(&title_text),
            url,
            poster,
            media_type: Some(if is_tv { MediaType::Tv } else { MediaType::Movie }),
        })
    }

    fn parse_grid(body: &str, domain: &str, limit: usize) -> Vec<SearchHit> {
        let doc = Html::parse_document(body);
        let Ok(item_sel) = Selector::parse(".item") else {
            return Vec::new();
        };
        let mut hits: Vec<SearchHit> = Vec::new();
        for item in doc.select(&item_sel).take(limit) {
            let Some(hit) = Self::parse_grid_item(item, domain) else {
                continue;
            };
            if hits.iter().any(|h| h.url == hit.url) {
                continue;
            }
            hits.push(hit);
        }
        hits
    }

    /// Sites like this rotate domains and 301 the old one to the new home.
    /// Remember the landing origin so later requests skip the redirect.
    fn note_domain(&self, result: &FetchResult) {
        let (Ok(requested), Ok(landed)) = (Url::parse(&result.url), Url::parse(&result.final_url))
        else {
            return;
        };
        if requested.origin() != landed.origin() {
            let moved = landed.origin().ascii_serialization();
            debug!(domain = %moved, "site moved, caching new domain");
            self.domain.set(moved);
        }
    }

    pub async fn search(&self, query: &str) -> Result<Vec<SearchHit>, ScrapeError> {
        let domain = self.domain.get();
        let encoded: String = url::form_urlencoded::byte_serialize(query.as_bytes()).collect();
        let url = format!("{}/?s={}", domain, encoded);
        let result = self.resolver.get(&url, None).await?;
        self.note_domain(&result);
        Ok(Self::parse_grid(&result.text(), &domain, usize::MAX))
    }

    /// The homepage grid doubles as the trending list.
    pub async fn trending(&self) -> Result<Vec<SearchHit>, ScrapeError> {
        let domain = self.domain.get();
        let result = self.resolver.get(&domain, None).await?;
        self.note_domain(&result);
        Ok(Self::parse_grid(&result.text(), &domain, TRENDING_LIMIT))
    }

    /// Scrape a title's page: display metadata plus its watch/stream links.
    pub async fn details(&self, url: &str) -> Result<Details, ScrapeError> {
        let body = self.resolver.get(url, None).await?.text();
        let doc = Html::parse_document(&body);

        let first_text = |selectors: &str| {
            Selector::parse(selectors).ok().and_then(|sel| {
                doc.select(&sel)
                    .next()
                    .map(|el| el.text().collect::<String>().trim().to_string())
                    .filter(|s| !s.is_empty())
            })
        };
        let title = first_text("h1.entry-title, .title")
            .map(|t| clean_title(&t))
            .unwrap_or_default();
        let description = first_text(".desc, .description, .entry-content p");
        let poster = Selector::parse(".poster img, .movie-poster img")
            .ok()
            .and_then(|sel| {
                doc.select(&sel).next().and_then(|img| {
                    img.value()
                        .attr("data-src")
                        .or_else(|| img.value().attr("src"))
                        .map(str::to_string)
                })
            });

        Ok(Details {
            title,
            poster,
            description,
            servers: Self::parse_watch_links(&doc),
            episodes: Vec::new(),
        })
    }

    /// Watch/stream links from a title's page, best quality first.
    pub async fn watch_links(&self, url: &str) -> Result<Vec<ServerEntry>, ScrapeError> {
        Ok(self.details(url).await?.servers)
    }

    fn parse_watch_links(doc: &Html) -> Vec<ServerEntry> {
        let Ok(link_sel) = Selector::parse(".entry-content a, .download-links a") else {
            return Vec::new();
        };

        let mut entries: Vec<(u32, ServerEntry)> = Vec::new();
        for link in doc.select(&link_sel) {
            let Some(href) = link.value().attr("href") else {
                continue;
            };
            if !href.contains(".mp4") && !href.contains("stream") && !href.contains("watch") {
                continue;
            }
            if entries.iter().any(|(_, e)| e.embed_url == href) {
                continue;
            }
            let text = link.text().collect::<String>();
            let quality = extract_quality(&text);
            entries.push((
                quality_rank(&quality),
                ServerEntry {
                    name: quality,
                    embed_url: href.to_string(),
                },
            ));
        }
        entries.sort_by(|a, b| b.0.cmp(&a.0));
        entries.into_iter().map(|(_, e)| e).collect()
    }

    async fn collect_streams(&self, request: &StreamRequest) -> Result<Vec<Stream>, ScrapeError> {
        let info = self
            .metadata
            .title_info(request.media_type, &request.tmdb_id)
            .await?;

        let hits = self.search(&info.title).await?;
        let Some(hit) = best_match(&hits, &info.title, info.year, Some(request.media_type)) else {
            debug!(title = info.title, "no yesmovies search results");
            return Ok(Vec::new());
        };

        let servers = self.watch_links(&hit.url).await?;
        let title = display_title(&info.title, info.year);
        Ok(resolve_servers(
            &self.resolver,
            &servers,
            self.id(),
            self.display_name(),
            &title,
            &self.domain.get(),
        )
        .await)
    }
}

impl Provider for YesMovies {
    fn id(&self) -> &'static str {
        "yesmovies"
    }

    fn display_name(&self) -> &'static str {
        "YesMovies"
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

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::prelude::*;
    use pretty_assertions::assert_eq;

    fn provider(server: &MockServer) -> YesMovies {
        let resolver = Arc::new(
            Resolver::builder().allow_private_networks(true).build(),
        );
        let metadata = Arc::new(MetadataClient::default().with_base_url(server.base_url()));
        YesMovies::new(resolver, metadata).with_base_url(server.base_url())
    }

    const GRID: &str = r#"
        <div class="item">
            <a class="title" href="/movie/inception-2010">Inception (2010)</a>
            <div class="quality">1080p</div>
            <div class="meta">147 min</div>
        </div>
        <div class="item">
            <a class="title" href="/series/dark">Dark</a>
            <div class="meta">SS 3 EP 26</div>
        </div>
    "#;

    #[tokio::test]
    async fn search_parses_grid_and_detects_shows() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/").query_param("s", "Inception");
                then.status(200).body(GRID);
            })
            .await;

        let hits = provider(&server).search("Inception").await.expect("search");
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].title, "Inception");
        assert_eq!(hits[0].year, Some(2010));
        assert_eq!(hits[0].media_type, Some(MediaType::Movie));
        assert_eq!(hits[0].url, server.url("/movie/inception-2010"));
        assert_eq!(hits[1].media_type, Some(MediaType::Tv));
    }

    #[tokio::test]
    async fn trending_reads_homepage_grid() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/");
                then.status(200).body(GRID);
            })
            .await;

        let hits = provider(&server).trending().await.expect("trending");
        assert_eq!(hits.len(), 2);
    }

    #[tokio::test]
    async fn trending_caps_at_twenty() {
        let server = MockServer::start_async().await;
        let grid: String = (0..25)
            .map(|i| {
                format!(r#"<div class="item"><a class="title" href="/movie/m{i}">Movie {i}</a></div>"#)
            })
            .collect();
        server
            .mock_async(|when, then| {
                when.method(GET).path("/");
                then.status(200).body(grid);
            })
            .await;

        let hits = provider(&server).trending().await.expect("trending");
        assert_eq!(hits.len(), 20);
    }

    #[tokio::test]
    async fn moved_domain_is_remembered() {
        let old_home = MockServer::start_async().await;
        let new_home = MockServer::start_async().await;
        let old_mock = old_home
            .mock_async(|when, then| {
                when.method(GET).path("/");
                then.status(301).header("Location", new_home.url("/"));
            })
            .await;
        let new_mock = new_home
            .mock_async(|when, then| {
                when.method(GET).path("/");
                then.status(200).body(GRID);
            })
            .await;

        let provider = provider(&old_home);
        provider.trending().await.expect("first trending");
        provider.trending().await.expect("second trending");

        // The redirect is only taken once; the second call lands directly.
        assert_eq!(old_mock.hits_async().await, 1);
        assert_eq!(new_mock.hits_async().await, 2);
    }

    #[tokio::test]
    async fn watch_links_sorted_by_quality() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/movie/inception-2010");
                then.status(200).body(
                    r#"<div class="entry-content">
                        <a href="https://host.example/watch/720">Watch 720p</a>
                        <a href="https://host.example/watch/1080">Watch 1080p</a>
                        <a href="https://unrelated.example/about">About us</a>
                    </div>"#,
                );
            })
            .await;

        let links = provider(&server)
            .watch_links(&server.url("/movie/inception-2010"))
            .await
            .expect("links");
        assert_eq!(links.len(), 2);
        assert_eq!(links[0].embed_url, "https://host.example/watch/1080");
        assert_eq!(links[0].name, "1080P");
        assert_eq!(links[1].embed_url, "https://host.example/watch/720");
    }

    #[tokio::test]
    async fn streams_end_to_end() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/3/movie/27205");
                then.status(200).json_body(serde_json::json!({
                    "title": "Inception",
                    "release_date": "2010-07-15",
                    "imdb_id": "tt1375666"
                }));
            })
            .await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/").query_param("s", "Inception");
                then.status(200).body(GRID);
            })
            .await;
        let watch_url = server.url("/hoster/watch/1");
        server
            .mock_async(|when, then| {
                when.method(GET).path("/movie/inception-2010");
                then.status(200).body(format!(
                    r#"<div class="entry-content"><a href="{}">Watch HD</a></div>"#,
                    watch_url
                ));
            })
            .await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/hoster/watch/1");
                then.status(200)
                    .body(r#"var file = "https://cdn.example/inception-720.m3u8";"#);
            })
            .await;

        let request = StreamRequest {
            media_type: MediaType::Movie,
            tmdb_id: "27205".to_string(),
            season: None,
            episode: None,
        };
        let streams = provider(&server).streams(&request).await;

        assert_eq!(streams.len(), 1);
        assert_eq!(streams[0].name, "YesMovies HD");
        assert_eq!(streams[0].title, "Inception (2010)");
        assert_eq!(streams[0].url, "https://cdn.example/inception-720.m3u8");
        assert_eq!(streams[0].provider, "yesmovies");
    }
}
