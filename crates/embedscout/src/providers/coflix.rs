// ABOUTME: Coflix scraper: JSON suggest search, wp-json episode API for shows,
// ABOUTME: and base64 showVideo() onclick payloads on the player page.

use std::sync::Arc;

use futures::future::{join_all, BoxFuture};
use once_cell::sync::Lazy;
use regex::Regex;
use scraper::{Html, Selector};
use serde_json::Value;
use tracing::{debug, warn};
use url::Url;

use crate::error::ScrapeError;
use crate::extract::variants::decode_base64;
use crate::metadata::MetadataClient;
use crate::providers::{
    best_match, display_title, resolve_servers, select_episode, Details, EpisodeEntry, Provider,
    SearchHit, ServerEntry, StreamRequest,
};
use crate::resolver::Resolver;
use crate::stream::{MediaType, Stream};

const DEFAULT_BASE_URL: &str = "https://coflix.cc";

static SHOW_VIDEO_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"showVideo\('([^']+)'").unwrap());

pub struct Coflix {
    resolver: Arc<Resolver>,
    metadata: Arc<MetadataClient>,
    base_url: String,
}

impl Coflix {
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

    fn api_url(&self) -> String {
        format!("{}/wp-json/apiflix/v1", self.base_url)
    }

    /// Search via the site's suggest endpoint, which answers JSON.
    pub async fn search(&self, query: &str) -> Result<Vec<SearchHit>, ScrapeError> {
        let encoded: String = url::form_urlencoded::byte_serialize(query.as_bytes()).collect();
        let url = format!("{}/suggest.php?query={}", self.base_url, encoded);
        let body = self.resolver.get_tolerant(&url).await?.text();

        let parsed: Value = serde_json::from_str(&body).map_err(|e| {
            ScrapeError::parse(&url, "Search", Some(anyhow::anyhow!("bad JSON: {}", e)))
        })?;
        let Some(items) = parsed.as_array() else {
            return Ok(Vec::new());
        };

        Ok(items
            .iter()
            .filter_map(|item| {
                let title = item.get("title")?.as_str()?.to_string();
                let url = item.get("url")?.as_str()?.to_string();
                let media_type = if url.contains("film") {
                    MediaType::Movie
                } else {
                    MediaType::Tv
                };
                // The suggest payload ships the poster as an HTML fragment.
                let poster = item
                    .get("image")
                    .and_then(Value::as_str)
                    .and_then(extract_image_url);
                Some(SearchHit {
                    title,
                    url,
                    year: None,
                    poster,
                    media_type: Some(media_type),
                })
            })
            .collect())
    }

    /// Scrape a title's page. Shows carry their episode table; movies list
    /// their servers behind the player iframe chain.
    pub async fn details(&self, url: &str) -> Result<Details, ScrapeError> {
        let body = self.resolver.get_tolerant(url).await?.text();
        let (title, poster, description, seasons) = {
            let doc = Html::parse_document(&body);
            let title = Selector::parse(r#"meta[property="og:title"]"#)
                .ok()
                .and_then(|sel| {
                    doc.select(&sel)
                        .next()
                        .and_then(|el| el.value().attr("content"))
                        // og:title carries a trailing "En" (from "En streaming").
                        .map(|t| t.trim().strip_suffix("En").unwrap_or(t.trim()).trim().to_string())
                })
                .unwrap_or_default();
            let poster = Selector::parse("img.TPostBg, div.title-img img")
                .ok()
                .and_then(|sel| {
                    doc.select(&sel)
                        .next()
                        .and_then(|img| img.value().attr("src"))
                        .map(str::to_string)
                });
            let description = Selector::parse("div.summary p, div.description p")
                .ok()
                .and_then(|sel| {
                    doc.select(&sel)
                        .next()
                        .map(|el| el.text().collect::<String>().trim().to_string())
                        .filter(|s| !s.is_empty())
                });
            (title, poster, description, Self::season_inputs(&doc))
        };

        let episodes = if seasons.is_empty() {
            Vec::new()
        } else {
            self.episodes(&seasons).await
        };
        let servers = if episodes.is_empty() {
            self.server_links(url)
                .await?
                .into_iter()
                .map(|embed_url| ServerEntry {
                    name: String::new(),
                    embed_url,
                })
                .collect()
        } else {
            Vec::new()
        };

        Ok(Details {
            title,
            poster,
            description,
            servers,
            episodes,
        })
    }

    /// Season inputs on a show page carry the post id and season number the
    /// episode API wants.
    fn season_inputs(html: &Html) -> Vec<(String, String)> {
        let Ok(selector) = Selector::parse("section.sc-seasons ul li input") else {
            return Vec::new();
        };
        html.select(&selector)
            .filter_map(|input| {
                let post_id = input.value().attr("post-id")?;
                let season = input.value().attr("data-season")?;
                Some((post_id.to_string(), season.to_string()))
            })
            .collect()
    }

    /// Fetch every season's episode list concurrently from the wp-json API.
    async fn episodes(&self, seasons: &[(String, String)]) -> Vec<EpisodeEntry> {
        let fetches = seasons.iter().map(|(post_id, season)| {
            let url = format!("{}/series/{}/{}", self.api_url(), post_id, season);
            async move {
                match self.resolver.get_tolerant(&url).await {
                    Ok(result) => serde_json::from_str::<Value>(&result.text()).ok(),
                    Err(err) => {
                        warn!(url, %err, "episode list fetch failed");
                        None
                    }
                }
            }
        });

        let mut episodes = Vec::new();
        for body in join_all(fetches).await.into_iter().flatten() {
            let Some(items) = body.get("episodes").and_then(Value::as_array) else {
                continue;
            };
            for ep in items {
                let season = ep
                    .get("season")
                    .and_then(value_as_u32)
                    .unwrap_or(1);
                let episode = ep
                    .get("number")
                    .and_then(value_as_u32)
                    .unwrap_or(1);
                let Some(page_url) = ep.get("links").and_then(Value::as_str) else {
                    continue;
                };
                episodes.push(EpisodeEntry {
                    season,
                    episode,
                    servers: vec![ServerEntry {
                        name: String::new(),
                        embed_url: page_url.to_string(),
                    }],
                });
            }
        }
        episodes
    }

    /// Pull server embed URLs out of a watch page: the player iframe lists
    /// language options whose onclick carries a base64 URL.
    pub async fn server_links(&self, page_url: &str) -> Result<Vec<String>, ScrapeError> {
        let body = self.resolver.get_tolerant(page_url).await?.text();
        let iframe_src = {
            let doc = Html::parse_document(&body);
            let Ok(selector) = Selector::parse("div.embed iframe") else {
                return Ok(Vec::new());
            };
            doc.select(&selector)
                .find_map(|el| el.value().attr("src").map(str::to_string))
        };
        let Some(iframe_src) = iframe_src else {
            debug!(url = page_url, "no player iframe on watch page");
            return Ok(Vec::new());
        };

        let iframe_url = match Url::parse(page_url) {
            Ok(base) => base
                .join(&iframe_src)
                .map(|u| u.to_string())
                .unwrap_or(iframe_src),
            Err(_) => iframe_src,
        };
        let iframe_body = self.resolver.get(&iframe_url, Some(page_url)).await?.text();

        let doc = Html::parse_document(&iframe_body);
        let Ok(selector) = Selector::parse("div.OptionsLangDisp div.OD.OD_FR.REactiv li") else {
            return Ok(Vec::new());
        };
        let links = doc
            .select(&selector)
            .filter_map(|li| {
                let onclick = li.value().attr("onclick")?;
                let caps = SHOW_VIDEO_RE.captures(onclick)?;
                let decoded = match decode_base64(&caps[1]) {
                    Ok(decoded) => decoded,
                    Err(err) => {
                        debug!(%err, "option payload did not decode");
                        return None;
                    }
                };
                decoded.starts_with("http").then_some(decoded)
            })
            .collect();
        Ok(links)
    }

    async fn collect_streams(&self, request: &StreamRequest) -> Result<Vec<Stream>, ScrapeError> {
        let info = self
            .metadata
            .title_info(request.media_type, &request.tmdb_id)
            .await?;

        let hits = self.search(&info.title).await?;
        let Some(hit) = best_match(&hits, &info.title, info.year, Some(request.media_type)) else {
            debug!(title = info.title, "no coflix search results");
            return Ok(Vec::new());
        };

        let page_url = if request.media_type == MediaType::Tv {
            let (season, episode) = match (request.season, request.episode) {
                (Some(s), Some(e)) => (s, e),
                _ => (1, 1),
            };
            let details = self.details(&hit.url).await?;
            let Some(entry) = select_episode(&details.episodes, season, episode) else {
                debug!(season, episode, "episode not listed on coflix");
                return Ok(Vec::new());
            };
            match entry.servers.first() {
                Some(server) => server.embed_url.clone(),
                None => return Ok(Vec::new()),
            }
        } else {
            hit.url.clone()
        };

        let servers: Vec<ServerEntry> = self
            .server_links(&page_url)
            .await?
            .into_iter()
            .map(|embed_url| ServerEntry {
                name: String::new(),
                embed_url,
            })
            .collect();

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

/// First img src in an HTML fragment, with scheme-relative srcs made absolute.
fn extract_image_url(fragment: &str) -> Option<String> {
    let doc = Html::parse_fragment(fragment);
    let sel = Selector::parse("img").ok()?;
    let src = doc.select(&sel).next()?.value().attr("src")?;
    if src.is_empty() {
        return None;
    }
    Some(if let Some(rest) = src.strip_prefix("//") {
        format!("https://{}", rest)
    } else {
        src.to_string()
    })
}

fn value_as_u32(value: &Value) -> Option<u32> {
    match value {
        Value::Number(n) => n.as_u64().map(|n| n as u32),
        Value::String(s) => s.parse().ok(),
        _ => None,
    }
}

impl Provider for Coflix {
    fn id(&self) -> &'static str {
        "coflix"
    }

    fn display_name(&self) -> &'static str {
        "Coflix"
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
