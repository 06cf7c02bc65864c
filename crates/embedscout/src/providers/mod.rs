// ABOUTME: The provider abstraction: per-site scrapers that turn a content id
// ABOUTME: into playable streams, plus the matching helpers they all share.

pub mod coflix;
pub mod daysoap;
pub mod movierulz;
pub mod yesmovies;

use std::collections::HashMap;

use futures::future::{join_all, BoxFuture};
use tracing::debug;

use crate::resolver::Resolver;
use crate::resource::USER_AGENT;
use crate::stream::{clean_title, MediaType, Stream};

pub use coflix::Coflix;
pub use daysoap::DaySoap;
pub use movierulz::MovieRulz;
pub use yesmovies::YesMovies;

/// What the caller wants streams for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamRequest {
    pub media_type: MediaType,
    pub tmdb_id: String,
    pub season: Option<u32>,
    pub episode: Option<u32>,
}

/// One result row from a site's search page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchHit {
    pub title: String,
    pub url: String,
    pub year: Option<i32>,
    pub poster: Option<String>,
    pub media_type: Option<MediaType>,
}

/// One streaming server listed on a watch page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerEntry {
    pub name: String,
    pub embed_url: String,
}

/// One episode row on a show's page, with its servers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EpisodeEntry {
    pub season: u32,
    pub episode: u32,
    pub servers: Vec<ServerEntry>,
}

/// A scraped content page: display metadata plus the embed candidates it
/// lists. Shows carry their episode table instead of direct servers.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Details {
    pub title: String,
    pub poster: Option<String>,
    pub description: Option<String>,
    pub servers: Vec<ServerEntry>,
    pub episodes: Vec<EpisodeEntry>,
}

/// A site scraped for streams. Implementations never fail outward: scraping
/// errors are logged and an empty list is returned.
pub trait Provider: Send + Sync {
    fn id(&self) -> &'static str;
    fn display_name(&self) -> &'static str;
    fn streams<'a>(&'a self, request: &'a StreamRequest) -> BoxFuture<'a, Vec<Stream>>;
}

/// Pick the search hit that best matches a title.
///
/// Hits are filtered by media type when both sides declare one. Among those,
/// a hit whose cleaned title contains the query (or vice versa) wins, with
/// a matching year breaking ties. Falls back to the first filtered hit.
pub fn best_match<'a>(
    hits: &'a [SearchHit],
    title: &str,
    year: Option<i32>,
    media_type: Option<MediaType>,
) -> Option<&'a SearchHit> {
    let candidates: Vec<&SearchHit> = hits
        .iter()
        .filter(|hit| match (media_type, hit.media_type) {
            (Some(want), Some(have)) => want == have,
            _ => true,
        })
        .collect();

    let query = clean_title(title).to_lowercase();
    let titled: Vec<&SearchHit> = candidates
        .iter()
        .copied()
        .filter(|hit| {
            let hit_title = clean_title(&hit.title).to_lowercase();
            hit_title.contains(&query) || query.contains(&hit_title)
        })
        .collect();

    if let Some(year) = year {
        if let Some(hit) = titled.iter().find(|hit| hit.year == Some(year)) {
            return Some(hit);
        }
    }
    titled.first().copied().or_else(|| candidates.first().copied())
}

/// Find the entry for an exact season/episode pair. No fuzzy fallback: a
/// request for an episode the site does not list yields nothing.
pub fn select_episode(episodes: &[EpisodeEntry], season: u32, episode: u32) -> Option<&EpisodeEntry> {
    episodes
        .iter()
        .find(|e| e.season == season && e.episode == episode)
}

/// "Title (year)" for display, with "(N/A)" when the year is unknown.
pub fn display_title(title: &str, year: Option<i32>) -> String {
    match year {
        Some(year) => format!("{} ({})", title, year),
        None => format!("{} (N/A)", title),
    }
}

/// The header set a player must replay for the upstream origin to serve
/// the stream.
pub fn stream_headers(referer: &str) -> HashMap<String, String> {
    let mut headers = HashMap::new();
    headers.insert("User-Agent".to_string(), USER_AGENT.to_string());
    headers.insert("Referer".to_string(), referer.to_string());
    headers
}

/// Resolve every server's embed URL concurrently and build the output
/// streams. Servers that resolve to nothing are dropped silently.
pub(crate) async fn resolve_servers(
    resolver: &Resolver,
    servers: &[ServerEntry],
    provider_id: &str,
    provider_name: &str,
    title: &str,
    referer: &str,
) -> Vec<Stream> {
    let resolved = join_all(
        servers
            .iter()
            .map(|server| resolver.resolve(&server.embed_url, None)),
    )
    .await;

    let mut streams = Vec::new();
    for (i, (server, resolved)) in servers.iter().zip(resolved).enumerate() {
        let Some(resolved) = resolved else {
            debug!(provider = provider_id, url = server.embed_url, "server did not resolve");
            continue;
        };
        let name = if server.name.is_empty() {
            format!("{} Server {}", provider_name, i + 1)
        } else {
            format!("{} {}", provider_name, server.name)
        };
        streams.push(Stream {
            name,
            title: title.to_string(),
            url: resolved.url,
            quality: resolved.quality,
            size: "Unknown".to_string(),
            headers: stream_headers(referer),
            provider: provider_id.to_string(),
        });
    }
    streams
}
