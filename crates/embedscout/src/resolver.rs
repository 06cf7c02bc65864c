// ABOUTME: The generic embed resolver: fetches embed pages, scans them with the
// ABOUTME: pattern table, follows nested iframes, and applies per-family strategies.

use std::collections::{HashMap, HashSet, VecDeque};
use std::net::IpAddr;
use std::sync::Arc;

use futures::future::BoxFuture;
use reqwest::redirect;
use tracing::{debug, warn};
use url::Url;

use crate::error::ScrapeError;
use crate::extract::patterns::{PatternSet, API_PROBE_PATTERNS, API_RESPONSE_RE, ENCODED_PATTERNS};
use crate::extract::variants::{decode_base64, EmbedTarget, HostFamily};
use crate::extract::{
    iframe_sources, normalize_candidate, scan_body, MAX_IFRAMES_PER_PAGE, MAX_IFRAME_DEPTH,
};
use crate::options::{Options, ResolverBuilder};
use crate::resource::{fetch, is_private_ip, FetchOptions, FetchResult};
use crate::stream::{classify, guess_quality, ResolvedStream};

/// Hard cap on page fetches per resolve call: the embed page itself plus a
/// full iframe tree at the depth and fan-out limits.
const MAX_RESOLVE_FETCHES: usize = 13;

/// At most this many discovered API endpoints are probed per embed page.
const MAX_API_PROBES: usize = 3;

/// A per-site stream provider the VidSrc-family strategy delegates to when
/// a structured identifier can be parsed from the embed URL.
pub trait StreamSource: Send + Sync {
    fn streams<'a>(&'a self, target: &'a EmbedTarget) -> BoxFuture<'a, Vec<ResolvedStream>>;
}

/// Resolves an embed page URL to direct video stream URLs.
pub struct Resolver {
    client: reqwest::Client,
    patterns: PatternSet,
    delegate: Option<Arc<dyn StreamSource>>,
    allow_private_networks: bool,
}

impl Resolver {
    pub fn builder() -> ResolverBuilder {
        ResolverBuilder::new()
    }

    pub fn new(opts: Options) -> Self {
        let allow_private = opts.allow_private_networks;
        let client = match opts.http_client {
            Some(client) => client,
            None => reqwest::Client::builder()
                .user_agent(opts.user_agent.clone())
                .timeout(opts.timeout)
                .cookie_store(true)
                .redirect(redirect::Policy::custom(move |attempt| {
                    if attempt.previous().len() >= 10 {
                        return attempt.error("too many redirects");
                    }
                    if !allow_private {
                        if let Some(host) = attempt.url().host_str() {
                            if let Ok(ip) = host.parse::<IpAddr>() {
                                if is_private_ip(&ip) {
                                    return attempt.stop();
                                }
                            }
                        }
                    }
                    attempt.follow()
                }))
                .build()
                .expect("failed to construct HTTP client"),
        };
        Self {
            client,
            patterns: opts.patterns.unwrap_or_default(),
            delegate: opts.delegate,
            allow_private_networks: opts.allow_private_networks,
        }
    }

    /// The underlying HTTP client, for callers that want to share its
    /// connection pool and cookie jar (e.g. metadata lookups).
    pub fn http(&self) -> &reqwest::Client {
        &self.client
    }

    /// GET a page with browser-like headers, optionally replaying a Referer
    /// (the matching Origin is derived from it).
    pub(crate) async fn get(
        &self,
        url: &str,
        referer: Option<&str>,
    ) -> Result<FetchResult, ScrapeError> {
        let mut headers = HashMap::new();
        if let Some(referer) = referer {
            headers.insert("Referer".to_string(), referer.to_string());
            if let Ok(parsed) = Url::parse(referer) {
                headers.insert("Origin".to_string(), parsed.origin().ascii_serialization());
            }
        }
        let opts = FetchOptions {
            headers,
            allow_private_networks: self.allow_private_networks,
            ..Default::default()
        };
        fetch(&self.client, url, &opts).await
    }

    /// Like `get`, but a non-2xx status is logged and the body still read.
    /// Site pages often answer 403/503 with usable markup behind them.
    pub(crate) async fn get_tolerant(&self, url: &str) -> Result<FetchResult, ScrapeError> {
        let opts = FetchOptions {
            allow_private_networks: self.allow_private_networks,
            tolerate_non_2xx: true,
            ..Default::default()
        };
        fetch(&self.client, url, &opts).await
    }

    /// POST an urlencoded form, as site search endpoints expect.
    pub(crate) async fn post_form(
        &self,
        url: &str,
        form: &[(&str, &str)],
    ) -> Result<FetchResult, ScrapeError> {
        let opts = FetchOptions {
            allow_private_networks: self.allow_private_networks,
            form: Some(
                form.iter()
                    .map(|(k, v)| (k.to_string(), v.to_string()))
                    .collect(),
            ),
            ..Default::default()
        };
        fetch(&self.client, url, &opts).await
    }

    /// Resolve an embed page to a single playable stream.
    ///
    /// Routes by host family first, then falls back to the generic
    /// pattern-scan-and-recurse walk. All failures along the way are logged
    /// and swallowed; the caller only sees whether a stream was found.
    ///
    /// `server_hint` is advisory: a candidate whose URL or source tag
    /// contains it is preferred, but when nothing matches the first
    /// candidate still wins. The hint never causes an empty result.
    pub async fn resolve(
        &self,
        embed_url: &str,
        server_hint: Option<&str>,
    ) -> Option<ResolvedStream> {
        let embed = match Url::parse(embed_url) {
            Ok(url) => url,
            Err(err) => {
                warn!(url = embed_url, %err, "unparseable embed URL");
                return None;
            }
        };

        let variant_hits = match HostFamily::of(embed_url) {
            HostFamily::VidSrc => self.resolve_via_delegate(&embed).await,
            HostFamily::TwoEmbed => self.probe_api_endpoints(&embed).await,
            HostFamily::AutoEmbed => self.decode_embedded_payloads(&embed).await,
            HostFamily::Generic => Vec::new(),
        };
        if !variant_hits.is_empty() {
            return pick(variant_hits, server_hint);
        }

        pick(self.resolve_generic(&embed).await, server_hint)
    }

    /// The generic walk: scan the page, and when nothing matches descend
    /// into its iframes depth-first, bounded by depth and total fetches.
    async fn resolve_generic(&self, embed: &Url) -> Vec<ResolvedStream> {
        let mut queue: VecDeque<(String, u8)> = VecDeque::new();
        queue.push_back((embed.to_string(), 0));
        let mut fetched = 0usize;

        while let Some((url, depth)) = queue.pop_front() {
            if fetched >= MAX_RESOLVE_FETCHES {
                debug!(url = embed.as_str(), "fetch budget exhausted");
                break;
            }
            fetched += 1;

            let Ok(page_url) = Url::parse(&url) else {
                debug!(url, "skipping unparseable iframe source");
                continue;
            };
            // Sites check that the request looks like it came from their
            // own player page.
            let origin = page_url.origin().ascii_serialization();
            let referer = format!("{}/", origin);
            let result = match self.get(&url, Some(&referer)).await {
                Ok(result) => result,
                Err(err) => {
                    warn!(url, %err, "embed page fetch failed");
                    continue;
                }
            };

            let body = result.text();
            let hits = scan_body(&body, Some(&page_url), &self.patterns, "direct");
            if !hits.is_empty() {
                debug!(url, count = hits.len(), depth, "found stream candidates");
                return hits;
            }

            if depth < MAX_IFRAME_DEPTH {
                let children = iframe_sources(&body, Some(&page_url), MAX_IFRAMES_PER_PAGE);
                for src in children.into_iter().rev() {
                    queue.push_front((src, depth + 1));
                }
            }
        }

        Vec::new()
    }

    /// VidSrc-family pages build their players client-side; scraping them is
    /// pointless. Hand the parsed identifier to the installed stream source.
    async fn resolve_via_delegate(&self, embed: &Url) -> Vec<ResolvedStream> {
        let Some(delegate) = &self.delegate else {
            return Vec::new();
        };
        let Some(target) = EmbedTarget::from_url(embed) else {
            debug!(url = embed.as_str(), "no content identifier in embed URL");
            return Vec::new();
        };
        delegate.streams(&target).await
    }

    /// 2embed-style pages load sources from a secondary API; find the
    /// endpoint calls in the page and probe them directly.
    async fn probe_api_endpoints(&self, embed: &Url) -> Vec<ResolvedStream> {
        let referer = format!("{}/", embed.origin().ascii_serialization());
        let body = match self.get(embed.as_str(), Some(&referer)).await {
            Ok(result) => result.text(),
            Err(err) => {
                warn!(url = embed.as_str(), %err, "embed page fetch failed");
                return Vec::new();
            }
        };

        let mut seen = HashSet::new();
        let mut endpoints = Vec::new();
        for re in API_PROBE_PATTERNS.iter() {
            for caps in re.captures_iter(&body) {
                let Some(endpoint) = normalize_candidate(&caps[1], Some(embed)) else {
                    continue;
                };
                if seen.insert(endpoint.clone()) {
                    endpoints.push(endpoint);
                }
            }
        }

        let mut seen_urls = HashSet::new();
        let mut streams = Vec::new();
        for endpoint in endpoints.into_iter().take(MAX_API_PROBES) {
            let text = match self.get(&endpoint, Some(embed.as_str())).await {
                Ok(result) => result.text(),
                Err(err) => {
                    warn!(url = endpoint, %err, "api probe failed");
                    continue;
                }
            };
            for caps in API_RESPONSE_RE.captures_iter(&text) {
                let Some(url) = normalize_candidate(&caps[1], Some(embed)) else {
                    continue;
                };
                if seen_urls.insert(url.clone()) {
                    streams.push(ResolvedStream {
                        stream_type: classify(&url),
                        quality: guess_quality(&url).to_string(),
                        source: "api_probe".to_string(),
                        url,
                    });
                }
            }
        }
        streams
    }

    /// Autoembed-style pages hide the stream URL in base64 passed to a
    /// client-side decoder call. Decode every payload that turns into a
    /// video URL.
    async fn decode_embedded_payloads(&self, embed: &Url) -> Vec<ResolvedStream> {
        let referer = format!("{}/", embed.origin().ascii_serialization());
        let body = match self.get(embed.as_str(), Some(&referer)).await {
            Ok(result) => result.text(),
            Err(err) => {
                warn!(url = embed.as_str(), %err, "embed page fetch failed");
                return Vec::new();
            }
        };

        let mut seen = HashSet::new();
        let mut streams = Vec::new();
        for re in ENCODED_PATTERNS.iter() {
            for caps in re.captures_iter(&body) {
                let decoded = match decode_base64(&caps[1]) {
                    Ok(decoded) => decoded,
                    Err(err) => {
                        debug!(%err, "payload did not decode");
                        continue;
                    }
                };
                if !decoded.contains(".m3u8") && !decoded.contains(".mp4") {
                    continue;
                }
                let Some(url) = normalize_candidate(&decoded, Some(embed)) else {
                    continue;
                };
                if seen.insert(url.clone()) {
                    streams.push(ResolvedStream {
                        stream_type: classify(&url),
                        quality: guess_quality(&url).to_string(),
                        source: "decoded".to_string(),
                        url,
                    });
                }
            }
        }
        streams
    }
}

impl Default for Resolver {
    fn default() -> Self {
        Self::new(Options::default())
    }
}

/// Pick one stream from the candidate list. A server hint wins when it
/// matches a candidate's URL or source; otherwise the highest-priority
/// candidate (the first) is returned.
fn pick(streams: Vec<ResolvedStream>, server_hint: Option<&str>) -> Option<ResolvedStream> {
    if let Some(hint) = server_hint {
        let hint = hint.to_lowercase();
        if let Some(pos) = streams
            .iter()
            .position(|s| s.url.to_lowercase().contains(&hint) || s.source.to_lowercase().contains(&hint))
        {
            return streams.into_iter().nth(pos);
        }
    }
    streams.into_iter().next()
}
