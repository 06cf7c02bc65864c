// ABOUTME: Site-family routing for embed URLs and the structured-target parser
// ABOUTME: used to hand VidSrc-style embeds to a dedicated stream source.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use url::Url;

use crate::error::ScrapeError;
use crate::stream::MediaType;

/// Host families with dedicated extraction strategies. Matching is a
/// lowercase substring test over the whole URL, as the sites themselves
/// rotate hosts under the same naming scheme.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HostFamily {
    VidSrc,
    TwoEmbed,
    AutoEmbed,
    Generic,
}

const VIDSRC_KEYWORDS: &[&str] = &["vidsrc.", "vidapi.", "vsrc", "streamsrcs."];

impl HostFamily {
    pub fn of(url: &str) -> Self {
        let lowered = url.to_lowercase();
        if VIDSRC_KEYWORDS.iter().any(|k| lowered.contains(k)) {
            return HostFamily::VidSrc;
        }
        if lowered.contains("2embed.cc") {
            return HostFamily::TwoEmbed;
        }
        if lowered.contains("autoembed.cc") || lowered.contains("player.autoembed") {
            return HostFamily::AutoEmbed;
        }
        HostFamily::Generic
    }
}

/// A structured content identifier parsed from an embed URL, enough to ask
/// a per-site stream provider for direct URLs instead of scraping the page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmbedTarget {
    pub id: String,
    pub media_type: MediaType,
    pub season: Option<u32>,
    pub episode: Option<u32>,
}

impl EmbedTarget {
    /// Parse a target out of an embed URL's path and query parameters.
    ///
    /// The id comes from a `tmdb` or `imdb` query parameter, falling back
    /// to the last path segment. Returns None when no identifier exists.
    pub fn from_url(url: &Url) -> Option<Self> {
        let query_param = |names: &[&str]| {
            url.query_pairs()
                .find(|(k, _)| names.contains(&k.as_ref()))
                .map(|(_, v)| v.into_owned())
        };

        let id = query_param(&["tmdb", "imdb"]).or_else(|| {
            url.path_segments()?
                .filter(|s| !s.is_empty())
                .last()
                .map(|s| s.to_string())
        })?;
        if id.is_empty() {
            return None;
        }

        let is_tv = url.path().contains("/tv")
            || query_param(&["type"]).as_deref() == Some("tv");

        let season = query_param(&["season", "s"]).and_then(|v| v.parse().ok());
        let episode = query_param(&["episode", "e"]).and_then(|v| v.parse().ok());

        Some(Self {
            id,
            media_type: if is_tv { MediaType::Tv } else { MediaType::Movie },
            season,
            episode,
        })
    }
}

/// Decode a base64 payload to UTF-8 text.
pub fn decode_base64(input: &str) -> Result<String, ScrapeError> {
    let input = input.trim();
    let bytes = BASE64.decode(input).map_err(|e| {
        ScrapeError::decode(input, "DecodePayload", Some(anyhow::anyhow!("{}", e)))
    })?;
    String::from_utf8(bytes).map_err(|e| {
        ScrapeError::decode(input, "DecodePayload", Some(anyhow::anyhow!("{}", e)))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn host_family_routing() {
        assert_eq!(HostFamily::of("https://vidsrc.cc/v2/embed/movie/1"), HostFamily::VidSrc);
        assert_eq!(HostFamily::of("https://vidapi.xyz/embed/1"), HostFamily::VidSrc);
        assert_eq!(HostFamily::of("https://streamsrcs.net/e/1"), HostFamily::VidSrc);
        assert_eq!(HostFamily::of("https://www.2embed.cc/embed/1"), HostFamily::TwoEmbed);
        assert_eq!(
            HostFamily::of("https://player.autoembed.xyz/e/1"),
            HostFamily::AutoEmbed
        );
        assert_eq!(HostFamily::of("https://other.example/e/1"), HostFamily::Generic);
    }

    #[test]
    fn target_from_tmdb_param() {
        let url = Url::parse("https://vidsrc.cc/embed?tmdb=110316&type=tv&season=1&episode=3")
            .unwrap();
        let target = EmbedTarget::from_url(&url).unwrap();
        assert_eq!(target.id, "110316");
        assert_eq!(target.media_type, MediaType::Tv);
        assert_eq!(target.season, Some(1));
        assert_eq!(target.episode, Some(3));
    }

    #[test]
    fn target_from_path_segment() {
        let url = Url::parse("https://vidsrc.cc/v2/embed/movie/603").unwrap();
        let target = EmbedTarget::from_url(&url).unwrap();
        assert_eq!(target.id, "603");
        assert_eq!(target.media_type, MediaType::Movie);
        assert_eq!(target.season, None);
    }

    #[test]
    fn target_detects_tv_from_path() {
        let url = Url::parse("https://vidsrc.cc/embed/tv/110316?s=2&e=5").unwrap();
        let target = EmbedTarget::from_url(&url).unwrap();
        assert_eq!(target.media_type, MediaType::Tv);
        assert_eq!(target.season, Some(2));
        assert_eq!(target.episode, Some(5));
    }

    #[test]
    fn target_missing_identifier_is_none() {
        let url = Url::parse("https://vidsrc.cc/").unwrap();
        assert_eq!(EmbedTarget::from_url(&url), None);
    }

    #[test]
    fn base64_decode_roundtrip() {
        assert_eq!(
            decode_base64("aHR0cHM6Ly94L2EubTN1OA==").unwrap(),
            "https://x/a.m3u8"
        );
        let err = decode_base64("!!not base64!!").unwrap_err();
        assert_eq!(err.code, crate::error::ErrorCode::Decode);
    }
}
