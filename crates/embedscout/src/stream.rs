// ABOUTME: Core stream data model: ResolvedStream, Stream output contract, MediaType.
// ABOUTME: Also holds the quality-string heuristics shared by resolver and providers.

use std::collections::HashMap;
use std::fmt;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

/// Whether a direct stream URL points at an HLS manifest or a plain video file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StreamType {
    Hls,
    Mp4,
}

impl fmt::Display for StreamType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            StreamType::Hls => "hls",
            StreamType::Mp4 => "mp4",
        };
        write!(f, "{}", s)
    }
}

/// Classify a URL as HLS or MP4 by substring.
pub fn classify(url: &str) -> StreamType {
    if url.contains(".m3u8") {
        StreamType::Hls
    } else {
        StreamType::Mp4
    }
}

/// Coarse quality guess from URL text. Not derived from stream inspection.
pub fn guess_quality(url: &str) -> &'static str {
    if url.contains("1080") {
        "1080p"
    } else if url.contains("720") {
        "720p"
    } else {
        "HD"
    }
}

/// A direct playable video URL pulled out of an embed page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolvedStream {
    pub url: String,
    #[serde(rename = "type")]
    pub stream_type: StreamType,
    pub quality: String,
    pub source: String,
}

/// Movie or episodic content, for metadata lookup and search filtering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaType {
    Movie,
    Tv,
}

impl MediaType {
    pub fn as_str(&self) -> &'static str {
        match self {
            MediaType::Movie => "movie",
            MediaType::Tv => "tv",
        }
    }
}

impl fmt::Display for MediaType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl From<&str> for MediaType {
    fn from(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "tv" | "series" | "show" => MediaType::Tv,
            _ => MediaType::Movie,
        }
    }
}

/// The caller-facing output contract of a provider.
///
/// `headers` is the exact header set a consuming player must replay,
/// or the upstream origin will reject the request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Stream {
    pub name: String,
    pub title: String,
    pub url: String,
    pub quality: String,
    pub size: String,
    pub headers: HashMap<String, String>,
    pub provider: String,
}

static QUALITY_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)(480p|720p|1080p|2160p|4K|HD|CAM|TS)").unwrap());

static LINK_QUALITY_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)(\d{3,4}p|HD|CAM|TS|WEBRip|BluRay)").unwrap());

static YEAR_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\((\d{4})\)").unwrap());

/// Extract a coarse quality label from free text, defaulting to "HD".
pub fn extract_quality(text: &str) -> String {
    QUALITY_RE
        .captures(text)
        .map(|c| c[1].to_uppercase())
        .unwrap_or_else(|| "HD".to_string())
}

/// Extract a quality label from download-link text, defaulting to "Unknown".
pub fn link_quality(text: &str) -> String {
    LINK_QUALITY_RE
        .captures(text)
        .map(|c| c[1].to_string())
        .unwrap_or_else(|| "Unknown".to_string())
}

/// Numeric rank for sorting quality labels, highest first.
pub fn quality_rank(quality: &str) -> u32 {
    match quality.to_uppercase().as_str() {
        "CAM" => 100,
        "TS" => 200,
        "480P" => 480,
        "720P" | "HD" => 720,
        "1080P" => 1080,
        "2160P" | "4K" => 2160,
        _ => 720,
    }
}

/// Strip a trailing "(year)" and common HTML entities from a scraped title.
pub fn clean_title(title: &str) -> String {
    YEAR_RE
        .replace(title, "")
        .replace("&#8211;", "-")
        .replace("&#8217;", "'")
        .trim()
        .to_string()
}

/// Pull a four-digit year out of a "(year)" suffix, if present.
pub fn extract_year(title: &str) -> Option<i32> {
    YEAR_RE
        .captures(title)
        .and_then(|c| c[1].parse::<i32>().ok())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn classify_by_extension_substring() {
        assert_eq!(classify("https://cdn.example.com/a.m3u8?tok=1"), StreamType::Hls);
        assert_eq!(classify("https://cdn.example.com/a.mp4"), StreamType::Mp4);
        assert_eq!(classify("https://cdn.example.com/a.mkv"), StreamType::Mp4);
    }

    #[test]
    fn quality_guess_substring() {
        assert_eq!(guess_quality("https://x/v-1080.m3u8"), "1080p");
        assert_eq!(guess_quality("https://x/v-720.mp4"), "720p");
        assert_eq!(guess_quality("https://x/v.mp4"), "HD");
    }

    #[test]
    fn extract_quality_matches_known_labels() {
        assert_eq!(extract_quality("Watch in 1080p now"), "1080P");
        assert_eq!(extract_quality("CAM print"), "CAM");
        assert_eq!(extract_quality("no label here"), "HD");
    }

    #[test]
    fn link_quality_defaults_to_unknown() {
        assert_eq!(link_quality("Download 720p"), "720p");
        assert_eq!(link_quality("BluRay rip"), "BluRay");
        assert_eq!(link_quality("Watch now"), "Unknown");
    }

    #[test]
    fn quality_rank_orders_labels() {
        assert!(quality_rank("1080p") > quality_rank("720p"));
        assert!(quality_rank("720p") > quality_rank("CAM"));
        assert_eq!(quality_rank("4K"), quality_rank("2160p"));
        assert_eq!(quality_rank("garbage"), 720);
    }

    #[test]
    fn clean_title_strips_year_and_entities() {
        assert_eq!(clean_title("Inception (2010)"), "Inception");
        assert_eq!(clean_title("Spider &#8211; Man&#8217;s"), "Spider - Man's");
    }

    #[test]
    fn extract_year_from_parens() {
        assert_eq!(extract_year("Inception (2010)"), Some(2010));
        assert_eq!(extract_year("Inception"), None);
    }

    #[test]
    fn media_type_from_str() {
        assert_eq!(MediaType::from("tv"), MediaType::Tv);
        assert_eq!(MediaType::from("series"), MediaType::Tv);
        assert_eq!(MediaType::from("movie"), MediaType::Movie);
        assert_eq!(MediaType::from("anything"), MediaType::Movie);
    }

    #[test]
    fn stream_serializes_with_headers() {
        let mut headers = HashMap::new();
        headers.insert("Referer".to_string(), "https://site.example/".to_string());
        let stream = Stream {
            name: "Coflix Server 1".to_string(),
            title: "Inception (2010)".to_string(),
            url: "https://cdn.example.com/a.m3u8".to_string(),
            quality: "HD".to_string(),
            size: "Unknown".to_string(),
            headers,
            provider: "coflix".to_string(),
        };
        let json = serde_json::to_value(&stream).expect("serialize");
        assert_eq!(json["provider"], "coflix");
        assert_eq!(json["headers"]["Referer"], "https://site.example/");
    }
}
