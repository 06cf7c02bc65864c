// ABOUTME: The ordered regex pattern table used to pull video URLs out of embed pages.
// ABOUTME: Treated as configuration data; the scan loop never changes when a site does.

use once_cell::sync::Lazy;
use regex::Regex;

/// One extraction rule: a regex and the capture group holding the URL.
/// Group 0 means the whole match (used by the bare-URL catch-all).
#[derive(Debug, Clone)]
pub struct ExtractPattern {
    pub regex: Regex,
    pub group: usize,
}

impl ExtractPattern {
    pub fn new(pattern: &str, group: usize) -> Self {
        Self {
            regex: Regex::new(pattern).expect("invalid extraction pattern"),
            group,
        }
    }
}

/// Ordered list of extraction rules, scanned pattern-major: every match of
/// the first pattern is collected before the second pattern runs.
#[derive(Debug, Clone)]
pub struct PatternSet {
    patterns: Vec<ExtractPattern>,
}

impl PatternSet {
    pub fn new(patterns: Vec<ExtractPattern>) -> Self {
        Self { patterns }
    }

    pub fn iter(&self) -> impl Iterator<Item = &ExtractPattern> {
        self.patterns.iter()
    }
}

impl Default for PatternSet {
    fn default() -> Self {
        let keyed = |key: &str, ext: &str| {
            ExtractPattern::new(
                &format!(r#"(?i){}\s*[:=]\s*["']([^"']*\.{}[^"']*)["']"#, key, ext),
                1,
            )
        };
        Self::new(vec![
            // HLS manifest fields, highest priority.
            keyed("file", "m3u8"),
            keyed("src", "m3u8"),
            keyed("source", "m3u8"),
            keyed("playlist", "m3u8"),
            ExtractPattern::new(r#"(?i)"hls"\s*:\s*"([^"]+\.m3u8[^"]*)""#, 1),
            // Bare .m3u8 string literal.
            ExtractPattern::new(r#"(?i)["']([^"'\s]+\.m3u8[^"']*)["']"#, 1),
            // MP4 fields.
            keyed("file", "mp4"),
            keyed("src", "mp4"),
            keyed("source", "mp4"),
            keyed("url", "mp4"),
            // Embedded JSON fields, any container.
            ExtractPattern::new(
                r#"(?i)"(?:file|url|source|stream|video)"\s*:\s*"([^"]+\.(?:m3u8|mp4|mkv|avi|webm)[^"]*)""#,
                1,
            ),
            // Catch-all: any bare URL ending in a video extension.
            ExtractPattern::new(
                r#"(?i)(?:https?:)?//[^"'\s<>]+\.(?:m3u8|mp4|mkv|avi|webm)(?:[?#][^"'\s<>]*)?"#,
                0,
            ),
        ])
    }
}

/// Call-like text that looks like a secondary API endpoint worth probing.
pub static API_PROBE_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    vec![
        Regex::new(r#"(?i)fetch\(['"]([^'"]*api[^'"]*)['"]"#).unwrap(),
        Regex::new(r#"(?i)xhr\.open\(['"]GET['"],\s*['"]([^'"]+)['"]"#).unwrap(),
        Regex::new(r#"(?i)\$\.get\(['"]([^'"]+)['"]"#).unwrap(),
        Regex::new(r#"(?i)ajax\(['"]([^'"]+)['"]"#).unwrap(),
    ]
});

/// Video URL inside a probed API response.
pub static API_RESPONSE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?i)"(?:file|url|source)"\s*:\s*"([^"]+\.(?:m3u8|mp4)[^"]*)""#).unwrap()
});

/// Base64 payloads hidden inside decoder-call-like text.
pub static ENCODED_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    vec![
        Regex::new(r#"(?i)atob\(['"]([A-Za-z0-9+/=]+)['"]\)"#).unwrap(),
        Regex::new(r#"(?i)decode\(['"]([A-Za-z0-9+/=]+)['"]\)"#).unwrap(),
        Regex::new(r#"(?i)decrypt\(['"]([A-Za-z0-9+/=]+)['"]\)"#).unwrap(),
    ]
});
