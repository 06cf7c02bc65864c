// ABOUTME: Body scanning for the embed resolver: pattern matching, URL normalization,
// ABOUTME: candidate deduplication, and iframe source collection.

pub mod patterns;
pub mod variants;

use std::collections::HashSet;

use scraper::{Html, Selector};
use url::Url;

use crate::stream::{classify, guess_quality, ResolvedStream};
use patterns::PatternSet;

/// At most this many iframes are followed per page.
pub const MAX_IFRAMES_PER_PAGE: usize = 3;

/// Iframe recursion is strictly bounded at this depth. Termination relies
/// on the depth counter alone, not on visited-URL tracking.
pub const MAX_IFRAME_DEPTH: u8 = 2;

/// Normalize a raw candidate into an absolute URL.
///
/// Rejects empty strings, exact `about:blank`, and `javascript:`
/// pseudo-URLs. Protocol-relative candidates get `https:`; rooted and
/// relative paths resolve against the embed URL; anything else without a
/// scheme gets a bare `https://` prefix.
pub fn normalize_candidate(raw: &str, base: Option<&Url>) -> Option<String> {
    let raw = raw.trim();
    if raw.is_empty() || raw == "about:blank" || raw.starts_with("javascript:") {
        return None;
    }
    if let Some(rest) = raw.strip_prefix("//") {
        return Some(format!("https://{}", rest));
    }
    if raw.contains("://") {
        return Some(raw.to_string());
    }
    if let Some(base) = base {
        if let Ok(joined) = base.join(raw) {
            return Some(joined.to_string());
        }
    }
    Some(format!("https://{}", raw))
}

/// Run the pattern table over a raw body and collect normalized candidates.
///
/// Patterns run in priority order; within a pattern every match in the body
/// is collected, not just the first. The final list is deduplicated by
/// exact URL, preserving discovery order.
pub fn scan_body(
    body: &str,
    base: Option<&Url>,
    set: &PatternSet,
    source: &str,
) -> Vec<ResolvedStream> {
    let mut seen = HashSet::new();
    let mut candidates = Vec::new();

    for pattern in set.iter() {
        for caps in pattern.regex.captures_iter(body) {
            let Some(m) = caps.get(pattern.group) else {
                continue;
            };
            let Some(url) = normalize_candidate(m.as_str(), base) else {
                continue;
            };
            if !seen.insert(url.clone()) {
                continue;
            }
            candidates.push(ResolvedStream {
                stream_type: classify(&url),
                quality: guess_quality(&url).to_string(),
                source: source.to_string(),
                url,
            });
        }
    }

    candidates
}

/// Collect up to `limit` iframe src attributes from a page, skipping
/// `about:blank`, normalized to absolute URLs.
pub fn iframe_sources(body: &str, base: Option<&Url>, limit: usize) -> Vec<String> {
    let doc = Html::parse_document(body);
    let Ok(selector) = Selector::parse("iframe") else {
        return Vec::new();
    };
    doc.select(&selector)
        .filter_map(|el| el.value().attr("src"))
        .filter_map(|src| normalize_candidate(src, base))
        .take(limit)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stream::StreamType;
    use pretty_assertions::assert_eq;

    fn base(url: &str) -> Url {
        Url::parse(url).unwrap()
    }

    #[test]
    fn normalize_protocol_relative_gets_https() {
        let got = normalize_candidate("//cdn.example.com/a.m3u8", None).unwrap();
        assert_eq!(got, "https://cdn.example.com/a.m3u8");
    }

    #[test]
    fn normalize_rooted_path_uses_embed_origin() {
        let b = base("https://embed.example.com/e/abc");
        let got = normalize_candidate("/v/a.mp4", Some(&b)).unwrap();
        assert_eq!(got, "https://embed.example.com/v/a.mp4");
    }

    #[test]
    fn normalize_relative_path_joins_against_embed_url() {
        let b = base("https://nested.example.com/embed");
        let got = normalize_candidate("video.mp4", Some(&b)).unwrap();
        assert_eq!(got, "https://nested.example.com/video.mp4");
    }

    #[test]
    fn normalize_bare_host_without_base_gets_scheme() {
        let got = normalize_candidate("cdn.example.com/a.m3u8", None).unwrap();
        assert_eq!(got, "https://cdn.example.com/a.m3u8");
    }

    #[test]
    fn normalize_rejects_junk() {
        assert_eq!(normalize_candidate("", None), None);
        assert_eq!(normalize_candidate("about:blank", None), None);
        assert_eq!(normalize_candidate(" about:blank ", None), None);
        assert_eq!(normalize_candidate("javascript:void(0)", None), None);
    }

    #[test]
    fn normalize_keeps_urls_merely_containing_about_blank() {
        let got = normalize_candidate("https://x/e?return=about:blank", None).unwrap();
        assert_eq!(got, "https://x/e?return=about:blank");
    }

    #[test]
    fn scan_finds_json_file_field_as_hls() {
        let body = r#"{"file":"https://x/y.m3u8"}"#;
        let hits = scan_body(body, None, &PatternSet::default(), "direct");
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].url, "https://x/y.m3u8");
        assert_eq!(hits[0].stream_type, StreamType::Hls);
    }

    #[test]
    fn scan_normalizes_protocol_relative_match() {
        let body = r#"var file = "//cdn.example.com/master.m3u8";"#;
        let hits = scan_body(body, None, &PatternSet::default(), "direct");
        assert_eq!(hits[0].url, "https://cdn.example.com/master.m3u8");
    }

    #[test]
    fn scan_dedupes_identical_urls() {
        let body = r#"
            var file = "https://x/a.m3u8";
            var src = "https://x/a.m3u8";
        "#;
        let hits = scan_body(body, None, &PatternSet::default(), "direct");
        assert_eq!(hits.len(), 1);
    }

    #[test]
    fn scan_collects_all_matches_in_priority_order() {
        let body = r#"
            var src = "https://x/b-720.m3u8";
            var file = "https://x/a-1080.m3u8";
        "#;
        let hits = scan_body(body, None, &PatternSet::default(), "direct");
        // file-keyed pattern outranks src-keyed regardless of body position.
        assert_eq!(hits[0].url, "https://x/a-1080.m3u8");
        assert_eq!(hits[0].quality, "1080p");
        assert_eq!(hits[1].url, "https://x/b-720.m3u8");
    }

    #[test]
    fn scan_skips_rejected_candidates() {
        let body = r#"var file = "javascript:play.m3u8";"#;
        let hits = scan_body(body, None, &PatternSet::default(), "direct");
        assert!(hits.is_empty());
    }

    #[test]
    fn scan_no_match_yields_empty() {
        let hits = scan_body(
            "<html><body>nothing here</body></html>",
            None,
            &PatternSet::default(),
            "direct",
        );
        assert!(hits.is_empty());
    }

    #[test]
    fn iframes_collected_in_order_with_limit() {
        let b = base("https://host.example/page");
        let body = r#"
            <iframe src="about:blank"></iframe>
            <iframe src="//one.example/e"></iframe>
            <iframe src="/two"></iframe>
            <iframe src="https://three.example/e"></iframe>
            <iframe src="https://four.example/e"></iframe>
        "#;
        let srcs = iframe_sources(body, Some(&b), MAX_IFRAMES_PER_PAGE);
        assert_eq!(
            srcs,
            vec![
                "https://one.example/e",
                "https://host.example/two",
                "https://three.example/e",
            ]
        );
    }

    #[test]
    fn iframes_empty_when_none_present() {
        assert!(iframe_sources("<html></html>", None, 3).is_empty());
    }
}
