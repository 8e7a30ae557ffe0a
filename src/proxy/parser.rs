//! Candidate extraction and deduplication

use crate::proxy::models::ProxyCandidate;
use crate::Result;
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashSet;
use std::fs;
use std::path::Path;

/// Regex pattern to match IP:PORT patterns in text
static IP_PORT_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(\d{1,3}\.\d{1,3}\.\d{1,3}\.\d{1,3}):(\d{1,5})").expect("Invalid IP:PORT regex")
});

/// Extracts proxy candidates from arbitrary text
pub struct ProxyParser;

impl ProxyParser {
    /// Scan text for `ip:port` shaped substrings, in order of appearance.
    ///
    /// Octets and ports are not range-checked. Duplicates are returned as found.
    pub fn extract(content: &str) -> Vec<ProxyCandidate> {
        IP_PORT_REGEX
            .captures_iter(content)
            .filter_map(|cap| {
                let host = cap.get(1)?.as_str();
                // at most 5 digits, always fits
                let port: u32 = cap.get(2)?.as_str().parse().ok()?;
                Some(ProxyCandidate::new(host, port))
            })
            .collect()
    }

    /// Extract candidates from a local file
    pub fn extract_file<P: AsRef<Path>>(path: P) -> Result<Vec<ProxyCandidate>> {
        let content = fs::read_to_string(path)?;
        Ok(Self::extract(&content))
    }

    /// Collapse candidates to unique `(host, port)` pairs, keeping first-seen order
    pub fn dedup(candidates: Vec<ProxyCandidate>) -> Vec<ProxyCandidate> {
        let mut seen = HashSet::with_capacity(candidates.len());
        candidates
            .into_iter()
            .filter(|candidate| seen.insert(candidate.clone()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_extract_simple_list() {
        let content = r#"
192.168.1.1:8080
192.168.1.2:3128
10.0.0.1:1080
"#;
        let candidates = ProxyParser::extract(content);
        assert_eq!(
            candidates,
            vec![
                ProxyCandidate::new("192.168.1.1", 8080),
                ProxyCandidate::new("192.168.1.2", 3128),
                ProxyCandidate::new("10.0.0.1", 1080),
            ]
        );
    }

    #[test]
    fn test_extract_from_html_like_content() {
        let content = r#"
<html>
<body>
<table>
<tr><td>192.168.1.1</td><td>8080</td></tr>
</table>
Some text with 10.0.0.1:3128 embedded
</body>
</html>
"#;
        let candidates = ProxyParser::extract(content);
        assert_eq!(candidates, vec![ProxyCandidate::new("10.0.0.1", 3128)]);
    }

    #[test]
    fn test_extract_passes_through_out_of_range_values() {
        let candidates = ProxyParser::extract("999.999.999.999:99999 and 1.2.3.4:0");
        assert_eq!(
            candidates,
            vec![
                ProxyCandidate::new("999.999.999.999", 99999),
                ProxyCandidate::new("1.2.3.4", 0),
            ]
        );
        assert!(candidates[0].ip().is_none());
    }

    #[test]
    fn test_extract_keeps_duplicates() {
        let candidates = ProxyParser::extract("1.1.1.1:80 1.1.1.1:80");
        assert_eq!(candidates.len(), 2);
    }

    #[test]
    fn test_extract_empty() {
        assert!(ProxyParser::extract("").is_empty());
        assert!(ProxyParser::extract("no proxies here, 1.2.3:80").is_empty());
    }

    #[test]
    fn test_dedup_keeps_first_seen_order() {
        let candidates = vec![
            ProxyCandidate::new("1.2.3.4", 8080),
            ProxyCandidate::new("9.9.9.9", 80),
            ProxyCandidate::new("1.2.3.4", 8080),
            ProxyCandidate::new("1.2.3.4", 8081),
        ];
        assert_eq!(
            ProxyParser::dedup(candidates),
            vec![
                ProxyCandidate::new("1.2.3.4", 8080),
                ProxyCandidate::new("9.9.9.9", 80),
                ProxyCandidate::new("1.2.3.4", 8081),
            ]
        );
    }

    fn candidate_strategy() -> impl Strategy<Value = ProxyCandidate> {
        (0u8..4, 0u32..4).prop_map(|(octet, port)| ProxyCandidate::new(format!("10.0.0.{octet}"), port))
    }

    proptest! {
        #[test]
        fn prop_extract_only_yields_proxy_shapes(text in "[0-9.: a-z\n]{0,200}") {
            let shape = Regex::new(r"^\d{1,3}\.\d{1,3}\.\d{1,3}\.\d{1,3}:\d{1,5}$").unwrap();
            let first = ProxyParser::extract(&text);
            for candidate in &first {
                let rendered = candidate.to_string();
                prop_assert!(shape.is_match(&rendered));
                let host_prefix = format!("{}:", candidate.host);
                prop_assert!(text.contains(&host_prefix));
            }
            prop_assert_eq!(first, ProxyParser::extract(&text));
        }

        #[test]
        fn prop_dedup_is_unique_and_idempotent(input in prop::collection::vec(candidate_strategy(), 0..40)) {
            let once = ProxyParser::dedup(input.clone());
            prop_assert!(once.len() <= input.len());
            let unique: HashSet<_> = once.iter().collect();
            prop_assert_eq!(unique.len(), once.len());
            prop_assert_eq!(ProxyParser::dedup(once.clone()), once);
        }
    }
}
