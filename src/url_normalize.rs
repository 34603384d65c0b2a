//! # URL Normaliser (§4.1)
//! Pure canonicalisation: scheme upgrade, host lowercasing, tracking-param
//! removal, query-param sorting, fragment/slash/trailing-slash cleanup.

use anyhow::{anyhow, Result};
use once_cell::sync::Lazy;
use std::collections::BTreeSet;
use url::Url;

/// Default set of query parameter names stripped during normalisation.
/// Exact names plus the `utm_*` prefix family.
pub fn default_remove_params() -> BTreeSet<String> {
    [
        "ref", "source", "via", "fbclid", "gclid", "mc_cid", "mc_eid", "_ga", "_gl", "yclid",
        "msclkid",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

#[derive(Debug, Clone)]
pub struct NormalizeOptions {
    pub remove_params: BTreeSet<String>,
    pub strip_trailing_slash: bool,
}

impl Default for NormalizeOptions {
    fn default() -> Self {
        Self {
            remove_params: default_remove_params(),
            strip_trailing_slash: true,
        }
    }
}

fn is_removed_param(name: &str, remove_params: &BTreeSet<String>) -> bool {
    name.starts_with("utm_") || remove_params.contains(name)
}

static SLASH_RUN: Lazy<regex::Regex> = Lazy::new(|| regex::Regex::new("/{2,}").unwrap());

/// Canonicalise a URL per §4.1's ten-step algorithm. Fails with an error
/// (never panics) on non-http(s) or unparseable input.
pub fn normalize(raw: &str, options: &NormalizeOptions) -> Result<String> {
    let mut url = Url::parse(raw).map_err(|e| anyhow!("InvalidURL: {e}"))?;

    // (1) reject non-http(s)
    if url.scheme() != "http" && url.scheme() != "https" {
        return Err(anyhow!("InvalidURL: unsupported scheme {}", url.scheme()));
    }

    // (2) upgrade http -> https
    if url.scheme() == "http" {
        url.set_scheme("https")
            .map_err(|_| anyhow!("InvalidURL: could not upgrade scheme"))?;
    }

    // (3) lowercase host, strip leading www.
    if let Some(host) = url.host_str() {
        let mut host = host.to_ascii_lowercase();
        if let Some(stripped) = host.strip_prefix("www.") {
            host = stripped.to_string();
        }
        url.set_host(Some(&host))
            .map_err(|e| anyhow!("InvalidURL: {e}"))?;
    }

    // (4)+(5) remove tracking params, sort remaining lexicographically
    let kept: BTreeSet<(String, String)> = url
        .query_pairs()
        .filter(|(k, _)| !is_removed_param(k, &options.remove_params))
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();

    // (6) drop fragment
    url.set_fragment(None);

    // (7) collapse consecutive slashes in the path
    let collapsed_path = SLASH_RUN.replace_all(url.path(), "/").to_string();

    // (8) percent-decode then canonical re-encode each path segment
    let re_encoded = collapsed_path
        .split('/')
        .map(|seg| {
            let decoded = percent_decode(seg);
            percent_encode(&decoded)
        })
        .collect::<Vec<_>>()
        .join("/");
    url.set_path(&re_encoded);

    // (9) strip trailing slash (unless bare root)
    if options.strip_trailing_slash {
        let p = url.path().to_string();
        if p.len() > 1 && p.ends_with('/') {
            url.set_path(p.trim_end_matches('/'));
        }
    }

    // (10) drop `?` if query becomes empty; otherwise rewrite sorted query
    if kept.is_empty() {
        url.set_query(None);
    } else {
        let q = kept
            .iter()
            .map(|(k, v)| format!("{}={}", percent_encode_query(k), percent_encode_query(v)))
            .collect::<Vec<_>>()
            .join("&");
        url.set_query(Some(&q));
    }

    Ok(url.to_string())
}

use percent_encoding::{percent_decode_str, utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};

const PATH_SEGMENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~');

fn percent_decode(segment: &str) -> String {
    percent_decode_str(segment).decode_utf8_lossy().into_owned()
}

fn percent_encode(segment: &str) -> String {
    utf8_percent_encode(segment, PATH_SEGMENT).to_string()
}

fn percent_encode_query(s: &str) -> String {
    utf8_percent_encode(s, NON_ALPHANUMERIC).to_string()
}

/// Lowercased host minus a leading `www.`; `None` on unparseable input.
pub fn extract_domain(raw: &str) -> Option<String> {
    let url = Url::parse(raw).ok()?;
    let host = url.host_str()?.to_ascii_lowercase();
    Some(host.strip_prefix("www.").unwrap_or(&host).to_string())
}

pub fn is_same_domain(a: &str, b: &str) -> bool {
    match (extract_domain(a), extract_domain(b)) {
        (Some(x), Some(y)) => x == y,
        _ => false,
    }
}

pub fn is_valid_url(raw: &str) -> bool {
    match Url::parse(raw) {
        Ok(u) => u.scheme() == "http" || u.scheme() == "https",
        Err(_) => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn norm(s: &str) -> String {
        normalize(s, &NormalizeOptions::default()).unwrap()
    }

    #[test]
    fn idempotent_on_valid_url() {
        let u = "https://TechCrunch.com/2024/01/15/ai/?utm_source=t&b=2&a=1";
        let once = norm(u);
        let twice = normalize(&once, &NormalizeOptions::default()).unwrap();
        assert_eq!(once, twice);
    }

    #[test]
    fn strips_tracking_params_and_upgrades_scheme() {
        let a = norm("http://www.TechCrunch.com/2024/01/15/ai/?utm_source=t");
        let b = norm("https://techcrunch.com/2024/01/15/ai");
        assert_eq!(a, b);
        assert_eq!(a, "https://techcrunch.com/2024/01/15/ai");
    }

    #[test]
    fn sorts_remaining_query_params() {
        let a = norm("https://example.com/x?b=2&a=1");
        assert_eq!(a, "https://example.com/x?a=1&b=2");
    }

    #[test]
    fn drops_fragment_and_collapses_slashes() {
        let a = norm("https://example.com//a//b/#frag");
        assert_eq!(a, "https://example.com/a/b");
    }

    #[test]
    fn keeps_bare_root_slash() {
        let a = norm("https://example.com/");
        assert_eq!(a, "https://example.com/");
    }

    #[test]
    fn rejects_non_http_schemes() {
        assert!(normalize("ftp://example.com/x", &NormalizeOptions::default()).is_err());
    }

    #[test]
    fn domain_helpers() {
        assert_eq!(
            extract_domain("https://www.Example.com/x").as_deref(),
            Some("example.com")
        );
        assert!(is_same_domain(
            "https://a.example.com",
            "http://A.Example.com"
        ));
        assert!(!is_same_domain(
            "https://a.example.com",
            "http://b.example.com"
        ));
        assert!(is_same_domain(
            "https://example.com/a",
            "http://www.example.com/b"
        ));
        assert!(is_valid_url("https://example.com"));
        assert!(!is_valid_url("not a url"));
    }
}
