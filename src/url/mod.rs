//! URL canonicalization and cache naming
//!
//! Canonical URLs are the identity keys of the whole feed: item ids are
//! hashes of them and the seen-URL window stores them verbatim, so the rules
//! here must stay deterministic across runs.

pub mod listing;

pub use listing::{is_listing_url, UrlFilters};

use crate::UrlError;
use sha2::{Digest, Sha256};
use url::Url;

/// Canonicalizes an href found on a listing page
///
/// Resolves protocol-relative (`//host/...`) and site-relative (`/path`)
/// references against the listing base, validates the scheme and strips the
/// fragment. Query strings are kept: several sources address articles purely
/// through query parameters.
///
/// # Arguments
///
/// * `href` - The raw href attribute value
/// * `base` - The listing page URL the href was found on
///
/// # Returns
///
/// * `Ok(Url)` - Canonical absolute URL
/// * `Err(UrlError)` - The href cannot denote an article
pub fn canonical_url(href: &str, base: &Url) -> Result<Url, UrlError> {
    let trimmed = href.trim();
    if trimmed.is_empty() {
        return Err(UrlError::Parse("empty href".to_string()));
    }

    let mut url = if let Some(rest) = trimmed.strip_prefix("//") {
        Url::parse(&format!("https://{}", rest)).map_err(|e| UrlError::Parse(e.to_string()))?
    } else {
        base.join(trimmed).map_err(|e| UrlError::Parse(e.to_string()))?
    };

    if url.scheme() != "http" && url.scheme() != "https" {
        return Err(UrlError::InvalidScheme(url.scheme().to_string()));
    }

    if url.host_str().is_none() {
        return Err(UrlError::MissingHost);
    }

    url.set_fragment(None);
    Ok(url)
}

/// Extracts the host name from a URL string
pub fn extract_host(url: &str) -> Option<String> {
    Url::parse(url)
        .ok()
        .and_then(|u| u.host_str().map(|h| h.to_lowercase()))
}

/// Derives the page-cache file name for a URL
///
/// The slug is `host-path.html` with every non-alphanumeric path run
/// collapsed to a hyphen; when the URL carries a query string an 8-hex-digit
/// hash suffix keeps differently parameterized pages from colliding.
pub fn cache_slug(url: &Url) -> String {
    let host = url.host_str().unwrap_or("unknown");

    let mut slug = String::new();
    let mut last_dash = true;
    for c in url.path().chars() {
        if c.is_ascii_alphanumeric() {
            slug.push(c);
            last_dash = false;
        } else if !last_dash {
            slug.push('-');
            last_dash = true;
        }
    }
    let slug = slug.trim_matches('-');
    let slug = if slug.is_empty() { "index" } else { slug };

    match url.query() {
        Some(query) if !query.is_empty() => {
            let mut hasher = Sha256::new();
            hasher.update(query.as_bytes());
            let digest = hex::encode(hasher.finalize());
            format!("{}-{}-{}.html", host, slug, &digest[..8])
        }
        _ => format!("{}-{}.html", host, slug),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base() -> Url {
        Url::parse("https://news.example.com/news/").unwrap()
    }

    #[test]
    fn test_canonical_absolute() {
        let url = canonical_url("https://news.example.com/news/1", &base()).unwrap();
        assert_eq!(url.as_str(), "https://news.example.com/news/1");
    }

    #[test]
    fn test_canonical_relative() {
        let url = canonical_url("/news/2", &base()).unwrap();
        assert_eq!(url.as_str(), "https://news.example.com/news/2");
    }

    #[test]
    fn test_canonical_protocol_relative() {
        let url = canonical_url("//other.example.com/a", &base()).unwrap();
        assert_eq!(url.as_str(), "https://other.example.com/a");
    }

    #[test]
    fn test_canonical_strips_fragment() {
        let url = canonical_url("https://news.example.com/news/1#comments", &base()).unwrap();
        assert_eq!(url.as_str(), "https://news.example.com/news/1");
    }

    #[test]
    fn test_canonical_keeps_query() {
        let url = canonical_url("https://example.com/a?id_39=123", &base()).unwrap();
        assert_eq!(url.as_str(), "https://example.com/a?id_39=123");
    }

    #[test]
    fn test_canonical_rejects_other_schemes() {
        assert!(canonical_url("mailto:someone@example.com", &base()).is_err());
        assert!(canonical_url("javascript:void(0)", &base()).is_err());
    }

    #[test]
    fn test_extract_host() {
        assert_eq!(
            extract_host("https://News.Example.com/path"),
            Some("news.example.com".to_string())
        );
        assert_eq!(extract_host("not a url"), None);
    }

    #[test]
    fn test_cache_slug_plain() {
        let url = Url::parse("https://example.com/press/novosti/").unwrap();
        assert_eq!(cache_slug(&url), "example.com-press-novosti.html");
    }

    #[test]
    fn test_cache_slug_root_is_index() {
        let url = Url::parse("https://example.com/").unwrap();
        assert_eq!(cache_slug(&url), "example.com-index.html");
    }

    #[test]
    fn test_cache_slug_query_gets_hash_suffix() {
        let a = Url::parse("https://example.com/list?page=1").unwrap();
        let b = Url::parse("https://example.com/list?page=2").unwrap();

        let slug_a = cache_slug(&a);
        let slug_b = cache_slug(&b);

        assert_ne!(slug_a, slug_b);
        assert!(slug_a.starts_with("example.com-list-"));
        assert!(slug_a.ends_with(".html"));
    }

    #[test]
    fn test_cache_slug_deterministic() {
        let url = Url::parse("https://example.com/list?page=7").unwrap();
        assert_eq!(cache_slug(&url), cache_slug(&url));
    }
}
