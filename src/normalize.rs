//! URL canonicalization used by the crawler's dedup set.

use url::Url;

/// Canonicalizes a URL for deduplication.
///
/// Drops the fragment and strips trailing slashes from non-root paths while
/// preserving scheme, host, path, and query. Malformed input is returned
/// unchanged; callers that need a valid URL must parse separately. The result
/// is a fixed point: `normalize_url(normalize_url(u)) == normalize_url(u)`.
pub fn normalize_url(raw: &str) -> String {
    let Ok(mut url) = Url::parse(raw) else {
        return raw.to_string();
    };

    url.set_fragment(None);

    let path = url.path();
    if path.len() > 1 && path.ends_with('/') {
        let trimmed = path.trim_end_matches('/');
        let replacement = if trimmed.is_empty() { "/" } else { trimmed }.to_string();
        url.set_path(&replacement);
    }

    url.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_fragment() {
        assert_eq!(
            normalize_url("https://example.com/docs#install"),
            normalize_url("https://example.com/docs"),
        );
    }

    #[test]
    fn strips_trailing_slash_on_non_root_paths() {
        assert_eq!(
            normalize_url("https://example.com/pricing/"),
            "https://example.com/pricing",
        );
    }

    #[test]
    fn keeps_root_slash() {
        assert_eq!(normalize_url("https://example.com/"), "https://example.com/");
    }

    #[test]
    fn preserves_query() {
        assert_eq!(
            normalize_url("https://example.com/search?q=ink#top"),
            "https://example.com/search?q=ink",
        );
    }

    #[test]
    fn passes_malformed_input_through() {
        assert_eq!(normalize_url("not a url"), "not a url");
        assert_eq!(normalize_url("/relative/path"), "/relative/path");
    }

    #[test]
    fn is_idempotent() {
        for raw in [
            "https://example.com",
            "https://example.com/",
            "https://example.com/a/b/",
            "https://example.com/a//",
            "https://example.com/a?x=1#frag",
            "garbage input",
        ] {
            let once = normalize_url(raw);
            assert_eq!(normalize_url(&once), once, "not idempotent for {raw}");
        }
    }
}
