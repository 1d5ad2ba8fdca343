use crate::UrlError;
use url::Url;

/// Normalizes a URL so that two strings referring to "the same" resource
/// collapse to one bloom slot and one frontier-file entry.
///
/// # Normalization Steps
///
/// 1. Lowercase scheme and host; strip default ports (`:80`, `:443`).
/// 2. Discard the fragment.
/// 3. Remove duplicate slashes in the path; remove `./` and resolve `../`
///    segments lexically.
/// 4. Sort query parameters lexicographically; drop an empty trailing `?`.
/// 5. Reject non-`http`/`https` schemes.
/// 6. Reject hosts that have no public suffix.
///
/// This does not enforce HTTPS, strip a `www.` prefix, or drop tracking
/// query parameters: none of those collapse two distinct resources onto one
/// identity, so normalization leaves them alone.
pub fn normalize_url(url_str: &str) -> Result<Url, UrlError> {
    let mut url = Url::parse(url_str).map_err(|e| UrlError::Parse(e.to_string()))?;

    if url.scheme() != "http" && url.scheme() != "https" {
        return Err(UrlError::InvalidScheme(format!(
            "only http and https are supported, got: {}",
            url.scheme()
        )));
    }

    // `Url::parse` already lowercases scheme and host and drops a port that
    // matches the scheme's default, but we normalize explicitly rather than
    // rely on that for hosts handed to us pre-parsed from elsewhere.
    let host = url
        .host_str()
        .ok_or(UrlError::MissingDomain)?
        .to_lowercase();
    url.set_host(Some(&host))
        .map_err(|e| UrlError::Malformed(format!("failed to set host: {e}")))?;
    strip_default_port(&mut url);

    if !has_public_suffix(&host) {
        return Err(UrlError::NoPublicSuffix(host));
    }

    url.set_fragment(None);

    let normalized_path = normalize_path(url.path());
    url.set_path(&normalized_path);

    if url.query().is_some() {
        let sorted = sort_query_params(&url);
        if sorted.is_empty() {
            url.set_query(None);
        } else {
            let query_string = sorted
                .iter()
                .map(|(k, v)| format!("{k}={v}"))
                .collect::<Vec<_>>()
                .join("&");
            url.set_query(Some(&query_string));
        }
    }

    Ok(url)
}

fn strip_default_port(url: &mut Url) {
    let default_port = match url.scheme() {
        "http" => Some(80),
        "https" => Some(443),
        _ => None,
    };
    if url.port() == default_port {
        let _ = url.set_port(None);
    }
}

/// Rejects hosts with no recognized public suffix (bare TLDs, raw IPs,
/// `localhost`, single labels).
fn has_public_suffix(host: &str) -> bool {
    addr::parse_domain_name(host)
        .map(|d| d.has_known_suffix())
        .unwrap_or(false)
}

/// Removes duplicate slashes and resolves `.`/`..` segments lexically,
/// without removing a trailing slash (unlike a filesystem path, `/a/` and
/// `/a` can be different resources to an HTTP server).
fn normalize_path(path: &str) -> String {
    if path.is_empty() {
        return "/".to_string();
    }

    let had_trailing_slash = path.len() > 1 && path.ends_with('/');
    let mut segments: Vec<&str> = Vec::new();
    for segment in path.split('/') {
        match segment {
            "" | "." => continue,
            ".." => {
                segments.pop();
            }
            _ => segments.push(segment),
        }
    }

    if segments.is_empty() {
        return "/".to_string();
    }

    let mut result = format!("/{}", segments.join("/"));
    if had_trailing_slash {
        result.push('/');
    }
    result
}

fn sort_query_params(url: &Url) -> Vec<(String, String)> {
    let mut params: Vec<(String, String)> = url
        .query_pairs()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
    params.sort_by(|a, b| a.0.cmp(&b.0).then_with(|| a.1.cmp(&b.1)));
    params
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lowercases_scheme_and_host() {
        let result = normalize_url("HTTPS://EXAMPLE.COM/Page").unwrap();
        assert_eq!(result.as_str(), "https://example.com/Page");
    }

    #[test]
    fn strips_default_https_port() {
        let result = normalize_url("https://example.com:443/page").unwrap();
        assert_eq!(result.as_str(), "https://example.com/page");
    }

    #[test]
    fn strips_default_http_port() {
        let result = normalize_url("http://example.com:80/page").unwrap();
        assert_eq!(result.as_str(), "http://example.com/page");
    }

    #[test]
    fn keeps_non_default_port() {
        let result = normalize_url("https://example.com:8443/page").unwrap();
        assert_eq!(result.as_str(), "https://example.com:8443/page");
    }

    #[test]
    fn discards_fragment() {
        let result = normalize_url("https://example.com/page#section").unwrap();
        assert_eq!(result.as_str(), "https://example.com/page");
    }

    #[test]
    fn collapses_duplicate_slashes() {
        let result = normalize_url("https://example.com///path//to///page").unwrap();
        assert_eq!(result.as_str(), "https://example.com/path/to/page");
    }

    #[test]
    fn resolves_dot_segments() {
        let result = normalize_url("https://example.com/a/../b/./c").unwrap();
        assert_eq!(result.as_str(), "https://example.com/b/c");
    }

    #[test]
    fn dot_dot_at_root_does_not_escape() {
        let result = normalize_url("https://example.com/../page").unwrap();
        assert_eq!(result.as_str(), "https://example.com/page");
    }

    #[test]
    fn preserves_trailing_slash() {
        let result = normalize_url("https://example.com/page/").unwrap();
        assert_eq!(result.as_str(), "https://example.com/page/");
    }

    #[test]
    fn empty_path_becomes_root() {
        let result = normalize_url("https://example.com").unwrap();
        assert_eq!(result.as_str(), "https://example.com/");
    }

    #[test]
    fn sorts_query_params_lexicographically() {
        let result = normalize_url("https://example.com/page?b=2&a=1").unwrap();
        assert_eq!(result.as_str(), "https://example.com/page?a=1&b=2");
    }

    #[test]
    fn drops_empty_trailing_query() {
        let result = normalize_url("https://example.com/page?").unwrap();
        assert_eq!(result.as_str(), "https://example.com/page");
    }

    #[test]
    fn does_not_enforce_https() {
        let result = normalize_url("http://example.com/page").unwrap();
        assert_eq!(result.as_str(), "http://example.com/page");
    }

    #[test]
    fn does_not_strip_www() {
        let result = normalize_url("https://www.example.com/").unwrap();
        assert_eq!(result.as_str(), "https://www.example.com/");
    }

    #[test]
    fn does_not_remove_tracking_params() {
        let result = normalize_url("https://example.com/page?utm_source=twitter").unwrap();
        assert_eq!(result.as_str(), "https://example.com/page?utm_source=twitter");
    }

    #[test]
    fn rejects_invalid_scheme() {
        let result = normalize_url("ftp://example.com/page");
        assert!(matches!(result.unwrap_err(), UrlError::InvalidScheme(_)));
    }

    #[test]
    fn rejects_malformed_url() {
        assert!(normalize_url("not a url").is_err());
    }

    #[test]
    fn rejects_host_with_no_public_suffix() {
        let result = normalize_url("https://localhost/page");
        assert!(matches!(result.unwrap_err(), UrlError::NoPublicSuffix(_)));
    }

    #[test]
    fn rejects_bare_ip_host() {
        let result = normalize_url("https://127.0.0.1/page");
        assert!(result.is_err());
    }

    #[test]
    fn accepts_subdomain_with_valid_suffix() {
        let result = normalize_url("https://blog.example.com/post").unwrap();
        assert_eq!(result.as_str(), "https://blog.example.com/post");
    }

    #[test]
    fn equivalent_urls_normalize_identically() {
        let a = normalize_url("HTTPS://Example.com:443/a/../b/?y=2&x=1#frag").unwrap();
        let b = normalize_url("https://example.com/b?x=1&y=2").unwrap();
        assert_eq!(a.as_str(), b.as_str());
    }
}
