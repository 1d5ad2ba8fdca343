use url::Url;

/// Extracts the domain (host, lowercased, port stripped) from a URL.
///
/// `Url::host_str` already excludes any port, and the host component of a
/// parsed `http`/`https` URL is lowercased by the `url` crate itself, but we
/// lowercase again defensively since callers may hand us a host pulled from
/// somewhere other than a freshly-parsed `Url`.
pub fn extract_domain(url: &Url) -> Option<String> {
    url.host_str().map(|h| h.to_lowercase())
}
