//! Host normalization, the loopback security predicate, and cache-directory
//! resolution used by the credential and recents stores.

use std::path::PathBuf;

use url::Url;

/// Bare hostnames become `https://host`; loopback-ish hosts (`localhost`,
/// `*.localhost`, `127.0.0.1`, `[::1]`) become `http://…`; full URLs pass
/// through unchanged.
pub fn normalize_host(input: &str) -> String {
    if input.contains("://") {
        return input.to_string();
    }
    let (host, rest) = match input.split_once('/') {
        Some((h, r)) => (h, format!("/{r}")),
        None => (input, String::new()),
    };
    if is_loopback_host(host) {
        format!("http://{host}{rest}")
    } else {
        format!("https://{host}{rest}")
    }
}

fn is_loopback_host(host: &str) -> bool {
    if let Some(rest) = host.strip_prefix('[') {
        // Bracketed IPv6 literal, possibly with a trailing `:port` outside
        // the brackets — split on `:` would otherwise chop the literal
        // itself apart at its first colon.
        let literal = rest.split(']').next().unwrap_or(rest);
        return literal == "::1";
    }
    let hostname = host.split(':').next().unwrap_or(host);
    hostname == "localhost" || hostname.ends_with(".localhost") || hostname == "127.0.0.1" || hostname == "::1"
}

/// Rejects `http://` to a non-loopback host; everything else (including
/// `https://` to any host, and `http://` to a loopback host) is safe.
pub fn is_safe_url(url: &str) -> bool {
    let Ok(parsed) = Url::parse(url) else {
        return false;
    };
    if parsed.scheme() != "http" {
        return true;
    }
    match parsed.host_str() {
        Some(host) => is_loopback_host(host),
        None => false,
    }
}

/// Resolves the directory credentials/recents are persisted under, creating
/// it if necessary. Relies on `dirs` rather than a hand-rolled
/// `$XDG_CACHE_HOME`/`$HOME` fallback chain.
pub fn cache_dir(app_name: &str) -> std::io::Result<PathBuf> {
    let base = dirs::cache_dir()
        .or_else(dirs::home_dir)
        .unwrap_or_else(|| PathBuf::from("."));
    let dir = base.join(app_name);
    std::fs::create_dir_all(&dir)?;
    Ok(dir)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bare_hostname_becomes_https() {
        assert_eq!(normalize_host("example.com"), "https://example.com");
    }

    #[test]
    fn loopback_hosts_become_http() {
        assert_eq!(normalize_host("localhost:3000"), "http://localhost:3000");
        assert_eq!(normalize_host("app.localhost"), "http://app.localhost");
        assert_eq!(normalize_host("127.0.0.1:8080"), "http://127.0.0.1:8080");
        assert_eq!(normalize_host("[::1]:9000"), "http://[::1]:9000");
    }

    #[test]
    fn full_urls_pass_through() {
        assert_eq!(
            normalize_host("https://example.com/path"),
            "https://example.com/path"
        );
    }

    #[test]
    fn http_to_remote_host_is_unsafe() {
        assert!(!is_safe_url("http://example.com"));
        assert!(is_safe_url("https://example.com"));
        assert!(is_safe_url("http://localhost:3000"));
        assert!(is_safe_url("http://127.0.0.1:8080"));
    }
}
