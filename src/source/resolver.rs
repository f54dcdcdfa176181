//! Source resolution for PDF templates, documents and images

use crate::error::{Error, Result};
use crate::source::OutputCache;
use base64::Engine;
use futures_util::StreamExt;
use std::net::IpAddr;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Raw bytes of a resolved source
pub struct ResolvedSource {
    pub data: Vec<u8>,
    pub source_name: String,
}

/// Read a source from a file path
pub fn resolve_path<P: AsRef<Path>>(path: P) -> Result<ResolvedSource> {
    let path = path.as_ref();

    if !path.is_file() {
        return Err(Error::SourceResolution {
            reason: format!("File not found: {}", path.display()),
        });
    }

    let data = std::fs::read(path)?;

    Ok(ResolvedSource {
        data,
        source_name: path.display().to_string(),
    })
}

/// Decode a base64 source. Data URLs (`data:image/png;base64,...`) are accepted.
pub fn resolve_base64(base64_data: &str) -> Result<ResolvedSource> {
    let payload = match base64_data.split_once(";base64,") {
        Some((prefix, payload)) if prefix.starts_with("data:") => payload,
        _ => base64_data,
    };

    let engine = base64::engine::general_purpose::STANDARD;
    let data = engine.decode(payload.trim())?;

    Ok(ResolvedSource {
        data,
        source_name: "<base64>".to_string(),
    })
}

/// Check if an IP address is private/reserved (loopback, link-local, private ranges, etc.)
fn is_private_ip(ip: &IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => {
            v4.is_loopback()
                || v4.is_private()
                || v4.is_link_local()
                || v4.is_broadcast()
                || v4.is_unspecified()
                // CGNAT 100.64/10
                || v4.octets()[0] == 100 && (v4.octets()[1] & 0xC0) == 64
        }
        IpAddr::V6(v6) => {
            if let Some(mapped) = v6.to_ipv4_mapped() {
                return is_private_ip(&IpAddr::V4(mapped));
            }
            let first = v6.segments()[0];
            v6.is_loopback()
                || v6.is_unspecified()
                // fc00::/7 unique local
                || (first & 0xFE00) == 0xFC00
                // fe80::/10 link-local
                || (first & 0xFFC0) == 0xFE80
        }
    }
}

/// Check URL for SSRF by resolving DNS and verifying IPs are public
async fn check_ssrf(url_str: &str) -> Result<()> {
    let parsed = url::Url::parse(url_str).map_err(|e| Error::SourceResolution {
        reason: format!("Invalid URL: {}", e),
    })?;

    if !matches!(parsed.scheme(), "http" | "https") {
        return Err(Error::SourceResolution {
            reason: format!("Unsupported URL scheme: {}", parsed.scheme()),
        });
    }

    let host = parsed.host_str().ok_or_else(|| Error::SourceResolution {
        reason: "URL has no host".to_string(),
    })?;

    let port = parsed.port_or_known_default().unwrap_or(443);
    let addrs = tokio::net::lookup_host((host, port))
        .await
        .map_err(|e| Error::SourceResolution {
            reason: format!("DNS resolution failed for {}: {}", host, e),
        })?;

    for addr in addrs {
        if is_private_ip(&addr.ip()) {
            return Err(Error::SsrfBlocked {
                url: url_str.to_string(),
            });
        }
    }

    Ok(())
}

/// Download a source with SSRF protection and a size limit
pub async fn resolve_url(
    url: &str,
    allow_private_urls: bool,
    max_download_bytes: u64,
) -> Result<ResolvedSource> {
    if !allow_private_urls {
        check_ssrf(url).await?;
    }

    let client = reqwest::Client::builder()
        .timeout(std::time::Duration::from_secs(60))
        .build()?;

    let response = client.get(url).send().await?;

    if !response.status().is_success() {
        return Err(Error::SourceResolution {
            reason: format!("HTTP request failed with status: {}", response.status()),
        });
    }

    if let Some(content_length) = response.content_length() {
        if content_length > max_download_bytes {
            return Err(Error::DownloadTooLarge {
                size: content_length,
                max_size: max_download_bytes,
            });
        }
    }

    // Content-Length can lie; enforce the limit while streaming
    let mut data = Vec::new();
    let mut stream = response.bytes_stream();
    while let Some(chunk) = stream.next().await {
        data.extend_from_slice(&chunk?);
        if data.len() as u64 > max_download_bytes {
            return Err(Error::DownloadTooLarge {
                size: data.len() as u64,
                max_size: max_download_bytes,
            });
        }
    }

    tracing::debug!(url, bytes = data.len(), "downloaded source");

    Ok(ResolvedSource {
        data,
        source_name: url.to_string(),
    })
}

/// Look up a previously rendered document
pub async fn resolve_cache(
    cache_key: &str,
    cache: &Arc<RwLock<OutputCache>>,
) -> Result<ResolvedSource> {
    let data = cache
        .read()
        .await
        .get(cache_key)
        .ok_or_else(|| Error::CacheKeyNotFound {
            key: cache_key.to_string(),
        })?;

    Ok(ResolvedSource {
        data: data.to_vec(),
        source_name: format!("<cache:{}>", cache_key),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_base64() {
        let resolved = resolve_base64("SGVsbG8gV29ybGQ=").unwrap();
        assert_eq!(resolved.data, b"Hello World");
        assert_eq!(resolved.source_name, "<base64>");
    }

    #[test]
    fn test_resolve_base64_data_url() {
        let resolved = resolve_base64("data:image/png;base64,SGVsbG8=").unwrap();
        assert_eq!(resolved.data, b"Hello");
    }

    #[test]
    fn test_resolve_base64_invalid_base64() {
        let result = resolve_base64("not valid base64!!!");
        assert!(matches!(result, Err(Error::Base64Decode(_))));
    }

    #[test]
    fn test_resolve_path_not_found() {
        let result = resolve_path("/nonexistent/path/file.pdf");
        assert!(matches!(result, Err(Error::SourceResolution { .. })));
    }

    #[test]
    fn test_resolve_path_reads_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("logo.png");
        std::fs::write(&path, b"\x89PNG fake").unwrap();

        let resolved = resolve_path(&path).unwrap();
        assert_eq!(resolved.data, b"\x89PNG fake");
        assert!(resolved.source_name.ends_with("logo.png"));
    }

    #[tokio::test]
    async fn test_resolve_cache() {
        let cache = Arc::new(RwLock::new(OutputCache::new(4, 1024)));
        let key = cache.read().await.insert(b"%PDF-1.7".to_vec()).unwrap();

        let resolved = resolve_cache(&key, &cache).await.unwrap();
        assert_eq!(resolved.data, b"%PDF-1.7");

        let missing = resolve_cache("nope", &cache).await;
        assert!(matches!(missing, Err(Error::CacheKeyNotFound { .. })));
    }

    #[test]
    fn test_resolve_url_rejects_scheme() {
        let result = tokio_test::block_on(resolve_url("file:///etc/passwd", false, 1024));
        assert!(matches!(result, Err(Error::SourceResolution { .. })));
    }

    #[tokio::test]
    async fn test_resolve_url_blocks_loopback() {
        let result = resolve_url("http://127.0.0.1:9/template.pdf", false, 1024).await;
        assert!(matches!(result, Err(Error::SsrfBlocked { .. })));
    }

    #[test]
    fn test_is_private_ip_ranges() {
        for ip in [
            "127.0.0.1",
            "10.0.0.1",
            "172.16.0.1",
            "192.168.1.1",
            "169.254.169.254",
            "100.64.0.1",
            "0.0.0.0",
            "255.255.255.255",
            "::1",
            "::",
            "fc00::1",
            "fe80::1",
            "::ffff:127.0.0.1",
        ] {
            assert!(is_private_ip(&ip.parse().unwrap()), "{} should be private", ip);
        }
    }

    #[test]
    fn test_is_private_ip_public() {
        for ip in ["8.8.8.8", "1.1.1.1", "203.0.113.1", "2001:db8::1", "::ffff:8.8.8.8"] {
            assert!(!is_private_ip(&ip.parse().unwrap()), "{} should be public", ip);
        }
    }
}
