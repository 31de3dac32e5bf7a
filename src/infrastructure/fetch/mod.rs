use std::net::{IpAddr, SocketAddr};
use std::time::Duration;

use futures_util::StreamExt;
use ipnet::IpNet;
use once_cell::sync::Lazy;

/// Response bodies above this size are rejected.
pub const MAX_DOWNLOAD_BYTES: usize = 10 << 20;

pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);
pub const DIAL_TIMEOUT: Duration = Duration::from_secs(7);

/// Address ranges outbound fetches must never reach: loopback, RFC 1918,
/// link-local, reserved and multicast space for both address families.
static BLOCKED_NETS: Lazy<Vec<IpNet>> = Lazy::new(|| {
    [
        "127.0.0.0/8",
        "10.0.0.0/8",
        "172.16.0.0/12",
        "192.168.0.0/16",
        "169.254.0.0/16",
        "0.0.0.0/8",
        "224.0.0.0/4",
        "240.0.0.0/4",
        "::1/128",
        "fc00::/7",
        "fe80::/10",
        "ff00::/8",
    ]
    .iter()
    .map(|cidr| cidr.parse().expect("static CIDR table"))
    .collect()
});

#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("invalid url: {0}")]
    InvalidUrl(String),
    #[error("only http and https urls are allowed")]
    SchemeNotAllowed,
    #[error("url has no host")]
    MissingHost,
    #[error("failed to resolve host: {0}")]
    Resolve(String),
    #[error("all resolved addresses are blocked")]
    Blocked,
    #[error("response body exceeds {MAX_DOWNLOAD_BYTES} bytes")]
    TooLarge,
    #[error("unexpected status: {0}")]
    BadStatus(reqwest::StatusCode),
    #[error(transparent)]
    Request(#[from] reqwest::Error),
}

#[derive(Debug)]
pub struct FetchedBody {
    pub body: Vec<u8>,
    pub content_type: Option<String>,
}

pub fn is_blocked(addr: IpAddr) -> bool {
    BLOCKED_NETS.iter().any(|net| net.contains(&addr))
}

/// Fetches a user-supplied URL without letting it reach internal address
/// space. The host is resolved up front, every blocked address is dropped,
/// and the HTTP client is pinned to the surviving addresses so no second
/// resolution can happen at dial time (DNS rebinding defense). TLS still
/// verifies against the original hostname.
pub async fn safe_fetch(raw_url: &str) -> Result<FetchedBody, FetchError> {
    let url =
        reqwest::Url::parse(raw_url).map_err(|e| FetchError::InvalidUrl(e.to_string()))?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(FetchError::SchemeNotAllowed);
    }
    let host = url.host_str().ok_or(FetchError::MissingHost)?.to_string();
    let port = url.port_or_known_default().unwrap_or(80);

    let resolved: Vec<SocketAddr> = tokio::net::lookup_host((host.as_str(), port))
        .await
        .map_err(|e| FetchError::Resolve(e.to_string()))?
        .collect();
    let allowed: Vec<SocketAddr> = resolved
        .into_iter()
        .filter(|addr| !is_blocked(addr.ip()))
        .collect();
    if allowed.is_empty() {
        return Err(FetchError::Blocked);
    }

    let client = reqwest::Client::builder()
        .timeout(REQUEST_TIMEOUT)
        .connect_timeout(DIAL_TIMEOUT)
        .pool_max_idle_per_host(0)
        // A redirect would re-resolve some other host outside the vetted
        // address set.
        .redirect(reqwest::redirect::Policy::none())
        .resolve_to_addrs(&host, &allowed)
        .build()?;

    let response = client.get(url).send().await?;
    let status = response.status();
    if !status.is_success() {
        return Err(FetchError::BadStatus(status));
    }
    let content_type = response
        .headers()
        .get(http::header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(str::to_owned);

    let mut body = Vec::new();
    let mut stream = response.bytes_stream();
    while let Some(chunk) = stream.next().await {
        let chunk = chunk?;
        if body.len() + chunk.len() > MAX_DOWNLOAD_BYTES {
            return Err(FetchError::TooLarge);
        }
        body.extend_from_slice(&chunk);
    }

    Ok(FetchedBody { body, content_type })
}

#[cfg(test)]
mod tests {
    use std::net::IpAddr;

    use super::{FetchError, is_blocked, safe_fetch};

    fn ip(s: &str) -> IpAddr {
        s.parse().unwrap()
    }

    #[test]
    fn blocks_every_private_and_special_range() {
        for addr in [
            "127.0.0.1",
            "10.1.2.3",
            "172.16.0.1",
            "172.31.255.254",
            "192.168.1.1",
            "169.254.169.254",
            "0.0.0.0",
            "224.0.0.251",
            "240.0.0.1",
            "::1",
            "fc00::1",
            "fe80::1",
            "ff02::fb",
        ] {
            assert!(is_blocked(ip(addr)), "{addr} should be blocked");
        }
    }

    #[test]
    fn allows_public_addresses() {
        for addr in ["93.184.216.34", "1.1.1.1", "2606:4700:4700::1111"] {
            assert!(!is_blocked(ip(addr)), "{addr} should be allowed");
        }
        // Just outside 172.16.0.0/12.
        assert!(!is_blocked(ip("172.32.0.1")));
    }

    #[tokio::test]
    async fn rejects_non_http_schemes() {
        let err = safe_fetch("ftp://example.com/file").await.unwrap_err();
        assert!(matches!(err, FetchError::SchemeNotAllowed));
    }

    #[tokio::test]
    async fn rejects_unparsable_urls() {
        let err = safe_fetch("http://").await.unwrap_err();
        assert!(matches!(
            err,
            FetchError::InvalidUrl(_) | FetchError::MissingHost
        ));
    }

    #[tokio::test]
    async fn rejects_metadata_endpoint_without_dialing() {
        // IP-literal hosts resolve locally, so no DNS or TCP happens before
        // the filter fires.
        let err = safe_fetch("http://169.254.169.254/latest/meta-data/")
            .await
            .unwrap_err();
        assert!(matches!(err, FetchError::Blocked));
    }

    #[tokio::test]
    async fn rejects_loopback_literal() {
        let err = safe_fetch("http://127.0.0.1:6379/").await.unwrap_err();
        assert!(matches!(err, FetchError::Blocked));
    }
}
