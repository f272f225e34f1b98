//! Client IP extraction utilities.

use std::net::SocketAddr;

use axum::{extract::ConnectInfo, http::request::Parts};

/// Header set by a reverse proxy in front of the server.
pub const FORWARDED_FOR_HEADER: &str = "x-forwarded-for";

/// Bucket shared by requests whose address cannot be determined.
pub const UNKNOWN_CLIENT: &str = "unknown";

/// Trait for types that provide access to HTTP headers and extensions.
/// Implemented for both `Parts` and `Request` to allow flexible IP extraction.
pub trait HasHeadersAndExtensions {
    fn headers(&self) -> &axum::http::HeaderMap;
    fn extensions(&self) -> &axum::http::Extensions;
}

impl HasHeadersAndExtensions for Parts {
    fn headers(&self) -> &axum::http::HeaderMap {
        &self.headers
    }
    fn extensions(&self) -> &axum::http::Extensions {
        &self.extensions
    }
}

impl<B> HasHeadersAndExtensions for axum::extract::Request<B> {
    fn headers(&self) -> &axum::http::HeaderMap {
        axum::extract::Request::headers(self)
    }
    fn extensions(&self) -> &axum::http::Extensions {
        axum::extract::Request::extensions(self)
    }
}

fn forwarded_for<T: HasHeadersAndExtensions>(source: &T) -> Option<String> {
    let value = source.headers().get(FORWARDED_FOR_HEADER)?.to_str().ok()?;
    // Right-most entry is the one our proxy appended; the rest is client-supplied
    let last = value.rsplit(',').next()?.trim();
    last
        .parse::<std::net::IpAddr>()
        .ok()
        .map(|ip| ip.to_string())
}

/// Extract the client IP address used as a rate-limit key.
///
/// With `trust_forwarded_for`, the right-most `X-Forwarded-For` entry wins:
/// the address the trusted proxy saw.
/// Otherwise the peer address from `ConnectInfo` is used. Requests with
/// neither share the `unknown` key.
pub fn extract_client_ip<T: HasHeadersAndExtensions>(source: &T, trust_forwarded_for: bool) -> String {
    if trust_forwarded_for {
        if let Some(ip) = forwarded_for(source) {
            return ip;
        }
    }

    source
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ci| ci.0.ip().to_string())
        .unwrap_or_else(|| UNKNOWN_CLIENT.to_string())
}
