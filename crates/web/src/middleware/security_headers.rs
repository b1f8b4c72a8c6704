//! Security headers middleware for XSS, clickjacking, and isolation protection.
//!
//! Adds restrictive security headers to all responses. The only per-deployment
//! part is the CSP `img-src`, which admits the backend's storage origin so
//! coupon images can load.

use axum::{
    extract::{Request, State},
    http::{
        HeaderName, HeaderValue,
        header::{
            CACHE_CONTROL, CONTENT_SECURITY_POLICY, REFERRER_POLICY, X_CONTENT_TYPE_OPTIONS,
            X_FRAME_OPTIONS,
        },
    },
    middleware::Next,
    response::Response,
};

use crate::config::CoupixConfig;

/// Policy used if the configured one cannot be encoded as a header.
const FALLBACK_CSP: &str = "default-src 'none'; style-src 'self'; img-src 'self'; \
                            form-action 'self'; frame-ancestors 'none'";

/// Per-deployment security header values.
#[derive(Debug, Clone)]
pub struct SecurityHeaders {
    csp: HeaderValue,
}

impl SecurityHeaders {
    /// Build the header set for a deployment.
    ///
    /// ```text
    /// default-src 'none';
    /// script-src 'self';
    /// style-src 'self';
    /// font-src 'self';
    /// img-src 'self' <storage origin | data:>;
    /// connect-src 'self';
    /// frame-src 'none';
    /// object-src 'none';
    /// base-uri 'self';
    /// form-action 'self';
    /// frame-ancestors 'none';
    /// upgrade-insecure-requests        (https deployments only)
    /// ```
    #[must_use]
    pub fn from_config(config: &CoupixConfig) -> Self {
        let csp = content_security_policy(config);
        let csp = HeaderValue::from_str(&csp).unwrap_or_else(|e| {
            tracing::error!(error = %e, "Invalid CSP header, using fallback");
            HeaderValue::from_static(FALLBACK_CSP)
        });
        Self { csp }
    }
}

fn content_security_policy(config: &CoupixConfig) -> String {
    // The in-memory backend serves images as data: URLs.
    let image_source = config.image_origin().unwrap_or_else(|| "data:".to_string());
    let mut csp = format!(
        "default-src 'none'; \
         script-src 'self'; \
         style-src 'self'; \
         font-src 'self'; \
         img-src 'self' {image_source}; \
         connect-src 'self'; \
         frame-src 'none'; \
         object-src 'none'; \
         base-uri 'self'; \
         form-action 'self'; \
         frame-ancestors 'none'"
    );
    if config.is_secure() {
        csp.push_str("; upgrade-insecure-requests");
    }
    csp
}

/// Add security headers to all responses.
///
/// Headers applied:
/// - `X-Frame-Options: DENY` - Prevent clickjacking
/// - `X-Content-Type-Options: nosniff` - Prevent MIME sniffing
/// - `Referrer-Policy: no-referrer` - Zero referrer leakage
/// - `Content-Security-Policy` - see [`SecurityHeaders::from_config`]
/// - `Permissions-Policy` - Deny sensitive features
/// - `Cache-Control: no-store` - Pages carry private coupon data
/// - `Cross-Origin-Opener-Policy: same-origin`
/// - `Cross-Origin-Resource-Policy: same-origin`
pub async fn security_headers_middleware(
    State(policy): State<SecurityHeaders>,
    request: Request,
    next: Next,
) -> Response {
    let is_static = request.uri().path().starts_with("/static/");
    let mut response = next.run(request).await;
    let headers = response.headers_mut();

    headers.insert(X_FRAME_OPTIONS, HeaderValue::from_static("DENY"));
    headers.insert(X_CONTENT_TYPE_OPTIONS, HeaderValue::from_static("nosniff"));
    headers.insert(REFERRER_POLICY, HeaderValue::from_static("no-referrer"));
    headers.insert(CONTENT_SECURITY_POLICY, policy.csp);

    headers.insert(
        HeaderName::from_static("permissions-policy"),
        HeaderValue::from_static(
            "camera=(), \
             geolocation=(), \
             microphone=(), \
             payment=(), \
             usb=(), \
             interest-cohort=()",
        ),
    );

    // Hashed stylesheets are immutable; everything else is private.
    headers.insert(
        CACHE_CONTROL,
        HeaderValue::from_static(if is_static {
            "public, max-age=31536000, immutable"
        } else {
            "no-store, max-age=0"
        }),
    );

    headers.insert(
        HeaderName::from_static("cross-origin-opener-policy"),
        HeaderValue::from_static("same-origin"),
    );
    headers.insert(
        HeaderName::from_static("cross-origin-resource-policy"),
        HeaderValue::from_static("same-origin"),
    );

    response
}
