// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use extractrs::utils::errors::ErrorCode;
use extractrs::utils::url_utils::{
    compute_url_hash, is_blocked_ip, normalize_url, validate_ssrf,
};

/// normalize(normalize(url)) == normalize(url)
#[test]
fn test_normalization_is_idempotent_across_shapes() {
    let cases = [
        "https://example.com",
        "https://EXAMPLE.com/Path/Sub/?b=2&a=1",
        "http://example.com:80/a//b/./c/../d/",
        "https://example.com/?utm_source=mail&utm_medium=x&q=rust&ref=hn",
        "https://example.com/search?q=a+b&lang=en",
        "https://sub.example.co.uk/page#section",
        "https://example.com/%7Euser/%41",
    ];
    for raw in cases {
        let once = normalize_url(raw, None).unwrap();
        let twice = normalize_url(once.as_str(), None).unwrap();
        assert_eq!(once.as_str(), twice.as_str(), "case: {}", raw);
        assert_eq!(
            compute_url_hash(once.as_str()),
            compute_url_hash(twice.as_str())
        );
    }
}

#[test]
fn test_equivalent_urls_share_a_hash() {
    let a = normalize_url("HTTP://Example.com:80/a/?b=2&a=1#x", None).unwrap();
    let b = normalize_url("http://example.com/a?a=1&b=2", None).unwrap();
    assert_eq!(compute_url_hash(a.as_str()), compute_url_hash(b.as_str()));
}

#[tokio::test]
async fn test_blocked_hosts_never_pass_silently() {
    let blocked = [
        "http://169.254.169.254/latest/meta-data/",
        "http://127.0.0.1/",
        "http://10.0.0.8/internal",
        "http://192.168.1.1/router",
        "http://[::1]/",
        "http://localhost/admin",
        "http://app.localhost/",
    ];
    for raw in blocked {
        let url = normalize_url(raw, None).unwrap();
        let err = validate_ssrf(&url).await.unwrap_err();
        assert_eq!(err.code, ErrorCode::SsrfBlocked, "case: {}", raw);
    }
}

#[test]
fn test_metadata_endpoint_ip_is_blocked() {
    assert!(is_blocked_ip("169.254.169.254".parse().unwrap()));
    assert!(is_blocked_ip("fd00:ec2::254".parse().unwrap()));
}

#[test]
fn test_scheme_rules() {
    assert_eq!(
        normalize_url("ftp://example.com/x", None).unwrap_err().code,
        ErrorCode::UnsupportedScheme
    );
    assert_eq!(
        normalize_url("not a url at all", None).unwrap_err().code,
        ErrorCode::InvalidUrl
    );
}
