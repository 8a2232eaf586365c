// Copyright 2025 Kirky.X
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use crate::utils::errors::{ErrorCode, PipelineError};
use sha2::{Digest, Sha256};
use std::net::IpAddr;
use tokio::net::lookup_host;
use url::Url;

/// 追踪参数名前缀，命中即从查询串中移除
const TRACKING_PREFIXES: [&str; 1] = ["utm_"];

/// 追踪参数名全称集合
const TRACKING_KEYS: [&str; 4] = ["fbclid", "gclid", "ref", "ref_src"];

/// 规范化URL
///
/// 规则依序应用：解析（可选基准URL补全相对路径）、scheme校验、
/// 小写host（IDN由url库punycode编码）、省略默认端口、路径折叠与
/// 尾斜杠剥离、移除追踪参数并稳定排序其余参数、丢弃fragment
///
/// # 参数
///
/// * `raw` - 原始URL字符串
/// * `base` - 相对路径解析的基准URL
///
/// # 返回值
///
/// * `Ok(Url)` - 规范化后的URL
/// * `Err(PipelineError)` - INVALID_URL 或 UNSUPPORTED_SCHEME
pub fn normalize_url(raw: &str, base: Option<&Url>) -> Result<Url, PipelineError> {
    let mut url = match base {
        Some(b) => b
            .join(raw.trim())
            .map_err(|e| PipelineError::new(ErrorCode::InvalidUrl, format!("Invalid URL: {}", e)))?,
        None => Url::parse(raw.trim())
            .map_err(|e| PipelineError::new(ErrorCode::InvalidUrl, format!("Invalid URL: {}", e)))?,
    };

    match url.scheme() {
        "http" | "https" => {}
        other => {
            return Err(PipelineError::new(
                ErrorCode::UnsupportedScheme,
                format!("Unsupported URL scheme: {}", other),
            ));
        }
    }

    if url.host_str().is_none() {
        return Err(PipelineError::new(
            ErrorCode::InvalidUrl,
            "URL is missing an authority",
        ));
    }

    // url库已负责小写scheme/host、punycode与默认端口省略，
    // 这里补齐路径折叠（重复斜杠、尾斜杠）与非保留字节的解码
    let path = normalize_path(url.path());
    url.set_path(&path);
    url.set_fragment(None);

    let filtered = filter_query_pairs(&url);
    apply_query_pairs(&mut url, filtered);

    Ok(url)
}

/// 计算规范化URL的SHA-256十六进制摘要，作为页面缓存主键
pub fn compute_url_hash(normalized: &str) -> String {
    format!("{:x}", Sha256::digest(normalized.as_bytes()))
}

/// 计算任意内容的SHA-256十六进制摘要
pub fn sha256_hex(value: &str) -> String {
    compute_url_hash(value)
}

/// 折叠路径中的重复斜杠并剥离根以外的尾斜杠
fn normalize_path(path: &str) -> String {
    let segments: Vec<String> = path
        .split('/')
        .filter(|s| !s.is_empty())
        .map(decode_unreserved)
        .collect();
    if segments.is_empty() {
        return "/".to_string();
    }
    format!("/{}", segments.join("/"))
}

/// 将百分号转义中的非保留字节还原为字面量
fn decode_unreserved(segment: &str) -> String {
    let bytes = segment.as_bytes();
    let mut out = String::with_capacity(segment.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' && i + 2 < bytes.len() {
            let hex = &segment[i + 1..i + 3];
            if let Ok(v) = u8::from_str_radix(hex, 16) {
                if v.is_ascii_alphanumeric() || matches!(v, b'-' | b'.' | b'_' | b'~') {
                    out.push(v as char);
                    i += 3;
                    continue;
                }
            }
        }
        out.push(bytes[i] as char);
        i += 1;
    }
    out
}

fn is_tracking_param(name: &str) -> bool {
    let lower = name.to_ascii_lowercase();
    TRACKING_KEYS.contains(&lower.as_str())
        || TRACKING_PREFIXES.iter().any(|p| lower.starts_with(p))
}

fn filter_query_pairs(url: &Url) -> Vec<(String, String)> {
    let mut pairs: Vec<(String, String)> = url
        .query_pairs()
        .filter(|(k, _)| !is_tracking_param(k))
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();
    // 稳定排序保证同名参数保持原有相对顺序
    pairs.sort_by(|a, b| a.0.cmp(&b.0));
    pairs
}

fn apply_query_pairs(url: &mut Url, pairs: Vec<(String, String)>) {
    if pairs.is_empty() {
        url.set_query(None);
        return;
    }
    let mut serializer = url::form_urlencoded::Serializer::new(String::new());
    for (k, v) in &pairs {
        serializer.append_pair(k, v);
    }
    let query = serializer.finish();
    url.set_query(Some(&query));
}

/// 移除链接目标中的追踪参数（提取器重写链接时复用）
pub fn strip_tracking_params(url: &mut Url) {
    let filtered = filter_query_pairs(url);
    apply_query_pairs(url, filtered);
}

/// 校验URL是否命中SSRF防护
///
/// 裸IP字面量直接比对封禁网段；主机名经DNS解析后检查全部解析
/// 地址。任一地址落入环回、链路本地、云元数据、私有、组播或
/// 未指定网段即拒绝。重定向后的每一跳都必须重新执行本校验
///
/// # 返回值
///
/// * `Ok(())` - 允许访问
/// * `Err(PipelineError)` - SSRF_BLOCKED 或 INVALID_URL
pub async fn validate_ssrf(url: &Url) -> Result<(), PipelineError> {
    let host = url
        .host_str()
        .ok_or_else(|| PipelineError::new(ErrorCode::InvalidUrl, "URL is missing a host"))?;

    if is_localhost_alias(host) {
        return Err(PipelineError::new(
            ErrorCode::SsrfBlocked,
            "Access to localhost is not allowed",
        ));
    }

    // 裸IP字面量不经DNS直接检查
    if let Ok(ip) = host.trim_matches(|c| c == '[' || c == ']').parse::<IpAddr>() {
        if is_blocked_ip(ip) {
            return Err(PipelineError::new(
                ErrorCode::SsrfBlocked,
                format!("URL resolves to a blocked IP range: {}", ip),
            ));
        }
        return Ok(());
    }

    let port = url.port_or_known_default().unwrap_or(80);
    let addrs = lookup_host((host, port)).await.map_err(|e| {
        PipelineError::new(
            ErrorCode::FetchError,
            format!("DNS resolution failed for {}: {}", host, e),
        )
    })?;

    for addr in addrs {
        if is_blocked_ip(addr.ip()) {
            return Err(PipelineError::new(
                ErrorCode::SsrfBlocked,
                format!("URL resolves to a blocked IP range: {}", addr.ip()),
            ));
        }
    }

    Ok(())
}

/// 规范化并执行SSRF校验，返回规范URL与其url_hash
pub async fn normalize_and_validate(
    raw: &str,
    base: Option<&Url>,
) -> Result<(Url, String), PipelineError> {
    let url = normalize_url(raw, base)?;
    validate_ssrf(&url).await?;
    let hash = compute_url_hash(url.as_str());
    Ok((url, hash))
}

fn is_localhost_alias(host: &str) -> bool {
    let lower = host.to_ascii_lowercase();
    lower == "localhost" || lower == "localhost.localdomain" || lower.ends_with(".localhost")
}

/// 判断IP是否位于封禁网段
pub fn is_blocked_ip(ip: IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => {
            let octets = v4.octets();
            v4.is_loopback()
                || v4.is_link_local()
                || v4.is_private()
                || v4.is_multicast()
                || v4.is_unspecified()
                || v4.is_broadcast()
                // 100.64.0.0/10 (CGNAT) 同样不可达公网
                || (octets[0] == 100 && (octets[1] & 0xc0) == 64)
        }
        IpAddr::V6(v6) => {
            let seg = v6.segments();
            v6.is_loopback()
                || v6.is_multicast()
                || v6.is_unspecified()
                // fc00::/7 unique local (含 fd00:ec2::254 元数据地址)
                || (seg[0] & 0xfe00) == 0xfc00
                // fe80::/10 link local
                || (seg[0] & 0xffc0) == 0xfe80
                // IPv4映射地址按内嵌的v4地址判定
                || v6
                    .to_ipv4_mapped()
                    .map(|v4| is_blocked_ip(IpAddr::V4(v4)))
                    .unwrap_or(false)
        }
    }
}
