//! Key casing conversion
//!
//! B2 speaks camelCase, the provider schema speaks snake_case. Both
//! directions are pure and total.

use serde_json::{Map, Value};

/// Convert a camelCase or PascalCase identifier to snake_case
///
/// `BucketFileVersion` -> `bucket_file_version`, `s3ApiUrl` -> `s3_api_url`.
/// Runs of `_` collapse to one and leading/trailing `_` are stripped.
pub fn to_snake(s: &str) -> String {
    let mut raw = String::with_capacity(s.len() + 4);
    for (i, c) in s.chars().enumerate() {
        if i > 0 && c.is_ascii_uppercase() {
            raw.push('_');
        }
        raw.push(c.to_ascii_lowercase());
    }

    let mut result = String::with_capacity(raw.len());
    for c in raw.chars() {
        if c == '_' && result.ends_with('_') {
            continue;
        }
        result.push(c);
    }
    result.trim_matches('_').to_string()
}

/// Convert a snake_case identifier to camelCase
pub fn to_camel(s: &str) -> String {
    let mut result = String::with_capacity(s.len());
    for (i, part) in s.split('_').filter(|p| !p.is_empty()).enumerate() {
        if i == 0 {
            result.push_str(part);
            continue;
        }
        let mut chars = part.chars();
        if let Some(first) = chars.next() {
            result.push(first.to_ascii_uppercase());
            result.push_str(chars.as_str());
        }
    }
    result
}

/// Rename every top-level key of a JSON map with `converter`
pub fn change_keys(map: Map<String, Value>, converter: fn(&str) -> String) -> Map<String, Value> {
    map.into_iter().map(|(k, v)| (converter(&k), v)).collect()
}
