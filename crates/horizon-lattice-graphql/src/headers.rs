//! Header normalization.

use http::header::{CONTENT_TYPE, HeaderMap, HeaderName, HeaderValue};

use crate::error::Result;

/// Content type every GraphQL request carries unless the caller overrides it.
pub const JSON_CONTENT_TYPE: &str = "application/json";

/// Merge `overrides` on top of `base`.
///
/// Names compare case-insensitively (`HeaderMap` stores them lowercased). A
/// name present in `overrides` replaces every value `base` had for it.
/// `Content-Type: application/json` is added only when neither side set a
/// content type.
pub fn normalize_headers(base: &HeaderMap, overrides: &HeaderMap) -> HeaderMap {
    let mut merged = base.clone();
    for name in overrides.keys() {
        merged.remove(name);
        for value in overrides.get_all(name) {
            merged.append(name.clone(), value.clone());
        }
    }
    if !merged.contains_key(CONTENT_TYPE) {
        merged.insert(CONTENT_TYPE, HeaderValue::from_static(JSON_CONTENT_TYPE));
    }
    merged
}

/// Build a `HeaderMap` from string pairs, validating each name and value.
pub fn header_map<I, K, V>(pairs: I) -> Result<HeaderMap>
where
    I: IntoIterator<Item = (K, V)>,
    K: AsRef<str>,
    V: AsRef<str>,
{
    let mut map = HeaderMap::new();
    for (name, value) in pairs {
        let name = HeaderName::from_bytes(name.as_ref().as_bytes())?;
        let value = HeaderValue::from_str(value.as_ref())?;
        map.append(name, value);
    }
    Ok(map)
}
