use url::Url;

use crate::error::CartError;

pub const DEFAULT_STORE_DOMAIN: &str = "s3.amazonaws.com";

/// Bucket plus key prefix addressed by a series' object-store reference.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ObjectLocation {
    pub store: String,
    pub prefix: String,
}

/// Resolves `s3://`, virtual-hosted and path-style HTTPS references against
/// the default store domain.
pub fn resolve(location: &str) -> Result<ObjectLocation, CartError> {
    resolve_with_domain(location, DEFAULT_STORE_DOMAIN)
}

pub fn resolve_with_domain(location: &str, domain: &str) -> Result<ObjectLocation, CartError> {
    let invalid = || CartError::InvalidLocation(location.to_string());
    let trimmed = location.trim();
    if trimmed.is_empty() {
        return Err(invalid());
    }
    let url = Url::parse(trimmed).map_err(|_| invalid())?;
    let host = url.host_str().filter(|host| !host.is_empty()).ok_or_else(invalid)?;
    let path = decode_path(url.path()).ok_or_else(invalid)?;
    let path = path.trim_start_matches('/');

    let virtual_suffix = format!(".{domain}");
    let (store, prefix) = match url.scheme() {
        "s3" => (host.to_string(), path.to_string()),
        "https" if host.len() > virtual_suffix.len() && host.ends_with(&virtual_suffix) => {
            let store = &host[..host.len() - virtual_suffix.len()];
            (store.to_string(), path.to_string())
        }
        "https" if host == domain => {
            let (store, rest) = path.split_once('/').unwrap_or((path, ""));
            (store.to_string(), rest.to_string())
        }
        _ => return Err(invalid()),
    };

    if store.is_empty() || store.contains('/') {
        return Err(invalid());
    }
    Ok(ObjectLocation {
        store,
        prefix: prefix.replace('*', ""),
    })
}

fn decode_path(path: &str) -> Option<String> {
    urlencoding::decode(path).ok().map(|value| value.into_owned())
}
