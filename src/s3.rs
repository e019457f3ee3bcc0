use std::io::Write;
use std::sync::LazyLock;
use std::time::Duration;

use regex::Regex;
use reqwest::blocking::Client;
use reqwest::header::{HeaderMap, HeaderValue, USER_AGENT};

use crate::config::StoreSettings;
use crate::error::CartError;

/// One response of a `list-type=2` listing call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListPage {
    pub keys: Vec<String>,
    pub next_token: Option<String>,
}

pub trait StoreClient: Send + Sync {
    fn list_page(
        &self,
        store: &str,
        prefix: &str,
        continuation: Option<&str>,
    ) -> Result<ListPage, CartError>;

    fn object_url(&self, store: &str, key: &str) -> String;

    /// Streams the object body into `sink`, returning the byte count.
    fn download(&self, url: &str, sink: &mut dyn Write) -> Result<u64, CartError>;
}

#[derive(Clone)]
pub struct StoreHttpClient {
    client: Client,
    scheme: String,
    domain: String,
    path_style: bool,
    listing_timeout: Duration,
    transfer_timeout: Duration,
}

impl StoreHttpClient {
    pub fn new(settings: &StoreSettings) -> Result<Self, CartError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            USER_AGENT,
            HeaderValue::from_str(&format!("dicom-cart/{}", env!("CARGO_PKG_VERSION")))
                .map_err(|err| CartError::ListingHttp(err.to_string()))?,
        );
        let client = Client::builder()
            .default_headers(headers)
            .connect_timeout(settings.connect_timeout)
            .build()
            .map_err(|err| CartError::ListingHttp(err.to_string()))?;
        Ok(Self {
            client,
            scheme: settings.scheme.clone(),
            domain: settings.domain.clone(),
            path_style: settings.path_style,
            listing_timeout: settings.listing_timeout,
            transfer_timeout: settings.transfer_timeout,
        })
    }

    pub fn endpoint(&self, store: &str) -> String {
        if self.path_style {
            format!("{}://{}/{store}", self.scheme, self.domain)
        } else {
            format!("{}://{store}.{}", self.scheme, self.domain)
        }
    }
}

impl StoreClient for StoreHttpClient {
    fn list_page(
        &self,
        store: &str,
        prefix: &str,
        continuation: Option<&str>,
    ) -> Result<ListPage, CartError> {
        let mut request = self
            .client
            .get(self.endpoint(store))
            .timeout(self.listing_timeout)
            .query(&[("list-type", "2"), ("prefix", prefix)]);
        if let Some(token) = continuation {
            request = request.query(&[("continuation-token", token)]);
        }
        let response = request
            .send()
            .map_err(|err| CartError::ListingHttp(err.to_string()))?;
        if !response.status().is_success() {
            let status = response.status().as_u16();
            let message = response
                .text()
                .unwrap_or_else(|_| "object listing failed".to_string());
            return Err(CartError::ListingStatus { status, message });
        }
        let body = response
            .text()
            .map_err(|err| CartError::ListingHttp(err.to_string()))?;
        Ok(parse_list_page(&body))
    }

    fn object_url(&self, store: &str, key: &str) -> String {
        let encoded = key
            .split('/')
            .map(|segment| urlencoding::encode(segment).into_owned())
            .collect::<Vec<_>>()
            .join("/");
        format!("{}/{encoded}", self.endpoint(store))
    }

    fn download(&self, url: &str, sink: &mut dyn Write) -> Result<u64, CartError> {
        let mut response = self
            .client
            .get(url)
            .timeout(self.transfer_timeout)
            .send()
            .map_err(|err| CartError::TransferHttp(err.to_string()))?;
        if !response.status().is_success() {
            let status = response.status().as_u16();
            let message = response
                .text()
                .unwrap_or_else(|_| "object transfer failed".to_string());
            return Err(CartError::TransferStatus { status, message });
        }
        response
            .copy_to(sink)
            .map_err(|err| CartError::TransferHttp(err.to_string()))
    }
}

static KEY_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)<Contents>.*?<Key>(.*?)</Key>.*?</Contents>").expect("valid key pattern")
});

static TOKEN_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)<NextContinuationToken>(.*?)</NextContinuationToken>")
        .expect("valid token pattern")
});

/// Extracts `Contents/Key` values and `NextContinuationToken` from a
/// `ListBucketResult` document. An empty token element counts as absent.
pub fn parse_list_page(xml: &str) -> ListPage {
    let keys = KEY_RE
        .captures_iter(xml)
        .filter_map(|caps| caps.get(1))
        .map(|key| unescape_xml(key.as_str()))
        .collect();
    let next_token = TOKEN_RE
        .captures(xml)
        .and_then(|caps| caps.get(1))
        .map(|token| unescape_xml(token.as_str().trim()))
        .filter(|token| !token.is_empty());
    ListPage { keys, next_token }
}

fn unescape_xml(value: &str) -> String {
    if !value.contains('&') {
        return value.to_string();
    }
    let mut out = String::with_capacity(value.len());
    let mut rest = value;
    while let Some(pos) = rest.find('&') {
        out.push_str(&rest[..pos]);
        let tail = &rest[pos..];
        let Some(end) = tail.find(';') else {
            out.push_str(tail);
            return out;
        };
        let entity = &tail[1..end];
        let decoded = match entity {
            "amp" => Some('&'),
            "lt" => Some('<'),
            "gt" => Some('>'),
            "quot" => Some('"'),
            "apos" => Some('\''),
            _ => entity
                .strip_prefix("#x")
                .and_then(|hex| u32::from_str_radix(hex, 16).ok())
                .or_else(|| entity.strip_prefix('#').and_then(|dec| dec.parse().ok()))
                .and_then(char::from_u32),
        };
        match decoded {
            Some(ch) => {
                out.push(ch);
                rest = &tail[end + 1..];
            }
            None => {
                out.push('&');
                rest = &tail[1..];
            }
        }
    }
    out.push_str(rest);
    out
}
