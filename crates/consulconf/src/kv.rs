//! remote key-value stores
//!
//! [KvTransport] is the thin shim between this crate and a Consul-like key-value store.
//! Keys passed to and returned from a transport are relative to its base location.
use base64::Engine;
use std::cell::RefCell;
use std::collections::{BTreeMap, BTreeSet};

/// A single key as returned by a recursive listing
#[derive(Debug, Clone, PartialEq, Eq, derive_new::new)]
pub struct KvEntry {
    pub key: String,
    pub value: Option<Vec<u8>>,
}

pub trait KvTransport {
    /// Human readable base location
    fn location(&self) -> &str;

    /// All keys (with values) starting with `prefix`
    fn list_tree(&self, prefix: &str) -> Result<Vec<KvEntry>, TransportError>;

    /// Names of the direct children below `prefix`
    fn list_children(&self, prefix: &str) -> Result<Vec<String>, TransportError>;

    /// Insert or replace a value. `None` writes an empty value.
    fn put(&self, key: &str, value: Option<&str>) -> Result<(), TransportError>;

    /// Remove exactly `key`
    fn delete(&self, key: &str) -> Result<(), TransportError>;

    /// Remove every key starting with `key`
    fn delete_tree(&self, key: &str) -> Result<(), TransportError>;
}

impl<T: KvTransport + ?Sized> KvTransport for &T {
    fn location(&self) -> &str {
        (**self).location()
    }

    fn list_tree(&self, prefix: &str) -> Result<Vec<KvEntry>, TransportError> {
        (**self).list_tree(prefix)
    }

    fn list_children(&self, prefix: &str) -> Result<Vec<String>, TransportError> {
        (**self).list_children(prefix)
    }

    fn put(&self, key: &str, value: Option<&str>) -> Result<(), TransportError> {
        (**self).put(key, value)
    }

    fn delete(&self, key: &str) -> Result<(), TransportError> {
        (**self).delete(key)
    }

    fn delete_tree(&self, key: &str) -> Result<(), TransportError> {
        (**self).delete_tree(key)
    }
}

#[derive(thiserror::Error, Debug)]
pub enum TransportError {
    #[error("request to {url} failed")]
    Request {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("{method} {url} returned {status}: {body}")]
    Status {
        method: &'static str,
        url: String,
        status: reqwest::StatusCode,
        body: String,
    },
    #[error("value of {key} is not valid base64")]
    Decode {
        key: String,
        #[source]
        source: base64::DecodeError,
    },
}

/// Consul key-value HTTP API
///
/// `base_url` points into the kv tree, e.g. `http://127.0.0.1:8500/v1/kv/conf`
#[derive(Debug)]
pub struct HttpKv {
    base_url: String,
    /// kv path of `base_url`, stripped from listed keys
    key_prefix: String,
    client: reqwest::blocking::Client,
}

#[derive(serde::Deserialize)]
#[serde(rename_all = "PascalCase")]
struct RawEntry {
    key: String,
    value: Option<String>,
}

impl HttpKv {
    pub fn new(base_url: &str) -> Self {
        let base_url = base_url.trim_end_matches('/').to_string();
        let key_prefix = base_url
            .split_once("/v1/kv")
            .map(|(_, path)| path.trim_matches('/').to_string())
            .unwrap_or_default();

        Self {
            base_url,
            key_prefix,
            client: reqwest::blocking::Client::new(),
        }
    }

    fn url(&self, key: &str) -> String {
        if key.is_empty() {
            format!("{}/", self.base_url)
        } else {
            format!("{}/{}", self.base_url, key)
        }
    }

    fn relative<'k>(&self, key: &'k str) -> &'k str {
        if self.key_prefix.is_empty() {
            return key;
        }

        key.strip_prefix(self.key_prefix.as_str())
            .and_then(|rest| rest.strip_prefix('/'))
            .unwrap_or(key)
    }

    fn send(
        &self,
        method: &'static str,
        url: &str,
        request: reqwest::blocking::RequestBuilder,
    ) -> Result<Option<reqwest::blocking::Response>, TransportError> {
        let response = request.send().map_err(|source| TransportError::Request {
            url: url.to_string(),
            source,
        })?;

        let status = response.status();
        if method == "GET" && status == reqwest::StatusCode::NOT_FOUND {
            tracing::debug!(url = %url, "no keys found");
            return Ok(None);
        }

        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            return Err(TransportError::Status {
                method,
                url: url.to_string(),
                status,
                body,
            });
        }

        Ok(Some(response))
    }
}

impl KvTransport for HttpKv {
    fn location(&self) -> &str {
        &self.base_url
    }

    fn list_tree(&self, prefix: &str) -> Result<Vec<KvEntry>, TransportError> {
        let url = self.url(prefix);
        tracing::debug!(url = %url, "consul get");

        let request = self.client.get(&url).query(&[("recurse", "true")]);
        let Some(response) = self.send("GET", &url, request)? else {
            return Ok(vec![]);
        };

        let raw_entries: Vec<RawEntry> = response
            .json()
            .map_err(|source| TransportError::Request { url, source })?;

        raw_entries
            .into_iter()
            .map(|raw| -> Result<KvEntry, TransportError> {
                let value = raw
                    .value
                    .map(|encoded| base64::engine::general_purpose::STANDARD.decode(encoded))
                    .transpose()
                    .map_err(|source| TransportError::Decode {
                        key: raw.key.clone(),
                        source,
                    })?;
                Ok(KvEntry::new(self.relative(&raw.key).to_string(), value))
            })
            .collect()
    }

    fn list_children(&self, prefix: &str) -> Result<Vec<String>, TransportError> {
        let url = self.url(prefix);
        tracing::debug!(url = %url, "consul list keys");

        let request = self
            .client
            .get(&url)
            .query(&[("keys", "true"), ("separator", "/")]);
        let Some(response) = self.send("GET", &url, request)? else {
            return Ok(vec![]);
        };

        let keys: Vec<String> = response
            .json()
            .map_err(|source| TransportError::Request { url, source })?;

        let children: BTreeSet<String> = keys
            .iter()
            .map(|key| self.relative(key))
            .filter_map(|key| key.strip_prefix(prefix))
            .filter_map(|rest| rest.split('/').next())
            .filter(|child| !child.is_empty())
            .map(str::to_string)
            .collect();

        Ok(children.into_iter().collect())
    }

    fn put(&self, key: &str, value: Option<&str>) -> Result<(), TransportError> {
        let url = self.url(key);
        tracing::debug!(url = %url, data = value, "consul put");

        let request = self
            .client
            .put(&url)
            .body(value.unwrap_or_default().to_string());
        self.send("PUT", &url, request)?;
        Ok(())
    }

    fn delete(&self, key: &str) -> Result<(), TransportError> {
        let url = self.url(key);
        tracing::debug!(url = %url, "consul delete key");

        let request = self.client.delete(&url);
        self.send("DELETE", &url, request)?;
        Ok(())
    }

    fn delete_tree(&self, key: &str) -> Result<(), TransportError> {
        let url = self.url(key);
        tracing::warn!(url = %url, "consul delete");

        let request = self.client.delete(&url).query(&[("recurse", "true")]);
        self.send("DELETE", &url, request)?;
        Ok(())
    }
}

/// In-process key-value store with the prefix semantics of consul
#[derive(Debug, Default)]
pub struct MemoryKv {
    entries: RefCell<BTreeMap<String, Vec<u8>>>,
}

impl MemoryKv {
    pub fn get(&self, key: &str) -> Option<String> {
        self.entries
            .borrow()
            .get(key)
            .map(|value| String::from_utf8_lossy(value).into_owned())
    }

    pub fn keys(&self) -> Vec<String> {
        self.entries.borrow().keys().cloned().collect()
    }
}

impl KvTransport for MemoryKv {
    fn location(&self) -> &str {
        "memory://"
    }

    fn list_tree(&self, prefix: &str) -> Result<Vec<KvEntry>, TransportError> {
        Ok(self
            .entries
            .borrow()
            .iter()
            .filter(|(key, _)| key.starts_with(prefix))
            .map(|(key, value)| {
                let value = (!value.is_empty()).then(|| value.clone());
                KvEntry::new(key.clone(), value)
            })
            .collect())
    }

    fn list_children(&self, prefix: &str) -> Result<Vec<String>, TransportError> {
        let children: BTreeSet<String> = self
            .entries
            .borrow()
            .keys()
            .filter_map(|key| key.strip_prefix(prefix))
            .filter_map(|rest| rest.split('/').next())
            .filter(|child| !child.is_empty())
            .map(str::to_string)
            .collect();

        Ok(children.into_iter().collect())
    }

    fn put(&self, key: &str, value: Option<&str>) -> Result<(), TransportError> {
        self.entries.borrow_mut().insert(
            key.to_string(),
            value.unwrap_or_default().as_bytes().to_vec(),
        );
        Ok(())
    }

    fn delete(&self, key: &str) -> Result<(), TransportError> {
        self.entries.borrow_mut().remove(key);
        Ok(())
    }

    fn delete_tree(&self, key: &str) -> Result<(), TransportError> {
        self.entries
            .borrow_mut()
            .retain(|existing, _| !existing.starts_with(key));
        Ok(())
    }
}
