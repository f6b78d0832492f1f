use super::{Backend, Document, LoadError};
use crate::directive::Directive;
use crate::kv::{KvEntry, KvTransport};
use serde_json::{Map, Value};

/// Documents stored as key trees in a remote key-value store
///
/// Document `test` is every key below `test/`.
#[derive(Debug, derive_new::new)]
pub struct RemoteBackend<T> {
    kv: T,
}

impl<T: KvTransport> Backend for RemoteBackend<T> {
    fn location(&self) -> &str {
        self.kv.location()
    }

    fn document_names(&self) -> Result<Vec<String>, LoadError> {
        Ok(self.kv.list_children("")?)
    }

    fn fetch(&self, name: &str) -> Result<Document, LoadError> {
        let entries = self.kv.list_tree(&format!("{name}/"))?;
        if entries.is_empty() {
            return Err(LoadError::NotFound {
                name: name.to_string(),
                location: self.location().to_string(),
            });
        }

        document_from_entries(name, entries)
    }
}

/// Rebuild a nested document from the flat keys of a recursive listing
///
/// Keys outside of `name/` are ignored. Every `/` in the remaining key opens a nested object.
/// `_inherit` and `_modify` hold json lists (empty value: empty list). Any other empty value
/// becomes an empty object, which is how empty namespaces are stored.
pub fn document_from_entries(
    name: &str,
    entries: impl IntoIterator<Item = KvEntry>,
) -> Result<Document, LoadError> {
    let mut document = Map::new();

    for entry in entries {
        let Some(path) = entry
            .key
            .strip_prefix(name)
            .and_then(|rest| rest.strip_prefix('/'))
            .map(|rest| rest.trim_end_matches('/'))
        else {
            continue;
        };

        if path.is_empty() {
            continue;
        }

        let (parents, leaf) = match path.rsplit_once('/') {
            Some((parents, leaf)) => (Some(parents), leaf),
            None => (None, path),
        };

        let mut current = &mut document;
        for segment in parents.into_iter().flat_map(|parents| parents.split('/')) {
            let slot = current
                .entry(segment)
                .or_insert_with(|| Value::Object(Map::new()));
            current = match slot {
                Value::Object(object) => object,
                _ => {
                    return Err(LoadError::MalformedKey {
                        document: name.to_string(),
                        key: entry.key.clone(),
                    })
                }
            };
        }

        let raw = entry.value.unwrap_or_default();
        if Directive::is_list_valued(leaf) {
            let value = if raw.is_empty() {
                Value::Array(vec![])
            } else {
                serde_json::from_slice(&raw).map_err(|source| LoadError::InvalidDirective {
                    document: name.to_string(),
                    key: entry.key.clone(),
                    source,
                })?
            };
            current.insert(leaf.to_string(), value);
        } else if raw.is_empty() {
            current
                .entry(leaf)
                .or_insert_with(|| Value::Object(Map::new()));
        } else {
            let value = String::from_utf8_lossy(&raw).into_owned();
            current.insert(leaf.to_string(), Value::String(value));
        }
    }

    Ok(document)
}
