//! flat per-application namespaces
//!
//! Every object at the top level of a document defines one namespace, named
//! `<document>/<key>`. Its entries are applied in order:
//!
//! | key          | effect                                              |
//! |--------------|-----------------------------------------------------|
//! | `_inherit`   | union with the resolved key-paths (see [crate::resolve]) |
//! | `_modify`    | error, not implemented                              |
//! | `_anything`  | skipped                                             |
//! | `key`        | added as a string, nested values are an error       |
//!
//! Top level keys that are not objects (and top level directives) make up the document's own
//! namespace, named `<document>`. Top level lists are kept as json text. It is always produced
//! last, even when empty.
//!
//! No key may be defined twice within a namespace.
use crate::directive::{Directive, MODIFY};
use crate::resolve::{resolve_key_paths, ResolveError};
use crate::store::{Backend, Document, DocumentStore};
use serde_json::Value;
use std::rc::Rc;

pub type Namespace = indexmap::IndexMap<String, String>;

/// Resolved namespaces, keyed by their full path (e.g. `test/app5`)
pub type NamespaceSet = indexmap::IndexMap<String, Namespace>;

/// Json text with `", "` and `": "` separators
struct SpacedFormatter;

impl serde_json::ser::Formatter for SpacedFormatter {
    fn begin_array_value<W: ?Sized + std::io::Write>(
        &mut self,
        writer: &mut W,
        first: bool,
    ) -> std::io::Result<()> {
        if first {
            Ok(())
        } else {
            writer.write_all(b", ")
        }
    }

    fn begin_object_key<W: ?Sized + std::io::Write>(
        &mut self,
        writer: &mut W,
        first: bool,
    ) -> std::io::Result<()> {
        if first {
            Ok(())
        } else {
            writer.write_all(b", ")
        }
    }

    fn begin_object_value<W: ?Sized + std::io::Write>(
        &mut self,
        writer: &mut W,
    ) -> std::io::Result<()> {
        writer.write_all(b": ")
    }
}

/// Strings as they are, everything else as json text
pub(crate) fn stringify(value: &Value) -> String {
    use serde::Serialize;

    if let Value::String(s) = value {
        return s.clone();
    }

    let mut out = vec![];
    let mut serializer = serde_json::Serializer::with_formatter(&mut out, SpacedFormatter);
    match value.serialize(&mut serializer) {
        Ok(()) => String::from_utf8_lossy(&out).into_owned(),
        Err(_) => value.to_string(),
    }
}

/// Fails with all `keys` that are already defined in `namespace`
pub(crate) fn ensure_disjoint<'k>(
    namespace: &Namespace,
    keys: impl IntoIterator<Item = &'k str>,
) -> Result<(), ResolveError> {
    let duplicates: Vec<String> = keys
        .into_iter()
        .filter(|key| namespace.contains_key(*key))
        .map(str::to_string)
        .collect();

    if duplicates.is_empty() {
        Ok(())
    } else {
        tracing::debug!(keys = ?duplicates, "duplicate keys");
        Err(ResolveError::DuplicateKey(duplicates))
    }
}

/// Start building the namespaces of `document`
///
/// The document is loaded immediately, namespaces are built on iteration.
pub fn build_namespaces<'s, B: Backend + ?Sized>(
    store: &'s DocumentStore<B>,
    document: &str,
) -> Result<Namespaces<'s, B>, ResolveError> {
    let loaded = store
        .load(document)
        .map_err(|source| ResolveError::NotFound {
            document: document.to_string(),
            source,
        })?;

    let basename = document.rsplit('/').next().unwrap_or(document).to_string();
    let keys: Vec<String> = loaded.keys().cloned().collect();

    Ok(Namespaces {
        store,
        document_name: document.to_string(),
        basename,
        document: loaded,
        keys: keys.into_iter(),
        own: Some(Namespace::new()),
    })
}

/// Build the namespaces of all `documents` into one set
///
/// Stops at the first error.
pub fn resolve_documents<B, S>(
    store: &DocumentStore<B>,
    documents: &[S],
) -> Result<NamespaceSet, ResolveError>
where
    B: Backend + ?Sized,
    S: AsRef<str>,
{
    let mut set = NamespaceSet::new();
    for document in documents {
        for namespace in build_namespaces(store, document.as_ref())? {
            let (path, namespace) = namespace?;
            tracing::trace!(path = %path, keys = namespace.len(), "namespace resolved");
            set.insert(path, namespace);
        }
    }

    Ok(set)
}

/// Iterator over the namespaces of one document
///
/// Yields `(path, namespace)` in document order and the document's own namespace last.
/// Nothing is yielded after an error.
pub struct Namespaces<'s, B: ?Sized> {
    store: &'s DocumentStore<B>,
    document_name: String,
    basename: String,
    document: Rc<Document>,
    keys: std::vec::IntoIter<String>,
    /// the document's own namespace, `None` once yielded
    own: Option<Namespace>,
}

impl<'s, B: Backend + ?Sized> Namespaces<'s, B> {
    fn path_of(&self, key: &str) -> String {
        format!("{}/{}", self.basename, key)
    }

    /// Apply one entry of a namespace definition
    fn apply(
        &self,
        namespace_path: &str,
        namespace: &mut Namespace,
        key: &str,
        value: &Value,
    ) -> Result<(), ResolveError> {
        match Directive::classify(key) {
            Directive::Inherit => {
                let key_paths = key_paths(value).ok_or_else(|| ResolveError::InvalidInherit {
                    namespace: namespace_path.to_string(),
                })?;
                let inherited = resolve_key_paths(self.store, &key_paths, &self.document_name)?;
                ensure_disjoint(namespace, inherited.keys().map(String::as_str))?;
                namespace.extend(inherited);
            }
            Directive::Modify => return Err(ResolveError::NotImplemented(MODIFY)),
            Directive::Reserved(key) => {
                tracing::debug!(key, "skipping key because it starts with an underscore");
            }
            Directive::Data(key) if namespace.contains_key(key) => {
                return Err(ResolveError::DuplicateKey(vec![key.to_string()]));
            }
            Directive::Data(key) => match value {
                Value::Object(_) | Value::Array(_) => {
                    tracing::debug!(key, %value, "invalid value");
                    return Err(ResolveError::NestedValue {
                        namespace: namespace_path.to_string(),
                        key: key.to_string(),
                    });
                }
                value => {
                    namespace.insert(key.to_string(), stringify(value));
                }
            },
        }

        Ok(())
    }

    fn build_section(&self, path: &str, section: &Document) -> Result<Namespace, ResolveError> {
        let mut namespace = Namespace::new();
        for (key, value) in section {
            self.apply(path, &mut namespace, key, value)?;
        }
        Ok(namespace)
    }

    fn fail(&mut self, error: ResolveError) -> Option<Result<(String, Namespace), ResolveError>> {
        self.keys = Vec::new().into_iter();
        self.own = None;
        Some(Err(error))
    }
}

fn key_paths(value: &Value) -> Option<Vec<&str>> {
    value.as_array()?.iter().map(Value::as_str).collect()
}

impl<'s, B: Backend + ?Sized> Iterator for Namespaces<'s, B> {
    type Item = Result<(String, Namespace), ResolveError>;

    fn next(&mut self) -> Option<Self::Item> {
        let document = Rc::clone(&self.document);

        while let Some(key) = self.keys.next() {
            let Some(value) = document.get(&key) else {
                continue;
            };

            if let (Directive::Data(_), Value::Object(section)) = (Directive::classify(&key), value)
            {
                let path = self.path_of(&key);
                return match self.build_section(&path, section) {
                    Ok(namespace) => Some(Ok((path, namespace))),
                    Err(error) => self.fail(error),
                };
            }

            let mut own = self.own.take().unwrap_or_default();
            let applied = match (Directive::classify(&key), value) {
                (Directive::Data(key), Value::Array(_)) => {
                    ensure_disjoint(&own, [key]).map(|()| {
                        own.insert(key.to_string(), stringify(value));
                    })
                }
                _ => self.apply(&self.basename, &mut own, &key, value),
            };
            self.own = Some(own);
            if let Err(error) = applied {
                return self.fail(error);
            }
        }

        self.own
            .take()
            .map(|own| Ok((self.basename.clone(), own)))
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::documents;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn namespace(pairs: &[(&str, &str)]) -> Namespace {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    fn build(store: &DocumentStore<crate::store::MemoryBackend>, name: &str) -> NamespaceSet {
        build_namespaces(store, name)
            .unwrap()
            .collect::<Result<_, _>>()
            .unwrap()
    }

    #[test]
    fn plain_documents_are_flattened() {
        let store = documents! {
            "test" => json!({
                "app1": {"key": "value", "port": 8080, "debug": true},
                "app2": {},
                "top": "level",
            }),
        };

        let paths: Vec<_> = build_namespaces(&store, "test")
            .unwrap()
            .map(|result| result.unwrap().0)
            .collect();
        assert_eq!(paths, vec!["test/app1", "test/app2", "test"]);

        let set = build(&store, "test");
        assert_eq!(
            set["test/app1"],
            namespace(&[("key", "value"), ("port", "8080"), ("debug", "true")])
        );
        assert_eq!(set["test/app2"], Namespace::new());
        assert_eq!(set["test"], namespace(&[("top", "level")]));
    }

    #[test]
    fn inherit_shared_section() {
        let store = documents! {
            "test" => json!({
                "_shared": {"key1": "val1"},
                "_shared2": {"key2": "val2"},
                "app2": {"_inherit": ["_shared"]},
                "app3": {"_inherit": []},
                "app5": {"_inherit": ["_shared", "_shared2"]},
                "app21": {"_inherit": ["_shared"], "key": "value"},
            }),
        };

        let set = build(&store, "test");
        assert_eq!(set["test/app2"], namespace(&[("key1", "val1")]));
        assert_eq!(set["test/app3"], Namespace::new());
        assert_eq!(
            set["test/app5"],
            namespace(&[("key1", "val1"), ("key2", "val2")])
        );
        assert_eq!(
            set["test/app21"],
            namespace(&[("key1", "val1"), ("key", "value")])
        );
        assert_eq!(set["test"], Namespace::new());
        assert_eq!(set.len(), 5);
    }

    #[test]
    fn own_namespace_inherits() {
        let store = documents! {
            "test-ns1" => json!({"key1": "val1"}),
            "test-ns2" => json!({"_inherit": ["test-ns1"]}),
        };

        assert_eq!(
            build(&store, "test-ns2"),
            [("test-ns2".to_string(), namespace(&[("key1", "val1")]))]
                .into_iter()
                .collect::<NamespaceSet>()
        );
    }

    #[test]
    fn inherit_duplicates() {
        let store = documents! {
            "test" => json!({"_shared": {"key1": "val1"}, "_shared2": {"key2": "val2"}}),
            "test-namespace" => json!({"_shared": {"key1": "val11"}, "_shared2": {"key2": "val22"}}),
            "inherit1" => json!({"app1": {"_inherit": ["test._shared", "test-namespace._shared"]}}),
            "inherit2" => json!({"app1": {"_inherit": ["test._shared2", "test-namespace._shared2"]}}),
            "inherit3" => json!({"app1": {"key2": "val", "_inherit": ["test._shared2"]}}),
        };

        for name in ["inherit1", "inherit2", "inherit3"] {
            let result: Result<NamespaceSet, _> =
                build_namespaces(&store, name).unwrap().collect();
            assert!(
                matches!(result, Err(ResolveError::DuplicateKey(_))),
                "{name}: {result:?}"
            );
        }
    }

    #[test]
    fn literal_after_inherit_is_duplicate() {
        let store = documents! {
            "test" => json!({
                "_shared": {"key1": "val1"},
                "app": {"_inherit": ["_shared"], "key1": "other"},
            }),
        };

        let err = build_namespaces(&store, "test")
            .unwrap()
            .find_map(Result::err)
            .unwrap();
        assert!(matches!(err, ResolveError::DuplicateKey(keys) if keys == ["key1"]));
    }

    #[test]
    fn missing_key_stops_iteration() {
        let store = documents! {
            "inherit4" => json!({
                "app1": {"_inherit": ["key_does_not_exist"]},
                "app2": {"key": "value"},
            }),
        };

        let mut namespaces = build_namespaces(&store, "inherit4").unwrap();
        assert!(matches!(
            namespaces.next(),
            Some(Err(ResolveError::MissingKey { segment, .. })) if segment == "key_does_not_exist"
        ));
        assert!(namespaces.next().is_none());
    }

    #[test]
    fn modify_is_not_implemented() {
        let store = documents! { "test" => json!({"app": {"_modify": ["x"]}}) };
        let result: Result<NamespaceSet, _> = build_namespaces(&store, "test").unwrap().collect();
        assert!(matches!(result, Err(ResolveError::NotImplemented("_modify"))));
    }

    #[test]
    fn nested_values_are_rejected() {
        for document in [
            json!({"app": {"nested": {"key": "value"}}}),
            json!({"app": {"hosts": ["a", "b"]}}),
        ] {
            let store = documents! { "test" => document };
            let result: Result<NamespaceSet, _> =
                build_namespaces(&store, "test").unwrap().collect();
            assert!(matches!(result, Err(ResolveError::NestedValue { .. })));
        }
    }

    #[test]
    fn top_level_list_is_json_text() {
        let store = documents! {
            "test" => json!({"hosts": ["a", "b"], "app": {"k": "v"}}),
        };

        let set = build(&store, "test");
        assert_eq!(set["test"], namespace(&[("hosts", r#"["a", "b"]"#)]));
        assert_eq!(set["test/app"], namespace(&[("k", "v")]));

        let store = documents! {
            "test" => json!({"_inherit": ["test-ns1"], "key1": ["a"]}),
            "test-ns1" => json!({"key1": "val1"}),
        };
        let result: Result<NamespaceSet, _> = build_namespaces(&store, "test").unwrap().collect();
        assert!(matches!(result, Err(ResolveError::DuplicateKey(keys)) if keys == ["key1"]));
    }

    #[test]
    fn stringify_like_python_json() {
        assert_eq!(stringify(&json!("text")), "text");
        assert_eq!(stringify(&json!(8080)), "8080");
        assert_eq!(stringify(&json!(true)), "true");
        assert_eq!(stringify(&json!(["_shared", "_shared2"])), r#"["_shared", "_shared2"]"#);
        assert_eq!(stringify(&json!({"a": 1, "b": [2]})), r#"{"a": 1, "b": [2]}"#);
    }

    #[test]
    fn inherit_must_be_a_list_of_strings() {
        let store = documents! { "test" => json!({"app": {"_inherit": "_shared"}}) };
        let result: Result<NamespaceSet, _> = build_namespaces(&store, "test").unwrap().collect();
        assert!(matches!(result, Err(ResolveError::InvalidInherit { .. })));
    }

    #[test]
    fn missing_document() {
        let store = documents! {};
        assert!(matches!(
            build_namespaces(&store, "nope"),
            Err(ResolveError::NotFound { .. })
        ));
    }

    #[test]
    fn all_documents() {
        let store = documents! {
            "test" => json!({
                "_shared": {"key1": "val1"},
                "app9": {"_inherit": ["test-namespace._shared3.key2", "_shared.key1"]},
            }),
            "test-namespace" => json!({"_shared3": {"key2": "val222", "key3": "val3"}}),
        };

        let names = store.document_names().unwrap();
        let set = resolve_documents(&store, &names).unwrap();
        assert_eq!(
            set.keys().collect::<Vec<_>>(),
            vec!["test/app9", "test", "test-namespace"]
        );
        assert_eq!(
            set["test/app9"],
            namespace(&[("key2", "val222"), ("key1", "val1")])
        );
    }
}
