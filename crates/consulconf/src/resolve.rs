//! key-path resolution
//!
//! A key-path such as `other._shared.key1` names something to pull into a namespace. The first
//! segment is looked up in the current document. When it is not a top level key there, it is
//! taken as the name of another document and the walk continues inside that document.
//!
//! The walk ends on either
//! - an object: all of its entries are added
//! - a string: it is added under the name of the last segment
//!
//! Only the literal content of the target is used. An `_inherit` found inside a referenced
//! section is copied like any other key and is not expanded again.
use crate::namespace::{ensure_disjoint, stringify, Namespace};
use crate::store::{Backend, Document, DocumentStore, LoadError};
use serde_json::Value;

#[derive(thiserror::Error, Debug)]
pub enum ResolveError {
    #[error("unable to load document {document}")]
    NotFound {
        document: String,
        #[source]
        source: LoadError,
    },
    #[error(
        "the key-path {key_path:?} does not point to any key or document: \
        {segment:?} not found in {document} at {location}"
    )]
    MissingKey {
        segment: String,
        key_path: String,
        document: String,
        location: String,
    },
    #[error("duplicate keys: {}", .0.join(", "))]
    DuplicateKey(Vec<String>),
    #[error("the key-path {key_path:?} in {document} at {location} resolves to neither a string nor an object")]
    UnrecognizedValue {
        key_path: String,
        document: String,
        location: String,
    },
    #[error("{0} is not implemented")]
    NotImplemented(&'static str),
    #[error("value of {key} in {namespace} cannot be nested")]
    NestedValue { namespace: String, key: String },
    #[error("_inherit in {namespace} must be a list of key-paths")]
    InvalidInherit { namespace: String },
}

/// Resolve `key_paths` (in order) relative to `document` and union the results
///
/// Fails on the first key that is provided by more than one key-path.
pub fn resolve_key_paths<B, S>(
    store: &DocumentStore<B>,
    key_paths: &[S],
    document: &str,
) -> Result<Namespace, ResolveError>
where
    B: Backend + ?Sized,
    S: AsRef<str>,
{
    let current = store
        .load(document)
        .map_err(|source| ResolveError::NotFound {
            document: document.to_string(),
            source,
        })?;

    let mut union = Namespace::new();
    for key_path in key_paths {
        KeyPath::new(key_path.as_ref(), document, store.location())
            .resolve_into(store, &current, &mut union)?;
    }

    Ok(union)
}

#[derive(derive_new::new)]
struct KeyPath<'a> {
    key_path: &'a str,
    document: &'a str,
    location: &'a str,
}

impl<'a> KeyPath<'a> {
    fn missing(&self, segment: &str, document: &str) -> ResolveError {
        tracing::debug!(
            key_path = self.key_path,
            unrecognized_part_of_key_path = segment,
            document,
            location = self.location,
            "key-path does not point to any key or document"
        );

        ResolveError::MissingKey {
            segment: segment.to_string(),
            key_path: self.key_path.to_string(),
            document: document.to_string(),
            location: self.location.to_string(),
        }
    }

    fn resolve_into<B: Backend + ?Sized>(
        &self,
        store: &DocumentStore<B>,
        current: &std::rc::Rc<Document>,
        union: &mut Namespace,
    ) -> Result<(), ResolveError> {
        let mut segments = self.key_path.split('.').peekable();
        let first = segments.peek().copied().unwrap_or_default();

        let (root, document) = if current.contains_key(first) {
            (std::rc::Rc::clone(current), self.document)
        } else {
            segments.next();
            let root = store
                .load(first)
                .map_err(|_| self.missing(first, self.document))?;
            (root, first)
        };

        let mut last = first;
        let mut target: Option<&Value> = None;
        for segment in segments {
            let object = match target {
                None => &*root,
                Some(Value::Object(object)) => object,
                Some(_) => return Err(self.missing(segment, document)),
            };

            target = Some(
                object
                    .get(segment)
                    .ok_or_else(|| self.missing(segment, document))?,
            );
            last = segment;
        }

        match target {
            None => merge_object(union, &root),
            Some(Value::Object(object)) => merge_object(union, object),
            Some(Value::String(value)) => {
                ensure_disjoint(union, [last])?;
                union.insert(last.to_string(), value.clone());
                Ok(())
            }
            Some(_) => Err(ResolveError::UnrecognizedValue {
                key_path: self.key_path.to_string(),
                document: document.to_string(),
                location: self.location.to_string(),
            }),
        }
    }
}

fn merge_object(union: &mut Namespace, object: &Document) -> Result<(), ResolveError> {
    ensure_disjoint(union, object.keys().map(String::as_str))?;
    union.extend(
        object
            .iter()
            .map(|(key, value)| (key.clone(), stringify(value))),
    );
    Ok(())
}
