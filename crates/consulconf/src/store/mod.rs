//! named json documents
//!
//! A [Backend] knows how to list and fetch documents at one base location (a directory, a
//! key-value prefix, ...). [DocumentStore] wraps a backend and caches every document it loads
//! for as long as the store lives, which is one run.
mod local;
mod remote;

pub use local::LocalBackend;
pub use remote::{document_from_entries, RemoteBackend};

use std::cell::RefCell;
use std::collections::HashMap;
use std::path::PathBuf;
use std::rc::Rc;

/// A loaded json object. Key order is the order of the source.
pub type Document = serde_json::Map<String, serde_json::Value>;

pub trait Backend {
    /// Human readable base location, used in diagnostics
    fn location(&self) -> &str;

    /// Names of every document available at this location
    fn document_names(&self) -> Result<Vec<String>, LoadError>;

    /// Load a single document
    fn fetch(&self, name: &str) -> Result<Document, LoadError>;
}

impl<B: Backend + ?Sized> Backend for Box<B> {
    fn location(&self) -> &str {
        (**self).location()
    }

    fn document_names(&self) -> Result<Vec<String>, LoadError> {
        (**self).document_names()
    }

    fn fetch(&self, name: &str) -> Result<Document, LoadError> {
        (**self).fetch(name)
    }
}

#[derive(thiserror::Error, Debug)]
pub enum LoadError {
    #[error("document {name} not found at {location}")]
    NotFound { name: String, location: String },
    #[error("unable to read {}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid json in {}", path.display())]
    InvalidJson {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("document {0} is not a json object")]
    NotAnObject(String),
    #[error("key {key} of document {document} cannot be nested below a value")]
    MalformedKey { document: String, key: String },
    #[error("key {key} of document {document} must hold a json list")]
    InvalidDirective {
        document: String,
        key: String,
        #[source]
        source: serde_json::Error,
    },
    #[error(transparent)]
    Transport(#[from] crate::kv::TransportError),
}

/// Read-through cache in front of a [Backend]
#[derive(Debug)]
pub struct DocumentStore<B: ?Sized> {
    cache: RefCell<HashMap<String, Rc<Document>>>,
    backend: B,
}

impl<B: Backend> DocumentStore<B> {
    pub fn new(backend: B) -> Self {
        Self {
            cache: Default::default(),
            backend,
        }
    }
}

impl<B: Backend + ?Sized> DocumentStore<B> {
    pub fn location(&self) -> &str {
        self.backend.location()
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn document_names(&self) -> Result<Vec<String>, LoadError> {
        self.backend.document_names()
    }

    /// Load a document, fetching it from the backend at most once
    pub fn load(&self, name: &str) -> Result<Rc<Document>, LoadError> {
        if let Some(document) = self.cache.borrow().get(name) {
            return Ok(Rc::clone(document));
        }

        tracing::debug!(document = name, location = self.location(), "load document");
        let document = Rc::new(self.backend.fetch(name)?);
        self.cache
            .borrow_mut()
            .insert(name.to_string(), Rc::clone(&document));

        Ok(document)
    }
}

/// Documents held in memory
///
/// See [documents!](crate::documents) for a convenient way to build a store from literals.
#[derive(Debug, Default)]
pub struct MemoryBackend {
    documents: indexmap::IndexMap<String, serde_json::Value>,
}

impl MemoryBackend {
    pub fn insert(&mut self, name: impl Into<String>, document: serde_json::Value) {
        self.documents.insert(name.into(), document);
    }
}

impl Backend for MemoryBackend {
    fn location(&self) -> &str {
        "memory://"
    }

    fn document_names(&self) -> Result<Vec<String>, LoadError> {
        Ok(self.documents.keys().cloned().collect())
    }

    fn fetch(&self, name: &str) -> Result<Document, LoadError> {
        match self.documents.get(name) {
            Some(serde_json::Value::Object(document)) => Ok(document.clone()),
            Some(_) => Err(LoadError::NotAnObject(name.to_string())),
            None => Err(LoadError::NotFound {
                name: name.to_string(),
                location: self.location().to_string(),
            }),
        }
    }
}

/// Utility macro to create a [DocumentStore] over a [MemoryBackend]
///
/// ```
/// # use consulconf::documents;
/// let store = documents! {
///     "test" => serde_json::json!({"app1": {"key": "value"}}),
///     "other" => serde_json::json!({"_shared": {"key1": "val1"}}),
/// };
/// assert_eq!(store.document_names().unwrap(), vec!["test", "other"]);
/// ```
#[macro_export]
macro_rules! documents {
    { $($name:expr => $document:expr),* $(,)? } => {{
        let mut backend = $crate::store::MemoryBackend::default();
        $(
            backend.insert($name, $document);
        )*
        $crate::store::DocumentStore::new(backend)
    }};
}
