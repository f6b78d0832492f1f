//! # consulconf - application key:value configuration
//!
//! Reads a set of json documents and turns them into flat `key = value` namespaces, one per
//! application, which are then printed, written to a Consul key-value store or passed to a
//! process as its environment.
//!
//! ## Introduction for developers
//!
//! ### Documents
//!
//! A document is a named json object. The name is the file name without `.json` (local
//! directory) or the first path segment below the base url (key-value store). See [store].
//!
//! ```json
//! {
//!     "_shared": {"key1": "val1"},
//!     "app1": {"_inherit": ["_shared"], "key2": "val2"},
//!     "app2": {"_inherit": ["other._common", "_shared.key1"]},
//!     "version": 3
//! }
//! ```
//!
//! Stored as `test.json` this document defines three namespaces:
//!
//! | **path**    | **namespace**                    |
//! |-------------|----------------------------------|
//! | `test/app1` | `key1=val1`, `key2=val2`         |
//! | `test/app2` | everything in `other._common`, `key1=val1` |
//! | `test`      | `version=3`                      |
//!
//! ### Directives
//!
//! Keys starting with `_` are directives ([directive::Directive]). `_inherit` lists key-paths
//! to pull values from, `_modify` is reserved and rejected, anything else (like `_shared`
//! above) is ignored in the output but can be referenced.
//!
//! ### Resolution
//!
//! [namespace::build_namespaces] walks one document and asks [resolve::resolve_key_paths] for
//! every `_inherit`. Key-paths may point into other documents, which are loaded through the same
//! [store::DocumentStore] so each document is read at most once per run.
//!
//! Defining a key twice in one namespace is always an error, whether the key was written
//! literally or came in through `_inherit`. The first error aborts the run.
//!
//! ### Output
//!
//! The result is a [sink::ConfigSet], handed to one of the functions in [sink].
//! `--raw` skips resolution entirely and uses [raw::flatten_raw] instead.
//!
pub mod directive;
pub mod kv;
pub mod namespace;
pub mod raw;
pub mod resolve;
pub mod sink;
pub mod store;
