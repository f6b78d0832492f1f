//! flatten documents as they are
//!
//! Every leaf becomes `<document>/<key>/<nested key>/... = value`. Nothing is resolved,
//! `_inherit` is copied as its json text.
use crate::namespace::stringify;
use crate::store::Document;
use serde_json::Value;

/// Flat `path = value` pairs
pub type RawSet = indexmap::IndexMap<String, String>;

struct Frame<'d> {
    prefix: String,
    entries: serde_json::map::Iter<'d>,
}

/// Flatten `document` depth first, in document order
pub fn flatten_raw(name: &str, document: &Document) -> RawSet {
    let mut flat = RawSet::new();
    let mut stack = vec![Frame {
        prefix: name.to_string(),
        entries: document.iter(),
    }];

    while let Some(frame) = stack.last_mut() {
        let Some((key, value)) = frame.entries.next() else {
            stack.pop();
            continue;
        };

        let path = format!("{}/{}", frame.prefix, key);
        match value {
            Value::Object(object) => stack.push(Frame {
                prefix: path,
                entries: object.iter(),
            }),
            value => {
                flat.insert(path, stringify(value));
            }
        }
    }

    flat
}
