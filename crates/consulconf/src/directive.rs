//! reserved `_`-prefixed keys
//!
//! Every key inside a document is either plain data or a directive. Directives are
//! recognized here and nowhere else.

pub const INHERIT: &str = "_inherit";
pub const MODIFY: &str = "_modify";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Directive<'k> {
    /// `_inherit`: a list of key-paths whose values are pulled into the namespace
    Inherit,
    /// `_modify`: reserved, not supported
    Modify,
    /// Any other key starting with `_`. Skipped.
    Reserved(&'k str),
    /// A regular key
    Data(&'k str),
}

impl<'k> Directive<'k> {
    pub fn classify(key: &'k str) -> Self {
        match key {
            INHERIT => Directive::Inherit,
            MODIFY => Directive::Modify,
            key if key.starts_with('_') => Directive::Reserved(key),
            key => Directive::Data(key),
        }
    }

    /// Whether the value stored under a `/`-separated key is a json encoded list of key-paths
    pub fn is_list_valued(path: &str) -> bool {
        let leaf = path.rsplit('/').next().unwrap_or(path);
        matches!(
            Directive::classify(leaf),
            Directive::Inherit | Directive::Modify
        )
    }
}
