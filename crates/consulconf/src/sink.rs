//! what to do with the result
//!
//! A run produces one [ConfigSet], which goes to exactly one of
//! - stdout ([write_json], or yaml through [serde])
//! - a key-value store ([publish], optionally after [clean_destination])
//! - the environment of a child process ([merge_namespaces] and [exec])
use crate::kv::{KvTransport, TransportError};
use crate::namespace::{Namespace, NamespaceSet};
use crate::raw::RawSet;
use serde::Serialize;
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq)]
pub enum ConfigSet {
    /// Resolved namespaces
    Namespaces(NamespaceSet),
    /// Flattened documents (`--raw`)
    Raw(RawSet),
}

impl ConfigSet {
    /// Top level paths, in order
    pub fn paths(&self) -> Vec<&str> {
        match self {
            ConfigSet::Namespaces(set) => set.keys().map(String::as_str).collect(),
            ConfigSet::Raw(set) => set.keys().map(String::as_str).collect(),
        }
    }

    /// Keep the paths matching `pattern`
    pub fn retain_matching(&mut self, pattern: &regex::Regex) {
        match self {
            ConfigSet::Namespaces(set) => set.retain(|path, _| pattern.is_match(path)),
            ConfigSet::Raw(set) => set.retain(|path, _| pattern.is_match(path)),
        }
    }
}

/// Serialized with sorted keys
impl Serialize for ConfigSet {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        match self {
            ConfigSet::Namespaces(set) => set
                .iter()
                .map(|(path, namespace)| (path, namespace.iter().collect::<BTreeMap<_, _>>()))
                .collect::<BTreeMap<_, _>>()
                .serialize(serializer),
            ConfigSet::Raw(set) => set.iter().collect::<BTreeMap<_, _>>().serialize(serializer),
        }
    }
}

#[derive(thiserror::Error, Debug)]
pub enum SinkError {
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error("unknown namespace {0}")]
    UnknownNamespace(String),
    #[error("raw output cannot be used as an environment")]
    RawExec,
    #[error("no command given")]
    MissingCommand,
    #[error("failed to run {command}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },
}

/// Sorted, indented json
pub fn write_json(set: &ConfigSet, writer: impl std::io::Write) -> serde_json::Result<()> {
    let formatter = serde_json::ser::PrettyFormatter::with_indent(b"    ");
    let mut serializer = serde_json::Serializer::with_formatter(writer, formatter);
    set.serialize(&mut serializer)
}

/// Write every key of `set` to `kv`
///
/// Resolved namespaces are written as `<namespace>/<key>`. An empty namespace is written as an
/// empty `<namespace>/` so that it still exists.
pub fn publish<T: KvTransport + ?Sized>(kv: &T, set: &ConfigSet) -> Result<(), TransportError> {
    tracing::info!(location = kv.location(), "publish");

    match set {
        ConfigSet::Namespaces(set) => {
            for (path, namespace) in set {
                for (key, value) in namespace {
                    kv.put(&format!("{path}/{key}"), Some(value.as_str()))?;
                }

                if namespace.is_empty() {
                    kv.put(&format!("{}/", path.trim_end_matches('/')), None)?;
                }
            }
        }
        ConfigSet::Raw(set) => {
            for (key, value) in set {
                kv.put(key, Some(value.as_str()))?;
            }
        }
    }

    Ok(())
}

/// Recursively delete each of `keys` unless it starts with one of `excludes`
///
/// Deleting `key` removes `key` itself and everything below `key/`, never a sibling such as
/// `key-other`. Keys are visited in sorted order, a key below an already deleted key is
/// skipped. Returns the deleted keys.
pub fn delete_directories<'k, T: KvTransport + ?Sized>(
    kv: &T,
    keys: impl IntoIterator<Item = &'k str>,
    excludes: &[String],
) -> Result<Vec<String>, TransportError> {
    let mut keys: Vec<&str> = keys.into_iter().collect();
    keys.sort_unstable();
    keys.dedup();

    let mut deleted: Vec<String> = vec![];
    for key in keys {
        if excludes.iter().any(|exclude| key.starts_with(exclude.as_str())) {
            tracing::debug!(key, "excluded from delete");
            continue;
        }

        if deleted.iter().any(|done| key.starts_with(&format!("{done}/"))) {
            continue;
        }

        let key = key.trim_end_matches('/');
        kv.delete_tree(&format!("{key}/"))?;
        kv.delete(key)?;
        deleted.push(key.to_string());
    }

    Ok(deleted)
}

/// Delete what is at the destination before publishing `set`
///
/// Covers both the existing top level keys and the paths about to be written.
pub fn clean_destination<T: KvTransport + ?Sized>(
    kv: &T,
    set: &ConfigSet,
    excludes: &[String],
) -> Result<Vec<String>, TransportError> {
    let existing = kv.list_children("")?;
    let keys = existing
        .iter()
        .map(String::as_str)
        .chain(set.paths());

    delete_directories(kv, keys, excludes)
}

/// Union of the namespaces in `selection` (`ns1+test/app20`)
///
/// A key defined by more than one namespace is only a warning, the last one wins.
pub fn merge_namespaces(set: &ConfigSet, selection: &str) -> Result<Namespace, SinkError> {
    let ConfigSet::Namespaces(set) = set else {
        return Err(SinkError::RawExec);
    };

    let mut merged = Namespace::new();
    let mut duplicates = vec![];
    for name in selection.split('+') {
        let namespace = set
            .get(name)
            .ok_or_else(|| SinkError::UnknownNamespace(name.to_string()))?;

        for (key, value) in namespace {
            if merged.insert(key.clone(), value.clone()).is_some() {
                duplicates.push(key.as_str());
            }
        }
    }

    if !duplicates.is_empty() {
        tracing::warn!(keys = ?duplicates, "duplicate keys defined");
    }

    Ok(merged)
}

/// Run `command` through the shell with `env` as its environment
///
/// The environment of this process is only passed on when `inherit_env` is set.
pub fn exec(
    env: &Namespace,
    command: &[String],
    inherit_env: bool,
) -> Result<std::process::ExitStatus, SinkError> {
    if command.is_empty() {
        return Err(SinkError::MissingCommand);
    }

    let command_line = command.join(" ");
    tracing::info!(cmd = %command_line, inherit_env, "exec");

    let mut child = std::process::Command::new("/bin/sh");
    child.arg("-c").arg(&command_line);
    if !inherit_env {
        child.env_clear();
    }
    child.envs(env);

    let status = child.status().map_err(|source| SinkError::Spawn {
        command: command_line.clone(),
        source,
    })?;

    if !status.success() {
        tracing::error!(cmd = %command_line, code = status.code(), "command failed");
    }

    Ok(status)
}
