//! Fixture tests
//!
//! Resolves the documents in /tests/conf/ and compares the result with a snapshot, then
//! publishes it to an in-memory key-value store and checks that reading it back gives the
//! same result.

use consulconf::kv::MemoryKv;
use consulconf::namespace::resolve_documents;
use consulconf::raw::{flatten_raw, RawSet};
use consulconf::sink::{self, ConfigSet};
use consulconf::store::{Backend, DocumentStore, LocalBackend, RemoteBackend};
use pretty_assertions::assert_eq;

fn init_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_env("CONSULCONF_LOG"))
        .with_writer(std::io::stderr)
        .try_init();
}

fn fixtures() -> DocumentStore<LocalBackend> {
    init_logging();
    DocumentStore::new(LocalBackend::new(
        std::path::Path::new(env!("CARGO_MANIFEST_DIR")).join("tests/conf"),
    ))
}

fn resolve<B: Backend>(store: &DocumentStore<B>) -> ConfigSet {
    let names = store.document_names().expect("documents must be listed");
    ConfigSet::Namespaces(resolve_documents(store, &names).expect("documents must resolve"))
}

fn flatten<B: Backend>(store: &DocumentStore<B>) -> ConfigSet {
    let mut flat = RawSet::new();
    for name in store.document_names().expect("documents must be listed") {
        let document = store.load(&name).expect("document must load");
        flat.extend(flatten_raw(&name, &document));
    }
    ConfigSet::Raw(flat)
}

fn json(set: &ConfigSet) -> String {
    let mut out = vec![];
    sink::write_json(set, &mut out).unwrap();
    String::from_utf8(out).unwrap()
}

#[test]
fn resolved_namespaces() {
    let resolved = resolve(&fixtures());
    insta::assert_yaml_snapshot!(resolved);
}

#[test]
fn resolving_twice_is_identical() {
    assert_eq!(json(&resolve(&fixtures())), json(&resolve(&fixtures())));
}

#[test]
fn filter_namespaces() {
    let mut resolved = resolve(&fixtures());
    resolved.retain_matching(&regex::Regex::new(r"^.*app[345]$").unwrap());
    assert_eq!(resolved.paths(), vec!["test/app3", "test/app4", "test/app5"]);
}

#[test]
fn raw_flatten() {
    let ConfigSet::Raw(flat) = flatten(&fixtures()) else {
        unreachable!()
    };

    let expected: RawSet = [
        ("test-namespace/_shared/key1", "val11"),
        ("test-namespace/_shared2/key2", "val22"),
        ("test-namespace/_shared3/key2", "val222"),
        ("test-namespace/_shared3/key3", "val3"),
        ("test-ns1/key1", "val1"),
        ("test-ns2/_inherit", r#"["test-ns1"]"#),
        ("test/_shared/key1", "val1"),
        ("test/_shared2/key2", "val2"),
        ("test/app2/_inherit", r#"["_shared"]"#),
        ("test/app20/key", "value"),
        ("test/app21/_inherit", r#"["_shared"]"#),
        ("test/app21/key", "value"),
        ("test/app22/_inherit", r#"["test-ns1"]"#),
        ("test/app3/_inherit", "[]"),
        ("test/app4/_inherit", r#"["_shared2"]"#),
        ("test/app5/_inherit", r#"["_shared", "_shared2"]"#),
        ("test/app6/_inherit", r#"["test-namespace._shared"]"#),
        ("test/app7/_inherit", r#"["test-namespace._shared", "_shared2"]"#),
        ("test/app8/_inherit", r#"["test-namespace._shared2", "_shared"]"#),
        ("test/app9/_inherit", r#"["test-namespace._shared3.key2", "_shared.key1"]"#),
    ]
    .into_iter()
    .map(|(k, v)| (k.to_string(), v.to_string()))
    .collect();

    assert_eq!(flat, expected);
}

#[test]
fn published_namespaces_read_back_identically() {
    let local = resolve(&fixtures());

    let kv = MemoryKv::default();
    sink::clean_destination(&kv, &local, &[]).unwrap();
    sink::publish(&kv, &local).unwrap();

    let remote = resolve(&DocumentStore::new(RemoteBackend::new(&kv)));
    assert_eq!(json(&remote), json(&local));
}

#[test]
fn published_raw_documents_read_back_identically() {
    let local = flatten(&fixtures());

    let kv = MemoryKv::default();
    sink::publish(&kv, &local).unwrap();
    assert_eq!(kv.get("test/app5/_inherit").as_deref(), Some(r#"["_shared", "_shared2"]"#));

    let remote = flatten(&DocumentStore::new(RemoteBackend::new(&kv)));
    assert_eq!(json(&remote), json(&local));

    // the raw tree is also a valid source for resolution
    let resolved = resolve(&DocumentStore::new(RemoteBackend::new(&kv)));
    let ConfigSet::Namespaces(resolved) = resolved else {
        unreachable!()
    };
    assert_eq!(resolved["test/app9"]["key2"], "val222");
    assert!(resolved["test/app3"].is_empty());
}

#[test]
fn exec_with_merged_namespaces() {
    let resolved = resolve(&fixtures());
    let env = sink::merge_namespaces(&resolved, "test/app20+test-ns1").unwrap();

    assert_eq!(env.get("key").map(String::as_str), Some("value"));
    assert_eq!(env.get("key1").map(String::as_str), Some("val1"));
}
