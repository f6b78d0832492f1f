mod cli;

use anyhow::Context;
use consulconf::kv::HttpKv;
use consulconf::sink::{self, ConfigSet};
use consulconf::store::{Backend, DocumentStore, LocalBackend, RemoteBackend};
use tracing_subscriber::filter::LevelFilter;

fn main() {
    use clap::Parser;
    let cli = cli::Cli::parse();

    let default_level = if cli.log {
        LevelFilter::DEBUG
    } else {
        LevelFilter::WARN
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::builder()
                .with_default_directive(default_level.into())
                .with_env_var("CONSULCONF_LOG")
                .from_env_lossy(),
        )
        .with_writer(std::io::stderr)
        .init();

    match run(cli) {
        Ok(code) => std::process::exit(code),
        Err(e) => {
            for error in e.chain() {
                eprintln!("{error}")
            }
            std::process::exit(1);
        }
    }
}

fn is_url(input: &str) -> bool {
    input.starts_with("http://") || input.starts_with("https://")
}

fn open(input: &str) -> DocumentStore<Box<dyn Backend>> {
    let backend: Box<dyn Backend> = if is_url(input) {
        Box::new(RemoteBackend::new(HttpKv::new(input)))
    } else {
        Box::new(LocalBackend::new(
            input.strip_prefix("file://").unwrap_or(input),
        ))
    };

    DocumentStore::new(backend)
}

/// Returns the exit code
pub fn run(cli: cli::Cli) -> anyhow::Result<i32> {
    let store = open(&cli.input);
    let names = store
        .document_names()
        .with_context(|| format!("Could not list documents at {}", store.location()))?;
    tracing::info!(files = ?names, "parse files");

    let mut set = load(&store, &names, cli.raw)?;

    if let Some(pattern) = &cli.filterns {
        let pattern = regex::Regex::new(pattern).context("Invalid --filterns")?;
        set.retain_matching(&pattern);
    }

    if let Some(selection) = &cli.mode.app {
        let env = sink::merge_namespaces(&set, selection)?;
        let status = sink::exec(&env, &cli.command, cli.inherit_env)?;
        return Ok(status.code().unwrap_or(1));
    }

    if cli.mode.dry_run {
        output(&cli.format, &set)?;
        return Ok(0);
    }

    let Some(puturl) = &cli.puturl else {
        anyhow::bail!("Unclear what to do. Supply --puturl, --dry-run or --app");
    };

    let kv = HttpKv::new(puturl);
    if cli.delete {
        let deleted = sink::clean_destination(&kv, &set, &cli.delete_excludes)
            .context("Could not delete directory from Consul")?;
        tracing::info!(?deleted, "cleaned destination");
    }

    sink::publish(&kv, &set).context("Failed to PUT to Consul")?;
    Ok(0)
}

fn load(
    store: &DocumentStore<Box<dyn Backend>>,
    names: &[String],
    raw: bool,
) -> anyhow::Result<ConfigSet> {
    if !raw {
        let set = consulconf::namespace::resolve_documents(store, names)?;
        return Ok(ConfigSet::Namespaces(set));
    }

    let mut flat = consulconf::raw::RawSet::new();
    for name in names {
        let document = store.load(name)?;
        flat.extend(consulconf::raw::flatten_raw(name, &document));
    }

    Ok(ConfigSet::Raw(flat))
}

fn output(format: &cli::OutputFormat, set: &ConfigSet) -> anyhow::Result<()> {
    match format {
        cli::OutputFormat::Json => {
            sink::write_json(set, std::io::stdout())?;
            println!();
        }
        cli::OutputFormat::Yaml => serde_yaml::to_writer(std::io::stdout(), set)?,
    };

    Ok(())
}
