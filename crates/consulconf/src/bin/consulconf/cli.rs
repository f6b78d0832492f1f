//! consulconf cli interface

use clap::{Args, Parser, ValueEnum};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Where to get key:value configuration
    ///
    /// Either a directory containing json files or a consul url with keys laid out the
    /// same way, e.g. http://127.0.0.1:8500/v1/kv/conf
    #[clap(short = 'i', long = "inputuri", env = "CONSULCONF_INPUT")]
    pub input: String,

    #[clap(flatten)]
    pub mode: ModeArgs,

    /// Put the resulting namespaces into consul, e.g. http://127.0.0.1:8500/v1/kv
    #[clap(short = 'p', long = "puturl", env = "CONSUL_HOST", value_parser = to_url)]
    pub puturl: Option<String>,

    /// Command line to run with --app
    #[clap(trailing_var_arg = true, allow_hyphen_values = true, requires = "app")]
    pub command: Vec<String>,

    /// Output format of --dry-run
    #[arg(short = 'F', long = "output-format", value_enum, default_value = "json")]
    pub format: OutputFormat,

    /// Read documents as they are, without resolving _inherit or _modify
    #[clap(long)]
    pub raw: bool,

    /// Clean the destination before publishing to --puturl
    #[clap(long)]
    pub delete: bool,

    /// With --delete, keep top level keys starting with any of these prefixes
    #[clap(
        long = "delete-excludes",
        visible_alias = "delete_excludes",
        num_args = 1..,
        requires = "delete"
    )]
    pub delete_excludes: Vec<String>,

    /// Only keep namespaces whose path matches this regex
    #[clap(long = "filterns")]
    pub filterns: Option<String>,

    /// With --app, pass this process's environment on to the command
    #[clap(long = "inherit-env", visible_alias = "inherit_env", requires = "app")]
    pub inherit_env: bool,

    /// Log what is being done (to stderr)
    #[clap(long)]
    pub log: bool,
}

#[derive(Args, Debug)]
#[group(multiple = false)]
pub struct ModeArgs {
    /// Print the resulting namespaces
    #[clap(long = "dry-run", visible_alias = "dry_run")]
    pub dry_run: bool,

    /// Run the command line with the given namespace(s) as its environment
    ///
    /// Combine namespaces with +, e.g. --app ns1+test/app20 env
    #[clap(short = 'a', long = "app", requires = "command")]
    pub app: Option<String>,
}

#[derive(ValueEnum, Clone, Debug, PartialEq)]
pub enum OutputFormat {
    Json,
    Yaml,
}

fn to_url(input: &str) -> Result<String, std::convert::Infallible> {
    if input.starts_with("http://") || input.starts_with("https://") {
        Ok(input.to_string())
    } else {
        Ok(format!("http://{input}"))
    }
}
