use std::path::PathBuf;

use clap::Parser;
use clap_verbosity_flag::{InfoLevel, Verbosity};
use tracing_subscriber::{util::SubscriberInitExt, EnvFilter};

mod commands;
mod prompt;

/// Package, publish and fetch versioned datasets
#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// The configuration file to use instead of ~/.datapack/config.toml
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// The dataset directory to operate on
    #[arg(short = 'C', long, global = true)]
    dir: Option<PathBuf>,

    #[command(flatten)]
    verbose: Verbosity<InfoLevel>,
}

#[derive(clap::Subcommand)]
enum Commands {
    /// Generate and check the manifest of a dataset
    #[command(subcommand)]
    Manifest(commands::manifest::Opt),

    /// Transfer single blobs between the dataset and the store
    #[command(subcommand)]
    Blob(commands::blob::Opt),

    /// Package, upload and publish the dataset
    #[command(subcommand)]
    Pack(commands::pack::Opt),

    /// Query the dataset index
    #[command(subcommand)]
    Index(commands::index::Opt),

    /// Show or change a configuration value
    Config(commands::config::Opt),

    /// List the installed datasets
    List,

    /// Show the Datafile of the current or an installed dataset
    Info(commands::info::Opt),

    /// Download the archive of a dataset
    Get(commands::get::Opt),
}

/// Entry point of the `datapack` cli.
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let env_filter = EnvFilter::builder()
        .with_default_directive(cli.verbose.tracing_level_filter().into())
        .from_env()?;
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .without_time()
        .finish()
        .try_init()?;

    let ctx = commands::Context::new(cli.config, cli.dir)?;
    let run = async move {
        match cli.command {
            Commands::Manifest(opt) => commands::manifest::execute(opt, &ctx).await,
            Commands::Blob(opt) => commands::blob::execute(opt, &ctx).await,
            Commands::Pack(opt) => commands::pack::execute(opt, &ctx).await,
            Commands::Index(opt) => commands::index::execute(opt, &ctx).await,
            Commands::Config(opt) => commands::config::execute(opt, &ctx),
            Commands::List => commands::info::list(&ctx),
            Commands::Info(opt) => commands::info::info(opt, &ctx),
            Commands::Get(opt) => commands::get::execute(opt, &ctx).await,
        }
    };

    // Dropping the command future aborts transfers that are in flight.
    tokio::select! {
        result = run => result,
        _ = tokio::signal::ctrl_c() => anyhow::bail!("interrupted"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;
    use rstest::rstest;

    #[test]
    fn test_cli_is_consistent() {
        Cli::command().debug_assert();
    }

    #[rstest]
    #[case(&["datapack", "pack", "publish", "--force"])]
    #[case(&["datapack", "blob", "put", "--all"])]
    #[case(&["datapack", "blob", "get", "aaf4c61ddcc5e8a2dabede0f3b482cd9aea9434d", "a.txt"])]
    #[case(&["datapack", "index", "resolve", "jbenet/foo@1.0"])]
    #[case(&["datapack", "-C", "data", "config", "index.url", "http://datadex.io"])]
    fn test_parses(#[case] args: &[&str]) {
        Cli::try_parse_from(args).unwrap();
    }

    #[rstest]
    #[case(&["datapack", "blob", "put"])]
    #[case(&["datapack", "blob", "put", "--all", "aaf4c61ddcc5e8a2dabede0f3b482cd9aea9434d"])]
    #[case(&["datapack", "manifest", "check"])]
    #[case(&["datapack", "index", "resolve", "not a handle"])]
    fn test_rejects(#[case] args: &[&str]) {
        assert!(Cli::try_parse_from(args).is_err());
    }
}
