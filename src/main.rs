use clap::Parser;
use tracing_subscriber::EnvFilter;

use shopsense::config::Config;

mod cli;

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let args = cli::Args::parse();
    let config = Config::load()?;

    match args.command {
        cli::Command::Build {
            catalog,
            image_root,
            quiet,
        } => cli::handle_build(&config, &catalog, image_root, quiet),

        cli::Command::Search {
            input,
            context,
            filters,
            alpha,
            k,
            diversity,
        } => cli::handle_search(&config, input, context, filters, alpha, k, diversity),

        cli::Command::Remove { ids } => cli::handle_remove(&config, ids),

        cli::Command::Stats {} => cli::handle_stats(&config),

        cli::Command::Compact {} => cli::handle_compact(&config),
    }
}
