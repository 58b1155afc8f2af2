use std::path::PathBuf;

use clap::{Parser, Subcommand};

mod errors;
mod handlers;
mod types;
mod validation;

pub use handlers::*;
pub use types::*;

#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
pub struct Args {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Build or update the index from a JSON Lines catalog file.
    Build {
        /// Catalog file, one product per line
        #[clap(short, long)]
        catalog: PathBuf,

        /// Directory relative image paths resolve against.
        /// Defaults to the catalog file's directory.
        #[clap(long)]
        image_root: Option<PathBuf>,

        /// Hide the progress bar
        #[clap(short, long, default_value = "false")]
        quiet: bool,
    },

    /// Search the catalog
    Search {
        #[clap(flatten)]
        input: QueryInputArgs,

        #[clap(flatten)]
        context: ContextArgs,

        #[clap(flatten)]
        filters: FilterArgs,

        /// Image weight in [0,1]
        #[clap(short, long)]
        alpha: Option<f32>,

        /// Number of results
        #[clap(short, long, default_value = "10")]
        k: usize,

        /// MMR trade-off between relevance (1.0) and diversity (0.0)
        #[clap(long)]
        diversity: Option<f32>,
    },

    /// Remove products by id.
    Remove {
        #[clap(required = true)]
        ids: Vec<String>,
    },

    /// Print catalog and index statistics
    Stats {},

    /// Rebuild the graph without tombstones.
    Compact {},
}
