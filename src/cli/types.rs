use std::path::PathBuf;

use clap::Args as ClapArgs;

use shopsense::catalog::tags::{Mood, Occasion, Season, TimeOfDay};

#[derive(ClapArgs, Debug, Clone)]
pub struct QueryInputArgs {
    /// Query text, embedded with the configured encoder
    #[clap(short, long)]
    pub text: Option<String>,

    /// Query image file, embedded with the configured encoder
    #[clap(short, long)]
    pub image: Option<PathBuf>,

    /// JSON file holding a precomputed text embedding (array of floats)
    #[clap(long, conflicts_with = "text")]
    pub text_embedding: Option<PathBuf>,

    /// JSON file holding a precomputed image embedding (array of floats)
    #[clap(long, conflicts_with = "image")]
    pub image_embedding: Option<PathBuf>,
}

impl QueryInputArgs {
    pub fn needs_encoder(&self) -> bool {
        self.text.is_some() || self.image.is_some()
    }
}

#[derive(ClapArgs, Debug, Clone)]
pub struct ContextArgs {
    #[clap(long)]
    pub occasion: Option<Occasion>,

    #[clap(long)]
    pub mood: Option<Mood>,

    #[clap(long)]
    pub season: Option<Season>,

    #[clap(long)]
    pub time_of_day: Option<TimeOfDay>,

    /// Detect missing context dimensions from the query text
    #[clap(long, default_value = "false")]
    pub auto_context: bool,
}

#[derive(ClapArgs, Debug, Clone)]
pub struct FilterArgs {
    /// Only products in this category
    #[clap(long)]
    pub category: Option<String>,

    #[clap(long)]
    pub min_price: Option<f64>,

    #[clap(long)]
    pub max_price: Option<f64>,
}
