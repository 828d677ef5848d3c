use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

mod checkpoint;
mod config;
mod dataset;
mod metrics;
mod pipeline;

mod tokenizer {
    pub mod segment;
    pub mod vocab;
}

mod embedding {
    pub mod huffman;
    pub mod word2vec;
}

mod model {
    pub mod embedding_matrix;
    pub mod generate;
    pub mod lstm;
    pub mod training;
}

use config::PipelineConfig;

#[derive(Parser, Debug)]
#[command(
    name = "chargen",
    version,
    about = "Character-level skip-gram embedding + LSTM language model for chat text."
)]
struct Cli {
    /// JSON file overriding the default pipeline settings
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Directory holding the raw text and every derived file
    #[arg(long, global = true)]
    base_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Rewrite the raw text as a space-separated character corpus
    Segment,
    /// Train and save the skip-gram character embedding
    Embed,
    /// Train the LSTM, resuming from the latest checkpoint
    Train {
        /// Total number of epochs
        #[arg(long)]
        epochs: Option<usize>,
        /// Discard existing checkpoints first
        #[arg(long)]
        fresh: bool,
    },
    /// Sample text from the latest checkpoint
    Generate {
        #[arg(long)]
        seed: Option<String>,
        /// Characters to generate after the seed
        #[arg(long)]
        length: Option<usize>,
        #[arg(long)]
        sample_seed: Option<i64>,
    },
    /// Nearest characters in the embedding space
    Similar {
        #[arg(long = "char")]
        token: String,
        #[arg(long, default_value_t = 10)]
        topn: usize,
    },
    /// Segment, embed, train and generate in one go
    Run,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("chargen=info")),
        )
        .init();

    let cli = Cli::parse();
    let mut cfg = PipelineConfig::load(cli.config.as_deref())?;
    if let Some(base_dir) = cli.base_dir {
        cfg.base_dir = base_dir;
    }

    match cli.command {
        Command::Segment => {
            pipeline::segment(&cfg)?;
        }
        Command::Embed => {
            let embedding = pipeline::embed(&cfg)?;
            println!("{} characters embedded in {} dimensions", embedding.len(), embedding.dim());
        }
        Command::Train { epochs, fresh } => {
            if let Some(epochs) = epochs {
                cfg.epochs = epochs;
            }
            let losses = pipeline::train(&cfg, fresh)?;
            if let Some(last) = losses.last() {
                println!("Final loss: {:.6}", last);
            }
        }
        Command::Generate {
            seed,
            length,
            sample_seed,
        } => {
            if sample_seed.is_some() {
                cfg.sample_seed = sample_seed;
            }
            let seed = seed.unwrap_or_else(|| cfg.seed_text.clone());
            let text = pipeline::generate(&cfg, &seed, length.unwrap_or(cfg.gen_length))?;
            println!("{}", text);
        }
        Command::Similar { token, topn } => {
            for (other, score) in pipeline::similar(&cfg, &token, topn)? {
                println!("{}\t{:.4}", other, score);
            }
        }
        Command::Run => {
            let text = pipeline::run(&cfg)?;
            println!("{}", text);
        }
    }
    Ok(())
}
