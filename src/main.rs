mod cli;

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use mnemos::config::MnemosConfig;

#[derive(Parser)]
#[command(name = "mnemos", version, about = "Personal multimodal memory assistant")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Store a text memory
    Remember { text: String },
    /// Record a file and store its text as a memory
    Upload {
        file: PathBuf,
        /// Pre-extracted text for files that are not plain text
        #[arg(long)]
        text_file: Option<PathBuf>,
    },
    /// Answer a question from stored memories
    Ask {
        query: String,
        /// Print the full response as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show which pipeline a query would be routed to
    Route { query: String },
    /// Re-embed every memory and rebuild the text index
    Rebuild,
    /// Face identities
    Faces {
        #[command(subcommand)]
        action: FacesAction,
    },
    /// Run database and index diagnostics
    Doctor,
}

#[derive(Subcommand)]
enum FacesAction {
    /// Index the faces detected in an image (reads <image>.faces.json)
    Add { image: PathBuf },
    /// Find indexed faces similar to the first face in an image
    Search { image: PathBuf },
    /// Group indexed faces into identities
    Cluster,
    /// Manage cluster labels
    Label {
        #[command(subcommand)]
        action: LabelAction,
    },
    /// Copy cluster labels onto member faces
    Propagate,
}

#[derive(Subcommand)]
enum LabelAction {
    /// Bind a label to a cluster
    Set { cluster_id: i64, label: String },
    /// Rename an existing cluster label
    Rename { cluster_id: i64, label: String },
    /// Remove a cluster label
    Remove { cluster_id: i64 },
    /// Show one or all cluster labels
    Show { cluster_id: Option<i64> },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = MnemosConfig::load()?;

    // Log to stderr so stdout stays clean for command output.
    let filter = EnvFilter::try_new(&config.server.log_level)
        .unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Command::Route { query } => cli::ask::route(&query),
        Command::Doctor => cli::doctor::doctor(&config)?,
        Command::Remember { text } => {
            cli::memory::remember(cli::open_engine(&config).await?, text).await?
        }
        Command::Upload { file, text_file } => {
            cli::memory::upload(cli::open_engine(&config).await?, file, text_file).await?
        }
        Command::Ask { query, json } => {
            cli::ask::ask(cli::open_engine(&config).await?, query, json).await?
        }
        Command::Rebuild => {
            cli::rebuild::rebuild(cli::open_engine(&config).await?, &config.embedding.model).await?
        }
        Command::Faces { action } => {
            let engine = cli::open_engine(&config).await?;
            match action {
                FacesAction::Add { image } => cli::faces::add(engine, image).await?,
                FacesAction::Search { image } => cli::faces::search(engine, image).await?,
                FacesAction::Cluster => cli::faces::cluster(engine).await?,
                FacesAction::Propagate => cli::faces::propagate(engine).await?,
                FacesAction::Label { action } => match action {
                    LabelAction::Set { cluster_id, label } => {
                        cli::faces::set_label(engine, cluster_id, label).await?
                    }
                    LabelAction::Rename { cluster_id, label } => {
                        cli::faces::rename_label(engine, cluster_id, label).await?
                    }
                    LabelAction::Remove { cluster_id } => {
                        cli::faces::remove_label(engine, cluster_id).await?
                    }
                    LabelAction::Show { cluster_id } => {
                        cli::faces::show_labels(engine, cluster_id).await?
                    }
                },
            }
        }
    }

    Ok(())
}
