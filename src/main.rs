use clap::{Parser, Subcommand};
use kb_rag::commands::{
    configure, ingest_pages, ingest_space, list_pages, reset_store, run_query, show_status,
};

#[derive(Parser)]
#[command(name = "kb-rag")]
#[command(about = "Retrieval-augmented question answering over wiki knowledge bases")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show or initialize the configuration file
    Config {
        /// Show current configuration
        #[arg(long)]
        show: bool,
    },
    /// Ingest wiki pages by page id
    Ingest {
        /// Page ids to ingest
        #[arg(required = true)]
        page_ids: Vec<String>,
    },
    /// Ingest pages from a wiki space
    IngestSpace {
        /// Space key to ingest pages from
        space_key: String,
        /// Maximum number of pages to ingest
        #[arg(long, default_value_t = 25)]
        limit: usize,
    },
    /// Ask a question against the indexed corpus
    Query {
        /// The question to answer
        question: String,
        /// Number of chunks to retrieve
        #[arg(long)]
        top_k: Option<usize>,
    },
    /// List indexed pages
    Pages,
    /// Show detailed status of the pipeline
    Status,
    /// Delete all indexed content
    Reset {
        /// Skip the confirmation prompt
        #[arg(long)]
        yes: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Config { show } => {
            configure(show)?;
        }
        Commands::Ingest { page_ids } => {
            ingest_pages(page_ids).await?;
        }
        Commands::IngestSpace { space_key, limit } => {
            ingest_space(space_key, limit).await?;
        }
        Commands::Query { question, top_k } => {
            run_query(question, top_k).await?;
        }
        Commands::Pages => {
            list_pages().await?;
        }
        Commands::Status => {
            show_status().await?;
        }
        Commands::Reset { yes } => {
            reset_store(yes).await?;
        }
    }

    Ok(())
}
