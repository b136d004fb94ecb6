use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use trace_tree_cli::{ShowOptions, Source};

#[derive(Parser)]
#[command(name = "trace-tree")]
#[command(about = "Lay out a trace the way the trace view does", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct SourceArgs {
    /// Trace payload (TraceSplitResult JSON)
    trace: PathBuf,

    /// Trace meta payload, used to decide which transactions can fetch spans
    #[arg(long)]
    meta: Option<PathBuf>,

    /// Replay record whose bounds the timeline must cover
    #[arg(long)]
    replay: Option<PathBuf>,

    /// List of linked replay traces to fetch and append
    #[arg(long)]
    linked: Option<PathBuf>,

    /// Directory holding `<project>/<event id>.json` and `traces/<trace id>.json`
    #[arg(short = 'd', long, default_value = ".")]
    events_dir: PathBuf,

    /// Organization slug passed to the fetch API
    #[arg(long, env = "TRACE_TREE_ORG", default_value = "sentry")]
    org: String,
}

impl From<SourceArgs> for Source {
    fn from(args: SourceArgs) -> Self {
        Source {
            trace: args.trace,
            meta: args.meta,
            replay: args.replay,
            linked: args.linked,
            events_dir: args.events_dir,
            organization: args.org,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Print the visible tree, its shape, vitals and indicators
    Show {
        #[command(flatten)]
        source: SourceArgs,

        /// Zoom into every transaction that has spans to fetch
        #[arg(long)]
        zoom_all: bool,

        /// Event or span id to reveal, fetching spans on the way
        #[arg(long)]
        reveal: Option<String>,
    },

    /// Print the path segments addressing every visible node
    Paths {
        #[command(flatten)]
        source: SourceArgs,

        /// Zoom into every transaction first
        #[arg(long)]
        zoom_all: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Show {
            source,
            zoom_all,
            reveal,
        } => {
            let output =
                trace_tree_cli::show(&source.into(), &ShowOptions { zoom_all, reveal }).await?;
            println!("{output}");
        }
        Commands::Paths { source, zoom_all } => {
            let (mut tree, ctx) = trace_tree_cli::load(&source.into()).await?;
            if zoom_all {
                trace_tree_cli::zoom_all(&mut tree, &ctx).await?;
            }
            println!("{}", trace_tree_cli::paths(&tree)?);
        }
    }

    Ok(())
}
