use std::path::PathBuf;

use clap::{Parser, Subcommand};
use distview::config::{self, ErrorPolicy, ExtractorKind};
use tracing_subscriber::EnvFilter;

mod commands;
mod error;
mod utils;

#[derive(Parser)]
#[command(name = "distview")]
#[command(about = "List and mount images kept in a local registry store")]
#[command(version)]
struct Cli {
    /// Registry store root [default: $DISTVIEW_ROOT or /var/lib/registry]
    #[arg(long, global = true)]
    root: Option<PathBuf>,

    /// Skip repositories or manifests that fail and report them at the end
    #[arg(long, global = true)]
    keep_going: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// List available images
    Images {
        /// Maximum number of repositories to show [default: $DISTVIEW_LIST_LIMIT or 100]
        #[arg(short, long)]
        limit: Option<usize>,
    },
    /// Mount the image at path
    Mount {
        /// Repository name (e.g., library/ubuntu)
        image: String,
        /// Existing directory to extract the layers into
        mount_path: PathBuf,
        /// How layers are unpacked: tar or builtin [default: $DISTVIEW_EXTRACTOR or tar]
        #[arg(long)]
        extractor: Option<ExtractorKind>,
    },
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();

    let cli = Cli::parse();
    let root = cli.root.unwrap_or_else(config::get_store_root);
    let policy = if cli.keep_going {
        ErrorPolicy::BestEffort
    } else {
        config::get_error_policy()
    };

    let result = match cli.command {
        Some(Commands::Mount {
            image,
            mount_path,
            extractor,
        }) => {
            let extractor = extractor.unwrap_or_else(config::get_extractor_kind);
            commands::mount::execute(&root, &image, &mount_path, extractor, policy).await
        }
        Some(Commands::Images { limit }) => {
            let limit = limit.unwrap_or_else(config::get_list_limit);
            commands::images::execute(&root, limit, policy).await
        }
        None => commands::images::execute(&root, config::get_list_limit(), policy).await,
    };

    if let Err(e) = result {
        utils::print_error(&e.to_string());
        std::process::exit(1);
    }
}
