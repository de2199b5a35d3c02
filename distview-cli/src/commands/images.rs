use std::path::Path;
use std::time::Duration;

use distview::config::ErrorPolicy;
use distview::list::{ImageListing, list_images};
use distview::store::FsRegistry;
use indicatif::{ProgressBar, ProgressStyle};
use tabled::{Table, Tabled};

use crate::error::{DistviewCliError, Result};
use crate::utils;

#[derive(Tabled)]
struct ImageInfo {
    #[tabled(rename = "REPOSITORY")]
    repository: String,
    #[tabled(rename = "TAG")]
    tag: String,
    #[tabled(rename = "DIGEST")]
    digest: String,
}

pub async fn execute(root: &Path, limit: usize, policy: ErrorPolicy) -> Result<()> {
    tracing::debug!(root = %root.display(), limit, "listing images");

    let pb = utils::SpinnerGuard::new(ProgressBar::new_spinner());
    if let Ok(style) = ProgressStyle::default_spinner().template("{spinner:.green} {msg}") {
        pb.set_style(style.tick_chars("⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏ "));
    }
    pb.set_message("Reading registry...");
    pb.enable_steady_tick(Duration::from_millis(100));

    let registry = FsRegistry::open(root).await?;
    let listing = list_images(&registry, limit, policy).await?;
    drop(pb);

    println!("{}", render(&listing));

    if !listing.failures.is_empty() {
        for failure in &listing.failures {
            utils::print_warning(&failure.to_string());
        }
        return Err(DistviewCliError::Partial(listing.failures.len()));
    }

    Ok(())
}

fn render(listing: &ImageListing) -> Table {
    let images = listing.rows.iter().map(|row| ImageInfo {
        repository: row.repository.clone(),
        tag: row.tag.clone(),
        digest: row.digest.to_string(),
    });
    Table::new(images)
}
