use std::path::Path;
use std::sync::Arc;

use distview::config::{ErrorPolicy, ExtractorKind};
use distview::extract::Extractor;
use distview::mount::{MountTarget, Mounter};
use distview::progress::IndicatifProgress;
use distview::reference::RepositoryName;
use distview::store::FsRegistry;

use crate::error::{DistviewCliError, Result};
use crate::utils;

pub async fn execute(
    root: &Path,
    image: &str,
    mount_path: &Path,
    extractor: ExtractorKind,
    policy: ErrorPolicy,
) -> Result<()> {
    // nothing below may touch the store until the inputs are known good
    let target = MountTarget::new(mount_path).await?;
    let name = RepositoryName::parse(image)?;

    tracing::debug!(root = %root.display(), ?extractor, "opening registry");
    let registry = FsRegistry::open(root).await?;

    let mounter = Mounter::new(Extractor::from(extractor))
        .with_policy(policy)
        .with_progress(Arc::new(IndicatifProgress::new()));
    let report = mounter.mount(&registry, &name, &target).await?;

    utils::print_info(&format!(
        "Extracted {} layer(s) from {} manifest(s), {}",
        report.layers,
        report.manifests,
        utils::format_size(report.bytes)
    ));

    if !report.failures.is_empty() {
        for failure in &report.failures {
            utils::print_warning(&failure.to_string());
        }
        return Err(DistviewCliError::Partial(report.failures.len()));
    }

    utils::print_success("done");
    Ok(())
}
