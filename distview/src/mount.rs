use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::Ordering;

use thiserror::Error;

use crate::config::ErrorPolicy;
use crate::digest::Digest;
use crate::extract::{ExtractError, LayerExtractor};
use crate::manifest::Manifest;
use crate::progress::{NoopProgress, ProgressReader, ProgressTracker};
use crate::reference::RepositoryName;
use crate::store::{Registry, Repository, StoreError};

#[derive(Error, Debug)]
pub enum MountError {
    #[error("mount path {0} does not exist")]
    TargetNotFound(PathBuf),

    #[error("mount path {0} should be a directory")]
    TargetNotDirectory(PathBuf),

    #[error("could not inspect mount path {path}: {source}")]
    TargetIo {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("could not open repository {name}: {source}")]
    Repository {
        name: String,
        #[source]
        source: StoreError,
    },

    #[error("could not get manifests of {name}: {source}")]
    Manifests {
        name: String,
        #[source]
        source: StoreError,
    },

    #[error("failed to retrieve manifest for digest {digest}: {source}")]
    Manifest {
        digest: Digest,
        #[source]
        source: StoreError,
    },

    #[error("could not open blob {layer} of manifest {manifest}: {source}")]
    Blob {
        manifest: Digest,
        layer: Digest,
        #[source]
        source: StoreError,
    },

    #[error("error extracting layer {layer} of manifest {manifest}: {source}")]
    Extract {
        manifest: Digest,
        layer: Digest,
        #[source]
        source: ExtractError,
    },
}

/// A directory that existed when it was checked and can receive layers.
#[derive(Debug, Clone)]
pub struct MountTarget {
    path: PathBuf,
}

impl MountTarget {
    pub async fn new<P: AsRef<Path>>(path: P) -> Result<Self, MountError> {
        let path = path.as_ref();
        match tokio::fs::metadata(path).await {
            Ok(metadata) if metadata.is_dir() => Ok(Self {
                path: path.to_path_buf(),
            }),
            Ok(_) => Err(MountError::TargetNotDirectory(path.to_path_buf())),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                Err(MountError::TargetNotFound(path.to_path_buf()))
            }
            Err(source) => Err(MountError::TargetIo {
                path: path.to_path_buf(),
                source,
            }),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[derive(Debug, Default)]
pub struct MountReport {
    pub manifests: usize,
    pub layers: usize,
    /// Blob bytes read by the extractor, compressed.
    pub bytes: u64,
    /// Descriptors that were not filesystem layers.
    pub skipped: usize,
    /// Manifests left incomplete under [`ErrorPolicy::BestEffort`].
    pub failures: Vec<MountError>,
}

pub struct Mounter<E> {
    extractor: E,
    policy: ErrorPolicy,
    progress: Arc<dyn ProgressTracker>,
}

impl<E: LayerExtractor> Mounter<E> {
    pub fn new(extractor: E) -> Self {
        Self {
            extractor,
            policy: ErrorPolicy::default(),
            progress: Arc::new(NoopProgress),
        }
    }

    pub fn with_policy(mut self, policy: ErrorPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_progress(mut self, progress: Arc<dyn ProgressTracker>) -> Self {
        self.progress = progress;
        self
    }

    /// Extracts the layers of every manifest stored for `name` into `target`,
    /// in the order the store enumerates them.
    pub async fn mount<R: Registry>(
        &self,
        registry: &R,
        name: &RepositoryName,
        target: &MountTarget,
    ) -> Result<MountReport, MountError> {
        let repository =
            registry
                .repository(name)
                .await
                .map_err(|source| MountError::Repository {
                    name: name.to_string(),
                    source,
                })?;

        if !repository.can_enumerate() {
            return Err(MountError::Manifests {
                name: name.to_string(),
                source: StoreError::EnumerationUnsupported(name.to_string()),
            });
        }
        let digests = repository
            .manifest_digests()
            .await
            .map_err(|source| MountError::Manifests {
                name: name.to_string(),
                source,
            })?;
        tracing::debug!(repository = %name, manifests = digests.len(), "mounting");

        let mut report = MountReport::default();
        for digest in digests {
            match self
                .mount_manifest(&repository, &digest, target, &mut report)
                .await
            {
                Ok(()) => report.manifests += 1,
                Err(err) => match self.policy {
                    ErrorPolicy::FailFast => return Err(err),
                    ErrorPolicy::BestEffort => {
                        tracing::warn!(manifest = %digest, error = %err, "skipping manifest");
                        report.failures.push(err);
                    }
                },
            }
        }

        Ok(report)
    }

    async fn mount_manifest<P: Repository>(
        &self,
        repository: &P,
        digest: &Digest,
        target: &MountTarget,
        report: &mut MountReport,
    ) -> Result<(), MountError> {
        let manifest = repository
            .manifest(digest)
            .await
            .map_err(|source| MountError::Manifest {
                digest: digest.clone(),
                source,
            })?;

        if let Manifest::Unknown(media_type) = &manifest {
            tracing::debug!(manifest = %digest, %media_type, "manifest type has no layers");
        }

        for descriptor in manifest.references() {
            // skip media types which are not part of the layer
            let Some(compression) = descriptor.layer_compression() else {
                tracing::debug!(
                    digest = %descriptor.digest,
                    media_type = %descriptor.media_type,
                    "skipping non-layer descriptor"
                );
                report.skipped += 1;
                continue;
            };

            let blob = repository
                .open_blob(&descriptor.digest)
                .await
                .map_err(|source| MountError::Blob {
                    manifest: digest.clone(),
                    layer: descriptor.digest.clone(),
                    source,
                })?;

            let layer = descriptor.digest.to_string();
            self.progress.start_layer(&layer, descriptor.size);
            let reader = ProgressReader::new(blob, layer.clone(), Arc::clone(&self.progress));
            let streamed = reader.bytes_read();
            let extracted = self
                .extractor
                .extract(Box::new(reader), compression, target.path())
                .await;
            self.progress.finish_layer(&layer, extracted.is_ok());

            extracted.map_err(|source| MountError::Extract {
                manifest: digest.clone(),
                layer: descriptor.digest.clone(),
                source,
            })?;
            tracing::info!(layer = %descriptor.digest, manifest = %digest, "extracted layer");
            report.layers += 1;
            report.bytes += streamed.load(Ordering::Relaxed);
        }

        Ok(())
    }
}
