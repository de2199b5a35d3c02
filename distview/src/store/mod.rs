//! Read-only access to a registry's content store.
//!
//! [`Registry`] and [`Repository`] are the only calls the lister and mounter
//! make against storage. [`FsRegistry`] implements them over the directory
//! layout written by the Distribution registry's filesystem driver.

mod fs;

use std::path::PathBuf;

use thiserror::Error;
use tokio::io::AsyncRead;

use crate::digest::{Digest, DigestError};
use crate::manifest::{Descriptor, Manifest, ManifestError};
use crate::reference::RepositoryName;

pub use fs::{FsRegistry, FsRepository};

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("registry root {0} does not exist or is not a directory")]
    RootNotFound(PathBuf),

    #[error("repository name not known to registry: {0}")]
    RepositoryUnknown(String),

    #[error("unknown tag={tag} in repository {repository}")]
    TagUnknown { repository: String, tag: String },

    #[error("unknown manifest {digest} in repository {repository}")]
    ManifestUnknown { repository: String, digest: Digest },

    #[error("blob unknown to registry: {0}")]
    BlobUnknown(Digest),

    #[error("repository {0} does not support manifest enumeration")]
    EnumerationUnsupported(String),

    #[error("invalid link file {path}: {source}")]
    InvalidLink {
        path: PathBuf,
        #[source]
        source: DigestError,
    },

    #[error("{0}")]
    Digest(#[from] DigestError),

    #[error("invalid manifest {digest}: {source}")]
    Manifest {
        digest: Digest,
        #[source]
        source: ManifestError,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, StoreError>;

/// A blob opened for sequential reading. Dropping it closes the blob.
pub type BlobReader = Box<dyn AsyncRead + Send + Unpin>;

#[allow(async_fn_in_trait)]
pub trait Registry {
    type Repository: Repository;

    /// Up to `limit` repository names, in storage order. Names come back as
    /// stored, without grammar validation.
    async fn repositories(&self, limit: usize) -> Result<Vec<String>>;

    async fn repository(&self, name: &RepositoryName) -> Result<Self::Repository>;
}

#[allow(async_fn_in_trait)]
pub trait Repository {
    fn name(&self) -> &RepositoryName;

    async fn tags(&self) -> Result<Vec<String>>;

    async fn tag_descriptor(&self, tag: &str) -> Result<Descriptor>;

    async fn manifest(&self, digest: &Digest) -> Result<Manifest>;

    /// Whether [`Repository::manifest_digests`] is available.
    fn can_enumerate(&self) -> bool {
        false
    }

    async fn manifest_digests(&self) -> Result<Vec<Digest>> {
        Err(StoreError::EnumerationUnsupported(self.name().to_string()))
    }

    async fn open_blob(&self, digest: &Digest) -> Result<BlobReader>;
}

#[cfg(test)]
pub(crate) mod testing;
