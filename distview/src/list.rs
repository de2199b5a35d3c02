use thiserror::Error;

use crate::config::ErrorPolicy;
use crate::digest::Digest;
use crate::reference::{NameError, RepositoryName};
use crate::store::{Registry, Repository, StoreError};

#[derive(Error, Debug)]
pub enum ListError {
    #[error("error getting repositories: {0}")]
    Repositories(#[source] StoreError),

    #[error("error getting a named reference for {name}: {source}")]
    InvalidName {
        name: String,
        #[source]
        source: NameError,
    },

    #[error("error getting repository {name}: {source}")]
    Repository {
        name: String,
        #[source]
        source: StoreError,
    },

    #[error("error reading tags of {name}: {source}")]
    Tags {
        name: String,
        #[source]
        source: StoreError,
    },

    #[error("error retrieving tag descriptor for {repository}:{tag}: {source}")]
    TagDescriptor {
        repository: String,
        tag: String,
        #[source]
        source: StoreError,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageRow {
    pub repository: String,
    pub tag: String,
    pub digest: Digest,
}

#[derive(Debug, Default)]
pub struct ImageListing {
    pub rows: Vec<ImageRow>,
    /// Tags whose digest could not be resolved. These never fail a listing.
    pub skipped_tags: Vec<ListError>,
    /// Repositories left out under [`ErrorPolicy::BestEffort`].
    pub failures: Vec<ListError>,
}

/// Lists every tag of up to `limit` repositories, with the digest it points at.
pub async fn list_images<R: Registry>(
    registry: &R,
    limit: usize,
    policy: ErrorPolicy,
) -> Result<ImageListing, ListError> {
    let names = registry
        .repositories(limit)
        .await
        .map_err(ListError::Repositories)?;
    tracing::debug!(count = names.len(), limit, "enumerated repositories");

    let mut listing = ImageListing::default();
    for name in names {
        if let Err(err) = list_repository(registry, &name, &mut listing).await {
            match policy {
                ErrorPolicy::FailFast => return Err(err),
                ErrorPolicy::BestEffort => {
                    tracing::warn!(repository = %name, error = %err, "skipping repository");
                    listing.failures.push(err);
                }
            }
        }
    }

    Ok(listing)
}

async fn list_repository<R: Registry>(
    registry: &R,
    name: &str,
    listing: &mut ImageListing,
) -> Result<(), ListError> {
    let named = RepositoryName::parse(name).map_err(|source| ListError::InvalidName {
        name: name.to_string(),
        source,
    })?;
    let repository = registry
        .repository(&named)
        .await
        .map_err(|source| ListError::Repository {
            name: name.to_string(),
            source,
        })?;
    let tags = repository.tags().await.map_err(|source| ListError::Tags {
        name: name.to_string(),
        source,
    })?;

    for tag in tags {
        match repository.tag_descriptor(&tag).await {
            Ok(descriptor) => listing.rows.push(ImageRow {
                repository: named.to_string(),
                tag,
                digest: descriptor.digest,
            }),
            Err(source) => {
                let err = ListError::TagDescriptor {
                    repository: named.to_string(),
                    tag,
                    source,
                };
                tracing::error!("{err}");
                listing.skipped_tags.push(err);
            }
        }
    }

    Ok(())
}
