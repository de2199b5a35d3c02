use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use tokio::fs;

use super::{BlobReader, Registry, Repository, Result, StoreError};
use crate::digest::Digest;
use crate::manifest::{self, Descriptor, MEDIA_TYPE_OCTET_STREAM, Manifest};
use crate::reference::{self, RepositoryName};

const MANIFESTS_DIR: &str = "_manifests";
const LAYERS_DIR: &str = "_layers";

/// A registry store rooted at a directory on local disk.
#[derive(Debug, Clone)]
pub struct FsRegistry {
    root: PathBuf,
}

impl FsRegistry {
    pub async fn open<P: AsRef<Path>>(root: P) -> Result<Self> {
        let root = root.as_ref();
        match fs::metadata(root).await {
            Ok(metadata) if metadata.is_dir() => Ok(Self {
                root: root.to_path_buf(),
            }),
            Ok(_) => Err(StoreError::RootNotFound(root.to_path_buf())),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                Err(StoreError::RootNotFound(root.to_path_buf()))
            }
            Err(e) => Err(e.into()),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn v2_dir(&self) -> PathBuf {
        self.root.join("docker").join("registry").join("v2")
    }

    fn repositories_dir(&self) -> PathBuf {
        self.v2_dir().join("repositories")
    }
}

impl Registry for FsRegistry {
    type Repository = FsRepository;

    async fn repositories(&self, limit: usize) -> Result<Vec<String>> {
        let base = self.repositories_dir();
        let mut names = Vec::new();
        if limit == 0 || !fs::try_exists(&base).await? {
            return Ok(names);
        }

        // Depth first, children visited in lexical order.
        let mut pending = vec![base.clone()];
        while let Some(dir) = pending.pop() {
            let mut children = Vec::new();
            let mut is_repository = false;

            let mut entries = fs::read_dir(&dir).await?;
            while let Some(entry) = entries.next_entry().await? {
                if !entry.file_type().await?.is_dir() {
                    continue;
                }
                let file_name = entry.file_name();
                let file_name = file_name.to_string_lossy();
                if file_name == MANIFESTS_DIR {
                    is_repository = true;
                } else if !file_name.starts_with('_') {
                    children.push(entry.path());
                }
            }

            if is_repository && dir != base {
                if let Ok(relative) = dir.strip_prefix(&base) {
                    let name = relative
                        .components()
                        .map(|c| c.as_os_str().to_string_lossy())
                        .collect::<Vec<_>>()
                        .join("/");
                    names.push(name);
                    if names.len() >= limit {
                        break;
                    }
                }
            }

            children.sort();
            pending.extend(children.into_iter().rev());
        }

        Ok(names)
    }

    async fn repository(&self, name: &RepositoryName) -> Result<FsRepository> {
        let dir = name
            .components()
            .fold(self.repositories_dir(), |dir, component| dir.join(component));

        if !fs::try_exists(dir.join(MANIFESTS_DIR)).await? {
            return Err(StoreError::RepositoryUnknown(name.to_string()));
        }

        Ok(FsRepository {
            name: name.clone(),
            dir,
            blobs_dir: self.v2_dir().join("blobs"),
        })
    }
}

/// One repository of an [`FsRegistry`].
#[derive(Debug, Clone)]
pub struct FsRepository {
    name: RepositoryName,
    dir: PathBuf,
    blobs_dir: PathBuf,
}

impl FsRepository {
    fn tags_dir(&self) -> PathBuf {
        self.dir.join(MANIFESTS_DIR).join("tags")
    }

    fn revisions_dir(&self) -> PathBuf {
        self.dir.join(MANIFESTS_DIR).join("revisions")
    }

    fn revision_link(&self, digest: &Digest) -> PathBuf {
        self.revisions_dir()
            .join(digest.algorithm().as_str())
            .join(digest.hex())
            .join("link")
    }

    fn layer_link(&self, digest: &Digest) -> PathBuf {
        self.dir
            .join(LAYERS_DIR)
            .join(digest.algorithm().as_str())
            .join(digest.hex())
            .join("link")
    }

    fn blob_data_path(&self, digest: &Digest) -> PathBuf {
        let hex = digest.hex();
        self.blobs_dir
            .join(digest.algorithm().as_str())
            .join(&hex[..2])
            .join(hex)
            .join("data")
    }

    /// Reads a link file. Returns `None` when the link does not exist.
    async fn read_link(path: &Path) -> Result<Option<Digest>> {
        let content = match fs::read_to_string(path).await {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        Digest::parse(content.trim())
            .map(Some)
            .map_err(|source| StoreError::InvalidLink {
                path: path.to_path_buf(),
                source,
            })
    }

    async fn read_blob(&self, digest: &Digest) -> Result<Vec<u8>> {
        match fs::read(self.blob_data_path(digest)).await {
            Ok(bytes) => Ok(bytes),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                Err(StoreError::BlobUnknown(digest.clone()))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn read_manifest(&self, digest: &Digest) -> Result<Manifest> {
        let bytes = self.read_blob(digest).await?;
        digest.verify(&bytes)?;
        Manifest::from_slice(&bytes).map_err(|source| StoreError::Manifest {
            digest: digest.clone(),
            source,
        })
    }

    fn tag_unknown(&self, tag: &str) -> StoreError {
        StoreError::TagUnknown {
            repository: self.name.to_string(),
            tag: tag.to_string(),
        }
    }
}

async fn sorted_dir_names(path: &Path) -> Result<Vec<String>> {
    let mut names = Vec::new();
    let mut entries = match fs::read_dir(path).await {
        Ok(entries) => entries,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(names),
        Err(e) => return Err(e.into()),
    };

    while let Some(entry) = entries.next_entry().await? {
        if entry.file_type().await?.is_dir() {
            names.push(entry.file_name().to_string_lossy().to_string());
        }
    }
    names.sort();
    Ok(names)
}

impl Repository for FsRepository {
    fn name(&self) -> &RepositoryName {
        &self.name
    }

    async fn tags(&self) -> Result<Vec<String>> {
        sorted_dir_names(&self.tags_dir()).await
    }

    async fn tag_descriptor(&self, tag: &str) -> Result<Descriptor> {
        if !reference::is_valid_tag(tag) {
            return Err(self.tag_unknown(tag));
        }

        let link = self.tags_dir().join(tag).join("current").join("link");
        let digest = Self::read_link(&link)
            .await?
            .ok_or_else(|| self.tag_unknown(tag))?;

        // the link alone names the image; the blob only has to exist
        let bytes = self.read_blob(&digest).await?;
        let media_type = manifest::detect_media_type(&bytes)
            .unwrap_or_else(|| MEDIA_TYPE_OCTET_STREAM.to_string());
        Ok(Descriptor::new(&media_type, digest, bytes.len() as u64))
    }

    async fn manifest(&self, digest: &Digest) -> Result<Manifest> {
        if !fs::try_exists(self.revision_link(digest)).await? {
            return Err(StoreError::ManifestUnknown {
                repository: self.name.to_string(),
                digest: digest.clone(),
            });
        }

        self.read_manifest(digest).await
    }

    fn can_enumerate(&self) -> bool {
        true
    }

    async fn manifest_digests(&self) -> Result<Vec<Digest>> {
        let revisions = self.revisions_dir();
        let mut digests = Vec::new();

        for algorithm in sorted_dir_names(&revisions).await? {
            for hex in sorted_dir_names(&revisions.join(&algorithm)).await? {
                let candidate = format!("{algorithm}:{hex}");
                let digest = match Digest::parse(&candidate) {
                    Ok(digest) => digest,
                    Err(e) => {
                        tracing::warn!(
                            repository = %self.name,
                            revision = %candidate,
                            error = %e,
                            "ignoring malformed manifest revision"
                        );
                        continue;
                    }
                };

                if fs::try_exists(self.revision_link(&digest)).await? {
                    digests.push(digest);
                }
            }
        }

        Ok(digests)
    }

    async fn open_blob(&self, digest: &Digest) -> Result<BlobReader> {
        match Self::read_link(&self.layer_link(digest)).await? {
            Some(linked) if linked == *digest => {}
            _ => return Err(StoreError::BlobUnknown(digest.clone())),
        }

        match fs::File::open(self.blob_data_path(digest)).await {
            Ok(file) => Ok(Box::new(file)),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                Err(StoreError::BlobUnknown(digest.clone()))
            }
            Err(e) => Err(e.into()),
        }
    }
}
