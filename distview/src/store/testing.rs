//! On-disk registry fixtures shared by the store, list and mount tests.

use std::io::Write;
use std::path::{Path, PathBuf};

use flate2::Compression;
use flate2::write::GzEncoder;
use tar::{EntryType, Header};
use tempfile::TempDir;

use super::FsRegistry;
use crate::digest::Digest;
use crate::manifest::{
    Descriptor, ImageManifest, MEDIA_TYPE_DOCKER_CONFIG, MEDIA_TYPE_DOCKER_LAYER,
    MEDIA_TYPE_DOCKER_MANIFEST,
};

/// A signed schema1 manifest as older registries stored them.
pub(crate) const SCHEMA1_MANIFEST: &str = r#"{
   "schemaVersion": 1,
   "name": "legacy",
   "tag": "v1",
   "architecture": "amd64",
   "fsLayers": [
      {"blobSum": "sha256:ca978112ca1bbdcafac231b39a23dc4da786eff8147c4e72b9807785afee48bb"},
      {"blobSum": "sha256:e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"}
   ],
   "history": [{"v1Compatibility": "{}"}, {"v1Compatibility": "{}"}],
   "signatures": [{"protected": "e30", "signature": "c2ln"}]
}"#;

pub(crate) struct RegistryFixture {
    dir: TempDir,
}

impl RegistryFixture {
    pub fn new() -> Self {
        Self {
            dir: tempfile::tempdir().unwrap(),
        }
    }

    pub fn root(&self) -> &Path {
        self.dir.path()
    }

    pub async fn open(&self) -> FsRegistry {
        FsRegistry::open(self.root()).await.unwrap()
    }

    fn v2(&self) -> PathBuf {
        self.root().join("docker/registry/v2")
    }

    pub fn repository_dir(&self, repository: &str) -> PathBuf {
        self.v2().join("repositories").join(repository)
    }

    fn blob_path(&self, digest: &Digest) -> PathBuf {
        let hex = digest.hex();
        self.v2()
            .join("blobs")
            .join(digest.algorithm().as_str())
            .join(&hex[..2])
            .join(hex)
            .join("data")
    }

    fn write(path: &Path, content: &[u8]) {
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, content).unwrap();
    }

    /// Stores a blob without linking it into any repository.
    pub fn blob(&self, content: &[u8]) -> Digest {
        let digest = Digest::from_bytes(content);
        Self::write(&self.blob_path(&digest), content);
        digest
    }

    pub fn layer_blob(&self, repository: &str, content: &[u8]) -> Digest {
        let digest = self.blob(content);
        let link = self
            .repository_dir(repository)
            .join("_layers")
            .join(digest.algorithm().as_str())
            .join(digest.hex())
            .join("link");
        Self::write(&link, digest.to_string().as_bytes());
        digest
    }

    pub fn write_tag_link(&self, repository: &str, tag: &str, content: &str) {
        let link = self
            .repository_dir(repository)
            .join("_manifests/tags")
            .join(tag)
            .join("current/link");
        Self::write(&link, content.as_bytes());
    }

    pub fn tag(&self, repository: &str, tag: &str, digest: &Digest) {
        self.write_tag_link(repository, tag, &digest.to_string());
    }

    /// Tags a manifest digest whose blob was never stored.
    pub fn dangling_tag(&self, repository: &str, tag: &str) {
        let digest = Digest::from_bytes(format!("{repository}:{tag} is gone").as_bytes());
        self.tag(repository, tag, &digest);
    }

    pub fn corrupt_blob(&self, digest: &Digest) {
        Self::write(&self.blob_path(digest), b"corrupted");
    }

    /// Stores a manifest as a revision of `repository` and tags it.
    pub fn manifest(&self, repository: &str, tag: &str, manifest: &[u8]) -> Digest {
        let digest = self.blob(manifest);
        let revision = self
            .repository_dir(repository)
            .join("_manifests/revisions")
            .join(digest.algorithm().as_str())
            .join(digest.hex())
            .join("link");
        Self::write(&revision, digest.to_string().as_bytes());
        self.tag(repository, tag, &digest);
        digest
    }

    /// A docker v2 image whose layers hold `layers` verbatim.
    pub fn image(&self, repository: &str, tag: &str, layers: &[&str]) -> Digest {
        let layers: Vec<_> = layers
            .iter()
            .map(|content| (MEDIA_TYPE_DOCKER_LAYER, content.as_bytes().to_vec()))
            .collect();
        self.image_with_layers(repository, tag, &layers)
    }

    pub fn image_with_layers(
        &self,
        repository: &str,
        tag: &str,
        layers: &[(&str, Vec<u8>)],
    ) -> Digest {
        let config = format!(r#"{{"architecture":"amd64","os":"linux","tag":"{tag}"}}"#);
        let config_digest = self.layer_blob(repository, config.as_bytes());

        let layers = layers
            .iter()
            .map(|(media_type, content)| {
                let digest = self.layer_blob(repository, content);
                Descriptor::new(media_type, digest, content.len() as u64)
            })
            .collect();

        let manifest = ImageManifest {
            schema_version: 2,
            media_type: Some(MEDIA_TYPE_DOCKER_MANIFEST.to_string()),
            config: Descriptor::new(MEDIA_TYPE_DOCKER_CONFIG, config_digest, config.len() as u64),
            layers,
            annotations: None,
        };
        let bytes = serde_json::to_vec_pretty(&manifest).unwrap();
        self.manifest(repository, tag, &bytes)
    }
}

/// Builds layer tarballs entry by entry.
pub(crate) struct LayerBuilder {
    builder: tar::Builder<Vec<u8>>,
}

impl LayerBuilder {
    pub fn new() -> Self {
        Self {
            builder: tar::Builder::new(Vec::new()),
        }
    }

    fn header(entry_type: EntryType, mode: u32, size: u64) -> Header {
        let mut header = Header::new_gnu();
        header.set_entry_type(entry_type);
        header.set_mode(mode);
        header.set_size(size);
        header.set_mtime(1_600_000_000);
        header
    }

    pub fn dir(mut self, path: &str, mode: u32) -> Self {
        let mut header = Self::header(EntryType::Directory, mode, 0);
        self.builder
            .append_data(&mut header, path, std::io::empty())
            .unwrap();
        self
    }

    pub fn file(mut self, path: &str, content: &[u8], mode: u32) -> Self {
        let mut header = Self::header(EntryType::Regular, mode, content.len() as u64);
        self.builder
            .append_data(&mut header, path, content)
            .unwrap();
        self
    }

    pub fn symlink(mut self, path: &str, target: &str) -> Self {
        let mut header = Self::header(EntryType::Symlink, 0o777, 0);
        self.builder
            .append_link(&mut header, path, target)
            .unwrap();
        self
    }

    pub fn into_tar(self) -> Vec<u8> {
        self.builder.into_inner().unwrap()
    }

    pub fn into_gzip(self) -> Vec<u8> {
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(&self.into_tar()).unwrap();
        encoder.finish().unwrap()
    }

    pub fn into_zstd(self) -> Vec<u8> {
        zstd::encode_all(&self.into_tar()[..], 0).unwrap()
    }
}
