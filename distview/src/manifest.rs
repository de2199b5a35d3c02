use std::collections::HashMap;

use serde::de::IgnoredAny;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::digest::Digest;

pub const MEDIA_TYPE_DOCKER_MANIFEST: &str =
    "application/vnd.docker.distribution.manifest.v2+json";
pub const MEDIA_TYPE_DOCKER_MANIFEST_LIST: &str =
    "application/vnd.docker.distribution.manifest.list.v2+json";
pub const MEDIA_TYPE_OCI_MANIFEST: &str = "application/vnd.oci.image.manifest.v1+json";
pub const MEDIA_TYPE_OCI_INDEX: &str = "application/vnd.oci.image.index.v1+json";
pub const MEDIA_TYPE_DOCKER_MANIFEST_V1: &str =
    "application/vnd.docker.distribution.manifest.v1+json";
pub const MEDIA_TYPE_DOCKER_MANIFEST_V1_SIGNED: &str =
    "application/vnd.docker.distribution.manifest.v1+prettyjws";
pub const MEDIA_TYPE_OCTET_STREAM: &str = "application/octet-stream";

pub const MEDIA_TYPE_DOCKER_CONFIG: &str = "application/vnd.docker.container.image.v1+json";
pub const MEDIA_TYPE_DOCKER_LAYER: &str = "application/vnd.docker.image.rootfs.diff.tar.gzip";
pub const MEDIA_TYPE_DOCKER_FOREIGN_LAYER: &str =
    "application/vnd.docker.image.rootfs.foreign.diff.tar.gzip";
pub const MEDIA_TYPE_OCI_CONFIG: &str = "application/vnd.oci.image.config.v1+json";
pub const MEDIA_TYPE_OCI_LAYER: &str = "application/vnd.oci.image.layer.v1.tar";
pub const MEDIA_TYPE_OCI_LAYER_GZIP: &str = "application/vnd.oci.image.layer.v1.tar+gzip";
pub const MEDIA_TYPE_OCI_LAYER_ZSTD: &str = "application/vnd.oci.image.layer.v1.tar+zstd";
// schema1 blobs are plain tar+gzip, but nothing marks them as such
pub const MEDIA_TYPE_DOCKER_SCHEMA1_LAYER: &str =
    "application/vnd.docker.container.image.rootfs.diff+x-gtar";

#[derive(Error, Debug)]
pub enum ManifestError {
    #[error("manifest parse error: {0}")]
    Parse(#[from] serde_json::Error),
}

/// How a layer blob's tar stream is compressed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LayerCompression {
    None,
    Gzip,
    Zstd,
}

impl LayerCompression {
    /// Returns `None` for media types that are not filesystem layers, such as
    /// image configs, child manifests and foreign layers.
    pub fn from_media_type(media_type: &str) -> Option<Self> {
        match media_type {
            MEDIA_TYPE_DOCKER_LAYER | MEDIA_TYPE_OCI_LAYER_GZIP => Some(LayerCompression::Gzip),
            MEDIA_TYPE_OCI_LAYER_ZSTD => Some(LayerCompression::Zstd),
            MEDIA_TYPE_OCI_LAYER => Some(LayerCompression::None),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Descriptor {
    #[serde(rename = "mediaType")]
    pub media_type: String,
    pub digest: Digest,
    pub size: u64,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub urls: Option<Vec<String>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub annotations: Option<HashMap<String, String>>,

    // only set on index entries
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub platform: Option<Platform>,
}

impl Descriptor {
    pub fn new(media_type: &str, digest: Digest, size: u64) -> Self {
        Self {
            media_type: media_type.to_string(),
            digest,
            size,
            urls: None,
            annotations: None,
            platform: None,
        }
    }

    pub fn layer_compression(&self) -> Option<LayerCompression> {
        LayerCompression::from_media_type(&self.media_type)
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Platform {
    pub architecture: String,
    pub os: String,
    #[serde(rename = "os.version", skip_serializing_if = "Option::is_none")]
    pub os_version: Option<String>,
    #[serde(rename = "os.features", skip_serializing_if = "Option::is_none")]
    pub os_features: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub variant: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ImageManifest {
    #[serde(rename = "schemaVersion")]
    pub schema_version: u32,
    #[serde(rename = "mediaType", default, skip_serializing_if = "Option::is_none")]
    pub media_type: Option<String>,
    pub config: Descriptor,
    pub layers: Vec<Descriptor>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub annotations: Option<HashMap<String, String>>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ImageIndex {
    #[serde(rename = "schemaVersion")]
    pub schema_version: u32,
    #[serde(rename = "mediaType", default, skip_serializing_if = "Option::is_none")]
    pub media_type: Option<String>,
    pub manifests: Vec<Descriptor>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub annotations: Option<HashMap<String, String>>,
}

/// A legacy schema1 manifest. Only the layer digests are kept.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Schema1Manifest {
    #[serde(rename = "schemaVersion")]
    pub schema_version: u32,
    #[serde(rename = "mediaType", default, skip_serializing_if = "Option::is_none")]
    pub media_type: Option<String>,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub tag: String,
    #[serde(default)]
    pub architecture: String,
    #[serde(rename = "fsLayers", default)]
    pub fs_layers: Vec<FsLayer>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct FsLayer {
    #[serde(rename = "blobSum")]
    pub blob_sum: Digest,
}

#[derive(Debug, Clone)]
pub enum Manifest {
    Image(ImageManifest),
    Index(ImageIndex),
    Schema1(Schema1Manifest),
    /// A document type this crate does not model, such as an artifact. It
    /// references nothing.
    Unknown(String),
}

// Just enough of a manifest to decide how to parse the rest of it.
#[derive(Deserialize)]
struct Envelope {
    #[serde(rename = "schemaVersion")]
    schema_version: Option<u32>,
    #[serde(rename = "mediaType")]
    media_type: Option<String>,
    manifests: Option<IgnoredAny>,
}

impl Envelope {
    fn media_type(&self) -> &str {
        match (self.media_type.as_deref(), self.schema_version) {
            (Some(media_type), _) => media_type,
            (None, Some(1)) => MEDIA_TYPE_DOCKER_MANIFEST_V1_SIGNED,
            (None, _) if self.manifests.is_some() => MEDIA_TYPE_OCI_INDEX,
            (None, _) => MEDIA_TYPE_OCI_MANIFEST,
        }
    }
}

/// Reads the media type a manifest declares, or the one its shape implies
/// when it declares none. `None` if the bytes are not a JSON object.
pub fn detect_media_type(bytes: &[u8]) -> Option<String> {
    serde_json::from_slice::<Envelope>(bytes)
        .ok()
        .map(|envelope| envelope.media_type().to_string())
}

impl Manifest {
    pub fn from_slice(bytes: &[u8]) -> Result<Self, ManifestError> {
        let envelope: Envelope = serde_json::from_slice(bytes)?;
        match envelope.media_type() {
            MEDIA_TYPE_DOCKER_MANIFEST | MEDIA_TYPE_OCI_MANIFEST => {
                Ok(Manifest::Image(serde_json::from_slice(bytes)?))
            }
            MEDIA_TYPE_DOCKER_MANIFEST_LIST | MEDIA_TYPE_OCI_INDEX => {
                Ok(Manifest::Index(serde_json::from_slice(bytes)?))
            }
            MEDIA_TYPE_DOCKER_MANIFEST_V1 | MEDIA_TYPE_DOCKER_MANIFEST_V1_SIGNED => {
                Ok(Manifest::Schema1(serde_json::from_slice(bytes)?))
            }
            other => Ok(Manifest::Unknown(other.to_string())),
        }
    }

    pub fn media_type(&self) -> &str {
        match self {
            Manifest::Image(image) => image
                .media_type
                .as_deref()
                .unwrap_or(MEDIA_TYPE_OCI_MANIFEST),
            Manifest::Index(index) => index.media_type.as_deref().unwrap_or(MEDIA_TYPE_OCI_INDEX),
            Manifest::Schema1(manifest) => manifest
                .media_type
                .as_deref()
                .unwrap_or(MEDIA_TYPE_DOCKER_MANIFEST_V1_SIGNED),
            Manifest::Unknown(media_type) => media_type,
        }
    }

    /// Every descriptor the manifest points at: the config followed by the
    /// layers for an image, the child manifests for an index. Schema1 layers
    /// carry no size and a media type no extractor accepts.
    pub fn references(&self) -> Vec<Descriptor> {
        match self {
            Manifest::Image(image) => std::iter::once(&image.config)
                .chain(image.layers.iter())
                .cloned()
                .collect(),
            Manifest::Index(index) => index.manifests.clone(),
            Manifest::Schema1(manifest) => manifest
                .fs_layers
                .iter()
                .map(|layer| {
                    Descriptor::new(MEDIA_TYPE_DOCKER_SCHEMA1_LAYER, layer.blob_sum.clone(), 0)
                })
                .collect(),
            Manifest::Unknown(_) => Vec::new(),
        }
    }
}
