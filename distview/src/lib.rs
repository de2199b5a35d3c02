//! Core library for reading images out of a local registry store. The crate
//! opens the on-disk layout written by the Distribution registry, lists its
//! repositories, tags and digests, and unpacks the layers of an image's
//! manifests into a directory.

/// Store location, listing cap and failure policy.
pub mod config;
/// Content digests and their verification.
pub mod digest;
/// Turning layer blobs into files on disk.
pub mod extract;
/// Listing repositories, tags and the digests they point at.
pub mod list;
/// Types that model image manifests, indexes and descriptors.
pub mod manifest;
/// Unpacking every layer of a repository into a directory.
pub mod mount;
/// Progress reporting while layers stream.
pub mod progress;
/// Repository name grammar.
pub mod reference;
/// Read-only access to the registry's storage.
pub mod store;

pub use config::{ErrorPolicy, ExtractorKind};
pub use digest::Digest;
pub use reference::RepositoryName;
pub use store::FsRegistry;
