//! Unpacking layer blobs into a directory.
//!
//! The mounter only sees [`LayerExtractor`]. [`TarCommand`] streams the blob
//! into the system `tar`; [`Builtin`] decompresses and unpacks it in-process.

use std::ffi::OsString;
use std::io::{self, Read};
use std::path::Path;
use std::process::{ExitStatus, Stdio};

use flate2::read::GzDecoder;
use tar::{Archive, EntryType};
use thiserror::Error;
use tokio::process::Command;
use tokio_util::io::SyncIoBridge;

use crate::config::ExtractorKind;
use crate::manifest::LayerCompression;
use crate::store::BlobReader;

#[derive(Error, Debug)]
pub enum ExtractError {
    #[error("failed to run {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: io::Error,
    },

    #[error("{program} exited with {status}")]
    Status { program: String, status: ExitStatus },

    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("extraction task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

pub type Result<T> = std::result::Result<T, ExtractError>;

#[allow(async_fn_in_trait)]
pub trait LayerExtractor {
    /// Unpacks one layer into `dest`. The blob is consumed and closed whether
    /// or not extraction succeeds.
    async fn extract(
        &self,
        blob: BlobReader,
        compression: LayerCompression,
        dest: &Path,
    ) -> Result<()>;
}

/// Pipes layers through an external `tar` process.
#[derive(Debug, Clone)]
pub struct TarCommand {
    program: String,
}

impl Default for TarCommand {
    fn default() -> Self {
        Self::new("tar")
    }
}

impl TarCommand {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }

    fn args(compression: LayerCompression, dest: &Path) -> Vec<OsString> {
        let mut args: Vec<OsString> = vec!["-x".into()];
        match compression {
            LayerCompression::Gzip => args.push("-z".into()),
            LayerCompression::Zstd => args.push("--zstd".into()),
            LayerCompression::None => {}
        }
        args.push("-C".into());
        args.push(dest.into());
        args
    }
}

impl LayerExtractor for TarCommand {
    async fn extract(
        &self,
        mut blob: BlobReader,
        compression: LayerCompression,
        dest: &Path,
    ) -> Result<()> {
        let mut child = Command::new(&self.program)
            .args(Self::args(compression, dest))
            .stdin(Stdio::piped())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit())
            .spawn()
            .map_err(|source| ExtractError::Spawn {
                program: self.program.clone(),
                source,
            })?;

        let copied = match child.stdin.take() {
            Some(mut stdin) => tokio::io::copy(&mut blob, &mut stdin).await.map(|_| ()),
            None => Err(io::Error::other("tar stdin was not captured")),
        };
        drop(blob);

        // stdin is closed by now, so tar sees end of input
        let status = child.wait().await?;
        if !status.success() {
            return Err(ExtractError::Status {
                program: self.program.clone(),
                status,
            });
        }
        copied?;
        Ok(())
    }
}

/// Unpacks layers in-process. Regular files and directories are written with
/// their archived permissions and modification times; any other entry type
/// is skipped with a warning.
#[derive(Debug, Clone, Copy, Default)]
pub struct Builtin;

impl LayerExtractor for Builtin {
    async fn extract(
        &self,
        blob: BlobReader,
        compression: LayerCompression,
        dest: &Path,
    ) -> Result<()> {
        let dest = dest.to_path_buf();
        let mut reader = SyncIoBridge::new(blob);
        tokio::task::spawn_blocking(move || -> Result<()> {
            unpack(&mut reader, compression, &dest)?;
            // read past the end-of-archive blocks so the whole blob is consumed
            io::copy(&mut reader, &mut io::sink())?;
            Ok(())
        })
        .await?
    }
}

fn decoder<'a, R: Read + 'a>(
    reader: R,
    compression: LayerCompression,
) -> io::Result<Box<dyn Read + 'a>> {
    Ok(match compression {
        LayerCompression::None => Box::new(reader),
        LayerCompression::Gzip => Box::new(GzDecoder::new(reader)),
        LayerCompression::Zstd => Box::new(zstd::Decoder::new(reader)?),
    })
}

fn unpack<R: Read>(reader: R, compression: LayerCompression, dest: &Path) -> Result<()> {
    let mut archive = Archive::new(decoder(reader, compression)?);
    archive.set_preserve_permissions(true);
    archive.set_preserve_mtime(true);
    archive.set_overwrite(true);

    for entry in archive.entries()? {
        let mut entry = entry?;
        let entry_type = entry.header().entry_type();
        match entry_type {
            EntryType::Regular | EntryType::Continuous | EntryType::Directory => {
                if !entry.unpack_in(dest)? {
                    tracing::warn!(
                        path = %entry.path()?.display(),
                        "skipping entry outside of the mount path"
                    );
                }
            }
            other => {
                tracing::warn!(
                    entry_type = ?other,
                    path = %entry.path()?.display(),
                    link = ?entry.link_name()?,
                    "skipping unsupported tar entry"
                );
            }
        }
    }

    Ok(())
}

/// Either extractor, picked at runtime from configuration.
#[derive(Debug, Clone)]
pub enum Extractor {
    Tar(TarCommand),
    Builtin(Builtin),
}

impl From<ExtractorKind> for Extractor {
    fn from(kind: ExtractorKind) -> Self {
        match kind {
            ExtractorKind::Tar => Extractor::Tar(TarCommand::default()),
            ExtractorKind::Builtin => Extractor::Builtin(Builtin),
        }
    }
}

impl LayerExtractor for Extractor {
    async fn extract(
        &self,
        blob: BlobReader,
        compression: LayerCompression,
        dest: &Path,
    ) -> Result<()> {
        match self {
            Extractor::Tar(tar) => tar.extract(blob, compression, dest).await,
            Extractor::Builtin(builtin) => builtin.extract(blob, compression, dest).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::os::unix::fs::PermissionsExt;

    use super::*;
    use crate::store::testing::LayerBuilder;

    fn blob(bytes: Vec<u8>) -> BlobReader {
        Box::new(io::Cursor::new(bytes))
    }

    fn sample_layer() -> LayerBuilder {
        LayerBuilder::new()
            .dir("etc", 0o755)
            .file("etc/hostname", b"distview\n", 0o644)
            .file("usr/bin/tool", b"#!/bin/sh\n", 0o755)
            .symlink("etc/localtime", "/usr/share/zoneinfo/UTC")
    }

    #[tokio::test]
    async fn test_builtin_gzip() {
        let dest = tempfile::tempdir().unwrap();
        Builtin
            .extract(
                blob(sample_layer().into_gzip()),
                LayerCompression::Gzip,
                dest.path(),
            )
            .await
            .unwrap();

        let hostname = dest.path().join("etc/hostname");
        assert_eq!(std::fs::read(&hostname).unwrap(), b"distview\n");

        let tool = std::fs::metadata(dest.path().join("usr/bin/tool")).unwrap();
        assert_eq!(tool.permissions().mode() & 0o777, 0o755);
        let mtime = tool.modified().unwrap();
        assert_eq!(
            mtime.duration_since(std::time::UNIX_EPOCH).unwrap().as_secs(),
            1_600_000_000
        );

        // symlinks are not supported in-process
        assert!(
            std::fs::symlink_metadata(dest.path().join("etc/localtime")).is_err()
        );
    }

    #[tokio::test]
    async fn test_builtin_zstd_and_plain() {
        let dest = tempfile::tempdir().unwrap();
        let zstd_layer = LayerBuilder::new().file("a.txt", b"a", 0o600).into_zstd();
        Builtin
            .extract(blob(zstd_layer), LayerCompression::Zstd, dest.path())
            .await
            .unwrap();

        let plain_layer = LayerBuilder::new().file("b.txt", b"b", 0o600).into_tar();
        Builtin
            .extract(blob(plain_layer), LayerCompression::None, dest.path())
            .await
            .unwrap();

        assert_eq!(std::fs::read(dest.path().join("a.txt")).unwrap(), b"a");
        assert_eq!(std::fs::read(dest.path().join("b.txt")).unwrap(), b"b");
    }

    #[tokio::test]
    async fn test_builtin_rejects_corrupt_stream() {
        let dest = tempfile::tempdir().unwrap();
        let result = Builtin
            .extract(
                blob(b"definitely not gzip".to_vec()),
                LayerCompression::Gzip,
                dest.path(),
            )
            .await;
        assert!(matches!(result, Err(ExtractError::Io(_))));
    }

    #[test]
    fn test_tar_args() {
        let args = TarCommand::args(LayerCompression::Gzip, Path::new("/mnt/image"));
        assert_eq!(args, vec!["-x", "-z", "-C", "/mnt/image"]);
        let args = TarCommand::args(LayerCompression::None, Path::new("/mnt/image"));
        assert_eq!(args, vec!["-x", "-C", "/mnt/image"]);
    }

    #[tokio::test]
    async fn test_tar_command_missing_program() {
        let dest = tempfile::tempdir().unwrap();
        let result = TarCommand::new("distview-no-such-tar")
            .extract(blob(Vec::new()), LayerCompression::None, dest.path())
            .await;
        assert!(matches!(result, Err(ExtractError::Spawn { .. })));
    }

    #[tokio::test]
    async fn test_tar_command_gzip() {
        let dest = tempfile::tempdir().unwrap();
        TarCommand::default()
            .extract(
                blob(sample_layer().into_gzip()),
                LayerCompression::Gzip,
                dest.path(),
            )
            .await
            .unwrap();

        assert_eq!(
            std::fs::read(dest.path().join("etc/hostname")).unwrap(),
            b"distview\n"
        );
        // the system tar keeps symlinks
        assert!(
            std::fs::symlink_metadata(dest.path().join("etc/localtime"))
                .unwrap()
                .file_type()
                .is_symlink()
        );
    }

    #[tokio::test]
    async fn test_tar_command_failure_status() {
        let dest = tempfile::tempdir().unwrap();
        let result = TarCommand::default()
            .extract(
                blob(b"garbage".to_vec()),
                LayerCompression::Gzip,
                dest.path(),
            )
            .await;
        assert!(matches!(result, Err(ExtractError::Status { .. })));
    }
}
