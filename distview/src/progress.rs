//! Progress reporting while layer blobs stream into an extractor.

use std::io;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::task::{Context, Poll};

#[cfg(feature = "progress")]
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use tokio::io::{AsyncRead, ReadBuf};

/// Receives per-layer events from the mounter. Layers are keyed by digest.
pub trait ProgressTracker: Send + Sync {
    fn start_layer(&self, layer: &str, total_bytes: u64);
    fn advance(&self, layer: &str, bytes: u64);
    fn finish_layer(&self, layer: &str, ok: bool);
}

pub struct NoopProgress;

impl ProgressTracker for NoopProgress {
    fn start_layer(&self, _layer: &str, _total_bytes: u64) {}
    fn advance(&self, _layer: &str, _bytes: u64) {}
    fn finish_layer(&self, _layer: &str, _ok: bool) {}
}

/// One bar per layer. Schema1 layers declare no size and get a spinner.
#[cfg(feature = "progress")]
pub struct IndicatifProgress {
    multi: MultiProgress,
    bars: std::sync::Mutex<std::collections::HashMap<String, ProgressBar>>,
}

#[cfg(feature = "progress")]
impl IndicatifProgress {
    pub fn new() -> Self {
        Self {
            multi: MultiProgress::new(),
            bars: std::sync::Mutex::new(std::collections::HashMap::new()),
        }
    }

    fn label(layer: &str) -> String {
        let hex = layer.split_once(':').map_or(layer, |(_, hex)| hex);
        format!("layer {}", &hex[..12.min(hex.len())])
    }
}

#[cfg(feature = "progress")]
impl Default for IndicatifProgress {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(feature = "progress")]
impl ProgressTracker for IndicatifProgress {
    fn start_layer(&self, layer: &str, total_bytes: u64) {
        let pb = if total_bytes == 0 {
            self.multi.add(ProgressBar::new_spinner())
        } else {
            let pb = self.multi.add(ProgressBar::new(total_bytes));
            if let Ok(style) = ProgressStyle::default_bar()
                .template("{msg} [{bar:40.green/white}] {bytes}/{total_bytes} {bytes_per_sec}")
            {
                pb.set_style(style.progress_chars("=> "));
            }
            pb
        };
        pb.set_message(Self::label(layer));
        if let Ok(mut bars) = self.bars.lock() {
            bars.insert(layer.to_string(), pb);
        }
    }

    fn advance(&self, layer: &str, bytes: u64) {
        if let Some(pb) = self.bars.lock().ok().and_then(|bars| bars.get(layer).cloned()) {
            pb.inc(bytes);
        }
    }

    fn finish_layer(&self, layer: &str, ok: bool) {
        if let Some(pb) = self.bars.lock().ok().and_then(|mut bars| bars.remove(layer)) {
            let status = if ok { "unpacked" } else { "failed" };
            pb.finish_with_message(format!("{} {status}", Self::label(layer)));
        }
    }
}

/// Reports every chunk read from `inner` to a [`ProgressTracker`] and keeps a
/// running total that outlives the reader.
pub struct ProgressReader<R> {
    inner: R,
    layer: String,
    progress: Arc<dyn ProgressTracker>,
    read: Arc<AtomicU64>,
}

impl<R> ProgressReader<R> {
    pub fn new(inner: R, layer: String, progress: Arc<dyn ProgressTracker>) -> Self {
        Self {
            inner,
            layer,
            progress,
            read: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Handle to the number of bytes read so far.
    pub fn bytes_read(&self) -> Arc<AtomicU64> {
        Arc::clone(&self.read)
    }
}

impl<R: AsyncRead + Unpin> AsyncRead for ProgressReader<R> {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let before = buf.filled().len();
        let poll = Pin::new(&mut self.inner).poll_read(cx, buf);
        if let Poll::Ready(Ok(())) = &poll {
            let read = (buf.filled().len() - before) as u64;
            if read > 0 {
                self.read.fetch_add(read, Ordering::Relaxed);
                self.progress.advance(&self.layer, read);
            }
        }
        poll
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use tokio::io::AsyncReadExt;

    use super::*;

    #[derive(Default)]
    struct Recorder {
        total: Mutex<u64>,
    }

    impl ProgressTracker for Recorder {
        fn start_layer(&self, _layer: &str, _total_bytes: u64) {}
        fn advance(&self, _layer: &str, bytes: u64) {
            *self.total.lock().unwrap() += bytes;
        }
        fn finish_layer(&self, _layer: &str, _ok: bool) {}
    }

    #[tokio::test]
    async fn test_progress_reader_counts_bytes() {
        let recorder = Arc::new(Recorder::default());
        let data = vec![7u8; 10_000];
        let mut reader =
            ProgressReader::new(&data[..], "sha256:abc".to_string(), recorder.clone());
        let read = reader.bytes_read();

        let mut out = Vec::new();
        reader.read_to_end(&mut out).await.unwrap();
        drop(reader);
        assert_eq!(out, data);
        assert_eq!(*recorder.total.lock().unwrap(), 10_000);
        assert_eq!(read.load(Ordering::Relaxed), 10_000);
    }
}
