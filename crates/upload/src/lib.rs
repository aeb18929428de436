//! Streaming bundle upload engine.
//!
//! Content arrives as chunks over a bounded channel: the receiving side
//! (network handler) pushes [`UploadFrame`]s, the engine drains them,
//! appending to the content file and folding each chunk into a running
//! SHA-256. The bound gives backpressure in both directions, so memory
//! use stays constant regardless of content size.
//!
//! End-of-stream is the explicit [`UploadFrame::Done`] sentinel. A sender
//! dropped without it means the producer died mid-stream; the bundle
//! record is then left exactly as it was — hash, size and status only
//! ever change together, after a complete stream.

use std::sync::Arc;

use sha2::{Digest, Sha256};
use tokio::io::AsyncWriteExt;
use tokio::sync::mpsc;
use tracing::{info, warn};

use dlchub_store::{BundleStore, DataVersionStore, StoreError, VersionStatus};

/// Default depth of the chunk hand-off channel.
pub const UPLOAD_QUEUE_DEPTH: usize = 16;

/// One frame on the upload channel.
#[derive(Debug)]
pub enum UploadFrame {
    /// A chunk of content bytes.
    Chunk(Vec<u8>),
    /// End-of-stream sentinel. The upload finalizes only after this.
    Done,
}

/// Creates a bounded upload channel with the default depth.
pub fn upload_channel() -> (mpsc::Sender<UploadFrame>, mpsc::Receiver<UploadFrame>) {
    upload_channel_with(UPLOAD_QUEUE_DEPTH)
}

/// Creates a bounded upload channel with an explicit depth.
pub fn upload_channel_with(depth: usize) -> (mpsc::Sender<UploadFrame>, mpsc::Receiver<UploadFrame>) {
    mpsc::channel(depth)
}

/// Outcome of a completed upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadReceipt {
    pub bundle_id: i64,
    /// Hex SHA-256 of the streamed bytes.
    pub hash: String,
    pub size: i64,
}

/// Errors produced by the upload engine.
#[derive(Debug, thiserror::Error)]
pub enum UploadError {
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("producer closed the stream before end-of-stream")]
    Aborted,
}

/// Streams bundle content to disk while computing its digest.
pub struct UploadEngine {
    bundles: Arc<BundleStore>,
    versions: Arc<DataVersionStore>,
}

impl UploadEngine {
    pub fn new(bundles: Arc<BundleStore>, versions: Arc<DataVersionStore>) -> Self {
        Self { bundles, versions }
    }

    /// Streams content into the named bundle of a data version.
    ///
    /// The bundle is created if it does not exist yet; re-uploading an
    /// existing bundle overwrites its content file from the start. The
    /// bundle record advances to `UPLOADED` with the new hash and size
    /// only on a complete stream — if `frames` closes without
    /// [`UploadFrame::Done`], the record keeps its prior state and
    /// [`UploadError::Aborted`] is returned.
    ///
    /// Refused once the owning version is `PUBLISHED`.
    pub async fn upload(
        &self,
        gamespace_id: i64,
        data_id: i64,
        bundle_name: &str,
        mut frames: mpsc::Receiver<UploadFrame>,
    ) -> Result<UploadReceipt, UploadError> {
        let version = self.versions.get(gamespace_id, data_id)?;
        if version.status == VersionStatus::Published {
            return Err(StoreError::PublishedImmutable(data_id).into());
        }

        let bundle_id = match self.bundles.find(gamespace_id, data_id, bundle_name) {
            Some(bundle) => bundle.bundle_id,
            None => self.bundles.create(gamespace_id, data_id, bundle_name)?,
        };

        tokio::fs::create_dir_all(self.bundles.content_dir(&version.app_id, data_id)).await?;
        let path = self
            .bundles
            .content_path(&version.app_id, data_id, bundle_id);

        // Fresh sink: prior content is overwritten, never appended.
        let mut file = tokio::fs::File::create(&path).await?;
        let mut hasher = Sha256::new();
        let mut size: i64 = 0;

        loop {
            match frames.recv().await {
                Some(UploadFrame::Chunk(data)) => {
                    file.write_all(&data).await?;
                    hasher.update(&data);
                    size += data.len() as i64;
                }
                Some(UploadFrame::Done) => break,
                None => {
                    // Producer died. Close the sink, touch nothing else:
                    // the record must never show a half-written hash.
                    drop(file);
                    warn!(bundle_name, data_id, received = size, "upload aborted mid-stream");
                    return Err(UploadError::Aborted);
                }
            }
        }

        file.sync_all().await?;
        drop(file);

        let hash = hex::encode(hasher.finalize());
        self.bundles
            .update_content(gamespace_id, bundle_id, &hash, size)?;

        info!(bundle_id, bundle_name, size, %hash, "bundle uploaded");
        Ok(UploadReceipt {
            bundle_id,
            hash,
            size,
        })
    }
}
