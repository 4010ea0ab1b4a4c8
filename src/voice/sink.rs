//! Media transport that appends raw PCM to a file, for local runs.

use std::{path::PathBuf, sync::Arc};

use async_trait::async_trait;
use tokio::{
    fs::File,
    io::AsyncWriteExt,
    sync::Mutex,
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::transport::{MediaSession, MediaTransport, VoiceServerInfo};
use crate::{audio::Frame, common::errors::TransportError};

pub struct PcmFileTransport {
    path: PathBuf,
}

impl PcmFileTransport {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl MediaTransport for PcmFileTransport {
    async fn connect(&self, info: &VoiceServerInfo) -> Result<Arc<dyn MediaSession>, TransportError> {
        let file = File::create(&self.path)
            .await
            .map_err(|e| TransportError::Connect(format!("{}: {}", self.path.display(), e)))?;
        debug!("[{}] writing PCM to {}", info.guild_id, self.path.display());

        Ok(Arc::new(PcmFileSession {
            file: Mutex::new(file),
            closed: CancellationToken::new(),
        }))
    }
}

pub struct PcmFileSession {
    file: Mutex<File>,
    closed: CancellationToken,
}

#[async_trait]
impl MediaSession for PcmFileSession {
    async fn submit_frame(&self, frame: &Frame) -> Result<(), TransportError> {
        if self.closed.is_cancelled() {
            return Err(TransportError::Submit("file sink is closed".into()));
        }
        // Flushed per frame; the session may be dropped without a close.
        let mut file = self.file.lock().await;
        file.write_all(&frame.to_le_bytes())
            .await
            .map_err(|e| TransportError::Submit(e.to_string()))?;
        file.flush()
            .await
            .map_err(|e| TransportError::Submit(e.to_string()))
    }

    async fn close(&self) {
        if let Err(e) = self.file.lock().await.flush().await {
            warn!("Failed to flush PCM sink: {}", e);
        }
        self.closed.cancel();
    }

    async fn closed(&self) -> TransportError {
        self.closed.cancelled().await;
        TransportError::Lost("file sink closed".into())
    }
}
