//! Chunked file transfer over an open data channel.
//!
//! The sender streams a metadata frame, fixed-size binary chunks gated by
//! [`FlowController`], and a completion frame. The receiver accumulates
//! chunks until completion, under a watchdog so a silent peer cannot hold
//! it forever. Either side can cancel; the other notices within one loop
//! iteration.

pub mod flow;

pub use flow::FlowController;

use std::path::Path;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::io::AsyncReadExt;
use tokio::time::{sleep, timeout, Instant};
use tracing::{debug, info, warn};

use crate::codec::{self, ControlMessage, Decoded, Frame, TransferMetadata};
use crate::error::{Error, Result};
use crate::progress::{ProgressSnapshot, ProgressTracker};
use crate::transport::{DataChannel, EventReceiver, TransportEvent};

const CANCEL_NONE: u8 = 0;
const CANCEL_LOCAL: u8 = 1;
const CANCEL_PEER: u8 = 2;

/// Shared cancellation flag.
///
/// Records who cancelled first; later cancellations do not overwrite the
/// original cause, so the reported error stays accurate.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicU8>);

impl CancelFlag {
    /// A fresh, uncancelled flag.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark the transfer cancelled by the local user.
    pub fn cancel_local(&self) {
        let _ = self
            .0
            .compare_exchange(CANCEL_NONE, CANCEL_LOCAL, Ordering::SeqCst, Ordering::SeqCst);
    }

    /// Mark the transfer cancelled by the remote peer.
    pub fn cancel_peer(&self) {
        let _ = self
            .0
            .compare_exchange(CANCEL_NONE, CANCEL_PEER, Ordering::SeqCst, Ordering::SeqCst);
    }

    /// Whether any cancellation has been requested.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst) != CANCEL_NONE
    }

    /// Whether the peer initiated the cancellation.
    #[must_use]
    pub fn cancelled_by_peer(&self) -> bool {
        self.0.load(Ordering::SeqCst) == CANCEL_PEER
    }

    /// The error matching the recorded cause, if cancelled.
    #[must_use]
    pub fn as_error(&self) -> Option<Error> {
        match self.0.load(Ordering::SeqCst) {
            CANCEL_LOCAL => Some(Error::Cancelled),
            CANCEL_PEER => Some(Error::CancelledByPeer),
            _ => None,
        }
    }
}

/// Tunables for one transfer.
#[derive(Debug, Clone)]
pub struct TransferConfig {
    /// Bytes per binary chunk.
    pub chunk_size: usize,
    /// Queued-bytes threshold above which the sender pauses.
    pub buffer_threshold: u64,
    /// How often the backpressure gate re-checks the queue.
    pub poll_interval: Duration,
    /// How long the receiver waits for completion before giving up.
    pub completion_timeout: Duration,
    /// Delay between a cancel notification and local teardown, giving the
    /// frame a chance to flush.
    pub cancel_grace: Duration,
    /// Largest file the sender will offer.
    pub max_file_size: u64,
}

impl Default for TransferConfig {
    fn default() -> Self {
        Self {
            chunk_size: crate::CHUNK_SIZE,
            buffer_threshold: crate::BUFFER_THRESHOLD,
            poll_interval: Duration::from_millis(crate::BACKPRESSURE_POLL_MS),
            completion_timeout: Duration::from_secs(crate::COMPLETION_TIMEOUT_SECS),
            cancel_grace: Duration::from_millis(crate::CANCEL_GRACE_MS),
            max_file_size: crate::DEFAULT_MAX_FILE_SIZE,
        }
    }
}

/// A fully received file, held in memory until the caller persists it.
///
/// Receipt and delivery are separate steps: a transfer that completed but
/// failed to persist still leaves the caller holding the bytes.
#[derive(Debug, Clone)]
pub struct ReceivedFile {
    /// File name from the sender's metadata, if any arrived.
    pub name: Option<String>,
    /// Declared media type, `application/octet-stream` when unknown.
    pub media_type: String,
    /// The sender's metadata frame, if one arrived.
    pub metadata: Option<TransferMetadata>,
    bytes: Vec<u8>,
}

impl ReceivedFile {
    /// Number of bytes received.
    #[must_use]
    pub fn len(&self) -> u64 {
        self.bytes.len() as u64
    }

    /// Whether nothing arrived.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// The received payload.
    #[must_use]
    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Consume into the raw payload.
    #[must_use]
    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }

    /// Write the payload to `path`.
    pub async fn persist(&self, path: &Path) -> Result<()> {
        tokio::fs::write(path, &self.bytes).await?;
        Ok(())
    }
}

/// Drives one transfer, in either direction, over an open channel.
pub struct TransferEngine<C: DataChannel> {
    channel: Arc<C>,
    events: EventReceiver,
    cancel: CancelFlag,
    config: TransferConfig,
}

impl<C: DataChannel> TransferEngine<C> {
    /// Build an engine over an open channel and its event queue.
    pub fn new(channel: Arc<C>, events: EventReceiver, config: TransferConfig) -> Self {
        Self {
            channel,
            events,
            cancel: CancelFlag::new(),
            config,
        }
    }

    /// A handle that cancels this transfer from another task.
    #[must_use]
    pub fn cancel_handle(&self) -> CancelFlag {
        self.cancel.clone()
    }

    /// Stream the file at `path` to the peer.
    ///
    /// `on_progress` fires after every chunk is queued.
    pub async fn send_file(
        &mut self,
        path: &Path,
        mut on_progress: impl FnMut(ProgressSnapshot),
    ) -> Result<()> {
        let meta = tokio::fs::metadata(path).await?;
        let size = meta.len();
        if size > self.config.max_file_size {
            return Err(Error::FileTooLarge {
                size,
                max: self.config.max_file_size,
            });
        }

        let name = path
            .file_name()
            .map_or_else(|| "file".to_string(), |n| n.to_string_lossy().into_owned());
        let media_type = mime_guess::from_path(path)
            .first_or_octet_stream()
            .essence_str()
            .to_string();
        let metadata = TransferMetadata {
            name,
            size,
            media_type,
            chunk_count: codec::chunk_count(size, self.config.chunk_size as u64),
        };
        info!(
            name = %metadata.name,
            size,
            chunks = metadata.chunk_count,
            "starting send"
        );

        self.channel
            .send(codec::encode_control(&ControlMessage::Metadata {
                data: metadata,
            })?)
            .await?;

        let flow = FlowController::new(self.config.buffer_threshold, self.config.poll_interval);
        let tracker = ProgressTracker::new(size);
        let mut file = tokio::fs::File::open(path).await?;
        let mut sent: u64 = 0;
        let channel = Arc::clone(&self.channel);
        let cancel = self.cancel.clone();

        while sent < size {
            self.drain_inbound(sent)?;
            if self.cancel.is_cancelled() {
                return Err(self.abort(sent).await);
            }

            // The gate drains inbound events on every poll, so a peer
            // cancel or channel loss interrupts a parked sender too.
            if let Err(e) = flow
                .wait_for_capacity(channel.as_ref(), &cancel, || self.drain_inbound(sent))
                .await
            {
                return Err(if e.is_cancellation() {
                    self.abort(sent).await
                } else {
                    e
                });
            }

            let len = usize::try_from((size - sent).min(self.config.chunk_size as u64))
                .map_err(|_| Error::Internal("chunk length overflow".to_string()))?;
            let mut chunk = vec![0_u8; len];
            file.read_exact(&mut chunk).await?;
            self.channel.send(Frame::Binary(chunk)).await?;
            sent += len as u64;
            on_progress(tracker.snapshot(sent));
        }

        self.drain_inbound(sent)?;
        if self.cancel.is_cancelled() {
            return Err(self.abort(sent).await);
        }

        self.channel
            .send(codec::encode_control(&ControlMessage::Complete)?)
            .await?;
        info!(sent, "send complete");
        Ok(())
    }

    /// Receive one file.
    ///
    /// Returns only when the completion frame arrives; errors out on
    /// cancellation, channel loss, undecodable frames, or the watchdog.
    pub async fn receive(
        &mut self,
        mut on_progress: impl FnMut(ProgressSnapshot),
    ) -> Result<ReceivedFile> {
        let deadline = Instant::now() + self.config.completion_timeout;
        let mut metadata: Option<TransferMetadata> = None;
        let mut tracker: Option<ProgressTracker> = None;
        let mut chunks: Vec<Vec<u8>> = Vec::new();
        let mut received: u64 = 0;

        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Err(Error::TransferTimeout(
                    self.config.completion_timeout.as_secs(),
                ));
            }
            let event = match timeout(remaining, self.events.recv()).await {
                Err(_) => {
                    return Err(Error::TransferTimeout(
                        self.config.completion_timeout.as_secs(),
                    ));
                }
                Ok(event) => event,
            };

            // Cancellation wins over whatever the queue produced, including
            // a queue that dropped during a local cancel.
            if let Some(err) = self.cancel.as_error() {
                return Err(self.teardown(err).await);
            }
            let Some(event) = event else {
                return Err(Error::ChannelClosed { received });
            };

            match event {
                TransportEvent::Frame(frame) => match codec::decode(frame)? {
                    Decoded::Chunk(chunk) => {
                        received += chunk.len() as u64;
                        chunks.push(chunk);
                        if let Some(tracker) = &tracker {
                            on_progress(tracker.snapshot(received));
                        }
                    }
                    Decoded::Control(ControlMessage::Metadata { data }) => {
                        if metadata.is_none() {
                            tracker = Some(ProgressTracker::new(data.size));
                            info!(name = %data.name, size = data.size, "receiving file");
                            metadata = Some(data);
                        } else {
                            debug!("duplicate metadata frame ignored");
                        }
                    }
                    Decoded::Control(ControlMessage::Complete) => {
                        return Ok(Self::assemble(metadata, chunks, received));
                    }
                    Decoded::Control(ControlMessage::Cancel) => {
                        self.cancel.cancel_peer();
                        return Err(self.teardown(Error::CancelledByPeer).await);
                    }
                    Decoded::Ignored => {}
                },
                TransportEvent::ChannelClosed => {
                    return Err(Error::ChannelClosed { received });
                }
                TransportEvent::ChannelError(e) => return Err(Error::ChannelError(e)),
                TransportEvent::LocalCandidate(_) | TransportEvent::ChannelOpen => {}
            }
        }
    }

    /// Close the channel.
    pub async fn close(&self) {
        self.channel.close().await;
    }

    fn assemble(
        metadata: Option<TransferMetadata>,
        chunks: Vec<Vec<u8>>,
        received: u64,
    ) -> ReceivedFile {
        if let Some(meta) = &metadata {
            if meta.size != received {
                warn!(
                    declared = meta.size,
                    received, "size mismatch between metadata and received bytes"
                );
            }
        }
        let mut bytes = Vec::with_capacity(usize::try_from(received).unwrap_or(0));
        for chunk in chunks {
            bytes.extend_from_slice(&chunk);
        }
        ReceivedFile {
            name: metadata.as_ref().map(|m| m.name.clone()),
            media_type: metadata
                .as_ref()
                .map_or_else(|| "application/octet-stream".to_string(), |m| {
                    m.media_type.clone()
                }),
            metadata,
            bytes,
        }
    }

    /// Drain pending inbound events without blocking, watching for a peer
    /// cancel or channel loss while the sender is busy writing.
    fn drain_inbound(&mut self, transferred: u64) -> Result<()> {
        while let Ok(event) = self.events.try_recv() {
            match event {
                TransportEvent::Frame(frame) => {
                    if let Decoded::Control(ControlMessage::Cancel) = codec::decode(frame)? {
                        self.cancel.cancel_peer();
                    }
                }
                TransportEvent::ChannelClosed => {
                    return Err(Error::ChannelClosed {
                        received: transferred,
                    });
                }
                TransportEvent::ChannelError(e) => return Err(Error::ChannelError(e)),
                TransportEvent::LocalCandidate(_) | TransportEvent::ChannelOpen => {}
            }
        }
        Ok(())
    }

    /// Tear down a cancelled send: notify the peer if the cancel was local,
    /// give the frame a moment to flush, close, and report the cause.
    async fn abort(&mut self, transferred: u64) -> Error {
        let cause = self.cancel.as_error().unwrap_or(Error::Cancelled);
        info!(transferred, peer = self.cancel.cancelled_by_peer(), "transfer cancelled");
        self.teardown(cause).await
    }

    async fn teardown(&mut self, cause: Error) -> Error {
        if !self.cancel.cancelled_by_peer() {
            if let Ok(frame) = codec::encode_control(&ControlMessage::Cancel) {
                if let Err(e) = self.channel.send(frame).await {
                    debug!(%e, "failed to send cancel notification");
                }
            }
        }
        sleep(self.config.cancel_grace).await;
        self.channel.close().await;
        cause
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cancel_flag_keeps_first_cause() {
        let flag = CancelFlag::new();
        assert!(!flag.is_cancelled());
        flag.cancel_peer();
        flag.cancel_local();
        assert!(flag.cancelled_by_peer());
        assert!(matches!(flag.as_error(), Some(Error::CancelledByPeer)));
    }

    #[test]
    fn default_config_matches_protocol_constants() {
        let config = TransferConfig::default();
        assert_eq!(config.chunk_size, 32 * 1024);
        assert_eq!(config.buffer_threshold, 1024 * 1024);
        assert_eq!(config.poll_interval, Duration::from_millis(10));
        assert_eq!(config.cancel_grace, Duration::from_millis(200));
    }

    #[test]
    fn assemble_without_metadata_falls_back_to_octet_stream() {
        let file = TransferEngine::<crate::transport::memory::MemoryChannel>::assemble(
            None,
            vec![vec![1, 2], vec![3]],
            3,
        );
        assert_eq!(file.media_type, "application/octet-stream");
        assert_eq!(file.name, None);
        assert_eq!(file.bytes(), &[1, 2, 3]);
    }
}
