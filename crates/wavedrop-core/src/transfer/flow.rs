//! Backpressure gate for the sending loop.

use std::time::Duration;

use tokio::time::sleep;

use crate::error::Result;
use crate::transport::DataChannel;

use super::CancelFlag;

/// Polls the channel's queued byte count and holds the sender back while it
/// sits above the threshold.
#[derive(Debug, Clone, Copy)]
pub struct FlowController {
    threshold: u64,
    poll_interval: Duration,
}

impl FlowController {
    /// Gate at `threshold` queued bytes, re-checking every `poll_interval`.
    #[must_use]
    pub const fn new(threshold: u64, poll_interval: Duration) -> Self {
        Self {
            threshold,
            poll_interval,
        }
    }

    /// Wait until the channel's send queue drops to the threshold or below.
    ///
    /// Runs `on_poll` and re-checks the cancel flag on every iteration, so a
    /// cancel (local, or remote via events the hook drains) stops the wait
    /// within one interval even while the queue is saturated.
    pub async fn wait_for_capacity<C: DataChannel>(
        &self,
        channel: &C,
        cancel: &CancelFlag,
        mut on_poll: impl FnMut() -> Result<()>,
    ) -> Result<()> {
        loop {
            on_poll()?;
            if let Some(err) = cancel.as_error() {
                return Err(err);
            }
            if channel.buffered_amount().await <= self.threshold {
                return Ok(());
            }
            sleep(self.poll_interval).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::Ordering;
    use std::time::Duration;

    use super::*;
    use crate::error::Error;
    use crate::transport::memory;
    use crate::transport::PeerTransport;

    async fn open_pair() -> (memory::MemoryTransport, memory::MemoryTransport) {
        let ((mut a, mut a_rx), (mut b, mut b_rx)) = memory::pair();
        let offer = a.create_offer().await.unwrap();
        let answer = b.accept_offer(&offer).await.unwrap();
        a.apply_answer(&answer).await.unwrap();
        while let Ok(event) = a_rx.try_recv() {
            if let crate::transport::TransportEvent::LocalCandidate(c) = event {
                b.add_candidate(&c).await.unwrap();
            }
        }
        while let Ok(event) = b_rx.try_recv() {
            if let crate::transport::TransportEvent::LocalCandidate(c) = event {
                a.add_candidate(&c).await.unwrap();
            }
        }
        (a, b)
    }

    #[tokio::test]
    async fn passes_immediately_when_queue_is_under_threshold() {
        let (a, _b) = open_pair().await;
        let channel = a.channel().expect("open channel");
        let flow = FlowController::new(1024, Duration::from_millis(10));
        flow.wait_for_capacity(channel.as_ref(), &CancelFlag::new(), || Ok(()))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn blocks_until_queue_drains() {
        let (a, _b) = open_pair().await;
        let buffered = a.buffered_handle();
        let channel = a.channel().expect("open channel");
        buffered.store(4096, Ordering::SeqCst);

        let drainer = {
            let buffered = buffered.clone();
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_millis(30)).await;
                buffered.store(0, Ordering::SeqCst);
            })
        };

        let flow = FlowController::new(1024, Duration::from_millis(5));
        flow.wait_for_capacity(channel.as_ref(), &CancelFlag::new(), || Ok(()))
            .await
            .unwrap();
        drainer.await.unwrap();
        assert_eq!(buffered.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn cancellation_breaks_the_wait() {
        let (a, _b) = open_pair().await;
        let buffered = a.buffered_handle();
        let channel = a.channel().expect("open channel");
        // Queue never drains.
        buffered.store(u64::MAX, Ordering::SeqCst);

        let cancel = CancelFlag::new();
        let canceller = {
            let cancel = cancel.clone();
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_millis(20)).await;
                cancel.cancel_local();
            })
        };

        let flow = FlowController::new(1024, Duration::from_millis(5));
        let err = flow
            .wait_for_capacity(channel.as_ref(), &cancel, || Ok(()))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Cancelled));
        canceller.await.unwrap();
    }

    #[tokio::test]
    async fn poll_hook_cancel_breaks_the_wait() {
        let (a, _b) = open_pair().await;
        let buffered = a.buffered_handle();
        let channel = a.channel().expect("open channel");
        buffered.store(u64::MAX, Ordering::SeqCst);

        // The hook stands in for draining inbound events and finding a
        // remote cancel among them.
        let cancel = CancelFlag::new();
        let mut polls = 0_u32;
        let flow = FlowController::new(1024, Duration::from_millis(5));
        let err = flow
            .wait_for_capacity(channel.as_ref(), &cancel, || {
                polls += 1;
                if polls >= 3 {
                    cancel.cancel_peer();
                }
                Ok(())
            })
            .await
            .unwrap_err();
        assert!(matches!(err, Error::CancelledByPeer));
    }

    #[tokio::test]
    async fn poll_hook_errors_break_the_wait() {
        let (a, _b) = open_pair().await;
        let buffered = a.buffered_handle();
        let channel = a.channel().expect("open channel");
        buffered.store(u64::MAX, Ordering::SeqCst);

        let flow = FlowController::new(1024, Duration::from_millis(5));
        let err = flow
            .wait_for_capacity(channel.as_ref(), &CancelFlag::new(), || {
                Err(Error::ChannelClosed { received: 0 })
            })
            .await
            .unwrap_err();
        assert!(matches!(err, Error::ChannelClosed { .. }));
    }
}
