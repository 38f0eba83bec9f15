//! Receive command implementation.

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use futures::StreamExt;
use tracing::{debug, warn};

use wavedrop_core::progress::format_size;
use wavedrop_core::relay::RelayClient;
use wavedrop_core::session::{Role, SessionEvent};
use wavedrop_core::signaling::SignalingSession;
use wavedrop_core::token::ShareToken;
use wavedrop_core::transfer::{ReceivedFile, TransferEngine};
use wavedrop_core::transport::webrtc::WebRtcTransport;
use wavedrop_core::transport::TransportEvent;

use super::send::{ice_servers, transfer_config};
use super::ReceiveArgs;
use crate::ui;

/// Run the receive command.
pub async fn run(args: ReceiveArgs) -> Result<()> {
    let config = super::load_config();
    let relay_url = args
        .relay
        .clone()
        .unwrap_or_else(|| config.relay.url.clone());
    let relay = RelayClient::new(&relay_url);

    let token = ShareToken::parse(&args.token)
        .with_context(|| format!("'{}' is not a share token", args.token))?;
    let token = token.as_str().to_string();

    let validated = relay.validate(&token).await?;
    let Some(summary) = validated.session.filter(|_| validated.valid) else {
        let reason = validated
            .error
            .unwrap_or_else(|| "token not recognized".to_string());
        bail!("{reason}");
    };

    if !args.quiet {
        println!();
        println!("Wavedrop v{}", wavedrop_core::VERSION);
        println!("{}", "-".repeat(41));
        println!();
        println!(
            "  Receiving {} ({})",
            summary.file.name,
            format_size(summary.file.size)
        );
        println!();
        println!("  Connecting to sender...");
    }

    let (transport, mut events) = WebRtcTransport::new(ice_servers(&config)).await?;
    let mut session = SignalingSession::new(transport);
    let answer = session.accept_offer(&summary.offer).await?;
    relay.submit_answer(&token, Role::Receiver, answer).await?;

    let updates = relay.listen(&token, Role::Receiver).await?;
    futures::pin_mut!(updates);

    loop {
        tokio::select! {
            event = events.recv() => match event {
                Some(TransportEvent::LocalCandidate(candidate)) => {
                    if let Err(e) = relay
                        .submit_candidate(&token, Role::Receiver, candidate)
                        .await
                    {
                        warn!(%e, "failed to publish candidate");
                    }
                }
                Some(TransportEvent::ChannelOpen) => {
                    session.note_channel_open();
                    break;
                }
                Some(TransportEvent::ChannelError(e)) => bail!("connection failed: {e}"),
                Some(TransportEvent::ChannelClosed) | None => {
                    bail!("connection closed during setup");
                }
                Some(TransportEvent::Frame(_)) => debug!("frame before channel open"),
            },
            update = updates.next() => match update {
                Some(Ok(SessionEvent::Update { candidates, .. })) => {
                    for candidate in candidates {
                        session.handle_remote_candidate(candidate).await?;
                    }
                }
                Some(Ok(SessionEvent::Expired)) => bail!("session expired"),
                Some(Err(e)) => warn!(%e, "relay stream error"),
                None => bail!("relay stream ended during setup"),
            },
            _ = tokio::signal::ctrl_c() => {
                session.close().await;
                bail!("cancelled");
            }
        }
    }

    if !args.quiet {
        println!("  Connected, receiving...");
        println!();
    }

    let channel = session.channel().context("data channel missing after open")?;
    let mut engine = TransferEngine::new(channel, events, transfer_config(&config));

    let cancel = engine.cancel_handle();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            cancel.cancel_local();
        }
    });

    let mut last_pct = -1.0_f64;
    let result = engine
        .receive(|snapshot| {
            if snapshot.percentage - last_pct >= 0.1 || snapshot.percentage >= 100.0 {
                last_pct = snapshot.percentage;
                if !args.quiet {
                    ui::print_progress(&snapshot);
                }
            }
        })
        .await;

    if !args.quiet {
        ui::finish_progress();
    }
    let _ = relay.close_session(&token).await;

    match result {
        Ok(received) => {
            let dir = args.output.clone().unwrap_or_else(|| PathBuf::from("."));
            let name = received.name.as_deref().unwrap_or(&summary.file.name);
            let dest = dir.join(sanitize_name(name));
            let landed = persist_with_fallback(&received, &dest).await?;
            session.close().await;
            if !args.quiet {
                println!("  Saved to {}", landed.display());
                println!();
            }
            Ok(())
        }
        Err(e) => {
            session.close().await;
            eprintln!("  {}", e.user_message());
            Err(e.into())
        }
    }
}

/// Strip any directory components the sender put in the file name.
fn sanitize_name(name: &str) -> String {
    Path::new(name)
        .file_name()
        .map_or_else(|| "download".to_string(), |n| n.to_string_lossy().into_owned())
}

/// Write the received bytes to `dest`, falling back to the system temp
/// directory when that location is not writable, so a finished transfer is
/// never lost to a bad output path. Returns where the bytes landed.
async fn persist_with_fallback(received: &ReceivedFile, dest: &Path) -> Result<PathBuf> {
    let primary = match received.persist(dest).await {
        Ok(()) => return Ok(dest.to_path_buf()),
        Err(e) => e,
    };
    let name = dest
        .file_name()
        .map_or_else(|| std::ffi::OsString::from("download"), std::ffi::OsStr::to_os_string);
    let fallback = std::env::temp_dir().join(name);
    received.persist(&fallback).await.with_context(|| {
        format!(
            "cannot write {} ({primary}) or {}",
            dest.display(),
            fallback.display()
        )
    })?;
    warn!(
        dest = %dest.display(),
        fallback = %fallback.display(),
        %primary,
        "output path not writable, saved to the temp directory"
    );
    Ok(fallback)
}

#[cfg(test)]
mod tests {
    use super::{persist_with_fallback, sanitize_name};
    use wavedrop_core::transfer::{ReceivedFile, TransferConfig, TransferEngine};
    use wavedrop_core::transport::{memory, PeerTransport, TransportEvent};

    #[test]
    fn sanitize_drops_path_components() {
        assert_eq!(sanitize_name("../../etc/passwd"), "passwd");
        assert_eq!(sanitize_name("report.pdf"), "report.pdf");
        assert_eq!(sanitize_name(".."), "download");
    }

    // Runs a loopback transfer to get a real ReceivedFile in hand.
    async fn received_fixture(content: &[u8]) -> ReceivedFile {
        let ((mut a, mut a_rx), (mut b, mut b_rx)) = memory::pair();
        let offer = a.create_offer().await.unwrap();
        let answer = b.accept_offer(&offer).await.unwrap();
        a.apply_answer(&answer).await.unwrap();
        let mut a_candidates = Vec::new();
        while let Ok(event) = a_rx.try_recv() {
            if let TransportEvent::LocalCandidate(c) = event {
                a_candidates.push(c);
            }
        }
        while let Ok(event) = b_rx.try_recv() {
            if let TransportEvent::LocalCandidate(c) = event {
                a.add_candidate(&c).await.unwrap();
            }
        }
        for c in &a_candidates {
            b.add_candidate(c).await.unwrap();
        }

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("payload.bin");
        tokio::fs::write(&path, content).await.unwrap();

        let mut receiver =
            TransferEngine::new(b.channel().unwrap(), b_rx, TransferConfig::default());
        let receive_task = tokio::spawn(async move { receiver.receive(|_| {}).await });
        let mut sender = TransferEngine::new(a.channel().unwrap(), a_rx, TransferConfig::default());
        sender.send_file(&path, |_| {}).await.unwrap();
        receive_task.await.unwrap().unwrap()
    }

    #[tokio::test]
    async fn persist_prefers_the_requested_destination() {
        let received = received_fixture(b"direct write").await;
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("out.bin");
        let landed = persist_with_fallback(&received, &dest).await.unwrap();
        assert_eq!(landed, dest);
        assert_eq!(tokio::fs::read(&dest).await.unwrap(), b"direct write");
    }

    #[tokio::test]
    async fn persist_falls_back_when_the_destination_is_unwritable() {
        let received = received_fixture(b"rescued bytes").await;
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("missing").join("nested").join("rescued.bin");

        let landed = persist_with_fallback(&received, &dest).await.unwrap();
        assert_ne!(landed, dest);
        assert_eq!(landed, std::env::temp_dir().join("rescued.bin"));
        assert_eq!(tokio::fs::read(&landed).await.unwrap(), b"rescued bytes");
        let _ = tokio::fs::remove_file(&landed).await;
    }
}
