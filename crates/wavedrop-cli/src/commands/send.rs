//! Send command implementation.

use anyhow::{bail, Context, Result};
use futures::StreamExt;
use tracing::{debug, warn};

use wavedrop_core::config::Config;
use wavedrop_core::progress::format_size;
use wavedrop_core::relay::RelayClient;
use wavedrop_core::session::{FileInfo, Role, SessionEvent};
use wavedrop_core::signaling::SignalingSession;
use wavedrop_core::transfer::{TransferConfig, TransferEngine};
use wavedrop_core::transport::webrtc::{IceServer, WebRtcTransport};
use wavedrop_core::transport::TransportEvent;

use super::SendArgs;
use crate::ui;

/// Run the send command.
pub async fn run(args: SendArgs) -> Result<()> {
    let config = super::load_config();
    let relay_url = args
        .relay
        .clone()
        .unwrap_or_else(|| config.relay.url.clone());
    let relay = RelayClient::new(&relay_url);

    let meta = tokio::fs::metadata(&args.file)
        .await
        .with_context(|| format!("cannot read {}", args.file.display()))?;
    if !meta.is_file() {
        bail!("{} is not a file", args.file.display());
    }
    if meta.len() > config.transfer.max_file_size {
        bail!(
            "file is too large: {} (maximum {})",
            format_size(meta.len()),
            format_size(config.transfer.max_file_size)
        );
    }

    let name = args
        .file
        .file_name()
        .map_or_else(|| "file".to_string(), |n| n.to_string_lossy().into_owned());
    let media_type = guess_media_type(&args.file);
    let file_info = FileInfo {
        name: name.clone(),
        size: meta.len(),
        media_type,
    };

    let (transport, mut events) = WebRtcTransport::new(ice_servers(&config)).await?;
    let mut session = SignalingSession::new(transport);
    let offer = session.create_offer().await?;

    let created = relay.create_session(offer, file_info).await?;
    let token = created.token.to_string();

    if !args.quiet {
        println!();
        println!("Wavedrop v{}", wavedrop_core::VERSION);
        println!("{}", "-".repeat(41));
        println!();
        println!("  Sharing {} ({})", name, format_size(meta.len()));
        println!();
        ui::TokenBox::new(&token).with_expire("10 minutes").display();
        println!();
        println!("  On the other machine:  wavedrop receive {}", token);
        println!();
        println!("  Waiting for a receiver...");
    }

    let updates = relay.listen(&token, Role::Sender).await?;
    futures::pin_mut!(updates);

    // Signaling loop: publish our candidates, absorb the answer and the
    // receiver's candidates, until the channel opens.
    loop {
        tokio::select! {
            event = events.recv() => match event {
                Some(TransportEvent::LocalCandidate(candidate)) => {
                    if let Err(e) = relay
                        .submit_candidate(&token, Role::Sender, candidate)
                        .await
                    {
                        warn!(%e, "failed to publish candidate");
                    }
                }
                Some(TransportEvent::ChannelOpen) => {
                    session.note_channel_open();
                    break;
                }
                Some(TransportEvent::ChannelError(e)) => {
                    let _ = relay.close_session(&token).await;
                    bail!("connection failed: {e}");
                }
                Some(TransportEvent::ChannelClosed) | None => {
                    let _ = relay.close_session(&token).await;
                    bail!("connection closed during setup");
                }
                Some(TransportEvent::Frame(_)) => debug!("frame before channel open"),
            },
            update = updates.next() => match update {
                Some(Ok(SessionEvent::Update { answer, candidates, .. })) => {
                    if let Some(answer) = answer {
                        session.apply_answer(&answer).await?;
                    }
                    for candidate in candidates {
                        session.handle_remote_candidate(candidate).await?;
                    }
                }
                Some(Ok(SessionEvent::Expired)) => {
                    bail!("token expired before a receiver connected");
                }
                Some(Err(e)) => warn!(%e, "relay stream error"),
                None => {
                    let _ = relay.close_session(&token).await;
                    bail!("relay stream ended during setup");
                }
            },
            _ = tokio::signal::ctrl_c() => {
                session.close().await;
                let _ = relay.close_session(&token).await;
                bail!("cancelled");
            }
        }
    }

    if !args.quiet {
        println!("  Receiver connected, transferring...");
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
        .send_file(&args.file, |snapshot| {
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
        Ok(()) => {
            if !args.quiet {
                println!("  Transfer complete.");
                println!();
            }
            session.close().await;
            Ok(())
        }
        Err(e) => {
            session.close().await;
            eprintln!("  {}", e.user_message());
            Err(e.into())
        }
    }
}

fn guess_media_type(path: &std::path::Path) -> String {
    // The core engine guesses again for the metadata frame; this copy only
    // feeds the relay's session record.
    mime_guess::from_path(path)
        .first_or_octet_stream()
        .essence_str()
        .to_string()
}

/// Map the user's config onto transfer tunables.
pub fn transfer_config(config: &Config) -> TransferConfig {
    TransferConfig {
        chunk_size: config.transfer.chunk_size,
        buffer_threshold: config.transfer.buffer_threshold,
        completion_timeout: std::time::Duration::from_secs(
            config.transfer.completion_timeout_secs,
        ),
        max_file_size: config.transfer.max_file_size,
        ..Default::default()
    }
}

/// Map the user's config onto the transport's server list.
pub fn ice_servers(config: &Config) -> Vec<IceServer> {
    let mut servers: Vec<IceServer> = config
        .ice
        .stun
        .iter()
        .map(|url| IceServer::stun(url.clone()))
        .collect();
    if let Some(turn) = &config.ice.turn {
        servers.push(IceServer {
            urls: vec![turn.url.clone()],
            username: turn.username.clone(),
            credential: turn.credential.clone(),
        });
    }
    if servers.is_empty() {
        servers = wavedrop_core::transport::webrtc::default_ice_servers();
    }
    servers
}
