//! Cleanup command: ask a relay to sweep its expired sessions.

use anyhow::Result;

use wavedrop_core::relay::RelayClient;

use super::CleanupArgs;

/// Run the cleanup command.
pub async fn run(args: CleanupArgs) -> Result<()> {
    let config = super::load_config();
    let relay_url = args
        .relay
        .clone()
        .unwrap_or_else(|| config.relay.url.clone());
    let secret = args
        .secret
        .clone()
        .or_else(|| config.relay.cleanup_secret.clone());

    let deleted = RelayClient::new(&relay_url)
        .cleanup(secret.as_deref())
        .await?;
    println!("Deleted {deleted} expired session(s)");
    Ok(())
}
