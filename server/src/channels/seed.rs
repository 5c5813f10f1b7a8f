use relay_protocol::ChannelKind;

use crate::db::Store;
use crate::error::StoreError;

/// Name of the channel seeded on first boot.
pub const WORLD_CHANNEL_NAME: &str = "world";

/// Seed the default world channel.
/// Only seeds if no world channel exists yet (idempotent guard).
pub async fn seed_world_channel(store: &Store) -> Result<(), StoreError> {
    if store.world_channel().await?.is_some() {
        return Ok(());
    }

    let channel = store
        .create_channel(WORLD_CHANNEL_NAME, ChannelKind::World, None)
        .await?;
    tracing::info!(channel_id = %channel.id, "Seeded world channel");
    Ok(())
}
