use tokio::time::Instant;
use tracing::{debug, info};

use super::{super::context::PlayerContext, error::fail_current};
use crate::{common::errors::PlayerError, player::state::PlayerState};

/// Spawn the decode pipeline for the buffering resource and arm the
/// initial-buffering timeout.
pub fn start_pipeline(player: &mut PlayerContext) {
    let PlayerState::Buffering { resource } = &player.state else {
        return;
    };
    let resource = resource.clone();

    match player
        .spawner
        .spawn(&resource, player.generation, player.pipeline_tx.clone())
    {
        Ok(handle) => {
            info!(
                "[{}] decoding {} (generation {})",
                player.id,
                resource.source(),
                player.generation
            );
            player.pipeline = Some(handle);
            player.buffering_deadline = Some(Instant::now() + player.buffer_config.initial_timeout());
        }
        Err(e) => fail_current(player, PlayerError::Pipeline(e)),
    }
}

/// `Buffering -> Playing`; the first frame is due immediately.
pub fn begin_playing(player: &mut PlayerContext) {
    let PlayerState::Buffering { resource } = &player.state else {
        return;
    };
    let resource = resource.clone();

    debug!(
        "[{}] starting playback with {} frames buffered",
        player.id,
        player.buffer.len()
    );
    player.buffering_deadline = None;
    player.set_state(PlayerState::Playing { resource });
    player.pacer.start(Instant::now());
}
