use tracing::warn;

use super::super::{context::PlayerContext, state::PlayerEvent};
use crate::common::errors::PlayerError;

/// Broadcast `error` against the current resource.
pub fn emit_error(player: &PlayerContext, error: PlayerError) {
    let resource = player.state.resource().cloned();
    warn!(
        "[{}] playback error on {}: {}",
        player.id,
        resource.as_ref().map(|r| r.source()).unwrap_or("<none>"),
        error
    );
    player.emit(PlayerEvent::Error { resource, error });
}

/// Emit `error`, then abandon the current resource and return to `Idle`.
pub fn fail_current(player: &mut PlayerContext, error: PlayerError) {
    emit_error(player, error);
    player.go_idle();
}
