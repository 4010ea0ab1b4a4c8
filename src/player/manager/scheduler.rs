use tokio::time::Instant;
use tracing::{debug, info, warn};

use super::super::context::PlayerContext;
use crate::audio::Frame;

/// One scheduler step while `Playing`: send the next frame, pad the end of
/// the stream with silence, or record an underrun and retry shortly.
pub async fn tick(player: &mut PlayerContext) {
    let Some(resource) = player.state.resource().cloned() else {
        return;
    };

    if let Some(frame) = player.buffer.pop_front() {
        player.update_health();

        let volume = resource.volume();
        let frame = if volume < 1.0 { frame.with_gain(volume) } else { frame };
        submit(player, &frame).await;

        player.stats.record_submitted();
        resource.mark_started();
        resource.add_played(player.format.frame_interval());

        let corrective = (!player.pipeline_done
            && player.buffer.len() < player.buffer_config.low_frames)
            .then(|| player.buffer_config.corrective_delay());
        player.pacer.advance(corrective);
        return;
    }

    if player.pipeline_done {
        let left = *player
            .padding_left
            .get_or_insert(player.player_config.silence_padding_frames);
        if left > 0 {
            player.padding_left = Some(left - 1);
            submit(player, &Frame::silence(&player.format)).await;
            player.stats.record_silence();
            player.pacer.advance(None);
        } else {
            info!(
                "[{}] finished {} ({:?} played)",
                player.id,
                resource.source(),
                resource.playback_duration()
            );
            player.go_idle();
        }
        return;
    }

    let underruns = player.buffer.record_underrun();
    player.stats.record_underrun();
    debug!("[{}] buffer underrun ({} so far)", player.id, underruns);
    player
        .pacer
        .defer(Instant::now(), player.buffer_config.underrun_retry());
}

/// Hands `frame` to every ready session. Failures are counted, never fatal.
async fn submit(player: &PlayerContext, frame: &Frame) {
    for session in player.ready_sessions() {
        if let Err(e) = session.submit_frame(frame).await {
            player.stats.record_submit_error();
            warn!("[{}] frame submission failed: {}", player.id, e);
        }
    }
}
