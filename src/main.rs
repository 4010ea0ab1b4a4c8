use std::sync::Arc;

use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, info, warn};
use voxlink::{
    audio::AudioResource,
    common::{
        logger,
        types::{AnyResult, ChannelId, GuildId},
    },
    configs::Config,
    log_println,
    player::{AudioPlayer, PlayerEvent, PlayerState},
    voice::{
        ConnectionEvent, ConnectionRegistry, JoinConfig, PcmFileTransport, SignallingAdapter,
        VoiceServerUpdate, VoiceStateRequest, VoiceStateUpdate,
    },
};

const DEFAULT_OUTPUT: &str = "voxlink.pcm";
const LOCAL_CHANNEL: ChannelId = ChannelId(1);

/// Signalling for a single in-process session; every request succeeds.
struct LocalSignalling;

impl SignallingAdapter for LocalSignalling {
    fn send_voice_state(&self, request: &VoiceStateRequest) -> bool {
        debug!(
            "[{}] voice state request: channel {:?}",
            request.guild_id, request.channel_id
        );
        true
    }

    fn destroy(&self) {}
}

#[tokio::main]
async fn main() -> AnyResult<()> {
    let mut args = std::env::args().skip(1);
    let Some(locator) = args.next() else {
        log_println!("usage: voxlink <locator> [output.pcm]");
        return Ok(());
    };
    let output = args.next().unwrap_or_else(|| DEFAULT_OUTPUT.to_owned());

    let config = Config::load()?;
    logger::init(&config);

    let guild_id = GuildId::from("local");
    let registry = ConnectionRegistry::new(Arc::new(PcmFileTransport::new(&output)));
    let connection = registry.join(
        JoinConfig {
            guild_id: guild_id.clone(),
            channel_id: LOCAL_CHANNEL,
            self_mute: false,
            self_deaf: false,
        },
        Arc::new(LocalSignalling),
    );

    let mut connection_events = connection.events();
    tokio::spawn(async move {
        loop {
            match connection_events.recv().await {
                Ok(ConnectionEvent::Error(e)) => warn!("connection error: {}", e),
                Ok(ConnectionEvent::StateChange { new, .. }) => debug!("connection {:?}", new),
                Err(RecvError::Lagged(_)) => continue,
                Err(RecvError::Closed) => break,
            }
        }
    });

    let player = AudioPlayer::new(&config)?;
    player.subscribe(&connection)?;

    let mut player_events = player.events();
    tokio::spawn(async move {
        loop {
            match player_events.recv().await {
                Ok(PlayerEvent::Error { error, .. }) => warn!("playback error: {}", error),
                Ok(PlayerEvent::StateChange { new, .. }) => info!("player {:?}", new.status()),
                Err(RecvError::Lagged(_)) => continue,
                Err(RecvError::Closed) => break,
            }
        }
    });

    let resource = AudioResource::from_locator(locator)?;
    player.play(resource.clone()).await?;

    registry.route_state_update(VoiceStateUpdate {
        guild_id: guild_id.clone(),
        session_id: "local".into(),
        channel_id: Some(LOCAL_CHANNEL),
    });
    registry.route_server_update(VoiceServerUpdate {
        guild_id,
        token: "local".into(),
        endpoint: Some(output.clone()),
    });

    let mut state = player.watch_state();
    tokio::select! {
        _ = state.wait_for(PlayerState::is_idle) => {}
        _ = tokio::signal::ctrl_c() => {
            info!("interrupted, stopping playback");
            player.stop(false).await;
        }
    }

    let stats = player.stats();
    log_println!(
        "played {:?} of {} into {}: {} frames, {} silence, {} dropped, {} underruns",
        resource.playback_duration(),
        resource.source(),
        output,
        stats.frames_submitted,
        stats.silence_frames,
        stats.frames_dropped,
        stats.underruns
    );

    registry.shutdown();
    Ok(())
}
