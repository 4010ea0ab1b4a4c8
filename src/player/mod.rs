pub mod context;
pub mod handle;
pub mod manager;
pub mod pacer;
pub mod state;


pub use context::PlayerContext;
pub use handle::AudioPlayer;
pub use pacer::FramePacer;
pub use state::*;
