pub mod audio;
pub mod base;
pub mod buffer;
pub mod decoder;
pub mod logging;
pub mod player;

pub use audio::*;
pub use base::*;
pub use buffer::*;
pub use decoder::*;
pub use logging::*;
pub use player::*;
