pub mod error;
pub mod scheduler;
pub mod start;

pub use error::{emit_error, fail_current};
pub use scheduler::tick;
pub use start::{begin_playing, start_pipeline};
