pub mod jitter;

pub use jitter::{BufferHealth, JitterBuffer};
