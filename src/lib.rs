pub mod audio;
pub mod common;
pub mod configs;
pub mod player;
pub mod voice;

#[cfg(test)]
mod testing;
