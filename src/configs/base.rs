use serde::{Deserialize, Serialize};

use crate::common::types::AnyResult;
use crate::configs::*;

#[derive(Debug, Deserialize, Serialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub audio: AudioConfig,
    #[serde(default)]
    pub buffer: BufferConfig,
    #[serde(default)]
    pub player: PlayerConfig,
    #[serde(default)]
    pub decoder: DecoderConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Config {
    /// Loads `config.toml`, falling back to `config.default.toml`.
    pub fn load() -> AnyResult<Self> {
        let config_path = if std::path::Path::new("config.toml").exists() {
            "config.toml"
        } else if std::path::Path::new("config.default.toml").exists() {
            "config.default.toml"
        } else {
            return Err("config.toml or config.default.toml not found".into());
        };

        crate::log_println!("Loading configuration from: {}", config_path);

        let config_str = std::fs::read_to_string(config_path)?;
        if config_str.is_empty() {
            return Err(format!("{} is empty", config_path).into());
        }

        Self::from_toml(&config_str)
    }

    pub fn from_toml(input: &str) -> AnyResult<Self> {
        let config: Config = toml::from_str(input)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> AnyResult<()> {
        let audio = &self.audio;
        if audio.sample_rate == 0 || audio.channels == 0 || audio.frame_duration_ms == 0 {
            return Err("audio.sample_rate, audio.channels and audio.frame_duration_ms must be positive".into());
        }
        if (audio.sample_rate as u64 * audio.frame_duration_ms as u64) % 1000 != 0 {
            return Err(format!(
                "audio.frame_duration_ms ({}) does not divide into whole samples at {} Hz",
                audio.frame_duration_ms, audio.sample_rate
            )
            .into());
        }
        self.buffer.validate()?;
        self.decoder.validate()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_document_yields_defaults() {
        let config = Config::from_toml("").unwrap();
        assert_eq!(config.audio, AudioConfig::default());
        assert_eq!(config.buffer.min_start_frames, 75);
        assert_eq!(config.player.no_subscriber, NoSubscriberBehavior::Pause);
    }

    #[test]
    fn partial_sections_keep_other_defaults() {
        let config = Config::from_toml(
            r#"
            [buffer]
            min_start_frames = 10
            low_frames = 5

            [decoder.transcoder]
            path = "/opt/ffmpeg/bin/ffmpeg"
            "#,
        )
        .unwrap();
        assert_eq!(config.buffer.min_start_frames, 10);
        assert_eq!(config.buffer.target_frames, 150);
        assert_eq!(config.decoder.transcoder.path, "/opt/ffmpeg/bin/ffmpeg");
        assert_eq!(config.decoder.resolver.path, "yt-dlp");
    }

    #[test]
    fn rejects_fractional_frames() {
        let err = Config::from_toml("[audio]\nsample_rate = 44100\nframe_duration_ms = 7").unwrap_err();
        assert!(err.to_string().contains("whole samples"));
    }

    #[test]
    fn shipped_default_file_parses() {
        let config = Config::from_toml(include_str!("../../config.default.toml")).unwrap();
        assert_eq!(config.audio.format().frame_bytes(), 3840);
    }
}
