//! Argument vectors for the resolver and transcoder processes.

use crate::{
    audio::{frame::PcmFormat, pipeline::classify::is_http, resource::StreamType},
    configs::{INPUT_PLACEHOLDER, ResolverConfig, TranscoderConfig},
};

/// A program plus its full argument vector.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSpec {
    pub program: String,
    pub args: Vec<String>,
}

impl std::fmt::Display for CommandSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.program)?;
        for arg in &self.args {
            write!(f, " {}", arg)?;
        }
        Ok(())
    }
}

/// Where the transcoder reads its input from.
#[derive(Debug, Clone, Copy)]
pub enum TranscoderInput<'a> {
    /// Piped from the resolver.
    Stdin,
    Locator(&'a str),
}

pub fn resolver_command(config: &ResolverConfig, locator: &str) -> CommandSpec {
    CommandSpec {
        program: config.path.clone(),
        args: config
            .args
            .iter()
            .map(|arg| arg.replace(INPUT_PLACEHOLDER, locator.trim()))
            .collect(),
    }
}

pub fn transcoder_command(
    config: &TranscoderConfig,
    format: &PcmFormat,
    stream_type: StreamType,
    input: TranscoderInput<'_>,
) -> CommandSpec {
    let mut args = config.global_args.clone();

    let input_arg = match input {
        TranscoderInput::Stdin => "pipe:0".to_string(),
        TranscoderInput::Locator(locator) => {
            if is_http(locator) {
                args.extend(config.reconnect_args.iter().cloned());
            }
            locator.trim().to_string()
        }
    };

    args.extend(config.extra_input_args.iter().cloned());
    args.extend(input_format_args(stream_type, format));
    args.push("-i".into());
    args.push(input_arg);

    args.extend([
        "-vn".to_string(),
        "-f".to_string(),
        "s16le".to_string(),
        "-ar".to_string(),
        format.sample_rate.to_string(),
        "-ac".to_string(),
        format.channels.to_string(),
        "pipe:1".to_string(),
    ]);

    CommandSpec {
        program: config.path.clone(),
        args,
    }
}

/// Demuxer hint for declared stream types; `Arbitrary` lets the transcoder probe.
fn input_format_args(stream_type: StreamType, format: &PcmFormat) -> Vec<String> {
    match stream_type {
        StreamType::Arbitrary => Vec::new(),
        StreamType::Raw => vec![
            "-f".into(),
            "s16le".into(),
            "-ar".into(),
            format.sample_rate.to_string(),
            "-ac".into(),
            format.channels.to_string(),
        ],
        StreamType::OggOpus => vec!["-f".into(), "ogg".into()],
        StreamType::WebmOpus => vec!["-f".into(), "webm".into()],
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::configs::DecoderConfig;

    const FORMAT: PcmFormat = PcmFormat::new(48_000, 2, 20);

    fn position(spec: &CommandSpec, arg: &str) -> Option<usize> {
        spec.args.iter().position(|a| a == arg)
    }

    #[test]
    fn resolver_substitutes_locator() {
        let config = DecoderConfig::default();
        let spec = resolver_command(&config.resolver, " lofi beats ");
        assert_eq!(spec.program, "yt-dlp");
        assert_eq!(spec.args.last().map(String::as_str), Some("lofi beats"));
        assert!(spec.args.iter().any(|a| a == "--no-playlist"));
        assert!(spec.args.iter().any(|a| a == "--no-warnings"));
        assert!(spec.args.windows(2).any(|w| w == ["--output", "-"]));
    }

    #[test]
    fn piped_transcoder_reads_stdin_without_reconnect() {
        let config = DecoderConfig::default();
        let spec = transcoder_command(
            &config.transcoder,
            &FORMAT,
            StreamType::Arbitrary,
            TranscoderInput::Stdin,
        );
        let i = position(&spec, "-i").unwrap();
        assert_eq!(spec.args[i + 1], "pipe:0");
        assert!(position(&spec, "-reconnect").is_none());
        assert_eq!(spec.args.last().map(String::as_str), Some("pipe:1"));
    }

    #[test]
    fn direct_http_transcoder_reconnects_before_input() {
        let config = DecoderConfig::default();
        let spec = transcoder_command(
            &config.transcoder,
            &FORMAT,
            StreamType::Arbitrary,
            TranscoderInput::Locator("https://example.com/audio.raw"),
        );
        let reconnect = position(&spec, "-reconnect").unwrap();
        let input = position(&spec, "-i").unwrap();
        assert!(reconnect < input);
        assert_eq!(spec.args[input + 1], "https://example.com/audio.raw");
    }

    #[test]
    fn output_format_is_fixed_pcm() {
        let config = DecoderConfig::default();
        let format = PcmFormat::new(24_000, 1, 20);
        let spec = transcoder_command(
            &config.transcoder,
            &format,
            StreamType::Arbitrary,
            TranscoderInput::Locator("file:///tmp/a.flac"),
        );
        let tail: Vec<&str> = spec.args.iter().rev().take(8).rev().map(String::as_str).collect();
        assert_eq!(tail, ["-vn", "-f", "s16le", "-ar", "24000", "-ac", "1", "pipe:1"]);
        assert!(position(&spec, "-reconnect").is_none());
    }

    #[test]
    fn raw_stream_type_declares_input_layout() {
        let config = DecoderConfig::default();
        let spec = transcoder_command(
            &config.transcoder,
            &FORMAT,
            StreamType::Raw,
            TranscoderInput::Stdin,
        );
        let input = position(&spec, "-i").unwrap();
        assert_eq!(
            &spec.args[input - 6..input],
            ["-f", "s16le", "-ar", "48000", "-ac", "2"]
        );
    }
}
