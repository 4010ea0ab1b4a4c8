use serde::{Deserialize, Serialize};

use crate::audio::constants::{
    DEFAULT_READ_CHUNK_SIZE, DEFAULT_RESOLVER_ARGS, DEFAULT_RESOLVER_PATH,
    DEFAULT_RESOLVE_PATTERNS, DEFAULT_TRANSCODER_GLOBAL_ARGS, DEFAULT_TRANSCODER_PATH, DEFAULT_TRANSCODER_RECONNECT_ARGS,
};

/// Placeholder substituted with the locator in `resolver.args`.
pub const INPUT_PLACEHOLDER: &str = "{input}";

/// `[decoder]`: the two external tools that turn a locator into PCM.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct DecoderConfig {
    /// Maximum bytes read from the transcoder per stdout read.
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
    /// Locators matching any of these regexes go through the resolver.
    #[serde(default = "default_resolve_patterns")]
    pub resolve_patterns: Vec<String>,
    #[serde(default)]
    pub resolver: ResolverConfig,
    #[serde(default)]
    pub transcoder: TranscoderConfig,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct ResolverConfig {
    #[serde(default = "default_resolver_path")]
    pub path: String,
    /// Full argument template; must contain `{input}` and write audio to stdout.
    #[serde(default = "default_resolver_args")]
    pub args: Vec<String>,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct TranscoderConfig {
    #[serde(default = "default_transcoder_path")]
    pub path: String,
    /// Leading options, before any input option.
    #[serde(default = "default_transcoder_global_args")]
    pub global_args: Vec<String>,
    /// Input options added when the transcoder reads a locator directly.
    #[serde(default = "default_reconnect_args")]
    pub reconnect_args: Vec<String>,
    /// Extra options placed before `-i` in both modes.
    #[serde(default)]
    pub extra_input_args: Vec<String>,
}

impl DecoderConfig {
    pub fn validate(&self) -> Result<(), String> {
        if self.chunk_size == 0 {
            return Err("decoder.chunk_size must be positive".into());
        }
        if !self.resolver.args.iter().any(|a| a.contains(INPUT_PLACEHOLDER)) {
            return Err(format!(
                "decoder.resolver.args must contain the {INPUT_PLACEHOLDER} placeholder"
            ));
        }
        for pattern in &self.resolve_patterns {
            regex::Regex::new(pattern)
                .map_err(|e| format!("invalid decoder.resolve_patterns entry {pattern:?}: {e}"))?;
        }
        Ok(())
    }
}

impl Default for DecoderConfig {
    fn default() -> Self {
        Self {
            chunk_size: default_chunk_size(),
            resolve_patterns: default_resolve_patterns(),
            resolver: ResolverConfig::default(),
            transcoder: TranscoderConfig::default(),
        }
    }
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            path: default_resolver_path(),
            args: default_resolver_args(),
        }
    }
}

impl Default for TranscoderConfig {
    fn default() -> Self {
        Self {
            path: default_transcoder_path(),
            global_args: default_transcoder_global_args(),
            reconnect_args: default_reconnect_args(),
            extra_input_args: Vec::new(),
        }
    }
}

fn to_strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

fn default_chunk_size() -> usize {
    DEFAULT_READ_CHUNK_SIZE
}

fn default_resolve_patterns() -> Vec<String> {
    to_strings(DEFAULT_RESOLVE_PATTERNS)
}

fn default_resolver_path() -> String {
    DEFAULT_RESOLVER_PATH.to_string()
}

fn default_resolver_args() -> Vec<String> {
    to_strings(DEFAULT_RESOLVER_ARGS)
}

fn default_transcoder_path() -> String {
    DEFAULT_TRANSCODER_PATH.to_string()
}

fn default_transcoder_global_args() -> Vec<String> {
    to_strings(DEFAULT_TRANSCODER_GLOBAL_ARGS)
}

fn default_reconnect_args() -> Vec<String> {
    to_strings(DEFAULT_TRANSCODER_RECONNECT_ARGS)
}
