//! Central constants for the playback engine.
//!
//! These are the defaults behind every `[audio]`, `[buffer]`, `[player]` and
//! `[decoder]` option; nothing in `src/audio/**` or `src/player/**` should use a
//! literal where one of these applies.

// ── PCM format ───────────────────────────────────────────────────────────────

/// Output sample rate (Hz).
pub const DEFAULT_SAMPLE_RATE: u32 = 48_000;

/// Interleaved channel count.
pub const DEFAULT_CHANNELS: u16 = 2;

/// Nominal frame duration; one frame is submitted per interval.
pub const DEFAULT_FRAME_DURATION_MS: u32 = 20;

/// Bytes per signed 16-bit sample.
pub const BYTES_PER_SAMPLE: usize = 2;

// ── Jitter buffer watermarks (frames) ────────────────────────────────────────

/// 1.5 s at 20 ms frames.
pub const DEFAULT_MIN_START_FRAMES: usize = 75;

/// 3 s at 20 ms frames.
pub const DEFAULT_TARGET_FRAMES: usize = 150;

/// 0.5 s at 20 ms frames.
pub const DEFAULT_LOW_FRAMES: usize = 25;

/// 10 s at 20 ms frames ≈ 1.9 MB of 48 kHz stereo PCM.
pub const DEFAULT_MAX_CAPACITY_FRAMES: usize = 500;

// ── Scheduler timings ────────────────────────────────────────────────────────

pub const DEFAULT_INITIAL_TIMEOUT_MS: u64 = 5_000;

/// Wait after an underrun before the next pop attempt.
pub const DEFAULT_UNDERRUN_RETRY_MS: u64 = 10;

/// Extra delay per frame while the buffer sits below the low watermark.
pub const DEFAULT_CORRECTIVE_DELAY_MS: u64 = 1;

/// Zeroed frames sent after the natural end of a stream.
pub const DEFAULT_SILENCE_PADDING_FRAMES: u32 = 5;

// ── Decode pipeline ──────────────────────────────────────────────────────────

/// Upper bound for one transcoder stdout read.
pub const DEFAULT_READ_CHUNK_SIZE: usize = 16 * 1_024;

/// Bytes of stderr kept per process for exit diagnostics.
pub const MAX_DIAGNOSTIC_BYTES: usize = 4 * 1_024;

/// Pipeline events queued between the supervisor and the player. A full
/// queue suspends the supervisor, which stops reading transcoder stdout.
pub const PIPELINE_EVENT_CAPACITY: usize = 8;

/// Reaping interval once transcoder stdout has closed.
pub const EXIT_POLL_INTERVAL_MS: u64 = 5;

/// How long exit reporting waits for stderr to close after the process is gone.
pub const DIAGNOSTICS_GRACE_MS: u64 = 500;

pub const DEFAULT_RESOLVER_PATH: &str = "yt-dlp";

pub const DEFAULT_TRANSCODER_PATH: &str = "ffmpeg";

pub const DEFAULT_RESOLVER_ARGS: &[&str] = &[
    "--format",
    "bestaudio/best",
    "--no-playlist",
    "--no-warnings",
    "--quiet",
    "--default-search",
    "ytsearch",
    "--output",
    "-",
    "{input}",
];

pub const DEFAULT_TRANSCODER_GLOBAL_ARGS: &[&str] = &["-hide_banner", "-loglevel", "error"];

pub const DEFAULT_TRANSCODER_RECONNECT_ARGS: &[&str] = &[
    "-reconnect",
    "1",
    "-reconnect_streamed",
    "1",
    "-reconnect_delay_max",
    "5",
];

/// Hosts whose page URLs must be resolved to a media stream first.
pub const DEFAULT_RESOLVE_PATTERNS: &[&str] = &[
    r"^https?://(www\.|m\.|music\.)?youtube\.com/",
    r"^https?://youtu\.be/",
    r"^https?://(www\.|m\.)?soundcloud\.com/",
    r"^https?://([a-z0-9-]+\.)?bandcamp\.com/",
    r"^https?://(www\.)?vimeo\.com/",
    r"^https?://(www\.|m\.)?twitch\.tv/",
    r"^https?://(www\.)?mixcloud\.com/",
];
