//! External process orchestration for the decode pipeline.
//!
//! Each process is a [`ManagedProcess`] spawned with `kill_on_drop`, so every
//! exit path (player stop, replacement, supervisor failure, panic unwinding)
//! terminates it. The chain is shared between a supervisor task, which
//! forwards transcoder stdout and reports the exit once stdout reaches EOF,
//! and the [`PipelineHandle`], which kills it in place.

use std::{
    process::{ExitStatus, Stdio},
    sync::Arc,
    time::Duration,
};

use futures::StreamExt;
use parking_lot::Mutex;
use tokio::{
    io::AsyncReadExt,
    process::{Child, ChildStderr, ChildStdout, Command},
    task::JoinHandle,
};
use tokio_util::{
    codec::{BytesCodec, FramedRead},
    sync::CancellationToken,
};
use tracing::{debug, trace, warn};

use super::{
    PipelineEvent, PipelineExit, PipelineHandle, PipelineSpawner,
    classify::{LocatorClassifier, LocatorKind},
    command::{self, CommandSpec, TranscoderInput},
};
use crate::{
    audio::{
        constants::{DIAGNOSTICS_GRACE_MS, EXIT_POLL_INTERVAL_MS, MAX_DIAGNOSTIC_BYTES},
        frame::PcmFormat,
        resource::AudioResource,
    },
    common::errors::PipelineError,
    configs::DecoderConfig,
};

/// A child process that is killed when dropped and whose stderr is captured.
pub struct ManagedProcess {
    role: &'static str,
    child: Child,
    diagnostics: Option<JoinHandle<String>>,
    killed: bool,
}

impl ManagedProcess {
    pub fn spawn(
        role: &'static str,
        spec: &CommandSpec,
        stdin: Stdio,
        stdout: Stdio,
    ) -> Result<Self, PipelineError> {
        debug!("Spawning {}: {}", role, spec);

        let mut child = Command::new(&spec.program)
            .args(&spec.args)
            .stdin(stdin)
            .stdout(stdout)
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| PipelineError::Spawn {
                tool: spec.program.clone(),
                reason: e.to_string(),
            })?;

        let diagnostics = child.stderr.take().map(|s| tokio::spawn(collect_diagnostics(s)));

        Ok(Self {
            role,
            child,
            diagnostics,
            killed: false,
        })
    }

    pub fn take_stdout(&mut self) -> Result<ChildStdout, PipelineError> {
        self.child.stdout.take().ok_or_else(|| {
            PipelineError::Pipe(format!("{} stdout was not captured", self.role))
        })
    }

    /// Sends SIGKILL (or the platform equivalent) without waiting for exit.
    pub fn start_kill(&mut self) {
        self.killed = true;
        if let Err(e) = self.child.start_kill() {
            trace!("{} already gone: {}", self.role, e);
        }
    }

    fn is_running(&mut self) -> bool {
        matches!(self.child.try_wait(), Ok(None))
    }

    /// `None` while running; `Some(None)` when the process can no longer be
    /// waited on.
    fn try_status(&mut self) -> Option<Option<ExitStatus>> {
        match self.child.try_wait() {
            Ok(Some(status)) => Some(Some(status)),
            Ok(None) => None,
            Err(e) => {
                warn!("Failed to wait on {}: {}", self.role, e);
                Some(None)
            }
        }
    }

    fn take_diagnostics(&mut self) -> Option<JoinHandle<String>> {
        self.diagnostics.take()
    }
}

impl Drop for ManagedProcess {
    fn drop(&mut self) {
        if let Some(task) = self.diagnostics.take() {
            task.abort();
        }
    }
}

/// Keeps the tail of a process' stderr, bounded to `MAX_DIAGNOSTIC_BYTES`.
async fn collect_diagnostics(mut stderr: ChildStderr) -> String {
    let mut kept: Vec<u8> = Vec::new();
    let mut buf = [0u8; 1024];
    loop {
        match stderr.read(&mut buf).await {
            Ok(0) | Err(_) => break,
            Ok(n) => {
                kept.extend_from_slice(&buf[..n]);
                if kept.len() > MAX_DIAGNOSTIC_BYTES {
                    let excess = kept.len() - MAX_DIAGNOSTIC_BYTES;
                    kept.drain(..excess);
                }
            }
        }
    }
    String::from_utf8_lossy(&kept).trim().to_string()
}

/// Waits for stderr to close, giving up once `DIAGNOSTICS_GRACE_MS` passes.
/// A grandchild that inherited stderr can keep it open long after the
/// process itself is gone.
async fn finish_diagnostics(task: Option<JoinHandle<String>>) -> String {
    let Some(mut task) = task else {
        return String::new();
    };
    match tokio::time::timeout(Duration::from_millis(DIAGNOSTICS_GRACE_MS), &mut task).await {
        Ok(diagnostics) => diagnostics.unwrap_or_default(),
        Err(_) => {
            task.abort();
            String::new()
        }
    }
}

/// Transcoder plus the optional resolver feeding it.
struct ProcessChain {
    transcoder: ManagedProcess,
    resolver: Option<ManagedProcess>,
}

/// Shared between the supervisor task and the [`PipelineHandle`].
type SharedChain = Arc<Mutex<ProcessChain>>;

struct ChainStatus {
    transcoder: Option<ExitStatus>,
    resolver: Option<ExitStatus>,
}

impl ProcessChain {
    fn kill(&mut self) {
        self.transcoder.start_kill();
        if let Some(resolver) = &mut self.resolver {
            resolver.start_kill();
        }
    }

    /// Reaps whatever has exited. Returns `None` until every process is gone.
    fn poll_exit(&mut self) -> Option<ChainStatus> {
        let transcoder = self.transcoder.try_status()?;
        let resolver = match &mut self.resolver {
            Some(resolver) => {
                // Nobody reads the resolver's output any more.
                if resolver.is_running() {
                    resolver.start_kill();
                }
                resolver.try_status()?
            }
            None => None,
        };
        Some(ChainStatus {
            transcoder,
            resolver,
        })
    }

    /// Whether the resolver ended on its own with a failure. Being killed
    /// after the transcoder finished is not a failure.
    fn resolver_failed(&self, status: Option<ExitStatus>) -> bool {
        let Some(resolver) = &self.resolver else {
            return false;
        };
        match status {
            Some(status) => !status.success() && !(resolver.killed && status.code().is_none()),
            None => !resolver.killed,
        }
    }
}

/// Waits until the whole chain has exited and folds it into one result.
///
/// The lock is only taken between polls, so the handle can kill the chain at
/// any point.
async fn wait_exit(chain: &SharedChain) -> PipelineExit {
    let status = loop {
        let polled = chain.lock().poll_exit();
        if let Some(status) = polled {
            break status;
        }
        tokio::time::sleep(Duration::from_millis(EXIT_POLL_INTERVAL_MS)).await;
    };

    let (transcoder_diag, resolver_diag, resolver_failed) = {
        let mut chain = chain.lock();
        let resolver_failed = chain.resolver_failed(status.resolver);
        (
            chain.transcoder.take_diagnostics(),
            chain.resolver.as_mut().and_then(ManagedProcess::take_diagnostics),
            resolver_failed,
        )
    };

    let success = status.transcoder.is_some_and(|s| s.success()) && !resolver_failed;
    let code = status.transcoder.and_then(|s| s.code());
    let mut diagnostics = finish_diagnostics(transcoder_diag).await;

    if resolver_failed {
        let resolver_diag = finish_diagnostics(resolver_diag).await;
        if !resolver_diag.is_empty() {
            diagnostics = if diagnostics.is_empty() {
                resolver_diag
            } else {
                format!("{resolver_diag}\n{diagnostics}")
            };
        }
    } else if let Some(task) = resolver_diag {
        task.abort();
    }

    if success {
        PipelineExit::Clean
    } else {
        PipelineExit::Failed { code, diagnostics }
    }
}

/// Spawns the configured resolver/transcoder tools.
pub struct ProcessSpawner {
    config: DecoderConfig,
    format: PcmFormat,
    classifier: LocatorClassifier,
}

impl ProcessSpawner {
    pub fn new(config: DecoderConfig, format: PcmFormat) -> Result<Self, regex::Error> {
        let classifier = LocatorClassifier::new(&config.resolve_patterns)?;
        Ok(Self {
            config,
            format,
            classifier,
        })
    }

    fn spawn_chain(&self, resource: &AudioResource) -> Result<ProcessChain, PipelineError> {
        let locator = resource.source();
        match self.classifier.classify(locator) {
            LocatorKind::Resolve => {
                let resolver_spec = command::resolver_command(&self.config.resolver, locator);
                let mut resolver =
                    ManagedProcess::spawn("resolver", &resolver_spec, Stdio::null(), Stdio::piped())?;

                let piped: Stdio = resolver
                    .take_stdout()?
                    .try_into()
                    .map_err(|e: std::io::Error| PipelineError::Pipe(e.to_string()))?;

                let transcoder_spec = command::transcoder_command(
                    &self.config.transcoder,
                    &self.format,
                    resource.stream_type(),
                    TranscoderInput::Stdin,
                );
                // On failure the resolver is dropped here and killed with it.
                let transcoder =
                    ManagedProcess::spawn("transcoder", &transcoder_spec, piped, Stdio::piped())?;

                Ok(ProcessChain {
                    transcoder,
                    resolver: Some(resolver),
                })
            }
            LocatorKind::Direct => {
                let spec = command::transcoder_command(
                    &self.config.transcoder,
                    &self.format,
                    resource.stream_type(),
                    TranscoderInput::Locator(locator),
                );
                let transcoder = ManagedProcess::spawn("transcoder", &spec, Stdio::null(), Stdio::piped())?;
                Ok(ProcessChain {
                    transcoder,
                    resolver: None,
                })
            }
        }
    }
}

impl PipelineSpawner for ProcessSpawner {
    fn spawn(
        &self,
        resource: &AudioResource,
        generation: u64,
        events: flume::Sender<PipelineEvent>,
    ) -> Result<PipelineHandle, PipelineError> {
        let mut chain = self.spawn_chain(resource)?;
        let stdout = chain.transcoder.take_stdout()?;
        let chain: SharedChain = Arc::new(Mutex::new(chain));
        let cancel = CancellationToken::new();

        let task = tokio::spawn(supervise(
            chain.clone(),
            stdout,
            generation,
            events,
            cancel.clone(),
            self.config.chunk_size,
        ));

        Ok(PipelineHandle::new(cancel, task).on_kill(move || chain.lock().kill()))
    }
}

/// Hands one event to the player, waiting while its queue is full.
/// Returns `false` once the pipeline should stop.
async fn deliver(
    events: &flume::Sender<PipelineEvent>,
    cancel: &CancellationToken,
    event: PipelineEvent,
) -> bool {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => false,
        sent = events.send_async(event) => sent.is_ok(),
    }
}

async fn supervise(
    chain: SharedChain,
    stdout: ChildStdout,
    generation: u64,
    events: flume::Sender<PipelineEvent>,
    cancel: CancellationToken,
    chunk_size: usize,
) {
    let mut reader = FramedRead::with_capacity(stdout, BytesCodec::new(), chunk_size);
    let mut produced: u64 = 0;

    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                chain.lock().kill();
                trace!("[pipeline {}] killed after {} bytes", generation, produced);
                return;
            }
            item = reader.next() => match item {
                Some(Ok(chunk)) => {
                    produced += chunk.len() as u64;
                    // While the player has no room this stalls, and the
                    // transcoder blocks on its stdout pipe.
                    let event = PipelineEvent::data(generation, chunk.freeze());
                    if !deliver(&events, &cancel, event).await {
                        chain.lock().kill();
                        trace!("[pipeline {}] abandoned after {} bytes", generation, produced);
                        return;
                    }
                }
                Some(Err(e)) => {
                    chain.lock().kill();
                    let event = PipelineEvent::error(generation, PipelineError::Io(e.to_string()));
                    deliver(&events, &cancel, event).await;
                    return;
                }
                None => break,
            }
        }
    }

    let exit = tokio::select! {
        biased;
        _ = cancel.cancelled() => {
            chain.lock().kill();
            return;
        }
        exit = wait_exit(&chain) => exit,
    };

    match &exit {
        PipelineExit::Clean => {
            debug!("[pipeline {}] completed cleanly ({} bytes)", generation, produced)
        }
        PipelineExit::Failed { code, diagnostics } => warn!(
            "[pipeline {}] exited with code {:?} after {} bytes: {}",
            generation, code, produced, diagnostics
        ),
    }

    deliver(&events, &cancel, PipelineEvent::closed(generation, exit)).await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::{pipeline::PipelineEventKind, resource::ResourceOptions};

    const FORMAT: PcmFormat = PcmFormat::new(48_000, 2, 20);

    /// `sh` as both tools: the resolver runs `script` and the transcoder is
    /// `cat`, so whatever the resolver prints comes out the other end.
    #[cfg(unix)]
    fn shell_chain(script: &str) -> ProcessSpawner {
        let mut config = DecoderConfig::default();
        config.resolver.path = "sh".into();
        config.resolver.args = vec!["-c".into(), script.into(), "{input}".into()];
        config.transcoder.path = "sh".into();
        config.transcoder.global_args = vec!["-c".into(), "cat".into()];
        config.transcoder.reconnect_args.clear();
        ProcessSpawner::new(config, FORMAT).unwrap()
    }

    #[cfg(unix)]
    fn shell_transcoder(script: &str) -> ProcessSpawner {
        let mut config = DecoderConfig::default();
        config.transcoder.path = "sh".into();
        config.transcoder.global_args = vec!["-c".into(), script.into()];
        config.transcoder.reconnect_args.clear();
        ProcessSpawner::new(config, FORMAT).unwrap()
    }

    /// Collects data until the pipeline reports its exit.
    #[cfg(unix)]
    async fn run_to_exit(rx: flume::Receiver<PipelineEvent>) -> (Vec<u8>, PipelineExit) {
        let mut bytes = Vec::new();
        loop {
            let event = rx.recv_async().await.unwrap();
            match event.kind {
                PipelineEventKind::Data(chunk) => bytes.extend_from_slice(&chunk),
                PipelineEventKind::Closed(exit) => return (bytes, exit),
                PipelineEventKind::Error(e) => panic!("unexpected error {e}"),
            }
        }
    }

    #[tokio::test]
    async fn missing_transcoder_is_a_spawn_error() {
        let mut config = DecoderConfig::default();
        config.transcoder.path = "/nonexistent/voxlink-transcoder".into();
        let spawner = ProcessSpawner::new(config, FORMAT).unwrap();
        let resource = AudioResource::from_locator("https://example.com/audio.raw").unwrap();
        let (tx, _rx) = flume::unbounded();

        match spawner.spawn(&resource, 1, tx) {
            Err(PipelineError::Spawn { tool, .. }) => {
                assert_eq!(tool, "/nonexistent/voxlink-transcoder")
            }
            other => panic!("expected spawn error, got {:?}", other.map(|_| ())),
        }
    }

    #[tokio::test]
    async fn missing_resolver_is_a_spawn_error() {
        let mut config = DecoderConfig::default();
        config.resolver.path = "/nonexistent/voxlink-resolver".into();
        let spawner = ProcessSpawner::new(config, FORMAT).unwrap();
        let resource = AudioResource::new("some search query", ResourceOptions::default()).unwrap();
        let (tx, _rx) = flume::unbounded();

        let err = spawner.spawn(&resource, 1, tx).err();
        assert!(matches!(err, Some(PipelineError::Spawn { ref tool, .. }) if tool == "/nonexistent/voxlink-resolver"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn forwards_stdout_then_reports_clean_exit() {
        // `sh -c` stands in for the transcoder; the generated arguments after
        // the script land in $0..$N and are ignored.
        let mut config = DecoderConfig::default();
        config.transcoder.path = "sh".into();
        config.transcoder.global_args = vec!["-c".into(), "printf 'abcd'".into()];
        config.transcoder.reconnect_args.clear();
        let spawner = ProcessSpawner::new(config, FORMAT).unwrap();
        let resource = AudioResource::from_locator("https://example.com/audio.raw").unwrap();
        let (tx, rx) = flume::unbounded();

        let _handle = spawner.spawn(&resource, 7, tx).unwrap();

        let mut bytes = Vec::new();
        loop {
            let event = rx.recv_async().await.unwrap();
            assert_eq!(event.generation, 7);
            match event.kind {
                PipelineEventKind::Data(chunk) => bytes.extend_from_slice(&chunk),
                PipelineEventKind::Closed(exit) => {
                    assert_eq!(exit, PipelineExit::Clean);
                    break;
                }
                PipelineEventKind::Error(e) => panic!("unexpected error {e}"),
            }
        }
        assert_eq!(bytes, b"abcd");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn non_zero_exit_carries_stderr() {
        let mut config = DecoderConfig::default();
        config.transcoder.path = "sh".into();
        config.transcoder.global_args =
            vec!["-c".into(), "echo 'Invalid data found' >&2; exit 3".into()];
        config.transcoder.reconnect_args.clear();
        let spawner = ProcessSpawner::new(config, FORMAT).unwrap();
        let resource = AudioResource::from_locator("https://example.com/broken").unwrap();
        let (tx, rx) = flume::unbounded();

        let _handle = spawner.spawn(&resource, 1, tx).unwrap();

        let event = rx.recv_async().await.unwrap();
        match event.kind {
            PipelineEventKind::Closed(PipelineExit::Failed { code, diagnostics }) => {
                assert_eq!(code, Some(3));
                assert_eq!(diagnostics, "Invalid data found");
            }
            other => panic!("unexpected event {other:?}"),
        }
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn resolver_output_is_piped_into_the_transcoder() {
        let spawner = shell_chain("printf abcd");
        let resource = AudioResource::new("some search query", ResourceOptions::default()).unwrap();
        let (tx, rx) = flume::unbounded();

        let _handle = spawner.spawn(&resource, 2, tx).unwrap();

        let (bytes, exit) = tokio::time::timeout(Duration::from_secs(10), run_to_exit(rx))
            .await
            .unwrap();
        assert_eq!(bytes, b"abcd");
        assert_eq!(exit, PipelineExit::Clean);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn failing_resolver_fails_the_pipeline_with_its_stderr() {
        let spawner = shell_chain("echo oops >&2; exit 2");
        let resource = AudioResource::new("some search query", ResourceOptions::default()).unwrap();
        let (tx, rx) = flume::unbounded();

        let _handle = spawner.spawn(&resource, 2, tx).unwrap();

        let (bytes, exit) = tokio::time::timeout(Duration::from_secs(10), run_to_exit(rx))
            .await
            .unwrap();
        assert!(bytes.is_empty());
        match exit {
            PipelineExit::Failed { diagnostics, .. } => assert!(diagnostics.contains("oops")),
            PipelineExit::Clean => panic!("resolver failure was swallowed"),
        }
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn kill_signals_processes_without_the_supervisor() {
        let spawner = shell_transcoder("exec sleep 30");
        let resource = AudioResource::from_locator("https://example.com/audio.raw").unwrap();
        let chain: SharedChain = Arc::new(Mutex::new(spawner.spawn_chain(&resource).unwrap()));

        // The supervising task does nothing, so only the hook can end the process.
        let handle = PipelineHandle::new(CancellationToken::new(), tokio::spawn(async {}))
            .on_kill({
                let chain = chain.clone();
                move || chain.lock().kill()
            });
        handle.kill();

        let exit = tokio::time::timeout(Duration::from_secs(5), wait_exit(&chain))
            .await
            .expect("killed transcoder should exit promptly");
        assert!(matches!(exit, PipelineExit::Failed { code: None, .. }));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn killed_pipeline_reports_nothing_further() {
        let spawner = shell_transcoder("exec sleep 30");
        let resource = AudioResource::from_locator("https://example.com/audio.raw").unwrap();
        let (tx, rx) = flume::unbounded();

        let handle = spawner.spawn(&resource, 4, tx).unwrap();
        handle.kill();
        assert!(handle.is_killed());

        // The sender goes away with the supervisor, without a Closed event.
        let next = tokio::time::timeout(Duration::from_secs(5), rx.recv_async())
            .await
            .expect("supervisor should exit after kill");
        assert!(next.is_err());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn full_event_queue_stalls_the_reader() {
        // 64 KiB of output against a queue of two events of at most 1 KiB.
        let mut config = DecoderConfig::default();
        config.chunk_size = 1_024;
        config.transcoder.path = "sh".into();
        config.transcoder.global_args = vec!["-c".into(), "head -c 65536 /dev/zero".into()];
        config.transcoder.reconnect_args.clear();
        let spawner = ProcessSpawner::new(config, FORMAT).unwrap();
        let resource = AudioResource::from_locator("https://example.com/audio.raw").unwrap();
        let (tx, rx) = flume::bounded(2);

        let _handle = spawner.spawn(&resource, 1, tx).unwrap();
        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(rx.len(), 2);

        let (bytes, exit) = tokio::time::timeout(Duration::from_secs(10), run_to_exit(rx))
            .await
            .unwrap();
        assert_eq!(bytes.len(), 65_536);
        assert_eq!(exit, PipelineExit::Clean);
    }
}
