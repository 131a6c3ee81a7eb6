//! Conversion orchestration.
//!
//! One invocation launches one child process and yields a lazy, single-pass
//! stream of [`ProgressEvent`]s that always ends with exactly one terminal
//! event. State lives in [`ConversionMachine`]; the producer task only feeds
//! it transitions (parsed lines, process exit, launch failure, timeout) and
//! forwards whatever events come out.

use std::path::PathBuf;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;

use futures_util::{Stream, StreamExt};
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Child;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, trace, warn};

use openvac_models::{ConversionSettings, JobId, ProgressEvent};

use crate::command::{ToolCommand, ToolConfig};
use crate::error::{MediaError, MediaResult};
use crate::scanner::{split_lines, LineScanner, MarkerScanner, ScannedLine};

/// Events buffered between the producer and its consumer.
const EVENT_BUFFER_SIZE: usize = 16;

/// Stderr lines kept for the failure log.
const STDERR_TAIL_LINES: usize = 20;

/// How long to wait for the stderr reader after the process exits.
const STDERR_DRAIN_TIMEOUT: Duration = Duration::from_secs(1);

/// Message used when the producer vanished without a terminal event.
const UNEXPECTED_END_MESSAGE: &str = "conversion ended unexpectedly";

/// Callback run by the producer when the conversion reaches its outcome.
///
/// Runs even when nobody is reading the stream anymore.
#[derive(Clone)]
pub struct CompletionHook(Arc<dyn Fn(&ConversionOutcome) + Send + Sync>);

impl std::fmt::Debug for CompletionHook {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("CompletionHook")
    }
}

/// A single conversion invocation.
#[derive(Debug, Clone)]
pub struct ConversionRequest {
    /// Job the events belong to
    pub job_id: JobId,
    /// Source video
    pub input: PathBuf,
    /// Directory receiving the frame files
    pub output_dir: PathBuf,
    /// Conversion settings
    pub settings: ConversionSettings,
    /// Ask the tool for one subdirectory per tier
    pub tiered: bool,
    /// Overall wall-clock ceiling
    pub timeout: Option<Duration>,
    /// Kill the tool when the consumer drops the stream
    pub cancel_on_disconnect: bool,
    /// Called once with the outcome
    pub on_complete: Option<CompletionHook>,
}

impl ConversionRequest {
    pub fn new(
        job_id: JobId,
        input: impl Into<PathBuf>,
        output_dir: impl Into<PathBuf>,
        settings: ConversionSettings,
    ) -> Self {
        Self {
            job_id,
            input: input.into(),
            output_dir: output_dir.into(),
            settings,
            tiered: false,
            timeout: None,
            cancel_on_disconnect: false,
            on_complete: None,
        }
    }

    pub fn tiered(mut self, tiered: bool) -> Self {
        self.tiered = tiered;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn cancel_on_disconnect(mut self, cancel: bool) -> Self {
        self.cancel_on_disconnect = cancel;
        self
    }

    pub fn on_complete<F>(mut self, hook: F) -> Self
    where
        F: Fn(&ConversionOutcome) + Send + Sync + 'static,
    {
        self.on_complete = Some(CompletionHook(Arc::new(hook)));
        self
    }
}

/// Producer state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MachineState {
    /// Tool running; `total` is the last frame total it announced
    Running { total: Option<u64>, last_current: u64 },
    /// Tool exited with status 0
    Succeeded,
    /// Tool failed, could not start, or timed out
    Failed,
}

/// Inputs driving the state machine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Transition {
    /// A stdout line was classified
    Line(ScannedLine),
    /// The process exited (`None` when killed by a signal)
    Exited(Option<i32>),
    /// The process could not be launched (or could no longer be awaited)
    LaunchFailed(String),
    /// The wall-clock ceiling (seconds) was reached
    TimedOut(u64),
}

/// Explicit finite-state producer for a job's progress events.
#[derive(Debug, Clone)]
pub struct ConversionMachine {
    job_id: JobId,
    state: MachineState,
}

impl ConversionMachine {
    pub fn new(job_id: JobId) -> Self {
        Self {
            job_id,
            state: MachineState::Running {
                total: None,
                last_current: 0,
            },
        }
    }

    pub fn state(&self) -> MachineState {
        self.state
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self.state, MachineState::Running { .. })
    }

    /// Apply a transition, returning the event it produces (if any).
    ///
    /// Nothing is produced once a terminal state is reached. Progress lines
    /// whose frame number goes backwards are dropped so `current` never
    /// decreases.
    pub fn apply(&mut self, transition: Transition) -> Option<ProgressEvent> {
        let MachineState::Running {
            total,
            last_current,
        } = &mut self.state
        else {
            return None;
        };

        match transition {
            Transition::Line(ScannedLine::Extracting { total: extracted }) => {
                *total = Some(extracted);
                Some(ProgressEvent::extracting(extracted))
            }
            Transition::Line(ScannedLine::Progress {
                current,
                total: announced,
            }) => {
                *total = Some(announced);
                if current < *last_current {
                    return None;
                }
                *last_current = current;
                Some(ProgressEvent::progress(current, announced))
            }
            Transition::Line(ScannedLine::Unrecognized) => None,
            Transition::Exited(Some(0)) => {
                let frame_count = total.unwrap_or(0);
                self.state = MachineState::Succeeded;
                Some(ProgressEvent::done(self.job_id.clone(), frame_count))
            }
            Transition::Exited(Some(code)) => {
                self.state = MachineState::Failed;
                Some(ProgressEvent::error(format!(
                    "conversion tool exited with code {}",
                    code
                )))
            }
            Transition::Exited(None) => {
                self.state = MachineState::Failed;
                Some(ProgressEvent::error("conversion tool terminated by signal"))
            }
            Transition::LaunchFailed(message) => {
                self.state = MachineState::Failed;
                Some(ProgressEvent::error(message))
            }
            Transition::TimedOut(secs) => {
                self.state = MachineState::Failed;
                Some(ProgressEvent::error(format!(
                    "conversion timed out after {} seconds",
                    secs
                )))
            }
        }
    }
}

/// Final result of a conversion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConversionOutcome {
    Succeeded { frame_count: u64 },
    Failed { message: String },
}

impl ConversionOutcome {
    /// Outcome carried by a terminal event.
    pub fn from_terminal(event: &ProgressEvent) -> Option<Self> {
        match event {
            ProgressEvent::Done { frame_count, .. } => Some(ConversionOutcome::Succeeded {
                frame_count: *frame_count,
            }),
            ProgressEvent::Error { message } => Some(ConversionOutcome::Failed {
                message: message.clone(),
            }),
            _ => None,
        }
    }

    /// Convert into a `Result`, mapping failure to [`MediaError::ConversionFailed`].
    pub fn into_result(self) -> MediaResult<u64> {
        match self {
            ConversionOutcome::Succeeded { frame_count } => Ok(frame_count),
            ConversionOutcome::Failed { message } => Err(MediaError::ConversionFailed(message)),
        }
    }
}

/// Single-pass stream of a conversion's progress events.
///
/// Ends right after the terminal event. If the producer disappears without
/// one, a synthetic error event is yielded so consumers never wait forever.
#[derive(Debug)]
pub struct ConversionStream {
    rx: mpsc::Receiver<ProgressEvent>,
    finished: bool,
}

impl ConversionStream {
    fn new(rx: mpsc::Receiver<ProgressEvent>) -> Self {
        Self {
            rx,
            finished: false,
        }
    }

    /// Drain the stream and return how the conversion ended.
    pub async fn outcome(mut self) -> ConversionOutcome {
        while let Some(event) = self.next().await {
            if let Some(outcome) = ConversionOutcome::from_terminal(&event) {
                return outcome;
            }
        }
        ConversionOutcome::Failed {
            message: UNEXPECTED_END_MESSAGE.to_string(),
        }
    }
}

impl Stream for ConversionStream {
    type Item = ProgressEvent;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        if self.finished {
            return Poll::Ready(None);
        }
        match self.rx.poll_recv(cx) {
            Poll::Ready(Some(event)) => {
                if event.is_terminal() {
                    self.finished = true;
                    self.rx.close();
                }
                Poll::Ready(Some(event))
            }
            Poll::Ready(None) => {
                self.finished = true;
                Poll::Ready(Some(ProgressEvent::error(UNEXPECTED_END_MESSAGE)))
            }
            Poll::Pending => Poll::Pending,
        }
    }
}

/// Launches the conversion tool and translates its output into events.
#[derive(Clone)]
pub struct ConversionOrchestrator {
    tool: ToolConfig,
    scanner: Arc<dyn LineScanner>,
}

impl std::fmt::Debug for ConversionOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConversionOrchestrator")
            .field("tool", &self.tool)
            .finish_non_exhaustive()
    }
}

impl ConversionOrchestrator {
    /// Create an orchestrator using the stock output markers.
    pub fn new(tool: ToolConfig) -> Self {
        Self {
            tool,
            scanner: Arc::new(MarkerScanner),
        }
    }

    /// Replace the output scanner.
    pub fn with_scanner(mut self, scanner: Arc<dyn LineScanner>) -> Self {
        self.scanner = scanner;
        self
    }

    /// Tool launch configuration.
    pub fn tool(&self) -> &ToolConfig {
        &self.tool
    }

    /// Start a conversion and return its event stream.
    ///
    /// Must be called within a Tokio runtime.
    pub fn start(&self, request: ConversionRequest) -> ConversionStream {
        let (tx, rx) = mpsc::channel(EVENT_BUFFER_SIZE);
        let producer = Producer {
            tool: self.tool.clone(),
            scanner: Arc::clone(&self.scanner),
            sink: EventSink::new(tx, request.job_id.clone()),
            machine: ConversionMachine::new(request.job_id.clone()),
            request,
        };
        tokio::spawn(producer.run());
        ConversionStream::new(rx)
    }

    /// Run a conversion and wait for its outcome.
    pub async fn run_to_completion(&self, request: ConversionRequest) -> ConversionOutcome {
        self.start(request).outcome().await
    }
}

/// Sending half that stops writing once the consumer is gone.
struct EventSink {
    tx: mpsc::Sender<ProgressEvent>,
    job_id: JobId,
    detached: bool,
}

impl EventSink {
    fn new(tx: mpsc::Sender<ProgressEvent>, job_id: JobId) -> Self {
        Self {
            tx,
            job_id,
            detached: false,
        }
    }

    async fn send(&mut self, event: ProgressEvent) {
        if self.detached {
            return;
        }
        if self.tx.send(event).await.is_err() {
            self.detached = true;
            info!(job_id = %self.job_id, "Progress consumer disconnected");
        }
    }
}

struct Producer {
    tool: ToolConfig,
    scanner: Arc<dyn LineScanner>,
    sink: EventSink,
    machine: ConversionMachine,
    request: ConversionRequest,
}

impl Producer {
    async fn run(mut self) {
        let job_id = self.request.job_id.clone();
        let mut command = ToolCommand::new(
            &self.request.input,
            &self.request.output_dir,
            self.request.settings,
        )
        .tiered(self.request.tiered)
        .to_command(&self.tool);
        command.kill_on_drop(true);

        debug!(job_id = %job_id, program = %self.tool.program.display(), "Launching conversion tool");

        let mut child = match command.spawn() {
            Ok(child) => child,
            Err(e) => {
                warn!(job_id = %job_id, "Failed to launch conversion tool: {}", e);
                self.emit(Transition::LaunchFailed(e.to_string())).await;
                return;
            }
        };

        let stderr_task = child.stderr.take().map(|stderr| {
            let job_id = job_id.clone();
            tokio::spawn(collect_stderr(stderr, job_id))
        });

        self.supervise(&mut child).await;

        let stderr_tail = match stderr_task {
            Some(task) => drain_stderr(task).await,
            None => Vec::new(),
        };

        match self.machine.state() {
            MachineState::Succeeded => info!(job_id = %job_id, "Conversion finished"),
            MachineState::Failed if !stderr_tail.is_empty() => warn!(
                job_id = %job_id,
                stderr = %stderr_tail.join("\n"),
                "Conversion failed"
            ),
            MachineState::Failed => warn!(job_id = %job_id, "Conversion failed"),
            MachineState::Running { .. } => {
                debug!(job_id = %job_id, "Conversion abandoned by its consumer")
            }
        }
    }

    async fn supervise(&mut self, child: &mut Child) {
        let Some(stdout) = child.stdout.take() else {
            let _ = child.start_kill();
            self.emit(Transition::LaunchFailed("stdout not captured".to_string()))
                .await;
            return;
        };

        let deadline = self.request.timeout.map(|t| Instant::now() + t);
        let mut reader = BufReader::new(stdout);
        let mut buf = Vec::new();
        let mut stdout_open = true;

        loop {
            if self.request.cancel_on_disconnect && self.sink.detached {
                info!(job_id = %self.request.job_id, "Consumer gone, killing conversion tool");
                let _ = child.kill().await;
                return;
            }
            let watch_consumer = self.request.cancel_on_disconnect;

            tokio::select! {
                _ = deadline_elapsed(deadline) => {
                    let secs = self.request.timeout.map(|t| t.as_secs()).unwrap_or_default();
                    warn!(job_id = %self.request.job_id, "Conversion timed out after {} seconds, killing tool", secs);
                    let _ = child.kill().await;
                    self.emit(Transition::TimedOut(secs)).await;
                    return;
                }
                _ = self.sink.tx.closed(), if watch_consumer => {
                    self.sink.detached = true;
                }
                // read_until keeps partial bytes in `buf` if another branch wins
                read = reader.read_until(b'\n', &mut buf), if stdout_open => {
                    match read {
                        Ok(0) => stdout_open = false,
                        Ok(_) => {
                            let chunk = std::mem::take(&mut buf);
                            for line in split_lines(&chunk) {
                                let scanned = self.scanner.scan(&line);
                                if scanned == ScannedLine::Unrecognized {
                                    trace!(job_id = %self.request.job_id, "tool: {}", line);
                                }
                                self.emit(Transition::Line(scanned)).await;
                            }
                        }
                        Err(e) => {
                            warn!(job_id = %self.request.job_id, "Failed to read tool output: {}", e);
                            stdout_open = false;
                        }
                    }
                }
                status = child.wait(), if !stdout_open => {
                    let transition = match status {
                        Ok(status) => Transition::Exited(status.code()),
                        Err(e) => Transition::LaunchFailed(e.to_string()),
                    };
                    self.emit(transition).await;
                    return;
                }
            }
        }
    }

    async fn emit(&mut self, transition: Transition) {
        if let Some(event) = self.machine.apply(transition) {
            if let Some(hook) = &self.request.on_complete {
                if let Some(outcome) = ConversionOutcome::from_terminal(&event) {
                    (hook.0)(&outcome);
                }
            }
            self.sink.send(event).await;
        }
    }
}

async fn deadline_elapsed(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

async fn collect_stderr<R>(stderr: R, job_id: JobId) -> Vec<String>
where
    R: AsyncRead + Unpin,
{
    let mut reader = BufReader::new(stderr);
    let mut tail = Vec::new();
    let mut buf = Vec::new();

    while let Ok(n) = reader.read_until(b'\n', &mut buf).await {
        if n == 0 {
            break;
        }
        for line in split_lines(&buf) {
            debug!(job_id = %job_id, "tool stderr: {}", line);
            if tail.len() == STDERR_TAIL_LINES {
                tail.remove(0);
            }
            tail.push(line);
        }
        buf.clear();
    }
    tail
}

async fn drain_stderr(task: JoinHandle<Vec<String>>) -> Vec<String> {
    match tokio::time::timeout(STDERR_DRAIN_TIMEOUT, task).await {
        Ok(Ok(tail)) => tail,
        _ => Vec::new(),
    }
}
