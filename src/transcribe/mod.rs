// Supervised transcriber runs
//
// - Profile: per-architecture table of supported output formats and flags
// - Args: command line assembly for the configured port
// - Job/Run: spawning, output forwarding, cancellation and exit interpretation
//
// A new transcriber port only needs an entry in `ARCH_PROFILES`; argument
// assembly reads the table and never branches on the architecture itself.

pub mod args;
pub mod profile;

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

pub use args::*;
pub use profile::*;

use crate::config::Architecture;
use crate::error::{Result, TtError};
use crate::events::{Event, EventSink};
use crate::models::models_dir_for;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Running,
    Cancelling,
    Completed,
    Failed,
}

/// How a run ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    /// The process exited on its own with an exit code
    Completed { code: i32 },
    /// A cancel was requested before the process went away
    Cancelled,
    /// The process was killed from outside, no exit code
    Aborted,
}

impl RunOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Completed { code: 0 })
    }

    fn from_exit(code: Option<i32>, cancelling: bool) -> Self {
        if cancelling {
            return Self::Cancelled;
        }
        match code {
            Some(code) => Self::Completed { code },
            None => Self::Aborted,
        }
    }
}

/// Starts transcriber processes for one configured executable
pub struct TranscriptionJob {
    executable: Option<PathBuf>,
    architecture: Architecture,
    events: Arc<dyn EventSink>,
}

impl TranscriptionJob {
    pub fn new(
        executable: Option<PathBuf>,
        architecture: Architecture,
        events: Arc<dyn EventSink>,
    ) -> Self {
        Self {
            executable,
            architecture,
            events,
        }
    }

    pub fn profile(&self) -> &'static ArchProfile {
        profile_for(self.architecture)
    }

    /// Validate the inputs and assemble the command line without spawning
    pub fn prepare(&self, input: &Path, options: &TranscriptionOptions) -> Result<TranscriberCommand> {
        let executable = match &self.executable {
            Some(path) => path,
            None => {
                return Err(self.reject(TtError::Config(
                    "Whisper CLI path is not configured. Maintain it in the configuration".to_string(),
                )));
            }
        };
        if !executable.exists() {
            return Err(self.reject(TtError::FileNotFound(format!(
                "Whisper CLI {} doesn't exist",
                executable.display()
            ))));
        }
        if !input.exists() {
            return Err(self.reject(TtError::FileNotFound(format!(
                "Input file {} doesn't exist",
                input.display()
            ))));
        }

        let profile = self.profile();
        if !profile.supports(options.format) {
            return Err(self.reject(TtError::UnsupportedFormat(format!(
                "Output format {} is not available for {}",
                options.format, self.architecture
            ))));
        }

        // The child runs in the executable's directory, relative paths would break
        let executable = std::path::absolute(executable)?;
        let input = std::path::absolute(input)?;
        let models_dir = models_dir_for(&executable);

        Ok(build_command(&executable, &models_dir, &input, options, profile))
    }

    /// Spawn the transcriber. Returns once the process is running.
    pub fn start(&self, input: &Path, options: &TranscriptionOptions) -> Result<TranscriptionRun> {
        let cmd = self.prepare(input, options)?;
        let working_dir = cmd
            .program
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_default();
        let argv = cmd.argv();

        info!("Whisper args: {}", argv.join(" "));
        debug!("Working directory: {}", working_dir.display());

        let mut child = Command::new(&cmd.program)
            .args(&cmd.args)
            .current_dir(&working_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                self.reject(TtError::Transcriber(format!("Failed to start Whisper: {}", e)))
            })?;

        self.events.emit(Event::TranscriptionStarted { argv: argv.clone() });
        self.events.emit(Event::Status(format!(
            "Transcribing {}...",
            input.file_name().unwrap_or_default().to_string_lossy()
        )));

        let mut readers = Vec::new();
        if let Some(stdout) = child.stdout.take() {
            readers.push(forward_lines(stdout, "stdout", self.events.clone()));
        }
        if let Some(stderr) = child.stderr.take() {
            readers.push(forward_lines(stderr, "stderr", self.events.clone()));
        }

        let state = Arc::new(Mutex::new(RunState::Running));
        let cancelling = Arc::new(AtomicBool::new(false));
        let (cancel_tx, mut cancel_rx) = mpsc::unbounded_channel::<()>();

        let events = self.events.clone();
        let task_state = state.clone();
        let task_cancelling = cancelling.clone();

        let handle = tokio::spawn(async move {
            let status = tokio::select! {
                status = child.wait() => status,
                Some(()) = cancel_rx.recv() => {
                    if let Err(e) = child.start_kill() {
                        warn!("Failed to kill Whisper process: {}", e);
                    }
                    child.wait().await
                }
            };

            for reader in readers {
                let _ = reader.await;
            }

            let status = match status {
                Ok(status) => status,
                Err(e) => {
                    error!("Waiting for Whisper failed: {}", e);
                    set_state(&task_state, RunState::Failed);
                    return Err(TtError::Transcriber(format!("Waiting for Whisper failed: {}", e)));
                }
            };

            let outcome =
                RunOutcome::from_exit(status.code(), task_cancelling.load(Ordering::SeqCst));
            let message = match outcome {
                RunOutcome::Completed { code } => {
                    info!("Transcribe completed. Child exited with code {}", code);
                    "Transcribe completed.".to_string()
                }
                RunOutcome::Cancelled => {
                    info!("Transcribe cancelled.");
                    "Transcribe cancelled.".to_string()
                }
                RunOutcome::Aborted => {
                    warn!("Transcribe aborted.");
                    "Transcribe aborted.".to_string()
                }
            };

            set_state(
                &task_state,
                if matches!(outcome, RunOutcome::Completed { .. }) {
                    RunState::Completed
                } else {
                    RunState::Failed
                },
            );
            events.emit(Event::Status(message));
            events.emit(Event::TranscriptionFinished(outcome));
            Ok(outcome)
        });

        Ok(TranscriptionRun {
            argv,
            input: input.to_path_buf(),
            format: options.format,
            output_base: cmd.output_base,
            working_dir,
            state,
            cancelling,
            cancel_tx,
            events: self.events.clone(),
            handle,
            outcome: None,
        })
    }

    fn reject(&self, err: TtError) -> TtError {
        error!("{}", err);
        self.events.emit(Event::Status(err.to_string()));
        err
    }
}

fn set_state(state: &Mutex<RunState>, next: RunState) {
    *state.lock().unwrap_or_else(|e| e.into_inner()) = next;
}

fn forward_lines<R>(stream: R, name: &'static str, events: Arc<dyn EventSink>) -> JoinHandle<()>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut lines = BufReader::new(stream).lines();
        loop {
            match lines.next_line().await {
                Ok(Some(line)) => {
                    info!("[whisper {}] {}", name, line);
                    events.emit(Event::ProcessOutput { line });
                }
                Ok(None) => break,
                Err(e) => {
                    warn!("Reading Whisper {} failed: {}", name, e);
                    break;
                }
            }
        }
    })
}

/// A running (or finished) transcriber process
pub struct TranscriptionRun {
    argv: Vec<String>,
    input: PathBuf,
    format: OutputFormat,
    output_base: Option<PathBuf>,
    working_dir: PathBuf,
    state: Arc<Mutex<RunState>>,
    cancelling: Arc<AtomicBool>,
    cancel_tx: mpsc::UnboundedSender<()>,
    events: Arc<dyn EventSink>,
    handle: JoinHandle<Result<RunOutcome>>,
    outcome: Option<RunOutcome>,
}

impl TranscriptionRun {
    pub fn argv(&self) -> &[String] {
        &self.argv
    }

    pub fn working_dir(&self) -> &Path {
        &self.working_dir
    }

    pub fn state(&self) -> RunState {
        *self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn is_finished(&self) -> bool {
        self.outcome.is_some() || self.handle.is_finished()
    }

    /// Ask the process to terminate. Does not wait for it to exit.
    pub fn cancel(&self) {
        self.cancel_handle().cancel();
    }

    /// Handle that can cancel the run while another task waits on it
    pub fn cancel_handle(&self) -> CancelHandle {
        CancelHandle {
            state: self.state.clone(),
            cancelling: self.cancelling.clone(),
            cancel_tx: self.cancel_tx.clone(),
            events: self.events.clone(),
        }
    }

    /// Wait for the process to exit. Later calls return the same outcome.
    pub async fn wait(&mut self) -> Result<RunOutcome> {
        if let Some(outcome) = self.outcome {
            return Ok(outcome);
        }
        let outcome = (&mut self.handle)
            .await
            .map_err(|e| TtError::Transcriber(format!("Transcription task failed: {}", e)))??;
        self.outcome = Some(outcome);
        Ok(outcome)
    }

    pub fn outcome(&self) -> Option<RunOutcome> {
        self.outcome
    }

    /// Places the transcript may have been written to, most likely first
    pub fn transcript_candidates(&self) -> Vec<PathBuf> {
        transcript_candidates(&self.input, self.format, self.output_base.as_deref())
    }

    /// First transcript that exists on disk
    pub fn transcript(&self) -> Option<PathBuf> {
        self.transcript_candidates().into_iter().find(|path| path.exists())
    }

    /// The transcript, if its format can go through the translation pipeline
    pub fn translatable_transcript(&self) -> Option<PathBuf> {
        if !self.format.is_translatable() {
            return None;
        }
        self.transcript()
    }
}

#[derive(Clone)]
pub struct CancelHandle {
    state: Arc<Mutex<RunState>>,
    cancelling: Arc<AtomicBool>,
    cancel_tx: mpsc::UnboundedSender<()>,
    events: Arc<dyn EventSink>,
}

impl CancelHandle {
    /// Kill the process unless it already ended or is being cancelled
    pub fn cancel(&self) {
        {
            let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
            if *state != RunState::Running {
                return;
            }
            *state = RunState::Cancelling;
            self.cancelling.store(true, Ordering::SeqCst);
        }

        let msg = "Killing Whisper process...";
        info!("{}", msg);
        self.events.emit(Event::Status(msg.to_string()));
        let _ = self.cancel_tx.send(());
    }
}

/// `<base>.<ext>` when the port was given `--output-file`, else `<dir>/<stem>.<ext>`
/// followed by the `<input>.<ext>` the executable picks on its own
pub fn transcript_candidates(
    input: &Path,
    format: OutputFormat,
    output_base: Option<&Path>,
) -> Vec<PathBuf> {
    let with_ext = |base: &Path| {
        let mut name = base.as_os_str().to_os_string();
        name.push(".");
        name.push(format.extension());
        PathBuf::from(name)
    };

    match output_base {
        Some(base) => vec![with_ext(base)],
        None => vec![with_ext(&output_base_for(input)), with_ext(input)],
    }
}
