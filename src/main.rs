//! tt-tool - Transcribe and Translate
//!
//! Command-line front-end: drives whisper.cpp transcriptions, model
//! downloads and DeepL subtitle translation, and renders the events the
//! core reports.

use anyhow::Result;
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::mpsc::UnboundedReceiver;
use tokio::task::JoinHandle;
use tracing::{Level, info, warn};
use tracing_appender::{non_blocking, rolling};
use tracing_subscriber::{EnvFilter, Layer, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use tt_tool::cli::{Args, Commands, ConfigAction};
use tt_tool::config::{ConfigKey, ConfigStore, DEFAULT_CONFIG_FILE, HostPlatform, JsonConfigStore};
use tt_tool::events::{ChannelSink, Event};
use tt_tool::models::HttpModelHost;
use tt_tool::transcribe::{OutputFormat, RunOutcome, TranscriptionOptions};
use tt_tool::translate::DeeplClient;
use tt_tool::workflow::Workflow;

#[tokio::main]
async fn main() -> Result<()> {
    // Parse command line arguments
    let args = Args::parse();

    // Setup logging to both console and file
    setup_logging(args.verbose)?;
    info!("Starting tt-tool - Transcribe and Translate");

    let config_path = args
        .config
        .clone()
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILE));
    let mut store = JsonConfigStore::load(&config_path, &HostPlatform::current())?;

    if let Commands::Config { action } = &args.command {
        return run_config(&mut store, action);
    }

    let (tx, rx) = tokio::sync::mpsc::unbounded_channel();
    let renderer = spawn_renderer(rx);

    let mut workflow = Workflow::new(
        Box::new(store),
        Arc::new(ChannelSink::new(tx)),
        Arc::new(HttpModelHost::new()?),
        Arc::new(DeeplClient::new()?),
    );

    let result = run_command(&mut workflow, args.command).await;

    // Dropping the workflow closes the event channel and lets the renderer finish
    drop(workflow);
    if let Err(e) = renderer.await {
        warn!("Event renderer failed: {}", e);
    }

    result
}

async fn run_command(workflow: &mut Workflow, command: Commands) -> Result<()> {
    match command {
        Commands::Models { download } => {
            let models = workflow.model_status()?;

            println!("\nAvailable Whisper Models ({}):", workflow.architecture());
            println!("{:<12} {:<34} {:<10} {:<10}", "Name", "Filename", "Size (MB)", "Status");
            println!("{}", "-".repeat(68));
            for model in &models {
                println!(
                    "{:<12} {:<34} {:<10.0} {:<10}",
                    model.entry.name,
                    format!("ggml-{}.bin", model.entry.name),
                    model.entry.size_mb,
                    if model.present { "Downloaded" } else { "Missing" }
                );
            }

            if download {
                info!("Downloading all missing models...");
                let mut failed = Vec::new();
                for model in models.iter().filter(|m| !m.present) {
                    if workflow.select_model(model.entry.name).await.is_err() {
                        failed.push(model.entry.name);
                    }
                }
                if !failed.is_empty() {
                    anyhow::bail!("Failed to download: {}", failed.join(", "));
                }
                info!("All models downloaded successfully");
            }
        }
        Commands::Fetch { model } => {
            let selected = workflow.select_model(&model).await?;
            println!("Model {} is ready", selected);
        }
        Commands::Transcribe {
            input,
            language,
            model,
            format,
            max_len,
            processors,
            threads,
            duration,
            diarize,
            custom,
            translate_to,
        } => {
            if let Some(language) = &language {
                workflow.set_transcription_language(language)?;
            }
            let model = model.unwrap_or_else(|| workflow.selected_model().to_string());
            workflow.select_model(&model).await?;

            let cpus = num_cpus::get() as u32;
            if threads > cpus {
                warn!("{} threads requested, {} CPUs available", threads, cpus);
            }

            let options = TranscriptionOptions {
                format: format.parse::<OutputFormat>()?,
                max_len,
                processors,
                threads,
                duration_ms: duration,
                diarize,
                custom: custom.unwrap_or_default(),
                ..TranscriptionOptions::default()
            };
            workflow.start_transcription(&input, options)?;

            // Ctrl-C cancels the run; the outcome is then reported as cancelled
            let ctrl_c = workflow.cancel_handle().map(|handle| {
                tokio::spawn(async move {
                    if tokio::signal::ctrl_c().await.is_ok() {
                        handle.cancel();
                    }
                })
            });

            let outcome = workflow.wait_transcription().await;
            if let Some(task) = ctrl_c {
                // It holds an event sender; the renderer only stops once all are gone
                task.abort();
            }
            match outcome? {
                RunOutcome::Completed { code: 0 } => {}
                RunOutcome::Completed { code } => anyhow::bail!("Whisper exited with code {}", code),
                RunOutcome::Cancelled => anyhow::bail!("Transcription cancelled"),
                RunOutcome::Aborted => anyhow::bail!("Transcription aborted"),
            }

            if let Some(target) = translate_to {
                match workflow.transcript_for_translation() {
                    Some(transcript) => {
                        // SIGINT stays with tokio once it was listened for, so watch it here too
                        let output = until_interrupted(
                            workflow.translate(&transcript, None, Some(&target)),
                            tokio::signal::ctrl_c(),
                        )
                        .await?;
                        println!("{}", output.display());
                    }
                    None => anyhow::bail!(
                        "No srt or vtt transcript found for {}; only those can be translated",
                        input.display()
                    ),
                }
            }
        }
        Commands::Translate { input, source, target } => {
            let output = workflow
                .translate(&input, source.as_deref(), target.as_deref())
                .await?;
            println!("{}", output.display());
        }
        Commands::Usage => {
            if workflow.check_usage().await.is_none() {
                anyhow::bail!("DeepL usage is not available");
            }
        }
        Commands::Config { .. } => {}
    }

    Ok(())
}

/// Run `work` unless `interrupt` completes first. The dropped work cleans up after itself.
async fn until_interrupted<T, E, I>(
    work: impl Future<Output = std::result::Result<T, E>>,
    interrupt: impl Future<Output = I>,
) -> Result<T>
where
    E: Into<anyhow::Error>,
{
    tokio::select! {
        result = work => result.map_err(Into::into),
        _ = interrupt => anyhow::bail!("Interrupted"),
    }
}

fn run_config(store: &mut JsonConfigStore, action: &ConfigAction) -> Result<()> {
    match action {
        ConfigAction::Show => {
            let config = store.snapshot();
            let key = if config.translation_api_key.is_empty() { "(not set)" } else { "(set)" };
            println!("Configuration file: {}", store.path().display());
            println!("Whisper CLI path:   {}", config.transcriber_executable_path);
            println!("Architecture:       {}", config.architecture);
            println!("DeepL API key:      {}", key);
            println!(
                "Translation:        {} -> {}",
                config.last_used_source_language, config.last_used_target_language
            );
            println!("Transcription:      {}", config.last_used_transcription_language);
            return Ok(());
        }
        ConfigAction::SetPath { path } => {
            let path = absolute_or_given(path);
            store.set(ConfigKey::TranscriberExecutablePath, &path.to_string_lossy())?;
        }
        ConfigAction::SetArch { arch } => {
            store.set(ConfigKey::TranscriberArchitectureTag, arch)?;
        }
        ConfigAction::SetKey { key } => {
            store.set(ConfigKey::TranslationApiKey, key)?;
        }
    }

    store.save_checked()?;
    println!("Configuration saved");
    Ok(())
}

fn absolute_or_given(path: &Path) -> PathBuf {
    std::path::absolute(path).unwrap_or_else(|_| path.to_path_buf())
}

/// Print status lines and show a progress bar for downloads
fn spawn_renderer(mut rx: UnboundedReceiver<Event>) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut bar: Option<ProgressBar> = None;

        while let Some(event) = rx.recv().await {
            match event {
                Event::Status(message) => match &bar {
                    Some(pb) => pb.println(message),
                    None => println!("{}", message),
                },
                Event::DownloadStarted { artifact, url, size_bytes } => {
                    let pb = ProgressBar::new(size_bytes.unwrap_or(100));
                    let style = ProgressStyle::default_bar()
                        .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {bytes}/{total_bytes} ({eta}) {msg}")
                        .map(|style| style.progress_chars("#>-"))
                        .unwrap_or_else(|_| ProgressStyle::default_bar());
                    pb.set_style(style);
                    pb.set_message(format!("{} {}", artifact.label(), url.rsplit('/').next().unwrap_or_default()));
                    bar = Some(pb);
                }
                Event::DownloadProgress { fraction } => {
                    if let Some(pb) = &bar {
                        let total = pb.length().unwrap_or(100);
                        pb.set_position((fraction * total as f64) as u64);
                    }
                }
                Event::DownloadCompleted { .. } => {
                    if let Some(pb) = bar.take() {
                        pb.finish_with_message("done");
                    }
                }
                Event::DownloadFailed { error } => {
                    if let Some(pb) = bar.take() {
                        pb.abandon_with_message(error);
                    }
                }
                Event::ProcessOutput { line } => println!("{}", line),
                _ => {}
            }
        }
    })
}

fn setup_logging(verbose: bool) -> Result<()> {
    // Create log directory
    let log_dir = std::env::current_dir()?.join(".tt-tool").join("log");
    std::fs::create_dir_all(&log_dir)?;

    // Set up file appender with daily rotation
    let file_appender = rolling::daily(&log_dir, "tt-tool.log");
    let (non_blocking_file, _guard) = non_blocking(file_appender);
    // Keep the guard alive for the duration of the program
    std::mem::forget(_guard);

    let log_level = if verbose { Level::DEBUG } else { Level::INFO };

    // Console shows warnings unless verbose; status lines come from the renderer
    let console_level = if verbose { Level::DEBUG } else { Level::WARN };
    let console_layer = fmt::layer()
        .with_target(false)
        .with_writer(std::io::stderr)
        .with_filter(tracing_subscriber::filter::LevelFilter::from_level(console_level));

    let file_layer = fmt::layer()
        .with_writer(non_blocking_file)
        .with_target(false)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true)
        .with_ansi(false);

    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env().add_directive(log_level.into()))
        .with(console_layer)
        .with(file_layer)
        .try_init()
        .map_err(|e| anyhow::anyhow!("Failed to initialize logging: {}", e))?;

    info!(
        "Logging initialized - level: {}, file: {}",
        log_level,
        log_dir.join("tt-tool.log").display()
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_interrupt_stops_pending_work() {
        let work = async {
            tokio::time::sleep(Duration::from_secs(30)).await;
            Ok::<_, anyhow::Error>(1)
        };

        let result = until_interrupted(work, async {}).await;
        assert_eq!(result.unwrap_err().to_string(), "Interrupted");
    }

    #[tokio::test]
    async fn test_finished_work_is_returned() {
        let result = until_interrupted(async { Ok::<_, anyhow::Error>(7) }, std::future::pending::<()>()).await;
        assert_eq!(result.unwrap(), 7);
    }
}
