use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(author, version, about = "Transcribe media with whisper.cpp and translate subtitles with DeepL", long_about = None)]
pub struct Args {
    /// Enable verbose logging
    #[arg(short, long)]
    pub verbose: bool,

    /// Configuration file path
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// List whisper models and their status
    Models {
        /// Download all missing models
        #[arg(long)]
        download: bool,
    },

    /// Make sure a model is installed, downloading it if needed
    Fetch {
        /// Model name, e.g. base.en or large-v3
        model: String,
    },

    /// Transcribe an audio or video file with the configured whisper CLI
    Transcribe {
        /// Input media file
        #[arg(short, long)]
        input: PathBuf,

        /// Spoken language (name or ISO code, or "auto"); remembered for next time
        #[arg(short, long)]
        language: Option<String>,

        /// Model to use instead of the one chosen for the language
        #[arg(short, long)]
        model: Option<String>,

        /// Output format: srt, txt, vtt, lrc, wts, csv, json
        #[arg(short, long, default_value = "srt")]
        format: String,

        /// Maximum segment length in characters (0 = unlimited)
        #[arg(long, default_value = "0")]
        max_len: u32,

        /// Number of processors
        #[arg(long, default_value = "1")]
        processors: u32,

        /// Number of threads
        #[arg(long, default_value = "4")]
        threads: u32,

        /// Milliseconds of audio to process (0 = all)
        #[arg(long, default_value = "0")]
        duration: u64,

        /// Enable speaker diarization
        #[arg(long)]
        diarize: bool,

        /// Extra parameters passed to the whisper CLI as-is
        #[arg(long)]
        custom: Option<String>,

        /// Translate the produced subtitles into this language afterwards
        #[arg(long)]
        translate_to: Option<String>,
    },

    /// Translate an SRT or WebVTT file with DeepL
    Translate {
        /// Input subtitle file
        #[arg(short, long)]
        input: PathBuf,

        /// Source language (defaults to the last used one)
        #[arg(short, long)]
        source: Option<String>,

        /// Target language (defaults to the last used one)
        #[arg(short, long)]
        target: Option<String>,
    },

    /// Show DeepL character usage
    Usage,

    /// Show or change the configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
pub enum ConfigAction {
    /// Print the current configuration
    Show,

    /// Set the whisper CLI executable
    SetPath {
        path: PathBuf,
    },

    /// Set the whisper CLI architecture (win-x64-gpu, win-x64, darwin-arm64, darwin-x64, linux-x64)
    SetArch {
        arch: String,
    },

    /// Set the DeepL API key
    SetKey {
        key: String,
    },
}
