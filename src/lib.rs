//! tt-tool - Transcribe and Translate
//!
//! Drives a whisper.cpp command-line binary to produce transcripts, keeps the
//! ggml models it needs installed, and translates SRT/WebVTT subtitles
//! through the DeepL document API.

pub mod cli;
pub mod config;
pub mod error;
pub mod events;
pub mod models;
pub mod probe;
pub mod subtitle;
pub mod transcribe;
pub mod translate;
pub mod workflow;
