use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::fs;
use tracing::{debug, error, info, warn};

use super::languages::translation_language;
use super::usage::{MISSING_KEY_MESSAGE, UsageGate, usage_message};
use super::TranslationApi;
use crate::error::{Result, TtError};
use crate::events::{Event, EventSink};
use crate::subtitle::{SubtitleFormat, read_subtitle};

/// Files involved in translating one subtitle file
#[derive(Debug, Clone, PartialEq)]
pub struct TranslationRequest {
    pub source_file: PathBuf,
    pub format: SubtitleFormat,
    pub source_lang: String,
    pub target_lang: String,
    /// `<dir>/<stem>.<TARGET>.<ext>`
    pub output_file: PathBuf,
    /// `<dir>/<stem>-SubText.txt`, cue text handed to the service
    pub temp_text_file: PathBuf,
    /// `<dir>/<stem>-DeepL.txt`, translated text
    pub temp_result_file: PathBuf,
}

impl TranslationRequest {
    pub fn new<P: AsRef<Path>>(source_file: P, source_lang: &str, target_lang: &str) -> Result<Self> {
        let source_file = source_file.as_ref().to_path_buf();
        let format = SubtitleFormat::from_path(&source_file)?;

        let dir = source_file.parent().map(Path::to_path_buf).unwrap_or_default();
        let stem = source_file
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_default();
        let ext = source_file
            .extension()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_default();

        Ok(Self {
            output_file: dir.join(format!("{}.{}.{}", stem, target_lang.to_uppercase(), ext)),
            temp_text_file: dir.join(format!("{}-SubText.txt", stem)),
            temp_result_file: dir.join(format!("{}-DeepL.txt", stem)),
            source_file,
            format,
            source_lang: source_lang.to_string(),
            target_lang: target_lang.to_string(),
        })
    }
}

/// Deletes the request's temp files when dropped
struct TempFiles<'a> {
    paths: [&'a Path; 2],
}

impl Drop for TempFiles<'_> {
    fn drop(&mut self) {
        for path in self.paths {
            if path.exists() {
                debug!("Deleting temp file {}", path.display());
                if let Err(e) = std::fs::remove_file(path) {
                    warn!("Failed to delete temp file {}: {}", path.display(), e);
                }
            }
        }
    }
}

/// Clears the in-flight flag when dropped
struct InFlight<'a>(&'a AtomicBool);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// Translates the cue text of SRT/WebVTT files as one remote document
pub struct TranslationPipeline {
    api: Arc<dyn TranslationApi>,
    gate: UsageGate,
    events: Arc<dyn EventSink>,
    api_key: String,
    in_flight: AtomicBool,
}

impl TranslationPipeline {
    pub fn new(api: Arc<dyn TranslationApi>, events: Arc<dyn EventSink>, api_key: &str) -> Self {
        Self {
            gate: UsageGate::new(api.clone(), events.clone()),
            api,
            events,
            api_key: api_key.trim().to_string(),
            in_flight: AtomicBool::new(false),
        }
    }

    /// Whether a translate action makes sense right now
    pub fn can_translate(&self, source: Option<&Path>) -> bool {
        !self.in_flight.load(Ordering::SeqCst)
            && !self.api_key.is_empty()
            && source.is_some_and(|path| !path.as_os_str().is_empty())
    }

    /// Translate `source` and return the path of the written translation.
    /// Languages are given by name or code.
    pub async fn translate(&self, source: &Path, source_lang: &str, target_lang: &str) -> Result<PathBuf> {
        if self.api_key.is_empty() {
            error!("{}", MISSING_KEY_MESSAGE);
            self.events.emit(Event::Status(MISSING_KEY_MESSAGE.to_string()));
            return Err(TtError::Config(MISSING_KEY_MESSAGE.to_string()));
        }
        let source_code = translation_language(source_lang)?.source;
        let target_code = translation_language(target_lang)?.target;

        if self.in_flight.swap(true, Ordering::SeqCst) {
            return Err(TtError::Translation("A translation is already running".to_string()));
        }
        let _in_flight = InFlight(&self.in_flight);

        self.events.emit(Event::TranslationStarted { source: source.to_path_buf() });
        self.events.emit(Event::Status("Translating...".to_string()));
        info!("Translating from {} to {}", source_code, target_code);

        let result = match TranslationRequest::new(source, source_code, target_code) {
            Ok(request) => self.run(&request).await.map(|()| request.output_file),
            Err(e) => {
                self.report(&format!("Cannot translate {}", source.display()), &e);
                Err(e)
            }
        };

        self.events.emit(Event::TranslationEnded { output: result.as_ref().ok().cloned() });
        result
    }

    async fn run(&self, request: &TranslationRequest) -> Result<()> {
        if request.output_file.exists() {
            let msg = format!("Translation already exist: {}", file_name(&request.output_file));
            info!("{}", msg);
            self.events.emit(Event::Status(msg));
            return Err(TtError::OutputExists(request.output_file.clone()));
        }

        let mut document = read_subtitle(&request.source_file).await.map_err(|e| {
            self.report(
                &format!("Error reading the subtitle file {}", file_name(&request.source_file)),
                &e,
            );
            e
        })?;

        // Everything from here on runs with both temp files cleaned up on exit
        let _temp = TempFiles {
            paths: [request.temp_text_file.as_path(), request.temp_result_file.as_path()],
        };

        let text = document.cue_lines().join("\n");
        fs::write(&request.temp_text_file, &text).await.map_err(|e| {
            self.report_io(
                &format!("Error writing the temp output file {}", file_name(&request.temp_text_file)),
                e,
            )
        })?;

        let needed = text.chars().count() as u64;
        let quota = self
            .gate
            .check_quota(&self.api_key)
            .await
            .ok_or(TtError::QuotaUnavailable)?;

        let usage = usage_message(&quota);
        if quota.any_limit_reached {
            self.events.emit(Event::Status(usage.clone()));
        }
        info!("Characters to be translated: {}", needed);
        info!("{}", usage);

        if quota.remaining() < needed {
            let msg = format!(
                "DeepL quota left for {} characters. Needed {}. Quota will be exceeded. Aborting...",
                quota.remaining(),
                needed
            );
            warn!("{}", msg);
            self.events.emit(Event::Status(msg));
            return Err(TtError::QuotaExceeded { remaining: quota.remaining(), needed });
        }

        // Whole-document translation keeps the context between cues
        if let Err(e) = self
            .api
            .translate_document(
                &self.api_key,
                &request.temp_text_file,
                &request.temp_result_file,
                &request.source_lang,
                &request.target_lang,
            )
            .await
        {
            match &e {
                TtError::DocumentTranslation { handle: Some(handle), .. } => {
                    error!("Error while translating file {}: {}", request.temp_text_file.display(), e);
                    error!("Document ID: {}, Document key: {}", handle.document_id, handle.document_key);
                    self.events.emit(Event::Status(format!(
                        "Error while translating file {}.",
                        file_name(&request.temp_text_file)
                    )));
                }
                _ => {
                    let msg = "Error occurred during document upload";
                    error!("{}: {}", msg, e);
                    self.events.emit(Event::Status(msg.to_string()));
                }
            }
            return Err(e);
        }

        let translated = fs::read_to_string(&request.temp_result_file).await.map_err(|e| {
            self.report_io(
                &format!(
                    "Error while reading DeepL translated file {}.",
                    file_name(&request.temp_result_file)
                ),
                e,
            )
        })?;

        let lines: Vec<&str> = translated.lines().collect();
        document.replace_cue_text(&lines).map_err(|e| {
            self.report("Translated text does not match the subtitle cues", &e);
            e
        })?;

        fs::write(&request.output_file, document.serialize()).await.map_err(|e| {
            self.report_io(
                &format!(
                    "Error writing to output translation subtitle file {}",
                    file_name(&request.output_file)
                ),
                e,
            )
        })?;

        let msg = format!(
            "Translation complete. Subtitle file: {}",
            file_name(&request.output_file)
        );
        info!("Translation complete. Output file: {}", request.output_file.display());
        self.events.emit(Event::Status(msg));
        Ok(())
    }

    fn report(&self, msg: &str, err: &TtError) {
        error!("{}: {}", msg, err);
        self.events.emit(Event::Status(msg.to_string()));
    }

    fn report_io(&self, msg: &str, err: std::io::Error) -> TtError {
        let err = TtError::from(err);
        self.report(msg, &err);
        err
    }
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().to_string())
        .unwrap_or_default()
}
