use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};

use crate::config::{AppConfig, Architecture, ConfigKey, ConfigStore};
use crate::error::{Result, TtError};
use crate::events::{Event, EventSink};
use crate::models::{
    CatalogEntry, DEFAULT_MODEL, MODEL_CATALOG, ModelAcquisition, ModelHost,
    default_model_for_language, models_dir_for,
};
use crate::probe::FileSystemProbe;
use crate::transcribe::{
    CancelHandle, RunOutcome, TranscriptionJob, TranscriptionOptions, TranscriptionRun,
};
use crate::translate::{
    Quota, TranslationApi, TranslationPipeline, UsageGate, transcription_code,
    transcription_name, translation_language,
};

const MISSING_EXECUTABLE_MESSAGE: &str =
    "Whisper CLI path is not configured. Maintain it in the configuration.";

/// Catalogue entry with its local state
#[derive(Debug, Clone, PartialEq)]
pub struct ModelStatus {
    pub entry: CatalogEntry,
    pub present: bool,
}

/// Ties the components together the way the front-end drives them
pub struct Workflow {
    config: Box<dyn ConfigStore>,
    events: Arc<dyn EventSink>,
    host: Arc<dyn ModelHost>,
    api: Arc<dyn TranslationApi>,
    selected_model: String,
    active: Option<TranscriptionRun>,
}

impl Workflow {
    pub fn new(
        config: Box<dyn ConfigStore>,
        events: Arc<dyn EventSink>,
        host: Arc<dyn ModelHost>,
        api: Arc<dyn TranslationApi>,
    ) -> Self {
        let language = config
            .get(ConfigKey::LastUsedTranscriptionLanguage)
            .unwrap_or_else(|| "English".to_string());

        Self {
            selected_model: default_model_for_language(&language).to_string(),
            config,
            events,
            host,
            api,
            active: None,
        }
    }

    pub fn config(&self) -> AppConfig {
        self.config.snapshot()
    }

    pub fn architecture(&self) -> Architecture {
        self.config.snapshot().architecture
    }

    pub fn executable(&self) -> Option<PathBuf> {
        self.config.snapshot().executable_path()
    }

    pub fn models_dir(&self) -> Option<PathBuf> {
        self.executable().map(models_dir_for)
    }

    pub fn selected_model(&self) -> &str {
        &self.selected_model
    }

    /// Every catalogue model with its presence on disk
    pub fn model_status(&self) -> Result<Vec<ModelStatus>> {
        let models_dir = self.require_models_dir()?;
        let probe = FileSystemProbe::new(self.architecture());

        Ok(MODEL_CATALOG
            .iter()
            .map(|entry| ModelStatus {
                entry: *entry,
                present: probe.model_is_present(&probe.describe(&models_dir, entry.name)),
            })
            .collect())
    }

    /// Make `name` the selected model, acquiring whatever is missing.
    /// Any failure leaves the safe default selected.
    pub async fn select_model(&mut self, name: &str) -> Result<&str> {
        let models_dir = match self.require_models_dir() {
            Ok(dir) => dir,
            Err(e) => {
                self.selected_model = DEFAULT_MODEL.to_string();
                return Err(e);
            }
        };
        let executable = self.executable().unwrap_or_default();

        let probe = FileSystemProbe::new(self.architecture());
        let descriptor = probe.describe(&models_dir, name);
        if probe.model_is_present(&descriptor) {
            self.selected_model = name.to_string();
            return Ok(&self.selected_model);
        }

        let acquisition = ModelAcquisition::new(
            self.host.clone(),
            self.events.clone(),
            self.architecture(),
            &executable,
        );

        // Binary already there: only the encoder bundle is missing
        let encoder_only =
            FileSystemProbe::exists(&descriptor.local_path) && probe.coreml_bundle_missing(&descriptor);
        if encoder_only {
            info!("CoreML bundle for {} is missing", name);
        }

        match acquisition.acquire(name, encoder_only).await {
            Ok(_) => {
                self.selected_model = name.to_string();
                Ok(&self.selected_model)
            }
            Err(e) => {
                warn!("Falling back to model {}", DEFAULT_MODEL);
                self.selected_model = DEFAULT_MODEL.to_string();
                Err(e)
            }
        }
    }

    /// Remember the transcription language and pick the model that suits it.
    /// Returns the model now selected.
    pub fn set_transcription_language(&mut self, language: &str) -> Result<&str> {
        let name = transcription_name(language)?;
        self.config.set(ConfigKey::LastUsedTranscriptionLanguage, name)?;
        self.save_silently();

        self.selected_model = default_model_for_language(name).to_string();
        Ok(&self.selected_model)
    }

    /// Remember the translation languages that were given
    pub fn set_translation_languages(&mut self, source: Option<&str>, target: Option<&str>) -> Result<()> {
        if let Some(source) = source {
            let name = translation_language(source)?.name;
            self.config.set(ConfigKey::LastUsedSourceLanguage, name)?;
        }
        if let Some(target) = target {
            let name = translation_language(target)?.name;
            self.config.set(ConfigKey::LastUsedTargetLanguage, name)?;
        }
        if source.is_some() || target.is_some() {
            self.save_silently();
        }
        Ok(())
    }

    /// Start a transcription with the selected model. Only one run at a time.
    pub fn start_transcription(&mut self, input: &Path, mut options: TranscriptionOptions) -> Result<()> {
        if let Some(run) = &self.active {
            if !run.is_finished() {
                return Err(TtError::TranscriptionBusy);
            }
        }

        let language = self
            .config
            .get(ConfigKey::LastUsedTranscriptionLanguage)
            .unwrap_or_else(|| "auto".to_string());
        options.language = transcription_code(&language)?.to_string();
        options.model = self.selected_model.clone();

        let job = TranscriptionJob::new(self.executable(), self.architecture(), self.events.clone());
        let run = job.start(input, &options)?;
        self.active = Some(run);
        Ok(())
    }

    pub fn cancel_handle(&self) -> Option<CancelHandle> {
        self.active.as_ref().map(TranscriptionRun::cancel_handle)
    }

    pub fn cancel_transcription(&self) {
        if let Some(run) = &self.active {
            run.cancel();
        }
    }

    pub async fn wait_transcription(&mut self) -> Result<RunOutcome> {
        match self.active.as_mut() {
            Some(run) => run.wait().await,
            None => Err(TtError::Transcriber("No transcription was started".to_string())),
        }
    }

    /// Transcript of the last run, if it can be handed to translation
    pub fn transcript_for_translation(&self) -> Option<PathBuf> {
        let run = self.active.as_ref()?;
        if !run.outcome().is_some_and(|outcome| outcome.is_success()) {
            return None;
        }
        run.translatable_transcript()
    }

    pub fn translation_pipeline(&self) -> TranslationPipeline {
        let key = self.config.get(ConfigKey::TranslationApiKey).unwrap_or_default();
        TranslationPipeline::new(self.api.clone(), self.events.clone(), &key)
    }

    /// Translate with the given languages, falling back to the last used ones
    pub async fn translate(
        &mut self,
        source: &Path,
        source_lang: Option<&str>,
        target_lang: Option<&str>,
    ) -> Result<PathBuf> {
        self.set_translation_languages(source_lang, target_lang)?;

        let config = self.config.snapshot();
        self.translation_pipeline()
            .translate(
                source,
                &config.last_used_source_language,
                &config.last_used_target_language,
            )
            .await
    }

    /// Standalone quota check
    pub async fn check_usage(&self) -> Option<Quota> {
        let key = self.config.get(ConfigKey::TranslationApiKey).unwrap_or_default();
        UsageGate::new(self.api.clone(), self.events.clone())
            .report(&key)
            .await
    }

    fn require_models_dir(&self) -> Result<PathBuf> {
        match self.models_dir() {
            Some(dir) => Ok(dir),
            None => {
                warn!("{}", MISSING_EXECUTABLE_MESSAGE);
                self.events
                    .emit(Event::Status(MISSING_EXECUTABLE_MESSAGE.to_string()));
                Err(TtError::Config(MISSING_EXECUTABLE_MESSAGE.to_string()))
            }
        }
    }

    fn save_silently(&self) {
        if let Err(e) = self.config.save() {
            warn!("Failed to save configuration: {}", e);
        }
    }
}
