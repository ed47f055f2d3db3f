use futures_util::StreamExt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{error, info, warn};

use super::{
    ArtifactKind, DownloadSession, DownloadState, MODEL_BASE_URL, ModelHost, models_dir_for,
    staging_path_for,
};
use crate::config::Architecture;
use crate::error::{Result, TtError};
use crate::events::{Event, EventSink};
use crate::probe::FileSystemProbe;
use crate::transcribe::profile_for;

/// Installs models into the `models` directory next to the transcriber
pub struct ModelAcquisition {
    host: Arc<dyn ModelHost>,
    events: Arc<dyn EventSink>,
    architecture: Architecture,
    models_dir: PathBuf,
    base_url: String,
}

impl ModelAcquisition {
    pub fn new<P: AsRef<Path>>(
        host: Arc<dyn ModelHost>,
        events: Arc<dyn EventSink>,
        architecture: Architecture,
        executable_path: P,
    ) -> Self {
        Self {
            host,
            events,
            architecture,
            models_dir: models_dir_for(executable_path),
            base_url: MODEL_BASE_URL.to_string(),
        }
    }

    pub fn with_base_url<S: Into<String>>(mut self, base_url: S) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn models_dir(&self) -> &Path {
        &self.models_dir
    }

    /// Fetch the model binary, or with `wants_coreml` its CoreML encoder
    /// archive. On the CoreML architecture a binary download is followed by
    /// the encoder download and extraction. Returns the installed path.
    pub async fn acquire(&self, model: &str, wants_coreml: bool) -> Result<PathBuf> {
        let model = model.trim();
        if model.is_empty() {
            let msg = "No model name specified for download";
            error!("{}", msg);
            self.events.emit(Event::Status(msg.to_string()));
            return Err(TtError::Config(msg.to_string()));
        }

        self.events.emit(Event::AcquisitionStarted { model: model.to_string() });

        let result = self.acquire_artifacts(model, wants_coreml).await;

        match &result {
            Ok(path) => {
                info!("Model {} installed at {}", model, path.display());
                self.events.emit(Event::Status("Download completed".to_string()));
            }
            Err(e) => {
                error!("Acquisition of model {} failed: {}", model, e);
                self.events.emit(Event::Status(
                    "Error while downloading the model. See the log for more details.".to_string(),
                ));
            }
        }
        self.events.emit(Event::AcquisitionEnded {
            model: model.to_string(),
            success: result.is_ok(),
        });

        result
    }

    async fn acquire_artifacts(&self, model: &str, wants_coreml: bool) -> Result<PathBuf> {
        fs::create_dir_all(&self.models_dir).await?;

        if wants_coreml {
            let archive = self.download(model, ArtifactKind::CoreMlEncoder).await?;
            return self.install_coreml_bundle(model, &archive).await;
        }

        let binary = self.download(model, ArtifactKind::Binary).await?;

        let bundle = FileSystemProbe::coreml_bundle_path(&self.models_dir, model);
        if profile_for(self.architecture).coreml && !bundle.exists() {
            // Only starts once the binary is committed
            let archive = self.download(model, ArtifactKind::CoreMlEncoder).await?;
            self.install_coreml_bundle(model, &archive).await?;
        }

        Ok(binary)
    }

    /// Stream one artifact to its staging file, then rename it into place
    async fn download(&self, model: &str, kind: ArtifactKind) -> Result<PathBuf> {
        let filename = kind.filename(model);
        let url = format!("{}/{}", self.base_url.trim_end_matches('/'), filename);
        let mut session = DownloadSession::new(url, self.models_dir.join(&filename));
        let staging = session.staging_path();

        let outcome = match self.transfer(&mut session, kind).await {
            Ok(()) => fs::rename(&staging, &session.destination)
                .await
                .map_err(TtError::from),
            Err(e) => Err(e),
        };

        match outcome {
            Ok(()) => {
                session.state = DownloadState::Completed;
                info!("Download completed: {}", session.destination.display());
                self.events.emit(Event::DownloadCompleted {
                    path: session.destination.clone(),
                });
                Ok(session.destination)
            }
            Err(e) => {
                session.state = DownloadState::Failed;
                error!("Error while downloading {} ({}): {}", kind.label(), session.url, e);
                if staging.exists() {
                    warn!("Deleting the uncompleted download: {}", staging.display());
                    if let Err(rm) = fs::remove_file(&staging).await {
                        warn!("Failed to delete {}: {}", staging.display(), rm);
                    }
                }
                self.events.emit(Event::DownloadFailed { error: e.to_string() });
                Err(TtError::Download(format!("{} {}: {}", kind.label(), model, e)))
            }
        }
    }

    async fn transfer(&self, session: &mut DownloadSession, kind: ArtifactKind) -> Result<()> {
        let mut stream = self.host.open(&session.url).await?;
        session.total_bytes = stream.total_bytes;
        session.state = DownloadState::Active;

        let size_mb = session.total_bytes.unwrap_or(0) as f64 / (1024.0 * 1024.0);
        info!(
            "Downloading {} {} ({:.2} MB) to {}",
            kind.label(),
            session.url,
            size_mb,
            session.destination.display()
        );
        self.events.emit(Event::DownloadStarted {
            artifact: kind,
            url: session.url.clone(),
            size_bytes: session.total_bytes,
        });

        // A stale staging file from an earlier attempt is truncated here
        let mut file = fs::File::create(session.staging_path()).await?;
        let mut last_percent = 0u64;

        while let Some(chunk) = stream.chunks.next().await {
            let chunk = chunk?;
            file.write_all(&chunk).await?;
            session.bytes_so_far += chunk.len() as u64;

            if let Some(fraction) = session.fraction() {
                let percent = (fraction * 100.0) as u64;
                if percent > last_percent {
                    last_percent = percent;
                    self.events.emit(Event::DownloadProgress { fraction });
                }
            }
        }

        file.flush().await?;
        drop(file);

        session.verify_length()
    }

    /// Unpack the encoder archive unless the bundle is already there, then
    /// remove the archive
    async fn install_coreml_bundle(&self, model: &str, archive: &Path) -> Result<PathBuf> {
        let bundle = FileSystemProbe::coreml_bundle_path(&self.models_dir, model);

        if bundle.exists() {
            info!("CoreML bundle {} already present", bundle.display());
        } else {
            info!("Extracting CoreML model archive {}", archive.display());
            self.events.emit(Event::ExtractionStarted { archive: archive.to_path_buf() });
            self.events
                .emit(Event::Status("Extracting CoreML model archive...".to_string()));

            // Unpacked next to the models and moved into place only when complete
            let staging = staging_path_for(&bundle);
            let result = self.extract_bundle(archive, &staging, &bundle).await;
            if staging.exists() {
                if let Err(e) = fs::remove_dir_all(&staging).await {
                    warn!("Failed to delete {}: {}", staging.display(), e);
                }
            }
            if let Err(e) = result {
                let _ = fs::remove_file(archive).await;
                return Err(e);
            }

            info!("Extracting CoreML model complete");
            self.events.emit(Event::ExtractionCompleted { bundle: bundle.clone() });
        }

        info!("Deleting CoreML model archive {}", archive.display());
        fs::remove_file(archive).await?;
        Ok(bundle)
    }

    async fn extract_bundle(&self, archive: &Path, staging: &Path, bundle: &Path) -> Result<()> {
        if staging.exists() {
            fs::remove_dir_all(staging).await?;
        }
        extract_archive(archive, staging).await?;

        let extracted = staging.join(bundle.file_name().unwrap_or_default());
        if extracted.exists() {
            fs::rename(&extracted, bundle).await?;
        } else {
            warn!(
                "Archive {} did not contain {}",
                archive.display(),
                bundle.display()
            );
        }
        Ok(())
    }
}

async fn extract_archive(archive: &Path, target: &Path) -> Result<()> {
    let archive = archive.to_path_buf();
    let target = target.to_path_buf();

    tokio::task::spawn_blocking(move || -> Result<()> {
        let file = std::fs::File::open(&archive)?;
        let mut zip = zip::ZipArchive::new(file)?;
        zip.extract(&target)?;
        Ok(())
    })
    .await
    .map_err(|e| TtError::Download(format!("Extraction task failed: {}", e)))?
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::RecordingSink;
    use crate::models::ArtifactStream;
    use async_trait::async_trait;
    use bytes::Bytes;
    use std::collections::HashMap;
    use std::io::Write;
    use std::sync::Mutex;

    enum Reply {
        Body(Vec<u8>),
        BrokenAfter(Vec<u8>),
        Refused,
    }

    /// Serves canned bodies keyed by artifact filename
    struct FakeHost {
        replies: HashMap<String, Reply>,
        requests: Mutex<Vec<String>>,
    }

    impl FakeHost {
        fn new() -> Self {
            Self {
                replies: HashMap::new(),
                requests: Mutex::new(Vec::new()),
            }
        }

        fn reply(mut self, filename: &str, reply: Reply) -> Self {
            self.replies.insert(filename.to_string(), reply);
            self
        }

        fn requests(&self) -> Vec<String> {
            self.requests.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl ModelHost for FakeHost {
        async fn open(&self, url: &str) -> Result<ArtifactStream> {
            self.requests.lock().unwrap().push(url.to_string());
            let filename = url.rsplit('/').next().unwrap_or_default();

            match self.replies.get(filename) {
                Some(Reply::Body(body)) => {
                    let chunks: Vec<Result<Bytes>> = body
                        .chunks(4)
                        .map(|c| Ok(Bytes::copy_from_slice(c)))
                        .collect();
                    Ok(ArtifactStream {
                        total_bytes: Some(body.len() as u64),
                        chunks: futures_util::stream::iter(chunks).boxed(),
                    })
                }
                Some(Reply::BrokenAfter(body)) => {
                    let chunks: Vec<Result<Bytes>> = vec![
                        Ok(Bytes::copy_from_slice(body)),
                        Err(TtError::Download("connection reset".to_string())),
                    ];
                    Ok(ArtifactStream {
                        total_bytes: Some(body.len() as u64 * 10),
                        chunks: futures_util::stream::iter(chunks).boxed(),
                    })
                }
                Some(Reply::Refused) | None => {
                    Err(TtError::Download(format!("HTTP 404 for {}", url)))
                }
            }
        }
    }

    fn coreml_archive(model: &str) -> Vec<u8> {
        let mut writer = zip::ZipWriter::new(std::io::Cursor::new(Vec::new()));
        let options = zip::write::SimpleFileOptions::default()
            .compression_method(zip::CompressionMethod::Stored);
        let bundle = format!("ggml-{}-encoder.mlmodelc", model);
        writer.add_directory(format!("{}/", bundle), options).unwrap();
        writer
            .start_file(format!("{}/coremldata.bin", bundle), options)
            .unwrap();
        writer.write_all(b"encoder").unwrap();
        writer.finish().unwrap().into_inner()
    }

    fn setup(
        host: FakeHost,
        arch: Architecture,
    ) -> (tempfile::TempDir, Arc<FakeHost>, Arc<RecordingSink>, ModelAcquisition) {
        let dir = tempfile::tempdir().unwrap();
        let host = Arc::new(host);
        let sink = Arc::new(RecordingSink::new());
        let acquisition = ModelAcquisition::new(
            host.clone(),
            sink.clone(),
            arch,
            dir.path().join("main"),
        )
        .with_base_url("https://models.test/resolve/main");
        (dir, host, sink, acquisition)
    }

    fn count(sink: &RecordingSink, pred: impl Fn(&Event) -> bool) -> usize {
        sink.events().iter().filter(|e| pred(e)).count()
    }

    #[tokio::test]
    async fn test_empty_model_name_is_rejected() {
        let (_dir, host, sink, acquisition) = setup(FakeHost::new(), Architecture::LinuxX64);

        let result = acquisition.acquire("  ", false).await;
        assert!(matches!(result, Err(TtError::Config(_))));
        assert!(host.requests().is_empty());
        assert_eq!(count(&sink, |e| matches!(e, Event::AcquisitionStarted { .. })), 0);
    }

    #[tokio::test]
    async fn test_successful_download_is_committed() {
        let host = FakeHost::new().reply("ggml-base.bin", Reply::Body(b"0123456789abcdef".to_vec()));
        let (_dir, host, sink, acquisition) = setup(host, Architecture::LinuxX64);

        let path = acquisition.acquire("base", false).await.unwrap();

        assert_eq!(path, acquisition.models_dir().join("ggml-base.bin"));
        assert_eq!(std::fs::read(&path).unwrap(), b"0123456789abcdef");
        assert!(!acquisition.models_dir().join("ggml-base.bin.download").exists());
        assert_eq!(host.requests(), vec!["https://models.test/resolve/main/ggml-base.bin".to_string()]);

        let events = sink.events();
        assert!(matches!(events.first(), Some(Event::AcquisitionStarted { .. })));
        assert!(matches!(
            events.last(),
            Some(Event::AcquisitionEnded { success: true, .. })
        ));
        assert!(count(&sink, |e| matches!(e, Event::DownloadProgress { .. })) > 0);
    }

    #[tokio::test]
    async fn test_failed_download_leaves_nothing_behind() {
        let host = FakeHost::new().reply("ggml-small.bin", Reply::BrokenAfter(b"partial".to_vec()));
        let (_dir, _host, sink, acquisition) = setup(host, Architecture::LinuxX64);

        let result = acquisition.acquire("small", false).await;
        assert!(matches!(result, Err(TtError::Download(_))));

        let models = acquisition.models_dir();
        assert!(!models.join("ggml-small.bin").exists());
        assert!(!models.join("ggml-small.bin.download").exists());
        assert_eq!(count(&sink, |e| matches!(e, Event::DownloadFailed { .. })), 1);
        assert!(matches!(
            sink.events().last(),
            Some(Event::AcquisitionEnded { success: false, .. })
        ));
    }

    #[tokio::test]
    async fn test_refused_request_reports_failure() {
        let (_dir, _host, sink, acquisition) = setup(FakeHost::new(), Architecture::WinX64);

        assert!(acquisition.acquire("tiny", false).await.is_err());
        assert_eq!(count(&sink, |e| matches!(e, Event::DownloadFailed { .. })), 1);
        assert!(!acquisition.models_dir().join("ggml-tiny.bin").exists());
    }

    #[tokio::test]
    async fn test_stale_staging_file_is_overwritten() {
        let host = FakeHost::new().reply("ggml-tiny.bin", Reply::Body(b"fresh".to_vec()));
        let (_dir, _host, _sink, acquisition) = setup(host, Architecture::LinuxX64);
        std::fs::create_dir_all(acquisition.models_dir()).unwrap();
        std::fs::write(
            acquisition.models_dir().join("ggml-tiny.bin.download"),
            b"stale bytes from an earlier attempt",
        )
        .unwrap();

        let path = acquisition.acquire("tiny", false).await.unwrap();
        assert_eq!(std::fs::read(path).unwrap(), b"fresh");
    }

    #[tokio::test]
    async fn test_coreml_follow_up_runs_once_and_removes_archive() {
        let host = FakeHost::new()
            .reply("ggml-base.bin", Reply::Body(b"weights".to_vec()))
            .reply("ggml-base-encoder.mlmodelc.zip", Reply::Body(coreml_archive("base")));
        let (_dir, host, sink, acquisition) = setup(host, Architecture::DarwinArm64);

        acquisition.acquire("base", false).await.unwrap();

        let requests = host.requests();
        assert_eq!(requests.len(), 2);
        assert!(requests[0].ends_with("ggml-base.bin"));
        assert!(requests[1].ends_with("ggml-base-encoder.mlmodelc.zip"));
        assert_eq!(count(&sink, |e| matches!(e, Event::ExtractionStarted { .. })), 1);

        let models = acquisition.models_dir();
        assert!(models.join("ggml-base-encoder.mlmodelc/coremldata.bin").exists());
        assert!(!models.join("ggml-base-encoder.mlmodelc.zip").exists());
        assert!(FileSystemProbe::new(Architecture::DarwinArm64)
            .model_is_present(&FileSystemProbe::new(Architecture::DarwinArm64).describe(models, "base")));
    }

    #[tokio::test]
    async fn test_no_coreml_follow_up_elsewhere() {
        let host = FakeHost::new().reply("ggml-base.bin", Reply::Body(b"weights".to_vec()));
        let (_dir, host, sink, acquisition) = setup(host, Architecture::DarwinX64);

        acquisition.acquire("base", false).await.unwrap();
        assert_eq!(host.requests().len(), 1);
        assert_eq!(count(&sink, |e| matches!(e, Event::ExtractionStarted { .. })), 0);
    }

    #[tokio::test]
    async fn test_existing_bundle_skips_extraction() {
        let host = FakeHost::new()
            .reply("ggml-tiny-encoder.mlmodelc.zip", Reply::Body(coreml_archive("tiny")));
        let (_dir, _host, sink, acquisition) = setup(host, Architecture::DarwinArm64);
        let bundle = acquisition.models_dir().join("ggml-tiny-encoder.mlmodelc");
        std::fs::create_dir_all(&bundle).unwrap();

        let path = acquisition.acquire("tiny", true).await.unwrap();

        assert_eq!(path, bundle);
        assert_eq!(count(&sink, |e| matches!(e, Event::ExtractionStarted { .. })), 0);
        assert!(!acquisition.models_dir().join("ggml-tiny-encoder.mlmodelc.zip").exists());
    }

    /// Valid archive layout whose single member fails its checksum
    fn archive_with_corrupt_member(model: &str) -> Vec<u8> {
        let mut writer = zip::ZipWriter::new(std::io::Cursor::new(Vec::new()));
        let options = zip::write::SimpleFileOptions::default()
            .compression_method(zip::CompressionMethod::Stored);
        let bundle = format!("ggml-{}-encoder.mlmodelc", model);
        writer.add_directory(format!("{}/", bundle), options).unwrap();
        writer.start_file(format!("{}/weights.bin", bundle), options).unwrap();
        writer.write_all(b"0123456789WEIGHTS").unwrap();
        let mut bytes = writer.finish().unwrap().into_inner();

        let at = bytes
            .windows(7)
            .position(|w| w == b"WEIGHTS")
            .unwrap();
        bytes[at] ^= 0xff;
        bytes
    }

    #[tokio::test]
    async fn test_corrupt_archive_member_leaves_no_bundle() {
        let host = FakeHost::new().reply(
            "ggml-tiny-encoder.mlmodelc.zip",
            Reply::Body(archive_with_corrupt_member("tiny")),
        );
        let (dir, _host, _sink, acquisition) = setup(host, Architecture::DarwinArm64);
        let models = acquisition.models_dir().to_path_buf();
        std::fs::create_dir_all(&models).unwrap();
        std::fs::write(models.join("ggml-tiny.bin"), b"weights").unwrap();

        assert!(acquisition.acquire("tiny", true).await.is_err());
        assert!(!models.join("ggml-tiny-encoder.mlmodelc").exists());
        assert!(!models.join("ggml-tiny-encoder.mlmodelc.download").exists());
        assert!(!models.join("ggml-tiny-encoder.mlmodelc.zip").exists());

        let probe = FileSystemProbe::new(Architecture::DarwinArm64);
        assert!(!probe.model_is_present(&probe.describe(&models, "tiny")));

        // A later attempt with a good archive repairs the model
        let retry = ModelAcquisition::new(
            Arc::new(FakeHost::new().reply(
                "ggml-tiny-encoder.mlmodelc.zip",
                Reply::Body(coreml_archive("tiny")),
            )),
            Arc::new(RecordingSink::new()),
            Architecture::DarwinArm64,
            dir.path().join("main"),
        )
        .with_base_url("https://models.test/resolve/main");
        retry.acquire("tiny", true).await.unwrap();
        assert!(models.join("ggml-tiny-encoder.mlmodelc/coremldata.bin").exists());
        assert!(probe.model_is_present(&probe.describe(&models, "tiny")));
    }

    #[tokio::test]
    async fn test_corrupt_archive_is_discarded() {
        let host = FakeHost::new()
            .reply("ggml-tiny-encoder.mlmodelc.zip", Reply::Body(b"not a zip".to_vec()));
        let (_dir, _host, _sink, acquisition) = setup(host, Architecture::DarwinArm64);

        assert!(acquisition.acquire("tiny", true).await.is_err());
        let models = acquisition.models_dir();
        assert!(!models.join("ggml-tiny-encoder.mlmodelc.zip").exists());
        assert!(!models.join("ggml-tiny-encoder.mlmodelc").exists());
    }
}
