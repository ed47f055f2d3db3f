use std::path::{Path, PathBuf};

use crate::config::Architecture;
use crate::models::{ArtifactKind, ModelDescriptor, catalog_entry};
use crate::transcribe::profile_for;

/// Existence checks for the transcriber and its models. Never fails: anything
/// that cannot be found is simply reported as absent.
#[derive(Debug, Clone, Copy)]
pub struct FileSystemProbe {
    architecture: Architecture,
}

impl FileSystemProbe {
    pub fn new(architecture: Architecture) -> Self {
        Self { architecture }
    }

    pub fn exists<P: AsRef<Path>>(path: P) -> bool {
        path.as_ref().exists()
    }

    /// `<models_dir>/ggml-<name>.bin`
    pub fn resolve_model_path<P: AsRef<Path>>(models_dir: P, name: &str) -> PathBuf {
        models_dir.as_ref().join(ArtifactKind::Binary.filename(name))
    }

    /// `<models_dir>/ggml-<name>-encoder.mlmodelc`
    pub fn coreml_bundle_path<P: AsRef<Path>>(models_dir: P, name: &str) -> PathBuf {
        models_dir.as_ref().join(format!("ggml-{}-encoder.mlmodelc", name))
    }

    pub fn describe<P: AsRef<Path>>(&self, models_dir: P, name: &str) -> ModelDescriptor {
        let size_bytes = catalog_entry(name)
            .map(|entry| (entry.size_mb * 1_000_000.0) as u64)
            .unwrap_or(0);

        ModelDescriptor {
            name: name.to_string(),
            size_bytes,
            local_path: Self::resolve_model_path(&models_dir, name),
            coreml_required: profile_for(self.architecture).coreml,
        }
    }

    /// The primary binary must exist; CoreML builds also need the encoder bundle
    pub fn model_is_present(&self, descriptor: &ModelDescriptor) -> bool {
        if !Self::exists(&descriptor.local_path) {
            return false;
        }
        if !descriptor.coreml_required {
            return true;
        }
        match descriptor.local_path.parent() {
            Some(models_dir) => Self::exists(Self::coreml_bundle_path(models_dir, &descriptor.name)),
            None => false,
        }
    }

    pub fn coreml_bundle_missing(&self, descriptor: &ModelDescriptor) -> bool {
        descriptor.coreml_required
            && descriptor
                .local_path
                .parent()
                .map(|dir| !Self::exists(Self::coreml_bundle_path(dir, &descriptor.name)))
                .unwrap_or(true)
    }
}
