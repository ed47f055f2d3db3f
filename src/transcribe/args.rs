use std::path::{Path, PathBuf};

use super::profile::{ArchProfile, OutputFormat};
use crate::probe::FileSystemProbe;

/// Command line for one transcriber invocation
#[derive(Debug, Clone, PartialEq)]
pub struct TranscriberCommand {
    pub program: PathBuf,
    pub args: Vec<String>,
    /// Base path handed to `--output-file`, when the port accepts it
    pub output_base: Option<PathBuf>,
}

impl TranscriberCommand {
    pub fn new<P: AsRef<Path>>(program: P) -> Self {
        Self {
            program: program.as_ref().to_path_buf(),
            args: Vec::new(),
            output_base: None,
        }
    }

    pub fn arg<S: Into<String>>(mut self, arg: S) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn option<S: Into<String>>(self, flag: &str, value: S) -> Self {
        self.arg(flag).arg(value)
    }

    pub fn model<P: AsRef<Path>>(self, models_dir: P, name: &str) -> Self {
        let path = FileSystemProbe::resolve_model_path(models_dir, name);
        self.option("--model", path.to_string_lossy())
    }

    pub fn language(self, code: &str) -> Self {
        self.option("--language", code)
    }

    pub fn output_format(self, format: OutputFormat) -> Self {
        self.arg(format!("--output-{}", format.flag()))
    }

    pub fn input<P: AsRef<Path>>(self, path: P) -> Self {
        self.option("--file", path.as_ref().to_string_lossy())
    }

    pub fn output_file<P: AsRef<Path>>(mut self, base: P) -> Self {
        self.output_base = Some(base.as_ref().to_path_buf());
        self.option("--output-file", base.as_ref().to_string_lossy())
    }

    /// Full argv including the program
    pub fn argv(&self) -> Vec<String> {
        std::iter::once(self.program.to_string_lossy().to_string())
            .chain(self.args.iter().cloned())
            .collect()
    }
}

/// Knobs of a transcription run
#[derive(Debug, Clone, PartialEq)]
pub struct TranscriptionOptions {
    pub model: String,
    /// ISO-639-1 code or `auto`
    pub language: String,
    pub format: OutputFormat,
    /// Maximum segment length in characters, 0 = unlimited
    pub max_len: u32,
    pub processors: u32,
    pub threads: u32,
    /// Milliseconds of audio to process, 0 = everything
    pub duration_ms: u64,
    pub diarize: bool,
    /// Passed through as one extra argv token
    pub custom: String,
}

impl Default for TranscriptionOptions {
    fn default() -> Self {
        Self {
            model: crate::models::DEFAULT_MODEL.to_string(),
            language: "auto".to_string(),
            format: OutputFormat::Srt,
            max_len: 0,
            processors: 1,
            threads: 4,
            duration_ms: 0,
            diarize: false,
            custom: String::new(),
        }
    }
}

/// `<dir>/<stem>` of the input, the base the transcriber appends its extension to
pub fn output_base_for(input: &Path) -> PathBuf {
    let stem = input.file_stem().map(|s| s.to_os_string()).unwrap_or_default();
    input.parent().map(|dir| dir.join(&stem)).unwrap_or_else(|| PathBuf::from(stem))
}

/// Assemble the command line for `profile`'s port
pub fn build_command(
    executable: &Path,
    models_dir: &Path,
    input: &Path,
    options: &TranscriptionOptions,
    profile: &ArchProfile,
) -> TranscriberCommand {
    let mut cmd = TranscriberCommand::new(executable)
        .model(models_dir, &options.model)
        .language(&options.language)
        .output_format(options.format)
        .option("--max-len", options.max_len.to_string())
        .option("--processors", options.processors.to_string())
        .option("--threads", options.threads.to_string())
        .option("--duration", options.duration_ms.to_string())
        .input(input);

    if profile.no_colors {
        cmd = cmd.arg("--no-colors");
    }
    if profile.print_progress {
        cmd = cmd.arg("--print-progress");
    }
    if profile.output_file_flag {
        cmd = cmd.output_file(output_base_for(input));
    }

    if options.diarize {
        cmd = cmd.arg("--diarize");
    }
    let custom = options.custom.trim();
    if !custom.is_empty() {
        cmd = cmd.arg(custom);
    }

    cmd
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Architecture;
    use crate::transcribe::profile_for;

    fn build(arch: Architecture, options: &TranscriptionOptions) -> TranscriberCommand {
        build_command(
            Path::new("/opt/whisper/main"),
            Path::new("/opt/whisper/models"),
            Path::new("/media/talk.mp4"),
            options,
            profile_for(arch),
        )
    }

    #[test]
    fn test_gpu_port_flags() {
        for arch in Architecture::ALL {
            let args = build(arch, &TranscriptionOptions::default()).args;
            let has = |flag: &str| args.iter().any(|a| a == flag);

            if arch == Architecture::WinX64Gpu {
                assert!(has("--no-colors"));
                assert!(!has("--output-file"));
                assert!(!has("--print-progress"));
            } else {
                assert!(!has("--no-colors"), "{}", arch);
                assert!(has("--output-file"), "{}", arch);
                assert!(has("--print-progress"), "{}", arch);
            }
        }
    }

    #[test]
    fn test_argument_order() {
        let options = TranscriptionOptions {
            model: "base.en".to_string(),
            language: "en".to_string(),
            format: OutputFormat::Wts,
            max_len: 42,
            processors: 2,
            threads: 8,
            duration_ms: 60_000,
            diarize: true,
            custom: " --best-of 5 ".to_string(),
        };
        let cmd = build(Architecture::LinuxX64, &options);

        assert_eq!(
            cmd.args,
            vec![
                "--model",
                "/opt/whisper/models/ggml-base.en.bin",
                "--language",
                "en",
                "--output-words",
                "--max-len",
                "42",
                "--processors",
                "2",
                "--threads",
                "8",
                "--duration",
                "60000",
                "--file",
                "/media/talk.mp4",
                "--print-progress",
                "--output-file",
                "/media/talk",
                "--diarize",
                "--best-of 5",
            ]
        );
        assert_eq!(cmd.output_base, Some(PathBuf::from("/media/talk")));
        assert_eq!(cmd.argv()[0], "/opt/whisper/main");
    }

    #[test]
    fn test_gpu_port_ends_with_no_colors() {
        let cmd = build(Architecture::WinX64Gpu, &TranscriptionOptions::default());
        assert_eq!(cmd.args.last().map(String::as_str), Some("--no-colors"));
        assert_eq!(cmd.output_base, None);
    }
}
