use std::fmt;
use std::str::FromStr;

use crate::config::Architecture;
use crate::error::{Result, TtError};

/// Output formats the transcriber can write
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OutputFormat {
    Srt,
    Txt,
    Vtt,
    Lrc,
    /// Karaoke video script, passed to the executable as `--output-words`
    Wts,
    Csv,
    Json,
}

impl OutputFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            Self::Srt => "srt",
            Self::Txt => "txt",
            Self::Vtt => "vtt",
            Self::Lrc => "lrc",
            Self::Wts => "wts",
            Self::Csv => "csv",
            Self::Json => "json",
        }
    }

    /// Suffix of the `--output-<flag>` argument
    pub fn flag(&self) -> &'static str {
        match self {
            Self::Wts => "words",
            other => other.extension(),
        }
    }

    /// Formats whose transcripts can be handed to the translation pipeline
    pub fn is_translatable(&self) -> bool {
        matches!(self, Self::Srt | Self::Vtt)
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

impl FromStr for OutputFormat {
    type Err = TtError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().trim_start_matches('.').to_lowercase().as_str() {
            "srt" => Ok(Self::Srt),
            "txt" => Ok(Self::Txt),
            "vtt" => Ok(Self::Vtt),
            "lrc" => Ok(Self::Lrc),
            "wts" | "words" => Ok(Self::Wts),
            "csv" => Ok(Self::Csv),
            "json" => Ok(Self::Json),
            other => Err(TtError::UnsupportedFormat(format!("Unknown output format: {}", other))),
        }
    }
}

const BASIC_FORMATS: [OutputFormat; 3] = [OutputFormat::Srt, OutputFormat::Txt, OutputFormat::Vtt];

const ALL_FORMATS: [OutputFormat; 7] = [
    OutputFormat::Srt,
    OutputFormat::Txt,
    OutputFormat::Vtt,
    OutputFormat::Lrc,
    OutputFormat::Wts,
    OutputFormat::Csv,
    OutputFormat::Json,
];

/// What a transcriber port accepts on its command line
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArchProfile {
    pub architecture: Architecture,
    pub output_formats: &'static [OutputFormat],
    /// `--print-progress` is understood
    pub print_progress: bool,
    /// `--output-file <base>` is understood; otherwise the executable picks
    /// the location itself
    pub output_file_flag: bool,
    /// `--no-colors` has to be passed
    pub no_colors: bool,
    /// Models need the CoreML encoder bundle next to the binary
    pub coreml: bool,
}

impl ArchProfile {
    pub fn supports(&self, format: OutputFormat) -> bool {
        self.output_formats.contains(&format)
    }
}

const fn generic(architecture: Architecture, coreml: bool) -> ArchProfile {
    ArchProfile {
        architecture,
        output_formats: &ALL_FORMATS,
        print_progress: true,
        output_file_flag: true,
        no_colors: false,
        coreml,
    }
}

pub const ARCH_PROFILES: [ArchProfile; 6] = [
    ArchProfile {
        architecture: Architecture::WinX64Gpu,
        output_formats: &BASIC_FORMATS,
        print_progress: false,
        output_file_flag: false,
        no_colors: true,
        coreml: false,
    },
    generic(Architecture::WinX64, false),
    generic(Architecture::DarwinArm64, true),
    generic(Architecture::DarwinX64, false),
    generic(Architecture::LinuxX64, false),
    generic(Architecture::None, false),
];

pub fn profile_for(architecture: Architecture) -> &'static ArchProfile {
    ARCH_PROFILES
        .iter()
        .find(|profile| profile.architecture == architecture)
        .unwrap_or(&ARCH_PROFILES[ARCH_PROFILES.len() - 1])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_architecture_has_a_profile() {
        for arch in Architecture::ALL {
            assert_eq!(profile_for(arch).architecture, arch);
        }
    }

    #[test]
    fn test_gpu_port_formats() {
        let gpu = profile_for(Architecture::WinX64Gpu);
        assert!(gpu.supports(OutputFormat::Srt));
        assert!(gpu.supports(OutputFormat::Vtt));
        assert!(!gpu.supports(OutputFormat::Json));
        assert!(!gpu.supports(OutputFormat::Wts));
        assert!(profile_for(Architecture::LinuxX64).supports(OutputFormat::Wts));
    }

    #[test]
    fn test_only_darwin_arm64_needs_coreml() {
        for arch in Architecture::ALL {
            assert_eq!(profile_for(arch).coreml, arch == Architecture::DarwinArm64);
        }
    }

    #[test]
    fn test_format_parsing_and_flags() {
        assert_eq!("SRT".parse::<OutputFormat>().unwrap(), OutputFormat::Srt);
        assert_eq!(".vtt".parse::<OutputFormat>().unwrap(), OutputFormat::Vtt);
        assert_eq!("wts".parse::<OutputFormat>().unwrap().flag(), "words");
        assert!("mp3".parse::<OutputFormat>().is_err());
    }

    #[test]
    fn test_transfer_set() {
        let translatable: Vec<_> = ALL_FORMATS.iter().filter(|f| f.is_translatable()).collect();
        assert_eq!(translatable, vec![&OutputFormat::Srt, &OutputFormat::Vtt]);
    }
}
