use std::fmt::Write as _;
use std::path::Path;
use tokio::fs;
use tracing::{debug, warn};

use crate::error::{Result, TtError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubtitleFormat {
    Srt,
    WebVtt,
}

impl SubtitleFormat {
    /// Format by file extension: `.srt` or `.vtt`
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let ext = path
            .as_ref()
            .extension()
            .map(|ext| ext.to_string_lossy().to_lowercase())
            .unwrap_or_default();
        match ext.as_str() {
            "srt" => Ok(Self::Srt),
            "vtt" => Ok(Self::WebVtt),
            _ => Err(TtError::UnsupportedFormat(format!(
                "{} is not an SRT or WebVTT file",
                path.as_ref().display()
            ))),
        }
    }
}

/// A single timed entry
#[derive(Debug, Clone, PartialEq)]
pub struct Cue {
    pub identifier: Option<String>,
    pub start_ms: u64,
    pub end_ms: u64,
    /// WebVTT cue settings after the timing, e.g. `align:start`
    pub settings: String,
    pub text: String,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SubtitleNode {
    /// The `WEBVTT` header block
    Header(String),
    /// NOTE, STYLE and REGION blocks, kept verbatim
    Block(String),
    Cue(Cue),
}

#[derive(Debug, Clone, PartialEq)]
pub struct SubtitleDocument {
    pub format: SubtitleFormat,
    pub nodes: Vec<SubtitleNode>,
}

impl SubtitleDocument {
    pub fn parse(content: &str, format: SubtitleFormat) -> Result<Self> {
        let content = content.trim_start_matches('\u{feff}').replace("\r\n", "\n");
        let mut nodes = Vec::new();

        for (index, block) in blocks(&content).into_iter().enumerate() {
            let first = block[0];

            if format == SubtitleFormat::WebVtt && index == 0 {
                if !first.starts_with("WEBVTT") {
                    return Err(TtError::Subtitle("Missing WEBVTT header".to_string()));
                }
                nodes.push(SubtitleNode::Header(block.join("\n")));
                continue;
            }

            if format == SubtitleFormat::WebVtt
                && ["NOTE", "STYLE", "REGION"]
                    .iter()
                    .any(|kw| first == *kw || first.starts_with(&format!("{} ", kw)))
            {
                nodes.push(SubtitleNode::Block(block.join("\n")));
                continue;
            }

            nodes.push(SubtitleNode::Cue(parse_cue(&block, index + 1)?));
        }

        debug!("Parsed {} subtitle nodes", nodes.len());
        Ok(Self { format, nodes })
    }

    pub fn cues(&self) -> impl Iterator<Item = &Cue> {
        self.nodes.iter().filter_map(|node| match node {
            SubtitleNode::Cue(cue) => Some(cue),
            _ => None,
        })
    }

    pub fn cue_count(&self) -> usize {
        self.cues().count()
    }

    /// Text of every cue that has any, flattened onto a single line, in
    /// document order. Cues without text are skipped so that one line in the
    /// translated text always belongs to exactly one cue.
    pub fn cue_lines(&self) -> Vec<String> {
        self.cues()
            .map(flattened_text)
            .filter(|line| !line.is_empty())
            .collect()
    }

    /// Replace the text of the cues listed by [`cue_lines`](Self::cue_lines),
    /// in order. Cues without text and every other node are left alone.
    pub fn replace_cue_text<S: AsRef<str>>(&mut self, lines: &[S]) -> Result<()> {
        let cues = self.cue_lines().len();
        if lines.len() < cues {
            return Err(TtError::Translation(format!(
                "Translated text has {} lines for {} cues",
                lines.len(),
                cues
            )));
        }
        if lines.len() > cues {
            warn!("Ignoring {} surplus translated lines", lines.len() - cues);
        }

        let cues = self.nodes.iter_mut().filter_map(|node| match node {
            SubtitleNode::Cue(cue) if !flattened_text(cue).is_empty() => Some(cue),
            _ => None,
        });
        for (cue, line) in cues.zip(lines) {
            cue.text = line.as_ref().trim_end().to_string();
        }
        Ok(())
    }

    pub fn serialize(&self) -> String {
        let mut out = String::new();
        let mut ordinal = 0;

        for node in &self.nodes {
            match node {
                SubtitleNode::Header(text) | SubtitleNode::Block(text) => {
                    out.push_str(text);
                    out.push_str("\n\n");
                }
                SubtitleNode::Cue(cue) => {
                    ordinal += 1;
                    match self.format {
                        SubtitleFormat::Srt => {
                            let id = cue.identifier.clone().unwrap_or_else(|| ordinal.to_string());
                            let _ = write!(
                                out,
                                "{}\n{} --> {}\n",
                                id,
                                format_srt_time(cue.start_ms),
                                format_srt_time(cue.end_ms)
                            );
                        }
                        SubtitleFormat::WebVtt => {
                            if let Some(id) = &cue.identifier {
                                out.push_str(id);
                                out.push('\n');
                            }
                            let _ = write!(
                                out,
                                "{} --> {}",
                                format_vtt_time(cue.start_ms),
                                format_vtt_time(cue.end_ms)
                            );
                            if !cue.settings.is_empty() {
                                out.push(' ');
                                out.push_str(&cue.settings);
                            }
                            out.push('\n');
                        }
                    }
                    out.push_str(&cue.text);
                    out.push_str("\n\n");
                }
            }
        }

        out
    }
}

/// Read and parse a subtitle file, format by extension
pub async fn read_subtitle<P: AsRef<Path>>(path: P) -> Result<SubtitleDocument> {
    let path = path.as_ref();
    let format = SubtitleFormat::from_path(path)?;
    let content = fs::read_to_string(path).await?;
    SubtitleDocument::parse(&content, format)
}

fn flattened_text(cue: &Cue) -> String {
    cue.text
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Split into blocks separated by blank lines
fn blocks(content: &str) -> Vec<Vec<&str>> {
    let mut blocks = Vec::new();
    let mut current = Vec::new();

    for line in content.lines() {
        if line.trim().is_empty() {
            if !current.is_empty() {
                blocks.push(std::mem::take(&mut current));
            }
        } else {
            current.push(line);
        }
    }
    if !current.is_empty() {
        blocks.push(current);
    }
    blocks
}

fn parse_cue(block: &[&str], block_no: usize) -> Result<Cue> {
    let (identifier, timing_at) = if block[0].contains("-->") {
        (None, 0)
    } else {
        (Some(block[0].trim().to_string()), 1)
    };

    let timing = block.get(timing_at).ok_or_else(|| {
        TtError::Subtitle(format!("Block {} has no timing line", block_no))
    })?;
    let (start, rest) = timing.split_once("-->").ok_or_else(|| {
        TtError::Subtitle(format!("Block {}: invalid timing line '{}'", block_no, timing))
    })?;

    let rest = rest.trim();
    let (end, settings) = match rest.split_once(char::is_whitespace) {
        Some((end, settings)) => (end, settings.trim()),
        None => (rest, ""),
    };

    Ok(Cue {
        identifier,
        start_ms: parse_time(start.trim()).ok_or_else(|| {
            TtError::Subtitle(format!("Block {}: invalid start time '{}'", block_no, start.trim()))
        })?,
        end_ms: parse_time(end).ok_or_else(|| {
            TtError::Subtitle(format!("Block {}: invalid end time '{}'", block_no, end))
        })?,
        settings: settings.to_string(),
        text: block[timing_at + 1..].join("\n"),
    })
}

/// `HH:MM:SS,mmm`, `HH:MM:SS.mmm` or `MM:SS.mmm` to milliseconds
fn parse_time(value: &str) -> Option<u64> {
    let (clock, millis) = value.split_once([',', '.'])?;
    let millis: u64 = millis.parse().ok()?;

    let parts = clock
        .split(':')
        .map(|part| part.parse::<u64>().ok())
        .collect::<Option<Vec<_>>>()?;
    let (hours, minutes, seconds) = match parts.as_slice() {
        [h, m, s] => (*h, *m, *s),
        [m, s] => (0, *m, *s),
        _ => return None,
    };

    Some(((hours * 60 + minutes) * 60 + seconds) * 1000 + millis)
}

/// Format milliseconds to SRT time format (HH:MM:SS,mmm)
fn format_srt_time(total_milliseconds: u64) -> String {
    let hours = total_milliseconds / 3_600_000;
    let minutes = (total_milliseconds % 3_600_000) / 60_000;
    let secs = (total_milliseconds % 60_000) / 1_000;
    let millis = total_milliseconds % 1_000;

    format!("{:02}:{:02}:{:02},{:03}", hours, minutes, secs, millis)
}

/// WebVTT uses a dot before the milliseconds
fn format_vtt_time(total_milliseconds: u64) -> String {
    format_srt_time(total_milliseconds).replacen(',', ".", 1)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SRT: &str = "1\n00:00:01,000 --> 00:00:03,500\nHello there.\n\n2\n00:00:04,000 --> 00:00:06,250\nHow are\nyou?\n\n";

    const VTT: &str = "WEBVTT - talk\n\nNOTE recorded live\n\nintro\n00:00.500 --> 00:02.000 align:start\nWelcome\n\n00:00:02.500 --> 00:00:04.000\nGoodbye\n";

    #[test]
    fn test_format_srt_time() {
        assert_eq!(format_srt_time(0), "00:00:00,000");
        assert_eq!(format_srt_time(65_123), "00:01:05,123");
        assert_eq!(format_srt_time(3_661_500), "01:01:01,500");
        assert_eq!(format_vtt_time(3_661_500), "01:01:01.500");
    }

    #[test]
    fn test_parse_time() {
        assert_eq!(parse_time("00:01:05,123"), Some(65_123));
        assert_eq!(parse_time("01:05.123"), Some(65_123));
        assert_eq!(parse_time("junk"), None);
    }

    #[test]
    fn test_parse_srt() {
        let doc = SubtitleDocument::parse(SRT, SubtitleFormat::Srt).unwrap();
        let cues: Vec<&Cue> = doc.cues().collect();
        assert_eq!(cues.len(), 2);
        assert_eq!(cues[0].identifier.as_deref(), Some("1"));
        assert_eq!(cues[0].start_ms, 1_000);
        assert_eq!(cues[1].end_ms, 6_250);
        assert_eq!(cues[1].text, "How are\nyou?");
        assert_eq!(doc.cue_lines(), vec!["Hello there.", "How are you?"]);
    }

    #[test]
    fn test_srt_serializes_back() {
        let doc = SubtitleDocument::parse(SRT, SubtitleFormat::Srt).unwrap();
        assert_eq!(doc.serialize(), SRT);
    }

    #[test]
    fn test_crlf_and_bom_are_accepted() {
        let windows = format!("\u{feff}{}", SRT.replace('\n', "\r\n"));
        let doc = SubtitleDocument::parse(&windows, SubtitleFormat::Srt).unwrap();
        assert_eq!(doc.cue_count(), 2);
    }

    #[test]
    fn test_parse_webvtt_keeps_structure() {
        let doc = SubtitleDocument::parse(VTT, SubtitleFormat::WebVtt).unwrap();
        assert_eq!(doc.nodes.len(), 4);
        assert_eq!(doc.nodes[0], SubtitleNode::Header("WEBVTT - talk".to_string()));
        assert_eq!(doc.nodes[1], SubtitleNode::Block("NOTE recorded live".to_string()));

        let cues: Vec<&Cue> = doc.cues().collect();
        assert_eq!(cues[0].identifier.as_deref(), Some("intro"));
        assert_eq!(cues[0].settings, "align:start");
        assert_eq!(cues[0].start_ms, 500);
        assert_eq!(cues[1].identifier, None);
    }

    #[test]
    fn test_webvtt_replacement_skips_header_and_notes() {
        let mut doc = SubtitleDocument::parse(VTT, SubtitleFormat::WebVtt).unwrap();
        doc.replace_cue_text(&["Willkommen", "Auf Wiedersehen"]).unwrap();

        let out = doc.serialize();
        assert!(out.starts_with("WEBVTT - talk\n\nNOTE recorded live\n\n"));
        assert!(out.contains("intro\n00:00:00.500 --> 00:00:02.000 align:start\nWillkommen\n"));
        assert!(out.contains("00:00:02.500 --> 00:00:04.000\nAuf Wiedersehen\n"));
    }

    #[test]
    fn test_cues_without_text_are_left_out_and_kept() {
        let srt = "1\n00:00:01,000 --> 00:00:02,000\n\n2\n00:00:02,000 --> 00:00:03,000\nHello\n\n3\n00:00:03,000 --> 00:00:04,000\n\n";
        let mut doc = SubtitleDocument::parse(srt, SubtitleFormat::Srt).unwrap();
        assert_eq!(doc.cue_count(), 3);
        assert_eq!(doc.cue_lines(), vec!["Hello"]);

        doc.replace_cue_text(&["Hallo"]).unwrap();
        let texts: Vec<&str> = doc.cues().map(|cue| cue.text.as_str()).collect();
        assert_eq!(texts, vec!["", "Hallo", ""]);
        assert_eq!(SubtitleDocument::parse(&doc.serialize(), SubtitleFormat::Srt).unwrap().cue_count(), 3);
    }

    #[test]
    fn test_too_few_lines_is_an_error() {
        let mut doc = SubtitleDocument::parse(SRT, SubtitleFormat::Srt).unwrap();
        assert!(doc.replace_cue_text(&["Hallo"]).is_err());
    }

    #[test]
    fn test_malformed_input() {
        assert!(SubtitleDocument::parse("1\nno timing here\nText\n", SubtitleFormat::Srt).is_err());
        assert!(SubtitleDocument::parse("00:01.000 --> 00:02.000\nHi\n", SubtitleFormat::WebVtt).is_err());
        assert!(SubtitleFormat::from_path("movie.ass").is_err());
        assert_eq!(SubtitleFormat::from_path("movie.VTT").unwrap(), SubtitleFormat::WebVtt);
    }
}
