use anyhow::{anyhow, Context, Result};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::path::Path;

// @module: Subtitle parsing, formatting and bilingual output

// @const: SRT timestamp regex
static TIMESTAMP_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(\d{2}):(\d{2}):(\d{2}),(\d{3}) --> (\d{2}):(\d{2}):(\d{2}),(\d{3})").unwrap()
});

/// A single subtitle segment.
///
/// `index` is the original ordering position and must survive batching and
/// translation unchanged: translation never drops, reorders or merges segments.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubtitleSegment {
    // @field: Original ordering position (0-based)
    pub index: usize,

    // @field: Start time in ms
    pub start_time_ms: u64,

    // @field: End time in ms
    pub end_time_ms: u64,

    // @field: Transcribed text
    pub source_text: String,

    // @field: Translated text, empty until the translation stage fills it
    #[serde(default)]
    pub translated_text: String,
}

impl SubtitleSegment {
    pub fn new(index: usize, start_time_ms: u64, end_time_ms: u64, source_text: String) -> Self {
        SubtitleSegment {
            index,
            start_time_ms,
            end_time_ms,
            source_text,
            translated_text: String::new(),
        }
    }

    /// Parse an SRT timestamp (HH:MM:SS,mmm) to milliseconds
    pub fn parse_timestamp(timestamp: &str) -> Result<u64> {
        let parts: Vec<&str> = timestamp.split(&[':', ',', '.'][..]).collect();

        if parts.len() != 4 {
            return Err(anyhow!("Invalid timestamp format: {}", timestamp));
        }

        let hours: u64 = parts[0].parse().context("Failed to parse hours")?;
        let minutes: u64 = parts[1].parse().context("Failed to parse minutes")?;
        let seconds: u64 = parts[2].parse().context("Failed to parse seconds")?;
        let millis: u64 = parts[3].parse().context("Failed to parse milliseconds")?;

        if minutes >= 60 || seconds >= 60 || millis >= 1000 {
            return Err(anyhow!("Invalid time components in timestamp: {}", timestamp));
        }

        Ok(hours * 3_600_000 + minutes * 60_000 + seconds * 1_000 + millis)
    }

    /// Format a timestamp in milliseconds to SRT format (HH:MM:SS,mmm)
    pub fn format_timestamp(ms: u64) -> String {
        let hours = ms / 3_600_000;
        let minutes = (ms % 3_600_000) / 60_000;
        let seconds = (ms % 60_000) / 1_000;
        let millis = ms % 1_000;

        format!("{:02}:{:02}:{:02},{:03}", hours, minutes, seconds, millis)
    }

    fn format_start_time(&self) -> String {
        Self::format_timestamp(self.start_time_ms)
    }

    fn format_end_time(&self) -> String {
        Self::format_timestamp(self.end_time_ms)
    }
}

impl fmt::Display for SubtitleSegment {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        writeln!(f, "{}", self.index + 1)?;
        writeln!(f, "{} --> {}", self.format_start_time(), self.format_end_time())?;
        writeln!(f, "{}", self.source_text)?;
        if !self.translated_text.is_empty() && self.translated_text != self.source_text {
            writeln!(f, "{}", self.translated_text)?;
        }
        writeln!(f)
    }
}

/// Ordered collection of subtitle segments for one video
#[derive(Debug, Default)]
pub struct SubtitleDocument {
    /// List of segments in index order
    pub segments: Vec<SubtitleSegment>,
}

impl SubtitleDocument {
    pub fn new(segments: Vec<SubtitleSegment>) -> Self {
        SubtitleDocument { segments }
    }

    /// Parse SRT content into segments.
    ///
    /// Tolerant of blank lines and stray sequence numbers; segments are
    /// re-indexed from 0 in encounter order.
    pub fn parse_srt_string(content: &str) -> Result<Vec<SubtitleSegment>> {
        let mut segments = Vec::new();
        let mut current_times: Option<(u64, u64)> = None;
        let mut current_text: Vec<String> = Vec::new();

        let mut flush =
            |times: &mut Option<(u64, u64)>, text: &mut Vec<String>, segments: &mut Vec<SubtitleSegment>| {
                if let Some((start, end)) = times.take() {
                    let joined = text.join("\n");
                    if !joined.trim().is_empty() {
                        segments.push(SubtitleSegment::new(
                            segments.len(),
                            start,
                            end,
                            joined.trim().to_string(),
                        ));
                    }
                }
                text.clear();
            };

        // A digit-only line inside a block is ambiguous until the next line:
        // followed by a timecode it is the next block's sequence number,
        // otherwise it is genuine subtitle text
        let mut held_number: Option<String> = None;

        for line in content.lines() {
            let line = line.trim_end_matches('\r');
            if line.trim().is_empty() {
                if let Some(number) = held_number.take() {
                    current_text.push(number);
                }
                flush(&mut current_times, &mut current_text, &mut segments);
                continue;
            }

            if let Some(caps) = TIMESTAMP_REGEX.captures(line) {
                // A new timecode starts the next block even without a blank
                // line; a held digit line was that block's sequence number
                held_number = None;
                flush(&mut current_times, &mut current_text, &mut segments);
                let start = Self::capture_to_ms(&caps, 1)?;
                let end = Self::capture_to_ms(&caps, 5)?;
                current_times = Some((start, end));
                continue;
            }

            if let Some(number) = held_number.take() {
                current_text.push(number);
            }

            if line.trim().chars().all(|c| c.is_ascii_digit()) {
                // Sequence numbers before the first timecode are ignored;
                // SRT renumbering happens on write anyway
                if current_times.is_some() {
                    held_number = Some(line.trim().to_string());
                }
                continue;
            }

            if current_times.is_some() {
                current_text.push(line.trim().to_string());
            }
        }
        if let Some(number) = held_number.take() {
            current_text.push(number);
        }
        flush(&mut current_times, &mut current_text, &mut segments);

        Ok(segments)
    }

    fn capture_to_ms(caps: &regex::Captures, start_idx: usize) -> Result<u64> {
        let hours: u64 = caps[start_idx].parse()?;
        let minutes: u64 = caps[start_idx + 1].parse()?;
        let seconds: u64 = caps[start_idx + 2].parse()?;
        let millis: u64 = caps[start_idx + 3].parse()?;
        Ok(hours * 3_600_000 + minutes * 60_000 + seconds * 1_000 + millis)
    }

    /// Parse an SRT file from disk
    pub fn parse_srt_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path.as_ref())
            .with_context(|| format!("Failed to read subtitle file: {:?}", path.as_ref()))?;
        Ok(Self::new(Self::parse_srt_string(&content)?))
    }

    /// Render the document as bilingual SRT text: source line plus translated
    /// line per block, or a single line when no translation exists
    pub fn to_srt_string(&self) -> String {
        let mut out = String::new();
        for segment in &self.segments {
            out.push_str(&segment.to_string());
        }
        out
    }

    /// Write the document to an SRT file
    pub fn write_to_srt<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, self.to_srt_string())
            .with_context(|| format!("Failed to write subtitle file: {:?}", path))?;
        Ok(())
    }

    /// Write a placeholder subtitle file for a video with no audio track
    pub fn write_placeholder<P: AsRef<Path>>(path: P, duration_secs: f64) -> Result<()> {
        let end_ms = (duration_secs.max(1.0) * 1000.0) as u64;
        let doc = SubtitleDocument::new(vec![SubtitleSegment::new(
            0,
            0,
            end_ms,
            "[no speech detected]".to_string(),
        )]);
        doc.write_to_srt(path)
    }
}
