use anyhow::{Context, Result};
use chrono::Local;
use std::fs;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

// @module: File and directory utilities

/// Video file extensions accepted for submission
pub const VIDEO_EXTENSIONS: &[&str] = &["mp4", "mkv", "avi", "mov", "wmv", "flv", "webm"];

// @struct: File operations utility
pub struct FileManager;

impl FileManager {
    // @checks: File existence
    pub fn file_exists<P: AsRef<Path>>(path: P) -> bool {
        path.as_ref().exists() && path.as_ref().is_file()
    }

    // @creates: Directory and parents if needed
    pub fn ensure_dir<P: AsRef<Path>>(path: P) -> Result<()> {
        let path = path.as_ref();
        if !path.exists() {
            fs::create_dir_all(path)?;
        }
        Ok(())
    }

    /// Whether the path looks like a video file we can process
    pub fn is_video_file<P: AsRef<Path>>(path: P) -> bool {
        let path = path.as_ref();
        if !Self::file_exists(path) {
            return false;
        }
        path.extension()
            .map(|ext| {
                let ext = ext.to_string_lossy();
                VIDEO_EXTENSIONS.iter().any(|v| ext.eq_ignore_ascii_case(v))
            })
            .unwrap_or(false)
    }

    /// Find all video files in a directory (recursive), ordered by file name
    /// so the processing order matches a directory listing regardless of
    /// nesting depth
    pub fn find_video_files<P: AsRef<Path>>(dir: P) -> Result<Vec<PathBuf>> {
        let mut result = Vec::new();
        for entry in WalkDir::new(dir.as_ref()).follow_links(true) {
            let entry = entry.context("Failed to read directory entry")?;
            let path = entry.path();
            if path.is_file() && Self::is_video_file(path) {
                result.push(path.to_path_buf());
            }
        }
        result.sort_by(|a, b| a.file_name().cmp(&b.file_name()).then_with(|| a.cmp(b)));
        Ok(result)
    }
}

/// Intermediate and output file locations for one video job
#[derive(Debug, Clone)]
pub struct CachePaths {
    /// Extracted audio track
    pub audio: PathBuf,
    /// Transcript subtitle file (source language only)
    pub transcript_srt: PathBuf,
    /// Bilingual subtitle file
    pub bilingual_srt: PathBuf,
    /// Burned-in output video, next to the input
    pub output_video: PathBuf,
}

impl CachePaths {
    /// Derive cache paths the way the rest of the pipeline expects them.
    /// The output video carries a timestamp so repeated runs never clobber
    /// an earlier result.
    pub fn for_video(video_path: &Path, cache_dir: &Path) -> Self {
        let stem = video_path
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_else(|| "video".to_string());
        let ext = video_path
            .extension()
            .map(|e| format!(".{}", e.to_string_lossy()))
            .unwrap_or_default();
        let parent = video_path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));

        let stamp = Local::now().format("%Y%m%d_%H%M%S");

        Self {
            audio: cache_dir.join(format!("{}_audio.wav", stem)),
            transcript_srt: cache_dir.join(format!("{}_output.srt", stem)),
            bilingual_srt: cache_dir.join(format!("{}_bilingual.srt", stem)),
            output_video: parent.join(format!("{}_subtitled_{}{}", stem, stamp, ext)),
        }
    }
}
