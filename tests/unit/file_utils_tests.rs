/*!
 * Tests for file discovery and cache path derivation
 */

use std::path::Path;

use subweave::file_utils::{CachePaths, FileManager};

use crate::common;

#[test]
fn test_is_video_file_withKnownExtensions_shouldMatchCaseInsensitively() {
    let temp_dir = common::create_temp_dir().unwrap();

    let mkv = common::create_fake_video(temp_dir.path(), "movie.MKV").unwrap();
    assert!(FileManager::is_video_file(&mkv));

    let txt = common::create_test_file(temp_dir.path(), "notes.txt", "text").unwrap();
    assert!(!FileManager::is_video_file(&txt));

    // Extension alone is not enough; the file must exist
    assert!(!FileManager::is_video_file(temp_dir.path().join("ghost.mp4")));
}

#[test]
fn test_find_video_files_shouldRecurseAndSort() {
    let temp_dir = common::create_temp_dir().unwrap();
    let nested = temp_dir.path().join("season1");
    FileManager::ensure_dir(&nested).unwrap();

    common::create_fake_video(temp_dir.path(), "b_movie.mp4").unwrap();
    common::create_fake_video(&nested, "a_episode.mkv").unwrap();
    common::create_test_file(temp_dir.path(), "readme.md", "docs").unwrap();

    let found = FileManager::find_video_files(temp_dir.path()).unwrap();

    assert_eq!(found.len(), 2);
    assert!(found[0].ends_with("season1/a_episode.mkv"));
    assert!(found[1].ends_with("b_movie.mp4"));
}

#[test]
fn test_cache_paths_shouldDeriveFromVideoStem() {
    let video = Path::new("/videos/holiday.mp4");
    let cache = Path::new("/tmp/subweave-cache");

    let paths = CachePaths::for_video(video, cache);

    assert_eq!(paths.audio, cache.join("holiday_audio.wav"));
    assert_eq!(paths.transcript_srt, cache.join("holiday_output.srt"));
    assert_eq!(paths.bilingual_srt, cache.join("holiday_bilingual.srt"));

    // The output video lands next to the input, timestamped, same extension
    let name = paths.output_video.file_name().unwrap().to_string_lossy().to_string();
    assert!(name.starts_with("holiday_subtitled_"));
    assert!(name.ends_with(".mp4"));
    assert_eq!(paths.output_video.parent(), Some(Path::new("/videos")));
}
