use std::path::{Path, PathBuf};

use chrono::Utc;
use color_eyre::{
    Result,
    eyre::{WrapErr, eyre},
};
use log::info;

use crate::media::{GenerationResult, MediaHandle};

pub const MAX_FILENAME_LEN: usize = 50;

/// Turns free text into something usable as a file name: lower case, only
/// `[a-z0-9_]`, runs of whitespace and hyphens collapsed into one underscore,
/// at most `max_len` characters.
pub fn sanitize_filename(text: &str, max_len: usize) -> String {
    let text = text.trim();
    if text.is_empty() {
        return "untitled".into();
    }

    let mut out = String::with_capacity(text.len());
    let mut in_separator = false;
    for ch in text.to_lowercase().chars() {
        if ch.is_whitespace() || ch == '-' {
            if !in_separator {
                out.push('_');
                in_separator = true;
            }
        } else if ch.is_ascii_alphanumeric() || ch == '_' {
            out.push(ch);
            in_separator = false;
        }
    }

    out.chars().take(max_len).collect()
}

/// `{sanitized prompt}_{unix millis}.{extension}`
pub fn media_filename(prompt: &str, extension: &str) -> String {
    format!(
        "{}_{}.{extension}",
        sanitize_filename(prompt, MAX_FILENAME_LEN),
        Utc::now().timestamp_millis()
    )
}

/// Writes generated media into `dir`, named after the prompt.
pub fn save_media(dir: &Path, prompt: &str, extension: &str, data: &[u8]) -> Result<PathBuf> {
    std::fs::create_dir_all(dir)
        .wrap_err_with(|| format!("creating download dir {}", dir.display()))?;
    let path = dir.join(media_filename(prompt, extension));
    std::fs::write(&path, data).wrap_err_with(|| format!("writing {}", path.display()))?;
    info!("saved {} bytes to {}", data.len(), path.display());
    Ok(path)
}

/// Saves all media of `result`: images as `.jpeg`, videos as `.mp4`
pub fn save_result(dir: &Path, result: &GenerationResult) -> Result<Vec<PathBuf>> {
    let save = |prompt: &str, ext: &str, media: &MediaHandle| {
        let data = media
            .data()
            .ok_or_else(|| eyre!("the {ext} for {prompt:?} was already released"))?;
        save_media(dir, prompt, ext, data)
    };

    Ok(match result {
        GenerationResult::Image(img) => vec![save(&img.prompt, "jpeg", &img.media)?],
        GenerationResult::Video(vid) => vec![save(&vid.prompt, "mp4", &vid.media)?],
        GenerationResult::ImageToVideo(pair) => vec![
            save(&pair.image_prompt, "jpeg", &pair.image)?,
            save(&pair.video_prompt, "mp4", &pair.video)?,
        ],
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sanitizes_punctuation_and_separators() {
        assert_eq!(
            sanitize_filename("Hello, World! -- Test", MAX_FILENAME_LEN),
            "hello_world_test"
        );
        assert_eq!(
            sanitize_filename("  A neon   cat\tdriving  ", MAX_FILENAME_LEN),
            "a_neon_cat_driving"
        );
        assert_eq!(sanitize_filename("snake_case-ok", MAX_FILENAME_LEN), "snake_case_ok");
    }

    #[test]
    fn empty_text_is_untitled() {
        assert_eq!(sanitize_filename("", MAX_FILENAME_LEN), "untitled");
        assert_eq!(sanitize_filename("   ", MAX_FILENAME_LEN), "untitled");
    }

    #[test]
    fn truncates_to_max_len() {
        let long = "word ".repeat(30);
        let name = sanitize_filename(&long, MAX_FILENAME_LEN);
        assert_eq!(name.len(), 50);
        assert!(name.starts_with("word_word_"));
    }

    #[test]
    fn saves_media_into_dir() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("downloads");
        let path = save_media(&target, "A red rose!", "jpeg", b"jpegdata").unwrap();

        let name = path.file_name().unwrap().to_str().unwrap();
        assert!(name.starts_with("a_red_rose_"), "{name}");
        assert!(name.ends_with(".jpeg"));
        assert_eq!(std::fs::read(&path).unwrap(), b"jpegdata");
    }

    #[test]
    fn saves_both_halves_of_a_pair() {
        use crate::media::ImageToVideoResult;

        let dir = tempfile::tempdir().unwrap();
        let pair = ImageToVideoResult {
            image: MediaHandle::new("image/jpeg", b"img".to_vec()),
            video: MediaHandle::new("video/mp4", b"vid".to_vec()),
            image_prompt: "rose".into(),
            video_prompt: "dew rolls".into(),
        };

        let paths = save_result(dir.path(), &pair.into()).unwrap();
        assert_eq!(paths.len(), 2);
        assert!(paths[0].to_string_lossy().ends_with(".jpeg"));
        assert!(paths[1].file_name().unwrap().to_string_lossy().starts_with("dew_rolls_"));
        assert_eq!(std::fs::read(&paths[1]).unwrap(), b"vid");
    }
}
