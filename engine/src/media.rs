//! Generated media and the transient in-memory handles that back them.
//!
//! A [`MediaHandle`] owns the bytes of one generated image or video. Results
//! are cheap to clone (the bytes are reference counted), but a handle must be
//! explicitly released once its result leaves the recent-results collection.

use base64::{Engine as _, engine::general_purpose::STANDARD as BASE64};
use bytes::Bytes;
use derive_more::From;
use log::debug;

use crate::error::{GenerationError, Result};

/// Something that holds transient resources which must be given back
/// explicitly.
pub trait Release {
    /// Frees the resources. Returns `false` when they were already released.
    fn release(&mut self) -> bool;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaHandle {
    mime_type: String,
    data: Option<Bytes>,
}

impl MediaHandle {
    pub fn new(mime_type: impl Into<String>, data: impl Into<Bytes>) -> Self {
        Self {
            mime_type: mime_type.into(),
            data: Some(data.into()),
        }
    }

    pub fn mime_type(&self) -> &str {
        &self.mime_type
    }

    /// `None` once the handle has been released
    pub fn data(&self) -> Option<&Bytes> {
        self.data.as_ref()
    }

    pub fn is_live(&self) -> bool {
        self.data.is_some()
    }

    /// Encodes the bytes as a `data:` URL, the format the video endpoint
    /// accepts for source images.
    pub fn to_data_url(&self) -> Option<String> {
        self.data
            .as_ref()
            .map(|d| format!("data:{};base64,{}", self.mime_type, BASE64.encode(d)))
    }
}

impl Release for MediaHandle {
    fn release(&mut self) -> bool {
        match self.data.take() {
            Some(data) => {
                debug!("released {} bytes of {}", data.len(), self.mime_type);
                true
            }
            None => false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageResult {
    pub prompt: String,
    pub media: MediaHandle,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VideoResult {
    pub prompt: String,
    pub media: MediaHandle,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageToVideoResult {
    pub image: MediaHandle,
    pub video: MediaHandle,
    pub image_prompt: String,
    pub video_prompt: String,
}

impl Release for ImageResult {
    fn release(&mut self) -> bool {
        self.media.release()
    }
}

impl Release for VideoResult {
    fn release(&mut self) -> bool {
        self.media.release()
    }
}

impl Release for ImageToVideoResult {
    fn release(&mut self) -> bool {
        let image = self.image.release();
        let video = self.video.release();
        image || video
    }
}

/// A finished generation of any feature
#[derive(Debug, Clone, From)]
pub enum GenerationResult {
    Image(ImageResult),
    Video(VideoResult),
    ImageToVideo(ImageToVideoResult),
}

/// A `data:` URL split into its parts
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InlineImage {
    pub mime_type: String,
    pub data: String,
}

/// Splits `data:<mime>;base64,<payload>` into MIME type and payload.
pub fn split_data_url(url: &str) -> Result<InlineImage> {
    let (head, data) = url
        .split_once(";base64,")
        .ok_or(GenerationError::InvalidImageFormat)?;
    let (_, mime_type) = head
        .split_once(':')
        .ok_or(GenerationError::InvalidImageFormat)?;

    if mime_type.is_empty() || data.is_empty() {
        return Err(GenerationError::InvalidImageFormat);
    }

    Ok(InlineImage {
        mime_type: mime_type.to_string(),
        data: data.to_string(),
    })
}

/// MIME type for an image file, judged by its extension
pub fn image_mime_for_extension(ext: &str) -> Option<&'static str> {
    Some(match ext.to_ascii_lowercase().as_str() {
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "webp" => "image/webp",
        "gif" => "image/gif",
        _ => return None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_data_url() {
        let img = split_data_url("data:image/png;base64,AAAA").unwrap();
        assert_eq!(img.mime_type, "image/png");
        assert_eq!(img.data, "AAAA");
    }

    #[test]
    fn rejects_malformed_data_urls() {
        for bad in [
            "image/png,AAAA",
            "data:image/png,AAAA",
            "image/png;base64,AAAA",
            "data:;base64,AAAA",
        ] {
            assert!(
                matches!(split_data_url(bad), Err(GenerationError::InvalidImageFormat)),
                "{bad} should be rejected"
            );
        }
    }

    #[test]
    fn data_url_round_trip_from_handle() {
        let handle = MediaHandle::new("image/jpeg", vec![1u8, 2, 3]);
        let url = handle.to_data_url().unwrap();
        assert_eq!(url, "data:image/jpeg;base64,AQID");
        assert_eq!(split_data_url(&url).unwrap().data, "AQID");
    }

    #[test]
    fn release_is_reported_once() {
        let mut handle = MediaHandle::new("video/mp4", vec![0u8; 16]);
        assert!(handle.release());
        assert!(!handle.is_live());
        assert!(!handle.release());
        assert_eq!(handle.to_data_url(), None);
    }

    #[test]
    fn pair_release_frees_both_handles() {
        let mut pair = ImageToVideoResult {
            image: MediaHandle::new("image/jpeg", vec![1u8]),
            video: MediaHandle::new("video/mp4", vec![2u8]),
            image_prompt: "rose".into(),
            video_prompt: "dew rolls".into(),
        };
        assert!(pair.release());
        assert!(!pair.image.is_live());
        assert!(!pair.video.is_live());
        assert!(!pair.release());
    }
}
