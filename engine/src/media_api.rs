use std::{future::Future, pin::Pin};

use serde_json::Value;

use crate::{
    error::Result,
    media::{ImageResult, VideoResult},
    models::{AspectRatio, ImageModel, VideoModel},
};

pub mod gemini;
pub use gemini::{ClientOptions, GeminiClient};

pub type ApiFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T>> + Send + 'a>>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageRequest {
    pub prompt: String,
    pub model: ImageModel,
    pub aspect_ratio: AspectRatio,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VideoRequest {
    pub prompt: String,
    pub model: VideoModel,
    /// A `data:<mime>;base64,<payload>` URL
    pub source_image: Option<String>,
}

/// One request to the text model
#[derive(Debug, Clone, PartialEq)]
pub struct TextRequest {
    pub system_instruction: String,
    pub prompt: String,
    /// When set, the model must answer with a JSON document following it
    pub response_schema: Option<Value>,
}

/// A generative-media provider.
pub trait MediaApi {
    fn generate_image<'a>(&'a self, request: &'a ImageRequest) -> ApiFuture<'a, ImageResult>;

    /// Submits a video job and waits for it to finish
    fn generate_video<'a>(&'a self, request: &'a VideoRequest) -> ApiFuture<'a, VideoResult>;

    fn generate_text<'a>(&'a self, request: &'a TextRequest) -> ApiFuture<'a, String>;

    fn clone(&self) -> Box<dyn MediaApi + Send + Sync + 'static>;
}
