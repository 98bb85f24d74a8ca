use color_eyre::Result;
use log::{debug, info};

use crate::{
    ApiKey, KeyStore,
    bulk::{BulkEvent, BulkJob, CancelToken, failure_message},
    collection::BoundedCollection,
    error::GenerationError,
    feature::PairRequest,
    media::{ImageResult, ImageToVideoResult, Release, VideoResult},
    media_api::{ClientOptions, GeminiClient, ImageRequest, VideoRequest},
    prompt::StructuredPromptSpec,
};

/// Prompt text a request was made from, used in progress and error messages
pub trait Prompted {
    fn prompt(&self) -> &str;
}

impl Prompted for String {
    fn prompt(&self) -> &str {
        self
    }
}

impl Prompted for ImageRequest {
    fn prompt(&self) -> &str {
        &self.prompt
    }
}

impl Prompted for VideoRequest {
    fn prompt(&self) -> &str {
        &self.prompt
    }
}

impl Prompted for PairRequest {
    fn prompt(&self) -> &str {
        &self.image.prompt
    }
}

impl Prompted for StructuredPromptSpec {
    fn prompt(&self) -> &str {
        &self.idea
    }
}

/// What one feature shows: its recent results, the result on display, and the
/// state of its running job.
#[derive(Debug)]
pub struct FeatureState<T: Release> {
    pub collection: BoundedCollection<T>,
    pub current: Option<T>,
    pub progress: Option<String>,
    pub error: Option<String>,
    /// Word used in error messages: "prompt", or "set" for image-to-video
    label: &'static str,
    job: Option<ActiveJob>,
}

#[derive(Debug)]
struct ActiveJob {
    token: CancelToken,
    bulk: bool,
}

impl<T: Release + Clone> FeatureState<T> {
    pub fn new(label: &'static str) -> Self {
        Self {
            collection: BoundedCollection::new(),
            current: None,
            progress: None,
            error: None,
            label,
            job: None,
        }
    }

    /// Supersedes whatever job was running and resets the display. Events
    /// must be applied with the returned token.
    pub fn begin_job<R>(&mut self, job: &BulkJob<R>) -> CancelToken {
        if let Some(previous) = self.job.take() {
            info!("superseding running {} job", self.label);
            previous.token.cancel();
        }
        self.current = None;
        self.error = None;
        self.progress = None;

        let token = CancelToken::new();
        self.job = Some(ActiveJob {
            token: token.clone(),
            bulk: job.is_bulk(),
        });
        token
    }

    pub fn cancel_job(&mut self) {
        if let Some(job) = self.job.take() {
            job.token.cancel();
        }
        self.progress = None;
    }

    pub fn is_running(&self) -> bool {
        self.job.as_ref().is_some_and(|j| !j.token.is_cancelled())
    }

    /// Applies an event of the job owning `token`. Events of superseded or
    /// cancelled jobs are dropped.
    pub fn apply<R: Prompted>(&mut self, token: &CancelToken, event: &BulkEvent<R, T>) {
        let Some(job) = self.job.as_ref().filter(|j| j.token.is_same(token)) else {
            debug!("dropping event of a stale {} job", self.label);
            return;
        };
        let bulk = job.bulk;

        match event {
            BulkEvent::Started { index, total } => {
                self.progress = Some(format!("Generating {}/{total}", index + 1));
            }
            BulkEvent::Succeeded { result, .. } => {
                self.current = Some(result.clone());
                self.collection.push(result.clone());
            }
            BulkEvent::Waiting { delay } => {
                self.progress = Some(format!("Waiting {}s...", delay.as_secs()));
            }
            BulkEvent::Failed {
                index,
                request,
                error,
            } => {
                self.error = Some(if bulk {
                    failure_message(self.label, *index, request.prompt(), error)
                } else {
                    error.to_string()
                });
                self.finish();
            }
            BulkEvent::Cancelled { .. } | BulkEvent::Completed { .. } => self.finish(),
        }
    }

    fn finish(&mut self) {
        self.progress = None;
        self.job = None;
    }

    pub fn clear(&mut self) {
        self.cancel_job();
        self.collection.clear();
        if let Some(mut current) = self.current.take() {
            current.release();
        }
        self.error = None;
    }
}

/// Everything the front end keeps between generations
#[derive(Debug)]
pub struct AppContext {
    key_store: KeyStore,
    api_key: Option<ApiKey>,
    pub images: FeatureState<ImageResult>,
    pub videos: FeatureState<VideoResult>,
    pub pairs: FeatureState<ImageToVideoResult>,
    /// Prompts generated by the assembler, in generation order
    pub prompts: Vec<String>,
}

impl AppContext {
    /// Reads the stored key, if any
    pub fn load(key_store: KeyStore) -> Result<Self> {
        let api_key = key_store.load()?;
        info!(
            "loaded context, API key {}",
            if api_key.is_some() { "present" } else { "missing" }
        );
        Ok(Self {
            key_store,
            api_key,
            images: FeatureState::new("prompt"),
            videos: FeatureState::new("prompt"),
            pairs: FeatureState::new("set"),
            prompts: vec![],
        })
    }

    pub fn api_key(&self) -> Option<&ApiKey> {
        self.api_key.as_ref()
    }

    pub fn require_key(&self) -> Result<&ApiKey, GenerationError> {
        self.api_key.as_ref().ok_or_else(GenerationError::missing_key)
    }

    /// Uses `key` for this session only
    pub fn use_api_key(&mut self, key: ApiKey) {
        self.api_key = Some(key);
    }

    /// Uses `key` and stores it for later sessions
    pub fn set_api_key(&mut self, key: ApiKey) -> Result<()> {
        self.key_store.save(&key)?;
        self.api_key = Some(key);
        Ok(())
    }

    pub fn client(&self, options: ClientOptions) -> Result<GeminiClient, GenerationError> {
        Ok(GeminiClient::new(self.require_key()?.clone(), options))
    }

    /// Forgets the key and drops everything generated with it
    pub fn sign_out(&mut self) -> Result<()> {
        self.key_store.clear()?;
        self.api_key = None;
        self.images.clear();
        self.videos.clear();
        self.pairs.clear();
        self.prompts.clear();
        info!("signed out");
        Ok(())
    }
}
