use std::{path::PathBuf, time::Duration};

use color_eyre::Result;
use engine::{
    ApiKey, KeyStore,
    context::AppContext,
    feature::{ImageSettings, ImageToVideoSettings, VideoSettings},
    media_api::{ClientOptions, GeminiClient, gemini::DEFAULT_BASE_URL},
};
use serde::{Deserialize, Serialize};

use crate::data_dir;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub image: ImageSettings,
    pub video: VideoSettings,
    /// Where generated media is saved. Defaults to the platform's download dir.
    pub download_dir: Option<PathBuf>,
    pub poll_interval_secs: u64,
    pub base_url: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            image: ImageSettings::default(),
            video: VideoSettings::default(),
            download_dir: None,
            poll_interval_secs: 10,
            base_url: DEFAULT_BASE_URL.into(),
        }
    }
}

impl Config {
    pub fn image_to_video(&self) -> ImageToVideoSettings {
        ImageToVideoSettings {
            image: self.image,
            video_model: self.video.model,
            delay: self.video.delay,
        }
    }

    pub fn client_options(&self) -> ClientOptions {
        ClientOptions {
            base_url: self.base_url.clone(),
            poll_interval: Duration::from_secs(self.poll_interval_secs.max(1)),
            ..Default::default()
        }
    }

    pub fn download_dir(&self) -> Result<PathBuf> {
        match &self.download_dir {
            Some(dir) => Ok(dir.clone()),
            None => match dirs::download_dir() {
                Some(dir) => Ok(dir.join(crate::APP_NAME)),
                None => Ok(data_dir()?.join("downloads")),
            },
        }
    }
}

pub struct Context {
    pub app: AppContext,
    pub config: Config,
}

impl Context {
    /// `api_key` overrides the stored key for this run
    pub fn load(config: Config, key_store: KeyStore, api_key: Option<String>) -> Result<Self> {
        let mut app = AppContext::load(key_store)?;
        if let Some(key) = api_key {
            app.use_api_key(ApiKey::new(key)?);
        }
        Ok(Self { app, config })
    }

    pub fn client(&self) -> Result<GeminiClient> {
        Ok(self.app.client(self.config.client_options())?)
    }
}
