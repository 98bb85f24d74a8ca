//! Per-feature settings and the jobs built from user input.

use log::debug;
use serde::{Deserialize, Serialize};

use crate::{
    bulk::{BulkDelay, BulkJob, DelayPolicy, prompt_lines},
    error::{GenerationError, MediaKind, Result},
    media::ImageToVideoResult,
    media_api::{ImageRequest, MediaApi, VideoRequest},
    models::{AspectRatio, ImageModel, VideoModel},
    prompt::{StructuredPromptSpec, VariationCount},
};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ImageSettings {
    pub model: ImageModel,
    pub aspect_ratio: AspectRatio,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct VideoSettings {
    pub model: VideoModel,
    pub delay: BulkDelay,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ImageToVideoSettings {
    pub image: ImageSettings,
    pub video_model: VideoModel,
    pub delay: BulkDelay,
}

/// Prompts typed by the user: one prompt, or one per line in bulk mode
#[derive(Debug, Clone, Copy)]
pub enum PromptInput<'a> {
    Single(&'a str),
    Bulk(&'a str),
}

impl<'a> PromptInput<'a> {
    pub fn new(text: &'a str, bulk: bool) -> Self {
        if bulk {
            PromptInput::Bulk(text)
        } else {
            PromptInput::Single(text)
        }
    }

    pub fn is_bulk(&self) -> bool {
        matches!(self, PromptInput::Bulk(_))
    }

    fn prompts(&self) -> Vec<String> {
        match self {
            PromptInput::Single(text) => [text.trim()]
                .into_iter()
                .filter(|p| !p.is_empty())
                .map(String::from)
                .collect(),
            PromptInput::Bulk(text) => prompt_lines(text),
        }
    }

    /// Job over the prompts. A single prompt never waits.
    fn job(&self, delay: DelayPolicy) -> Result<BulkJob<String>> {
        match self {
            PromptInput::Single(text) => {
                let prompt = text.trim();
                if prompt.is_empty() {
                    return Err(GenerationError::validation("Please enter a prompt."));
                }
                Ok(BulkJob::single(prompt.to_string()))
            }
            PromptInput::Bulk(text) => BulkJob::from_lines(text, delay),
        }
    }
}

pub fn image_job(input: PromptInput, settings: &ImageSettings) -> Result<BulkJob<ImageRequest>> {
    Ok(input.job(DelayPolicy::IMAGE)?.map(|prompt| ImageRequest {
        prompt,
        model: settings.model,
        aspect_ratio: settings.aspect_ratio,
    }))
}

/// `source_image` is a data URL used as the first frame of every video
pub fn video_job(
    input: PromptInput,
    settings: &VideoSettings,
    source_image: Option<&str>,
) -> Result<BulkJob<VideoRequest>> {
    Ok(input
        .job(DelayPolicy::Bulk(settings.delay))?
        .map(|prompt| VideoRequest {
            prompt,
            model: settings.model,
            source_image: source_image.map(String::from),
        }))
}

/// Videos for prompts made by the assembler. Several prompts run as a bulk job.
pub fn prompts_video_job(
    prompts: Vec<String>,
    settings: &VideoSettings,
) -> Result<BulkJob<VideoRequest>> {
    let job = match <[String; 1]>::try_from(prompts) {
        Ok([prompt]) => BulkJob::single(prompt),
        Err(prompts) => BulkJob::new(prompts, DelayPolicy::Bulk(settings.delay))?,
    };
    Ok(job.map(|prompt| VideoRequest {
        prompt,
        model: settings.model,
        source_image: None,
    }))
}

/// One image prompt and the video prompt that animates its result
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PairRequest {
    pub image: ImageRequest,
    pub video_prompt: String,
    pub video_model: VideoModel,
}

pub fn pair_job(
    image_input: PromptInput,
    video_input: PromptInput,
    settings: &ImageToVideoSettings,
) -> Result<BulkJob<PairRequest>> {
    let image_prompts = image_input.prompts();
    let video_prompts = video_input.prompts();

    if image_prompts.is_empty() || video_prompts.is_empty() {
        return Err(GenerationError::validation(
            "Please enter at least one image and one video prompt.",
        ));
    }
    let bulk = image_input.is_bulk() || video_input.is_bulk();
    if bulk && image_prompts.len() != video_prompts.len() {
        return Err(GenerationError::validation(
            "The number of image prompts must match the number of video prompts in bulk mode.",
        ));
    }

    let pairs = image_prompts
        .into_iter()
        .zip(video_prompts)
        .map(|(image_prompt, video_prompt)| PairRequest {
            image: ImageRequest {
                prompt: image_prompt,
                model: settings.image.model,
                aspect_ratio: settings.image.aspect_ratio,
            },
            video_prompt,
            video_model: settings.video_model,
        })
        .collect();

    let job = BulkJob::new(pairs, DelayPolicy::Bulk(settings.delay))?;
    Ok(if bulk {
        job
    } else {
        BulkJob::single(job.requests.head)
    })
}

/// Generates the image, then a video that starts from it.
pub async fn generate_pair(
    api: &(dyn MediaApi + Send + Sync),
    request: &PairRequest,
) -> Result<ImageToVideoResult> {
    let image = api.generate_image(&request.image).await?;
    let source = image.media.to_data_url().ok_or(GenerationError::EmptyResult {
        kind: MediaKind::Image,
    })?;
    debug!("animating image of {:?}", request.image.prompt);

    let video = api
        .generate_video(&VideoRequest {
            prompt: request.video_prompt.clone(),
            model: request.video_model,
            source_image: Some(source),
        })
        .await?;

    Ok(ImageToVideoResult {
        image: image.media,
        video: video.media,
        image_prompt: image.prompt,
        video_prompt: video.prompt,
    })
}

/// Multi-idea mode: one single-variation request per idea line, run without
/// pauses.
pub fn multi_idea_job(
    ideas: &str,
    template: &StructuredPromptSpec,
) -> Result<BulkJob<StructuredPromptSpec>> {
    let ideas = prompt_lines(ideas);
    if ideas.is_empty() || template.style.trim().is_empty() || template.camera.trim().is_empty() {
        return Err(GenerationError::validation(
            "Please enter at least one idea, and select a style and camera setup.",
        ));
    }

    BulkJob::new(ideas, DelayPolicy::None).map(|job| {
        job.map(|idea| StructuredPromptSpec {
            idea,
            variations: VariationCount::One,
            ..template.clone()
        })
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        error::ProviderError,
        media_api::fake::{FakeApi, Reply},
        prompt::PromptOutput,
    };

    #[test]
    fn single_prompt_job_never_waits() {
        let job = image_job(PromptInput::new("  a lion  ", false), &Default::default()).unwrap();
        assert_eq!(job.len(), 1);
        assert!(!job.is_bulk());
        assert_eq!(job.delay, DelayPolicy::None);
        assert_eq!(job.requests.head.prompt, "a lion");

        let err = image_job(PromptInput::new("   ", false), &Default::default()).unwrap_err();
        assert_eq!(err.to_string(), "Please enter a prompt.");
    }

    #[test]
    fn bulk_jobs_use_their_feature_delay() {
        let images = image_job(PromptInput::new("a\nb", true), &Default::default()).unwrap();
        assert_eq!(images.delay, DelayPolicy::IMAGE);

        let settings = VideoSettings {
            model: VideoModel::Veo2,
            delay: BulkDelay::from_secs(90),
        };
        let videos = video_job(PromptInput::new("a\n\nb\nc", true), &settings, None).unwrap();
        assert_eq!(videos.len(), 3);
        assert_eq!(videos.delay, DelayPolicy::Bulk(BulkDelay::from_secs(90)));
        assert!(videos.requests.iter().all(|r| r.model == VideoModel::Veo2));
    }

    #[test]
    fn generated_prompts_keep_their_line_breaks() {
        let plan = "{\n  \"metadata\": {}\n}".to_string();
        let job = prompts_video_job(vec![plan.clone()], &Default::default()).unwrap();
        assert_eq!(job.len(), 1);
        assert_eq!(job.delay, DelayPolicy::None);
        assert_eq!(job.requests.head.prompt, plan);
        assert!(!job.is_bulk());

        let job = prompts_video_job(vec!["a".into(), "b".into()], &Default::default()).unwrap();
        assert_eq!(job.delay, DelayPolicy::Bulk(BulkDelay::default()));
    }

    #[test]
    fn pair_counts_must_match_in_bulk() {
        let settings = ImageToVideoSettings::default();
        let err = pair_job(
            PromptInput::new("rose\ntulip", true),
            PromptInput::new("dew rolls", true),
            &settings,
        )
        .unwrap_err();
        assert_eq!(
            err.to_string(),
            "The number of image prompts must match the number of video prompts in bulk mode."
        );

        let err = pair_job(
            PromptInput::new("rose", false),
            PromptInput::new(" ", false),
            &settings,
        )
        .unwrap_err();
        assert_eq!(
            err.to_string(),
            "Please enter at least one image and one video prompt."
        );

        let job = pair_job(
            PromptInput::new("rose\ntulip", true),
            PromptInput::new("dew rolls\npetals fall", true),
            &settings,
        )
        .unwrap();
        assert_eq!(job.len(), 2);
        assert!(job.is_bulk());
        assert_eq!(job.requests.last().video_prompt, "petals fall");

        let single = pair_job(
            PromptInput::new("rose", false),
            PromptInput::new("dew rolls", false),
            &settings,
        )
        .unwrap();
        assert!(!single.is_bulk());
        assert_eq!(single.delay, DelayPolicy::None);
    }

    #[tokio::test]
    async fn pair_feeds_the_image_into_the_video() {
        let api = FakeApi::new([]);
        let request = pair_job(
            PromptInput::new("rose", false),
            PromptInput::new("dew rolls", false),
            &Default::default(),
        )
        .unwrap()
        .requests
        .head;

        let pair = generate_pair(&api, &request).await.unwrap();
        assert_eq!(api.calls(), vec!["image:rose", "video:dew rolls+image"]);
        assert_eq!(pair.image_prompt, "rose");
        assert_eq!(pair.video_prompt, "dew rolls");
        assert!(pair.image.is_live() && pair.video.is_live());
    }

    #[tokio::test]
    async fn failed_image_skips_the_video() {
        let api = FakeApi::new([Reply::Fail(ProviderError::InvalidKey.into())]);
        let request = PairRequest {
            image: ImageRequest {
                prompt: "rose".into(),
                model: Default::default(),
                aspect_ratio: Default::default(),
            },
            video_prompt: "dew rolls".into(),
            video_model: Default::default(),
        };

        assert!(generate_pair(&api, &request).await.is_err());
        assert_eq!(api.calls(), vec!["image:rose"]);
    }

    #[test]
    fn multi_idea_forces_single_variation() {
        let template = StructuredPromptSpec {
            idea: String::new(),
            style: "Noir".into(),
            camera: "Overhead".into(),
            negatives: None,
            output: PromptOutput::Structured,
            variations: VariationCount::Ten,
        };

        let job = multi_idea_job("a cat\n\na dog\n", &template).unwrap();
        assert_eq!(job.len(), 2);
        assert_eq!(job.delay, DelayPolicy::None);
        assert!(job.requests.iter().all(|s| s.variations == VariationCount::One));
        assert_eq!(job.requests.last().idea, "a dog");

        assert!(multi_idea_job("\n", &template).is_err());
    }
}
