use std::{fs, future::Future, path::Path};

use color_eyre::{
    Result,
    eyre::{WrapErr as _, eyre},
};
use engine::{
    bulk::{BulkDelay, BulkEvent, BulkJob, BulkRunner, CancelToken, failure_message},
    collection::BoundedCollection,
    context::{FeatureState, Prompted},
    feature::{
        PromptInput, generate_pair, image_job, multi_idea_job, pair_job, prompts_video_job,
        video_job,
    },
    filename::save_result,
    media::{GenerationResult, MediaHandle, Release, image_mime_for_extension},
    media_api::{GeminiClient, MediaApi},
    models::{ImageModel, VideoModel},
    prompt::{
        CAMERA_PRESETS, STYLE_PRESETS, StructuredPromptSpec, VariationCount,
        generate_structured_prompt, resolve_preset,
    },
};
use log::{error, warn};
use strum::IntoEnumIterator;
use tokio::{pin, task::JoinHandle};
use tokio_stream::StreamExt;

use crate::{
    cli::{ImageArgs, ImageToVideoArgs, PromptArgs, VideoArgs},
    context::Context,
};

pub async fn image(ctx: &mut Context, args: ImageArgs) -> Result<()> {
    let client = ctx.client()?;
    let mut settings = ctx.config.image;
    if let Some(model) = args.model {
        settings.model = model;
    }
    if let Some(aspect_ratio) = args.aspect_ratio {
        settings.aspect_ratio = aspect_ratio;
    }

    let text = args.source.read()?;
    let job = image_job(PromptInput::new(&text, args.source.bulk), &settings)?;
    let dir = ctx.config.download_dir()?;

    let client = &client;
    drive(&mut ctx.app.images, job, &dir, move |req| async move {
        client.generate_image(&req).await
    })
    .await
}

pub async fn video(ctx: &mut Context, args: VideoArgs) -> Result<()> {
    let client = ctx.client()?;
    let mut settings = ctx.config.video;
    if let Some(model) = args.model {
        settings.model = model;
    }
    if let Some(delay) = &args.delay {
        settings.delay = BulkDelay::parse(delay);
    }

    let source_image = args.image.as_deref().map(read_image).transpose()?;
    let text = args.source.read()?;
    let job = video_job(
        PromptInput::new(&text, args.source.bulk),
        &settings,
        source_image.as_deref(),
    )?;
    let dir = ctx.config.download_dir()?;

    let client = &client;
    drive(&mut ctx.app.videos, job, &dir, move |req| async move {
        client.generate_video(&req).await
    })
    .await
}

pub async fn image_to_video(ctx: &mut Context, args: ImageToVideoArgs) -> Result<()> {
    let client = ctx.client()?;
    let mut settings = ctx.config.image_to_video();
    if let Some(model) = args.image_model {
        settings.image.model = model;
    }
    if let Some(aspect_ratio) = args.aspect_ratio {
        settings.image.aspect_ratio = aspect_ratio;
    }
    if let Some(model) = args.video_model {
        settings.video_model = model;
    }
    if let Some(delay) = &args.delay {
        settings.delay = BulkDelay::parse(delay);
    }

    let job = pair_job(
        PromptInput::new(&args.image_prompt, args.bulk),
        PromptInput::new(&args.video_prompt, args.bulk),
        &settings,
    )?;
    let dir = ctx.config.download_dir()?;

    let client = &client;
    drive(&mut ctx.app.pairs, job, &dir, move |req| async move {
        generate_pair(client, &req).await
    })
    .await
}

pub async fn prompt(ctx: &mut Context, args: PromptArgs) -> Result<()> {
    let client = ctx.client()?;
    let spec = StructuredPromptSpec {
        idea: args.idea,
        style: resolve_preset(STYLE_PRESETS, &args.style),
        camera: resolve_preset(CAMERA_PRESETS, &args.camera),
        negatives: args.negatives,
        output: args.output,
        variations: VariationCount::try_from(args.variations)?,
    };

    ctx.app.prompts.clear();
    if args.multi_idea {
        multi_idea(&client, &spec, &mut ctx.app.prompts).await?;
    } else {
        for prompt in generate_structured_prompt(&client, &spec).await? {
            print_prompt(ctx.app.prompts.len(), &prompt);
            ctx.app.prompts.push(prompt);
        }
    }

    if args.to_video {
        let job = prompts_video_job(ctx.app.prompts.clone(), &ctx.config.video)?;
        let dir = ctx.config.download_dir()?;
        let client = &client;
        drive(&mut ctx.app.videos, job, &dir, move |req| async move {
            client.generate_video(&req).await
        })
        .await?;
    }
    Ok(())
}

/// Runs one request per idea line. Prompts made before a failure are kept.
async fn multi_idea(
    client: &GeminiClient,
    template: &StructuredPromptSpec,
    prompts: &mut Vec<String>,
) -> Result<()> {
    let job = multi_idea_job(&template.idea, template)?;
    let token = CancelToken::new();
    let ctrl_c = cancel_on_ctrl_c(token.clone());
    let mut failure = None;

    let mut runner = BulkRunner::default();
    {
        let events = runner.run(job, token, move |spec| async move {
            generate_structured_prompt(client, &spec).await
        });
        pin!(events);
        while let Some(event) = events.next().await {
            match event {
                BulkEvent::Started { index, total } => println!("Generating {}/{total}", index + 1),
                BulkEvent::Succeeded { result, .. } => {
                    for prompt in result {
                        print_prompt(prompts.len(), &prompt);
                        prompts.push(prompt);
                    }
                }
                BulkEvent::Failed {
                    index,
                    request,
                    error,
                } => failure = Some(failure_message("idea", index, request.prompt(), &error)),
                BulkEvent::Cancelled { .. } => println!("Cancelled."),
                BulkEvent::Waiting { .. } | BulkEvent::Completed { .. } => {}
            }
        }
    }
    ctrl_c.abort();

    match failure {
        Some(msg) => Err(eyre!(msg)),
        None => Ok(()),
    }
}

/// Runs `job` for one feature: prints progress, saves every result as it
/// arrives and finishes with the feature's gallery.
async fn drive<R, T, F, Fut>(
    feature: &mut FeatureState<T>,
    job: BulkJob<R>,
    dir: &Path,
    step: F,
) -> Result<()>
where
    R: Clone + Prompted,
    T: Release + Clone + Into<GenerationResult>,
    F: FnMut(R) -> Fut,
    Fut: Future<Output = engine::error::Result<T>>,
{
    let total = job.len();
    let token = feature.begin_job(&job);
    let ctrl_c = cancel_on_ctrl_c(token.clone());
    let mut unsaved = 0;

    let mut runner = BulkRunner::default();
    {
        let events = runner.run(job, token.clone(), step);
        pin!(events);
        while let Some(event) = events.next().await {
            feature.apply(&token, &event);
            match &event {
                BulkEvent::Started { .. } | BulkEvent::Waiting { .. } => {
                    if let Some(progress) = &feature.progress {
                        println!("{progress}");
                    }
                }
                BulkEvent::Succeeded { index, result, .. } => {
                    match save_result(dir, &result.clone().into()) {
                        Ok(paths) => {
                            for path in paths {
                                println!("Saved {}", path.display());
                            }
                        }
                        Err(e) => {
                            error!("couldn't save result {}: {e:?}", index + 1);
                            eprintln!("Couldn't save result {}: {e}", index + 1);
                            unsaved += 1;
                        }
                    }
                }
                BulkEvent::Cancelled { index } => {
                    println!("Cancelled, {index} of {total} finished.")
                }
                BulkEvent::Failed { .. } | BulkEvent::Completed { .. } => {}
            }
        }
    }
    ctrl_c.abort();

    print_gallery(&feature.collection);
    match &feature.error {
        Some(msg) => Err(eyre!("{msg}")),
        None if unsaved > 0 => Err(eyre!(
            "{unsaved} result(s) could not be saved to {}",
            dir.display()
        )),
        None => Ok(()),
    }
}

fn cancel_on_ctrl_c(token: CancelToken) -> JoinHandle<()> {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupted, cancelling the running job");
            token.cancel();
        }
    })
}

/// Reads an image file into a data URL
fn read_image(path: &Path) -> Result<String> {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or_default();
    let mime = image_mime_for_extension(ext)
        .ok_or_else(|| eyre!("{} is not a supported image file", path.display()))?;
    let data = fs::read(path).wrap_err_with(|| format!("reading {}", path.display()))?;
    MediaHandle::new(mime, data)
        .to_data_url()
        .ok_or_else(|| eyre!("{} is empty", path.display()))
}

fn print_prompt(index: usize, prompt: &str) {
    println!("--- Prompt {} ---\n{prompt}\n", index + 1);
}

fn print_gallery<T: Release + Clone + Into<GenerationResult>>(collection: &BoundedCollection<T>) {
    if collection.is_empty() {
        return;
    }
    println!("\nRecent results (newest first):");
    for (i, item) in collection.iter().enumerate() {
        println!("{:>2}. {}", i + 1, describe(&item.clone().into()));
    }
}

fn describe(result: &GenerationResult) -> String {
    match result {
        GenerationResult::Image(img) => format!("image  {}", img.prompt),
        GenerationResult::Video(vid) => format!("video  {}", vid.prompt),
        GenerationResult::ImageToVideo(pair) => {
            format!("pair   {} -> {}", pair.image_prompt, pair.video_prompt)
        }
    }
}

pub fn print_presets() {
    println!("Styles:");
    for (label, text) in STYLE_PRESETS {
        println!("  {label:<24} {text}");
    }
    println!("\nCamera setups:");
    for (label, text) in CAMERA_PRESETS {
        println!("  {label:<24} {text}");
    }
    println!("\nImage models:");
    for model in ImageModel::iter() {
        println!("  {:<24} {model}", model.id());
    }
    println!("\nVideo models:");
    for model in VideoModel::iter() {
        println!("  {:<24} {model}", model.id());
    }
}

#[cfg(test)]
mod tests {
    use engine::{
        bulk::DelayPolicy,
        media::{ImageResult, ImageToVideoResult},
    };

    use super::*;

    #[test]
    fn gallery_lines() {
        let image = ImageResult {
            prompt: "a lion".into(),
            media: MediaHandle::new("image/jpeg", vec![1u8]),
        };
        assert_eq!(describe(&image.into()), "image  a lion");

        let pair = ImageToVideoResult {
            image: MediaHandle::new("image/jpeg", vec![1u8]),
            video: MediaHandle::new("video/mp4", vec![2u8]),
            image_prompt: "rose".into(),
            video_prompt: "dew rolls".into(),
        };
        assert_eq!(describe(&pair.into()), "pair   rose -> dew rolls");
    }

    #[tokio::test]
    async fn unsaved_results_do_not_stop_the_job() {
        let tmp = tempfile::tempdir().unwrap();
        // a file where the download directory should be
        let dir = tmp.path().join("taken");
        fs::write(&dir, "").unwrap();

        let mut feature = FeatureState::<ImageResult>::new("prompt");
        let job = BulkJob::new(vec!["a lion".to_string(), "a rose".into()], DelayPolicy::None)
            .unwrap();
        let err = drive(&mut feature, job, &dir, |prompt: String| async move {
            Ok::<_, engine::error::GenerationError>(ImageResult {
                media: MediaHandle::new("image/jpeg", prompt.clone().into_bytes()),
                prompt,
            })
        })
        .await
        .unwrap_err();

        assert!(err.to_string().starts_with("2 result(s) could not be saved"));
        assert_eq!(feature.collection.len(), 2);
        assert!(!feature.is_running());
    }

    #[test]
    fn image_files_become_data_urls() {
        let dir = tempfile::tempdir().unwrap();
        let png = dir.path().join("frame.PNG");
        fs::write(&png, [1u8, 2, 3]).unwrap();
        assert_eq!(read_image(&png).unwrap(), "data:image/png;base64,AQID");

        let txt = dir.path().join("notes.txt");
        fs::write(&txt, "hi").unwrap();
        assert!(read_image(&txt).is_err());
    }
}
