use std::{fs, path::PathBuf};

use color_eyre::{Result, eyre::WrapErr as _};

use engine::{
    models::{AspectRatio, ImageModel, VideoModel},
    prompt::PromptOutput,
};

#[derive(Debug, clap::Parser)]
#[command(version, about = "Generate images, videos and video prompts with Gemini")]
pub struct Cli {
    /// Used for this run instead of the stored key
    #[arg(short, long, env = "GEMINI_API_KEY", hide_env_values = true)]
    pub api_key: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, clap::Subcommand)]
pub enum Command {
    /// Generate images from text prompts
    Image(ImageArgs),
    /// Generate videos from text prompts, optionally starting from an image
    Video(VideoArgs),
    /// Generate an image, then animate it into a video
    ImageToVideo(ImageToVideoArgs),
    /// Turn an idea into detailed video prompts
    Prompt(PromptArgs),
    /// List the style and camera presets
    Presets,
    /// Manage the stored Gemini API key
    #[command(subcommand)]
    Key(KeyCommand),
    /// Show or change the settings
    #[command(subcommand)]
    Config(ConfigCommand),
}

/// Where the prompts come from and how they are split
#[derive(Debug, clap::Args)]
pub struct PromptSource {
    /// The prompt, or one prompt per line with --bulk
    pub prompt: Option<String>,

    /// Read the prompt text from a file
    #[arg(short, long, conflicts_with = "prompt")]
    pub file: Option<PathBuf>,

    /// Treat every non-empty line as its own prompt
    #[arg(short, long)]
    pub bulk: bool,
}

impl PromptSource {
    /// The raw prompt text. Missing text is left to prompt validation.
    pub fn read(&self) -> Result<String> {
        match (&self.prompt, &self.file) {
            (_, Some(path)) => fs::read_to_string(path)
                .wrap_err_with(|| format!("reading prompts from {}", path.display())),
            (Some(prompt), None) => Ok(prompt.clone()),
            (None, None) => Ok(String::new()),
        }
    }
}

#[derive(Debug, clap::Args)]
pub struct ImageArgs {
    #[command(flatten)]
    pub source: PromptSource,

    #[arg(short, long, value_enum)]
    pub model: Option<ImageModel>,

    #[arg(short, long, value_enum)]
    pub aspect_ratio: Option<AspectRatio>,
}

#[derive(Debug, clap::Args)]
pub struct VideoArgs {
    #[command(flatten)]
    pub source: PromptSource,

    #[arg(short, long, value_enum)]
    pub model: Option<VideoModel>,

    /// Seconds between two videos in bulk mode (40 to 200)
    #[arg(short, long)]
    pub delay: Option<String>,

    /// Image file used as the first frame
    #[arg(short, long)]
    pub image: Option<PathBuf>,
}

#[derive(Debug, clap::Args)]
pub struct ImageToVideoArgs {
    /// The image prompt, or one per line with --bulk
    pub image_prompt: String,

    /// The video prompt, or one per line with --bulk
    pub video_prompt: String,

    #[arg(short, long)]
    pub bulk: bool,

    #[arg(long, value_enum)]
    pub image_model: Option<ImageModel>,

    #[arg(long, value_enum)]
    pub video_model: Option<VideoModel>,

    #[arg(short, long, value_enum)]
    pub aspect_ratio: Option<AspectRatio>,

    /// Seconds between two sets in bulk mode (40 to 200)
    #[arg(short, long)]
    pub delay: Option<String>,
}

#[derive(Debug, clap::Args)]
pub struct PromptArgs {
    /// The core idea, or one idea per line with --multi-idea
    pub idea: String,

    /// A style preset label or a custom style
    #[arg(short, long, default_value = "Cinematic")]
    pub style: String,

    /// A camera preset label or a custom camera setup
    #[arg(short, long, default_value = "Fixed Wide-Angle")]
    pub camera: String,

    /// Things the video should not contain
    #[arg(short, long)]
    pub negatives: Option<String>,

    #[arg(short, long, value_enum, default_value_t)]
    pub output: PromptOutput,

    /// 1, 2, 5 or 10
    #[arg(short, long, default_value_t = 1)]
    pub variations: u8,

    /// One prompt per idea line, generated one after another
    #[arg(long)]
    pub multi_idea: bool,

    /// Generate videos from the resulting prompts
    #[arg(long)]
    pub to_video: bool,
}

#[derive(Debug, clap::Subcommand)]
pub enum KeyCommand {
    /// Store a key for later runs
    Set { key: String },
    /// Show the stored key, masked
    Show,
    /// Forget the stored key
    Clear,
}

#[derive(Debug, clap::Subcommand)]
pub enum ConfigCommand {
    Show,
    SetImageModel {
        #[arg(value_enum)]
        model: ImageModel,
    },
    SetAspectRatio {
        #[arg(value_enum)]
        aspect_ratio: AspectRatio,
    },
    SetVideoModel {
        #[arg(value_enum)]
        model: VideoModel,
    },
    /// Seconds between two videos in bulk mode (40 to 200)
    SetDelay { secs: String },
    SetDownloadDir { dir: PathBuf },
    /// Seconds between two status checks of a running video
    SetPollInterval { secs: u64 },
    SetBaseUrl { url: String },
}
