use clap::Parser;
use color_eyre::Result;
use engine::{
    ApiKey,
    media_api::{ClientOptions, GeminiClient, ImageRequest, MediaApi, TextRequest, VideoRequest},
    models::{AspectRatio, ImageModel, VideoModel},
};

#[derive(clap::Subcommand)]
enum Kind {
    Image {
        #[arg(long, value_enum, default_value_t)]
        model: ImageModel,
    },
    Video {
        #[arg(long, value_enum, default_value_t)]
        model: VideoModel,
    },
    Text,
}

#[derive(clap::Parser)]
struct Arg {
    key: String,
    description: String,
    #[command(subcommand)]
    kind: Kind,
}

#[tokio::main]
async fn main() -> Result<()> {
    pretty_env_logger::init();
    color_eyre::install()?;
    let Arg {
        key,
        description,
        kind,
    } = Arg::parse();
    let client = GeminiClient::new(ApiKey::new(key)?, ClientOptions::default());

    match kind {
        Kind::Image { model } => {
            let image = client
                .generate_image(&ImageRequest {
                    prompt: description,
                    model,
                    aspect_ratio: AspectRatio::default(),
                })
                .await?;
            let data = image.media.data().cloned().unwrap_or_default();
            std::fs::write("output.jpeg", &data)?;
            println!("Saved image, {} bytes", data.len());
        }
        Kind::Video { model } => {
            let video = client
                .generate_video(&VideoRequest {
                    prompt: description,
                    model,
                    source_image: None,
                })
                .await?;
            let data = video.media.data().cloned().unwrap_or_default();
            std::fs::write("output.mp4", &data)?;
            println!("Saved video, {} bytes", data.len());
        }
        Kind::Text => {
            let text = client
                .generate_text(&TextRequest {
                    system_instruction: "Answer in one sentence.".into(),
                    prompt: description,
                    response_schema: None,
                })
                .await?;
            println!("{text}");
        }
    }

    Ok(())
}
