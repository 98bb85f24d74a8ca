use std::{
    fs,
    path::{Path, PathBuf},
};

use color_eyre::{
    Result,
    eyre::{WrapErr as _, eyre},
};
use engine::{ApiKey, KeyStore, bulk::BulkDelay};
use serde::{Serialize, de::DeserializeOwned};

use crate::{
    cli::{Cli, Command, ConfigCommand, KeyCommand},
    context::{Config, Context},
};

pub mod cli;
pub mod commands;
pub mod context;

const APP_NAME: &str = "mesinpintar";

pub fn load_ron_file<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let src = fs::read_to_string(path)?;
    Ok(ron::from_str(&src)?)
}

pub fn save_ron_file<T: Serialize>(path: &Path, x: &T) -> Result<()> {
    if let Some(dir) = path.parent() {
        fs::create_dir_all(dir)?;
    }
    let pretty = ron::ser::PrettyConfig::default();
    Ok(fs::write(path, ron::ser::to_string_pretty(x, pretty)?)?)
}

pub fn data_dir() -> Result<PathBuf> {
    Ok(dirs::data_dir()
        .ok_or(eyre!("Couldn't find data dir"))?
        .join(APP_NAME))
}

pub fn config_path() -> Result<PathBuf> {
    Ok(dirs::config_local_dir()
        .ok_or(eyre!("Couldn't get config dir"))?
        .join("mesinpintar.ron"))
}

pub fn load_config() -> Result<Config> {
    let path = config_path()?;
    if !path.exists() {
        Ok(Config::default())
    } else {
        load_ron_file(&path).wrap_err_with(|| format!("loading config {}", path.display()))
    }
}

pub fn save_config(cfg: &Config) -> Result<()> {
    let path = config_path()?;
    save_ron_file(&path, cfg)?;
    log::info!("saved config to {}", path.display());
    Ok(())
}

pub async fn run(cli: Cli, config: Config) -> Result<()> {
    let key_store = KeyStore::at(KeyStore::default_path()?);
    let mut ctx = Context::load(config, key_store, cli.api_key)?;

    match cli.command {
        Command::Image(args) => commands::image(&mut ctx, args).await,
        Command::Video(args) => commands::video(&mut ctx, args).await,
        Command::ImageToVideo(args) => commands::image_to_video(&mut ctx, args).await,
        Command::Prompt(args) => commands::prompt(&mut ctx, args).await,
        Command::Presets => {
            commands::print_presets();
            Ok(())
        }
        Command::Key(cmd) => key(&mut ctx, cmd),
        Command::Config(cmd) => configure(&mut ctx.config, cmd),
    }
}

fn key(ctx: &mut Context, cmd: KeyCommand) -> Result<()> {
    match cmd {
        KeyCommand::Set { key } => {
            ctx.app.set_api_key(ApiKey::new(key)?)?;
            println!("API key saved.");
        }
        KeyCommand::Show => match ctx.app.api_key() {
            Some(key) => println!("{key}"),
            None => print!(
                "{}",
                indoc::indoc! {"
                    No API key set.
                    Create one at https://aistudio.google.com/app/apikey, then store it with
                    `mesinpintar key set <KEY>` or pass it with --api-key / GEMINI_API_KEY.
                "}
            ),
        },
        KeyCommand::Clear => {
            ctx.app.sign_out()?;
            println!("API key removed.");
        }
    }
    Ok(())
}

fn configure(cfg: &mut Config, cmd: ConfigCommand) -> Result<()> {
    match cmd {
        ConfigCommand::Show => {
            let pretty = ron::ser::PrettyConfig::default();
            println!("{}", ron::ser::to_string_pretty(cfg, pretty)?);
            println!("download dir: {}", cfg.download_dir()?.display());
            return Ok(());
        }
        ConfigCommand::SetImageModel { model } => cfg.image.model = model,
        ConfigCommand::SetAspectRatio { aspect_ratio } => cfg.image.aspect_ratio = aspect_ratio,
        ConfigCommand::SetVideoModel { model } => cfg.video.model = model,
        ConfigCommand::SetDelay { secs } => {
            cfg.video.delay = BulkDelay::parse(&secs);
            println!("Bulk delay: {}s", cfg.video.delay.secs());
        }
        ConfigCommand::SetDownloadDir { dir } => cfg.download_dir = Some(dir),
        ConfigCommand::SetPollInterval { secs } => cfg.poll_interval_secs = secs.max(1),
        ConfigCommand::SetBaseUrl { url } => cfg.base_url = url,
    }
    save_config(cfg)
}
