use std::str::FromStr;

use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter, IntoEnumIterator};

use crate::error::GenerationError;

#[derive(
    Debug,
    Clone,
    Copy,
    Display,
    clap::ValueEnum,
    Serialize,
    Deserialize,
    Hash,
    PartialEq,
    Eq,
    EnumIter,
    Default,
)]
pub enum ImageModel {
    #[default]
    #[strum(to_string = "Imagen 4 Fast")]
    #[value(name = "imagen-4-fast")]
    #[serde(rename = "imagen-4-fast")]
    Imagen4Fast,
    #[strum(to_string = "Imagen 4")]
    #[value(name = "imagen-4")]
    #[serde(rename = "imagen-4")]
    Imagen4,
}

#[derive(
    Debug,
    Clone,
    Copy,
    Display,
    clap::ValueEnum,
    Serialize,
    Deserialize,
    Hash,
    PartialEq,
    Eq,
    EnumIter,
    Default,
)]
pub enum VideoModel {
    #[default]
    #[strum(to_string = "VEO 3 Fast Preview")]
    #[value(name = "veo-3-fast-preview")]
    #[serde(rename = "veo-3-fast-preview")]
    Veo3FastPreview,
    #[strum(to_string = "VEO 3 Preview")]
    #[value(name = "veo-3-preview")]
    #[serde(rename = "veo-3-preview")]
    Veo3Preview,
    #[strum(to_string = "VEO 2")]
    #[value(name = "veo-2")]
    #[serde(rename = "veo-2")]
    Veo2,
}

impl ImageModel {
    pub fn id(&self) -> &'static str {
        match self {
            ImageModel::Imagen4Fast => "imagen-4-fast",
            ImageModel::Imagen4 => "imagen-4",
        }
    }

    /// Name of the model on the provider side
    pub fn api_name(&self) -> &'static str {
        match self {
            ImageModel::Imagen4Fast => "imagen-4.0-fast-generate-001",
            ImageModel::Imagen4 => "imagen-4.0-generate-001",
        }
    }
}

impl VideoModel {
    pub fn id(&self) -> &'static str {
        match self {
            VideoModel::Veo3FastPreview => "veo-3-fast-preview",
            VideoModel::Veo3Preview => "veo-3-preview",
            VideoModel::Veo2 => "veo-2",
        }
    }

    pub fn api_name(&self) -> &'static str {
        match self {
            VideoModel::Veo3FastPreview => "veo-3.0-fast-generate-preview",
            VideoModel::Veo3Preview => "veo-3.0-generate-preview",
            VideoModel::Veo2 => "veo-2.0-generate-001",
        }
    }
}

impl FromStr for ImageModel {
    type Err = GenerationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ImageModel::iter()
            .find(|m| m.id() == s.trim())
            .ok_or_else(|| GenerationError::InvalidModel(s.to_string()))
    }
}

impl FromStr for VideoModel {
    type Err = GenerationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        VideoModel::iter()
            .find(|m| m.id() == s.trim())
            .ok_or_else(|| GenerationError::InvalidModel(s.to_string()))
    }
}

#[derive(
    Debug,
    Clone,
    Copy,
    Display,
    clap::ValueEnum,
    Serialize,
    Deserialize,
    Hash,
    PartialEq,
    Eq,
    EnumIter,
    Default,
)]
pub enum AspectRatio {
    #[strum(to_string = "1:1")]
    #[value(name = "1:1")]
    #[serde(rename = "1:1")]
    Square,
    #[default]
    #[strum(to_string = "16:9")]
    #[value(name = "16:9")]
    #[serde(rename = "16:9")]
    Landscape,
    #[strum(to_string = "9:16")]
    #[value(name = "9:16")]
    #[serde(rename = "9:16")]
    Portrait,
    #[strum(to_string = "4:3")]
    #[value(name = "4:3")]
    #[serde(rename = "4:3")]
    Standard,
    #[strum(to_string = "3:4")]
    #[value(name = "3:4")]
    #[serde(rename = "3:4")]
    StandardPortrait,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn model_ids_round_trip_through_from_str() {
        for model in ImageModel::iter() {
            assert_eq!(model.id().parse::<ImageModel>().unwrap(), model);
        }
        for model in VideoModel::iter() {
            assert_eq!(model.id().parse::<VideoModel>().unwrap(), model);
        }
    }

    #[test]
    fn unknown_model_is_rejected() {
        let err = "imagen-9".parse::<ImageModel>().unwrap_err();
        assert!(matches!(err, GenerationError::InvalidModel(id) if id == "imagen-9"));
        assert!("veo-1".parse::<VideoModel>().is_err());
    }

    #[test]
    fn aspect_ratio_serializes_as_ratio() {
        assert_eq!(
            serde_json::to_string(&AspectRatio::Portrait).unwrap(),
            r#""9:16""#
        );
        assert_eq!(AspectRatio::default().to_string(), "16:9");
    }
}
