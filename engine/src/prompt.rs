use futures::future::try_join_all;
use indoc::{formatdoc, indoc};
use log::debug;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use strum::{Display, EnumIter};

use crate::{
    MAX_TIMELINE_SECS,
    error::{GenerationError, Result},
    media_api::{MediaApi, TextRequest},
};

/// (label, preset text)
pub const STYLE_PRESETS: &[(&str, &str)] = &[
    ("Cinematic", "Cinematic, photorealistic, 4K animated, Pixar style"),
    ("Documentary", "Documentary style, handheld"),
    ("Dreamy", "Dreamy, soft focus, ethereal"),
    ("Noir", "Noir, black and white, high contrast"),
    ("Vibrant", "Vibrant, colorful, saturated"),
    ("Minimalist", "Minimalist, clean, modern"),
    ("Vintage", "Vintage, retro, film grain"),
    (
        "Surreal/Artistic",
        "Surreal, artistic, abstract, Claymation, stop motion",
    ),
];

pub const CAMERA_PRESETS: &[(&str, &str)] = &[
    ("Fixed Wide-Angle", "Fixed wide-angle shot, no movement"),
    ("Slow Zoom In", "Slow zoom in"),
    ("Overhead", "Overhead shot, bird's eye view"),
    ("Low Angle", "Low angle shot, looking up"),
    ("Handheld", "Handheld, slight movement"),
    ("Dolly Shot", "Smooth dolly-in from wide to medium shot"),
    (
        "Tracking Shot",
        "Camera tracks alongside the characters as they walk",
    ),
    ("Crane Movement", "High crane shot descending to eye level"),
    (
        "Handheld (Documentary)",
        "Subtle handheld camera movement for documentary feel",
    ),
    ("Gimbal Stabilized", "Smooth gimbal movement following the action"),
];

/// Looks `input` up among the preset labels (case-insensitive). Anything else
/// is taken as a custom value.
pub fn resolve_preset(presets: &[(&str, &str)], input: &str) -> String {
    let input = input.trim();
    presets
        .iter()
        .find(|(label, _)| label.eq_ignore_ascii_case(input))
        .map(|(_, text)| text.to_string())
        .unwrap_or_else(|| input.to_string())
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Default, Display, EnumIter, clap::ValueEnum, Serialize, Deserialize,
)]
pub enum PromptOutput {
    #[default]
    #[strum(to_string = "free text")]
    FreeText,
    #[strum(to_string = "structured")]
    Structured,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Display, EnumIter, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum VariationCount {
    #[default]
    #[strum(to_string = "1")]
    One,
    #[strum(to_string = "2")]
    Two,
    #[strum(to_string = "5")]
    Five,
    #[strum(to_string = "10")]
    Ten,
}

impl VariationCount {
    pub fn get(&self) -> usize {
        match self {
            VariationCount::One => 1,
            VariationCount::Two => 2,
            VariationCount::Five => 5,
            VariationCount::Ten => 10,
        }
    }
}

impl TryFrom<u8> for VariationCount {
    type Error = GenerationError;

    fn try_from(n: u8) -> Result<Self> {
        Ok(match n {
            1 => VariationCount::One,
            2 => VariationCount::Two,
            5 => VariationCount::Five,
            10 => VariationCount::Ten,
            other => {
                return Err(GenerationError::validation(format!(
                    "The number of variations must be 1, 2, 5 or 10, not {other}."
                )));
            }
        })
    }
}

impl From<VariationCount> for u8 {
    fn from(n: VariationCount) -> Self {
        n.get() as u8
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StructuredPromptSpec {
    pub idea: String,
    pub style: String,
    pub camera: String,
    pub negatives: Option<String>,
    pub output: PromptOutput,
    pub variations: VariationCount,
}

impl StructuredPromptSpec {
    pub fn validate(&self) -> Result<()> {
        if [&self.idea, &self.style, &self.camera]
            .iter()
            .any(|s| s.trim().is_empty())
        {
            return Err(GenerationError::validation(
                "Please fill in all required fields: Idea, Style, and Camera.",
            ));
        }
        Ok(())
    }

    fn negatives(&self) -> Option<&str> {
        self.negatives.as_deref().filter(|n| !n.trim().is_empty())
    }

    /// The request sent to the text model, once per variation
    pub fn assemble(&self) -> TextRequest {
        match self.output {
            PromptOutput::FreeText => self.assemble_free_text(),
            PromptOutput::Structured => self.assemble_structured(),
        }
    }

    fn assemble_free_text(&self) -> TextRequest {
        let Self {
            idea,
            style,
            camera,
            ..
        } = self;

        let mut prompt = formatdoc! {r#"
            Please generate a detailed video prompt based on the following elements:
            - **Core Idea:** "{idea}"
            - **Base Style:** "{style}"
            - **Camera & Shot:** "{camera}""#};
        if let Some(negatives) = self.negatives() {
            prompt.push_str(&format!(
                "\n- **Exclude (Negative Prompt):** \"{negatives}\""
            ));
        }
        prompt.push_str(
            "\n\nCombine these into a single descriptive paragraph. If a negative prompt is \
             provided, create a separate \"Negative prompt:\" section after the main prompt.",
        );

        TextRequest {
            system_instruction: indoc! {"
                You are a creative assistant specializing in crafting detailed prompts for AI video
                generation models like VEO. Your goal is to combine the user's ideas into a single,
                cohesive, and highly descriptive prompt. The prompt should be a vivid paragraph that
                paints a clear picture. Generate a unique variation based on the inputs provided."}
            .into(),
            prompt,
            response_schema: None,
        }
    }

    fn assemble_structured(&self) -> TextRequest {
        let Self {
            idea,
            style,
            camera,
            ..
        } = self;

        let mut prompt = formatdoc! {r#"
            Based on the following inputs, generate a detailed video production plan in the required JSON format.
            - Core Idea: "{idea}"
            - Base Style: "{style}"
            - Camera & Shot: "{camera}""#};
        if let Some(negatives) = self.negatives() {
            prompt.push_str(&format!("\n- Exclude (Negative Prompt): \"{negatives}\""));
        }
        prompt.push_str("\n\n");
        prompt.push_str(&formatdoc! {r#"
            Your task is to creatively expand on this core idea to fill all fields in the JSON schema.
            - For the 'metadata' object:
              - 'prompt_name', 'main_video_idea', 'scene_description', 'starting_elements', 'final_elements', 'transformation_object' should all be generated based on the core idea.
              - Use the provided values for 'base_style' and 'camera_setup'.
              - Set 'aspect_ratio' to "16:9".
              - For 'negative_prompts', use the provided value. If none is provided, you can either leave it empty or generate relevant ones based on the idea.
            - For the 'timeline' array:
              - IMPORTANT: The total video duration MUST NOT exceed {MAX_TIMELINE_SECS} seconds. The final timestamp must end at or before "00:0{MAX_TIMELINE_SECS}".
              - Create at least two sequence objects.
              - Creatively describe the actions, timestamps, and audio for each sequence to tell a short story based on the core idea within the {MAX_TIMELINE_SECS}-second limit."#});

        TextRequest {
            system_instruction: formatdoc! {"
                You are a scriptwriting assistant that generates structured video production plans in
                JSON format. Your task is to take a user's core idea and expand it into a detailed JSON
                object that follows a specific schema. This includes metadata about the video and a
                timeline broken down into sequences with actions and audio cues. The total duration of
                the video timeline must not exceed {MAX_TIMELINE_SECS} seconds. Fill in all fields
                creatively based on the user's input."},
            prompt,
            response_schema: Some(response_schema()),
        }
    }
}

fn response_schema() -> Value {
    let string = |description: &str| json!({ "type": "STRING", "description": description });

    json!({
        "type": "OBJECT",
        "properties": {
            "metadata": {
                "type": "OBJECT",
                "properties": {
                    "prompt_name": string("A concise, descriptive name for the prompt, generated based on the main video idea."),
                    "main_video_idea": string("The core video idea provided by the user."),
                    "base_style": string("The base style for the video (e.g., 'cinematic')."),
                    "aspect_ratio": string("The aspect ratio, fixed to '16:9'."),
                    "scene_description": string("A detailed description of the overall scene and environment."),
                    "camera_setup": string("The camera setup and movement style."),
                    "starting_elements": string("Description of the key elements at the beginning of the video."),
                    "final_elements": string("Description of the key elements at the end of the video."),
                    "transformation_object": string("The object or element that undergoes a transformation, if any."),
                    "negative_prompts": string("Elements to exclude from the video."),
                },
                "required": [
                    "prompt_name", "main_video_idea", "base_style", "aspect_ratio",
                    "scene_description", "camera_setup", "starting_elements",
                    "final_elements", "transformation_object", "negative_prompts"
                ],
            },
            "timeline": {
                "type": "ARRAY",
                "description": format!(
                    "A sequence of events in the video, with at least 2 entries. The total duration must not exceed {MAX_TIMELINE_SECS} seconds; the final timestamp must end at or before '00:0{MAX_TIMELINE_SECS}'."
                ),
                "items": {
                    "type": "OBJECT",
                    "properties": {
                        "sequence": string("The sequence identifier and a brief description, formatted as '1 (Description)'."),
                        "timestamp": string("The time range for this sequence (e.g., '00:00-00:02')."),
                        "action": string("A detailed description of the action occurring in this sequence."),
                        "audio": string("Description of the corresponding audio, sound effects, or music."),
                    },
                    "required": ["sequence", "timestamp", "action", "audio"],
                },
            },
        },
        "required": ["metadata", "timeline"],
    })
}

/// Production plan returned in structured mode
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StructuredDocument {
    pub metadata: Value,
    pub timeline: Vec<Sequence>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Sequence {
    pub sequence: String,
    pub timestamp: String,
    pub action: String,
    pub audio: String,
}

impl StructuredDocument {
    /// Parses the model's answer and checks the duration ceiling locally
    pub fn parse(src: &str) -> Result<Self> {
        Self::from_value(&parse_answer(src)?)
    }

    fn from_value(value: &Value) -> Result<Self> {
        let doc = StructuredDocument::deserialize(value).map_err(not_a_plan)?;

        let mut end = 0;
        for seq in &doc.timeline {
            let (_, seq_end) = parse_timestamp_range(&seq.timestamp)?;
            end = end.max(seq_end);
        }
        if end > MAX_TIMELINE_SECS {
            return Err(GenerationError::InvalidDocument(format!(
                "the timeline lasts {end} seconds, more than the allowed {MAX_TIMELINE_SECS}"
            )));
        }

        Ok(doc)
    }

}

fn not_a_plan(e: serde_json::Error) -> GenerationError {
    GenerationError::InvalidDocument(format!("not a production plan: {e}"))
}

fn parse_answer(src: &str) -> Result<Value> {
    serde_json::from_str(src.trim()).map_err(not_a_plan)
}

/// Checks a structured answer and pretty-prints it with its keys as received
pub fn format_structured_answer(src: &str) -> Result<String> {
    let value = parse_answer(src)?;
    StructuredDocument::from_value(&value)?;
    Ok(serde_json::to_string_pretty(&value)?)
}

/// `"00:02-00:05"` -> `(2, 5)`
fn parse_timestamp_range(range: &str) -> Result<(u32, u32)> {
    let invalid = || GenerationError::InvalidDocument(format!("invalid timestamp range '{range}'"));

    let (start, end) = range.split_once('-').ok_or_else(invalid)?;
    let secs = |t: &str| -> Option<u32> {
        let (m, s) = t.trim().split_once(':')?;
        m.parse::<u32>()
            .ok()?
            .checked_mul(60)?
            .checked_add(s.parse::<u32>().ok()?)
    };
    let start = secs(start).ok_or_else(invalid)?;
    let end = secs(end).ok_or_else(invalid)?;
    if end < start {
        return Err(invalid());
    }
    Ok((start, end))
}

/// Requests all variations at once. One failure fails the whole call.
pub async fn generate_structured_prompt(
    api: &(dyn MediaApi + Send + Sync),
    spec: &StructuredPromptSpec,
) -> Result<Vec<String>> {
    spec.validate()?;
    let request = spec.assemble();
    debug!(
        "requesting {} {} variation(s)",
        spec.variations, spec.output
    );

    let answers =
        try_join_all((0..spec.variations.get()).map(|_| api.generate_text(&request))).await?;

    answers
        .into_iter()
        .map(|answer| match spec.output {
            PromptOutput::FreeText => Ok(answer.trim().to_string()),
            PromptOutput::Structured => format_structured_answer(&answer),
        })
        .collect()
}
