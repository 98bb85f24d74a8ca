use thiserror::Error;

pub type Result<T, E = GenerationError> = std::result::Result<T, E>;

/// Everything that can go wrong between a user action and a finished result.
/// The `Display` output is the text shown to the user.
#[derive(Debug, Error)]
pub enum GenerationError {
    #[error("{0}")]
    Validation(String),

    #[error("{0}")]
    Credential(String),

    #[error("Invalid model selected: {0}")]
    InvalidModel(String),

    #[error(transparent)]
    Provider(#[from] ProviderError),

    #[error("{} generation failed: No {} was returned from the API.", .kind, .kind.noun())]
    EmptyResult { kind: MediaKind },

    #[error("Invalid image format for video generation.")]
    InvalidImageFormat,

    #[error("Operation error: {0}")]
    Operation(String),

    #[error("Failed to download video: {status}")]
    Download { status: String },

    #[error("Network error: {message}. Please {hint}.")]
    Network { message: String, hint: &'static str },

    #[error("The generated document is invalid: {0}")]
    InvalidDocument(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
pub enum MediaKind {
    Image,
    Video,
    Prompt,
}

impl MediaKind {
    pub fn noun(&self) -> &'static str {
        match self {
            MediaKind::Image => "image",
            MediaKind::Video => "video",
            MediaKind::Prompt => "prompt",
        }
    }
}

/// Failures reported by the provider itself
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ProviderError {
    #[error("The provided API key is not valid. Please check your key and try again.")]
    InvalidKey,

    #[error("You have exceeded your API quota. Please check your Google AI account.")]
    QuotaExceeded,

    #[error("The request timed out. Please try again.")]
    Timeout,

    #[error("API Error: {0}")]
    Api(String),
}

pub const NETWORK_HINT: &str =
    "check your network connection, proxy or firewall settings and try again";

impl ProviderError {
    pub fn classify(status: Option<u16>, message: impl Into<String>) -> Self {
        let message = message.into();
        let lower = message.to_lowercase();

        if message.contains("API key not valid") {
            Self::InvalidKey
        } else if lower.contains("quota") || status == Some(429) {
            Self::QuotaExceeded
        } else if lower.contains("timed out") {
            Self::Timeout
        } else {
            Self::Api(message)
        }
    }
}

impl From<reqwest::Error> for GenerationError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            ProviderError::Timeout.into()
        } else if err.is_connect() || err.is_request() {
            GenerationError::Network {
                message: err.to_string(),
                hint: NETWORK_HINT,
            }
        } else if err.is_decode() {
            ProviderError::Api(format!("unreadable response: {err}")).into()
        } else {
            ProviderError::classify(err.status().map(|s| s.as_u16()), err.to_string()).into()
        }
    }
}

impl From<serde_json::Error> for GenerationError {
    fn from(err: serde_json::Error) -> Self {
        ProviderError::Api(format!("unexpected response format: {err}")).into()
    }
}

impl GenerationError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn missing_key() -> Self {
        Self::Credential("Please set your Gemini API Key before generating.".into())
    }
}
