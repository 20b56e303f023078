//! Maps inbound OpenAI-style paths onto the closed set of backend operations.

pub const DEFAULT_API_VERSION: &str = "2024-02-15-preview";
/// API version used when a chat request carries a `media` field.
pub const MEDIA_API_VERSION: &str = "2023-12-01-preview";

pub const COMPLETIONS_DEPLOYMENT: &str = "gpt-4o";
pub const IMAGE_DEPLOYMENT: &str = "dall-e-3";
pub const SPEECH_DEPLOYMENT: &str = "tts";
pub const TRANSCRIPTION_DEPLOYMENT: &str = "whisper";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    ChatCompletions,
    ImagesGenerations,
    Completions,
    ModelsList,
    AudioSpeech,
    AudioTranscriptions,
}

/// Where the backend deployment name for an operation comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeploymentSource {
    /// Looked up from the body's `model` field through the model mapper.
    FromModel,
    Fixed(&'static str),
}

impl Operation {
    pub const ALL: [Operation; 6] = [
        Operation::ChatCompletions,
        Operation::ImagesGenerations,
        Operation::Completions,
        Operation::ModelsList,
        Operation::AudioSpeech,
        Operation::AudioTranscriptions,
    ];

    pub fn inbound_path(self) -> &'static str {
        match self {
            Operation::ChatCompletions => "v1/chat/completions",
            Operation::ImagesGenerations => "v1/images/generations",
            Operation::Completions => "v1/completions",
            Operation::ModelsList => "v1/models",
            Operation::AudioSpeech => "v1/audio/speech",
            Operation::AudioTranscriptions => "v1/audio/transcriptions",
        }
    }

    /// Path segment after `/openai/deployments/{deployment}/`. `None` for
    /// operations that never reach the backend.
    pub fn backend_path(self) -> Option<&'static str> {
        match self {
            Operation::ChatCompletions => Some("chat/completions"),
            Operation::ImagesGenerations => Some("images/generations"),
            Operation::Completions => Some("completions"),
            Operation::ModelsList => None,
            Operation::AudioSpeech => Some("audio/speech"),
            Operation::AudioTranscriptions => Some("audio/transcriptions"),
        }
    }

    pub fn deployment_source(self) -> Option<DeploymentSource> {
        match self {
            Operation::ChatCompletions => Some(DeploymentSource::FromModel),
            Operation::ImagesGenerations => Some(DeploymentSource::Fixed(IMAGE_DEPLOYMENT)),
            Operation::Completions => Some(DeploymentSource::Fixed(COMPLETIONS_DEPLOYMENT)),
            Operation::ModelsList => None,
            Operation::AudioSpeech => Some(DeploymentSource::Fixed(SPEECH_DEPLOYMENT)),
            Operation::AudioTranscriptions => {
                Some(DeploymentSource::Fixed(TRANSCRIPTION_DEPLOYMENT))
            }
        }
    }

    /// API version used when no payload mutation applies.
    pub fn api_version(self) -> Option<&'static str> {
        self.backend_path().map(|_| DEFAULT_API_VERSION)
    }

    pub fn mutates_payload(self) -> bool {
        matches!(self, Operation::ChatCompletions)
    }

    /// Transcriptions are multipart uploads and are forwarded without JSON
    /// validation.
    pub fn requires_json(self) -> bool {
        !matches!(
            self,
            Operation::ModelsList | Operation::AudioTranscriptions
        )
    }

    pub fn name(self) -> &'static str {
        match self {
            Operation::ChatCompletions => "chat_completions",
            Operation::ImagesGenerations => "images_generations",
            Operation::Completions => "completions",
            Operation::ModelsList => "models_list",
            Operation::AudioSpeech => "audio_speech",
            Operation::AudioTranscriptions => "audio_transcriptions",
        }
    }
}

/// Drops the root separator, tolerating exactly one doubled leading slash.
pub fn normalize_path(path: &str) -> &str {
    let path = match path.strip_prefix('/') {
        Some(rest) if rest.starts_with('/') => rest,
        _ => path,
    };
    path.strip_prefix('/').unwrap_or(path)
}

pub fn classify(path: &str) -> Option<Operation> {
    let path = normalize_path(path);
    Operation::ALL
        .into_iter()
        .find(|op| op.inbound_path() == path)
}
