use crate::core::credential::Credential;
use crate::core::prompt::GenerationRequest;
use crate::core::retry::{RetryPolicy, with_retry};
use crate::error::{Error, Result};
use async_openai::{
    config::OpenAIConfig,
    error::OpenAIError,
    types::responses::{
        CreateResponseArgs, EasyInputMessageArgs, InputItem, InputParam, OutputItem,
        OutputMessageContent, Role,
    },
};
use async_trait::async_trait;
use backoff::ExponentialBackoffBuilder;
use serde::Serialize;
use std::time::Duration;
use tracing::{info, instrument, warn};

pub const DEFAULT_MODEL: &str = "gpt-4-turbo-preview";
pub const DEFAULT_MAX_OUTPUT_TOKENS: u32 = 4096;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TokenUsage {
    pub input: u32,
    pub output: u32,
    pub total: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct GenerationResult {
    pub body: String,
    pub model: String,
    pub usage: Option<TokenUsage>,
    /// The provider returned at least one text part.
    pub success: bool,
}

/// A single, non-retried exchange with a model provider.
#[async_trait]
pub trait CompletionBackend: Send + Sync {
    async fn attempt(&self, request: &GenerationRequest) -> Result<GenerationResult>;
}

pub struct CompletionClient<B> {
    backend: B,
    policy: RetryPolicy,
}

impl<B: CompletionBackend> CompletionClient<B> {
    pub fn new(backend: B, policy: RetryPolicy) -> Self {
        Self { backend, policy }
    }

    #[instrument(skip_all, fields(video_id = %request.video_id))]
    pub async fn complete(&self, request: &GenerationRequest) -> Result<GenerationResult> {
        let result = with_retry(&self.policy, "completion", |_| self.backend.attempt(request)).await?;
        if !result.success {
            warn!(model = %result.model, "provider returned no text output");
        }

        match result.usage {
            Some(usage) => info!(
                model = %result.model,
                input_tokens = usage.input,
                output_tokens = usage.output,
                total_tokens = usage.total,
                "completion finished"
            ),
            None => info!(model = %result.model, "completion finished"),
        }
        Ok(result)
    }
}

#[derive(Debug, Clone)]
pub struct OpenAiSettings {
    pub model: String,
    pub api_base: Option<String>,
    pub max_output_tokens: u32,
}

impl Default for OpenAiSettings {
    fn default() -> Self {
        Self {
            model: DEFAULT_MODEL.to_string(),
            api_base: None,
            max_output_tokens: DEFAULT_MAX_OUTPUT_TOKENS,
        }
    }
}

#[derive(Clone)]
pub struct OpenAiBackend {
    client: async_openai::Client<OpenAIConfig>,
    settings: OpenAiSettings,
}

impl OpenAiBackend {
    pub fn new(credential: &Credential, settings: OpenAiSettings) -> Self {
        let mut config = OpenAIConfig::new().with_api_key(credential.expose());
        if let Some(base) = &settings.api_base {
            config = config.with_api_base(base);
        }

        // One HTTP request per attempt; retries belong to `CompletionClient`.
        let no_retry = ExponentialBackoffBuilder::new()
            .with_max_elapsed_time(Some(Duration::ZERO))
            .build();

        Self {
            client: async_openai::Client::with_config(config).with_backoff(no_retry),
            settings,
        }
    }
}

#[async_trait]
impl CompletionBackend for OpenAiBackend {
    async fn attempt(&self, request: &GenerationRequest) -> Result<GenerationResult> {
        let payload = CreateResponseArgs::default()
            .max_output_tokens(self.settings.max_output_tokens)
            .model(&self.settings.model)
            .input(InputParam::Items(vec![
                InputItem::EasyMessage(
                    EasyInputMessageArgs::default()
                        .role(Role::System)
                        .content(request.instructions.as_str())
                        .build()
                        .map_err(classify_openai_error)?,
                ),
                InputItem::EasyMessage(
                    EasyInputMessageArgs::default()
                        .role(Role::User)
                        .content(request.prompt.as_str())
                        .build()
                        .map_err(classify_openai_error)?,
                ),
            ]))
            .build()
            .map_err(classify_openai_error)?;

        let response = self
            .client
            .responses()
            .create(payload)
            .await
            .map_err(classify_openai_error)?;

        let mut body = String::new();
        let mut success = false;
        for output in response.output {
            if let OutputItem::Message(out) = output {
                for c in out.content {
                    match c {
                        OutputMessageContent::OutputText(text) => {
                            success = true;
                            body.push_str(&text.text);
                        }
                        other => warn!("Unexpected content type: {other:?}"),
                    }
                }
            }
        }

        Ok(GenerationResult {
            body,
            model: response.model,
            usage: response.usage.map(|u| TokenUsage {
                input: u.input_tokens,
                output: u.output_tokens,
                total: u.total_tokens,
            }),
            success,
        })
    }
}

const AUTH_CODES: &[&str] = &["invalid_api_key", "invalid_organization", "authentication_error"];
const TRANSIENT_CODES: &[&str] = &["rate_limit_exceeded", "server_error", "server_overloaded", "timeout"];

/// Maps a provider error onto the retry taxonomy.
pub fn classify_openai_error(err: OpenAIError) -> Error {
    match err {
        OpenAIError::Reqwest(e) => Error::Transport(format!("HTTP request failed: {e}")),
        OpenAIError::JSONDeserialize(..) => {
            Error::Transport(format!("Undecodable provider response: {err}"))
        }
        OpenAIError::ApiError(api) => {
            classify_api_error(api.code.as_deref(), api.r#type.as_deref(), api.message)
        }
        other => Error::RequestRejected(other.to_string()),
    }
}

fn classify_api_error(code: Option<&str>, kind: Option<&str>, message: String) -> Error {
    if code.is_none() && kind.is_none() {
        // Server errors arrive with the raw response body and nothing else.
        Error::Transport(message)
    } else if listed(AUTH_CODES, code, kind) {
        Error::Authentication(message)
    } else if listed(TRANSIENT_CODES, code, kind) {
        Error::Transport(message)
    } else {
        Error::RequestRejected(message)
    }
}

fn listed(list: &[&str], code: Option<&str>, kind: Option<&str>) -> bool {
    list.iter()
        .any(|item| Some(*item) == code || Some(*item) == kind)
}
