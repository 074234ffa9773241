//! LLM collaborator for CAPTCHA reading and identity generation
//!
//! Optional: the pipeline runs fully without it. When configured it serves
//! two narrow calls, decode a CAPTCHA image and propose a believable identity
//! bundle, both with deterministic fallbacks on any failure.

use async_openai::{
    config::OpenAIConfig,
    types::{
        ChatCompletionRequestMessage, ChatCompletionRequestMessageContentPartImageArgs,
        ChatCompletionRequestMessageContentPartTextArgs, ChatCompletionRequestSystemMessageArgs,
        ChatCompletionRequestUserMessageArgs, CreateChatCompletionRequestArgs, ImageDetail,
        ImageUrlArgs,
    },
    Client,
};
use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use thiserror::Error;
use tracing::{debug, warn};

use magpie_browser::CaptchaSolver;
use magpie_core::{generate_identity, SiteKind, SyntheticIdentity};

/// Oracle call errors
#[derive(Debug, Error)]
pub enum OracleError {
    #[error("API error: {0}")]
    Api(String),

    #[error("Empty response")]
    EmptyResponse,
}

/// OpenAI-compatible backend configuration
#[derive(Debug, Clone)]
pub struct OracleConfig {
    pub api_key: String,
    /// Base URL override for OpenRouter or local servers
    pub base_url: Option<String>,
    pub model: String,
    pub temperature: f32,
    pub max_tokens: u32,
}

impl Default for OracleConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            base_url: None,
            model: "gpt-4o-mini".to_string(),
            temperature: 0.0,
            max_tokens: 512,
        }
    }
}

impl OracleConfig {
    pub fn openai(api_key: &str, model: &str) -> Self {
        Self {
            api_key: api_key.to_string(),
            model: model.to_string(),
            ..Default::default()
        }
    }

    pub fn local(base_url: &str, model: &str) -> Self {
        Self {
            api_key: "sk-local".to_string(),
            base_url: Some(base_url.to_string()),
            model: model.to_string(),
            ..Default::default()
        }
    }
}

/// The configured LLM client
pub struct Oracle {
    client: Client<OpenAIConfig>,
    config: OracleConfig,
}

impl Oracle {
    pub fn new(config: OracleConfig) -> Self {
        let mut openai_config = OpenAIConfig::new().with_api_key(&config.api_key);
        if let Some(base_url) = &config.base_url {
            openai_config = openai_config.with_api_base(base_url);
        }
        Self {
            client: Client::with_config(openai_config),
            config,
        }
    }

    pub fn model_name(&self) -> &str {
        &self.config.model
    }

    async fn generate(&self, system: &str, user: &str) -> Result<String, OracleError> {
        let messages = vec![
            ChatCompletionRequestMessage::System(
                ChatCompletionRequestSystemMessageArgs::default()
                    .content(system)
                    .build()
                    .map_err(|e| OracleError::Api(e.to_string()))?,
            ),
            ChatCompletionRequestMessage::User(
                ChatCompletionRequestUserMessageArgs::default()
                    .content(user)
                    .build()
                    .map_err(|e| OracleError::Api(e.to_string()))?,
            ),
        ];

        let request = CreateChatCompletionRequestArgs::default()
            .model(&self.config.model)
            .messages(messages)
            .temperature(self.config.temperature)
            .max_tokens(self.config.max_tokens)
            .build()
            .map_err(|e| OracleError::Api(e.to_string()))?;

        let response = self
            .client
            .chat()
            .create(request)
            .await
            .map_err(|e| OracleError::Api(e.to_string()))?;

        response
            .choices
            .first()
            .and_then(|c| c.message.content.clone())
            .ok_or(OracleError::EmptyResponse)
    }

    async fn generate_with_image(
        &self,
        system: &str,
        user: &str,
        image_png: &[u8],
    ) -> Result<String, OracleError> {
        let data_url = format!("data:image/png;base64,{}", BASE64.encode(image_png));

        let text_part = ChatCompletionRequestMessageContentPartTextArgs::default()
            .text(user)
            .build()
            .map_err(|e| OracleError::Api(e.to_string()))?;
        let image_part = ChatCompletionRequestMessageContentPartImageArgs::default()
            .image_url(
                ImageUrlArgs::default()
                    .url(data_url)
                    .detail(ImageDetail::High)
                    .build()
                    .map_err(|e| OracleError::Api(e.to_string()))?,
            )
            .build()
            .map_err(|e| OracleError::Api(e.to_string()))?;

        let messages = vec![
            ChatCompletionRequestMessage::System(
                ChatCompletionRequestSystemMessageArgs::default()
                    .content(system)
                    .build()
                    .map_err(|e| OracleError::Api(e.to_string()))?,
            ),
            ChatCompletionRequestMessage::User(
                ChatCompletionRequestUserMessageArgs::default()
                    .content(vec![text_part.into(), image_part.into()])
                    .build()
                    .map_err(|e| OracleError::Api(e.to_string()))?,
            ),
        ];

        let request = CreateChatCompletionRequestArgs::default()
            .model(&self.config.model)
            .messages(messages)
            .max_tokens(self.config.max_tokens)
            .build()
            .map_err(|e| OracleError::Api(e.to_string()))?;

        let response = self
            .client
            .chat()
            .create(request)
            .await
            .map_err(|e| OracleError::Api(e.to_string()))?;

        response
            .choices
            .first()
            .and_then(|c| c.message.content.clone())
            .ok_or(OracleError::EmptyResponse)
    }

    /// Propose an identity bundle suited to the site, falling back to the
    /// deterministic generator on any failure
    pub async fn identity_for(&self, kind: SiteKind, page_title: &str) -> SyntheticIdentity {
        let fallback = generate_identity(kind);
        let system = "You generate plausible pseudonymous account details. \
                      Respond with a single JSON object and nothing else.";
        let user = format!(
            "Invent account details for registering on a site titled {:?}. \
             Respond as JSON with keys: username, password, email, btc_address, \
             pgp_key, telegram, age, country. Use {:?} as btc_address. \
             Age is a number between 21 and 45.",
            page_title, fallback.btc_address,
        );

        match self.generate(system, &user).await {
            Ok(text) => match parse_identity_json(&text) {
                Some(identity) => identity,
                None => {
                    debug!("identity response unparseable, using fallback");
                    fallback
                }
            },
            Err(e) => {
                warn!("identity generation failed: {}", e);
                fallback
            }
        }
    }
}

/// Extract an identity from an LLM reply, tolerating code fences
fn parse_identity_json(text: &str) -> Option<SyntheticIdentity> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    serde_json::from_str(&text[start..=end]).ok()
}

#[async_trait]
impl CaptchaSolver for Oracle {
    async fn solve(&self, image_png: &[u8]) -> Option<String> {
        let system = "You read distorted CAPTCHA images. Respond with only the \
                      characters shown, no explanation. If unreadable respond UNREADABLE.";
        let user = "What characters does this CAPTCHA show?";

        match self.generate_with_image(system, user, image_png).await {
            Ok(text) => {
                let answer = text
                    .trim()
                    .trim_matches(|c| c == '"' || c == '`' || c == '.')
                    .to_string();
                if answer.is_empty()
                    || answer.len() > 12
                    || answer.eq_ignore_ascii_case("unreadable")
                {
                    None
                } else {
                    Some(answer)
                }
            }
            Err(e) => {
                warn!("captcha solve failed: {}", e);
                None
            }
        }
    }

    fn name(&self) -> &str {
        &self.config.model
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_identity_json_tolerates_fences() {
        let text = r#"```json
        {"username":"grayfox12","password":"p","email":"g@x.com",
         "btc_address":"1BitcoinEaterAddressDontSendf59kuE",
         "pgp_key":"","telegram":"","age":30,"country":"Germany"}
        ```"#;
        let id = parse_identity_json(text).unwrap();
        assert_eq!(id.username, "grayfox12");
        assert_eq!(id.age, 30);
    }

    #[test]
    fn test_parse_identity_json_rejects_garbage() {
        assert!(parse_identity_json("no json here").is_none());
        assert!(parse_identity_json("{\"username\": truncated").is_none());
    }
}
