use super::{ChatClient, ChatMessage, ChatOutcome, ToolSpec};
use crate::model::ModelEndpoint;
use async_trait::async_trait;
use serde_json::json;

/// Chat client for OpenAI-compatible `/chat/completions` endpoints.
///
/// The `base_url` is configurable per endpoint, so the same client type
/// covers any provider speaking the OpenAI wire format.
#[derive(Debug)]
pub struct OpenAiChatClient {
    pub label: String,
    pub model: String,
    pub base_url: String,
    pub api_key: String,
    pub temperature: f32,
    pub max_tokens: u32,
    pub client: reqwest::Client,
}

impl OpenAiChatClient {
    pub fn new(
        label: String,
        model: String,
        base_url: String,
        api_key: String,
        temperature: f32,
        max_tokens: u32,
    ) -> Self {
        Self {
            label,
            model,
            base_url,
            api_key,
            temperature,
            max_tokens,
            client: reqwest::Client::new(),
        }
    }

    /// Build a client from a configured endpoint, reading the API key from
    /// the endpoint's named environment variable.
    pub fn from_endpoint(ep: &ModelEndpoint) -> anyhow::Result<Self> {
        let api_key = std::env::var(&ep.api_key_env).map_err(|_| {
            anyhow::anyhow!(
                "config error: environment variable {} (api_key_env for model '{}') is not set",
                ep.api_key_env,
                ep.name
            )
        })?;
        Ok(Self::new(
            ep.name.clone(),
            ep.model.clone(),
            ep.base_url.trim_end_matches('/').to_string(),
            api_key,
            ep.temperature.unwrap_or(0.7),
            ep.max_tokens.unwrap_or(1024),
        ))
    }

    fn messages_json(messages: &[ChatMessage]) -> Vec<serde_json::Value> {
        messages
            .iter()
            .map(|m| json!({ "role": m.role.as_str(), "content": m.content }))
            .collect()
    }

    async fn post(&self, body: serde_json::Value) -> anyhow::Result<serde_json::Value> {
        let url = format!("{}/chat/completions", self.base_url);
        let resp = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await?;

        if !resp.status().is_success() {
            let status = resp.status();
            let error_text = resp.text().await.unwrap_or_default();
            anyhow::bail!("chat API error ({}): {}", status, error_text);
        }
        Ok(resp.json().await?)
    }
}

#[async_trait]
impl ChatClient for OpenAiChatClient {
    async fn chat(
        &self,
        messages: &[ChatMessage],
        tools: Option<&[ToolSpec]>,
    ) -> anyhow::Result<ChatOutcome> {
        let mut body = json!({
            "model": self.model,
            "messages": Self::messages_json(messages),
            "temperature": self.temperature,
            "max_tokens": self.max_tokens,
        });

        if let Some(tools) = tools {
            let specs: Vec<serde_json::Value> = tools
                .iter()
                .map(|t| {
                    json!({
                        "type": "function",
                        "function": {
                            "name": t.name,
                            "description": t.description,
                            "parameters": t.parameters,
                        }
                    })
                })
                .collect();
            body["tools"] = json!(specs);
        }

        let json = self.post(body).await?;
        let message = json
            .pointer("/choices/0/message")
            .ok_or_else(|| anyhow::anyhow!("chat API response missing message"))?;

        if let Some(call) = message.pointer("/tool_calls/0/function") {
            let name = call
                .get("name")
                .and_then(|v| v.as_str())
                .ok_or_else(|| anyhow::anyhow!("tool call missing function name"))?
                .to_string();
            let raw_args = call.get("arguments").and_then(|v| v.as_str()).unwrap_or("{}");
            let arguments: serde_json::Value = serde_json::from_str(raw_args)
                .map_err(|e| anyhow::anyhow!("tool call arguments are not valid JSON: {}", e))?;
            return Ok(ChatOutcome::ToolCall { name, arguments });
        }

        let text = message
            .get("content")
            .and_then(|v| v.as_str())
            .ok_or_else(|| anyhow::anyhow!("chat API response missing content"))?
            .to_string();
        Ok(ChatOutcome::Text(text))
    }

    async fn chat_structured(
        &self,
        messages: &[ChatMessage],
        schema: &serde_json::Value,
    ) -> anyhow::Result<serde_json::Value> {
        let body = json!({
            "model": self.model,
            "messages": Self::messages_json(messages),
            "temperature": self.temperature,
            "max_tokens": self.max_tokens,
            "response_format": {
                "type": "json_schema",
                "json_schema": {
                    "name": "structured_result",
                    "schema": schema,
                }
            },
        });

        let json = self.post(body).await?;
        let text = json
            .pointer("/choices/0/message/content")
            .and_then(|v| v.as_str())
            .ok_or_else(|| anyhow::anyhow!("chat API response missing content"))?;
        let value: serde_json::Value = serde_json::from_str(text)
            .map_err(|e| anyhow::anyhow!("structured output is not valid JSON: {}", e))?;
        Ok(value)
    }

    fn label(&self) -> &str {
        &self.label
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::llm::Role;

    #[test]
    fn messages_json_preserves_roles() {
        let messages = vec![
            ChatMessage::system("be brief"),
            ChatMessage::user("hola"),
            ChatMessage::assistant("bon dia"),
        ];
        let v = OpenAiChatClient::messages_json(&messages);
        assert_eq!(v[0]["role"], "system");
        assert_eq!(v[1]["role"], "user");
        assert_eq!(v[2]["role"], "assistant");
        assert_eq!(Role::Assistant.as_str(), "assistant");
    }

    #[test]
    fn from_endpoint_requires_api_key() {
        let ep = ModelEndpoint {
            name: "m".into(),
            model: "gpt-4o-mini".into(),
            base_url: "https://api.openai.com/v1/".into(),
            api_key_env: "BOTIGA_TEST_KEY_THAT_DOES_NOT_EXIST".into(),
            temperature: None,
            max_tokens: None,
        };
        let err = OpenAiChatClient::from_endpoint(&ep).unwrap_err();
        assert!(err.to_string().contains("is not set"));
    }
}
