use async_trait::async_trait;
use reqwest::{StatusCode, Url};
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, info};

use crate::config::GatewayConfig;
use crate::errors::ServiceError;
use crate::shaping::{AgentCall, AgentOutput};

/// The external agent-invocation collaborator.
#[async_trait]
pub trait AgentInvoker: Send + Sync {
    async fn invoke(&self, call: &AgentCall) -> Result<AgentOutput, ServiceError>;
}

/// Talks to the project's OpenAI-compatible responses endpoint over HTTP.
pub struct ResponsesClient {
    http: reqwest::Client,
    endpoint: String,
    api_key: Option<String>,
    api_version: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ResponseBody {
    #[serde(default)]
    output_text: Option<String>,
    #[serde(default)]
    output: Vec<OutputItem>,
    #[serde(default)]
    context: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct OutputItem {
    #[serde(default)]
    content: Vec<ContentPart>,
}

#[derive(Debug, Deserialize)]
struct ContentPart {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct AgentRecord {
    #[serde(default)]
    name: Option<String>,
}

fn upstream_error(status: StatusCode, body: &str) -> ServiceError {
    ServiceError::Upstream(format!("Error code: {} - {}", status.as_u16(), body))
}

impl ResponseBody {
    fn into_output(self) -> AgentOutput {
        let output_text = self.output_text.filter(|t| !t.is_empty()).or_else(|| {
            let joined: String = self
                .output
                .iter()
                .flat_map(|item| item.content.iter())
                .filter(|part| part.kind == "output_text")
                .filter_map(|part| part.text.as_deref())
                .collect();
            (!joined.is_empty()).then_some(joined)
        });

        AgentOutput {
            output_text,
            context: self.context,
        }
    }
}

impl ResponsesClient {
    pub fn new(config: &GatewayConfig) -> Self {
        Self {
            http: reqwest::Client::new(),
            endpoint: config.project_endpoint.clone(),
            api_key: config.project_api_key.clone(),
            api_version: config.api_version.clone(),
        }
    }

    fn request(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        let builder = match &self.api_version {
            Some(version) => builder.query(&[("api-version", version)]),
            None => builder,
        };
        match &self.api_key {
            Some(key) => builder.bearer_auth(key),
            None => builder,
        }
    }

    /// `endpoint` with `segments` appended, each percent-encoded as a single path segment.
    fn url(&self, segments: &[&str]) -> Result<Url, ServiceError> {
        let mut url = Url::parse(&self.endpoint)
            .map_err(|e| ServiceError::Configuration(format!("Invalid endpoint {}: {e}", self.endpoint)))?;
        url.path_segments_mut()
            .map_err(|_| ServiceError::Configuration(format!("Endpoint {} cannot take a path", self.endpoint)))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    async fn send(&self, builder: reqwest::RequestBuilder) -> Result<reqwest::Response, ServiceError> {
        let response = self.request(builder).send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_else(|e| {
                debug!("Failed to read upstream error body: {}", e);
                String::new()
            });
            return Err(upstream_error(status, &body));
        }
        Ok(response)
    }

    /// Confirms the agent exists and returns its canonical name.
    pub async fn resolve_agent(&self, agent_name: &str) -> Result<String, ServiceError> {
        let url = self.url(&["agents", agent_name])?;
        info!("Resolving agent {} at {}", agent_name, url);

        let record: AgentRecord = self
            .send(self.http.get(url))
            .await
            .map_err(|e| ServiceError::Configuration(format!("Unable to load agent {agent_name}: {e}")))?
            .json()
            .await
            .map_err(|e| ServiceError::Configuration(format!("Unable to load agent {agent_name}: {e}")))?;

        Ok(record.name.unwrap_or_else(|| agent_name.to_string()))
    }
}

#[async_trait]
impl AgentInvoker for ResponsesClient {
    async fn invoke(&self, call: &AgentCall) -> Result<AgentOutput, ServiceError> {
        let url = self.url(&["openai", "responses"])?;
        debug!("Invoking agent {} via {}", call.agent.name, url);

        let body: ResponseBody = self.send(self.http.post(url).json(call)).await?.json().await?;
        Ok(body.into_output())
    }
}
