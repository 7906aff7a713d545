//! Pure transformations between the public assistant API and the agent service.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::config::ToolApprovalPolicy;
use crate::models::AssistantResponse;

pub const UNKNOWN_STAGE: &str = "Unknown";
pub const FALLBACK_REPLY: &str = "I am ready to help. Could you provide more detail?";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct InputMessage {
    pub role: String,
    pub content: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AgentReference {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ToolApproval {
    pub mode: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_names: Option<Vec<String>>,
}

/// Outbound payload for one agent invocation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AgentCall {
    pub input: Vec<InputMessage>,
    pub agent: AgentReference,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_approval: Option<ToolApproval>,
}

/// What the agent service handed back, before shaping.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AgentOutput {
    pub output_text: Option<String>,
    pub context: Option<Value>,
}

pub fn shape_request(
    message: &str,
    stage_id: Option<&str>,
    agent_name: &str,
    policy: &ToolApprovalPolicy,
) -> AgentCall {
    let stage_label = stage_id.filter(|s| !s.is_empty()).unwrap_or(UNKNOWN_STAGE);

    let tool_approval = policy.enabled.then(|| ToolApproval {
        mode: "auto".to_string(),
        tool_names: (!policy.tool_names.is_empty()).then(|| policy.tool_names.clone()),
    });

    AgentCall {
        input: vec![InputMessage {
            role: "user".to_string(),
            content: format!("Current stage: {stage_label}\n\n{message}"),
        }],
        agent: AgentReference {
            name: agent_name.to_string(),
            kind: "agent_reference".to_string(),
        },
        tool_approval,
    }
}

/// Conversion of an upstream metadata value into a plain key-value mapping.
/// `None` means the value has no mapping form and is dropped.
pub trait MetadataSource {
    fn into_metadata(self) -> Option<Map<String, Value>>;
}

impl MetadataSource for Value {
    fn into_metadata(self) -> Option<Map<String, Value>> {
        match self {
            Value::Object(map) => Some(map),
            // [["key", value], ...]
            Value::Array(items) => items
                .into_iter()
                .map(|item| match item {
                    Value::Array(mut pair) if pair.len() == 2 => {
                        let value = pair.pop()?;
                        match pair.pop()? {
                            Value::String(key) => Some((key, value)),
                            _ => None,
                        }
                    }
                    _ => None,
                })
                .collect(),
            _ => None,
        }
    }
}

pub fn shape_response(output: AgentOutput) -> AssistantResponse {
    let reply = output
        .output_text
        .filter(|text| !text.is_empty())
        .unwrap_or_else(|| FALLBACK_REPLY.to_string());

    AssistantResponse {
        reply,
        metadata: output.context.and_then(MetadataSource::into_metadata),
    }
}
