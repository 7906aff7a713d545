use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AssistantRequest {
    #[serde(default)]
    pub client_id: Option<String>, // Optional client identifier, used as rate key
    #[serde(default)]
    pub thread_id: Option<String>, // Passed through, never validated
    #[serde(default)]
    pub stage_id: Option<String>,
    pub message: String,
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct AssistantResponse {
    pub reply: String,
    pub metadata: Option<Map<String, Value>>,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct ErrorResponse {
    pub detail: String,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct HealthResponse {
    pub status: String,
}
