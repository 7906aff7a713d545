use std::time::Duration;

use crate::errors::ServiceError;

pub const RATE_WINDOW: Duration = Duration::from_secs(60);
const DEFAULT_RATE_LIMIT_PER_MINUTE: i64 = 60;
const DEFAULT_PORT: u16 = 8000;

/// Which origins the CORS layer lets through.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AllowedOrigins {
    Any,
    List(Vec<String>),
}

/// Per-call tool auto-approval policy attached to outbound agent calls.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ToolApprovalPolicy {
    pub enabled: bool,
    pub tool_names: Vec<String>, // empty = every tool
}

/// Process-wide settings, resolved once at startup.
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    pub project_endpoint: String,
    pub agent_name: String,
    pub shared_key: Option<String>,
    pub project_api_key: Option<String>,
    pub api_version: Option<String>,
    pub rate_limit_per_minute: usize,
    pub allowed_origins: AllowedOrigins,
    pub tool_approval: ToolApprovalPolicy,
    pub port: u16,
}

impl GatewayConfig {
    pub fn from_env() -> Result<Self, ServiceError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ServiceError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |name: &str| lookup(name).filter(|value| !value.trim().is_empty());

        let project_endpoint = non_empty("AI_PROJECT_ENDPOINT");
        let agent_name = non_empty("AGENT_NAME");
        let (Some(project_endpoint), Some(agent_name)) = (project_endpoint, agent_name) else {
            return Err(ServiceError::Configuration(
                "AI_PROJECT_ENDPOINT and AGENT_NAME must be set".to_string(),
            ));
        };

        let rate_limit_per_minute = match non_empty("RATE_LIMIT_PER_MINUTE") {
            Some(raw) => raw.trim().parse::<i64>().map_err(|e| {
                ServiceError::Configuration(format!("Invalid RATE_LIMIT_PER_MINUTE {raw:?}: {e}"))
            })?,
            None => DEFAULT_RATE_LIMIT_PER_MINUTE,
        };

        let port = match non_empty("PORT") {
            Some(raw) => raw.trim().parse::<u16>().map_err(|e| {
                ServiceError::Configuration(format!("Invalid PORT {raw:?}: {e}"))
            })?,
            None => DEFAULT_PORT,
        };

        let enabled = lookup("AUTO_APPROVE_TOOLS")
            .map(|raw| matches!(raw.trim().to_lowercase().as_str(), "1" | "true" | "yes"))
            .unwrap_or(false);

        Ok(Self {
            project_endpoint: project_endpoint.trim_end_matches('/').to_string(),
            agent_name,
            shared_key: non_empty("AGENT_SHARED_KEY"),
            project_api_key: non_empty("AI_PROJECT_API_KEY"),
            api_version: non_empty("AI_PROJECT_API_VERSION"),
            rate_limit_per_minute: rate_limit_per_minute.max(0) as usize,
            allowed_origins: parse_origins(&lookup("CORS_ORIGINS").unwrap_or_else(|| "*".into())),
            tool_approval: ToolApprovalPolicy {
                enabled,
                tool_names: split_list(&lookup("AUTO_APPROVE_TOOL_NAMES").unwrap_or_default()),
            },
            port,
        })
    }
}

fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

fn parse_origins(raw: &str) -> AllowedOrigins {
    let origins = split_list(raw);
    if origins.is_empty() || origins.iter().any(|o| o == "*") {
        AllowedOrigins::Any
    } else {
        AllowedOrigins::List(origins)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn load(vars: &[(&str, &str)]) -> Result<GatewayConfig, ServiceError> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        GatewayConfig::from_lookup(|name| map.get(name).cloned())
    }

    const REQUIRED: [(&str, &str); 2] = [
        ("AI_PROJECT_ENDPOINT", "https://project.example/api/"),
        ("AGENT_NAME", "hackathon-helper"),
    ];

    #[test]
    fn missing_endpoint_or_agent_is_fatal() {
        assert!(matches!(load(&[]), Err(ServiceError::Configuration(_))));
        assert!(matches!(
            load(&[("AGENT_NAME", "x")]),
            Err(ServiceError::Configuration(_))
        ));
        assert!(matches!(
            load(&[("AI_PROJECT_ENDPOINT", "https://e"), ("AGENT_NAME", "")]),
            Err(ServiceError::Configuration(_))
        ));
    }

    #[test]
    fn defaults() {
        let config = load(&REQUIRED).unwrap();
        assert_eq!(config.project_endpoint, "https://project.example/api");
        assert_eq!(config.rate_limit_per_minute, 60);
        assert_eq!(config.allowed_origins, AllowedOrigins::Any);
        assert_eq!(config.tool_approval, ToolApprovalPolicy::default());
        assert!(config.shared_key.is_none());
        assert_eq!(config.port, 8000);
    }

    #[test]
    fn parses_optional_settings() {
        let mut vars = REQUIRED.to_vec();
        vars.extend([
            ("AGENT_SHARED_KEY", "k"),
            ("RATE_LIMIT_PER_MINUTE", "5"),
            ("CORS_ORIGINS", "https://a.dev, https://b.dev,,"),
            ("AUTO_APPROVE_TOOLS", "YES"),
            ("AUTO_APPROVE_TOOL_NAMES", " search , ,fetch"),
        ]);
        let config = load(&vars).unwrap();
        assert_eq!(config.shared_key.as_deref(), Some("k"));
        assert_eq!(config.rate_limit_per_minute, 5);
        assert_eq!(
            config.allowed_origins,
            AllowedOrigins::List(vec!["https://a.dev".into(), "https://b.dev".into()])
        );
        assert!(config.tool_approval.enabled);
        assert_eq!(config.tool_approval.tool_names, vec!["search", "fetch"]);
    }

    #[test]
    fn wildcard_anywhere_allows_all_origins() {
        let mut vars = REQUIRED.to_vec();
        vars.push(("CORS_ORIGINS", "https://a.dev,*"));
        assert_eq!(load(&vars).unwrap().allowed_origins, AllowedOrigins::Any);
    }

    #[test]
    fn negative_limit_clamps_to_zero_and_garbage_is_rejected() {
        let mut vars = REQUIRED.to_vec();
        vars.push(("RATE_LIMIT_PER_MINUTE", "-3"));
        assert_eq!(load(&vars).unwrap().rate_limit_per_minute, 0);

        let mut vars = REQUIRED.to_vec();
        vars.push(("RATE_LIMIT_PER_MINUTE", "lots"));
        assert!(matches!(load(&vars), Err(ServiceError::Configuration(_))));
    }

    #[test]
    fn auto_approve_flag_is_off_for_unknown_values() {
        let mut vars = REQUIRED.to_vec();
        vars.push(("AUTO_APPROVE_TOOLS", "on"));
        assert!(!load(&vars).unwrap().tool_approval.enabled);
    }
}
