use subtle::ConstantTimeEq;

use crate::errors::ServiceError;

pub const AGENT_KEY_HEADER: &str = "X-AGENT-KEY";

/// Shared-secret check. An unset or empty secret means open mode.
#[derive(Clone, Default)]
pub struct AccessGuard {
    shared_key: Option<String>,
}

impl AccessGuard {
    pub fn new(shared_key: Option<String>) -> Self {
        Self {
            shared_key: shared_key.filter(|key| !key.is_empty()),
        }
    }

    pub fn is_open(&self) -> bool {
        self.shared_key.is_none()
    }

    pub fn verify(&self, provided: Option<&str>) -> Result<(), ServiceError> {
        match &self.shared_key {
            None => Ok(()),
            Some(expected) => match provided {
                Some(given) if constant_time_compare(given, expected) => Ok(()),
                _ => Err(ServiceError::Unauthorized),
            },
        }
    }
}

fn constant_time_compare(a: &str, b: &str) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.as_bytes().ct_eq(b.as_bytes()).into()
}
