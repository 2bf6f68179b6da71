use serde::{Deserialize, Serialize};

///
/// ReviewOutcome
/// The response half of the orchestrator's admission review contract. The
/// webhook transport is wired elsewhere; validators produce this shape so
/// every rejection reaches the user as an orchestrator-native status.
///

#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct ReviewOutcome {
    pub allowed: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl ReviewOutcome {
    #[must_use]
    pub const fn allow() -> Self {
        Self {
            allowed: true,
            reason: None,
            message: None,
        }
    }

    #[must_use]
    pub fn reject(reason: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            allowed: false,
            reason: Some(reason.into()),
            message: Some(message.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allow_serializes_minimally() {
        let json = serde_json::to_value(ReviewOutcome::allow()).unwrap();
        assert_eq!(json, serde_json::json!({ "allowed": true }));
    }

    #[test]
    fn reject_carries_reason_and_message() {
        let outcome = ReviewOutcome::reject("Forbidden", "no");
        let json = serde_json::to_value(outcome).unwrap();
        assert_eq!(json["allowed"], serde_json::json!(false));
        assert_eq!(json["reason"], serde_json::json!("Forbidden"));
    }
}
