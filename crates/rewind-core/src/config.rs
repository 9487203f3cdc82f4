//! Trampoline configuration

use serde::{Deserialize, Serialize};

/// Tuning knobs for a single `reset` evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScopeConfig {
    /// Maximum number of trampoline steps before the evaluation fails with
    /// a step-limit error. `None` means unbounded.
    pub max_steps: Option<usize>,
    /// Steps a [`ResetFuture`](crate::ResetFuture) runs per poll before it
    /// yields back to the scheduler.
    pub poll_budget: usize,
}

impl Default for ScopeConfig {
    fn default() -> Self {
        Self {
            max_steps: None,
            poll_budget: 256,
        }
    }
}

impl ScopeConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_steps(mut self, max_steps: usize) -> Self {
        self.max_steps = Some(max_steps);
        self
    }

    pub fn with_poll_budget(mut self, poll_budget: usize) -> Self {
        self.poll_budget = poll_budget.max(1);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_config_uses_defaults() {
        let config: ScopeConfig = serde_json::from_str(r#"{ "max_steps": 1000 }"#).unwrap();
        assert_eq!(config.max_steps, Some(1000));
        assert_eq!(config.poll_budget, 256);
    }

    #[test]
    fn test_empty_config_is_default() {
        let config: ScopeConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config, ScopeConfig::default());
    }

    #[test]
    fn test_poll_budget_is_at_least_one() {
        assert_eq!(ScopeConfig::new().with_poll_budget(0).poll_budget, 1);
    }
}
