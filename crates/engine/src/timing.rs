//! Timing resolution: step field, then scenario defaults, then built-in constants

use std::time::Duration;

use tuimuppet_common::defaults;
use tuimuppet_common::{ScenarioDefaults, StepCommon};

/// Scenario-wide timing with built-in fallbacks applied
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timing {
    pub wait_timeout: Duration,
    pub poll: Duration,
    pub scrollback_lines: usize,
    pub post_type: Duration,
}

impl Default for Timing {
    fn default() -> Self {
        Self {
            wait_timeout: Duration::from_millis(defaults::WAIT_TIMEOUT_MS),
            poll: Duration::from_millis(defaults::POLL_MS),
            scrollback_lines: defaults::SCROLLBACK_LINES,
            post_type: Duration::from_millis(defaults::POST_TYPE_MS),
        }
    }
}

impl Timing {
    pub fn from_defaults(scenario: &ScenarioDefaults) -> Self {
        let builtin = Self::default();
        Self {
            wait_timeout: scenario
                .wait_timeout_ms
                .map(Duration::from_millis)
                .unwrap_or(builtin.wait_timeout),
            poll: scenario.poll_ms.map(Duration::from_millis).unwrap_or(builtin.poll),
            scrollback_lines: scenario.scrollback_lines.unwrap_or(builtin.scrollback_lines),
            post_type: scenario
                .post_type_ms
                .map(Duration::from_millis)
                .unwrap_or(builtin.post_type),
        }
    }

    /// Apply a step's own overrides
    pub fn for_step(&self, common: &StepCommon) -> Timing {
        Timing {
            wait_timeout: common
                .timeout_ms
                .map(Duration::from_millis)
                .unwrap_or(self.wait_timeout),
            poll: common.poll_ms.map(Duration::from_millis).unwrap_or(self.poll),
            scrollback_lines: common.scrollback_lines.unwrap_or(self.scrollback_lines),
            post_type: self.post_type,
        }
    }
}
