//! Driving control input
//!
//! A single mutable slot with overwrite semantics: each new command replaces
//! the previous one, and the stepping loop consumes whatever is most recent
//! at tick time. Commands are never queued.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// The latest throttle/steering pair to apply at the next tick
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ControlCommand {
    /// -1 (full reverse) to 1 (full forward)
    pub throttle: f64,
    /// -1 (left) to 1 (right)
    pub steering: f64,
    pub issued_at: DateTime<Utc>,
}

impl ControlCommand {
    /// Build a command, clamping both axes into [-1, 1].
    /// Out-of-range input is clamped, not rejected.
    pub fn new(throttle: f64, steering: f64) -> Self {
        Self {
            throttle: throttle.clamp(-1.0, 1.0),
            steering: steering.clamp(-1.0, 1.0),
            issued_at: Utc::now(),
        }
    }

    /// The implicit command when no keys are held
    pub fn neutral() -> Self {
        Self::new(0.0, 0.0)
    }

    pub fn is_neutral(&self) -> bool {
        self.throttle == 0.0 && self.steering == 0.0
    }
}

impl Default for ControlCommand {
    fn default() -> Self {
        Self::neutral()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clamping() {
        let cmd = ControlCommand::new(2.5, -7.0);
        assert_eq!(cmd.throttle, 1.0);
        assert_eq!(cmd.steering, -1.0);

        let cmd = ControlCommand::new(0.25, 0.5);
        assert_eq!(cmd.throttle, 0.25);
        assert_eq!(cmd.steering, 0.5);
    }

    #[test]
    fn test_neutral_default() {
        let cmd = ControlCommand::default();
        assert!(cmd.is_neutral());
        assert!(!ControlCommand::new(0.1, 0.0).is_neutral());
    }
}
