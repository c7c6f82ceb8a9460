//! Turn Clock
//!
//! Per-session turn deadline with generation-token guarding. Arming
//! the clock bumps a generation counter and hands back a token; a
//! sleeper that wakes up with a stale token must do nothing. Cancel
//! and reschedule is therefore a single `arm` call, and one expiry can
//! never fire twice.
//!
//! The clock itself holds no timer task. The session layer sleeps on
//! tokio time and revalidates its token inside the session lock, the
//! same serialization point as player actions.

use chrono::{DateTime, Utc};
use std::time::Duration;

/// Proof of the arming that created it. Stale tokens are refused.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TurnToken {
    generation: u64,
}

/// Deadline state for one session.
#[derive(Clone, Debug)]
pub struct TurnClock {
    generation: u64,
    duration: Duration,
    deadline: Option<DateTime<Utc>>,
}

impl TurnClock {
    /// Create a disarmed clock with the kind's turn duration.
    pub fn new(duration: Duration) -> Self {
        Self {
            generation: 0,
            duration,
            deadline: None,
        }
    }

    /// Arm (or re-arm) the clock, invalidating every earlier token.
    pub fn arm(&mut self) -> TurnToken {
        self.generation += 1;
        self.deadline = Some(Utc::now() + chrono::Duration::from_std(self.duration).unwrap_or_default());
        TurnToken {
            generation: self.generation,
        }
    }

    /// Disarm without arming again. Earlier tokens become stale.
    pub fn disarm(&mut self) {
        self.generation += 1;
        self.deadline = None;
    }

    /// Whether a token belongs to the latest arming.
    pub fn is_current(&self, token: TurnToken) -> bool {
        self.deadline.is_some() && token.generation == self.generation
    }

    /// Configured duration per turn.
    pub fn duration(&self) -> Duration {
        self.duration
    }

    /// Current deadline, for projections and logging.
    pub fn deadline(&self) -> Option<DateTime<Utc>> {
        self.deadline
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_arm_invalidates_previous_token() {
        let mut clock = TurnClock::new(Duration::from_secs(60));
        let first = clock.arm();
        assert!(clock.is_current(first));

        let second = clock.arm();
        assert!(!clock.is_current(first));
        assert!(clock.is_current(second));
    }

    #[test]
    fn test_disarm_invalidates_all_tokens() {
        let mut clock = TurnClock::new(Duration::from_secs(60));
        let token = clock.arm();
        clock.disarm();
        assert!(!clock.is_current(token));
        assert!(clock.deadline().is_none());
    }

    #[test]
    fn test_token_is_single_use_per_arming() {
        let mut clock = TurnClock::new(Duration::from_secs(45));
        let token = clock.arm();

        // A fired timer re-arms; the consumed token must not pass again.
        assert!(clock.is_current(token));
        let next = clock.arm();
        assert!(!clock.is_current(token));
        assert!(clock.is_current(next));
    }

    #[test]
    fn test_deadline_tracks_duration() {
        let mut clock = TurnClock::new(Duration::from_secs(90));
        assert!(clock.deadline().is_none());
        clock.arm();
        let deadline = clock.deadline().unwrap();
        let remaining = deadline - Utc::now();
        assert!(remaining.num_seconds() > 85 && remaining.num_seconds() <= 90);
    }
}
