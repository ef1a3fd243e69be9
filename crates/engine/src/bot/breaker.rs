// SPDX-License-Identifier: MIT

//! Circuit breaker over consecutive failures, with exponential pause.

use super::{BotEngine, BREAKER_RESUME};
use crate::strategy::Strategy;
use crate::transport::PageTransport;
use reeve_core::{BotState, Clock};
use std::time::Duration;

enum BreakerDecision {
    Fine,
    Pause { trip: u32, cooldown: Duration },
    Exhausted,
}

impl<T, S, C> BotEngine<T, S, C>
where
    T: PageTransport,
    S: Strategy,
    C: Clock,
{
    /// Trip the breaker when the failure streak hits its threshold.
    ///
    /// Returns true when the cycle should end (paused or emergency).
    /// The trip consumes the streak so a recovered page gets a clean
    /// window after the pause; task success resets trips as well.
    pub(super) async fn check_circuit_breaker(&self) -> bool {
        let decision = self.with_state(|s| {
            if s.consecutive_failures < s.config.safety.max_consecutive_failures {
                return BreakerDecision::Fine;
            }
            s.breaker_trips += 1;
            s.consecutive_failures = 0;
            if s.breaker_trips >= s.config.safety.max_breaker_trips {
                return BreakerDecision::Exhausted;
            }
            let base = s.config.safety.pause_base_secs;
            let cooldown = Duration::from_secs(base.saturating_mul(1 << (s.breaker_trips - 1)));
            BreakerDecision::Pause { trip: s.breaker_trips, cooldown }
        });

        match decision {
            BreakerDecision::Fine => false,
            BreakerDecision::Exhausted => {
                self.emergency_stop("Persistent failures: circuit breaker exhausted").await;
                true
            }
            BreakerDecision::Pause { trip, cooldown } => {
                self.logger.warn(
                    format!(
                        "circuit breaker tripped ({trip}); pausing for {}s",
                        cooldown.as_secs()
                    ),
                    None,
                );
                self.transition(BotState::Paused);
                self.scheduler.lock().schedule_once(BREAKER_RESUME, cooldown, self.clock.now());
                true
            }
        }
    }

    /// The one-shot resume after a breaker pause.
    pub(crate) fn resume_from_breaker(&self) {
        if self.transition(BotState::Idle) {
            self.logger.info("resuming after circuit-breaker pause", None);
        }
    }
}

#[cfg(test)]
#[path = "breaker_tests.rs"]
mod tests;
