// Authoritative round clock. Every participant, and the orchestrator itself,
// derives round and remaining time from this one formula; nothing advances
// rounds on its own.

/// Fixed timing parameters of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RoundClock {
    started_at_ms: u64,
    unit_ms: u64,
    round_duration: u64,
    round_count: u32,
}

/// Result of sampling the clock at one instant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClockSample {
    /// Whole time units since the session started.
    pub elapsed: u64,
    /// Current round, clamped to the last round.
    pub round_index: u32,
    /// Units left in the current round; zero once every round has elapsed.
    pub time_left: u64,
    pub finished: bool,
}

impl RoundClock {
    pub fn new(started_at_ms: u64, unit_ms: u64, round_duration: u64, round_count: u32) -> Self {
        Self {
            started_at_ms,
            unit_ms: unit_ms.max(1),
            round_duration: round_duration.max(1),
            round_count: round_count.max(1),
        }
    }

    pub fn started_at_ms(&self) -> u64 {
        self.started_at_ms
    }

    pub fn unit_ms(&self) -> u64 {
        self.unit_ms
    }

    pub fn round_duration(&self) -> u64 {
        self.round_duration
    }

    pub fn round_count(&self) -> u32 {
        self.round_count
    }

    pub fn last_round_index(&self) -> u32 {
        self.round_count - 1
    }

    /// Total session length in time units.
    pub fn total_units(&self) -> u64 {
        self.round_duration * u64::from(self.round_count)
    }

    /// Wall-clock instant at which the session finishes.
    pub fn ends_at_ms(&self) -> u64 {
        self.started_at_ms + self.total_units() * self.unit_ms
    }

    pub fn sample(&self, now_ms: u64) -> ClockSample {
        // Samples taken before the start (clock skew) count as zero elapsed.
        let elapsed = now_ms.saturating_sub(self.started_at_ms) / self.unit_ms;
        let round_index = (elapsed / self.round_duration).min(u64::from(self.last_round_index()));
        let finished = elapsed >= self.total_units();
        let time_left = if finished {
            0
        } else {
            self.round_duration - (elapsed % self.round_duration)
        };

        ClockSample {
            elapsed,
            // Bounded by round_count, which is a u32.
            round_index: round_index as u32,
            time_left,
            finished,
        }
    }
}
