use serde::{Deserialize, Serialize};

// =============================================================================
// Time of Day
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimeOfDay {
    #[default]
    Morning,
    Afternoon,
    Evening,
    Night,
}

impl TimeOfDay {
    pub fn display_name(&self) -> &'static str {
        match self {
            TimeOfDay::Morning => "Morning",
            TimeOfDay::Afternoon => "Afternoon",
            TimeOfDay::Evening => "Evening",
            TimeOfDay::Night => "Night",
        }
    }

    /// Stable lowercase name, as written in world files and compared by conditions.
    pub fn as_key(&self) -> &'static str {
        match self {
            TimeOfDay::Morning => "morning",
            TimeOfDay::Afternoon => "afternoon",
            TimeOfDay::Evening => "evening",
            TimeOfDay::Night => "night",
        }
    }

    /// Returns the next time period in sequence.
    pub fn next(&self) -> TimeOfDay {
        match self {
            TimeOfDay::Morning => TimeOfDay::Afternoon,
            TimeOfDay::Afternoon => TimeOfDay::Evening,
            TimeOfDay::Evening => TimeOfDay::Night,
            TimeOfDay::Night => TimeOfDay::Morning,
        }
    }

    /// Returns all periods in order.
    pub fn all() -> [TimeOfDay; 4] {
        [
            TimeOfDay::Morning,
            TimeOfDay::Afternoon,
            TimeOfDay::Evening,
            TimeOfDay::Night,
        ]
    }

    pub fn from_key(key: &str) -> Option<TimeOfDay> {
        Self::all()
            .into_iter()
            .find(|t| t.as_key().eq_ignore_ascii_case(key.trim()))
    }
}

impl std::fmt::Display for TimeOfDay {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.display_name())
    }
}

// =============================================================================
// Time Progression
// =============================================================================

/// How the clock moves as turns complete.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeProgression {
    /// Turns spent in each period before moving to the next one.
    /// Zero disables automatic progression; only actions change the time.
    pub turns_per_period: u32,
}

impl Default for TimeProgression {
    fn default() -> Self {
        Self {
            turns_per_period: 5,
        }
    }
}

impl TimeProgression {
    pub fn manual() -> Self {
        Self {
            turns_per_period: 0,
        }
    }

    /// Whether the clock should tick when `turn` begins.
    pub fn ticks_at(&self, turn: u64) -> bool {
        self.turns_per_period > 0 && turn > 1 && (turn - 1) % u64::from(self.turns_per_period) == 0
    }
}
