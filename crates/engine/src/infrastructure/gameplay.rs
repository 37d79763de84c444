//! Gameplay heuristics that run after the narrative is known.

use taleweaver_domain::Action;

use crate::infrastructure::ports::{GameplayContext, GameplayPort};

const POSITIVE: &[&str] = &[
    "thank", "thanks", "help", "smile", "compliment", "gift", "hug", "listen", "sorry", "kind",
];
const NEGATIVE: &[&str] = &[
    "insult", "ignore", "shout", "lie", "mock", "threaten", "push", "rude", "leave",
];

/// Nudges the active companion's affinity by one point when the player's
/// words are plainly kind or unkind. Mixed or neutral input proposes nothing.
#[derive(Debug, Clone)]
pub struct KeywordAffinity {
    positive: Vec<String>,
    negative: Vec<String>,
    step: i32,
}

impl Default for KeywordAffinity {
    fn default() -> Self {
        Self {
            positive: POSITIVE.iter().map(|s| s.to_string()).collect(),
            negative: NEGATIVE.iter().map(|s| s.to_string()).collect(),
            step: 1,
        }
    }
}

impl KeywordAffinity {
    fn score(&self, input: &str) -> i32 {
        let lowered = input.to_lowercase();
        let words: Vec<&str> = lowered
            .split(|c: char| !c.is_alphanumeric())
            .filter(|w| !w.is_empty())
            .collect();

        let hits = |list: &[String]| {
            words
                .iter()
                .filter(|w| list.iter().any(|k| w.starts_with(k.as_str())))
                .count() as i32
        };
        hits(&self.positive) - hits(&self.negative)
    }
}

impl GameplayPort for KeywordAffinity {
    fn name(&self) -> &'static str {
        "keyword_affinity"
    }

    fn propose(&self, context: &GameplayContext) -> Vec<Action> {
        let Some(companion) = &context.active_companion else {
            return Vec::new();
        };
        let delta = self.score(&context.player_input).signum() * self.step;
        if delta == 0 {
            return Vec::new();
        }
        vec![Action::modify_affinity(companion.clone(), delta)]
    }
}
