//! Assembles the narrator prompt for one turn.

use crate::infrastructure::ports::{ChatMessage, LlmRequest, PromptBuilderPort, PromptContext};

const RESPONSE_FORMAT: &str = r#"Respond with a single JSON object and nothing else:
{
  "narrative": "what happens next, in second person, 2-4 short paragraphs",
  "visual_prompt": "one English sentence describing the scene for an illustrator",
  "tags": ["short", "scene", "tags"],
  "updates": {
    "affinity": {"<companion id>": <integer change, usually -3..3>},
    "location": "<location id, only if the player moves>",
    "time_of_day": "<morning|afternoon|evening|night, only if time skips>",
    "set_flags": {"<flag>": true},
    "items_gained": ["<item id>"],
    "items_lost": ["<item id>"]
  }
}
Omit any update that does not apply."#;

/// Relationship label shown to the narrator for an affinity score.
pub fn affinity_tier(affinity: i32) -> &'static str {
    match affinity {
        i32::MIN..=-1 => "Wary",
        0..=24 => "Stranger",
        25..=49 => "Acquaintance",
        50..=74 => "Friend",
        _ => "Close",
    }
}

/// Default [`PromptBuilderPort`]: a structured system prompt, the recent
/// exchanges as alternating user and assistant messages, then the player's
/// input.
#[derive(Debug, Clone)]
pub struct NarrativePromptBuilder {
    temperature: f32,
    max_tokens: Option<u32>,
}

impl Default for NarrativePromptBuilder {
    fn default() -> Self {
        Self {
            temperature: 0.8,
            max_tokens: Some(800),
        }
    }
}

impl NarrativePromptBuilder {
    pub fn new(temperature: f32, max_tokens: Option<u32>) -> Self {
        Self {
            temperature,
            max_tokens,
        }
    }

    fn system_prompt(context: &PromptContext) -> String {
        let mut prompt = String::new();

        prompt.push_str(&format!(
            "You are the narrator of \"{}\", an interactive story.\n",
            context.world_title
        ));
        if !context.world_description.is_empty() {
            prompt.push_str(&format!("{}\n", context.world_description));
        }

        // Scene
        prompt.push_str("\n## Scene\n");
        prompt.push_str(&format!(
            "Turn {}, {}. Location: {} ({}).\n",
            context.state.turn,
            context.state.time_of_day.display_name(),
            context.location.name,
            context.location.id
        ));
        if !context.location.description.is_empty() {
            prompt.push_str(&format!("{}\n", context.location.description));
        }

        if let Some(companion) = &context.companion {
            prompt.push_str("\n## Companion\n");
            prompt.push_str(&format!(
                "{} ({}), relationship: {} ({}).\n",
                companion.name,
                companion.id,
                affinity_tier(companion.affinity),
                companion.affinity
            ));
            if !companion.description.is_empty() {
                prompt.push_str(&format!("{}\n", companion.description));
            }
        }

        if !context.state.inventory.is_empty() {
            let items: Vec<String> = context
                .state
                .inventory
                .iter()
                .map(|(item, count)| format!("{item} x{count}"))
                .collect();
            prompt.push_str(&format!("\nThe player carries: {}.\n", items.join(", ")));
        }

        if !context.quests.is_empty() {
            prompt.push_str("\n## Active quests\n");
            for quest in &context.quests {
                prompt.push_str(&format!(
                    "- {} (stage {}/{}): {}\n",
                    quest.title, quest.stage, quest.total_stages, quest.narrative_prompt
                ));
            }
        }

        // Story framing
        let narrative = &context.narrative;
        if !narrative.arcs.is_empty() {
            prompt.push_str("\n## Story so far\n");
            for arc in &narrative.arcs {
                prompt.push_str(&format!("- {}: {}", arc.title, arc.premise));
                if !arc.themes.is_empty() {
                    prompt.push_str(&format!(" Themes: {}.", arc.themes.join(", ")));
                }
                prompt.push('\n');
            }
        }
        if !narrative.recent_beats.is_empty() {
            prompt.push_str("Recent events:\n");
            for beat in &narrative.recent_beats {
                prompt.push_str(&format!("- {beat}\n"));
            }
        }

        if let Some(directive) = &context.directive {
            prompt.push_str("\n## This turn\n");
            prompt.push_str(&format!("{}\n", directive.description));
            if let Some(tone) = &directive.tone {
                prompt.push_str(&format!("Tone: {tone}.\n"));
            }
            if !directive.required_elements.is_empty() {
                prompt.push_str(&format!(
                    "The narration must mention: {}.\n",
                    directive.required_elements.join(", ")
                ));
            }
        }

        if !narrative.hard_limits.is_empty() {
            prompt.push_str("\n## Rules you must never break\n");
            for limit in &narrative.hard_limits {
                prompt.push_str(&format!("- {limit}\n"));
            }
        }

        prompt.push_str(&format!("\n{RESPONSE_FORMAT}\n"));
        prompt
    }

    fn messages(context: &PromptContext) -> Vec<ChatMessage> {
        let mut messages = Vec::with_capacity(context.history.len() * 2 + 1);
        for exchange in &context.history {
            messages.push(ChatMessage::user(exchange.player.clone()));
            messages.push(ChatMessage::assistant(exchange.narrator.clone()));
        }
        messages.push(ChatMessage::user(context.player_input.clone()));
        messages
    }
}

impl PromptBuilderPort for NarrativePromptBuilder {
    fn build(&self, context: &PromptContext) -> LlmRequest {
        LlmRequest::new(Self::messages(context))
            .with_system_prompt(Self::system_prompt(context))
            .with_temperature(self.temperature)
            .with_max_tokens(self.max_tokens)
            .with_json_mode()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::ports::{
        ArcSummary, BeatDirective, CompanionInfo, LocationInfo, MessageRole, NarrativeContext,
        QuestContext,
    };
    use chrono::Utc;
    use taleweaver_domain::{
        BeatId, CompanionId, Exchange, GameState, LocationId, QuestId, SessionId, WorldKey,
    };

    fn context() -> PromptContext {
        let state = GameState::new(
            SessionId::new(),
            WorldKey::new("moonlit"),
            LocationId::new("library"),
            Utc::now(),
        );
        PromptContext {
            world_title: "Moonlit Academy".into(),
            world_description: "A school above the sea.".into(),
            player_input: "I pull a book from the shelf".into(),
            state: state.summary(),
            location: LocationInfo {
                id: LocationId::new("library"),
                name: "Library".into(),
                description: "Dusty shelves.".into(),
            },
            companion: Some(CompanionInfo {
                id: CompanionId::new("luna"),
                name: "Luna".into(),
                description: String::new(),
                affinity: 55,
            }),
            quests: vec![QuestContext {
                quest_id: QuestId::new("library_secrets"),
                title: "Secrets of the Library".into(),
                stage: 1,
                total_stages: 2,
                narrative_prompt: "Searching the shelves.".into(),
            }],
            narrative: NarrativeContext {
                arcs: vec![ArcSummary {
                    title: "Arrival".into(),
                    premise: "A storm is coming.".into(),
                    themes: vec!["belonging".into()],
                }],
                hard_limits: vec!["No graphic violence.".into()],
                recent_beats: vec!["A bell rang.".into()],
            },
            directive: Some(BeatDirective {
                beat_id: BeatId::new("storm_warning"),
                description: "A storm rolls in.".into(),
                tone: Some("ominous".into()),
                required_elements: vec!["bell".into(), "storm".into()],
                hard_limits: vec!["No graphic violence.".into()],
            }),
            history: Vec::new(),
        }
    }

    #[test]
    fn prompt_carries_every_section() {
        let request = NarrativePromptBuilder::default().build(&context());
        let system = request.system_prompt.as_deref().unwrap();

        assert!(system.contains("Moonlit Academy"));
        assert!(system.contains("Location: Library"));
        assert!(system.contains("relationship: Friend (55)"));
        assert!(system.contains("Secrets of the Library (stage 1/2)"));
        assert!(system.contains("Themes: belonging"));
        assert!(system.contains("Tone: ominous"));
        assert!(system.contains("must mention: bell, storm"));
        assert!(system.contains("- No graphic violence."));
        assert!(request.json_mode);
        assert_eq!(request.last_user_message(), Some("I pull a book from the shelf"));
    }

    #[test]
    fn history_is_replayed_before_the_new_input() {
        let mut ctx = context();
        ctx.history = vec![
            Exchange {
                turn: 1,
                player: "Hello".into(),
                narrator: "Luna waves back.".into(),
            },
            Exchange {
                turn: 2,
                player: "Where is the bell?".into(),
                narrator: "She points at the tower.".into(),
            },
        ];

        let request = NarrativePromptBuilder::default().build(&ctx);

        let roles: Vec<MessageRole> = request.messages.iter().map(|m| m.role).collect();
        assert_eq!(
            roles,
            vec![
                MessageRole::User,
                MessageRole::Assistant,
                MessageRole::User,
                MessageRole::Assistant,
                MessageRole::User,
            ]
        );
        assert_eq!(request.messages[3].content, "She points at the tower.");
        assert_eq!(request.last_user_message(), Some("I pull a book from the shelf"));
    }

    #[test]
    fn building_is_deterministic() {
        let builder = NarrativePromptBuilder::default();
        let ctx = context();
        assert_eq!(builder.build(&ctx), builder.build(&ctx));
    }

    #[test]
    fn quiet_turn_omits_directive() {
        let mut ctx = context();
        ctx.directive = None;
        ctx.companion = None;

        let request = NarrativePromptBuilder::default().build(&ctx);
        let system = request.system_prompt.unwrap();

        assert!(!system.contains("## This turn"));
        assert!(!system.contains("## Companion"));
    }

    #[test]
    fn affinity_tiers() {
        assert_eq!(affinity_tier(-5), "Wary");
        assert_eq!(affinity_tier(0), "Stranger");
        assert_eq!(affinity_tier(25), "Acquaintance");
        assert_eq!(affinity_tier(74), "Friend");
        assert_eq!(affinity_tier(100), "Close");
    }
}
