use crate::llm::{HistoryEntry, Speaker};
use serde::{Deserialize, Serialize};

/// Who authored a turn.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum Role {
    #[serde(rename = "user")]
    User,
    #[serde(rename = "assistant")]
    Assistant,
}

impl From<Role> for Speaker {
    fn from(role: Role) -> Self {
        match role {
            Role::User => Speaker::User,
            Role::Assistant => Speaker::Model,
        }
    }
}

/// One role-tagged message.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Turn {
    pub role: Role,
    pub content: String,
}

impl Turn {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// Append-only, chronologically ordered turns of one session.
///
/// Roles are not required to alternate: a failed reply leaves the user turn
/// without an answer.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConversationLog {
    turns: Vec<Turn>,
}

impl ConversationLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn turns(&self) -> &[Turn] {
        &self.turns
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    pub(crate) fn push(&mut self, turn: Turn) {
        self.turns.push(turn);
    }

    /// Every turn except the newest, in the provider's vocabulary.
    ///
    /// The newest turn is the message being sent, so it travels separately.
    pub fn project_history_excluding_last(&self) -> Vec<HistoryEntry> {
        let Some((_, earlier)) = self.turns.split_last() else {
            return Vec::new();
        };

        earlier
            .iter()
            .map(|turn| HistoryEntry::new(turn.role.into(), turn.content.clone()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn projection_of_empty_log_is_empty() {
        assert!(ConversationLog::new()
            .project_history_excluding_last()
            .is_empty());
    }

    #[test]
    fn projection_maps_assistant_to_model() {
        let mut log = ConversationLog::new();
        log.push(Turn::user("A"));
        log.push(Turn::assistant("B"));
        log.push(Turn::user("C"));

        assert_eq!(
            log.project_history_excluding_last(),
            vec![
                HistoryEntry::new(Speaker::User, "A"),
                HistoryEntry::new(Speaker::Model, "B"),
            ]
        );
    }

    #[test]
    fn consecutive_user_turns_are_kept() {
        let mut log = ConversationLog::new();
        log.push(Turn::user("first"));
        log.push(Turn::user("second"));
        log.push(Turn::user("third"));

        let history = log.project_history_excluding_last();
        assert_eq!(history.len(), 2);
        assert!(history.iter().all(|e| e.speaker == Speaker::User));
    }

    fn arb_turn() -> impl Strategy<Value = Turn> {
        (any::<bool>(), ".{0,12}").prop_map(|(is_user, content)| {
            if is_user {
                Turn::user(content)
            } else {
                Turn::assistant(content)
            }
        })
    }

    proptest! {
        #[test]
        fn earlier_log_is_prefix_of_later_log(turns in prop::collection::vec(arb_turn(), 0..40)) {
            let mut log = ConversationLog::new();
            let mut snapshots = vec![log.clone()];
            for turn in turns {
                log.push(turn);
                snapshots.push(log.clone());
            }

            for (i, earlier) in snapshots.iter().enumerate() {
                for later in &snapshots[i..] {
                    prop_assert_eq!(earlier.turns(), &later.turns()[..earlier.len()]);
                }
            }
        }

        #[test]
        fn projection_drops_exactly_the_newest_turn(turns in prop::collection::vec(arb_turn(), 1..40)) {
            let mut log = ConversationLog::new();
            for turn in &turns {
                log.push(turn.clone());
            }

            let history = log.project_history_excluding_last();
            prop_assert_eq!(history.len(), turns.len() - 1);

            for (entry, turn) in history.iter().zip(&turns) {
                let expected = match turn.role {
                    Role::User => Speaker::User,
                    Role::Assistant => Speaker::Model,
                };
                prop_assert_eq!(entry.speaker, expected);
                prop_assert_eq!(&entry.payload, &vec![turn.content.clone()]);
            }
        }
    }
}
