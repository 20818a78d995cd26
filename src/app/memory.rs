use crate::agents::{ChatMessage, MessageRole};

const RETRIEVED_MARKER: &str = "Retrieved Data:";
const QUESTION_MARKER: &str = "\nUser Question:";
const RECIPE_WORD: &str = "وصفة";
const INGREDIENTS_WORD: &str = "المكونات";
const METHOD_WORD: &str = "طريقة";

/// Bounded user/assistant history for one session.
///
/// When the cap is exceeded, turns carrying a full recipe are evicted
/// first (oldest first), then plain turns (oldest first). Recipes are long
/// and can be fetched again, while plain turns hold the thread of the chat.
#[derive(Debug, Clone)]
pub struct ConversationMemory {
    turns: Vec<ChatMessage>,
    capacity: usize,
}

impl ConversationMemory {
    pub fn new(capacity: usize) -> Self {
        Self {
            turns: Vec::new(),
            capacity,
        }
    }

    pub fn turns(&self) -> &[ChatMessage] {
        &self.turns
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    pub fn clear(&mut self) {
        self.turns.clear();
    }

    /// Appends one completed exchange, then trims to capacity
    pub fn push_exchange(&mut self, user: impl Into<String>, assistant: impl Into<String>) {
        self.turns.push(ChatMessage::user(user));
        self.turns.push(ChatMessage::assistant(assistant));
        self.trim();
    }

    pub fn last_assistant(&self) -> Option<&str> {
        self.turns
            .iter()
            .rev()
            .find(|turn| turn.role == MessageRole::Assistant)
            .map(|turn| turn.content.as_str())
    }

    /// Last `exchanges` exchanges as `User: …` / `Bot: …` lines
    pub fn context_string(&self, exchanges: usize) -> String {
        let keep = exchanges.saturating_mul(2);
        let skip = self.turns.len().saturating_sub(keep);
        self.turns
            .iter()
            .skip(skip)
            .filter_map(|turn| match turn.role {
                MessageRole::User => Some(format!("User: {}", turn.content)),
                MessageRole::Assistant => Some(format!("Bot: {}", turn.content)),
                MessageRole::System => None,
            })
            .collect::<Vec<_>>()
            .join("\n")
    }

    fn trim(&mut self) {
        let excess = self.turns.len().saturating_sub(self.capacity);
        if excess == 0 {
            return;
        }

        let mut evict = vec![false; self.turns.len()];
        let recipe_positions = self
            .turns
            .iter()
            .enumerate()
            .filter(|(_, turn)| is_recipe_turn(turn))
            .map(|(index, _)| index);
        let plain_positions = self
            .turns
            .iter()
            .enumerate()
            .filter(|(_, turn)| !is_recipe_turn(turn))
            .map(|(index, _)| index);

        for index in recipe_positions.chain(plain_positions).take(excess) {
            if let Some(flag) = evict.get_mut(index) {
                *flag = true;
            }
        }

        let mut flags = evict.into_iter();
        self.turns.retain(|_| !flags.next().unwrap_or(false));
    }
}

/// A user turn whose retrieved data holds a recipe, or an assistant turn
/// that printed ingredients and method
pub fn is_recipe_turn(turn: &ChatMessage) -> bool {
    match turn.role {
        MessageRole::User => turn
            .content
            .strip_prefix(RETRIEVED_MARKER)
            .is_some_and(|rest| {
                let data = rest.split_once(QUESTION_MARKER).map_or(rest, |(data, _)| data);
                data.contains(RECIPE_WORD)
            }),
        MessageRole::Assistant => {
            turn.content.contains(INGREDIENTS_WORD) && turn.content.contains(METHOD_WORD)
        }
        MessageRole::System => false,
    }
}
