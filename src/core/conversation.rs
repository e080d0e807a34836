use crate::core::message::Turn;

/// Ordered, append-only log of completed turns for one session.
#[derive(Debug, Default, Clone)]
pub struct Conversation {
    turns: Vec<Turn>,
}

impl Conversation {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append(&mut self, turn: Turn) {
        self.turns.push(turn);
    }

    /// Appends a completed exchange: the user turn, then the model turn.
    pub fn append_exchange(&mut self, user: Turn, model: Turn) {
        self.turns.reserve(2);
        self.turns.push(user);
        self.turns.push(model);
    }

    pub fn snapshot(&self) -> &[Turn] {
        &self.turns
    }

    pub fn last(&self) -> Option<&Turn> {
        self.turns.last()
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::message::{Part, Role};

    #[test]
    fn append_preserves_order() {
        let mut conversation = Conversation::new();
        assert!(conversation.is_empty());

        conversation.append(Turn::user(vec![Part::text("one")]));
        conversation.append_exchange(
            Turn::user(vec![Part::text("two")]),
            Turn::model_text("three"),
        );

        let roles: Vec<Role> = conversation.snapshot().iter().map(|t| t.role).collect();
        assert_eq!(roles, vec![Role::User, Role::User, Role::Model]);
        assert_eq!(conversation.len(), 3);
        assert_eq!(conversation.last().map(Turn::text), Some("three".to_string()));
    }
}
