use crate::message::Message;

/// Ordered conversation history. Append-only while a run is in flight; the
/// owning scheduler clears it between runs.
#[derive(Default, Clone, Debug)]
pub struct Transcript {
    messages: Vec<Message>,
}

impl Transcript {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_messages(messages: Vec<Message>) -> Self {
        Self { messages }
    }

    pub fn push(&mut self, message: Message) {
        self.messages.push(message);
    }

    pub fn last(&self) -> Option<&Message> {
        self.messages.last()
    }

    pub fn iter(&self) -> impl DoubleEndedIterator<Item = &Message> + '_ {
        self.messages.iter()
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn clear(&mut self) {
        self.messages.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn push_preserves_order() {
        let mut transcript = Transcript::new();
        transcript.push(Message::user("first"));
        transcript.push(Message::assistant("bot", "second"));

        let contents: Vec<&str> = transcript.iter().map(|m| m.content.as_str()).collect();
        assert_eq!(contents, vec!["first", "second"]);
        assert_eq!(transcript.last().unwrap().content, "second");
    }

    #[test]
    fn clear_resets_history() {
        let mut transcript = Transcript::with_messages(vec![Message::user("task")]);
        assert_eq!(transcript.len(), 1);
        transcript.clear();
        assert!(transcript.is_empty());
    }
}
