use aistudy_core::llm::{Message, Role};

/// Conversation so far, including the reply currently being streamed.
#[derive(Debug, Default)]
pub struct Transcript {
    messages: Vec<Message>,
    replying: bool,
}

impl Transcript {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_user<S: Into<String>>(&mut self, text: S) {
        self.messages.push(Message::user(text));
    }

    pub fn push_assistant<S: Into<String>>(&mut self, text: S) {
        self.messages.push(Message::assistant(text));
    }

    /// Snapshot to send with the next request.
    pub fn history(&self) -> Vec<Message> {
        self.messages.clone()
    }

    pub fn begin_reply(&mut self) {
        self.messages.push(Message::assistant(String::new()));
        self.replying = true;
    }

    pub fn append_reply(&mut self, fragment: &str) {
        if !self.replying {
            return;
        }
        if let Some(m) = self.messages.last_mut() {
            m.content.push_str(fragment);
        }
    }

    /// Closes the current reply. Partial text is kept; a reply that never got any text is removed.
    pub fn finish_reply(&mut self) {
        if !self.replying {
            return;
        }
        self.replying = false;
        if self.messages.last().is_some_and(Message::is_placeholder) {
            self.messages.pop();
        }
    }

    /// Drops a trailing user turn that never got a reply.
    pub fn discard_unanswered(&mut self) {
        if self.messages.last().is_some_and(|m| m.role == Role::User) {
            self.messages.pop();
        }
    }

    pub fn clear(&mut self) {
        self.messages.clear();
        self.replying = false;
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fragments_accumulate_into_the_reply() {
        let mut t = Transcript::new();
        t.push_user("hi");
        t.begin_reply();
        t.append_reply("Hel");
        t.append_reply("lo");
        t.finish_reply();
        assert_eq!(t.history(), vec![Message::user("hi"), Message::assistant("Hello")]);
    }

    #[test]
    fn empty_reply_is_dropped() {
        let mut t = Transcript::new();
        t.push_user("hi");
        t.begin_reply();
        t.finish_reply();
        assert_eq!(t.len(), 1);
    }

    #[test]
    fn failed_single_shot_leaves_no_dangling_user_turn() {
        let mut t = Transcript::new();
        t.push_user("hi");
        t.push_assistant("hello");
        t.push_user("again");
        t.discard_unanswered();
        t.push_user("retry");
        assert_eq!(
            t.history(),
            vec![Message::user("hi"), Message::assistant("hello"), Message::user("retry")]
        );
        t.discard_unanswered();
        t.discard_unanswered();
        assert_eq!(t.history().last(), Some(&Message::assistant("hello")));
    }

    #[test]
    fn fragments_after_finish_are_ignored() {
        let mut t = Transcript::new();
        t.push_user("hi");
        t.begin_reply();
        t.append_reply("ok");
        t.finish_reply();
        t.append_reply(" late");
        assert_eq!(t.history().last(), Some(&Message::assistant("ok")));
    }
}
