//! The "Orbit" chat transcript.

use crate::context::ContextSelector;
use crate::error::{MindOrbitError, Result};
use crate::llm::{answer_or_apology, KnowledgeModel};
use crate::models::{ChatMessage, ChatRole, KnowledgeItem};

/// Greeting shown as the first model turn of a session.
pub fn welcome_message(item_count: usize) -> String {
    format!(
        "Hello! I'm Orbit. I can answer questions based on the {} knowledge nodes you've created. What would you like to know?",
        item_count
    )
}

/// Chat transcript for one session.
pub struct ChatSession {
    selector: ContextSelector,
    messages: Vec<ChatMessage>,
}

impl ChatSession {
    /// Start a session greeting the user with the current item count.
    pub fn new(selector: ContextSelector, item_count: usize) -> Self {
        Self {
            selector,
            messages: vec![ChatMessage::new(ChatRole::Model, welcome_message(item_count))],
        }
    }

    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    /// Recount the greeting while it is still the only turn.
    pub fn refresh_welcome(&mut self, item_count: usize) {
        if let [welcome] = self.messages.as_mut_slice() {
            welcome.text = welcome_message(item_count);
        }
    }

    pub fn selector(&self) -> &ContextSelector {
        &self.selector
    }

    /// Ask a question against `items`.
    ///
    /// Appends the user turn, then exactly one model turn (an answer or a
    /// fixed fallback message). A blank question appends nothing.
    pub async fn ask(
        &mut self,
        model: &dyn KnowledgeModel,
        question: &str,
        items: &[KnowledgeItem],
    ) -> Result<&ChatMessage> {
        let question = question.trim();
        if question.is_empty() {
            return Err(MindOrbitError::InvalidInput("Question cannot be empty".to_string()));
        }

        self.messages.push(ChatMessage::new(ChatRole::User, question));

        let context = self.selector.select(question, items);
        log::info!("Answering with {} context items via {}", context.len(), model.name());
        let answer = answer_or_apology(model, question, &context).await;

        self.messages.push(ChatMessage::new(ChatRole::Model, answer));
        Ok(&self.messages[self.messages.len() - 1])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::MatchPolicy;
    use crate::llm::mock::MockModel;
    use crate::llm::APOLOGY;
    use crate::models::ItemType;

    fn items(n: usize) -> Vec<KnowledgeItem> {
        (0..n)
            .map(|i| KnowledgeItem {
                id: format!("k{}", i),
                item_type: ItemType::Text,
                content: format!("content {}", i),
                title: format!("Note {}", i),
                summary: "Summary".to_string(),
                tags: vec!["note".to_string()],
                category: "Art".to_string(),
                created_at: i as i64,
            })
            .collect()
    }

    #[test]
    fn test_welcome_message_counts_items() {
        let session = ChatSession::new(ContextSelector::default(), 4);
        assert_eq!(session.messages().len(), 1);
        assert_eq!(session.messages()[0].role, ChatRole::Model);
        assert!(session.messages()[0].text.contains("based on the 4 knowledge nodes"));
    }

    #[tokio::test]
    async fn test_refresh_welcome_only_before_first_question() {
        let model = MockModel::ok();
        let mut session = ChatSession::new(ContextSelector::default(), 0);

        session.refresh_welcome(3);
        assert!(session.messages()[0].text.contains("based on the 3 knowledge nodes"));

        session.ask(&model, "What is art?", &items(3)).await.unwrap();
        session.refresh_welcome(9);
        assert!(session.messages()[0].text.contains("based on the 3 knowledge nodes"));
        assert_eq!(session.messages().len(), 3);
    }

    #[tokio::test]
    async fn test_ask_appends_user_then_model_turn() {
        let model = MockModel::ok();
        let mut session = ChatSession::new(ContextSelector::default(), 2);

        let reply = session.ask(&model, "  What is art?  ", &items(2)).await.unwrap();
        assert_eq!(reply.role, ChatRole::Model);
        assert_eq!(reply.text, "Mock answer");

        let messages = session.messages();
        assert_eq!(messages.len(), 3);
        assert_eq!(messages[1].role, ChatRole::User);
        assert_eq!(messages[1].text, "What is art?");
    }

    #[tokio::test]
    async fn test_ask_limits_context() {
        let model = MockModel::ok();
        let mut session = ChatSession::new(ContextSelector::default(), 20);
        session.ask(&model, "anything", &items(20)).await.unwrap();

        let calls = model.calls.lock().unwrap();
        assert_eq!(calls.len(), 1);
        let expected: Vec<String> = (0..15).map(|i| format!("k{}", i)).collect();
        assert_eq!(calls[0].1, expected);
    }

    #[tokio::test]
    async fn test_ask_with_keyword_policy_and_no_match() {
        let model = MockModel::ok();
        let mut session = ChatSession::new(ContextSelector::new(MatchPolicy::Keyword, 15), 3);
        session.ask(&model, "quantum physics", &items(3)).await.unwrap();

        let calls = model.calls.lock().unwrap();
        assert!(calls[0].1.is_empty());
    }

    #[tokio::test]
    async fn test_failed_answer_becomes_apology() {
        let model = MockModel::failing();
        let mut session = ChatSession::new(ContextSelector::default(), 1);
        session.ask(&model, "Why?", &items(1)).await.unwrap();

        let last = session.messages().last().unwrap();
        assert_eq!(last.role, ChatRole::Model);
        assert_eq!(last.text, APOLOGY);
        assert_eq!(session.messages().len(), 3);
    }

    #[tokio::test]
    async fn test_blank_question_appends_nothing() {
        let model = MockModel::ok();
        let mut session = ChatSession::new(ContextSelector::default(), 0);

        let err = session.ask(&model, "   ", &[]).await.unwrap_err();
        assert!(matches!(err, MindOrbitError::InvalidInput(_)));
        assert_eq!(session.messages().len(), 1);
        assert!(model.calls.lock().unwrap().is_empty());
    }
}
