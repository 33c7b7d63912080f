//! In-process model used by tests.

use std::sync::Mutex;

use async_trait::async_trait;

use super::KnowledgeModel;
use crate::error::{MindOrbitError, Result};
use crate::models::{Analysis, ItemType, KnowledgeItem};

enum Behavior {
    Succeed,
    Fail,
    MissingKey,
}

pub(crate) struct MockModel {
    behavior: Behavior,
    analysis: Analysis,
    answer: String,
    /// (question, context ids) per answer call.
    pub calls: Mutex<Vec<(String, Vec<String>)>>,
    /// Content passed to each analyze call.
    pub analyzed: Mutex<Vec<String>>,
}

impl MockModel {
    fn build(behavior: Behavior) -> Self {
        Self {
            behavior,
            analysis: Analysis {
                title: "Mock Title".to_string(),
                summary: "Mock summary.".to_string(),
                tags: vec!["mock".to_string()],
                category: "Science".to_string(),
            },
            answer: "Mock answer".to_string(),
            calls: Mutex::new(Vec::new()),
            analyzed: Mutex::new(Vec::new()),
        }
    }

    pub fn ok() -> Self {
        Self::build(Behavior::Succeed)
    }

    pub fn failing() -> Self {
        Self::build(Behavior::Fail)
    }

    pub fn missing_key() -> Self {
        Self::build(Behavior::MissingKey)
    }

    pub fn with_analysis(analysis: Analysis) -> Self {
        Self {
            analysis,
            ..Self::ok()
        }
    }

    pub fn with_answer(answer: &str) -> Self {
        Self {
            answer: answer.to_string(),
            ..Self::ok()
        }
    }

    fn check(&self) -> Result<()> {
        match self.behavior {
            Behavior::Succeed => Ok(()),
            Behavior::Fail => Err(MindOrbitError::Model("mock failure".to_string())),
            Behavior::MissingKey => Err(MindOrbitError::MissingCredential("MOCK_API_KEY".to_string())),
        }
    }
}

#[async_trait]
impl KnowledgeModel for MockModel {
    fn name(&self) -> &'static str {
        "mock"
    }

    async fn analyze_content(&self, content: &str, _item_type: ItemType) -> Result<Analysis> {
        self.analyzed.lock().unwrap().push(content.to_string());
        self.check()?;
        Ok(self.analysis.clone())
    }

    async fn answer_question(&self, question: &str, context: &[&KnowledgeItem]) -> Result<String> {
        self.calls.lock().unwrap().push((
            question.to_string(),
            context.iter().map(|i| i.id.clone()).collect(),
        ));
        self.check()?;
        Ok(self.answer.clone())
    }
}
