//! In-memory question bank and preset store.
//!
//! Used by `pollexam simulate` and by tests; state lives as long as the value.

use std::collections::BTreeMap;
use std::sync::Mutex;

use async_trait::async_trait;

use crate::model::{GroupId, Preset, Question};
use crate::session::lock;
use crate::traits::{PresetStore, QuestionBank};

#[derive(Default)]
pub struct InMemoryQuestionBank {
    questions: Mutex<Vec<Question>>,
}

impl InMemoryQuestionBank {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_questions(questions: Vec<Question>) -> Self {
        Self {
            questions: Mutex::new(questions),
        }
    }
}

#[async_trait]
impl QuestionBank for InMemoryQuestionBank {
    async fn snapshot(&self) -> anyhow::Result<Vec<Question>> {
        Ok(lock(&self.questions).clone())
    }

    async fn import(&self, questions: Vec<Question>) -> anyhow::Result<usize> {
        let mut bank = lock(&self.questions);
        bank.extend(questions);
        Ok(bank.len())
    }

    async fn clear(&self) -> anyhow::Result<()> {
        lock(&self.questions).clear();
        Ok(())
    }

    async fn len(&self) -> anyhow::Result<usize> {
        Ok(lock(&self.questions).len())
    }
}

#[derive(Default)]
pub struct InMemoryPresetStore {
    presets: Mutex<BTreeMap<GroupId, Preset>>,
}

impl InMemoryPresetStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl PresetStore for InMemoryPresetStore {
    async fn get(&self, group: GroupId) -> anyhow::Result<Preset> {
        Ok(lock(&self.presets).get(&group).cloned().unwrap_or_default())
    }

    async fn save(&self, group: GroupId, preset: &Preset) -> anyhow::Result<()> {
        lock(&self.presets).insert(group, preset.clone());
        Ok(())
    }

    async fn list(&self) -> anyhow::Result<Vec<(GroupId, Preset)>> {
        Ok(lock(&self.presets)
            .iter()
            .map(|(group, preset)| (*group, preset.clone()))
            .collect())
    }
}
