//! JSON file backed question bank and preset store.
//!
//! Each store owns one file and rewrites it whole on every change, via a
//! temporary file and a rename. A missing file reads as empty.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::sync::Mutex;

use pollexam_core::model::{GroupId, Preset, Question};
use pollexam_core::traits::{PresetStore, QuestionBank};

pub const QUESTIONS_FILE: &str = "questions.json";
pub const PRESETS_FILE: &str = "presets.json";

async fn load_json<T: DeserializeOwned + Default>(path: &Path) -> Result<T> {
    match tokio::fs::read_to_string(path).await {
        Ok(content) if content.trim().is_empty() => Ok(T::default()),
        Ok(content) => serde_json::from_str(&content)
            .with_context(|| format!("failed to parse {}", path.display())),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(T::default()),
        Err(e) => Err(e).with_context(|| format!("failed to read {}", path.display())),
    }
}

async fn save_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(value).context("failed to serialize store")?;
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent)
            .await
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }
    let tmp = path.with_extension("json.tmp");
    tokio::fs::write(&tmp, json)
        .await
        .with_context(|| format!("failed to write {}", tmp.display()))?;
    tokio::fs::rename(&tmp, path)
        .await
        .with_context(|| format!("failed to replace {}", path.display()))?;
    Ok(())
}

/// Question bank stored as a JSON array.
pub struct JsonFileQuestionBank {
    path: PathBuf,
    lock: Mutex<()>,
}

impl JsonFileQuestionBank {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    /// `questions.json` inside `data_dir`.
    pub fn in_dir(data_dir: &Path) -> Self {
        Self::new(data_dir.join(QUESTIONS_FILE))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl QuestionBank for JsonFileQuestionBank {
    async fn snapshot(&self) -> Result<Vec<Question>> {
        let _guard = self.lock.lock().await;
        load_json(&self.path).await
    }

    async fn import(&self, questions: Vec<Question>) -> Result<usize> {
        let _guard = self.lock.lock().await;
        let mut bank: Vec<Question> = load_json(&self.path).await?;
        bank.extend(questions);
        save_json(&self.path, &bank).await?;
        Ok(bank.len())
    }

    async fn clear(&self) -> Result<()> {
        let _guard = self.lock.lock().await;
        save_json(&self.path, &Vec::<Question>::new()).await
    }

    async fn len(&self) -> Result<usize> {
        let _guard = self.lock.lock().await;
        Ok(load_json::<Vec<Question>>(&self.path).await?.len())
    }
}

/// Presets stored as a JSON object keyed by group id.
pub struct JsonFilePresetStore {
    path: PathBuf,
    lock: Mutex<()>,
}

impl JsonFilePresetStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    /// `presets.json` inside `data_dir`.
    pub fn in_dir(data_dir: &Path) -> Self {
        Self::new(data_dir.join(PRESETS_FILE))
    }
}

#[async_trait]
impl PresetStore for JsonFilePresetStore {
    async fn get(&self, group: GroupId) -> Result<Preset> {
        let _guard = self.lock.lock().await;
        let presets: BTreeMap<GroupId, Preset> = load_json(&self.path).await?;
        Ok(presets.get(&group).cloned().unwrap_or_default())
    }

    async fn save(&self, group: GroupId, preset: &Preset) -> Result<()> {
        let _guard = self.lock.lock().await;
        let mut presets: BTreeMap<GroupId, Preset> = load_json(&self.path).await?;
        presets.insert(group, preset.clone());
        save_json(&self.path, &presets).await
    }

    async fn list(&self) -> Result<Vec<(GroupId, Preset)>> {
        let _guard = self.lock.lock().await;
        let presets: BTreeMap<GroupId, Preset> = load_json(&self.path).await?;
        Ok(presets.into_iter().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn q(text: &str) -> Question {
        Question::new(text, vec!["a".into(), "b".into()], 1).unwrap()
    }

    #[tokio::test]
    async fn bank_round_trip_on_disk() {
        let dir = tempfile::tempdir().unwrap();
        let bank = JsonFileQuestionBank::in_dir(&dir.path().join("data"));

        assert_eq!(bank.len().await.unwrap(), 0);
        assert_eq!(bank.import(vec![q("one"), q("two")]).await.unwrap(), 2);
        assert_eq!(bank.import(vec![q("three")]).await.unwrap(), 3);

        let reopened = JsonFileQuestionBank::in_dir(&dir.path().join("data"));
        let questions = reopened.snapshot().await.unwrap();
        assert_eq!(questions.len(), 3);
        assert_eq!(questions[2].text, "three");

        reopened.clear().await.unwrap();
        assert_eq!(bank.len().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn presets_keyed_by_group() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFilePresetStore::in_dir(dir.path());

        assert_eq!(store.get(-100).await.unwrap(), Preset::default());

        let mut preset = Preset::default();
        preset.set_name("Chemistry").unwrap();
        preset.mark_ready().unwrap();
        store.save(-100, &preset).await.unwrap();
        store.save(-200, &Preset::default()).await.unwrap();

        let reopened = JsonFilePresetStore::in_dir(dir.path());
        let loaded = reopened.get(-100).await.unwrap();
        assert!(loaded.ready);
        assert_eq!(loaded.exam_name, "Chemistry");
        let groups: Vec<GroupId> = reopened
            .list()
            .await
            .unwrap()
            .into_iter()
            .map(|(g, _)| g)
            .collect();
        assert_eq!(groups, vec![-200, -100]);
    }

    #[tokio::test]
    async fn corrupt_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(QUESTIONS_FILE);
        std::fs::write(&path, "{ not json").unwrap();
        let bank = JsonFileQuestionBank::new(&path);
        let err = bank.snapshot().await.unwrap_err();
        assert!(err.to_string().contains("failed to parse"));
    }
}
