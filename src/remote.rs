//! Remote store tier: the authoritative copy of a signed-in user's data.
//!
//! The hosted backend is reached through [`RemoteStore`]. [`DirectoryRemoteStore`]
//! implements it over a directory of per-user JSON documents so the CLI works
//! without a network service.

use std::fs;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::export::ExportFormat;
use crate::models::{AppState, Flashcard, JsonMap, Quiz, QuizDeck, StreakRecord};
use crate::reconcile::ImportMode;
use crate::storage::file_stem;

/// Rows sent by a bulk import. Quizzes travel grouped by deck.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteBatch {
    pub flashcards: Vec<Flashcard>,
    pub quiz_decks: Vec<QuizDeck>,
}

/// Outcome of a bulk import. Any entry in `errors` means nothing was written.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteImportReport {
    pub flashcards_imported: usize,
    pub quizzes_imported: usize,
    pub errors: Vec<String>,
}

/// Non-collection user data.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserMetadata {
    pub settings: JsonMap,
    pub stats: JsonMap,
    pub streak_data: StreakRecord,
    pub user_profile: JsonMap,
}

impl UserMetadata {
    pub fn from_state(state: &AppState) -> Self {
        Self {
            settings: state.settings.clone(),
            stats: state.stats.clone(),
            streak_data: state.streak_data.clone(),
            user_profile: state.user_profile.clone(),
        }
    }
}

/// A serialized export kept remotely.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BackupRecord {
    pub user_id: String,
    pub format: ExportFormat,
    pub file_name: String,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

/// Row-level storage owned by the backend.
#[allow(async_fn_in_trait)]
pub trait RemoteStore {
    async fn is_reachable(&self) -> bool;

    async fn bulk_import(&self, user_id: &str, batch: &RemoteBatch, mode: ImportMode) -> Result<RemoteImportReport>;

    async fn save_user_metadata(&self, user_id: &str, metadata: &UserMetadata) -> Result<()>;

    async fn delete_all_user_data(&self, user_id: &str) -> Result<()>;

    async fn save_backup(&self, record: &BackupRecord) -> Result<()>;

    /// Everything stored for the user, quizzes flattened back out of decks.
    async fn fetch_user_data(&self, user_id: &str) -> Result<Option<AppState>>;
}

impl<T: RemoteStore + ?Sized> RemoteStore for Arc<T> {
    async fn is_reachable(&self) -> bool {
        (**self).is_reachable().await
    }

    async fn bulk_import(&self, user_id: &str, batch: &RemoteBatch, mode: ImportMode) -> Result<RemoteImportReport> {
        (**self).bulk_import(user_id, batch, mode).await
    }

    async fn save_user_metadata(&self, user_id: &str, metadata: &UserMetadata) -> Result<()> {
        (**self).save_user_metadata(user_id, metadata).await
    }

    async fn delete_all_user_data(&self, user_id: &str) -> Result<()> {
        (**self).delete_all_user_data(user_id).await
    }

    async fn save_backup(&self, record: &BackupRecord) -> Result<()> {
        (**self).save_backup(record).await
    }

    async fn fetch_user_data(&self, user_id: &str) -> Result<Option<AppState>> {
        (**self).fetch_user_data(user_id).await
    }
}

/// Flatten grouped decks back into quiz records. Lossy: ids, difficulty and
/// creation time are not kept in the grouped form.
pub fn flatten_quiz_decks(decks: &[QuizDeck]) -> Vec<Quiz> {
    decks
        .iter()
        .flat_map(|deck| {
            deck.questions.iter().map(|q| {
                let wrong = q.options.iter().filter(|o| **o != q.correct).cloned().collect();
                Quiz::new(deck.title.clone(), q.question.clone(), q.correct.clone(), wrong)
            })
        })
        .collect()
}

// ══════════════════════════════════════════════════════════════════════════
// Directory-backed store
// ══════════════════════════════════════════════════════════════════════════

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct UserDocument {
    flashcards: Vec<Flashcard>,
    quiz_decks: Vec<QuizDeck>,
    #[serde(flatten)]
    metadata: UserMetadata,
    updated_at: Option<DateTime<Utc>>,
}

/// Remote store kept in a local directory: `users/<id>.json` plus `backups/`.
pub struct DirectoryRemoteStore {
    root: PathBuf,
}

impl DirectoryRemoteStore {
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }

    /// Get default store location.
    pub fn default_path() -> PathBuf {
        dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("quizwhiz")
            .join("remote")
    }

    fn user_path(&self, user_id: &str) -> PathBuf {
        self.root.join("users").join(format!("{}.json", file_stem(user_id)))
    }

    fn load_document(&self, user_id: &str) -> Result<Option<UserDocument>> {
        let path = self.user_path(user_id);
        if !path.exists() {
            return Ok(None);
        }
        let json = fs::read_to_string(&path)
            .with_context(|| format!("Failed to read user document: {:?}", path))?;
        let doc = serde_json::from_str(&json)
            .with_context(|| format!("Failed to parse user document: {:?}", path))?;
        Ok(Some(doc))
    }

    fn save_document(&self, user_id: &str, doc: &mut UserDocument) -> Result<()> {
        let path = self.user_path(user_id);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create directory: {:?}", parent))?;
        }
        doc.updated_at = Some(Utc::now());
        let json = serde_json::to_string_pretty(doc)?;
        fs::write(&path, json).with_context(|| format!("Failed to write user document: {:?}", path))?;
        Ok(())
    }
}

impl RemoteStore for DirectoryRemoteStore {
    async fn is_reachable(&self) -> bool {
        fs::create_dir_all(self.root.join("users")).is_ok()
    }

    async fn bulk_import(&self, user_id: &str, batch: &RemoteBatch, mode: ImportMode) -> Result<RemoteImportReport> {
        let errors = validate_batch(batch);
        if !errors.is_empty() {
            return Ok(RemoteImportReport {
                errors,
                ..Default::default()
            });
        }

        let mut doc = self.load_document(user_id)?.unwrap_or_default();
        match mode {
            ImportMode::Replace => {
                doc.flashcards = batch.flashcards.clone();
                doc.quiz_decks = batch.quiz_decks.clone();
            }
            ImportMode::Merge => {
                doc.flashcards.extend(batch.flashcards.iter().cloned());
                for deck in &batch.quiz_decks {
                    match doc.quiz_decks.iter_mut().find(|d| d.title == deck.title) {
                        Some(existing) => existing.questions.extend(deck.questions.iter().cloned()),
                        None => doc.quiz_decks.push(deck.clone()),
                    }
                }
            }
        }
        self.save_document(user_id, &mut doc)?;

        Ok(RemoteImportReport {
            flashcards_imported: batch.flashcards.len(),
            quizzes_imported: batch.quiz_decks.iter().map(|d| d.questions.len()).sum(),
            errors: Vec::new(),
        })
    }

    async fn save_user_metadata(&self, user_id: &str, metadata: &UserMetadata) -> Result<()> {
        let mut doc = self.load_document(user_id)?.unwrap_or_default();
        doc.metadata = metadata.clone();
        self.save_document(user_id, &mut doc)
    }

    async fn delete_all_user_data(&self, user_id: &str) -> Result<()> {
        let path = self.user_path(user_id);
        if path.exists() {
            fs::remove_file(&path).with_context(|| format!("Failed to delete user document: {:?}", path))?;
        }
        Ok(())
    }

    async fn save_backup(&self, record: &BackupRecord) -> Result<()> {
        let dir = self.root.join("backups").join(file_stem(&record.user_id));
        fs::create_dir_all(&dir).with_context(|| format!("Failed to create backup directory: {:?}", dir))?;
        let path = dir.join(format!(
            "{}_{}",
            record.created_at.format("%Y%m%d_%H%M%S"),
            sanitize(&record.file_name)
        ));
        fs::write(&path, &record.content).with_context(|| format!("Failed to write backup: {:?}", path))?;
        Ok(())
    }

    async fn fetch_user_data(&self, user_id: &str) -> Result<Option<AppState>> {
        Ok(self.load_document(user_id)?.map(|doc| AppState {
            quizzes: flatten_quiz_decks(&doc.quiz_decks),
            flashcards: doc.flashcards,
            settings: doc.metadata.settings,
            stats: doc.metadata.stats,
            streak_data: doc.metadata.streak_data,
            user_profile: doc.metadata.user_profile,
        }))
    }
}

/// Per-record checks; the whole batch is refused if any fail.
fn validate_batch(batch: &RemoteBatch) -> Vec<String> {
    let mut errors = Vec::new();
    for card in &batch.flashcards {
        if card.question.trim().is_empty() || card.answer.trim().is_empty() {
            errors.push(format!("flashcard {}: question and answer are required", card.id));
        }
    }
    for deck in &batch.quiz_decks {
        for (i, q) in deck.questions.iter().enumerate() {
            if q.question.trim().is_empty() || q.correct.trim().is_empty() {
                errors.push(format!(
                    "quiz deck {:?} question {}: question and correct answer are required",
                    deck.title,
                    i + 1
                ));
            }
        }
    }
    errors
}

fn sanitize(name: &str) -> String {
    name.chars()
        .map(|c| if c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.') { c } else { '_' })
        .collect::<String>()
        .trim_start_matches('.')
        .to_string()
}

#[cfg(test)]
pub(crate) mod mock {
    //! In-memory remote store for tests.

    use std::collections::HashMap;
    use std::sync::Mutex;

    use super::*;

    #[derive(Default)]
    pub struct MockRemote {
        pub reachable: Mutex<bool>,
        pub fail_with: Mutex<Vec<String>>,
        pub fail_metadata: Mutex<bool>,
        pub users: Mutex<HashMap<String, AppState>>,
        pub imports: Mutex<Vec<(String, RemoteBatch, ImportMode)>>,
        pub backups: Mutex<Vec<BackupRecord>>,
    }

    impl MockRemote {
        pub fn online() -> Self {
            Self {
                reachable: Mutex::new(true),
                ..Default::default()
            }
        }
    }

    impl RemoteStore for MockRemote {
        async fn is_reachable(&self) -> bool {
            *self.reachable.lock().unwrap()
        }

        async fn bulk_import(&self, user_id: &str, batch: &RemoteBatch, mode: ImportMode) -> Result<RemoteImportReport> {
            // Suspend once so concurrent callers can interleave.
            tokio::task::yield_now().await;
            self.imports
                .lock()
                .unwrap()
                .push((user_id.to_string(), batch.clone(), mode));
            let errors = self.fail_with.lock().unwrap().clone();
            if !errors.is_empty() {
                return Ok(RemoteImportReport {
                    errors,
                    ..Default::default()
                });
            }

            let mut users = self.users.lock().unwrap();
            let state = users.entry(user_id.to_string()).or_default();
            let quizzes = flatten_quiz_decks(&batch.quiz_decks);
            let report = RemoteImportReport {
                flashcards_imported: batch.flashcards.len(),
                quizzes_imported: quizzes.len(),
                errors: Vec::new(),
            };
            if mode == ImportMode::Replace {
                state.flashcards.clear();
                state.quizzes.clear();
            }
            state.flashcards.extend(batch.flashcards.iter().cloned());
            state.quizzes.extend(quizzes);
            Ok(report)
        }

        async fn save_user_metadata(&self, user_id: &str, metadata: &UserMetadata) -> Result<()> {
            if *self.fail_metadata.lock().unwrap() {
                anyhow::bail!("metadata table unavailable");
            }
            let mut users = self.users.lock().unwrap();
            let state = users.entry(user_id.to_string()).or_default();
            state.settings = metadata.settings.clone();
            state.stats = metadata.stats.clone();
            state.streak_data = metadata.streak_data.clone();
            state.user_profile = metadata.user_profile.clone();
            Ok(())
        }

        async fn delete_all_user_data(&self, user_id: &str) -> Result<()> {
            self.users.lock().unwrap().remove(user_id);
            Ok(())
        }

        async fn save_backup(&self, record: &BackupRecord) -> Result<()> {
            self.backups.lock().unwrap().push(record.clone());
            Ok(())
        }

        async fn fetch_user_data(&self, user_id: &str) -> Result<Option<AppState>> {
            Ok(self.users.lock().unwrap().get(user_id).cloned())
        }
    }
}
