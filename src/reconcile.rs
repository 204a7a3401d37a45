//! Applies an import batch across the storage tiers.
//!
//! Tier order is remote store (when signed in and reachable), then local
//! cache, then the in-memory state. The in-memory state is always written
//! last, with a single swap, so a reader sees either the old or the new
//! collections and never a mix. Writers are serialized: a study session
//! that arrives during an import waits for it instead of overwriting it.

use std::collections::HashMap;
use std::fmt;

use chrono::{NaiveDate, Utc};
use rand::seq::SliceRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::sync::{Mutex, RwLock};

use crate::auth::{AuthProvider, AuthSession};
use crate::error::ImportError;
use crate::export::{ExportArtifact, ExportFormat};
use crate::models::{merge_shallow, new_id, AppState, ImportBatch, JsonMap, Quiz, QuizDeck, QuizDeckQuestion, ScoreRecord, StreakRecord};
use crate::remote::{BackupRecord, RemoteBatch, RemoteStore, UserMetadata};
use crate::storage::{cache_key, CacheEntry, LocalCache};
use crate::streak;

/// Sessions kept in the `recentSessions` stat.
pub const RECENT_SESSIONS: usize = 10;

/// How imported flashcards and quizzes combine with existing ones.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum ImportMode {
    /// Append to the existing collections; nothing is removed.
    #[default]
    Merge,
    /// Supersede the existing collections entirely.
    Replace,
}

impl fmt::Display for ImportMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Merge => write!(f, "merge"),
            Self::Replace => write!(f, "replace"),
        }
    }
}

/// What a commit wrote.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportResult {
    pub flashcards_imported: usize,
    pub quizzes_imported: usize,
    /// Problems that did not stop the commit.
    pub errors: Vec<String>,
}

/// Single writer for the user's data.
pub struct ImportReconciler<R, C, A> {
    remote: R,
    cache: C,
    auth: A,
    state: RwLock<AppState>,
    writer: Mutex<()>,
}

impl<R: RemoteStore, C: LocalCache, A: AuthProvider> ImportReconciler<R, C, A> {
    pub fn new(remote: R, cache: C, auth: A) -> Self {
        Self::with_state(remote, cache, auth, AppState::default())
    }

    pub fn with_state(remote: R, cache: C, auth: A, state: AppState) -> Self {
        Self {
            remote,
            cache,
            auth,
            state: RwLock::new(state),
            writer: Mutex::new(()),
        }
    }

    /// Immutable copy of the current state.
    pub async fn snapshot(&self) -> AppState {
        self.state.read().await.clone()
    }

    /// Commit `batch` in `mode`. Imported records always get fresh ids.
    pub async fn commit(
        &self,
        mut batch: ImportBatch,
        mode: ImportMode,
        today: NaiveDate,
    ) -> Result<ImportResult, ImportError> {
        if batch.is_empty() {
            return Err(ImportError::Format("nothing to import".to_string()));
        }
        let _writer = self.writer.lock().await;
        for card in &mut batch.flashcards {
            card.id = new_id();
        }
        for quiz in &mut batch.quizzes {
            quiz.id = new_id();
        }

        let remote_batch = RemoteBatch {
            flashcards: batch.flashcards.clone(),
            quiz_decks: group_quizzes(&batch.quizzes, &mut rand::rng()),
        };
        let preview = apply_batch(&*self.state.read().await, &batch, mode, today);

        let mut result = ImportResult {
            flashcards_imported: batch.flashcards.len(),
            quizzes_imported: batch.quizzes.len(),
            errors: Vec::new(),
        };

        if let Some(user_id) = self.remote_target().await {
            let report = self
                .remote
                .bulk_import(&user_id, &remote_batch, mode)
                .await
                .map_err(|e| ImportError::RemoteWrite(vec![format!("{:#}", e)]))?;
            if !report.errors.is_empty() {
                log::error!(
                    "Remote import for {} rejected with {} error(s); nothing applied",
                    user_id,
                    report.errors.len()
                );
                return Err(ImportError::RemoteWrite(report.errors));
            }
            result.flashcards_imported = report.flashcards_imported;
            result.quizzes_imported = report.quizzes_imported;

            if batch.has_settings() || batch.has_stats() || batch.has_profile() || batch.streak_data.is_some() {
                if let Err(e) = self
                    .remote
                    .save_user_metadata(&user_id, &UserMetadata::from_state(&preview))
                    .await
                {
                    log::warn!("Failed to save user metadata remotely: {:#}", e);
                    result.errors.push(format!("user metadata not saved remotely: {}", e));
                }
            }
        }

        // Applied to the state as it is now, not to the copy taken before
        // the remote calls.
        let mut state = self.state.write().await;
        let next = apply_batch(&state, &batch, mode, today);
        self.write_cache(&next);
        *state = next;
        drop(state);

        log::info!(
            "Imported {} flashcard(s) and {} quiz question(s) ({})",
            result.flashcards_imported,
            result.quizzes_imported,
            mode
        );
        Ok(result)
    }

    /// Hydrate state from the most authoritative tier that has data.
    pub async fn load(&self, today: NaiveDate) -> AppState {
        let _writer = self.writer.lock().await;
        let mut loaded = None;
        if let Some(user_id) = self.remote_target().await {
            match self.remote.fetch_user_data(&user_id).await {
                Ok(state) => loaded = state,
                Err(e) => log::warn!("Failed to fetch remote data, falling back to cache: {:#}", e),
            }
            if let Some(state) = &loaded {
                self.write_cache(state);
            }
        }

        if loaded.is_none() {
            let key = cache_key(&self.auth.current_session());
            match self.cache.load(&key) {
                Ok(entry) => loaded = entry.map(|e| e.state),
                Err(e) => log::warn!("Ignoring unreadable cache entry {}: {:#}", key, e),
            }
        }

        let mut state = loaded.unwrap_or_default();
        state.streak_data = streak::refresh_on_load(&state.streak_data, today);
        *self.state.write().await = state.clone();
        state
    }

    /// Record a study session on `today` and persist the new streak.
    pub async fn record_study(&self, today: NaiveDate) -> StreakRecord {
        let _writer = self.writer.lock().await;
        let mut next = self.snapshot().await;
        next.streak_data = streak::record_study_event(&next.streak_data, today);

        if let Some(user_id) = self.remote_target().await {
            if let Err(e) = self
                .remote
                .save_user_metadata(&user_id, &UserMetadata::from_state(&next))
                .await
            {
                log::warn!("Failed to save streak remotely: {:#}", e);
            }
        }
        self.write_cache(&next);

        let streak = next.streak_data.clone();
        *self.state.write().await = next;
        streak
    }

    /// Delete the acting user's data from every tier.
    pub async fn reset(&self) -> Result<(), ImportError> {
        let _writer = self.writer.lock().await;
        if let Some(user_id) = self.remote_target().await {
            self.remote
                .delete_all_user_data(&user_id)
                .await
                .map_err(|e| ImportError::RemoteWrite(vec![format!("{:#}", e)]))?;
        }

        let key = cache_key(&self.auth.current_session());
        if let Err(e) = self.cache.remove(&key) {
            log::warn!("Failed to remove cache entry {}: {:#}", key, e);
        }
        *self.state.write().await = AppState::default();
        log::info!("All user data cleared");
        Ok(())
    }

    /// Keep a copy of an export remotely. Returns whether it was stored.
    pub async fn backup_export(&self, format: ExportFormat, artifact: &ExportArtifact) -> bool {
        let Some(user_id) = self.remote_target().await else {
            return false;
        };
        let record = BackupRecord {
            user_id,
            format,
            file_name: artifact.file_name.clone(),
            content: artifact.content.clone(),
            created_at: Utc::now(),
        };
        match self.remote.save_backup(&record).await {
            Ok(()) => true,
            Err(e) => {
                log::warn!("Remote backup failed: {:#}", e);
                false
            }
        }
    }

    /// User id to write remotely, if any. The session is read again after
    /// the reachability check so a sign-out in between is honoured.
    async fn remote_target(&self) -> Option<String> {
        let user_id = self.auth.current_session().user_id()?.to_string();
        if !self.remote.is_reachable().await {
            log::info!("Remote store unreachable; using local cache only");
            return None;
        }
        match self.auth.current_session() {
            AuthSession::Authenticated { user_id: current } if current == user_id => Some(user_id),
            _ => {
                log::warn!("Session for {} ended before the remote write; skipping it", user_id);
                None
            }
        }
    }

    fn write_cache(&self, state: &AppState) {
        let key = cache_key(&self.auth.current_session());
        if let Err(e) = self.cache.store(&key, &CacheEntry::from_state(state, Utc::now())) {
            log::warn!("Cache write failed, changes kept in memory only: {}", e);
        }
    }
}

/// Next state after applying `batch`. Collections follow `mode`; settings,
/// stats and profile merge key by key; an imported streak replaces the
/// current one.
pub fn apply_batch(current: &AppState, batch: &ImportBatch, mode: ImportMode, today: NaiveDate) -> AppState {
    let mut next = current.clone();
    match mode {
        ImportMode::Replace => {
            next.flashcards = batch.flashcards.clone();
            next.quizzes = batch.quizzes.clone();
        }
        ImportMode::Merge => {
            next.flashcards.extend(batch.flashcards.iter().cloned());
            next.quizzes.extend(batch.quizzes.iter().cloned());
        }
    }

    if let Some(settings) = &batch.settings {
        merge_shallow(&mut next.settings, settings);
    }
    if let Some(stats) = &batch.stats {
        merge_shallow(&mut next.stats, stats);
    }
    if !batch.scores.is_empty() {
        merge_shallow(&mut next.stats, &summarize_scores(&batch.scores));
    }
    if let Some(profile) = &batch.user_profile {
        merge_shallow(&mut next.user_profile, profile);
    }
    if let Some(streak_data) = &batch.streak_data {
        next.streak_data = streak::refresh_on_load(streak_data, today);
    }
    next
}

/// Fold a score history into aggregate stats.
pub fn summarize_scores(scores: &[ScoreRecord]) -> JsonMap {
    let mut stats = JsonMap::new();
    if scores.is_empty() {
        return stats;
    }

    let total_cards: u64 = scores.iter().map(|s| u64::from(s.cards_studied)).sum();
    let average = scores.iter().map(|s| s.score).sum::<f64>() / scores.len() as f64;
    let best = scores.iter().map(|s| s.score).fold(f64::NEG_INFINITY, f64::max);
    let recent: Vec<Value> = scores[scores.len().saturating_sub(RECENT_SESSIONS)..]
        .iter()
        .filter_map(|s| serde_json::to_value(s).ok())
        .collect();

    stats.insert("totalSessions".into(), json!(scores.len()));
    stats.insert("totalCardsStudied".into(), json!(total_cards));
    stats.insert("averageScore".into(), json!(average));
    stats.insert("bestScore".into(), json!(best));
    stats.insert("recentSessions".into(), Value::Array(recent));
    stats
}

/// Group quizzes by deck, in order of first appearance, with the correct
/// answer shuffled in among the wrong ones.
pub fn group_quizzes<G: Rng + ?Sized>(quizzes: &[Quiz], rng: &mut G) -> Vec<QuizDeck> {
    let mut decks: Vec<QuizDeck> = Vec::new();
    let mut index: HashMap<&str, usize> = HashMap::new();

    for quiz in quizzes {
        let slot = *index.entry(quiz.deck.as_str()).or_insert_with(|| {
            decks.push(QuizDeck {
                title: quiz.deck.clone(),
                category: quiz.deck.clone(),
                questions: Vec::new(),
            });
            decks.len() - 1
        });

        let mut options = quiz.wrong_answers.clone();
        options.push(quiz.correct_answer.clone());
        options.shuffle(rng);
        decks[slot].questions.push(QuizDeckQuestion {
            question: quiz.question.clone(),
            correct: quiz.correct_answer.clone(),
            options,
        });
    }
    decks
}
