//! Game Session Management
//!
//! The engine owning every live game. Each game sits behind its own lock so
//! mutations on one game are serialized while different games proceed in
//! parallel. The registry lock is only held to look up, insert, remove or
//! rehydrate a game.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::{broadcast, OwnedRwLockReadGuard, OwnedRwLockWriteGuard, RwLock};
use tracing::{debug, info, instrument, warn};

use crate::content::{AccountDirectory, ProviderError, QuestionProvider, QuestionRequest};
use crate::game::events::{GameEvent, GameEventData};
use crate::game::ranking::RankingEntry;
use crate::game::round::QuestionView;
use crate::game::roster::AccountId;
use crate::game::scoring::{AnswerScorer, ScoringMode, DEFAULT_CORRECT_POINTS};
use crate::game::session::{
    GameConfig, GameError, GameId, GameSession, NotFoundKind, ProgressView, SubmissionPolicy,
};
use crate::store::SessionStore;

/// Engine configuration.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Upper bound on a single question provider call.
    pub provider_timeout: Duration,
    /// Scoring policy.
    pub scoring: ScoringMode,
    /// Points for a correct answer (base points for time-weighted scoring).
    pub correct_points: u32,
    /// How repeated answers within a round are treated.
    pub submission_policy: SubmissionPolicy,
    /// Close rounds whose countdown ran out (see [`GameEngine::sweep_expired_rounds`]).
    pub enforce_countdown: bool,
    /// Extra time after the countdown before a round is closed.
    pub countdown_grace: Duration,
    /// Event channel capacity.
    pub event_capacity: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            provider_timeout: Duration::from_secs(5),
            scoring: ScoringMode::Exact,
            correct_points: DEFAULT_CORRECT_POINTS,
            submission_policy: SubmissionPolicy::Additive,
            enforce_countdown: false,
            countdown_grace: Duration::from_secs(2),
            event_capacity: 256,
        }
    }
}

impl EngineConfig {
    /// Create config from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            provider_timeout: env_parse::<u64>("QUIZ_PROVIDER_TIMEOUT_MS")
                .map(Duration::from_millis)
                .unwrap_or(defaults.provider_timeout),
            scoring: env_parse("QUIZ_SCORING").unwrap_or(defaults.scoring),
            correct_points: env_parse("QUIZ_CORRECT_POINTS").unwrap_or(defaults.correct_points),
            submission_policy: env_parse("QUIZ_SUBMISSION_POLICY")
                .unwrap_or(defaults.submission_policy),
            enforce_countdown: std::env::var("QUIZ_ENFORCE_COUNTDOWN")
                .map(|v| v == "true" || v == "1")
                .unwrap_or(defaults.enforce_countdown),
            countdown_grace: env_parse::<u64>("QUIZ_COUNTDOWN_GRACE_MS")
                .map(Duration::from_millis)
                .unwrap_or(defaults.countdown_grace),
            event_capacity: defaults.event_capacity,
        }
    }
}

/// Parse an environment variable, logging values that do not parse.
pub(crate) fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    let raw = std::env::var(key).ok()?;
    match raw.parse() {
        Ok(value) => Some(value),
        Err(_) => {
            warn!("Ignoring unparsable {}={:?}", key, raw);
            None
        }
    }
}

/// A registry entry. `deleted` is set under the game's lock when the game is
/// deleted, so operations that were already waiting for the lock fail
/// instead of saving it back.
struct GameSlot {
    session: GameSession,
    deleted: bool,
}

type SharedSession = Arc<RwLock<GameSlot>>;

/// Owns all games and exposes the caller-facing operations.
pub struct GameEngine {
    /// Engine configuration.
    config: EngineConfig,
    /// Live games.
    sessions: RwLock<BTreeMap<GameId, SharedSession>>,
    /// Question source.
    questions: Arc<dyn QuestionProvider>,
    /// Account lookup for display names.
    accounts: Arc<dyn AccountDirectory>,
    /// Optional snapshot persistence.
    store: Option<Arc<dyn SessionStore>>,
    /// Scoring policy.
    scorer: Box<dyn AnswerScorer>,
    /// Event broadcast channel.
    event_tx: broadcast::Sender<GameEvent>,
}

impl GameEngine {
    /// Create an engine without persistence.
    pub fn new(
        config: EngineConfig,
        questions: Arc<dyn QuestionProvider>,
        accounts: Arc<dyn AccountDirectory>,
    ) -> Self {
        let (event_tx, _) = broadcast::channel(config.event_capacity.max(1));
        let scorer = config.scoring.scorer(config.correct_points);

        Self {
            config,
            sessions: RwLock::new(BTreeMap::new()),
            questions,
            accounts,
            store: None,
            scorer,
            event_tx,
        }
    }

    /// Persist every game through `store` and rehydrate games missing in memory.
    pub fn with_store(mut self, store: Arc<dyn SessionStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Engine configuration.
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Subscribe to game events.
    pub fn subscribe(&self) -> broadcast::Receiver<GameEvent> {
        self.event_tx.subscribe()
    }

    /// Number of games held in memory.
    pub async fn game_count(&self) -> usize {
        self.sessions.read().await.len()
    }

    // =========================================================================
    // Operations
    // =========================================================================

    /// Create a game at round 0 with no players.
    #[instrument(skip(self))]
    pub async fn create_game(&self, config: GameConfig) -> Result<ProgressView, GameError> {
        let session = GameSession::new(
            GameId::new_v4(),
            &config,
            self.config.submission_policy,
            Utc::now(),
        )?;
        self.persist(&session).await?;

        let id = session.id;
        let progress = session.progress();
        let created_at = session.created_at;
        let mut sessions = self.sessions.write().await;
        sessions.insert(
            id,
            Arc::new(RwLock::new(GameSlot {
                session,
                deleted: false,
            })),
        );

        info!(
            "Game {} created: {} rounds of {}, {}s countdown",
            id, progress.total_rounds, progress.category, progress.countdown_secs
        );
        self.emit(GameEvent::new(
            id,
            created_at,
            GameEventData::GameCreated {
                category: progress.category,
                total_rounds: progress.total_rounds,
            },
        ));
        Ok(progress)
    }

    /// Add an account to a game. Returns `false` if it had already joined.
    #[instrument(skip(self))]
    pub async fn join_game(&self, id: GameId, account_id: AccountId) -> Result<bool, GameError> {
        let account = self
            .accounts
            .find_account(account_id)
            .await
            .ok_or(GameError::NotFound(NotFoundKind::Account(account_id)));
        let mut game = self.write_game(&id).await?;
        let account = account?;

        let now = Utc::now();
        let mut next = game.session.clone();
        if !next.join(account.id, &account.display_name, now)? {
            debug!("Account {} already in game {}", account_id, id);
            return Ok(false);
        }
        self.commit(&mut game, next).await?;

        info!("Player {} ({}) joined game {}", account.display_name, account_id, id);
        self.emit(GameEvent::new(
            id,
            now,
            GameEventData::PlayerJoined {
                account_id,
                display_name: account.display_name,
            },
        ));
        Ok(true)
    }

    /// Open the next round and return its question without the answer.
    ///
    /// The round index only moves once a valid question has been obtained;
    /// provider failures and timeouts leave the game untouched.
    #[instrument(skip(self))]
    pub async fn advance_round(&self, id: GameId) -> Result<QuestionView, GameError> {
        let mut game = self.write_game(&id).await?;
        if game.session.is_ended() {
            return Err(GameError::SessionEnded);
        }

        let request = QuestionRequest {
            game_id: id,
            round: game.session.current_round() + 1,
        };
        let fetch = self.questions.next_question(game.session.category, request);
        let question = match tokio::time::timeout(self.config.provider_timeout, fetch).await {
            Ok(Ok(question)) => question,
            Ok(Err(e)) => {
                warn!("Question provider failed for game {}: {}", id, e);
                return Err(e.into());
            }
            Err(_) => {
                warn!("Question provider timed out for game {}", id);
                return Err(ProviderError::Timeout(self.config.provider_timeout).into());
            }
        };

        let now = Utc::now();
        let mut next = game.session.clone();
        let view = next.open_round(question, now)?;
        let final_scores = next
            .is_ended()
            .then(|| (next.final_scores(), next.roster().total_score()));
        self.commit(&mut game, next).await?;

        info!("Game {} round {}/{} started", id, view.round, view.total_rounds);
        self.emit(GameEvent::new(
            id,
            now,
            GameEventData::RoundStarted {
                round: view.round,
                total_rounds: view.total_rounds,
            },
        ));
        if let Some((final_scores, points)) = final_scores {
            info!("Game {} ended, {} points awarded", id, points);
            self.emit(GameEvent::new(id, now, GameEventData::GameEnded { final_scores }));
        }
        Ok(view)
    }

    /// Score an answer for the open round and return the score delta.
    #[instrument(skip(self, answer))]
    pub async fn submit_answer(
        &self,
        id: GameId,
        account_id: AccountId,
        answer: &str,
    ) -> Result<u32, GameError> {
        let mut game = self.write_game(&id).await?;

        let now = Utc::now();
        let mut next = game.session.clone();
        let delta = next.submit_answer(account_id, answer, self.scorer.as_ref(), now)?;
        let round = next.current_round();
        let new_score = next
            .roster()
            .get(&account_id)
            .map_or(0, |p| p.score);
        self.commit(&mut game, next).await?;

        debug!("Game {} round {}: {} scored {}", id, round, account_id, delta);
        self.emit(GameEvent::new(
            id,
            now,
            GameEventData::AnswerScored {
                account_id,
                round,
                delta,
                new_score,
            },
        ));
        Ok(delta)
    }

    /// Remove a participant. Removing an absent participant is a no-op.
    #[instrument(skip(self))]
    pub async fn remove_player(&self, id: GameId, account_id: AccountId) -> Result<bool, GameError> {
        let mut game = self.write_game(&id).await?;
        if !game.session.roster().contains(&account_id) {
            return Ok(false);
        }

        let mut next = game.session.clone();
        next.remove_player(&account_id);
        self.commit(&mut game, next).await?;

        info!("Player {} left game {}", account_id, id);
        self.emit(GameEvent::new(id, Utc::now(), GameEventData::PlayerLeft { account_id }));
        Ok(true)
    }

    /// Progress and scoreboard of a game.
    pub async fn get_progress(&self, id: GameId) -> Result<ProgressView, GameError> {
        let game = self.read_game(&id).await?;
        Ok(game.session.progress())
    }

    /// Participants in first place (current leaders while the game runs).
    pub async fn get_winners(&self, id: GameId) -> Result<Vec<RankingEntry>, GameError> {
        let game = self.read_game(&id).await?;
        Ok(game.session.winners())
    }

    /// Delete a game and all of its participants from memory and storage.
    ///
    /// Waits for the operation currently holding the game to finish. Any
    /// operation queued behind the delete fails with `NotFound`.
    #[instrument(skip(self))]
    pub async fn delete_game(&self, id: GameId) -> Result<(), GameError> {
        let mut game = self.write_game(&id).await?;

        let mut sessions = self.sessions.write().await;
        if let Some(store) = &self.store {
            store.delete(&id).await?;
        }
        sessions.remove(&id);
        game.deleted = true;
        drop(sessions);

        info!("Game {} deleted", id);
        self.emit(GameEvent::new(id, Utc::now(), GameEventData::GameDeleted));
        Ok(())
    }

    /// Close open rounds whose countdown (plus grace) has run out.
    ///
    /// Does nothing unless `enforce_countdown` is set. Returns the number of
    /// rounds closed. A storage failure on one game does not stop the sweep;
    /// the first failure is returned once every game has been visited.
    pub async fn sweep_expired_rounds(&self, now: DateTime<Utc>) -> Result<usize, GameError> {
        if !self.config.enforce_countdown {
            return Ok(0);
        }
        let grace = chrono::Duration::from_std(self.config.countdown_grace)
            .unwrap_or_else(|_| chrono::Duration::zero());

        let sessions: Vec<SharedSession> = self.sessions.read().await.values().cloned().collect();
        let mut closed = 0;
        let mut failure = None;
        for session in sessions {
            let mut game = session.write().await;
            let expired = !game.deleted
                && game
                    .session
                    .round_deadline()
                    .is_some_and(|deadline| deadline + grace <= now);
            if !expired {
                continue;
            }

            let mut next = game.session.clone();
            next.close_round();
            let (id, round) = (next.id, next.current_round());
            match self.commit(&mut game, next).await {
                Ok(()) => {
                    debug!("Game {} round {} closed after countdown", id, round);
                    closed += 1;
                }
                Err(e) => {
                    warn!("Failed to close round {} of game {}: {}", round, id, e);
                    failure.get_or_insert(e);
                }
            }
        }

        match failure {
            Some(e) => Err(e),
            None => Ok(closed),
        }
    }

    // =========================================================================
    // Internals
    // =========================================================================

    /// Look up a game, rehydrating it from storage if needed.
    ///
    /// Rehydration runs under the registry write lock so it cannot interleave
    /// with a delete.
    async fn session(&self, id: &GameId) -> Result<SharedSession, GameError> {
        if let Some(session) = self.sessions.read().await.get(id) {
            return Ok(session.clone());
        }

        let Some(store) = &self.store else {
            return Err(GameError::NotFound(NotFoundKind::Game(*id)));
        };
        let mut sessions = self.sessions.write().await;
        if let Some(session) = sessions.get(id) {
            return Ok(session.clone());
        }
        let Some(loaded) = store.load(id).await? else {
            return Err(GameError::NotFound(NotFoundKind::Game(*id)));
        };

        debug!("Game {} rehydrated from storage", id);
        let slot = Arc::new(RwLock::new(GameSlot {
            session: loaded,
            deleted: false,
        }));
        sessions.insert(*id, slot.clone());
        Ok(slot)
    }

    /// Exclusive access to a live game.
    async fn write_game(&self, id: &GameId) -> Result<OwnedRwLockWriteGuard<GameSlot>, GameError> {
        let game = self.session(id).await?.write_owned().await;
        if game.deleted {
            return Err(GameError::NotFound(NotFoundKind::Game(*id)));
        }
        Ok(game)
    }

    /// Shared access to a live game.
    async fn read_game(&self, id: &GameId) -> Result<OwnedRwLockReadGuard<GameSlot>, GameError> {
        let game = self.session(id).await?.read_owned().await;
        if game.deleted {
            return Err(GameError::NotFound(NotFoundKind::Game(*id)));
        }
        Ok(game)
    }

    /// Save `next` and make it the live state. On storage failure the live
    /// state is left as it was.
    async fn commit(&self, live: &mut GameSlot, next: GameSession) -> Result<(), GameError> {
        self.persist(&next).await?;
        live.session = next;
        Ok(())
    }

    async fn persist(&self, session: &GameSession) -> Result<(), GameError> {
        if let Some(store) = &self.store {
            store.save(session).await?;
        }
        Ok(())
    }

    /// Broadcast an event. Called while the game's lock is held so
    /// subscribers see events in the order they were applied.
    fn emit(&self, event: GameEvent) {
        debug!(game = %event.game_id, account = ?event.account_id(), "event {:?}", event.data);
        // No subscribers is fine
        let _ = self.event_tx.send(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    use async_trait::async_trait;

    use crate::content::InMemoryAccounts;
    use crate::game::round::{CityCategory, Question, RoundPhase};
    use crate::store::{InMemoryStore, StoreError};

    /// Provider answering every round with the same question.
    struct FixedProvider {
        answer: String,
        fail: AtomicBool,
        delay: Duration,
        calls: AtomicUsize,
    }

    impl FixedProvider {
        fn new(answer: &str) -> Self {
            Self {
                answer: answer.to_string(),
                fail: AtomicBool::new(false),
                delay: Duration::ZERO,
                calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl QuestionProvider for FixedProvider {
        async fn next_question(
            &self,
            _category: CityCategory,
            _request: QuestionRequest,
        ) -> Result<Question, ProviderError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            if self.fail.load(Ordering::SeqCst) {
                return Err(ProviderError::Unavailable("backend down".into()));
            }
            Ok(Question {
                prompt: "https://img.example/q.jpg".into(),
                options: [self.answer.clone(), "Lyon".into(), "Nice".into(), "Lille".into()],
                correct_answer: self.answer.clone(),
            })
        }
    }

    /// Store whose saves can be switched to fail, for all games or just one.
    #[derive(Default)]
    struct FlakyStore {
        inner: InMemoryStore,
        fail: AtomicBool,
        fail_game: std::sync::Mutex<Option<GameId>>,
    }

    #[async_trait]
    impl SessionStore for FlakyStore {
        async fn save(&self, session: &GameSession) -> Result<(), StoreError> {
            let broken = *self.fail_game.lock().unwrap() == Some(session.id);
            if broken || self.fail.load(Ordering::SeqCst) {
                return Err(StoreError::Backend("disk full".into()));
            }
            self.inner.save(session).await
        }

        async fn load(&self, id: &GameId) -> Result<Option<GameSession>, StoreError> {
            self.inner.load(id).await
        }

        async fn delete(&self, id: &GameId) -> Result<bool, StoreError> {
            self.inner.delete(id).await
        }
    }

    fn game_config(total_rounds: i32) -> GameConfig {
        GameConfig {
            category: CityCategory::Landmarks,
            total_rounds,
            countdown_secs: 15,
        }
    }

    async fn engine_with(provider: Arc<FixedProvider>, config: EngineConfig) -> (GameEngine, Vec<AccountId>) {
        let accounts = Arc::new(InMemoryAccounts::new());
        let mut ids = Vec::new();
        for name in ["alice", "bob", "carol"] {
            ids.push(accounts.register(name).await.id);
        }
        (GameEngine::new(config, provider, accounts), ids)
    }

    #[tokio::test]
    async fn test_create_and_get_progress() {
        let (engine, _) = engine_with(Arc::new(FixedProvider::new("Paris")), EngineConfig::default()).await;
        let created = engine.create_game(game_config(3)).await.unwrap();

        assert_eq!(created.current_round, 0);
        assert_eq!(created.phase, RoundPhase::Created);
        assert!(created.ranking.is_empty());
        assert_eq!(engine.game_count().await, 1);

        let progress = engine.get_progress(created.game_id).await.unwrap();
        assert_eq!(progress, created);
    }

    #[tokio::test]
    async fn test_create_rejects_invalid_config() {
        let (engine, _) = engine_with(Arc::new(FixedProvider::new("Paris")), EngineConfig::default()).await;
        let result = engine.create_game(game_config(0)).await;
        assert!(matches!(result, Err(GameError::InvalidConfiguration(_))));
        assert_eq!(engine.game_count().await, 0);
    }

    #[tokio::test]
    async fn test_unknown_game() {
        let (engine, ids) = engine_with(Arc::new(FixedProvider::new("Paris")), EngineConfig::default()).await;
        let missing = GameId::new_v4();
        let not_found = GameError::NotFound(NotFoundKind::Game(missing));

        assert_eq!(engine.get_progress(missing).await, Err(not_found.clone()));
        assert_eq!(engine.advance_round(missing).await, Err(not_found.clone()));
        assert_eq!(engine.join_game(missing, ids[0]).await, Err(not_found.clone()));
        assert_eq!(engine.submit_answer(missing, ids[0], "x").await, Err(not_found.clone()));
        assert_eq!(engine.remove_player(missing, ids[0]).await, Err(not_found.clone()));
        assert_eq!(engine.delete_game(missing).await, Err(not_found));
    }

    #[tokio::test]
    async fn test_join_unknown_account() {
        let (engine, _) = engine_with(Arc::new(FixedProvider::new("Paris")), EngineConfig::default()).await;
        let game = engine.create_game(game_config(3)).await.unwrap().game_id;

        let stranger = AccountId::new(999);
        assert_eq!(
            engine.join_game(game, stranger).await,
            Err(GameError::NotFound(NotFoundKind::Account(stranger)))
        );
    }

    #[tokio::test]
    async fn test_provider_failure_leaves_game_untouched() {
        let provider = Arc::new(FixedProvider::new("Paris"));
        let (engine, ids) = engine_with(provider.clone(), EngineConfig::default()).await;
        let game = engine.create_game(game_config(3)).await.unwrap().game_id;
        engine.join_game(game, ids[0]).await.unwrap();
        engine.advance_round(game).await.unwrap();

        provider.fail.store(true, Ordering::SeqCst);
        let result = engine.advance_round(game).await;
        assert!(matches!(result, Err(GameError::Provider(ProviderError::Unavailable(_)))));

        let progress = engine.get_progress(game).await.unwrap();
        assert_eq!(progress.current_round, 1);
        assert_eq!(progress.phase, RoundPhase::RoundOpen);

        // The old pending answer still scores
        assert_eq!(engine.submit_answer(game, ids[0], "Paris").await, Ok(10));

        // Retry succeeds once the provider recovers
        provider.fail.store(false, Ordering::SeqCst);
        assert_eq!(engine.advance_round(game).await.unwrap().round, 2);
    }

    #[tokio::test]
    async fn test_provider_timeout() {
        let provider = Arc::new(FixedProvider {
            delay: Duration::from_secs(5),
            ..FixedProvider::new("Paris")
        });
        let config = EngineConfig {
            provider_timeout: Duration::from_millis(20),
            ..Default::default()
        };
        let (engine, _) = engine_with(provider, config).await;
        let game = engine.create_game(game_config(3)).await.unwrap().game_id;

        let result = engine.advance_round(game).await;
        assert_eq!(
            result,
            Err(GameError::Provider(ProviderError::Timeout(Duration::from_millis(20))))
        );
        assert_eq!(engine.get_progress(game).await.unwrap().current_round, 0);
    }

    #[tokio::test]
    async fn test_concurrent_advances_stop_at_total() {
        let provider = Arc::new(FixedProvider {
            delay: Duration::from_millis(5),
            ..FixedProvider::new("Paris")
        });
        let (engine, _) = engine_with(provider.clone(), EngineConfig::default()).await;
        let engine = Arc::new(engine);
        let game = engine.create_game(game_config(3)).await.unwrap().game_id;

        let mut handles = Vec::new();
        for _ in 0..10 {
            let engine = engine.clone();
            handles.push(tokio::spawn(async move { engine.advance_round(game).await }));
        }

        let mut rounds = Vec::new();
        let mut ended = 0;
        for handle in handles {
            match handle.await.unwrap() {
                Ok(view) => rounds.push(view.round),
                Err(GameError::SessionEnded) => ended += 1,
                Err(e) => panic!("unexpected error: {e}"),
            }
        }
        rounds.sort();
        assert_eq!(rounds, vec![1, 2, 3]);
        assert_eq!(ended, 7);
        assert_eq!(provider.calls.load(Ordering::SeqCst), 3);
        assert!(engine.get_progress(game).await.unwrap().ended);
    }

    /// Provider answering round `n` with `answers[n - 1]`.
    struct RoundProvider {
        answers: Vec<&'static str>,
        delay: Duration,
    }

    #[async_trait]
    impl QuestionProvider for RoundProvider {
        async fn next_question(
            &self,
            _category: CityCategory,
            request: QuestionRequest,
        ) -> Result<Question, ProviderError> {
            tokio::time::sleep(self.delay).await;
            let answer = self.answers[request.round as usize - 1].to_string();
            Ok(Question {
                prompt: "https://img.example/q.jpg".into(),
                options: [answer.clone(), "Lyon".into(), "Nice".into(), "Lille".into()],
                correct_answer: answer,
            })
        }
    }

    #[tokio::test]
    async fn test_answers_racing_an_advance_see_one_round() {
        let provider = Arc::new(RoundProvider {
            answers: vec!["Paris", "Rome", "Cairo"],
            delay: Duration::from_millis(2),
        });
        let accounts = Arc::new(InMemoryAccounts::new());
        let alice = accounts.register("alice").await.id;
        let engine = Arc::new(GameEngine::new(EngineConfig::default(), provider, accounts));
        let mut events = engine.subscribe();

        let game = engine.create_game(game_config(3)).await.unwrap().game_id;
        engine.join_game(game, alice).await.unwrap();
        engine.advance_round(game).await.unwrap();

        let mut handles = Vec::new();
        for i in 0..20 {
            let engine = engine.clone();
            if i == 5 {
                handles.push(tokio::spawn(async move {
                    engine.advance_round(game).await.map(|_| 0)
                }));
            } else {
                handles.push(tokio::spawn(async move {
                    engine.submit_answer(game, alice, "Paris").await
                }));
            }
        }
        let mut earned = 0;
        for handle in handles {
            earned += i64::from(handle.await.unwrap().unwrap());
        }

        let progress = engine.get_progress(game).await.unwrap();
        assert_eq!(progress.current_round, 2);
        assert_eq!(progress.ranking[0].score, earned);

        // Round 1 answers score, round 2 answers do not, and the stream
        // never shows a round 1 answer after round 2 started
        let mut round = 0;
        while let Ok(event) = events.try_recv() {
            match event.data {
                GameEventData::RoundStarted { round: started, .. } => round = started,
                GameEventData::AnswerScored { round: answered, delta, .. } => {
                    assert_eq!(answered, round);
                    assert_eq!(delta, if answered == 1 { 10 } else { 0 });
                }
                _ => {}
            }
        }
        assert_eq!(round, 2);
    }

    #[tokio::test]
    async fn test_delete_waits_for_in_flight_advance() {
        let store = Arc::new(InMemoryStore::new());
        let provider = Arc::new(FixedProvider {
            delay: Duration::from_millis(200),
            ..FixedProvider::new("Paris")
        });
        let (engine, _) = engine_with(provider, EngineConfig::default()).await;
        let engine = Arc::new(engine.with_store(store.clone()));
        let game = engine.create_game(game_config(3)).await.unwrap().game_id;

        let advancing = {
            let engine = engine.clone();
            tokio::spawn(async move { engine.advance_round(game).await })
        };
        tokio::time::sleep(Duration::from_millis(50)).await;

        engine.delete_game(game).await.unwrap();
        assert_eq!(advancing.await.unwrap().unwrap().round, 1);

        assert!(store.is_empty().await);
        assert_eq!(engine.game_count().await, 0);
        let not_found = GameError::NotFound(NotFoundKind::Game(game));
        assert_eq!(engine.get_progress(game).await, Err(not_found.clone()));
        assert_eq!(engine.advance_round(game).await, Err(not_found));
    }

    #[tokio::test]
    async fn test_operations_queued_behind_delete_fail() {
        let store = Arc::new(InMemoryStore::new());
        let provider = Arc::new(FixedProvider {
            delay: Duration::from_millis(100),
            ..FixedProvider::new("Paris")
        });
        let (engine, ids) = engine_with(provider, EngineConfig::default()).await;
        let engine = Arc::new(engine.with_store(store.clone()));
        let game = engine.create_game(game_config(3)).await.unwrap().game_id;
        engine.join_game(game, ids[0]).await.unwrap();

        let advancing = {
            let engine = engine.clone();
            tokio::spawn(async move { engine.advance_round(game).await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        let deleting = {
            let engine = engine.clone();
            tokio::spawn(async move { engine.delete_game(game).await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        let answering = {
            let engine = engine.clone();
            let alice = ids[0];
            tokio::spawn(async move { engine.submit_answer(game, alice, "Paris").await })
        };

        assert!(advancing.await.unwrap().is_ok());
        assert_eq!(deleting.await.unwrap(), Ok(()));
        assert_eq!(
            answering.await.unwrap(),
            Err(GameError::NotFound(NotFoundKind::Game(game)))
        );
        assert!(store.is_empty().await);
        assert!(engine.get_progress(game).await.is_err());
    }

    #[tokio::test]
    async fn test_remove_player_is_idempotent() {
        let (engine, ids) = engine_with(Arc::new(FixedProvider::new("Paris")), EngineConfig::default()).await;
        let game = engine.create_game(game_config(3)).await.unwrap().game_id;
        engine.join_game(game, ids[0]).await.unwrap();

        assert_eq!(engine.remove_player(game, ids[1]).await, Ok(false));
        assert_eq!(engine.remove_player(game, ids[0]).await, Ok(true));
        assert_eq!(engine.remove_player(game, ids[0]).await, Ok(false));
        assert!(engine.get_progress(game).await.unwrap().ranking.is_empty());
    }

    #[tokio::test]
    async fn test_events_are_broadcast() {
        let (engine, ids) = engine_with(Arc::new(FixedProvider::new("Paris")), EngineConfig::default()).await;
        let mut events = engine.subscribe();

        let game = engine.create_game(game_config(1)).await.unwrap().game_id;
        engine.join_game(game, ids[0]).await.unwrap();
        engine.advance_round(game).await.unwrap();

        let kinds: Vec<GameEventData> = (0..4).map(|_| events.try_recv().unwrap().data).collect();
        assert!(matches!(kinds[0], GameEventData::GameCreated { total_rounds: 1, .. }));
        assert!(matches!(kinds[1], GameEventData::PlayerJoined { .. }));
        assert!(matches!(kinds[2], GameEventData::RoundStarted { round: 1, .. }));
        match &kinds[3] {
            GameEventData::GameEnded { final_scores } => {
                assert_eq!(final_scores.len(), 1);
                assert_eq!(final_scores[0].account_id, ids[0]);
            }
            other => panic!("expected GameEnded, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_rehydrate_from_store() {
        let store = Arc::new(InMemoryStore::new());
        let provider = Arc::new(FixedProvider::new("Paris"));
        let accounts = Arc::new(InMemoryAccounts::new());
        let alice = accounts.register("alice").await.id;

        let first = GameEngine::new(EngineConfig::default(), provider.clone(), accounts.clone())
            .with_store(store.clone());
        let game = first.create_game(game_config(3)).await.unwrap().game_id;
        first.join_game(game, alice).await.unwrap();
        first.advance_round(game).await.unwrap();
        first.submit_answer(game, alice, "Paris").await.unwrap();
        drop(first);

        // A fresh engine over the same store picks up where the last one stopped
        let second = GameEngine::new(EngineConfig::default(), provider, accounts).with_store(store.clone());
        assert_eq!(second.game_count().await, 0);
        let progress = second.get_progress(game).await.unwrap();
        assert_eq!(progress.current_round, 1);
        assert_eq!(progress.ranking[0].score, 10);
        assert_eq!(second.submit_answer(game, alice, "Paris").await, Ok(10));

        second.delete_game(game).await.unwrap();
        assert!(store.is_empty().await);
        assert!(matches!(second.get_progress(game).await, Err(GameError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_storage_failure_keeps_previous_state() {
        let store = Arc::new(FlakyStore::default());
        let provider = Arc::new(FixedProvider::new("Paris"));
        let accounts = Arc::new(InMemoryAccounts::new());
        let alice = accounts.register("alice").await.id;
        let engine = GameEngine::new(EngineConfig::default(), provider, accounts).with_store(store.clone());

        let game = engine.create_game(game_config(3)).await.unwrap().game_id;
        engine.join_game(game, alice).await.unwrap();

        store.fail.store(true, Ordering::SeqCst);
        let result = engine.advance_round(game).await;
        assert!(matches!(result, Err(GameError::Storage(StoreError::Backend(_)))));
        assert_eq!(engine.get_progress(game).await.unwrap().current_round, 0);
    }

    #[tokio::test]
    async fn test_sweep_closes_expired_rounds() {
        let config = EngineConfig {
            enforce_countdown: true,
            countdown_grace: Duration::ZERO,
            ..Default::default()
        };
        let (engine, ids) = engine_with(Arc::new(FixedProvider::new("Paris")), config).await;
        let game = engine.create_game(game_config(3)).await.unwrap().game_id;
        engine.join_game(game, ids[0]).await.unwrap();
        engine.advance_round(game).await.unwrap();

        assert_eq!(engine.sweep_expired_rounds(Utc::now()).await, Ok(0));

        let later = Utc::now() + chrono::Duration::seconds(16);
        assert_eq!(engine.sweep_expired_rounds(later).await, Ok(1));
        assert_eq!(engine.get_progress(game).await.unwrap().phase, RoundPhase::RoundClosed);
        assert_eq!(
            engine.submit_answer(game, ids[0], "Paris").await,
            Err(GameError::NoActiveRound)
        );
    }

    #[tokio::test]
    async fn test_sweep_continues_past_storage_failure() {
        let store = Arc::new(FlakyStore::default());
        let config = EngineConfig {
            enforce_countdown: true,
            countdown_grace: Duration::ZERO,
            ..Default::default()
        };
        let accounts = Arc::new(InMemoryAccounts::new());
        let engine = GameEngine::new(config, Arc::new(FixedProvider::new("Paris")), accounts)
            .with_store(store.clone());

        let broken = engine.create_game(game_config(3)).await.unwrap().game_id;
        let healthy = engine.create_game(game_config(3)).await.unwrap().game_id;
        engine.advance_round(broken).await.unwrap();
        engine.advance_round(healthy).await.unwrap();
        *store.fail_game.lock().unwrap() = Some(broken);

        let later = Utc::now() + chrono::Duration::seconds(16);
        let result = engine.sweep_expired_rounds(later).await;
        assert!(matches!(result, Err(GameError::Storage(StoreError::Backend(_)))));

        assert_eq!(engine.get_progress(healthy).await.unwrap().phase, RoundPhase::RoundClosed);
        assert_eq!(engine.get_progress(broken).await.unwrap().phase, RoundPhase::RoundOpen);

        *store.fail_game.lock().unwrap() = None;
        assert_eq!(engine.sweep_expired_rounds(later).await, Ok(1));
        assert_eq!(engine.get_progress(broken).await.unwrap().phase, RoundPhase::RoundClosed);
    }

    #[tokio::test]
    async fn test_sweep_disabled_by_default() {
        let (engine, _) = engine_with(Arc::new(FixedProvider::new("Paris")), EngineConfig::default()).await;
        let game = engine.create_game(game_config(3)).await.unwrap().game_id;
        engine.advance_round(game).await.unwrap();

        let much_later = Utc::now() + chrono::Duration::hours(1);
        assert_eq!(engine.sweep_expired_rounds(much_later).await, Ok(0));
        assert_eq!(engine.get_progress(game).await.unwrap().phase, RoundPhase::RoundOpen);
    }
}
