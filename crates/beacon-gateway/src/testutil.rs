//! Shared test fixtures: a counting mock backend and session plumbing.

use crate::backend::{
    AccountBackend, AchievementList, BackendError, BackendResult, EntriesPage, EntriesSelector,
    LeaderboardDef, LeaderboardRow, SetAchievementOutcome, Stat, StatUpdate, TokenRecord,
    UserProfile,
};
use crate::session::{FrameWriter, SessionContext, TopicSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::io::DuplexStream;

/// Backend double that records calls and serves canned data.
#[derive(Default)]
pub struct MockBackend {
    calls: AtomicUsize,
    identified: Mutex<Option<(String, String)>>,
    token: Mutex<Option<TokenRecord>>,
    token_failure: Mutex<Option<BackendError>>,
    profile: Mutex<Option<UserProfile>>,
    stats: Mutex<Vec<Stat>>,
    last_stats_user: Mutex<Option<u64>>,
    last_stat_update: Mutex<Option<(u64, StatUpdate)>>,
    achievements: Mutex<AchievementList>,
    set_achievement_calls: AtomicUsize,
    get_achievements_calls: AtomicUsize,
    leaderboards: Mutex<Vec<LeaderboardDef>>,
    entries: Mutex<Vec<LeaderboardRow>>,
    entries_failure: Mutex<Option<BackendError>>,
}

impl MockBackend {
    pub fn set_token(&self, record: TokenRecord) {
        *self.token.lock().unwrap() = Some(record);
    }

    pub fn fail_next_token(&self, err: BackendError) {
        *self.token_failure.lock().unwrap() = Some(err);
    }

    pub fn set_profile(&self, profile: UserProfile) {
        *self.profile.lock().unwrap() = Some(profile);
    }

    pub fn set_stats(&self, stats: Vec<Stat>) {
        *self.stats.lock().unwrap() = stats;
    }

    pub fn set_achievements(&self, list: AchievementList) {
        *self.achievements.lock().unwrap() = list;
    }

    pub fn set_leaderboards(&self, defs: Vec<LeaderboardDef>) {
        *self.leaderboards.lock().unwrap() = defs;
    }

    pub fn set_entries(&self, rows: Vec<LeaderboardRow>) {
        *self.entries.lock().unwrap() = rows;
    }

    pub fn fail_next_entries(&self, err: BackendError) {
        *self.entries_failure.lock().unwrap() = Some(err);
    }

    pub fn identified(&self) -> Option<(String, String)> {
        self.identified.lock().unwrap().clone()
    }

    pub fn last_stats_user(&self) -> Option<u64> {
        *self.last_stats_user.lock().unwrap()
    }

    pub fn last_stat_update(&self) -> Option<(u64, StatUpdate)> {
        *self.last_stat_update.lock().unwrap()
    }

    pub fn total_calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn set_achievement_calls(&self) -> usize {
        self.set_achievement_calls.load(Ordering::SeqCst)
    }

    pub fn get_achievements_calls(&self) -> usize {
        self.get_achievements_calls.load(Ordering::SeqCst)
    }

    fn count(&self) {
        self.calls.fetch_add(1, Ordering::SeqCst);
    }
}

impl AccountBackend for MockBackend {
    fn identify(&self, client_id: &str, client_secret: &str) {
        *self.identified.lock().unwrap() =
            Some((client_id.to_string(), client_secret.to_string()));
    }

    async fn obtain_token(
        &self,
        _client_id: &str,
        _client_secret: &str,
    ) -> BackendResult<TokenRecord> {
        self.count();
        if let Some(err) = self.token_failure.lock().unwrap().take() {
            return Err(err);
        }
        Ok(self
            .token
            .lock()
            .unwrap()
            .clone()
            .unwrap_or_else(|| TokenRecord::new("access".into(), "refresh".into(), 3600)))
    }

    async fn get_user_info(&self) -> BackendResult<UserProfile> {
        self.count();
        Ok(self.profile.lock().unwrap().clone().unwrap_or(UserProfile {
            user_id: 0,
            username: String::new(),
        }))
    }

    async fn get_user_stats(&self, user_id: u64) -> BackendResult<Vec<Stat>> {
        self.count();
        *self.last_stats_user.lock().unwrap() = Some(user_id);
        Ok(self.stats.lock().unwrap().clone())
    }

    async fn update_user_stat(&self, stat_id: u64, value: StatUpdate) -> BackendResult<()> {
        self.count();
        *self.last_stat_update.lock().unwrap() = Some((stat_id, value));
        Ok(())
    }

    async fn delete_user_stats(&self) -> BackendResult<()> {
        self.count();
        Ok(())
    }

    async fn get_user_achievements(&self, _user_id: u64) -> BackendResult<AchievementList> {
        self.count();
        self.get_achievements_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.achievements.lock().unwrap().clone())
    }

    async fn set_user_achievement(
        &self,
        _achievement_id: u64,
        _unlock_time: u32,
    ) -> BackendResult<SetAchievementOutcome> {
        self.count();
        self.set_achievement_calls.fetch_add(1, Ordering::SeqCst);
        Ok(SetAchievementOutcome {
            already_unlocked: false,
        })
    }

    async fn delete_user_achievements(&self) -> BackendResult<()> {
        self.count();
        Ok(())
    }

    async fn get_leaderboards(&self) -> BackendResult<Vec<LeaderboardDef>> {
        self.count();
        Ok(self.leaderboards.lock().unwrap().clone())
    }

    async fn get_leaderboard_entries(
        &self,
        _leaderboard_id: u64,
        _selector: EntriesSelector,
    ) -> BackendResult<EntriesPage> {
        self.count();
        if let Some(err) = self.entries_failure.lock().unwrap().take() {
            return Err(err);
        }
        let items = self.entries.lock().unwrap().clone();
        let total = items.len() as u32;
        Ok(EntriesPage { items, total })
    }
}

/// A session context writing into one end of an in-memory duplex pipe.
/// The other end is returned so written frames can be inspected (and so
/// the pipe stays open for the context's lifetime).
pub fn test_context(
    backend: Arc<MockBackend>,
) -> (Arc<SessionContext<MockBackend>>, DuplexStream) {
    let (ours, theirs) = tokio::io::duplex(256 * 1024);
    let writer = Arc::new(FrameWriter::new(ours));
    let topics = Arc::new(TopicSet::new());
    let ctx = Arc::new(SessionContext::new(writer, backend, topics, 42));
    (ctx, theirs)
}
