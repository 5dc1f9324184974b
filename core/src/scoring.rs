use core::future::Future;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use web_time::Duration;

use crate::*;

/// Number of entries requested from the score board.
pub const LEADERBOARD_LIMIT: usize = 10;

/// Number of ranked rows shown before the player's own rank gets a separate card.
pub const LEADERBOARD_VISIBLE_ROWS: usize = 5;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RemoteError {
    #[error("Score board is not configured")]
    NotConfigured,
    #[error("Request failed: {0}")]
    Transport(String),
    #[error("Unexpected status {0}")]
    Status(u16),
    #[error("Malformed response: {0}")]
    Decode(String),
}

/// Outcome of a best-effort remote read.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Remote<T> {
    Ready(T),
    Unavailable,
}

impl<T, E: core::fmt::Display> From<core::result::Result<T, E>> for Remote<T> {
    fn from(result: core::result::Result<T, E>) -> Self {
        match result {
            Ok(value) => Self::Ready(value),
            Err(err) => {
                log::warn!("remote read failed: {}", err);
                Self::Unavailable
            }
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LeaderboardEntry {
    pub username: String,
    #[serde(rename = "best_time")]
    pub best_time_secs: f64,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct RemoteBest {
    #[serde(rename = "best_time", default)]
    pub best_time_secs: Option<f64>,
}

impl RemoteBest {
    pub fn best_time(&self) -> Option<Duration> {
        self.best_time_secs
            .filter(|secs| *secs >= 0.0)
            .and_then(|secs| Duration::try_from_secs_f64(secs).ok())
    }
}

/// Remote leaderboard and personal-best service.
pub trait ScoreBoard {
    /// Best entries for `variant`, fastest first.
    fn leaderboard(
        &self,
        variant: Variant,
        limit: usize,
    ) -> impl Future<Output = core::result::Result<Vec<LeaderboardEntry>, RemoteError>>;

    fn personal_best(
        &self,
        variant: Variant,
        username: &str,
    ) -> impl Future<Output = core::result::Result<Option<RemoteBest>, RemoteError>>;
}

/// Local per-variant personal best, kept as a monotonic minimum.
#[derive(Clone, Debug)]
pub struct PersonalBestCache<S> {
    storage: S,
}

impl<S: KeyValueStore> PersonalBestCache<S> {
    pub fn new(storage: S) -> Self {
        Self { storage }
    }

    pub fn storage_key(variant: Variant) -> String {
        format!("{PERSONAL_BEST_KEY_PREFIX}_{variant}")
    }

    pub fn cached(&self, variant: Variant) -> Option<Duration> {
        let raw = self.storage.get(&Self::storage_key(variant))?;
        match raw.trim().parse::<f64>() {
            Ok(ms) if ms.is_finite() && ms >= 0.0 => Some(Duration::from_micros((ms * 1000.0).round() as u64)),
            _ => {
                log::warn!("ignoring malformed personal best {:?}", raw);
                None
            }
        }
    }

    /// Stores `duration` if it beats the cached best. Returns whether it did.
    pub fn record_completion(&mut self, variant: Variant, duration: Duration) -> bool {
        let duration = stored_precision(duration);
        let is_best = self.cached(variant).is_none_or(|best| duration < best);
        if is_best {
            self.store(variant, duration);
            log::debug!("new personal best for {}: {:?}", variant, duration);
        }
        is_best
    }

    /// Folds a remote best into the cache. A failed read keeps the cache untouched.
    pub fn prime(&mut self, variant: Variant, remote: Remote<Option<RemoteBest>>) -> Remote<Option<Duration>> {
        let Remote::Ready(remote) = remote else {
            log::warn!("personal best for {} unavailable, keeping cached value", variant);
            return Remote::Unavailable;
        };

        if let Some(remote_best) = remote.as_ref().and_then(RemoteBest::best_time).map(stored_precision) {
            if self.cached(variant).is_none_or(|cached| remote_best < cached) {
                log::debug!("personal best for {} primed from remote: {:?}", variant, remote_best);
                self.store(variant, remote_best);
            }
        }

        Remote::Ready(self.cached(variant))
    }

    fn store(&self, variant: Variant, duration: Duration) {
        self.storage
            .set(&Self::storage_key(variant), &(duration.as_micros() as f64 / 1000.0).to_string());
    }
}

/// The cache keeps fractional milliseconds down to the microsecond.
fn stored_precision(duration: Duration) -> Duration {
    Duration::from_micros(u64::try_from(duration.as_micros()).unwrap_or(u64::MAX))
}

pub async fn fetch_personal_best<B: ScoreBoard>(
    board: &B,
    variant: Variant,
    username: &str,
) -> Remote<Option<RemoteBest>> {
    board.personal_best(variant, username).await.into()
}

/// Reads the remote best for `identity` and folds it into `cache`.
pub async fn prime_personal_best<B: ScoreBoard, S: KeyValueStore>(
    cache: &mut PersonalBestCache<S>,
    board: &B,
    variant: Variant,
    identity: &Identity,
) -> Remote<Option<Duration>> {
    let fetched = fetch_personal_best(board, variant, &identity.username).await;
    cache.prime(variant, fetched)
}

#[derive(Clone, Debug, PartialEq)]
pub struct Standing {
    pub rank: usize,
    pub username: String,
    pub best_time_secs: f64,
    pub is_current_user: bool,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Standings {
    pub rows: Vec<Standing>,
    /// The player's own entry when it ranks below the visible rows.
    pub user_card: Option<Standing>,
}

impl Standings {
    pub fn build(entries: &[LeaderboardEntry], username: Option<&str>) -> Self {
        let standing = |index: usize, entry: &LeaderboardEntry| Standing {
            rank: index + 1,
            username: entry.username.clone(),
            best_time_secs: entry.best_time_secs,
            is_current_user: username == Some(entry.username.as_str()),
        };

        let rows = entries
            .iter()
            .take(LEADERBOARD_VISIBLE_ROWS)
            .enumerate()
            .map(|(index, entry)| standing(index, entry))
            .collect();
        let user_card = entries
            .iter()
            .enumerate()
            .skip(LEADERBOARD_VISIBLE_ROWS)
            .find(|(_, entry)| username == Some(entry.username.as_str()))
            .map(|(index, entry)| standing(index, entry));

        Self { rows, user_card }
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
pub enum LeaderboardState {
    #[default]
    Loading,
    /// The board answered but nobody finished a run yet.
    Empty,
    Ranked(Standings),
    /// The board could not be reached, shown as a loading placeholder.
    Unavailable,
}

impl LeaderboardState {
    pub fn from_remote(remote: Remote<Vec<LeaderboardEntry>>, username: Option<&str>) -> Self {
        match remote {
            Remote::Ready(entries) if entries.is_empty() => Self::Empty,
            Remote::Ready(entries) => Self::Ranked(Standings::build(&entries, username)),
            Remote::Unavailable => Self::Unavailable,
        }
    }
}

pub async fn refresh_leaderboard<B: ScoreBoard>(
    board: &B,
    variant: Variant,
    username: Option<&str>,
) -> LeaderboardState {
    let remote = board.leaderboard(variant, LEADERBOARD_LIMIT).await.into();
    LeaderboardState::from_remote(remote, username)
}


#[cfg(test)]
mod tests {
    use futures_util::FutureExt;

    use super::testing::FakeBoard;
    use super::*;

    fn ms(millis: u64) -> Duration {
        Duration::from_millis(millis)
    }

    fn identity() -> Identity {
        Identity {
            user_id: "user_abc".to_string(),
            username: "Player 7".to_string(),
        }
    }

    fn entries(names: &[&str]) -> Vec<LeaderboardEntry> {
        names
            .iter()
            .enumerate()
            .map(|(i, name)| LeaderboardEntry {
                username: name.to_string(),
                best_time_secs: 10.0 + i as f64,
            })
            .collect()
    }

    #[test]
    fn first_completion_is_a_personal_best() {
        let store = MemoryStore::new();
        let mut cache = PersonalBestCache::new(&store);

        assert!(cache.record_completion(Variant::A, ms(12_345)));
        assert_eq!(cache.cached(Variant::A), Some(ms(12_345)));
        assert_eq!(store.get("ab_sim_pb_ms_A").as_deref(), Some("12345"));
        assert_eq!(cache.cached(Variant::B), None);
    }

    #[test]
    fn cache_keeps_the_minimum_of_every_sequence() {
        let store = MemoryStore::new();
        let mut cache = PersonalBestCache::new(&store);
        let durations = [30_000, 25_000, 40_000, 25_000, 12_000, 59_999, 12_001];

        let mut best: Option<u64> = None;
        for millis in durations {
            let expected = best.is_none_or(|best| millis < best);
            assert_eq!(cache.record_completion(Variant::B, ms(millis)), expected);
            best = Some(best.map_or(millis, |best| best.min(millis)));
            assert_eq!(cache.cached(Variant::B), best.map(ms));
        }
    }

    #[test]
    fn malformed_cache_is_treated_as_absent() {
        let store = MemoryStore::new();
        store.set("ab_sim_pb_ms_A", "soon");
        let mut cache = PersonalBestCache::new(&store);

        assert_eq!(cache.cached(Variant::A), None);
        assert!(cache.record_completion(Variant::A, ms(50_000)));
    }

    #[test]
    fn prime_takes_a_better_remote_best() {
        let store = MemoryStore::new();
        let mut cache = PersonalBestCache::new(&store);
        cache.record_completion(Variant::A, ms(20_000));

        let board = FakeBoard::with_best(15.5);
        let primed = prime_personal_best(&mut cache, &board, Variant::A, &identity())
            .now_or_never()
            .unwrap();

        assert_eq!(primed, Remote::Ready(Some(ms(15_500))));
        assert_eq!(cache.cached(Variant::A), Some(ms(15_500)));
    }

    #[test]
    fn prime_never_raises_the_cached_best() {
        let store = MemoryStore::new();
        let mut cache = PersonalBestCache::new(&store);
        cache.record_completion(Variant::A, ms(9_000));

        let board = FakeBoard::with_best(30.0);
        let primed = prime_personal_best(&mut cache, &board, Variant::A, &identity())
            .now_or_never()
            .unwrap();

        assert_eq!(primed, Remote::Ready(Some(ms(9_000))));
    }

    #[test]
    fn prime_failure_keeps_cache_and_reports_unavailable() {
        let store = MemoryStore::new();
        let mut cache = PersonalBestCache::new(&store);
        cache.record_completion(Variant::B, ms(33_000));

        let board = FakeBoard::failing();
        let primed = prime_personal_best(&mut cache, &board, Variant::B, &identity())
            .now_or_never()
            .unwrap();

        assert_eq!(primed, Remote::Unavailable);
        assert_eq!(cache.cached(Variant::B), Some(ms(33_000)));
    }

    #[test]
    fn prime_without_any_best_stays_empty() {
        let store = MemoryStore::new();
        let mut cache = PersonalBestCache::new(&store);

        let board = FakeBoard::new();
        let primed = prime_personal_best(&mut cache, &board, Variant::A, &identity())
            .now_or_never()
            .unwrap();

        assert_eq!(primed, Remote::Ready(None));
        assert!(store.is_empty());
    }

    #[test]
    fn leaderboard_distinguishes_empty_from_unavailable() {
        let board = FakeBoard::new();
        let empty = refresh_leaderboard(&board, Variant::A, None)
            .now_or_never()
            .unwrap();
        assert_eq!(empty, LeaderboardState::Empty);
        assert_eq!(board.requested_limit.get(), Some(LEADERBOARD_LIMIT));

        let unavailable = refresh_leaderboard(&FakeBoard::failing(), Variant::A, None)
            .now_or_never()
            .unwrap();
        assert_eq!(unavailable, LeaderboardState::Unavailable);
    }

    #[test]
    fn standings_highlight_the_player_in_the_top_rows() {
        let board = FakeBoard::new();
        *board.entries.borrow_mut() = Ok(entries(&["ada", "bob", "cy"]));

        let state = refresh_leaderboard(&board, Variant::B, Some("bob"))
            .now_or_never()
            .unwrap();

        let LeaderboardState::Ranked(standings) = state else {
            panic!("expected ranked standings");
        };
        assert_eq!(standings.rows.len(), 3);
        assert!(standings.rows[1].is_current_user);
        assert_eq!(standings.rows[1].rank, 2);
        assert_eq!(standings.user_card, None);
    }

    #[test]
    fn standings_add_a_card_for_a_player_below_the_fold() {
        let all = entries(&["a", "b", "c", "d", "e", "f", "me", "h"]);

        let standings = Standings::build(&all, Some("me"));

        assert_eq!(standings.rows.len(), LEADERBOARD_VISIBLE_ROWS);
        assert!(standings.rows.iter().all(|row| !row.is_current_user));
        let card = standings.user_card.unwrap();
        assert_eq!(card.rank, 7);
        assert_eq!(card.username, "me");
        assert!(card.is_current_user);
    }

    #[test]
    fn remote_best_rejects_nonsense_times() {
        let negative = RemoteBest {
            best_time_secs: Some(-1.0),
        };
        let missing = RemoteBest::default();
        assert_eq!(negative.best_time(), None);
        assert_eq!(missing.best_time(), None);
    }

    #[test]
    fn remote_best_out_of_range_is_ignored() {
        let huge: RemoteBest = serde_json::from_str(r#"{"best_time": 1e30}"#).unwrap();
        assert_eq!(huge.best_time(), None);

        let store = MemoryStore::new();
        let mut cache = PersonalBestCache::new(&store);
        cache.record_completion(Variant::A, ms(20_000));
        let primed = cache.prime(Variant::A, Remote::Ready(Some(huge)));
        assert_eq!(primed, Remote::Ready(Some(ms(20_000))));
    }

    #[test]
    fn sub_millisecond_improvement_is_a_personal_best() {
        let store = MemoryStore::new();
        let mut cache = PersonalBestCache::new(&store);
        let first = ms(12_345) + Duration::from_micros(600);
        let faster = ms(12_345) + Duration::from_micros(200);

        assert!(cache.record_completion(Variant::A, first));
        assert_eq!(store.get("ab_sim_pb_ms_A").as_deref(), Some("12345.6"));
        assert!(cache.record_completion(Variant::A, faster));
        assert_eq!(cache.cached(Variant::A), Some(faster));
        assert!(!cache.record_completion(Variant::A, first));
    }

    #[test]
    fn remote_best_parses_wire_format() {
        let best: RemoteBest = serde_json::from_str(r#"{"best_time": 12.5}"#).unwrap();
        assert_eq!(best.best_time(), Some(ms(12_500)));
        let null: RemoteBest = serde_json::from_str(r#"{"best_time": null}"#).unwrap();
        assert_eq!(null.best_time(), None);
    }
}
