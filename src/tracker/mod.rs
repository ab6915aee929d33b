//! Listening session tracking.
//!
//! Accumulates wall-clock time for the song currently playing and flushes
//! it as minutes into the listener's history when playback moves to another
//! song or stops. The tracker only writes history; it never reads it back.
//!
//! ```text
//!          start(a)            start(b): flush a
//!  Idle ──────────────► Tracking(a) ──────────────► Tracking(b)
//!   ▲                        │
//!   └──────── stop(): flush a┘
//! ```

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::Mutex;

use crate::model::{SongId, UserId};
use crate::store::{BestEffort, RemoteStore, StoreError};

/// Source of the current time.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Wall clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Tracker state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackerState {
    Idle,
    Tracking {
        song_id: SongId,
        started_at: DateTime<Utc>,
    },
}

/// What happened to the listening time of the song that just ended.
#[derive(Debug)]
pub enum FlushOutcome {
    /// Minutes were added to the listener's history
    Recorded { song_id: SongId, minutes: f64 },
    /// The interval was too short to record
    TooShort { song_id: SongId, minutes: f64 },
    /// The history write failed; the minutes are lost
    Failed {
        song_id: SongId,
        minutes: f64,
        error: StoreError,
    },
}

impl FlushOutcome {
    pub fn song_id(&self) -> SongId {
        match self {
            Self::Recorded { song_id, .. }
            | Self::TooShort { song_id, .. }
            | Self::Failed { song_id, .. } => *song_id,
        }
    }

    pub fn minutes(&self) -> f64 {
        match self {
            Self::Recorded { minutes, .. }
            | Self::TooShort { minutes, .. }
            | Self::Failed { minutes, .. } => *minutes,
        }
    }

    pub fn is_recorded(&self) -> bool {
        matches!(self, Self::Recorded { .. })
    }
}

/// Everything `start` did besides switching songs.
#[derive(Debug)]
pub struct StartReport {
    /// Flush of the previous song, if one was playing
    pub flushed: Option<FlushOutcome>,
    pub last_played: BestEffort,
    pub view_increment: BestEffort,
}

/// Minutes between two instants, rounded to two decimals.
pub fn elapsed_minutes(from: DateTime<Utc>, to: DateTime<Utc>) -> f64 {
    let millis = (to - from).num_milliseconds().max(0) as f64;
    (millis / 60_000.0 * 100.0).round() / 100.0
}

/// Per-user listening tracker.
pub struct ListeningSessionTracker {
    store: Arc<dyn RemoteStore>,
    clock: Arc<dyn Clock>,
    user: UserId,
    /// Intervals at or below this many minutes are not recorded
    min_flush_minutes: f64,
    state: Mutex<TrackerState>,
}

impl ListeningSessionTracker {
    pub const DEFAULT_MIN_FLUSH_MINUTES: f64 = 0.1;

    pub fn new(store: Arc<dyn RemoteStore>, clock: Arc<dyn Clock>, user: UserId) -> Self {
        Self {
            store,
            clock,
            user,
            min_flush_minutes: Self::DEFAULT_MIN_FLUSH_MINUTES,
            state: Mutex::new(TrackerState::Idle),
        }
    }

    pub fn with_min_flush_minutes(mut self, minutes: f64) -> Self {
        self.min_flush_minutes = minutes.max(0.0);
        self
    }

    pub fn user(&self) -> &UserId {
        &self.user
    }

    pub async fn state(&self) -> TrackerState {
        *self.state.lock().await
    }

    /// The song being tracked, if any.
    pub async fn current_song(&self) -> Option<SongId> {
        match *self.state.lock().await {
            TrackerState::Idle => None,
            TrackerState::Tracking { song_id, .. } => Some(song_id),
        }
    }

    /// Start tracking `song_id` from now.
    ///
    /// A song already being tracked is flushed first (restarting the same
    /// song flushes it too). The last-played pointer and the view counter are
    /// updated best-effort.
    pub async fn start(&self, song_id: SongId) -> StartReport {
        let mut state = self.state.lock().await;
        let now = self.clock.now();
        let previous = std::mem::replace(
            &mut *state,
            TrackerState::Tracking {
                song_id,
                started_at: now,
            },
        );

        let flushed = match previous {
            TrackerState::Idle => None,
            TrackerState::Tracking {
                song_id: previous,
                started_at,
            } => Some(self.flush(previous, started_at, now).await),
        };
        tracing::debug!(user_id = %self.user, song_id, "Tracking song");

        let last_played = BestEffort::log(
            "set_last_played",
            self.store.set_last_played(&self.user, song_id).await,
        );
        let view_increment = BestEffort::log(
            "increment_view_count",
            self.store.increment_view_count(song_id).await,
        );

        StartReport {
            flushed,
            last_played,
            view_increment,
        }
    }

    /// Stop tracking, flushing the current song. `None` when idle.
    pub async fn stop(&self) -> Option<FlushOutcome> {
        let mut state = self.state.lock().await;
        match std::mem::replace(&mut *state, TrackerState::Idle) {
            TrackerState::Idle => None,
            TrackerState::Tracking {
                song_id,
                started_at,
            } => {
                let now = self.clock.now();
                Some(self.flush(song_id, started_at, now).await)
            }
        }
    }

    async fn flush(
        &self,
        song_id: SongId,
        started_at: DateTime<Utc>,
        ended_at: DateTime<Utc>,
    ) -> FlushOutcome {
        let minutes = elapsed_minutes(started_at, ended_at);
        if minutes <= self.min_flush_minutes {
            tracing::debug!(song_id, minutes, "Listening interval too short to record");
            return FlushOutcome::TooShort { song_id, minutes };
        }

        match self
            .store
            .accumulate_minutes(&self.user, song_id, minutes)
            .await
        {
            Ok(()) => {
                tracing::debug!(user_id = %self.user, song_id, minutes, "Recorded listening time");
                FlushOutcome::Recorded { song_id, minutes }
            }
            Err(error) => {
                tracing::warn!(
                    user_id = %self.user,
                    song_id,
                    minutes,
                    error = %error,
                    "Failed to record listening time"
                );
                FlushOutcome::Failed {
                    song_id,
                    minutes,
                    error,
                }
            }
        }
    }
}

/// Mock clocks for testing.
#[cfg(test)]
pub mod mocks {
    use super::*;
    use parking_lot::Mutex;

    /// Clock that only moves when told to.
    pub struct ManualClock {
        now: Mutex<DateTime<Utc>>,
    }

    impl ManualClock {
        pub fn new() -> Self {
            Self {
                now: Mutex::new(DateTime::<Utc>::UNIX_EPOCH),
            }
        }

        pub fn advance(&self, by: chrono::Duration) {
            *self.now.lock() += by;
        }

        pub fn advance_secs(&self, secs: i64) {
            self.advance(chrono::Duration::seconds(secs));
        }
    }

    impl Clock for ManualClock {
        fn now(&self) -> DateTime<Utc> {
            *self.now.lock()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::mocks::ManualClock;
    use super::*;
    use crate::store::mocks::MemoryStore;
    use crate::test_utils::abc_catalog;

    fn tracker() -> (ListeningSessionTracker, Arc<MemoryStore>, Arc<ManualClock>) {
        let store = Arc::new(MemoryStore::with_songs(abc_catalog()));
        let clock = Arc::new(ManualClock::new());
        let tracker = ListeningSessionTracker::new(store.clone(), clock.clone(), UserId::new("u1"));
        (tracker, store, clock)
    }

    #[test]
    fn test_elapsed_minutes_rounds_to_two_decimals() {
        let t0 = DateTime::<Utc>::UNIX_EPOCH;
        assert_eq!(elapsed_minutes(t0, t0 + chrono::Duration::seconds(90)), 1.5);
        assert_eq!(elapsed_minutes(t0, t0 + chrono::Duration::seconds(100)), 1.67);
        assert_eq!(elapsed_minutes(t0, t0 - chrono::Duration::seconds(5)), 0.0);
    }

    #[tokio::test]
    async fn test_switching_songs_flushes_previous_once() {
        let (tracker, store, clock) = tracker();
        let user = UserId::new("u1");

        let report = tracker.start(1).await;
        assert!(report.flushed.is_none());
        clock.advance_secs(150);

        let report = tracker.start(2).await;
        let flushed = report.flushed.unwrap();
        assert!(flushed.is_recorded());
        assert_eq!(flushed.song_id(), 1);
        assert_eq!(flushed.minutes(), 2.5);

        assert_eq!(store.history_minutes(&user, 1), Some(2.5));
        assert_eq!(store.history_len(), 1);
        assert_eq!(tracker.current_song().await, Some(2));
    }

    #[tokio::test]
    async fn test_short_interval_flushes_nothing() {
        let (tracker, store, clock) = tracker();

        let _ = tracker.start(1).await;
        clock.advance_secs(5);
        let outcome = tracker.stop().await.unwrap();

        assert!(matches!(outcome, FlushOutcome::TooShort { song_id: 1, .. }));
        assert_eq!(store.history_len(), 0);
        assert_eq!(tracker.state().await, TrackerState::Idle);
    }

    #[tokio::test]
    async fn test_exactly_threshold_is_not_recorded() {
        let (tracker, store, clock) = tracker();

        let _ = tracker.start(1).await;
        clock.advance_secs(6);
        assert!(!tracker.stop().await.unwrap().is_recorded());
        assert_eq!(store.history_len(), 0);

        let _ = tracker.start(1).await;
        clock.advance_secs(7);
        assert!(tracker.stop().await.unwrap().is_recorded());
    }

    #[tokio::test]
    async fn test_threshold_compares_rounded_minutes() {
        let (tracker, store, clock) = tracker();
        let user = UserId::new("u1");

        // 0.104 minutes rounds down to 0.10
        let _ = tracker.start(1).await;
        clock.advance(chrono::Duration::milliseconds(6_240));
        assert!(matches!(
            tracker.stop().await,
            Some(FlushOutcome::TooShort { minutes, .. }) if minutes == 0.1
        ));
        assert_eq!(store.history_len(), 0);

        // 0.106 minutes rounds up to 0.11
        let _ = tracker.start(1).await;
        clock.advance(chrono::Duration::milliseconds(6_360));
        assert!(tracker.stop().await.unwrap().is_recorded());
        assert_eq!(store.history_minutes(&user, 1), Some(0.11));
    }

    #[tokio::test]
    async fn test_minutes_accumulate_across_sessions() {
        let (tracker, store, clock) = tracker();
        let user = UserId::new("u1");

        let _ = tracker.start(1).await;
        clock.advance_secs(60);
        let _ = tracker.stop().await;
        let _ = tracker.start(1).await;
        clock.advance_secs(30);
        let _ = tracker.stop().await;

        assert_eq!(store.history_minutes(&user, 1), Some(1.5));
    }

    #[tokio::test]
    async fn test_stop_when_idle() {
        let (tracker, _store, _clock) = tracker();
        assert!(tracker.stop().await.is_none());
    }

    #[tokio::test]
    async fn test_start_updates_last_played_and_views() {
        let (tracker, store, _clock) = tracker();
        let user = UserId::new("u1");

        let report = tracker.start(2).await;
        assert!(report.last_played.is_applied());
        assert!(report.view_increment.is_applied());
        assert_eq!(store.user(&user).unwrap().last_song_id, Some(2));
        assert_eq!(store.song(2).unwrap().views, 6);
    }

    #[tokio::test]
    async fn test_write_failures_do_not_stop_tracking() {
        let (tracker, store, clock) = tracker();

        let _ = tracker.start(1).await;
        clock.advance_secs(120);
        store.set_fail_writes(true);

        let report = tracker.start(2).await;
        assert!(matches!(
            report.flushed,
            Some(FlushOutcome::Failed { song_id: 1, .. })
        ));
        assert!(!report.last_played.is_applied());
        assert!(!report.view_increment.is_applied());
        assert_eq!(tracker.current_song().await, Some(2));
    }

    #[tokio::test]
    async fn test_custom_threshold() {
        let (tracker, store, clock) = tracker();
        let tracker = tracker.with_min_flush_minutes(1.0);

        let _ = tracker.start(1).await;
        clock.advance_secs(45);
        assert!(!tracker.stop().await.unwrap().is_recorded());
        assert_eq!(store.history_len(), 0);
    }
}
