//! Remote broadcast lifecycle.
//!
//! Identity of a broadcast is the `YYYY/MM/DD` date token embedded in its
//! title; nothing else on the remote side is consulted to decide whether a
//! day's broadcast already exists.

mod youtube;

pub use youtube::{YouTubeClient, YOUTUBE_API_BASE};

use crate::config::{BroadcastConfig, PrivacyStatus};
use crate::error::{RctError, Result};
use chrono::{DateTime, Duration, NaiveDate, NaiveTime, TimeZone, Utc};
use chrono_tz::Tz;
use serde::Serialize;
use tracing::{info, warn};

/// Go-live broadcasts are scheduled this far ahead of the moment they are
/// created.
const GO_LIVE_LEAD_MINUTES: i64 = 1;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LifecycleState {
    Upcoming,
    Bound,
    Live,
    Ended,
    Deleted,
}

impl LifecycleState {
    /// Map the platform's `lifeCycleStatus` onto the local state set.
    pub fn from_remote(status: &str) -> Self {
        match status {
            "ready" | "testStarting" | "testing" => LifecycleState::Bound,
            "liveStarting" | "live" => LifecycleState::Live,
            "complete" | "revoked" => LifecycleState::Ended,
            _ => LifecycleState::Upcoming,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Broadcast {
    pub id: String,
    pub title: String,
    pub scheduled_start: Option<DateTime<Utc>>,
    pub privacy: Option<PrivacyStatus>,
    pub state: LifecycleState,
}

impl Broadcast {
    pub fn is_dated(&self, date: NaiveDate) -> bool {
        self.title.contains(&date_token(date))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Stream {
    pub id: String,
    pub ingestion_key: String,
    pub ingestion_server_url: String,
}

/// Remote platform operations. No implementation retries internally.
pub trait BroadcastPlatform {
    /// Upcoming broadcasts, capped at one page of 20.
    fn list_upcoming(&self) -> Result<Vec<Broadcast>>;
    fn create_broadcast(
        &self,
        title: &str,
        description: &str,
        start: DateTime<Utc>,
        privacy: PrivacyStatus,
    ) -> Result<Broadcast>;
    fn create_stream(&self, label: &str) -> Result<Stream>;
    fn bind(&self, broadcast_id: &str, stream_id: &str) -> Result<()>;
    fn update_broadcast(&self, id: &str, title: &str, start: DateTime<Utc>) -> Result<()>;
    fn delete_broadcast(&self, id: &str) -> Result<()>;

    fn find_upcoming_by_date(&self, date: NaiveDate) -> Result<Option<Broadcast>> {
        Ok(self
            .list_upcoming()?
            .into_iter()
            .find(|b| b.is_dated(date)))
    }
}

// ---------------------------------------------------------------------------
// Title / time helpers
// ---------------------------------------------------------------------------

pub fn date_token(date: NaiveDate) -> String {
    date.format("%Y/%m/%d").to_string()
}

/// `"{prefix} (YYYY/MM/DD HH:MM)"`
pub fn broadcast_title(prefix: &str, date: NaiveDate, start: NaiveTime) -> String {
    format!("{prefix} ({} {})", date_token(date), start.format("%H:%M"))
}

/// Convert a local wall-clock time on `date` to UTC. Fails for times that do
/// not exist in `tz` (spring-forward gaps).
pub fn local_to_utc(date: NaiveDate, time: NaiveTime, tz: &Tz) -> Result<DateTime<Utc>> {
    tz.from_local_datetime(&date.and_time(time))
        .earliest()
        .map(|dt| dt.with_timezone(&Utc))
        .ok_or_else(|| {
            RctError::InvalidConfig(format!(
                "{date} {} does not exist in {tz}",
                time.format("%H:%M")
            ))
        })
}

// ---------------------------------------------------------------------------
// LifecycleManager
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LiveTarget {
    pub broadcast: Broadcast,
    pub stream: Stream,
    pub reused: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GoDarkOutcome {
    pub deleted: Vec<String>,
    pub tomorrow: Broadcast,
    pub created: bool,
}

pub struct LifecycleManager<'a, P: BroadcastPlatform> {
    platform: P,
    broadcast: &'a BroadcastConfig,
    start_time: NaiveTime,
    timezone: Tz,
}

impl<'a, P: BroadcastPlatform> LifecycleManager<'a, P> {
    pub fn new(platform: P, broadcast: &'a BroadcastConfig, start_time: NaiveTime, timezone: Tz) -> Self {
        Self {
            platform,
            broadcast,
            start_time,
            timezone,
        }
    }

    fn title_for(&self, date: NaiveDate) -> String {
        broadcast_title(&self.broadcast.title, date, self.start_time)
    }

    /// Reuse the day's upcoming broadcast or create one a minute out, then
    /// bind a brand-new stream to it.
    pub fn go_live(&self, date: NaiveDate, now: DateTime<Utc>) -> Result<LiveTarget> {
        let (broadcast, reused) = match self.platform.find_upcoming_by_date(date)? {
            Some(existing) => {
                info!(id = %existing.id, title = %existing.title, "reusing upcoming broadcast");
                (existing, true)
            }
            None => {
                let start = now + Duration::minutes(GO_LIVE_LEAD_MINUTES);
                let created = self.platform.create_broadcast(
                    &self.title_for(date),
                    &self.broadcast.description,
                    start,
                    self.broadcast.privacy,
                )?;
                info!(id = %created.id, "created broadcast for {}", date_token(date));
                (created, false)
            }
        };

        let label = format!("{} stream", self.title_for(date));
        let stream = self.platform.create_stream(&label)?;
        self.platform.bind(&broadcast.id, &stream.id)?;
        info!(broadcast = %broadcast.id, stream = %stream.id, "bound stream to broadcast");

        Ok(LiveTarget {
            broadcast: Broadcast {
                state: LifecycleState::Bound,
                ..broadcast
            },
            stream,
            reused,
        })
    }

    /// Delete leftovers dated `today`, then make sure exactly one upcoming
    /// broadcast exists for tomorrow at the configured local start time.
    pub fn go_dark(&self, today: NaiveDate) -> Result<GoDarkOutcome> {
        let upcoming = self.platform.list_upcoming()?;

        let mut deleted = Vec::new();
        for leftover in upcoming.iter().filter(|b| b.is_dated(today)) {
            warn!(id = %leftover.id, title = %leftover.title, "deleting leftover broadcast for today");
            self.platform.delete_broadcast(&leftover.id)?;
            deleted.push(leftover.id.clone());
        }

        let tomorrow = today
            .succ_opt()
            .ok_or_else(|| RctError::InvalidConfig(format!("no day after {today}")))?;
        let mut scheduled = upcoming.iter().filter(|b| b.is_dated(tomorrow));
        if let Some(existing) = scheduled.next() {
            info!(id = %existing.id, "broadcast for tomorrow already scheduled");
            for duplicate in scheduled {
                warn!(id = %duplicate.id, title = %duplicate.title, "deleting duplicate broadcast for tomorrow");
                self.platform.delete_broadcast(&duplicate.id)?;
                deleted.push(duplicate.id.clone());
            }
            return Ok(GoDarkOutcome {
                deleted,
                tomorrow: existing.clone(),
                created: false,
            });
        }

        let start = local_to_utc(tomorrow, self.start_time, &self.timezone)?;
        let created = self.platform.create_broadcast(
            &self.title_for(tomorrow),
            &self.broadcast.description,
            start,
            self.broadcast.privacy,
        )?;
        info!(id = %created.id, start = %start.to_rfc3339(), "scheduled tomorrow's broadcast");
        Ok(GoDarkOutcome {
            deleted,
            tomorrow: created,
            created: true,
        })
    }

    /// Re-title and re-time every upcoming broadcast dated on one of `dates`
    /// to the configured start time. Returns the ids that were updated;
    /// individual update failures are logged and skipped.
    pub fn fix_schedule(&self, dates: &[NaiveDate]) -> Result<Vec<String>> {
        let upcoming = self.platform.list_upcoming()?;
        let mut updated = Vec::new();
        for &date in dates {
            let start = local_to_utc(date, self.start_time, &self.timezone)?;
            let title = self.title_for(date);
            for b in upcoming.iter().filter(|b| b.is_dated(date)) {
                match self.platform.update_broadcast(&b.id, &title, start) {
                    Ok(()) => {
                        info!(id = %b.id, %title, "updated broadcast schedule");
                        updated.push(b.id.clone());
                    }
                    Err(e) => warn!(id = %b.id, "failed to update broadcast: {e}"),
                }
            }
        }
        Ok(updated)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{broadcast_config, FakePlatform};
    use chrono::TimeZone;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    fn seven() -> NaiveTime {
        NaiveTime::from_hms_opt(7, 0, 0).unwrap()
    }

    fn manager<'a>(
        platform: FakePlatform,
        cfg: &'a BroadcastConfig,
    ) -> LifecycleManager<'a, FakePlatform> {
        LifecycleManager::new(platform, cfg, seven(), chrono_tz::Asia::Tokyo)
    }

    #[test]
    fn title_embeds_date_token_and_start() {
        assert_eq!(
            broadcast_title("Morning", d(2025, 6, 1), seven()),
            "Morning (2025/06/01 07:00)"
        );
    }

    #[test]
    fn local_start_converts_to_utc() {
        let utc = local_to_utc(d(2026, 1, 6), seven(), &chrono_tz::Asia::Tokyo).unwrap();
        assert_eq!(utc, Utc.with_ymd_and_hms(2026, 1, 5, 22, 0, 0).unwrap());
    }

    #[test]
    fn nonexistent_local_time_is_rejected() {
        let gap = NaiveTime::from_hms_opt(2, 30, 0).unwrap();
        assert!(local_to_utc(d(2025, 3, 9), gap, &chrono_tz::America::New_York).is_err());
    }

    #[test]
    fn lifecycle_state_mapping() {
        assert_eq!(LifecycleState::from_remote("created"), LifecycleState::Upcoming);
        assert_eq!(LifecycleState::from_remote("ready"), LifecycleState::Bound);
        assert_eq!(LifecycleState::from_remote("live"), LifecycleState::Live);
        assert_eq!(LifecycleState::from_remote("complete"), LifecycleState::Ended);
    }

    #[test]
    fn go_live_creates_when_absent_and_binds_fresh_stream() {
        let cfg = broadcast_config();
        let platform = FakePlatform::default();
        let now = Utc.with_ymd_and_hms(2025, 5, 31, 21, 59, 0).unwrap();
        let target = manager(platform.clone(), &cfg).go_live(d(2025, 6, 1), now).unwrap();

        assert!(!target.reused);
        assert_eq!(target.broadcast.state, LifecycleState::Bound);
        assert!(target.broadcast.title.contains("2025/06/01"));
        assert_eq!(
            target.broadcast.scheduled_start,
            Some(now + Duration::minutes(1))
        );
        assert_eq!(
            platform.bindings(),
            vec![(target.broadcast.id.clone(), target.stream.id.clone())]
        );
    }

    #[test]
    fn go_live_reuses_existing_broadcast() {
        let cfg = broadcast_config();
        let platform = FakePlatform::default();
        platform.seed("Radio Calisthenics Together (2025/06/01 07:00)");
        let now = Utc.with_ymd_and_hms(2025, 5, 31, 21, 59, 0).unwrap();
        let mgr = manager(platform.clone(), &cfg);

        let first = mgr.go_live(d(2025, 6, 1), now).unwrap();
        let second = mgr.go_live(d(2025, 6, 1), now).unwrap();

        assert!(first.reused && second.reused);
        assert_eq!(first.broadcast.id, second.broadcast.id);
        assert_eq!(platform.upcoming_for(d(2025, 6, 1)).len(), 1);
        // Streams are never reused.
        assert_ne!(first.stream.id, second.stream.id);
    }

    #[test]
    fn go_dark_leaves_exactly_one_broadcast_for_tomorrow() {
        let cfg = broadcast_config();
        for today in [d(2025, 6, 1), d(2025, 12, 31), d(2028, 2, 28)] {
            let platform = FakePlatform::default();
            platform.seed(&broadcast_title("Radio Calisthenics Together", today, seven()));
            let mgr = manager(platform.clone(), &cfg);

            let outcome = mgr.go_dark(today).unwrap();
            let tomorrow = today.succ_opt().unwrap();

            assert_eq!(outcome.deleted.len(), 1);
            assert!(outcome.created);
            assert!(platform.find_upcoming_by_date(today).unwrap().is_none());
            assert_eq!(platform.upcoming_for(tomorrow).len(), 1);
            assert_eq!(
                outcome.tomorrow.scheduled_start,
                Some(local_to_utc(tomorrow, seven(), &chrono_tz::Asia::Tokyo).unwrap())
            );
        }
    }

    #[test]
    fn repeated_go_dark_is_idempotent() {
        let cfg = broadcast_config();
        let platform = FakePlatform::default();
        let mgr = manager(platform.clone(), &cfg);
        let today = d(2025, 6, 1);

        let first = mgr.go_dark(today).unwrap();
        let second = mgr.go_dark(today).unwrap();

        assert!(first.created);
        assert!(!second.created);
        assert_eq!(first.tomorrow.id, second.tomorrow.id);
        assert_eq!(platform.upcoming_for(d(2025, 6, 2)).len(), 1);
        assert_eq!(platform.count("create_broadcast"), 1);
    }

    #[test]
    fn go_dark_prunes_duplicate_broadcasts_for_tomorrow() {
        let cfg = broadcast_config();
        let platform = FakePlatform::default();
        let title = "Radio Calisthenics Together (2025/06/02 07:00)";
        let keep = platform.seed(title);
        let extra = platform.seed(title);

        let outcome = manager(platform.clone(), &cfg).go_dark(d(2025, 6, 1)).unwrap();

        assert!(!outcome.created);
        assert_eq!(outcome.tomorrow.id, keep);
        assert_eq!(outcome.deleted, vec![extra]);
        assert_eq!(platform.upcoming_for(d(2025, 6, 2)).len(), 1);
        assert_eq!(platform.count("create_broadcast"), 0);
    }

    #[test]
    fn go_dark_propagates_remote_errors() {
        let cfg = broadcast_config();
        let platform = FakePlatform::default().fail_on("list_upcoming");
        let err = manager(platform, &cfg).go_dark(d(2025, 6, 1)).unwrap_err();
        assert!(matches!(err, RctError::RemoteApi { .. }));
    }

    #[test]
    fn fix_schedule_retimes_matching_broadcasts() {
        let cfg = broadcast_config();
        let platform = FakePlatform::default();
        let today = platform.seed("Radio Calisthenics Together (2025/06/01 06:30)");
        let tomorrow = platform.seed("Radio Calisthenics Together (2025/06/02 06:30)");
        platform.seed("Something else (2025/06/09 06:30)");

        let updated = manager(platform.clone(), &cfg)
            .fix_schedule(&[d(2025, 6, 1), d(2025, 6, 2)])
            .unwrap();
        assert_eq!(updated, vec![today.clone(), tomorrow]);

        let b = platform.get(&today).unwrap();
        assert_eq!(b.title, "Radio Calisthenics Together (2025/06/01 07:00)");
        assert_eq!(
            b.scheduled_start,
            Some(Utc.with_ymd_and_hms(2025, 5, 31, 22, 0, 0).unwrap())
        );
    }
}
