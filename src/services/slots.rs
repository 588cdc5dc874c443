// Publication slot table: a fixed list of daily wall-clock slots in the
// display offset, interpreted fresh each day. The same tolerance window
// answers both "is this slot taken" and "is it time to fire".

use chrono::{DateTime, Duration, FixedOffset, NaiveDate, NaiveTime, TimeZone, Utc};
use diesel_async::AsyncPgConnection;

use crate::app_config::SchedulingConfig;
use crate::models::Post;

#[derive(Debug, Clone)]
pub struct SlotTable {
    slots: Vec<(u32, u32)>,
    offset: FixedOffset,
    tolerance: Duration,
}

impl SlotTable {
    pub fn new(slots: Vec<(u32, u32)>, offset: FixedOffset, tolerance: std::time::Duration) -> Self {
        let mut slots = slots;
        slots.sort_unstable();
        Self {
            slots,
            offset,
            tolerance: Duration::from_std(tolerance).unwrap_or_else(|_| Duration::seconds(10)),
        }
    }

    pub fn from_config(config: &SchedulingConfig) -> Self {
        Self::new(
            config.slots.clone(),
            config.display_offset(),
            config.tolerance,
        )
    }

    pub fn tolerance(&self) -> Duration {
        self.tolerance
    }

    /// UTC instants of every configured slot on a given local date.
    fn slot_times_for_day(&self, date: NaiveDate) -> Vec<DateTime<Utc>> {
        self.slots
            .iter()
            .filter_map(|&(hour, minute)| {
                let time = NaiveTime::from_hms_opt(hour, minute, 0)?;
                self.offset
                    .from_local_datetime(&date.and_time(time))
                    .single()
                    .map(|dt| dt.with_timezone(&Utc))
            })
            .collect()
    }

    /// Next `count` free slots strictly after `now`, ascending. A slot is
    /// occupied when any existing publish timestamp falls within the
    /// tolerance window around it. Walks forward day-by-day until enough
    /// slots are found; no reservation is made, so two concurrent callers
    /// may be offered the same slot (accepted race).
    pub fn upcoming_free_slots(
        &self,
        now: DateTime<Utc>,
        occupied: &[DateTime<Utc>],
        count: usize,
    ) -> Vec<DateTime<Utc>> {
        let mut free = Vec::with_capacity(count);
        if count == 0 || self.slots.is_empty() {
            return free;
        }

        let mut day = now.with_timezone(&self.offset).date_naive();
        while free.len() < count {
            for slot_time in self.slot_times_for_day(day) {
                if free.len() == count {
                    break;
                }
                if slot_time <= now {
                    continue;
                }
                let taken = occupied
                    .iter()
                    .any(|&t| (slot_time - t).abs() <= self.tolerance);
                if !taken {
                    free.push(slot_time);
                }
            }
            day = match day.succ_opt() {
                Some(next) => next,
                None => break,
            };
        }
        free
    }

    /// The configured slot that `now` coincides with (within tolerance),
    /// if any. Checks adjacent days so slots right at local midnight are
    /// not missed.
    pub fn matching_slot(&self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        let today = now.with_timezone(&self.offset).date_naive();
        let days = [today.pred_opt(), Some(today), today.succ_opt()];
        days.into_iter()
            .flatten()
            .flat_map(|d| self.slot_times_for_day(d))
            .find(|&slot| (slot - now).abs() <= self.tolerance)
    }
}

/// Sleep before the next scheduler iteration. When a future scheduled post
/// exists, wake slightly before it fires; either way the delay is clamped
/// to [5s, default].
pub fn next_wake(
    now: DateTime<Utc>,
    next_scheduled: Option<DateTime<Utc>>,
    default: std::time::Duration,
) -> std::time::Duration {
    match next_scheduled {
        Some(at) => {
            let delta = (at - now).num_seconds() - 30;
            let max = default.as_secs() as i64;
            let clamped = delta.clamp(5, max.max(5));
            std::time::Duration::from_secs(clamped as u64)
        }
        None => default,
    }
}

/// Find the next free slots against the database: loads occupied publish
/// timestamps once and tests containment in memory.
pub async fn find_nearest_slots(
    conn: &mut AsyncPgConnection,
    table: &SlotTable,
    now: DateTime<Utc>,
    count: usize,
) -> Result<Vec<DateTime<Utc>>, diesel::result::Error> {
    let occupied = Post::occupied_publish_times(conn, now - table.tolerance()).await?;
    Ok(table.upcoming_free_slots(now, &occupied, count))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn table() -> SlotTable {
        SlotTable::new(
            vec![(7, 10), (9, 20), (11, 54), (18, 0), (23, 35)],
            FixedOffset::east_opt(3 * 3600).unwrap(),
            std::time::Duration::from_secs(10),
        )
    }

    fn local(y: i32, mo: u32, d: u32, h: u32, mi: u32) -> DateTime<Utc> {
        FixedOffset::east_opt(3 * 3600)
            .unwrap()
            .with_ymd_and_hms(y, mo, d, h, mi, 0)
            .unwrap()
            .with_timezone(&Utc)
    }

    #[test]
    fn test_no_existing_posts_returns_remaining_slots_ascending() {
        let now = local(2025, 6, 1, 10, 0);
        let free = table().upcoming_free_slots(now, &[], 3);
        assert_eq!(
            free,
            vec![
                local(2025, 6, 1, 11, 54),
                local(2025, 6, 1, 18, 0),
                local(2025, 6, 1, 23, 35),
            ]
        );
    }

    #[test]
    fn test_never_returns_past_slots() {
        let now = local(2025, 6, 1, 23, 40);
        let free = table().upcoming_free_slots(now, &[], 2);
        assert!(free.iter().all(|&s| s > now));
        assert_eq!(free[0], local(2025, 6, 2, 7, 10));
    }

    #[test]
    fn test_occupied_slot_is_skipped() {
        let now = local(2025, 6, 1, 10, 0);
        let occupied = vec![local(2025, 6, 1, 11, 54)];
        let free = table().upcoming_free_slots(now, &occupied, 2);
        assert_eq!(
            free,
            vec![local(2025, 6, 1, 18, 0), local(2025, 6, 1, 23, 35)]
        );
    }

    #[test]
    fn test_occupied_within_tolerance_counts_as_taken() {
        let now = local(2025, 6, 1, 10, 0);
        // 8 seconds past the slot, inside the 10s window
        let occupied = vec![local(2025, 6, 1, 11, 54) + Duration::seconds(8)];
        let free = table().upcoming_free_slots(now, &occupied, 1);
        assert_eq!(free, vec![local(2025, 6, 1, 18, 0)]);
    }

    #[test]
    fn test_search_rolls_into_following_days() {
        let now = local(2025, 6, 1, 10, 0);
        let free = table().upcoming_free_slots(now, &[], 8);
        assert_eq!(free.len(), 8);
        assert_eq!(free[3], local(2025, 6, 2, 7, 10));
        // strictly ascending
        assert!(free.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn test_no_slot_in_same_window_as_existing_post() {
        let now = local(2025, 6, 1, 0, 0);
        let occupied: Vec<_> = table().upcoming_free_slots(now, &[], 5);
        let free = table().upcoming_free_slots(now, &occupied, 5);
        for slot in &free {
            for taken in &occupied {
                assert!((*slot - *taken).abs() > Duration::seconds(10));
            }
        }
    }

    #[test]
    fn test_matching_slot_within_tolerance() {
        let t = table();
        let slot = local(2025, 6, 1, 18, 0);
        assert_eq!(t.matching_slot(slot), Some(slot));
        assert_eq!(t.matching_slot(slot + Duration::seconds(9)), Some(slot));
        assert_eq!(t.matching_slot(slot + Duration::seconds(11)), None);
    }

    #[test]
    fn test_next_wake_clamping() {
        let now = Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).unwrap();
        let default = std::time::Duration::from_secs(60);

        // No upcoming post: default period
        assert_eq!(next_wake(now, None, default), default);

        // Post in 10 minutes: capped at the default
        let far = now + Duration::minutes(10);
        assert_eq!(next_wake(now, Some(far), default), default);

        // Post in 50 seconds: wake 30s early, i.e. in 20s
        let soon = now + Duration::seconds(50);
        assert_eq!(
            next_wake(now, Some(soon), default),
            std::time::Duration::from_secs(20)
        );

        // Post effectively now: floor of 5s
        let imminent = now + Duration::seconds(2);
        assert_eq!(
            next_wake(now, Some(imminent), default),
            std::time::Duration::from_secs(5)
        );
    }
}
