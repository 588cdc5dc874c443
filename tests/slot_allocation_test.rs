// Slot allocation behavior against the configured daily table: offers
// skip the past and occupied windows, roll across days, and stay stable
// under repeated queries.

use chrono::{DateTime, Duration, FixedOffset, TimeZone, Utc};
use promopost::services::slots::{next_wake, SlotTable};

const OFFSET_HOURS: i32 = 3;

fn offset() -> FixedOffset {
    FixedOffset::east_opt(OFFSET_HOURS * 3600).unwrap()
}

fn table() -> SlotTable {
    SlotTable::new(
        vec![(7, 10), (9, 20), (11, 54), (18, 0), (23, 35)],
        offset(),
        std::time::Duration::from_secs(10),
    )
}

fn local(day: u32, hour: u32, minute: u32) -> DateTime<Utc> {
    offset()
        .with_ymd_and_hms(2025, 7, day, hour, minute, 0)
        .unwrap()
        .with_timezone(&Utc)
}

#[test]
fn offers_only_future_slots() {
    let now = local(1, 12, 0);
    let offered = table().upcoming_free_slots(now, &[], 6);
    assert_eq!(offered.len(), 6);
    assert!(offered.iter().all(|&slot| slot > now));
    assert_eq!(offered[0], local(1, 18, 0));
    assert_eq!(offered[1], local(1, 23, 35));
    assert_eq!(offered[2], local(2, 7, 10));
}

#[test]
fn fully_booked_day_pushes_offers_to_next_day() {
    let now = local(1, 0, 30);
    let today: Vec<_> = table().upcoming_free_slots(now, &[], 5);
    let offered = table().upcoming_free_slots(now, &today, 3);
    assert_eq!(
        offered,
        vec![local(2, 7, 10), local(2, 9, 20), local(2, 11, 54)]
    );
}

#[test]
fn occupancy_respects_tolerance_window() {
    let now = local(1, 0, 30);
    let slot = local(1, 7, 10);

    // Inside the window: slot is taken
    let offered = table().upcoming_free_slots(now, &[slot + Duration::seconds(10)], 1);
    assert_eq!(offered[0], local(1, 9, 20));

    // Just outside: slot is free
    let offered = table().upcoming_free_slots(now, &[slot + Duration::seconds(11)], 1);
    assert_eq!(offered[0], slot);
}

#[test]
fn repeated_queries_are_stable_without_new_bookings() {
    let now = local(1, 10, 0);
    let occupied = vec![local(1, 18, 0)];
    let first = table().upcoming_free_slots(now, &occupied, 6);
    let second = table().upcoming_free_slots(now, &occupied, 6);
    assert_eq!(first, second);
}

#[test]
fn midnight_boundary_slot_matches_correct_day() {
    // 23:35 local is 20:35 UTC; a local-midnight-adjacent check must not
    // lose it.
    let slot = local(1, 23, 35);
    assert_eq!(table().matching_slot(slot + Duration::seconds(5)), Some(slot));
}

#[test]
fn adaptive_wake_tracks_next_publish() {
    let now = Utc.with_ymd_and_hms(2025, 7, 1, 9, 0, 0).unwrap();
    let default = std::time::Duration::from_secs(60);

    // Nothing scheduled: plain period
    assert_eq!(next_wake(now, None, default), default);

    // Next publish beyond the horizon: still the plain period
    assert_eq!(next_wake(now, Some(now + Duration::hours(2)), default), default);

    // Close publish: wake early but never busy-spin
    assert_eq!(
        next_wake(now, Some(now + Duration::seconds(40)), default),
        std::time::Duration::from_secs(10)
    );
    assert!(next_wake(now, Some(now), default) >= std::time::Duration::from_secs(5));
}
