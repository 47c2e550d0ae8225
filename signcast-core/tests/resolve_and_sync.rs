//! End-to-end resolution: registry -> resolver -> sync origin -> timeline.
//!
//! Run with: cargo test --test resolve_and_sync

use chrono::{NaiveDate, Utc};
use signcast_core::models::{ContentKind, DaySet, Transition};
use signcast_core::origin::SyncOriginStore;
use signcast_core::resolver::resolve;
use signcast_core::timeline::CycleTimeline;
use signcast_core::Registry;

fn tuesday_noon() -> chrono::DateTime<Utc> {
    NaiveDate::from_ymd_opt(2024, 1, 2)
        .unwrap()
        .and_hms_opt(12, 0, 0)
        .unwrap()
        .and_utc()
}

/// Group with items A (image 10s), B (image 5s), C (video 20s) and an
/// all-day schedule.
fn seed(registry: &Registry) -> signcast_core::models::GroupId {
    let group = registry.create_group("Lobby", Transition::dissolve(0.5));
    registry
        .create_schedule(
            group.id,
            "All day",
            "00:00".parse().unwrap(),
            "23:59".parse().unwrap(),
            DaySet::ALL,
            0,
        )
        .unwrap();
    registry
        .add_content(group.id, "A", "a.png", ContentKind::Image, 100, 10.0)
        .unwrap();
    registry
        .add_content(group.id, "B", "b.png", ContentKind::Image, 100, 5.0)
        .unwrap();
    registry
        .add_content(
            group.id,
            "C",
            "c.mp4",
            ContentKind::Video {
                intrinsic_duration: Some(20.0),
            },
            100,
            10.0,
        )
        .unwrap();
    group.id
}

#[test]
fn resolved_playlist_drives_a_35_second_cycle() {
    let registry = Registry::new();
    let origins = SyncOriginStore::in_memory();
    let group_id = seed(&registry);

    let group = registry.group(group_id).unwrap();
    let resolution = resolve(
        Some(&group),
        &registry.schedules_for_group(group_id),
        &registry.content_for_group(group_id),
        &tuesday_noon(),
    );
    assert_eq!(resolution.playlist.len(), 3);

    let sync = origins
        .refresh(group_id, &resolution.playlist, 1000.0)
        .unwrap();
    assert_eq!(sync.cycle_duration, 35.0);

    // At origin + 12 the current item is B ([10, 15) in the cycle), 2 s in.
    let durations: Vec<f64> = resolution
        .playlist
        .iter()
        .map(|i| i.effective_duration())
        .collect();
    let timeline = CycleTimeline::new(&durations);
    let pos = timeline.position_at(sync.origin + 12.0, sync.origin).unwrap();
    assert_eq!(pos.index, 1);
    assert_eq!(pos.in_item, 2.0);
    assert_eq!(pos.remaining, 3.0);
}

#[test]
fn deactivating_an_item_remints_the_origin() {
    let registry = Registry::new();
    let origins = SyncOriginStore::in_memory();
    let group_id = seed(&registry);

    let before = origins
        .refresh(group_id, &registry.active_playlist(group_id), 1000.0)
        .unwrap();
    assert_eq!(before.cycle_duration, 35.0);

    let b = registry
        .content_for_group(group_id)
        .into_iter()
        .find(|i| i.name == "B")
        .unwrap();
    registry.set_content_active(b.id, false).unwrap();

    let after = origins
        .refresh(group_id, &registry.active_playlist(group_id), 1750.0)
        .unwrap();
    assert_ne!(after.composition_hash, before.composition_hash);
    assert_eq!(after.origin, 1750.0);
    assert_eq!(after.cycle_duration, 30.0);
}

#[test]
fn two_devices_on_one_group_share_an_origin() {
    let registry = Registry::new();
    let origins = SyncOriginStore::in_memory();
    let group_id = seed(&registry);

    let a = registry.create_device("left-wall");
    let b = registry.create_device("right-wall");
    registry.assign_group(a.id, Some(group_id)).unwrap();
    registry.assign_group(b.id, Some(group_id)).unwrap();

    // Fetches arrive at different times; the minted origin is shared.
    let seen_by_a = origins
        .refresh(group_id, &registry.active_playlist(group_id), 1000.0)
        .unwrap();
    let seen_by_b = origins
        .refresh(group_id, &registry.active_playlist(group_id), 1042.5)
        .unwrap();
    assert_eq!(seen_by_a.origin, seen_by_b.origin);
    assert_eq!(seen_by_a.composition_hash, seen_by_b.composition_hash);
}
