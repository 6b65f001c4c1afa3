//! Property tests for the status update policy
//!
//! Applies arbitrary sequences of observations, in arbitrary arrival order,
//! and checks the per-field rules against a direct model.

mod common;

use activity_status::models::InstanceStatus;
use activity_status::store::{InstanceStore, MemoryStore, StatusUpdate};
use chrono::{DateTime, Duration, TimeZone, Utc};
use proptest::prelude::*;

fn base_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()
}

fn status_strategy() -> impl Strategy<Value = InstanceStatus> {
    prop_oneof![
        Just(InstanceStatus::Active),
        Just(InstanceStatus::Inactive),
        Just(InstanceStatus::Errored),
    ]
}

/// (status, seconds after base) in arrival order, not time order
fn observations() -> impl Strategy<Value = Vec<(InstanceStatus, i64)>> {
    prop::collection::vec((status_strategy(), 0i64..86_400), 1..40)
}

fn to_update((status, offset): (InstanceStatus, i64)) -> StatusUpdate {
    StatusUpdate::new(status, base_time() + Duration::seconds(offset))
}

proptest! {
    #[test]
    fn last_write_wins_for_status(obs in observations()) {
        let mut record = common::create_record("i1", "svc-a", 8080);
        for o in &obs {
            to_update(*o).apply_to(&mut record);
        }

        let last = to_update(*obs.last().unwrap());
        prop_assert_eq!(record.status, Some(last.status));
        prop_assert_eq!(record.last_updated, Some(last.last_updated));
    }

    #[test]
    fn last_active_is_last_arrived_active_observation(obs in observations()) {
        let mut record = common::create_record("i1", "svc-a", 8080);
        for o in &obs {
            to_update(*o).apply_to(&mut record);
        }

        // Arrival order, not the latest timestamp
        let expected = obs
            .iter()
            .rev()
            .find(|(status, _)| status.is_active())
            .map(|o| to_update(*o).last_updated);
        prop_assert_eq!(record.last_active, expected);
    }

    #[test]
    fn active_sets_last_active_to_checked_at(
        obs in observations(),
        offset in 0i64..86_400,
    ) {
        let mut record = common::create_record("i1", "svc-a", 8080);
        for o in &obs {
            to_update(*o).apply_to(&mut record);
        }

        let active = to_update((InstanceStatus::Active, offset));
        active.apply_to(&mut record);
        prop_assert_eq!(record.status, Some(InstanceStatus::Active));
        prop_assert_eq!(record.last_active, Some(active.last_updated));
        prop_assert_eq!(record.last_updated, Some(active.last_updated));
    }

    #[test]
    fn non_active_leaves_last_active_alone(
        obs in observations(),
        status in prop_oneof![Just(InstanceStatus::Inactive), Just(InstanceStatus::Errored)],
        offset in 0i64..86_400,
    ) {
        let mut record = common::create_record("i1", "svc-a", 8080);
        for o in &obs {
            to_update(*o).apply_to(&mut record);
        }
        let before = record.last_active;

        to_update((status, offset)).apply_to(&mut record);
        prop_assert_eq!(record.last_active, before);
        prop_assert_eq!(record.status, Some(status));
    }

    #[test]
    fn identity_fields_are_never_touched(obs in observations()) {
        let original = common::create_record("i1", "svc-a", 8080);
        let mut record = original.clone();
        for o in &obs {
            to_update(*o).apply_to(&mut record);
        }

        prop_assert_eq!(&record.id, &original.id);
        prop_assert_eq!(&record.host, &original.host);
        prop_assert_eq!(record.port, original.port);
        prop_assert_eq!(&record.name, &original.name);
        prop_assert_eq!(&record.region, &original.region);
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn memory_store_follows_the_same_policy(obs in observations()) {
        tokio_test::block_on(async {
            let original = common::create_record("i1", "svc-a", 8080);
            let store = MemoryStore::with_records([original.clone()]).await;
            let mut model = original.clone();

            for o in &obs {
                let update = to_update(*o);
                update.apply_to(&mut model);
                let outcome = store.update_status(&original.id, &update).await.unwrap();
                assert!(outcome.is_updated());
            }

            let stored = store.find_by_id(&original.id).await.unwrap().unwrap();
            assert_eq!(stored, model);
            assert_eq!(store.update_count(), obs.len() as u64);
        });
    }
}
