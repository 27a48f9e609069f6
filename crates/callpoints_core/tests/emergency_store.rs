use callpoints_core::{
    EmergencyValidationError, FixedClock, RepoError, ResponseDraft, ResponseStore, StoreConfig,
    StoreError,
};
use chrono::{DateTime, TimeZone, Utc};
use std::sync::Arc;
use uuid::Uuid;

fn at(y: i32, m: u32, d: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(y, m, d, 10, 0, 0).unwrap()
}

fn store() -> ResponseStore<FixedClock> {
    ResponseStore::open_in_memory(StoreConfig::default(), FixedClock::new(at(2024, 3, 20)))
        .unwrap()
}

fn draft(number: &str, date: DateTime<Utc>) -> ResponseDraft {
    ResponseDraft::new(number, format!("details for {number}"), date)
}

#[test]
fn add_emergency_persists_initial_responses_in_order() {
    let store = store();
    let fire = store
        .add_emergency(
            "Fire",
            vec![draft("F-2", at(2024, 3, 2)), draft("F-1", at(2024, 3, 1))],
        )
        .unwrap();

    let loaded = store.get_emergency(fire.id).unwrap().unwrap();
    assert_eq!(loaded, fire);
    let numbers: Vec<&str> = loaded
        .responses
        .iter()
        .map(|r| r.incident_number.as_str())
        .collect();
    assert_eq!(numbers, ["F-2", "F-1"]);
}

#[test]
fn duplicate_type_fails_and_leaves_store_unchanged() {
    let store = store();
    store.add_emergency("Fire", Vec::new()).unwrap();

    let err = store
        .add_emergency("Fire", vec![draft("X-1", at(2024, 3, 3))])
        .unwrap_err();
    assert!(matches!(err, StoreError::AlreadyExists(ref kind) if kind == "Fire"));

    let listed = store.list_emergencies().unwrap();
    assert_eq!(listed.len(), 1);
    assert!(listed[0].responses.is_empty());
    assert!(store.last_response().unwrap().is_none());
}

#[test]
fn type_comparison_is_case_sensitive() {
    let store = store();
    store.add_emergency("Fire", Vec::new()).unwrap();
    store.add_emergency("fire", Vec::new()).unwrap();
    assert_eq!(store.list_emergencies().unwrap().len(), 2);
}

#[test]
fn blank_type_is_rejected_as_write_failure() {
    let store = store();
    let err = store.add_emergency("  ", Vec::new()).unwrap_err();
    assert!(matches!(
        err,
        StoreError::WriteFailed(RepoError::Validation(EmergencyValidationError::EmptyType))
    ));
    assert!(store.list_emergencies().unwrap().is_empty());
}

#[test]
fn rename_updates_type_in_place_and_guards_uniqueness() {
    let store = store();
    let fire = store
        .add_emergency("Fire", vec![draft("F-1", at(2024, 3, 1))])
        .unwrap();
    store.add_emergency("Medical", Vec::new()).unwrap();

    store.rename_emergency(fire.id, "Structure fire").unwrap();
    store.rename_emergency(fire.id, "Structure fire").unwrap();
    let renamed = store.get_emergency(fire.id).unwrap().unwrap();
    assert_eq!(renamed.kind, "Structure fire");
    assert_eq!(renamed.responses, fire.responses);

    let err = store.rename_emergency(fire.id, "Medical").unwrap_err();
    assert!(matches!(err, StoreError::AlreadyExists(_)));

    let err = store.rename_emergency(Uuid::new_v4(), "Ghost").unwrap_err();
    assert!(matches!(err, StoreError::WriteFailed(RepoError::NotFound(_))));
}

#[test]
fn delete_emergency_cascades_to_responses() {
    let store = store();
    let fire = store
        .add_emergency(
            "Fire",
            vec![draft("F-1", at(2024, 3, 1)), draft("F-2", at(2024, 3, 2))],
        )
        .unwrap();
    let medical = store
        .add_emergency("Medical", vec![draft("M-1", at(2024, 3, 3))])
        .unwrap();

    store.delete_emergency(fire.id).unwrap();

    assert!(store.get_emergency(fire.id).unwrap().is_none());
    assert_eq!(store.dataset_points().unwrap().all, 1);
    assert_eq!(
        store.last_response().unwrap().map(|r| r.id),
        Some(medical.responses[0].id)
    );

    let err = store.delete_emergency(fire.id).unwrap_err();
    assert!(matches!(err, StoreError::ClearFailed(RepoError::NotFound(_))));
}

#[test]
fn add_response_appends_and_last_response_tracks_entry_order() {
    let store = store();
    let fire = store.add_emergency("Fire", Vec::new()).unwrap();
    let medical = store.add_emergency("Medical", Vec::new()).unwrap();

    store
        .add_response(draft("F-1", at(2024, 3, 10)), fire.id)
        .unwrap();
    // Entered later but dated earlier: still the latest persisted.
    let latest = store
        .add_response(draft("M-1", at(2024, 1, 1)), medical.id)
        .unwrap();

    assert_eq!(store.last_response().unwrap(), Some(latest));
}

#[test]
fn add_response_to_missing_emergency_fails_without_side_effects() {
    let store = store();
    let err = store
        .add_response(draft("X-1", at(2024, 3, 1)), Uuid::new_v4())
        .unwrap_err();
    assert!(matches!(err, StoreError::WriteFailed(RepoError::NotFound(_))));
    assert!(store.last_response().unwrap().is_none());
}

#[test]
fn remove_response_detaches_only_from_owner() {
    let store = store();
    let fire = store
        .add_emergency("Fire", vec![draft("F-1", at(2024, 3, 1))])
        .unwrap();
    let medical = store.add_emergency("Medical", Vec::new()).unwrap();
    let response_id = fire.responses[0].id;

    store.remove_response(response_id, medical.id).unwrap();
    assert_eq!(
        store.get_emergency(fire.id).unwrap().unwrap().responses.len(),
        1
    );

    store.remove_response(response_id, fire.id).unwrap();
    assert!(store
        .get_emergency(fire.id)
        .unwrap()
        .unwrap()
        .responses
        .is_empty());

    store.remove_response(response_id, fire.id).unwrap();
}

#[test]
fn update_response_overwrites_fields_and_keeps_identity() {
    let store = store();
    let fire = store
        .add_emergency(
            "Fire",
            vec![draft("F-1", at(2024, 3, 1)), draft("F-2", at(2024, 3, 2))],
        )
        .unwrap();
    let target = fire.responses[0].id;

    let updated = store
        .update_response(
            target,
            ResponseDraft::new("F-1b", "rekindle", at(2024, 2, 28)),
        )
        .unwrap();
    assert_eq!(updated.id, target);

    let loaded = store.get_emergency(fire.id).unwrap().unwrap();
    assert_eq!(loaded.responses[0], updated);
    assert_eq!(loaded.responses[0].incident_number, "F-1b");
    assert_eq!(loaded.responses[0].details, "rekindle");
    assert_eq!(loaded.responses[0].date, at(2024, 2, 28));
    assert_eq!(loaded.responses[1], fire.responses[1]);

    let err = store
        .update_response(Uuid::new_v4(), draft("none", at(2024, 3, 1)))
        .unwrap_err();
    assert!(matches!(err, StoreError::WriteFailed(RepoError::NotFound(_))));
}

#[test]
fn store_survives_reopen_from_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("callpoints.db");

    let fire_id = {
        let store = ResponseStore::open(&path, StoreConfig::default()).unwrap();
        let fire = store
            .add_emergency("Fire", vec![draft("F-1", at(2024, 3, 1))])
            .unwrap();
        store.add_manual_points(3).unwrap();
        fire.id
    };

    let store = ResponseStore::open(&path, StoreConfig::default()).unwrap();
    let fire = store.get_emergency(fire_id).unwrap().unwrap();
    assert_eq!(fire.responses.len(), 1);
    assert_eq!(store.manual_point_entries().unwrap().len(), 1);
}

#[test]
fn concurrent_callers_are_serialized() {
    let store = Arc::new(store());
    let fire = store.add_emergency("Fire", Vec::new()).unwrap();

    std::thread::scope(|scope| {
        for worker in 0..4 {
            let store = Arc::clone(&store);
            scope.spawn(move || {
                for n in 0..10 {
                    store
                        .add_response(draft(&format!("{worker}-{n}"), at(2024, 3, 5)), fire.id)
                        .unwrap();
                }
            });
        }
    });

    let loaded = store.get_emergency(fire.id).unwrap().unwrap();
    assert_eq!(loaded.responses.len(), 40);
    assert_eq!(store.emergency_points(fire.id).unwrap().current_month, 40);
}

#[test]
fn invalid_config_is_rejected_at_construction() {
    let config = StoreConfig {
        csv_date_format: String::new(),
        ..StoreConfig::default()
    };
    let err = ResponseStore::open_in_memory(config, FixedClock::new(at(2024, 1, 1)))
        .err()
        .expect("empty date format must be rejected");
    assert!(matches!(err, StoreError::InvalidConfig(_)));
}

#[test]
fn sub_millisecond_dates_read_back_exactly_as_returned() {
    let precise = Utc.timestamp_opt(1_710_928_800, 123_456_789).unwrap();
    let store =
        ResponseStore::open_in_memory(StoreConfig::default(), FixedClock::new(precise)).unwrap();
    let fire = store
        .add_emergency("Fire", vec![draft("F-1", at(2024, 3, 1))])
        .unwrap();

    let added = store.add_response(draft("F-2", precise), fire.id).unwrap();
    let updated = store
        .update_response(fire.responses[0].id, draft("F-1b", precise))
        .unwrap();

    let loaded = store.get_emergency(fire.id).unwrap().unwrap();
    assert_eq!(loaded.responses, vec![updated, added]);
    assert_eq!(store.last_response().unwrap(), Some(loaded.responses[1].clone()));

    let entry = store.add_manual_points(1).unwrap();
    assert_eq!(store.manual_point_entries().unwrap(), vec![entry]);

    store.clear_points().unwrap();
    assert_eq!(store.last_reset().unwrap(), Some(entry.date_added));
}
