use super::*;

#[test]
fn upsert_then_get_round_trips() {
    let store = Store::open_in_memory().unwrap();
    let row = StoreRow {
        key: "k1".into(),
        entry_type: "artifact".into(),
        raw: b"hello".to_vec(),
        summary: "a greeting".into(),
        metadata: "{}".into(),
        created_by: "agent-1".into(),
        created_at: "2026-01-01T00:00:00Z".into(),
    };
    store.upsert(&row).unwrap();
    let fetched = store.get("k1").unwrap().unwrap();
    assert_eq!(fetched.raw, b"hello");
    assert_eq!(fetched.summary, "a greeting");
}

#[test]
fn upsert_overwrites_existing_key() {
    let store = Store::open_in_memory().unwrap();
    let mut row = StoreRow {
        key: "k1".into(),
        entry_type: "artifact".into(),
        raw: b"v1".to_vec(),
        summary: "first".into(),
        metadata: "{}".into(),
        created_by: "agent-1".into(),
        created_at: "2026-01-01T00:00:00Z".into(),
    };
    store.upsert(&row).unwrap();
    row.raw = b"v2".to_vec();
    row.summary = "second".into();
    store.upsert(&row).unwrap();
    let fetched = store.get("k1").unwrap().unwrap();
    assert_eq!(fetched.raw, b"v2");
    assert_eq!(fetched.summary, "second");
}

#[test]
fn get_missing_key_returns_none() {
    let store = Store::open_in_memory().unwrap();
    assert!(store.get("missing").unwrap().is_none());
}
