use chrono::Utc;
use rusqlite::{params, Connection};
use std::collections::BTreeMap;
use zidu_core::db::open_db_in_memory;
use zidu_core::{
    ArticleEntry, CharInfo, LogicalKey, ProgressStore, SqliteProgressStore, StoreError, UserId,
    ARTICLE_HISTORY_CAP,
};

fn user(value: &str) -> UserId {
    UserId::new(value).unwrap()
}

fn put_raw(conn: &Connection, user: &str, key: &str, value: &str) {
    conn.execute(
        "INSERT INTO user_blobs (user, key, value) VALUES (?1, ?2, ?3)
         ON CONFLICT (user, key) DO UPDATE SET value = excluded.value;",
        params![user, key, value],
    )
    .unwrap();
}

#[test]
fn absent_user_yields_empty_defaults_everywhere() {
    let conn = open_db_in_memory().unwrap();
    let store = SqliteProgressStore::new(&conn);
    let u = user("new@x.com");

    let progress = store.load_progress(&u).unwrap();
    assert!(progress.unknown.is_empty());
    assert!(progress.mastered.is_empty());
    assert!(progress.mastered_data.is_empty());
    assert!(progress.quiz_progress.is_empty());
    assert!(store.load_article_history(&u).unwrap().is_empty());
    assert!(store.blob_sizes(&u).unwrap().is_empty());
}

#[test]
fn saves_overwrite_the_previous_blob() {
    let conn = open_db_in_memory().unwrap();
    let store = SqliteProgressStore::new(&conn);
    let u = user("alice@x.com");

    let mut unknown: BTreeMap<String, CharInfo> = BTreeMap::new();
    unknown.insert("学".to_string(), CharInfo::default());
    unknown.insert("好".to_string(), CharInfo::default());
    store.save_unknown(&u, &unknown).unwrap();

    unknown.remove("学");
    store.save_unknown(&u, &unknown).unwrap();

    let loaded = store.load_progress(&u).unwrap().unknown;
    assert_eq!(loaded.len(), 1);
    assert!(loaded.contains_key("好"));
}

#[test]
fn writes_for_one_user_never_leak_into_another() {
    let conn = open_db_in_memory().unwrap();
    let store = SqliteProgressStore::new(&conn);
    let alice = user("alice@x.com");
    let bob = user("bob@x.com");

    let mut unknown: BTreeMap<String, CharInfo> = BTreeMap::new();
    unknown.insert("学".to_string(), CharInfo::default());
    store.save_unknown(&alice, &unknown).unwrap();

    assert!(store.load_progress(&bob).unwrap().unknown.is_empty());
    assert!(store.blob_sizes(&bob).unwrap().is_empty());

    store.save_unknown(&bob, &BTreeMap::new()).unwrap();
    assert_eq!(store.load_progress(&alice).unwrap().unknown.len(), 1);
}

#[test]
fn malformed_blob_fails_loudly_instead_of_coercing() {
    let conn = open_db_in_memory().unwrap();
    let store = SqliteProgressStore::new(&conn);
    let u = user("alice@x.com");

    put_raw(&conn, u.as_str(), "unknownChars", "not json at all");
    assert!(matches!(
        store.load_progress(&u).unwrap_err(),
        StoreError::InvalidData { .. }
    ));

    // A legacy free-form shape (no envelope) must not decode silently.
    put_raw(&conn, u.as_str(), "unknownChars", r#"["好","学"]"#);
    assert!(matches!(
        store.load_progress(&u).unwrap_err(),
        StoreError::InvalidData { .. }
    ));
}

#[test]
fn unsupported_envelope_version_is_rejected() {
    let conn = open_db_in_memory().unwrap();
    let store = SqliteProgressStore::new(&conn);
    let u = user("alice@x.com");

    put_raw(&conn, u.as_str(), "masteredChars", r#"{"version":2,"data":[]}"#);
    let err = store.load_progress(&u).unwrap_err();
    match err {
        StoreError::InvalidData { key, message } => {
            assert_eq!(key, "masteredChars");
            assert!(message.contains("version"));
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn article_history_write_enforces_the_cap() {
    let conn = open_db_in_memory().unwrap();
    let store = SqliteProgressStore::new(&conn);
    let u = user("alice@x.com");

    let entries: Vec<ArticleEntry> = (0..15)
        .map(|i| ArticleEntry {
            text: format!("article {i}"),
            added_at: Utc::now(),
        })
        .collect();
    store.save_article_history(&u, &entries).unwrap();

    let loaded = store.load_article_history(&u).unwrap();
    assert_eq!(loaded.len(), ARTICLE_HISTORY_CAP);
    // Most-recent-first order: the head of the slice survives.
    assert_eq!(loaded[0].text, "article 0");
    assert_eq!(loaded[ARTICLE_HISTORY_CAP - 1].text, "article 9");
}

#[test]
fn blob_sizes_report_present_keys_with_byte_lengths() {
    let conn = open_db_in_memory().unwrap();
    let store = SqliteProgressStore::new(&conn);
    let u = user("alice@x.com");

    let mut unknown: BTreeMap<String, CharInfo> = BTreeMap::new();
    unknown.insert("学".to_string(), CharInfo::default());
    store.save_unknown(&u, &unknown).unwrap();
    store.save_mastered(&u, &Default::default()).unwrap();

    let sizes = store.blob_sizes(&u).unwrap();
    let keys: Vec<LogicalKey> = sizes.iter().map(|(key, _)| *key).collect();
    assert_eq!(keys, vec![LogicalKey::MasteredChars, LogicalKey::UnknownChars]);
    assert!(sizes.iter().all(|(_, bytes)| *bytes > 0));

    // Byte length matches the stored blob, multibyte characters included.
    let stored: String = conn
        .query_row(
            "SELECT value FROM user_blobs WHERE user = ?1 AND key = 'unknownChars';",
            params![u.as_str()],
            |row| row.get(0),
        )
        .unwrap();
    let unknown_size = sizes
        .iter()
        .find(|(key, _)| *key == LogicalKey::UnknownChars)
        .map(|(_, bytes)| *bytes)
        .unwrap();
    assert_eq!(unknown_size, stored.len() as u64);
}
