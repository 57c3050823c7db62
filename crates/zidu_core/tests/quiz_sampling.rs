use rand::rngs::StdRng;
use rand::SeedableRng;
use std::collections::{BTreeMap, BTreeSet, HashSet};
use zidu_core::db::open_db_in_memory;
use zidu_core::{
    CharInfo, ProgressStore, QuizService, SqliteProgressStore, UserId, REVIEW_RATIO,
};

fn user() -> UserId {
    UserId::new("alice@x.com").unwrap()
}

fn cjk_chars(offset: u32, count: u32) -> Vec<String> {
    (0..count)
        .map(|i| char::from_u32(0x4E00 + offset + i).unwrap().to_string())
        .collect()
}

fn seed_pools(store: &SqliteProgressStore, studying: &[String], mastered: &[String]) {
    let unknown: BTreeMap<String, CharInfo> = studying
        .iter()
        .map(|c| (c.clone(), CharInfo::default()))
        .collect();
    let mastered: BTreeSet<String> = mastered.iter().cloned().collect();
    store.save_unknown(&user(), &unknown).unwrap();
    store.save_mastered(&user(), &mastered).unwrap();
}

#[test]
fn review_fraction_converges_to_the_configured_ratio() {
    let conn = open_db_in_memory().unwrap();
    let store = SqliteProgressStore::new(&conn);
    seed_pools(&store, &cjk_chars(0, 40), &cjk_chars(100, 40));

    let service = QuizService::new(SqliteProgressStore::new(&conn));
    let mut rng = StdRng::seed_from_u64(7);

    let mut total = 0usize;
    let mut reviews = 0usize;
    for _ in 0..1500 {
        let session = service.build_session_with(&user(), 8, &mut rng).unwrap();
        assert!(!session.has_repeats);
        total += session.slots.len();
        reviews += session.slots.iter().filter(|slot| slot.is_review).count();
    }

    let fraction = reviews as f64 / total as f64;
    assert!(
        (fraction - REVIEW_RATIO).abs() < 0.02,
        "review fraction {fraction} too far from {REVIEW_RATIO}"
    );
}

#[test]
fn no_character_repeats_when_supply_covers_the_request() {
    let conn = open_db_in_memory().unwrap();
    let store = SqliteProgressStore::new(&conn);
    seed_pools(&store, &cjk_chars(0, 12), &cjk_chars(100, 8));

    let service = QuizService::new(SqliteProgressStore::new(&conn));
    let mut rng = StdRng::seed_from_u64(11);

    for _ in 0..200 {
        let session = service.build_session_with(&user(), 20, &mut rng).unwrap();
        assert_eq!(session.slots.len(), 20);
        assert!(!session.has_repeats);

        let distinct: HashSet<&str> = session
            .slots
            .iter()
            .map(|slot| slot.character.as_str())
            .collect();
        assert_eq!(distinct.len(), 20);
    }
}

#[test]
fn oversized_request_repeats_instead_of_truncating() {
    let conn = open_db_in_memory().unwrap();
    let store = SqliteProgressStore::new(&conn);
    seed_pools(&store, &cjk_chars(0, 3), &cjk_chars(100, 2));

    let service = QuizService::new(SqliteProgressStore::new(&conn));
    let mut rng = StdRng::seed_from_u64(3);

    let session = service.build_session_with(&user(), 9, &mut rng).unwrap();
    assert_eq!(session.slots.len(), 9);
    assert!(session.has_repeats);
}

#[test]
fn empty_pool_falls_back_to_the_other() {
    let conn = open_db_in_memory().unwrap();
    let store = SqliteProgressStore::new(&conn);
    seed_pools(&store, &[], &cjk_chars(100, 6));

    let service = QuizService::new(SqliteProgressStore::new(&conn));
    let mut rng = StdRng::seed_from_u64(5);

    let session = service.build_session_with(&user(), 6, &mut rng).unwrap();
    assert_eq!(session.slots.len(), 6);
    assert!(session.slots.iter().all(|slot| slot.is_review));

    seed_pools(&store, &cjk_chars(0, 6), &[]);
    let session = service.build_session_with(&user(), 6, &mut rng).unwrap();
    assert!(session.slots.iter().all(|slot| !slot.is_review));
}

#[test]
fn user_with_no_characters_gets_an_empty_session() {
    let conn = open_db_in_memory().unwrap();
    let service = QuizService::new(SqliteProgressStore::new(&conn));
    let mut rng = StdRng::seed_from_u64(1);

    let session = service.build_session_with(&user(), 10, &mut rng).unwrap();
    assert!(session.slots.is_empty());
    assert!(!session.has_repeats);
}

#[test]
fn seeded_sessions_are_reproducible() {
    let conn = open_db_in_memory().unwrap();
    let store = SqliteProgressStore::new(&conn);
    seed_pools(&store, &cjk_chars(0, 20), &cjk_chars(100, 10));

    let service = QuizService::new(SqliteProgressStore::new(&conn));
    let first = service
        .build_session_with(&user(), 10, &mut StdRng::seed_from_u64(42))
        .unwrap();
    let second = service
        .build_session_with(&user(), 10, &mut StdRng::seed_from_u64(42))
        .unwrap();

    assert_eq!(first.slots, second.slots);
}
