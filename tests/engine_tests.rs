//! Integration tests for the RocksDB engine and its secondary indexes.

use chrono::{DateTime, TimeZone, Utc};
use remark42::config::EngineConfig;
use remark42::constants::{LAST_LIMIT, USER_LIMIT};
use remark42::engine::{Engine, RocksEngine};
use remark42::store::{Comment, DeleteMode, Locator, SortOrder, User};
use remark42::RemarkError;
use tempfile::TempDir;

const SITE: &str = "radio-t";

fn open(path: &std::path::Path) -> RocksEngine {
    RocksEngine::new(path, &[SITE.to_string()], EngineConfig::default())
        .expect("Failed to open engine")
}

fn create_engine() -> (RocksEngine, TempDir) {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    (open(temp_dir.path()), temp_dir)
}

fn at(secs: i64) -> DateTime<Utc> {
    Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap()
}

fn comment(id: &str, url: &str, user: &str, secs: i64) -> Comment {
    let mut c = Comment::new(Locator::new(SITE, url), User::new(user, user), format!("text {id}"));
    c.id = id.to_string();
    c.text = format!("<p>text {id}</p>\n");
    c.timestamp = at(secs);
    c
}

fn ids(comments: &[Comment]) -> Vec<&str> {
    comments.iter().map(|c| c.id.as_str()).collect()
}

#[test]
fn test_count_matches_live_comments() {
    let (engine, _temp) = create_engine();
    let url = "https://radio-t.com/p1";
    for i in 0..10 {
        engine.create(&comment(&format!("c{i}"), url, "u1", i)).unwrap();
    }
    let loc = Locator::new(SITE, url);

    engine.delete(&loc, "c1", DeleteMode::Soft).unwrap();
    engine.delete(&loc, "c2", DeleteMode::Hard).unwrap();
    // deleting twice does not count twice
    engine.delete(&loc, "c2", DeleteMode::Hard).unwrap();

    let live = engine
        .find(&loc, SortOrder::Time)
        .unwrap()
        .iter()
        .filter(|c| !c.deleted)
        .count();
    assert_eq!(live, 8);
    assert_eq!(engine.count(&loc).unwrap(), 8);
    assert_eq!(engine.find(&loc, SortOrder::Time).unwrap().len(), 10);
}

#[test]
fn test_last_is_newest_first_and_live_only() {
    let (engine, _temp) = create_engine();
    engine.create(&comment("a", "https://radio-t.com/1", "u1", 1)).unwrap();
    engine.create(&comment("b", "https://radio-t.com/2", "u2", 2)).unwrap();
    engine.create(&comment("c", "https://radio-t.com/1", "u3", 3)).unwrap();
    engine
        .delete(&Locator::new(SITE, "https://radio-t.com/2"), "b", DeleteMode::Soft)
        .unwrap();

    let last = engine.last(SITE, 0, None).unwrap();
    assert_eq!(ids(&last), vec!["c", "a"]);

    let since = engine.last(SITE, 0, Some(at(1))).unwrap();
    assert_eq!(ids(&since), vec!["c"]);
}

#[test]
fn test_last_is_capped() {
    let (engine, _temp) = create_engine();
    let url = "https://radio-t.com/busy";
    for i in 0..(LAST_LIMIT as i64 + 5) {
        engine.create(&comment(&format!("c{i}"), url, "u1", i)).unwrap();
    }
    assert_eq!(engine.last(SITE, 0, None).unwrap().len(), LAST_LIMIT);
    assert_eq!(engine.last(SITE, 5000, None).unwrap().len(), LAST_LIMIT);
    assert_eq!(engine.last(SITE, 3, None).unwrap().len(), 3);
}

#[test]
fn test_user_comments_are_capped_and_paged() {
    let (engine, _temp) = create_engine();
    for i in 0..(USER_LIMIT as i64 + 10) {
        let url = format!("https://radio-t.com/{}", i % 3);
        engine.create(&comment(&format!("c{i}"), &url, "u1", i)).unwrap();
    }

    let (page, total) = engine.user(SITE, "u1", 0, 0).unwrap();
    assert_eq!(total, USER_LIMIT + 10);
    assert_eq!(page.len(), USER_LIMIT);
    assert_eq!(page[0].id, format!("c{}", USER_LIMIT + 9));

    let (page, _) = engine.user(SITE, "u1", 2, 1).unwrap();
    assert_eq!(
        ids(&page),
        vec![
            format!("c{}", USER_LIMIT + 8).as_str(),
            format!("c{}", USER_LIMIT + 7).as_str()
        ]
    );
    assert_eq!(engine.user_count(SITE, "u1").unwrap(), USER_LIMIT + 10);

    assert!(matches!(
        engine.user(SITE, "nobody", 0, 0),
        Err(RemarkError::NotFound(_))
    ));
}

#[test]
fn test_replies_require_parent_in_same_post() {
    let (engine, _temp) = create_engine();
    engine.create(&comment("p", "https://radio-t.com/1", "u1", 1)).unwrap();

    let elsewhere = comment("r", "https://radio-t.com/2", "u2", 2).reply_to("p");
    assert!(matches!(
        engine.create(&elsewhere),
        Err(RemarkError::Validation(_))
    ));

    let reply = comment("r", "https://radio-t.com/1", "u2", 2).reply_to("p");
    engine.create(&reply).unwrap();
    let loaded = engine.get(&reply.locator, "r").unwrap();
    assert_eq!(loaded.parent_id, "p");
}

#[test]
fn test_block_expires() {
    let (engine, _temp) = create_engine();
    engine
        .set_block(SITE, "u1", true, std::time::Duration::from_millis(50))
        .unwrap();
    assert!(engine.is_blocked(SITE, "u1").unwrap());
    assert_eq!(engine.blocked(SITE).unwrap().len(), 1);

    std::thread::sleep(std::time::Duration::from_millis(200));
    assert!(!engine.is_blocked(SITE, "u1").unwrap());
    assert!(engine.blocked(SITE).unwrap().is_empty());
}

#[test]
fn test_sites_are_isolated() {
    let temp_dir = TempDir::new().unwrap();
    let engine = RocksEngine::new(
        temp_dir.path(),
        &[SITE.to_string(), "other".to_string()],
        EngineConfig::default(),
    )
    .unwrap();
    engine.create(&comment("c1", "https://radio-t.com/1", "u1", 1)).unwrap();

    assert_eq!(engine.sites(), vec!["other".to_string(), SITE.to_string()]);
    assert!(engine.last("other", 0, None).unwrap().is_empty());
    assert_eq!(
        engine
            .count(&Locator::new("other", "https://radio-t.com/1"))
            .unwrap(),
        0
    );
}

#[test]
fn test_data_survives_reopen() {
    let temp_dir = TempDir::new().unwrap();
    let url = "https://radio-t.com/persist";
    {
        let engine = open(temp_dir.path());
        engine.create(&comment("c1", url, "u1", 1)).unwrap();
        engine.create(&comment("c2", url, "u2", 2)).unwrap();
        engine.set_verified(SITE, "u2", true).unwrap();
        engine
            .set_read_only(&Locator::new(SITE, url), true)
            .unwrap();
        engine.close().unwrap();
    }

    let engine = open(temp_dir.path());
    let loc = Locator::new(SITE, url);
    assert_eq!(engine.count(&loc).unwrap(), 2);
    assert_eq!(ids(&engine.find(&loc, SortOrder::TimeDesc).unwrap()), vec!["c2", "c1"]);
    assert!(engine.is_verified(SITE, "u2").unwrap());
    assert!(engine.is_read_only(&loc).unwrap());
    assert_eq!(ids(&engine.last(SITE, 0, None).unwrap()), vec!["c2", "c1"]);
}

#[test]
fn test_closed_engine_rejects_calls() {
    let (engine, _temp) = create_engine();
    engine.close().unwrap();
    assert!(matches!(
        engine.count(&Locator::new(SITE, "https://radio-t.com/1")),
        Err(RemarkError::NotFound(_))
    ));
}
