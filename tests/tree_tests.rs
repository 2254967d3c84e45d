//! Tree assembly over randomly generated reply forests.

use chrono::{TimeZone, Utc};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use remark42::store::{Comment, Locator, SortOrder, User};
use remark42::tree::{make_tree, Node};
use std::collections::{HashMap, HashSet};

const SORTS: [SortOrder; 8] = [
    SortOrder::Time,
    SortOrder::TimeDesc,
    SortOrder::Active,
    SortOrder::ActiveDesc,
    SortOrder::Score,
    SortOrder::ScoreDesc,
    SortOrder::Controversy,
    SortOrder::ControversyDesc,
];

/// Builds a forest where every parent is created before its replies.
fn random_forest(rng: &mut StdRng, size: usize) -> Vec<Comment> {
    let mut comments: Vec<Comment> = Vec::with_capacity(size);
    for i in 0..size {
        let mut c = Comment::new(
            Locator::new("radio-t", "https://radio-t.com/tree"),
            User::new(format!("u{}", rng.gen_range(0..5)), "user"),
            "text",
        );
        c.id = format!("c{i}");
        c.timestamp = Utc
            .timestamp_opt(1_700_000_000 + i as i64 * 10 + rng.gen_range(0..5), 0)
            .unwrap();
        if i > 0 && rng.gen_bool(0.6) {
            c.parent_id = comments[rng.gen_range(0..i)].id.clone();
        }
        c.deleted = rng.gen_bool(0.3);
        c.score = rng.gen_range(-3..4);
        for v in 0..rng.gen_range(0..4) {
            c.votes.insert(format!("voter{v}"), rng.gen_bool(0.5));
        }
        comments.push(c);
    }
    comments
}

/// Ids of comments that are alive or have a live descendant.
fn expected_visible(comments: &[Comment]) -> HashSet<String> {
    let by_id: HashMap<&str, &Comment> = comments.iter().map(|c| (c.id.as_str(), c)).collect();
    let mut visible = HashSet::new();
    for c in comments.iter().filter(|c| !c.deleted) {
        let mut current = Some(c);
        while let Some(node) = current {
            if !visible.insert(node.id.clone()) {
                break;
            }
            current = by_id.get(node.parent_id.as_str()).copied();
        }
    }
    visible
}

fn assert_replies_ascending(nodes: &[Node]) {
    for node in nodes {
        for pair in node.replies.windows(2) {
            assert!(pair[0].comment.timestamp <= pair[1].comment.timestamp);
        }
        for reply in &node.replies {
            assert_eq!(reply.comment.parent_id, node.comment.id);
        }
        assert_replies_ascending(&node.replies);
    }
}

#[test]
fn test_tree_keeps_live_comments_and_their_ancestors() {
    let mut rng = StdRng::seed_from_u64(42);
    for round in 0..200 {
        let size = rng.gen_range(0..40);
        let mut comments = random_forest(&mut rng, size);
        // input order must not matter
        if round % 2 == 0 {
            comments.reverse();
        }
        let expected = expected_visible(&comments);

        for sort in SORTS {
            let tree = make_tree(&comments, sort);
            let flat = tree.flatten();
            let ids: HashSet<String> = flat.iter().map(|c| c.id.clone()).collect();
            assert_eq!(ids.len(), flat.len(), "duplicate node in tree");
            assert_eq!(ids, expected, "round {round} sort {sort}");
            assert_replies_ascending(&tree.comments);
            assert!(tree.comments.iter().all(|n| n.comment.parent_id.is_empty()));
        }
    }
}

#[test]
fn test_top_level_order_follows_sort() {
    let mut rng = StdRng::seed_from_u64(7);
    let comments = random_forest(&mut rng, 60);

    let tree = make_tree(&comments, SortOrder::Time);
    for pair in tree.comments.windows(2) {
        assert!(pair[0].comment.timestamp <= pair[1].comment.timestamp);
    }

    let tree = make_tree(&comments, SortOrder::ScoreDesc);
    for pair in tree.comments.windows(2) {
        assert!(pair[0].comment.score >= pair[1].comment.score);
    }
}

#[test]
fn test_info_counts_live_comments() {
    let mut rng = StdRng::seed_from_u64(1);
    let comments = random_forest(&mut rng, 50);
    let tree = make_tree(&comments, SortOrder::Time);
    let live = comments.iter().filter(|c| !c.deleted).count();
    assert_eq!(tree.info.count, live);
    assert_eq!(tree.info.url, "https://radio-t.com/tree");
}
