//! Assembly of a post's flat comment list into reply trees.

use crate::engine::cmp_f64;
use crate::store::{Comment, PostInfo, SortOrder};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::HashMap;

/// A comment with its replies.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    pub comment: Comment,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub replies: Vec<Node>,
    /// Latest creation time in this subtree.
    #[serde(skip)]
    latest: DateTime<Utc>,
}

/// Reply forest of one post.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tree {
    pub comments: Vec<Node>,
    pub info: PostInfo,
}

impl Tree {
    /// Comments in display order, each followed by its replies.
    pub fn flatten(&self) -> Vec<&Comment> {
        fn walk<'a>(nodes: &'a [Node], out: &mut Vec<&'a Comment>) {
            for node in nodes {
                out.push(&node.comment);
                walk(&node.replies, out);
            }
        }
        let mut out = Vec::new();
        walk(&self.comments, &mut out);
        out
    }
}

/// Builds the reply forest of a post.
///
/// Top-level comments are the ones without a parent. Replies are always in
/// ascending time order, `sort` applies to the top level only. A deleted
/// comment is kept only while some reply below it survives; comments whose
/// parent is not in `comments` are unreachable and left out.
pub fn make_tree(comments: &[Comment], sort: SortOrder) -> Tree {
    let mut children: HashMap<&str, Vec<&Comment>> = HashMap::new();
    for comment in comments {
        children
            .entry(comment.parent_id.as_str())
            .or_default()
            .push(comment);
    }
    for list in children.values_mut() {
        list.sort_by(|a, b| a.timestamp.cmp(&b.timestamp));
    }

    let mut top: Vec<Node> = children
        .get("")
        .map(|roots| {
            roots
                .iter()
                .filter_map(|c| build_node(c, &children))
                .collect()
        })
        .unwrap_or_default();
    sort_nodes(&mut top, sort);

    Tree {
        comments: top,
        info: post_info(comments),
    }
}

fn build_node(comment: &Comment, children: &HashMap<&str, Vec<&Comment>>) -> Option<Node> {
    let replies: Vec<Node> = children
        .get(comment.id.as_str())
        .map(|list| {
            list.iter()
                .filter(|c| c.id != comment.id)
                .filter_map(|c| build_node(c, children))
                .collect()
        })
        .unwrap_or_default();

    if comment.deleted && replies.is_empty() {
        return None;
    }

    let latest = replies
        .iter()
        .map(|r| r.latest)
        .fold(comment.timestamp, std::cmp::max);

    Some(Node {
        comment: comment.clone(),
        replies,
        latest,
    })
}

fn sort_nodes(nodes: &mut [Node], sort: SortOrder) {
    let by_time = |a: &Node, b: &Node| a.comment.timestamp.cmp(&b.comment.timestamp);
    let by_score = |a: &Node, b: &Node| a.comment.score.cmp(&b.comment.score);
    let by_controversy =
        |a: &Node, b: &Node| cmp_f64(a.comment.controversy(), b.comment.controversy());

    nodes.sort_by(|a, b| -> Ordering {
        match sort {
            SortOrder::Time => by_time(a, b),
            SortOrder::TimeDesc => by_time(b, a),
            SortOrder::Active => a.latest.cmp(&b.latest).then_with(|| by_time(a, b)),
            SortOrder::ActiveDesc => b.latest.cmp(&a.latest).then_with(|| by_time(b, a)),
            SortOrder::Score => by_score(a, b).then_with(|| by_time(a, b)),
            SortOrder::ScoreDesc => by_score(b, a).then_with(|| by_time(a, b)),
            SortOrder::Controversy => by_controversy(a, b).then_with(|| by_time(a, b)),
            SortOrder::ControversyDesc => by_controversy(b, a).then_with(|| by_time(a, b)),
        }
    });
}

/// Summary of a post computed from its comments, deleted ones excluded.
pub fn post_info(comments: &[Comment]) -> PostInfo {
    let live: Vec<&Comment> = comments.iter().filter(|c| !c.deleted).collect();
    PostInfo {
        url: comments
            .first()
            .map(|c| c.locator.url.clone())
            .unwrap_or_default(),
        count: live.len(),
        read_only: false,
        first_ts: live.iter().map(|c| c.timestamp).min(),
        last_ts: live.iter().map(|c| c.timestamp).max(),
    }
}
