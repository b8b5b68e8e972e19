//! Log tree node model.
//!
//! # Responsibility
//! - Define the single node record shared by leaf entries and summaries.
//! - Own the canonical wire shape used by query and push boundaries.
//!
//! # Invariants
//! - A log node is always level 0; a summary node is always level >= 1.
//! - `child_ids` of a summary is fixed at creation.
//! - `parent_id` transitions from `None` to `Some` at most once.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Stable identifier for every node in the tree.
pub type NodeId = Uuid;

/// Level of a node inside the tree. Leaves live at level 0.
pub type Level = u32;

const SNIPPET_CHARS: usize = 10;
const MAX_SUMMARY_CHARS: usize = 100;

/// Closed variant tag for tree nodes.
///
/// Serialized flattened into `Node` as `type: "log" | "summary"`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum NodeKind {
    /// Raw submitted entry.
    Log,
    /// Synthesized node aggregating same-level children.
    Summary {
        /// Children in ascending creation order.
        #[serde(rename = "childIds")]
        child_ids: Vec<NodeId>,
    },
}

/// Canonical tree node record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Node {
    pub id: NodeId,
    #[serde(flatten)]
    pub kind: NodeKind,
    pub level: Level,
    /// Raw text for logs, derived text for summaries.
    pub content: String,
    /// Submission time for logs, synthesis time for summaries.
    #[serde(rename = "timestamp")]
    pub created_at: DateTime<Utc>,
    /// Enclosing summary, `None` while the node sits on the frontier.
    pub parent_id: Option<NodeId>,
}

impl Node {
    /// Creates a new unparented level-0 log node stamped with the current time.
    pub fn new_log(content: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            kind: NodeKind::Log,
            level: 0,
            content: content.into(),
            created_at: Utc::now(),
            parent_id: None,
        }
    }

    /// Creates a summary one level above `children`.
    ///
    /// Callers guarantee `children` is non-empty, same-level and ordered
    /// oldest first.
    pub(crate) fn new_summary(children: &[Node]) -> Self {
        let level = children.first().map_or(0, |child| child.level) + 1;
        Self {
            id: Uuid::new_v4(),
            kind: NodeKind::Summary {
                child_ids: children.iter().map(|child| child.id).collect(),
            },
            level,
            content: derive_summary_content(children),
            created_at: Utc::now(),
            parent_id: None,
        }
    }

    pub fn is_log(&self) -> bool {
        matches!(self.kind, NodeKind::Log)
    }

    pub fn is_summary(&self) -> bool {
        matches!(self.kind, NodeKind::Summary { .. })
    }

    /// Returns summary children, or an empty slice for log nodes.
    pub fn child_ids(&self) -> &[NodeId] {
        match &self.kind {
            NodeKind::Log => &[],
            NodeKind::Summary { child_ids } => child_ids,
        }
    }

    /// Returns whether this node still awaits a parent summary.
    pub fn is_frontier(&self) -> bool {
        self.parent_id.is_none()
    }
}

/// Builds deterministic summary text from ordered children.
///
/// Each child contributes `<ordinal>:(<first 10 chars>)`; parts are joined by
/// one space and the result is capped at 100 characters.
pub fn derive_summary_content(children: &[Node]) -> String {
    let joined = children
        .iter()
        .enumerate()
        .map(|(index, child)| {
            let snippet: String = child.content.chars().take(SNIPPET_CHARS).collect();
            format!("{}:({snippet})", ordinal(index + 1))
        })
        .collect::<Vec<_>>()
        .join(" ");
    joined.chars().take(MAX_SUMMARY_CHARS).collect()
}

fn ordinal(position: usize) -> String {
    let suffix = match (position % 10, position % 100) {
        (_, 11..=13) => "th",
        (1, _) => "st",
        (2, _) => "nd",
        (3, _) => "rd",
        _ => "th",
    };
    format!("{position}{suffix}")
}

#[cfg(test)]
mod tests {
    use super::{derive_summary_content, ordinal, Node, NodeKind};
    use serde_json::Value;

    #[test]
    fn log_node_serializes_to_wire_shape() {
        let node = Node::new_log("disk full");
        let value = serde_json::to_value(&node).unwrap();

        assert_eq!(value["type"], "log");
        assert_eq!(value["level"], 0);
        assert_eq!(value["content"], "disk full");
        assert_eq!(value["id"], node.id.to_string());
        assert_eq!(value["parentId"], Value::Null);
        assert!(value["timestamp"].as_str().unwrap().contains('T'));
        assert!(value.get("childIds").is_none());
    }

    #[test]
    fn summary_node_serializes_child_ids_in_order() {
        let children: Vec<Node> = (1..=5).map(|i| Node::new_log(format!("L{i}"))).collect();
        let summary = Node::new_summary(&children);
        let value = serde_json::to_value(&summary).unwrap();

        assert_eq!(value["type"], "summary");
        assert_eq!(value["level"], 1);
        let ids: Vec<String> = value["childIds"]
            .as_array()
            .unwrap()
            .iter()
            .map(|id| id.as_str().unwrap().to_string())
            .collect();
        let expected: Vec<String> = children.iter().map(|c| c.id.to_string()).collect();
        assert_eq!(ids, expected);
    }

    #[test]
    fn wire_shape_deserializes_back_into_summary_kind() {
        let children: Vec<Node> = (1..=5).map(|i| Node::new_log(format!("L{i}"))).collect();
        let summary = Node::new_summary(&children);
        let text = serde_json::to_string(&summary).unwrap();

        let parsed: Node = serde_json::from_str(&text).unwrap();
        assert_eq!(parsed, summary);
        assert!(matches!(parsed.kind, NodeKind::Summary { .. }));
    }

    #[test]
    fn summary_content_keeps_child_order_and_snippets() {
        let children: Vec<Node> = ["L1", "L2", "L3", "L4", "a rather long entry"]
            .iter()
            .map(|text| Node::new_log(*text))
            .collect();

        let content = derive_summary_content(&children);
        assert_eq!(
            content,
            "1st:(L1) 2nd:(L2) 3rd:(L3) 4th:(L4) 5th:(a rather l)"
        );
    }

    #[test]
    fn summary_content_never_splits_multibyte_chars() {
        let children = vec![Node::new_log("日本語のログメッセージです")];
        let content = derive_summary_content(&children);
        assert_eq!(content, "1st:(日本語のログメッセー)");
    }

    #[test]
    fn summary_content_is_capped() {
        let children: Vec<Node> = (0..20).map(|_| Node::new_log("0123456789abc")).collect();
        assert_eq!(derive_summary_content(&children).chars().count(), 100);
    }

    #[test]
    fn ordinal_handles_teens() {
        assert_eq!(ordinal(1), "1st");
        assert_eq!(ordinal(11), "11th");
        assert_eq!(ordinal(12), "12th");
        assert_eq!(ordinal(22), "22nd");
        assert_eq!(ordinal(103), "103rd");
    }
}
