use serde::{Deserialize, Serialize};
use std::cmp::Reverse;

// -------------------------
// Node snapshot model
// -------------------------

/// Health state reported by a runtime node. The control plane is free to
/// invent new states; anything unrecognized lands in the worst tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeStatus {
    Online,
    Paused,
    Offline,
    #[serde(other)]
    Unknown,
}

impl Default for NodeStatus {
    fn default() -> Self {
        NodeStatus::Unknown
    }
}

impl NodeStatus {
    fn tier(self) -> u8 {
        match self {
            NodeStatus::Online => 0,
            NodeStatus::Paused => 1,
            _ => 2,
        }
    }
}

/// Read-only snapshot of one runtime node, as served by the control-plane
/// registry table. Perch owns none of this state; it only orders snapshots.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeSnapshot {
    pub id: i64,
    pub name: String,
    #[serde(default)]
    pub host: Option<String>,
    #[serde(default)]
    pub region: Option<String>,
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default)]
    pub status: NodeStatus,
    #[serde(default)]
    pub current_tasks: i64,
    #[serde(default)]
    pub queue_size: i64,
    #[serde(default)]
    pub total_completed: i64,
    #[serde(default)]
    pub last_seen: Option<String>,
    #[serde(default)]
    pub latency_ms: Option<u32>,
    #[serde(default)]
    pub weight: Option<i32>,
}

// -------------------------
// Ranking heuristic
// -------------------------

// Nodes that never reported a latency sort behind every reporting node in
// their tier.
const UNREPORTED_LATENCY_MS: u32 = 999_999;

fn region_rank(node: &NodeSnapshot) -> u8 {
    match node.region.as_deref() {
        Some(r) if r.eq_ignore_ascii_case("local") => 0,
        _ => 1,
    }
}

fn display_key(node: &NodeSnapshot) -> (u8, u8, u32) {
    (
        node.status.tier(),
        region_rank(node),
        node.latency_ms.unwrap_or(UNREPORTED_LATENCY_MS),
    )
}

fn dispatch_key(node: &NodeSnapshot) -> (u8, u8, u32, Reverse<i32>, i64) {
    let (tier, region, latency) = display_key(node);
    (tier, region, latency, Reverse(node.weight.unwrap_or(0)), node.id)
}

/// Order nodes best-first for display: online before paused before anything
/// else, then same-region ("local") first, then by ascending latency.
///
/// Stable: equal-key nodes keep their input order. The input is not mutated;
/// a fresh ordering is returned.
pub fn rank_nodes(nodes: &[NodeSnapshot]) -> Vec<NodeSnapshot> {
    let mut ranked = nodes.to_vec();
    ranked.sort_by_key(display_key);
    ranked
}

/// The job-creation variant: the display key extended by descending declared
/// weight, then ascending id, so auto-assignment is fully deterministic.
pub fn pick_node(nodes: &[NodeSnapshot]) -> Option<&NodeSnapshot> {
    nodes.iter().min_by_key(|n| dispatch_key(n))
}

// -------------------------
// Registry snapshot merge
// -------------------------

/// Apply one change-feed row to the in-memory snapshot: replace the node with
/// the same id, otherwise insert the newcomer at the front. The caller owns
/// the snapshot and swaps it atomically between events.
pub fn merge_node(nodes: &mut Vec<NodeSnapshot>, row: NodeSnapshot) {
    match nodes.iter_mut().find(|n| n.id == row.id) {
        Some(existing) => *existing = row,
        None => nodes.insert(0, row),
    }
}

// -------------------------
// Tests
// -------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn node(id: i64, status: NodeStatus, region: &str, latency_ms: Option<u32>) -> NodeSnapshot {
        NodeSnapshot {
            id,
            name: format!("node-{id}"),
            host: None,
            region: Some(region.to_string()),
            version: None,
            status,
            current_tasks: 0,
            queue_size: 0,
            total_completed: 0,
            last_seen: None,
            latency_ms,
            weight: None,
        }
    }

    #[test]
    fn online_sorts_before_paused_and_offline() {
        let input = vec![
            node(1, NodeStatus::Offline, "eu-west", Some(10)),
            node(2, NodeStatus::Paused, "eu-west", Some(10)),
            node(3, NodeStatus::Online, "eu-west", Some(10)),
        ];
        let ranked = rank_nodes(&input);
        assert_eq!(ranked[0].id, 3);
        assert_eq!(ranked[1].id, 2);
        assert_eq!(ranked[2].id, 1);
    }

    #[test]
    fn lower_latency_wins_within_tier() {
        let input = vec![
            node(1, NodeStatus::Online, "eu-west", Some(150)),
            node(2, NodeStatus::Online, "us-east", Some(50)),
        ];
        let ranked = rank_nodes(&input);
        assert_eq!(ranked[0].id, 2);
    }

    #[test]
    fn status_dominates_region() {
        // A paused local node loses to an online remote node.
        let input = vec![
            node(1, NodeStatus::Paused, "local", Some(1)),
            node(2, NodeStatus::Online, "ap-south", Some(400)),
        ];
        let ranked = rank_nodes(&input);
        assert_eq!(ranked[0].id, 2);
        assert_eq!(ranked[1].id, 1);
    }

    #[test]
    fn local_region_is_case_insensitive() {
        let input = vec![
            node(1, NodeStatus::Online, "eu-west", Some(5)),
            node(2, NodeStatus::Online, "LOCAL", Some(90)),
        ];
        let ranked = rank_nodes(&input);
        assert_eq!(ranked[0].id, 2);
    }

    #[test]
    fn missing_latency_sorts_last_in_tier() {
        let input = vec![
            node(1, NodeStatus::Online, "eu-west", None),
            node(2, NodeStatus::Online, "eu-west", Some(800)),
        ];
        let ranked = rank_nodes(&input);
        assert_eq!(ranked[0].id, 2);
        assert_eq!(ranked[1].id, 1);
    }

    #[test]
    fn ranking_is_idempotent_and_stable() {
        let input = vec![
            node(7, NodeStatus::Online, "eu-west", Some(50)),
            node(4, NodeStatus::Online, "eu-west", Some(50)),
            node(9, NodeStatus::Paused, "local", None),
        ];
        let once = rank_nodes(&input);
        let twice = rank_nodes(&once);
        let ids = |v: &[NodeSnapshot]| v.iter().map(|n| n.id).collect::<Vec<_>>();
        assert_eq!(ids(&once), ids(&twice));
        // Equal keys keep input order: 7 before 4.
        assert_eq!(ids(&once), vec![7, 4, 9]);
        // And the input itself is untouched.
        assert_eq!(ids(&input), vec![7, 4, 9]);
    }

    #[test]
    fn pick_node_prefers_weight_then_id() {
        let mut a = node(5, NodeStatus::Online, "eu-west", Some(50));
        let mut b = node(3, NodeStatus::Online, "eu-west", Some(50));
        a.weight = Some(1);
        b.weight = Some(10);
        assert_eq!(pick_node(&[a.clone(), b.clone()]).unwrap().id, 3);

        // Equal weight: the lower id wins.
        b.weight = Some(1);
        assert_eq!(pick_node(&[a, b]).unwrap().id, 3);
    }

    #[test]
    fn pick_node_empty_is_none() {
        assert!(pick_node(&[]).is_none());
    }

    #[test]
    fn merge_replaces_in_place_or_prepends() {
        let mut snapshot = vec![
            node(1, NodeStatus::Online, "eu-west", Some(40)),
            node(2, NodeStatus::Online, "eu-west", Some(60)),
        ];

        merge_node(&mut snapshot, node(2, NodeStatus::Paused, "eu-west", Some(61)));
        assert_eq!(snapshot.len(), 2);
        assert_eq!(snapshot[1].status, NodeStatus::Paused);

        merge_node(&mut snapshot, node(3, NodeStatus::Online, "local", Some(2)));
        assert_eq!(snapshot.len(), 3);
        assert_eq!(snapshot[0].id, 3);
    }

    #[test]
    fn unknown_status_lands_in_worst_tier() {
        let row: NodeSnapshot =
            serde_json::from_value(serde_json::json!({"id": 1, "name": "n", "status": "draining"}))
                .unwrap();
        assert_eq!(row.status, NodeStatus::Unknown);
        assert_eq!(row.status.tier(), 2);
        // Defaults cover every absent column.
        assert!(row.latency_ms.is_none());
        assert!(row.region.is_none());
    }
}
