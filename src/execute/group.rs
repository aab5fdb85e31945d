// src/execute/group.rs

//! Result-group arena.
//!
//! Groups form the interior of the execution tree (benchmarks, dashboards
//! and the synthetic root). Nodes live in a flat arena and refer to each
//! other by [`GroupIndex`], so concurrent leaves can update disjoint nodes
//! without any shared tree-wide lock.
//!
//! Aggregate propagation takes one node lock at a time while walking the
//! parent chain, so sibling propagations interleave freely. The
//! completed-children counters are atomics outside any lock; a group's
//! completion fires exactly once, when its last child reports.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use tokio::sync::oneshot;
use tracing::{debug, warn};

use crate::execute::LeafHandle;
use crate::status::{merge_severity, SeveritySummary, StatusSummary};

/// Identifier of the synthetic root group.
pub const ROOT_GROUP_ID: &str = "root_result_group";

/// Handle to a node in the group arena. Index 0 is always the root.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct GroupIndex(pub usize);

/// A group's direct children in declaration order, for export and display.
#[derive(Debug, Clone)]
pub enum TreeChild {
    Group(GroupIndex),
    Leaf(String),
}

/// Static metadata carried over from the defining resource.
#[derive(Debug, Clone, Default)]
pub struct GroupMeta {
    pub group_id: String,
    pub title: Option<String>,
    pub description: Option<String>,
    pub documentation: Option<String>,
    pub display: Option<String>,
    pub tags: BTreeMap<String, String>,
    pub node_type: &'static str,
}

impl GroupMeta {
    pub fn root() -> Self {
        Self {
            group_id: ROOT_GROUP_ID.to_string(),
            node_type: "root",
            ..Self::default()
        }
    }
}

/// Lock-guarded aggregate state of one group.
#[derive(Debug, Clone, Default)]
pub struct GroupAggregates {
    pub summary: StatusSummary,
    pub severity: SeveritySummary,
    /// Sorted, deduplicated union of dimension column names seen below
    /// this group.
    pub dimension_keys: Vec<String>,
    pub duration: Option<Duration>,
    started_at: Option<Instant>,
}

pub struct GroupNode {
    pub meta: GroupMeta,
    pub parent: Option<GroupIndex>,
    pub child_groups: Vec<GroupIndex>,
    pub leaves: Vec<LeafHandle>,
    /// Direct children in declaration order.
    pub children: Vec<TreeChild>,
    /// Direct child count, fixed at construction.
    pub total_children: u32,
    completed: AtomicU32,
    state: Mutex<GroupAggregates>,
}

impl GroupNode {
    fn lock_state(&self) -> MutexGuard<'_, GroupAggregates> {
        // A panicking leaf task must not wedge aggregation, so a poisoned
        // lock is recovered rather than propagated.
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn completed_children(&self) -> u32 {
        self.completed.load(Ordering::Acquire)
    }
}

/// The assembled arena plus the root-completion channel.
pub struct GroupTree {
    nodes: Vec<GroupNode>,
    done: Mutex<Option<oneshot::Sender<()>>>,
}

impl GroupTree {
    pub fn root() -> GroupIndex {
        GroupIndex(0)
    }

    pub fn node(&self, idx: GroupIndex) -> &GroupNode {
        &self.nodes[idx.0]
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn indices(&self) -> impl Iterator<Item = GroupIndex> {
        (0..self.nodes.len()).map(GroupIndex)
    }

    /// Look up a group by its resource name.
    pub fn find(&self, group_id: &str) -> Option<GroupIndex> {
        self.nodes
            .iter()
            .position(|n| n.meta.group_id == group_id)
            .map(GroupIndex)
    }

    /// Snapshot of one group's aggregates.
    pub fn aggregates(&self, idx: GroupIndex) -> GroupAggregates {
        self.node(idx).lock_state().clone()
    }

    pub fn root_summary(&self) -> StatusSummary {
        self.aggregates(Self::root()).summary
    }

    /// Record the moment dispatch reaches this group, for duration
    /// reporting on completion.
    pub fn mark_started(&self, idx: GroupIndex) {
        let mut state = self.node(idx).lock_state();
        if state.started_at.is_none() {
            state.started_at = Some(Instant::now());
        }
    }

    /// Merge a leaf's summary into this group and every ancestor.
    pub fn update_summary(&self, from: GroupIndex, summary: &StatusSummary) {
        let mut current = Some(from);
        while let Some(idx) = current {
            let node = self.node(idx);
            node.lock_state().summary.merge(summary);
            current = node.parent;
        }
    }

    /// Merge a leaf's summary under a severity label, up the parent chain.
    pub fn update_severity(&self, from: GroupIndex, label: &str, summary: &StatusSummary) {
        let mut current = Some(from);
        while let Some(idx) = current {
            let node = self.node(idx);
            merge_severity(&mut node.lock_state().severity, label, summary);
            current = node.parent;
        }
    }

    /// Union a leaf's dimension column names into this group and every
    /// ancestor, keeping each node's list sorted and deduplicated.
    pub fn add_dimension_keys(&self, from: GroupIndex, keys: &[String]) {
        if keys.is_empty() {
            return;
        }
        let mut current = Some(from);
        while let Some(idx) = current {
            let node = self.node(idx);
            {
                let mut state = node.lock_state();
                state.dimension_keys.extend(keys.iter().cloned());
                state.dimension_keys.sort();
                state.dimension_keys.dedup();
            }
            current = node.parent;
        }
    }

    /// One direct child of `from` has reached a terminal state.
    ///
    /// When the last child reports, the group records its duration and
    /// reports itself done to its parent; completion of the root fires the
    /// tree-done channel.
    pub fn child_done(&self, from: GroupIndex) {
        let mut current = Some(from);
        while let Some(idx) = current {
            let node = self.node(idx);
            let done = node.completed.fetch_add(1, Ordering::AcqRel) + 1;
            if done < node.total_children {
                return;
            }
            if done > node.total_children {
                // a leaf reported twice; transition guards should make
                // this unreachable
                warn!(group = %node.meta.group_id, "group over-reported child completions");
                return;
            }

            {
                let mut state = node.lock_state();
                if let Some(started) = state.started_at {
                    state.duration = Some(started.elapsed());
                }
            }
            debug!(
                group = %node.meta.group_id,
                children = node.total_children,
                "group complete"
            );
            current = node.parent;
        }
        self.signal_done();
    }

    /// Fire the tree-done channel. Idempotent.
    pub(crate) fn signal_done(&self) {
        let sender = self
            .done
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(sender) = sender {
            let _ = sender.send(());
        }
    }
}

struct BuildNode {
    meta: GroupMeta,
    parent: Option<GroupIndex>,
    child_groups: Vec<GroupIndex>,
    children: Vec<TreeChild>,
    leaf_names: Vec<String>,
}

/// Two-phase construction: groups and leaf names first, leaf handles
/// resolved at [`GroupTreeBuilder::build`] once all runs exist.
pub struct GroupTreeBuilder {
    nodes: Vec<BuildNode>,
}

impl GroupTreeBuilder {
    pub fn new() -> Self {
        let mut builder = Self { nodes: Vec::new() };
        builder.push(GroupMeta::root(), None);
        builder
    }

    fn push(&mut self, meta: GroupMeta, parent: Option<GroupIndex>) -> GroupIndex {
        let idx = GroupIndex(self.nodes.len());
        self.nodes.push(BuildNode {
            meta,
            parent,
            child_groups: Vec::new(),
            children: Vec::new(),
            leaf_names: Vec::new(),
        });
        idx
    }

    /// Add a group under `parent`, registering it as that parent's child.
    pub fn add_group(&mut self, meta: GroupMeta, parent: GroupIndex) -> GroupIndex {
        let idx = self.push(meta, Some(parent));
        let parent_node = &mut self.nodes[parent.0];
        parent_node.child_groups.push(idx);
        parent_node.children.push(TreeChild::Group(idx));
        idx
    }

    /// Attach a leaf to `parent` by name; the handle is bound in `build`.
    pub fn add_leaf(&mut self, parent: GroupIndex, name: &str) {
        let parent_node = &mut self.nodes[parent.0];
        parent_node.leaf_names.push(name.to_string());
        parent_node.children.push(TreeChild::Leaf(name.to_string()));
    }

    /// Resolve leaf names against the constructed runs and freeze child
    /// totals. Returns the tree and the receiver fired on root completion.
    pub fn build(
        self,
        runs: &std::collections::HashMap<String, LeafHandle>,
    ) -> (GroupTree, oneshot::Receiver<()>) {
        let nodes = self
            .nodes
            .into_iter()
            .map(|n| {
                let leaves: Vec<LeafHandle> = n
                    .leaf_names
                    .iter()
                    .filter_map(|name| runs.get(name).cloned())
                    .collect();
                let total_children = (n.child_groups.len() + leaves.len()) as u32;
                GroupNode {
                    meta: n.meta,
                    parent: n.parent,
                    child_groups: n.child_groups,
                    leaves,
                    children: n.children,
                    total_children,
                    completed: AtomicU32::new(0),
                    state: Mutex::new(GroupAggregates::default()),
                }
            })
            .collect();

        let (tx, rx) = oneshot::channel();
        (
            GroupTree {
                nodes,
                done: Mutex::new(Some(tx)),
            },
            rx,
        )
    }
}

impl Default for GroupTreeBuilder {
    fn default() -> Self {
        Self::new()
    }
}
