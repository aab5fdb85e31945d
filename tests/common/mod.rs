#![allow(dead_code)]

use std::sync::Arc;

use checktree::execute::{ExecutionTree, RunContext};
use checktree::query::QueryClient;
use checktree::status::EventSink;
use checktree::types::RunConfig;
use checktree::workspace::Workspace;

pub use checktree_test_utils::{init_tracing, with_timeout};

/// Build an execution tree for `targets` and drive it to completion.
pub async fn run_tree(
    workspace: &Workspace,
    targets: &[&str],
    client: Arc<dyn QueryClient>,
    config: RunConfig,
    events: Arc<dyn EventSink>,
) -> ExecutionTree {
    let tree = build_tree(workspace, targets, client, config, events);
    tree.execute(RunContext::new())
        .await
        .expect("execution failed");
    tree
}

/// Build an execution tree without executing it.
pub fn build_tree(
    workspace: &Workspace,
    targets: &[&str],
    client: Arc<dyn QueryClient>,
    config: RunConfig,
    events: Arc<dyn EventSink>,
) -> ExecutionTree {
    let targets: Vec<String> = targets.iter().map(|t| t.to_string()).collect();
    ExecutionTree::new(workspace, &targets, client, config, events)
        .expect("failed to build execution tree")
}

/// Assert that every group's completion counter matches its child count.
pub fn assert_all_groups_complete(tree: &ExecutionTree) {
    let groups = tree.group_tree();
    for idx in groups.indices() {
        let node = groups.node(idx);
        assert_eq!(
            node.completed_children(),
            node.total_children,
            "group '{}' did not complete exactly",
            node.meta.group_id
        );
    }
}
