// src/execute/tree.rs

//! Execution-tree construction and dispatch.
//!
//! Building resolves CLI targets against the workspace into a group arena
//! (benchmarks, dashboards, the synthetic root) plus a unique-name index of
//! leaf runs. Empty branches are pruned; a control shared by several
//! benchmarks becomes one run referenced from each parent group.
//!
//! Dispatch walks the groups in pre-order. Control leaves acquire a unit
//! from the global limiter before their task is spawned, so dispatch itself
//! back-pressures on capacity; panel leaves spawn immediately and scope
//! their permit to the query call (see [`crate::dashboard::panel_run`]).

use std::collections::{BTreeMap, HashMap};
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{SystemTime, UNIX_EPOCH};

use futures::FutureExt;
use serde::Serialize;
use tokio::sync::{oneshot, Semaphore};
use tracing::{debug, info};

use crate::dashboard::panel_run::{spawn_panel, PanelRun};
use crate::errors::Result;
use crate::execute::group::{GroupIndex, GroupMeta, GroupTree, GroupTreeBuilder, TreeChild};
use crate::execute::{
    acquire_permit, panic_message, ControlRun, ExecError, LeafHandle, RunContext, RunEnv,
};
use crate::query::QueryClient;
use crate::status::{EventSink, SeveritySummary, StatusSummary};
use crate::types::{RunConfig, RunOutcome};
use crate::workspace::{Target, Workspace};

/// A fully built tree, ready to execute once.
pub struct ExecutionTree {
    pub execution_id: String,
    config: RunConfig,
    client: Arc<dyn QueryClient>,
    events: Arc<dyn EventSink>,
    tree: Arc<GroupTree>,
    runs: HashMap<String, LeafHandle>,
    limiter: Arc<Semaphore>,
    done_rx: Mutex<Option<oneshot::Receiver<()>>>,
}

impl ExecutionTree {
    /// Resolve `targets` against the workspace and assemble the tree.
    pub fn new(
        workspace: &Workspace,
        targets: &[String],
        client: Arc<dyn QueryClient>,
        config: RunConfig,
        events: Arc<dyn EventSink>,
    ) -> Result<Self> {
        let mut builder = GroupTreeBuilder::new();
        let mut runs: HashMap<String, LeafHandle> = HashMap::new();
        let mut control_parents: BTreeMap<String, Vec<GroupIndex>> = BTreeMap::new();
        let root = GroupTree::root();

        let mut seen = Vec::new();
        for target in targets {
            if seen.contains(target) {
                continue;
            }
            seen.push(target.clone());

            match workspace.resolve_target(target)? {
                Target::Benchmark(name) => {
                    if workspace.benchmark_leaf_count(&name) == 0 {
                        debug!(benchmark = %name, "skipping benchmark with no controls");
                        continue;
                    }
                    add_benchmark(workspace, &mut builder, &mut control_parents, &name, root);
                }
                Target::Control(name) => {
                    builder.add_leaf(root, &name);
                    control_parents.entry(name).or_default().push(root);
                }
                Target::Dashboard(name) => {
                    add_dashboard(workspace, &mut builder, &mut runs, &name, root);
                }
            }
        }

        for (name, parents) in control_parents {
            let def = workspace
                .controls
                .get(&name)
                .cloned()
                .ok_or_else(|| crate::errors::ChecktreeError::ResourceNotFound(name.clone()))?;
            runs.insert(name, LeafHandle::Control(ControlRun::new(def, parents)));
        }

        let (tree, done_rx) = builder.build(&runs);
        let execution_id = execution_id();
        info!(
            execution = %execution_id,
            groups = tree.len(),
            runs = runs.len(),
            "execution tree built"
        );

        Ok(Self {
            execution_id,
            limiter: Arc::new(Semaphore::new(config.max_parallel)),
            config,
            client,
            events,
            tree: Arc::new(tree),
            runs,
            done_rx: Mutex::new(Some(done_rx)),
        })
    }

    /// Dispatch every leaf and wait for the root to complete.
    ///
    /// Returns once all leaves have reached a terminal state, including
    /// after cancellation (cancelled leaves error out rather than hang).
    pub async fn execute(&self, ctx: RunContext) -> Result<()> {
        let done_rx = self
            .done_rx
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
            .ok_or_else(|| anyhow::anyhow!("execution tree has already been executed"))?;

        let env = Arc::new(RunEnv {
            ctx,
            client: self.client.clone(),
            limiter: self.limiter.clone(),
            tree: self.tree.clone(),
            events: self.events.clone(),
            runs: self.runs.clone(),
            dry_run: self.config.dry_run,
        });

        info!(
            execution = %self.execution_id,
            max_parallel = self.config.max_parallel,
            dry_run = self.config.dry_run,
            "starting execution"
        );

        // a shared leaf appears in several parents' leaf lists but must be
        // dispatched once; its single report covers every parent
        let mut dispatched: std::collections::HashSet<&str> = std::collections::HashSet::new();

        let mut stack = vec![GroupTree::root()];
        while let Some(idx) = stack.pop() {
            env.tree.mark_started(idx);
            let node = env.tree.node(idx);

            for leaf in &node.leaves {
                if !dispatched.insert(leaf.name()) {
                    continue;
                }
                if env.ctx.is_cancelled() {
                    leaf.fail(&env, env.ctx.cancellation_error());
                    continue;
                }
                // dry runs never touch the limiter
                if env.dry_run {
                    leaf.skip(&env);
                    continue;
                }

                match leaf {
                    LeafHandle::Control(run) => {
                        // acquiring here bounds in-flight control tasks;
                        // dispatch stalls when the limiter is exhausted
                        let permit = match acquire_permit(&env).await {
                            Ok(permit) => permit,
                            Err(error) => {
                                leaf.fail(&env, error);
                                continue;
                            }
                        };
                        let run = run.clone();
                        let env = env.clone();
                        tokio::spawn(async move {
                            let result = AssertUnwindSafe(run.execute(&env)).catch_unwind().await;
                            if let Err(payload) = result {
                                run.set_error(&env, ExecError::Panic(panic_message(&payload)));
                            }
                            drop(permit);
                        });
                    }
                    LeafHandle::Panel(run) => {
                        spawn_panel(run.clone(), env.clone());
                    }
                }
            }

            for child in node.child_groups.iter().rev() {
                stack.push(*child);
            }
        }

        if env.tree.node(GroupTree::root()).total_children == 0 {
            env.tree.signal_done();
        }

        // fires when the root's last child reports
        let _ = done_rx.await;
        info!(
            execution = %self.execution_id,
            summary = %self.root_summary(),
            "execution complete"
        );
        Ok(())
    }

    pub fn root_summary(&self) -> StatusSummary {
        self.tree.root_summary()
    }

    pub fn run_outcome(&self) -> RunOutcome {
        RunOutcome::from_summary(&self.root_summary())
    }

    pub fn group_tree(&self) -> &Arc<GroupTree> {
        &self.tree
    }

    pub fn leaf(&self, name: &str) -> Option<&LeafHandle> {
        self.runs.get(name)
    }

    pub fn leaves(&self) -> impl Iterator<Item = &LeafHandle> {
        self.runs.values()
    }

    /// Limiter capacity currently available. Equals `max_parallel` once a
    /// run has fully completed (permits are conserved, panics included).
    pub fn available_permits(&self) -> usize {
        self.limiter.available_permits()
    }

    /// Immutable snapshot of the whole tree for rendering/serialization.
    pub fn as_tree_node(&self) -> TreeNode {
        self.group_node(GroupTree::root())
    }

    fn group_node(&self, idx: GroupIndex) -> TreeNode {
        let node = self.tree.node(idx);
        let aggregates = self.tree.aggregates(idx);

        let children = node
            .children
            .iter()
            .map(|child| match child {
                TreeChild::Group(group) => self.group_node(*group),
                TreeChild::Leaf(name) => self.leaf_node(name),
            })
            .collect();

        TreeNode {
            name: node.meta.group_id.clone(),
            title: node.meta.title.clone(),
            node_type: node.meta.node_type.to_string(),
            summary: Some(aggregates.summary),
            severity: (!aggregates.severity.is_empty()).then_some(aggregates.severity),
            dimension_keys: aggregates.dimension_keys,
            status: None,
            error: None,
            children,
        }
    }

    fn leaf_node(&self, name: &str) -> TreeNode {
        let Some(leaf) = self.runs.get(name) else {
            // unreachable: the builder only binds names present in runs
            return TreeNode {
                name: name.to_string(),
                ..TreeNode::default()
            };
        };
        TreeNode {
            name: name.to_string(),
            title: None,
            node_type: leaf.node_type().to_string(),
            summary: Some(leaf.summary()),
            severity: None,
            dimension_keys: Vec::new(),
            status: Some(leaf.status().as_str().to_string()),
            error: leaf.error().map(|e| e.to_string()),
            children: Vec::new(),
        }
    }
}

/// Serializable snapshot of one node of the executed tree.
#[derive(Debug, Clone, Default, Serialize)]
pub struct TreeNode {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    pub node_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<StatusSummary>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub severity: Option<SeveritySummary>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub dimension_keys: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<TreeNode>,
}

fn add_benchmark(
    workspace: &Workspace,
    builder: &mut GroupTreeBuilder,
    control_parents: &mut BTreeMap<String, Vec<GroupIndex>>,
    name: &str,
    parent: GroupIndex,
) {
    let Some(def) = workspace.benchmarks.get(name) else {
        return;
    };
    let idx = builder.add_group(
        GroupMeta {
            group_id: def.name.clone(),
            title: def.title.clone(),
            description: def.description.clone(),
            documentation: def.documentation.clone(),
            display: def.display.clone(),
            tags: def.tags.clone(),
            node_type: "benchmark",
        },
        parent,
    );

    for child in &def.children {
        if workspace.controls.contains_key(child) {
            builder.add_leaf(idx, child);
            control_parents.entry(child.clone()).or_default().push(idx);
        } else if workspace.benchmark_leaf_count(child) > 0 {
            add_benchmark(workspace, builder, control_parents, child, idx);
        } else {
            debug!(benchmark = %child, "pruning benchmark with no controls");
        }
    }
}

fn add_dashboard(
    workspace: &Workspace,
    builder: &mut GroupTreeBuilder,
    runs: &mut HashMap<String, LeafHandle>,
    name: &str,
    parent: GroupIndex,
) {
    let Some(def) = workspace.dashboards.get(name) else {
        return;
    };
    if def.panels.is_empty() {
        debug!(dashboard = %name, "skipping dashboard with no panels");
        return;
    }

    let idx = builder.add_group(
        GroupMeta {
            group_id: def.name.clone(),
            title: def.title.clone(),
            description: def.description.clone(),
            documentation: None,
            display: None,
            tags: def.tags.clone(),
            node_type: "dashboard",
        },
        parent,
    );

    // with-runs are shared across the panels of one dashboard: the first
    // declaring panel creates the run, later panels reuse it
    let mut scope_withs: HashMap<String, Arc<PanelRun>> = HashMap::new();
    for panel_name in &def.panels {
        let Some(panel_def) = workspace.panels.get(panel_name) else {
            continue;
        };
        let with_runs: Vec<Arc<PanelRun>> = panel_def
            .withs
            .iter()
            .filter_map(|with_name| {
                let with_def = workspace.withs.get(with_name)?;
                Some(
                    scope_withs
                        .entry(with_name.clone())
                        .or_insert_with(|| PanelRun::new_with(with_def))
                        .clone(),
                )
            })
            .collect();

        let run = PanelRun::new_panel(panel_def, with_runs, vec![idx]);
        runs.insert(panel_name.clone(), LeafHandle::Panel(run));
        builder.add_leaf(idx, panel_name);
    }
    for (with_name, run) in scope_withs {
        runs.insert(with_name, LeafHandle::Panel(run));
    }
}

fn execution_id() -> String {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos())
        .unwrap_or_default();
    format!("{nanos:x}")
}
