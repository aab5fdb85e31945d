mod common;

use std::sync::Arc;
use std::time::Duration;

use proptest::prelude::*;

use checktree::status::{NoopSink, Status, StatusSummary};
use checktree::types::RunConfig;
use checktree_test_utils::builders::{ControlBuilder, WorkspaceBuilder};
use checktree_test_utils::fake_client::{status_rows, FakeQueryClient, Script};

use common::{assert_all_groups_complete, run_tree};

const STATUSES: [&str; 5] = ["ok", "alarm", "error", "info", "skip"];

proptest! {
    #![proptest_config(ProptestConfig::with_cases(16))]

    // Child completion order is randomized via per-control delays; the root
    // summary must always equal the pointwise sum of the leaf summaries and
    // every group must complete exactly once.
    #[test]
    fn root_summary_is_order_independent(
        benches in proptest::collection::vec(
            proptest::collection::vec((0..5usize, 0..10u64), 1..4),
            1..4,
        ),
        max_parallel in 1..4usize,
    ) {
        let rt = tokio::runtime::Runtime::new().expect("runtime");
        rt.block_on(async move {
            let mut builder = WorkspaceBuilder::new();
            let client = FakeQueryClient::new();
            let mut bench_names = Vec::new();
            let mut expected = StatusSummary::default();

            for (bi, controls) in benches.iter().enumerate() {
                let mut children = Vec::new();
                for (ci, (status_idx, delay_ms)) in controls.iter().enumerate() {
                    let name = format!("c_{bi}_{ci}");
                    let query = format!("q_{bi}_{ci}");
                    let status = STATUSES[*status_idx];
                    builder = builder.with_control(&name, ControlBuilder::new(&query).build());
                    client.script(
                        &query,
                        Script::RespondAfter(
                            Duration::from_millis(*delay_ms),
                            status_rows(&[status]),
                        ),
                    );
                    expected.add(status.parse::<Status>().expect("known status"));
                    children.push(name);
                }
                let children: Vec<&str> = children.iter().map(String::as_str).collect();
                let bench_name = format!("b_{bi}");
                builder = builder.with_benchmark(&bench_name, &children);
                bench_names.push(bench_name);
            }

            let top_children: Vec<&str> = bench_names.iter().map(String::as_str).collect();
            let workspace = builder.with_benchmark("top", &top_children).build();

            let config = RunConfig { max_parallel, ..RunConfig::default() };
            let tree = run_tree(&workspace, &["top"], client, config, Arc::new(NoopSink)).await;

            assert_eq!(tree.root_summary(), expected);
            assert_all_groups_complete(&tree);
        });
    }
}
