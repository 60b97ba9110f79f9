//! Prometheus metrics formatting.

use std::fmt::Write;

use crate::store::TaskStore;

/// Collect task metrics from the store and format them as Prometheus text.
pub async fn collect_metrics(store: &TaskStore) -> String {
    let counts = store.task_state_counts().await;
    let mut output = String::new();

    writeln!(
        output,
        "# HELP annobench_tasks_total Number of experiment tasks by state"
    )
    .ok();
    writeln!(output, "# TYPE annobench_tasks_total gauge").ok();
    for (state, count) in [
        ("pending", counts.pending),
        ("running", counts.running),
        ("finished", counts.finished),
        ("error", counts.error),
    ] {
        writeln!(output, "annobench_tasks_total{{state=\"{state}\"}} {count}").ok();
    }

    writeln!(output).ok();
    writeln!(
        output,
        "# HELP annobench_result_caching_enabled Whether computed results are reused"
    )
    .ok();
    writeln!(output, "# TYPE annobench_result_caching_enabled gauge").ok();
    writeln!(
        output,
        "annobench_result_caching_enabled {}",
        u8::from(store.caching_enabled())
    )
    .ok();

    output
}
