//! Terminal rendering of run results (spec.md §6 "Output").

use comfy_table::{presets::UTF8_FULL, Cell, Color, Table};
use sqlsched::{DagReport, RunReport, TaskState};

pub fn render_dag_report(report: &DagReport) -> String {
    if !report.cycles.is_empty() {
        let mut out = String::from("dependency cycle(s) detected:\n");
        for cycle in &report.cycles {
            let path = cycle
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join(" -> ");
            out.push_str("  ");
            out.push_str(&path);
            out.push('\n');
        }
        return out;
    }
    format!(
        "{} tasks, {} edges — no cycles",
        report.task_count, report.edge_count
    )
}

pub fn render_run_report(report: &RunReport) -> String {
    let mut table = Table::new();
    table.load_preset(UTF8_FULL);
    table.set_header(vec!["task", "state", "duration", "cause"]);

    for result in &report.results {
        let state_cell = Cell::new(result.state.to_string()).fg(match result.state {
            TaskState::Success => Color::Green,
            TaskState::Failed => Color::Red,
            TaskState::Skipped => Color::Yellow,
            _ => Color::Grey,
        });
        table.add_row(vec![
            Cell::new(result.id.to_string()),
            state_cell,
            Cell::new(format!("{:.2?}", result.duration)),
            Cell::new(result.cause.clone().unwrap_or_default()),
        ]);
    }

    table.to_string()
}
