//! Human and JSON rendering for CLI commands.
//!
//! JSON goes to stdout verbatim so it can be piped; logs stay on stderr.
use crate::coverage::CoverageSnapshot;
use crate::dispatch::DispatchReport;
use crate::engine::RunReport;
use crate::registry::Category;
use crate::resolver::{BlockReason, ExecutionPlan};
use anyhow::{Context, Result};
use serde::Serialize;

pub fn print_json<T: Serialize>(value: &T) -> Result<()> {
    let text = serde_json::to_string_pretty(value).context("serialize output")?;
    println!("{text}");
    Ok(())
}

/// Left-aligned columns separated by two spaces.
pub fn print_table(headers: &[&str], rows: &[Vec<String>]) {
    for line in format_table(headers, rows) {
        println!("{line}");
    }
}

fn format_table(headers: &[&str], rows: &[Vec<String>]) -> Vec<String> {
    let mut widths: Vec<usize> = headers.iter().map(|header| header.len()).collect();
    for row in rows {
        for (index, cell) in row.iter().enumerate() {
            if let Some(width) = widths.get_mut(index) {
                *width = (*width).max(cell.chars().count());
            }
        }
    }
    let render = |cells: Vec<&str>| {
        cells
            .iter()
            .enumerate()
            .map(|(index, cell)| {
                let width = widths.get(index).copied().unwrap_or(0);
                format!("{cell:width$}")
            })
            .collect::<Vec<_>>()
            .join("  ")
            .trim_end()
            .to_string()
    };

    let separator: Vec<String> = widths.iter().map(|width| "-".repeat(*width)).collect();
    let mut lines = vec![render(headers.to_vec())];
    lines.push(render(separator.iter().map(String::as_str).collect()));
    for row in rows {
        lines.push(render(row.iter().map(String::as_str).collect()));
    }
    lines
}

pub fn percent(value: Option<f64>) -> String {
    match value {
        Some(value) => format!("{value:.2}%"),
        None => "n/a".to_string(),
    }
}

pub fn print_report(report: &RunReport) {
    let rows: Vec<Vec<String>> = report
        .items
        .iter()
        .map(|item| {
            let mut status = item.outcome.status_str().to_string();
            if item.cached {
                status.push_str(" (cached)");
            }
            vec![
                item.item_id.clone(),
                status,
                item.outcome.reason_str().unwrap_or("").to_string(),
                item.outcome.detail().unwrap_or("").to_string(),
            ]
        })
        .collect();
    print_table(&["ITEM", "STATUS", "REASON", "DETAIL"], &rows);
    println!();
    let counts = &report.counts;
    println!(
        "{}: {} passed, {} failed, {} skipped, {} ignored ({} cached)",
        report.status, counts.passed, counts.failed, counts.skipped, counts.ignored, counts.cached
    );
    for cycle in &report.cycles {
        println!("cycle: {}", cycle.join(" -> "));
    }
    if report.cancelled {
        println!("run cancelled; in-progress scenarios were checkpointed");
    }
    if let Some(path) = &report.snapshot_path {
        println!("snapshot: {path}");
    }
}

pub fn print_plan(plan: &ExecutionPlan) {
    println!("scope: {}", plan.scope);
    for (index, wave) in plan.waves.iter().enumerate() {
        println!("wave {}: {}", index + 1, wave.join(", "));
    }
    for blocked in &plan.blocked {
        let why = match &blocked.reason {
            BlockReason::DependencyUnmet { dependency } => format!("dependency_unmet ({dependency})"),
            BlockReason::CycleDetected { cycle } => format!("cycle ({})", cycle.join(" -> ")),
        };
        println!("blocked: {} {why}", blocked.item_id);
    }
}

pub fn print_coverage(snapshot: &CoverageSnapshot) {
    println!("automated:  {}", percent(snapshot.automated_coverage));
    println!("manual:     {}", percent(snapshot.manual_coverage));
    println!("functional: {}", percent(snapshot.functional_coverage));
    println!("overall:    {}", percent(snapshot.overall_coverage));
    println!();
    let rows: Vec<Vec<String>> = Category::ALL
        .into_iter()
        .map(|category| {
            let breakdown = snapshot.breakdown(category);
            vec![
                category.to_string(),
                breakdown.total.to_string(),
                breakdown.verified.to_string(),
                breakdown.ignored.to_string(),
            ]
        })
        .collect();
    print_table(&["CATEGORY", "TOTAL", "VERIFIED", "IGNORED"], &rows);
    if !snapshot.inconsistencies.is_empty() {
        println!();
        for inconsistency in &snapshot.inconsistencies {
            println!(
                "inconsistent: {} {}: {}",
                inconsistency.item_id,
                inconsistency.kind.as_str(),
                inconsistency.detail
            );
        }
    }
}

pub fn print_dispatch(report: &DispatchReport) {
    if report.exit_code != 0 {
        println!(
            "`{}` exited {}; nothing resolved",
            report.command_name, report.exit_code
        );
    }
    for id in &report.resolved {
        println!("resolved: {id}");
    }
    for id in &report.ignored {
        println!("ignored (left untouched): {id}");
    }
    println!(
        "invalidated cache entries: {}",
        report.invalidated_cache_entries
    );
}
