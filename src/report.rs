use std::fmt::Write;

use crate::models::{RunReport, TimelineHeatmap};

const SPARK_LEVELS: [char; 8] = ['▁', '▂', '▃', '▄', '▅', '▆', '▇', '█'];

fn clock(seconds: f64) -> String {
    let total = seconds.max(0.0).round() as u64;
    format!("{}:{:02}", total / 60, total % 60)
}

pub fn sparkline(values: &[f64]) -> String {
    values
        .iter()
        .map(|value| {
            let level = (value.clamp(0.0, 1.0) * (SPARK_LEVELS.len() - 1) as f64).round();
            SPARK_LEVELS[level as usize]
        })
        .collect()
}

fn write_heatmap(output: &mut String, heatmap: &TimelineHeatmap) {
    let _ = writeln!(output, "## Risk Timeline");
    if heatmap.values.is_empty() {
        let _ = writeln!(output, "No timeline for an empty transcript.");
        return;
    }

    let _ = writeln!(
        output,
        "`{}` ({} bins of {}s)",
        sparkline(&heatmap.values),
        heatmap.values.len(),
        heatmap.bin_size_sec
    );
    for peak in &heatmap.peaks {
        let _ = writeln!(
            output,
            "- peak at {} (intensity {:.2}, segment {})",
            clock(peak.t as f64 * heatmap.bin_size_sec),
            peak.value,
            peak.segment_id
        );
    }
}

pub fn build_report(title: &str, report: &RunReport) -> String {
    let mut output = String::new();

    let _ = writeln!(output, "# Clarity Risk Report: {title}");
    let _ = writeln!(
        output,
        "Generated {} (run {})",
        report.generated_at.format("%Y-%m-%d %H:%M UTC"),
        report.run_id
    );
    let _ = writeln!(output);
    let _ = writeln!(
        output,
        "**Clarity score {} / 100: {}** across {} windows ({}).",
        report.clarity.score,
        report.clarity.tier,
        report.window_count,
        clock(report.duration_sec)
    );

    let _ = writeln!(output);
    let _ = writeln!(output, "## Issues");

    if report.issues.is_empty() {
        let _ = writeln!(output, "No segments crossed the risk threshold.");
    } else {
        for issue in &report.issues {
            let signals: Vec<&str> = issue
                .signals_triggered
                .iter()
                .map(|signal| signal.display_name())
                .collect();
            let _ = writeln!(
                output,
                "### {}-{} {} ({}, risk {:.2})",
                clock(issue.start_sec),
                clock(issue.end_sec),
                issue.label,
                issue.severity_tier,
                issue.risk
            );
            let _ = writeln!(output, "- Signals: {}", signals.join(", "));
            let _ = writeln!(output, "- Why: {}", issue.explanation);
            let _ = writeln!(output, "- Fix: {}", issue.fix);
            if !issue.evidence.excerpt.is_empty() {
                let _ = writeln!(output, "- Heard: \"{}\"", issue.evidence.excerpt);
            }
            let _ = writeln!(output, "- Honest take: {}", issue.tone.honest);
            let _ = writeln!(output);
        }
    }

    let _ = writeln!(output, "## Signal Mix");

    if report.breakdown.items.is_empty() {
        let _ = writeln!(output, "No signals contributed to flagged segments.");
    } else {
        for item in &report.breakdown.items {
            let _ = writeln!(
                output,
                "- {}: {:.1}% ({} segments, weight {:.2})",
                item.signal.display_name(),
                item.percent,
                item.segments,
                item.weight
            );
        }
    }

    let _ = writeln!(output);
    write_heatmap(&mut output, &report.heatmap);

    if !report.warnings.is_empty() {
        let _ = writeln!(output);
        let _ = writeln!(output, "## Warnings");
        for warning in &report.warnings {
            let _ = writeln!(
                output,
                "- window {} ({}): {}",
                warning.window_id, warning.source, warning.message
            );
        }
    }

    output
}
