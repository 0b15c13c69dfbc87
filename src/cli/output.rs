//! Output formatting for CLI commands

use serde::Serialize;

use crate::controller::{Outcome, RunStatus};

/// JSON 输出（--json），失败时输出空对象
pub fn format_output<T: Serialize>(data: &T) -> String {
    serde_json::to_string_pretty(data).unwrap_or_else(|_| "{}".to_string())
}

/// 人类可读的 run 状态
pub fn format_run_status(status: &RunStatus) -> String {
    let mut lines = vec![
        format!("run:       {}", status.run_id),
        format!("phase:     {}", status.phase),
    ];
    if let Some(remote) = &status.remote_phase {
        lines.push(format!("remote:    {}", remote));
    }
    if status.expected_frames > 0 {
        lines.push(format!(
            "frames:    {} written / {} received / {} expected",
            status.written_frames, status.received_frames, status.expected_frames
        ));
    } else {
        lines.push(format!(
            "frames:    {} written / {} received",
            status.written_frames, status.received_frames
        ));
    }
    if let Some(started) = status.started_at {
        lines.push(format!("started:   {}", started.format("%Y-%m-%d %H:%M:%S UTC")));
    }
    if let Some(uptime) = status.uptime {
        lines.push(format!("uptime:    {:.1}s", uptime.as_secs_f64()));
    }
    if let Some(error) = &status.last_error {
        lines.push(format!("error:     {}", error));
    }
    lines.join("\n")
}

/// 等待类操作的结果
pub fn format_outcome(outcome: &Outcome, json: bool) -> String {
    if json {
        format_output(outcome)
    } else {
        format!("{}\n{}", outcome.label(), format_run_status(outcome.status()))
    }
}
