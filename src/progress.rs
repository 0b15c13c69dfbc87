//! 一行进度描述

use crate::remote::WriterStatistics;

/// 由写入进程统计生成进度文字
pub fn progress_message(stats: Option<&WriterStatistics>) -> String {
    let Some(stats) = stats else {
        return "Writer: Status not available".to_string();
    };

    let status = stats.status.as_deref().unwrap_or("unknown");
    let received = stats.n_received_frames.unwrap_or(0);
    let written = stats.n_written_frames.unwrap_or(0);

    match stats.n_frames.filter(|n| *n > 0) {
        Some(requested) => format!(
            "Writer: {}, #received: {:4} ({:.1}%), #written: {:4} ({:.1}%)",
            status,
            received,
            percent(received, requested),
            written,
            percent(written, requested),
        ),
        None => format!("Writer: {}, #received: {:4}, #written: {:4}", status, received, written),
    }
}

fn percent(part: u64, total: u64) -> f64 {
    part as f64 / total as f64 * 100.0
}
