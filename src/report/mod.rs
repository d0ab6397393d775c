pub mod markdown;
pub mod pdf;

use chrono::Utc;
use tracing::warn;

use crate::models::{PeriodMetrics, ReportType, Session};

/// Metrics saved with a session; anything that does not parse is ignored.
pub fn session_metrics(session: &Session) -> Vec<PeriodMetrics> {
    if session.data.is_null() {
        return Vec::new();
    }

    match serde_json::from_value::<Vec<PeriodMetrics>>(session.data.clone()) {
        Ok(metrics) => metrics,
        Err(e) => {
            warn!(session_id = %session.id, "Session data is not period metrics: {e}");
            Vec::new()
        }
    }
}

pub fn render(session: &Session, report_type: ReportType) -> Vec<u8> {
    let metrics = session_metrics(session);
    let text = markdown::build_report(session, &metrics, Utc::now());

    match report_type {
        ReportType::Markdown => text.into_bytes(),
        ReportType::Pdf => pdf::render_pdf(&text),
    }
}

pub fn file_name(name: &str, report_type: ReportType) -> String {
    let stem: String = name
        .chars()
        .map(|ch| if ch.is_ascii_alphanumeric() || ch == '-' || ch == '_' { ch } else { '_' })
        .collect();
    let stem = stem.trim_matches('_');
    let stem = if stem.is_empty() { "report" } else { stem };

    format!("{stem}.{}", report_type.extension())
}
