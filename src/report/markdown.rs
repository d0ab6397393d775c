use std::fmt::Write;

use chrono::{DateTime, Utc};

use crate::models::{AiSummary, DataSource, PeriodMetrics, ReferralType, Session};

fn source_label(source: DataSource) -> &'static str {
    match source {
        DataSource::Live => "live",
        DataSource::Cached => "cached",
        DataSource::Fallback => "unavailable",
    }
}

fn write_metrics(output: &mut String, metrics: &PeriodMetrics) {
    let practice = &metrics.practice;
    let accounting = &metrics.accounting;
    let acquisition = &metrics.acquisition;

    let _ = writeln!(
        output,
        "### {} - {} ({} to {})",
        metrics.period.name, metrics.location_name, metrics.period.start_date, metrics.period.end_date
    );
    let _ = writeln!(output, "- New patients: {}", practice.new_patients);
    let _ = writeln!(
        output,
        "- Consultations / starts: {} / {} (conversion {:.1}%)",
        practice.consultations,
        practice.starts,
        practice.conversion_rate * 100.0
    );

    let referrals: Vec<String> = ReferralType::ALL
        .into_iter()
        .map(|channel| {
            format!(
                "{} {} ({:.1}%)",
                channel,
                practice.referrals.get(channel),
                practice.referral_rates.get(channel) * 100.0
            )
        })
        .collect();
    let _ = writeln!(output, "- Referrals: {}", referrals.join(", "));

    let _ = writeln!(
        output,
        "- Revenue ${:.2}, expenses ${:.2}, net income ${:.2}",
        accounting.revenue, accounting.expenses, accounting.net_income
    );
    let _ = writeln!(
        output,
        "- Acquisition spend ${:.2} across {} entries (average ${:.2}, ${:.2} per new patient)",
        acquisition.total_cost,
        acquisition.cost_count,
        acquisition.average_cost,
        acquisition.cost_per_new_patient
    );
    let _ = writeln!(
        output,
        "- Data sources: practice {}, accounting {}",
        source_label(metrics.sources.practice),
        source_label(metrics.sources.accounting)
    );
    let _ = writeln!(output);
}

fn write_summary(output: &mut String, summary: &AiSummary) {
    let _ = writeln!(output, "## Summary");
    let _ = writeln!(output, "{}", summary.summary);
    let _ = writeln!(output);
    let _ = writeln!(output, "## Recommendations");

    if summary.recommendations.is_empty() {
        let _ = writeln!(output, "No recommendations.");
    } else {
        for recommendation in &summary.recommendations {
            let priority = format!("{:?}", recommendation.priority).to_uppercase();
            if recommendation.detail.is_empty() {
                let _ = writeln!(output, "- [{priority}] {}", recommendation.title);
            } else {
                let _ = writeln!(
                    output,
                    "- [{priority}] {}: {}",
                    recommendation.title, recommendation.detail
                );
            }
        }
    }
}

pub fn build_report(session: &Session, metrics: &[PeriodMetrics], generated_at: DateTime<Utc>) -> String {
    let mut output = String::new();

    let _ = writeln!(output, "# {}", session.name);
    let _ = writeln!(
        output,
        "Generated {} (session last saved {})",
        generated_at.format("%Y-%m-%d %H:%M UTC"),
        session.updated_at.format("%Y-%m-%d %H:%M UTC")
    );
    let _ = writeln!(output);
    let _ = writeln!(output, "## Periods");

    if session.periods.is_empty() {
        let _ = writeln!(output, "No periods saved in this session.");
    } else {
        for period in &session.periods {
            let _ = writeln!(
                output,
                "- {}: {} to {}",
                period.name, period.start_date, period.end_date
            );
        }
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Metrics");

    if metrics.is_empty() {
        let _ = writeln!(output, "No analytics were saved with this session.");
        let _ = writeln!(output);
    } else {
        for period_metrics in metrics {
            write_metrics(&mut output, period_metrics);
        }
    }

    match &session.ai_summary {
        Some(summary) => write_summary(&mut output, summary),
        None => {
            let _ = writeln!(output, "## Summary");
            let _ = writeln!(output, "No summary was generated for this session.");
        }
    }

    output
}
