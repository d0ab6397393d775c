use chrono::Utc;

use crate::models::{
    AiSummary, DataSource, PeriodMetrics, Priority, Recommendation, ReferralType,
};

pub const GENERATED_BY: &str = "rules";

pub fn conversion_priority(rate: f64) -> Option<Priority> {
    match rate {
        r if r < 0.30 => Some(Priority::High),
        r if r < 0.50 => Some(Priority::Medium),
        _ => None,
    }
}

pub fn cost_priority(cost_per_new_patient: f64) -> Option<Priority> {
    match cost_per_new_patient {
        c if c > 1000.0 => Some(Priority::High),
        c if c > 500.0 => Some(Priority::Medium),
        _ => None,
    }
}

/// Channel with the largest share of referrals, if any referrals were recorded.
pub fn dominant_channel(metrics: &PeriodMetrics) -> Option<(ReferralType, f64)> {
    if metrics.practice.new_patients == 0 {
        return None;
    }

    ReferralType::ALL
        .into_iter()
        .map(|channel| (channel, metrics.practice.referral_rates.get(channel)))
        .max_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal))
}

fn recommendations_for(metrics: &PeriodMetrics) -> Vec<Recommendation> {
    let label = format!("{} ({})", metrics.period.name, metrics.location_name);
    let mut recommendations = Vec::new();

    if metrics.practice.consultations > 0 {
        if let Some(priority) = conversion_priority(metrics.practice.conversion_rate) {
            recommendations.push(Recommendation {
                title: format!("Improve consult conversion for {label}"),
                detail: format!(
                    "Only {:.0}% of consultations converted to starts. Review consult follow-up and financing options.",
                    metrics.practice.conversion_rate * 100.0
                ),
                priority,
            });
        }
    }

    if let Some(priority) = cost_priority(metrics.acquisition.cost_per_new_patient) {
        recommendations.push(Recommendation {
            title: format!("Reduce acquisition cost for {label}"),
            detail: format!(
                "Marketing spend is ${:.2} per new patient. Shift budget toward the channels that convert best.",
                metrics.acquisition.cost_per_new_patient
            ),
            priority,
        });
    }

    if metrics.accounting.net_income < 0.0 {
        recommendations.push(Recommendation {
            title: format!("Net loss in {label}"),
            detail: format!(
                "Expenses exceeded revenue by ${:.2}.",
                -metrics.accounting.net_income
            ),
            priority: Priority::High,
        });
    }

    if let Some((channel, share)) = dominant_channel(metrics) {
        recommendations.push(Recommendation {
            title: format!("{} referrals lead in {label}", capitalize(channel.as_str())),
            detail: format!(
                "{:.0}% of new patients came from {} referrals.",
                share * 100.0,
                channel
            ),
            priority: Priority::Low,
        });
    }

    if metrics.sources.practice == DataSource::Fallback
        || metrics.sources.accounting == DataSource::Fallback
    {
        recommendations.push(Recommendation {
            title: format!("Incomplete data for {label}"),
            detail: "One or more data sources were unavailable, so figures may read as zero."
                .to_string(),
            priority: Priority::Medium,
        });
    }

    recommendations
}

pub fn rule_based_summary(metrics: &[PeriodMetrics]) -> AiSummary {
    let new_patients: i64 = metrics.iter().map(|m| m.practice.new_patients).sum();
    let revenue: f64 = metrics.iter().map(|m| m.accounting.revenue).sum();
    let marketing: f64 = metrics.iter().map(|m| m.acquisition.total_cost).sum();

    let summary = if metrics.is_empty() {
        "No periods were provided.".to_string()
    } else {
        format!(
            "Across {} period(s): {} new patients, ${:.2} revenue and ${:.2} acquisition spend.",
            metrics.len(),
            new_patients,
            revenue,
            marketing
        )
    };

    let mut recommendations: Vec<Recommendation> =
        metrics.iter().flat_map(recommendations_for).collect();
    recommendations.sort_by_key(|r| r.priority);

    AiSummary {
        summary,
        recommendations,
        generated_by: GENERATED_BY.to_string(),
        generated_at: Utc::now(),
    }
}

fn capitalize(value: &str) -> String {
    let mut chars = value.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;
    use uuid::Uuid;

    use super::*;
    use crate::models::{
        AccountingSnapshot, AcquisitionSummary, ByReferral, MetricSources, Period,
        PracticeSnapshot,
    };

    fn sample_metrics(conversion_rate: f64, cost_per_new_patient: f64, net_income: f64) -> PeriodMetrics {
        PeriodMetrics {
            period: Period {
                name: "Q1".to_string(),
                start_date: NaiveDate::from_ymd_opt(2025, 1, 1).unwrap(),
                end_date: NaiveDate::from_ymd_opt(2025, 3, 31).unwrap(),
                location_id: Uuid::new_v4(),
            },
            location_name: "Downtown".to_string(),
            months: vec!["2025-01".into(), "2025-02".into(), "2025-03".into()],
            practice: PracticeSnapshot {
                new_patients: 20,
                consultations: 10,
                starts: 4,
                referrals: ByReferral {
                    digital: 12,
                    professional: 5,
                    direct: 3,
                },
                referral_rates: ByReferral {
                    digital: 0.6,
                    professional: 0.25,
                    direct: 0.15,
                },
                conversion_rate,
            },
            accounting: AccountingSnapshot {
                revenue: 50000.0,
                expenses: 50000.0 - net_income,
                net_income,
            },
            acquisition: AcquisitionSummary {
                total_cost: cost_per_new_patient * 20.0,
                cost_count: 3,
                average_cost: cost_per_new_patient * 20.0 / 3.0,
                by_referral_type: Vec::new(),
                cost_per_new_patient,
            },
            sources: MetricSources {
                practice: DataSource::Live,
                accounting: DataSource::Live,
            },
        }
    }

    #[test]
    fn priorities_follow_expected_tiers() {
        assert_eq!(conversion_priority(0.1), Some(Priority::High));
        assert_eq!(conversion_priority(0.4), Some(Priority::Medium));
        assert_eq!(conversion_priority(0.7), None);
        assert_eq!(cost_priority(1500.0), Some(Priority::High));
        assert_eq!(cost_priority(600.0), Some(Priority::Medium));
        assert_eq!(cost_priority(200.0), None);
    }

    #[test]
    fn finds_dominant_channel() {
        let metrics = sample_metrics(0.6, 100.0, 1000.0);
        assert_eq!(
            dominant_channel(&metrics),
            Some((ReferralType::Digital, 0.6))
        );
    }

    #[test]
    fn healthy_period_only_gets_channel_note() {
        let summary = rule_based_summary(&[sample_metrics(0.6, 100.0, 1000.0)]);
        assert_eq!(summary.generated_by, "rules");
        assert_eq!(summary.recommendations.len(), 1);
        assert_eq!(summary.recommendations[0].priority, Priority::Low);
        assert!(summary.recommendations[0].title.starts_with("Digital referrals lead"));
        assert!(summary.summary.contains("20 new patients"));
    }

    #[test]
    fn struggling_period_sorts_high_priority_first() {
        let summary = rule_based_summary(&[sample_metrics(0.2, 700.0, -2500.0)]);
        let priorities: Vec<Priority> = summary.recommendations.iter().map(|r| r.priority).collect();

        assert_eq!(
            priorities,
            vec![Priority::High, Priority::High, Priority::Medium, Priority::Low]
        );
        assert!(summary.recommendations.iter().any(|r| r.detail.contains("$2500.00")));
    }

    #[test]
    fn flags_fallback_data() {
        let mut metrics = sample_metrics(0.6, 100.0, 1000.0);
        metrics.sources.accounting = DataSource::Fallback;
        let summary = rule_based_summary(&[metrics]);
        assert!(summary.recommendations.iter().any(|r| r.title.starts_with("Incomplete data")));
    }

    #[test]
    fn empty_input_has_no_recommendations() {
        let summary = rule_based_summary(&[]);
        assert!(summary.recommendations.is_empty());
        assert_eq!(summary.summary, "No periods were provided.");
    }
}
