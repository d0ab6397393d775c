use std::{fmt, str::FromStr};

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReferralType {
    Digital,
    Professional,
    Direct,
}

impl ReferralType {
    pub const ALL: [ReferralType; 3] = [
        ReferralType::Digital,
        ReferralType::Professional,
        ReferralType::Direct,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            ReferralType::Digital => "digital",
            ReferralType::Professional => "professional",
            ReferralType::Direct => "direct",
        }
    }

    /// Maps a free-form referral source from the practice system onto a channel.
    /// Anything unrecognized counts as direct.
    pub fn classify(source: &str) -> Self {
        const DIGITAL: [&str; 10] = [
            "google", "facebook", "instagram", "tiktok", "youtube", "website", "web", "online",
            "social", "yelp",
        ];
        const PROFESSIONAL: [&str; 6] = [
            "dentist", "doctor", "dds", "dmd", "professional", "hygienist",
        ];

        let source = source.trim().to_lowercase();
        if DIGITAL.iter().any(|keyword| source.contains(keyword)) {
            ReferralType::Digital
        } else if PROFESSIONAL.iter().any(|keyword| source.contains(keyword)) {
            ReferralType::Professional
        } else {
            ReferralType::Direct
        }
    }
}

impl fmt::Display for ReferralType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ReferralType {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_lowercase().as_str() {
            "digital" => Ok(ReferralType::Digital),
            "professional" => Ok(ReferralType::Professional),
            "direct" => Ok(ReferralType::Direct),
            other => Err(format!("unknown referral type '{other}'")),
        }
    }
}

/// One value per referral channel.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ByReferral<T> {
    pub digital: T,
    pub professional: T,
    pub direct: T,
}

impl<T: Copy> ByReferral<T> {
    pub fn get(&self, referral_type: ReferralType) -> T {
        match referral_type {
            ReferralType::Digital => self.digital,
            ReferralType::Professional => self.professional,
            ReferralType::Direct => self.direct,
        }
    }

    pub fn get_mut(&mut self, referral_type: ReferralType) -> &mut T {
        match referral_type {
            ReferralType::Digital => &mut self.digital,
            ReferralType::Professional => &mut self.professional,
            ReferralType::Direct => &mut self.direct,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct User {
    pub id: Uuid,
    pub email: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Location {
    pub id: Uuid,
    pub name: String,
    pub external_id: String,
    pub active: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AcquisitionCost {
    pub id: Uuid,
    pub location_id: Uuid,
    pub referral_type: ReferralType,
    pub cost: f64,
    pub period: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A named date range for one location; the unit analytics are bucketed by.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Period {
    pub name: String,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub location_id: Uuid,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DataType {
    Practice,
    Accounting,
}

impl DataType {
    pub fn as_str(self) -> &'static str {
        match self {
            DataType::Practice => "practice",
            DataType::Accounting => "accounting",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DataSource {
    Live,
    Cached,
    Fallback,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PracticeSnapshot {
    pub new_patients: i64,
    pub consultations: i64,
    pub starts: i64,
    pub referrals: ByReferral<i64>,
    pub referral_rates: ByReferral<f64>,
    pub conversion_rate: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AccountingSnapshot {
    pub revenue: f64,
    pub expenses: f64,
    pub net_income: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChannelCost {
    pub referral_type: ReferralType,
    pub total: f64,
    pub count: usize,
    pub average: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AcquisitionSummary {
    pub total_cost: f64,
    pub cost_count: usize,
    pub average_cost: f64,
    pub by_referral_type: Vec<ChannelCost>,
    pub cost_per_new_patient: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MetricSources {
    pub practice: DataSource,
    pub accounting: DataSource,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PeriodMetrics {
    pub period: Period,
    pub location_name: String,
    pub months: Vec<String>,
    pub practice: PracticeSnapshot,
    pub accounting: AccountingSnapshot,
    pub acquisition: AcquisitionSummary,
    pub sources: MetricSources,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    High,
    Medium,
    Low,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Recommendation {
    pub title: String,
    pub detail: String,
    pub priority: Priority,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AiSummary {
    pub summary: String,
    pub recommendations: Vec<Recommendation>,
    pub generated_by: String,
    pub generated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Session {
    pub id: Uuid,
    pub user_id: Uuid,
    pub name: String,
    pub periods: Vec<Period>,
    pub data: Value,
    pub ai_summary: Option<AiSummary>,
    pub metadata: Value,
    pub active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReportType {
    Markdown,
    Pdf,
}

impl ReportType {
    pub fn as_str(self) -> &'static str {
        match self {
            ReportType::Markdown => "markdown",
            ReportType::Pdf => "pdf",
        }
    }

    pub fn content_type(self) -> &'static str {
        match self {
            ReportType::Markdown => "text/markdown; charset=utf-8",
            ReportType::Pdf => "application/pdf",
        }
    }

    pub fn extension(self) -> &'static str {
        match self {
            ReportType::Markdown => "md",
            ReportType::Pdf => "pdf",
        }
    }
}

impl FromStr for ReportType {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "markdown" => Ok(ReportType::Markdown),
            "pdf" => Ok(ReportType::Pdf),
            other => Err(format!("unknown report type '{other}'")),
        }
    }
}

/// Report row without its rendered bytes.
#[derive(Debug, Clone, Serialize)]
pub struct ReportSummary {
    pub id: Uuid,
    pub session_id: Uuid,
    pub name: String,
    pub report_type: ReportType,
    pub size_bytes: i64,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_referral_sources() {
        assert_eq!(ReferralType::classify("Google Ads"), ReferralType::Digital);
        assert_eq!(ReferralType::classify("Instagram"), ReferralType::Digital);
        assert_eq!(
            ReferralType::classify("Dr. Smith (General Dentist)"),
            ReferralType::Professional
        );
        assert_eq!(ReferralType::classify("Friend / family"), ReferralType::Direct);
        assert_eq!(ReferralType::classify(""), ReferralType::Direct);
    }

    #[test]
    fn referral_type_parses_case_insensitively() {
        assert_eq!("Digital".parse::<ReferralType>(), Ok(ReferralType::Digital));
        assert_eq!(" direct ".parse::<ReferralType>(), Ok(ReferralType::Direct));
        assert!("billboard".parse::<ReferralType>().is_err());
    }

    #[test]
    fn by_referral_indexes_each_channel() {
        let mut counts = ByReferral::<i64>::default();
        *counts.get_mut(ReferralType::Professional) += 3;
        assert_eq!(counts.get(ReferralType::Professional), 3);
        assert_eq!(counts.get(ReferralType::Digital), 0);
    }

    #[test]
    fn priorities_sort_high_first() {
        let mut priorities = vec![Priority::Low, Priority::High, Priority::Medium];
        priorities.sort();
        assert_eq!(priorities, vec![Priority::High, Priority::Medium, Priority::Low]);
    }
}
