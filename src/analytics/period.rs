use chrono::{Datelike, NaiveDate};

use crate::{error::AppError, models::Period};

const MAX_PERIOD_MONTHS: i64 = 120;

/// Parses a `YYYY-MM` month string.
pub fn parse_month(value: &str) -> Option<(i32, u32)> {
    let (year, month) = value.split_once('-')?;
    let digits = |part: &str| part.bytes().all(|b| b.is_ascii_digit());
    if year.len() != 4 || month.len() != 2 || !digits(year) || !digits(month) {
        return None;
    }

    let year: i32 = year.parse().ok()?;
    let month: u32 = month.parse().ok()?;
    (1..=12).contains(&month).then_some((year, month))
}

pub fn validate_month(value: &str) -> Result<String, AppError> {
    let trimmed = value.trim();
    parse_month(trimmed)
        .map(|_| trimmed.to_string())
        .ok_or_else(|| AppError::BadRequest(format!("period '{value}' must be YYYY-MM")))
}

pub fn validate_period(period: &Period) -> Result<(), AppError> {
    if period.start_date > period.end_date {
        return Err(AppError::BadRequest(format!(
            "period '{}' starts after it ends",
            period.name
        )));
    }

    let (start, end) = (period.start_date, period.end_date);
    let span = i64::from(end.year() - start.year()) * 12 + i64::from(end.month())
        - i64::from(start.month())
        + 1;
    if span > MAX_PERIOD_MONTHS {
        return Err(AppError::BadRequest(format!(
            "period '{}' spans {span} months, at most {MAX_PERIOD_MONTHS} are allowed",
            period.name
        )));
    }
    Ok(())
}

/// Every `YYYY-MM` month touched by the inclusive range, in order.
pub fn months_in_range(start: NaiveDate, end: NaiveDate) -> Vec<String> {
    let mut months = Vec::new();
    if start > end {
        return months;
    }

    let (mut year, mut month) = (start.year(), start.month());
    let last = (end.year(), end.month());

    while (year, month) <= last {
        months.push(format!("{year:04}-{month:02}"));
        if month == 12 {
            year += 1;
            month = 1;
        } else {
            month += 1;
        }
    }

    months
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn parses_valid_months_only() {
        assert_eq!(parse_month("2025-03"), Some((2025, 3)));
        assert_eq!(parse_month("2025-12"), Some((2025, 12)));
        assert_eq!(parse_month("2025-13"), None);
        assert_eq!(parse_month("2025-00"), None);
        assert_eq!(parse_month("2025-3"), None);
        assert_eq!(parse_month("25-03"), None);
        assert_eq!(parse_month("march"), None);
    }

    #[test]
    fn validate_month_trims_input() {
        assert_eq!(validate_month(" 2024-07 ").unwrap(), "2024-07");
        assert!(validate_month("2024/07").is_err());
    }

    #[test]
    fn months_span_year_boundary() {
        assert_eq!(
            months_in_range(date(2024, 11, 15), date(2025, 2, 1)),
            vec!["2024-11", "2024-12", "2025-01", "2025-02"]
        );
    }

    #[test]
    fn single_day_range_is_one_month() {
        assert_eq!(months_in_range(date(2025, 6, 9), date(2025, 6, 9)), vec!["2025-06"]);
    }

    #[test]
    fn inverted_range_has_no_months() {
        assert!(months_in_range(date(2025, 6, 9), date(2025, 5, 1)).is_empty());
    }

    #[test]
    fn rejects_inverted_period() {
        let period = Period {
            name: "Q1".to_string(),
            start_date: date(2025, 3, 31),
            end_date: date(2025, 1, 1),
            location_id: Uuid::new_v4(),
        };
        assert!(matches!(validate_period(&period), Err(AppError::BadRequest(_))));
    }

    #[test]
    fn periods_are_capped_at_ten_years() {
        let period = |start: NaiveDate, end: NaiveDate| Period {
            name: "Decade".to_string(),
            start_date: start,
            end_date: end,
            location_id: Uuid::nil(),
        };

        assert!(validate_period(&period(date(2015, 1, 1), date(2024, 12, 31))).is_ok());
        assert!(validate_period(&period(date(2015, 1, 1), date(2025, 1, 1))).is_err());
        assert!(validate_period(&period(NaiveDate::MIN, NaiveDate::MAX)).is_err());
    }
}
