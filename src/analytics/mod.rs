pub mod cache;
pub mod period;

use std::{future::Future, sync::Arc, time::Duration};

use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use serde::{Serialize, de::DeserializeOwned};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::{
    connectors::{
        AccountingSource, ConnectorError, PracticeSource, fallback_accounting, fallback_practice,
    },
    error::AppError,
    models::{
        AcquisitionCost, AcquisitionSummary, ChannelCost, DataSource, DataType, Location,
        MetricSources, Period, PeriodMetrics, ReferralType,
    },
};
use cache::{CacheKey, CacheStore, is_fresh};
use period::validate_period;

pub const MAX_PERIODS: usize = 12;

/// Where `compare` reads locations and acquisition costs from.
#[async_trait]
pub trait PeriodInputs: Send + Sync {
    async fn location(&self, id: Uuid) -> Result<Location, AppError>;

    async fn costs_for_range(
        &self,
        location_id: Uuid,
        start: NaiveDate,
        end: NaiveDate,
    ) -> sqlx::Result<Vec<AcquisitionCost>>;
}

pub fn check_period_count(count: usize) -> Result<(), AppError> {
    if count > MAX_PERIODS {
        return Err(AppError::BadRequest(format!(
            "at most {MAX_PERIODS} periods can be compared at once"
        )));
    }
    Ok(())
}

pub struct Aggregator {
    practice: Arc<dyn PracticeSource>,
    accounting: Arc<dyn AccountingSource>,
    cache: Arc<dyn CacheStore>,
    ttl: Duration,
}

impl Aggregator {
    pub fn new(
        practice: Arc<dyn PracticeSource>,
        accounting: Arc<dyn AccountingSource>,
        cache: Arc<dyn CacheStore>,
        ttl: Duration,
    ) -> Self {
        Self {
            practice,
            accounting,
            cache,
            ttl,
        }
    }

    /// Metrics for each period, computed one after another in request order.
    /// Every period is validated before any lookup runs.
    pub async fn compare(
        &self,
        inputs: &dyn PeriodInputs,
        periods: &[Period],
        force_refresh: bool,
    ) -> Result<Vec<PeriodMetrics>, AppError> {
        check_period_count(periods.len())?;
        for period in periods {
            validate_period(period)?;
        }

        let mut results = Vec::with_capacity(periods.len());
        for period in periods {
            let location = inputs.location(period.location_id).await?;

            let costs = inputs
                .costs_for_range(location.id, period.start_date, period.end_date)
                .await
                .unwrap_or_else(|e| {
                    warn!(location_id = %location.id, "Cost lookup failed, continuing without costs: {e}");
                    Vec::new()
                });

            results.push(self.period_metrics(&location, period, &costs, force_refresh).await);
        }

        Ok(results)
    }

    pub async fn period_metrics(
        &self,
        location: &Location,
        period: &Period,
        costs: &[AcquisitionCost],
        force_refresh: bool,
    ) -> PeriodMetrics {
        let external_id = location.external_id.as_str();
        let (start, end) = (period.start_date, period.end_date);

        let (practice, practice_source) = self
            .load(
                &cache_key(location, period, DataType::Practice),
                force_refresh,
                || self.practice.fetch_practice(external_id, start, end),
                fallback_practice,
            )
            .await;

        let (accounting, accounting_source) = self
            .load(
                &cache_key(location, period, DataType::Accounting),
                force_refresh,
                || self.accounting.fetch_accounting(external_id, start, end),
                fallback_accounting,
            )
            .await;

        let months = period::months_in_range(start, end);
        let in_period: Vec<&AcquisitionCost> = costs
            .iter()
            .filter(|cost| cost.location_id == location.id && months.contains(&cost.period))
            .collect();
        let acquisition = summarize_costs(&in_period, practice.new_patients);

        PeriodMetrics {
            period: period.clone(),
            location_name: location.name.clone(),
            months,
            practice,
            accounting,
            acquisition,
            sources: MetricSources {
                practice: practice_source,
                accounting: accounting_source,
            },
        }
    }

    async fn load<T, F, Fut>(
        &self,
        key: &CacheKey,
        force_refresh: bool,
        fetch: F,
        fallback: fn() -> T,
    ) -> (T, DataSource)
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, ConnectorError>>,
    {
        let data_type = key.data_type.as_str();

        if !force_refresh {
            match self.cache.get(key).await {
                Ok(Some(entry)) if is_fresh(entry.created_at, Utc::now(), self.ttl) => {
                    match serde_json::from_value(entry.data) {
                        Ok(value) => {
                            debug!(data_type, location_id = %key.location_id, "Cache hit");
                            return (value, DataSource::Cached);
                        }
                        Err(e) => warn!(data_type, "Discarding unreadable cache row: {e}"),
                    }
                }
                Ok(_) => {}
                Err(e) => warn!(data_type, "Cache lookup failed: {e}"),
            }
        }

        match fetch().await {
            Ok(value) => {
                match serde_json::to_value(&value) {
                    Ok(data) => {
                        if let Err(e) = self.cache.put(key, &data).await {
                            warn!(data_type, "Cache write failed: {e}");
                        }
                    }
                    Err(e) => warn!(data_type, "Could not serialize payload for cache: {e}"),
                }
                (value, DataSource::Live)
            }
            Err(e) => {
                warn!(
                    data_type,
                    location_id = %key.location_id,
                    "Connector failed, using fallback data: {e}"
                );
                (fallback(), DataSource::Fallback)
            }
        }
    }
}

fn cache_key(location: &Location, period: &Period, data_type: DataType) -> CacheKey {
    CacheKey {
        location_id: location.id,
        start_date: period.start_date,
        end_date: period.end_date,
        data_type,
    }
}

/// Average cost is `sum / count` over the given rows, zero when there are none.
pub fn summarize_costs(costs: &[&AcquisitionCost], new_patients: i64) -> AcquisitionSummary {
    let total_cost: f64 = costs.iter().map(|cost| cost.cost).sum();
    let cost_count = costs.len();

    let by_referral_type = ReferralType::ALL
        .into_iter()
        .map(|referral_type| {
            let (total, count) = costs
                .iter()
                .filter(|cost| cost.referral_type == referral_type)
                .fold((0.0, 0usize), |(total, count), cost| (total + cost.cost, count + 1));
            ChannelCost {
                referral_type,
                total,
                count,
                average: average(total, count),
            }
        })
        .collect();

    AcquisitionSummary {
        total_cost,
        cost_count,
        average_cost: average(total_cost, cost_count),
        by_referral_type,
        cost_per_new_patient: if new_patients > 0 {
            total_cost / new_patients as f64
        } else {
            0.0
        },
    }
}

fn average(total: f64, count: usize) -> f64 {
    if count == 0 { 0.0 } else { total / count as f64 }
}

#[cfg(test)]
mod tests {
    use std::{
        collections::HashMap,
        sync::{
            Mutex,
            atomic::{AtomicUsize, Ordering},
        },
    };

    use async_trait::async_trait;
    use chrono::{DateTime, NaiveDate};
    use serde_json::Value;
    use uuid::Uuid;

    use super::cache::CacheEntry;
    use super::*;
    use crate::models::{AccountingSnapshot, PracticeSnapshot};

    #[derive(Default)]
    struct MemoryCache {
        rows: Mutex<HashMap<(Uuid, NaiveDate, NaiveDate, &'static str), CacheEntry>>,
        broken: bool,
    }

    impl MemoryCache {
        fn key(key: &CacheKey) -> (Uuid, NaiveDate, NaiveDate, &'static str) {
            (key.location_id, key.start_date, key.end_date, key.data_type.as_str())
        }

        fn seed(&self, key: &CacheKey, data: Value, created_at: DateTime<Utc>) {
            self.rows
                .lock()
                .unwrap()
                .insert(Self::key(key), CacheEntry { data, created_at });
        }

        fn len(&self) -> usize {
            self.rows.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl CacheStore for MemoryCache {
        async fn get(&self, key: &CacheKey) -> Result<Option<CacheEntry>, sqlx::Error> {
            if self.broken {
                return Err(sqlx::Error::PoolTimedOut);
            }
            Ok(self.rows.lock().unwrap().get(&Self::key(key)).cloned())
        }

        async fn put(&self, key: &CacheKey, data: &Value) -> Result<(), sqlx::Error> {
            if self.broken {
                return Err(sqlx::Error::PoolTimedOut);
            }
            self.seed(key, data.clone(), Utc::now());
            Ok(())
        }
    }

    struct StubPractice {
        calls: AtomicUsize,
        fail: bool,
    }

    #[async_trait]
    impl PracticeSource for StubPractice {
        async fn fetch_practice(
            &self,
            _external_location_id: &str,
            _start: NaiveDate,
            _end: NaiveDate,
        ) -> Result<PracticeSnapshot, ConnectorError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(ConnectorError::Decode("boom".to_string()));
            }
            Ok(PracticeSnapshot {
                new_patients: 10,
                consultations: 8,
                starts: 4,
                conversion_rate: 0.5,
                ..PracticeSnapshot::default()
            })
        }
    }

    struct StubAccounting {
        fail: bool,
    }

    #[async_trait]
    impl AccountingSource for StubAccounting {
        async fn fetch_accounting(
            &self,
            _external_location_id: &str,
            _start: NaiveDate,
            _end: NaiveDate,
        ) -> Result<AccountingSnapshot, ConnectorError> {
            if self.fail {
                return Err(ConnectorError::MissingCredentials("accounting API"));
            }
            Ok(AccountingSnapshot {
                revenue: 1000.0,
                expenses: 400.0,
                net_income: 600.0,
            })
        }
    }

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn location() -> Location {
        Location {
            id: Uuid::new_v4(),
            name: "Downtown".to_string(),
            external_id: "loc-downtown".to_string(),
            active: true,
            created_at: Utc::now(),
        }
    }

    fn period(location: &Location) -> Period {
        Period {
            name: "Q1".to_string(),
            start_date: date(2025, 1, 1),
            end_date: date(2025, 3, 31),
            location_id: location.id,
        }
    }

    fn cost(location_id: Uuid, referral_type: ReferralType, period: &str, amount: f64) -> AcquisitionCost {
        AcquisitionCost {
            id: Uuid::new_v4(),
            location_id,
            referral_type,
            cost: amount,
            period: period.to_string(),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    struct Fixture {
        aggregator: Aggregator,
        practice: Arc<StubPractice>,
        cache: Arc<MemoryCache>,
    }

    fn fixture(practice_fails: bool, accounting_fails: bool, cache: MemoryCache) -> Fixture {
        let practice = Arc::new(StubPractice {
            calls: AtomicUsize::new(0),
            fail: practice_fails,
        });
        let cache = Arc::new(cache);
        let aggregator = Aggregator::new(
            practice.clone(),
            Arc::new(StubAccounting {
                fail: accounting_fails,
            }),
            cache.clone(),
            Duration::from_secs(15 * 60),
        );
        Fixture {
            aggregator,
            practice,
            cache,
        }
    }

    struct StubInputs {
        locations: Vec<Location>,
        costs: Vec<AcquisitionCost>,
        failing_costs: Option<Uuid>,
        lookups: Mutex<Vec<Uuid>>,
    }

    impl StubInputs {
        fn new(locations: Vec<Location>, costs: Vec<AcquisitionCost>) -> Self {
            Self {
                locations,
                costs,
                failing_costs: None,
                lookups: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl PeriodInputs for StubInputs {
        async fn location(&self, id: Uuid) -> Result<Location, AppError> {
            self.lookups.lock().unwrap().push(id);
            self.locations
                .iter()
                .find(|location| location.id == id)
                .cloned()
                .ok_or(AppError::NotFound("Location"))
        }

        async fn costs_for_range(
            &self,
            location_id: Uuid,
            _start: NaiveDate,
            _end: NaiveDate,
        ) -> sqlx::Result<Vec<AcquisitionCost>> {
            if self.failing_costs == Some(location_id) {
                return Err(sqlx::Error::PoolTimedOut);
            }
            Ok(self
                .costs
                .iter()
                .filter(|cost| cost.location_id == location_id)
                .cloned()
                .collect())
        }
    }

    #[test]
    fn average_cost_is_sum_over_count() {
        let location_id = Uuid::new_v4();
        let rows = [
            cost(location_id, ReferralType::Digital, "2025-01", 300.0),
            cost(location_id, ReferralType::Digital, "2025-02", 100.0),
            cost(location_id, ReferralType::Direct, "2025-01", 200.0),
        ];
        let refs: Vec<&AcquisitionCost> = rows.iter().collect();

        let summary = summarize_costs(&refs, 4);
        assert_eq!(summary.total_cost, 600.0);
        assert_eq!(summary.cost_count, 3);
        assert_eq!(summary.average_cost, 200.0);
        assert_eq!(summary.cost_per_new_patient, 150.0);

        let digital = &summary.by_referral_type[0];
        assert_eq!(digital.referral_type, ReferralType::Digital);
        assert_eq!(digital.count, 2);
        assert_eq!(digital.average, 200.0);

        let professional = &summary.by_referral_type[1];
        assert_eq!(professional.count, 0);
        assert_eq!(professional.average, 0.0);
    }

    #[test]
    fn no_costs_means_zero_average() {
        let summary = summarize_costs(&[], 0);
        assert_eq!(summary.average_cost, 0.0);
        assert_eq!(summary.cost_per_new_patient, 0.0);
        assert_eq!(summary.by_referral_type.len(), 3);
    }

    #[tokio::test]
    async fn live_results_are_cached_and_reused() {
        let fx = fixture(false, false, MemoryCache::default());
        let location = location();
        let period = period(&location);

        let first = fx.aggregator.period_metrics(&location, &period, &[], false).await;
        assert_eq!(first.sources.practice, DataSource::Live);
        assert_eq!(first.sources.accounting, DataSource::Live);
        assert_eq!(fx.cache.len(), 2);

        let second = fx.aggregator.period_metrics(&location, &period, &[], false).await;
        assert_eq!(second.sources.practice, DataSource::Cached);
        assert_eq!(second.practice, first.practice);
        assert_eq!(second.accounting.net_income, 600.0);
        assert_eq!(fx.practice.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn stale_rows_are_recomputed() {
        let fx = fixture(false, false, MemoryCache::default());
        let location = location();
        let period = period(&location);
        let key = cache_key(&location, &period, DataType::Practice);
        fx.cache.seed(
            &key,
            serde_json::to_value(PracticeSnapshot::default()).unwrap(),
            Utc::now() - chrono::Duration::minutes(16),
        );

        let metrics = fx.aggregator.period_metrics(&location, &period, &[], false).await;
        assert_eq!(metrics.sources.practice, DataSource::Live);
        assert_eq!(metrics.practice.new_patients, 10);
        assert_eq!(fx.practice.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn force_refresh_bypasses_fresh_rows() {
        let fx = fixture(false, false, MemoryCache::default());
        let location = location();
        let period = period(&location);

        fx.aggregator.period_metrics(&location, &period, &[], false).await;
        let refreshed = fx.aggregator.period_metrics(&location, &period, &[], true).await;

        assert_eq!(refreshed.sources.practice, DataSource::Live);
        assert_eq!(fx.practice.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn connector_failures_degrade_to_uncached_fallback() {
        let fx = fixture(true, true, MemoryCache::default());
        let location = location();
        let period = period(&location);

        let metrics = fx.aggregator.period_metrics(&location, &period, &[], false).await;
        assert_eq!(metrics.sources.practice, DataSource::Fallback);
        assert_eq!(metrics.sources.accounting, DataSource::Fallback);
        assert_eq!(metrics.practice, PracticeSnapshot::default());
        assert_eq!(metrics.accounting, AccountingSnapshot::default());
        assert_eq!(fx.cache.len(), 0);
    }

    #[tokio::test]
    async fn broken_cache_still_serves_live_data() {
        let fx = fixture(
            false,
            false,
            MemoryCache {
                broken: true,
                ..MemoryCache::default()
            },
        );
        let location = location();
        let period = period(&location);

        let metrics = fx.aggregator.period_metrics(&location, &period, &[], false).await;
        assert_eq!(metrics.sources.practice, DataSource::Live);
        assert_eq!(metrics.practice.new_patients, 10);
    }

    #[tokio::test]
    async fn only_costs_inside_the_period_count() {
        let fx = fixture(false, false, MemoryCache::default());
        let location = location();
        let period = period(&location);
        let costs = vec![
            cost(location.id, ReferralType::Digital, "2025-01", 500.0),
            cost(location.id, ReferralType::Professional, "2025-03", 300.0),
            cost(location.id, ReferralType::Digital, "2025-04", 9000.0),
            cost(Uuid::new_v4(), ReferralType::Direct, "2025-02", 9000.0),
        ];

        let metrics = fx.aggregator.period_metrics(&location, &period, &costs, false).await;
        assert_eq!(metrics.months, vec!["2025-01", "2025-02", "2025-03"]);
        assert_eq!(metrics.acquisition.cost_count, 2);
        assert_eq!(metrics.acquisition.average_cost, 400.0);
        assert_eq!(metrics.acquisition.cost_per_new_patient, 80.0);
        assert_eq!(metrics.location_name, "Downtown");
    }

    #[tokio::test]
    async fn compare_keeps_request_order_and_survives_cost_failures() {
        let fx = fixture(false, false, MemoryCache::default());
        let downtown = location();
        let westside = Location {
            id: Uuid::new_v4(),
            name: "Westside".to_string(),
            external_id: "loc-westside".to_string(),
            ..location()
        };
        let mut inputs = StubInputs::new(
            vec![downtown.clone(), westside.clone()],
            vec![
                cost(downtown.id, ReferralType::Digital, "2025-02", 500.0),
                cost(westside.id, ReferralType::Direct, "2025-02", 700.0),
            ],
        );
        inputs.failing_costs = Some(westside.id);

        let periods = vec![period(&westside), period(&downtown)];
        let results = fx.aggregator.compare(&inputs, &periods, false).await.unwrap();

        assert_eq!(*inputs.lookups.lock().unwrap(), vec![westside.id, downtown.id]);
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].location_name, "Westside");
        assert_eq!(results[0].acquisition.cost_count, 0);
        assert_eq!(results[1].location_name, "Downtown");
        assert_eq!(results[1].acquisition.total_cost, 500.0);
    }

    #[tokio::test]
    async fn compare_validates_before_any_lookup() {
        let fx = fixture(false, false, MemoryCache::default());
        let location = location();
        let inputs = StubInputs::new(vec![location.clone()], Vec::new());

        let too_many = vec![period(&location); MAX_PERIODS + 1];
        let result = fx.aggregator.compare(&inputs, &too_many, false).await;
        assert!(matches!(result, Err(AppError::BadRequest(_))));

        let inverted = Period {
            start_date: date(2025, 4, 1),
            end_date: date(2025, 1, 1),
            ..period(&location)
        };
        let result = fx
            .aggregator
            .compare(&inputs, &[period(&location), inverted], false)
            .await;
        assert!(matches!(result, Err(AppError::BadRequest(_))));

        assert!(inputs.lookups.lock().unwrap().is_empty());
        assert_eq!(fx.practice.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn compare_reports_unknown_locations() {
        let fx = fixture(false, false, MemoryCache::default());
        let inputs = StubInputs::new(Vec::new(), Vec::new());

        let result = fx.aggregator.compare(&inputs, &[period(&location())], false).await;
        assert!(matches!(result, Err(AppError::NotFound("Location"))));
    }
}
