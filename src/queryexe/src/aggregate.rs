//! Delay statistics derived from grouped flight counts.
//!
//! Each percentage operation first runs a grouped query that returns, per
//! group, how many flights there were (`TOTAL_FLIGHTS`) and how many left
//! late (`DELAYED_FLIGHTS`). The records are then folded into
//! `GroupCounts` and divided here, so a group with no flights yields 0
//! instead of a division error. Hours of the day are derived from the raw
//! departure timestamps in this module rather than by the database.

use crate::query::template;
use crate::query::Executor;
use chrono::{DateTime, NaiveDateTime, NaiveTime, Timelike};
use common::*;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::hash::Hash;

const DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
    "%Y-%m-%dT%H:%M",
];
const OFFSET_DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S%.f%:z",
    "%Y-%m-%dT%H:%M:%S%.f%:z",
    "%Y-%m-%d %H:%M%:z",
    "%Y-%m-%dT%H:%M%:z",
];
const TIME_FORMATS: &[&str] = &["%H:%M:%S%.f", "%H:%M"];

/// An origin-destination airport pair.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct Route {
    pub origin: String,
    pub destination: String,
}

impl Route {
    pub fn new(origin: &str, destination: &str) -> Self {
        Route {
            origin: origin.to_string(),
            destination: destination.to_string(),
        }
    }
}

impl fmt::Display for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} -> {}", self.origin, self.destination)
    }
}

/// A group key paired with a derived value: minutes of delay or percent delayed.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DelayMetric<K> {
    pub key: K,
    pub value: f64,
}

/// Flight and delayed-flight counts of one group.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupCounts<K> {
    pub key: K,
    pub total: i64,
    pub delayed: i64,
}

impl<K> GroupCounts<K> {
    pub fn percentage(&self) -> f64 {
        percentage_delayed(self.delayed, self.total)
    }

    pub fn into_metric(self) -> DelayMetric<K> {
        let value = self.percentage();
        DelayMetric {
            key: self.key,
            value,
        }
    }
}

/// `delayed / total * 100`, and exactly 0 for an empty group.
pub fn percentage_delayed(delayed: i64, total: i64) -> f64 {
    if total <= 0 {
        0.0
    } else {
        delayed as f64 / total as f64 * 100.0
    }
}

/// Folds grouped-count records into `GroupCounts`, keyed by `key_of`.
///
/// Records for which `key_of` returns `None` are skipped. A NULL delayed
/// count is read as 0.
pub fn group_counts<K, F>(records: &[Record], key_of: F) -> Vec<GroupCounts<K>>
where
    F: Fn(&Record) -> Option<K>,
{
    records
        .iter()
        .filter_map(|record| {
            let key = key_of(record)?;
            let total = record.get(TOTAL_FLIGHTS).and_then(Field::as_int).unwrap_or(0);
            let delayed = record
                .get(DELAYED_FLIGHTS)
                .and_then(Field::as_int)
                .unwrap_or(0);
            Some(GroupCounts {
                key,
                total,
                delayed,
            })
        })
        .collect()
}

/// Adds up counts that share a key. Output is ordered by key.
pub fn merge_counts<K: Ord>(counts: Vec<GroupCounts<K>>) -> Vec<GroupCounts<K>> {
    let mut merged: BTreeMap<K, (i64, i64)> = BTreeMap::new();
    for c in counts {
        let entry = merged.entry(c.key).or_insert((0, 0));
        entry.0 += c.total;
        entry.1 += c.delayed;
    }
    merged
        .into_iter()
        .map(|(key, (total, delayed))| GroupCounts {
            key,
            total,
            delayed,
        })
        .collect()
}

/// Sorts by value, highest first; equal values by key.
pub fn sort_metrics_desc<K: Ord>(metrics: &mut [DelayMetric<K>]) {
    metrics.sort_by(|a, b| b.value.total_cmp(&a.value).then_with(|| a.key.cmp(&b.key)));
}

pub fn metrics_into_map<K: Hash + Eq>(metrics: Vec<DelayMetric<K>>) -> HashMap<K, f64> {
    metrics.into_iter().map(|m| (m.key, m.value)).collect()
}

/// Hour of day (0-23) of a scheduled departure value.
///
/// Accepts `YYYY-MM-DD HH:MM[:SS[.f]]` (space or `T`), optionally followed
/// by `Z` or a `+HH:MM` offset, a bare `HH:MM[:SS]`, and `HHMM` as integer,
/// whole REAL or digits where `2400` is midnight. Timestamps carrying an
/// offset are read in UTC, the way SQLite's date functions read them.
pub fn hour_of_departure(field: &Field) -> Option<u32> {
    match field {
        Field::IntField(_) | Field::FloatField(_) => field.as_int().and_then(hour_from_hhmm),
        Field::StringField(s) => parse_hour(s.trim()),
        _ => None,
    }
}

fn parse_hour(s: &str) -> Option<u32> {
    for fmt in DATETIME_FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(s, fmt) {
            return Some(dt.hour());
        }
    }
    if let Some(hour) = parse_utc_hour(s) {
        return Some(hour);
    }
    for fmt in TIME_FORMATS {
        if let Ok(t) = NaiveTime::parse_from_str(s, fmt) {
            return Some(t.hour());
        }
    }
    if !s.is_empty() && s.len() <= 4 && s.chars().all(|c| c.is_ascii_digit()) {
        return s.parse::<i64>().ok().and_then(hour_from_hhmm);
    }
    None
}

fn parse_utc_hour(s: &str) -> Option<u32> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.naive_utc().hour());
    }
    let zoned = match s.strip_suffix('Z').or_else(|| s.strip_suffix('z')) {
        Some(rest) => format!("{}+00:00", rest),
        None => s.to_string(),
    };
    OFFSET_DATETIME_FORMATS
        .iter()
        .find_map(|fmt| DateTime::parse_from_str(&zoned, fmt).ok())
        .map(|dt| dt.naive_utc().hour())
}

fn hour_from_hhmm(v: i64) -> Option<u32> {
    if (0..=2400).contains(&v) && v % 100 < 60 {
        Some(((v / 100) % 24) as u32)
    } else {
        None
    }
}

/// Builds metrics from records with a key column and an `AVERAGE_DELAY` column.
///
/// Groups whose average is NULL (no non-negative delays) are dropped.
fn average_metrics(records: &[Record], key_column: &str) -> Vec<DelayMetric<String>> {
    records
        .iter()
        .filter_map(|record| {
            let key = record.get(key_column).and_then(Field::as_str)?;
            let value = record.get(AVERAGE_DELAY).and_then(Field::as_float)?;
            Some(DelayMetric {
                key: key.to_string(),
                value,
            })
        })
        .collect()
}

/// Percentages of delayed flights and average delays per group.
///
/// Result order is unspecified; use `sort_metrics_desc` when it matters.
#[derive(Clone)]
pub struct DelayAggregator {
    executor: Executor,
}

impl DelayAggregator {
    pub fn new(executor: Executor) -> Self {
        Self { executor }
    }

    /// Percent of each airline's flights that left late.
    pub fn percentage_delayed_per_airline(&self) -> Result<Vec<DelayMetric<String>>, FlightError> {
        let records = self.executor.run(&template::DELAY_COUNTS_PER_AIRLINE, &[])?;
        let counts = group_counts(&records, |r| r.airline().map(String::from));
        Ok(counts.into_iter().map(GroupCounts::into_metric).collect())
    }

    /// Percent of flights scheduled in each hour of the day that left late.
    ///
    /// Departures whose timestamp cannot be read are logged and left out.
    pub fn percentage_delayed_per_hour(&self) -> Result<Vec<DelayMetric<u32>>, FlightError> {
        let records = self
            .executor
            .run(&template::DELAY_COUNTS_PER_DEPARTURE, &[])?;
        let counts = group_counts(&records, |r| {
            let departure = r.get(SCHEDULED_DEPARTURE)?;
            let hour = hour_of_departure(departure);
            if hour.is_none() {
                warn!("Skipping unreadable departure time {}", departure);
            }
            hour
        });
        Ok(merge_counts(counts)
            .into_iter()
            .map(GroupCounts::into_metric)
            .collect())
    }

    /// Percent of flights on each origin-destination pair that left late.
    pub fn percentage_delayed_per_route(&self) -> Result<Vec<DelayMetric<Route>>, FlightError> {
        let records = self.executor.run(&template::DELAY_COUNTS_PER_ROUTE, &[])?;
        let counts = group_counts(&records, |r| {
            let origin = r.get(ORIGIN_AIRPORT).and_then(Field::as_str)?;
            let destination = r.get(DESTINATION_AIRPORT).and_then(Field::as_str)?;
            Some(Route::new(origin, destination))
        });
        Ok(counts.into_iter().map(GroupCounts::into_metric).collect())
    }

    /// Mean non-negative delay in minutes per airline.
    pub fn average_delay_per_airline(&self) -> Result<Vec<DelayMetric<String>>, FlightError> {
        let records = self
            .executor
            .run(&template::AVERAGE_DELAY_PER_AIRLINE, &[])?;
        Ok(average_metrics(&records, AIRLINE))
    }

    /// Mean non-negative delay in minutes per origin airport.
    pub fn average_delay_per_origin(&self) -> Result<Vec<DelayMetric<String>>, FlightError> {
        let records = self
            .executor
            .run(&template::AVERAGE_DELAY_PER_ORIGIN, &[])?;
        Ok(average_metrics(&records, ORIGIN_AIRPORT))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::testutil::*;
    use std::sync::Arc;

    fn aggregator(db: &TestDb) -> DelayAggregator {
        let mut config = db.config();
        config.failure_policy = FailurePolicy::Propagate;
        DelayAggregator::new(Executor::from_config(&config).unwrap())
    }

    fn assert_close(expected: f64, actual: f64) {
        assert!(
            (expected - actual).abs() < 1e-9,
            "expected {}, got {}",
            expected,
            actual
        );
    }

    fn counts_record(total: Field, delayed: Field) -> Record {
        let schema = Arc::new(RecordSchema::from_names(&[
            AIRLINE,
            TOTAL_FLIGHTS,
            DELAYED_FLIGHTS,
        ]));
        Record::new(
            schema,
            vec![Field::StringField(String::from("Empty Air")), total, delayed],
        )
    }

    #[test]
    fn test_zero_total_is_zero_percent() {
        let p = percentage_delayed(0, 0);
        assert!(!p.is_nan());
        assert_eq!(0.0, p);

        let records = vec![counts_record(Field::IntField(0), Field::Null)];
        let counts = group_counts(&records, |r| r.airline().map(String::from));
        assert_eq!(0, counts[0].total);
        assert_eq!(0, counts[0].delayed);
        assert_eq!(0.0, counts[0].percentage());
    }

    #[test]
    fn test_percentage() {
        assert_close(50.0, percentage_delayed(1, 2));
        assert_close(100.0, percentage_delayed(3, 3));
        assert_close(0.0, percentage_delayed(0, 7));
    }

    #[test]
    fn test_merge_counts() {
        let counts = vec![
            GroupCounts { key: 9, total: 2, delayed: 1 },
            GroupCounts { key: 5, total: 1, delayed: 0 },
            GroupCounts { key: 9, total: 1, delayed: 1 },
        ];
        let merged = merge_counts(counts);
        assert_eq!(
            vec![
                GroupCounts { key: 5, total: 1, delayed: 0 },
                GroupCounts { key: 9, total: 3, delayed: 2 },
            ],
            merged
        );
    }

    #[test]
    fn test_sort_metrics_desc() {
        let mut metrics = vec![
            DelayMetric { key: "b", value: 10.0 },
            DelayMetric { key: "c", value: 50.0 },
            DelayMetric { key: "a", value: 10.0 },
        ];
        sort_metrics_desc(&mut metrics);
        let keys: Vec<&str> = metrics.iter().map(|m| m.key).collect();
        assert_eq!(vec!["c", "a", "b"], keys);
    }

    #[test]
    fn test_hour_of_departure() {
        let s = |v: &str| Field::StringField(v.to_string());
        assert_eq!(Some(5), hour_of_departure(&s("2015-01-01 05:30:00")));
        assert_eq!(Some(17), hour_of_departure(&s("2015-01-01T17:05:59.250")));
        assert_eq!(Some(23), hour_of_departure(&s("2015-01-01 23:59")));
        assert_eq!(Some(8), hour_of_departure(&s(" 08:15 ")));
        assert_eq!(Some(14), hour_of_departure(&s("14:00:00")));
        assert_eq!(Some(0), hour_of_departure(&s("0005")));
        assert_eq!(Some(0), hour_of_departure(&Field::IntField(5)));
        assert_eq!(Some(13), hour_of_departure(&Field::IntField(1345)));
        assert_eq!(Some(0), hour_of_departure(&Field::IntField(2400)));
        assert_eq!(None, hour_of_departure(&Field::IntField(2500)));
        assert_eq!(None, hour_of_departure(&Field::IntField(1275)));
        assert_eq!(None, hour_of_departure(&s("not a time")));
        assert_eq!(None, hour_of_departure(&s("Z")));
        assert_eq!(None, hour_of_departure(&s("")));
        assert_eq!(None, hour_of_departure(&Field::Null));
    }

    #[test]
    fn test_hour_of_departure_with_offset() {
        let s = |v: &str| Field::StringField(v.to_string());
        assert_eq!(Some(5), hour_of_departure(&s("2015-01-01 05:30:00Z")));
        assert_eq!(Some(5), hour_of_departure(&s("2015-01-01 05:30:00+00:00")));
        assert_eq!(Some(5), hour_of_departure(&s("2015-01-01T05:30:00.000Z")));
        assert_eq!(Some(5), hour_of_departure(&s("2015-01-01 05:30Z")));
        assert_eq!(Some(3), hour_of_departure(&s("2015-01-01T05:30:00+02:00")));
        assert_eq!(Some(1), hour_of_departure(&s("2015-01-01 23:30:00-02:00")));
    }

    #[test]
    fn test_hour_of_real_departure() {
        assert_eq!(Some(13), hour_of_departure(&Field::FloatField(1345.0)));
        assert_eq!(Some(0), hour_of_departure(&Field::FloatField(2400.0)));
        assert_eq!(None, hour_of_departure(&Field::FloatField(1345.5)));
        assert_eq!(None, hour_of_departure(&Field::FloatField(-5.0)));
    }

    #[test]
    fn test_percentage_delayed_per_airline() {
        let db = TestDb::sample();
        let map = metrics_into_map(aggregator(&db).percentage_delayed_per_airline().unwrap());
        assert_eq!(2, map.len());
        assert_close(50.0, map["Delta Air Lines"]);
        assert_close(500.0 / 7.0, map["United Air Lines"]);
        assert!(!map.contains_key("Ghost Air"));
    }

    #[test]
    fn test_percentage_delayed_per_hour() {
        let db = TestDb::sample();
        let metrics = aggregator(&db).percentage_delayed_per_hour().unwrap();
        let hours: Vec<u32> = metrics.iter().map(|m| m.key).collect();
        assert_eq!(vec![5, 9, 12, 13, 14, 17, 23], hours);
        let map = metrics_into_map(metrics);
        assert_close(0.0, map[&5]);
        assert_close(100.0, map[&9]);
        assert_close(50.0, map[&17]);
        assert_close(0.0, map[&23]);
    }

    #[test]
    fn test_per_hour_merges_formats_and_skips_garbage() {
        let day = (2015, 1, 1);
        let flights = vec![
            FixtureFlight::new(1, 1, "JFK", "LAX", "2015-01-01 07:10:00", Some(12), day),
            FixtureFlight::new(2, 1, "JFK", "LAX", "0745", Some(-1), day),
            FixtureFlight::new(3, 1, "JFK", "LAX", "07:59", None, day),
            FixtureFlight::new(4, 1, "JFK", "LAX", "soon", Some(90), day),
        ];
        let db = TestDb::new(&[(1, "Mixed Air")], &flights);
        let metrics = aggregator(&db).percentage_delayed_per_hour().unwrap();
        assert_eq!(1, metrics.len());
        assert_eq!(7, metrics[0].key);
        assert_close(100.0 / 3.0, metrics[0].value);
    }

    #[test]
    fn test_percentage_delayed_per_route() {
        let db = TestDb::sample();
        let metrics = aggregator(&db).percentage_delayed_per_route().unwrap();
        assert_eq!(6, metrics.len());
        let map = metrics_into_map(metrics);
        assert_close(50.0, map[&Route::new("JFK", "LAX")]);
        assert_close(100.0, map[&Route::new("ATL", "JFK")]);
        assert_close(0.0, map[&Route::new("ATL", "LAX")]);
        assert_close(100.0, map[&Route::new("LAX", "JFK")]);
        assert_close(0.0, map[&Route::new("LAX", "ATL")]);
        assert_close(100.0, map[&Route::new("JFK", "ATL")]);
    }

    #[test]
    fn test_average_metrics() {
        let db = TestDb::sample();
        let aggregator = aggregator(&db);
        let mut airlines = aggregator.average_delay_per_airline().unwrap();
        sort_metrics_desc(&mut airlines);
        assert_eq!("United Air Lines", airlines[0].key);
        assert_close(257.0 / 6.0, airlines[0].value);
        assert_eq!("Delta Air Lines", airlines[1].key);
        assert_close(10.0, airlines[1].value);

        let origins = metrics_into_map(aggregator.average_delay_per_origin().unwrap());
        assert_close(67.5, origins["ATL"]);
        assert_close(110.0 / 3.0, origins["JFK"]);
        assert_close(32.0 / 3.0, origins["LAX"]);
    }

    #[test]
    fn test_degraded_failure_gives_no_metrics() {
        let db = TestDb::sample();
        let executor = Executor::from_config(&db.config()).unwrap();
        executor.connections().shutdown();
        let aggregator = DelayAggregator::new(executor);
        assert!(aggregator.percentage_delayed_per_airline().unwrap().is_empty());
        assert!(aggregator.percentage_delayed_per_hour().unwrap().is_empty());
        assert!(aggregator.percentage_delayed_per_route().unwrap().is_empty());
    }

    #[test]
    fn test_metric_json() {
        let metric = DelayMetric {
            key: Route::new("JFK", "LAX"),
            value: 50.0,
        };
        assert_eq!(
            r#"{"key":{"origin":"JFK","destination":"LAX"},"value":50.0}"#,
            serde_json::to_string(&metric).unwrap()
        );
    }
}
