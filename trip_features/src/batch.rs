//! Batch path: historical trips to a cleaned, encoded training table.

use chrono::NaiveDateTime;
use serde::Deserialize;
use std::{
    collections::{BTreeMap, BTreeSet},
    io::Read,
    path::Path,
    sync::Arc,
};
use tracing::{debug, info, warn};

use crate::encoder::{indicator_columns, GROUPS};
use crate::error::{FeatureError, Result};
use crate::pipeline::{FeatureEngine, TripFeatures, BASE_COLUMNS};
use crate::reconcile::{reconcile, FeatureVector};
use crate::schema::SchemaCatalog;
use crate::temporal::{self, CalendarFeatures};
use crate::zones::{Side, ZoneLookup};

/// One row of the raw trip export. Columns not listed here are ignored.
#[derive(Debug, Clone, Deserialize)]
pub struct RawTripRecord {
    #[serde(default)]
    pub trip_id: Option<String>,
    pub tpep_pickup_datetime: String,
    pub tpep_dropoff_datetime: String,
    pub passenger_count: Option<f64>,
    pub trip_distance: f64,
    #[serde(rename = "PULocationID")]
    pub pickup_location: i64,
    #[serde(rename = "DOLocationID")]
    pub dropoff_location: i64,
    pub fare_amount: Option<f64>,
    pub total_amount: Option<f64>,
    #[serde(rename = "Airport_fee", alias = "airport_fee", default)]
    pub airport_fee: Option<f64>,
}

impl RawTripRecord {
    /// Airport indicator as the batch path derives it: any positive fee.
    pub fn is_from_airport(&self) -> bool {
        self.airport_fee.is_some_and(|fee| fee > 0.0)
    }
}

#[derive(Debug, Clone)]
pub struct BatchOptions {
    pub target_column: String,
    pub remove_invalid: bool,
    pub keep_trip_id: bool,
    /// Exclusive upper bound on trip duration, in minutes.
    pub max_trip_minutes: f64,
}

impl Default for BatchOptions {
    fn default() -> Self {
        Self {
            target_column: "trip_time".to_string(),
            remove_invalid: true,
            keep_trip_id: false,
            max_trip_minutes: 300.0,
        }
    }
}

/// Row counters for one batch run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchReport {
    pub rows_read: usize,
    pub malformed: usize,
    pub unparseable_timestamps: usize,
    pub invalid: usize,
    /// Rows whose encoded values could not be cast, e.g. a NaN distance with
    /// filtering off.
    pub rejected: usize,
    pub pickup_zone_misses: usize,
    pub dropoff_zone_misses: usize,
    pub unseen_categories: BTreeMap<(String, String), usize>,
    pub rows_kept: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TrainingRow {
    pub trip_id: Option<String>,
    pub pickup_at: NaiveDateTime,
    pub features: FeatureVector,
    pub target: f64,
}

/// Encoded rows, ordered by pickup time, all in one schema layout.
#[derive(Debug, Clone)]
pub struct TrainingTable {
    pub catalog: SchemaCatalog,
    pub target_column: String,
    pub rows: Vec<TrainingRow>,
    pub report: BatchReport,
}

/// Train/validation/test partitions of a table, in time order.
#[derive(Debug)]
pub struct Split<'a> {
    pub train: &'a [TrainingRow],
    pub val: &'a [TrainingRow],
    pub test: &'a [TrainingRow],
}

struct ParsedTrip {
    trip_id: Option<String>,
    pickup_at: NaiveDateTime,
    trip: TripFeatures,
    minutes: f64,
}

fn is_valid(raw: &RawTripRecord, minutes: f64, max_minutes: f64) -> bool {
    let positive = |v: Option<f64>| v.is_some_and(|v| v.is_finite() && v > 0.0);
    positive(Some(raw.trip_distance))
        && positive(raw.passenger_count)
        && positive(raw.fare_amount)
        && positive(raw.total_amount)
        && minutes > 0.0
        && minutes < max_minutes
}

/// Reads raw trips from CSV. Rows that fail to deserialize are counted in
/// `report.malformed` and skipped.
pub fn read_raw_trips<R: Read>(reader: R, report: &mut BatchReport) -> Result<Vec<RawTripRecord>> {
    let mut rdr = csv::Reader::from_reader(reader);
    let mut rows = Vec::new();
    for (idx, row) in rdr.deserialize::<RawTripRecord>().enumerate() {
        report.rows_read += 1;
        match row {
            Ok(r) => rows.push(r),
            Err(e) => {
                report.malformed += 1;
                debug!("skipping malformed row {}: {}", idx + 1, e);
            }
        }
    }
    Ok(rows)
}

pub fn read_raw_trips_from_path<P: AsRef<Path>>(
    path: P,
    report: &mut BatchReport,
) -> Result<Vec<RawTripRecord>> {
    let file = std::fs::File::open(path.as_ref())?;
    read_raw_trips(file, report)
}

/// Builds the training table. With `catalog = None` the schema is derived
/// from the observed categories; otherwise rows are reconciled against it.
pub fn build_training_table(
    raw: Vec<RawTripRecord>,
    zones: Arc<ZoneLookup>,
    catalog: Option<SchemaCatalog>,
    options: &BatchOptions,
    mut report: BatchReport,
) -> Result<TrainingTable> {
    if report.rows_read < raw.len() {
        report.rows_read = raw.len();
    }

    let mut parsed = Vec::with_capacity(raw.len());
    for r in raw {
        let (pickup_at, dropoff_at) = match (
            temporal::parse_timestamp(&r.tpep_pickup_datetime),
            temporal::parse_timestamp(&r.tpep_dropoff_datetime),
        ) {
            (Ok(p), Ok(d)) => (p, d),
            _ => {
                report.unparseable_timestamps += 1;
                continue;
            }
        };
        let minutes = (dropoff_at - pickup_at).num_milliseconds() as f64 / 60_000.0;

        if options.remove_invalid && !is_valid(&r, minutes, options.max_trip_minutes) {
            report.invalid += 1;
            continue;
        }

        parsed.push(ParsedTrip {
            trip_id: if options.keep_trip_id { r.trip_id.clone() } else { None },
            pickup_at,
            minutes,
            trip: TripFeatures {
                trip_distance: r.trip_distance,
                calendar: CalendarFeatures::from_datetime(&pickup_at),
                is_from_airport: f64::from(u8::from(r.is_from_airport())),
                pickup_location: r.pickup_location,
                dropoff_location: r.dropoff_location,
            },
        });
    }
    parsed.sort_by_key(|p| p.pickup_at);

    let catalog = match catalog {
        Some(c) => c,
        None => derive_catalog(&parsed, &zones)?,
    };
    let engine = FeatureEngine::new(zones, catalog)?;

    let mut rows = Vec::with_capacity(parsed.len());
    for p in parsed {
        let pickup = engine.zones().get(p.trip.pickup_location);
        let dropoff = engine.zones().get(p.trip.dropoff_location);
        if pickup.is_none() {
            report.pickup_zone_misses += 1;
        }
        if dropoff.is_none() {
            report.dropoff_zone_misses += 1;
        }
        let (record, unseen) = engine.build_record(&p.trip, pickup, dropoff);
        for u in unseen {
            *report
                .unseen_categories
                .entry((u.group.to_string(), u.value))
                .or_default() += 1;
        }
        let features = match reconcile(&record, engine.catalog()) {
            Ok(f) => f,
            Err(e) => {
                report.rejected += 1;
                debug!("dropping row picked up at {}: {}", p.pickup_at, e);
                continue;
            }
        };
        rows.push(TrainingRow {
            trip_id: p.trip_id,
            pickup_at: p.pickup_at,
            features,
            target: p.minutes,
        });
    }
    report.rows_kept = rows.len();
    log_report(&report);

    Ok(TrainingTable {
        catalog: engine.catalog().clone(),
        target_column: options.target_column.clone(),
        rows,
        report,
    })
}

fn derive_catalog(parsed: &[ParsedTrip], zones: &ZoneLookup) -> Result<SchemaCatalog> {
    if parsed.is_empty() {
        return Err(FeatureError::Config(
            "no rows survived filtering, cannot derive a schema".into(),
        ));
    }
    let mut observed: [BTreeSet<String>; 4] = Default::default();
    for p in parsed {
        for (i, group) in GROUPS.iter().enumerate() {
            let location = match group.side {
                Side::Pickup => p.trip.pickup_location,
                Side::Dropoff => p.trip.dropoff_location,
            };
            if let Some(value) = group.value_of(zones.get(location)) {
                observed[i].insert(value.to_string());
            }
        }
    }
    let columns: Vec<String> = BASE_COLUMNS
        .iter()
        .map(|c| c.to_string())
        .chain(indicator_columns(&observed))
        .collect();
    info!("derived schema with {} feature columns", columns.len());
    SchemaCatalog::from_columns(columns)
}

fn log_report(report: &BatchReport) {
    info!(
        "batch rows: read={} kept={} invalid={} rejected={} malformed={} bad_timestamps={}",
        report.rows_read,
        report.rows_kept,
        report.invalid,
        report.rejected,
        report.malformed,
        report.unparseable_timestamps
    );
    if report.pickup_zone_misses + report.dropoff_zone_misses > 0 {
        warn!(
            "{} pickup and {} dropoff location IDs not found in zone table",
            report.pickup_zone_misses, report.dropoff_zone_misses
        );
    }
    for ((group, value), count) in &report.unseen_categories {
        warn!("{} rows with unseen {} category {:?}", count, group, value);
    }
}

impl TrainingTable {
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Cuts at `floor(n * train)` and `floor(n * (train + val))`.
    pub fn split(&self, train_fraction: f64, val_fraction: f64) -> Split<'_> {
        let n = self.rows.len();
        let train_end = ((n as f64 * train_fraction) as usize).min(n);
        let val_end = ((n as f64 * (train_fraction + val_fraction)) as usize).clamp(train_end, n);
        Split {
            train: &self.rows[..train_end],
            val: &self.rows[train_end..val_end],
            test: &self.rows[val_end..],
        }
    }

    /// Header row: schema columns, then the target column.
    pub fn header(&self) -> Vec<&str> {
        self.catalog
            .columns()
            .iter()
            .map(String::as_str)
            .chain(std::iter::once(self.target_column.as_str()))
            .collect()
    }

    pub fn write_csv<P: AsRef<Path>>(&self, path: P, rows: &[TrainingRow]) -> Result<()> {
        let mut wtr = csv::Writer::from_path(path.as_ref())?;
        wtr.write_record(self.header())?;
        for row in rows {
            wtr.write_record(
                row.features
                    .values()
                    .iter()
                    .chain(std::iter::once(&row.target))
                    .map(|v| v.to_string()),
            )?;
        }
        wtr.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::zones::ZoneRecord;

    const HEADER: &str = "trip_id,VendorID,tpep_pickup_datetime,tpep_dropoff_datetime,passenger_count,trip_distance,PULocationID,DOLocationID,fare_amount,total_amount,Airport_fee";

    fn zones() -> Arc<ZoneLookup> {
        Arc::new(ZoneLookup::from_records([
            ZoneRecord {
                location_id: 132,
                borough: Some("Queens".into()),
                zone: Some("JFK Airport".into()),
                service_zone: Some("Airports".into()),
            },
            ZoneRecord {
                location_id: 236,
                borough: Some("Manhattan".into()),
                zone: Some("Upper East Side North".into()),
                service_zone: Some("Yellow Zone".into()),
            },
        ]))
    }

    fn table(rows: &[&str], options: &BatchOptions) -> TrainingTable {
        let csv = format!("{}\n{}\n", HEADER, rows.join("\n"));
        let mut report = BatchReport::default();
        let raw = read_raw_trips(csv.as_bytes(), &mut report).unwrap();
        build_training_table(raw, zones(), None, options, report).unwrap()
    }

    #[test]
    fn filters_invalid_rows() {
        let t = table(
            &[
                "a,1,2024-01-05 08:30:00,2024-01-05 08:45:00,1,2.0,236,132,10,15,0",
                "b,1,2024-01-05 09:00:00,2024-01-05 09:15:00,1,0.0,236,132,10,15,0",
                "c,1,2024-01-05 10:00:00,2024-01-05 16:40:00,1,2.0,236,132,10,15,0",
                "d,1,2024-01-05 11:00:00,2024-01-05 11:10:00,,2.0,236,132,10,15,0",
            ],
            &BatchOptions::default(),
        );
        assert_eq!(t.len(), 1);
        assert_eq!(t.rows[0].target, 15.0);
        assert_eq!(t.report.invalid, 3);
        assert_eq!(t.report.rows_kept, 1);
    }

    #[test]
    fn derives_schema_and_encodes() {
        let t = table(
            &["a,1,2024-01-05 08:30:00,2024-01-05 08:45:00,1,2.0,132,236,10,15,1.75"],
            &BatchOptions::default(),
        );
        assert_eq!(
            t.catalog.columns(),
            [
                "trip_distance",
                "pickup_hour",
                "pickup_minute",
                "pickup_dayofweek",
                "pickup_dayofmonth",
                "is_from_airport",
                "pickup_borough_Queens",
                "pickup_service_zone_Airports",
                "dropoff_borough_Manhattan",
                "dropoff_service_zone_Yellow Zone",
            ]
        );
        let f = &t.rows[0].features;
        assert_eq!(f.get("is_from_airport"), Some(1.0));
        assert_eq!(f.get("pickup_borough_Queens"), Some(1.0));
        assert_eq!(t.header().last(), Some(&"trip_time"));
    }

    #[test]
    fn sorts_by_pickup_and_splits() {
        let rows: Vec<String> = (0..10)
            .rev()
            .map(|i| {
                format!(
                    "t{i},1,2024-01-05 {:02}:00:00,2024-01-05 {:02}:20:00,1,1.0,236,236,5,7,0",
                    i + 1,
                    i + 1
                )
            })
            .collect();
        let refs: Vec<&str> = rows.iter().map(String::as_str).collect();
        let options = BatchOptions {
            keep_trip_id: true,
            ..BatchOptions::default()
        };
        let t = table(&refs, &options);
        assert_eq!(t.rows[0].trip_id.as_deref(), Some("t0"));
        assert!(t.rows.windows(2).all(|w| w[0].pickup_at <= w[1].pickup_at));

        let split = t.split(0.7, 0.15);
        assert_eq!((split.train.len(), split.val.len(), split.test.len()), (7, 1, 2));
    }

    #[test]
    fn non_finite_distance_drops_only_that_row() {
        let rows = [
            "a,1,2024-01-05 08:30:00,2024-01-05 08:45:00,1,2.0,236,132,10,15,0",
            "b,1,2024-01-05 09:00:00,2024-01-05 09:15:00,1,inf,236,132,10,15,0",
            "c,1,2024-01-05 10:00:00,2024-01-05 10:15:00,1,NaN,236,132,10,15,0",
        ];

        let t = table(&rows, &BatchOptions::default());
        assert_eq!(t.len(), 1);
        assert_eq!(t.report.invalid, 2);
        assert_eq!(t.report.rejected, 0);

        let unfiltered = BatchOptions {
            remove_invalid: false,
            keep_trip_id: true,
            ..BatchOptions::default()
        };
        let t = table(&rows, &unfiltered);
        assert_eq!(t.len(), 1);
        assert_eq!(t.rows[0].trip_id.as_deref(), Some("a"));
        assert_eq!(t.report.rejected, 2);
        assert_eq!(t.report.rows_kept, 1);
    }

    #[test]
    fn unparseable_and_malformed_rows_are_counted() {
        let t = table(
            &[
                "a,1,2024-01-05 08:30:00,2024-01-05 08:45:00,1,2.0,236,132,10,15,0",
                "b,1,garbage,2024-01-05 08:45:00,1,2.0,236,132,10,15,0",
                "c,1,2024-01-05 08:30:00,2024-01-05 08:45:00,1,far,236,132,10,15,0",
            ],
            &BatchOptions::default(),
        );
        assert_eq!(t.len(), 1);
        assert_eq!(t.report.unparseable_timestamps, 1);
        assert_eq!(t.report.malformed, 1);
        assert_eq!(t.report.rows_read, 3);
    }
}
