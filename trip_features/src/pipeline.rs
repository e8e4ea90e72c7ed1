//! Shared feature engine for online requests and batch rows.
//!
//! Both entry points reduce their input to [`TripFeatures`] and then go through
//! the same zone merge, one-hot encoding and reconciliation, so a trip yields
//! the same vector whichever path it took.

use serde::Deserialize;
use std::sync::Arc;
use tracing::{error, warn};

use crate::encoder::{CategoricalEncoder, UnseenCategory, GROUPS};
use crate::error::{FeatureError, Result};
use crate::reconcile::{reconcile, FeatureRecord, FeatureVector};
use crate::schema::SchemaCatalog;
use crate::temporal::{self, CalendarFeatures};
use crate::zones::{Side, ZoneLookup, ZoneRecord};

pub const TRIP_DISTANCE: &str = "trip_distance";
pub const PICKUP_HOUR: &str = "pickup_hour";
pub const PICKUP_MINUTE: &str = "pickup_minute";
pub const PICKUP_DAYOFWEEK: &str = "pickup_dayofweek";
pub const PICKUP_DAYOFMONTH: &str = "pickup_dayofmonth";
pub const IS_FROM_AIRPORT: &str = "is_from_airport";
pub const PICKUP_LOCATION_ID: &str = "PULocationID";
pub const DROPOFF_LOCATION_ID: &str = "DOLocationID";

/// Non-categorical feature columns, in table order.
pub const BASE_COLUMNS: [&str; 6] = [
    TRIP_DISTANCE,
    PICKUP_HOUR,
    PICKUP_MINUTE,
    PICKUP_DAYOFWEEK,
    PICKUP_DAYOFMONTH,
    IS_FROM_AIRPORT,
];

/// Online prediction input.
#[derive(Debug, Clone, Deserialize)]
pub struct PredictionRequest {
    #[serde(default)]
    pub trip_id: String,
    pub request_datetime: String,
    pub trip_distance: f64,
    #[serde(rename = "PULocationID")]
    pub pickup_location: i64,
    #[serde(rename = "DOLocationID")]
    pub dropoff_location: i64,
    #[serde(rename = "Airport")]
    pub airport: u8,
}

/// Path-independent view of one trip, ready for merge and encoding.
#[derive(Debug, Clone, PartialEq)]
pub struct TripFeatures {
    pub trip_distance: f64,
    pub calendar: CalendarFeatures,
    pub is_from_airport: f64,
    pub pickup_location: i64,
    pub dropoff_location: i64,
}

/// Zone metadata, encoder and schema for one model version. Immutable and
/// shared by reference across request handlers.
#[derive(Debug, Clone)]
pub struct FeatureEngine {
    zones: Arc<ZoneLookup>,
    catalog: SchemaCatalog,
    encoder: CategoricalEncoder,
}

impl FeatureEngine {
    pub fn new(zones: Arc<ZoneLookup>, catalog: SchemaCatalog) -> Result<Self> {
        let encoder = CategoricalEncoder::from_catalog(&catalog)?;
        for column in BASE_COLUMNS {
            if !catalog.contains(column) {
                warn!("schema has no {:?} column, it will be dropped on reconcile", column);
            }
        }
        Ok(Self {
            zones,
            catalog,
            encoder,
        })
    }

    pub fn catalog(&self) -> &SchemaCatalog {
        &self.catalog
    }

    pub fn zones(&self) -> &ZoneLookup {
        &self.zones
    }

    /// Online path: one request in, exactly one vector or an error out.
    pub fn extract(&self, request: &PredictionRequest) -> Result<FeatureVector> {
        let calendar = temporal::decompose(&request.request_datetime).map_err(|e| {
            error!(
                "request datetime {:?} matches neither {} nor a general date format",
                request.request_datetime,
                temporal::STRICT_FORMAT
            );
            e
        })?;

        if request.airport > 1 {
            error!("airport flag must be 0 or 1, got {}", request.airport);
            return Err(FeatureError::InvalidField {
                field: "Airport",
                value: request.airport.to_string(),
            });
        }

        if request.trip_distance < 0.0 {
            warn!(
                "trip distance is negative: {}, converting to positive",
                request.trip_distance
            );
        }

        let trip = TripFeatures {
            trip_distance: request.trip_distance.abs(),
            calendar,
            is_from_airport: f64::from(request.airport),
            pickup_location: request.pickup_location,
            dropoff_location: request.dropoff_location,
        };
        self.transform(&trip)
    }

    /// Merge, encode and reconcile a single trip, logging every anomaly.
    pub fn transform(&self, trip: &TripFeatures) -> Result<FeatureVector> {
        let pickup = self.zones.lookup(Side::Pickup, trip.pickup_location);
        let dropoff = self.zones.lookup(Side::Dropoff, trip.dropoff_location);
        let (record, unseen) = self.build_record(trip, pickup, dropoff);
        for u in &unseen {
            warn!(
                group = u.group,
                value = %u.value,
                "category {:?} of {} has no column in schema",
                u.value,
                u.group
            );
        }
        reconcile(&record, &self.catalog)
    }

    /// Intermediate record: base features, raw ids and names, indicators.
    pub(crate) fn build_record(
        &self,
        trip: &TripFeatures,
        pickup: Option<&ZoneRecord>,
        dropoff: Option<&ZoneRecord>,
    ) -> (FeatureRecord, Vec<UnseenCategory>) {
        let mut record = FeatureRecord::new();
        record.set(TRIP_DISTANCE, trip.trip_distance);
        record.set(PICKUP_HOUR, trip.calendar.hour);
        record.set(PICKUP_MINUTE, trip.calendar.minute);
        record.set(PICKUP_DAYOFWEEK, trip.calendar.day_of_week);
        record.set(PICKUP_DAYOFMONTH, trip.calendar.day_of_month);
        record.set(IS_FROM_AIRPORT, trip.is_from_airport);
        record.set(PICKUP_LOCATION_ID, trip.pickup_location);
        record.set(DROPOFF_LOCATION_ID, trip.dropoff_location);

        // raw category names ride along until reconcile drops them
        for group in GROUPS {
            let zone = match group.side {
                Side::Pickup => pickup,
                Side::Dropoff => dropoff,
            };
            if let Some(value) = group.value_of(zone) {
                record.set(group.name, value);
            }
        }

        let unseen = self.encoder.encode(&mut record, pickup, dropoff);
        (record, unseen)
    }
}
