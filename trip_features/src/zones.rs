use serde::Deserialize;
use std::{collections::HashMap, fmt, io::Read, path::Path};
use tracing::{info, warn};

use crate::error::{FeatureError, Result};

/// Cell values the reference table uses for "no value".
const NA_TOKENS: [&str; 6] = ["", "N/A", "NA", "NaN", "nan", "null"];

/// Which end of the trip a location belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    Pickup,
    Dropoff,
}

impl Side {
    pub fn prefix(self) -> &'static str {
        match self {
            Side::Pickup => "pickup",
            Side::Dropoff => "dropoff",
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.prefix())
    }
}

// Row layout of the reference zone table.
#[derive(Deserialize)]
struct ZoneRow {
    #[serde(rename = "LocationID")]
    location_id: i64,
    #[serde(rename = "Borough")]
    borough: Option<String>,
    #[serde(rename = "Zone")]
    zone: Option<String>,
    service_zone: Option<String>,
}

/// Geographic metadata for one taxi zone. Missing cells are `None`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ZoneRecord {
    pub location_id: i64,
    pub borough: Option<String>,
    pub zone: Option<String>,
    pub service_zone: Option<String>,
}

fn clean(cell: Option<String>) -> Option<String> {
    cell.map(|s| s.trim().to_string())
        .filter(|s| !NA_TOKENS.contains(&s.as_str()))
}

/// Immutable location id → zone table, loaded once and shared read-only.
#[derive(Debug, Clone, Default)]
pub struct ZoneLookup {
    zones: HashMap<i64, ZoneRecord>,
}

impl ZoneLookup {
    pub fn from_records(records: impl IntoIterator<Item = ZoneRecord>) -> Self {
        let zones = records
            .into_iter()
            .map(|r| (r.location_id, r))
            .collect();
        Self { zones }
    }

    pub fn from_csv<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let file = std::fs::File::open(path).map_err(|e| {
            FeatureError::ZoneTable(format!("cannot open {}: {}", path.display(), e))
        })?;
        let lookup = Self::from_reader(file)?;
        info!("loaded {} zones from {}", lookup.len(), path.display());
        Ok(lookup)
    }

    pub fn from_reader<R: Read>(reader: R) -> Result<Self> {
        let mut rdr = csv::Reader::from_reader(reader);
        let mut zones = HashMap::new();
        for row in rdr.deserialize::<ZoneRow>() {
            let row = row?;
            let record = ZoneRecord {
                location_id: row.location_id,
                borough: clean(row.borough),
                zone: clean(row.zone),
                service_zone: clean(row.service_zone),
            };
            if zones.insert(record.location_id, record).is_some() {
                return Err(FeatureError::ZoneTable(format!(
                    "duplicate LocationID {}",
                    row.location_id
                )));
            }
        }
        if zones.is_empty() {
            return Err(FeatureError::ZoneTable("zone table is empty".into()));
        }
        Ok(Self { zones })
    }

    /// Plain lookup, no logging.
    pub fn get(&self, location_id: i64) -> Option<&ZoneRecord> {
        self.zones.get(&location_id)
    }

    /// Lookup for a single request. A miss is logged and returned as `None`.
    pub fn lookup(&self, side: Side, location_id: i64) -> Option<&ZoneRecord> {
        let hit = self.get(location_id);
        if hit.is_none() {
            warn!(
                side = %side,
                location_id,
                "{} location ID {} not found in zone table",
                side,
                location_id
            );
        }
        hit
    }

    pub fn len(&self) -> usize {
        self.zones.len()
    }

    pub fn is_empty(&self) -> bool {
        self.zones.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ZONES: &str = "\"LocationID\",\"Borough\",\"Zone\",\"service_zone\"
1,\"EWR\",\"Newark Airport\",\"EWR\"
132,\"Queens\",\"JFK Airport\",\"Airports\"
264,\"Unknown\",\"N/A\",\"N/A\"
265,\"N/A\",\"Outside of NYC\",\"N/A\"
";

    #[test]
    fn loads_and_looks_up() {
        let zones = ZoneLookup::from_reader(ZONES.as_bytes()).unwrap();
        assert_eq!(zones.len(), 4);
        let jfk = zones.get(132).unwrap();
        assert_eq!(jfk.borough.as_deref(), Some("Queens"));
        assert_eq!(jfk.service_zone.as_deref(), Some("Airports"));
        assert!(zones.lookup(Side::Dropoff, 999).is_none());
    }

    #[test]
    fn na_cells_become_none() {
        let zones = ZoneLookup::from_reader(ZONES.as_bytes()).unwrap();
        let unknown = zones.get(264).unwrap();
        assert_eq!(unknown.borough.as_deref(), Some("Unknown"));
        assert_eq!(unknown.zone, None);
        assert_eq!(unknown.service_zone, None);
        assert_eq!(zones.get(265).unwrap().borough, None);
    }

    #[test]
    fn rejects_duplicates_and_empty_tables() {
        let dup = "LocationID,Borough,Zone,service_zone\n1,A,B,C\n1,A,B,C\n";
        assert!(matches!(
            ZoneLookup::from_reader(dup.as_bytes()),
            Err(FeatureError::ZoneTable(_))
        ));
        let empty = "LocationID,Borough,Zone,service_zone\n";
        assert!(ZoneLookup::from_reader(empty.as_bytes()).is_err());
    }
}
