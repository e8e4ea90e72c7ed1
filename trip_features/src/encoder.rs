//! One-hot encoding of zone metadata against a fixed vocabulary.
//!
//! The vocabulary is read off the schema catalog once: every column named
//! `<group>_<value>` registers `value` as a known category of `group`.

use std::collections::BTreeMap;

use crate::error::{FeatureError, Result};
use crate::reconcile::FeatureRecord;
use crate::schema::SchemaCatalog;
use crate::zones::{Side, ZoneRecord};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ZoneField {
    Borough,
    ServiceZone,
}

impl ZoneField {
    fn read(self, zone: &ZoneRecord) -> Option<&str> {
        match self {
            ZoneField::Borough => zone.borough.as_deref(),
            ZoneField::ServiceZone => zone.service_zone.as_deref(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CategoricalGroup {
    pub name: &'static str,
    pub side: Side,
    pub field: ZoneField,
}

/// Encoded groups, in the order their indicator columns are laid out.
pub const GROUPS: [CategoricalGroup; 4] = [
    CategoricalGroup {
        name: "pickup_borough",
        side: Side::Pickup,
        field: ZoneField::Borough,
    },
    CategoricalGroup {
        name: "pickup_service_zone",
        side: Side::Pickup,
        field: ZoneField::ServiceZone,
    },
    CategoricalGroup {
        name: "dropoff_borough",
        side: Side::Dropoff,
        field: ZoneField::Borough,
    },
    CategoricalGroup {
        name: "dropoff_service_zone",
        side: Side::Dropoff,
        field: ZoneField::ServiceZone,
    },
];

impl CategoricalGroup {
    pub fn column_for(&self, value: &str) -> String {
        format!("{}_{}", self.name, value)
    }

    /// Category value for this group, `None` on a Miss or an NA cell.
    pub fn value_of<'a>(&self, zone: Option<&'a ZoneRecord>) -> Option<&'a str> {
        zone.and_then(|z| self.field.read(z))
    }
}

/// A category with no indicator column in the catalog.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnseenCategory {
    pub group: &'static str,
    pub value: String,
}

/// Fixed vocabulary encoder built from a schema catalog.
#[derive(Debug, Clone)]
pub struct CategoricalEncoder {
    // group index -> category value -> column name
    vocabulary: Vec<BTreeMap<String, String>>,
}

impl CategoricalEncoder {
    /// Fails with `MissingCategoryGroup` when a group has no columns at all,
    /// which means the catalog itself was built wrong.
    pub fn from_catalog(catalog: &SchemaCatalog) -> Result<Self> {
        let mut vocabulary = vec![BTreeMap::new(); GROUPS.len()];
        for column in catalog.columns() {
            // Longest group prefix wins so nested group names cannot steal columns.
            let owner = GROUPS
                .iter()
                .enumerate()
                .filter(|(_, g)| {
                    column.len() > g.name.len() + 1
                        && column.starts_with(g.name)
                        && column.as_bytes()[g.name.len()] == b'_'
                })
                .max_by_key(|(_, g)| g.name.len());
            if let Some((i, g)) = owner {
                let value = column[g.name.len() + 1..].to_string();
                vocabulary[i].insert(value, column.clone());
            }
        }
        for (group, vocab) in GROUPS.iter().zip(&vocabulary) {
            if vocab.is_empty() {
                return Err(FeatureError::MissingCategoryGroup {
                    group: group.name.to_string(),
                });
            }
        }
        Ok(Self { vocabulary })
    }

    #[cfg(test)]
    fn known_values(&self, group: &str) -> Vec<&str> {
        GROUPS
            .iter()
            .position(|g| g.name == group)
            .map(|i| self.vocabulary[i].keys().map(String::as_str).collect())
            .unwrap_or_default()
    }

    /// Writes 0.0 to every indicator column, then 1.0 to each matched category.
    /// Returns categories that have no column. Missing zones contribute nothing.
    pub fn encode(
        &self,
        record: &mut FeatureRecord,
        pickup: Option<&ZoneRecord>,
        dropoff: Option<&ZoneRecord>,
    ) -> Vec<UnseenCategory> {
        for column in self.vocabulary.iter().flat_map(|v| v.values()) {
            record.set(column.as_str(), 0.0);
        }

        let mut unseen = Vec::new();
        for (group, vocab) in GROUPS.iter().zip(&self.vocabulary) {
            let zone = match group.side {
                Side::Pickup => pickup,
                Side::Dropoff => dropoff,
            };
            let Some(value) = group.value_of(zone) else {
                continue;
            };
            match vocab.get(value) {
                Some(column) => record.set(column.as_str(), 1.0),
                None => unseen.push(UnseenCategory {
                    group: group.name,
                    value: value.to_string(),
                }),
            }
        }
        unseen
    }
}

/// Indicator column names for the observed categories, grouped in `GROUPS`
/// order and sorted by value inside each group.
pub fn indicator_columns(observed: &[std::collections::BTreeSet<String>; 4]) -> Vec<String> {
    GROUPS
        .iter()
        .zip(observed)
        .flat_map(|(g, values)| values.iter().map(move |v| g.column_for(v)))
        .collect()
}
