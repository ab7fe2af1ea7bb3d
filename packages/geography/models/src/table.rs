//! Per-area attribute table and column extraction.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::AreaId;

/// Errors raised while building or reading an [`AreaTable`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TableError {
    /// The same area identifier was inserted twice.
    #[error("Area {0} appears more than once in the table")]
    DuplicateArea(AreaId),

    /// An attribute name is neither a table column nor a derived column.
    #[error("Unknown attribute: {0}")]
    UnknownAttribute(String),

    /// An area identifier requested by the caller is not in the table.
    #[error("Unknown area: {0}")]
    UnknownArea(AreaId),

    /// A value is missing and the policy forbids filling it.
    #[error("Area {area} has no value for {attribute}")]
    MissingValue {
        /// Area lacking the value.
        area: AreaId,
        /// Attribute that was requested.
        attribute: String,
    },
}

/// What to do with an area whose attribute value is missing.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "policy", rename_all = "snake_case")]
pub enum MissingValuePolicy {
    /// Substitute a fixed value (canonically `0.0`).
    Fill {
        /// Substituted value.
        value: f64,
    },
    /// Drop the area from the run before the graph is built.
    Exclude,
}

impl Default for MissingValuePolicy {
    fn default() -> Self {
        Self::Fill { value: 0.0 }
    }
}

/// One row of the attribute table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AreaRecord {
    /// Area identifier.
    pub id: AreaId,
    /// Present, finite attribute values keyed by attribute name.
    pub values: BTreeMap<String, f64>,
}

impl AreaRecord {
    /// Creates a record with no values.
    #[must_use]
    pub const fn new(id: AreaId) -> Self {
        Self {
            id,
            values: BTreeMap::new(),
        }
    }

    /// Sets an attribute. `None` and non-finite values are stored as missing.
    #[must_use]
    pub fn with_value(mut self, name: impl Into<String>, value: Option<f64>) -> Self {
        self.set(name, value);
        self
    }

    /// Sets an attribute in place. `None` and non-finite values clear it.
    pub fn set(&mut self, name: impl Into<String>, value: Option<f64>) {
        let name = name.into();
        match value.filter(|v| v.is_finite()) {
            Some(v) => {
                self.values.insert(name, v);
            }
            None => {
                self.values.remove(&name);
            }
        }
    }

    /// Returns the value of `name`, or `None` if it is missing.
    #[must_use]
    pub fn value(&self, name: &str) -> Option<f64> {
        self.values.get(name).copied()
    }
}

/// Values of one attribute aligned to a caller-supplied area order.
#[derive(Debug, Clone, PartialEq)]
pub struct Column {
    /// Attribute name.
    pub name: String,
    /// One value per requested area, in request order.
    pub values: Vec<f64>,
    /// Areas whose value was missing and substituted by the fill policy.
    pub filled: Vec<AreaId>,
}

/// Immutable table of areas and their numeric attributes.
///
/// Row order is insertion order and is preserved by every
/// transformation, so downstream tie-breaking by row order is stable.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AreaTable {
    attributes: BTreeSet<String>,
    records: Vec<AreaRecord>,
    index: BTreeMap<AreaId, usize>,
}

impl AreaTable {
    /// Creates an empty table declaring the given attribute columns.
    #[must_use]
    pub fn new<S: Into<String>>(attributes: impl IntoIterator<Item = S>) -> Self {
        Self {
            attributes: attributes.into_iter().map(Into::into).collect(),
            records: Vec::new(),
            index: BTreeMap::new(),
        }
    }

    /// Builds a table from records.
    ///
    /// # Errors
    ///
    /// Returns [`TableError::DuplicateArea`] if two records share an id.
    pub fn from_records<S: Into<String>>(
        attributes: impl IntoIterator<Item = S>,
        records: impl IntoIterator<Item = AreaRecord>,
    ) -> Result<Self, TableError> {
        let mut table = Self::new(attributes);
        for record in records {
            table.insert(record)?;
        }
        Ok(table)
    }

    /// Appends a record. Attribute names it carries become table columns.
    ///
    /// # Errors
    ///
    /// Returns [`TableError::DuplicateArea`] if the id is already present.
    pub fn insert(&mut self, record: AreaRecord) -> Result<(), TableError> {
        if self.index.contains_key(&record.id) {
            return Err(TableError::DuplicateArea(record.id));
        }
        self.attributes.extend(record.values.keys().cloned());
        self.index.insert(record.id.clone(), self.records.len());
        self.records.push(record);
        Ok(())
    }

    /// Number of areas.
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether the table has no areas.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Area identifiers in row order.
    pub fn ids(&self) -> impl Iterator<Item = &AreaId> {
        self.records.iter().map(|r| &r.id)
    }

    /// Records in row order.
    #[must_use]
    pub fn records(&self) -> &[AreaRecord] {
        &self.records
    }

    /// Declared attribute names.
    #[must_use]
    pub const fn attributes(&self) -> &BTreeSet<String> {
        &self.attributes
    }

    /// Whether `name` is a column of this table.
    #[must_use]
    pub fn has_attribute(&self, name: &str) -> bool {
        self.attributes.contains(name)
    }

    /// Looks up a record by id.
    #[must_use]
    pub fn get(&self, id: &AreaId) -> Option<&AreaRecord> {
        self.index.get(id).map(|&i| &self.records[i])
    }

    /// Returns a new table restricted to `keep`, preserving row order.
    #[must_use]
    pub fn retain_areas(&self, keep: &BTreeSet<AreaId>) -> Self {
        let mut table = Self::new(self.attributes.iter().cloned());
        for record in self.records.iter().filter(|r| keep.contains(&r.id)) {
            table.index.insert(record.id.clone(), table.records.len());
            table.records.push(record.clone());
        }
        table
    }

    /// Returns a new table holding only areas with a value for every
    /// attribute in `names`, plus the identifiers that were dropped.
    ///
    /// # Errors
    ///
    /// Returns [`TableError::UnknownAttribute`] if a name is not a column.
    pub fn complete_cases(&self, names: &[&str]) -> Result<(Self, Vec<AreaId>), TableError> {
        self.check_attributes(names)?;

        let mut keep = BTreeSet::new();
        let mut dropped = Vec::new();
        for record in &self.records {
            if names.iter().all(|n| record.value(n).is_some()) {
                keep.insert(record.id.clone());
            } else {
                dropped.push(record.id.clone());
            }
        }

        if !dropped.is_empty() {
            log::warn!(
                "Dropping {} area(s) missing one of [{}]",
                dropped.len(),
                names.join(", ")
            );
        }

        Ok((self.retain_areas(&keep), dropped))
    }

    /// Extracts attribute `name` for `ids`, in that order.
    ///
    /// # Errors
    ///
    /// * [`TableError::UnknownAttribute`] if `name` is not a column.
    /// * [`TableError::UnknownArea`] if an id is not in the table.
    /// * [`TableError::MissingValue`] if a value is missing under
    ///   [`MissingValuePolicy::Exclude`].
    pub fn column(
        &self,
        ids: &[AreaId],
        name: &str,
        policy: MissingValuePolicy,
    ) -> Result<Column, TableError> {
        self.check_attributes(&[name])?;

        let mut values = Vec::with_capacity(ids.len());
        let mut filled = Vec::new();

        for id in ids {
            let record = self
                .get(id)
                .ok_or_else(|| TableError::UnknownArea(id.clone()))?;
            match (record.value(name), policy) {
                (Some(v), _) => values.push(v),
                (None, MissingValuePolicy::Fill { value }) => {
                    filled.push(id.clone());
                    values.push(value);
                }
                (None, MissingValuePolicy::Exclude) => {
                    return Err(TableError::MissingValue {
                        area: id.clone(),
                        attribute: name.to_string(),
                    });
                }
            }
        }

        if !filled.is_empty() {
            log::debug!("Filled {} missing value(s) for {name}", filled.len());
        }

        Ok(Column {
            name: name.to_string(),
            values,
            filled,
        })
    }

    pub(crate) fn check_attributes(&self, names: &[&str]) -> Result<(), TableError> {
        match names.iter().find(|n| !self.attributes.contains(**n)) {
            Some(missing) => Err(TableError::UnknownAttribute((*missing).to_string())),
            None => Ok(()),
        }
    }

    pub(crate) fn records_mut(&mut self) -> &mut [AreaRecord] {
        &mut self.records
    }

    pub(crate) fn declare(&mut self, name: &str) {
        self.attributes.insert(name.to_string());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> AreaTable {
        AreaTable::from_records(
            ["calls", "poverty"],
            [
                AreaRecord::new(AreaId::new("78201"))
                    .with_value("calls", Some(12.0))
                    .with_value("poverty", Some(0.3)),
                AreaRecord::new(AreaId::new("78202")).with_value("calls", Some(4.0)),
                AreaRecord::new(AreaId::new("78203"))
                    .with_value("calls", Some(f64::NAN))
                    .with_value("poverty", Some(0.1)),
            ],
        )
        .unwrap()
    }

    #[test]
    fn rejects_duplicate_ids() {
        let mut table = sample();
        let err = table
            .insert(AreaRecord::new(AreaId::new("78201")))
            .unwrap_err();
        assert_eq!(err, TableError::DuplicateArea(AreaId::new("78201")));
    }

    #[test]
    fn nan_is_missing() {
        let table = sample();
        assert_eq!(table.get(&AreaId::new("78203")).unwrap().value("calls"), None);
    }

    #[test]
    fn fill_policy_substitutes_and_reports() {
        let table = sample();
        let ids: Vec<AreaId> = table.ids().cloned().collect();
        let column = table
            .column(&ids, "poverty", MissingValuePolicy::Fill { value: 0.0 })
            .unwrap();
        assert_eq!(column.values, vec![0.3, 0.0, 0.1]);
        assert_eq!(column.filled, vec![AreaId::new("78202")]);
    }

    #[test]
    fn exclude_policy_refuses_missing_values() {
        let table = sample();
        let ids: Vec<AreaId> = table.ids().cloned().collect();
        let err = table
            .column(&ids, "poverty", MissingValuePolicy::Exclude)
            .unwrap_err();
        assert!(matches!(err, TableError::MissingValue { .. }), "{err}");
    }

    #[test]
    fn complete_cases_keeps_row_order() {
        let (table, dropped) = sample().complete_cases(&["calls", "poverty"]).unwrap();
        assert_eq!(
            table.ids().map(AreaId::as_str).collect::<Vec<_>>(),
            vec!["78201"]
        );
        assert_eq!(dropped, vec![AreaId::new("78202"), AreaId::new("78203")]);
    }

    #[test]
    fn unknown_attribute_is_an_error() {
        let err = sample().complete_cases(&["alice"]).unwrap_err();
        assert_eq!(err, TableError::UnknownAttribute("alice".to_string()));
    }

    #[test]
    fn policy_parses_from_toml() {
        #[derive(Deserialize)]
        struct Wrapper {
            missing: MissingValuePolicy,
        }

        let fill: Wrapper = toml::from_str("missing = { policy = \"fill\", value = 0.0 }").unwrap();
        assert_eq!(fill.missing, MissingValuePolicy::Fill { value: 0.0 });

        let exclude: Wrapper = toml::from_str("missing = { policy = \"exclude\" }").unwrap();
        assert_eq!(exclude.missing, MissingValuePolicy::Exclude);
    }
}
