#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Area identifiers and per-area attribute tables.
//!
//! An area is one spatial unit (a ZIP code / ZCTA) carrying a handful of
//! named numeric attributes such as callers per 1,000 residents or the
//! share of households in poverty. Tables are immutable snapshots: every
//! transformation returns a new table.

pub mod derive;
pub mod table;

use std::fmt;

use serde::{Deserialize, Serialize};

pub use derive::{Derivation, DerivedAttribute};
pub use table::{AreaRecord, AreaTable, Column, MissingValuePolicy, TableError};

/// Stable identifier of an area, e.g. a five-digit ZIP code `"78201"`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AreaId(String);

impl AreaId {
    /// Wraps an already-normalized identifier.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Builds a fixed-width, zero-padded numeric identifier.
    ///
    /// Returns `None` if `raw` is empty, contains anything other than
    /// ASCII digits, or is wider than `width`.
    ///
    /// ```
    /// use need_map_geography_models::AreaId;
    ///
    /// assert_eq!(AreaId::zero_padded(" 7820 ", 5).unwrap().as_str(), "07820");
    /// assert!(AreaId::zero_padded("782011", 5).is_none());
    /// ```
    #[must_use]
    pub fn zero_padded(raw: &str, width: usize) -> Option<Self> {
        let trimmed = raw.trim();
        if trimmed.is_empty()
            || trimmed.len() > width
            || !trimmed.bytes().all(|b| b.is_ascii_digit())
        {
            return None;
        }
        Some(Self(format!("{trimmed:0>width$}")))
    }

    /// The identifier as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AreaId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for AreaId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}
