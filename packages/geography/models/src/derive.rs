//! Attributes derived from two other attributes.
//!
//! Some indicator tables publish a cumulative rate (e.g. households below
//! the ALICE threshold, which includes households in poverty) rather than
//! the rate itself. A [`DerivedAttribute`] fills the gap explicitly.
//!
//! Precedence: when the table already carries a column with the derived
//! name, the direct column wins and the derivation is skipped.

use serde::{Deserialize, Serialize};

use crate::{AreaTable, TableError};

/// How a derived value is computed from two inputs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Derivation {
    /// `minuend - subtrahend`.
    Difference {
        /// Left operand.
        minuend: String,
        /// Right operand.
        subtrahend: String,
    },
    /// `left + right`.
    Sum {
        /// Left operand.
        left: String,
        /// Right operand.
        right: String,
    },
}

impl Derivation {
    fn inputs(&self) -> [&str; 2] {
        match self {
            Self::Difference {
                minuend,
                subtrahend,
            } => [minuend.as_str(), subtrahend.as_str()],
            Self::Sum { left, right } => [left.as_str(), right.as_str()],
        }
    }

    fn apply(&self, a: f64, b: f64) -> f64 {
        match self {
            Self::Difference { .. } => a - b,
            Self::Sum { .. } => a + b,
        }
    }
}

/// A named attribute computed from two other attributes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DerivedAttribute {
    /// Name of the produced column.
    pub name: String,
    /// Operation and inputs.
    #[serde(flatten)]
    pub derivation: Derivation,
}

impl AreaTable {
    /// Returns a new table with `derived` columns added, in list order, so
    /// a later derivation may use an earlier one as input.
    ///
    /// An area missing either input gets a missing derived value; the
    /// run's missing-value policy decides what happens to it.
    ///
    /// # Errors
    ///
    /// Returns [`TableError::UnknownAttribute`] if an input is neither a
    /// table column nor an earlier derived column.
    pub fn with_derived(&self, derived: &[DerivedAttribute]) -> Result<Self, TableError> {
        let mut table = self.clone();

        for attribute in derived {
            if table.has_attribute(&attribute.name) {
                log::debug!(
                    "Column {} present in the table; skipping derivation",
                    attribute.name
                );
                continue;
            }

            let [a, b] = attribute.derivation.inputs();
            table.check_attributes(&[a, b])?;

            let mut missing = 0_usize;
            for record in table.records_mut() {
                let value = match (record.value(a), record.value(b)) {
                    (Some(x), Some(y)) => Some(attribute.derivation.apply(x, y)),
                    _ => {
                        missing += 1;
                        None
                    }
                };
                record.set(attribute.name.as_str(), value);
            }
            table.declare(&attribute.name);

            if missing > 0 {
                log::warn!(
                    "Derived column {} is missing for {missing} area(s) with incomplete inputs",
                    attribute.name
                );
            }
        }

        Ok(table)
    }
}
