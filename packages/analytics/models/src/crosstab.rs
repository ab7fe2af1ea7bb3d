//! Contingency table of two per-area labelings.

use need_map_geography_models::AreaId;
use serde::{Deserialize, Serialize};

/// Counts of areas per (row label, column label) pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CrossTab {
    /// Name of the row labeling.
    pub row_variable: String,
    /// Name of the column labeling.
    pub column_variable: String,
    /// Row labels, in display order.
    pub rows: Vec<String>,
    /// Column labels, in display order.
    pub columns: Vec<String>,
    /// `counts[row][column]`.
    pub counts: Vec<Vec<u64>>,
    /// Areas labeled by the row labeling only.
    pub only_in_rows: Vec<AreaId>,
    /// Areas labeled by the column labeling only.
    pub only_in_columns: Vec<AreaId>,
}

impl CrossTab {
    /// Sum of all cells: the number of areas present in both labelings.
    #[must_use]
    pub fn total(&self) -> u64 {
        self.counts.iter().flatten().sum()
    }

    /// Count for a label pair, if both labels are in the table.
    #[must_use]
    pub fn count(&self, row: &str, column: &str) -> Option<u64> {
        let r = self.rows.iter().position(|l| l == row)?;
        let c = self.columns.iter().position(|l| l == column)?;
        Some(self.counts[r][c])
    }

    /// Per-row totals.
    #[must_use]
    pub fn row_totals(&self) -> Vec<u64> {
        self.counts.iter().map(|row| row.iter().sum()).collect()
    }

    /// Per-column totals.
    #[must_use]
    pub fn column_totals(&self) -> Vec<u64> {
        (0..self.columns.len())
            .map(|c| self.counts.iter().map(|row| row[c]).sum())
            .collect()
    }

    /// Number of areas excluded for appearing in only one labeling.
    #[must_use]
    pub fn excluded(&self) -> usize {
        self.only_in_rows.len() + self.only_in_columns.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn totals() {
        let table = CrossTab {
            row_variable: "poverty".into(),
            column_variable: "calls".into(),
            rows: vec!["HH".into(), "NS".into()],
            columns: vec!["LL".into(), "NS".into()],
            counts: vec![vec![2, 1], vec![0, 4]],
            only_in_rows: vec![AreaId::new("1")],
            only_in_columns: vec![],
        };
        assert_eq!(table.total(), 7);
        assert_eq!(table.count("HH", "LL"), Some(2));
        assert_eq!(table.count("LH", "LL"), None);
        assert_eq!(table.row_totals(), vec![3, 4]);
        assert_eq!(table.column_totals(), vec![2, 5]);
        assert_eq!(table.excluded(), 1);
    }
}
