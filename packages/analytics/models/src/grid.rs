//! Quantile-grid classification types.

use need_map_geography_models::AreaId;
use serde::{Deserialize, Serialize};

/// Caller-supplied `k` x `k` table of category labels indexed by the
/// quantile ranks of two variables.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "Vec<Vec<String>>", into = "Vec<Vec<String>>")]
pub struct CategoryGrid {
    /// `labels[rank_x - 1][rank_y - 1]`.
    labels: Vec<Vec<String>>,
}

impl CategoryGrid {
    /// Builds a grid from rows indexed by the x rank.
    ///
    /// Returns `None` unless the table is square with at least two bins.
    #[must_use]
    pub fn new(labels: Vec<Vec<String>>) -> Option<Self> {
        let k = labels.len();
        if k < 2 || labels.iter().any(|row| row.len() != k) {
            return None;
        }
        Some(Self { labels })
    }

    /// Builds a `bins` x `bins` grid from a function of `(rank_x, rank_y)`,
    /// both 1-based.
    ///
    /// # Panics
    ///
    /// Panics if `bins < 2`.
    #[must_use]
    pub fn from_fn(bins: usize, label: impl Fn(usize, usize) -> String) -> Self {
        assert!(bins >= 2, "a category grid needs at least two bins");
        Self {
            labels: (1..=bins)
                .map(|x| (1..=bins).map(|y| label(x, y)).collect())
                .collect(),
        }
    }

    /// Need (x) against call volume (y) in quartiles.
    ///
    /// The extreme off-diagonal corners are the strong mismatches, their
    /// orthogonal neighbours the moderate ones; everything else is aligned.
    #[must_use]
    pub fn need_vs_demand_quartiles() -> Self {
        Self::from_fn(4, |need, calls| {
            let label = match (need, calls) {
                (4, 1) => "high need, low call volume: service gap",
                (3, 1) | (4, 2) => "elevated need, low call volume: emerging service gap",
                (1, 4) => "low need, high call volume: misaligned",
                (2, 4) | (1, 3) => "modest need, high call volume: leaning misaligned",
                _ => "need and call volume aligned",
            };
            label.to_string()
        })
    }

    /// Labels every cell with its rank pair, `"{rank_x}-{rank_y}"`.
    ///
    /// # Panics
    ///
    /// Panics if `bins < 2`.
    #[must_use]
    pub fn rank_pairs(bins: usize) -> Self {
        Self::from_fn(bins, |x, y| format!("{x}-{y}"))
    }

    /// Number of bins per axis.
    #[must_use]
    pub fn bins(&self) -> usize {
        self.labels.len()
    }

    /// Label for 1-based ranks, or `None` if either is out of range.
    #[must_use]
    pub fn label(&self, rank_x: usize, rank_y: usize) -> Option<&str> {
        self.labels
            .get(rank_x.checked_sub(1)?)?
            .get(rank_y.checked_sub(1)?)
            .map(String::as_str)
    }
}

impl TryFrom<Vec<Vec<String>>> for CategoryGrid {
    type Error = String;

    fn try_from(labels: Vec<Vec<String>>) -> Result<Self, Self::Error> {
        Self::new(labels).ok_or_else(|| "category grid must be square with at least 2 bins".into())
    }
}

impl From<CategoryGrid> for Vec<Vec<String>> {
    fn from(grid: CategoryGrid) -> Self {
        grid.labels
    }
}

/// One area's position in the quantile grid.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuantileClass {
    /// Area identifier.
    pub area_id: AreaId,
    /// 1-based quantile rank of the x variable.
    pub rank_x: usize,
    /// 1-based quantile rank of the y variable.
    pub rank_y: usize,
    /// Category from the caller's grid.
    pub category: String,
}

/// Quantile-grid classification of every area.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuantileGrid {
    /// Variable on the x axis.
    pub x_variable: String,
    /// Variable on the y axis.
    pub y_variable: String,
    /// Bins per axis.
    pub bins: usize,
    /// Per-area classes, in area order.
    pub classes: Vec<QuantileClass>,
}

impl QuantileGrid {
    /// Area counts per cell, `counts[rank_x - 1][rank_y - 1]`.
    #[must_use]
    pub fn cell_counts(&self) -> Vec<Vec<usize>> {
        let mut counts = vec![vec![0; self.bins]; self.bins];
        for class in &self.classes {
            counts[class.rank_x - 1][class.rank_y - 1] += 1;
        }
        counts
    }

    /// Share of all areas per cell, in the same layout as
    /// [`Self::cell_counts`].
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn cell_shares(&self) -> Vec<Vec<f64>> {
        let total = self.classes.len().max(1) as f64;
        self.cell_counts()
            .into_iter()
            .map(|row| row.into_iter().map(|c| c as f64 / total).collect())
            .collect()
    }

    /// Number of areas in each x bin.
    #[must_use]
    pub fn x_bin_sizes(&self) -> Vec<usize> {
        self.cell_counts().iter().map(|row| row.iter().sum()).collect()
    }

    /// Number of areas in each y bin.
    #[must_use]
    pub fn y_bin_sizes(&self) -> Vec<usize> {
        let counts = self.cell_counts();
        (0..self.bins)
            .map(|y| counts.iter().map(|row| row[y]).sum())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_ragged_grids() {
        assert!(CategoryGrid::new(vec![vec!["a".into()]]).is_none());
        assert!(CategoryGrid::new(vec![vec!["a".into(), "b".into()], vec!["c".into()]]).is_none());
    }

    #[test]
    fn quartile_grid_corners() {
        let grid = CategoryGrid::need_vs_demand_quartiles();
        assert_eq!(grid.bins(), 4);
        assert!(grid.label(4, 1).unwrap().contains("service gap"));
        assert!(grid.label(1, 4).unwrap().contains("misaligned"));
        assert_eq!(grid.label(2, 2), Some("need and call volume aligned"));
        assert_eq!(grid.label(0, 1), None);
        assert_eq!(grid.label(5, 1), None);
    }

    #[test]
    fn rank_pair_labels() {
        let grid = CategoryGrid::rank_pairs(3);
        assert_eq!(grid.label(3, 1), Some("3-1"));
    }

    #[test]
    fn counts_and_shares() {
        let classes = [(1, 1), (1, 1), (2, 1), (2, 2)]
            .into_iter()
            .enumerate()
            .map(|(i, (x, y))| QuantileClass {
                area_id: AreaId::new(i.to_string()),
                rank_x: x,
                rank_y: y,
                category: String::new(),
            })
            .collect();
        let grid = QuantileGrid {
            x_variable: "need".into(),
            y_variable: "calls".into(),
            bins: 2,
            classes,
        };
        assert_eq!(grid.cell_counts(), vec![vec![2, 0], vec![1, 1]]);
        assert_eq!(grid.x_bin_sizes(), vec![2, 2]);
        assert_eq!(grid.y_bin_sizes(), vec![3, 1]);
        assert!((grid.cell_shares()[0][0] - 0.5).abs() < 1e-12);
    }

    #[test]
    fn parses_from_toml() {
        #[derive(Deserialize)]
        struct Wrapper {
            grid: CategoryGrid,
        }

        let parsed: Wrapper =
            toml::from_str("grid = [[\"a\", \"b\"], [\"c\", \"d\"]]").unwrap();
        assert_eq!(parsed.grid.label(2, 1), Some("c"));

        assert!(toml::from_str::<Wrapper>("grid = [[\"a\"]]").is_err());
    }
}
