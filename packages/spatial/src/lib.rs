#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions)]

//! Contiguity graphs and spatial weights over area boundaries.
//!
//! Loads ZIP/ZCTA polygons from `GeoJSON`, indexes their envelopes in an
//! R-tree, and connects every pair of areas whose boundaries touch. The
//! resulting [`SpatialWeights`] is built once per run and shared
//! read-only by every statistic computed over it.

pub mod boundaries;
pub mod builder;

use std::collections::BTreeMap;
use std::fmt;

use need_map_geography_models::AreaId;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use boundaries::{Boundary, BoundaryLoad, load_feature_collection};
pub use builder::{GeometryExclusions, WeightsBuild, build_weights};

/// Errors that can occur while building a contiguity graph.
#[derive(Debug, Error)]
pub enum SpatialError {
    /// Fewer than two usable areas remain.
    #[error("Insufficient data: {valid} valid area(s), at least 2 required")]
    InsufficientData {
        /// Number of areas that survived validation.
        valid: usize,
    },

    /// The same area identifier was supplied twice.
    #[error("Area {0} appears more than once")]
    DuplicateArea(AreaId),

    /// An explicit adjacency list is malformed.
    #[error("Invalid adjacency: {reason}")]
    InvalidAdjacency {
        /// Description of what went wrong.
        reason: String,
    },

    /// The boundary document could not be parsed.
    #[error("GeoJSON error: {0}")]
    GeoJson(#[from] geojson::Error),

    /// The boundary document is valid `GeoJSON` but not a feature list.
    #[error("Unsupported GeoJSON document: expected a FeatureCollection or Feature, found {0}")]
    UnsupportedDocument(String),
}

/// Rule deciding when two boundaries are neighbors.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Contiguity {
    /// Boundaries share at least one point (vertex or edge).
    #[default]
    Queen,
    /// Boundaries share at least one edge segment.
    Rook,
}

impl fmt::Display for Contiguity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Queen => write!(f, "queen"),
            Self::Rook => write!(f, "rook"),
        }
    }
}

/// Symmetric binary adjacency graph with row-standardized weights.
///
/// Node `i` has weight `1 / |neighbors(i)|` toward each neighbor, so every
/// non-island row sums to one and island rows sum to zero.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpatialWeights {
    ids: Vec<AreaId>,
    index: BTreeMap<AreaId, usize>,
    neighbors: Vec<Vec<usize>>,
}

impl SpatialWeights {
    /// Builds a graph from undirected index pairs into `ids`.
    ///
    /// Pairs are symmetrized and de-duplicated.
    ///
    /// # Errors
    ///
    /// * [`SpatialError::InsufficientData`] if fewer than two ids are given.
    /// * [`SpatialError::DuplicateArea`] if an id repeats.
    /// * [`SpatialError::InvalidAdjacency`] for self-loops or out-of-range
    ///   indices.
    pub fn from_adjacency(
        ids: Vec<AreaId>,
        pairs: impl IntoIterator<Item = (usize, usize)>,
    ) -> Result<Self, SpatialError> {
        if ids.len() < 2 {
            return Err(SpatialError::InsufficientData { valid: ids.len() });
        }

        let mut index = BTreeMap::new();
        for (i, id) in ids.iter().enumerate() {
            if index.insert(id.clone(), i).is_some() {
                return Err(SpatialError::DuplicateArea(id.clone()));
            }
        }

        let n = ids.len();
        let mut neighbors = vec![Vec::new(); n];
        for (a, b) in pairs {
            if a >= n || b >= n {
                return Err(SpatialError::InvalidAdjacency {
                    reason: format!("pair ({a}, {b}) out of range for {n} areas"),
                });
            }
            if a == b {
                return Err(SpatialError::InvalidAdjacency {
                    reason: format!("self-loop on area {}", ids[a]),
                });
            }
            neighbors[a].push(b);
            neighbors[b].push(a);
        }
        for list in &mut neighbors {
            list.sort_unstable();
            list.dedup();
        }

        Ok(Self {
            ids,
            index,
            neighbors,
        })
    }

    /// Builds a graph from undirected pairs of identifiers.
    ///
    /// # Errors
    ///
    /// Same as [`Self::from_adjacency`], plus
    /// [`SpatialError::InvalidAdjacency`] when a pair names an unknown id.
    pub fn from_id_pairs(
        ids: Vec<AreaId>,
        pairs: &[(AreaId, AreaId)],
    ) -> Result<Self, SpatialError> {
        let lookup: BTreeMap<&AreaId, usize> =
            ids.iter().enumerate().map(|(i, id)| (id, i)).collect();
        let resolve = |id: &AreaId| {
            lookup
                .get(id)
                .copied()
                .ok_or_else(|| SpatialError::InvalidAdjacency {
                    reason: format!("unknown area {id}"),
                })
        };
        let indexed = pairs
            .iter()
            .map(|(a, b)| Ok((resolve(a)?, resolve(b)?)))
            .collect::<Result<Vec<_>, SpatialError>>()?;

        Self::from_adjacency(ids, indexed)
    }

    /// Number of areas (graph nodes).
    #[must_use]
    pub fn len(&self) -> usize {
        self.ids.len()
    }

    /// Always `false` for a constructed graph; kept for API symmetry.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// Area identifiers in node order.
    #[must_use]
    pub fn ids(&self) -> &[AreaId] {
        &self.ids
    }

    /// Identifier of node `i`.
    #[must_use]
    pub fn id(&self, i: usize) -> &AreaId {
        &self.ids[i]
    }

    /// Node index of `id`, if present.
    #[must_use]
    pub fn index_of(&self, id: &AreaId) -> Option<usize> {
        self.index.get(id).copied()
    }

    /// Sorted neighbor indices of node `i`.
    #[must_use]
    pub fn neighbors(&self, i: usize) -> &[usize] {
        &self.neighbors[i]
    }

    /// Number of neighbors of node `i`.
    #[must_use]
    pub fn cardinality(&self, i: usize) -> usize {
        self.neighbors[i].len()
    }

    /// Whether node `i` has no neighbors.
    #[must_use]
    pub fn is_island(&self, i: usize) -> bool {
        self.neighbors[i].is_empty()
    }

    /// Indices of all island nodes.
    #[must_use]
    pub fn islands(&self) -> Vec<usize> {
        (0..self.len()).filter(|&i| self.is_island(i)).collect()
    }

    /// Row-standardized weight from `i` to `j`.
    #[must_use]
    pub fn weight(&self, i: usize, j: usize) -> f64 {
        if self.neighbors[i].binary_search(&j).is_ok() {
            row_weight(self.cardinality(i))
        } else {
            0.0
        }
    }

    /// Sum of row `i` of the row-standardized matrix: 1, or 0 for islands.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn row_sum(&self, i: usize) -> f64 {
        row_weight(self.cardinality(i)) * self.cardinality(i) as f64
    }

    /// Spatial lag of `values` at node `i`: the mean over its neighbors,
    /// or 0 for an island.
    ///
    /// # Panics
    ///
    /// Panics if `values` is shorter than the graph.
    #[must_use]
    pub fn lag_at(&self, i: usize, values: &[f64]) -> f64 {
        let neighbors = &self.neighbors[i];
        if neighbors.is_empty() {
            return 0.0;
        }
        neighbors.iter().map(|&j| values[j]).sum::<f64>() * row_weight(neighbors.len())
    }

    /// Spatial lag of `values` at every node.
    ///
    /// # Panics
    ///
    /// Panics if `values` is shorter than the graph.
    #[must_use]
    pub fn lag(&self, values: &[f64]) -> Vec<f64> {
        (0..self.len()).map(|i| self.lag_at(i, values)).collect()
    }

    /// `S0`: sum of all weights (the number of non-island nodes).
    #[must_use]
    pub fn s0(&self) -> f64 {
        (0..self.len()).map(|i| self.row_sum(i)).sum()
    }

    /// `S1 = ½ Σᵢ Σⱼ (wᵢⱼ + wⱼᵢ)²`.
    #[must_use]
    pub fn s1(&self) -> f64 {
        let mut total = 0.0;
        for i in 0..self.len() {
            let wi = row_weight(self.cardinality(i));
            for &j in &self.neighbors[i] {
                let wj = row_weight(self.cardinality(j));
                total += (wi + wj).powi(2);
            }
        }
        total / 2.0
    }

    /// `S2 = Σᵢ (wᵢ. + w.ᵢ)²`, row sum plus column sum per node.
    #[must_use]
    pub fn s2(&self) -> f64 {
        (0..self.len())
            .map(|i| {
                let column: f64 = self.neighbors[i]
                    .iter()
                    .map(|&j| row_weight(self.cardinality(j)))
                    .sum();
                (self.row_sum(i) + column).powi(2)
            })
            .sum()
    }

    /// Mean neighbor count across nodes.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn mean_cardinality(&self) -> f64 {
        let links: usize = self.neighbors.iter().map(Vec::len).sum();
        links as f64 / self.len() as f64
    }

    /// Whether every link has its reverse link.
    #[must_use]
    pub fn is_symmetric(&self) -> bool {
        self.neighbors.iter().enumerate().all(|(i, list)| {
            list.iter()
                .all(|&j| self.neighbors[j].binary_search(&i).is_ok())
        })
    }
}

#[allow(clippy::cast_precision_loss)]
fn row_weight(cardinality: usize) -> f64 {
    if cardinality == 0 {
        0.0
    } else {
        1.0 / cardinality as f64
    }
}
