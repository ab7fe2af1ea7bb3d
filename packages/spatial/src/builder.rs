//! Contiguity graph construction from area boundaries.
//!
//! Candidate pairs come from an R-tree over boundary envelopes; only
//! pairs whose envelopes intersect are tested exactly.

use std::collections::{BTreeMap, BTreeSet, HashSet};

use geo::{Coord, Intersects, MultiPolygon};
use need_map_geography_models::AreaId;
use rstar::{AABB, RTree, RTreeObject};
use serde::Serialize;

use crate::boundaries::compute_envelope;
use crate::{Boundary, Contiguity, SpatialError, SpatialWeights};

/// Areas left out of the graph, by reason.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct GeometryExclusions {
    /// Table areas with no boundary.
    pub missing_geometry: Vec<AreaId>,
    /// Boundaries with no matching table area.
    pub unmatched_geometry: Vec<AreaId>,
    /// Table areas whose boundary failed validation.
    pub invalid_geometry: Vec<AreaId>,
}

impl GeometryExclusions {
    /// Number of table areas excluded from the graph.
    #[must_use]
    pub fn excluded_areas(&self) -> usize {
        self.missing_geometry.len() + self.invalid_geometry.len()
    }
}

/// A built graph together with what was left out of it.
#[derive(Debug, Clone)]
pub struct WeightsBuild {
    /// The contiguity graph over the surviving areas, in table order.
    pub weights: SpatialWeights,
    /// Areas excluded while joining boundaries to the table.
    pub exclusions: GeometryExclusions,
}

/// A boundary envelope stored in the R-tree with its node index.
struct EnvelopeEntry {
    node: usize,
    envelope: AABB<[f64; 2]>,
}

impl RTreeObject for EnvelopeEntry {
    type Envelope = AABB<[f64; 2]>;

    fn envelope(&self) -> Self::Envelope {
        self.envelope
    }
}

/// Builds the contiguity graph over `area_ids`, joining each id to its
/// boundary.
///
/// Node order follows `area_ids`. Areas without a boundary, or with an
/// invalid one, are excluded and reported rather than failing the build.
///
/// # Errors
///
/// * [`SpatialError::DuplicateArea`] if `boundaries` repeats an id.
/// * [`SpatialError::InsufficientData`] if fewer than two areas survive.
pub fn build_weights(
    boundaries: &[Boundary],
    area_ids: &[AreaId],
    contiguity: Contiguity,
) -> Result<WeightsBuild, SpatialError> {
    let mut by_id: BTreeMap<&AreaId, &Boundary> = BTreeMap::new();
    for boundary in boundaries {
        if by_id.insert(&boundary.id, boundary).is_some() {
            return Err(SpatialError::DuplicateArea(boundary.id.clone()));
        }
    }

    let wanted: BTreeSet<&AreaId> = area_ids.iter().collect();
    let mut exclusions = GeometryExclusions {
        unmatched_geometry: boundaries
            .iter()
            .filter(|b| !wanted.contains(&b.id))
            .map(|b| b.id.clone())
            .collect(),
        ..GeometryExclusions::default()
    };

    let mut nodes: Vec<&Boundary> = Vec::with_capacity(area_ids.len());
    for id in area_ids {
        match by_id.get(id) {
            None => exclusions.missing_geometry.push(id.clone()),
            Some(boundary) if !boundary.is_valid() => {
                exclusions.invalid_geometry.push(id.clone());
            }
            Some(boundary) => nodes.push(boundary),
        }
    }

    if !exclusions.missing_geometry.is_empty() {
        log::warn!(
            "{} area(s) have no boundary and are excluded from the graph",
            exclusions.missing_geometry.len()
        );
    }
    if !exclusions.invalid_geometry.is_empty() {
        log::warn!(
            "{} area(s) have invalid boundaries and are excluded from the graph",
            exclusions.invalid_geometry.len()
        );
    }
    if !exclusions.unmatched_geometry.is_empty() {
        log::info!(
            "{} boundaries have no matching area and are ignored",
            exclusions.unmatched_geometry.len()
        );
    }

    if nodes.len() < 2 {
        return Err(SpatialError::InsufficientData { valid: nodes.len() });
    }

    let pairs = find_adjacent_pairs(&nodes, contiguity);
    let ids = nodes.iter().map(|b| b.id.clone()).collect();
    let weights = SpatialWeights::from_adjacency(ids, pairs)?;

    let islands = weights.islands();
    log::info!(
        "Built {contiguity} contiguity graph: {} areas, {:.2} mean neighbors, {} island(s)",
        weights.len(),
        weights.mean_cardinality(),
        islands.len()
    );
    for &i in &islands {
        log::debug!("Area {} has no neighbors", weights.id(i));
    }

    Ok(WeightsBuild {
        weights,
        exclusions,
    })
}

fn find_adjacent_pairs(nodes: &[&Boundary], contiguity: Contiguity) -> Vec<(usize, usize)> {
    let entries: Vec<EnvelopeEntry> = nodes
        .iter()
        .enumerate()
        .map(|(node, b)| EnvelopeEntry {
            node,
            envelope: compute_envelope(&b.polygon),
        })
        .collect();
    let envelopes: Vec<AABB<[f64; 2]>> = entries.iter().map(|e| e.envelope).collect();
    let tree = RTree::bulk_load(entries);

    let edges: Vec<HashSet<Edge>> = match contiguity {
        Contiguity::Queen => Vec::new(),
        Contiguity::Rook => nodes.iter().map(|b| edge_set(&b.polygon)).collect(),
    };

    let mut pairs = Vec::new();
    for (i, envelope) in envelopes.iter().enumerate() {
        for candidate in tree.locate_in_envelope_intersecting(envelope) {
            let j = candidate.node;
            if j <= i {
                continue;
            }
            let adjacent = match contiguity {
                Contiguity::Queen => nodes[i].polygon.intersects(&nodes[j].polygon),
                Contiguity::Rook => !edges[i].is_disjoint(&edges[j]),
            };
            if adjacent {
                pairs.push((i, j));
            }
        }
    }
    pairs
}

type Vertex = (u64, u64);
type Edge = (Vertex, Vertex);

fn vertex(c: Coord<f64>) -> Vertex {
    // Adding 0.0 folds -0.0 into +0.0 so both hash alike.
    ((c.x + 0.0).to_bits(), (c.y + 0.0).to_bits())
}

/// Undirected ring segments of a multi-polygon, keyed by exact vertices.
fn edge_set(mp: &MultiPolygon<f64>) -> HashSet<Edge> {
    let mut edges = HashSet::new();
    for polygon in &mp.0 {
        for ring in std::iter::once(polygon.exterior()).chain(polygon.interiors()) {
            for line in ring.lines() {
                let (a, b) = (vertex(line.start), vertex(line.end));
                if a == b {
                    continue;
                }
                edges.insert(if a <= b { (a, b) } else { (b, a) });
            }
        }
    }
    edges
}
