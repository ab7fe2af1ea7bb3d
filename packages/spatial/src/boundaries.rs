//! Area boundary loading from `GeoJSON`.

use std::collections::BTreeMap;

use geo::{Area, BoundingRect, CoordsIter, MultiPolygon};
use geojson::{Feature, GeoJson};
use need_map_geography_models::AreaId;
use rstar::AABB;

use crate::SpatialError;

/// A single area's boundary.
#[derive(Debug, Clone, PartialEq)]
pub struct Boundary {
    /// Area identifier.
    pub id: AreaId,
    /// Boundary polygon(s).
    pub polygon: MultiPolygon<f64>,
}

impl Boundary {
    /// Whether the geometry is usable for adjacency: at least one polygon,
    /// closed exterior rings, finite coordinates and a non-zero area.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        !self.polygon.0.is_empty()
            && self
                .polygon
                .0
                .iter()
                .all(|p| p.exterior().0.len() >= 4 && p.exterior().is_closed())
            && self
                .polygon
                .coords_iter()
                .all(|c| c.x.is_finite() && c.y.is_finite())
            && self.polygon.unsigned_area() > 0.0
    }
}

/// Result of parsing a boundary document.
#[derive(Debug, Clone, Default)]
pub struct BoundaryLoad {
    /// Parsed boundaries, one per distinct identifier, in document order.
    pub boundaries: Vec<Boundary>,
    /// Features that carried an id but no polygonal geometry.
    pub invalid: Vec<AreaId>,
    /// Features without a usable id property.
    pub unidentified: usize,
}

/// Parses a `GeoJSON` `FeatureCollection` (or single `Feature`) into
/// boundaries keyed by the `id_property` feature property.
///
/// When `id_width` is given, ids are zero-padded to that width (numeric
/// ZIP properties such as `78201` or `"501"` both normalize). Features
/// repeating an id are merged into one multi-polygon.
///
/// # Errors
///
/// * [`SpatialError::GeoJson`] if the document cannot be parsed.
/// * [`SpatialError::UnsupportedDocument`] for a bare geometry.
pub fn load_feature_collection(
    geojson_str: &str,
    id_property: &str,
    id_width: Option<usize>,
) -> Result<BoundaryLoad, SpatialError> {
    let features = match geojson_str.parse::<GeoJson>()? {
        GeoJson::FeatureCollection(fc) => fc.features,
        GeoJson::Feature(feature) => vec![feature],
        GeoJson::Geometry(_) => {
            return Err(SpatialError::UnsupportedDocument("Geometry".to_string()));
        }
    };

    let mut load = BoundaryLoad::default();
    let mut seen: BTreeMap<AreaId, usize> = BTreeMap::new();

    for feature in features {
        let Some(id) = feature_id(&feature, id_property, id_width) else {
            load.unidentified += 1;
            continue;
        };

        let Some(polygon) = feature.geometry.and_then(parse_multipolygon) else {
            log::debug!("Feature {id} has no polygonal geometry");
            load.invalid.push(id);
            continue;
        };

        if let Some(&existing) = seen.get(&id) {
            log::debug!("Merging repeated boundary feature for {id}");
            load.boundaries[existing].polygon.0.extend(polygon.0);
        } else {
            seen.insert(id.clone(), load.boundaries.len());
            load.boundaries.push(Boundary { id, polygon });
        }
    }

    log::info!(
        "Loaded {} boundaries ({} without geometry, {} without id)",
        load.boundaries.len(),
        load.invalid.len(),
        load.unidentified
    );

    Ok(load)
}

fn feature_id(feature: &Feature, id_property: &str, id_width: Option<usize>) -> Option<AreaId> {
    let raw = match feature.property(id_property)? {
        serde_json::Value::String(s) => s.trim().to_string(),
        serde_json::Value::Number(n) => n.to_string(),
        _ => return None,
    };
    match id_width {
        Some(width) => AreaId::zero_padded(&raw, width),
        None if raw.is_empty() => None,
        None => Some(AreaId::new(raw)),
    }
}

/// Converts a `GeoJSON` geometry into a [`MultiPolygon`].
/// Handles both `Polygon` and `MultiPolygon` geometry types.
fn parse_multipolygon(geom: geojson::Geometry) -> Option<MultiPolygon<f64>> {
    let geo_geom: geo::Geometry<f64> = geom.try_into().ok()?;
    match geo_geom {
        geo::Geometry::MultiPolygon(mp) => Some(mp),
        geo::Geometry::Polygon(p) => Some(MultiPolygon(vec![p])),
        _ => None,
    }
}

/// Computes the bounding box envelope for a [`MultiPolygon`].
pub(crate) fn compute_envelope(mp: &MultiPolygon<f64>) -> AABB<[f64; 2]> {
    mp.bounding_rect().map_or_else(
        || AABB::from_point([0.0, 0.0]),
        |rect| AABB::from_corners([rect.min().x, rect.min().y], [rect.max().x, rect.max().y]),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo::polygon;

    const SQUARES: &str = r#"{
        "type": "FeatureCollection",
        "features": [
            {
                "type": "Feature",
                "properties": { "ZCTA5CE10": "78201" },
                "geometry": { "type": "Polygon", "coordinates": [[[0,0],[1,0],[1,1],[0,1],[0,0]]] }
            },
            {
                "type": "Feature",
                "properties": { "ZCTA5CE10": 501 },
                "geometry": { "type": "Polygon", "coordinates": [[[1,0],[2,0],[2,1],[1,1],[1,0]]] }
            },
            {
                "type": "Feature",
                "properties": { "ZCTA5CE10": "78201" },
                "geometry": { "type": "Polygon", "coordinates": [[[5,5],[6,5],[6,6],[5,6],[5,5]]] }
            },
            {
                "type": "Feature",
                "properties": { "ZCTA5CE10": "78299" },
                "geometry": null
            },
            {
                "type": "Feature",
                "properties": { "NAME": "no id" },
                "geometry": { "type": "Point", "coordinates": [0, 0] }
            }
        ]
    }"#;

    #[test]
    fn loads_and_normalizes_ids() {
        let load = load_feature_collection(SQUARES, "ZCTA5CE10", Some(5)).unwrap();
        let ids: Vec<&str> = load.boundaries.iter().map(|b| b.id.as_str()).collect();
        assert_eq!(ids, vec!["78201", "00501"]);
        assert_eq!(load.invalid, vec![AreaId::new("78299")]);
        assert_eq!(load.unidentified, 1);
    }

    #[test]
    fn merges_repeated_features() {
        let load = load_feature_collection(SQUARES, "ZCTA5CE10", Some(5)).unwrap();
        assert_eq!(load.boundaries[0].polygon.0.len(), 2);
        assert!(load.boundaries.iter().all(Boundary::is_valid));
    }

    #[test]
    fn rejects_bare_geometry() {
        let err = load_feature_collection(
            r#"{ "type": "Point", "coordinates": [0, 0] }"#,
            "id",
            None,
        )
        .unwrap_err();
        assert!(matches!(err, SpatialError::UnsupportedDocument(_)), "{err}");
    }

    #[test]
    fn zero_area_polygon_is_invalid() {
        let boundary = Boundary {
            id: AreaId::new("1"),
            polygon: MultiPolygon(vec![polygon![
                (x: 0.0, y: 0.0),
                (x: 1.0, y: 0.0),
                (x: 2.0, y: 0.0),
            ]]),
        };
        assert!(!boundary.is_valid());
    }
}
