//! Reading the area attribute CSV and the boundary `GeoJSON`.

use std::io::Read;
use std::path::Path;

use need_map_geography_models::{AreaRecord, AreaTable, TableError};
use need_map_spatial::{BoundaryLoad, SpatialError, load_feature_collection};
use thiserror::Error;

use crate::plan::InputSettings;

/// Errors raised while reading input files.
#[derive(Debug, Error)]
pub enum InputError {
    /// A file could not be opened or read.
    #[error("Failed to read {path}: {source}")]
    Io {
        /// File path.
        path: String,
        /// Underlying error.
        source: std::io::Error,
    },

    /// The attribute file is not valid CSV.
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// The id column named in the settings is absent.
    #[error("Attribute file has no {0} column")]
    MissingIdColumn(String),

    /// The attribute rows do not form a valid table.
    #[error(transparent)]
    Table(#[from] TableError),

    /// The boundary file could not be parsed.
    #[error(transparent)]
    Spatial(#[from] SpatialError),
}

/// Cell values treated as missing rather than malformed.
const MISSING_MARKERS: &[&str] = &["", "NA", "N/A", "NaN", "null", "-"];

/// Reads the attribute CSV at `path`.
///
/// # Errors
///
/// See [`parse_area_table`].
pub fn read_area_table(path: &Path, settings: &InputSettings) -> Result<AreaTable, InputError> {
    let file = std::fs::File::open(path).map_err(|source| InputError::Io {
        path: path.display().to_string(),
        source,
    })?;
    log::info!("Reading area attributes from {}", path.display());
    parse_area_table(file, settings)
}

/// Parses an attribute CSV: one row per area, one numeric column per
/// attribute.
///
/// Rows without a usable id are skipped. Empty and `NA`-style cells are
/// missing values; so are cells that do not parse as numbers, which are
/// also counted in a warning.
///
/// # Errors
///
/// * [`InputError::MissingIdColumn`] if the id column is absent.
/// * [`InputError::Table`] if an id appears twice.
/// * [`InputError::Csv`] for malformed CSV.
pub fn parse_area_table(
    reader: impl Read,
    settings: &InputSettings,
) -> Result<AreaTable, InputError> {
    let mut rdr = csv::ReaderBuilder::new()
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(reader);

    let headers: Vec<String> = rdr.headers()?.iter().map(str::to_string).collect();
    let id_index = headers
        .iter()
        .position(|h| h.eq_ignore_ascii_case(&settings.id_column))
        .ok_or_else(|| InputError::MissingIdColumn(settings.id_column.clone()))?;
    let attributes: Vec<(usize, &str)> = headers
        .iter()
        .enumerate()
        .filter(|(i, _)| *i != id_index)
        .map(|(i, h)| (i, h.as_str()))
        .collect();

    let mut table = AreaTable::new(attributes.iter().map(|(_, name)| *name));
    let mut skipped = 0_usize;
    let mut malformed = 0_usize;

    for (line, result) in rdr.records().enumerate() {
        let row = result?;
        let Some(id) = row.get(id_index).and_then(|raw| settings.area_id(raw)) else {
            log::trace!("Skipping row {} without a usable id", line + 2);
            skipped += 1;
            continue;
        };

        let mut record = AreaRecord::new(id);
        for &(i, name) in &attributes {
            let cell = row.get(i).unwrap_or_default();
            if MISSING_MARKERS.iter().any(|m| cell.eq_ignore_ascii_case(m)) {
                continue;
            }
            match cell.replace(',', "").parse::<f64>() {
                Ok(value) => record.set(name, Some(value)),
                Err(_) => {
                    log::trace!("Row {}: {name} value {cell:?} is not a number", line + 2);
                    malformed += 1;
                }
            }
        }
        table.insert(record)?;
    }

    if skipped > 0 {
        log::warn!("Skipped {skipped} row(s) without a usable area id");
    }
    if malformed > 0 {
        log::warn!("{malformed} non-numeric cell(s) treated as missing");
    }
    log::info!(
        "Read {} area(s) with {} attribute(s)",
        table.len(),
        attributes.len()
    );

    Ok(table)
}

/// Reads and parses the boundary `GeoJSON` at `path`.
///
/// # Errors
///
/// * [`InputError::Io`] if the file cannot be read.
/// * [`InputError::Spatial`] if it is not a feature collection.
pub fn read_boundaries(
    path: &Path,
    settings: &InputSettings,
) -> Result<BoundaryLoad, InputError> {
    let text = std::fs::read_to_string(path).map_err(|source| InputError::Io {
        path: path.display().to_string(),
        source,
    })?;
    log::info!("Reading boundaries from {}", path.display());
    Ok(load_feature_collection(
        &text,
        &settings.boundary_id_property,
        settings.id_width,
    )?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use need_map_geography_models::AreaId;

    const CSV: &str = "\
ZIP,calls_per_1000,poverty_rate
78201,12.5,0.31
 501 ,\"1,204\",NA
78202,,0.18
,4.0,0.1
78203,oops,0.22
";

    #[test]
    fn parses_rows_and_missing_cells() {
        let table = parse_area_table(CSV.as_bytes(), &InputSettings::default()).unwrap();
        assert_eq!(table.len(), 4);

        let padded = table.get(&AreaId::new("00501")).unwrap();
        assert_eq!(padded.value("calls_per_1000"), Some(1204.0));
        assert_eq!(padded.value("poverty_rate"), None);

        let blank = table.get(&AreaId::new("78202")).unwrap();
        assert_eq!(blank.value("calls_per_1000"), None);
        assert_eq!(blank.value("poverty_rate"), Some(0.18));

        let malformed = table.get(&AreaId::new("78203")).unwrap();
        assert_eq!(malformed.value("calls_per_1000"), None);
        assert!(table.has_attribute("poverty_rate"));
    }

    #[test]
    fn preserves_row_order() {
        let table = parse_area_table(CSV.as_bytes(), &InputSettings::default()).unwrap();
        let ids: Vec<&str> = table.ids().map(AreaId::as_str).collect();
        assert_eq!(ids, vec!["78201", "00501", "78202", "78203"]);
    }

    #[test]
    fn missing_id_column_fails() {
        let settings = InputSettings {
            id_column: "geoid".to_string(),
            ..InputSettings::default()
        };
        let err = parse_area_table(CSV.as_bytes(), &settings).unwrap_err();
        assert!(matches!(err, InputError::MissingIdColumn(_)), "{err}");
    }

    #[test]
    fn duplicate_ids_fail() {
        let csv = "zip,calls\n78201,1\n78201,2\n";
        let err = parse_area_table(csv.as_bytes(), &InputSettings::default()).unwrap_err();
        assert!(
            matches!(err, InputError::Table(TableError::DuplicateArea(_))),
            "{err}"
        );
    }
}
