//! Result files: one CSV per per-area result, JSON for the rest.

use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use need_map_analytics_models::{
    Alignment, CrossTab, ExclusionReport, GlobalMoranResult, LocalResult, QuantileGrid,
    SpearmanResult,
};
use need_map_geography_models::AreaId;
use serde::Serialize;
use thiserror::Error;

/// Errors raised while writing result files.
#[derive(Debug, Error)]
pub enum OutputError {
    /// A file could not be created or written.
    #[error("Failed to write {path}: {source}")]
    Io {
        /// File path.
        path: String,
        /// Underlying error.
        source: std::io::Error,
    },

    /// Writing to an open output failed.
    #[error("Write error: {0}")]
    Write(#[from] std::io::Error),

    /// CSV serialization failed.
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// JSON serialization failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Global statistics of a run.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GlobalSummary<'a> {
    /// Univariate and bivariate global Moran's I.
    pub moran: &'a [GlobalMoranResult],
    /// Spearman correlations.
    pub spearman: &'a [SpearmanResult],
}

/// Exclusion report plus what the boundary loader dropped.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExclusionSummary<'a> {
    /// Areas dropped or filled while preparing the run.
    #[serde(flatten)]
    pub report: &'a ExclusionReport,
    /// Boundary features with an id but no polygon.
    pub unreadable_boundaries: &'a [AreaId],
    /// Boundary features without an id.
    pub unidentified_features: usize,
}

#[derive(Serialize)]
struct LocalRow<'a> {
    area_id: &'a str,
    value: f64,
    lag: f64,
    statistic: f64,
    quadrant: Option<&'a str>,
    quadrant_code: Option<u8>,
    p_sim: Option<f64>,
    significant: bool,
    label: &'a str,
}

#[derive(Serialize)]
struct QuantileRow<'a> {
    area_id: &'a str,
    rank_x: usize,
    rank_y: usize,
    category: &'a str,
}

#[derive(Serialize)]
struct CellRow {
    rank_x: usize,
    rank_y: usize,
    count: usize,
    share: f64,
}

#[derive(Serialize)]
struct AlignmentRow<'a> {
    area_id: &'a str,
    alignment: &'a str,
}

/// Writes one row per area of a local Moran run.
///
/// # Errors
///
/// * [`OutputError::Csv`] if writing fails.
pub fn write_local(writer: impl Write, result: &LocalResult) -> Result<(), OutputError> {
    let mut wtr = csv::Writer::from_writer(writer);
    for record in &result.records {
        wtr.serialize(LocalRow {
            area_id: record.area_id.as_str(),
            value: record.value,
            lag: record.lag,
            statistic: record.statistic,
            quadrant: record.quadrant.as_ref().map(AsRef::<str>::as_ref),
            quadrant_code: record.quadrant.map(|q| q.code()),
            p_sim: record.p_sim,
            significant: record.significant,
            label: record.label.as_ref(),
        })?;
    }
    wtr.flush()?;
    Ok(())
}

/// Writes one row per area of a quantile-grid classification.
///
/// # Errors
///
/// * [`OutputError::Csv`] if writing fails.
pub fn write_quantile(writer: impl Write, grid: &QuantileGrid) -> Result<(), OutputError> {
    let mut wtr = csv::Writer::from_writer(writer);
    for class in &grid.classes {
        wtr.serialize(QuantileRow {
            area_id: class.area_id.as_str(),
            rank_x: class.rank_x,
            rank_y: class.rank_y,
            category: &class.category,
        })?;
    }
    wtr.flush()?;
    Ok(())
}

/// Writes the area count and share of every grid cell.
///
/// # Errors
///
/// * [`OutputError::Csv`] if writing fails.
pub fn write_quantile_cells(writer: impl Write, grid: &QuantileGrid) -> Result<(), OutputError> {
    let mut wtr = csv::Writer::from_writer(writer);
    let shares = grid.cell_shares();
    for (x, row) in grid.cell_counts().into_iter().enumerate() {
        for (y, count) in row.into_iter().enumerate() {
            wtr.serialize(CellRow {
                rank_x: x + 1,
                rank_y: y + 1,
                count,
                share: shares[x][y],
            })?;
        }
    }
    wtr.flush()?;
    Ok(())
}

/// Writes a contingency table with row and column totals.
///
/// # Errors
///
/// * [`OutputError::Csv`] if writing fails.
pub fn write_crosstab(writer: impl Write, table: &CrossTab) -> Result<(), OutputError> {
    let mut wtr = csv::Writer::from_writer(writer);

    let corner = format!("{} \\ {}", table.row_variable, table.column_variable);
    wtr.write_record(
        std::iter::once(corner.as_str())
            .chain(table.columns.iter().map(String::as_str))
            .chain(std::iter::once("total")),
    )?;

    for ((label, counts), total) in table.rows.iter().zip(&table.counts).zip(table.row_totals()) {
        wtr.write_record(
            std::iter::once(label.clone())
                .chain(counts.iter().map(u64::to_string))
                .chain(std::iter::once(total.to_string())),
        )?;
    }

    wtr.write_record(
        std::iter::once("total".to_string())
            .chain(table.column_totals().iter().map(u64::to_string))
            .chain(std::iter::once(table.total().to_string())),
    )?;
    wtr.flush()?;
    Ok(())
}

/// Writes the alignment class of every area.
///
/// # Errors
///
/// * [`OutputError::Csv`] if writing fails.
pub fn write_alignment(
    writer: impl Write,
    alignment: &BTreeMap<AreaId, Alignment>,
) -> Result<(), OutputError> {
    let mut wtr = csv::Writer::from_writer(writer);
    for (id, class) in alignment {
        wtr.serialize(AlignmentRow {
            area_id: id.as_str(),
            alignment: class.as_ref(),
        })?;
    }
    wtr.flush()?;
    Ok(())
}

/// Writes `value` as pretty-printed JSON.
///
/// # Errors
///
/// * [`OutputError::Json`] if serialization fails.
pub fn write_json(mut writer: impl Write, value: &impl Serialize) -> Result<(), OutputError> {
    serde_json::to_writer_pretty(&mut writer, value)?;
    writeln!(writer)?;
    writer.flush()?;
    Ok(())
}

/// Creates `dir/name` and hands a buffered writer to `write`.
///
/// # Errors
///
/// * [`OutputError::Io`] if the file cannot be created.
/// * Whatever `write` returns.
pub fn to_file(
    dir: &Path,
    name: &str,
    write: impl FnOnce(BufWriter<File>) -> Result<(), OutputError>,
) -> Result<(), OutputError> {
    let path = dir.join(name);
    let file = File::create(&path).map_err(|source| OutputError::Io {
        path: path.display().to_string(),
        source,
    })?;
    write(BufWriter::new(file))?;
    log::debug!("Wrote {}", path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use need_map_analytics_models::{ClusterLabel, LocalRecord, QuantileClass, Quadrant};

    fn text(buf: Vec<u8>) -> String {
        String::from_utf8(buf).unwrap()
    }

    #[test]
    fn local_rows_leave_island_p_values_blank() {
        let result = LocalResult {
            variable: "calls".into(),
            linked_variable: None,
            permutations: 99,
            seed: 42,
            significance: 0.05,
            records: vec![
                LocalRecord {
                    area_id: AreaId::new("78201"),
                    value: 1.5,
                    lag: 0.5,
                    statistic: 0.75,
                    quadrant: Some(Quadrant::HighHigh),
                    p_sim: Some(0.01),
                    significant: true,
                    label: ClusterLabel::HighHigh,
                },
                LocalRecord {
                    area_id: AreaId::new("78299"),
                    value: -0.5,
                    lag: 0.0,
                    statistic: 0.0,
                    quadrant: None,
                    p_sim: None,
                    significant: false,
                    label: ClusterLabel::Undefined,
                },
            ],
        };
        let mut buf = Vec::new();
        write_local(&mut buf, &result).unwrap();
        let lines: Vec<String> = text(buf).lines().map(str::to_string).collect();
        assert_eq!(
            lines[0],
            "area_id,value,lag,statistic,quadrant,quadrant_code,p_sim,significant,label"
        );
        assert_eq!(lines[1], "78201,1.5,0.5,0.75,HH,1,0.01,true,HH");
        assert_eq!(lines[2], "78299,-0.5,0.0,0.0,,,,false,UD");
    }

    fn grid() -> QuantileGrid {
        QuantileGrid {
            x_variable: "need".into(),
            y_variable: "calls".into(),
            bins: 2,
            classes: [(1, 2), (2, 1), (2, 2), (2, 2)]
                .into_iter()
                .enumerate()
                .map(|(i, (x, y))| QuantileClass {
                    area_id: AreaId::new(i.to_string()),
                    rank_x: x,
                    rank_y: y,
                    category: format!("{x}-{y}"),
                })
                .collect(),
        }
    }

    #[test]
    fn quantile_rows_and_cells() {
        let mut rows = Vec::new();
        write_quantile(&mut rows, &grid()).unwrap();
        assert!(text(rows).starts_with("area_id,rank_x,rank_y,category\n0,1,2,1-2\n"));

        let mut cells = Vec::new();
        write_quantile_cells(&mut cells, &grid()).unwrap();
        let cells = text(cells);
        let lines: Vec<&str> = cells.lines().collect();
        assert_eq!(lines.len(), 5);
        assert_eq!(lines[4], "2,2,2,0.5");
    }

    #[test]
    fn crosstab_has_totals() {
        let table = CrossTab {
            row_variable: "need".into(),
            column_variable: "calls".into(),
            rows: vec!["HH".into(), "NS".into()],
            columns: vec!["HH".into(), "NS".into()],
            counts: vec![vec![3, 1], vec![0, 5]],
            only_in_rows: vec![],
            only_in_columns: vec![],
        };
        let mut buf = Vec::new();
        write_crosstab(&mut buf, &table).unwrap();
        assert_eq!(
            text(buf),
            "need \\ calls,HH,NS,total\nHH,3,1,4\nNS,0,5,5\ntotal,3,6,9\n"
        );
    }

    #[test]
    fn alignment_uses_snake_case() {
        let alignment = BTreeMap::from([
            (AreaId::new("1"), Alignment::Underserved),
            (AreaId::new("2"), Alignment::NotSignificant),
        ]);
        let mut buf = Vec::new();
        write_alignment(&mut buf, &alignment).unwrap();
        assert_eq!(
            text(buf),
            "area_id,alignment\n1,underserved\n2,not_significant\n"
        );
    }

    #[test]
    fn exclusion_summary_flattens_the_report() {
        let report = ExclusionReport {
            missing_geometry: vec![AreaId::new("78299")],
            ..ExclusionReport::default()
        };
        let summary = ExclusionSummary {
            report: &report,
            unreadable_boundaries: &[],
            unidentified_features: 2,
        };
        let mut buf = Vec::new();
        write_json(&mut buf, &summary).unwrap();
        let value: serde_json::Value = serde_json::from_slice(&buf).unwrap();
        assert_eq!(value["missingGeometry"][0], "78299");
        assert_eq!(value["unidentifiedFeatures"], 2);
    }
}
