//! Cross-tabulation of two per-area labelings.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt::Display;

use need_map_analytics_models::{Alignment, ClusterLabel, CrossTab};
use need_map_geography_models::AreaId;

/// Counts areas per (row label, column label) pair.
///
/// Rows and columns are the distinct labels of each labeling, in label
/// order. Areas present in only one labeling are excluded from the counts
/// and listed in the result.
#[must_use]
pub fn cross_tabulate<R, C>(
    row_variable: &str,
    rows: &BTreeMap<AreaId, R>,
    column_variable: &str,
    columns: &BTreeMap<AreaId, C>,
) -> CrossTab
where
    R: Ord + Display,
    C: Ord + Display,
{
    cross_tabulate_with(row_variable, rows, &[], column_variable, columns, &[])
}

/// Like [`cross_tabulate`], but the given labels lead each axis in the
/// given order and are kept even when no area carries them.
///
/// Labels that occur in the data but not in the given order follow, in
/// label order.
#[must_use]
pub fn cross_tabulate_with<R, C>(
    row_variable: &str,
    rows: &BTreeMap<AreaId, R>,
    row_order: &[R],
    column_variable: &str,
    columns: &BTreeMap<AreaId, C>,
    column_order: &[C],
) -> CrossTab
where
    R: Ord + Display,
    C: Ord + Display,
{
    let row_axis = axis(row_order, rows);
    let column_axis = axis(column_order, columns);

    let mut counts = vec![vec![0_u64; column_axis.len()]; row_axis.len()];
    let mut only_in_rows = Vec::new();
    for (id, row_label) in rows {
        match columns.get(id) {
            Some(column_label) => {
                counts[row_axis[row_label]][column_axis[column_label]] += 1;
            }
            None => only_in_rows.push(id.clone()),
        }
    }
    let only_in_columns: Vec<AreaId> = columns
        .keys()
        .filter(|id| !rows.contains_key(*id))
        .cloned()
        .collect();

    let excluded = only_in_rows.len() + only_in_columns.len();
    if excluded > 0 {
        log::warn!(
            "Cross-tabulating {row_variable} by {column_variable}: {excluded} area(s) labeled by only one side are excluded"
        );
    }

    CrossTab {
        row_variable: row_variable.to_string(),
        column_variable: column_variable.to_string(),
        rows: labels(&row_axis),
        columns: labels(&column_axis),
        counts,
        only_in_rows,
        only_in_columns,
    }
}

/// Need/demand alignment of every area labeled by both LISA runs.
#[must_use]
pub fn alignment(
    need: &BTreeMap<AreaId, ClusterLabel>,
    demand: &BTreeMap<AreaId, ClusterLabel>,
) -> BTreeMap<AreaId, Alignment> {
    need.iter()
        .filter_map(|(id, &n)| {
            demand
                .get(id)
                .map(|&d| (id.clone(), Alignment::classify(n, d)))
        })
        .collect()
}

/// Label to position along one axis.
fn axis<'a, L: Ord>(order: &'a [L], data: &'a BTreeMap<AreaId, L>) -> BTreeMap<&'a L, usize> {
    let mut positions = BTreeMap::new();
    for label in order {
        let next = positions.len();
        positions.entry(label).or_insert(next);
    }
    let extra: BTreeSet<&L> = data
        .values()
        .filter(|l| !positions.contains_key(l))
        .collect();
    for label in extra {
        let next = positions.len();
        positions.insert(label, next);
    }
    positions
}

fn labels<L: Display>(axis: &BTreeMap<&L, usize>) -> Vec<String> {
    let mut ordered: Vec<(&usize, String)> =
        axis.iter().map(|(l, i)| (i, l.to_string())).collect();
    ordered.sort_by_key(|(i, _)| **i);
    ordered.into_iter().map(|(_, l)| l).collect()
}
