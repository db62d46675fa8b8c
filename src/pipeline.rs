//! Sequences the annotation stages over one tree.
//!
//! Order matters: matching, node-key audit, size propagation, fractions,
//! root recomputation, pie data. Only matching tolerates per-node failures;
//! any error from a later stage aborts the run.

use anyhow::{Context, Result};
use log::{error, info};
use serde_json::Value;

use crate::{
    audit,
    dataset::DataTable,
    matcher::{self, MatchReport},
    pie::{self, FieldTarget},
    propagate, stats,
    tree::{GROUP_SIZE_FIELD, MATCHED_SIZE_FIELD, Node},
};

/// A `field=value` stamp applied after pie data is attached.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldStamp {
    pub field: String,
    pub value: Value,
    pub target: FieldTarget,
}

#[derive(Debug, Default)]
pub struct PipelineSummary {
    pub nodes: usize,
    pub match_report: Option<MatchReport>,
    pub missing_node_keys: usize,
    /// Size fields that had to be accumulated up the tree.
    pub propagated: Vec<&'static str>,
}

pub fn annotate_tree(
    root: &mut Node,
    table: Option<&DataTable>,
    node_key: &str,
    data_key: &str,
    stamps: &[FieldStamp],
) -> Result<PipelineSummary> {
    let mut summary = PipelineSummary {
        nodes: root.node_count(),
        ..PipelineSummary::default()
    };

    if let Some(table) = table {
        info!(
            "Merging {} data row(s) into {} node(s) on '{}' = '{}'",
            table.row_count(),
            summary.nodes,
            node_key,
            data_key
        );
        summary.match_report = Some(matcher::merge_rows(root, table, node_key, data_key)?);
    }

    summary.missing_node_keys = audit::count_missing(root, node_key, true, None)
        .with_context(|| format!("Auditing node key '{node_key}'"))?;
    if summary.missing_node_keys > 0 {
        error!(
            "'{}' id is missing in {} node(s)",
            node_key, summary.missing_node_keys
        );
    }

    for field in [GROUP_SIZE_FIELD, MATCHED_SIZE_FIELD] {
        let missing = audit::count_missing(root, field, false, None)
            .with_context(|| format!("Auditing '{field}'"))?;
        if missing > 0 {
            let total = propagate::accumulate(root, field)
                .with_context(|| format!("Propagating '{field}'"))?;
            info!("'{field}' missing on {missing} node(s); accumulated tree total {total}");
            summary.propagated.push(field);
        }
    }

    stats::calc_fraction(root).context("Computing occurrence fractions")?;
    stats::calc_root_fraction(root).context("Computing root statistics")?;
    pie::attach_pie_data(root, true).context("Attaching pie data")?;

    for stamp in stamps {
        pie::set_field_in_all_nodes(root, &stamp.field, &stamp.value, stamp.target)
            .with_context(|| format!("Setting '{}' on all nodes", stamp.field))?;
    }

    info!(
        "Annotated {} node(s); root occurrence fraction {:.4}",
        summary.nodes,
        root.occurrence_fraction.unwrap_or_default()
    );
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tree::Measure;
    use encoding_rs::UTF_8;
    use serde_json::json;

    fn two_leaf_tree() -> Node {
        serde_json::from_value(json!({
            "name": "root",
            "children": [
                {"name": "A", "group_value": "x", "group_size": 10, "matched_size": 2},
                {"name": "B", "group_value": "y", "group_size": 20, "matched_size": 8}
            ]
        }))
        .unwrap()
    }

    #[test]
    fn prepopulated_tree_needs_no_table() {
        let mut root = two_leaf_tree();
        let summary = annotate_tree(&mut root, None, "name", "group_value", &[]).unwrap();
        assert!(summary.match_report.is_none());
        assert_eq!(
            summary.propagated,
            vec![GROUP_SIZE_FIELD, MATCHED_SIZE_FIELD]
        );

        let a = &root.children()[0];
        let b = &root.children()[1];
        assert_eq!(a.occurrence_fraction, Some(0.2));
        assert_eq!(b.occurrence_fraction, Some(0.4));
        assert_eq!(root.group_size, Some(Measure::Integer(30)));
        assert_eq!(root.matched_size, Some(Measure::Integer(10)));
        assert!((root.occurrence_fraction.unwrap() - 0.333).abs() < 1e-3);
        for node in [&root, a, b] {
            let pie = node.pie_data.as_ref().unwrap();
            assert!((pie[0].occurrence_fraction + pie[1].occurrence_fraction - 1.0).abs() < 1e-12);
        }
    }

    #[test]
    fn table_rows_drive_leaf_sizes() {
        let data = DataTable::from_reader(
            "group_value\tgroup_size\tmatched_size\tmatches_json\n\
             A\t4\t1\t[\"spec1\"]\n\
             B\t6\t3\t[]\n"
                .as_bytes(),
            b'\t',
            UTF_8,
        )
        .unwrap();
        let mut root: Node = serde_json::from_value(json!({
            "name": "root",
            "children": [
                {"name": "plants", "children": [{"name": "A"}, {"name": "B"}]},
                {"name": "animals", "children": [{"name": "C"}]}
            ]
        }))
        .unwrap();

        let summary =
            annotate_tree(&mut root, Some(&data), "name", "group_value", &[]).unwrap();
        assert_eq!(summary.match_report.as_ref().unwrap().matched, 2);

        let plants = &root.children()[0];
        assert_eq!(plants.group_size, Some(Measure::Integer(10)));
        assert_eq!(plants.matched_size, Some(Measure::Integer(4)));
        assert_eq!(plants.occurrence_fraction, Some(0.4));
        assert_eq!(plants.children()[0].matches, Some(json!(["spec1"])));

        let animals = &root.children()[1];
        assert_eq!(animals.group_size, Some(Measure::ZERO));
        assert_eq!(animals.occurrence_fraction, Some(0.0));

        assert_eq!(root.group_size, Some(Measure::Integer(10)));
        assert_eq!(root.matched_size, Some(Measure::Integer(4)));
    }

    #[test]
    fn root_totals_ignore_grandchildren_when_sizes_are_supplied() {
        let mut root: Node = serde_json::from_value(json!({
            "name": "root", "group_size": 500, "matched_size": 5,
            "children": [
                {"name": "A", "group_size": 10, "matched_size": 1, "children": [
                    {"name": "A1", "group_size": 90, "matched_size": 9}
                ]}
            ]
        }))
        .unwrap();
        let summary = annotate_tree(&mut root, None, "name", "group_value", &[]).unwrap();
        assert!(summary.propagated.is_empty());
        assert_eq!(root.group_size, Some(Measure::Integer(10)));
        assert_eq!(root.matched_size, Some(Measure::Integer(1)));
        assert_eq!(root.occurrence_fraction, Some(0.1));
    }

    #[test]
    fn stamps_apply_after_pie_data() {
        let mut root = two_leaf_tree();
        let stamps = vec![FieldStamp {
            field: "color".to_string(),
            value: json!("#ff0000"),
            target: FieldTarget::PieData,
        }];
        annotate_tree(&mut root, None, "name", "group_value", &stamps).unwrap();
        let pie = root.pie_data.as_ref().unwrap();
        assert_eq!(pie[1].extra.get("color"), Some(&json!("#ff0000")));
    }

    #[test]
    fn non_numeric_table_sizes_are_dropped_during_matching() {
        let data = DataTable::from_reader(
            "group_value\tgroup_size\nA\tmany\n".as_bytes(),
            b'\t',
            UTF_8,
        )
        .unwrap();
        let mut root = Node::named("root").with_children(vec![Node::named("A")]);
        let summary = annotate_tree(&mut root, Some(&data), "name", "group_value", &[]).unwrap();
        assert_eq!(summary.match_report.unwrap().failures.len(), 1);
        assert_eq!(root.children()[0].group_size, Some(Measure::ZERO));
    }
}
