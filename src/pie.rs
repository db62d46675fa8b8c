//! Pie-chart annotations.
//!
//! Every node gets a two-entry `pie_data` array: entry 0 carries the node's
//! occurrence fraction and entry 1 its complement, so a renderer can draw the
//! matched and unmatched wedges directly.

use serde_json::{Map, Value};

use crate::{
    error::{AnnotateError, Result},
    tree::{GROUP_SIZE_FIELD, MATCHED_SIZE_FIELD, Node, OCCURRENCE_FRACTION_FIELD, PieSlice},
};

fn pie_slices(node: &Node) -> Result<Vec<PieSlice>> {
    let occurrence_fraction =
        node.occurrence_fraction
            .ok_or_else(|| AnnotateError::MissingMeasure {
                node: node.label().to_string(),
                field: OCCURRENCE_FRACTION_FIELD.to_string(),
            })?;
    let group_size = node.require_measure(GROUP_SIZE_FIELD)?;
    let matched_size = node.require_measure(MATCHED_SIZE_FIELD)?;
    Ok(vec![
        PieSlice {
            occurrence_fraction,
            index: 0,
            group_size,
            matched_size,
            extra: Map::new(),
        },
        PieSlice {
            occurrence_fraction: 1.0 - occurrence_fraction,
            index: 1,
            group_size,
            matched_size,
            extra: Map::new(),
        },
    ])
}

/// Attaches `pie_data` to `node`, and to all descendants when `recurse` is set.
pub fn attach_pie_data(node: &mut Node, recurse: bool) -> Result<()> {
    if !recurse {
        node.pie_data = Some(pie_slices(node)?);
        return Ok(());
    }
    node.try_walk_pre_order_mut(|node| {
        node.pie_data = Some(pie_slices(node)?);
        Ok(())
    })
}

/// Where [`set_field_in_all_nodes`] writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldTarget {
    Node,
    PieData,
}

/// Stamps `value` under `field` on every node, or on both pie entries of
/// every node.
pub fn set_field_in_all_nodes(
    node: &mut Node,
    field: &str,
    value: &Value,
    target: FieldTarget,
) -> Result<()> {
    node.try_walk_pre_order_mut(|node| match target {
        FieldTarget::Node => node.set(field, value.clone()),
        FieldTarget::PieData => {
            let label = node.label().to_string();
            let slices = node
                .pie_data
                .as_mut()
                .ok_or_else(|| AnnotateError::MissingMeasure {
                    node: label,
                    field: "pie_data".to_string(),
                })?;
            slices
                .iter_mut()
                .try_for_each(|slice| slice.set(field, value.clone()))
        }
    })
}
