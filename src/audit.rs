use log::error;
use serde_json::Value;

use crate::{error::Result, tree::Node};

/// Counts the nodes in `node`'s subtree lacking `field` (absent or null).
///
/// With `report_missing` every such node is logged. With `replace_with_field`
/// the missing field is filled from that other field, or with an empty string
/// when it is missing as well; filled nodes are still counted.
pub fn count_missing(
    node: &mut Node,
    field: &str,
    report_missing: bool,
    replace_with_field: Option<&str>,
) -> Result<usize> {
    let mut missing = 0usize;
    node.try_walk_pre_order_mut(|node| -> Result<()> {
        if node.has(field) {
            return Ok(());
        }
        missing += 1;
        if report_missing {
            error!("Missing '{field}': {}", node.label());
        }
        if let Some(source) = replace_with_field {
            let value = node
                .get(source)
                .filter(|value| !value.is_null())
                .unwrap_or_else(|| Value::String(String::new()));
            node.set(field, value)?;
        }
        Ok(())
    })?;
    Ok(missing)
}

/// Missing-value summary for one field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldAudit {
    pub field: String,
    pub missing: usize,
    pub total: usize,
}

impl FieldAudit {
    pub fn to_row(&self) -> Vec<String> {
        let percent = if self.total == 0 {
            0.0
        } else {
            self.missing as f64 * 100.0 / self.total as f64
        };
        vec![
            self.field.clone(),
            self.missing.to_string(),
            self.total.to_string(),
            format!("{percent:.2}"),
        ]
    }
}

/// Read-only presence summary for each of `fields`.
pub fn audit_fields(node: &Node, fields: &[&str]) -> Vec<FieldAudit> {
    let total = node.node_count();
    fields
        .iter()
        .map(|field| {
            let mut missing = 0usize;
            node.walk_pre_order(|n| {
                if !n.has(field) {
                    missing += 1;
                }
            });
            FieldAudit {
                field: field.to_string(),
                missing,
                total,
            }
        })
        .collect()
}
