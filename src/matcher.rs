//! Joins data table rows onto tree nodes by key.
//!
//! Each node is matched independently: a node whose row cannot be applied is
//! recorded in the [`MatchReport`] and left untouched, and the walk carries on
//! with the rest of the tree. Diagnostics are logged once the walk finishes.

use std::collections::HashMap;

use anyhow::Result;
use log::{debug, error, info, warn};
use serde_json::Value;

use crate::{
    dataset::{self, DataTable},
    error::AnnotateError,
    tree::{MATCHES_FIELD, Node},
};

/// Column whose text is parsed as JSON and stored under `matches`.
pub const MATCHES_JSON_COLUMN: &str = "matches_json";

/// String form of a node key used for comparison against the data key column.
pub fn key_text(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}

#[derive(Debug)]
pub struct MatchFailure {
    pub node: String,
    pub key: String,
    /// Zero-based data row that was being applied.
    pub row: usize,
    pub error: AnnotateError,
}

#[derive(Debug, Default)]
pub struct MatchReport {
    pub visited: usize,
    pub matched: usize,
    pub unmatched: usize,
    /// Labels of nodes lacking the node key.
    pub missing_key: Vec<String>,
    pub failures: Vec<MatchFailure>,
}

impl MatchReport {
    pub fn log(&self, node_key: &str) {
        for label in &self.missing_key {
            warn!("Node '{label}' has no '{node_key}' value; skipping match");
        }
        for failure in &self.failures {
            error!(
                "Dropping match for node '{}' (key '{}', data row {}): {}",
                failure.node,
                failure.key,
                failure.row + 2,
                failure.error
            );
        }
        info!(
            "Matched {} of {} node(s); {} without a row, {} without a key, {} failed",
            self.matched,
            self.visited,
            self.unmatched,
            self.missing_key.len(),
            self.failures.len()
        );
    }
}

enum NodeOutcome {
    Matched,
    Unmatched,
    MissingKey,
    Failed(MatchFailure),
}

pub struct RowMatcher<'t> {
    table: &'t DataTable,
    node_key: String,
    data_column: usize,
    index: HashMap<&'t str, usize>,
}

impl<'t> RowMatcher<'t> {
    pub fn new(table: &'t DataTable, node_key: &str, data_key: &str) -> Result<Self> {
        let data_column = table.require_column(data_key)?;
        Ok(Self {
            table,
            node_key: node_key.to_string(),
            data_column,
            index: table.key_index(data_column),
        })
    }

    /// Merges the table into every node of the tree, pre-order.
    pub fn merge(&self, root: &mut Node) -> MatchReport {
        let mut report = MatchReport::default();
        root.walk_pre_order_mut(|node| {
            report.visited += 1;
            match self.merge_node(node) {
                NodeOutcome::Matched => report.matched += 1,
                NodeOutcome::Unmatched => report.unmatched += 1,
                NodeOutcome::MissingKey => report.missing_key.push(node.label().to_string()),
                NodeOutcome::Failed(failure) => report.failures.push(failure),
            }
        });
        report
    }

    fn merge_node(&self, node: &mut Node) -> NodeOutcome {
        let key = match node.get(&self.node_key) {
            Some(value) if !value.is_null() => key_text(&value),
            _ => return NodeOutcome::MissingKey,
        };
        let Some(&row) = self.index.get(key.as_str()) else {
            return NodeOutcome::Unmatched;
        };
        let label = node.label().into_owned();
        let result = self
            .row_fields(row, &label)
            .and_then(|fields| apply_atomically(node, fields));
        match result {
            Ok(()) => {
                debug!("Node '{label}' matched data row {}", row + 2);
                NodeOutcome::Matched
            }
            Err(error) => NodeOutcome::Failed(MatchFailure {
                node: label,
                key,
                row,
                error,
            }),
        }
    }

    fn row_fields(&self, row: usize, label: &str) -> Result<Vec<(String, Value)>, AnnotateError> {
        let mut fields = Vec::with_capacity(self.table.headers().len());
        for (column, header) in self.table.headers().iter().enumerate() {
            if column == self.data_column {
                continue;
            }
            if header == MATCHES_JSON_COLUMN {
                let raw = self.table.raw(row, column);
                if dataset::is_na(raw) {
                    continue;
                }
                let payload = serde_json::from_str(raw).map_err(|source| {
                    AnnotateError::MalformedMatchPayload {
                        node: label.to_string(),
                        source,
                    }
                })?;
                fields.push((MATCHES_FIELD.to_string(), payload));
            } else {
                fields.push((header.clone(), self.table.value(row, column)));
            }
        }
        Ok(fields)
    }
}

/// Applies every field or none of them.
fn apply_atomically(node: &mut Node, fields: Vec<(String, Value)>) -> Result<(), AnnotateError> {
    let children = node.children.take();
    let snapshot = node.clone();
    let result = fields
        .into_iter()
        .try_for_each(|(field, value)| node.set(&field, value));
    if result.is_err() {
        *node = snapshot;
    }
    node.children = children;
    result
}

/// Merges `table` into the tree rooted at `root` and logs the outcome.
pub fn merge_rows(
    root: &mut Node,
    table: &DataTable,
    node_key: &str,
    data_key: &str,
) -> Result<MatchReport> {
    let matcher = RowMatcher::new(table, node_key, data_key)?;
    let report = matcher.merge(root);
    report.log(node_key);
    Ok(report)
}
