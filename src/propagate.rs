use crate::{
    error::Result,
    tree::{Measure, Node},
};

/// Replaces `field` on every node with the total over its subtree.
///
/// Each node contributes its own prior value (zero when absent) plus the
/// accumulated totals of its children, computed post-order. Running this twice
/// on the same field double counts, so the pipeline calls it once per field.
pub fn accumulate(node: &mut Node, field: &str) -> Result<Measure> {
    node.try_walk_post_order_mut(&mut |node: &mut Node| {
        let own = node.measure(field).unwrap_or(Measure::ZERO);
        let children: Measure = node
            .children()
            .iter()
            .map(|child| child.measure(field).unwrap_or(Measure::ZERO))
            .sum();
        node.set_measure(field, own + children)
    })?;
    Ok(node.measure(field).unwrap_or(Measure::ZERO))
}
