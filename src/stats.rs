//! Occurrence statistics per node.

use crate::{
    error::Result,
    tree::{GROUP_SIZE_FIELD, MATCHED_SIZE_FIELD, Measure, Node},
};

/// Sets `occurrence_fraction` on every node, children first.
///
/// A node with `group_size == 0` gets a fraction of 0. Nodes lacking either
/// size abort the walk.
pub fn calc_fraction(node: &mut Node) -> Result<()> {
    node.try_walk_post_order_mut(&mut |node: &mut Node| {
        let group_size = node.require_measure(GROUP_SIZE_FIELD)?;
        let matched_size = node.require_measure(MATCHED_SIZE_FIELD)?;
        node.occurrence_fraction = Some(matched_size.fraction_of(group_size));
        Ok(())
    })
}

/// Recomputes the root's totals from its immediate children only.
///
/// Must run after [`calc_fraction`]; it overrides whatever the root held,
/// so the root reflects the sum of its direct children even when that
/// differs from its own whole-subtree value. A root without children ends up
/// with zero totals.
pub fn calc_root_fraction(root: &mut Node) -> Result<()> {
    let mut group_size = Measure::ZERO;
    let mut matched_size = Measure::ZERO;
    for child in root.children() {
        group_size = group_size + child.require_measure(GROUP_SIZE_FIELD)?;
        matched_size = matched_size + child.require_measure(MATCHED_SIZE_FIELD)?;
    }
    root.group_size = Some(group_size);
    root.matched_size = Some(matched_size);
    root.occurrence_fraction = Some(matched_size.fraction_of(group_size));
    Ok(())
}
