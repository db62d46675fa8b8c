mod common;

use encoding_rs::UTF_8;
use proptest::prelude::*;
use serde_json::json;

use ontology_annotator::{
    dataset::DataTable,
    pipeline::annotate_tree,
    tree::{Measure, Node},
};

use common::{FOOD_DATA, FOOD_TREE, TestWorkspace, chain_tree};

fn leaf() -> impl Strategy<Value = Node> {
    (0i64..1_000, 0i64..1_000).prop_map(|(a, b)| {
        let mut node = Node::named("leaf");
        node.group_size = Some(Measure::Integer(a.max(b)));
        node.matched_size = Some(Measure::Integer(a.min(b)));
        node
    })
}

fn arb_tree() -> impl Strategy<Value = Node> {
    leaf().prop_recursive(4, 64, 5, |inner| {
        prop::collection::vec(inner, 1..5)
            .prop_map(|children| Node::named("category").with_children(children))
    })
}

proptest! {
    #[test]
    fn every_node_ends_up_consistent(mut root in arb_tree()) {
        annotate_tree(&mut root, None, "name", "group_value", &[]).unwrap();

        let mut checked = 0usize;
        let mut failures = Vec::new();
        root.walk_pre_order(|node| {
            checked += 1;
            let group = node.group_size.expect("group_size");
            let matched = node.matched_size.expect("matched_size");
            let fraction = node.occurrence_fraction.expect("occurrence_fraction");
            let pie = node.pie_data.as_ref().expect("pie_data");
            if pie.len() != 2 || pie[0].index != 0 || pie[1].index != 1 {
                failures.push(format!("bad pie layout on {}", node.label()));
            }
            if (pie[0].occurrence_fraction + pie[1].occurrence_fraction - 1.0).abs() > 1e-12 {
                failures.push(format!("pie fractions do not sum to one on {}", node.label()));
            }
            if group.is_zero() && fraction != 0.0 {
                failures.push(format!("zero guard violated on {}", node.label()));
            }
            if (fraction - matched.fraction_of(group)).abs() > 1e-12 || fraction.is_nan() {
                failures.push(format!("stale fraction on {}", node.label()));
            }
        });
        prop_assert_eq!(checked, root.node_count());
        prop_assert!(failures.is_empty(), "{:?}", failures);

        let group: Measure = root.children().iter().map(|c| c.group_size.unwrap()).sum();
        let matched: Measure = root.children().iter().map(|c| c.matched_size.unwrap()).sum();
        prop_assert_eq!(root.group_size, Some(group));
        prop_assert_eq!(root.matched_size, Some(matched));
    }
}

#[test]
fn food_tree_round_trip_through_library() {
    let mut root: Node = serde_json::from_str(FOOD_TREE).expect("tree");
    let data = DataTable::from_reader(FOOD_DATA.as_bytes(), b'\t', UTF_8).expect("table");

    let summary =
        annotate_tree(&mut root, Some(&data), "name", "group_value", &[]).expect("pipeline");
    let report = summary.match_report.expect("report");
    assert_eq!(report.visited, 6);
    assert_eq!(report.matched, 3);
    assert_eq!(report.unmatched, 3);
    assert_eq!(summary.missing_node_keys, 0);

    let value = serde_json::to_value(&root).expect("serialize");
    assert_eq!(value["children"][1]["group_size"], json!(25));
    assert_eq!(value["children"][1]["matched_size"], json!(0));
    assert_eq!(value["children"][0]["children"][1]["NCBI"], json!(2));
}

#[test]
fn missing_node_keys_are_counted_but_not_fatal() {
    let mut root: Node = serde_json::from_str(FOOD_TREE).expect("tree");
    let data = DataTable::from_reader(
        "Taxa_NCBI\tgroup_size\tmatched_size\n1\t10\t1\n".as_bytes(),
        b'\t',
        UTF_8,
    )
    .expect("table");

    let summary =
        annotate_tree(&mut root, Some(&data), "NCBI", "Taxa_NCBI", &[]).expect("pipeline");
    assert_eq!(summary.missing_node_keys, 3);
    assert_eq!(summary.match_report.expect("report").missing_key.len(), 3);
    assert!(root.get("NCBI").is_none());
    assert_eq!(root.group_size, Some(Measure::Integer(10)));
}

#[test]
fn deeply_nested_chain_loads_annotates_and_saves() {
    let depth = 5_000;
    let ws = TestWorkspace::new();
    let input = ws.write("chain.json", &chain_tree(depth));
    let out = ws.path().join("chain_annotated.json");

    let mut root = Node::load(&input).expect("load");
    assert_eq!(root.node_count(), depth + 1);
    let summary = annotate_tree(&mut root, None, "name", "group_value", &[]).expect("pipeline");
    assert_eq!(summary.nodes, depth + 1);
    root.save(Some(&out), false).expect("save");

    let reloaded = Node::load(&out).expect("reload");
    assert_eq!(reloaded.group_size, Some(Measure::Integer(4)));
    assert_eq!(reloaded.matched_size, Some(Measure::Integer(1)));
    let mut levels = 0usize;
    let mut node = &reloaded;
    while let [child] = node.children() {
        assert_eq!(child.group_size, Some(Measure::Integer(4)));
        assert_eq!(child.occurrence_fraction, Some(0.25));
        assert!(child.pie_data.is_some());
        node = child;
        levels += 1;
    }
    assert_eq!(levels, depth);
    assert_eq!(node.label(), format!("n{depth}"));
}
