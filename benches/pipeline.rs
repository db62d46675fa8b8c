use criterion::{BatchSize, Criterion, criterion_group, criterion_main};
use encoding_rs::UTF_8;
use ontology_annotator::{dataset::DataTable, pipeline::annotate_tree, tree::Node};

/// Builds a balanced tree with `fanout^depth` leaves named `n<id>`.
fn generate_tree(depth: usize, fanout: usize, next_id: &mut usize) -> Node {
    let node = Node::named(format!("n{next_id}"));
    *next_id += 1;
    if depth == 0 {
        return node;
    }
    let children = (0..fanout)
        .map(|_| generate_tree(depth - 1, fanout, next_id))
        .collect();
    node.with_children(children)
}

fn generate_table(rows: usize) -> DataTable {
    let mut tsv = String::from("group_value\tgroup_size\tmatched_size\tmatches_json\n");
    for i in 0..rows {
        tsv.push_str(&format!("n{i}\t{}\t{}\t[{i}]\n", 100 + i % 17, i % 13));
    }
    DataTable::from_reader(tsv.as_bytes(), b'\t', UTF_8).expect("table")
}

fn bench_pipeline(c: &mut Criterion) {
    let mut next_id = 0;
    let tree = generate_tree(5, 6, &mut next_id);
    let table = generate_table(next_id);

    c.bench_function("annotate_tree_9331_nodes", |b| {
        b.iter_batched(
            || tree.clone(),
            |mut root| {
                annotate_tree(&mut root, Some(&table), "name", "group_value", &[])
                    .expect("annotate");
                root
            },
            BatchSize::LargeInput,
        )
    });
}

criterion_group!(benches, bench_pipeline);
criterion_main!(benches);
