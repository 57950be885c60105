use criterion::{Criterion, black_box, criterion_group, criterion_main};
use flowgroup_bench::util;
use flowgroup_core::{LayoutConfig, NodeId, Vec2};
use flowgroup_graph::{container_at, pack};

fn bench_pack_group_with_100_leaves(c: &mut Criterion) {
    let config = LayoutConfig::default();
    let table = util::generate_synthetic_diagram(1, 100);
    let group_id = NodeId::from("group_0");

    c.bench_function("pack_group_100_leaves", |b| {
        b.iter(|| {
            let mut table = table.clone();
            let changed = pack(&mut table, black_box(&group_id), &config);
            black_box(changed)
        })
    });
}

fn bench_container_at_400_groups(c: &mut Criterion) {
    let config = LayoutConfig::default();
    let table = util::generate_synthetic_diagram(400, 5);
    // Inside the nested group of a group in the middle of the grid.
    let point = Vec2::new(10.0 * 600.0 + 100.0, 10.0 * 800.0 + 350.0);

    c.bench_function("container_at_400_groups", |b| {
        b.iter(|| {
            let found = container_at(&table, black_box(point), None, config.containment_margin);
            black_box(found)
        })
    });
}

criterion_group!(
    benches,
    bench_pack_group_with_100_leaves,
    bench_container_at_400_groups
);
criterion_main!(benches);
