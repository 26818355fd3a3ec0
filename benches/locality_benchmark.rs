//! Performance benchmarks for locality domain trees
//!
//! Run with: cargo bench

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use pgas_locality::config::LocalityConfig;
use pgas_locality::domain::{FilterMode, Scope};
use pgas_locality::team::SoloTeam;
use pgas_locality::topology::ModuleLocation;
use pgas_locality::unit::{UnitHardwareInfo, UnitMapping};
use pgas_locality::Locality;

/// Synthetic cluster: `nodes` hosts with two NUMA domains, one L3 per NUMA
/// domain and one L2 per unit
fn cluster(nodes: usize, units_per_node: u32) -> UnitMapping {
    let mut units = Vec::new();
    for node in 0..nodes {
        for u in 0..units_per_node {
            let numa = u * 2 / units_per_node;
            units.push(
                UnitHardwareInfo::new(format!("node{:04}", node))
                    .with_cores(units_per_node as usize)
                    .with_numa(numa)
                    .with_cache_id(3, numa)
                    .with_cache_id(2, u),
            );
        }
    }
    UnitMapping::new(units)
}

fn config() -> LocalityConfig {
    LocalityConfig {
        module_discovery: false,
        ..Default::default()
    }
}

fn build(map: &UnitMapping, modules: &[ModuleLocation]) -> Locality {
    let team = SoloTeam::new(0, map.iter().count());
    Locality::build_with_modules(&team, map, modules, &config()).unwrap()
}

fn bench_build(c: &mut Criterion) {
    let mut group = c.benchmark_group("build");

    for nodes in [4usize, 64, 512] {
        let map = cluster(nodes, 16);
        group.throughput(Throughput::Elements((nodes * 16) as u64));
        group.bench_with_input(BenchmarkId::new("nodes", nodes), &map, |b, map| {
            b.iter(|| black_box(build(map, &[])));
        });
    }

    group.finish();
}

fn bench_filter(c: &mut Criterion) {
    let mut group = c.benchmark_group("filter");
    let locality = build(&cluster(256, 16), &[]);
    let nodes = locality.domains_at_scope(Scope::Node).unwrap();
    let half: Vec<&str> = nodes.iter().step_by(2).map(|t| t.as_str()).collect();

    group.bench_function("remove_half_nodes", |b| {
        b.iter(|| black_box(locality.filter(&half, FilterMode::Remove).unwrap()));
    });
    group.bench_function("keep_one_numa", |b| {
        b.iter(|| black_box(locality.filter(&[".7.0.1"], FilterMode::Keep).unwrap()));
    });

    group.finish();
}

fn bench_update(c: &mut Criterion) {
    let locality = build(&cluster(256, 16), &[]);

    c.bench_function("update_subdomains_256_nodes", |b| {
        b.iter(|| {
            let mut tree = locality.tree.copy().unwrap();
            tree.update_subdomains().unwrap();
            black_box(tree)
        });
    });
}

fn bench_queries(c: &mut Criterion) {
    let locality = build(&cluster(256, 16), &[]);

    c.bench_function("find_deep_tag", |b| {
        b.iter(|| black_box(locality.find(black_box(".200.0.1.0.5.0")).unwrap()));
    });
    c.bench_function("split_cores", |b| {
        b.iter(|| black_box(locality.tree.split_at_scope(Scope::Core, 12).unwrap()));
    });
}

criterion_group!(benches, bench_build, bench_filter, bench_update, bench_queries);
criterion_main!(benches);
