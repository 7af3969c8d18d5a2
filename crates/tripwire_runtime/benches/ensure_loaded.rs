use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use tokio::runtime::Runtime;
use tripwire_core::Action;
use tripwire_runtime::{DynamicToolManager, EvictionPolicy, HybridWeights};
use tripwire_tool::ToolDescriptor;

const CATALOG: usize = 200;

fn catalog() -> Vec<ToolDescriptor> {
    (0..CATALOG)
        .map(|i| ToolDescriptor::new(&format!("svc{}", i), Action::Read, None))
        .collect()
}

fn bench_churn(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let mut group = c.benchmark_group("ensure_loaded_churn");
    group.throughput(Throughput::Elements(CATALOG as u64));

    for policy in [EvictionPolicy::Lfu, EvictionPolicy::Lru, EvictionPolicy::Hybrid] {
        let descriptors = catalog();
        let ids: Vec<_> = descriptors.iter().map(|d| d.id().clone()).collect();
        let manager =
            DynamicToolManager::with_catalog(20, policy, HybridWeights::default(), descriptors).unwrap();

        group.bench_with_input(BenchmarkId::from_parameter(policy), &ids, |b, ids| {
            b.iter(|| {
                rt.block_on(async {
                    for id in ids {
                        manager.ensure_loaded(black_box(id)).await.unwrap();
                    }
                });
            });
        });
    }

    group.finish();
}

fn bench_hits(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let descriptors = catalog();
    let hot = descriptors[0].id().clone();
    let manager =
        DynamicToolManager::with_catalog(20, EvictionPolicy::Lfu, HybridWeights::default(), descriptors)
            .unwrap();
    rt.block_on(manager.ensure_loaded(&hot)).unwrap();

    c.bench_function("ensure_loaded_hit", |b| {
        b.iter(|| rt.block_on(manager.ensure_loaded(black_box(&hot))).unwrap());
    });
}

criterion_group!(benches, bench_churn, bench_hits);
criterion_main!(benches);
