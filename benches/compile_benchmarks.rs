//! Compilation benchmarks: corpus size scaling and IS_ANY_OF expansion.

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use helios::{Compiler, RuleSet};

fn synthetic_rules(count: usize) -> RuleSet {
    let rules: Vec<String> = (0..count)
        .map(|i| {
            format!(
                r#"{{"ruleCode": "R{i}", "priority": {priority}, "conditions": [
                    {{"field": "status", "operator": "EQUAL_TO", "value": "S{status}"}},
                    {{"field": "amount", "operator": "GREATER_THAN", "value": {threshold}}},
                    {{"field": "region", "operator": "IS_ANY_OF", "value": ["R{a}", "R{b}", "R{c}"]}}
                ]}}"#,
                i = i,
                priority = i % 10,
                status = i % 20,
                threshold = (i % 100) * 10,
                a = i % 7,
                b = (i + 1) % 7,
                c = (i + 2) % 7,
            )
        })
        .collect();
    RuleSet::from_json_str(&format!("[{}]", rules.join(","))).expect("synthetic rules")
}

fn bench_compile(c: &mut Criterion) {
    let mut group = c.benchmark_group("compile");
    group.sample_size(10);
    for size in [100usize, 1_000, 10_000] {
        let rules = synthetic_rules(size);
        group.bench_with_input(BenchmarkId::from_parameter(size), &size, |b, _| {
            b.iter(|| Compiler::with_defaults().compile(&rules).unwrap());
        });
    }
    group.finish();
}

criterion_group!(benches, bench_compile);
criterion_main!(benches);
