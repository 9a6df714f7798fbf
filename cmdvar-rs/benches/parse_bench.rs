use std::sync::Arc;

use criterion::{black_box, criterion_group, criterion_main, Criterion};

use cmdvar::middleware::Replace;
use cmdvar::{scan, Engine, MemoryStore};

fn make_template(blocks: usize) -> String {
    (0..blocks)
        .map(|i| format!("word {{v{i}++}} and {{list{i}+[a,b]}} "))
        .collect()
}

fn naive_replace(text: &str, pairs: &[(&str, &str)]) -> String {
    let mut out = text.to_lowercase();
    for (from, to) in pairs {
        out = out.replace(from, to);
    }
    out
}

fn bench_scan(c: &mut Criterion) {
    let small = make_template(5);
    let large = make_template(200);

    let mut g = c.benchmark_group("scan");
    g.bench_function("variable_blocks_small", |b| {
        b.iter(|| scan::variable_blocks(black_box(&small)).len())
    });
    g.bench_function("variable_blocks_large", |b| {
        b.iter(|| scan::variable_blocks(black_box(&large)).len())
    });
    g.finish();
}

fn bench_parse(c: &mut Criterion) {
    let rt = tokio::runtime::Builder::new_current_thread()
        .build()
        .expect("runtime");
    let template = make_template(5);
    let engine = Engine::new(Some(&template), Arc::new(MemoryStore::new()));
    let scripted = Engine::new(
        Some("$(var n = 6; `answer: ${n * 7}`)$ ^(upper('pre'))^"),
        Arc::new(MemoryStore::new()),
    );

    let mut g = c.benchmark_group("parse");
    g.bench_function("variable_blocks", |b| {
        b.iter(|| rt.block_on(engine.parse(None, None)))
    });
    g.bench_function("sandboxed_blocks", |b| {
        b.iter(|| rt.block_on(scripted.parse(None, None)))
    });
    g.finish();
}

fn bench_replace(c: &mut Criterion) {
    let pairs = [("brownies", "salad"), ("cake", "fruit"), ("candy", "nuts")];
    let text = "I really enjoy Brownies, cake and candy. ".repeat(100);
    let ac = Replace::new(pairs);

    let mut g = c.benchmark_group("replace");
    g.bench_function("naive_lowercase", |b| {
        b.iter(|| naive_replace(black_box(&text), black_box(&pairs)))
    });
    g.bench_function("aho_corasick", |b| b.iter(|| ac.apply(black_box(&text))));
    g.finish();
}

criterion_group!(benches, bench_scan, bench_parse, bench_replace);
criterion_main!(benches);
