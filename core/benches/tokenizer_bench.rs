use criterion::{criterion_group, criterion_main, Criterion};
use resurface_core::tokenizer::tokenize;
use resurface_core::{Document, IndexEngine};

const WORDS: &[&str] = &[
    "garden", "roses", "compost", "tomatoes", "pruning", "watering", "rust", "borrow", "checker",
    "lifetimes", "async", "runtime", "meeting", "planning", "quarterly", "budget", "journal",
    "reflection", "reading", "novel", "chapter", "recipe", "sourdough", "starter", "hydration",
];

fn synthetic_corpus(n: usize) -> Vec<Document> {
    (0..n)
        .map(|i| {
            let text: Vec<&str> = (0..60).map(|j| WORDS[(i * 7 + j * 13 + j * j) % WORDS.len()]).collect();
            Document::new(format!("note-{i:05}.md"), text.join(" "))
        })
        .collect()
}

fn bench_tokenize(c: &mut Criterion) {
    let text = synthetic_corpus(1).remove(0).text.repeat(50);
    c.bench_function("tokenize_note", |b| b.iter(|| tokenize(&text)));
}

fn bench_build(c: &mut Criterion) {
    let docs = synthetic_corpus(2_000);
    c.bench_function("build_full_2000", |b| {
        b.iter(|| {
            let mut engine = IndexEngine::new();
            engine.build_full(&docs);
            engine
        })
    });
    let mut engine = IndexEngine::new();
    engine.build_full(&docs);
    c.bench_function("find_similar_2000", |b| b.iter(|| engine.find_similar("note-00042.md", 10)));
}

criterion_group!(benches, bench_tokenize, bench_build);
criterion_main!(benches);
