use criterion::{Criterion, criterion_group, criterion_main};
use kb_rag::embeddings::chunking::{ChunkingConfig, chunk_document};
use std::hint::black_box;

pub fn criterion_benchmark(c: &mut Criterion) {
    let text: String = (0..200)
        .map(|i| {
            format!(
                "Section {} covers operating the service: draining workers, \
                 rotating credentials, and verifying the dashboard after each change.\n\n",
                i
            )
        })
        .collect();
    let config = ChunkingConfig::default();

    c.bench_function("chunking", |b| {
        b.iter(|| chunk_document(black_box("doc"), black_box(&text), black_box(&config)))
    });
}

criterion_group!(benches, criterion_benchmark);
criterion_main!(benches);
