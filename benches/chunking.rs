use criterion::{Criterion, criterion_group, criterion_main};
use ragpipe::config::ChunkingConfig;
use ragpipe::embeddings::chunking::chunk_document;
use std::hint::black_box;

fn synthetic_document() -> String {
    let paragraph = "Retrieval pipelines split documents into overlapping chunks \
                     so that embedding models see bounded, coherent windows of text. \
                     Each chunk carries enough surrounding context to answer questions \
                     that span a paragraph boundary.\n\n";
    paragraph.repeat(250)
}

pub fn criterion_benchmark(c: &mut Criterion) {
    let text = synthetic_document();
    let config = ChunkingConfig::default();
    c.bench_function("chunking", |b| {
        b.iter(|| {
            chunk_document(
                black_box(&text),
                black_box("bench-doc"),
                black_box("bench.txt"),
                black_box(&config),
            )
        })
    });
}

criterion_group!(benches, criterion_benchmark);
criterion_main!(benches);
