use criterion::{black_box, criterion_group, criterion_main, Criterion};

use std::fs;

use toolprogress::io::ConsoleOutputTrimmer;
use toolprogress::{ConsoleFormat, LineClassifier, ToolRun};

fn parse_text(run: &mut ToolRun, text: &str) -> f32 {
    run.parse_text(text);
    run.progress()
}

fn diann_search(c: &mut Criterion) {
    let text = fs::read_to_string("./test/data/diann_search_console.txt").unwrap();
    let mut run = ToolRun::new("unused.txt", ConsoleFormat::dia_nn_search()).unwrap();
    c.bench_function("diann_search_parse", |b| {
        b.iter(|| parse_text(black_box(&mut run), black_box(&text)))
    });
}

fn toppic(c: &mut Criterion) {
    let text = fs::read_to_string("./test/data/toppic_console.txt").unwrap();
    let mut run = ToolRun::new("unused.txt", ConsoleFormat::toppic()).unwrap();
    c.bench_function("toppic_parse", |b| {
        b.iter(|| parse_text(black_box(&mut run), black_box(&text)))
    });

    let classifier = LineClassifier::new(ConsoleFormat::toppic()).unwrap();
    let trimmer = ConsoleOutputTrimmer::new(&classifier);
    c.bench_function("toppic_trim", |b| {
        b.iter(|| trimmer.trim_lines(black_box(&text)).0.len())
    });
}

criterion_group!(benches, diann_search, toppic);
criterion_main!(benches);
