//! Progress pipeline benchmarks: tokenizing, classifying and tracking a
//! synthetic renderer transcript.
//! Run: cargo bench

use std::io::Cursor;

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use flamebatch::display::TerminalDisplay;
use flamebatch::events::classify;
use flamebatch::progress::ProgressState;
use flamebatch::tokenizer::LogicalLines;

fn transcript(strips: u32) -> Vec<u8> {
    let mut text = String::new();
    for strip in 1..=strips {
        text.push_str(&format!("strip = {strip}/{strips}\n"));
        for tenth in 0..=1000 {
            text.push_str(&format!("chaos: {:5.1}%\r", f64::from(tenth) / 10.0));
        }
        text.push_str("density estimation: 0.4s\n");
    }
    text.push_str("filtering...writing flame.png...done.\n");
    text.into_bytes()
}

fn bench_progress_stream(c: &mut Criterion) {
    let bytes = transcript(4);

    let mut group = c.benchmark_group("progress_stream");
    group.sample_size(50);

    group.bench_function("track_4_strips", |b| {
        b.iter(|| {
            let mut state = ProgressState::default();
            for line in LogicalLines::new(Cursor::new(bytes.as_slice())) {
                let line = line.expect("in-memory read");
                state.apply(&classify(&line));
            }
            black_box(state.overall())
        });
    });

    group.bench_function("track_and_draw_4_strips", |b| {
        b.iter(|| {
            let mut state = ProgressState::default();
            let mut display = TerminalDisplay::new(Vec::with_capacity(1 << 20), "flame.png");
            for line in LogicalLines::new(Cursor::new(bytes.as_slice())) {
                let line = line.expect("in-memory read");
                if state.apply(&classify(&line)) {
                    display.redraw(&state, None).expect("draw");
                }
            }
            black_box(display.into_inner().len())
        });
    });

    group.finish();
}

criterion_group!(benches, bench_progress_stream);
criterion_main!(benches);
