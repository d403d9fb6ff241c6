//! Performance benchmarks for the transcript pipeline
//!
//! Run with: cargo bench
//! Or for specific benchmarks: cargo bench -- <filter>

use criterion::{BenchmarkId, Criterion, Throughput, black_box, criterion_group, criterion_main};
use std::time::{Duration, Instant};
use waav_voice_engine::core::realtime::{EventStreamDecoder, TranscriptRole};
use waav_voice_engine::core::transcript::{
    ReconcilerConfig, TranscriptNormalizer, TranscriptReconciler, merge_incremental,
};

/// Benchmark incremental merging of growing delta streams
fn bench_merge_incremental(c: &mut Criterion) {
    let mut group = c.benchmark_group("merge_incremental");
    group.measurement_time(Duration::from_secs(5));

    let sentence = "I think the duty of care in Donoghue v Stevenson extends to manufacturers";
    let words: Vec<&str> = sentence.split_whitespace().collect();

    // Word-by-word fragments
    group.bench_function("word_fragments", |b| {
        b.iter(|| {
            let mut text = String::new();
            for word in &words {
                text = merge_incremental(black_box(&text), black_box(word));
            }
            text
        });
    });

    // Cumulative resends of the whole prefix
    let prefixes: Vec<String> = (1..=words.len()).map(|n| words[..n].join(" ")).collect();
    group.bench_function("cumulative_resend", |b| {
        b.iter(|| {
            let mut text = String::new();
            for prefix in &prefixes {
                text = merge_incremental(black_box(&text), black_box(prefix));
            }
            text
        });
    });

    group.finish();
}

/// Benchmark wake-word and language normalization
fn bench_normalize(c: &mut Criterion) {
    let mut group = c.benchmark_group("normalize");
    let normalizer = TranscriptNormalizer::default();

    let inputs = [
        ("clean", "What is the deadline for the contract law essay?"),
        ("mishearing", "Hey Denmark, can you quiz me on Dharma and torts?"),
        ("foreign", "Это совсем не английский текст"),
    ];

    for (name, text) in inputs {
        group.throughput(Throughput::Bytes(text.len() as u64));
        group.bench_with_input(BenchmarkId::new(name, text.len()), &text, |b, text| {
            b.iter(|| normalizer.normalize(black_box(text)));
        });
    }

    group.finish();
}

/// Benchmark decoding plus reconciliation of a realistic event stream
fn bench_reconcile_stream(c: &mut Criterion) {
    let mut group = c.benchmark_group("reconcile_stream");
    group.measurement_time(Duration::from_secs(5));

    let mut messages = Vec::new();
    for turn in 0..20 {
        for delta in ["So the", "So the key", "So the key point", " is"] {
            messages.push(format!(
                r#"{{"type":"conversation.item.input_audio_transcription.delta","delta":"{delta}"}}"#
            ));
        }
        messages.push(format!(
            r#"{{"type":"conversation.item.input_audio_transcription.completed","transcript":"So the key point is number {turn}"}}"#
        ));
    }
    let total_bytes: usize = messages.iter().map(String::len).sum();

    group.throughput(Throughput::Bytes(total_bytes as u64));
    group.bench_function("user_turns", |b| {
        b.iter(|| {
            let mut decoder = EventStreamDecoder::new();
            let mut reconciler = TranscriptReconciler::new(&ReconcilerConfig::default())
                .expect("default config is valid");
            let now = Instant::now();
            for message in &messages {
                for event in decoder.decode(black_box(message)) {
                    if event.tag.ends_with(".delta") {
                        reconciler.append_delta(TranscriptRole::User, event.delta_text());
                    } else {
                        reconciler.finalize(TranscriptRole::User, event.final_text(), now);
                    }
                }
            }
            reconciler.turns().len()
        });
    });

    group.finish();
}

criterion_group!(
    benches,
    bench_merge_incremental,
    bench_normalize,
    bench_reconcile_stream
);
criterion_main!(benches);
