//! Performance benchmarks for the license codec.
//!
//! Decoding runs on every poll tick that finds a new card, so it should stay
//! well under a millisecond even for the recovery paths.
//!
//! Run benchmarks with:
//! ```sh
//! cargo bench --bench codec_bench
//! ```

use criterion::{BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};
use evlic_codec::{Encoder, WireFormat, WritePayload, assemble, decode, split_blocks};
use evlic_core::{LicenseField, LicenseRecord, MemoryBlock};
use std::hint::black_box;

fn full_record() -> LicenseRecord {
    LicenseRecord::new()
        .with(LicenseField::HolderName, "Maria Aparecida dos Santos")
        .with(LicenseField::Mobile, "+55 81 99876-5432")
        .with(LicenseField::City, "Recife")
        .with(LicenseField::LicenseType, "EV-B")
        .with(LicenseField::LicenseNumber, "PE-2025-000731")
        .with(LicenseField::CardNumber, "0042")
        .with(LicenseField::ValidUntil, "2030-12-31")
}

/// Card memory as read back: 16-byte blocks with trailing padding.
fn as_blocks(payload: &[u8]) -> Vec<MemoryBlock> {
    split_blocks(payload)
        .into_iter()
        .zip(4u16..)
        .map(|(block, index)| MemoryBlock::readable(index, block))
        .collect()
}

fn bench_encode(c: &mut Criterion) {
    let mut group = c.benchmark_group("encode");
    group.throughput(Throughput::Elements(1));

    let payload = WritePayload::Record(full_record());
    for format in [WireFormat::Plain, WireFormat::Ndef] {
        let encoder = Encoder::new(format);
        group.bench_function(BenchmarkId::from_parameter(format!("{format:?}")), |b| {
            b.iter(|| black_box(encoder.encode(black_box(&payload)).unwrap()));
        });
    }

    group.finish();
}

fn bench_decode(c: &mut Criterion) {
    let mut group = c.benchmark_group("decode");
    group.throughput(Throughput::Elements(1));

    let payload = WritePayload::Record(full_record());
    let plain = Encoder::new(WireFormat::Plain).encode(&payload).unwrap();
    let ndef = Encoder::new(WireFormat::Ndef).encode(&payload).unwrap();
    // Line breaks lost, so the pattern pass has to recover the fields.
    let damaged: Vec<u8> = plain
        .iter()
        .map(|&b| if b == b'\n' { b' ' } else { b })
        .collect();

    for (name, bytes) in [("plain", &plain), ("ndef", &ndef), ("damaged", &damaged)] {
        group.bench_function(name, |b| b.iter(|| black_box(decode(black_box(bytes)))));
    }

    group.finish();
}

fn bench_assemble_and_decode(c: &mut Criterion) {
    let mut group = c.benchmark_group("assemble_and_decode");

    for text_len in [16usize, 128, 512] {
        let text = "x".repeat(text_len);
        let bytes = Encoder::new(WireFormat::Ndef)
            .encode(&WritePayload::Text(text))
            .unwrap();
        let blocks = as_blocks(&bytes);

        group.throughput(Throughput::Bytes(bytes.len() as u64));
        group.bench_with_input(
            BenchmarkId::from_parameter(text_len),
            &blocks,
            |b, blocks| b.iter(|| black_box(decode(&assemble(black_box(blocks))))),
        );
    }

    group.finish();
}

criterion_group!(benches, bench_encode, bench_decode, bench_assemble_and_decode);
criterion_main!(benches);
