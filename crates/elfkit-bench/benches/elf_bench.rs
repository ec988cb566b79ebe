//! Parse, serialize and edit benchmarks.

use criterion::{BatchSize, BenchmarkId, Criterion, criterion_group, criterion_main};
use elfkit_bench::synthetic;
use elfkit_core::{ElfFile, Encoding, NewSection, Removal, SectionType};

const SIZES: &[usize] = &[8, 64, 512];

fn bench_parse(c: &mut Criterion) {
    let mut group = c.benchmark_group("parse");
    for &count in SIZES {
        let bytes = synthetic(Encoding::ELF64_LSB, count).expect("synthetic input");
        group.bench_with_input(BenchmarkId::new("sections", count), &bytes, |b, bytes| {
            b.iter(|| criterion::black_box(ElfFile::parse(bytes).expect("parse")));
        });
    }
    if let Ok(bytes) = std::fs::read("/bin/ls") {
        if ElfFile::parse(&bytes).is_ok() {
            group.bench_function("bin_ls", |b| {
                b.iter(|| criterion::black_box(ElfFile::parse(&bytes).expect("parse")));
            });
        }
    }
    group.finish();
}

fn bench_serialize(c: &mut Criterion) {
    let mut group = c.benchmark_group("serialize_unedited");
    for &count in SIZES {
        let bytes = synthetic(Encoding::ELF64_LSB, count).expect("synthetic input");
        let file = ElfFile::parse(&bytes).expect("parse").value;
        group.bench_with_input(BenchmarkId::new("sections", count), &file, |b, file| {
            b.iter(|| criterion::black_box(file.to_bytes().expect("serialize")));
        });
    }
    group.finish();
}

fn bench_edits(c: &mut Criterion) {
    let mut group = c.benchmark_group("edit");
    for &count in SIZES {
        let bytes = synthetic(Encoding::ELF64_LSB, count).expect("synthetic input");
        let file = ElfFile::parse(&bytes).expect("parse").value;

        group.bench_with_input(BenchmarkId::new("add_section", count), &file, |b, file| {
            b.iter_batched(
                || file.clone(),
                |mut file| {
                    file.add_section(NewSection::new(".note.bench", SectionType::Note, vec![0; 32]))
                        .expect("add");
                    criterion::black_box(file.to_bytes().expect("serialize"))
                },
                BatchSize::SmallInput,
            );
        });

        let last = file
            .section_by_name(&format!(".text.fn_{}", count - 1))
            .expect("last code section");
        group.bench_with_input(BenchmarkId::new("remove_cascade", count), &file, |b, file| {
            b.iter_batched(
                || file.clone(),
                |mut file| {
                    file.remove_section(last, Removal::Cascade).expect("remove");
                    criterion::black_box(file.to_bytes().expect("serialize"))
                },
                BatchSize::SmallInput,
            );
        });
    }
    group.finish();
}

criterion_group!(benches, bench_parse, bench_serialize, bench_edits);
criterion_main!(benches);
