use criterion::{black_box, criterion_group, criterion_main, BatchSize, Criterion};

use noodles::core::Position;
use noodles::sam::alignment::record::cigar::op::Kind;
use noodles::sam::alignment::record::cigar::Op;
use noodles::sam::alignment::record::Flags;
use noodles::sam::alignment::record_buf::{Cigar as CigarBuf, RecordBuf, Sequence};

use ampliclip::io::bed::BedRecord;
use ampliclip::scheme::{PrimerDirection, PrimerScheme};
use ampliclip::trim::mask::{softmask_end, softmask_start};
use ampliclip::trim::matcher::PrimerMatcher;

// 类似 ARTIC 的平铺 scheme：相邻扩增子重叠，双池交替
fn make_scheme(n_amplicons: usize) -> PrimerScheme {
    let mut records = Vec::with_capacity(n_amplicons * 2);
    for i in 0..n_amplicons {
        let pool = if i % 2 == 0 { "1" } else { "2" };
        let start = 100 + i * 350;
        records.push(BedRecord {
            chrom: "bench".to_string(),
            start,
            end: start + 24,
            name: format!("bench_{i}_LEFT"),
            pool: pool.to_string(),
            strand: Some('+'),
        });
        let rev = start + 380;
        records.push(BedRecord {
            chrom: "bench".to_string(),
            start: rev,
            end: rev + 24,
            name: format!("bench_{i}_RIGHT"),
            pool: pool.to_string(),
            strand: Some('-'),
        });
    }
    PrimerScheme::load(&records).expect("bench scheme")
}

fn make_positions(len: usize, span: usize) -> Vec<usize> {
    let mut x: u32 = 42;
    let mut positions = Vec::with_capacity(len);
    for _ in 0..len {
        x = x.wrapping_mul(1_103_515_245).wrapping_add(12_345);
        positions.push((x as usize) % span);
    }
    positions
}

fn make_record(start1: usize, aligned: usize) -> RecordBuf {
    RecordBuf::builder()
        .set_flags(Flags::empty())
        .set_reference_sequence_id(0)
        .set_alignment_start(Position::new(start1).expect("position"))
        .set_cigar(CigarBuf::from(vec![Op::new(Kind::Match, aligned)]))
        .set_sequence(Sequence::from(vec![b'A'; aligned]))
        .build()
}

fn bench_primers_near(c: &mut Criterion) {
    let scheme = make_scheme(1_000);
    let span = 1_000 * 350 + 600;
    let positions = make_positions(1_024, span);

    c.bench_function("primers_near_1000_amplicons", |b| {
        let mut i = 0;
        b.iter(|| {
            let pos = positions[i % positions.len()];
            i += 1;
            black_box(scheme.primers_near(black_box("bench"), pos, PrimerDirection::Forward));
        })
    });
}

fn bench_match_read(c: &mut Criterion) {
    let scheme = make_scheme(1_000);
    let matcher = PrimerMatcher::new(&scheme, 35);
    let positions = make_positions(1_024, 1_000 * 350);

    c.bench_function("match_read_1000_amplicons", |b| {
        let mut i = 0;
        b.iter(|| {
            let start = positions[i % positions.len()];
            i += 1;
            black_box(matcher.match_read(black_box("bench"), start, start + 380));
        })
    });
}

fn bench_softmask(c: &mut Criterion) {
    let record = make_record(101, 400);

    c.bench_function("softmask_both_ends_400bp", |b| {
        b.iter_batched(
            || record.clone(),
            |mut record| {
                softmask_start(&mut record, 124).expect("mask start");
                softmask_end(&mut record, 480).expect("mask end");
                record
            },
            BatchSize::SmallInput,
        )
    });
}

criterion_group!(benches, bench_primers_near, bench_match_read, bench_softmask);
criterion_main!(benches);
