use rand::Rng;

use criterion::{criterion_group, criterion_main, Criterion, Throughput};
use here4::{
    dsdl::classify,
    frame::{decode_frame, RawFrame},
    message::{Envelope, PositionFix2, TelemetryVariant},
    normalize::Normalizer,
};

fn random_frames(count: usize) -> Vec<RawFrame> {
    let mut rng = rand::thread_rng();
    (0..count)
        .map(|_| {
            let id = rng.gen_range(0..=0x1fff_ffff_u32);
            let len = rng.gen_range(1..=8);
            let payload: Vec<u8> = (0..len).map(|_| rng.gen()).collect();
            RawFrame::new(id, &payload).unwrap()
        })
        .collect()
}

fn bench_decode_frame(c: &mut Criterion) {
    let frames = random_frames(1024);
    let mut group = c.benchmark_group("frame");
    group.throughput(Throughput::Elements(frames.len() as u64));
    group.bench_function("decode", |b| {
        b.iter(|| {
            for frame in &frames {
                let _ = decode_frame(frame);
            }
        });
    });
    group.bench_function("decode+classify", |b| {
        b.iter(|| {
            for frame in &frames {
                if let Ok(decoded) = decode_frame(frame) {
                    let _ = classify(&decoded);
                }
            }
        });
    });
    group.finish();
}

fn bench_normalize(c: &mut Criterion) {
    let env = Envelope::new(
        124,
        TelemetryVariant::PositionFix2(PositionFix2 {
            latitude_deg_1e8: Some(123_456_789),
            longitude_deg_1e8: Some(-987_654_321),
            height_msl_mm: Some(1500),
            ned_velocity: Some(vec![1.0, 2.0, -3.0]),
            position_covariance: Some(vec![0.5; 9]),
            ..Default::default()
        }),
    );
    let mut normalizer = Normalizer::new(125);
    c.bench_function("normalize fix2", |b| {
        b.iter(|| normalizer.accept(env.clone(), 1.0));
    });
}

criterion_group!(benches, bench_decode_frame, bench_normalize);
criterion_main!(benches);
