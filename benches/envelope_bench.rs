use abe_envelope::{compile, Comparison, CpAbe, EncapsulationScheme, Envelope, KpAbe};
use ark_std::rand::SeedableRng;
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use rand::rngs::StdRng;
use rand::RngCore;

const PAYLOAD_SIZES: [usize; 3] = [1 << 10, 64 << 10, 1 << 20];
const ATTRIBUTE_COUNTS: [usize; 3] = [2, 8, 32];

fn attribute_names(n: usize) -> Vec<String> {
    (0..n).map(|i| format!("attr{i}")).collect()
}

/// Conjunction over all attributes, the worst case for decapsulation.
fn conjunction(attributes: &[String]) -> String {
    attributes.join(" and ")
}

fn benchmark_cpabe(c: &mut Criterion) {
    let mut group = c.benchmark_group("cpabe");
    group.sample_size(10);

    let mut rng = StdRng::seed_from_u64(42);
    let envelope = Envelope::new(CpAbe);
    let (mpk, msk) = CpAbe.setup(&mut rng);

    for n in ATTRIBUTE_COUNTS {
        let attributes = attribute_names(n);
        let policy = conjunction(&attributes);
        let dk = CpAbe.keygen(&msk, &mpk, &attributes, &mut rng).unwrap();
        let ciphertext = envelope
            .encrypt(&mpk, &b"benchmark"[..], policy.as_str(), &mut rng)
            .unwrap();

        group.bench_with_input(BenchmarkId::new("keygen", n), &attributes, |b, attrs| {
            let mut local_rng = StdRng::seed_from_u64(7);
            b.iter(|| CpAbe.keygen(black_box(&msk), &mpk, attrs, &mut local_rng).unwrap());
        });
        group.bench_with_input(BenchmarkId::new("encrypt", n), &policy, |b, policy| {
            let mut local_rng = StdRng::seed_from_u64(7);
            b.iter(|| {
                envelope
                    .encrypt(&mpk, &b"benchmark"[..], black_box(policy.as_str()), &mut local_rng)
                    .unwrap()
            });
        });
        group.bench_with_input(BenchmarkId::new("decrypt", n), &ciphertext, |b, ct| {
            b.iter(|| envelope.decrypt(&mpk, &dk, black_box(ct.as_slice())).unwrap());
        });
    }

    group.finish();
}

fn benchmark_kpabe(c: &mut Criterion) {
    let mut group = c.benchmark_group("kpabe");
    group.sample_size(10);

    let mut rng = StdRng::seed_from_u64(42);
    let envelope = Envelope::new(KpAbe);
    let (mpk, msk) = KpAbe.setup(&mut rng);

    for n in ATTRIBUTE_COUNTS {
        let attributes = attribute_names(n);
        let policy = conjunction(&attributes);
        let dk = KpAbe.keygen(&msk, &mpk, policy.as_str(), &mut rng).unwrap();
        let ciphertext = envelope
            .encrypt(&mpk, &b"benchmark"[..], attributes.as_slice(), &mut rng)
            .unwrap();

        group.bench_with_input(BenchmarkId::new("encrypt", n), &attributes, |b, attrs| {
            let mut local_rng = StdRng::seed_from_u64(7);
            b.iter(|| {
                envelope
                    .encrypt(&mpk, &b"benchmark"[..], black_box(attrs.as_slice()), &mut local_rng)
                    .unwrap()
            });
        });
        group.bench_with_input(BenchmarkId::new("decrypt", n), &ciphertext, |b, ct| {
            b.iter(|| envelope.decrypt(&mpk, &dk, black_box(ct.as_slice())).unwrap());
        });
    }

    group.finish();
}

fn benchmark_payload(c: &mut Criterion) {
    let mut group = c.benchmark_group("payload");
    group.sample_size(10);

    let mut rng = StdRng::seed_from_u64(42);
    let envelope = Envelope::new(CpAbe);
    let (mpk, msk) = CpAbe.setup(&mut rng);
    let dk = CpAbe
        .keygen(&msk, &mpk, &["reader".to_string()], &mut rng)
        .unwrap();

    for size in PAYLOAD_SIZES {
        let mut plaintext = vec![0u8; size];
        rng.fill_bytes(&mut plaintext);
        let ciphertext = envelope
            .encrypt(&mpk, plaintext.as_slice(), "reader", &mut rng)
            .unwrap();

        group.throughput(Throughput::Bytes(size as u64));
        group.bench_with_input(BenchmarkId::new("decrypt", size), &ciphertext, |b, ct| {
            b.iter(|| envelope.decrypt(&mpk, &dk, black_box(ct.as_slice())).unwrap());
        });
    }

    group.finish();
}

fn benchmark_compile(c: &mut Criterion) {
    let mut group = c.benchmark_group("compile");

    for bits in [8u32, 32, 64] {
        group.bench_with_input(BenchmarkId::new("less_than", bits), &bits, |b, &bits| {
            b.iter(|| compile("age", Comparison::Lt, black_box(5), bits).unwrap());
        });
        group.bench_with_input(BenchmarkId::new("equal", bits), &bits, |b, &bits| {
            b.iter(|| compile("age", Comparison::Eq, black_box(5), bits).unwrap());
        });
    }

    group.finish();
}

criterion_group!(
    benches,
    benchmark_cpabe,
    benchmark_kpabe,
    benchmark_payload,
    benchmark_compile
);
criterion_main!(benches);
