use criterion::{criterion_group, criterion_main, Criterion};
use linfa::prelude::Fit;
use vargp::datasets::{sign_wave, sine_wave};
use vargp::{ProbitGp, SpectralMixtureGp};

fn criterion_gp(c: &mut Criterion) {
    let mut group = c.benchmark_group("gp");
    group.sample_size(20);

    let regression = sine_wave(15, 0., None);
    group.bench_function("regression fit", |b| {
        b.iter(|| {
            std::hint::black_box(
                SpectralMixtureGp::<f64>::params()
                    .n_iter(25)
                    .fit(&regression)
                    .expect("GP fit error"),
            )
        });
    });

    let classification = sign_wave(10);
    group.bench_function("classification fit", |b| {
        b.iter(|| {
            std::hint::black_box(
                ProbitGp::<f64>::params()
                    .n_iter(25)
                    .fit(&classification)
                    .expect("VGP fit error"),
            )
        });
    });
    group.finish();
}

criterion_group!(benches, criterion_gp);
criterion_main!(benches);
