// Benchmarking tree induction
// and pruning on synthetic data
use arbor::{
    grow, Attribute, AttributeSet, GrowOptions, Measure, PruneMethod, PruneOptions, Tuple, Value,
};
use criterion::{black_box, criterion_group, criterion_main, Criterion};

// deterministic synthetic table: three nominal attributes, one metric
// attribute and a two-class target with some noise
fn create_data(n_samples: usize) -> (AttributeSet, Vec<Tuple>) {
    let attrs = AttributeSet::new(vec![
        Attribute::nominal("a", 3),
        Attribute::nominal("b", 4),
        Attribute::nominal("c", 2),
        Attribute::float("x"),
        Attribute::nominal("class", 2),
    ]);
    let mut tuples = Vec::with_capacity(n_samples);
    for i in 0..n_samples {
        let a = i % 3;
        let b = (i / 3) % 4;
        let c = (i / 12) % 2;
        let x = ((i * 37) % 100) as f64 / 10.0;
        let noise = i % 17 == 0;
        let class = usize::from((a == 0 || x > 5.0) != noise);
        tuples.push(Tuple::new(
            vec![
                Value::Nominal(a),
                Value::Nominal(b),
                Value::Nominal(c),
                Value::Float(x),
                Value::Nominal(class),
            ],
            1.0,
        ));
    }
    (attrs, tuples)
}

pub fn grow_and_prune(c: &mut Criterion) {
    let n_samples = 2_000usize;
    let (attrs, tuples) = create_data(n_samples);

    let mut group = c.benchmark_group("grow_tree");
    group.bench_function("grow_default", |bench| {
        bench.iter(|| {
            let mut data = tuples.clone();
            let opts = GrowOptions::default().set_measure(Measure::InfoGainRatio);
            let tree = grow(black_box(&attrs), black_box(&mut data), 4, &opts).unwrap();
            black_box(tree.size());
        })
    });
    group.bench_function("grow_and_prune_confidence", |bench| {
        bench.iter(|| {
            let mut data = tuples.clone();
            let opts = GrowOptions::default().set_measure(Measure::InfoGainRatio);
            let mut tree = grow(black_box(&attrs), black_box(&mut data), 4, &opts).unwrap();
            tree.prune(
                &PruneOptions::default()
                    .set_method(PruneMethod::ConfidenceLevel)
                    .set_param(0.25),
            )
            .unwrap();
            black_box(tree.size());
        })
    });
    group.finish();
}

criterion_group!(benches, grow_and_prune);
criterion_main!(benches);
