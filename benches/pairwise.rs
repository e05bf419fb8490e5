//! RUSTFLAGS="-C target-cpu=native" cargo bench -- Pairwise
use criterion::{
    criterion_group, criterion_main, AxisScale, BenchmarkId, Criterion, PlotConfiguration,
    SamplingMode,
};
use nalgebra::{Point3, Vector3};
use rand::prelude::*;
use tunell::{
    ContainerOption, DataLayout, Engine, Functor, Newton3Option, Particle, TraversalOption,
    TuningOptions,
};

type PointCloud = Vec<Point3<f64>>;

/// Generate a uniformly random 3D point cloud of size `n` in a cuboid of
/// edge lengths `vol` starting at `origin`.
fn generate_points_random(n: usize, vol: [f64; 3], origin: [f64; 3], seed: Option<u64>) -> PointCloud {
    // with fixed seed for reproducability
    let mut rng = StdRng::seed_from_u64(seed.unwrap_or(3079380797442975911));

    std::iter::repeat_with(|| {
        Point3::new(
            origin[0] + rng.gen::<f64>() * vol[0],
            origin[1] + rng.gen::<f64>() * vol[1],
            origin[2] + rng.gen::<f64>() * vol[2],
        )
    })
    .take(n)
    .collect()
}

// cf. https://docs.lammps.org/pair_lj.html for dimensionless `lj/cut`
// panics if the distance is zero
struct Lj {
    cutoff_squared: f64,
}

impl Functor for Lj {
    fn aos(&self, i: &mut Particle, j: &mut Particle, newton3: bool) {
        let d = i.r - j.r;
        let dsq = d.norm_squared();
        if dsq > self.cutoff_squared {
            return;
        }
        let inv = dsq.recip();
        let lj6 = inv * inv * inv;
        let f: Vector3<f64> = d * (24.0 * inv * (2.0 * lj6 * lj6 - lj6));
        i.f += f;
        if newton3 {
            j.f -= f;
        }
    }
}

fn engine_of(
    container: ContainerOption,
    traversal: TraversalOption,
    newton3: Newton3Option,
    points: &PointCloud,
    side: f64,
    cutoff: f64,
) -> Engine {
    let mut engine = Engine::builder(
        Point3::new(0.0, 0.0, 0.0),
        Point3::new(side, side, side),
        cutoff,
    )
    .allowed_containers(vec![container])
    .allowed_traversals(vec![traversal])
    .allowed_data_layouts(vec![DataLayout::Aos])
    .allowed_newton3(vec![newton3])
    .tuning_options(TuningOptions {
        num_samples: 1,
        tuning_interval: u64::MAX,
        ..TuningOptions::default()
    })
    .build()
    .expect("benchmark configuration must build");
    for (i, p) in points.iter().enumerate() {
        engine.add_particle(Particle::new(i as u64, *p)).unwrap();
    }
    engine
}

pub fn bench_pairwise(c: &mut Criterion) {
    let plot_config = PlotConfiguration::default().summary_scale(AxisScale::Logarithmic);
    let mut group = c.benchmark_group("Pairwise");
    group
        .sampling_mode(SamplingMode::Flat)
        .plot_config(plot_config);

    let cutoff = 1.0;
    let candidates = [
        (ContainerOption::LinkedCells, TraversalOption::LcC08, Newton3Option::Enabled),
        (ContainerOption::LinkedCells, TraversalOption::LcC18, Newton3Option::Enabled),
        (ContainerOption::LinkedCells, TraversalOption::LcC01, Newton3Option::Disabled),
        (
            ContainerOption::VerletListsCells,
            TraversalOption::VlcC18,
            Newton3Option::Enabled,
        ),
        (
            ContainerOption::VerletClusterLists,
            TraversalOption::VclClusterIteration,
            Newton3Option::Disabled,
        ),
    ];

    for size in (3..=5).map(|exp| 10usize.pow(exp)) {
        // constant density: scale the box with the particle count
        let side = (size as f64).cbrt() * 1.2;
        let points = generate_points_random(size, [side; 3], [0.0; 3], None);
        let functor = Lj {
            cutoff_squared: cutoff * cutoff,
        };
        for (container, traversal, newton3) in candidates {
            let mut engine = engine_of(container, traversal, newton3, &points, side, cutoff);
            group.bench_with_input(
                BenchmarkId::new(format!("{traversal}"), size),
                &size,
                |b, _| {
                    b.iter(|| {
                        engine.iterate_pairwise(&functor).unwrap();
                    })
                },
            );
        }
    }
    group.finish();
}

criterion_group!(benches, bench_pairwise);
criterion_main!(benches);
