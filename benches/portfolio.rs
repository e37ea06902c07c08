use std::hint::black_box;

use criterion::BenchmarkId;
use criterion::Criterion;
use criterion::criterion_group;
use criterion::criterion_main;
use markowitz_rs::portfolio::FrontierTracer;
use markowitz_rs::portfolio::MonteCarloSampler;
use markowitz_rs::portfolio::PortfolioOptimizer;
use markowitz_rs::portfolio::RiskModel;
use markowitz_rs::portfolio::SolverSettings;
use markowitz_rs::portfolio::ledoit_wolf;
use markowitz_rs::portfolio::types::AssetUniverse;
use ndarray::Array1;
use ndarray::Array2;
use rand::SeedableRng;
use rand::rngs::StdRng;
use rand_distr::Distribution;
use rand_distr::StandardNormal;

fn random_returns(periods: usize, assets: usize) -> Array2<f64> {
  let mut rng = StdRng::seed_from_u64(1);
  Array2::from_shape_fn((periods, assets), |(_, j)| {
    let z: f64 = StandardNormal.sample(&mut rng);
    0.0003 * (j + 1) as f64 + 0.01 * z
  })
}

fn model(assets: usize) -> RiskModel {
  let returns = random_returns(504, assets);
  let (cov, _) = ledoit_wolf(returns.view(), 1e-6);
  let mu: Array1<f64> = Array1::from_shape_fn(assets, |j| 0.04 + 0.01 * j as f64);
  let ids: Vec<String> = (0..assets).map(|j| format!("A{j}")).collect();
  RiskModel::new(AssetUniverse::new(ids).unwrap(), mu, cov * 252.0).unwrap()
}

fn bench_shrinkage(c: &mut Criterion) {
  let mut group = c.benchmark_group("ledoit_wolf");
  for &assets in &[5, 20, 50] {
    let returns = random_returns(504, assets);
    group.bench_with_input(BenchmarkId::from_parameter(assets), &returns, |b, r| {
      b.iter(|| black_box(ledoit_wolf(r.view(), 1e-6)))
    });
  }
  group.finish();
}

fn bench_optimizer(c: &mut Criterion) {
  let mut group = c.benchmark_group("optimizer");
  group.sample_size(20);
  for &assets in &[3, 10] {
    let model = model(assets);
    group.bench_with_input(BenchmarkId::new("max_sharpe", assets), &model, |b, m| {
      let optimizer = PortfolioOptimizer::new(m, None, 0.0, SolverSettings::default()).unwrap();
      b.iter(|| black_box(optimizer.max_sharpe(None)))
    });
  }
  group.finish();
}

fn bench_monte_carlo(c: &mut Criterion) {
  let mut group = c.benchmark_group("monte_carlo");
  let model = model(10);
  for &n in &[1_000, 10_000] {
    group.bench_with_input(BenchmarkId::from_parameter(n), &n, |b, &n| {
      let sampler = MonteCarloSampler::new(n, 1.0, Some(42), 50, None);
      b.iter(|| black_box(sampler.sample(&model, 0.0)))
    });
  }
  group.finish();
}

fn bench_frontier(c: &mut Criterion) {
  let mut group = c.benchmark_group("frontier");
  group.sample_size(10);
  let model = model(5);
  group.bench_function("50_points", |b| {
    let tracer = FrontierTracer::new(50, None, 0.0, SolverSettings::default());
    b.iter(|| black_box(tracer.trace(&model)))
  });
  group.finish();
}

criterion_group!(
  benches,
  bench_shrinkage,
  bench_optimizer,
  bench_monte_carlo,
  bench_frontier
);
criterion_main!(benches);
