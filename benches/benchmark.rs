use criterion::{black_box, criterion_group, criterion_main, Criterion};
use nalgebra as na;
use visual_servo::config::ServoConfig;
use visual_servo::correspondence::CorrespondenceFinder;
use visual_servo::metric::ssim;
use visual_servo::servo::{PointDepths, VelocitySolver};
use visual_servo::synthetic::translated_pair;

fn bench_velocity_solve(c: &mut Criterion) {
    let mut reference = Vec::new();
    for i in 0..20 {
        for j in 0..15 {
            reference.push(na::Vector2::new(i as f64 * 0.03 - 0.3, j as f64 * 0.03 - 0.2));
        }
    }
    let current: Vec<_> = reference.iter().map(|p| p * 1.01 + na::Vector2::new(0.004, -0.002)).collect();
    let depths = PointDepths::PerPoint(vec![1.5; reference.len()]);
    let solver = VelocitySolver::default();

    c.bench_function("velocity_solve_300", |b| {
        b.iter(|| solver.solve(black_box(&reference), black_box(&current), &depths, &depths))
    });
}

fn bench_ssim(c: &mut Criterion) {
    let pair = translated_pair(320, 240, (4, 2), 1.5, 0).unwrap();
    c.bench_function("ssim_320x240", |b| {
        b.iter(|| ssim(black_box(&pair.reference), black_box(&pair.current)))
    });
}

fn bench_correspondences(c: &mut Criterion) {
    let pair = translated_pair(320, 240, (4, 2), 1.5, 0).unwrap();
    let finder = CorrespondenceFinder::new(&ServoConfig::default()).unwrap();
    let ref_gray = image::imageops::grayscale(&pair.reference);
    let cur_gray = image::imageops::grayscale(&pair.current);
    c.bench_function("correspondences_320x240", |b| {
        b.iter(|| finder.find(black_box(&ref_gray), black_box(&cur_gray), None, &pair.camera))
    });
}

criterion_group!(benches, bench_velocity_solve, bench_ssim, bench_correspondences);
criterion_main!(benches);
