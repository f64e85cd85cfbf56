//! # Path Planner Benchmark

use criterion::{black_box, criterion_group, criterion_main, Criterion};

use car_lib::{
    geo::BoundingBox,
    map::GridMap,
    nav::{PathPlanner, PathPlannerParams},
};

const SIZE: usize = 100;
const CELL: f64 = 0.00001;

fn path_planner_benchmark(c: &mut Criterion) {
    // ---- Build a walled map ----

    // Every 10th row is a wall with a single gap, alternating between the ends, so the path has to
    // snake across the whole map
    let rows: Vec<String> = (0..SIZE)
        .map(|x| {
            if x % 10 != 5 {
                return " ".repeat(SIZE);
            }

            let mut row: Vec<char> = "#".repeat(SIZE).chars().collect();
            if (x / 10) % 2 == 0 {
                row[SIZE - 1] = ' ';
            } else {
                row[0] = ' ';
            }
            row.into_iter().collect()
        })
        .collect();

    let span = CELL * (SIZE - 1) as f64;
    let bbox = BoundingBox::new(0.0, span, span, 0.0).unwrap();
    let map = GridMap::parse(&rows.join("\n"), bbox, CELL).unwrap();

    let origin = map.xy_to_geo(&(0, 0).into());
    let destination = map.xy_to_geo(&((SIZE - 1) as i32, (SIZE - 1) as i32).into());

    let planner = PathPlanner::new(PathPlannerParams::default());

    // ---- Benchmark ----

    c.bench_function("path_planner::find_path", |b| {
        b.iter(|| {
            planner
                .find_path(black_box(&map), black_box(&origin), black_box(&destination))
                .unwrap()
        })
    });

    c.bench_function("path_planner::turn_points", |b| {
        let path = planner.find_path(&map, &origin, &destination).unwrap();
        b.iter(|| black_box(&path).turn_points())
    });
}

criterion_group!(benches, path_planner_benchmark);
criterion_main!(benches);
