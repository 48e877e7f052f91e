use chrono::NaiveDate;
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use infra_screen::algo::similarity;
use infra_screen::flags::compute_flags;
use infra_screen::{matching, prepare, FlagThresholds, ScreeningConfig, Table};
use serde_json::{json, Value};

/// Generate synthetic project records spread over a handful of areas and years
fn generate_records(n: usize) -> Vec<Value> {
    let works = [
        "Construction of Flood Control Structure Along",
        "Rehabilitation of Bridge at",
        "Concreting of Farm-to-Market Road in",
        "Repair of School Building in",
        "Desilting of Drainage Canal at",
    ];
    let places = [
        "Santa Cruz River", "Barangay Mabini", "Poblacion", "San Isidro", "Pampanga Delta",
        "Rizal Street", "Laguna Lakeshore", "Bagumbayan",
    ];
    let regions = ["Region I", "Region III", "Region IV-A", "Region VII"];
    (0..n)
        .map(|i| {
            json!({
                "Project Description": format!(
                    "{} {} Phase {}",
                    works[i % works.len()],
                    places[(i / works.len()) % places.len()],
                    i % 4 + 1
                ),
                "Contractor": format!("Builder {}", i % 37),
                "Region": regions[i % regions.len()],
                "Province": format!("Province {}", i % 11),
                "Year": 2020 + (i % 5) as i32,
                "Contract Amount": 1_000_000.0 + (i * 7919 % 100_000) as f64 * 100.0,
                "Length": 0.5 + (i % 13) as f64 * 0.25,
                "Status": if i % 3 == 0 { "Completed" } else { "Ongoing" },
                "Start Date": format!("{}-0{}-15", 2020 + (i % 5), i % 9 + 1),
            })
        })
        .collect()
}

fn config() -> ScreeningConfig {
    ScreeningConfig {
        as_of: NaiveDate::from_ymd_opt(2024, 6, 30),
        ..Default::default()
    }
}

fn bench_similarity(c: &mut Criterion) {
    let a = "Construction of Flood Control Structure Along Santa Cruz River Phase 1";
    let b = "Flood Control Structure Santa Cruz River (Phase 2)";
    c.bench_function("similarity/composite", |bench| {
        bench.iter(|| similarity::composite(black_box(a), black_box(b)))
    });
    c.bench_function("similarity/token_set_ratio", |bench| {
        bench.iter(|| similarity::token_set_ratio(black_box(a), black_box(b)))
    });
}

fn bench_preprocess(c: &mut Criterion) {
    let mut group = c.benchmark_group("preprocess");
    for size in [1000, 5000] {
        let table = Table::from_records(&generate_records(size)).unwrap();
        group.bench_with_input(BenchmarkId::from_parameter(size), &table, |b, t| {
            b.iter(|| black_box(prepare(t, &config()).unwrap()))
        });
    }
    group.finish();
}

fn bench_flags(c: &mut Criterion) {
    let mut group = c.benchmark_group("flags");
    for size in [1000, 5000] {
        let table = Table::from_records(&generate_records(size)).unwrap();
        let prepared = prepare(&table, &config()).unwrap();
        group.bench_with_input(BenchmarkId::from_parameter(size), &prepared, |b, p| {
            b.iter(|| black_box(compute_flags(p, &FlagThresholds::default())))
        });
    }
    group.finish();
}

fn bench_matching(c: &mut Criterion) {
    let mut group = c.benchmark_group("matching");
    group.sample_size(10);
    for size in [500, 2000] {
        let base = prepare(&Table::from_records(&generate_records(size)).unwrap(), &config()).unwrap();
        let ledger =
            prepare(&Table::from_records(&generate_records(size / 2)).unwrap(), &config()).unwrap();
        group.bench_with_input(BenchmarkId::from_parameter(size), &size, |b, _| {
            b.iter(|| black_box(matching::match_datasets(&base, &ledger)))
        });
    }
    group.finish();
}

criterion_group!(
    benches,
    bench_similarity,
    bench_preprocess,
    bench_flags,
    bench_matching,
);
criterion_main!(benches);
