//! Expression benchmarks
//!
//! Compares untyped map inputs against registered struct types for the same
//! expression, plus compilation and cached lookups.

use cel_expr::{
    use_this_variable, variable, Activation, Env, ExprCache, NativeType, Type, TypeDescriptor,
};
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use serde::Serialize;
use serde_json::json;

const SOURCE: &str = "(current.P1.X-prev.P2.X) <= 1.0 || (current.P1.Y-prev.P2.Y) <= 1.0";

#[derive(Serialize)]
struct Point {
    #[serde(rename = "X")]
    x: f64,
    #[serde(rename = "Y")]
    y: f64,
}

impl NativeType for Point {
    fn descriptor() -> TypeDescriptor {
        TypeDescriptor::new("testdata.Point")
            .field("X", Type::Double)
            .field("Y", Type::Double)
    }
}

#[derive(Serialize)]
struct Rectangle {
    #[serde(rename = "P1")]
    p1: Point,
    #[serde(rename = "P2")]
    p2: Point,
}

impl NativeType for Rectangle {
    fn descriptor() -> TypeDescriptor {
        TypeDescriptor::new("testdata.Rectangle")
            .field("P1", Point::descriptor().as_type())
            .field("P2", Point::descriptor().as_type())
    }
}

fn rect(x1: f64, y1: f64, x2: f64, y2: f64) -> Rectangle {
    Rectangle {
        p1: Point { x: x1, y: y1 },
        p2: Point { x: x2, y: y2 },
    }
}

fn bench_eval_inputs(c: &mut Criterion) {
    let mut group = c.benchmark_group("eval_inputs");

    let map_env = Env::new([
        variable("current", Type::map(Type::String, Type::Any)),
        variable("prev", Type::map(Type::String, Type::Any)),
    ])
    .unwrap();
    let map_expr = map_env.compile(SOURCE).unwrap();
    let map_input = Activation::new()
        .bind("prev", &json!({"P1": {"X": 1.0, "Y": 2.0}, "P2": {"X": 3.0, "Y": 4.0}}))
        .unwrap()
        .bind("current", &json!({"P1": {"X": 5.0, "Y": 3.0}, "P2": {"X": 7.0, "Y": 5.0}}))
        .unwrap();

    group.bench_function(BenchmarkId::new("map", SOURCE.len()), |b| {
        b.iter(|| {
            let result = map_expr.eval(black_box(&map_input)).unwrap();
            assert_eq!(result, json!(true));
        })
    });

    let struct_env = Env::new([
        cel_expr::native_type::<Point>(),
        cel_expr::native_type::<Rectangle>(),
        variable("prev", Type::object("testdata.Rectangle")),
        variable("current", Type::object("testdata.Rectangle")),
    ])
    .unwrap();
    let struct_expr = struct_env.compile(SOURCE).unwrap();
    let struct_input = Activation::new()
        .bind("prev", &rect(1.0, 2.0, 3.0, 4.0))
        .unwrap()
        .bind("current", &rect(5.0, 3.0, 7.0, 5.0))
        .unwrap();

    group.bench_function(BenchmarkId::new("struct", SOURCE.len()), |b| {
        b.iter(|| {
            let result = struct_expr.eval(black_box(&struct_input)).unwrap();
            assert_eq!(result, json!(true));
        })
    });

    group.bench_function(BenchmarkId::new("struct_with_binding", SOURCE.len()), |b| {
        b.iter(|| {
            let input = Activation::new()
                .bind("prev", &rect(1.0, 2.0, 3.0, 4.0))
                .unwrap()
                .bind("current", &rect(5.0, 3.0, 7.0, 5.0))
                .unwrap();
            black_box(struct_expr.eval(&input).unwrap())
        })
    });

    group.finish();
}

fn bench_compile(c: &mut Criterion) {
    let env = Env::new([use_this_variable()]).unwrap();
    let sources = [
        "this.v > 1",
        "has(this.v1) && this.v1 > 0",
        "this.items.filter(x, x > 1).map(x, x * 2)",
    ];

    let mut group = c.benchmark_group("compile");
    for source in sources.iter() {
        group.bench_with_input(BenchmarkId::new("checked", source), source, |b, src| {
            b.iter(|| env.compile(black_box(src)).unwrap())
        });
    }

    let cache = ExprCache::new(env.clone());
    cache.get_or_compile(sources[1]).unwrap();
    group.bench_function("cached", |b| {
        b.iter(|| cache.get_or_compile(black_box(sources[1])).unwrap())
    });
    group.finish();
}

criterion_group!(benches, bench_eval_inputs, bench_compile);
criterion_main!(benches);
