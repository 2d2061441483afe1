// Copyright 2024 OctoFHIR Team
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Evaluation benchmark
//! Interpreted navigation against folded constants, with and without the resolution cache

use criterion::{BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};
use octofhir_ognl::{ClassRegistry, EngineConfig, Expression, ExpressionBuilder, OgnlEngine, OperatorKind, Value};
use serde_json::json;
use std::hint::black_box;
use std::sync::Arc;

fn root() -> Value {
    Value::from(json!({
        "name": "Ann",
        "tags": ["x", "y", "z"],
        "address": { "city": "Oslo", "zip": 1234 },
    }))
}

/// `address.city.length()`
fn navigation() -> Expression {
    let mut b = ExpressionBuilder::new();
    let address = b.property("address");
    let city = b.property("city");
    let length = b.method("length", []);
    let chain = b.sequence([address, city, length]);
    b.build(chain).unwrap()
}

/// `tags[1] + name`
fn mixed() -> Expression {
    let mut b = ExpressionBuilder::new();
    let tags = b.property("tags");
    let one = b.constant(1);
    let index = b.index(one);
    let chain = b.sequence([tags, index]);
    let name = b.property("name");
    let sum = b.binary(OperatorKind::Add, chain, name);
    b.build(sum).unwrap()
}

/// `(2 * 21 + 1) * 3`, folded after the first evaluation
fn constant() -> Expression {
    let mut b = ExpressionBuilder::new();
    let two = b.constant(2);
    let factor = b.constant(21);
    let product = b.binary(OperatorKind::Multiply, two, factor);
    let one = b.constant(1);
    let sum = b.binary(OperatorKind::Add, product, one);
    let three = b.constant(3);
    let result = b.binary(OperatorKind::Multiply, sum, three);
    b.build(result).unwrap()
}

fn bench_evaluation(c: &mut Criterion) {
    let mut group = c.benchmark_group("evaluate");
    group.throughput(Throughput::Elements(1));

    let root = root();
    let cases = [("navigation", navigation()), ("mixed", mixed()), ("constant", constant())];
    let engines = [
        ("cached", OgnlEngine::new()),
        (
            "uncached",
            OgnlEngine::with_config(
                Arc::new(ClassRegistry::new()),
                EngineConfig::default().with_resolution_cache(false),
            ),
        ),
    ];

    for (engine_name, engine) in &engines {
        for (case, expression) in &cases {
            group.bench_with_input(BenchmarkId::new(*engine_name, case), expression, |b, expression| {
                b.iter(|| black_box(engine.get_value(expression, black_box(&root))))
            });
        }
    }

    group.finish();
}

fn bench_traced(c: &mut Criterion) {
    let mut group = c.benchmark_group("traced");
    let root = root();
    let expression = navigation();
    let engine = OgnlEngine::with_config(
        Arc::new(ClassRegistry::new()),
        EngineConfig::default().with_trace_evaluations(true),
    );

    group.bench_function("navigation", |b| {
        b.iter(|| black_box(engine.get_value(&expression, black_box(&root))))
    });
    group.finish();
}

criterion_group!(benches, bench_evaluation, bench_traced);
criterion_main!(benches);
