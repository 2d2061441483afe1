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

//! End-to-end evaluation behaviour

mod common;

use common::{engine, inspect, person};
use octofhir_ognl::{EngineConfig, ExpressionBuilder, OgnlEngine, OperatorKind, Value};
use pretty_assertions::assert_eq;
use rstest::rstest;
use serde_json::json;

fn ann() -> Value {
    Value::from(json!({ "name": "Ann", "tags": ["x", "y"] }))
}

#[test]
fn test_map_scenario() {
    let engine = OgnlEngine::new();
    let root = ann();

    let mut b = ExpressionBuilder::new();
    let tags = b.property("tags");
    let one = b.constant(1);
    let index = b.index(one);
    let chain = b.sequence([tags, index]);
    let tag = b.build(chain).unwrap();
    assert_eq!(tag.to_string(), "tags[1]");
    assert_eq!(engine.get_value(&tag, &root).unwrap(), Value::from("y"));

    let mut b = ExpressionBuilder::new();
    let name = b.property("name");
    let length = b.method("length", []);
    let chain = b.sequence([name, length]);
    let length = b.build(chain).unwrap();
    assert_eq!(engine.get_value(&length, &root).unwrap(), Value::Int(3));

    let mut b = ExpressionBuilder::new();
    let name = b.property("name");
    let name = b.build(name).unwrap();
    engine.set_value(&name, &root, Value::from("Bo")).unwrap();
    assert_eq!(engine.get_value(&name, &root).unwrap(), Value::from("Bo"));
    assert_eq!(engine.get_value(&length, &root).unwrap(), Value::Int(2));
}

#[test]
fn test_constant_is_folded_across_roots() {
    let engine = OgnlEngine::new();
    let mut b = ExpressionBuilder::new();
    let answer = b.constant(42);
    let expression = b.build(answer).unwrap();

    for root in [Value::Null, ann(), Value::Int(7)] {
        assert_eq!(engine.get_value(&expression, &root).unwrap(), Value::Int(42));
    }
}

#[test]
fn test_constant_chain_ignores_later_roots() {
    let engine = OgnlEngine::new();
    let items = Value::list([Value::Int(1), Value::Int(2)]);

    let mut b = ExpressionBuilder::new();
    let list = b.constant(items.clone());
    let size = b.property("size");
    let chain = b.sequence([list, size]);
    let expression = b.build(chain).unwrap();
    assert!(expression.is_constant(expression.root()));

    assert_eq!(engine.get_value(&expression, &ann()).unwrap(), Value::Int(2));
    let Value::List(shared) = &items else {
        unreachable!()
    };
    shared.write().push(Value::Int(3));

    assert_eq!(engine.get_value(&expression, &Value::Int(1)).unwrap(), Value::Int(2));
    assert_eq!(expression.folded_value(expression.root()), Some(&Value::Int(2)));
}

#[test]
fn test_failed_evaluation_is_not_folded() {
    let engine = OgnlEngine::new();
    let mut b = ExpressionBuilder::new();
    let text = b.constant("hello");
    let missing = b.property("missing");
    let chain = b.sequence([text, missing]);
    let expression = b.build(chain).unwrap();

    assert!(engine.get_value(&expression, &Value::Null).unwrap_err().is_no_such_member());
    assert_eq!(expression.folded_value(expression.root()), None);
}

#[test]
fn test_chain_step_invoked_once() {
    let engine = engine();
    let root = person("Ann", 40);
    let friend = person("Bo", 30);
    root.as_object()
        .unwrap()
        .with_state_mut(|p: &mut common::Person| p.friend = Some(friend.clone()));

    let mut b = ExpressionBuilder::new();
    let visit = b.method("visit", []);
    let name = b.property("name");
    let chain = b.sequence([visit, name]);
    let expression = b.build(chain).unwrap();

    assert_eq!(engine.get_value(&expression, &root).unwrap(), Value::from("Bo"));
    assert_eq!(inspect(&root, |p| p.visits), 1);
    assert_eq!(engine.get_value(&expression, &root).unwrap(), Value::from("Bo"));
    assert_eq!(inspect(&root, |p| p.visits), 2);
}

#[rstest]
#[case("name", Value::from("Bo"))]
#[case("age", Value::Int(51))]
#[case("active", Value::Boolean(true))]
#[case("title", Value::from("Dr"))]
fn test_property_round_trip(#[case] property: &str, #[case] value: Value) {
    let engine = engine();
    let root = person("Ann", 40);
    let mut b = ExpressionBuilder::new();
    let node = b.property(property);
    let expression = b.build(node).unwrap();

    engine.set_value(&expression, &root, value.clone()).unwrap();
    assert_eq!(engine.get_value(&expression, &root).unwrap(), value);
}

#[test]
fn test_set_converts_to_declared_type() {
    let engine = engine();
    let root = person("Ann", 40);
    let mut b = ExpressionBuilder::new();
    let age = b.property("age");
    let expression = b.build(age).unwrap();

    engine.set_value(&expression, &root, Value::from("41")).unwrap();
    assert_eq!(inspect(&root, |p| p.age), 41);
}

#[test]
fn test_set_through_chain() {
    let engine = engine();
    let root = person("Ann", 40);
    let friend = person("Bo", 30);
    root.as_object()
        .unwrap()
        .with_state_mut(|p: &mut common::Person| p.friend = Some(friend.clone()));

    let mut b = ExpressionBuilder::new();
    let to_friend = b.property("friend");
    let name = b.property("name");
    let chain = b.sequence([to_friend, name]);
    let expression = b.build(chain).unwrap();

    engine.set_value(&expression, &root, Value::from("Cy")).unwrap();
    assert_eq!(inspect(&friend, |p| p.name.clone()), "Cy");
    assert_eq!(inspect(&root, |p| p.name.clone()), "Ann");
}

#[test]
fn test_method_call_as_assignment_target() {
    let engine = engine();
    let root = person("Ann", 40);
    let mut b = ExpressionBuilder::new();
    let nickname = b.method("nickname", []);
    let expression = b.build(nickname).unwrap();

    engine.set_value(&expression, &root, Value::from("Annie")).unwrap();
    assert_eq!(engine.get_value(&expression, &root).unwrap(), Value::from("Annie"));

    let mut b = ExpressionBuilder::new();
    let visits = b.method("visits", []);
    let expression = b.build(visits).unwrap();
    let error = engine.set_value(&expression, &root, Value::Int(3)).unwrap_err();
    assert!(error.is_inappropriate());
}

#[rstest]
#[case(Value::Int(5), "int")]
#[case(Value::from("five"), "object")]
#[case(Value::Null, "int")]
fn test_overload_precedence(#[case] argument: Value, #[case] expected: &str) {
    let engine = engine();
    let mut b = ExpressionBuilder::new();
    let argument = b.constant(argument);
    let describe = b.method("describe", [argument]);
    let expression = b.build(describe).unwrap();

    assert_eq!(
        engine.get_value(&expression, &person("Ann", 40)).unwrap(),
        Value::from(expected)
    );
}

#[test]
fn test_fixed_arity_beats_variadic() {
    let engine = engine();
    let root = person("Ann", 40);

    let mut b = ExpressionBuilder::new();
    let one = b.constant(1);
    let two = b.constant(2);
    let join = b.method("join", [one, two]);
    let expression = b.build(join).unwrap();
    assert_eq!(engine.get_value(&expression, &root).unwrap(), Value::from("fixed"));

    let mut b = ExpressionBuilder::new();
    let one = b.constant(1);
    let two = b.constant(2);
    let three = b.constant(3);
    let join = b.method("join", [one, two, three]);
    let expression = b.build(join).unwrap();
    assert_eq!(
        engine.get_value(&expression, &root).unwrap(),
        Value::from("variadic:3")
    );
}

#[rstest]
#[case(Value::Null)]
#[case(Value::Int(1))]
#[case(Value::from("text"))]
#[case(Value::from(json!({ "a": 1 })))]
fn test_read_only_nodes_reject_set(#[case] value: Value) {
    let engine = engine();
    let root = ann();

    let mut b = ExpressionBuilder::new();
    let constant = b.constant(1);
    let constant = b.build(constant).unwrap();
    assert!(engine.set_value(&constant, &root, value.clone()).unwrap_err().is_inappropriate());

    let mut b = ExpressionBuilder::new();
    let left = b.property("name");
    let right = b.constant("!");
    let sum = b.binary(OperatorKind::Add, left, right);
    let operator = b.build(sum).unwrap();
    let error = engine.set_value(&operator, &root, value).unwrap_err();
    assert!(error.is_inappropriate());
    assert_eq!(error.expression(), Some("name + \"!\""));
}

#[test]
fn test_variables_and_reserved_names() {
    let engine = engine();
    let root = ann();
    let mut ctx = engine.create_context();
    ctx.set_variable("greeting", Value::from("hi ")).unwrap();

    let mut b = ExpressionBuilder::new();
    let greeting = b.variable("greeting");
    let this_root = b.root();
    let name = b.property("name");
    let chain = b.sequence([this_root, name]);
    let sum = b.binary(OperatorKind::Add, greeting, chain);
    let expression = b.build(sum).unwrap();
    assert_eq!(
        engine.evaluate_get(&expression, &mut ctx, &root).unwrap(),
        Value::from("hi Ann")
    );

    let mut b = ExpressionBuilder::new();
    let context = b.variable("context");
    let expression = b.build(context).unwrap();
    let error = engine.evaluate_set(&expression, &mut ctx, &root, Value::Null).unwrap_err();
    assert!(error.is_inappropriate());

    let mut b = ExpressionBuilder::new();
    let root_ref = b.root();
    let expression = b.build(root_ref).unwrap();
    engine.evaluate_set(&expression, &mut ctx, &root, Value::Int(9)).unwrap();
    assert_eq!(ctx.root(), &Value::Int(9));
}

#[test]
fn test_frames_balance_with_tracing() {
    let engine = OgnlEngine::with_config(
        common::registry(),
        EngineConfig::default()
            .with_trace_evaluations(true)
            .with_keep_last_evaluation(true),
    );
    let root = person("Ann", 40);

    let mut b = ExpressionBuilder::new();
    let name = b.property("name");
    let length = b.method("length", []);
    let chain = b.sequence([name, length]);
    let ok = b.build(chain).unwrap();

    let mut b = ExpressionBuilder::new();
    let fail = b.method("fail", []);
    let failing = b.build(fail).unwrap();

    let mut ctx = engine.create_context();
    assert_eq!(engine.evaluate_get(&ok, &mut ctx, &root).unwrap(), Value::Int(3));
    let error = engine.evaluate_get(&failing, &mut ctx, &root).unwrap_err();
    assert!(error.is_invocation_failure());
    assert_eq!(error.cause().map(|cause| cause.to_string()).as_deref(), Some("boom"));

    assert_eq!(ctx.push_count(), ctx.pop_count());
    assert_eq!(ctx.stack_depth(), 0);
    let last = ctx.last_evaluation().expect("last evaluation kept");
    assert_eq!(last.node(), failing.root());
    assert!(last.error().is_some());
}

#[test]
fn test_null_handler_supplies_defaults() {
    use octofhir_ognl::NullHandler;
    use std::sync::Arc;

    struct Placeholder;

    impl NullHandler for Placeholder {
        fn null_property_value(&self, _target: &Value, property: &Value) -> Value {
            Value::from(format!("<{property}>"))
        }

        fn null_method_result(&self, _target: &Value, method: &str, _args: &[Value]) -> Value {
            Value::from(format!("<{method}()>"))
        }
    }

    let registry = common::registry();
    assert!(registry.set_null_handler("Person", Arc::new(Placeholder)));
    let engine = OgnlEngine::with_registry(registry);
    let root = person("Ann", 40);

    let mut b = ExpressionBuilder::new();
    let friend = b.property("friend");
    let expression = b.build(friend).unwrap();
    assert_eq!(engine.get_value(&expression, &root).unwrap(), Value::from("<friend>"));
}

#[test]
fn test_errors_carry_failing_node() {
    let engine = engine();
    let mut b = ExpressionBuilder::new();
    let friend = b.property("friend");
    let name = b.property("name");
    let chain = b.sequence([friend, name]);
    let expression = b.build(chain).unwrap();

    let error = engine.get_value(&expression, &person("Ann", 40)).unwrap_err();
    assert_eq!(error.node(), Some(name));
    assert_eq!(error.expression(), Some("name"));

    let mut b = ExpressionBuilder::new();
    let missing = b.property("missing");
    let expression = b.build(missing).unwrap();
    let error = engine.get_value(&expression, &person("Ann", 40)).unwrap_err();
    assert!(error.is_no_such_member());
}

#[test]
fn test_collection_methods_accept_their_receiver_as_argument() {
    let engine = OgnlEngine::new();
    let root = Value::from(json!({ "l": [[1]] }));

    // l.contains(#root.l)
    let mut b = ExpressionBuilder::new();
    let list = b.property("l");
    let this_root = b.root();
    let same_list = b.property("l");
    let argument = b.sequence([this_root, same_list]);
    let contains = b.method("contains", [argument]);
    let chain = b.sequence([list, contains]);
    let expression = b.build(chain).unwrap();
    assert_eq!(engine.get_value(&expression, &root).unwrap(), Value::Boolean(false));

    // #root.get(#root)
    let mut b = ExpressionBuilder::new();
    let argument = b.root();
    let get = b.method("get", [argument]);
    let expression = b.build(get).unwrap();
    assert_eq!(engine.get_value(&expression, &root).unwrap(), Value::Null);

    // #root.put(#root, 1) renders the key before locking the map
    let mut b = ExpressionBuilder::new();
    let key = b.root();
    let one = b.constant(1);
    let put = b.method("put", [key, one]);
    let expression = b.build(put).unwrap();
    assert_eq!(engine.get_value(&expression, &root).unwrap(), Value::Null);

    let Value::Map(map) = &root else {
        panic!("expected map, got {root:?}");
    };
    assert_eq!(map.read().get("{l=[[1]]}"), Some(&Value::Int(1)));
}
