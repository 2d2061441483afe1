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

//! Shared fixtures for integration tests

#![allow(dead_code)]

use octofhir_ognl::model::{PrimitiveKind, TypeCoercion};
use octofhir_ognl::{ClassBuilder, ClassRegistry, MethodSignature, OgnlEngine, TypeRef, Value};
use std::sync::Arc;

/// Registered as class `Person`
#[derive(Debug, Default)]
pub struct Person {
    pub name: String,
    pub age: i32,
    pub active: bool,
    pub title: String,
    pub nickname: String,
    pub visits: i32,
    pub friend: Option<Value>,
}

pub fn int() -> TypeRef {
    TypeRef::Primitive(PrimitiveKind::Int)
}

pub fn boolean() -> TypeRef {
    TypeRef::Primitive(PrimitiveKind::Boolean)
}

/// Registry with the built-in classes plus `Person`
pub fn registry() -> Arc<ClassRegistry> {
    let registry = Arc::new(ClassRegistry::new());
    registry.register(
        ClassBuilder::<Person>::new("Person")
            .property(
                "name",
                TypeRef::String,
                |p| Value::from(p.name.as_str()),
                |p, v| p.name = TypeCoercion::string_value(&v),
            )
            .property(
                "age",
                int(),
                |p| Value::Int(p.age),
                |p, v| p.age = TypeCoercion::long_value(&v).unwrap_or_default() as i32,
            )
            .property(
                "active",
                boolean(),
                |p| Value::Boolean(p.active),
                |p, v| p.active = TypeCoercion::boolean_value(&v),
            )
            .property(
                "friend",
                TypeRef::class("Person"),
                |p| p.friend.clone().unwrap_or_default(),
                |p, v| p.friend = (!v.is_null()).then_some(v),
            )
            .method(MethodSignature::new("getTitle", vec![], TypeRef::String), |p, _| {
                Ok(Value::from(p.title.as_str()))
            })
            .method_mut(MethodSignature::new("setTitle", vec![TypeRef::String], TypeRef::Void), |p, args| {
                p.title = TypeCoercion::string_value(&args[0]);
                Ok(Value::Null)
            })
            .method(MethodSignature::new("nickname", vec![], TypeRef::String), |p, _| {
                Ok(Value::from(p.nickname.as_str()))
            })
            .method_mut(
                MethodSignature::new("setNickname", vec![TypeRef::String], TypeRef::Void),
                |p, args| {
                    p.nickname = TypeCoercion::string_value(&args[0]);
                    Ok(Value::Null)
                },
            )
            .method_mut(MethodSignature::new("visit", vec![], TypeRef::class("Person")), |p, _| {
                p.visits += 1;
                Ok(p.friend.clone().unwrap_or_default())
            })
            .method(MethodSignature::new("visits", vec![], int()), |p, _| Ok(Value::Int(p.visits)))
            .method(MethodSignature::new("describe", vec![TypeRef::Object], TypeRef::String), |_, _| {
                Ok(Value::from("object"))
            })
            .method(
                MethodSignature::new("describe", vec![TypeRef::Boxed(PrimitiveKind::Int)], TypeRef::String),
                |_, _| Ok(Value::from("int")),
            )
            .method(
                MethodSignature::variadic("join", vec![TypeRef::Object], TypeRef::String),
                |_, args| {
                    let packed = args[0].elements().map_or(0, |items| items.len());
                    Ok(Value::from(format!("variadic:{packed}")))
                },
            )
            .method(
                MethodSignature::new("join", vec![TypeRef::Object, TypeRef::Object], TypeRef::String),
                |_, _| Ok(Value::from("fixed")),
            )
            .method(MethodSignature::new("fail", vec![], TypeRef::Void), |_, _| {
                Err("boom".into())
            })
            .build(),
    );
    registry
}

pub fn engine() -> OgnlEngine {
    OgnlEngine::with_registry(registry())
}

pub fn person(name: &str, age: i32) -> Value {
    Value::object(
        "Person",
        Person {
            name: name.to_string(),
            age,
            ..Person::default()
        },
    )
}

/// Read a field of a `Person` value directly
pub fn inspect<R>(value: &Value, f: impl FnOnce(&Person) -> R) -> R {
    value
        .as_object()
        .and_then(|object| object.with_state(f))
        .expect("value is a Person")
}
