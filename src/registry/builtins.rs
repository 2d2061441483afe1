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

//! Built-in classes: `Object`, the numeric wrappers, `String`, `List`,
//! `Map` and `Array`

use indexmap::IndexMap;
use std::sync::Arc;

use super::ClassRegistry;
use super::class::{ClassDescriptor, InvocationError, Invoker};
use super::property_accessor::{ArrayAccessor, ListAccessor, MapAccessor};
use super::signature::MethodSignature;
use crate::model::{MapRef, PrimitiveKind, TypeCoercion, TypeRef, Value};

type NativeResult = Result<Value, InvocationError>;

fn native(body: impl Fn(&Value, &[Value]) -> NativeResult + Send + Sync + 'static) -> Invoker {
    Arc::new(body)
}

fn int() -> TypeRef {
    TypeRef::Primitive(PrimitiveKind::Int)
}

fn boolean() -> TypeRef {
    TypeRef::Primitive(PrimitiveKind::Boolean)
}

fn sig(name: &str, parameters: Vec<TypeRef>, return_type: TypeRef) -> MethodSignature {
    MethodSignature::new(name, parameters, return_type)
}

fn text(receiver: &Value) -> Result<&str, InvocationError> {
    receiver
        .as_str()
        .ok_or_else(|| format!("receiver {} is not a String", receiver.class_name()).into())
}

fn text_arg(args: &[Value], index: usize) -> Result<&str, InvocationError> {
    match args.get(index) {
        Some(Value::String(s)) => Ok(s),
        Some(Value::Null) | None => Err("null String argument".into()),
        Some(other) => Err(format!("expected String, got {}", other.class_name()).into()),
    }
}

fn int_arg(args: &[Value], index: usize) -> Result<i32, InvocationError> {
    match args.get(index) {
        Some(Value::Int(n)) => Ok(*n),
        _ => Err("expected int argument".into()),
    }
}

fn char_index(s: &str, index: i32) -> Result<usize, InvocationError> {
    let length = s.chars().count();
    usize::try_from(index)
        .ok()
        .filter(|&i| i <= length)
        .ok_or_else(|| format!("index {index} out of range for length {length}").into())
}

fn substring(s: &str, begin: i32, end: i32) -> NativeResult {
    let (begin, end) = (char_index(s, begin)?, char_index(s, end)?);
    if begin > end {
        return Err(format!("begin {begin} greater than end {end}").into());
    }
    Ok(Value::String(s.chars().skip(begin).take(end - begin).collect()))
}

fn char_position(haystack: &str, needle: &str) -> i32 {
    haystack
        .find(needle)
        .map_or(-1, |byte| haystack[..byte].chars().count() as i32)
}

fn object_class() -> ClassDescriptor {
    ClassDescriptor::new("Object")
        .with_method(
            sig("toString", vec![], TypeRef::String),
            native(|receiver, _| Ok(Value::String(TypeCoercion::string_value(receiver)))),
        )
        .with_method(
            sig("equals", vec![TypeRef::Object], boolean()),
            native(|receiver, args| Ok(Value::Boolean(args.first() == Some(receiver)))),
        )
}

fn number_class() -> ClassDescriptor {
    let conversion = |name: &str, kind: PrimitiveKind| {
        (
            sig(name, vec![], TypeRef::Primitive(kind)),
            native(move |receiver, _| Ok(TypeCoercion::coerce_to_primitive(receiver, kind)?)),
        )
    };
    [
        conversion("intValue", PrimitiveKind::Int),
        conversion("longValue", PrimitiveKind::Long),
        conversion("floatValue", PrimitiveKind::Float),
        conversion("doubleValue", PrimitiveKind::Double),
    ]
    .into_iter()
    .fold(ClassDescriptor::new("Number"), |class, (signature, invoker)| {
        class.with_method(signature, invoker)
    })
}

fn string_class() -> ClassDescriptor {
    let string = || TypeRef::String;
    ClassDescriptor::new("String")
        .with_method(
            sig("length", vec![], int()),
            native(|r, _| Ok(Value::Int(text(r)?.chars().count() as i32))),
        )
        .with_method(
            sig("isEmpty", vec![], boolean()),
            native(|r, _| Ok(Value::Boolean(text(r)?.is_empty()))),
        )
        .with_method(
            sig("charAt", vec![int()], TypeRef::Primitive(PrimitiveKind::Char)),
            native(|r, args| {
                let (s, index) = (text(r)?, int_arg(args, 0)?);
                usize::try_from(index)
                    .ok()
                    .and_then(|i| s.chars().nth(i))
                    .map(Value::Char)
                    .ok_or_else(|| format!("index {index} out of range").into())
            }),
        )
        .with_method(
            sig("substring", vec![int()], string()),
            native(|r, args| {
                let s = text(r)?;
                substring(s, int_arg(args, 0)?, s.chars().count() as i32)
            }),
        )
        .with_method(
            sig("substring", vec![int(), int()], string()),
            native(|r, args| substring(text(r)?, int_arg(args, 0)?, int_arg(args, 1)?)),
        )
        .with_method(
            sig("indexOf", vec![string()], int()),
            native(|r, args| Ok(Value::Int(char_position(text(r)?, text_arg(args, 0)?)))),
        )
        .with_method(
            sig("contains", vec![string()], boolean()),
            native(|r, args| Ok(Value::Boolean(text(r)?.contains(text_arg(args, 0)?)))),
        )
        .with_method(
            sig("startsWith", vec![string()], boolean()),
            native(|r, args| Ok(Value::Boolean(text(r)?.starts_with(text_arg(args, 0)?)))),
        )
        .with_method(
            sig("endsWith", vec![string()], boolean()),
            native(|r, args| Ok(Value::Boolean(text(r)?.ends_with(text_arg(args, 0)?)))),
        )
        .with_method(
            sig("toUpperCase", vec![], string()),
            native(|r, _| Ok(Value::String(text(r)?.to_uppercase()))),
        )
        .with_method(
            sig("toLowerCase", vec![], string()),
            native(|r, _| Ok(Value::String(text(r)?.to_lowercase()))),
        )
        .with_method(
            sig("trim", vec![], string()),
            native(|r, _| Ok(Value::from(text(r)?.trim()))),
        )
        .with_method(
            sig("concat", vec![string()], string()),
            native(|r, args| Ok(Value::String(format!("{}{}", text(r)?, text_arg(args, 0)?)))),
        )
        .with_method(
            sig("split", vec![string()], TypeRef::array_of(string())),
            native(|r, args| {
                let parts = text(r)?.split(text_arg(args, 0)?).map(Value::from);
                Ok(Value::array(TypeRef::String, parts))
            }),
        )
        .with_method(
            sig("equals", vec![TypeRef::Object], boolean()),
            native(|r, args| Ok(Value::Boolean(args.first() == Some(r)))),
        )
}

/// Read-only list method; the receiver is read-locked while `body` runs
fn reading_list(body: fn(&[Value], &[Value]) -> NativeResult) -> Invoker {
    native(move |receiver, args| match receiver {
        Value::List(list) => body(&list.read_recursive(), args),
        other => Err(format!("receiver {} is not a List", other.class_name()).into()),
    })
}

/// Mutating list method; arguments are prepared before the write lock is taken
fn writing_list(body: fn(&mut Vec<Value>, &[Value]) -> NativeResult) -> Invoker {
    native(move |receiver, args| match receiver {
        Value::List(list) => body(&mut list.write(), args),
        other => Err(format!("receiver {} is not a List", other.class_name()).into()),
    })
}

fn list_class() -> ClassDescriptor {
    ClassDescriptor::new("List")
        .with_accessor(Arc::new(ListAccessor))
        .with_method(
            sig("size", vec![], int()),
            reading_list(|list, _| Ok(Value::Int(list.len() as i32))),
        )
        .with_method(
            sig("isEmpty", vec![], boolean()),
            reading_list(|list, _| Ok(Value::Boolean(list.is_empty()))),
        )
        .with_method(
            sig("get", vec![int()], TypeRef::Object),
            reading_list(|list, args| {
                let index = int_arg(args, 0)?;
                usize::try_from(index)
                    .ok()
                    .and_then(|i| list.get(i).cloned())
                    .ok_or_else(|| format!("index {index} out of bounds for length {}", list.len()).into())
            }),
        )
        .with_method(
            sig("contains", vec![TypeRef::Object], boolean()),
            reading_list(|list, args| Ok(Value::Boolean(list.contains(&args[0])))),
        )
        .with_method(
            sig("indexOf", vec![TypeRef::Object], int()),
            reading_list(|list, args| {
                Ok(Value::Int(list.iter().position(|v| *v == args[0]).map_or(-1, |i| i as i32)))
            }),
        )
        .with_method(
            sig("add", vec![TypeRef::Object], boolean()),
            writing_list(|list, args| {
                list.push(args[0].clone());
                Ok(Value::Boolean(true))
            }),
        )
        .with_method(
            sig("set", vec![int(), TypeRef::Object], TypeRef::Object),
            writing_list(|list, args| {
                let index = int_arg(args, 0)?;
                let length = list.len();
                let slot = usize::try_from(index)
                    .ok()
                    .and_then(|i| list.get_mut(i))
                    .ok_or_else(|| format!("index {index} out of bounds for length {length}"))?;
                Ok(std::mem::replace(slot, args[1].clone()))
            }),
        )
}

fn map_key(args: &[Value]) -> String {
    TypeCoercion::string_value(&args[0])
}

fn map_ref(receiver: &Value) -> Result<&MapRef, InvocationError> {
    match receiver {
        Value::Map(map) => Ok(map),
        other => Err(format!("receiver {} is not a Map", other.class_name()).into()),
    }
}

/// Read-only map method; the receiver is read-locked while `body` runs
fn reading_map(body: fn(&IndexMap<String, Value>, &[Value]) -> NativeResult) -> Invoker {
    native(move |receiver, args| body(&map_ref(receiver)?.read_recursive(), args))
}

fn map_class() -> ClassDescriptor {
    ClassDescriptor::new("Map")
        .with_accessor(Arc::new(MapAccessor))
        .with_method(
            sig("size", vec![], int()),
            reading_map(|map, _| Ok(Value::Int(map.len() as i32))),
        )
        .with_method(
            sig("isEmpty", vec![], boolean()),
            reading_map(|map, _| Ok(Value::Boolean(map.is_empty()))),
        )
        .with_method(
            sig("get", vec![TypeRef::Object], TypeRef::Object),
            reading_map(|map, args| Ok(map.get(&map_key(args)).cloned().unwrap_or_default())),
        )
        .with_method(
            sig("containsKey", vec![TypeRef::Object], boolean()),
            reading_map(|map, args| Ok(Value::Boolean(map.contains_key(&map_key(args))))),
        )
        .with_method(
            sig("put", vec![TypeRef::Object, TypeRef::Object], TypeRef::Object),
            native(|receiver, args| {
                let map = map_ref(receiver)?;
                let key = map_key(args);
                Ok(map.write().insert(key, args[1].clone()).unwrap_or_default())
            }),
        )
        .with_method(
            sig("remove", vec![TypeRef::Object], TypeRef::Object),
            native(|receiver, args| {
                let map = map_ref(receiver)?;
                let key = map_key(args);
                Ok(map.write().shift_remove(&key).unwrap_or_default())
            }),
        )
        .with_method(
            sig("keySet", vec![], TypeRef::List),
            reading_map(|map, _| Ok(Value::list(map.keys().map(|k| Value::from(k.as_str()))))),
        )
        .with_method(
            sig("values", vec![], TypeRef::List),
            reading_map(|map, _| Ok(Value::list(map.values().cloned()))),
        )
}

pub(super) fn register_builtins(registry: &ClassRegistry) {
    registry.register(object_class());
    registry.register(number_class());
    for kind in [
        PrimitiveKind::Byte,
        PrimitiveKind::Short,
        PrimitiveKind::Int,
        PrimitiveKind::Long,
        PrimitiveKind::Float,
        PrimitiveKind::Double,
    ] {
        registry.register(ClassDescriptor::new(kind.wrapper_name()).extends("Number"));
    }
    registry.register(ClassDescriptor::new("BigInteger").extends("Number"));
    registry.register(ClassDescriptor::new("BigDecimal").extends("Number"));
    registry.register(ClassDescriptor::new("Boolean").with_method(
        sig("booleanValue", vec![], boolean()),
        native(|receiver, _| Ok(Value::Boolean(TypeCoercion::boolean_value(receiver)))),
    ));
    registry.register(ClassDescriptor::new("Character").with_method(
        sig("charValue", vec![], TypeRef::Primitive(PrimitiveKind::Char)),
        native(|receiver, _| Ok(Value::Char(TypeCoercion::char_value(receiver)?))),
    ));
    registry.register(string_class());
    registry.register(list_class());
    registry.register(map_class());
    registry.register(ClassDescriptor::new("Array").with_accessor(Arc::new(ArrayAccessor)));
}
