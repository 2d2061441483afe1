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

//! Accessor source emission
//!
//! The emitter walks an expression the way the interpreter does, against
//! a sample root, and writes down the member each node resolved to. The
//! sample values drive member resolution, so emitting source runs the
//! same getters and methods an evaluation would.
//!
//! Fragment syntax:
//!
//! | construct              | fragment                                   |
//! |------------------------|--------------------------------------------|
//! | root / receiver        | `$root`, the receiver's fragment           |
//! | assigned value         | `$value`                                   |
//! | variable               | `#name`                                    |
//! | cast                   | `((Type) expr)`                            |
//! | declared member        | `Owner::member(recv, args...)`             |
//! | dynamic property       | `OgnlRuntime::getProperty(recv, key)`      |
//! | primitive parameter    | `OgnlOps::convertValue(expr, int)`         |
//! | array parameter        | `OgnlOps::toArray(expr, Element)`          |
//! | operator               | `OgnlOps::add(a, b)`                       |

use log::debug;

use super::accessor::AccessorSource;
use crate::ast::{Expression, NodeId, NodeKind, OperatorKind};
use crate::error::{OgnlError, Result};
use crate::evaluator::{CONTEXT_VARIABLE, OgnlContext, ROOT_VARIABLE, operations};
use crate::model::{PrimitiveKind, TypeCoercion, TypeRef, Value};

/// Source emitted for one node, with the sample value it produced
#[derive(Debug, Clone)]
pub struct Fragment {
    pub code: String,
    pub value: Value,
    /// Static type of `code`; `None` when only known to be an object
    pub ty: Option<TypeRef>,
}

impl Fragment {
    fn new(code: impl Into<String>, value: Value, ty: Option<TypeRef>) -> Self {
        Self {
            code: code.into(),
            value,
            ty,
        }
    }

    /// Fragment with the value's runtime type
    fn sampled(code: impl Into<String>, value: Value) -> Self {
        let ty = value.runtime_type();
        Self::new(code, value, ty)
    }
}

fn capitalize(name: &str) -> String {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// Setter member paired with a property or bean method name
fn setter_member(member: &str) -> String {
    let is_setter = member
        .strip_prefix("set")
        .and_then(|rest| rest.chars().next())
        .is_some_and(char::is_uppercase);
    if is_setter {
        member.to_string()
    } else {
        format!("set{}", capitalize(member))
    }
}

/// Emits getter and setter source for an expression
#[derive(Debug, Clone, Copy)]
pub struct SourceEmitter<'e> {
    expression: &'e Expression,
}

impl<'e> SourceEmitter<'e> {
    pub fn new(expression: &'e Expression) -> Self {
        Self { expression }
    }

    /// Emit the accessor source for the whole expression against `sample_root`
    ///
    /// Getter emission failures are returned. A setter that cannot be
    /// emitted leaves `set_source` empty.
    pub fn emit(&self, ctx: &mut OgnlContext, sample_root: &Value) -> Result<AccessorSource> {
        ctx.set_root(sample_root.clone());
        ctx.set_current_type(None);
        let root = self.root_fragment(ctx);
        let id = self.expression.root();

        let get = self.to_get_source(ctx, id, &root)?;
        let set_source = match self.to_set_source(ctx, id, &root) {
            Ok(code) => Some(code),
            Err(error) => {
                debug!("no setter source for {}: {error}", self.expression);
                None
            }
        };

        Ok(AccessorSource {
            get_source: get.code,
            set_source,
            root_type: sample_root.runtime_type().unwrap_or(TypeRef::Object),
        })
    }

    fn root_fragment(&self, ctx: &OgnlContext) -> Fragment {
        Fragment::sampled("$root", ctx.root().clone())
    }

    /// Getter fragment of node `id` applied to `receiver`
    pub fn to_get_source(&self, ctx: &mut OgnlContext, id: NodeId, receiver: &Fragment) -> Result<Fragment> {
        let fragment = self
            .get_fragment(ctx, id, receiver)
            .and_then(|fragment| self.required(id, fragment))
            .map_err(|error| error.at_node(id, || self.expression.render(id)))?;
        ctx.set_current_type(fragment.ty.clone());
        Ok(fragment)
    }

    /// Setter statement assigning `$value` through node `id` on `receiver`
    pub fn to_set_source(&self, ctx: &mut OgnlContext, id: NodeId, receiver: &Fragment) -> Result<String> {
        self.set_fragment(ctx, id, receiver)
            .map_err(|error| error.at_node(id, || self.expression.render(id)))
    }

    /// Navigation nodes must produce source
    fn required(&self, id: NodeId, fragment: Fragment) -> Result<Fragment> {
        let navigates = matches!(
            self.expression.kind(id),
            NodeKind::PropertyRef | NodeKind::IndexedRef | NodeKind::MethodCall { .. } | NodeKind::Sequence
        );
        if navigates && fragment.code.trim().is_empty() {
            return Err(OgnlError::unsupported(format!(
                "no source could be emitted for {} '{}'",
                self.expression.kind(id).name(),
                self.expression.render(id)
            )));
        }
        Ok(fragment)
    }

    fn get_fragment(&self, ctx: &mut OgnlContext, id: NodeId, receiver: &Fragment) -> Result<Fragment> {
        let children = self.expression.children(id);
        match self.expression.kind(id) {
            NodeKind::Constant(value) => Ok(Fragment::sampled(self.expression.render(id), value.clone())),
            NodeKind::RootRef => Ok(self.root_fragment(ctx)),
            NodeKind::ThisRef => Ok(receiver.clone()),
            NodeKind::ContextVarRef { name } => Ok(Fragment::sampled(format!("#{name}"), ctx.variable(name))),
            NodeKind::PropertyRef | NodeKind::IndexedRef => self.property_get(ctx, children, receiver),
            NodeKind::MethodCall { name } => self.method_get(ctx, name, children, receiver),
            NodeKind::Operator(op) => self.operator_get(ctx, *op, children, receiver),
            NodeKind::Sequence => {
                let mut current = receiver.clone();
                for &step in children {
                    current = self.to_get_source(ctx, step, &current)?;
                }
                Ok(current)
            }
            NodeKind::ListLiteral => {
                let items = children
                    .iter()
                    .map(|&item| self.to_get_source(ctx, item, receiver))
                    .collect::<Result<Vec<_>>>()?;
                let code = format!("OgnlOps::list({})", join(items.iter().map(|item| item.code.clone())));
                let value = Value::list(items.into_iter().map(|item| item.value));
                Ok(Fragment::new(code, value, Some(TypeRef::List)))
            }
            NodeKind::Assign => Err(OgnlError::unsupported("assignments cannot be compiled")),
        }
    }

    fn key_fragment(&self, ctx: &mut OgnlContext, children: &[NodeId]) -> Result<Fragment> {
        let root = self.root_fragment(ctx);
        match children.first() {
            Some(&key) => self.to_get_source(ctx, key, &root),
            None => Err(OgnlError::inappropriate("property access without a key")),
        }
    }

    fn argument_fragments(&self, ctx: &mut OgnlContext, children: &[NodeId]) -> Result<Vec<Fragment>> {
        let root = self.root_fragment(ctx);
        children
            .iter()
            .map(|&arg| self.to_get_source(ctx, arg, &root))
            .collect()
    }

    fn property_get(&self, ctx: &mut OgnlContext, children: &[NodeId], receiver: &Fragment) -> Result<Fragment> {
        let key = self.key_fragment(ctx, children)?;
        if receiver.value.is_null() {
            return Err(OgnlError::null_source("get", TypeCoercion::string_value(&key.value)));
        }

        let resolver = ctx.resolver().clone();
        let (mut value, resolution) = resolver.read_property(&receiver.value, &key.value)?;
        if value.is_null() {
            value = resolver
                .null_handler(&receiver.value)
                .null_property_value(&receiver.value, &key.value);
        }

        let code = if resolution.dynamic {
            format!("OgnlRuntime::getProperty({}, {})", receiver.code, key.code)
        } else {
            let owner = TypeRef::class(&*resolution.owner);
            format!(
                "{}::{}({})",
                resolution.owner,
                resolution.member,
                self.cast(ctx, receiver, &owner)
            )
        };
        Ok(Fragment::new(code, value, Some(resolution.ty)))
    }

    fn method_get(
        &self,
        ctx: &mut OgnlContext,
        name: &str,
        children: &[NodeId],
        receiver: &Fragment,
    ) -> Result<Fragment> {
        let args = self.argument_fragments(ctx, children)?;
        if receiver.value.is_null() {
            return Err(OgnlError::null_source("call", name));
        }

        let resolver = ctx.resolver().clone();
        let values: Vec<Value> = args.iter().map(|arg| arg.value.clone()).collect();
        let method = resolver.resolve_method(&receiver.value, name, &values)?;
        if method.is_variadic() {
            return Err(OgnlError::unsupported(format!(
                "variadic method {}.{} cannot be compiled",
                method.owner,
                method.signature()
            )));
        }

        let owner = TypeRef::class(&*method.owner);
        let mut parts = vec![self.cast(ctx, receiver, &owner)];
        for (arg, parameter) in args.iter().zip(&method.signature().parameters) {
            parts.push(self.convert(ctx, arg, parameter));
        }

        let mut value = resolver.invoke(&method, &receiver.value, &values)?;
        if value.is_null() {
            value = resolver
                .null_handler(&receiver.value)
                .null_method_result(&receiver.value, name, &values);
        }

        let code = format!("{}::{}({})", method.owner, name, join(parts));
        Ok(Fragment::new(code, value, Some(method.return_type().clone())))
    }

    fn operator_get(
        &self,
        ctx: &mut OgnlContext,
        op: OperatorKind,
        operands: &[NodeId],
        receiver: &Fragment,
    ) -> Result<Fragment> {
        let operands = operands
            .iter()
            .map(|&operand| self.to_get_source(ctx, operand, receiver))
            .collect::<Result<Vec<_>>>()?;
        let values: Vec<Value> = operands.iter().map(|operand| operand.value.clone()).collect();

        let (code, value) = match op {
            OperatorKind::Conditional => {
                let [test, then, otherwise] = operands.as_slice() else {
                    return Err(OgnlError::inappropriate("conditional needs three operands"));
                };
                let chosen = if TypeCoercion::boolean_value(&test.value) {
                    then
                } else {
                    otherwise
                };
                let code = format!(
                    "(OgnlOps::booleanValue({}) ? {} : {})",
                    test.code, then.code, otherwise.code
                );
                // Static type of `?:` is the join of both branches
                let ty = match (&then.ty, &otherwise.ty) {
                    (Some(a), Some(b)) => Some(TypeCoercion::best_matching_type(
                        &[a.clone(), b.clone()],
                        &**ctx.registry(),
                    )),
                    _ => None,
                };
                return Ok(Fragment::new(code, chosen.value.clone(), ty));
            }
            OperatorKind::And | OperatorKind::Or => {
                let decisive = op == OperatorKind::Or;
                let value = values
                    .iter()
                    .find(|value| TypeCoercion::boolean_value(value) == decisive)
                    .or(values.last())
                    .cloned()
                    .unwrap_or_default();
                (self.fold_calls(op, &operands), value)
            }
            _ => (self.fold_calls(op, &operands), operations::apply(op, &values)?),
        };

        let ty = if op.is_predicate() {
            Some(TypeRef::Boxed(PrimitiveKind::Boolean))
        } else {
            value.runtime_type()
        };
        Ok(Fragment::new(code, value, ty))
    }

    /// `OgnlOps::op(a, b)` calls, nested left to right for longer chains
    fn fold_calls(&self, op: OperatorKind, operands: &[Fragment]) -> String {
        let helper = op.helper_name();
        let mut codes = operands.iter().map(|operand| operand.code.as_str());
        let first = codes.next().unwrap_or_default();
        if op.is_unary() {
            return format!("OgnlOps::{helper}({first})");
        }
        codes.fold(first.to_string(), |accumulated, next| {
            format!("OgnlOps::{helper}({accumulated}, {next})")
        })
    }

    fn set_fragment(&self, ctx: &mut OgnlContext, id: NodeId, receiver: &Fragment) -> Result<String> {
        let children = self.expression.children(id);
        match self.expression.kind(id) {
            NodeKind::RootRef => Ok("$root = $value".to_string()),
            NodeKind::ContextVarRef { name } => {
                if matches!(&**name, ROOT_VARIABLE | CONTEXT_VARIABLE) {
                    return Err(OgnlError::inappropriate(format!(
                        "#{name} is reserved and cannot be assigned"
                    )));
                }
                Ok(format!("#{name} = $value"))
            }
            NodeKind::PropertyRef | NodeKind::IndexedRef => self.property_set(ctx, children, receiver),
            NodeKind::Sequence => {
                let Some((&last, init)) = children.split_last() else {
                    return Err(OgnlError::inappropriate("cannot assign to an empty chain"));
                };
                let mut current = receiver.clone();
                for &step in init {
                    current = self.to_get_source(ctx, step, &current)?;
                }
                self.to_set_source(ctx, last, &current)
            }
            NodeKind::MethodCall { name } => self.method_set(ctx, name, children, receiver),
            kind => Err(OgnlError::inappropriate(format!(
                "cannot assign to {} '{}'",
                kind.name(),
                self.expression.render(id)
            ))),
        }
    }

    fn property_set(&self, ctx: &mut OgnlContext, children: &[NodeId], receiver: &Fragment) -> Result<String> {
        let key = self.key_fragment(ctx, children)?;
        if key.code.trim().is_empty() {
            return Err(OgnlError::unsupported("property key produced no source"));
        }
        if receiver.value.is_null() {
            return Err(OgnlError::null_source("set", TypeCoercion::string_value(&key.value)));
        }

        let resolver = ctx.resolver().clone();
        let sample = resolver
            .get_property(&receiver.value, &key.value)
            .unwrap_or_default();
        let resolution = resolver.resolve_setter(&receiver.value, &key.value, &sample)?;
        ctx.set_current_type(Some(resolution.ty.clone()));

        if resolution.dynamic {
            return Ok(format!(
                "OgnlRuntime::setProperty({}, {}, $value)",
                receiver.code, key.code
            ));
        }
        let owner = TypeRef::class(&*resolution.owner);
        let value = Fragment::new("$value", Value::Null, None);
        Ok(format!(
            "{}::{}({}, {})",
            resolution.owner,
            setter_member(&resolution.member),
            self.cast(ctx, receiver, &owner),
            self.convert(ctx, &value, &resolution.ty)
        ))
    }

    fn method_set(
        &self,
        ctx: &mut OgnlContext,
        name: &str,
        children: &[NodeId],
        receiver: &Fragment,
    ) -> Result<String> {
        let args = self.argument_fragments(ctx, children)?;
        if receiver.value.is_null() {
            return Err(OgnlError::null_source("set", name));
        }

        let values: Vec<Value> = args.iter().map(|arg| arg.value.clone()).collect();
        let (getter, setter) = ctx
            .resolver()
            .resolve_synthetic_pair(&receiver.value, name, &values)?;
        if getter.is_variadic() {
            return Err(OgnlError::unsupported(format!(
                "variadic method {}.{} cannot be compiled",
                getter.owner,
                getter.signature()
            )));
        }

        let owner = TypeRef::class(&*setter.owner);
        let parameters = &setter.signature().parameters;
        let mut parts = vec![self.cast(ctx, receiver, &owner)];
        for (arg, parameter) in args.iter().zip(parameters) {
            parts.push(self.convert(ctx, arg, parameter));
        }
        let value = Fragment::new("$value", Value::Null, None);
        let value_type = parameters.last().cloned().unwrap_or(TypeRef::Object);
        parts.push(self.convert(ctx, &value, &value_type));

        Ok(format!("{}::{}({})", setter.owner, setter.signature().name, join(parts)))
    }

    /// `fragment` cast to `target` unless already assignable
    fn cast(&self, ctx: &OgnlContext, fragment: &Fragment, target: &TypeRef) -> String {
        let hierarchy = &**ctx.registry();
        let assignable = fragment
            .ty
            .as_ref()
            .is_some_and(|ty| target.is_assignable_from(ty, hierarchy));
        if assignable || *target == TypeRef::Object {
            fragment.code.clone()
        } else {
            format!("(({target}) {})", fragment.code)
        }
    }

    /// `fragment` converted for a parameter of type `parameter`
    fn convert(&self, ctx: &OgnlContext, fragment: &Fragment, parameter: &TypeRef) -> String {
        if parameter.is_primitive() {
            return format!("OgnlOps::convertValue({}, {parameter})", fragment.code);
        }
        if let Some(element) = parameter.element_type() {
            return format!("OgnlOps::toArray({}, {element})", fragment.code);
        }
        self.cast(ctx, fragment, parameter)
    }
}

fn join(parts: impl IntoIterator<Item = String>) -> String {
    parts.into_iter().collect::<Vec<_>>().join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::ExpressionBuilder;
    use crate::registry::{ClassBuilder, ClassRegistry, MemberResolver, MethodSignature};
    use pretty_assertions::assert_eq;
    use rstest::rstest;
    use std::sync::Arc;

    struct Person {
        name: String,
        age: i32,
    }

    fn context() -> OgnlContext {
        let registry = Arc::new(ClassRegistry::new());
        let int = TypeRef::Primitive(PrimitiveKind::Int);
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
                    int.clone(),
                    |p| Value::Int(p.age),
                    |p, v| p.age = TypeCoercion::long_value(&v).unwrap_or_default() as i32,
                )
                .method(MethodSignature::new("older", vec![int], TypeRef::Boxed(PrimitiveKind::Boolean)), |p, args| {
                    Ok(Value::Boolean(p.age > TypeCoercion::long_value(&args[0])? as i32))
                })
                .method(
                    MethodSignature::variadic("describe", vec![TypeRef::Object], TypeRef::String),
                    |p, _| Ok(Value::from(p.name.as_str())),
                )
                .method(
                    MethodSignature::new("greet", vec![TypeRef::array_of(TypeRef::String)], TypeRef::String),
                    |p, args| {
                        let names = args[0].elements().unwrap_or_default();
                        let names: Vec<String> = names.iter().map(TypeCoercion::string_value).collect();
                        Ok(Value::String(format!("{}: {}", p.name, names.join(", "))))
                    },
                )
                .build(),
        );
        OgnlContext::new(Arc::new(MemberResolver::new(registry)))
    }

    fn person() -> Value {
        Value::object(
            "Person",
            Person {
                name: "Ann".into(),
                age: 40,
            },
        )
    }

    #[test]
    fn test_declared_property_source() {
        let mut b = ExpressionBuilder::new();
        let name = b.property("name");
        let expression = b.build(name).unwrap();

        let mut ctx = context();
        let source = SourceEmitter::new(&expression).emit(&mut ctx, &person()).unwrap();
        assert_eq!(source.get_source, "Person::name($root)");
        assert_eq!(source.set_source.as_deref(), Some("Person::setName($root, ((String) $value))"));
        assert_eq!(source.root_type, TypeRef::class("Person"));
        assert_eq!(ctx.current_type(), Some(&TypeRef::String));
    }

    #[test]
    fn test_primitive_parameters_are_converted() {
        let mut b = ExpressionBuilder::new();
        let limit = b.constant(30);
        let older = b.method("older", [limit]);
        let expression = b.build(older).unwrap();

        let mut ctx = context();
        let source = SourceEmitter::new(&expression).emit(&mut ctx, &person()).unwrap();
        assert_eq!(source.get_source, "Person::older($root, OgnlOps::convertValue(30, int))");
        assert_eq!(source.set_source, None);
    }

    #[test]
    fn test_array_parameters_are_converted() {
        let mut b = ExpressionBuilder::new();
        let first = b.constant("Bo");
        let second = b.constant("Cy");
        let names = b.list([first, second]);
        let greet = b.method("greet", [names]);
        let expression = b.build(greet).unwrap();

        let mut ctx = context();
        let source = SourceEmitter::new(&expression).emit(&mut ctx, &person()).unwrap();
        assert_eq!(
            source.get_source,
            "Person::greet($root, OgnlOps::toArray(OgnlOps::list(\"Bo\", \"Cy\"), String))"
        );
    }

    #[rstest]
    #[case("age", TypeRef::Boxed(PrimitiveKind::Int))]
    #[case("name", TypeRef::Object)]
    fn test_conditional_type_joins_branches(#[case] other: &str, #[case] expected: TypeRef) {
        let mut b = ExpressionBuilder::new();
        let test = b.constant(true);
        let age = b.property("age");
        let other = b.property(other);
        let conditional = b.conditional(test, age, other);
        let expression = b.build(conditional).unwrap();

        let mut ctx = context();
        let source = SourceEmitter::new(&expression).emit(&mut ctx, &person()).unwrap();
        assert!(source.get_source.starts_with("(OgnlOps::booleanValue(true) ? Person::age($root)"));
        assert_eq!(ctx.current_type(), Some(&expected));
    }

    #[test]
    fn test_navigation_without_source_is_unsupported() {
        let mut b = ExpressionBuilder::new();
        let name = b.property("name");
        let expression = b.build(name).unwrap();
        let emitter = SourceEmitter::new(&expression);

        let error = emitter
            .required(name, Fragment::new("", Value::Null, None))
            .unwrap_err();
        assert!(error.is_unsupported_compilation());

        let key = expression.children(name)[0];
        assert!(emitter.required(key, Fragment::new(" ", Value::Null, None)).is_ok());
        assert!(emitter.required(name, Fragment::sampled("$root", person())).is_ok());
    }

    #[test]
    fn test_variadic_and_assignment_are_unsupported() {
        let mut b = ExpressionBuilder::new();
        let describe = b.method("describe", []);
        let expression = b.build(describe).unwrap();
        let mut ctx = context();
        let error = SourceEmitter::new(&expression).emit(&mut ctx, &person()).unwrap_err();
        assert!(error.is_unsupported_compilation());

        let mut b = ExpressionBuilder::new();
        let target = b.variable("x");
        let one = b.constant(1);
        let assign = b.assign(target, one);
        let expression = b.build(assign).unwrap();
        let error = SourceEmitter::new(&expression).emit(&mut ctx, &person()).unwrap_err();
        assert!(error.is_unsupported_compilation());
    }

    #[test]
    fn test_dynamic_properties_and_operators() {
        let mut b = ExpressionBuilder::new();
        let tags = b.property("tags");
        let one = b.constant(1);
        let index = b.index(one);
        let chain = b.sequence([tags, index]);
        let suffix = b.constant("!");
        let sum = b.binary(OperatorKind::Add, chain, suffix);
        let expression = b.build(sum).unwrap();

        let mut ctx = context();
        let root = Value::map([("tags", Value::list([Value::from("x"), Value::from("y")]))]);
        let source = SourceEmitter::new(&expression).emit(&mut ctx, &root).unwrap();
        assert_eq!(
            source.get_source,
            "OgnlOps::add(OgnlRuntime::getProperty(OgnlRuntime::getProperty($root, \"tags\"), 1), \"!\")"
        );
        assert_eq!(source.set_source, None);
    }
}
