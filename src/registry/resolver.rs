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

//! Member resolution against runtime types
//!
//! Method overloads are chosen in three passes over the class and its
//! superclasses:
//!
//! 1. fixed-arity overloads whose parameters are all assignable from the
//!    argument types, cheapest [`MethodSignature::match_cost`] first;
//! 2. variadic overloads with compatible leading parameters;
//! 3. fixed-arity overloads whose arguments convert to the parameters.
//!
//! Properties come from the class's dynamic [`PropertyAccessor`], then
//! declared properties, then bean methods (`getX`/`isX`, `setX`).

use dashmap::DashMap;
use log::trace;
use smallvec::SmallVec;
use std::sync::Arc;

use super::ClassRegistry;
use super::class::{ClassDescriptor, MethodDescriptor, PropertyDescriptor};
use super::property_accessor::PropertyAccessor;
use super::signature::MethodSignature;
use crate::error::{OgnlError, Result};
use crate::model::{TypeCoercion, TypeRef, Value};

/// A method chosen for a call
#[derive(Debug, Clone)]
pub struct ResolvedMethod {
    /// Class declaring the overload
    pub owner: Arc<str>,
    pub descriptor: MethodDescriptor,
    /// Chosen by the argument-conversion pass rather than assignability
    pub converted: bool,
}

impl ResolvedMethod {
    pub fn signature(&self) -> &MethodSignature {
        &self.descriptor.signature
    }

    pub fn is_variadic(&self) -> bool {
        self.descriptor.signature.variadic
    }

    pub fn return_type(&self) -> &TypeRef {
        &self.descriptor.signature.return_type
    }
}

/// How a property read or write is carried out
#[derive(Debug, Clone, PartialEq)]
pub struct PropertyResolution {
    /// Class declaring the member
    pub owner: Arc<str>,
    /// Member used for the access: the property name, or the bean method
    /// (`getName`, `isActive`, `setName`)
    pub member: String,
    /// Handled by the class's dynamic property accessor
    pub dynamic: bool,
    /// Declared type of the property
    pub ty: TypeRef,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct ResolutionKey {
    class: Arc<str>,
    member: String,
    args: SmallVec<[Option<TypeRef>; 4]>,
}

#[derive(Debug, Clone)]
struct CachedMethod {
    generation: u64,
    method: ResolvedMethod,
}

enum ReadTarget {
    Dynamic { owner: Arc<str>, value: Value },
    Declared { owner: Arc<str>, property: PropertyDescriptor },
    Bean(ResolvedMethod),
}

enum WriteTarget {
    Dynamic { owner: Arc<str>, accessor: Arc<dyn PropertyAccessor> },
    Declared { owner: Arc<str>, property: PropertyDescriptor },
    Bean(ResolvedMethod),
}

/// `name` with its first character upper-cased
fn capitalize(name: &str) -> String {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// Bean property name behind an accessor method name, if it is one
fn bean_property(method: &str) -> Option<&str> {
    ["get", "is"].iter().find_map(|prefix| {
        method
            .strip_prefix(prefix)
            .filter(|rest| rest.chars().next().is_some_and(char::is_uppercase))
    })
}

/// Name of the setter paired with a getter-style method
fn setter_name(method: &str) -> String {
    match bean_property(method) {
        Some(property) => format!("set{property}"),
        None => format!("set{}", capitalize(method)),
    }
}

/// Finds properties and methods on runtime values
pub struct MemberResolver {
    registry: Arc<ClassRegistry>,
    cache: Option<DashMap<ResolutionKey, CachedMethod>>,
    max_cache_size: usize,
}

impl MemberResolver {
    /// Resolver without a resolution cache
    pub fn new(registry: Arc<ClassRegistry>) -> Self {
        Self {
            registry,
            cache: None,
            max_cache_size: 0,
        }
    }

    /// Resolver caching method resolutions; the cache is cleared when it
    /// reaches `max_size` entries
    pub fn with_cache(registry: Arc<ClassRegistry>, max_size: usize) -> Self {
        Self {
            registry,
            cache: (max_size > 0).then(DashMap::new),
            max_cache_size: max_size,
        }
    }

    pub fn registry(&self) -> &Arc<ClassRegistry> {
        &self.registry
    }

    pub fn cache_len(&self) -> usize {
        self.cache.as_ref().map_or(0, |cache| cache.len())
    }

    pub fn clear_cache(&self) {
        if let Some(cache) = &self.cache {
            cache.clear();
        }
    }

    /// Overloads named `name` visible on `class`, subclass declarations first
    ///
    /// An overload redeclared with identical parameters hides the
    /// superclass one.
    fn candidates(&self, class: &str, name: &str) -> Vec<(Arc<str>, MethodDescriptor)> {
        let mut found: Vec<(Arc<str>, MethodDescriptor)> = Vec::new();
        for descriptor in self.registry.lineage(class) {
            for method in descriptor.methods(name) {
                let hidden = found.iter().any(|(_, seen)| {
                    seen.signature.parameters == method.signature.parameters
                        && seen.signature.variadic == method.signature.variadic
                });
                if !hidden {
                    found.push((descriptor.name().clone(), method.clone()));
                }
            }
        }
        found
    }

    fn select(
        &self,
        class: &str,
        name: &str,
        arg_types: &[Option<TypeRef>],
        args: Option<&[Value]>,
    ) -> Option<ResolvedMethod> {
        let candidates = self.candidates(class, name);
        let hierarchy: &ClassRegistry = &self.registry;

        let cheapest = |variadic: bool| {
            candidates
                .iter()
                .filter(|(_, method)| method.signature.variadic == variadic)
                .filter_map(|(owner, method)| {
                    method
                        .signature
                        .match_cost(arg_types, hierarchy)
                        .map(|cost| (cost, owner, method))
                })
                .min_by_key(|(cost, _, _)| *cost)
                .map(|(_, owner, method)| ResolvedMethod {
                    owner: owner.clone(),
                    descriptor: method.clone(),
                    converted: false,
                })
        };

        cheapest(false).or_else(|| cheapest(true)).or_else(|| {
            let args = args?;
            candidates
                .iter()
                .find(|(_, method)| method.signature.accepts_with_conversion(args, hierarchy))
                .map(|(owner, method)| ResolvedMethod {
                    owner: owner.clone(),
                    descriptor: method.clone(),
                    converted: true,
                })
        })
    }

    /// Choose the overload of `name` on `target` for the given arguments
    pub fn resolve_method(&self, target: &Value, name: &str, args: &[Value]) -> Result<ResolvedMethod> {
        let class = target.class_name();
        let arg_types: SmallVec<[Option<TypeRef>; 4]> = args.iter().map(Value::runtime_type).collect();

        let Some(cache) = &self.cache else {
            return self
                .select(class, name, &arg_types, Some(args))
                .ok_or_else(|| OgnlError::no_such_member(class, name));
        };

        let generation = self.registry.generation();
        let key = ResolutionKey {
            class: Arc::from(class),
            member: name.to_string(),
            args: arg_types,
        };
        if let Some(hit) = cache.get(&key).filter(|hit| hit.generation == generation) {
            return Ok(hit.method.clone());
        }

        trace!("method resolution cache miss for {class}.{name}");
        let method = self
            .select(class, name, &key.args, Some(args))
            .ok_or_else(|| OgnlError::no_such_member(class, name))?;
        if !method.converted {
            if cache.len() >= self.max_cache_size {
                cache.clear();
            }
            cache.insert(
                key,
                CachedMethod {
                    generation,
                    method: method.clone(),
                },
            );
        }
        Ok(method)
    }

    /// Invoke a resolved method, converting arguments to the declared types
    pub fn invoke(&self, method: &ResolvedMethod, target: &Value, args: &[Value]) -> Result<Value> {
        let signature = method.signature();
        let hierarchy: &ClassRegistry = &self.registry;

        let fixed = signature.fixed_arity().min(args.len());
        let mut converted = Vec::with_capacity(signature.parameters.len());
        for (arg, parameter) in args[..fixed].iter().zip(&signature.parameters) {
            converted.push(TypeCoercion::coerce(arg, parameter, hierarchy)?);
        }
        if signature.variadic {
            let element = signature.parameters.last().cloned().unwrap_or(TypeRef::Object);
            let rest = args[fixed..]
                .iter()
                .map(|arg| TypeCoercion::coerce(arg, &element, hierarchy))
                .collect::<std::result::Result<Vec<_>, _>>()?;
            converted.push(Value::array(element, rest));
        }

        (method.descriptor.invoker)(target, &converted)
            .map_err(|cause| OgnlError::invocation_failed(target.class_name(), &signature.name, cause))
    }

    /// Resolve and invoke `target.name(args)`
    pub fn call_method(&self, target: &Value, name: &str, args: &[Value]) -> Result<Value> {
        let method = self.resolve_method(target, name, args)?;
        self.invoke(&method, target, args)
    }

    fn property_name<'k>(target: &Value, key: &'k Value) -> Result<&'k str> {
        key.as_str()
            .ok_or_else(|| OgnlError::no_such_member(target.class_name(), key.to_string()))
    }

    fn bean_getter(&self, class: &str, name: &str) -> Option<ResolvedMethod> {
        let capitalized = capitalize(name);
        [format!("get{capitalized}"), format!("is{capitalized}")]
            .iter()
            .find_map(|getter| self.select(class, getter, &[], None))
    }

    fn find_reader(&self, target: &Value, key: &Value) -> Result<ReadTarget> {
        let class = target.class_name();
        let lineage = self.registry.lineage(class);

        for descriptor in &lineage {
            if let Some(accessor) = descriptor.accessor() {
                if let Some(value) = accessor.get(target, key)? {
                    return Ok(ReadTarget::Dynamic {
                        owner: descriptor.name().clone(),
                        value,
                    });
                }
            }
        }

        let name = Self::property_name(target, key)?;
        if let Some((owner, property)) = declared_property(&lineage, name, |p| p.getter.is_some()) {
            return Ok(ReadTarget::Declared { owner, property });
        }
        self.bean_getter(class, name)
            .map(ReadTarget::Bean)
            .ok_or_else(|| OgnlError::no_such_member(class, name))
    }

    fn find_writer(&self, target: &Value, key: &Value, value: &Value) -> Result<WriteTarget> {
        let class = target.class_name();
        let lineage = self.registry.lineage(class);

        for descriptor in &lineage {
            if let Some(accessor) = descriptor.accessor() {
                if accessor.handles_set(target, key) {
                    return Ok(WriteTarget::Dynamic {
                        owner: descriptor.name().clone(),
                        accessor: accessor.clone(),
                    });
                }
            }
        }

        let name = Self::property_name(target, key)?;
        if let Some((owner, property)) = declared_property(&lineage, name, |p| p.setter.is_some()) {
            return Ok(WriteTarget::Declared { owner, property });
        }
        let setter = format!("set{}", capitalize(name));
        let value_type = [value.runtime_type()];
        self.select(class, &setter, &value_type, Some(std::slice::from_ref(value)))
            .map(WriteTarget::Bean)
            .ok_or_else(|| OgnlError::no_such_member(class, name))
    }

    /// Read `key` from `target`
    pub fn get_property(&self, target: &Value, key: &Value) -> Result<Value> {
        self.read_property(target, key).map(|(value, _)| value)
    }

    /// Read `key` from `target`, reporting which member served the read
    pub fn read_property(&self, target: &Value, key: &Value) -> Result<(Value, PropertyResolution)> {
        match self.find_reader(target, key)? {
            ReadTarget::Dynamic { owner, value } => {
                let resolution = PropertyResolution {
                    owner,
                    member: TypeCoercion::string_value(key),
                    dynamic: true,
                    ty: value.runtime_type().unwrap_or(TypeRef::Object),
                };
                Ok((value, resolution))
            }
            ReadTarget::Declared { owner, property } => {
                let getter = property.getter.as_ref().ok_or_else(|| {
                    OgnlError::no_such_member(target.class_name(), property.name.as_str())
                })?;
                let value = getter(target).map_err(|cause| {
                    OgnlError::invocation_failed(target.class_name(), property.name.as_str(), cause)
                })?;
                let resolution = PropertyResolution {
                    owner,
                    member: property.name.clone(),
                    dynamic: false,
                    ty: property.ty.clone(),
                };
                Ok((value, resolution))
            }
            ReadTarget::Bean(method) => {
                let value = self.invoke(&method, target, &[])?;
                Ok((value, bean_resolution(&method, method.return_type().clone())))
            }
        }
    }

    /// Write `value` to `key` on `target`
    pub fn set_property(&self, target: &Value, key: &Value, value: Value) -> Result<()> {
        match self.find_writer(target, key, &value)? {
            WriteTarget::Dynamic { owner, accessor } => {
                if accessor.set(target, key, value, &*self.registry)? {
                    Ok(())
                } else {
                    Err(OgnlError::no_such_member(&*owner, key.to_string()))
                }
            }
            WriteTarget::Declared { property, .. } => {
                let converted = TypeCoercion::coerce(&value, &property.ty, &*self.registry)?;
                let setter = property.setter.as_ref().ok_or_else(|| {
                    OgnlError::no_such_member(target.class_name(), property.name.as_str())
                })?;
                setter(target, converted).map_err(|cause| {
                    OgnlError::invocation_failed(target.class_name(), property.name.as_str(), cause)
                })
            }
            WriteTarget::Bean(method) => self.invoke(&method, target, &[value]).map(|_| ()),
        }
    }

    /// Describe how a write of `value` to `key` would be carried out,
    /// without performing it
    pub fn resolve_setter(&self, target: &Value, key: &Value, value: &Value) -> Result<PropertyResolution> {
        Ok(match self.find_writer(target, key, value)? {
            WriteTarget::Dynamic { owner, .. } => PropertyResolution {
                owner,
                member: TypeCoercion::string_value(key),
                dynamic: true,
                ty: TypeRef::Object,
            },
            WriteTarget::Declared { owner, property } => PropertyResolution {
                owner,
                member: property.name.clone(),
                dynamic: false,
                ty: property.ty.clone(),
            },
            WriteTarget::Bean(method) => {
                let ty = method.signature().parameters.first().cloned().unwrap_or(TypeRef::Object);
                bean_resolution(&method, ty)
            }
        })
    }

    /// Getter/setter pair standing in for an assignment to `target.name(args)`
    ///
    /// The setter is `setX` for a getter named `getX`, `isX` or `x`, takes
    /// the getter's arguments plus one trailing parameter accepting the
    /// getter's return type.
    pub fn resolve_synthetic_pair(
        &self,
        target: &Value,
        name: &str,
        args: &[Value],
    ) -> Result<(ResolvedMethod, ResolvedMethod)> {
        let getter = self.resolve_method(target, name, args)?;
        let setter_name = setter_name(name);

        let mut setter_args: SmallVec<[Option<TypeRef>; 4]> = args.iter().map(Value::runtime_type).collect();
        setter_args.push(Some(getter.return_type().widen()));

        let setter = self
            .select(target.class_name(), &setter_name, &setter_args, None)
            .filter(|setter| !setter.is_variadic())
            .ok_or_else(|| {
                OgnlError::inappropriate(format!(
                    "{}.{name} has no setter {setter_name} accepting {}",
                    target.class_name(),
                    getter.return_type()
                ))
            })?;
        Ok((getter, setter))
    }

    /// Null handler registered for the class of `target`
    pub fn null_handler(&self, target: &Value) -> Arc<dyn super::NullHandler> {
        self.registry.null_handler(target.class_name())
    }
}

impl std::fmt::Debug for MemberResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemberResolver")
            .field("registry", &self.registry)
            .field("cached", &self.cache_len())
            .finish()
    }
}

fn declared_property(
    lineage: &[Arc<ClassDescriptor>],
    name: &str,
    usable: impl Fn(&PropertyDescriptor) -> bool,
) -> Option<(Arc<str>, PropertyDescriptor)> {
    lineage.iter().find_map(|descriptor| {
        descriptor
            .property(name)
            .filter(|property| usable(property))
            .map(|property| (descriptor.name().clone(), property.clone()))
    })
}

fn bean_resolution(method: &ResolvedMethod, ty: TypeRef) -> PropertyResolution {
    PropertyResolution {
        owner: method.owner.clone(),
        member: method.signature().name.clone(),
        dynamic: false,
        ty,
    }
}
