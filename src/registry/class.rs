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

//! Class descriptors: the runtime type information members are resolved from

use rustc_hash::FxHashMap;
use std::any::Any;
use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

use super::null_handler::NullHandler;
use super::property_accessor::PropertyAccessor;
use super::signature::MethodSignature;
use crate::model::{TypeRef, Value};

/// Failure raised by a getter, setter or method body
pub type InvocationError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Reads a property from a receiver
pub type Getter = Arc<dyn Fn(&Value) -> Result<Value, InvocationError> + Send + Sync>;

/// Writes an already converted value into a receiver
pub type Setter = Arc<dyn Fn(&Value, Value) -> Result<(), InvocationError> + Send + Sync>;

/// Invokes a method with already converted arguments
///
/// Trailing arguments of a variadic method arrive packed into one array.
pub type Invoker = Arc<dyn Fn(&Value, &[Value]) -> Result<Value, InvocationError> + Send + Sync>;

/// A declared property
#[derive(Clone)]
pub struct PropertyDescriptor {
    pub name: String,
    pub ty: TypeRef,
    pub getter: Option<Getter>,
    pub setter: Option<Setter>,
}

impl fmt::Debug for PropertyDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PropertyDescriptor")
            .field("name", &self.name)
            .field("ty", &self.ty)
            .field("readable", &self.getter.is_some())
            .field("writable", &self.setter.is_some())
            .finish()
    }
}

/// A declared method overload
#[derive(Clone)]
pub struct MethodDescriptor {
    pub signature: MethodSignature,
    pub invoker: Invoker,
}

impl fmt::Debug for MethodDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "MethodDescriptor({})", self.signature)
    }
}

/// Runtime type information for one class
#[derive(Clone)]
pub struct ClassDescriptor {
    name: Arc<str>,
    superclass: Option<Arc<str>>,
    properties: FxHashMap<String, PropertyDescriptor>,
    methods: FxHashMap<String, Vec<MethodDescriptor>>,
    accessor: Option<Arc<dyn PropertyAccessor>>,
    null_handler: Option<Arc<dyn NullHandler>>,
}

impl ClassDescriptor {
    /// New class extending `Object`
    pub fn new(name: impl Into<Arc<str>>) -> Self {
        let name = name.into();
        let superclass = (&*name != "Object").then(|| Arc::from("Object"));
        Self {
            name,
            superclass,
            properties: FxHashMap::default(),
            methods: FxHashMap::default(),
            accessor: None,
            null_handler: None,
        }
    }

    pub fn extends(mut self, superclass: impl Into<Arc<str>>) -> Self {
        self.superclass = Some(superclass.into());
        self
    }

    pub fn with_property(mut self, property: PropertyDescriptor) -> Self {
        self.properties.insert(property.name.clone(), property);
        self
    }

    pub fn with_method(mut self, signature: MethodSignature, invoker: Invoker) -> Self {
        self.methods
            .entry(signature.name.clone())
            .or_default()
            .push(MethodDescriptor { signature, invoker });
        self
    }

    pub fn with_accessor(mut self, accessor: Arc<dyn PropertyAccessor>) -> Self {
        self.accessor = Some(accessor);
        self
    }

    pub fn with_null_handler(mut self, handler: Arc<dyn NullHandler>) -> Self {
        self.null_handler = Some(handler);
        self
    }

    pub fn name(&self) -> &Arc<str> {
        &self.name
    }

    pub fn superclass(&self) -> Option<&Arc<str>> {
        self.superclass.as_ref()
    }

    pub fn property(&self, name: &str) -> Option<&PropertyDescriptor> {
        self.properties.get(name)
    }

    pub fn properties(&self) -> impl Iterator<Item = &PropertyDescriptor> {
        self.properties.values()
    }

    /// Overloads declared under `name`, in declaration order
    pub fn methods(&self, name: &str) -> &[MethodDescriptor] {
        self.methods.get(name).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn accessor(&self) -> Option<&Arc<dyn PropertyAccessor>> {
        self.accessor.as_ref()
    }

    pub fn null_handler(&self) -> Option<&Arc<dyn NullHandler>> {
        self.null_handler.as_ref()
    }

    pub(crate) fn set_null_handler(&mut self, handler: Arc<dyn NullHandler>) {
        self.null_handler = Some(handler);
    }
}

impl fmt::Debug for ClassDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClassDescriptor")
            .field("name", &self.name)
            .field("superclass", &self.superclass)
            .field("properties", &self.properties.keys().collect::<Vec<_>>())
            .field("methods", &self.methods.keys().collect::<Vec<_>>())
            .field("dynamic", &self.accessor.is_some())
            .finish()
    }
}

#[derive(Debug)]
struct StateMismatch {
    class: Arc<str>,
    receiver: String,
}

impl fmt::Display for StateMismatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "receiver {} is not an instance of {}", self.receiver, self.class)
    }
}

impl std::error::Error for StateMismatch {}

/// Typed builder registering a Rust struct `T` as a class
///
/// Instances are created with [`ClassBuilder::instance`] or
/// [`Value::object`] using the same class name.
///
/// ```rust
/// use octofhir_ognl::model::{PrimitiveKind, TypeRef, Value};
/// use octofhir_ognl::registry::{ClassBuilder, ClassRegistry};
///
/// struct Person {
///     name: String,
///     age: i32,
/// }
///
/// let registry = ClassRegistry::new();
/// registry.register(
///     ClassBuilder::<Person>::new("Person")
///         .property(
///             "name",
///             TypeRef::String,
///             |p| Value::from(p.name.as_str()),
///             |p, v| p.name = v.as_str().unwrap_or_default().to_string(),
///         )
///         .read_only("age", TypeRef::Primitive(PrimitiveKind::Int), |p| Value::Int(p.age))
///         .build(),
/// );
/// assert!(registry.contains("Person"));
/// ```
pub struct ClassBuilder<T> {
    descriptor: ClassDescriptor,
    _state: PhantomData<fn(&T)>,
}

impl<T: Any + Send + Sync> ClassBuilder<T> {
    pub fn new(name: impl Into<Arc<str>>) -> Self {
        Self {
            descriptor: ClassDescriptor::new(name),
            _state: PhantomData,
        }
    }

    pub fn extends(mut self, superclass: impl Into<Arc<str>>) -> Self {
        self.descriptor = self.descriptor.extends(superclass);
        self
    }

    fn mismatch(class: &Arc<str>, receiver: &Value) -> InvocationError {
        Box::new(StateMismatch {
            class: class.clone(),
            receiver: receiver.class_name().to_string(),
        })
    }

    fn getter(&self, read: impl Fn(&T) -> Value + Send + Sync + 'static) -> Getter {
        let class = self.descriptor.name.clone();
        Arc::new(move |receiver: &Value| {
            receiver
                .as_object()
                .and_then(|object| object.with_state(|state: &T| read(state)))
                .ok_or_else(|| Self::mismatch(&class, receiver))
        })
    }

    fn setter(&self, write: impl Fn(&mut T, Value) + Send + Sync + 'static) -> Setter {
        let class = self.descriptor.name.clone();
        Arc::new(move |receiver: &Value, value: Value| {
            receiver
                .as_object()
                .and_then(|object| object.with_state_mut(|state: &mut T| write(state, value)))
                .ok_or_else(|| Self::mismatch(&class, receiver))
        })
    }

    /// Readable and writable property
    pub fn property(
        mut self,
        name: &str,
        ty: TypeRef,
        read: impl Fn(&T) -> Value + Send + Sync + 'static,
        write: impl Fn(&mut T, Value) + Send + Sync + 'static,
    ) -> Self {
        let property = PropertyDescriptor {
            name: name.to_string(),
            ty,
            getter: Some(self.getter(read)),
            setter: Some(self.setter(write)),
        };
        self.descriptor = self.descriptor.with_property(property);
        self
    }

    /// Property without a setter
    pub fn read_only(mut self, name: &str, ty: TypeRef, read: impl Fn(&T) -> Value + Send + Sync + 'static) -> Self {
        let property = PropertyDescriptor {
            name: name.to_string(),
            ty,
            getter: Some(self.getter(read)),
            setter: None,
        };
        self.descriptor = self.descriptor.with_property(property);
        self
    }

    /// Method reading the receiver's state
    pub fn method(
        mut self,
        signature: MethodSignature,
        body: impl Fn(&T, &[Value]) -> Result<Value, InvocationError> + Send + Sync + 'static,
    ) -> Self {
        let class = self.descriptor.name.clone();
        let invoker: Invoker = Arc::new(move |receiver: &Value, args: &[Value]| {
            receiver
                .as_object()
                .and_then(|object| object.with_state(|state: &T| body(state, args)))
                .unwrap_or_else(|| Err(Self::mismatch(&class, receiver)))
        });
        self.descriptor = self.descriptor.with_method(signature, invoker);
        self
    }

    /// Method that may mutate the receiver's state
    pub fn method_mut(
        mut self,
        signature: MethodSignature,
        body: impl Fn(&mut T, &[Value]) -> Result<Value, InvocationError> + Send + Sync + 'static,
    ) -> Self {
        let class = self.descriptor.name.clone();
        let invoker: Invoker = Arc::new(move |receiver: &Value, args: &[Value]| {
            receiver
                .as_object()
                .and_then(|object| object.with_state_mut(|state: &mut T| body(state, args)))
                .unwrap_or_else(|| Err(Self::mismatch(&class, receiver)))
        });
        self.descriptor = self.descriptor.with_method(signature, invoker);
        self
    }

    pub fn null_handler(mut self, handler: Arc<dyn NullHandler>) -> Self {
        self.descriptor = self.descriptor.with_null_handler(handler);
        self
    }

    /// Wrap `state` as an instance of this class
    pub fn instance(&self, state: T) -> Value {
        Value::object(self.descriptor.name.clone(), state)
    }

    pub fn build(self) -> ClassDescriptor {
        self.descriptor
    }
}
