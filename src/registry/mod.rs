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

//! Class registry and member resolution
//!
//! Classes are described once by a [`ClassDescriptor`] and looked up by the
//! runtime class name of a value. The [`MemberResolver`] walks a class and
//! its superclasses to find readable and writable properties and the
//! best-matching method overload.

mod builtins;
pub mod class;
pub mod null_handler;
pub mod property_accessor;
pub mod resolver;
pub mod signature;

use dashmap::DashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

pub use class::{
    ClassBuilder, ClassDescriptor, Getter, InvocationError, Invoker, MethodDescriptor,
    PropertyDescriptor, Setter,
};
pub use null_handler::{NullHandler, PassThroughNullHandler};
pub use property_accessor::{ArrayAccessor, ListAccessor, MapAccessor, PropertyAccessor};
pub use resolver::{MemberResolver, PropertyResolution, ResolvedMethod};
pub use signature::MethodSignature;

use crate::model::{TypeHierarchy, TypeRef};

/// Registry of class descriptors keyed by class name
pub struct ClassRegistry {
    classes: DashMap<Arc<str>, Arc<ClassDescriptor>>,
    generation: AtomicU64,
}

impl ClassRegistry {
    /// Registry pre-populated with the built-in classes
    pub fn new() -> Self {
        let registry = Self::empty();
        builtins::register_builtins(&registry);
        registry
    }

    /// Registry without any classes
    pub fn empty() -> Self {
        Self {
            classes: DashMap::new(),
            generation: AtomicU64::new(0),
        }
    }

    /// Register or replace a class
    pub fn register(&self, descriptor: ClassDescriptor) {
        log::debug!("registering class {}", descriptor.name());
        self.classes
            .insert(descriptor.name().clone(), Arc::new(descriptor));
        self.generation.fetch_add(1, Ordering::AcqRel);
    }

    pub fn get(&self, name: &str) -> Option<Arc<ClassDescriptor>> {
        self.classes.get(name).map(|entry| entry.value().clone())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.classes.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.classes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.classes.is_empty()
    }

    /// Bumped on every registration; lets caches detect stale entries
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::Acquire)
    }

    /// The class followed by its superclasses, ending at `Object`
    ///
    /// Unregistered classes are treated as direct subclasses of `Object`.
    pub fn lineage(&self, name: &str) -> Vec<Arc<ClassDescriptor>> {
        let mut lineage: Vec<Arc<ClassDescriptor>> = Vec::new();
        let mut next: Option<Arc<str>> = Some(Arc::from(name));
        while let Some(current) = next.take() {
            if lineage.iter().any(|class| *class.name() == current) {
                break;
            }
            match self.get(&current) {
                Some(class) => {
                    next = class.superclass().cloned();
                    lineage.push(class);
                }
                None if &*current != "Object" => next = Some(Arc::from("Object")),
                None => {}
            }
        }
        lineage
    }

    /// Install `handler` on an already registered class
    pub fn set_null_handler(&self, class: &str, handler: Arc<dyn NullHandler>) -> bool {
        match self.classes.get_mut(class) {
            Some(mut entry) => {
                Arc::make_mut(entry.value_mut()).set_null_handler(handler);
                self.generation.fetch_add(1, Ordering::AcqRel);
                true
            }
            None => false,
        }
    }

    /// Null handler of `class`, inherited from the nearest superclass that
    /// declares one
    pub fn null_handler(&self, class: &str) -> Arc<dyn NullHandler> {
        self.lineage(class)
            .iter()
            .find_map(|descriptor| descriptor.null_handler().cloned())
            .unwrap_or_else(|| Arc::new(PassThroughNullHandler))
    }
}

impl Default for ClassRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for ClassRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClassRegistry")
            .field("classes", &self.classes.len())
            .field("generation", &self.generation())
            .finish()
    }
}

impl TypeHierarchy for ClassRegistry {
    fn superclass_of(&self, ty: &TypeRef) -> Option<TypeRef> {
        match ty {
            TypeRef::Class(name) => Some(
                self.get(name)
                    .and_then(|class| class.superclass().map(|s| TypeRef::from_class_name(s)))
                    .unwrap_or(TypeRef::Object),
            ),
            other => other.builtin_superclass(),
        }
    }
}
