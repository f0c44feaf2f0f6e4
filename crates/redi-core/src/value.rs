//! Values stored in component state slots and the change predicate applied to them.

use std::any::Any;
use std::fmt;
use std::rc::Rc;

/// A single state slot value.
///
/// Scalars and text compare by value. Everything else lives behind a shared
/// reference and compares by identity, so comparing two slots is always O(1).
#[derive(Clone, Default)]
pub enum Value {
    #[default]
    Empty,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(Rc<str>),
    Shared(Rc<dyn Any>),
}

impl Value {
    /// Wraps an arbitrary value behind a fresh shared reference.
    pub fn shared<T: Any>(value: T) -> Self {
        Value::Shared(Rc::new(value))
    }

    /// Wraps a closure so it can be stored in a slot. Each call produces a new
    /// identity.
    pub fn function(f: impl Fn(&[Value]) -> Value + 'static) -> Self {
        let f: Rc<dyn Fn(&[Value]) -> Value> = Rc::new(f);
        Value::Shared(Rc::new(f))
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, Value::Empty)
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(value) => Some(*value),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(value) => Some(*value),
            _ => None,
        }
    }

    pub fn as_float(&self) -> Option<f64> {
        match self {
            Value::Float(value) => Some(*value),
            Value::Int(value) => Some(*value as f64),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Value::Text(value) => Some(value),
            _ => None,
        }
    }

    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        match self {
            Value::Shared(value) => value.downcast_ref::<T>(),
            _ => None,
        }
    }

    /// Calls a slot holding a closure created with [`Value::function`].
    pub fn call(&self, args: &[Value]) -> Option<Value> {
        self.downcast_ref::<Rc<dyn Fn(&[Value]) -> Value>>()
            .map(|f| f(args))
    }

    /// Identity comparison.
    ///
    /// Two floats are the same when they are numerically equal or both NaN.
    /// Shared values are the same only when they point at the same allocation.
    pub fn same(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Empty, Value::Empty) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => a == b || (a.is_nan() && b.is_nan()),
            (Value::Text(a), Value::Text(b)) => a == b,
            (Value::Shared(a), Value::Shared(b)) => Rc::ptr_eq(a, b),
            _ => false,
        }
    }

    /// Renders the value the way a text node would show it.
    pub fn display_text(&self) -> String {
        match self {
            Value::Empty => String::new(),
            Value::Bool(value) => value.to_string(),
            Value::Int(value) => value.to_string(),
            Value::Float(value) => value.to_string(),
            Value::Text(value) => value.to_string(),
            Value::Shared(_) => "[shared]".to_string(),
        }
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Empty => f.write_str("Empty"),
            Value::Bool(value) => f.debug_tuple("Bool").field(value).finish(),
            Value::Int(value) => f.debug_tuple("Int").field(value).finish(),
            Value::Float(value) => f.debug_tuple("Float").field(value).finish(),
            Value::Text(value) => f.debug_tuple("Text").field(value).finish(),
            Value::Shared(value) => write!(f, "Shared({:p})", Rc::as_ptr(value)),
        }
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::Bool(value)
    }
}

impl From<i32> for Value {
    fn from(value: i32) -> Self {
        Value::Int(value as i64)
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Value::Int(value)
    }
}

impl From<usize> for Value {
    fn from(value: usize) -> Self {
        Value::Int(value as i64)
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Value::Float(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::Text(Rc::from(value))
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::Text(Rc::from(value))
    }
}

impl From<Rc<str>> for Value {
    fn from(value: Rc<str>) -> Self {
        Value::Text(value)
    }
}

/// Difference predicate a component applies on every assignment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ChangePolicy {
    /// Scalars by value, shared references by identity.
    #[default]
    Identity,
    /// Scalars by value; any shared reference counts as changed, even when it
    /// is the very same allocation. Use for components that mutate shared
    /// objects in place and reassign them to trigger a patch.
    AlwaysChangedReferences,
}

impl ChangePolicy {
    pub fn changed(self, old: &Value, new: &Value) -> bool {
        match self {
            ChangePolicy::Identity => !old.same(new),
            ChangePolicy::AlwaysChangedReferences => {
                matches!(new, Value::Shared(_)) || !old.same(new)
            }
        }
    }
}

#[cfg(test)]
#[path = "tests/value_tests.rs"]
mod tests;
