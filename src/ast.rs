//! This module defines the runtime value model of the interpreter. The main enum,
//! [`Value`], covers every datum the reader can produce or the evaluator can compute:
//! scalars, symbols and keywords, lists, vectors, maps, functions and atoms.
//! Ergonomic helper functions such as [`val`], [`sym`], [`kw`] and [`nil`] are provided
//! for convenient construction in both code and tests, and conversion traits make it
//! easy to build Values from Rust literals, arrays and vectors. Equality is structural:
//! lists and vectors with equal elements compare equal, and atoms compare by the value
//! they currently hold.

use std::cell::RefCell;
use std::cmp::Ordering;
use std::fmt;
use std::ops::Deref;
use std::rc::Rc;

use crate::Error;
use crate::evaluator::Arity;
use crate::evaluator::environment::Env;
use crate::evaluator::intooperation::OperationFn;

/// Map payload. Keys are restricted to strings, keywords and symbols.
pub type ValueMap = im::HashMap<MapKey, Value>;

/// Symbol that collects the remaining arguments of a call into a list
pub(crate) const REST_MARKER: &str = "&";

/// Core value type of the interpreter
///
/// To build values, use the ergonomic helper functions:
/// - `val(42)` for scalars, `sym("name")` for symbols, `kw("key")` for keywords
/// - `val([1, 2, 3])` for homogeneous lists
/// - `val(vec![sym("op"), val(42)])` for mixed lists
#[derive(Clone)]
pub enum Value {
    Nil,
    Bool(bool),
    Integer(i64),
    Float(f64),
    String(String),
    /// Keyword name, without the leading `:`
    Keyword(String),
    Symbol(String),
    List(Rc<Seq>),
    Vector(Rc<Seq>),
    Map(ValueMap),
    /// Primitive implemented in Rust
    /// Uses id string for equality comparison instead of function pointer
    BuiltinFunction {
        id: String,
        func: Rc<OperationFn>,
    },
    /// User-defined closure
    Function(Rc<Lambda>),
    /// Closure applied to unevaluated forms at expansion time
    Macro(Rc<Lambda>),
    Atom(Atom),
}

/// Element storage of lists and vectors.
///
/// Dropping releases nested sequences from a work list, so a chain of lists
/// nested arbitrarily deep is freed without recursing once per level.
#[derive(Clone, Default)]
pub struct Seq(Vec<Value>);

impl Deref for Seq {
    type Target = Vec<Value>;

    fn deref(&self) -> &Vec<Value> {
        &self.0
    }
}

impl From<Vec<Value>> for Seq {
    fn from(items: Vec<Value>) -> Self {
        Seq(items)
    }
}

impl Drop for Seq {
    fn drop(&mut self) {
        let mut pending = std::mem::take(&mut self.0);
        while let Some(value) = pending.pop() {
            // Shared sequences only lose a reference here
            if let Value::List(items) | Value::Vector(items) = value
                && let Ok(mut inner) = Rc::try_unwrap(items)
            {
                pending.append(&mut inner.0);
            }
        }
    }
}

/// Parameter list of a closure: positional names plus an optional rest name.
#[derive(Debug, Clone, PartialEq)]
pub struct Params {
    pub required: Vec<String>,
    pub rest: Option<String>,
}

impl Params {
    /// Parse a `fn*` parameter form: a list or vector of symbols where `&` introduces
    /// exactly one rest parameter.
    pub fn from_form(form: &Value) -> Result<Params, Error> {
        let Some(items) = form.as_seq() else {
            return Err(Error::TypeError(format!(
                "fn* parameters must be a list or vector, got {}",
                form.type_name()
            )));
        };

        let mut names = Vec::with_capacity(items.len());
        for item in items {
            match item {
                Value::Symbol(name) => names.push(name.as_str()),
                _ => {
                    return Err(Error::TypeError(
                        "fn* parameters must be symbols".to_owned(),
                    ));
                }
            }
        }

        let (required, rest) = match names.iter().position(|name| *name == REST_MARKER) {
            None => (names.as_slice(), None),
            Some(pos) => match &names[pos + 1..] {
                [rest] if *rest != REST_MARKER => (&names[..pos], Some((*rest).to_owned())),
                _ => {
                    return Err(Error::TypeError(
                        "'&' must be followed by exactly one parameter name".to_owned(),
                    ));
                }
            },
        };

        let mut seen: Vec<&str> = Vec::with_capacity(names.len());
        for name in required.iter().copied().chain(rest.as_deref()) {
            if seen.contains(&name) {
                return Err(Error::EvalError(format!("Duplicate parameter name: {name}")));
            }
            seen.push(name);
        }

        Ok(Params {
            required: required.iter().map(|s| (*s).to_owned()).collect(),
            rest,
        })
    }

    /// Number of arguments a call must supply
    pub fn arity(&self) -> Arity {
        match self.rest {
            Some(_) => Arity::AtLeast(self.required.len()),
            None => Arity::Exact(self.required.len()),
        }
    }
}

impl fmt::Display for Params {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "(")?;
        for (i, name) in self.required.iter().enumerate() {
            if i > 0 {
                write!(f, " ")?;
            }
            write!(f, "{name}")?;
        }
        if let Some(rest) = &self.rest {
            if !self.required.is_empty() {
                write!(f, " ")?;
            }
            write!(f, "{REST_MARKER} {rest}")?;
        }
        write!(f, ")")
    }
}

/// A closure: parameters, body and the environment it was created in.
pub struct Lambda {
    pub params: Params,
    pub body: Value,
    pub env: Env,
}

/// Shared mutable cell. Every clone observes the same contents.
#[derive(Clone)]
pub struct Atom(Rc<RefCell<Value>>);

impl Atom {
    pub fn new(value: Value) -> Self {
        Atom(Rc::new(RefCell::new(value)))
    }

    /// Current contents
    pub fn get(&self) -> Value {
        self.0.borrow().clone()
    }

    /// Replace the contents, returning the new value
    pub fn reset(&self, value: Value) -> Value {
        *self.0.borrow_mut() = value.clone();
        value
    }

    pub fn ptr_eq(&self, other: &Atom) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }
}

impl PartialEq for Atom {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other) || *self.0.borrow() == *other.0.borrow()
    }
}

/// Numeric view of a Value, used by arithmetic and comparison primitives.
/// Integers and floats compare by numeric value.
#[derive(Debug, Clone, Copy)]
pub enum Number {
    Integer(i64),
    Float(f64),
}

impl Number {
    pub fn as_f64(self) -> f64 {
        match self {
            Number::Integer(n) => n as f64,
            Number::Float(x) => x,
        }
    }
}

impl PartialEq for Number {
    fn eq(&self, other: &Self) -> bool {
        self.partial_cmp(other) == Some(Ordering::Equal)
    }
}

impl PartialOrd for Number {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        match (self, other) {
            (Number::Integer(a), Number::Integer(b)) => Some(a.cmp(b)),
            _ => self.as_f64().partial_cmp(&other.as_f64()),
        }
    }
}

/// Hashable map key
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum MapKey {
    String(String),
    Keyword(String),
    Symbol(String),
}

impl TryFrom<&Value> for MapKey {
    type Error = Error;

    fn try_from(value: &Value) -> Result<Self, Error> {
        match value {
            Value::String(s) => Ok(MapKey::String(s.clone())),
            Value::Keyword(k) => Ok(MapKey::Keyword(k.clone())),
            Value::Symbol(s) => Ok(MapKey::Symbol(s.clone())),
            other => Err(Error::TypeError(format!(
                "map keys must be strings, keywords or symbols, got {}",
                other.type_name()
            ))),
        }
    }
}

impl From<MapKey> for Value {
    fn from(key: MapKey) -> Self {
        match key {
            MapKey::String(s) => Value::String(s),
            MapKey::Keyword(k) => Value::Keyword(k),
            MapKey::Symbol(s) => Value::Symbol(s),
        }
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fn write_items(f: &mut fmt::Formatter<'_>, items: &[Value]) -> fmt::Result {
            for (i, v) in items.iter().enumerate() {
                if i > 0 {
                    write!(f, ", ")?;
                }
                write!(f, "{v:?}")?;
            }
            Ok(())
        }

        match self {
            Value::Nil => write!(f, "Nil"),
            Value::Bool(b) => write!(f, "Bool({b})"),
            Value::Integer(n) => write!(f, "Integer({n})"),
            Value::Float(x) => write!(f, "Float({x:?})"),
            Value::String(s) => write!(f, "String({s:?})"),
            Value::Keyword(k) => write!(f, "Keyword({k})"),
            Value::Symbol(s) => write!(f, "Symbol({s})"),
            Value::List(items) => {
                write!(f, "List(")?;
                write_items(f, items)?;
                write!(f, ")")
            }
            Value::Vector(items) => {
                write!(f, "Vector(")?;
                write_items(f, items)?;
                write!(f, ")")
            }
            Value::Map(map) => {
                write!(f, "Map(")?;
                for (i, (k, v)) in map.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{k:?} => {v:?}")?;
                }
                write!(f, ")")
            }
            Value::BuiltinFunction { id, .. } => write!(f, "BuiltinFunction({id})"),
            Value::Function(lambda) => write!(
                f,
                "Function(params={}, body={:?})",
                lambda.params, lambda.body
            ),
            Value::Macro(lambda) => {
                write!(f, "Macro(params={}, body={:?})", lambda.params, lambda.body)
            }
            Value::Atom(atom) => write!(f, "Atom({:?})", atom.get()),
        }
    }
}

// From trait implementations for Value - enables .into() conversion
impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_owned())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<f64> for Value {
    fn from(x: f64) -> Self {
        Value::Float(x)
    }
}

impl From<Number> for Value {
    fn from(n: Number) -> Self {
        match n {
            Number::Integer(i) => Value::Integer(i),
            Number::Float(x) => Value::Float(x),
        }
    }
}

impl From<Atom> for Value {
    fn from(atom: Atom) -> Self {
        Value::Atom(atom)
    }
}

macro_rules! impl_from_integer {
    ($int_type:ty) => {
        impl From<$int_type> for Value {
            fn from(n: $int_type) -> Self {
                Value::Integer(i64::from(n))
            }
        }
    };
}

impl_from_integer!(i8);
impl_from_integer!(i16);
impl_from_integer!(i32);
impl_from_integer!(i64);
impl_from_integer!(u8);
impl_from_integer!(u16);
impl_from_integer!(u32);

impl<T: Into<Value>> From<Vec<T>> for Value {
    fn from(v: Vec<T>) -> Self {
        Value::list(v.into_iter().map(Into::into).collect())
    }
}

impl<T: Into<Value>, const N: usize> From<[T; N]> for Value {
    fn from(arr: [T; N]) -> Self {
        Value::list(arr.into_iter().map(Into::into).collect())
    }
}

impl<T: Into<Value> + Clone> From<&[T]> for Value {
    fn from(slice: &[T]) -> Self {
        Value::list(slice.iter().cloned().map(Into::into).collect())
    }
}

// Fallible conversions from `Value` into typed primitive parameters.

impl TryFrom<Value> for i64 {
    type Error = Error;

    fn try_from(value: Value) -> Result<i64, Error> {
        if let Value::Integer(n) = value {
            Ok(n)
        } else {
            Err(Error::TypeError(format!(
                "expected integer, got {}",
                value.type_name()
            )))
        }
    }
}

impl TryFrom<Value> for Number {
    type Error = Error;

    fn try_from(value: Value) -> Result<Number, Error> {
        match value {
            Value::Integer(n) => Ok(Number::Integer(n)),
            Value::Float(x) => Ok(Number::Float(x)),
            other => Err(Error::TypeError(format!(
                "expected number, got {}",
                other.type_name()
            ))),
        }
    }
}

impl TryFrom<Value> for Atom {
    type Error = Error;

    fn try_from(value: Value) -> Result<Atom, Error> {
        if let Value::Atom(atom) = value {
            Ok(atom)
        } else {
            Err(Error::TypeError(format!(
                "expected atom, got {}",
                value.type_name()
            )))
        }
    }
}

/// Helper function for creating symbols - works great in mixed lists!
pub fn sym<S: AsRef<str>>(name: S) -> Value {
    Value::Symbol(name.as_ref().to_owned())
}

/// Helper function for creating keywords, name given without the leading `:`
pub fn kw<S: AsRef<str>>(name: S) -> Value {
    Value::Keyword(name.as_ref().to_owned())
}

/// Helper function for creating Values from anything convertible
pub fn val<T: Into<Value>>(value: T) -> Value {
    value.into()
}

pub fn nil() -> Value {
    Value::Nil
}

impl Value {
    pub fn list(items: Vec<Value>) -> Value {
        Value::List(Rc::new(Seq(items)))
    }

    pub fn vector(items: Vec<Value>) -> Value {
        Value::Vector(Rc::new(Seq(items)))
    }

    pub fn empty_list() -> Value {
        Value::list(Vec::new())
    }

    /// `nil` and `false` are false, everything else is true
    pub fn is_truthy(&self) -> bool {
        !matches!(self, Value::Nil | Value::Bool(false))
    }

    /// Elements of a list or vector
    pub fn as_seq(&self) -> Option<&[Value]> {
        match self {
            Value::List(items) | Value::Vector(items) => Some(items.as_slice()),
            _ => None,
        }
    }

    /// Elements of a list, vector or `nil` (which reads as empty)
    pub(crate) fn as_seq_or_nil(&self) -> Option<&[Value]> {
        match self {
            Value::Nil => Some(&[]),
            other => other.as_seq(),
        }
    }

    /// True for a list whose first element is the given symbol
    pub(crate) fn is_list_headed_by(&self, name: &str) -> bool {
        match self {
            Value::List(items) => matches!(items.first(), Some(Value::Symbol(s)) if s == name),
            _ => false,
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Nil => "nil",
            Value::Bool(_) => "boolean",
            Value::Integer(_) => "integer",
            Value::Float(_) => "float",
            Value::String(_) => "string",
            Value::Keyword(_) => "keyword",
            Value::Symbol(_) => "symbol",
            Value::List(_) => "list",
            Value::Vector(_) => "vector",
            Value::Map(_) => "map",
            Value::BuiltinFunction { .. } | Value::Function(_) => "function",
            Value::Macro(_) => "macro",
            Value::Atom(_) => "atom",
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        // Sequence equality ignores the list/vector distinction
        if let (Some(a), Some(b)) = (self.as_seq(), other.as_seq()) {
            return a == b;
        }

        match (self, other) {
            (Value::Nil, Value::Nil) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Integer(a), Value::Integer(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => a == b,
            (Value::Integer(a), Value::Float(b)) | (Value::Float(b), Value::Integer(a)) => {
                Number::Integer(*a) == Number::Float(*b)
            }
            (Value::String(a), Value::String(b))
            | (Value::Keyword(a), Value::Keyword(b))
            | (Value::Symbol(a), Value::Symbol(b)) => a == b,
            (Value::Map(a), Value::Map(b)) => a == b,
            (Value::BuiltinFunction { id: id1, .. }, Value::BuiltinFunction { id: id2, .. }) => {
                id1 == id2
            }
            (Value::Function(a), Value::Function(b)) | (Value::Macro(a), Value::Macro(b)) => {
                Rc::ptr_eq(a, b)
            }
            (Value::Atom(a), Value::Atom(b)) => a == b,
            _ => false,
        }
    }
}
