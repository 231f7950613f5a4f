//! Adapters from typed Rust functions to the erased [`OperationFn`] stored in
//! [`Value::BuiltinFunction`].
//!
//! A builtin such as `fn builtin_nth(items: ValueIter<'_>, index: i64)` is written
//! against the argument types it needs; the adapter checks the argument count,
//! converts each evaluated argument with [`FromArg`], and turns the return value
//! into `Result<Value, Error>` with [`IntoResult`]. Callers register builtins through
//! the `Environment` registration methods rather than using these traits directly.

use std::iter::FusedIterator;
use std::marker::PhantomData;
use std::rc::Rc;

use crate::Error;
use crate::ast::{Number, Value};
use crate::evaluator::Arity;

/// Erased builtin: owns its evaluated arguments and returns a value or an error.
/// Values share `Rc` internals, so operations are neither `Send` nor `Sync`.
pub type OperationFn = dyn Fn(Vec<Value>) -> Result<Value, Error>;

// ---------------------------------------------------------------------------
// Single arguments
// ---------------------------------------------------------------------------

/// Conversion of one evaluated argument into a builtin parameter.
///
/// `Out<'a>` may borrow from the argument slot (`&str`, sequence iterators) or take
/// the value out of it (`Value`, `i64`, `Number`, `Atom`).
pub trait FromArg {
    type Out<'a>;

    fn extract(slot: &mut Value) -> Result<Self::Out<'_>, Error>;
}

impl FromArg for Value {
    type Out<'a> = Value;

    fn extract(slot: &mut Value) -> Result<Value, Error> {
        Ok(std::mem::replace(slot, Value::Nil))
    }
}

// `i64`, `Number` and `Atom` through their `TryFrom<Value>` impls in `ast.rs`
impl<T> FromArg for T
where
    Value: TryInto<T, Error = Error>,
{
    type Out<'a> = T;

    fn extract(slot: &mut Value) -> Result<T, Error> {
        std::mem::replace(slot, Value::Nil).try_into()
    }
}

impl FromArg for &str {
    type Out<'a> = &'a str;

    fn extract(slot: &mut Value) -> Result<&str, Error> {
        match slot {
            Value::String(s) => Ok(s.as_str()),
            other => Err(Error::TypeError(format!(
                "expected string, got {}",
                other.type_name()
            ))),
        }
    }
}

// A list, vector or nil argument viewed as its elements
impl<K: ElementKind> FromArg for SeqArgs<'_, K> {
    type Out<'a> = SeqArgs<'a, K>;

    fn extract(slot: &mut Value) -> Result<SeqArgs<'_, K>, Error> {
        let slot: &Value = slot;
        match slot.as_seq_or_nil() {
            Some(items) => SeqArgs::new(items),
            None => Err(Error::TypeError(format!(
                "expected list or vector, got {}",
                slot.type_name()
            ))),
        }
    }
}

// ---------------------------------------------------------------------------
// Sequences of arguments
// ---------------------------------------------------------------------------

/// How each element of a [`SeqArgs`] is viewed. Every element is checked with
/// [`ElementKind::view`] before iteration starts, so a mistyped element is reported
/// even if the builtin stops early.
#[doc(hidden)]
pub trait ElementKind {
    type Item<'a>;

    /// Description used in the `TypeError` for a rejected element
    const EXPECTED: &'static str;

    fn view(value: &Value) -> Option<Self::Item<'_>>;
}

#[doc(hidden)]
pub struct AnyValue;

impl ElementKind for AnyValue {
    type Item<'a> = &'a Value;

    const EXPECTED: &'static str = "value";

    fn view(value: &Value) -> Option<&Value> {
        Some(value)
    }
}

#[doc(hidden)]
pub struct Numeric;

impl ElementKind for Numeric {
    type Item<'a> = Number;

    const EXPECTED: &'static str = "number";

    fn view(value: &Value) -> Option<Number> {
        match value {
            Value::Integer(n) => Some(Number::Integer(*n)),
            Value::Float(x) => Some(Number::Float(*x)),
            _ => None,
        }
    }
}

/// Borrowed, pre-validated iterator over a run of argument values.
#[doc(hidden)]
pub struct SeqArgs<'a, K: ElementKind> {
    items: std::slice::Iter<'a, Value>,
    kind: PhantomData<K>,
}

impl<'a, K: ElementKind> SeqArgs<'a, K> {
    pub(crate) fn new(items: &'a [Value]) -> Result<Self, Error> {
        if let Some(bad) = items.iter().find(|v| K::view(v).is_none()) {
            return Err(Error::TypeError(format!(
                "expected {}, got {}",
                K::EXPECTED,
                bad.type_name()
            )));
        }
        Ok(SeqArgs {
            items: items.iter(),
            kind: PhantomData,
        })
    }

    /// The elements not yet yielded
    pub(crate) fn as_slice(&self) -> &'a [Value] {
        self.items.as_slice()
    }
}

impl<'a, K: ElementKind> Iterator for SeqArgs<'a, K> {
    type Item = K::Item<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        self.items.by_ref().find_map(K::view)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.items.size_hint()
    }
}

impl<K: ElementKind> ExactSizeIterator for SeqArgs<'_, K> {}
impl<K: ElementKind> FusedIterator for SeqArgs<'_, K> {}

/// Any values, borrowed
pub type ValueIter<'a> = SeqArgs<'a, AnyValue>;

/// Integers and floats; a non-number anywhere in the run is a `TypeError`
pub type NumIter<'a> = SeqArgs<'a, Numeric>;

/// Conversion of the trailing arguments of a variadic builtin.
pub trait FromRestArgs {
    type Out<'a>;

    fn collect_rest(rest: &[Value]) -> Result<Self::Out<'_>, Error>;
}

impl<K: ElementKind> FromRestArgs for SeqArgs<'static, K> {
    type Out<'a> = SeqArgs<'a, K>;

    fn collect_rest(rest: &[Value]) -> Result<SeqArgs<'_, K>, Error> {
        SeqArgs::new(rest)
    }
}

// ---------------------------------------------------------------------------
// Return values
// ---------------------------------------------------------------------------

/// Builtins may return anything convertible to `Value`, or a `Result` of it.
pub trait IntoResult {
    fn into_result(self) -> Result<Value, Error>;
}

impl<T: Into<Value>> IntoResult for T {
    fn into_result(self) -> Result<Value, Error> {
        Ok(self.into())
    }
}

impl<T: Into<Value>> IntoResult for Result<T, Error> {
    fn into_result(self) -> Result<Value, Error> {
        self.map(Into::into)
    }
}

// ---------------------------------------------------------------------------
// Adapters
// ---------------------------------------------------------------------------

/// A function taking a fixed number of typed parameters. `Args` is the tuple of
/// parameter types, e.g. `(i64, i64)`.
pub trait IntoOperation<Args> {
    fn into_operation(self) -> Rc<OperationFn>;
}

/// A function whose last parameter collects the remaining arguments
/// (`ValueIter` or `NumIter`), after up to two fixed parameters.
pub trait IntoVariadicOperation<Args> {
    fn into_variadic_operation(self) -> Rc<OperationFn>;
}

macro_rules! fixed_arity_adapter {
    ($count:literal; $( $slot:ident : $A:ident ),+) => {
        impl<F, R, $( $A: FromArg ),+> IntoOperation<( $( $A, )+ )> for F
        where
            F: for<'a> Fn( $( $A::Out<'a> ),+ ) -> R + 'static,
            R: IntoResult,
        {
            fn into_operation(self) -> Rc<OperationFn> {
                Rc::new(move |mut args: Vec<Value>| {
                    let got = args.len();
                    let [ $( $slot ),+ ] = args.as_mut_slice() else {
                        return Err(Error::arity_error(Arity::Exact($count), got));
                    };
                    $( let $slot = $A::extract($slot)?; )+
                    self( $( $slot ),+ ).into_result()
                })
            }
        }
    };
}

fixed_arity_adapter!(1; a: A);
fixed_arity_adapter!(2; a: A, b: B);
fixed_arity_adapter!(3; a: A, b: B, c: C);

impl<F, I, R> IntoVariadicOperation<(I,)> for F
where
    I: FromRestArgs,
    F: for<'a> Fn(I::Out<'a>) -> R + 'static,
    R: IntoResult,
{
    fn into_variadic_operation(self) -> Rc<OperationFn> {
        Rc::new(move |args: Vec<Value>| self(I::collect_rest(&args)?).into_result())
    }
}

macro_rules! prefixed_variadic_adapter {
    ($count:literal; $( $slot:ident : $A:ident ),+) => {
        impl<F, I, R, $( $A: FromArg ),+> IntoVariadicOperation<( $( $A, )+ I, )> for F
        where
            I: FromRestArgs,
            F: for<'a> Fn( $( $A::Out<'a>, )+ I::Out<'a> ) -> R + 'static,
            R: IntoResult,
        {
            fn into_variadic_operation(self) -> Rc<OperationFn> {
                Rc::new(move |mut args: Vec<Value>| {
                    let got = args.len();
                    let [ $( $slot, )+ rest @ .. ] = args.as_mut_slice() else {
                        return Err(Error::arity_error(Arity::AtLeast($count), got));
                    };
                    $( let $slot = $A::extract($slot)?; )+
                    let rest = I::collect_rest(rest)?;
                    self( $( $slot, )+ rest ).into_result()
                })
            }
        }
    };
}

prefixed_variadic_adapter!(1; a: A);
prefixed_variadic_adapter!(2; a: A, b: B);
