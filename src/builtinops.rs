//! Built-in operations registry.
//!
//! Every primitive the root environment starts with is listed once in [`builtin_ops`],
//! together with its name and arity. The implementations are ordinary Rust functions
//! with typed signatures; the adapter layer in [`crate::evaluator::intooperation`]
//! turns them into the erased `Vec<Value> -> Result<Value, Error>` form stored in
//! `Value::BuiltinFunction`.
//!
//! ```text
//! (+ 1 2.5)              ; arithmetic, integer results promote to float
//! (< 1 2 3)              ; chained numeric comparison
//! (cons 0 [1 2])         ; sequence operations always build lists
//! (assoc {:a 1} :b 2)    ; maps are persistent, updates return new maps
//! (swap! a + 1)          ; atoms hold the only mutable state
//! ```
//!
//! ## Error Handling
//!
//! - **Type checks**: numeric operations reject non-numbers with `TypeError`
//! - **Overflow Detection**: integer arithmetic reports overflow as `EvalError`
//! - **Arity Checking**: argument counts are validated before the call, and failures
//!   name the operation in the resulting `ArityError`
//!
//! Primitives that need captured state (`eval`, `slurp`) are registered separately by
//! [`crate::evaluator::create_global_env_with_config`].
//!
//! ## Adding New Operations
//!
//! 1. **Implement the function** with typed parameters (`Value`, `i64`, `Number`, `Atom`,
//!    `&str`, `ValueIter<'_>`, `NumIter<'_>`) and a return type convertible to `Value`
//! 2. **Add it to [`builtin_ops`]** with its identifier and arity
//! 3. **Add test cases** covering edge cases and error conditions

use crate::Error;
use crate::ast::{Atom, MapKey, Number, Value, ValueMap};
use crate::evaluator::intooperation::{IntoOperation, IntoVariadicOperation, OperationFn};
use crate::evaluator::{Arity, NumIter, ValueIter, apply};
use crate::printer::pr_seq;
use crate::reader::read_str;
use std::path::Path;
use std::rc::Rc;

/// Definition of a built-in operation
#[derive(Clone)]
pub struct BuiltinOp {
    /// The identifier this operation is bound to in the root environment
    pub id: &'static str,
    /// The implementation, already adapted to the erased signature
    pub func: Rc<OperationFn>,
    /// Expected number of arguments
    pub arity: Arity,
}

impl std::fmt::Debug for BuiltinOp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BuiltinOp")
            .field("id", &self.id)
            .field("arity", &self.arity)
            .finish_non_exhaustive()
    }
}

impl PartialEq for BuiltinOp {
    fn eq(&self, other: &Self) -> bool {
        // Operations are uniquely identified by their id
        self.id == other.id
    }
}

//
// Builtin Function Implementations
//

fn checked_arith(
    a: Number,
    b: Number,
    name: &str,
    int_op: fn(i64, i64) -> Option<i64>,
    float_op: fn(f64, f64) -> f64,
) -> Result<Number, Error> {
    match (a, b) {
        (Number::Integer(x), Number::Integer(y)) => int_op(x, y)
            .map(Number::Integer)
            .ok_or_else(|| Error::EvalError(format!("Integer overflow in {name}"))),
        _ => Ok(Number::Float(float_op(a.as_f64(), b.as_f64()))),
    }
}

fn add(a: Number, b: Number) -> Result<Number, Error> {
    checked_arith(a, b, "addition", i64::checked_add, |x, y| x + y)
}

fn sub(a: Number, b: Number) -> Result<Number, Error> {
    checked_arith(a, b, "subtraction", i64::checked_sub, |x, y| x - y)
}

fn mul(a: Number, b: Number) -> Result<Number, Error> {
    checked_arith(a, b, "multiplication", i64::checked_mul, |x, y| x * y)
}

fn div(a: Number, b: Number) -> Result<Number, Error> {
    if matches!((a, b), (Number::Integer(_), Number::Integer(0))) {
        return Err(Error::EvalError("Division by zero".into()));
    }
    checked_arith(a, b, "division", i64::checked_div, |x, y| x / y)
}

fn builtin_add(mut args: NumIter<'_>) -> Result<Number, Error> {
    args.try_fold(Number::Integer(0), add)
}

// Unary form negates: (- x) is (0 - x)
fn builtin_sub(first: Number, mut rest: NumIter<'_>) -> Result<Number, Error> {
    if rest.as_slice().is_empty() {
        return sub(Number::Integer(0), first);
    }
    rest.try_fold(first, sub)
}

fn builtin_mul(mut args: NumIter<'_>) -> Result<Number, Error> {
    args.try_fold(Number::Integer(1), mul)
}

// Unary form inverts: (/ x) is (1 / x)
fn builtin_div(first: Number, mut rest: NumIter<'_>) -> Result<Number, Error> {
    if rest.as_slice().is_empty() {
        return div(Number::Integer(1), first);
    }
    rest.try_fold(first, div)
}

// Macro to generate numeric comparison functions
macro_rules! numeric_comparison {
    ($name:ident, $op:tt) => {
        fn $name(first: Number, rest: NumIter<'_>) -> bool {
            // Chain comparisons: all adjacent pairs must satisfy the comparison
            let mut prev = first;
            for current in rest {
                if !(prev $op current) {
                    return false;
                }
                prev = current;
            }
            true
        }
    };
}

// Generate all comparison functions
numeric_comparison!(builtin_lt, <);
numeric_comparison!(builtin_gt, >);
numeric_comparison!(builtin_le, <=);
numeric_comparison!(builtin_ge, >=);

fn builtin_equal(first: Value, second: Value) -> bool {
    first == second
}

// Macro to generate single-argument type predicates
macro_rules! type_predicate {
    ($name:ident, $pattern:pat) => {
        fn $name(value: Value) -> bool {
            matches!(value, $pattern)
        }
    };
}

type_predicate!(builtin_is_nil, Value::Nil);
type_predicate!(builtin_is_true, Value::Bool(true));
type_predicate!(builtin_is_false, Value::Bool(false));
type_predicate!(builtin_is_string, Value::String(_));
type_predicate!(builtin_is_number, Value::Integer(_) | Value::Float(_));
type_predicate!(builtin_is_symbol, Value::Symbol(_));
type_predicate!(builtin_is_keyword, Value::Keyword(_));
type_predicate!(builtin_is_list, Value::List(_));
type_predicate!(builtin_is_vector, Value::Vector(_));
type_predicate!(builtin_is_sequential, Value::List(_) | Value::Vector(_));
type_predicate!(builtin_is_map, Value::Map(_));
type_predicate!(builtin_is_atom, Value::Atom(_));
type_predicate!(
    builtin_is_fn,
    Value::BuiltinFunction { .. } | Value::Function(_)
);
type_predicate!(builtin_is_macro, Value::Macro(_));

fn builtin_symbol(name: &str) -> Value {
    Value::Symbol(name.to_owned())
}

fn builtin_keyword(value: Value) -> Result<Value, Error> {
    match value {
        Value::String(name) | Value::Keyword(name) => Ok(Value::Keyword(name)),
        other => Err(Error::TypeError(format!(
            "keyword expects a string, got {}",
            other.type_name()
        ))),
    }
}

//
// Sequences
//

fn builtin_list(args: ValueIter<'_>) -> Value {
    Value::list(args.cloned().collect())
}

fn builtin_vector(args: ValueIter<'_>) -> Value {
    Value::vector(args.cloned().collect())
}

fn builtin_vec(items: ValueIter<'_>) -> Value {
    Value::vector(items.cloned().collect())
}

fn builtin_cons(first: Value, rest: ValueIter<'_>) -> Value {
    let mut items = Vec::with_capacity(rest.len() + 1);
    items.push(first);
    items.extend(rest.cloned());
    Value::list(items)
}

fn builtin_concat(args: ValueIter<'_>) -> Result<Value, Error> {
    let mut items = Vec::new();
    for arg in args {
        let Some(seq) = arg.as_seq_or_nil() else {
            return Err(Error::TypeError(format!(
                "concat expects lists or vectors, got {}",
                arg.type_name()
            )));
        };
        items.extend_from_slice(seq);
    }
    Ok(Value::list(items))
}

fn builtin_nth(items: ValueIter<'_>, index: i64) -> Result<Value, Error> {
    let len = items.len();
    usize::try_from(index)
        .ok()
        .and_then(|i| items.as_slice().get(i))
        .cloned()
        .ok_or_else(|| {
            Error::TypeError(format!(
                "nth: index {index} out of range for sequence of length {len}"
            ))
        })
}

fn builtin_first(mut items: ValueIter<'_>) -> Value {
    items.next().cloned().unwrap_or(Value::Nil)
}

// rest of nil or an empty sequence is the empty list
fn builtin_rest(items: ValueIter<'_>) -> Value {
    Value::list(items.skip(1).cloned().collect())
}

fn builtin_count(value: Value) -> Result<i64, Error> {
    let len = match &value {
        Value::Nil => 0,
        Value::List(items) | Value::Vector(items) => items.len(),
        Value::Map(map) => map.len(),
        other => {
            return Err(Error::TypeError(format!(
                "count expects a sequence, map or nil, got {}",
                other.type_name()
            )));
        }
    };
    i64::try_from(len).map_err(|_| Error::EvalError("count exceeds integer range".into()))
}

fn builtin_is_empty(value: Value) -> Result<bool, Error> {
    match &value {
        Value::Nil => Ok(true),
        Value::List(items) | Value::Vector(items) => Ok(items.is_empty()),
        Value::Map(map) => Ok(map.is_empty()),
        other => Err(Error::TypeError(format!(
            "empty? expects a sequence, map or nil, got {}",
            other.type_name()
        ))),
    }
}

//
// Maps
//

fn expect_map<'a>(value: &'a Value, op: &str) -> Result<&'a ValueMap, Error> {
    match value {
        Value::Map(map) => Ok(map),
        other => Err(Error::TypeError(format!(
            "{op} expects a map, got {}",
            other.type_name()
        ))),
    }
}

/// Merge alternating key/value arguments into `map`; later pairs win
fn insert_pairs(mut map: ValueMap, pairs: &[Value], op: &str) -> Result<ValueMap, Error> {
    if pairs.len() % 2 != 0 {
        return Err(Error::TypeError(format!(
            "{op} expects an even number of key/value arguments"
        )));
    }
    for pair in pairs.chunks_exact(2) {
        if let [key, value] = pair {
            map.insert(MapKey::try_from(key)?, value.clone());
        }
    }
    Ok(map)
}

fn builtin_hash_map(args: ValueIter<'_>) -> Result<Value, Error> {
    insert_pairs(ValueMap::new(), args.as_slice(), "hash-map").map(Value::Map)
}

fn builtin_assoc(map: Value, pairs: ValueIter<'_>) -> Result<Value, Error> {
    let map = expect_map(&map, "assoc")?.clone();
    insert_pairs(map, pairs.as_slice(), "assoc").map(Value::Map)
}

fn builtin_dissoc(map: Value, keys: ValueIter<'_>) -> Result<Value, Error> {
    let mut map = expect_map(&map, "dissoc")?.clone();
    for key in keys {
        map.remove(&MapKey::try_from(key)?);
    }
    Ok(Value::Map(map))
}

fn builtin_get(map: Value, key: Value) -> Result<Value, Error> {
    if matches!(map, Value::Nil) {
        return Ok(Value::Nil);
    }
    let map = expect_map(&map, "get")?;
    Ok(map
        .get(&MapKey::try_from(&key)?)
        .cloned()
        .unwrap_or(Value::Nil))
}

fn builtin_contains(map: Value, key: Value) -> Result<bool, Error> {
    let map = expect_map(&map, "contains?")?;
    Ok(map.contains_key(&MapKey::try_from(&key)?))
}

fn builtin_keys(map: Value) -> Result<Value, Error> {
    let map = expect_map(&map, "keys")?;
    Ok(Value::list(map.keys().cloned().map(Value::from).collect()))
}

fn builtin_vals(map: Value) -> Result<Value, Error> {
    let map = expect_map(&map, "vals")?;
    Ok(Value::list(map.values().cloned().collect()))
}

//
// Strings and printing
//

fn builtin_pr_str(args: ValueIter<'_>) -> String {
    pr_seq(args.as_slice(), true, " ")
}

fn builtin_str(args: ValueIter<'_>) -> String {
    pr_seq(args.as_slice(), false, "")
}

fn builtin_prn(args: ValueIter<'_>) -> Value {
    println!("{}", pr_seq(args.as_slice(), true, " "));
    Value::Nil
}

fn builtin_println(args: ValueIter<'_>) -> Value {
    println!("{}", pr_seq(args.as_slice(), false, " "));
    Value::Nil
}

fn builtin_read_string(text: &str) -> Result<Value, Error> {
    read_str(text)
}

/// Read a file relative to `base_dir` as a string
pub(crate) fn builtin_slurp(base_dir: &Path, path: &str) -> Result<Value, Error> {
    let full_path = base_dir.join(path);
    tracing::debug!(path = %full_path.display(), "reading file");
    std::fs::read_to_string(&full_path)
        .map(Value::String)
        .map_err(|err| Error::IoError(format!("{}: {err}", full_path.display())))
}

//
// Atoms
//

fn builtin_atom(value: Value) -> Atom {
    Atom::new(value)
}

fn builtin_deref(atom: Atom) -> Value {
    atom.get()
}

fn builtin_reset(atom: Atom, value: Value) -> Value {
    atom.reset(value)
}

// (swap! a f x y) stores (f @a x y)
fn builtin_swap(atom: Atom, func: Value, extra: ValueIter<'_>) -> Result<Value, Error> {
    let mut args = Vec::with_capacity(extra.len() + 1);
    args.push(atom.get());
    args.extend(extra.cloned());
    let new_value = apply(&func, args)?;
    Ok(atom.reset(new_value))
}

fn builtin_throw(value: Value) -> Result<Value, Error> {
    Err(Error::UserError(value))
}

fn builtin_fixed<Args, F>(f: F) -> Rc<OperationFn>
where
    F: IntoOperation<Args>,
{
    <F as IntoOperation<Args>>::into_operation(f)
}

fn builtin_variadic<Args, F>(f: F) -> Rc<OperationFn>
where
    F: IntoVariadicOperation<Args>,
{
    <F as IntoVariadicOperation<Args>>::into_variadic_operation(f)
}

/// Registry of all built-in operations.
///
/// Values hold `Rc` internals and cannot live in a shared static, so the table is
/// built fresh for every root environment.
#[expect(clippy::too_many_lines)] // One entry per primitive, kept together for auditing
pub(crate) fn builtin_ops() -> Vec<BuiltinOp> {
    fn op(id: &'static str, arity: Arity, func: Rc<OperationFn>) -> BuiltinOp {
        BuiltinOp { id, func, arity }
    }

    vec![
        // Arithmetic operations
        op(
            "+",
            Arity::Any,
            builtin_variadic::<(NumIter<'static>,), _>(builtin_add),
        ),
        op(
            "-",
            Arity::AtLeast(1),
            builtin_variadic::<(Number, NumIter<'static>), _>(builtin_sub),
        ),
        op(
            "*",
            Arity::Any,
            builtin_variadic::<(NumIter<'static>,), _>(builtin_mul),
        ),
        op(
            "/",
            Arity::AtLeast(1),
            builtin_variadic::<(Number, NumIter<'static>), _>(builtin_div),
        ),
        // Comparison operations
        op(
            "<",
            Arity::AtLeast(2),
            builtin_variadic::<(Number, NumIter<'static>), _>(builtin_lt),
        ),
        op(
            ">",
            Arity::AtLeast(2),
            builtin_variadic::<(Number, NumIter<'static>), _>(builtin_gt),
        ),
        op(
            "<=",
            Arity::AtLeast(2),
            builtin_variadic::<(Number, NumIter<'static>), _>(builtin_le),
        ),
        op(
            ">=",
            Arity::AtLeast(2),
            builtin_variadic::<(Number, NumIter<'static>), _>(builtin_ge),
        ),
        op(
            "=",
            Arity::Exact(2),
            builtin_fixed::<(Value, Value), _>(builtin_equal),
        ),
        // Type predicates
        op(
            "nil?",
            Arity::Exact(1),
            builtin_fixed::<(Value,), _>(builtin_is_nil),
        ),
        op(
            "true?",
            Arity::Exact(1),
            builtin_fixed::<(Value,), _>(builtin_is_true),
        ),
        op(
            "false?",
            Arity::Exact(1),
            builtin_fixed::<(Value,), _>(builtin_is_false),
        ),
        op(
            "string?",
            Arity::Exact(1),
            builtin_fixed::<(Value,), _>(builtin_is_string),
        ),
        op(
            "number?",
            Arity::Exact(1),
            builtin_fixed::<(Value,), _>(builtin_is_number),
        ),
        op(
            "symbol?",
            Arity::Exact(1),
            builtin_fixed::<(Value,), _>(builtin_is_symbol),
        ),
        op(
            "keyword?",
            Arity::Exact(1),
            builtin_fixed::<(Value,), _>(builtin_is_keyword),
        ),
        op(
            "list?",
            Arity::Exact(1),
            builtin_fixed::<(Value,), _>(builtin_is_list),
        ),
        op(
            "vector?",
            Arity::Exact(1),
            builtin_fixed::<(Value,), _>(builtin_is_vector),
        ),
        op(
            "sequential?",
            Arity::Exact(1),
            builtin_fixed::<(Value,), _>(builtin_is_sequential),
        ),
        op(
            "map?",
            Arity::Exact(1),
            builtin_fixed::<(Value,), _>(builtin_is_map),
        ),
        op(
            "atom?",
            Arity::Exact(1),
            builtin_fixed::<(Value,), _>(builtin_is_atom),
        ),
        op(
            "fn?",
            Arity::Exact(1),
            builtin_fixed::<(Value,), _>(builtin_is_fn),
        ),
        op(
            "macro?",
            Arity::Exact(1),
            builtin_fixed::<(Value,), _>(builtin_is_macro),
        ),
        // Constructors
        op(
            "symbol",
            Arity::Exact(1),
            builtin_fixed::<(&str,), _>(builtin_symbol),
        ),
        op(
            "keyword",
            Arity::Exact(1),
            builtin_fixed::<(Value,), _>(builtin_keyword),
        ),
        // Sequence operations
        op(
            "list",
            Arity::Any,
            builtin_variadic::<(ValueIter<'static>,), _>(builtin_list),
        ),
        op(
            "vector",
            Arity::Any,
            builtin_variadic::<(ValueIter<'static>,), _>(builtin_vector),
        ),
        op(
            "vec",
            Arity::Exact(1),
            builtin_fixed::<(ValueIter<'static>,), _>(builtin_vec),
        ),
        op(
            "cons",
            Arity::Exact(2),
            builtin_fixed::<(Value, ValueIter<'static>), _>(builtin_cons),
        ),
        op(
            "concat",
            Arity::Any,
            builtin_variadic::<(ValueIter<'static>,), _>(builtin_concat),
        ),
        op(
            "nth",
            Arity::Exact(2),
            builtin_fixed::<(ValueIter<'static>, i64), _>(builtin_nth),
        ),
        op(
            "first",
            Arity::Exact(1),
            builtin_fixed::<(ValueIter<'static>,), _>(builtin_first),
        ),
        op(
            "rest",
            Arity::Exact(1),
            builtin_fixed::<(ValueIter<'static>,), _>(builtin_rest),
        ),
        op(
            "count",
            Arity::Exact(1),
            builtin_fixed::<(Value,), _>(builtin_count),
        ),
        op(
            "empty?",
            Arity::Exact(1),
            builtin_fixed::<(Value,), _>(builtin_is_empty),
        ),
        // Map operations
        op(
            "hash-map",
            Arity::Any,
            builtin_variadic::<(ValueIter<'static>,), _>(builtin_hash_map),
        ),
        op(
            "assoc",
            Arity::AtLeast(1),
            builtin_variadic::<(Value, ValueIter<'static>), _>(builtin_assoc),
        ),
        op(
            "dissoc",
            Arity::AtLeast(1),
            builtin_variadic::<(Value, ValueIter<'static>), _>(builtin_dissoc),
        ),
        op(
            "get",
            Arity::Exact(2),
            builtin_fixed::<(Value, Value), _>(builtin_get),
        ),
        op(
            "contains?",
            Arity::Exact(2),
            builtin_fixed::<(Value, Value), _>(builtin_contains),
        ),
        op(
            "keys",
            Arity::Exact(1),
            builtin_fixed::<(Value,), _>(builtin_keys),
        ),
        op(
            "vals",
            Arity::Exact(1),
            builtin_fixed::<(Value,), _>(builtin_vals),
        ),
        // Strings and printing
        op(
            "pr-str",
            Arity::Any,
            builtin_variadic::<(ValueIter<'static>,), _>(builtin_pr_str),
        ),
        op(
            "str",
            Arity::Any,
            builtin_variadic::<(ValueIter<'static>,), _>(builtin_str),
        ),
        op(
            "prn",
            Arity::Any,
            builtin_variadic::<(ValueIter<'static>,), _>(builtin_prn),
        ),
        op(
            "println",
            Arity::Any,
            builtin_variadic::<(ValueIter<'static>,), _>(builtin_println),
        ),
        op(
            "read-string",
            Arity::Exact(1),
            builtin_fixed::<(&str,), _>(builtin_read_string),
        ),
        // Atoms
        op(
            "atom",
            Arity::Exact(1),
            builtin_fixed::<(Value,), _>(builtin_atom),
        ),
        op(
            "deref",
            Arity::Exact(1),
            builtin_fixed::<(Atom,), _>(builtin_deref),
        ),
        op(
            "reset!",
            Arity::Exact(2),
            builtin_fixed::<(Atom, Value), _>(builtin_reset),
        ),
        op(
            "swap!",
            Arity::AtLeast(2),
            builtin_variadic::<(Atom, Value, ValueIter<'static>), _>(builtin_swap),
        ),
        // Error handling
        op(
            "throw",
            Arity::Exact(1),
            builtin_fixed::<(Value,), _>(builtin_throw),
        ),
    ]
}
