use crate::ast::{Lambda, Params, Value, ValueMap, sym};
use crate::builtinops::{builtin_ops, builtin_slurp};
use crate::printer::pr_str;
use crate::reader::read_str;
use crate::{Error, MAX_EVAL_DEPTH};
use std::cell::Cell;
use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;
use std::rc::Rc;
use std::sync::LazyLock;

pub mod environment;
pub mod intooperation;

pub use environment::{Env, Environment};
pub use intooperation::{NumIter, ValueIter};

/// Number of arguments an operation accepts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Arity {
    Exact(usize),
    AtLeast(usize),
    /// Inclusive bounds
    Range(usize, usize),
    Any,
}

impl Arity {
    /// Check an argument count, producing an ArityError without expression context
    pub fn validate(&self, got: usize) -> Result<(), Error> {
        let ok = match *self {
            Arity::Exact(n) => got == n,
            Arity::AtLeast(n) => got >= n,
            Arity::Range(min, max) => (min..=max).contains(&got),
            Arity::Any => true,
        };
        if ok {
            Ok(())
        } else {
            Err(Error::arity_error(*self, got))
        }
    }
}

impl fmt::Display for Arity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Arity::Exact(n) => write!(f, "exactly {n}"),
            Arity::AtLeast(n) => write!(f, "at least {n}"),
            Arity::Range(min, max) => write!(f, "between {min} and {max}"),
            Arity::Any => write!(f, "any number of"),
        }
    }
}

/// Forms whose operands are not evaluated before the form runs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SpecialForm {
    Def,
    DefMacro,
    Let,
    Do,
    If,
    Fn,
    Quote,
    Quasiquote,
    QuasiquoteExpand,
    MacroExpand,
}

impl SpecialForm {
    const ALL: [SpecialForm; 10] = [
        SpecialForm::Def,
        SpecialForm::DefMacro,
        SpecialForm::Let,
        SpecialForm::Do,
        SpecialForm::If,
        SpecialForm::Fn,
        SpecialForm::Quote,
        SpecialForm::Quasiquote,
        SpecialForm::QuasiquoteExpand,
        SpecialForm::MacroExpand,
    ];

    fn name(self) -> &'static str {
        match self {
            SpecialForm::Def => "def!",
            SpecialForm::DefMacro => "defmacro!",
            SpecialForm::Let => "let*",
            SpecialForm::Do => "do",
            SpecialForm::If => "if",
            SpecialForm::Fn => "fn*",
            SpecialForm::Quote => "quote",
            SpecialForm::Quasiquote => "quasiquote",
            SpecialForm::QuasiquoteExpand => "quasiquoteexpand",
            SpecialForm::MacroExpand => "macroexpand",
        }
    }

    fn arity(self) -> Arity {
        match self {
            SpecialForm::Def | SpecialForm::DefMacro | SpecialForm::Let | SpecialForm::Fn => {
                Arity::Exact(2)
            }
            SpecialForm::Do => Arity::Any,
            SpecialForm::If => Arity::Range(2, 3),
            SpecialForm::Quote
            | SpecialForm::Quasiquote
            | SpecialForm::QuasiquoteExpand
            | SpecialForm::MacroExpand => Arity::Exact(1),
        }
    }
}

static SPECIAL_FORMS: LazyLock<HashMap<&'static str, SpecialForm>> =
    LazyLock::new(|| SpecialForm::ALL.iter().map(|f| (f.name(), *f)).collect());

fn find_special_form(name: &str) -> Option<SpecialForm> {
    SPECIAL_FORMS.get(name).copied()
}

// =============================================================================
// Evaluation depth
// =============================================================================

thread_local! {
    static EVAL_DEPTH: Cell<usize> = const { Cell::new(0) };
    static MAX_DEPTH: Cell<usize> = const { Cell::new(MAX_EVAL_DEPTH) };
}

/// Set the evaluation depth limit of the current thread. Returns the previous limit.
pub fn set_max_eval_depth(depth: usize) -> usize {
    MAX_DEPTH.with(|max| max.replace(depth))
}

/// Evaluation depth limit of the current thread
pub fn max_eval_depth() -> usize {
    MAX_DEPTH.with(Cell::get)
}

/// One level of nested evaluation on this thread, released on drop.
///
/// The count is shared by every entry into the evaluator, so recursion that
/// passes through `apply` or a builtin such as `eval` or `swap!` is limited too.
struct DepthGuard;

impl DepthGuard {
    fn enter() -> Result<Self, Error> {
        let max = max_eval_depth();
        EVAL_DEPTH.with(|depth| {
            let current = depth.get();
            if current >= max {
                return Err(Error::EvalError(format!(
                    "Evaluation depth limit exceeded (max: {max})"
                )));
            }
            depth.set(current + 1);
            Ok(DepthGuard)
        })
    }
}

impl Drop for DepthGuard {
    fn drop(&mut self) {
        EVAL_DEPTH.with(|depth| depth.set(depth.get().saturating_sub(1)));
    }
}

/// Evaluate a form (public API)
pub fn eval(expr: &Value, env: &Env) -> Result<Value, Error> {
    eval_with_depth_tracking(expr, env)
}

/// Evaluate a form with depth tracking to prevent stack overflow.
///
/// Forms in tail position (the chosen `if` branch, the last `do` form, a `let*`
/// body, a closure body, and a quasiquote expansion) replace the current form
/// and environment and go around the loop again instead of recursing.
fn eval_with_depth_tracking(expr: &Value, env: &Env) -> Result<Value, Error> {
    let _depth = DepthGuard::enter()?;

    if !matches!(expr, Value::List(_)) {
        return eval_ast(expr, env);
    }

    let mut ast = expr.clone();
    let mut env = Rc::clone(env);

    loop {
        ast = expand_macros(ast, &env)?;

        let Value::List(items) = &ast else {
            return eval_ast(&ast, &env);
        };
        let items = Rc::clone(items);
        // The empty list evaluates to itself
        let Some((head, args)) = items.split_first() else {
            return Ok(ast);
        };

        if let Value::Symbol(name) = head
            && let Some(form) = find_special_form(name)
        {
            form.arity()
                .validate(args.len())
                .map_err(|err| err.with_expression(|| form.name().to_owned()))?;

            match form {
                SpecialForm::Def => return eval_def(args, &env, false),
                SpecialForm::DefMacro => return eval_def(args, &env, true),
                SpecialForm::Fn => return eval_fn(args, &env),
                SpecialForm::Quote => return Ok(single_operand(form, args)?.clone()),
                SpecialForm::QuasiquoteExpand => return quasiquote(single_operand(form, args)?),
                SpecialForm::MacroExpand => {
                    let target = unquoted(single_operand(form, args)?);
                    return expand_macros(target.clone(), &env);
                }
                SpecialForm::Let => {
                    let (body, let_env) = eval_let_bindings(args, &env)?;
                    ast = body;
                    env = let_env;
                }
                SpecialForm::Do => {
                    let Some((last, init)) = args.split_last() else {
                        return Ok(Value::Nil);
                    };
                    for form in init {
                        eval_with_depth_tracking(form, &env)?;
                    }
                    ast = last.clone();
                }
                SpecialForm::If => {
                    ast = eval_if(args, &env)?;
                }
                SpecialForm::Quasiquote => {
                    ast = quasiquote(single_operand(form, args)?)?;
                }
            }
            continue;
        }

        // Function application
        let func = eval_with_depth_tracking(head, &env)?;
        let args = eval_args(args, &env)?;
        match func {
            Value::BuiltinFunction { func, .. } => return func(args),
            Value::Function(lambda) | Value::Macro(lambda) => {
                env = Environment::bind_parameters(&lambda.env, &lambda.params, args)
                    .map_err(|err| err.with_expression(|| ast.to_string()))?;
                ast = lambda.body.clone();
            }
            other => return Err(Error::NotCallableError(other.to_string())),
        }
    }
}

/// Evaluate a non-application form: symbol lookup, or element-wise evaluation of
/// collections. Everything else evaluates to itself.
fn eval_ast(expr: &Value, env: &Env) -> Result<Value, Error> {
    match expr {
        Value::Symbol(name) => env.lookup(name),
        Value::List(items) => Ok(Value::list(eval_args(items, env)?)),
        Value::Vector(items) => Ok(Value::vector(eval_args(items, env)?)),
        Value::Map(map) => {
            let mut evaluated = ValueMap::new();
            for (key, value) in map.iter() {
                evaluated.insert(key.clone(), eval_with_depth_tracking(value, env)?);
            }
            Ok(Value::Map(evaluated))
        }
        other => Ok(other.clone()),
    }
}

/// Evaluate argument expressions in order
fn eval_args(args: &[Value], env: &Env) -> Result<Vec<Value>, Error> {
    let mut values = Vec::with_capacity(args.len());
    for arg in args {
        values.push(eval_with_depth_tracking(arg, env)?);
    }
    Ok(values)
}

fn single_operand(form: SpecialForm, args: &[Value]) -> Result<&Value, Error> {
    match args {
        [operand] => Ok(operand),
        _ => Err(Error::arity_error_with_expr(
            Arity::Exact(1),
            args.len(),
            form.name().to_owned(),
        )),
    }
}

/// `(def! name expr)` and `(defmacro! name expr)`
fn eval_def(args: &[Value], env: &Env, as_macro: bool) -> Result<Value, Error> {
    let form_name = if as_macro { "defmacro!" } else { "def!" };
    match args {
        [Value::Symbol(name), expr] => {
            let value = eval_with_depth_tracking(expr, env)?;
            let value = if as_macro {
                // The macro shares the closure; the original function value is left as is
                match value {
                    Value::Function(lambda) | Value::Macro(lambda) => Value::Macro(lambda),
                    other => {
                        return Err(Error::TypeError(format!(
                            "{form_name} requires a function, got {}",
                            other.type_name()
                        )));
                    }
                }
            } else {
                value
            };
            Ok(env.define(name.clone(), value))
        }
        [other, _] => Err(Error::TypeError(format!(
            "{form_name} requires a symbol name, got {}",
            other.type_name()
        ))),
        _ => Err(Error::arity_error_with_expr(
            Arity::Exact(2),
            args.len(),
            form_name.to_owned(),
        )),
    }
}

/// `(let* (n1 e1 n2 e2 ...) body)`: returns the body and the new frame so the
/// caller can evaluate the body in tail position. Each binding sees the earlier ones.
fn eval_let_bindings(args: &[Value], env: &Env) -> Result<(Value, Env), Error> {
    let [bindings, body] = args else {
        return Err(Error::arity_error_with_expr(
            Arity::Exact(2),
            args.len(),
            "let*".to_owned(),
        ));
    };
    let Some(bindings) = bindings.as_seq() else {
        return Err(Error::TypeError(format!(
            "let* bindings must be a list or vector, got {}",
            bindings.type_name()
        )));
    };
    if bindings.len() % 2 != 0 {
        return Err(Error::TypeError(
            "let* bindings must have an even number of forms".to_owned(),
        ));
    }

    let let_env: Env = Rc::new(Environment::with_parent(Rc::clone(env)));
    let mut remaining = bindings;
    while let [name, expr, rest @ ..] = remaining {
        let Value::Symbol(name) = name else {
            return Err(Error::TypeError(format!(
                "let* binding names must be symbols, got {}",
                name.type_name()
            )));
        };
        let value = eval_with_depth_tracking(expr, &let_env)?;
        let_env.define(name.clone(), value);
        remaining = rest;
    }
    Ok((body.clone(), let_env))
}

/// `(if cond then else?)`: returns the branch to evaluate in tail position
fn eval_if(args: &[Value], env: &Env) -> Result<Value, Error> {
    let (condition, then_branch, else_branch) = match args {
        [condition, then_branch] => (condition, then_branch, None),
        [condition, then_branch, else_branch] => (condition, then_branch, Some(else_branch)),
        _ => {
            return Err(Error::arity_error_with_expr(
                Arity::Range(2, 3),
                args.len(),
                "if".to_owned(),
            ));
        }
    };

    if eval_with_depth_tracking(condition, env)?.is_truthy() {
        Ok(then_branch.clone())
    } else {
        Ok(else_branch.cloned().unwrap_or(Value::Nil))
    }
}

/// `(fn* params body)`
fn eval_fn(args: &[Value], env: &Env) -> Result<Value, Error> {
    match args {
        [params, body] => Ok(Value::Function(Rc::new(Lambda {
            params: Params::from_form(params)?,
            body: body.clone(),
            env: Rc::clone(env),
        }))),
        _ => Err(Error::arity_error_with_expr(
            Arity::Exact(2),
            args.len(),
            "fn*".to_owned(),
        )),
    }
}

/// The macro closure and raw operands when `form` is a call to a macro bound in `env`
fn macro_call(form: &Value, env: &Env) -> Option<(Rc<Lambda>, Vec<Value>)> {
    let Value::List(items) = form else {
        return None;
    };
    let Some((Value::Symbol(name), args)) = items.split_first() else {
        return None;
    };
    match env.get(name)? {
        Value::Macro(lambda) => Some((lambda, args.to_vec())),
        _ => None,
    }
}

// `(macroexpand 'form)` and `(macroexpand form)` expand the same form
fn unquoted(form: &Value) -> &Value {
    if let Value::List(items) = form
        && let [Value::Symbol(head), inner] = items.as_slice()
        && head == "quote"
    {
        return inner;
    }
    form
}

/// Repeatedly expand `form` while it is a call to a macro
pub fn macroexpand(form: &Value, env: &Env) -> Result<Value, Error> {
    expand_macros(form.clone(), env)
}

fn expand_macros(mut form: Value, env: &Env) -> Result<Value, Error> {
    while let Some((lambda, args)) = macro_call(&form, env) {
        tracing::trace!(form = %form, "expanding macro call");
        form = apply_lambda(&lambda, args)?;
    }
    Ok(form)
}

fn apply_lambda(lambda: &Lambda, args: Vec<Value>) -> Result<Value, Error> {
    let frame = Environment::bind_parameters(&lambda.env, &lambda.params, args)?;
    eval_with_depth_tracking(&lambda.body, &frame)
}

/// Call any callable value with already evaluated arguments
pub fn apply(func: &Value, args: Vec<Value>) -> Result<Value, Error> {
    match func {
        Value::BuiltinFunction { func, .. } => func(args),
        Value::Function(lambda) | Value::Macro(lambda) => apply_lambda(lambda, args),
        other => Err(Error::NotCallableError(other.to_string())),
    }
}

/// Rewrite a quasiquoted template into list-building code using `cons`, `concat`
/// and `vec`. `unquote` operands are spliced in as code; `splice-unquote` operands
/// are concatenated in place.
pub fn quasiquote(form: &Value) -> Result<Value, Error> {
    match form {
        Value::Symbol(_) | Value::Map(_) => Ok(Value::list(vec![sym("quote"), form.clone()])),
        Value::List(items) if form.is_list_headed_by("unquote") => quasi_operand(items),
        Value::List(items) => quasiquote_seq(items),
        Value::Vector(items) => Ok(Value::list(vec![sym("vec"), quasiquote_seq(items)?])),
        other => Ok(other.clone()),
    }
}

fn quasiquote_seq(items: &[Value]) -> Result<Value, Error> {
    let mut acc = Value::empty_list();
    for item in items.iter().rev() {
        acc = match item {
            Value::List(parts) if item.is_list_headed_by("splice-unquote") => {
                Value::list(vec![sym("concat"), quasi_operand(parts)?, acc])
            }
            _ => Value::list(vec![sym("cons"), quasiquote(item)?, acc]),
        };
    }
    Ok(acc)
}

// Operand of `(unquote x)` or `(splice-unquote x)`
fn quasi_operand(parts: &[Value]) -> Result<Value, Error> {
    match parts {
        [_, operand] => Ok(operand.clone()),
        [head, ..] => Err(Error::arity_error_with_expr(
            Arity::Exact(1),
            parts.len() - 1,
            head.to_string(),
        )),
        [] => Ok(Value::empty_list()),
    }
}

/// Read, evaluate and print one form
pub fn rep(input: &str, env: &Env) -> Result<String, Error> {
    let form = read_str(input)?;
    let result = eval(&form, env)?;
    Ok(pr_str(&result, true))
}

/// Settings for building the global environment
#[derive(Debug, Clone)]
pub struct EnvConfig {
    /// Relative paths given to `slurp` and `load-file` resolve against this directory
    pub base_dir: PathBuf,
}

impl Default for EnvConfig {
    fn default() -> Self {
        EnvConfig {
            base_dir: std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
        }
    }
}

// Definitions written in the language itself, evaluated into every global environment
const PRELUDE: &[&str] = &[
    "(def! not (fn* (a) (if a false true)))",
    r#"(def! load-file (fn* (f) (eval (read-string (str "(do " (slurp f) "\nnil)")))))"#,
    r#"(defmacro! cond (fn* (& xs) (if (> (count xs) 0) (list 'if (first xs) (if (> (count xs) 1) (nth xs 1) (throw "odd number of forms to cond")) (cons 'cond (rest (rest xs)))))))"#,
];

/// Create a global environment with built-in functions, resolving files against
/// the current directory
pub fn create_global_env() -> Result<Env, Error> {
    create_global_env_with_config(EnvConfig::default())
}

/// Create a global environment with built-in functions and the prelude
pub fn create_global_env_with_config(config: EnvConfig) -> Result<Env, Error> {
    let env: Env = Rc::new(Environment::new());

    let ops = builtin_ops();
    let builtin_count = ops.len();
    for op in ops {
        env.register_with_arity(op.id, op.arity, op.func);
    }

    // `eval` always runs in the root environment. A weak handle avoids a cycle
    // between the environment and a function stored inside it.
    let root = Rc::downgrade(&env);
    env.register_builtin_function("eval", Arity::Exact(1), move |args| {
        let root = root
            .upgrade()
            .ok_or_else(|| Error::EvalError("global environment no longer exists".to_owned()))?;
        match args.as_slice() {
            [form] => eval(form, &root),
            _ => Err(Error::arity_error(Arity::Exact(1), args.len())),
        }
    });

    let base_dir = config.base_dir.clone();
    env.register_builtin_function("slurp", Arity::Exact(1), move |args| {
        match args.as_slice() {
            [Value::String(path)] => builtin_slurp(&base_dir, path),
            [other] => Err(Error::TypeError(format!(
                "expected string, got {}",
                other.type_name()
            ))),
            _ => Err(Error::arity_error(Arity::Exact(1), args.len())),
        }
    });

    env.define("*ARGV*", Value::empty_list());

    for source in PRELUDE {
        eval(&read_str(source)?, &env)?;
    }

    tracing::debug!(
        builtins = builtin_count,
        prelude = PRELUDE.len(),
        base_dir = %config.base_dir.display(),
        "created global environment"
    );
    Ok(env)
}
