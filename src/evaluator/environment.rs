use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

use crate::Error;
use crate::ast::{Params, Value};
use crate::evaluator::Arity;
use crate::evaluator::intooperation::{IntoOperation, IntoVariadicOperation, OperationFn};

/// Shared handle to an environment frame. Closures keep their defining frame alive.
pub type Env = Rc<Environment>;

/// One lexical scope: its own bindings plus a link to the enclosing scope
#[derive(Default)]
pub struct Environment {
    bindings: RefCell<HashMap<String, Value>>,
    parent: Option<Env>,
}

impl fmt::Debug for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Environment")
            .field("bindings", &self.bindings.borrow().len())
            .field("has_parent", &self.parent.is_some())
            .finish()
    }
}

impl Environment {
    pub fn new() -> Self {
        Environment {
            bindings: RefCell::new(HashMap::new()),
            parent: None,
        }
    }

    pub fn with_parent(parent: Env) -> Self {
        Environment {
            bindings: RefCell::new(HashMap::new()),
            parent: Some(parent),
        }
    }

    /// Bind `name` in this frame only, shadowing any outer binding
    pub fn define(&self, name: impl Into<String>, value: Value) -> Value {
        self.bindings.borrow_mut().insert(name.into(), value.clone());
        value
    }

    /// Look `name` up in this frame, then each enclosing frame in turn
    pub fn get(&self, name: &str) -> Option<Value> {
        let mut current = Some(self);
        while let Some(env) = current {
            if let Some(value) = env.bindings.borrow().get(name) {
                return Some(value.clone());
            }
            current = env.parent.as_deref();
        }
        None
    }

    /// Like [`Environment::get`], failing with `NameError` when unbound
    pub fn lookup(&self, name: &str) -> Result<Value, Error> {
        self.get(name)
            .ok_or_else(|| Error::NameError(name.to_owned()))
    }

    /// Build the frame for a closure call: a child of `outer` with each parameter
    /// bound to its argument and any rest parameter bound to a list of the remainder.
    pub fn bind_parameters(outer: &Env, params: &Params, args: Vec<Value>) -> Result<Env, Error> {
        params.arity().validate(args.len())?;

        let frame = Environment::with_parent(Rc::clone(outer));
        {
            let mut bindings = frame.bindings.borrow_mut();
            let mut args = args.into_iter();
            for (name, arg) in params.required.iter().zip(args.by_ref()) {
                bindings.insert(name.clone(), arg);
            }
            if let Some(rest) = &params.rest {
                bindings.insert(rest.clone(), Value::list(args.collect()));
            }
        }
        Ok(Rc::new(frame))
    }

    /// Register a builtin that works directly on the evaluated argument vector.
    ///
    /// This is the low-level API used for primitives that need captured state,
    /// such as `eval` (which holds the root environment) and `slurp` (which holds
    /// the base directory). For most new code prefer the typed
    /// [`Environment::register_builtin_operation`].
    pub fn register_builtin_function<F>(&self, name: &str, arity: Arity, func: F)
    where
        F: Fn(Vec<Value>) -> Result<Value, Error> + 'static,
    {
        self.register_with_arity(name, arity, Rc::new(func));
    }

    /// Register a strongly-typed Rust function as a builtin operation using
    /// automatic argument extraction and result conversion.
    ///
    /// ```
    /// use malxp::evaluator::{create_global_env, rep};
    ///
    /// fn add(a: i64, b: i64) -> i64 { a + b }
    /// let env = create_global_env().unwrap();
    /// env.register_builtin_operation::<_, (i64, i64)>("add2", add);
    /// assert_eq!(rep("(add2 2 3)", &env).unwrap(), "5");
    /// ```
    ///
    /// Supported parameter types:
    /// - `i64` (integer), `Number` (integer or float), `Atom`
    /// - `&str` (borrowed string slices)
    /// - `Value` (owned access to the raw value)
    /// - `ValueIter<'_>` / `NumIter<'_>` (elements of a list, vector or nil argument)
    ///
    /// Arity is enforced automatically and conversion failures yield `TypeError`.
    pub fn register_builtin_operation<F, Args>(&self, name: &str, func: F)
    where
        F: IntoOperation<Args> + 'static,
    {
        let wrapped = func.into_operation();
        self.define(
            name,
            Value::BuiltinFunction {
                id: name.to_owned(),
                func: wrapped,
            },
        );
    }

    /// Register a variadic builtin operation with explicit arity metadata.
    ///
    /// The Rust signature ends in a rest parameter (`ValueIter<'_>` or
    /// `NumIter<'_>`), optionally after a fixed prefix. The provided [`Arity`]
    /// is validated at call time, since the minimum and maximum argument
    /// counts are not always derivable from the Rust type signature alone.
    pub fn register_variadic_builtin_operation<F, Args>(&self, name: &str, arity: Arity, func: F)
    where
        F: IntoVariadicOperation<Args> + 'static,
    {
        self.register_with_arity(name, arity, func.into_variadic_operation());
    }

    pub(crate) fn register_with_arity(&self, name: &str, arity: Arity, inner: Rc<OperationFn>) {
        let id = name.to_owned();
        let wrapped = Rc::new(move |args: Vec<Value>| {
            arity
                .validate(args.len())
                .map_err(|err| err.with_expression(|| id.clone()))?;
            inner(args)
        });

        self.define(
            name,
            Value::BuiltinFunction {
                id: name.to_owned(),
                func: wrapped,
            },
        );
    }

    /// Get all bindings in this environment and its parents
    /// Returns a Vec of (name, value) pairs sorted by name
    pub fn get_all_bindings(&self) -> Vec<(String, Value)> {
        let mut bindings = HashMap::new();

        // Parent bindings first so local ones override them
        if let Some(parent) = &self.parent {
            for (name, value) in parent.get_all_bindings() {
                bindings.insert(name, value);
            }
        }

        for (name, value) in self.bindings.borrow().iter() {
            bindings.insert(name.clone(), value.clone());
        }

        let mut result: Vec<_> = bindings.into_iter().collect();
        result.sort_by(|a, b| a.0.cmp(&b.0));
        result
    }
}

#[cfg(test)]
#[expect(clippy::unwrap_used)] // test code OK
mod tests {
    use super::*;
    use crate::ast::{sym, val};

    fn params(form: Value) -> Params {
        Params::from_form(&form).unwrap()
    }

    #[test]
    fn test_define_and_lookup_through_parents() {
        let root: Env = Rc::new(Environment::new());
        root.define("x", val(1));
        root.define("y", val(2));

        let child: Env = Rc::new(Environment::with_parent(Rc::clone(&root)));
        child.define("x", val(10));

        assert_eq!(child.lookup("x").unwrap(), val(10));
        assert_eq!(child.lookup("y").unwrap(), val(2));
        assert_eq!(root.lookup("x").unwrap(), val(1));
        assert_eq!(
            child.lookup("missing"),
            Err(Error::NameError("missing".into()))
        );

        // later definitions in the parent are visible to existing children
        root.define("z", val(3));
        assert_eq!(child.get("z"), Some(val(3)));
    }

    #[test]
    fn test_define_returns_value() {
        let env = Environment::new();
        assert_eq!(env.define("a", val("v")), val("v"));
    }

    #[test]
    fn test_bind_parameters() {
        let outer: Env = Rc::new(Environment::new());
        outer.define("free", val(99));

        let frame = Environment::bind_parameters(
            &outer,
            &params(val(vec![sym("a"), sym("b")])),
            vec![val(1), val(2)],
        )
        .unwrap();
        assert_eq!(frame.lookup("a").unwrap(), val(1));
        assert_eq!(frame.lookup("b").unwrap(), val(2));
        assert_eq!(frame.lookup("free").unwrap(), val(99));

        let frame = Environment::bind_parameters(
            &outer,
            &params(val(vec![sym("a"), sym("&"), sym("more")])),
            vec![val(1), val(2), val(3)],
        )
        .unwrap();
        assert_eq!(frame.lookup("a").unwrap(), val(1));
        assert_eq!(frame.lookup("more").unwrap(), val([2, 3]));

        let frame = Environment::bind_parameters(
            &outer,
            &params(val(vec![sym("&"), sym("more")])),
            vec![],
        )
        .unwrap();
        assert_eq!(frame.lookup("more").unwrap(), Value::empty_list());
    }

    #[test]
    fn test_bind_parameters_arity_errors() {
        let outer: Env = Rc::new(Environment::new());
        let cases = vec![
            (val(vec![sym("a"), sym("b")]), vec![val(1)]),
            (val(vec![sym("a")]), vec![val(1), val(2)]),
            (val(vec![sym("a"), sym("&"), sym("r")]), vec![]),
        ];
        for (form, args) in cases {
            match Environment::bind_parameters(&outer, &params(form), args) {
                Err(Error::ArityError { .. }) => {}
                other => panic!("expected ArityError, got {other:?}"),
            }
        }
    }

    #[test]
    fn test_get_all_bindings_prefers_local() {
        let root: Env = Rc::new(Environment::new());
        root.define("a", val(1));
        root.define("b", val(2));
        let child = Environment::with_parent(root);
        child.define("a", val(3));

        let bindings = child.get_all_bindings();
        assert_eq!(
            bindings,
            vec![("a".to_owned(), val(3)), ("b".to_owned(), val(2))]
        );
    }
}
