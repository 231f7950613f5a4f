//! End-to-end tests of the language through the public API: reading, evaluation,
//! printing, macros, atoms and file loading.

#![expect(clippy::unwrap_used)] // test code OK

mod common;

use common::*;
use malxp::SyntaxErrorKind;
use malxp::evaluator::{EnvConfig, create_global_env_with_config};
use std::path::PathBuf;

// =============================================================================
// Core evaluation properties
// =============================================================================

#[test]
fn let_bindings_see_earlier_bindings() {
    assert_eq!(eval_str("(let* (x 1 y (+ x 1)) (+ x y))").unwrap(), val(3));
}

#[test]
fn tail_recursion_runs_in_constant_stack() {
    let env = new_env();
    eval_all(
        "(def! count-down (fn* (n) (if (= n 0) :done (count-down (- n 1)))))",
        &env,
    )
    .unwrap();
    assert_eq!(
        eval_str_with_env("(count-down 100000)", &env).unwrap(),
        kw("done")
    );
}

#[test]
fn unless_macro_expands_before_evaluation() {
    let env = new_env();
    eval_all("(defmacro! unless (fn* (pred a b) (list 'if pred b a)))", &env).unwrap();

    assert_eq!(eval_str_with_env("(unless false 1 2)", &env).unwrap(), val(1));
    assert_eq!(
        eval_str_with_env("(macroexpand (unless false 1 2))", &env).unwrap(),
        val(vec![sym("if"), val(false), val(2), val(1)])
    );
    assert_eq!(
        rep_str("(macroexpand '(unless false 1 2))", &env),
        "(if false 2 1)"
    );
    assert_eq!(rep_str("(macroexpand '(+ 1 2))", &env), "(+ 1 2)");
}

#[test]
fn quasiquote_expansion_evaluates_to_spliced_list() {
    let env = new_env();
    let expansion =
        eval_str_with_env("(quasiquoteexpand (1 ~(+ 1 1) ~@(list 3 4)))", &env).unwrap();
    assert_eq!(eval(&expansion, &env).unwrap(), val([1, 2, 3, 4]));
    assert_eq!(rep_str("`(1 ~(+ 1 1) ~@(list 3 4))", &env), "(1 2 3 4)");
}

#[test]
fn atoms_are_shared_between_holders() {
    let env = new_env();
    eval_all("(def! a (atom 1)) (def! b a) (swap! a + 5)", &env).unwrap();
    assert_eq!(eval_str_with_env("(deref a)", &env).unwrap(), val(6));
    assert_eq!(eval_str_with_env("@b", &env).unwrap(), val(6));
    eval_all("(reset! b 0)", &env).unwrap();
    assert_eq!(eval_str_with_env("@a", &env).unwrap(), val(0));
}

#[test]
fn structural_equality() {
    let cases = [
        ("(= (list 1 2) (vector 1 2))", true),
        ("(= {} {})", true),
        ("(= (atom 1) (atom 1))", true),
        ("(= {:a [1 2]} {:a '(1 2)})", true),
        ("(= \"abc\" \"abc\")", true),
        ("(= :abc \"abc\")", false),
        ("(= 'abc \"abc\")", false),
        ("(= (list 1 2) (list 2 1))", false),
        ("(= [] nil)", false),
    ];
    for (source, expected) in cases {
        assert_eq!(eval_str(source).unwrap(), val(expected), "{source}");
    }
}

#[test]
fn error_kinds() {
    assert!(matches!(
        eval_str("(undefined-symbol)"),
        Err(Error::NameError(name)) if name == "undefined-symbol"
    ));
    assert!(matches!(eval_str("(1 2 3)"), Err(Error::NotCallableError(_))));
    match read_str("(1 2") {
        Err(Error::SyntaxError(err)) => assert_eq!(err.kind, SyntaxErrorKind::Incomplete),
        other => panic!("expected SyntaxError, got {other:?}"),
    }
    assert!(matches!(eval_str("(nth [1] 5)"), Err(Error::TypeError(_))));
    assert!(matches!(eval_str("(throw 42)"), Err(Error::UserError(Value::Integer(42)))));
    assert!(matches!(eval_str("(if)"), Err(Error::ArityError { .. })));
}

#[test]
fn errors_leave_environment_intact() {
    let env = new_env();
    eval_all("(def! kept 1)", &env).unwrap();
    assert!(eval_str_with_env("(def! lost (undefined))", &env).is_err());
    assert_eq!(eval_str_with_env("kept", &env).unwrap(), val(1));
    assert!(matches!(
        eval_str_with_env("lost", &env),
        Err(Error::NameError(_))
    ));
}

#[test]
fn runaway_recursion_is_an_error() {
    let env = new_env();
    eval_all(
        r"
        (def! a (atom 0))
        (def! deep (fn* (n) (if (= n 0) 0 (+ 1 (deep (- n 1))))))
        (def! via-swap (fn* (n) (if (= n 0) 0 (+ 1 (swap! a (fn* (_) (via-swap (- n 1))))))))
        (def! via-eval (fn* (n) (if (= n 0) 0 (+ 1 (eval (list 'via-eval (- n 1)))))))
        ",
        &env,
    )
    .unwrap();

    for source in ["(deep 5000)", "(via-swap 100000)", "(via-eval 100000)"] {
        assert!(
            matches!(eval_str_with_env(source, &env), Err(Error::EvalError(_))),
            "{source}"
        );
    }
    assert_eq!(rep_str("(deep 10)", &env), "10");
    assert_eq!(rep_str("(via-swap 10)", &env), "10");
}

#[test]
fn deeply_nested_data_is_printed_and_released() {
    let env = new_env();
    eval_all(
        "(def! nest (fn* (n acc) (if (= n 0) acc (nest (- n 1) (list acc)))))",
        &env,
    )
    .unwrap();

    assert_eq!(rep_str("(pr-str (nest 3 1))", &env), "\"(((1)))\"");
    assert_eq!(rep_str("(do (nest 200000 1) nil)", &env), "nil");
    let Value::String(text) = eval_str_with_env("(pr-str (nest 200000 1))", &env).unwrap() else {
        panic!("pr-str should return a string");
    };
    assert_eq!(text.len(), 400_001);
    assert!(text.ends_with("1)))"));
}

// =============================================================================
// Printing
// =============================================================================

#[test]
fn printed_results() {
    let env = new_env();
    let cases = [
        ("\"a\\nb\"", "\"a\\nb\""),
        ("(str \"a\" 1 :k)", "\"a1:k\""),
        ("(pr-str \"a\" [1 nil])", "\"\\\"a\\\" [1 nil]\""),
        ("(+ 1.0 2)", "3.0"),
        ("(list 1 (vector 2 (list)))", "(1 [2 ()])"),
        ("{:k \"v\"}", "{:k \"v\"}"),
        ("(atom [1])", "(atom [1])"),
        ("(fn* (x) x)", "#<function>"),
        ("+", "#<builtin-function:+>"),
        ("cond", "#<macro>"),
        ("(keyword \"k\")", ":k"),
        ("(symbol \"s\")", "s"),
    ];
    for (source, expected) in cases {
        assert_eq!(rep_str(source, &env), expected, "{source}");
    }
}

// =============================================================================
// Programs
// =============================================================================

#[test]
fn higher_order_functions_in_the_language() {
    let env = new_env();
    eval_all(
        r"
        (def! map (fn* (f xs)
          (if (empty? xs) () (cons (f (first xs)) (map f (rest xs))))))
        (def! reduce (fn* (f acc xs)
          (if (empty? xs) acc (reduce f (f acc (first xs)) (rest xs)))))
        (def! compose (fn* (& fs)
          (fn* (x) (reduce (fn* (acc f) (f acc)) x fs))))
        ",
        &env,
    )
    .unwrap();

    assert_eq!(rep_str("(map (fn* (x) (* x x)) [1 2 3])", &env), "(1 4 9)");
    assert_eq!(rep_str("(reduce + 0 (list 1 2 3 4))", &env), "10");
    assert_eq!(
        rep_str("((compose (fn* (x) (+ x 1)) (fn* (x) (* x 10))) 2)", &env),
        "30"
    );
}

#[test]
fn macros_build_control_flow() {
    let env = new_env();
    eval_all(
        r"
        (defmacro! when (fn* (test & body) `(if ~test (do ~@body))))
        (defmacro! or2 (fn* (a b) `(let* (or_v ~a) (if or_v or_v ~b))))
        (def! log (atom []))
        ",
        &env,
    )
    .unwrap();

    assert_eq!(rep_str("(when true (swap! log concat [1]) :ran)", &env), ":ran");
    assert_eq!(rep_str("(when false (swap! log concat [2]) :ran)", &env), "nil");
    assert_eq!(rep_str("@log", &env), "(1)");
    assert_eq!(rep_str("(or2 nil 5)", &env), "5");
    assert_eq!(rep_str("(or2 3 (throw \"unreached\"))", &env), "3");
    assert_eq!(
        rep_str("(cond (= 1 2) :a (= 1 1) :b true :c)", &env),
        ":b"
    );
}

#[test]
fn maps_are_persistent() {
    let env = new_env();
    eval_all("(def! m {:a 1}) (def! m2 (assoc m :b 2))", &env).unwrap();
    assert_eq!(rep_str("(count m)", &env), "1");
    assert_eq!(rep_str("(count m2)", &env), "2");
    assert_eq!(rep_str("(get (dissoc m2 :a) :a)", &env), "nil");
    assert_eq!(rep_str("(contains? m2 :b)", &env), "true");
    assert_eq!(rep_str("(vals (hash-map \"k\" [1]))", &env), "([1])");
}

#[test]
fn eval_reenters_the_root_environment() {
    let env = new_env();
    assert_eq!(
        rep_str("(eval (read-string \"(let* (x 2) (* x 21))\"))", &env),
        "42"
    );
    eval_all("(def! code (list 'def! 'generated 7)) (eval code)", &env).unwrap();
    assert_eq!(rep_str("generated", &env), "7");
}

// =============================================================================
// Files
// =============================================================================

fn scratch_dir(name: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!("malxp-{name}-{}", std::process::id()));
    std::fs::create_dir_all(&dir).unwrap();
    dir
}

#[test]
fn load_file_evaluates_every_form() {
    let dir = scratch_dir("load-file");
    std::fs::write(
        dir.join("lib.mal"),
        ";; helpers\n(def! inc (fn* (x) (+ x 1)))\n(def! two (inc 1)) ; trailing comment",
    )
    .unwrap();

    let env = create_global_env_with_config(EnvConfig {
        base_dir: dir.clone(),
    })
    .unwrap();
    assert_eq!(rep_str("(load-file \"lib.mal\")", &env), "nil");
    assert_eq!(rep_str("two", &env), "2");
    assert_eq!(rep_str("(inc two)", &env), "3");
    assert_eq!(
        rep_str("(slurp \"lib.mal\")", &env).lines().next(),
        Some("\";; helpers\\n(def! inc (fn* (x) (+ x 1)))\\n(def! two (inc 1)) ; trailing comment\"")
    );

    assert!(matches!(
        rep("(load-file \"missing.mal\")", &env),
        Err(Error::IoError(_))
    ));

    std::fs::remove_dir_all(&dir).unwrap();
}

#[test]
fn load_file_reports_syntax_errors() {
    let dir = scratch_dir("load-broken");
    std::fs::write(dir.join("broken.mal"), "(def! a (+ 1 2)").unwrap();

    let env = create_global_env_with_config(EnvConfig {
        base_dir: dir.clone(),
    })
    .unwrap();
    assert!(matches!(
        rep("(load-file \"broken.mal\")", &env),
        Err(Error::SyntaxError(_))
    ));

    std::fs::remove_dir_all(&dir).unwrap();
}
