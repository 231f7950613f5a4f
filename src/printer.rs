//! Rendering of values as text.
//!
//! Readable mode produces text the reader accepts back: strings are quoted with `\`, `"`
//! and newline escaped. Display mode writes string contents verbatim and is what `str`
//! and `println` use.

use std::fmt;

use crate::ast::{MapKey, Value};

/// Render a value, escaping strings when `print_readably` is set
pub fn pr_str(value: &Value, print_readably: bool) -> String {
    Printed {
        value,
        print_readably,
    }
    .to_string()
}

/// Render several values joined by `separator`
pub fn pr_seq(values: &[Value], print_readably: bool, separator: &str) -> String {
    values
        .iter()
        .map(|v| pr_str(v, print_readably))
        .collect::<Vec<_>>()
        .join(separator)
}

struct Printed<'a> {
    value: &'a Value,
    print_readably: bool,
}

// Output still to be written, most recent last
enum Piece<'a> {
    Value(&'a Value),
    Key(&'a MapKey),
    Text(&'static str),
}

impl<'a> Printed<'a> {
    fn nested<'b>(&self, value: &'b Value) -> Printed<'b> {
        Printed {
            value,
            print_readably: self.print_readably,
        }
    }

    fn push_seq(pending: &mut Vec<Piece<'a>>, items: &'a [Value], close: &'static str) {
        pending.push(Piece::Text(close));
        for (i, item) in items.iter().enumerate().rev() {
            pending.push(Piece::Value(item));
            if i > 0 {
                pending.push(Piece::Text(" "));
            }
        }
    }

    /// Write the part of `value` that comes before its elements and queue the rest
    fn write_value(
        &self,
        f: &mut fmt::Formatter<'_>,
        value: &'a Value,
        pending: &mut Vec<Piece<'a>>,
    ) -> fmt::Result {
        match value {
            Value::Nil => write!(f, "nil"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Integer(n) => write!(f, "{n}"),
            Value::Float(x) => write_float(f, *x),
            Value::String(s) => self.write_string(f, s),
            Value::Keyword(k) => write!(f, ":{k}"),
            Value::Symbol(s) => write!(f, "{s}"),
            Value::List(items) => {
                Self::push_seq(pending, items, ")");
                write!(f, "(")
            }
            Value::Vector(items) => {
                Self::push_seq(pending, items, "]");
                write!(f, "[")
            }
            Value::Map(map) => {
                pending.push(Piece::Text("}"));
                let entries: Vec<_> = map.iter().collect();
                for (i, (key, value)) in entries.into_iter().enumerate().rev() {
                    pending.push(Piece::Value(value));
                    pending.push(Piece::Key(key));
                    if i > 0 {
                        pending.push(Piece::Text(" "));
                    }
                }
                write!(f, "{{")
            }
            Value::BuiltinFunction { id, .. } => write!(f, "#<builtin-function:{id}>"),
            Value::Function(_) => write!(f, "#<function>"),
            Value::Macro(_) => write!(f, "#<macro>"),
            Value::Atom(atom) => write!(f, "(atom {})", self.nested(&atom.get())),
        }
    }

    fn write_key(&self, f: &mut fmt::Formatter<'_>, key: &MapKey) -> fmt::Result {
        match key {
            MapKey::String(s) => self.write_string(f, s)?,
            MapKey::Keyword(k) => write!(f, ":{k}")?,
            MapKey::Symbol(s) => write!(f, "{s}")?,
        }
        write!(f, " ")
    }

    fn write_string(&self, f: &mut fmt::Formatter<'_>, s: &str) -> fmt::Result {
        if !self.print_readably {
            return write!(f, "{s}");
        }
        write!(f, "\"")?;
        for ch in s.chars() {
            match ch {
                '"' => write!(f, "\\\"")?,
                '\\' => write!(f, "\\\\")?,
                '\n' => write!(f, "\\n")?,
                c => write!(f, "{c}")?,
            }
        }
        write!(f, "\"")
    }
}

// Nested sequences and maps are walked with an explicit work list, so printing
// does not recurse once per nesting level.
impl fmt::Display for Printed<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut pending = vec![Piece::Value(self.value)];
        while let Some(piece) = pending.pop() {
            match piece {
                Piece::Value(value) => self.write_value(f, value, &mut pending)?,
                Piece::Key(key) => self.write_key(f, key)?,
                Piece::Text(text) => f.write_str(text)?,
            }
        }
        Ok(())
    }
}

// Always keep a decimal point so the text reads back as a float.
fn write_float(f: &mut fmt::Formatter<'_>, x: f64) -> fmt::Result {
    if !x.is_finite() {
        return write!(f, "{x}");
    }
    let text = x.to_string();
    if text.contains('.') {
        write!(f, "{text}")
    } else {
        write!(f, "{text}.0")
    }
}

/// Readable rendering, the form `rep` and the REPL print
impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}",
            Printed {
                value: self,
                print_readably: true,
            }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{Atom, ValueMap, kw, nil, sym, val};

    #[test]
    fn test_print_readable_and_display() {
        // (value, readable, display)
        let test_cases = vec![
            (nil(), "nil", "nil"),
            (val(true), "true", "true"),
            (val(-42), "-42", "-42"),
            (val(1.5), "1.5", "1.5"),
            (val(3.0), "3.0", "3.0"),
            (val(-0.25), "-0.25", "-0.25"),
            (val(1e21), "1000000000000000000000.0", "1000000000000000000000.0"),
            (val("abc"), "\"abc\"", "abc"),
            (val("a\"b"), "\"a\\\"b\"", "a\"b"),
            (val("a\\b"), "\"a\\\\b\"", "a\\b"),
            (val("line\nnext"), "\"line\\nnext\"", "line\nnext"),
            (val("tab\there"), "\"tab\there\"", "tab\there"),
            (kw("key"), ":key", ":key"),
            (sym("foo"), "foo", "foo"),
            (Value::empty_list(), "()", "()"),
            (val(vec![val(1), val("x"), nil()]), "(1 \"x\" nil)", "(1 x nil)"),
            (
                Value::vector(vec![val(1), Value::vector(vec![])]),
                "[1 []]",
                "[1 []]",
            ),
            (Value::Map(ValueMap::new()), "{}", "{}"),
            (Value::Atom(Atom::new(val("s"))), "(atom \"s\")", "(atom s)"),
        ];

        for (value, readable, display) in test_cases {
            assert_eq!(pr_str(&value, true), readable, "readable form of {value:?}");
            assert_eq!(pr_str(&value, false), display, "display form of {value:?}");
        }
    }

    #[test]
    fn test_print_map_entry() {
        let mut map = ValueMap::new();
        map.insert(MapKey::String("k".into()), val("v"));
        assert_eq!(pr_str(&Value::Map(map.clone()), true), "{\"k\" \"v\"}");
        assert_eq!(pr_str(&Value::Map(map), false), "{k v}");
    }

    #[test]
    fn test_print_map_with_nested_values() {
        let mut map = ValueMap::new();
        map.insert(
            MapKey::Keyword("k".into()),
            Value::vector(vec![val(1), val(vec![val("x"), Value::Map(ValueMap::new())])]),
        );
        let value = Value::list(vec![Value::Map(map), sym("end")]);
        assert_eq!(pr_str(&value, true), "({:k [1 (\"x\" {})]} end)");
        assert_eq!(pr_str(&value, false), "({:k [1 (x {})]} end)");
    }

    #[test]
    fn test_print_deeply_nested_list() {
        let depth = 200_000;
        let mut value = val(1);
        for _ in 0..depth {
            value = Value::list(vec![value]);
        }
        let text = pr_str(&value, true);
        assert_eq!(text.len(), 2 * depth + 1);
        assert!(text.starts_with("((("));
        assert!(text.ends_with("1)))"));
    }

    #[test]
    fn test_pr_seq_separators() {
        let values = vec![val("a"), val(1), kw("b")];
        assert_eq!(pr_seq(&values, true, " "), "\"a\" 1 :b");
        assert_eq!(pr_seq(&values, false, ""), "a1:b");
        assert_eq!(pr_seq(&[], true, " "), "");
    }

    #[test]
    fn test_display_is_readable() {
        assert_eq!(format!("{}", val(vec![val("q")])), "(\"q\")");
    }
}
