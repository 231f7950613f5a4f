use nom::{
    IResult, Parser,
    branch::alt,
    bytes::complete::{is_not, tag, take_while1},
    character::complete::{anychar, char, not_line_ending, one_of},
    combinator::{opt, recognize, value},
    multi::many0,
    sequence::pair,
};

use crate::ast::{MapKey, Value, ValueMap, sym};
use crate::{Error, MAX_PARSE_DEPTH, SyntaxError, SyntaxErrorKind};

/// Characters that end an atom token
const ATOM_DELIMITERS: &str = "[]{}()'\"`,;";

/// One token with its byte offset into the source, for error context
#[derive(Debug, Clone, Copy, PartialEq)]
struct Token<'a> {
    text: &'a str,
    offset: usize,
}

fn is_atom_char(c: char) -> bool {
    !c.is_whitespace() && !ATOM_DELIMITERS.contains(c)
}

/// Whitespace, commas and `;` comments
fn trivia(input: &str) -> IResult<&str, ()> {
    value(
        (),
        many0(alt((
            value((), take_while1(|c: char| c.is_whitespace() || c == ',')),
            value((), pair(char(';'), not_line_ending)),
        ))),
    )
    .parse(input)
}

/// A double-quoted string, possibly unterminated; validated by `read_string`
fn string_token(input: &str) -> IResult<&str, &str> {
    recognize((
        char('"'),
        many0(alt((recognize(pair(char('\\'), anychar)), is_not("\\\"")))),
        opt(char('"')),
    ))
    .parse(input)
}

fn token(input: &str) -> IResult<&str, &str> {
    alt((
        tag("~@"),
        recognize(one_of("[]{}()'`~^@")),
        string_token,
        take_while1(is_atom_char),
    ))
    .parse(input)
}

fn tokenize(input: &str) -> Result<Vec<Token<'_>>, SyntaxError> {
    let mut tokens = Vec::new();
    let mut rest = input;

    loop {
        // trivia is many0 and cannot fail
        let after_trivia = match trivia(rest) {
            Ok((after, ())) => after,
            Err(_) => rest,
        };
        if after_trivia.is_empty() {
            break;
        }

        let offset = input.len() - after_trivia.len();
        match token(after_trivia) {
            Ok((remaining, text)) => {
                tokens.push(Token { text, offset });
                rest = remaining;
            }
            Err(_) => {
                let found: String = after_trivia.chars().take(1).collect();
                return Err(SyntaxError::with_context_and_found(
                    SyntaxErrorKind::InvalidSyntax,
                    "Unexpected character",
                    input,
                    offset,
                    Some(found),
                ));
            }
        }
    }

    Ok(tokens)
}

/// Recursive-descent parser over the token stream
struct Reader<'a> {
    input: &'a str,
    tokens: Vec<Token<'a>>,
    position: usize,
}

impl<'a> Reader<'a> {
    fn peek(&self) -> Option<Token<'a>> {
        self.tokens.get(self.position).copied()
    }

    fn advance(&mut self) -> Option<Token<'a>> {
        let token = self.peek();
        if token.is_some() {
            self.position += 1;
        }
        token
    }

    fn error_at(
        &self,
        kind: SyntaxErrorKind,
        message: impl Into<String>,
        token: Token<'_>,
    ) -> Error {
        SyntaxError::with_context_and_found(
            kind,
            message,
            self.input,
            token.offset,
            Some(token.text.to_owned()),
        )
        .into()
    }

    fn error_at_end(&self, message: impl Into<String>) -> Error {
        SyntaxError::with_context(
            SyntaxErrorKind::Incomplete,
            message,
            self.input,
            self.input.len(),
        )
        .into()
    }

    fn read_form(&mut self, depth: usize) -> Result<Value, Error> {
        let Some(token) = self.peek() else {
            return Err(self.error_at_end("Unexpected end of input"));
        };
        if depth >= MAX_PARSE_DEPTH {
            return Err(self.error_at(
                SyntaxErrorKind::TooDeeplyNested,
                format!("Form too deeply nested (max depth: {MAX_PARSE_DEPTH})"),
                token,
            ));
        }

        match token.text {
            "'" => self.read_wrapped("quote", depth),
            "`" => self.read_wrapped("quasiquote", depth),
            "~" => self.read_wrapped("unquote", depth),
            "~@" => self.read_wrapped("splice-unquote", depth),
            "@" => self.read_wrapped("deref", depth),
            "^" => Err(self.error_at(
                SyntaxErrorKind::Unsupported,
                "Metadata is not supported",
                token,
            )),
            "(" => Ok(Value::list(self.read_seq(")", depth)?)),
            "[" => Ok(Value::vector(self.read_seq("]", depth)?)),
            "{" => self.read_map(token, depth),
            ")" | "]" | "}" => Err(self.error_at(
                SyntaxErrorKind::InvalidSyntax,
                format!("Unexpected '{}'", token.text),
                token,
            )),
            _ => {
                self.position += 1;
                self.read_atom(token)
            }
        }
    }

    /// Reader macro: `'x` becomes `(quote x)` and so on
    fn read_wrapped(&mut self, name: &str, depth: usize) -> Result<Value, Error> {
        self.position += 1;
        let form = self.read_form(depth + 1)?;
        Ok(Value::list(vec![sym(name), form]))
    }

    fn read_seq(&mut self, close: &str, depth: usize) -> Result<Vec<Value>, Error> {
        self.position += 1;
        let mut items = Vec::new();
        loop {
            match self.peek() {
                None => return Err(self.error_at_end(format!("Expected '{close}', got EOF"))),
                Some(token) if token.text == close => {
                    self.position += 1;
                    return Ok(items);
                }
                Some(_) => items.push(self.read_form(depth + 1)?),
            }
        }
    }

    fn read_map(&mut self, open: Token<'_>, depth: usize) -> Result<Value, Error> {
        let items = self.read_seq("}", depth)?;
        if items.len() % 2 != 0 {
            return Err(self.error_at(
                SyntaxErrorKind::InvalidSyntax,
                "Map literal needs an even number of forms",
                open,
            ));
        }

        let mut map = ValueMap::new();
        for pair in items.chunks_exact(2) {
            let key = MapKey::try_from(&pair[0]).map_err(|_| {
                self.error_at(
                    SyntaxErrorKind::InvalidSyntax,
                    "Map keys must be strings, keywords or symbols",
                    open,
                )
            })?;
            map.insert(key, pair[1].clone());
        }
        Ok(Value::Map(map))
    }

    fn read_atom(&self, token: Token<'_>) -> Result<Value, Error> {
        let text = token.text;

        if is_integer_literal(text) {
            return text.parse::<i64>().map(Value::Integer).map_err(|_| {
                self.error_at(
                    SyntaxErrorKind::ImplementationLimit,
                    "Integer literal out of range",
                    token,
                )
            });
        }
        if is_float_literal(text) {
            return text.parse::<f64>().map(Value::Float).map_err(|_| {
                self.error_at(SyntaxErrorKind::InvalidSyntax, "Invalid float literal", token)
            });
        }

        match text {
            "true" => return Ok(Value::Bool(true)),
            "false" => return Ok(Value::Bool(false)),
            "nil" => return Ok(Value::Nil),
            _ => {}
        }

        if let Some(name) = text.strip_prefix(':') {
            return Ok(Value::Keyword(name.to_owned()));
        }
        if text.starts_with('"') {
            return self.read_string(token).map(Value::String);
        }
        Ok(Value::Symbol(text.to_owned()))
    }

    fn read_string(&self, token: Token<'_>) -> Result<String, Error> {
        let text = token.text;
        let body = match text.strip_prefix('"').and_then(|t| t.strip_suffix('"')) {
            // the tokenizer only consumes a closing quote that is not escaped
            Some(body) if text.len() >= 2 && !ends_with_open_escape(body) => body,
            _ => {
                return Err(self.error_at(
                    SyntaxErrorKind::Incomplete,
                    "Unterminated string literal",
                    token,
                ));
            }
        };

        let mut result = String::with_capacity(body.len());
        let mut chars = body.chars();
        while let Some(ch) = chars.next() {
            if ch != '\\' {
                result.push(ch);
                continue;
            }
            match chars.next() {
                Some('n') => result.push('\n'),
                Some('\\') => result.push('\\'),
                Some('"') => result.push('"'),
                Some(other) => {
                    return Err(self.error_at(
                        SyntaxErrorKind::InvalidSyntax,
                        format!("Unknown escape sequence '\\{other}'"),
                        token,
                    ));
                }
                None => {
                    return Err(self.error_at(
                        SyntaxErrorKind::Incomplete,
                        "Unterminated string literal",
                        token,
                    ));
                }
            }
        }
        Ok(result)
    }
}

/// True when the string body ends in an unpaired backslash, meaning the final quote was escaped
fn ends_with_open_escape(body: &str) -> bool {
    body.chars().rev().take_while(|c| *c == '\\').count() % 2 == 1
}

fn is_integer_literal(text: &str) -> bool {
    let digits = text.strip_prefix('-').unwrap_or(text);
    !digits.is_empty() && digits.chars().all(|c| c.is_ascii_digit())
}

fn is_float_literal(text: &str) -> bool {
    let unsigned = text.strip_prefix('-').unwrap_or(text);
    match unsigned.split_once('.') {
        Some((whole, frac)) => {
            !whole.is_empty()
                && whole.chars().all(|c| c.is_ascii_digit())
                && frac.chars().all(|c| c.is_ascii_digit())
        }
        None => false,
    }
}

/// Read exactly one form from `input`.
pub fn read_str(input: &str) -> Result<Value, Error> {
    let tokens = tokenize(input)?;
    let mut reader = Reader {
        input,
        tokens,
        position: 0,
    };

    if reader.peek().is_none() {
        return Err(SyntaxError::from_message(SyntaxErrorKind::Empty, "No form to read").into());
    }

    let form = reader.read_form(0)?;
    if let Some(token) = reader.advance() {
        return Err(reader.error_at(
            SyntaxErrorKind::TrailingContent,
            "Unexpected input after complete form",
            token,
        ));
    }
    Ok(form)
}
