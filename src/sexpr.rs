//! S-expression line codec.
//!
//! The wire protocol is one parenthesised expression per line. This module
//! turns a line of text into a small tagged tree (`Expr`) and back, with
//! five atom kinds — booleans, integers, floats, strings, identifiers — plus
//! bracketed compounds. Grammar:
//!
//! ```text
//! expr       := atom | '(' expr+ ')' | '[' expr+ ']'
//! atom       := bool | number | string | identifier
//! bool       := "#t" | "#f"
//! number     := integer | float
//! identifier := id_init id_subseq*
//! ```
//!
//! A top-level input is exactly one expression plus optional surrounding
//! whitespace; anything else is a parse error.

use std::fmt;

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Bool(bool),
    Integer(i64),
    Float(f64),
    String(String),
    Identifier(String),
    Compound(Vec<Expr>),
}

impl Expr {
    pub fn identifier(s: impl Into<String>) -> Expr {
        Expr::Identifier(s.into())
    }

    pub fn string(s: impl Into<String>) -> Expr {
        Expr::String(s.into())
    }

    pub fn integer(n: impl Into<i64>) -> Expr {
        Expr::Integer(n.into())
    }

    pub fn compound(items: Vec<Expr>) -> Expr {
        Expr::Compound(items)
    }

    pub fn as_identifier(&self) -> Option<&str> {
        match self {
            Expr::Identifier(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Expr::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_integer(&self) -> Option<i64> {
        match self {
            Expr::Integer(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_compound(&self) -> Option<&[Expr]> {
        match self {
            Expr::Compound(items) => Some(items),
            _ => None,
        }
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expr::Bool(true) => write!(f, "#t"),
            Expr::Bool(false) => write!(f, "#f"),
            Expr::Integer(n) => write!(f, "{n}"),
            Expr::Float(x) => {
                let s = format!("{x}");
                if s.contains('.') {
                    write!(f, "{s}")
                } else {
                    write!(f, "{s}.0")
                }
            }
            Expr::String(s) => {
                write!(f, "\"")?;
                for c in s.chars() {
                    match c {
                        '\\' => write!(f, "\\\\")?,
                        '"' => write!(f, "\\\"")?,
                        _ => write!(f, "{c}")?,
                    }
                }
                write!(f, "\"")
            }
            Expr::Identifier(s) => write!(f, "{s}"),
            Expr::Compound(items) => {
                write!(f, "(")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, " ")?;
                    }
                    write!(f, "{item}")?;
                }
                write!(f, ")")
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseError;

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "not parsable")
    }
}

impl std::error::Error for ParseError {}

const ID_SYMBOL_INIT: &str = "!$%&*/:<=>?_~";
// Extra characters allowed after the first, beyond the init set and digits.
// A bare `+`/`-` is its own singleton identifier (see `parse_sign_singleton`),
// not a general init character, but they and `.`/`@`/`#` may still continue
// a longer identifier once it has started.
const ID_SYMBOL_SUBSEQ_EXTRA: &str = "+-.@#";

fn is_id_init(c: char) -> bool {
    c.is_ascii_alphabetic() || ID_SYMBOL_INIT.contains(c)
}

fn is_id_subseq(c: char) -> bool {
    c.is_ascii_alphanumeric() || ID_SYMBOL_INIT.contains(c) || ID_SYMBOL_SUBSEQ_EXTRA.contains(c)
}

fn is_atom_ending(c: char) -> bool {
    c.is_whitespace() || c == ')' || c == ']'
}

struct Cursor<'a> {
    chars: &'a [char],
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn peek_at(&self, offset: usize) -> Option<char> {
        self.chars.get(self.pos + offset).copied()
    }

    fn skip_whitespace(&mut self) {
        while self.peek().is_some_and(char::is_whitespace) {
            self.pos += 1;
        }
    }

    fn parse_expr(&mut self) -> Result<Expr, ParseError> {
        match self.peek() {
            Some('(') => self.parse_compound('(', ')'),
            Some('[') => self.parse_compound('[', ']'),
            Some(_) => self.parse_atom(),
            None => Err(ParseError),
        }
    }

    fn parse_compound(&mut self, open: char, close: char) -> Result<Expr, ParseError> {
        debug_assert_eq!(self.peek(), Some(open));
        self.pos += 1;
        let mut items = Vec::new();
        loop {
            self.skip_whitespace();
            match self.peek() {
                Some(c) if c == close => {
                    self.pos += 1;
                    break;
                }
                Some(_) => items.push(self.parse_expr()?),
                None => return Err(ParseError),
            }
            // Every element but the last must be followed by whitespace or
            // the closing bracket — "(a)(b)" with nothing between is not
            // valid, even though each half parses fine alone.
            match self.peek() {
                Some(c) if c == close || c.is_whitespace() => {}
                Some(_) => return Err(ParseError),
                None => return Err(ParseError),
            }
        }
        if items.is_empty() {
            return Err(ParseError);
        }
        Ok(Expr::Compound(items))
    }

    fn parse_atom(&mut self) -> Result<Expr, ParseError> {
        match self.peek() {
            Some('#') => self.parse_bool(),
            Some('"') => self.parse_string(),
            Some(c) if c.is_ascii_digit() => self.parse_number(),
            Some(c) if (c == '+' || c == '-') && self.peek_at(1).is_some_and(|n| n.is_ascii_digit()) => {
                self.parse_number()
            }
            Some(c) if c == '+' || c == '-' => self.parse_sign_singleton(),
            Some(c) if is_id_init(c) => self.parse_identifier(),
            _ => Err(ParseError),
        }
    }

    /// A bare `+` or `-` is a standalone identifier, but only if nothing
    /// else is glued onto it — `+bar` is not an identifier at all, since
    /// `+`/`-` are not members of the general init character set.
    fn parse_sign_singleton(&mut self) -> Result<Expr, ParseError> {
        let sign = self.peek().expect("caller already confirmed a sign char");
        match self.peek_at(1) {
            None => {}
            Some(next) if is_atom_ending(next) => {}
            _ => return Err(ParseError),
        }
        self.pos += 1;
        Ok(Expr::Identifier(sign.to_string()))
    }

    fn parse_bool(&mut self) -> Result<Expr, ParseError> {
        debug_assert_eq!(self.peek(), Some('#'));
        match self.peek_at(1) {
            Some('t') => {
                self.pos += 2;
                Ok(Expr::Bool(true))
            }
            Some('f') => {
                self.pos += 2;
                Ok(Expr::Bool(false))
            }
            _ => Err(ParseError),
        }
    }

    fn parse_number(&mut self) -> Result<Expr, ParseError> {
        let start = self.pos;
        if matches!(self.peek(), Some('+') | Some('-')) {
            self.pos += 1;
        }
        let mut saw_dot = false;
        while let Some(c) = self.peek() {
            if c.is_ascii_digit() {
                self.pos += 1;
            } else if c == '.' && !saw_dot {
                saw_dot = true;
                self.pos += 1;
            } else if is_atom_ending(c) {
                break;
            } else {
                return Err(ParseError);
            }
        }
        let text: String = self.chars[start..self.pos].iter().collect();
        if saw_dot {
            // A float needs a digit flanking the dot on each side.
            let (int_part, frac_part) = text.split_once('.').ok_or(ParseError)?;
            let int_digits = int_part.trim_start_matches(['+', '-']);
            if int_digits.is_empty() || frac_part.is_empty() {
                return Err(ParseError);
            }
            text.parse::<f64>().map(Expr::Float).map_err(|_| ParseError)
        } else {
            text.parse::<i64>().map(Expr::Integer).map_err(|_| ParseError)
        }
    }

    fn parse_string(&mut self) -> Result<Expr, ParseError> {
        debug_assert_eq!(self.peek(), Some('"'));
        self.pos += 1;
        let mut out = String::new();
        loop {
            match self.peek() {
                None => return Err(ParseError),
                Some('"') => {
                    self.pos += 1;
                    break;
                }
                Some('\\') => {
                    match self.peek_at(1) {
                        Some('\\') => out.push('\\'),
                        Some('"') => out.push('"'),
                        _ => return Err(ParseError),
                    }
                    self.pos += 2;
                }
                Some(c) => {
                    out.push(c);
                    self.pos += 1;
                }
            }
        }
        Ok(Expr::String(out))
    }

    fn parse_identifier(&mut self) -> Result<Expr, ParseError> {
        let start = self.pos;
        self.pos += 1; // is_id_init already checked by caller
        while let Some(c) = self.peek() {
            if is_atom_ending(c) {
                break;
            }
            if !is_id_subseq(c) {
                return Err(ParseError);
            }
            self.pos += 1;
        }
        let text: String = self.chars[start..self.pos].iter().collect();
        Ok(Expr::Identifier(text))
    }
}

/// Parses one line of wire text into a single top-level expression.
pub fn parse(line: &str) -> Result<Expr, ParseError> {
    let chars: Vec<char> = line.chars().collect();
    let mut cursor = Cursor { chars: &chars, pos: 0 };
    cursor.skip_whitespace();
    if cursor.peek().is_none() {
        return Err(ParseError);
    }
    let expr = cursor.parse_expr()?;
    cursor.skip_whitespace();
    if cursor.pos != chars.len() {
        return Err(ParseError);
    }
    Ok(expr)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn roundtrip(src: &str) {
        let parsed = parse(src).unwrap_or_else(|_| panic!("failed to parse {src:?}"));
        let rendered = parsed.to_string();
        let reparsed = parse(&rendered).unwrap_or_else(|_| panic!("failed to reparse {rendered:?}"));
        assert_eq!(parsed, reparsed);
    }

    #[test]
    fn parses_booleans() {
        assert_eq!(parse("#t").unwrap(), Expr::Bool(true));
        assert_eq!(parse("#f").unwrap(), Expr::Bool(false));
    }

    #[test]
    fn parses_signed_integers() {
        assert_eq!(parse("42").unwrap(), Expr::Integer(42));
        assert_eq!(parse("-7").unwrap(), Expr::Integer(-7));
        assert_eq!(parse("+3").unwrap(), Expr::Integer(3));
    }

    #[test]
    fn parses_floats_requiring_both_sides_of_the_dot() {
        assert_eq!(parse("3.5").unwrap(), Expr::Float(3.5));
        assert!(parse("3.").is_err());
        assert!(parse(".5").is_err());
    }

    #[test]
    fn parses_strings_with_escapes() {
        assert_eq!(parse(r#""hello""#).unwrap(), Expr::String("hello".into()));
        assert_eq!(parse(r#""a\"b""#).unwrap(), Expr::String("a\"b".into()));
        assert_eq!(parse(r#""a\\b""#).unwrap(), Expr::String("a\\b".into()));
        assert!(parse(r#""unterminated"#).is_err());
    }

    #[test]
    fn parses_identifiers_including_bare_signs() {
        assert_eq!(parse("+").unwrap(), Expr::Identifier("+".into()));
        assert_eq!(parse("-").unwrap(), Expr::Identifier("-".into()));
        assert_eq!(parse("shoot").unwrap(), Expr::Identifier("shoot".into()));
        assert_eq!(parse("vertical").unwrap(), Expr::Identifier("vertical".into()));
    }

    #[test]
    fn rejects_invalid_atoms() {
        assert!(parse("+3x").is_err());
        assert!(parse("#x").is_err());
        assert!(parse("3x").is_err());
    }

    #[test]
    fn bare_sign_is_a_singleton_not_a_general_init_char() {
        // `+`/`-` are only identifiers on their own; nothing may follow them
        // directly, and `^` was never part of the init set at all.
        assert!(parse("+bar").is_err());
        assert!(parse("-bar").is_err());
        assert!(parse("^baz").is_err());
        assert_eq!(parse("(+ 1)").unwrap(), Expr::Compound(vec![Expr::Identifier("+".into()), Expr::Integer(1)]));
    }

    #[test]
    fn parses_nested_compounds_with_both_bracket_kinds() {
        let parsed = parse("(ship 5 0 0 vertical)").unwrap();
        assert_eq!(
            parsed,
            Expr::Compound(vec![
                Expr::Identifier("ship".into()),
                Expr::Integer(5),
                Expr::Integer(0),
                Expr::Integer(0),
                Expr::Identifier("vertical".into()),
            ])
        );
        assert_eq!(
            parse("[shoot 1 2 3]").unwrap(),
            parse("(shoot 1 2 3)").unwrap()
        );
    }

    #[test]
    fn rejects_empty_compound() {
        assert!(parse("()").is_err());
    }

    #[test]
    fn rejects_trailing_input_and_adjacent_compounds() {
        assert!(parse("(a) (b)").is_err());
        assert!(parse("(a)(b)").is_err());
        assert!(parse("42 43").is_err());
    }

    #[test]
    fn round_trips_through_format_and_parse() {
        roundtrip("(nick \"bob\" \"csalt\")");
        roundtrip("(games (waiting \"foo\" 1) (active \"bar\" \"baz\" 2))");
        roundtrip("(layout 1 (ship 5 0 0 vertical) (ship 2 3 3 horizontal))");
        roundtrip("#t");
        roundtrip("-12");
    }
}
