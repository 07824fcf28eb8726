//! Integer constant expression evaluator.
//!
//! Shared by enumerator values, array bounds, bit-field widths and `#if`
//! conditions. Works on raw expression text: the text is tokenized, macros
//! are expanded at token level, and the result is parsed by precedence.

use super::preproc::FunctionMacro;

/// Evaluation context.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// `#if` / `#elif`: `defined` is an operator and unknown identifiers are 0.
    Directive,
    /// Enumerators, array bounds: unknown identifiers make the expression
    /// non-constant.
    Constant,
}

/// Name lookups the evaluator needs from its caller.
pub trait Symbols {
    /// Value of an already-declared enumerator.
    fn enumerator(&self, _name: &str) -> Option<i64> {
        None
    }

    /// Replacement text of an object-like macro.
    fn macro_body(&self, _name: &str) -> Option<&str> {
        None
    }

    fn function_macro(&self, _name: &str) -> Option<&FunctionMacro> {
        None
    }

    /// Whether any macro (object- or function-like) named `name` is defined.
    fn is_defined(&self, _name: &str) -> bool {
        false
    }

    /// `sizeof` of a type name written as space-separated words, e.g.
    /// `unsigned long` or `struct point *`.
    fn size_of(&self, _type_name: &str) -> Option<i64> {
        None
    }

    fn align_of(&self, _type_name: &str) -> Option<i64> {
        None
    }
}

/// Evaluate `text` as an integer constant expression.
///
/// Returns `None` when the text is not a constant expression the evaluator
/// understands (floating literals, `sizeof` of an expression, unknown
/// function calls, division by zero).
pub fn evaluate(text: &str, symbols: &dyn Symbols, mode: Mode) -> Option<i64> {
    let tokens = expand(&tokenize(text)?, symbols, mode, &mut Vec::new())?;
    if tokens.is_empty() {
        return None;
    }
    let mut parser = ExprParser {
        tokens: &tokens,
        pos: 0,
        symbols,
        mode,
    };
    let value = parser.ternary()?;
    (parser.pos == tokens.len()).then_some(value)
}

const MAX_EXPANSION_DEPTH: usize = 32;

// -- Tokens -------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Number(i64),
    Ident(String),
    Punct(&'static str),
}

const PUNCTUATORS: &[&str] = &[
    "<<", ">>", "<=", ">=", "==", "!=", "&&", "||", "+", "-", "*", "/", "%", "&", "|", "^",
    "~", "!", "<", ">", "?", ":", "(", ")", ",",
];

fn tokenize(text: &str) -> Option<Vec<Token>> {
    let bytes = text.as_bytes();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < bytes.len() {
        let c = bytes[i];
        if c.is_ascii_whitespace() || c == b'\\' {
            i += 1;
            continue;
        }
        // Comments inside macro bodies
        if text[i..].starts_with("/*") {
            let end = text[i + 2..].find("*/")?;
            i += end + 4;
            continue;
        }
        if text[i..].starts_with("//") {
            break;
        }
        if c.is_ascii_digit() {
            let start = i;
            while i < bytes.len() && (bytes[i].is_ascii_alphanumeric() || bytes[i] == b'.') {
                i += 1;
            }
            tokens.push(Token::Number(parse_integer(&text[start..i])?));
            continue;
        }
        if c == b'\'' {
            let (value, len) = parse_char_literal(&text[i..])?;
            tokens.push(Token::Number(value));
            i += len;
            continue;
        }
        if c.is_ascii_alphabetic() || c == b'_' {
            let start = i;
            while i < bytes.len() && (bytes[i].is_ascii_alphanumeric() || bytes[i] == b'_') {
                i += 1;
            }
            // Wide/unicode character prefixes: L'a', u'a', U'a', u8'a'
            if i < bytes.len() && bytes[i] == b'\'' && matches!(&text[start..i], "L" | "u" | "U" | "u8") {
                let (value, len) = parse_char_literal(&text[i..])?;
                tokens.push(Token::Number(value));
                i += len;
                continue;
            }
            tokens.push(Token::Ident(text[start..i].to_string()));
            continue;
        }
        let punct = PUNCTUATORS.iter().find(|p| text[i..].starts_with(**p))?;
        tokens.push(Token::Punct(punct));
        i += punct.len();
    }

    Some(tokens)
}

/// Parse an integer literal with C prefixes and suffixes.
fn parse_integer(literal: &str) -> Option<i64> {
    let digits = literal.trim_end_matches(['u', 'U', 'l', 'L', 'z', 'Z']);
    let digits = digits.replace('\'', "");
    let (radix, body) = if let Some(rest) = digits.strip_prefix("0x").or_else(|| digits.strip_prefix("0X")) {
        (16, rest.to_string())
    } else if let Some(rest) = digits.strip_prefix("0b").or_else(|| digits.strip_prefix("0B")) {
        (2, rest.to_string())
    } else if digits.len() > 1 && digits.starts_with('0') {
        (8, digits[1..].to_string())
    } else {
        (10, digits)
    };
    if body.is_empty() {
        return None;
    }
    u64::from_str_radix(&body, radix).ok().map(|v| v as i64)
}

/// Parse a character literal starting at `'`. Returns the value and the
/// number of bytes consumed.
fn parse_char_literal(text: &str) -> Option<(i64, usize)> {
    let bytes = text.as_bytes();
    let mut i = 1;
    let value = match bytes.get(i)? {
        b'\\' => {
            i += 1;
            let esc = *bytes.get(i)?;
            i += 1;
            match esc {
                b'n' => 10,
                b't' => 9,
                b'r' => 13,
                b'0'..=b'7' => {
                    let start = i - 1;
                    while i < bytes.len() && i - start < 3 && (b'0'..=b'7').contains(&bytes[i]) {
                        i += 1;
                    }
                    i64::from_str_radix(&text[start..i], 8).ok()?
                }
                b'x' => {
                    let start = i;
                    while i < bytes.len() && bytes[i].is_ascii_hexdigit() {
                        i += 1;
                    }
                    i64::from_str_radix(&text[start..i], 16).ok()?
                }
                b'a' => 7,
                b'b' => 8,
                b'f' => 12,
                b'v' => 11,
                b'e' => 27,
                other => other as i64,
            }
        }
        b'\'' => return None,
        _ => {
            let ch = text[i..].chars().next()?;
            i += ch.len_utf8();
            ch as i64
        }
    };
    if bytes.get(i) != Some(&b'\'') {
        return None;
    }
    Some((value, i + 1))
}

// -- Macro expansion ----------------------------------------------------------

/// Expand macros in `tokens`. Names in `expanding` are being rescanned and
/// stay unexpanded, as in the preprocessor.
fn expand(tokens: &[Token], symbols: &dyn Symbols, mode: Mode, expanding: &mut Vec<String>) -> Option<Vec<Token>> {
    if expanding.len() >= MAX_EXPANSION_DEPTH {
        return None;
    }
    let mut out = Vec::with_capacity(tokens.len());
    let mut i = 0;

    while i < tokens.len() {
        let Token::Ident(name) = &tokens[i] else {
            out.push(tokens[i].clone());
            i += 1;
            continue;
        };
        i += 1;

        if mode == Mode::Directive && name == "defined" {
            // The operand of `defined` is never expanded
            let operand = if tokens.get(i) == Some(&Token::Punct("(")) { 3 } else { 1 };
            let end = (i + operand).min(tokens.len());
            out.push(Token::Ident(name.clone()));
            out.extend_from_slice(&tokens[i..end]);
            i = end;
            continue;
        }
        if expanding.contains(name) {
            out.push(Token::Ident(name.clone()));
            continue;
        }

        if tokens.get(i) == Some(&Token::Punct("(")) {
            if let Some(def) = symbols.function_macro(name) {
                let (args, next) = split_arguments(tokens, i)?;
                let mut expanded = Vec::with_capacity(args.len());
                for arg in args {
                    expanded.push(expand(arg, symbols, mode, expanding)?);
                }
                let replaced = substitute(&tokenize(&def.body)?, def, &expanded)?;
                expanding.push(name.clone());
                let result = expand(&replaced, symbols, mode, expanding);
                expanding.pop();
                out.extend(result?);
                i = next;
                continue;
            }
        }
        if let Some(body) = symbols.macro_body(name) {
            let body = tokenize(body)?;
            expanding.push(name.clone());
            let result = expand(&body, symbols, mode, expanding);
            expanding.pop();
            out.extend(result?);
            continue;
        }
        out.push(Token::Ident(name.clone()));
    }

    Some(out)
}

/// Split the parenthesized argument list opening at `open`. Returns the
/// arguments and the index past the closing parenthesis.
fn split_arguments(tokens: &[Token], open: usize) -> Option<(Vec<&[Token]>, usize)> {
    let mut depth = 0usize;
    let mut args = Vec::new();
    let mut start = open + 1;
    for (i, token) in tokens.iter().enumerate().skip(open) {
        match token {
            Token::Punct("(") => depth += 1,
            Token::Punct(")") => {
                depth -= 1;
                if depth == 0 {
                    args.push(&tokens[start..i]);
                    return Some((args, i + 1));
                }
            }
            Token::Punct(",") if depth == 1 => {
                args.push(&tokens[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }
    None
}

/// Replace parameter names in a macro body with the (expanded) arguments.
fn substitute(body: &[Token], def: &FunctionMacro, args: &[Vec<Token>]) -> Option<Vec<Token>> {
    let fixed = def.params.len() - usize::from(def.variadic);
    // `NAME()` passes one empty argument
    let args = if def.params.is_empty() && args.len() == 1 && args[0].is_empty() {
        &[][..]
    } else {
        args
    };
    if args.len() < fixed || (!def.variadic && args.len() > fixed) {
        return None;
    }

    let mut out = Vec::with_capacity(body.len());
    for token in body {
        let Token::Ident(name) = token else {
            out.push(token.clone());
            continue;
        };
        match def.params.iter().position(|p| p == name) {
            Some(index) if index == fixed => {
                for (n, arg) in args[fixed..].iter().enumerate() {
                    if n > 0 {
                        out.push(Token::Punct(","));
                    }
                    out.extend_from_slice(arg);
                }
            }
            Some(index) => out.extend_from_slice(&args[index]),
            None => out.push(token.clone()),
        }
    }
    Some(out)
}

// -- Parser -------------------------------------------------------------------

/// Words that may appear inside a parenthesized cast.
const CAST_WORDS: &[&str] = &[
    "char", "short", "int", "long", "signed", "unsigned", "const", "volatile", "bool", "_Bool",
    "size_t", "ssize_t", "ptrdiff_t", "intptr_t", "uintptr_t", "int8_t", "int16_t", "int32_t",
    "int64_t", "uint8_t", "uint16_t", "uint32_t", "uint64_t",
];

struct ExprParser<'a> {
    tokens: &'a [Token],
    pos: usize,
    symbols: &'a dyn Symbols,
    mode: Mode,
}

impl ExprParser<'_> {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn peek_punct(&self) -> Option<&'static str> {
        match self.peek() {
            Some(Token::Punct(p)) => Some(p),
            _ => None,
        }
    }

    fn expect(&mut self, punct: &str) -> Option<()> {
        (self.peek_punct()? == punct).then(|| self.pos += 1)
    }

    fn ternary(&mut self) -> Option<i64> {
        let cond = self.binary(1)?;
        if self.peek_punct() != Some("?") {
            return Some(cond);
        }
        self.pos += 1;
        let then = self.ternary()?;
        self.expect(":")?;
        let otherwise = self.ternary()?;
        Some(if cond != 0 { then } else { otherwise })
    }

    fn binary(&mut self, min_prec: u8) -> Option<i64> {
        let mut lhs = self.unary()?;
        loop {
            let Some(op) = self.peek_punct() else { break };
            let Some(prec) = precedence(op) else { break };
            if prec < min_prec {
                break;
            }
            self.pos += 1;
            let rhs = self.binary(prec + 1)?;
            lhs = apply_binary(op, lhs, rhs)?;
        }
        Some(lhs)
    }

    fn unary(&mut self) -> Option<i64> {
        match self.peek()?.clone() {
            Token::Punct("-") => {
                self.pos += 1;
                Some(self.unary()?.wrapping_neg())
            }
            Token::Punct("+") => {
                self.pos += 1;
                self.unary()
            }
            Token::Punct("~") => {
                self.pos += 1;
                Some(!self.unary()?)
            }
            Token::Punct("!") => {
                self.pos += 1;
                Some((self.unary()? == 0) as i64)
            }
            Token::Punct("(") => {
                if self.is_cast() {
                    while self.peek_punct() != Some(")") {
                        self.pos += 1;
                    }
                    self.pos += 1;
                    return self.unary();
                }
                self.pos += 1;
                let value = self.ternary()?;
                self.expect(")")?;
                Some(value)
            }
            Token::Number(n) => {
                self.pos += 1;
                Some(n)
            }
            Token::Ident(name) => {
                self.pos += 1;
                self.identifier(&name)
            }
            Token::Punct(_) => None,
        }
    }

    fn is_cast(&self) -> bool {
        let mut i = self.pos + 1;
        let mut words = 0;
        while let Some(Token::Ident(word)) = self.tokens.get(i) {
            if !CAST_WORDS.contains(&word.as_str()) {
                return false;
            }
            words += 1;
            i += 1;
        }
        words > 0 && self.tokens.get(i) == Some(&Token::Punct(")")) && self.tokens.get(i + 1).is_some()
    }

    fn identifier(&mut self, name: &str) -> Option<i64> {
        if self.mode == Mode::Directive && name == "defined" {
            let parenthesized = self.peek_punct() == Some("(");
            if parenthesized {
                self.pos += 1;
            }
            let Some(Token::Ident(target)) = self.peek().cloned() else {
                return None;
            };
            self.pos += 1;
            if parenthesized {
                self.expect(")")?;
            }
            return Some(self.symbols.is_defined(&target) as i64);
        }
        match name {
            "true" => return Some(1),
            "false" => return Some(0),
            "sizeof" => return self.type_query(|symbols, ty| symbols.size_of(ty)),
            "_Alignof" | "alignof" | "__alignof__" => return self.type_query(|symbols, ty| symbols.align_of(ty)),
            _ => {}
        }
        if let Some(value) = self.symbols.enumerator(name) {
            return Some(value);
        }
        match self.mode {
            // A function-like macro invocation cannot be evaluated here
            Mode::Directive if self.peek_punct() == Some("(") => None,
            Mode::Directive => Some(0),
            Mode::Constant => None,
        }
    }

    /// `sizeof(type-name)` and `_Alignof(type-name)`. Expression operands
    /// are not supported.
    fn type_query(&mut self, query: impl Fn(&dyn Symbols, &str) -> Option<i64>) -> Option<i64> {
        self.expect("(")?;
        let tokens = self.tokens;
        let mut words = Vec::new();
        loop {
            match tokens.get(self.pos)? {
                Token::Ident(word) => words.push(word.as_str()),
                Token::Punct("*") => words.push("*"),
                Token::Punct(")") => break,
                _ => return None,
            }
            self.pos += 1;
        }
        self.pos += 1;
        query(self.symbols, &words.join(" "))
    }
}

fn precedence(op: &str) -> Option<u8> {
    Some(match op {
        "||" => 1,
        "&&" => 2,
        "|" => 3,
        "^" => 4,
        "&" => 5,
        "==" | "!=" => 6,
        "<" | ">" | "<=" | ">=" => 7,
        "<<" | ">>" => 8,
        "+" | "-" => 9,
        "*" | "/" | "%" => 10,
        _ => return None,
    })
}

fn apply_binary(op: &str, lhs: i64, rhs: i64) -> Option<i64> {
    Some(match op {
        "||" => (lhs != 0 || rhs != 0) as i64,
        "&&" => (lhs != 0 && rhs != 0) as i64,
        "|" => lhs | rhs,
        "^" => lhs ^ rhs,
        "&" => lhs & rhs,
        "==" => (lhs == rhs) as i64,
        "!=" => (lhs != rhs) as i64,
        "<" => (lhs < rhs) as i64,
        ">" => (lhs > rhs) as i64,
        "<=" => (lhs <= rhs) as i64,
        ">=" => (lhs >= rhs) as i64,
        "<<" => lhs.checked_shl(u32::try_from(rhs).ok()?)?,
        ">>" => lhs.checked_shr(u32::try_from(rhs).ok()?)?,
        "+" => lhs.wrapping_add(rhs),
        "-" => lhs.wrapping_sub(rhs),
        "*" => lhs.wrapping_mul(rhs),
        "/" => lhs.checked_div(rhs)?,
        "%" => lhs.checked_rem(rhs)?,
        _ => return None,
    })
}
