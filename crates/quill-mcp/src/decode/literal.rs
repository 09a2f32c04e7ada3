//! Permissive parser for debug-dump literal syntax.
//!
//! Accepts the literal notation peers print when they dump a reply object
//! instead of serializing it: maps and lists, tuples, strings in single,
//! double or triple quotes with backslash escapes, `None`/`True`/`False`
//! alongside their JSON spellings, and constructor calls such as
//! `TextContent(type='text', text='42')`. Everything is mapped onto
//! [`serde_json::Value`]; a constructor call becomes a map of its keyword
//! arguments, with positional arguments under `"args"`.

use serde_json::{Map, Number, Value};

const MAX_DEPTH: usize = 128;

/// Error from [`parse`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{reason} at offset {offset}")]
pub struct LiteralError {
    /// Byte offset into the input.
    pub offset: usize,
    /// What went wrong.
    pub reason: String,
}

type Result<T> = std::result::Result<T, LiteralError>;

/// Parse one literal value spanning the whole input.
pub fn parse(input: &str) -> Result<Value> {
    let mut parser = Parser {
        src: input,
        pos: 0,
        depth: 0,
    };
    let value = parser.value()?;
    parser.skip_ws();
    if parser.pos != input.len() {
        return Err(parser.error("trailing input"));
    }
    Ok(value)
}

struct Parser<'a> {
    src: &'a str,
    pos: usize,
    depth: usize,
}

impl<'a> Parser<'a> {
    fn error(&self, reason: impl Into<String>) -> LiteralError {
        LiteralError {
            offset: self.pos,
            reason: reason.into(),
        }
    }

    fn rest(&self) -> &'a str {
        &self.src[self.pos..]
    }

    fn peek(&self) -> Option<char> {
        self.rest().chars().next()
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.pos += c.len_utf8();
        Some(c)
    }

    fn skip_ws(&mut self) {
        while let Some(c) = self.peek() {
            if !c.is_whitespace() {
                break;
            }
            self.pos += c.len_utf8();
        }
    }

    fn expect(&mut self, expected: char) -> Result<()> {
        self.skip_ws();
        match self.bump() {
            Some(c) if c == expected => Ok(()),
            Some(c) => Err(self.error(format!("expected '{expected}', found '{c}'"))),
            None => Err(self.error(format!("expected '{expected}', found end of input"))),
        }
    }

    fn value(&mut self) -> Result<Value> {
        self.skip_ws();
        self.depth += 1;
        if self.depth > MAX_DEPTH {
            return Err(self.error("nesting too deep"));
        }
        let value = match self.peek() {
            Some('{') => self.map(),
            Some('[') => self.sequence('[', ']').map(Value::Array),
            Some('(') => self.parenthesized(),
            Some('<') => self.angle_repr(),
            Some('\'' | '"') => self.string().map(Value::String),
            Some(c) if c == '-' || c == '+' || c.is_ascii_digit() => self.number(),
            Some(c) if c.is_alphabetic() || c == '_' => self.word(),
            Some(c) => Err(self.error(format!("unexpected '{c}'"))),
            None => Err(self.error("unexpected end of input")),
        };
        self.depth -= 1;
        value
    }

    fn map(&mut self) -> Result<Value> {
        self.expect('{')?;
        let mut map = Map::new();
        loop {
            self.skip_ws();
            if self.peek() == Some('}') {
                self.bump();
                return Ok(Value::Object(map));
            }
            let key = self.value()?;
            self.expect(':')?;
            let value = self.value()?;
            map.insert(key_string(key), value);

            self.skip_ws();
            match self.bump() {
                Some(',') => continue,
                Some('}') => return Ok(Value::Object(map)),
                _ => return Err(self.error("expected ',' or '}' in map")),
            }
        }
    }

    fn sequence(&mut self, open: char, close: char) -> Result<Vec<Value>> {
        self.expect(open)?;
        let mut items = Vec::new();
        loop {
            self.skip_ws();
            if self.peek() == Some(close) {
                self.bump();
                return Ok(items);
            }
            items.push(self.value()?);
            self.skip_ws();
            match self.bump() {
                Some(',') => continue,
                Some(c) if c == close => return Ok(items),
                _ => return Err(self.error(format!("expected ',' or '{close}'"))),
            }
        }
    }

    /// `(x)` is just `x`; `()`, `(x,)` and `(x, y)` are tuples.
    fn parenthesized(&mut self) -> Result<Value> {
        let start = self.pos;
        let items = self.sequence('(', ')')?;
        let inner = &self.src[start..self.pos];
        let trailing_comma = inner
            .strip_suffix(')')
            .unwrap_or(inner)
            .trim_end()
            .ends_with(',');
        if items.len() == 1 && !trailing_comma {
            Ok(items.into_iter().next().unwrap_or(Value::Null))
        } else {
            Ok(Value::Array(items))
        }
    }

    /// `<Foo object at 0x...>` style reprs are kept as their text.
    fn angle_repr(&mut self) -> Result<Value> {
        let start = self.pos;
        let end = self
            .rest()
            .find('>')
            .ok_or_else(|| self.error("unterminated '<' repr"))?;
        self.pos += end + 1;
        Ok(Value::String(self.src[start..self.pos].to_string()))
    }

    /// One or more adjacent string literals, concatenated.
    fn string(&mut self) -> Result<String> {
        let mut out = self.single_string(false)?;
        loop {
            let save = self.pos;
            self.skip_ws();
            match self.peek() {
                Some('\'' | '"') => out.push_str(&self.single_string(false)?),
                _ => {
                    self.pos = save;
                    return Ok(out);
                }
            }
        }
    }

    fn single_string(&mut self, raw: bool) -> Result<String> {
        let quote = self.bump().ok_or_else(|| self.error("expected string"))?;
        let triple = quote.to_string().repeat(3);
        let is_triple = self.src[self.pos - quote.len_utf8()..].starts_with(&triple);
        if is_triple {
            self.pos += 2 * quote.len_utf8();
        }

        let mut out = String::new();
        loop {
            if is_triple && self.rest().starts_with(&triple) {
                self.pos += triple.len();
                return Ok(out);
            }
            let c = self
                .bump()
                .ok_or_else(|| self.error("unterminated string"))?;
            match c {
                c if c == quote && !is_triple => return Ok(out),
                '\\' if raw => {
                    out.push('\\');
                    if let Some(next) = self.bump() {
                        out.push(next);
                    }
                }
                '\\' => self.escape(&mut out)?,
                c => out.push(c),
            }
        }
    }

    fn escape(&mut self, out: &mut String) -> Result<()> {
        let c = self
            .bump()
            .ok_or_else(|| self.error("unterminated escape"))?;
        match c {
            'n' => out.push('\n'),
            't' => out.push('\t'),
            'r' => out.push('\r'),
            '0' => out.push('\0'),
            'a' => out.push('\u{07}'),
            'b' => out.push('\u{08}'),
            'f' => out.push('\u{0C}'),
            'v' => out.push('\u{0B}'),
            '\\' | '\'' | '"' | '/' => out.push(c),
            '\n' => {}
            'x' => out.push(self.hex_char(2)?),
            'u' => out.push(self.hex_char(4)?),
            'U' => out.push(self.hex_char(8)?),
            other => {
                out.push('\\');
                out.push(other);
            }
        }
        Ok(())
    }

    fn hex_char(&mut self, len: usize) -> Result<char> {
        let digits = self
            .rest()
            .get(..len)
            .ok_or_else(|| self.error("truncated escape"))?;
        let code =
            u32::from_str_radix(digits, 16).map_err(|_| self.error("invalid hex escape"))?;
        self.pos += len;
        char::from_u32(code).ok_or_else(|| self.error("invalid code point"))
    }

    fn number(&mut self) -> Result<Value> {
        let start = self.pos;
        if matches!(self.peek(), Some('-' | '+')) {
            self.bump();
        }
        let mut is_float = false;
        while let Some(c) = self.peek() {
            match c {
                '0'..='9' | '_' => {}
                '.' | 'e' | 'E' => is_float = true,
                '-' | '+' if matches!(self.src[..self.pos].chars().last(), Some('e' | 'E')) => {}
                _ => break,
            }
            self.bump();
        }
        let text: String = self.src[start..self.pos]
            .chars()
            .filter(|c| *c != '_' && *c != '+')
            .collect();

        if !is_float {
            if let Ok(n) = text.parse::<i64>() {
                return Ok(Value::Number(n.into()));
            }
            if let Ok(n) = text.parse::<u64>() {
                return Ok(Value::Number(n.into()));
            }
        }
        text.parse::<f64>()
            .ok()
            .and_then(Number::from_f64)
            .map(Value::Number)
            .ok_or_else(|| LiteralError {
                offset: start,
                reason: format!("invalid number '{text}'"),
            })
    }

    fn word(&mut self) -> Result<Value> {
        let start = self.pos;
        while let Some(c) = self.peek() {
            if c.is_alphanumeric() || c == '_' || c == '.' {
                self.bump();
            } else {
                break;
            }
        }
        let word = &self.src[start..self.pos];

        // String prefixes: r'..', b'..', u'..', rb'..'
        if word.len() <= 2
            && word.chars().all(|c| "rRbBuU".contains(c))
            && matches!(self.peek(), Some('\'' | '"'))
        {
            let raw = word.contains(['r', 'R']);
            return self.single_string(raw).map(Value::String);
        }

        match word {
            "None" | "null" => return Ok(Value::Null),
            "True" | "true" => return Ok(Value::Bool(true)),
            "False" | "false" => return Ok(Value::Bool(false)),
            _ => {}
        }

        self.skip_ws();
        if self.peek() == Some('(') {
            return self.call();
        }
        Err(LiteralError {
            offset: start,
            reason: format!("unknown identifier '{word}'"),
        })
    }

    fn call(&mut self) -> Result<Value> {
        self.expect('(')?;
        let mut kwargs = Map::new();
        let mut args = Vec::new();
        loop {
            self.skip_ws();
            if self.peek() == Some(')') {
                self.bump();
                break;
            }
            if let Some(name) = self.keyword_name() {
                kwargs.insert(name.to_string(), self.value()?);
            } else {
                args.push(self.value()?);
            }
            self.skip_ws();
            match self.bump() {
                Some(',') => continue,
                Some(')') => break,
                _ => return Err(self.error("expected ',' or ')' in call")),
            }
        }
        if !args.is_empty() {
            kwargs.insert("args".to_string(), Value::Array(args));
        }
        Ok(Value::Object(kwargs))
    }

    /// Consume `name=` if the input starts with a keyword argument.
    fn keyword_name(&mut self) -> Option<&'a str> {
        let rest = self.rest();
        let len = rest
            .find(|c: char| !(c.is_alphanumeric() || c == '_'))
            .unwrap_or(rest.len());
        if len == 0 || rest.starts_with(|c: char| c.is_ascii_digit()) {
            return None;
        }
        let after = rest[len..].trim_start();
        if after.starts_with('=') && !after.starts_with("==") {
            let name = &rest[..len];
            self.pos += rest.len() - after.len() + 1;
            Some(name)
        } else {
            None
        }
    }
}

fn key_string(key: Value) -> String {
    match key {
        Value::String(s) => s,
        other => other.to_string(),
    }
}
