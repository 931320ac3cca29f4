//! Tokenizer for toolscript, including Python-style indentation tracking.

use crate::{Error, Result};

const OPERATORS: &[&str] = &[
    "**=", "//=", ">>=", "<<=", "...", "**", "//", "==", "!=", "<=", ">=", "->", "+=", "-=", "*=",
    "/=", "%=", "<<", ">>", ":=", "+", "-", "*", "/", "%", "<", ">", "=", "(", ")", "[", "]", "{",
    "}", ",", ":", ".", ";", "@", "&", "|", "^", "~",
];

#[derive(Debug, Clone, PartialEq)]
pub enum Tok {
    Name(String),
    Int(i64),
    Float(f64),
    /// A plain string literal with escapes already resolved.
    Str(String),
    /// The unprocessed body of an f-string literal.
    FStr { body: String, raw: bool },
    Op(&'static str),
    Newline,
    Indent,
    Dedent,
    Eof,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub tok: Tok,
    pub line: usize,
    pub column: usize,
}

/// Split source text into tokens.
pub fn tokenize(src: &str) -> Result<Vec<Token>> {
    Lexer::new(src).run()
}

struct Lexer {
    chars: Vec<char>,
    pos: usize,
    line: usize,
    column: usize,
    indents: Vec<usize>,
    depth: usize,
    at_line_start: bool,
    tokens: Vec<Token>,
}

impl Lexer {
    fn new(src: &str) -> Self {
        Self {
            chars: src.chars().collect(),
            pos: 0,
            line: 1,
            column: 1,
            indents: vec![0],
            depth: 0,
            at_line_start: true,
            tokens: Vec::new(),
        }
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn peek_at(&self, offset: usize) -> Option<char> {
        self.chars.get(self.pos + offset).copied()
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.chars.get(self.pos).copied()?;
        self.pos += 1;
        if c == '\n' {
            self.line += 1;
            self.column = 1;
        } else {
            self.column += 1;
        }
        Some(c)
    }

    fn error(&self, message: impl Into<String>) -> Error {
        Error::syntax(self.line, self.column, message)
    }

    fn push(&mut self, tok: Tok, line: usize, column: usize) {
        self.tokens.push(Token { tok, line, column });
    }

    fn push_newline(&mut self) {
        let needed = matches!(
            self.tokens.last(),
            Some(t) if !matches!(t.tok, Tok::Newline | Tok::Indent | Tok::Dedent)
        );
        if needed {
            self.push(Tok::Newline, self.line, self.column);
        }
    }

    fn run(mut self) -> Result<Vec<Token>> {
        loop {
            if self.at_line_start && self.depth == 0 {
                if !self.indentation()? {
                    break;
                }
                continue;
            }

            let Some(c) = self.peek() else { break };
            match c {
                ' ' | '\t' | '\r' | '\x0c' => {
                    self.bump();
                }
                '\n' => {
                    self.bump();
                    if self.depth == 0 {
                        self.push_newline();
                        self.at_line_start = true;
                    }
                }
                '#' => self.skip_comment(),
                '\\' => {
                    self.bump();
                    if self.peek() == Some('\r') {
                        self.bump();
                    }
                    if self.bump() != Some('\n') {
                        return Err(self.error("unexpected character after line continuation"));
                    }
                }
                c if c.is_ascii_digit() => self.number()?,
                '.' if self.peek_at(1).is_some_and(|d| d.is_ascii_digit()) => self.number()?,
                c if c.is_alphabetic() || c == '_' => self.name_or_string()?,
                '\'' | '"' => self.string(String::new())?,
                _ => self.operator()?,
            }
        }

        if self.depth > 0 {
            return Err(self.error("unexpected end of input inside brackets"));
        }
        self.push_newline();
        while self.indents.len() > 1 {
            self.indents.pop();
            self.push(Tok::Dedent, self.line, self.column);
        }
        self.push(Tok::Eof, self.line, self.column);
        Ok(self.tokens)
    }

    /// Measure the indentation of a new logical line and emit INDENT/DEDENT.
    /// Returns false at end of input.
    fn indentation(&mut self) -> Result<bool> {
        let mut width = 0;
        loop {
            match self.peek() {
                Some(' ') => width += 1,
                Some('\t') => width = (width / 8 + 1) * 8,
                Some('\x0c') | Some('\r') => {}
                _ => break,
            }
            self.bump();
        }

        match self.peek() {
            None => return Ok(false),
            Some('\n') => {
                self.bump();
                return Ok(true);
            }
            Some('#') => {
                self.skip_comment();
                return Ok(true);
            }
            _ => {}
        }

        self.at_line_start = false;
        let current = *self.indents.last().unwrap_or(&0);
        if width > current {
            self.indents.push(width);
            self.push(Tok::Indent, self.line, 1);
        } else if width < current {
            while width < *self.indents.last().unwrap_or(&0) {
                self.indents.pop();
                self.push(Tok::Dedent, self.line, 1);
            }
            if width != *self.indents.last().unwrap_or(&0) {
                return Err(self.error("unindent does not match any outer indentation level"));
            }
        }
        Ok(true)
    }

    fn skip_comment(&mut self) {
        while let Some(c) = self.peek() {
            if c == '\n' {
                break;
            }
            self.bump();
        }
    }

    fn number(&mut self) -> Result<()> {
        let (line, column) = (self.line, self.column);

        if self.peek() == Some('0') {
            let radix = match self.peek_at(1) {
                Some('x' | 'X') => Some(16),
                Some('o' | 'O') => Some(8),
                Some('b' | 'B') => Some(2),
                _ => None,
            };
            if let Some(radix) = radix {
                self.bump();
                self.bump();
                let digits = self.take_while(|c| c.is_ascii_alphanumeric() || c == '_');
                let value = i64::from_str_radix(&digits.replace('_', ""), radix)
                    .map_err(|_| Error::syntax(line, column, "invalid integer literal"))?;
                self.push(Tok::Int(value), line, column);
                return Ok(());
            }
        }

        let mut text = self.take_while(|c| c.is_ascii_digit() || c == '_');
        let mut is_float = false;

        if self.peek() == Some('.') {
            is_float = true;
            self.bump();
            text.push('.');
            text.push_str(&self.take_while(|c| c.is_ascii_digit() || c == '_'));
        }
        if matches!(self.peek(), Some('e' | 'E'))
            && (self.peek_at(1).is_some_and(|c| c.is_ascii_digit())
                || (matches!(self.peek_at(1), Some('+' | '-'))
                    && self.peek_at(2).is_some_and(|c| c.is_ascii_digit())))
        {
            is_float = true;
            text.push('e');
            self.bump();
            if let Some(sign @ ('+' | '-')) = self.peek() {
                text.push(sign);
                self.bump();
            }
            text.push_str(&self.take_while(|c| c.is_ascii_digit()));
        }
        if matches!(self.peek(), Some('j' | 'J')) {
            return Err(Error::unsupported("complex literal", line));
        }

        let text = text.replace('_', "");
        let tok = if is_float {
            let text = if text.starts_with('.') { format!("0{text}") } else { text };
            Tok::Float(
                text.parse()
                    .map_err(|_| Error::syntax(line, column, "invalid float literal"))?,
            )
        } else {
            Tok::Int(
                text.parse()
                    .map_err(|_| Error::syntax(line, column, "integer literal too large"))?,
            )
        };
        self.push(tok, line, column);
        Ok(())
    }

    fn take_while(&mut self, pred: impl Fn(char) -> bool) -> String {
        let mut out = String::new();
        while let Some(c) = self.peek() {
            if !pred(c) {
                break;
            }
            out.push(c);
            self.bump();
        }
        out
    }

    fn name_or_string(&mut self) -> Result<()> {
        let (line, column) = (self.line, self.column);
        let name = self.take_while(|c| c.is_alphanumeric() || c == '_');

        let is_prefix = name.len() <= 2
            && name
                .chars()
                .all(|c| matches!(c.to_ascii_lowercase(), 'r' | 'f' | 'u' | 'b'));
        if is_prefix && matches!(self.peek(), Some('\'' | '"')) {
            return self.string(name);
        }

        self.push(Tok::Name(name), line, column);
        Ok(())
    }

    fn string(&mut self, prefix: String) -> Result<()> {
        let line = self.line;
        let column = self.column - prefix.chars().count();
        let prefix = prefix.to_ascii_lowercase();
        if prefix.contains('b') {
            return Err(Error::unsupported("bytes literal", line));
        }
        let raw = prefix.contains('r');
        let fstring = prefix.contains('f');

        let Some(quote) = self.bump() else {
            return Err(self.error("expected string literal"));
        };
        let triple = self.peek() == Some(quote) && self.peek_at(1) == Some(quote);
        if triple {
            self.bump();
            self.bump();
        }

        let mut body = String::new();
        loop {
            let Some(c) = self.peek() else {
                return Err(Error::syntax(line, column, "unterminated string literal"));
            };
            if c == quote {
                if !triple {
                    self.bump();
                    break;
                }
                if self.peek_at(1) == Some(quote) && self.peek_at(2) == Some(quote) {
                    self.bump();
                    self.bump();
                    self.bump();
                    break;
                }
            }
            if c == '\n' && !triple {
                return Err(Error::syntax(line, column, "unterminated string literal"));
            }
            if c == '\\' {
                body.push(c);
                self.bump();
                if let Some(next) = self.bump() {
                    body.push(next);
                }
                continue;
            }
            body.push(c);
            self.bump();
        }

        let tok = if fstring {
            Tok::FStr { body, raw }
        } else if raw {
            Tok::Str(body)
        } else {
            Tok::Str(unescape(&body).map_err(|m| Error::syntax(line, column, m))?)
        };
        self.push(tok, line, column);
        Ok(())
    }

    fn operator(&mut self) -> Result<()> {
        let (line, column) = (self.line, self.column);
        let rest: String = self.chars[self.pos..].iter().take(3).collect();
        let Some(op) = OPERATORS.iter().find(|op| rest.starts_with(**op)) else {
            let c = self.peek().unwrap_or(' ');
            return Err(self.error(format!("invalid character '{c}'")));
        };
        let op: &'static str = *op;

        match op {
            "(" | "[" | "{" => self.depth += 1,
            ")" | "]" | "}" => {
                if self.depth == 0 {
                    return Err(self.error(format!("unmatched '{op}'")));
                }
                self.depth -= 1;
            }
            _ => {}
        }
        for _ in 0..op.len() {
            self.bump();
        }
        self.push(Tok::Op(op), line, column);
        Ok(())
    }
}

/// Resolve backslash escapes in a non-raw string body.
pub(crate) fn unescape(body: &str) -> std::result::Result<String, String> {
    let mut out = String::with_capacity(body.len());
    let mut chars = body.chars().peekable();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        let Some(esc) = chars.next() else {
            out.push('\\');
            break;
        };
        match esc {
            '\n' => {}
            '\\' => out.push('\\'),
            '\'' => out.push('\''),
            '"' => out.push('"'),
            'n' => out.push('\n'),
            't' => out.push('\t'),
            'r' => out.push('\r'),
            '0' => out.push('\0'),
            'a' => out.push('\x07'),
            'b' => out.push('\x08'),
            'f' => out.push('\x0c'),
            'v' => out.push('\x0b'),
            'x' | 'u' | 'U' => {
                let len = match esc {
                    'x' => 2,
                    'u' => 4,
                    _ => 8,
                };
                let hex: String = (0..len).filter_map(|_| chars.next()).collect();
                let decoded = u32::from_str_radix(&hex, 16)
                    .ok()
                    .filter(|_| hex.len() == len)
                    .and_then(char::from_u32)
                    .ok_or_else(|| format!("invalid \\{esc} escape"))?;
                out.push(decoded);
            }
            other => {
                out.push('\\');
                out.push(other);
            }
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn toks(src: &str) -> Vec<Tok> {
        tokenize(src).unwrap().into_iter().map(|t| t.tok).collect()
    }

    #[test]
    fn indentation_produces_indent_and_dedent() {
        let src = "def f():\n    return 1\nx = 2\n";
        assert_eq!(
            toks(src),
            vec![
                Tok::Name("def".into()),
                Tok::Name("f".into()),
                Tok::Op("("),
                Tok::Op(")"),
                Tok::Op(":"),
                Tok::Newline,
                Tok::Indent,
                Tok::Name("return".into()),
                Tok::Int(1),
                Tok::Newline,
                Tok::Dedent,
                Tok::Name("x".into()),
                Tok::Op("="),
                Tok::Int(2),
                Tok::Newline,
                Tok::Eof,
            ]
        );
    }

    #[test]
    fn blank_lines_and_comments_are_ignored() {
        let src = "x = 1\n\n   # note\n\ny = 2";
        let names: Vec<_> = toks(src)
            .into_iter()
            .filter(|t| matches!(t, Tok::Indent | Tok::Dedent))
            .collect();
        assert!(names.is_empty());
    }

    #[test]
    fn newlines_inside_brackets_are_joined() {
        let src = "x = (1,\n     2)\n";
        assert!(!toks(src)[..7].contains(&Tok::Newline));
    }

    #[test]
    fn string_prefixes() {
        assert_eq!(toks("'a\\nb'")[0], Tok::Str("a\nb".into()));
        assert_eq!(toks("r'a\\nb'")[0], Tok::Str("a\\nb".into()));
        assert_eq!(
            toks("f\"t={t:.1f}\"")[0],
            Tok::FStr {
                body: "t={t:.1f}".into(),
                raw: false
            }
        );
        assert_eq!(toks("\"\"\"multi\nline\"\"\"")[0], Tok::Str("multi\nline".into()));
    }

    #[test]
    fn numbers() {
        assert_eq!(toks("1_000")[0], Tok::Int(1000));
        assert_eq!(toks("2.5e2")[0], Tok::Float(250.0));
        assert_eq!(toks(".5")[0], Tok::Float(0.5));
        assert_eq!(toks("0x1f")[0], Tok::Int(31));
    }

    #[test]
    fn inconsistent_dedent_is_an_error() {
        let err = tokenize("if x:\n    a = 1\n  b = 2\n").unwrap_err();
        assert!(matches!(err, Error::Syntax { line: 3, .. }));
    }

    #[test]
    fn unterminated_string_is_an_error() {
        assert!(matches!(
            tokenize("x = 'abc\n").unwrap_err(),
            Error::Syntax { .. }
        ));
    }

    #[test]
    fn bytes_are_unsupported() {
        assert!(matches!(
            tokenize("b'abc'").unwrap_err(),
            Error::Unsupported { .. }
        ));
    }
}
