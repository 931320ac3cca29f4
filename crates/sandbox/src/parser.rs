//! Recursive-descent parser for toolscript.
//!
//! The grammar is a closed subset of Python. Constructs outside it are
//! reported as [`Error::Unsupported`] rather than silently ignored.

use std::rc::Rc;

use crate::ast::{
    BinOp, BoolOp, CmpOp, Comprehension, Expr, FPart, FunctionDef, Handler, Parameter, Program,
    Stmt, StmtKind, Target, UnaryOp,
};
use crate::lexer::{Tok, Token, tokenize, unescape};
use crate::{Error, Result};

const KEYWORDS: &[&str] = &[
    "False", "None", "True", "and", "as", "assert", "async", "await", "break", "class",
    "continue", "def", "del", "elif", "else", "except", "finally", "for", "from", "global", "if",
    "import", "in", "is", "lambda", "nonlocal", "not", "or", "pass", "raise", "return", "try",
    "while", "with", "yield",
];

const UNSUPPORTED_KEYWORDS: &[&str] = &[
    "class", "lambda", "with", "yield", "global", "nonlocal", "async", "await", "del", "assert",
    "finally",
];

/// Deepest nesting of brackets, unary operators, operator chains and blocks.
const MAX_NESTING: usize = 100;

const AUG_OPS: &[(&str, BinOp)] = &[
    ("+=", BinOp::Add),
    ("-=", BinOp::Sub),
    ("*=", BinOp::Mul),
    ("/=", BinOp::Div),
    ("//=", BinOp::FloorDiv),
    ("%=", BinOp::Mod),
    ("**=", BinOp::Pow),
];

/// Parse a complete program.
pub fn parse(src: &str) -> Result<Program> {
    let mut parser = Parser::new(tokenize(src)?);
    let mut body = Vec::new();
    while !parser.at(&Tok::Eof) {
        if parser.eat(&Tok::Newline) {
            continue;
        }
        parser.statement(&mut body)?;
    }
    Ok(Program { body })
}

/// Parse the text of an f-string replacement field.
fn parse_field_expression(text: &str, line: usize) -> Result<Expr> {
    let tokens = tokenize(&format!("({text})"))
        .map_err(|e| shift_line(e, line))?
        .into_iter()
        .map(|t| Token {
            line: t.line + line - 1,
            ..t
        })
        .collect();
    let mut parser = Parser::new(tokens);
    let expr = parser.expression_list()?;
    parser.eat(&Tok::Newline);
    if !parser.at(&Tok::Eof) {
        return Err(parser.error_here("invalid expression in f-string"));
    }
    Ok(expr)
}

fn shift_line(err: Error, line: usize) -> Error {
    match err {
        Error::Syntax {
            line: l,
            column,
            message,
        } => Error::Syntax {
            line: l + line - 1,
            column,
            message,
        },
        Error::Unsupported { construct, line: l } => Error::Unsupported {
            construct,
            line: l + line - 1,
        },
        other => other,
    }
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    depth: usize,
}

impl Parser {
    fn new(tokens: Vec<Token>) -> Self {
        Self {
            tokens,
            pos: 0,
            depth: 0,
        }
    }

    // --- token helpers ---

    fn peek(&self) -> &Token {
        let last = self.tokens.len().saturating_sub(1);
        &self.tokens[self.pos.min(last)]
    }

    fn peek_nth(&self, n: usize) -> Option<&Tok> {
        self.tokens.get(self.pos + n).map(|t| &t.tok)
    }

    fn line(&self) -> usize {
        self.peek().line
    }

    fn advance(&mut self) -> Token {
        let token = self.peek().clone();
        if self.pos < self.tokens.len() {
            self.pos += 1;
        }
        token
    }

    fn at(&self, tok: &Tok) -> bool {
        &self.peek().tok == tok
    }

    fn eat(&mut self, tok: &Tok) -> bool {
        if self.at(tok) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn at_op(&self, op: &str) -> bool {
        matches!(&self.peek().tok, Tok::Op(o) if *o == op)
    }

    fn eat_op(&mut self, op: &str) -> bool {
        if self.at_op(op) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn expect_op(&mut self, op: &str) -> Result<()> {
        if self.eat_op(op) {
            Ok(())
        } else {
            Err(self.error_here(format!("expected '{op}'")))
        }
    }

    fn at_keyword(&self, kw: &str) -> bool {
        matches!(&self.peek().tok, Tok::Name(n) if n == kw)
    }

    fn eat_keyword(&mut self, kw: &str) -> bool {
        if self.at_keyword(kw) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn expect_keyword(&mut self, kw: &str) -> Result<()> {
        if self.eat_keyword(kw) {
            Ok(())
        } else {
            Err(self.error_here(format!("expected '{kw}'")))
        }
    }

    fn identifier(&mut self) -> Result<String> {
        match &self.peek().tok {
            Tok::Name(n) if !KEYWORDS.contains(&n.as_str()) => {
                let name = n.clone();
                self.advance();
                Ok(name)
            }
            _ => Err(self.error_here("expected an identifier")),
        }
    }

    fn error_here(&self, message: impl Into<String>) -> Error {
        let token = self.peek();
        let found = describe(&token.tok);
        Error::syntax(
            token.line,
            token.column,
            format!("{}, found {found}", message.into()),
        )
    }

    /// Enter one level of nesting. Callers undo it with `self.depth -= 1`
    /// once the nested part has parsed.
    fn descend(&mut self) -> Result<()> {
        self.depth += 1;
        if self.depth > MAX_NESTING {
            let token = self.peek();
            return Err(Error::syntax(
                token.line,
                token.column,
                "too many nested expressions or blocks",
            ));
        }
        Ok(())
    }

    fn expect_line_end(&mut self) -> Result<()> {
        if self.eat(&Tok::Newline) || self.at(&Tok::Eof) {
            Ok(())
        } else {
            Err(self.error_here("expected end of line"))
        }
    }

    /// Whether the next token can begin an expression.
    fn at_expression_start(&self) -> bool {
        match &self.peek().tok {
            Tok::Int(_) | Tok::Float(_) | Tok::Str(_) | Tok::FStr { .. } => true,
            Tok::Name(n) => {
                !KEYWORDS.contains(&n.as_str())
                    || matches!(n.as_str(), "True" | "False" | "None" | "not" | "lambda")
            }
            Tok::Op(op) => matches!(*op, "(" | "[" | "{" | "-" | "+" | "~" | "..."),
            _ => false,
        }
    }

    // --- statements ---

    fn statement(&mut self, out: &mut Vec<Stmt>) -> Result<()> {
        let line = self.line();
        match &self.peek().tok {
            Tok::Name(kw) => match kw.as_str() {
                "def" => out.push(self.function_def()?),
                "if" => out.push(self.if_statement()?),
                "while" => out.push(self.while_statement()?),
                "for" => out.push(self.for_statement()?),
                "try" => out.push(self.try_statement()?),
                kw if UNSUPPORTED_KEYWORDS.contains(&kw) => {
                    return Err(Error::unsupported(kw, line));
                }
                _ => self.simple_statements(out)?,
            },
            Tok::Op("@") => return Err(Error::unsupported("decorator", line)),
            Tok::Indent => return Err(self.error_here("unexpected indent")),
            _ => self.simple_statements(out)?,
        }
        Ok(())
    }

    fn simple_statements(&mut self, out: &mut Vec<Stmt>) -> Result<()> {
        loop {
            self.simple_statement(out)?;
            if self.eat_op(";") {
                if self.at(&Tok::Newline) || self.at(&Tok::Eof) {
                    break;
                }
                continue;
            }
            break;
        }
        self.expect_line_end()
    }

    fn simple_statement(&mut self, out: &mut Vec<Stmt>) -> Result<()> {
        let line = self.line();
        let stmt = |kind| Stmt { line, kind };

        if let Tok::Name(kw) = &self.peek().tok {
            match kw.as_str() {
                "pass" => {
                    self.advance();
                    out.push(stmt(StmtKind::Pass));
                    return Ok(());
                }
                "break" => {
                    self.advance();
                    out.push(stmt(StmtKind::Break));
                    return Ok(());
                }
                "continue" => {
                    self.advance();
                    out.push(stmt(StmtKind::Continue));
                    return Ok(());
                }
                "return" => {
                    self.advance();
                    let value = if self.at_expression_start() {
                        Some(self.expression_list()?)
                    } else {
                        None
                    };
                    out.push(stmt(StmtKind::Return(value)));
                    return Ok(());
                }
                "raise" => {
                    self.advance();
                    let value = if self.at_expression_start() {
                        Some(self.expression()?)
                    } else {
                        None
                    };
                    if self.eat_keyword("from") {
                        self.expression()?;
                    }
                    out.push(stmt(StmtKind::Raise(value)));
                    return Ok(());
                }
                "import" => {
                    self.advance();
                    loop {
                        let module = self.dotted_name()?;
                        if self.eat_keyword("as") {
                            self.identifier()?;
                        }
                        out.push(stmt(StmtKind::Import { module }));
                        if !self.eat_op(",") {
                            break;
                        }
                    }
                    return Ok(());
                }
                "from" => {
                    self.advance();
                    if self.at_op(".") || self.at_op("...") {
                        return Err(Error::unsupported("relative import", line));
                    }
                    let module = self.dotted_name()?;
                    self.expect_keyword("import")?;
                    self.import_names()?;
                    out.push(stmt(StmtKind::Import { module }));
                    return Ok(());
                }
                kw if UNSUPPORTED_KEYWORDS.contains(&kw) => {
                    return Err(Error::unsupported(kw, line));
                }
                _ => {}
            }
        }

        let expr = self.expression_list()?;

        if self.at_op("=") {
            self.advance();
            let target = self.to_target(expr, line)?;
            let value = self.expression_list()?;
            if self.at_op("=") {
                return Err(Error::unsupported("chained assignment", line));
            }
            out.push(stmt(StmtKind::Assign { target, value }));
            return Ok(());
        }

        if self.at_op(":") {
            let Expr::Name(name) = expr else {
                return Err(self.error_here("only names can be annotated"));
            };
            self.advance();
            self.expression()?;
            if self.eat_op("=") {
                let value = self.expression_list()?;
                out.push(stmt(StmtKind::Assign {
                    target: Target::Name(name),
                    value,
                }));
            } else {
                out.push(stmt(StmtKind::Pass));
            }
            return Ok(());
        }

        if let Some((_, op)) = AUG_OPS.iter().find(|(sym, _)| self.at_op(sym)) {
            let op = *op;
            self.advance();
            let target = match self.to_target(expr, line)? {
                Target::Tuple(_) => {
                    return Err(Error::syntax(
                        line,
                        1,
                        "illegal expression for augmented assignment",
                    ));
                }
                target => target,
            };
            let value = self.expression_list()?;
            out.push(stmt(StmtKind::AugAssign { target, op, value }));
            return Ok(());
        }

        if self.at_op(":=") {
            return Err(Error::unsupported("assignment expression", line));
        }
        for op in ["&=", "|=", "^=", ">>=", "<<="] {
            if self.at_op(op) {
                return Err(Error::unsupported("bitwise operator", line));
            }
        }

        out.push(stmt(StmtKind::Expr(expr)));
        Ok(())
    }

    fn dotted_name(&mut self) -> Result<String> {
        let mut name = self.identifier()?;
        while self.eat_op(".") {
            name.push('.');
            name.push_str(&self.identifier()?);
        }
        Ok(name)
    }

    fn import_names(&mut self) -> Result<()> {
        if self.eat_op("*") {
            return Ok(());
        }
        let parenthesized = self.eat_op("(");
        loop {
            self.identifier()?;
            if self.eat_keyword("as") {
                self.identifier()?;
            }
            if !self.eat_op(",") {
                break;
            }
            if parenthesized && self.at_op(")") {
                break;
            }
        }
        if parenthesized {
            self.expect_op(")")?;
        }
        Ok(())
    }

    fn to_target(&self, expr: Expr, line: usize) -> Result<Target> {
        match expr {
            Expr::Name(name) => Ok(Target::Name(name)),
            Expr::Tuple(items) | Expr::List(items) => Ok(Target::Tuple(
                items
                    .into_iter()
                    .map(|e| self.to_target(e, line))
                    .collect::<Result<_>>()?,
            )),
            Expr::Subscript { value, index } => Ok(Target::Subscript {
                object: *value,
                index: *index,
            }),
            Expr::Attribute { .. } => Err(Error::unsupported("attribute assignment", line)),
            _ => Err(Error::syntax(line, 1, "cannot assign to expression")),
        }
    }

    fn block(&mut self) -> Result<Vec<Stmt>> {
        self.expect_op(":")?;
        self.descend()?;
        let mut body = Vec::new();
        if !self.eat(&Tok::Newline) {
            self.simple_statements(&mut body)?;
            self.depth -= 1;
            return Ok(body);
        }
        if !self.eat(&Tok::Indent) {
            return Err(self.error_here("expected an indented block"));
        }
        while !self.eat(&Tok::Dedent) {
            if self.at(&Tok::Eof) {
                break;
            }
            if self.eat(&Tok::Newline) {
                continue;
            }
            self.statement(&mut body)?;
        }
        self.depth -= 1;
        Ok(body)
    }

    fn function_def(&mut self) -> Result<Stmt> {
        let line = self.line();
        self.expect_keyword("def")?;
        let name = self.identifier()?;
        self.expect_op("(")?;

        let mut params: Vec<Parameter> = Vec::new();
        while !self.at_op(")") {
            if self.at_op("*") || self.at_op("**") {
                return Err(Error::unsupported("variadic parameters", self.line()));
            }
            if self.at_op("/") {
                return Err(Error::unsupported("positional-only marker", self.line()));
            }
            let param = self.identifier()?;
            if self.eat_op(":") {
                self.expression()?;
            }
            let default = if self.eat_op("=") {
                Some(self.expression()?)
            } else {
                None
            };
            if default.is_none() && params.iter().any(|p| p.default.is_some()) {
                return Err(Error::syntax(
                    line,
                    1,
                    "non-default argument follows default argument",
                ));
            }
            params.push(Parameter {
                name: param,
                default,
            });
            if !self.eat_op(",") {
                break;
            }
        }
        self.expect_op(")")?;
        if self.eat_op("->") {
            self.expression()?;
        }
        let body = self.block()?;

        Ok(Stmt {
            line,
            kind: StmtKind::FunctionDef(Rc::new(FunctionDef::new(name, params, body))),
        })
    }

    fn if_statement(&mut self) -> Result<Stmt> {
        let line = self.line();
        self.expect_keyword("if")?;
        let mut branches = Vec::new();
        let test = self.expression()?;
        branches.push((test, self.block()?));

        let mut orelse = Vec::new();
        loop {
            if self.eat_keyword("elif") {
                let test = self.expression()?;
                branches.push((test, self.block()?));
            } else if self.eat_keyword("else") {
                orelse = self.block()?;
                break;
            } else {
                break;
            }
        }
        Ok(Stmt {
            line,
            kind: StmtKind::If { branches, orelse },
        })
    }

    fn while_statement(&mut self) -> Result<Stmt> {
        let line = self.line();
        self.expect_keyword("while")?;
        let test = self.expression()?;
        let body = self.block()?;
        let orelse = self.loop_else()?;
        Ok(Stmt {
            line,
            kind: StmtKind::While { test, body, orelse },
        })
    }

    fn for_statement(&mut self) -> Result<Stmt> {
        let line = self.line();
        self.expect_keyword("for")?;
        let target = self.target_list(line)?;
        self.expect_keyword("in")?;
        let iter = self.expression_list()?;
        let body = self.block()?;
        let orelse = self.loop_else()?;
        Ok(Stmt {
            line,
            kind: StmtKind::For {
                target,
                iter,
                body,
                orelse,
            },
        })
    }

    /// The `else` block of a loop, run when the loop ends without `break`.
    fn loop_else(&mut self) -> Result<Vec<Stmt>> {
        if self.eat_keyword("else") {
            self.block()
        } else {
            Ok(Vec::new())
        }
    }

    /// Loop targets are parsed without comparisons so that `in` is left alone.
    fn target_list(&mut self, line: usize) -> Result<Target> {
        let first = self.postfix()?;
        if !self.at_op(",") {
            return self.to_target(first, line);
        }
        let mut items = vec![first];
        while self.eat_op(",") {
            if self.at_keyword("in") {
                break;
            }
            items.push(self.postfix()?);
        }
        self.to_target(Expr::Tuple(items), line)
    }

    fn try_statement(&mut self) -> Result<Stmt> {
        let line = self.line();
        self.expect_keyword("try")?;
        let body = self.block()?;

        let mut handlers = Vec::new();
        while self.eat_keyword("except") {
            let mut kinds = Vec::new();
            if !self.at_op(":") {
                match self.expression()? {
                    Expr::Name(name) => kinds.push(name),
                    Expr::Tuple(items) => {
                        for item in items {
                            match item {
                                Expr::Name(name) => kinds.push(name),
                                _ => return Err(self.error_here("expected exception name")),
                            }
                        }
                    }
                    _ => return Err(self.error_here("expected exception name")),
                }
            }
            let name = if self.eat_keyword("as") {
                Some(self.identifier()?)
            } else {
                None
            };
            let body = self.block()?;
            handlers.push(Handler { kinds, name, body });
        }

        if self.at_keyword("finally") {
            return Err(Error::unsupported("finally", self.line()));
        }
        if handlers.is_empty() {
            return Err(self.error_here("expected 'except'"));
        }
        let orelse = if self.eat_keyword("else") {
            self.block()?
        } else {
            Vec::new()
        };
        if self.at_keyword("finally") {
            return Err(Error::unsupported("finally", self.line()));
        }

        Ok(Stmt {
            line,
            kind: StmtKind::Try {
                body,
                handlers,
                orelse,
            },
        })
    }

    // --- expressions ---

    fn expression_list(&mut self) -> Result<Expr> {
        let first = self.expression()?;
        if !self.at_op(",") {
            return Ok(first);
        }
        let mut items = vec![first];
        while self.eat_op(",") {
            if !self.at_expression_start() {
                break;
            }
            items.push(self.expression()?);
        }
        Ok(Expr::Tuple(items))
    }

    fn expression(&mut self) -> Result<Expr> {
        self.descend()?;
        let expr = self.conditional();
        self.depth -= 1;
        expr
    }

    fn conditional(&mut self) -> Result<Expr> {
        if self.at_keyword("lambda") {
            return Err(Error::unsupported("lambda", self.line()));
        }
        let body = self.or_expr()?;
        if self.eat_keyword("if") {
            let test = self.or_expr()?;
            self.expect_keyword("else")?;
            let orelse = self.expression()?;
            return Ok(Expr::IfExp {
                test: Box::new(test),
                body: Box::new(body),
                orelse: Box::new(orelse),
            });
        }
        Ok(body)
    }

    fn or_expr(&mut self) -> Result<Expr> {
        let mut left = self.and_expr()?;
        let depth = self.depth;
        while self.eat_keyword("or") {
            self.descend()?;
            let right = self.and_expr()?;
            left = Expr::BoolOp {
                op: BoolOp::Or,
                left: Box::new(left),
                right: Box::new(right),
            };
        }
        self.depth = depth;
        Ok(left)
    }

    fn and_expr(&mut self) -> Result<Expr> {
        let mut left = self.not_expr()?;
        let depth = self.depth;
        while self.eat_keyword("and") {
            self.descend()?;
            let right = self.not_expr()?;
            left = Expr::BoolOp {
                op: BoolOp::And,
                left: Box::new(left),
                right: Box::new(right),
            };
        }
        self.depth = depth;
        Ok(left)
    }

    fn not_expr(&mut self) -> Result<Expr> {
        if self.eat_keyword("not") {
            self.descend()?;
            let operand = self.not_expr()?;
            self.depth -= 1;
            return Ok(Expr::Unary {
                op: UnaryOp::Not,
                operand: Box::new(operand),
            });
        }
        self.comparison()
    }

    fn comparison(&mut self) -> Result<Expr> {
        let left = self.arith()?;
        let mut ops = Vec::new();
        loop {
            let op = match &self.peek().tok {
                Tok::Op("==") => CmpOp::Eq,
                Tok::Op("!=") => CmpOp::NotEq,
                Tok::Op("<") => CmpOp::Lt,
                Tok::Op("<=") => CmpOp::LtE,
                Tok::Op(">") => CmpOp::Gt,
                Tok::Op(">=") => CmpOp::GtE,
                Tok::Op("|" | "&" | "^" | "<<" | ">>") => {
                    return Err(Error::unsupported("bitwise operator", self.line()));
                }
                Tok::Name(n) if n == "in" => CmpOp::In,
                Tok::Name(n) if n == "not" && self.peek_nth(1) == Some(&Tok::Name("in".into())) => {
                    self.advance();
                    CmpOp::NotIn
                }
                Tok::Name(n) if n == "is" => {
                    if self.peek_nth(1) == Some(&Tok::Name("not".into())) {
                        self.advance();
                        CmpOp::IsNot
                    } else {
                        CmpOp::Is
                    }
                }
                _ => break,
            };
            self.advance();
            ops.push((op, self.arith()?));
        }
        if ops.is_empty() {
            Ok(left)
        } else {
            Ok(Expr::Compare {
                left: Box::new(left),
                ops,
            })
        }
    }

    fn arith(&mut self) -> Result<Expr> {
        let mut left = self.term()?;
        let depth = self.depth;
        loop {
            let op = if self.at_op("+") {
                BinOp::Add
            } else if self.at_op("-") {
                BinOp::Sub
            } else {
                break;
            };
            self.advance();
            self.descend()?;
            let right = self.term()?;
            left = binary(op, left, right);
        }
        self.depth = depth;
        Ok(left)
    }

    fn term(&mut self) -> Result<Expr> {
        let mut left = self.factor()?;
        let depth = self.depth;
        loop {
            let op = match &self.peek().tok {
                Tok::Op("*") => BinOp::Mul,
                Tok::Op("/") => BinOp::Div,
                Tok::Op("//") => BinOp::FloorDiv,
                Tok::Op("%") => BinOp::Mod,
                Tok::Op("@") => return Err(Error::unsupported("matrix multiplication", self.line())),
                _ => break,
            };
            self.advance();
            self.descend()?;
            let right = self.factor()?;
            left = binary(op, left, right);
        }
        self.depth = depth;
        Ok(left)
    }

    fn factor(&mut self) -> Result<Expr> {
        let op = match &self.peek().tok {
            Tok::Op("-") => UnaryOp::Neg,
            Tok::Op("+") => UnaryOp::Pos,
            Tok::Op("~") => return Err(Error::unsupported("bitwise operator", self.line())),
            _ => return self.power(),
        };
        self.advance();
        self.descend()?;
        let operand = self.factor()?;
        self.depth -= 1;
        Ok(Expr::Unary {
            op,
            operand: Box::new(operand),
        })
    }

    fn power(&mut self) -> Result<Expr> {
        let base = self.postfix()?;
        if self.eat_op("**") {
            self.descend()?;
            let exponent = self.factor()?;
            self.depth -= 1;
            return Ok(binary(BinOp::Pow, base, exponent));
        }
        Ok(base)
    }

    fn postfix(&mut self) -> Result<Expr> {
        let mut expr = self.atom()?;
        let depth = self.depth;
        loop {
            if self.at_op("(") || self.at_op(".") || self.at_op("[") {
                self.descend()?;
            }
            if self.eat_op("(") {
                expr = self.call(expr)?;
            } else if self.eat_op(".") {
                let attr = self.identifier()?;
                expr = Expr::Attribute {
                    value: Box::new(expr),
                    attr,
                };
            } else if self.eat_op("[") {
                let index = self.subscript()?;
                self.expect_op("]")?;
                expr = Expr::Subscript {
                    value: Box::new(expr),
                    index: Box::new(index),
                };
            } else {
                break;
            }
        }
        self.depth = depth;
        Ok(expr)
    }

    fn call(&mut self, func: Expr) -> Result<Expr> {
        let mut args = Vec::new();
        let mut kwargs: Vec<(String, Expr)> = Vec::new();
        while !self.at_op(")") {
            if self.at_op("*") || self.at_op("**") {
                return Err(Error::unsupported("argument unpacking", self.line()));
            }
            let is_keyword = matches!(&self.peek().tok, Tok::Name(_))
                && self.peek_nth(1) == Some(&Tok::Op("="));
            if is_keyword {
                let name = self.identifier()?;
                self.advance();
                kwargs.push((name, self.expression()?));
            } else {
                if !kwargs.is_empty() {
                    return Err(self.error_here("positional argument follows keyword argument"));
                }
                let arg = self.expression()?;
                if self.at_keyword("for") && args.is_empty() {
                    args.push(self.comprehension(arg)?);
                    break;
                }
                args.push(arg);
            }
            if !self.eat_op(",") {
                break;
            }
        }
        self.expect_op(")")?;
        Ok(Expr::Call {
            func: Box::new(func),
            args,
            kwargs,
        })
    }

    fn subscript(&mut self) -> Result<Expr> {
        let lower = if self.at_op(":") {
            None
        } else {
            let first = self.expression()?;
            if self.at_op(",") {
                let mut items = vec![first];
                while self.eat_op(",") {
                    if self.at_op("]") {
                        break;
                    }
                    items.push(self.expression()?);
                }
                return Ok(Expr::Tuple(items));
            }
            if !self.at_op(":") {
                return Ok(first);
            }
            Some(Box::new(first))
        };
        self.expect_op(":")?;
        let upper = if self.at_op("]") || self.at_op(":") {
            None
        } else {
            Some(Box::new(self.expression()?))
        };
        let step = if self.eat_op(":") && !self.at_op("]") {
            Some(Box::new(self.expression()?))
        } else {
            None
        };
        Ok(Expr::Slice { lower, upper, step })
    }

    fn comprehension(&mut self, element: Expr) -> Result<Expr> {
        Ok(Expr::ListComp(Box::new(self.comprehension_clause(element)?)))
    }

    /// The `for ... in ... if ...` tail shared by list and dict comprehensions.
    fn comprehension_clause(&mut self, element: Expr) -> Result<Comprehension> {
        let line = self.line();
        self.expect_keyword("for")?;
        let target = self.target_list(line)?;
        self.expect_keyword("in")?;
        let iter = self.or_expr()?;
        let mut conditions = Vec::new();
        while self.eat_keyword("if") {
            conditions.push(self.or_expr()?);
        }
        if self.at_keyword("for") {
            return Err(Error::unsupported("nested comprehension", line));
        }
        Ok(Comprehension {
            element,
            target,
            iter,
            conditions,
        })
    }

    fn atom(&mut self) -> Result<Expr> {
        let line = self.line();
        let token = self.peek().clone();
        match token.tok {
            Tok::Int(v) => {
                self.advance();
                Ok(Expr::Int(v))
            }
            Tok::Float(v) => {
                self.advance();
                Ok(Expr::Float(v))
            }
            Tok::Str(_) | Tok::FStr { .. } => self.strings(),
            Tok::Name(name) => {
                let expr = match name.as_str() {
                    "True" => Expr::Bool(true),
                    "False" => Expr::Bool(false),
                    "None" => Expr::None,
                    kw if UNSUPPORTED_KEYWORDS.contains(&kw) => {
                        return Err(Error::unsupported(kw, line));
                    }
                    kw if KEYWORDS.contains(&kw) => {
                        return Err(self.error_here("unexpected keyword"));
                    }
                    _ => Expr::Name(name.clone()),
                };
                self.advance();
                Ok(expr)
            }
            Tok::Op("...") => {
                self.advance();
                Ok(Expr::None)
            }
            Tok::Op("(" | "[" | "{") => {
                self.descend()?;
                let expr = self.bracketed(line);
                self.depth -= 1;
                expr
            }
            _ => Err(self.error_here("expected an expression")),
        }
    }

    fn bracketed(&mut self, line: usize) -> Result<Expr> {
        let token = self.peek().clone();
        match token.tok {
            Tok::Op("(") => {
                self.advance();
                if self.eat_op(")") {
                    return Ok(Expr::Tuple(Vec::new()));
                }
                let first = self.expression()?;
                if self.at_keyword("for") {
                    let comp = self.comprehension(first)?;
                    self.expect_op(")")?;
                    return Ok(comp);
                }
                if !self.at_op(",") {
                    self.expect_op(")")?;
                    return Ok(first);
                }
                let items = self.sequence_rest(first, ")")?;
                Ok(Expr::Tuple(items))
            }
            Tok::Op("[") => {
                self.advance();
                if self.eat_op("]") {
                    return Ok(Expr::List(Vec::new()));
                }
                let first = self.expression()?;
                if self.at_keyword("for") {
                    let comp = self.comprehension(first)?;
                    self.expect_op("]")?;
                    return Ok(comp);
                }
                let items = self.sequence_rest(first, "]")?;
                Ok(Expr::List(items))
            }
            Tok::Op("{") => {
                self.advance();
                let mut entries = Vec::new();
                while !self.at_op("}") {
                    if self.at_op("**") {
                        return Err(Error::unsupported("dict unpacking", line));
                    }
                    let key = self.expression()?;
                    if !self.at_op(":") {
                        return Err(Error::unsupported("set literal", line));
                    }
                    self.advance();
                    let value = self.expression()?;
                    if entries.is_empty() && self.at_keyword("for") {
                        let comp = self.comprehension_clause(value)?;
                        self.expect_op("}")?;
                        return Ok(Expr::DictComp {
                            key: Box::new(key),
                            comp: Box::new(comp),
                        });
                    }
                    entries.push((key, value));
                    if !self.eat_op(",") {
                        break;
                    }
                }
                self.expect_op("}")?;
                Ok(Expr::Dict(entries))
            }
            _ => Err(self.error_here("expected a bracket")),
        }
    }

    /// Parse the remaining comma-separated items of a bracketed sequence.
    fn sequence_rest(&mut self, first: Expr, close: &str) -> Result<Vec<Expr>> {
        let mut items = vec![first];
        while self.eat_op(",") {
            if self.at_op(close) {
                break;
            }
            items.push(self.expression()?);
        }
        self.expect_op(close)?;
        Ok(items)
    }

    /// Adjacent string literals concatenate; any f-string makes the whole an f-string.
    fn strings(&mut self) -> Result<Expr> {
        let mut parts = Vec::new();
        let mut formatted = false;
        loop {
            let token = self.peek().clone();
            match token.tok {
                Tok::Str(s) => parts.push(FPart::Literal(s)),
                Tok::FStr { body, raw } => {
                    formatted = true;
                    parts.extend(fstring_parts(&body, raw, token.line)?);
                }
                _ => break,
            }
            self.advance();
        }

        if !formatted {
            let text = parts
                .into_iter()
                .map(|p| match p {
                    FPart::Literal(s) => s,
                    FPart::Field { .. } => String::new(),
                })
                .collect();
            return Ok(Expr::Str(text));
        }

        let mut merged: Vec<FPart> = Vec::new();
        for part in parts {
            match (merged.last_mut(), part) {
                (Some(FPart::Literal(prev)), FPart::Literal(s)) => prev.push_str(&s),
                (_, part) => merged.push(part),
            }
        }
        Ok(Expr::FString(merged))
    }
}

fn binary(op: BinOp, left: Expr, right: Expr) -> Expr {
    Expr::Binary {
        op,
        left: Box::new(left),
        right: Box::new(right),
    }
}

fn describe(tok: &Tok) -> String {
    match tok {
        Tok::Name(n) => format!("'{n}'"),
        Tok::Int(v) => format!("'{v}'"),
        Tok::Float(v) => format!("'{v}'"),
        Tok::Str(_) | Tok::FStr { .. } => "string literal".to_string(),
        Tok::Op(op) => format!("'{op}'"),
        Tok::Newline => "end of line".to_string(),
        Tok::Indent => "indent".to_string(),
        Tok::Dedent => "dedent".to_string(),
        Tok::Eof => "end of input".to_string(),
    }
}

/// Split an f-string body into literal text and replacement fields.
fn fstring_parts(body: &str, raw: bool, line: usize) -> Result<Vec<FPart>> {
    let chars: Vec<char> = body.chars().collect();
    let mut parts = Vec::new();
    let mut literal = String::new();
    let syntax = |message: &str| Error::syntax(line, 1, format!("f-string: {message}"));

    let flush = |literal: &mut String, parts: &mut Vec<FPart>| -> Result<()> {
        if literal.is_empty() {
            return Ok(());
        }
        let text = if raw {
            std::mem::take(literal)
        } else {
            let text = unescape(literal).map_err(|m| Error::syntax(line, 1, m))?;
            literal.clear();
            text
        };
        parts.push(FPart::Literal(text));
        Ok(())
    };

    let mut i = 0;
    while i < chars.len() {
        let c = chars[i];
        match c {
            '{' if chars.get(i + 1) == Some(&'{') => {
                literal.push('{');
                i += 2;
            }
            '}' if chars.get(i + 1) == Some(&'}') => {
                literal.push('}');
                i += 2;
            }
            '}' => return Err(syntax("single '}' is not allowed")),
            '{' => {
                flush(&mut literal, &mut parts)?;
                let start = i + 1;
                let mut j = start;
                let mut depth = 0usize;
                let mut quote: Option<char> = None;
                while j < chars.len() {
                    let ch = chars[j];
                    if let Some(q) = quote {
                        if ch == q {
                            quote = None;
                        }
                    } else {
                        match ch {
                            '\'' | '"' => quote = Some(ch),
                            '(' | '[' | '{' => depth += 1,
                            ')' | ']' => depth = depth.saturating_sub(1),
                            '}' if depth > 0 => depth -= 1,
                            '}' => break,
                            '!' if depth == 0 && chars.get(j + 1) != Some(&'=') => break,
                            ':' if depth == 0 => break,
                            _ => {}
                        }
                    }
                    j += 1;
                }
                let text: String = chars[start..j.min(chars.len())].iter().collect();
                if text.trim().is_empty() {
                    return Err(syntax("empty expression not allowed"));
                }
                if text.trim_end().ends_with('=') && !text.trim_end().ends_with("==") {
                    return Err(Error::unsupported("self-documenting f-string field", line));
                }

                let mut conversion = None;
                if chars.get(j) == Some(&'!') {
                    match chars.get(j + 1) {
                        Some(conv @ ('r' | 's' | 'a')) => conversion = Some(*conv),
                        _ => return Err(syntax("invalid conversion character")),
                    }
                    j += 2;
                }
                let mut spec = String::new();
                if chars.get(j) == Some(&':') {
                    j += 1;
                    while j < chars.len() && chars[j] != '}' {
                        if chars[j] == '{' {
                            return Err(Error::unsupported("nested format specification", line));
                        }
                        spec.push(chars[j]);
                        j += 1;
                    }
                }
                if chars.get(j) != Some(&'}') {
                    return Err(syntax("expecting '}'"));
                }

                let expr = parse_field_expression(text.trim(), line)?;
                parts.push(FPart::Field {
                    expr,
                    conversion,
                    spec,
                });
                i = j + 1;
            }
            '\\' if !raw => {
                literal.push(c);
                if let Some(next) = chars.get(i + 1) {
                    literal.push(*next);
                }
                i += 2;
            }
            _ => {
                literal.push(c);
                i += 1;
            }
        }
    }
    flush(&mut literal, &mut parts)?;
    Ok(parts)
}
