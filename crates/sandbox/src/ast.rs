//! Syntax tree for toolscript programs.

use std::rc::Rc;

#[derive(Debug, Clone, PartialEq)]
pub struct Program {
    pub body: Vec<Stmt>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Stmt {
    pub line: usize,
    pub kind: StmtKind,
}

#[derive(Debug, Clone, PartialEq)]
pub enum StmtKind {
    Expr(Expr),
    Assign { target: Target, value: Expr },
    AugAssign { target: Target, op: BinOp, value: Expr },
    Return(Option<Expr>),
    If { branches: Vec<(Expr, Vec<Stmt>)>, orelse: Vec<Stmt> },
    /// `orelse` runs when the loop finishes without `break`.
    While { test: Expr, body: Vec<Stmt>, orelse: Vec<Stmt> },
    For { target: Target, iter: Expr, body: Vec<Stmt>, orelse: Vec<Stmt> },
    Break,
    Continue,
    Pass,
    FunctionDef(Rc<FunctionDef>),
    Import { module: String },
    Try { body: Vec<Stmt>, handlers: Vec<Handler>, orelse: Vec<Stmt> },
    Raise(Option<Expr>),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Target {
    Name(String),
    Tuple(Vec<Target>),
    Subscript { object: Expr, index: Expr },
}

impl Target {
    /// Names rebound by assigning to this target.
    pub fn names(&self, out: &mut Vec<String>) {
        match self {
            Self::Name(name) => {
                if !out.contains(name) {
                    out.push(name.clone());
                }
            }
            Self::Tuple(targets) => targets.iter().for_each(|t| t.names(out)),
            Self::Subscript { .. } => {}
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FunctionDef {
    pub name: String,
    pub params: Vec<Parameter>,
    pub body: Vec<Stmt>,
    /// Parameters plus every name the body binds; these are local to each call.
    pub locals: Vec<String>,
}

impl FunctionDef {
    pub fn new(name: String, params: Vec<Parameter>, body: Vec<Stmt>) -> Self {
        let mut locals: Vec<String> = params.iter().map(|p| p.name.clone()).collect();
        bound_names(&body, &mut locals);
        Self {
            name,
            params,
            body,
            locals,
        }
    }
}

/// Names bound by a block, not counting those bound inside nested functions.
fn bound_names(body: &[Stmt], out: &mut Vec<String>) {
    for stmt in body {
        match &stmt.kind {
            StmtKind::Assign { target, .. } | StmtKind::AugAssign { target, .. } => {
                target.names(out);
            }
            StmtKind::If { branches, orelse } => {
                branches.iter().for_each(|(_, b)| bound_names(b, out));
                bound_names(orelse, out);
            }
            StmtKind::While { body, orelse, .. } => {
                bound_names(body, out);
                bound_names(orelse, out);
            }
            StmtKind::For {
                target,
                body,
                orelse,
                ..
            } => {
                target.names(out);
                bound_names(body, out);
                bound_names(orelse, out);
            }
            StmtKind::Try {
                body,
                handlers,
                orelse,
            } => {
                bound_names(body, out);
                for handler in handlers {
                    if let Some(name) = &handler.name {
                        Target::Name(name.clone()).names(out);
                    }
                    bound_names(&handler.body, out);
                }
                bound_names(orelse, out);
            }
            StmtKind::FunctionDef(def) => Target::Name(def.name.clone()).names(out),
            _ => {}
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Parameter {
    pub name: String,
    pub default: Option<Expr>,
}

/// An `except` clause. An empty `kinds` list is a bare `except:`.
#[derive(Debug, Clone, PartialEq)]
pub struct Handler {
    pub kinds: Vec<String>,
    pub name: Option<String>,
    pub body: Vec<Stmt>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    FloorDiv,
    Mod,
    Pow,
}

impl BinOp {
    pub fn symbol(self) -> &'static str {
        match self {
            Self::Add => "+",
            Self::Sub => "-",
            Self::Mul => "*",
            Self::Div => "/",
            Self::FloorDiv => "//",
            Self::Mod => "%",
            Self::Pow => "**",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CmpOp {
    Eq,
    NotEq,
    Lt,
    LtE,
    Gt,
    GtE,
    In,
    NotIn,
    Is,
    IsNot,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Neg,
    Pos,
    Not,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BoolOp {
    And,
    Or,
}

#[derive(Debug, Clone, PartialEq)]
pub enum FPart {
    Literal(String),
    Field {
        expr: Expr,
        conversion: Option<char>,
        spec: String,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct Comprehension {
    pub element: Expr,
    pub target: Target,
    pub iter: Expr,
    pub conditions: Vec<Expr>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    None,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    FString(Vec<FPart>),
    Name(String),
    List(Vec<Expr>),
    Tuple(Vec<Expr>),
    Dict(Vec<(Expr, Expr)>),
    ListComp(Box<Comprehension>),
    /// `{key: comp.element for ...}`
    DictComp {
        key: Box<Expr>,
        comp: Box<Comprehension>,
    },
    Unary {
        op: UnaryOp,
        operand: Box<Expr>,
    },
    Binary {
        op: BinOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    BoolOp {
        op: BoolOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    Compare {
        left: Box<Expr>,
        ops: Vec<(CmpOp, Expr)>,
    },
    IfExp {
        test: Box<Expr>,
        body: Box<Expr>,
        orelse: Box<Expr>,
    },
    Call {
        func: Box<Expr>,
        args: Vec<Expr>,
        kwargs: Vec<(String, Expr)>,
    },
    Attribute {
        value: Box<Expr>,
        attr: String,
    },
    Subscript {
        value: Box<Expr>,
        index: Box<Expr>,
    },
    Slice {
        lower: Option<Box<Expr>>,
        upper: Option<Box<Expr>>,
        step: Option<Box<Expr>>,
    },
}
