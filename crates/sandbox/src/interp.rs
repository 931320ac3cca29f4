//! Tree-walking interpreter for toolscript.
//!
//! Name resolution is closed: locals, then enclosing function scopes, then
//! globals, then the host's declared tools, then builtins. Every tool call,
//! builtin call and import is checked against the [`Policy`] before it runs.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use policy::{CapabilityRequest, Decision, Policy};
use tracing::debug;

use crate::ast::{
    BinOp, BoolOp, CmpOp, Comprehension, Expr, FPart, FunctionDef, Program, Stmt, StmtKind,
    Target, UnaryOp,
};
use crate::builtins::{Builtin, dict_insert};
use crate::format::{convert, format_within, percent_format};
use crate::host::{ParamType, ToolCall, ToolHost};
use crate::limits::Limits;
use crate::methods::call_method;
use crate::value::{Dict, Function, Value};
use crate::{Error, ErrorKind, Result};

/// Value of `__name__`, as seen by code run through `exec`.
const MODULE_NAME: &str = "builtins";

/// Control flow out of a statement.
#[derive(Debug)]
enum Flow {
    Normal,
    Break,
    Continue,
    Return(Value),
}

type Scope = HashMap<String, Value>;

/// Variables of one function call.
pub(crate) struct Env {
    def: Rc<FunctionDef>,
    vars: RefCell<Scope>,
    /// Scope of the function the called one was defined in.
    parent: Option<Rc<Env>>,
}

impl Env {
    /// Resolve `name` in this call and then in the enclosing function scopes.
    fn lookup(&self, name: &str) -> Result<Option<Value>> {
        let mut scope = Some(self);
        while let Some(env) = scope {
            if let Some(value) = env.vars.borrow().get(name) {
                return Ok(Some(value.clone()));
            }
            if env.def.locals.iter().any(|local| local == name) {
                return Err(if std::ptr::eq(env, self) {
                    Error::runtime(
                        ErrorKind::UnboundLocalError,
                        format!(
                            "cannot access local variable '{name}' where it is not associated with a value"
                        ),
                    )
                } else {
                    Error::runtime(
                        ErrorKind::NameError,
                        format!(
                            "cannot access free variable '{name}' where it is not associated with a value in enclosing scope"
                        ),
                    )
                });
            }
            scope = env.parent.as_deref();
        }
        Ok(None)
    }
}

pub struct Interpreter<'h> {
    host: &'h dyn ToolHost,
    policy: &'h Policy,
    limits: Limits,
    globals: Scope,
    frames: Vec<Rc<Env>>,
    /// Call scopes captured by nested functions.
    captured: Vec<Rc<Env>>,
    /// Exceptions being handled, innermost last; used by bare `raise`.
    handling: Vec<(ErrorKind, String)>,
    steps: u64,
    output: Vec<String>,
}

impl<'h> Interpreter<'h> {
    pub fn new(host: &'h dyn ToolHost, policy: &'h Policy, limits: Limits) -> Self {
        let mut globals = Scope::new();
        globals.insert("__name__".to_string(), Value::from(MODULE_NAME));
        Self {
            host,
            policy,
            limits,
            globals,
            frames: Vec::new(),
            captured: Vec::new(),
            handling: Vec::new(),
            steps: 0,
            output: Vec::new(),
        }
    }

    /// Execute a program's top-level statements.
    pub fn run(&mut self, program: &Program) -> Result<()> {
        for stmt in &program.body {
            match self.exec_stmt(stmt)? {
                Flow::Normal => {}
                Flow::Return(_) => {
                    return Err(Error::syntax(stmt.line, 1, "'return' outside function"));
                }
                Flow::Break | Flow::Continue => {
                    return Err(Error::syntax(stmt.line, 1, "'break' or 'continue' outside loop"));
                }
            }
        }
        Ok(())
    }

    /// Look up a module-level name.
    pub fn global(&self, name: &str) -> Option<&Value> {
        self.globals.get(name)
    }

    /// Lines written by `print`.
    pub fn output(&self) -> &[String] {
        &self.output
    }

    pub fn steps(&self) -> u64 {
        self.steps
    }

    pub(crate) fn print(&mut self, line: String) {
        debug!(line = %line, "script print");
        self.output.push(line);
    }

    pub(crate) fn max_sequence_len(&self) -> usize {
        self.limits.max_sequence_len
    }

    pub(crate) fn check_len(&self, len: usize) -> Result<()> {
        if len > self.limits.max_sequence_len {
            return Err(Error::SequenceLimit(self.limits.max_sequence_len));
        }
        Ok(())
    }

    fn tick(&mut self) -> Result<()> {
        self.steps += 1;
        if self.steps > self.limits.max_steps {
            return Err(Error::StepLimit(self.limits.max_steps));
        }
        Ok(())
    }

    fn authorize(&self, request: CapabilityRequest) -> Result<()> {
        match self.policy.check(&request) {
            Decision::Allow => Ok(()),
            Decision::Deny { reason } => Err(Error::CapabilityDenied(reason)),
        }
    }

    // Scopes

    fn load(&self, name: &str) -> Result<Value> {
        if let Some(frame) = self.frames.last() {
            if let Some(v) = frame.lookup(name)? {
                return Ok(v);
            }
        }
        if let Some(v) = self.globals.get(name) {
            return Ok(v.clone());
        }
        if self.host.spec(name).is_some() {
            return Ok(Value::Tool(name.to_string()));
        }
        Builtin::from_name(name)
            .map(Value::Builtin)
            .ok_or_else(|| Error::name_error(name))
    }

    fn store(&mut self, name: &str, value: Value) {
        match self.frames.last() {
            Some(frame) => frame.vars.borrow_mut().insert(name.to_string(), value),
            None => self.globals.insert(name.to_string(), value),
        };
    }

    /// The binding of `name` in the innermost scope only.
    fn local(&self, name: &str) -> Option<Value> {
        match self.frames.last() {
            Some(frame) => frame.vars.borrow().get(name).cloned(),
            None => self.globals.get(name).cloned(),
        }
    }

    fn unbind(&mut self, name: &str) {
        match self.frames.last() {
            Some(frame) => frame.vars.borrow_mut().remove(name),
            None => self.globals.remove(name),
        };
    }

    fn assign(&mut self, target: &Target, value: Value) -> Result<()> {
        match target {
            Target::Name(name) => {
                self.store(name, value);
                Ok(())
            }
            Target::Tuple(targets) => {
                let items = value.iterate()?;
                if items.len() < targets.len() {
                    return Err(Error::value_error(format!(
                        "not enough values to unpack (expected {}, got {})",
                        targets.len(),
                        items.len()
                    )));
                }
                if items.len() > targets.len() {
                    return Err(Error::value_error(format!(
                        "too many values to unpack (expected {})",
                        targets.len()
                    )));
                }
                for (target, item) in targets.iter().zip(items) {
                    self.assign(target, item)?;
                }
                Ok(())
            }
            Target::Subscript { object, index } => {
                let object = self.eval(object)?;
                let index = self.eval(index)?;
                set_item(&object, index, value)
            }
        }
    }

    // Statements

    fn exec_block(&mut self, body: &[Stmt]) -> Result<Flow> {
        for stmt in body {
            match self.exec_stmt(stmt)? {
                Flow::Normal => {}
                flow => return Ok(flow),
            }
        }
        Ok(Flow::Normal)
    }

    fn exec_stmt(&mut self, stmt: &Stmt) -> Result<Flow> {
        self.tick()?;
        self.exec_kind(&stmt.kind).map_err(|e| e.at_line(stmt.line))
    }

    fn exec_kind(&mut self, kind: &StmtKind) -> Result<Flow> {
        match kind {
            StmtKind::Expr(expr) => {
                self.eval(expr)?;
            }
            StmtKind::Assign { target, value } => {
                let value = self.eval(value)?;
                self.assign(target, value)?;
            }
            StmtKind::AugAssign { target, op, value } => self.aug_assign(target, *op, value)?,
            StmtKind::Return(value) => {
                let value = match value {
                    Some(expr) => self.eval(expr)?,
                    None => Value::None,
                };
                return Ok(Flow::Return(value));
            }
            StmtKind::If { branches, orelse } => {
                for (test, body) in branches {
                    if self.eval(test)?.is_truthy() {
                        return self.exec_block(body);
                    }
                }
                return self.exec_block(orelse);
            }
            StmtKind::While { test, body, orelse } => {
                while self.eval(test)?.is_truthy() {
                    self.tick()?;
                    match self.exec_block(body)? {
                        Flow::Break => return Ok(Flow::Normal),
                        Flow::Normal | Flow::Continue => {}
                        flow @ Flow::Return(_) => return Ok(flow),
                    }
                }
                return self.exec_block(orelse);
            }
            StmtKind::For {
                target,
                iter,
                body,
                orelse,
            } => {
                let items = self.eval(iter)?.iterate()?;
                for item in items {
                    self.tick()?;
                    self.assign(target, item)?;
                    match self.exec_block(body)? {
                        Flow::Break => return Ok(Flow::Normal),
                        Flow::Normal | Flow::Continue => {}
                        flow @ Flow::Return(_) => return Ok(flow),
                    }
                }
                return self.exec_block(orelse);
            }
            StmtKind::Break => return Ok(Flow::Break),
            StmtKind::Continue => return Ok(Flow::Continue),
            StmtKind::Pass => {}
            StmtKind::FunctionDef(def) => {
                let env = self.frames.last().cloned();
                if let Some(env) = &env {
                    self.captured.push(Rc::clone(env));
                }
                let function = Function {
                    def: Rc::clone(def),
                    env,
                };
                self.store(&def.name, Value::Function(Rc::new(function)));
            }
            StmtKind::Import { module } => {
                self.authorize(CapabilityRequest::import(module.as_str()))?;
                debug!(module = %module, "import accepted");
            }
            StmtKind::Try {
                body,
                handlers,
                orelse,
            } => {
                let error = match self.exec_block(body) {
                    Ok(Flow::Normal) => return self.exec_block(orelse),
                    Ok(flow) => return Ok(flow),
                    Err(e) if e.is_catchable() => e,
                    Err(e) => return Err(e),
                };
                let Error::Runtime { kind, message, .. } = &error else {
                    return Err(error);
                };
                let Some(handler) = handlers.iter().find(|h| {
                    h.kinds.is_empty() || h.kinds.iter().any(|k| kind.caught_by(k))
                }) else {
                    return Err(error);
                };
                if let Some(name) = &handler.name {
                    self.store(name, Value::exception(*kind, message.clone()));
                }
                self.handling.push((*kind, message.clone()));
                let flow = self.exec_block(&handler.body);
                self.handling.pop();
                return flow;
            }
            StmtKind::Raise(value) => return Err(self.raise(value.as_ref())?),
        }
        Ok(Flow::Normal)
    }

    fn raise(&mut self, value: Option<&Expr>) -> Result<Error> {
        let Some(expr) = value else {
            return Ok(match self.handling.last() {
                Some((kind, message)) => Error::runtime(*kind, message.clone()),
                None => Error::runtime(ErrorKind::RuntimeError, "No active exception to reraise"),
            });
        };
        match self.eval(expr)? {
            Value::Exception(e) => Ok(Error::runtime(e.kind, e.message.clone())),
            Value::Builtin(Builtin::Exception(kind)) => Ok(Error::runtime(kind, "")),
            _ => Ok(Error::type_error("exceptions must derive from BaseException")),
        }
    }

    fn aug_assign(&mut self, target: &Target, op: BinOp, value: &Expr) -> Result<()> {
        match target {
            Target::Name(name) => {
                let current = self.load(name)?;
                let rhs = self.eval(value)?;
                let updated = self.in_place(op, current, rhs)?;
                self.store(name, updated);
                Ok(())
            }
            Target::Subscript { object, index } => {
                let object = self.eval(object)?;
                let index = self.eval(index)?;
                let current = get_item(&object, &index)?;
                let rhs = self.eval(value)?;
                let updated = self.in_place(op, current, rhs)?;
                set_item(&object, index, updated)
            }
            Target::Tuple(_) => Err(Error::syntax(
                0,
                0,
                "illegal expression for augmented assignment",
            )),
        }
    }

    /// `a += b` extends lists in place; everything else rebinds.
    fn in_place(&mut self, op: BinOp, current: Value, rhs: Value) -> Result<Value> {
        if let (BinOp::Add, Value::List(list)) = (op, &current) {
            let items = rhs.iterate()?;
            let new_len = list.borrow().len() + items.len();
            self.check_len(new_len)?;
            list.borrow_mut().extend(items);
            return Ok(current);
        }
        self.binary(op, &current, &rhs)
    }

    // Expressions

    pub(crate) fn eval(&mut self, expr: &Expr) -> Result<Value> {
        match expr {
            Expr::None => Ok(Value::None),
            Expr::Bool(b) => Ok(Value::Bool(*b)),
            Expr::Int(i) => Ok(Value::Int(*i)),
            Expr::Float(f) => Ok(Value::Float(*f)),
            Expr::Str(s) => Ok(Value::Str(s.clone())),
            Expr::FString(parts) => {
                let mut out = String::new();
                for part in parts {
                    match part {
                        FPart::Literal(text) => out.push_str(text),
                        FPart::Field {
                            expr,
                            conversion,
                            spec,
                        } => {
                            let value = self.eval(expr)?;
                            let conversion = conversion.map(String::from);
                            let value = convert(value, conversion.as_deref())?;
                            out.push_str(&format_within(&value, spec, self.limits.max_sequence_len)?);
                            self.check_len(out.len())?;
                        }
                    }
                }
                self.check_len(out.len())?;
                Ok(Value::Str(out))
            }
            Expr::Name(name) => self.load(name),
            Expr::List(items) => Ok(Value::list(self.eval_all(items)?)),
            Expr::Tuple(items) => Ok(Value::tuple(self.eval_all(items)?)),
            Expr::Dict(pairs) => {
                let mut entries: Dict = Vec::with_capacity(pairs.len());
                for (key, value) in pairs {
                    let key = self.eval(key)?;
                    let value = self.eval(value)?;
                    dict_insert(&mut entries, key, value)?;
                }
                Ok(Value::dict(entries))
            }
            Expr::ListComp(comp) => self.comprehension(comp, None),
            Expr::DictComp { key, comp } => self.comprehension(comp, Some(key)),
            Expr::Unary { op, operand } => {
                let value = self.eval(operand)?;
                unary(*op, &value)
            }
            Expr::Binary { op, left, right } => {
                let left = self.eval(left)?;
                let right = self.eval(right)?;
                self.binary(*op, &left, &right)
            }
            Expr::BoolOp { op, left, right } => {
                let left = self.eval(left)?;
                match (op, left.is_truthy()) {
                    (BoolOp::And, false) | (BoolOp::Or, true) => Ok(left),
                    _ => self.eval(right),
                }
            }
            Expr::Compare { left, ops } => {
                let mut left = self.eval(left)?;
                for (op, right) in ops {
                    let right = self.eval(right)?;
                    if !compare(*op, &left, &right)? {
                        return Ok(Value::Bool(false));
                    }
                    left = right;
                }
                Ok(Value::Bool(true))
            }
            Expr::IfExp { test, body, orelse } => {
                if self.eval(test)?.is_truthy() {
                    self.eval(body)
                } else {
                    self.eval(orelse)
                }
            }
            Expr::Call { func, args, kwargs } => {
                if let Expr::Attribute { value, attr } = func.as_ref() {
                    let receiver = self.eval(value)?;
                    let (args, kwargs) = self.eval_args(args, kwargs)?;
                    if let Value::Record(record) = &receiver {
                        let field = record.get(attr).cloned().ok_or_else(|| {
                            no_attribute(&receiver, attr)
                        })?;
                        return self.call_value(&field, args, kwargs);
                    }
                    return call_method(self, &receiver, attr, args, kwargs);
                }
                let callee = self.eval(func)?;
                let (args, kwargs) = self.eval_args(args, kwargs)?;
                self.call_value(&callee, args, kwargs)
            }
            Expr::Attribute { value, attr } => {
                let value = self.eval(value)?;
                attribute(&value, attr)
            }
            Expr::Subscript { value, index } => {
                let value = self.eval(value)?;
                if let Expr::Slice { lower, upper, step } = index.as_ref() {
                    let lower = self.eval_bound(lower.as_deref())?;
                    let upper = self.eval_bound(upper.as_deref())?;
                    let step = self.eval_bound(step.as_deref())?.unwrap_or(1);
                    return slice(&value, lower, upper, step);
                }
                let index = self.eval(index)?;
                get_item(&value, &index)
            }
            Expr::Slice { .. } => Err(Error::type_error("slice outside of a subscript")),
        }
    }

    fn eval_all(&mut self, exprs: &[Expr]) -> Result<Vec<Value>> {
        exprs.iter().map(|e| self.eval(e)).collect()
    }

    fn eval_args(
        &mut self,
        args: &[Expr],
        kwargs: &[(String, Expr)],
    ) -> Result<(Vec<Value>, Vec<(String, Value)>)> {
        let args = self.eval_all(args)?;
        let kwargs = kwargs
            .iter()
            .map(|(name, expr)| Ok((name.clone(), self.eval(expr)?)))
            .collect::<Result<Vec<_>>>()?;
        Ok((args, kwargs))
    }

    fn eval_bound(&mut self, bound: Option<&Expr>) -> Result<Option<i64>> {
        match bound {
            None => Ok(None),
            Some(expr) => match self.eval(expr)? {
                Value::None => Ok(None),
                v => v.as_int().map(Some).ok_or_else(|| {
                    Error::type_error("slice indices must be integers or None")
                }),
            },
        }
    }

    /// List or dict comprehension; the loop variable does not leak into the
    /// enclosing scope.
    fn comprehension(&mut self, comp: &Comprehension, key: Option<&Expr>) -> Result<Value> {
        let items = self.eval(&comp.iter)?.iterate()?;
        let mut names = Vec::new();
        comp.target.names(&mut names);
        let saved: Vec<(String, Option<Value>)> = names
            .into_iter()
            .map(|n| {
                let previous = self.local(&n);
                (n, previous)
            })
            .collect();

        let result = self.comprehension_items(comp, key, items);

        for (name, previous) in saved {
            match previous {
                Some(v) => self.store(&name, v),
                None => self.unbind(&name),
            }
        }
        result
    }

    fn comprehension_items(
        &mut self,
        comp: &Comprehension,
        key: Option<&Expr>,
        items: Vec<Value>,
    ) -> Result<Value> {
        let mut out = Vec::new();
        let mut entries: Dict = Vec::new();
        'items: for item in items {
            self.tick()?;
            self.assign(&comp.target, item)?;
            for condition in &comp.conditions {
                if !self.eval(condition)?.is_truthy() {
                    continue 'items;
                }
            }
            match key {
                Some(key) => {
                    let key = self.eval(key)?;
                    let value = self.eval(&comp.element)?;
                    dict_insert(&mut entries, key, value)?;
                }
                None => out.push(self.eval(&comp.element)?),
            }
        }
        if key.is_some() {
            self.check_len(entries.len())?;
            return Ok(Value::dict(entries));
        }
        self.check_len(out.len())?;
        Ok(Value::list(out))
    }

    // Calls

    pub(crate) fn call_value(
        &mut self,
        callee: &Value,
        args: Vec<Value>,
        kwargs: Vec<(String, Value)>,
    ) -> Result<Value> {
        match callee {
            Value::Function(function) => self.call_function(Rc::clone(function), args, kwargs),
            Value::Builtin(builtin) => {
                self.authorize(CapabilityRequest::builtin(builtin.name()))?;
                builtin.call(self, args, kwargs)
            }
            Value::Tool(name) => {
                self.authorize(CapabilityRequest::tool(name.as_str()))?;
                self.call_tool(name, args, kwargs)
            }
            other => Err(Error::type_error(format!(
                "'{}' object is not callable",
                other.type_name()
            ))),
        }
    }

    fn call_function(
        &mut self,
        function: Rc<Function>,
        args: Vec<Value>,
        kwargs: Vec<(String, Value)>,
    ) -> Result<Value> {
        self.tick()?;
        if self.frames.len() >= self.limits.max_call_depth {
            return Err(Error::DepthLimit(self.limits.max_call_depth));
        }
        let def = &function.def;
        let name = &def.name;
        if args.len() > def.params.len() {
            return Err(Error::type_error(format!(
                "{name}() takes {} positional argument{} but {} were given",
                def.params.len(),
                if def.params.len() == 1 { "" } else { "s" },
                args.len()
            )));
        }
        let mut slots: Vec<Option<Value>> = args.into_iter().map(Some).collect();
        slots.resize(def.params.len(), None);
        for (key, value) in kwargs {
            let Some(pos) = def.params.iter().position(|p| p.name == key) else {
                return Err(Error::type_error(format!(
                    "{name}() got an unexpected keyword argument '{key}'"
                )));
            };
            if slots[pos].is_some() {
                return Err(Error::type_error(format!(
                    "{name}() got multiple values for argument '{key}'"
                )));
            }
            slots[pos] = Some(value);
        }
        let mut frame = Scope::new();
        for (param, slot) in def.params.iter().zip(slots) {
            let value = match (slot, &param.default) {
                (Some(v), _) => v,
                (None, Some(default)) => self.eval(default)?,
                (None, None) => {
                    return Err(Error::type_error(format!(
                        "{name}() missing required argument: '{}'",
                        param.name
                    )));
                }
            };
            frame.insert(param.name.clone(), value);
        }

        self.frames.push(Rc::new(Env {
            def: Rc::clone(def),
            vars: RefCell::new(frame),
            parent: function.env.clone(),
        }));
        let flow = self.exec_block(&def.body);
        self.frames.pop();
        match flow? {
            Flow::Return(value) => Ok(value),
            _ => Ok(Value::None),
        }
    }

    fn call_tool(
        &mut self,
        name: &str,
        args: Vec<Value>,
        kwargs: Vec<(String, Value)>,
    ) -> Result<Value> {
        let spec = self
            .host
            .spec(name)
            .ok_or_else(|| Error::name_error(name))?;
        if args.len() > spec.params.len() {
            return Err(Error::type_error(format!(
                "{name}() takes {} positional argument{} but {} were given",
                spec.params.len(),
                if spec.params.len() == 1 { "" } else { "s" },
                args.len()
            )));
        }
        let mut slots: Vec<Option<Value>> = args.into_iter().map(Some).collect();
        slots.resize(spec.params.len(), None);
        for (key, value) in kwargs {
            let pos = spec
                .params
                .iter()
                .position(|p| p.name == key)
                .ok_or_else(|| {
                    Error::type_error(format!(
                        "{name}() got an unexpected keyword argument '{key}'"
                    ))
                })?;
            slots[pos] = Some(value);
        }

        let mut checked = Vec::with_capacity(slots.len());
        for (param, slot) in spec.params.iter().zip(slots) {
            let value = slot.ok_or_else(|| {
                Error::type_error(format!(
                    "{name}() missing required argument: '{}'",
                    param.name
                ))
            })?;
            let value = match (param.ty, value) {
                (ParamType::Str, v @ Value::Str(_)) => v,
                (ParamType::Float, Value::Int(i)) => Value::Float(i as f64),
                (ParamType::Float, v @ Value::Float(_)) => v,
                (ParamType::Int, v @ Value::Int(_)) => v,
                (ParamType::Any, v) => v,
                (ty, v) => {
                    return Err(Error::type_error(format!(
                        "{name}() argument '{}' must be {}, not {}",
                        param.name,
                        ty.name(),
                        v.type_name()
                    )));
                }
            };
            checked.push(value);
        }

        let call = ToolCall {
            name: name.to_string(),
            args: checked,
        };
        debug!(tool = %name, args = ?call.args, "tool call");
        self.host
            .execute(&call)
            .map_err(|e| Error::runtime(ErrorKind::RuntimeError, e.to_string()))
    }

    // Operators

    pub(crate) fn binary(&self, op: BinOp, left: &Value, right: &Value) -> Result<Value> {
        let unsupported = || {
            Error::type_error(format!(
                "unsupported operand type(s) for {}: '{}' and '{}'",
                op.symbol(),
                left.type_name(),
                right.type_name()
            ))
        };
        match (op, left, right) {
            (BinOp::Add, Value::Str(a), Value::Str(b)) => {
                self.check_len(a.len().saturating_add(b.len()))?;
                Ok(Value::Str(format!("{a}{b}")))
            }
            (BinOp::Add, Value::List(a), Value::List(b)) => {
                self.check_len(a.borrow().len().saturating_add(b.borrow().len()))?;
                let mut items = a.borrow().clone();
                items.extend(b.borrow().iter().cloned());
                Ok(Value::list(items))
            }
            (BinOp::Add, Value::Tuple(a), Value::Tuple(b)) => {
                self.check_len(a.len().saturating_add(b.len()))?;
                let mut items = a.as_ref().clone();
                items.extend(b.iter().cloned());
                Ok(Value::tuple(items))
            }
            (BinOp::Mul, seq, n) | (BinOp::Mul, n, seq)
                if matches!(seq, Value::Str(_) | Value::List(_) | Value::Tuple(_))
                    && matches!(n, Value::Int(_) | Value::Bool(_)) =>
            {
                let count = usize::try_from(n.as_int().unwrap_or(0)).unwrap_or(0);
                self.repeat(seq, count)
            }
            (BinOp::Mod, Value::Str(template), values) => {
                percent_format(template, values, self.limits.max_sequence_len).map(Value::Str)
            }
            (op, a, b) if a.is_number() && b.is_number() => match (a, b) {
                (Value::Float(_), _) | (_, Value::Float(_)) => {
                    let (Some(x), Some(y)) = (a.as_float(), b.as_float()) else {
                        return Err(unsupported());
                    };
                    float_op(op, x, y)
                }
                _ => {
                    let (Some(x), Some(y)) = (a.as_int(), b.as_int()) else {
                        return Err(unsupported());
                    };
                    int_op(op, x, y)
                }
            },
            _ => Err(unsupported()),
        }
    }

    fn repeat(&self, seq: &Value, count: usize) -> Result<Value> {
        let len = crate::builtins::length(seq)?;
        self.check_len(len.saturating_mul(count))?;
        Ok(match seq {
            Value::Str(s) => Value::Str(s.repeat(count)),
            Value::List(items) => Value::list(repeat_items(&items.borrow(), count)),
            Value::Tuple(items) => Value::tuple(repeat_items(items, count)),
            other => other.clone(),
        })
    }
}

impl Drop for Interpreter<'_> {
    fn drop(&mut self) {
        // A nested function stored in the scope it captured forms a reference
        // cycle; emptying captured scopes frees them.
        for env in self.captured.drain(..) {
            let vars = std::mem::take(&mut *env.vars.borrow_mut());
            drop(vars);
        }
    }
}

fn repeat_items(items: &[Value], count: usize) -> Vec<Value> {
    let mut out = Vec::with_capacity(items.len() * count);
    for _ in 0..count {
        out.extend(items.iter().cloned());
    }
    out
}

fn overflow() -> Error {
    Error::runtime(ErrorKind::OverflowError, "integer overflow")
}

fn zero_division(message: &str) -> Error {
    Error::runtime(ErrorKind::ZeroDivisionError, message)
}

fn int_op(op: BinOp, x: i64, y: i64) -> Result<Value> {
    let value = match op {
        BinOp::Add => x.checked_add(y).ok_or_else(overflow)?,
        BinOp::Sub => x.checked_sub(y).ok_or_else(overflow)?,
        BinOp::Mul => x.checked_mul(y).ok_or_else(overflow)?,
        BinOp::Div => {
            if y == 0 {
                return Err(zero_division("division by zero"));
            }
            return Ok(Value::Float(x as f64 / y as f64));
        }
        BinOp::FloorDiv => {
            if y == 0 {
                return Err(zero_division("integer division or modulo by zero"));
            }
            let q = x.checked_div(y).ok_or_else(overflow)?;
            if x % y != 0 && ((x < 0) != (y < 0)) { q - 1 } else { q }
        }
        BinOp::Mod => {
            if y == 0 {
                return Err(zero_division("integer division or modulo by zero"));
            }
            let r = x.checked_rem(y).ok_or_else(overflow)?;
            if r != 0 && ((r < 0) != (y < 0)) { r + y } else { r }
        }
        BinOp::Pow => {
            if y < 0 {
                if x == 0 {
                    return Err(zero_division(
                        "0.0 cannot be raised to a negative power",
                    ));
                }
                return Ok(Value::Float((x as f64).powf(y as f64)));
            }
            let exp = u32::try_from(y).map_err(|_| overflow())?;
            x.checked_pow(exp).ok_or_else(overflow)?
        }
    };
    Ok(Value::Int(value))
}

fn float_op(op: BinOp, x: f64, y: f64) -> Result<Value> {
    let value = match op {
        BinOp::Add => x + y,
        BinOp::Sub => x - y,
        BinOp::Mul => x * y,
        BinOp::Div => {
            if y == 0.0 {
                return Err(zero_division("float division by zero"));
            }
            x / y
        }
        BinOp::FloorDiv => {
            if y == 0.0 {
                return Err(zero_division("float floor division by zero"));
            }
            (x / y).floor()
        }
        BinOp::Mod => {
            if y == 0.0 {
                return Err(zero_division("float modulo"));
            }
            let r = x % y;
            if r != 0.0 && ((r < 0.0) != (y < 0.0)) { r + y } else { r }
        }
        BinOp::Pow => {
            if x == 0.0 && y < 0.0 {
                return Err(zero_division("0.0 cannot be raised to a negative power"));
            }
            x.powf(y)
        }
    };
    Ok(Value::Float(value))
}

fn unary(op: UnaryOp, value: &Value) -> Result<Value> {
    match (op, value) {
        (UnaryOp::Not, v) => Ok(Value::Bool(!v.is_truthy())),
        (UnaryOp::Neg, Value::Float(f)) => Ok(Value::Float(-f)),
        (UnaryOp::Pos, Value::Float(f)) => Ok(Value::Float(*f)),
        (UnaryOp::Neg, v) if v.as_int().is_some() => {
            let i = v.as_int().unwrap_or_default();
            i.checked_neg().map(Value::Int).ok_or_else(overflow)
        }
        (UnaryOp::Pos, v) if v.as_int().is_some() => Ok(Value::Int(v.as_int().unwrap_or_default())),
        (op, v) => Err(Error::type_error(format!(
            "bad operand type for unary {}: '{}'",
            if op == UnaryOp::Neg { "-" } else { "+" },
            v.type_name()
        ))),
    }
}

fn compare(op: CmpOp, left: &Value, right: &Value) -> Result<bool> {
    let ordered = |symbol: &str| {
        left.try_cmp(right)?.ok_or_else(|| {
            Error::type_error(format!(
                "'{symbol}' not supported between instances of '{}' and '{}'",
                left.type_name(),
                right.type_name()
            ))
        })
    };
    Ok(match op {
        CmpOp::Eq => left.try_eq(right)?,
        CmpOp::NotEq => !left.try_eq(right)?,
        CmpOp::Lt => ordered("<")?.is_lt(),
        CmpOp::LtE => ordered("<=")?.is_le(),
        CmpOp::Gt => ordered(">")?.is_gt(),
        CmpOp::GtE => ordered(">=")?.is_ge(),
        CmpOp::In => contains(right, left)?,
        CmpOp::NotIn => !contains(right, left)?,
        CmpOp::Is => left.py_is(right),
        CmpOp::IsNot => !left.py_is(right),
    })
}

fn contains(container: &Value, item: &Value) -> Result<bool> {
    match container {
        Value::Str(haystack) => match item {
            Value::Str(needle) => Ok(haystack.contains(needle.as_str())),
            other => Err(Error::type_error(format!(
                "'in <string>' requires string as left operand, not {}",
                other.type_name()
            ))),
        },
        Value::List(items) => any_equal(&items.borrow(), item),
        Value::Tuple(items) => any_equal(items, item),
        Value::Dict(entries) => {
            item.check_hashable()?;
            Ok(entries.borrow().iter().any(|(k, _)| k.py_eq(item)))
        }
        other => Err(Error::type_error(format!(
            "argument of type '{}' is not iterable",
            other.type_name()
        ))),
    }
}

fn any_equal(items: &[Value], item: &Value) -> Result<bool> {
    for candidate in items {
        if candidate.try_eq(item)? {
            return Ok(true);
        }
    }
    Ok(false)
}

fn no_attribute(value: &Value, attr: &str) -> Error {
    Error::runtime(
        ErrorKind::AttributeError,
        format!("'{}' object has no attribute '{attr}'", value.type_name()),
    )
}

fn attribute(value: &Value, attr: &str) -> Result<Value> {
    match value {
        Value::Record(record) => record
            .get(attr)
            .cloned()
            .ok_or_else(|| no_attribute(value, attr)),
        Value::Exception(e) if attr == "args" => {
            Ok(Value::tuple(vec![Value::Str(e.message.clone())]))
        }
        Value::Builtin(b) if attr == "__name__" => Ok(Value::from(b.name())),
        Value::Function(f) if attr == "__name__" => Ok(Value::from(f.name())),
        Value::Type(name) if attr == "__name__" => Ok(Value::from(name.as_str())),
        other => Err(no_attribute(other, attr)),
    }
}

/// Resolve a possibly negative index against `len`.
fn normalize_index(index: &Value, len: usize, what: &str) -> Result<usize> {
    let i = index.as_int().ok_or_else(|| {
        Error::type_error(format!(
            "{what} indices must be integers or slices, not {}",
            index.type_name()
        ))
    })?;
    let len = len as i64;
    let resolved = if i < 0 { i + len } else { i };
    if !(0..len).contains(&resolved) {
        return Err(Error::runtime(
            ErrorKind::IndexError,
            format!("{what} index out of range"),
        ));
    }
    Ok(resolved as usize)
}

fn get_item(container: &Value, index: &Value) -> Result<Value> {
    match container {
        Value::List(items) => {
            let items = items.borrow();
            let i = normalize_index(index, items.len(), "list")?;
            Ok(items[i].clone())
        }
        Value::Tuple(items) => {
            let i = normalize_index(index, items.len(), "tuple")?;
            Ok(items[i].clone())
        }
        Value::Str(s) => {
            let len = s.chars().count();
            let i = normalize_index(index, len, "string")?;
            Ok(s.chars().nth(i).map(|c| Value::Str(c.to_string())).unwrap_or(Value::None))
        }
        Value::Dict(entries) => {
            index.check_hashable()?;
            entries
                .borrow()
                .iter()
                .find(|(k, _)| k.py_eq(index))
                .map(|(_, v)| v.clone())
                .ok_or_else(|| Error::runtime(ErrorKind::KeyError, index.repr()))
        }
        other => Err(Error::type_error(format!(
            "'{}' object is not subscriptable",
            other.type_name()
        ))),
    }
}

fn set_item(container: &Value, index: Value, value: Value) -> Result<()> {
    match container {
        Value::List(items) => {
            let mut items = items.borrow_mut();
            let i = normalize_index(&index, items.len(), "list assignment")?;
            items[i] = value;
            Ok(())
        }
        Value::Dict(entries) => dict_insert(&mut entries.borrow_mut(), index, value),
        other => Err(Error::type_error(format!(
            "'{}' object does not support item assignment",
            other.type_name()
        ))),
    }
}

/// Positions selected by `[lower:upper:step]` on a sequence of `len` items.
fn slice_indices(len: usize, lower: Option<i64>, upper: Option<i64>, step: i64) -> Vec<usize> {
    let len = len as i64;
    let adjust = |bound: i64| {
        if bound < 0 {
            (bound + len).max(if step < 0 { -1 } else { 0 })
        } else if bound >= len {
            if step < 0 { len - 1 } else { len }
        } else {
            bound
        }
    };
    let (first, last) = if step < 0 { (len - 1, -1) } else { (0, len) };
    let mut i = lower.map_or(first, adjust);
    let stop = upper.map_or(last, adjust);
    let mut out = Vec::new();
    while (step > 0 && i < stop) || (step < 0 && i > stop) {
        out.push(i as usize);
        match i.checked_add(step) {
            Some(next) => i = next,
            None => break,
        }
    }
    out
}

fn slice(value: &Value, lower: Option<i64>, upper: Option<i64>, step: i64) -> Result<Value> {
    if step == 0 {
        return Err(Error::value_error("slice step cannot be zero"));
    }
    match value {
        Value::Str(s) => {
            let chars: Vec<char> = s.chars().collect();
            let picked = slice_indices(chars.len(), lower, upper, step);
            Ok(Value::Str(picked.into_iter().map(|i| chars[i]).collect()))
        }
        Value::List(items) => {
            let items = items.borrow();
            let picked = slice_indices(items.len(), lower, upper, step);
            Ok(Value::list(picked.into_iter().map(|i| items[i].clone()).collect()))
        }
        Value::Tuple(items) => {
            let picked = slice_indices(items.len(), lower, upper, step);
            Ok(Value::tuple(picked.into_iter().map(|i| items[i].clone()).collect()))
        }
        other => Err(Error::type_error(format!(
            "'{}' object is not subscriptable",
            other.type_name()
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::{EmptyToolHost, ToolError, ToolSpec};
    use crate::parser::parse;
    use crate::value::Record;

    struct Recorder {
        specs: Vec<ToolSpec>,
        calls: std::cell::RefCell<Vec<ToolCall>>,
    }

    impl Recorder {
        fn new() -> Self {
            Self {
                specs: vec![
                    ToolSpec::new("locate", "tuple[str, str]"),
                    ToolSpec::new("forecast", "Weather")
                        .param("latitude", ParamType::Float)
                        .param("longitude", ParamType::Float),
                    ToolSpec::new("broken", "str"),
                ],
                calls: Default::default(),
            }
        }
    }

    impl ToolHost for Recorder {
        fn specs(&self) -> &[ToolSpec] {
            &self.specs
        }

        fn execute(&self, call: &ToolCall) -> std::result::Result<Value, ToolError> {
            self.calls.borrow_mut().push(call.clone());
            match call.name.as_str() {
                "locate" => Ok(Value::tuple(vec!["King County".into(), "Washington".into()])),
                "forecast" => Ok(Record::new("Weather")
                    .field("temperature_fahrenheit", 68.0)
                    .field("precipitation_chance_percent", 35.5)
                    .into()),
                _ => Err(ToolError::Execution("sensor offline".into())),
            }
        }
    }

    fn run_with(host: &dyn ToolHost, policy: &Policy, src: &str) -> Result<Value> {
        let program = parse(src)?;
        let mut interp = Interpreter::new(host, policy, Limits::default());
        interp.run(&program)?;
        Ok(interp.global("result").cloned().unwrap_or(Value::None))
    }

    fn run(src: &str) -> Result<Value> {
        run_with(&EmptyToolHost, &Policy::standard(), src)
    }

    fn result_of(src: &str) -> String {
        run(src).unwrap().to_string()
    }

    #[test]
    fn arithmetic_follows_python() {
        assert_eq!(result_of("result = 7 // -2"), "-4");
        assert_eq!(result_of("result = -7 % 3"), "2");
        assert_eq!(result_of("result = 7 / 2"), "3.5");
        assert_eq!(result_of("result = 2 ** 10"), "1024");
        assert_eq!(result_of("result = 2 ** -1"), "0.5");
        assert_eq!(result_of("result = (20 * 9 / 5) + 32"), "68.0");
        assert_eq!(result_of("result = 'ab' * 3"), "ababab");
    }

    #[test]
    fn integer_overflow_is_an_error() {
        let err = run("result = 9223372036854775807 + 1").unwrap_err();
        assert_eq!(err.to_string(), "OverflowError: integer overflow");
        assert_eq!(err.line(), Some(1));
    }

    #[test]
    fn division_by_zero() {
        let err = run("x = 1\nresult = x / 0").unwrap_err();
        assert_eq!(err.to_string(), "ZeroDivisionError: division by zero");
        assert_eq!(err.line(), Some(2));
    }

    #[test]
    fn functions_and_defaults() {
        let src = "\
def greet(name, greeting='Hello'):
    return f'{greeting}, {name}!'

result = greet('Ada') + ' ' + greet(greeting='Hi', name='Bob')
";
        assert_eq!(result_of(src), "Hello, Ada! Hi, Bob!");
    }

    #[test]
    fn argument_errors() {
        let err = run("def f(a):\n    return a\nresult = f(1, 2)").unwrap_err();
        assert!(err.to_string().contains("takes 1 positional argument but 2 were given"));
        let err = run("def f(a):\n    return a\nresult = f()").unwrap_err();
        assert!(err.to_string().contains("missing required argument: 'a'"));
    }

    #[test]
    fn loops_and_control_flow() {
        let src = "\
total = 0
for i in range(10):
    if i % 2 == 0:
        continue
    if i > 7:
        break
    total += i
n = 0
while n < 3:
    n += 1
result = (total, n)
";
        assert_eq!(result_of(src), "(16, 3)");
    }

    #[test]
    fn comprehensions_do_not_leak() {
        let src = "\
x = 'kept'
squares = [x * x for x in range(5) if x % 2 == 0]
result = (squares, x)
";
        assert_eq!(result_of(src), "([0, 4, 16], 'kept')");
    }

    #[test]
    fn collections() {
        let src = "\
items = [3, 1, 2]
items.append(5)
items += [4]
d = {'a': 1}
d['b'] = 2
pairs = [f'{k}={v}' for k, v in d.items()]
result = (sorted(items), items[-1], items[1:3], ', '.join(pairs), d.get('z', 0), 'a' in d)
";
        assert_eq!(
            result_of(src),
            "([1, 2, 3, 4, 5], 4, [1, 2], 'a=1, b=2', 0, True)"
        );
    }

    #[test]
    fn lists_are_shared() {
        let src = "\
def add(items):
    items.append(1)

data = []
add(data)
add(data)
result = len(data)
";
        assert_eq!(result_of(src), "2");
    }

    #[test]
    fn try_except_catches_runtime_errors() {
        let src = "\
try:
    value = {}['missing']
except KeyError as e:
    result = 'caught ' + str(e)
";
        assert_eq!(result_of(src), "caught 'missing'");

        let src = "\
try:
    x = int('12')
except ValueError:
    x = -1
else:
    x = x * 2
result = x
";
        assert_eq!(result_of(src), "24");
    }

    #[test]
    fn raise_and_reraise() {
        let err = run("raise ValueError('too cold')").unwrap_err();
        assert_eq!(err.to_string(), "ValueError: too cold");
        let src = "\
try:
    try:
        raise KeyError('k')
    except KeyError:
        raise
except LookupError:
    result = 'outer'
";
        assert_eq!(result_of(src), "outer");
    }

    #[test]
    fn unknown_names() {
        let err = run("result = open('/etc/passwd')").unwrap_err();
        assert_eq!(err.to_string(), "NameError: name 'open' is not defined");
        let err = run("result = __import__('os')").unwrap_err();
        assert!(matches!(err, Error::Runtime { kind: ErrorKind::NameError, .. }));
    }

    #[test]
    fn step_limit_is_not_catchable() {
        let program = parse("try:\n    while True:\n        pass\nexcept Exception:\n    pass\n").unwrap();
        let policy = Policy::standard();
        let limits = Limits {
            max_steps: 500,
            ..Limits::default()
        };
        let mut interp = Interpreter::new(&EmptyToolHost, &policy, limits);
        assert_eq!(interp.run(&program).unwrap_err(), Error::StepLimit(500));
    }

    #[test]
    fn recursion_depth_is_bounded() {
        let err = run("def f(n):\n    return f(n + 1)\nresult = f(0)").unwrap_err();
        assert_eq!(err, Error::DepthLimit(32));
    }

    #[test]
    fn sequence_limit() {
        let err = run("result = 'x' * 2000000").unwrap_err();
        assert_eq!(err, Error::SequenceLimit(1_000_000));
        let err = run("result = range(5000000)").unwrap_err();
        assert_eq!(err, Error::SequenceLimit(1_000_000));
    }

    #[test]
    fn tools_are_type_checked_and_called() {
        let host = Recorder::new();
        let src = "\
county, state = locate()
w = forecast(47, longitude=-122.5)
result = f'{county}, {state}: {w.temperature_fahrenheit:.1f}F, {w.precipitation_chance_percent}%'
";
        let value = run_with(&host, &Policy::standard(), src).unwrap();
        assert_eq!(value.to_string(), "King County, Washington: 68.0F, 35.5%");
        let calls = host.calls.borrow();
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[1].args, vec![Value::Float(47.0), Value::Float(-122.5)]);
    }

    #[test]
    fn tool_argument_errors() {
        let host = Recorder::new();
        let err = run_with(&host, &Policy::standard(), "result = forecast('a', 'b')").unwrap_err();
        assert_eq!(
            err.to_string(),
            "TypeError: forecast() argument 'latitude' must be float, not str"
        );
        let err = run_with(&host, &Policy::standard(), "result = forecast(1.0)").unwrap_err();
        assert!(err.to_string().contains("missing required argument: 'longitude'"));
        assert!(host.calls.borrow().is_empty());
    }

    #[test]
    fn tool_failures_are_catchable() {
        let host = Recorder::new();
        let src = "\
try:
    result = broken()
except RuntimeError as e:
    result = 'fallback: ' + str(e)
";
        let value = run_with(&host, &Policy::standard(), src).unwrap();
        assert_eq!(value.to_string(), "fallback: execution failed: sensor offline");
    }

    #[test]
    fn policy_denials_are_not_catchable() {
        let host = Recorder::new();
        let src = "\
try:
    result = locate()
except Exception:
    result = 'swallowed'
";
        let err = run_with(&host, &Policy::restrictive(), src).unwrap_err();
        assert!(matches!(err, Error::CapabilityDenied(_)));

        let policy = Policy::parse("[deny]\nbuiltins = [\"print\"]\n").unwrap();
        let err = run_with(&host, &policy, "print('hi')").unwrap_err();
        assert!(matches!(err, Error::CapabilityDenied(_)));
    }

    #[test]
    fn imports_are_gated() {
        assert!(run("from typing import List, Tuple\nresult = 1").is_ok());
        let err = run("import os").unwrap_err();
        assert!(matches!(err, Error::CapabilityDenied(_)));
    }

    #[test]
    fn print_is_captured() {
        let program = parse("print('a', 1, sep='-')\nprint()").unwrap();
        let policy = Policy::standard();
        let mut interp = Interpreter::new(&EmptyToolHost, &policy, Limits::default());
        interp.run(&program).unwrap();
        assert_eq!(interp.output(), ["a-1".to_string(), String::new()]);
    }

    #[test]
    fn string_methods() {
        let src = "\
s = '  Rainy Day  '
result = [s.strip().lower(), s.split(), 'a,b,,c'.split(','), 'seattle wa'.title(),
          'x'.upper(), 'hello'.replace('l', 'L'), 'weather'.startswith(('we', 'x')),
          '42'.isdigit(), 'banana'.count('a'), 'banana'.find('n'), '{} and {}'.format(1, 2),
          '%.1f F' % 71.26]
";
        assert_eq!(
            result_of(src),
            "['rainy day', ['Rainy', 'Day'], ['a', 'b', '', 'c'], 'Seattle Wa', 'X', \
             'heLLo', True, True, 3, 2, '1 and 2', '71.3 F']"
        );
    }

    #[test]
    fn builtins_behave() {
        let src = "\
result = [len('abc'), abs(-3), min(3, 1, 2), max([1, 5, 2]), sum([1, 2, 3]), round(2.675, 2),
          list(enumerate(['a'])), list(zip([1, 2], ['x', 'y'])), any([0, 1]), all([]),
          isinstance(1.5, (int, float)), float('2.5'), str(None), bool(''), int(3.99),
          max(['bb', 'a'], key=len), sorted([3, 1, 2], reverse=True)]
";
        assert_eq!(
            result_of(src),
            "[3, 3, 1, 5, 6, 2.67, [(0, 'a')], [(1, 'x'), (2, 'y')], True, True, True, 2.5, \
             'None', False, 3, 'bb', [3, 2, 1]]"
        );
    }

    #[test]
    fn chained_comparisons_and_boolean_operands() {
        assert_eq!(result_of("result = 1 < 2 <= 2 < 3"), "True");
        assert_eq!(result_of("result = 1 < 3 > 4"), "False");
        assert_eq!(result_of("result = None or 'default'"), "default");
        assert_eq!(result_of("result = 0 and 1 / 0"), "0");
        assert_eq!(result_of("result = 'rain' in 'light rain'"), "True");
        assert_eq!(result_of("result = 'x' if 1 > 2 else 'y'"), "y");
    }

    #[test]
    fn comparing_incompatible_types_fails() {
        let err = run("result = 'a' < 1").unwrap_err();
        assert_eq!(
            err.to_string(),
            "TypeError: '<' not supported between instances of 'str' and 'int'"
        );
    }

    #[test]
    fn unpacking_mismatch() {
        let err = run("a, b = [1, 2, 3]").unwrap_err();
        assert_eq!(err.to_string(), "ValueError: too many values to unpack (expected 2)");
    }

    #[test]
    fn records_are_read_only() {
        let host = Recorder::new();
        let err = run_with(&host, &Policy::standard(), "w = forecast(1, 2)\nw.x = 1");
        assert!(err.is_err());
        let err = run_with(&host, &Policy::standard(), "w = forecast(1, 2)\nresult = w.humidity")
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "AttributeError: 'Weather' object has no attribute 'humidity'"
        );
    }

    #[test]
    fn nested_functions_see_enclosing_scope() {
        let src = "\
def answer(question):
    county = 'King County'

    def describe(temp):
        return f'{label()} is {temp}F'

    def label():
        return county + ', WA'

    return describe(61)

def counter(start):
    def next_value(step):
        return start + step
    return next_value

bump = counter(10)
result = (answer('q'), bump(5), counter(1)(1))
";
        assert_eq!(result_of(src), "('King County, WA is 61F', 15, 2)");
    }

    #[test]
    fn module_name_is_not_main() {
        let src = "\
result = 'library'
if __name__ == '__main__':
    result = 'script'
";
        assert_eq!(result_of(src), "library");
        assert_eq!(result_of("result = __name__"), "builtins");
    }

    #[test]
    fn assigning_in_a_function_makes_the_name_local() {
        let src = "\
n = 0
def bump():
    n += 1
    return n
result = bump()
";
        let err = run(src).unwrap_err();
        assert_eq!(
            err.to_string(),
            "UnboundLocalError: cannot access local variable 'n' where it is not associated with a value"
        );
        assert_eq!(err.line(), Some(3));

        let src = "\
n = 0
def bump():
    try:
        n += 1
    except NameError:
        return 'unbound'
result = (bump(), n)
";
        assert_eq!(result_of(src), "('unbound', 0)");

        let src = "\
n = 5
def read():
    return n
result = read()
";
        assert_eq!(result_of(src), "5");
    }

    #[test]
    fn loop_else_runs_without_break() {
        let src = "\
found = []
for target in [3, 7]:
    for i in range(5):
        if i == target:
            found.append('hit')
            break
    else:
        found.append('miss')
n = 0
while n < 2:
    n += 1
else:
    found.append('done')
while True:
    break
else:
    found.append('never')
result = found
";
        assert_eq!(result_of(src), "['hit', 'miss', 'done']");
    }

    #[test]
    fn slices_with_steps() {
        assert_eq!(result_of("result = [1, 2, 3][::-1]"), "[3, 2, 1]");
        assert_eq!(result_of("result = 'abcdef'[::2]"), "ace");
        assert_eq!(result_of("result = 'abcdef'[::-1]"), "fedcba");
        assert_eq!(result_of("result = list(range(10))[5:1:-2]"), "[5, 3]");
        assert_eq!(result_of("result = (1, 2, 3, 4)[-1:0:-1]"), "(4, 3, 2)");
        assert_eq!(result_of("result = [1, 2, 3][10:0:-1]"), "[3, 2]");
        let err = run("result = 'abc'[::0]").unwrap_err();
        assert_eq!(err.to_string(), "ValueError: slice step cannot be zero");
    }

    #[test]
    fn dict_comprehensions() {
        let src = "\
k = 'kept'
temps = {k: len(k) for k in ['rain', 'sun'] if k != 'x'}
result = (temps, k)
";
        assert_eq!(result_of(src), "({'rain': 4, 'sun': 3}, 'kept')");
    }

    #[test]
    fn repr_and_type() {
        let src = "\
def f():
    pass
result = [repr('a'), repr([1, 'b']), type(1) == int, type('x') is str, type(None).__name__,
          str(type(1.0)), type(f).__name__, isinstance(2, type(3)), f.__name__]
";
        assert_eq!(
            result_of(src),
            "[\"'a'\", \"[1, 'b']\", True, True, 'NoneType', \"<class 'float'>\", 'function', \
             True, 'f']"
        );
    }

    #[test]
    fn cyclic_lists() {
        let src = "\
a = [1]
a.append(a)
result = [str(a), a is a[1]]
";
        assert_eq!(result_of(src), "['[1, [...]]', True]");

        let src = "\
a = []
a.append(a)
b = []
b.append(b)
try:
    same = a == b
except RuntimeError as e:
    same = str(e)
result = same
";
        assert_eq!(result_of(src), "maximum recursion depth exceeded in comparison");
    }

    #[test]
    fn formatting_respects_the_sequence_limit() {
        let policy = Policy::standard();
        let limits = Limits {
            max_sequence_len: 1000,
            ..Limits::default()
        };
        for src in [
            "result = f'{1:>60000}'",
            "result = '%60000d' % 1",
            "result = '{:>60000}'.format(1)",
            "result = 'abc'.replace('', 'y' * 500)",
            "result = 'aaaa'.replace('a', 'y' * 300)",
            "result = ('x' * 600).join(['a', 'b', 'c'])",
            "result = [0] * 600 + [1] * 600",
        ] {
            let program = parse(src).unwrap();
            let mut interp = Interpreter::new(&EmptyToolHost, &policy, limits);
            assert_eq!(interp.run(&program).unwrap_err(), Error::SequenceLimit(1000), "{src}");
        }
        assert_eq!(result_of("result = 'aaaa'.replace('a', 'bb', 2)"), "bbbbaa");
        assert_eq!(result_of("result = 'ab'.replace('', '-')"), "-a-b-");
    }

    #[test]
    fn oversized_format_precision_is_a_value_error() {
        let err = run("result = f'{1.5:.70000f}'").unwrap_err();
        assert_eq!(err.to_string(), "ValueError: Too many decimal digits in format string");
        let err = run("result = '%.70000f' % 1.5").unwrap_err();
        assert!(matches!(err, Error::Runtime { kind: ErrorKind::ValueError, .. }));
    }

    #[test]
    fn return_outside_function() {
        let err = run("return 1").unwrap_err();
        assert!(matches!(err, Error::Syntax { .. }));
    }
}
