//! Runtime values of toolscript programs.

use std::cell::RefCell;
use std::cmp::Ordering;
use std::fmt;
use std::rc::Rc;

use crate::ast::FunctionDef;
use crate::builtins::Builtin;
use crate::interp::Env;
use crate::{Error, ErrorKind, Result};

/// Insertion-ordered dictionary storage.
pub type Dict = Vec<(Value, Value)>;

/// Deepest container nesting that `repr` prints and `==` or `<` compares.
const MAX_DEPTH: usize = 100;

thread_local! {
    /// Containers whose repr is being written on this thread, outermost first.
    static PRINTING: RefCell<Vec<usize>> = const { RefCell::new(Vec::new()) };
}

#[derive(Debug, Clone)]
pub enum Value {
    None,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    List(Rc<RefCell<Vec<Value>>>),
    Tuple(Rc<Vec<Value>>),
    Dict(Rc<RefCell<Dict>>),
    /// A named record produced by a tool, such as `Weather`.
    Record(Rc<Record>),
    Function(Rc<Function>),
    Builtin(Builtin),
    Tool(String),
    Exception(Rc<Exception>),
    /// Result of `type()` for values without a builtin constructor, such as `None`.
    Type(String),
}

/// A `def` together with the function scope it was defined in.
pub struct Function {
    pub(crate) def: Rc<FunctionDef>,
    /// `None` for module-level functions.
    pub(crate) env: Option<Rc<Env>>,
}

impl Function {
    pub fn name(&self) -> &str {
        &self.def.name
    }
}

impl fmt::Debug for Function {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Function")
            .field("name", &self.def.name)
            .field("nested", &self.env.is_some())
            .finish()
    }
}

/// Named fields with read-only attribute access.
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    pub type_name: String,
    pub fields: Vec<(String, Value)>,
}

impl Record {
    pub fn new(type_name: impl Into<String>) -> Self {
        Self {
            type_name: type_name.into(),
            fields: Vec::new(),
        }
    }

    pub fn field(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.fields.push((name.into(), value.into()));
        self
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.fields.iter().find(|(n, _)| n == name).map(|(_, v)| v)
    }
}

/// An exception object, as created by `ValueError("...")` or bound by `except ... as e`.
#[derive(Debug, Clone, PartialEq)]
pub struct Exception {
    pub kind: ErrorKind,
    pub message: String,
}

impl Value {
    pub fn list(items: Vec<Value>) -> Self {
        Self::List(Rc::new(RefCell::new(items)))
    }

    pub fn tuple(items: Vec<Value>) -> Self {
        Self::Tuple(Rc::new(items))
    }

    pub fn dict(entries: Dict) -> Self {
        Self::Dict(Rc::new(RefCell::new(entries)))
    }

    pub fn record(record: Record) -> Self {
        Self::Record(Rc::new(record))
    }

    pub fn exception(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self::Exception(Rc::new(Exception {
            kind,
            message: message.into(),
        }))
    }

    pub fn type_name(&self) -> &str {
        match self {
            Self::None => "NoneType",
            Self::Bool(_) => "bool",
            Self::Int(_) => "int",
            Self::Float(_) => "float",
            Self::Str(_) => "str",
            Self::List(_) => "list",
            Self::Tuple(_) => "tuple",
            Self::Dict(_) => "dict",
            Self::Record(r) => &r.type_name,
            Self::Function(_) | Self::Tool(_) => "function",
            Self::Builtin(_) => "builtin_function_or_method",
            Self::Exception(e) => e.kind.name(),
            Self::Type(_) => "type",
        }
    }

    pub fn is_truthy(&self) -> bool {
        match self {
            Self::None => false,
            Self::Bool(b) => *b,
            Self::Int(i) => *i != 0,
            Self::Float(f) => *f != 0.0,
            Self::Str(s) => !s.is_empty(),
            Self::List(l) => !l.borrow().is_empty(),
            Self::Tuple(t) => !t.is_empty(),
            Self::Dict(d) => !d.borrow().is_empty(),
            _ => true,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Str(s) => Some(s),
            _ => None,
        }
    }

    /// Integer view; bools count as ints.
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Self::Bool(b) => Some(i64::from(*b)),
            Self::Int(i) => Some(*i),
            _ => None,
        }
    }

    /// Numeric view of ints, bools and floats.
    pub fn as_float(&self) -> Option<f64> {
        match self {
            Self::Float(f) => Some(*f),
            other => other.as_int().map(|i| i as f64),
        }
    }

    pub fn is_number(&self) -> bool {
        matches!(self, Self::Bool(_) | Self::Int(_) | Self::Float(_))
    }

    /// Elements produced by iterating this value.
    pub fn iterate(&self) -> Result<Vec<Value>> {
        match self {
            Self::List(l) => Ok(l.borrow().clone()),
            Self::Tuple(t) => Ok(t.as_ref().clone()),
            Self::Str(s) => Ok(s.chars().map(|c| Self::Str(c.to_string())).collect()),
            Self::Dict(d) => Ok(d.borrow().iter().map(|(k, _)| k.clone()).collect()),
            other => Err(Error::type_error(format!(
                "'{}' object is not iterable",
                other.type_name()
            ))),
        }
    }

    /// Reject values that cannot be dictionary keys.
    pub fn check_hashable(&self) -> Result<()> {
        match self {
            Self::List(_) | Self::Dict(_) => Err(Error::type_error(format!(
                "unhashable type: '{}'",
                self.type_name()
            ))),
            Self::Tuple(items) => items.iter().try_for_each(Value::check_hashable),
            _ => Ok(()),
        }
    }

    /// Python `==`; structures nested too deeply to compare are unequal.
    pub fn py_eq(&self, other: &Value) -> bool {
        self.try_eq(other).unwrap_or(false)
    }

    /// Python `==`, failing with `RuntimeError` on runaway nesting such as
    /// two self-containing lists.
    pub fn try_eq(&self, other: &Value) -> Result<bool> {
        self.eq_at(other, 0)
    }

    fn eq_at(&self, other: &Value, depth: usize) -> Result<bool> {
        Ok(match (self, other) {
            (Self::None, Self::None) => true,
            (Self::Str(a), Self::Str(b)) => a == b,
            (a, b) if a.is_number() && b.is_number() => match (a.as_int(), b.as_int()) {
                (Some(x), Some(y)) => x == y,
                _ => a.as_float() == b.as_float(),
            },
            (Self::List(a), Self::List(b)) => {
                descend(depth)?;
                seq_eq(&a.borrow(), &b.borrow(), depth + 1)?
            }
            (Self::Tuple(a), Self::Tuple(b)) => {
                descend(depth)?;
                seq_eq(a, b, depth + 1)?
            }
            (Self::Dict(a), Self::Dict(b)) => {
                descend(depth)?;
                let (a, b) = (a.borrow(), b.borrow());
                if a.len() != b.len() {
                    return Ok(false);
                }
                for (k, v) in a.iter() {
                    let mut found = false;
                    for (k2, v2) in b.iter() {
                        if k.same_object(k2) || k.eq_at(k2, depth + 1)? {
                            found = v.same_object(v2) || v.eq_at(v2, depth + 1)?;
                            break;
                        }
                    }
                    if !found {
                        return Ok(false);
                    }
                }
                true
            }
            (Self::Record(a), Self::Record(b)) => Rc::ptr_eq(a, b) || a == b,
            (Self::Function(a), Self::Function(b)) => Rc::ptr_eq(a, b),
            (Self::Builtin(a), Self::Builtin(b)) => a == b,
            (Self::Tool(a), Self::Tool(b)) => a == b,
            (Self::Exception(a), Self::Exception(b)) => Rc::ptr_eq(a, b),
            (Self::Type(a), Self::Type(b)) => a == b,
            _ => false,
        })
    }

    /// Identity of shared containers, which compare equal without recursing.
    fn same_object(&self, other: &Value) -> bool {
        match (self, other) {
            (Self::List(a), Self::List(b)) => Rc::ptr_eq(a, b),
            (Self::Dict(a), Self::Dict(b)) => Rc::ptr_eq(a, b),
            (Self::Tuple(a), Self::Tuple(b)) => Rc::ptr_eq(a, b),
            _ => false,
        }
    }

    /// Python `is`, approximated as identity for shared values and equality otherwise.
    pub fn py_is(&self, other: &Value) -> bool {
        match (self, other) {
            (Self::List(a), Self::List(b)) => Rc::ptr_eq(a, b),
            (Self::Dict(a), Self::Dict(b)) => Rc::ptr_eq(a, b),
            (Self::Tuple(a), Self::Tuple(b)) => Rc::ptr_eq(a, b),
            (Self::Bool(a), Self::Bool(b)) => a == b,
            (Self::Bool(_), _) | (_, Self::Bool(_)) => false,
            (a, b) => a.py_eq(b),
        }
    }

    /// Ordering for `<`, `>`, `min`, `max` and `sorted`; `None` when unorderable.
    pub fn py_cmp(&self, other: &Value) -> Option<Ordering> {
        self.try_cmp(other).ok().flatten()
    }

    /// Like [`Value::py_cmp`], failing with `RuntimeError` on runaway nesting.
    pub fn try_cmp(&self, other: &Value) -> Result<Option<Ordering>> {
        self.cmp_at(other, 0)
    }

    fn cmp_at(&self, other: &Value, depth: usize) -> Result<Option<Ordering>> {
        Ok(match (self, other) {
            (Self::Str(a), Self::Str(b)) => Some(a.cmp(b)),
            (a, b) if a.is_number() && b.is_number() => match (a.as_int(), b.as_int()) {
                (Some(x), Some(y)) => Some(x.cmp(&y)),
                _ => match (a.as_float(), b.as_float()) {
                    (Some(x), Some(y)) => x.partial_cmp(&y),
                    _ => None,
                },
            },
            (Self::List(a), Self::List(b)) => {
                descend(depth)?;
                seq_cmp(&a.borrow(), &b.borrow(), depth + 1)?
            }
            (Self::Tuple(a), Self::Tuple(b)) => {
                descend(depth)?;
                seq_cmp(a, b, depth + 1)?
            }
            _ => None,
        })
    }

    /// Python `repr()`.
    pub fn repr(&self) -> String {
        match self {
            Self::Str(s) => repr_str(s),
            Self::Exception(e) => format!("{}({})", e.kind, repr_str(&e.message)),
            other => other.to_string(),
        }
    }
}

fn descend(depth: usize) -> Result<()> {
    if depth >= MAX_DEPTH {
        return Err(Error::runtime(
            ErrorKind::RuntimeError,
            "maximum recursion depth exceeded in comparison",
        ));
    }
    Ok(())
}

fn seq_eq(a: &[Value], b: &[Value], depth: usize) -> Result<bool> {
    if a.len() != b.len() {
        return Ok(false);
    }
    for (x, y) in a.iter().zip(b) {
        if !x.same_object(y) && !x.eq_at(y, depth)? {
            return Ok(false);
        }
    }
    Ok(true)
}

fn seq_cmp(a: &[Value], b: &[Value], depth: usize) -> Result<Option<Ordering>> {
    for (x, y) in a.iter().zip(b) {
        if !x.same_object(y) && !x.eq_at(y, depth)? {
            return x.cmp_at(y, depth);
        }
    }
    Ok(Some(a.len().cmp(&b.len())))
}

/// Marks a container as being printed until dropped.
struct Printing;

impl Printing {
    /// `None` when the container is already being printed further out, or
    /// nesting is too deep to print.
    fn enter(address: usize) -> Option<Self> {
        PRINTING.with_borrow_mut(|open| {
            if open.len() >= MAX_DEPTH || open.contains(&address) {
                return None;
            }
            open.push(address);
            Some(Self)
        })
    }
}

impl Drop for Printing {
    fn drop(&mut self) {
        PRINTING.with_borrow_mut(|open| {
            open.pop();
        });
    }
}

fn address<T: ?Sized>(rc: &Rc<T>) -> usize {
    Rc::as_ptr(rc).cast::<()>() as usize
}

fn repr_str(s: &str) -> String {
    let quote = if s.contains('\'') && !s.contains('"') {
        '"'
    } else {
        '\''
    };
    let mut out = String::with_capacity(s.len() + 2);
    out.push(quote);
    for c in s.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c if c == quote => {
                out.push('\\');
                out.push(c);
            }
            c => out.push(c),
        }
    }
    out.push(quote);
    out
}

/// Python float repr: shortest round-trip digits, always showing a fraction
/// or exponent.
pub fn format_float(f: f64) -> String {
    if f.is_nan() {
        return "nan".to_string();
    }
    if f.is_infinite() {
        return if f > 0.0 { "inf" } else { "-inf" }.to_string();
    }
    let magnitude = f.abs();
    if magnitude != 0.0 && !(1e-4..1e16).contains(&magnitude) {
        let formatted = format!("{f:e}");
        let (mantissa, exponent) = formatted.split_once('e').unwrap_or((formatted.as_str(), "0"));
        let (sign, digits) = match exponent.strip_prefix('-') {
            Some(d) => ('-', d),
            None => ('+', exponent),
        };
        return format!("{mantissa}e{sign}{digits:0>2}");
    }
    if f.fract() == 0.0 {
        format!("{f:.1}")
    } else {
        format!("{f}")
    }
}

/// Python `str()`.
impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::None => f.write_str("None"),
            Self::Bool(true) => f.write_str("True"),
            Self::Bool(false) => f.write_str("False"),
            Self::Int(i) => write!(f, "{i}"),
            Self::Float(x) => f.write_str(&format_float(*x)),
            Self::Str(s) => f.write_str(s),
            Self::List(items) => {
                let Some(_printing) = Printing::enter(address(items)) else {
                    return f.write_str("[...]");
                };
                let items = items.borrow();
                write!(f, "[{}]", join_repr(&items))
            }
            Self::Tuple(items) => {
                let Some(_printing) = Printing::enter(address(items)) else {
                    return f.write_str("(...)");
                };
                if items.len() == 1 {
                    write!(f, "({},)", items[0].repr())
                } else {
                    write!(f, "({})", join_repr(items))
                }
            }
            Self::Dict(entries) => {
                let Some(_printing) = Printing::enter(address(entries)) else {
                    return f.write_str("{...}");
                };
                let body = entries
                    .borrow()
                    .iter()
                    .map(|(k, v)| format!("{}: {}", k.repr(), v.repr()))
                    .collect::<Vec<_>>()
                    .join(", ");
                write!(f, "{{{body}}}")
            }
            Self::Record(r) => {
                let body = r
                    .fields
                    .iter()
                    .map(|(n, v)| format!("{n}={}", v.repr()))
                    .collect::<Vec<_>>()
                    .join(", ");
                write!(f, "{}({body})", r.type_name)
            }
            Self::Function(func) => write!(f, "<function {}>", func.name()),
            Self::Builtin(b) if b.is_type() => write!(f, "<class '{}'>", b.name()),
            Self::Builtin(b) => write!(f, "<built-in function {}>", b.name()),
            Self::Tool(name) => write!(f, "<tool {name}>"),
            Self::Exception(e) => f.write_str(&e.message),
            Self::Type(name) => write!(f, "<class '{name}'>"),
        }
    }
}

fn join_repr(items: &[Value]) -> String {
    items
        .iter()
        .map(Value::repr)
        .collect::<Vec<_>>()
        .join(", ")
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        self.py_eq(other)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Self::Str(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Self::Str(s)
    }
}

impl From<f64> for Value {
    fn from(f: f64) -> Self {
        Self::Float(f)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Self::Int(i)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

impl From<Record> for Value {
    fn from(r: Record) -> Self {
        Self::record(r)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn float_repr_matches_python() {
        assert_eq!(format_float(1.0), "1.0");
        assert_eq!(format_float(47.6062), "47.6062");
        assert_eq!(format_float(-0.5), "-0.5");
        assert_eq!(format_float(1e-5), "1e-05");
        assert_eq!(format_float(1e16), "1e+16");
        assert_eq!(format_float(f64::INFINITY), "inf");
    }

    #[test]
    fn str_and_repr() {
        let v = Value::tuple(vec!["King County".into(), "Washington".into()]);
        assert_eq!(v.to_string(), "('King County', 'Washington')");
        assert_eq!(Value::tuple(vec![Value::Int(1)]).to_string(), "(1,)");
        assert_eq!(Value::from("it's").repr(), "\"it's\"");
        assert_eq!(Value::list(vec![Value::None, Value::Bool(true)]).to_string(), "[None, True]");
    }

    #[test]
    fn record_display() {
        let weather = Record::new("Weather")
            .field("temperature_fahrenheit", 70.5)
            .field("precipitation_chance_percent", 12.0);
        assert_eq!(
            Value::from(weather).to_string(),
            "Weather(temperature_fahrenheit=70.5, precipitation_chance_percent=12.0)"
        );
    }

    #[test]
    fn numeric_equality_crosses_types() {
        assert!(Value::Int(1).py_eq(&Value::Float(1.0)));
        assert!(Value::Bool(true).py_eq(&Value::Int(1)));
        assert!(!Value::from("1").py_eq(&Value::Int(1)));
    }

    #[test]
    fn ordering() {
        assert_eq!(Value::Int(2).py_cmp(&Value::Float(2.5)), Some(Ordering::Less));
        assert_eq!(Value::from("b").py_cmp(&Value::from("a")), Some(Ordering::Greater));
        assert_eq!(Value::from("b").py_cmp(&Value::Int(1)), None);
        let a = Value::tuple(vec![Value::Int(1), Value::Int(2)]);
        let b = Value::tuple(vec![Value::Int(1), Value::Int(3)]);
        assert_eq!(a.py_cmp(&b), Some(Ordering::Less));
    }

    #[test]
    fn shared_lists_alias() {
        let list = Value::list(vec![]);
        let alias = list.clone();
        if let Value::List(items) = &alias {
            items.borrow_mut().push(Value::Int(1));
        }
        assert_eq!(list.to_string(), "[1]");
        assert!(list.py_is(&alias));
    }

    fn self_containing_list() -> Value {
        let list = Value::list(vec![Value::Int(1)]);
        if let Value::List(items) = &list {
            items.borrow_mut().push(list.clone());
        }
        list
    }

    #[test]
    fn cyclic_containers_print_ellipsis() {
        let list = self_containing_list();
        assert_eq!(list.to_string(), "[1, [...]]");
        assert_eq!(list.repr(), "[1, [...]]");

        let dict = Value::dict(vec![]);
        if let Value::Dict(entries) = &dict {
            entries.borrow_mut().push(("self".into(), dict.clone()));
        }
        assert_eq!(dict.to_string(), "{'self': {...}}");

        let shared = Value::list(vec![]);
        let twice = Value::list(vec![shared.clone(), shared]);
        assert_eq!(twice.to_string(), "[[], []]");
    }

    #[test]
    fn deep_nesting_is_cut_when_printing() {
        let mut value = Value::Int(0);
        for _ in 0..1_000 {
            value = Value::tuple(vec![value]);
        }
        let text = value.to_string();
        assert!(text.contains("(...)"));
        assert!(text.len() < 1_000);
    }

    #[test]
    fn cyclic_equality_is_an_error_not_an_overflow() {
        let a = self_containing_list();
        let b = self_containing_list();
        let err = a.try_eq(&b).unwrap_err();
        assert_eq!(
            err.to_string(),
            "RuntimeError: maximum recursion depth exceeded in comparison"
        );
        assert!(err.is_catchable());
        assert!(!a.py_eq(&b));
        assert!(a.try_cmp(&b).is_err());

        assert!(a.try_eq(&a).unwrap());
        assert!(a.try_eq(&a.clone()).unwrap());
    }

    #[test]
    fn unhashable_keys() {
        assert!(Value::list(vec![]).check_hashable().is_err());
        assert!(Value::tuple(vec![Value::Int(1)]).check_hashable().is_ok());
    }
}
