//! Builtin functions available to toolscript programs.

use std::cmp::Ordering;

use crate::ast::BinOp;
use crate::interp::Interpreter;
use crate::value::{Dict, Value};
use crate::{Error, ErrorKind, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Builtin {
    Str,
    Int,
    Float,
    Bool,
    Len,
    Round,
    Abs,
    Min,
    Max,
    Sum,
    Range,
    List,
    Tuple,
    Dict,
    Sorted,
    Enumerate,
    Zip,
    Any,
    All,
    Isinstance,
    Print,
    Repr,
    Type,
    /// Exception constructor such as `ValueError`.
    Exception(ErrorKind),
}

impl Builtin {
    const FUNCTIONS: [Builtin; 23] = [
        Self::Str,
        Self::Int,
        Self::Float,
        Self::Bool,
        Self::Len,
        Self::Round,
        Self::Abs,
        Self::Min,
        Self::Max,
        Self::Sum,
        Self::Range,
        Self::List,
        Self::Tuple,
        Self::Dict,
        Self::Sorted,
        Self::Enumerate,
        Self::Zip,
        Self::Any,
        Self::All,
        Self::Isinstance,
        Self::Print,
        Self::Repr,
        Self::Type,
    ];

    pub fn from_name(name: &str) -> Option<Self> {
        Self::FUNCTIONS
            .into_iter()
            .find(|b| b.name() == name)
            .or_else(|| ErrorKind::from_name(name).map(Self::Exception))
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Str => "str",
            Self::Int => "int",
            Self::Float => "float",
            Self::Bool => "bool",
            Self::Len => "len",
            Self::Round => "round",
            Self::Abs => "abs",
            Self::Min => "min",
            Self::Max => "max",
            Self::Sum => "sum",
            Self::Range => "range",
            Self::List => "list",
            Self::Tuple => "tuple",
            Self::Dict => "dict",
            Self::Sorted => "sorted",
            Self::Enumerate => "enumerate",
            Self::Zip => "zip",
            Self::Any => "any",
            Self::All => "all",
            Self::Isinstance => "isinstance",
            Self::Print => "print",
            Self::Repr => "repr",
            Self::Type => "type",
            Self::Exception(kind) => kind.name(),
        }
    }

    /// Whether this builtin is a class, such as `int` or `KeyError`.
    pub fn is_type(self) -> bool {
        matches!(
            self,
            Self::Str
                | Self::Int
                | Self::Float
                | Self::Bool
                | Self::List
                | Self::Tuple
                | Self::Dict
                | Self::Exception(_)
        )
    }

    /// The class of `value`, as returned by `type()`.
    fn type_of(value: &Value) -> Value {
        let builtin = match value {
            Value::Str(_) => Self::Str,
            Value::Int(_) => Self::Int,
            Value::Float(_) => Self::Float,
            Value::Bool(_) => Self::Bool,
            Value::List(_) => Self::List,
            Value::Tuple(_) => Self::Tuple,
            Value::Dict(_) => Self::Dict,
            Value::Exception(e) => Self::Exception(e.kind),
            other => return Value::Type(other.type_name().to_string()),
        };
        Value::Builtin(builtin)
    }

    /// Whether `isinstance(value, self)` holds.
    fn matches_type(self, value: &Value) -> Result<bool> {
        Ok(match (self, value) {
            (Self::Str, Value::Str(_)) => true,
            (Self::Int, Value::Int(_) | Value::Bool(_)) => true,
            (Self::Float, Value::Float(_)) => true,
            (Self::Bool, Value::Bool(_)) => true,
            (Self::List, Value::List(_)) => true,
            (Self::Tuple, Value::Tuple(_)) => true,
            (Self::Dict, Value::Dict(_)) => true,
            (Self::Exception(kind), Value::Exception(e)) => e.kind.caught_by(kind.name()),
            (
                Self::Str
                | Self::Int
                | Self::Float
                | Self::Bool
                | Self::List
                | Self::Tuple
                | Self::Dict
                | Self::Exception(_),
                _,
            ) => false,
            _ => {
                return Err(Error::type_error(
                    "isinstance() arg 2 must be a type or tuple of types",
                ));
            }
        })
    }

    pub(crate) fn call(
        self,
        interp: &mut Interpreter<'_>,
        args: Vec<Value>,
        mut kwargs: Vec<(String, Value)>,
    ) -> Result<Value> {
        let name = self.name();
        let result = match self {
            Self::Str => {
                arity(name, &args, 0, 1)?;
                Value::Str(args.first().map(Value::to_string).unwrap_or_default())
            }
            Self::Int => {
                arity(name, &args, 0, 2)?;
                to_int(&args)?
            }
            Self::Float => {
                arity(name, &args, 0, 1)?;
                match args.first() {
                    None => Value::Float(0.0),
                    Some(v) => Value::Float(to_float(v)?),
                }
            }
            Self::Bool => {
                arity(name, &args, 0, 1)?;
                Value::Bool(args.first().is_some_and(Value::is_truthy))
            }
            Self::Len => {
                arity(name, &args, 1, 1)?;
                Value::Int(length(&args[0])? as i64)
            }
            Self::Round => {
                let digits = take_kwarg(&mut kwargs, "ndigits");
                arity(name, &args, 1, 2)?;
                let digits = args.get(1).cloned().or(digits).unwrap_or(Value::None);
                round(&args[0], &digits)?
            }
            Self::Abs => {
                arity(name, &args, 1, 1)?;
                match &args[0] {
                    Value::Float(f) => Value::Float(f.abs()),
                    v => match v.as_int() {
                        Some(i) => Value::Int(i.checked_abs().ok_or_else(overflow)?),
                        None => {
                            return Err(Error::type_error(format!(
                                "bad operand type for abs(): '{}'",
                                v.type_name()
                            )));
                        }
                    },
                }
            }
            Self::Min | Self::Max => {
                let key = take_kwarg(&mut kwargs, "key");
                let default = take_kwarg(&mut kwargs, "default");
                no_kwargs(name, &kwargs)?;
                let want = if self == Self::Min {
                    Ordering::Less
                } else {
                    Ordering::Greater
                };
                return extreme(interp, name, args, key, default, want);
            }
            Self::Sum => {
                arity(name, &args, 1, 2)?;
                let start = take_kwarg(&mut kwargs, "start");
                let mut total = args.get(1).cloned().or(start).unwrap_or(Value::Int(0));
                if matches!(total, Value::Str(_)) {
                    return Err(Error::type_error(
                        "sum() can't sum strings [use ''.join(seq) instead]",
                    ));
                }
                for item in args[0].iterate()? {
                    total = interp.binary(BinOp::Add, &total, &item)?;
                }
                total
            }
            Self::Range => {
                arity(name, &args, 1, 3)?;
                let ints = args
                    .iter()
                    .map(|a| {
                        a.as_int().ok_or_else(|| {
                            Error::type_error(format!(
                                "'{}' object cannot be interpreted as an integer",
                                a.type_name()
                            ))
                        })
                    })
                    .collect::<Result<Vec<i64>>>()?;
                let (start, stop, step) = match ints.as_slice() {
                    [] => (0, 0, 1),
                    [stop] => (0, *stop, 1),
                    [start, stop] => (*start, *stop, 1),
                    [start, stop, step, ..] => (*start, *stop, *step),
                };
                range(interp, start, stop, step)?
            }
            Self::List => {
                arity(name, &args, 0, 1)?;
                Value::list(match args.first() {
                    Some(v) => v.iterate()?,
                    None => Vec::new(),
                })
            }
            Self::Tuple => {
                arity(name, &args, 0, 1)?;
                Value::tuple(match args.first() {
                    Some(v) => v.iterate()?,
                    None => Vec::new(),
                })
            }
            Self::Dict => {
                arity(name, &args, 0, 1)?;
                let mut entries: Dict = Vec::new();
                match args.first() {
                    Some(Value::Dict(d)) => entries = d.borrow().clone(),
                    Some(v) => {
                        for pair in v.iterate()? {
                            let items = pair.iterate()?;
                            let [key, value] = <[Value; 2]>::try_from(items).map_err(|_| {
                                Error::value_error(
                                    "dictionary update sequence element has wrong length",
                                )
                            })?;
                            dict_insert(&mut entries, key, value)?;
                        }
                    }
                    None => {}
                }
                for (key, value) in kwargs.drain(..) {
                    dict_insert(&mut entries, Value::Str(key), value)?;
                }
                Value::dict(entries)
            }
            Self::Sorted => {
                arity(name, &args, 1, 1)?;
                let key = take_kwarg(&mut kwargs, "key");
                let reverse = take_kwarg(&mut kwargs, "reverse").is_some_and(|r| r.is_truthy());
                no_kwargs(name, &kwargs)?;
                Value::list(sorted(interp, args[0].iterate()?, key, reverse)?)
            }
            Self::Enumerate => {
                let start = take_kwarg(&mut kwargs, "start");
                arity(name, &args, 1, 2)?;
                let start = args
                    .get(1)
                    .cloned()
                    .or(start)
                    .map(|s| {
                        s.as_int()
                            .ok_or_else(|| Error::type_error("enumerate() start must be an integer"))
                    })
                    .transpose()?
                    .unwrap_or(0);
                let items = args[0].iterate()?;
                let mut out = Vec::with_capacity(items.len());
                for (i, item) in items.into_iter().enumerate() {
                    let index = start.checked_add(i as i64).ok_or_else(overflow)?;
                    out.push(Value::tuple(vec![Value::Int(index), item]));
                }
                Value::list(out)
            }
            Self::Zip => {
                let columns = args
                    .iter()
                    .map(Value::iterate)
                    .collect::<Result<Vec<_>>>()?;
                let len = columns.iter().map(Vec::len).min().unwrap_or(0);
                Value::list(
                    (0..len)
                        .map(|i| Value::tuple(columns.iter().map(|c| c[i].clone()).collect()))
                        .collect(),
                )
            }
            Self::Any => {
                arity(name, &args, 1, 1)?;
                Value::Bool(args[0].iterate()?.iter().any(Value::is_truthy))
            }
            Self::All => {
                arity(name, &args, 1, 1)?;
                Value::Bool(args[0].iterate()?.iter().all(Value::is_truthy))
            }
            Self::Isinstance => {
                arity(name, &args, 2, 2)?;
                let classes = match &args[1] {
                    Value::Tuple(items) => items.as_ref().clone(),
                    other => vec![other.clone()],
                };
                let mut found = false;
                for class in &classes {
                    let Value::Builtin(b) = class else {
                        return Err(Error::type_error(
                            "isinstance() arg 2 must be a type or tuple of types",
                        ));
                    };
                    found |= b.matches_type(&args[0])?;
                }
                Value::Bool(found)
            }
            Self::Print => {
                let sep = take_kwarg(&mut kwargs, "sep").map_or(" ".to_string(), |s| s.to_string());
                let end = take_kwarg(&mut kwargs, "end").map_or(String::new(), |e| {
                    let e = e.to_string();
                    e.trim_end_matches('\n').to_string()
                });
                no_kwargs(name, &kwargs)?;
                let line = args
                    .iter()
                    .map(Value::to_string)
                    .collect::<Vec<_>>()
                    .join(&sep);
                interp.print(format!("{line}{end}"));
                Value::None
            }
            Self::Repr => {
                arity(name, &args, 1, 1)?;
                Value::Str(args[0].repr())
            }
            Self::Type => {
                arity(name, &args, 1, 1)?;
                Self::type_of(&args[0])
            }
            Self::Exception(kind) => {
                let message = match args.as_slice() {
                    [] => String::new(),
                    [only] => only.to_string(),
                    many => Value::tuple(many.to_vec()).to_string(),
                };
                Value::exception(kind, message)
            }
        };
        no_kwargs(name, &kwargs)?;
        Ok(result)
    }
}

fn overflow() -> Error {
    Error::runtime(ErrorKind::OverflowError, "integer overflow")
}

fn arity(name: &str, args: &[Value], min: usize, max: usize) -> Result<()> {
    if args.len() < min {
        return Err(Error::type_error(format!(
            "{name}() expected at least {min} argument{}, got {}",
            if min == 1 { "" } else { "s" },
            args.len()
        )));
    }
    if args.len() > max {
        return Err(Error::type_error(format!(
            "{name}() expected at most {max} argument{}, got {}",
            if max == 1 { "" } else { "s" },
            args.len()
        )));
    }
    Ok(())
}

pub(crate) fn take_kwarg(kwargs: &mut Vec<(String, Value)>, name: &str) -> Option<Value> {
    let pos = kwargs.iter().position(|(k, _)| k == name)?;
    Some(kwargs.remove(pos).1)
}

pub(crate) fn no_kwargs(name: &str, kwargs: &[(String, Value)]) -> Result<()> {
    match kwargs.first() {
        Some((key, _)) => Err(Error::type_error(format!(
            "{name}() got an unexpected keyword argument '{key}'"
        ))),
        None => Ok(()),
    }
}

pub(crate) fn dict_insert(entries: &mut Dict, key: Value, value: Value) -> Result<()> {
    key.check_hashable()?;
    match entries.iter_mut().find(|(k, _)| k.py_eq(&key)) {
        Some(entry) => entry.1 = value,
        None => entries.push((key, value)),
    }
    Ok(())
}

pub(crate) fn length(value: &Value) -> Result<usize> {
    match value {
        Value::Str(s) => Ok(s.chars().count()),
        Value::List(l) => Ok(l.borrow().len()),
        Value::Tuple(t) => Ok(t.len()),
        Value::Dict(d) => Ok(d.borrow().len()),
        other => Err(Error::type_error(format!(
            "object of type '{}' has no len()",
            other.type_name()
        ))),
    }
}

fn float_to_int(f: f64) -> Result<i64> {
    if f.is_nan() {
        return Err(Error::value_error("cannot convert float NaN to integer"));
    }
    if f.is_infinite() {
        return Err(Error::runtime(
            ErrorKind::OverflowError,
            "cannot convert float infinity to integer",
        ));
    }
    let t = f.trunc();
    if t < i64::MIN as f64 || t >= i64::MAX as f64 {
        return Err(overflow());
    }
    Ok(t as i64)
}

fn to_int(args: &[Value]) -> Result<Value> {
    let Some(value) = args.first() else {
        return Ok(Value::Int(0));
    };
    if let Some(base) = args.get(1) {
        let (Value::Str(s), Some(base)) = (value, base.as_int()) else {
            return Err(Error::type_error(
                "int() can't convert non-string with explicit base",
            ));
        };
        let radix = u32::try_from(base)
            .ok()
            .filter(|b| (2..=36).contains(b))
            .ok_or_else(|| Error::value_error("int() base must be >= 2 and <= 36, or 0"))?;
        return i64::from_str_radix(s.trim(), radix).map(Value::Int).map_err(|_| {
            Error::value_error(format!(
                "invalid literal for int() with base {base}: {}",
                value.repr()
            ))
        });
    }
    match value {
        Value::Int(i) => Ok(Value::Int(*i)),
        Value::Bool(b) => Ok(Value::Int(i64::from(*b))),
        Value::Float(f) => float_to_int(*f).map(Value::Int),
        Value::Str(s) => s.trim().replace('_', "").parse().map(Value::Int).map_err(|_| {
            Error::value_error(format!(
                "invalid literal for int() with base 10: {}",
                value.repr()
            ))
        }),
        other => Err(Error::type_error(format!(
            "int() argument must be a string or a number, not '{}'",
            other.type_name()
        ))),
    }
}

fn to_float(value: &Value) -> Result<f64> {
    match value {
        Value::Str(s) => s.trim().parse().map_err(|_| {
            Error::value_error(format!(
                "could not convert string to float: {}",
                value.repr()
            ))
        }),
        other => other.as_float().ok_or_else(|| {
            Error::type_error(format!(
                "float() argument must be a string or a real number, not '{}'",
                other.type_name()
            ))
        }),
    }
}

fn round(value: &Value, digits: &Value) -> Result<Value> {
    let not_number = || {
        Error::type_error(format!(
            "type {} doesn't define __round__ method",
            value.type_name()
        ))
    };
    let digits = match digits {
        Value::None => None,
        d => Some(d.as_int().ok_or_else(|| {
            Error::type_error(format!(
                "'{}' object cannot be interpreted as an integer",
                d.type_name()
            ))
        })?),
    };
    match (value, digits) {
        (Value::Float(f), None) => float_to_int(f.round_ties_even()).map(Value::Int),
        (Value::Float(f), Some(_)) if !f.is_finite() => Ok(Value::Float(*f)),
        (Value::Float(f), Some(n)) if n >= 0 => {
            let n = n.min(300) as usize;
            let rounded = format!("{f:.n$}");
            rounded
                .parse()
                .map(Value::Float)
                .map_err(|_| Error::value_error("round() produced an invalid float"))
        }
        (Value::Float(f), Some(n)) => {
            let scale = 10f64.powi(n.unsigned_abs().min(308) as i32);
            Ok(Value::Float((f / scale).round_ties_even() * scale))
        }
        (v, digits) => {
            let i = v.as_int().ok_or_else(not_number)?;
            match digits {
                Some(n) if n < 0 => {
                    let scale = 10i64.checked_pow(n.unsigned_abs() as u32);
                    Ok(Value::Int(match scale {
                        Some(scale) => {
                            let rounded = (i as f64 / scale as f64).round_ties_even();
                            (rounded as i64).checked_mul(scale).ok_or_else(overflow)?
                        }
                        None => 0,
                    }))
                }
                _ => Ok(Value::Int(i)),
            }
        }
    }
}

fn range(interp: &Interpreter<'_>, start: i64, stop: i64, step: i64) -> Result<Value> {
    if step == 0 {
        return Err(Error::value_error("range() arg 3 must not be zero"));
    }
    let span = if step > 0 {
        (i128::from(stop) - i128::from(start)).max(0)
    } else {
        (i128::from(start) - i128::from(stop)).max(0)
    };
    let step_abs = i128::from(step).abs();
    let len = (span + step_abs - 1) / step_abs;
    let len = usize::try_from(len).unwrap_or(usize::MAX);
    interp.check_len(len)?;
    let mut out = Vec::with_capacity(len);
    let mut current = start;
    for _ in 0..len {
        out.push(Value::Int(current));
        current = current.wrapping_add(step);
    }
    Ok(Value::list(out))
}

fn compare(a: &Value, b: &Value) -> Result<Ordering> {
    a.try_cmp(b)?.ok_or_else(|| {
        Error::type_error(format!(
            "'<' not supported between instances of '{}' and '{}'",
            a.type_name(),
            b.type_name()
        ))
    })
}

fn keyed(
    interp: &mut Interpreter<'_>,
    items: Vec<Value>,
    key: Option<Value>,
) -> Result<Vec<(Value, Value)>> {
    match key {
        None | Some(Value::None) => Ok(items.into_iter().map(|v| (v.clone(), v)).collect()),
        Some(key) => items
            .into_iter()
            .map(|item| {
                let k = interp.call_value(&key, vec![item.clone()], Vec::new())?;
                Ok((k, item))
            })
            .collect(),
    }
}

fn extreme(
    interp: &mut Interpreter<'_>,
    name: &str,
    args: Vec<Value>,
    key: Option<Value>,
    default: Option<Value>,
    want: Ordering,
) -> Result<Value> {
    let items = match args.len() {
        0 => {
            return Err(Error::type_error(format!(
                "{name} expected at least 1 argument, got 0"
            )));
        }
        1 => args[0].iterate()?,
        _ => args,
    };
    let mut best: Option<(Value, Value)> = None;
    for (k, item) in keyed(interp, items, key)? {
        let replace = match &best {
            None => true,
            Some((best_key, _)) => compare(&k, best_key)? == want,
        };
        if replace {
            best = Some((k, item));
        }
    }
    match (best, default) {
        (Some((_, item)), _) => Ok(item),
        (None, Some(default)) => Ok(default),
        (None, None) => Err(Error::value_error(format!(
            "{name}() arg is an empty sequence"
        ))),
    }
}

fn sorted(
    interp: &mut Interpreter<'_>,
    items: Vec<Value>,
    key: Option<Value>,
    reverse: bool,
) -> Result<Vec<Value>> {
    let mut pairs = keyed(interp, items, key)?;
    let mut failure = None;
    pairs.sort_by(|(a, _), (b, _)| {
        let ord = match compare(a, b) {
            Ok(ord) => ord,
            Err(e) => {
                failure.get_or_insert(e);
                Ordering::Equal
            }
        };
        if reverse { ord.reverse() } else { ord }
    });
    match failure {
        Some(e) => Err(e),
        None => Ok(pairs.into_iter().map(|(_, v)| v).collect()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_round_trip() {
        for b in Builtin::FUNCTIONS {
            assert_eq!(Builtin::from_name(b.name()), Some(b));
        }
        assert_eq!(
            Builtin::from_name("ValueError"),
            Some(Builtin::Exception(ErrorKind::ValueError))
        );
        assert_eq!(Builtin::from_name("open"), None);
        assert_eq!(Builtin::from_name("eval"), None);
    }

    #[test]
    fn rounding_is_half_even() {
        assert_eq!(round(&Value::Float(2.5), &Value::None).unwrap(), Value::Int(2));
        assert_eq!(round(&Value::Float(3.5), &Value::None).unwrap(), Value::Int(4));
        assert_eq!(
            round(&Value::Float(71.456), &Value::Int(1)).unwrap(),
            Value::Float(71.5)
        );
        assert_eq!(round(&Value::Int(1234), &Value::Int(-2)).unwrap(), Value::Int(1200));
    }

    #[test]
    fn int_parsing() {
        assert_eq!(to_int(&[Value::from(" 42 ")]).unwrap(), Value::Int(42));
        assert_eq!(to_int(&[Value::Float(-3.9)]).unwrap(), Value::Int(-3));
        assert_eq!(
            to_int(&[Value::from("ff"), Value::Int(16)]).unwrap(),
            Value::Int(255)
        );
        let err = to_int(&[Value::from("abc")]).unwrap_err();
        assert_eq!(
            err.to_string(),
            "ValueError: invalid literal for int() with base 10: 'abc'"
        );
    }

    #[test]
    fn type_of_values() {
        assert_eq!(Builtin::type_of(&Value::Int(1)), Value::Builtin(Builtin::Int));
        assert_eq!(
            Builtin::type_of(&Value::exception(ErrorKind::KeyError, "k")),
            Value::Builtin(Builtin::Exception(ErrorKind::KeyError))
        );
        assert_eq!(Builtin::type_of(&Value::None).to_string(), "<class 'NoneType'>");
        assert_eq!(Value::Builtin(Builtin::Float).to_string(), "<class 'float'>");
        assert_eq!(Value::Builtin(Builtin::Len).to_string(), "<built-in function len>");
    }

    #[test]
    fn float_parsing() {
        assert_eq!(to_float(&Value::from("2.5")).unwrap(), 2.5);
        assert!(to_float(&Value::from("warm")).is_err());
    }
}
