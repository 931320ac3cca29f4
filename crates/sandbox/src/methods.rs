//! Methods on str, list and dict values.

use crate::builtins::{dict_insert, no_kwargs, take_kwarg};
use crate::format::format_template;
use crate::interp::Interpreter;
use crate::value::Value;
use crate::{Error, ErrorKind, Result};

fn no_attribute(value: &Value, attr: &str) -> Error {
    Error::runtime(
        ErrorKind::AttributeError,
        format!("'{}' object has no attribute '{attr}'", value.type_name()),
    )
}

fn expect_args(method: &str, args: &[Value], min: usize, max: usize) -> Result<()> {
    if args.len() < min || args.len() > max {
        let expected = if min == max {
            format!("{min}")
        } else {
            format!("{min} to {max}")
        };
        return Err(Error::type_error(format!(
            "{method}() takes {expected} argument{} ({} given)",
            if max == 1 { "" } else { "s" },
            args.len()
        )));
    }
    Ok(())
}

fn str_arg<'v>(method: &str, value: &'v Value) -> Result<&'v str> {
    value.as_str().ok_or_else(|| {
        Error::type_error(format!(
            "{method}() argument must be str, not {}",
            value.type_name()
        ))
    })
}

fn int_arg(method: &str, value: &Value) -> Result<i64> {
    value.as_int().ok_or_else(|| {
        Error::type_error(format!(
            "{method}() argument must be int, not {}",
            value.type_name()
        ))
    })
}

/// Call `value.attr(*args, **kwargs)`.
pub(crate) fn call_method(
    interp: &Interpreter<'_>,
    value: &Value,
    attr: &str,
    args: Vec<Value>,
    kwargs: Vec<(String, Value)>,
) -> Result<Value> {
    match value {
        Value::Str(s) => str_method(interp, s, attr, args, kwargs),
        Value::List(_) => {
            no_kwargs(attr, &kwargs)?;
            list_method(value, attr, args)
        }
        Value::Dict(_) => {
            no_kwargs(attr, &kwargs)?;
            dict_method(value, attr, args)
        }
        other => Err(no_attribute(other, attr)),
    }
}

fn strip_chars(chars: Option<&Value>, method: &str) -> Result<Vec<char>> {
    match chars {
        None | Some(Value::None) => Ok(Vec::new()),
        Some(v) => Ok(str_arg(method, v)?.chars().collect()),
    }
}

fn str_method(
    interp: &Interpreter<'_>,
    s: &str,
    attr: &str,
    args: Vec<Value>,
    mut kwargs: Vec<(String, Value)>,
) -> Result<Value> {
    if attr == "format" {
        let text = format_template(s, &args, &kwargs, interp.max_sequence_len())?;
        return Ok(Value::Str(text));
    }
    let result = match attr {
        "lower" => {
            expect_args(attr, &args, 0, 0)?;
            Value::Str(s.to_lowercase())
        }
        "upper" => {
            expect_args(attr, &args, 0, 0)?;
            Value::Str(s.to_uppercase())
        }
        "strip" | "lstrip" | "rstrip" => {
            expect_args(attr, &args, 0, 1)?;
            let set = strip_chars(args.first(), attr)?;
            let matches = |c: char| {
                if set.is_empty() {
                    c.is_whitespace()
                } else {
                    set.contains(&c)
                }
            };
            Value::from(match attr {
                "strip" => s.trim_matches(matches),
                "lstrip" => s.trim_start_matches(matches),
                _ => s.trim_end_matches(matches),
            })
        }
        "split" => {
            let sep = take_kwarg(&mut kwargs, "sep");
            let maxsplit = take_kwarg(&mut kwargs, "maxsplit");
            expect_args(attr, &args, 0, 2)?;
            let sep = args.first().cloned().or(sep).unwrap_or(Value::None);
            let maxsplit = match args.get(1).cloned().or(maxsplit) {
                Some(v) => int_arg(attr, &v)?,
                None => -1,
            };
            let parts: Vec<Value> = match &sep {
                Value::None => {
                    let words = s.split_whitespace().map(Value::from);
                    if maxsplit < 0 {
                        words.collect()
                    } else {
                        split_whitespace_n(s, maxsplit as usize)
                    }
                }
                sep => {
                    let sep = str_arg(attr, sep)?;
                    if sep.is_empty() {
                        return Err(Error::value_error("empty separator"));
                    }
                    if maxsplit < 0 {
                        s.split(sep).map(Value::from).collect()
                    } else {
                        s.splitn(maxsplit as usize + 1, sep).map(Value::from).collect()
                    }
                }
            };
            Value::list(parts)
        }
        "join" => {
            expect_args(attr, &args, 1, 1)?;
            let items = args[0].iterate()?;
            let mut pieces = Vec::with_capacity(items.len());
            for (i, item) in items.iter().enumerate() {
                let Value::Str(piece) = item else {
                    return Err(Error::type_error(format!(
                        "sequence item {i}: expected str instance, {} found",
                        item.type_name()
                    )));
                };
                pieces.push(piece.as_str());
            }
            let total = pieces.iter().map(|p| p.len()).sum::<usize>();
            let separators = s.len().saturating_mul(pieces.len().saturating_sub(1));
            interp.check_len(total.saturating_add(separators))?;
            Value::Str(pieces.join(s))
        }
        "replace" => {
            expect_args(attr, &args, 2, 3)?;
            let old = str_arg(attr, &args[0])?;
            let new = str_arg(attr, &args[1])?;
            let limit = match args.get(2).map(|c| int_arg(attr, c)).transpose()? {
                Some(count) if count >= 0 => usize::try_from(count).unwrap_or(usize::MAX),
                _ => usize::MAX,
            };
            let count = s.matches(old).take(limit).count();
            let len = (s.len() - count * old.len()).saturating_add(count.saturating_mul(new.len()));
            interp.check_len(len)?;
            Value::Str(s.replacen(old, new, count))
        }
        "startswith" | "endswith" => {
            expect_args(attr, &args, 1, 1)?;
            let candidates = match &args[0] {
                Value::Tuple(items) => items.as_ref().clone(),
                other => vec![other.clone()],
            };
            let mut hit = false;
            for candidate in &candidates {
                let affix = str_arg(attr, candidate)?;
                hit |= if attr == "startswith" {
                    s.starts_with(affix)
                } else {
                    s.ends_with(affix)
                };
            }
            Value::Bool(hit)
        }
        "find" => {
            expect_args(attr, &args, 1, 1)?;
            let needle = str_arg(attr, &args[0])?;
            Value::Int(match s.find(needle) {
                Some(byte) => s[..byte].chars().count() as i64,
                None => -1,
            })
        }
        "count" => {
            expect_args(attr, &args, 1, 1)?;
            let needle = str_arg(attr, &args[0])?;
            Value::Int(if needle.is_empty() {
                s.chars().count() as i64 + 1
            } else {
                s.matches(needle).count() as i64
            })
        }
        "title" => {
            expect_args(attr, &args, 0, 0)?;
            let mut out = String::with_capacity(s.len());
            let mut in_word = false;
            for c in s.chars() {
                if c.is_alphabetic() {
                    if in_word {
                        out.extend(c.to_lowercase());
                    } else {
                        out.extend(c.to_uppercase());
                    }
                    in_word = true;
                } else {
                    out.push(c);
                    in_word = false;
                }
            }
            Value::Str(out)
        }
        "capitalize" => {
            expect_args(attr, &args, 0, 0)?;
            let mut chars = s.chars();
            Value::Str(match chars.next() {
                Some(first) => first
                    .to_uppercase()
                    .chain(chars.flat_map(char::to_lowercase))
                    .collect(),
                None => String::new(),
            })
        }
        "isdigit" => {
            expect_args(attr, &args, 0, 0)?;
            Value::Bool(!s.is_empty() && s.chars().all(|c| c.is_ascii_digit()))
        }
        _ => return Err(no_attribute(&Value::from(s), attr)),
    };
    no_kwargs(attr, &kwargs)?;
    Ok(result)
}

fn split_whitespace_n(s: &str, maxsplit: usize) -> Vec<Value> {
    let mut parts = Vec::new();
    let mut rest = s.trim_start();
    while !rest.is_empty() {
        if parts.len() == maxsplit {
            parts.push(Value::from(rest));
            break;
        }
        let end = rest.find(char::is_whitespace).unwrap_or(rest.len());
        parts.push(Value::from(&rest[..end]));
        rest = rest[end..].trim_start();
    }
    parts
}

fn list_method(value: &Value, attr: &str, args: Vec<Value>) -> Result<Value> {
    let Value::List(list) = value else {
        return Err(no_attribute(value, attr));
    };
    match attr {
        "append" => {
            expect_args(attr, &args, 1, 1)?;
            list.borrow_mut().extend(args);
            Ok(Value::None)
        }
        "extend" => {
            expect_args(attr, &args, 1, 1)?;
            let items = args[0].iterate()?;
            list.borrow_mut().extend(items);
            Ok(Value::None)
        }
        "pop" => {
            expect_args(attr, &args, 0, 1)?;
            let mut items = list.borrow_mut();
            if items.is_empty() {
                return Err(Error::runtime(ErrorKind::IndexError, "pop from empty list"));
            }
            let len = items.len() as i64;
            let index = match args.first() {
                Some(v) => int_arg(attr, v)?,
                None => len - 1,
            };
            let index = if index < 0 { index + len } else { index };
            if !(0..len).contains(&index) {
                return Err(Error::runtime(ErrorKind::IndexError, "pop index out of range"));
            }
            Ok(items.remove(index as usize))
        }
        "index" => {
            expect_args(attr, &args, 1, 1)?;
            let items = list.borrow();
            items
                .iter()
                .position(|item| item.py_eq(&args[0]))
                .map(|i| Value::Int(i as i64))
                .ok_or_else(|| Error::value_error(format!("{} is not in list", args[0].repr())))
        }
        "insert" => {
            expect_args(attr, &args, 2, 2)?;
            let mut items = list.borrow_mut();
            let len = items.len() as i64;
            let index = int_arg(attr, &args[0])?;
            let index = if index < 0 { (index + len).max(0) } else { index.min(len) };
            items.insert(index as usize, args[1].clone());
            Ok(Value::None)
        }
        _ => Err(no_attribute(value, attr)),
    }
}

fn dict_method(value: &Value, attr: &str, args: Vec<Value>) -> Result<Value> {
    let Value::Dict(dict) = value else {
        return Err(no_attribute(value, attr));
    };
    match attr {
        "get" => {
            expect_args(attr, &args, 1, 2)?;
            args[0].check_hashable()?;
            let entries = dict.borrow();
            Ok(entries
                .iter()
                .find(|(k, _)| k.py_eq(&args[0]))
                .map(|(_, v)| v.clone())
                .or_else(|| args.get(1).cloned())
                .unwrap_or(Value::None))
        }
        "keys" => {
            expect_args(attr, &args, 0, 0)?;
            Ok(Value::list(dict.borrow().iter().map(|(k, _)| k.clone()).collect()))
        }
        "values" => {
            expect_args(attr, &args, 0, 0)?;
            Ok(Value::list(dict.borrow().iter().map(|(_, v)| v.clone()).collect()))
        }
        "items" => {
            expect_args(attr, &args, 0, 0)?;
            Ok(Value::list(
                dict.borrow()
                    .iter()
                    .map(|(k, v)| Value::tuple(vec![k.clone(), v.clone()]))
                    .collect(),
            ))
        }
        "setdefault" => {
            expect_args(attr, &args, 1, 2)?;
            let mut entries = dict.borrow_mut();
            if let Some((_, v)) = entries.iter().find(|(k, _)| k.py_eq(&args[0])) {
                return Ok(v.clone());
            }
            let default = args.get(1).cloned().unwrap_or(Value::None);
            dict_insert(&mut entries, args[0].clone(), default.clone())?;
            Ok(default)
        }
        _ => Err(no_attribute(value, attr)),
    }
}
