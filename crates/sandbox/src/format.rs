//! Format specifications for f-strings and `str.format`.
//!
//! Grammar: `[[fill]align][sign][0][width][,][.precision][type]`.

use crate::value::Value;
use crate::{Error, ErrorKind, Result};

/// Widths and precisions above this are rejected before any formatting.
const MAX_DIGITS: usize = u16::MAX as usize;

#[derive(Debug, Default, PartialEq)]
struct Spec {
    fill: Option<char>,
    align: Option<char>,
    sign: Option<char>,
    width: usize,
    grouping: bool,
    precision: Option<usize>,
    kind: Option<char>,
}

fn invalid(spec: &str) -> Error {
    Error::value_error(format!("Invalid format specifier '{spec}'"))
}

fn too_many_digits() -> Error {
    Error::value_error("Too many decimal digits in format string")
}

fn parse_spec(text: &str) -> Result<Spec> {
    let chars: Vec<char> = text.chars().collect();
    let mut spec = Spec::default();
    let mut i = 0;
    let is_align = |c: char| matches!(c, '<' | '>' | '^' | '=');

    if chars.len() >= 2 && is_align(chars[1]) {
        spec.fill = Some(chars[0]);
        spec.align = Some(chars[1]);
        i = 2;
    } else if chars.first().copied().is_some_and(is_align) {
        spec.align = Some(chars[0]);
        i = 1;
    }
    if let Some(c) = chars.get(i).copied().filter(|c| matches!(c, '+' | '-' | ' ')) {
        spec.sign = Some(c);
        i += 1;
    }
    if chars.get(i) == Some(&'0') {
        spec.fill.get_or_insert('0');
        spec.align.get_or_insert('=');
        i += 1;
    }
    let start = i;
    while chars.get(i).is_some_and(char::is_ascii_digit) {
        i += 1;
    }
    if i > start {
        let digits: String = chars[start..i].iter().collect();
        spec.width = digits.parse().map_err(|_| invalid(text))?;
        if spec.width > MAX_DIGITS {
            return Err(too_many_digits());
        }
    }
    if let Some(',' | '_') = chars.get(i) {
        spec.grouping = true;
        i += 1;
    }
    if chars.get(i) == Some(&'.') {
        i += 1;
        let start = i;
        while chars.get(i).is_some_and(char::is_ascii_digit) {
            i += 1;
        }
        if i == start {
            return Err(Error::value_error("Format specifier missing precision"));
        }
        let digits: String = chars[start..i].iter().collect();
        let precision = digits.parse().map_err(|_| invalid(text))?;
        if precision > MAX_DIGITS {
            return Err(too_many_digits());
        }
        spec.precision = Some(precision);
    }
    if let Some(&c) = chars.get(i) {
        spec.kind = Some(c);
        i += 1;
    }
    if i != chars.len() {
        return Err(invalid(text));
    }
    Ok(spec)
}

/// Apply a format spec to a value, as `format(value, spec)` would.
pub fn format_value(value: &Value, text: &str) -> Result<String> {
    format_within(value, text, usize::MAX)
}

/// [`format_value`] that refuses to pad past `max_len` before allocating.
pub(crate) fn format_within(value: &Value, text: &str, max_len: usize) -> Result<String> {
    if text.is_empty() {
        return Ok(value.to_string());
    }
    let spec = parse_spec(text)?;
    if spec.width > max_len {
        return Err(Error::SequenceLimit(max_len));
    }
    let unknown = |code: char| {
        Error::value_error(format!(
            "Unknown format code '{code}' for object of type '{}'",
            value.type_name()
        ))
    };

    let (sign, body, numeric) = match (value, spec.kind) {
        (Value::Str(s), None | Some('s')) => {
            let body = match spec.precision {
                Some(p) => s.chars().take(p).collect(),
                None => s.clone(),
            };
            (String::new(), body, false)
        }
        (Value::Str(_), Some(code)) => return Err(unknown(code)),
        (Value::Int(_) | Value::Bool(_), None | Some('d')) if spec.precision.is_none() => {
            let i = value.as_int().unwrap_or_default();
            let digits = i.unsigned_abs().to_string();
            let digits = if spec.grouping { group(&digits) } else { digits };
            (sign_prefix(i < 0, spec.sign), digits, true)
        }
        (Value::Int(_) | Value::Bool(_) | Value::Float(_), kind) => {
            let Some(x) = value.as_float() else {
                return Err(unknown(kind.unwrap_or('d')));
            };
            let kind = match kind {
                Some('d') => return Err(unknown('d')),
                Some('s') => return Err(unknown('s')),
                Some(k) => k,
                None if spec.precision.is_some() => 'g',
                None => {
                    let body = Value::Float(x.abs()).to_string();
                    let body = if spec.grouping { group_number(&body) } else { body };
                    return Ok(pad(
                        &sign_prefix(x.is_sign_negative() && x != 0.0, spec.sign),
                        &body,
                        &spec,
                        true,
                    ));
                }
            };
            let body = format_float(x.abs(), kind, spec.precision).ok_or_else(|| unknown(kind))?;
            let body = if spec.grouping { group_number(&body) } else { body };
            (sign_prefix(x.is_sign_negative() && x != 0.0, spec.sign), body, true)
        }
        (_, None) if spec.precision.is_none() && !spec.grouping && spec.sign.is_none() => {
            (String::new(), value.to_string(), false)
        }
        _ => {
            return Err(Error::type_error(format!(
                "unsupported format string passed to {}.__format__",
                value.type_name()
            )));
        }
    };
    Ok(pad(&sign, &body, &spec, numeric))
}

fn sign_prefix(negative: bool, sign: Option<char>) -> String {
    match (negative, sign) {
        (true, _) => "-".to_string(),
        (false, Some('+')) => "+".to_string(),
        (false, Some(' ')) => " ".to_string(),
        _ => String::new(),
    }
}

fn format_float(x: f64, kind: char, precision: Option<usize>) -> Option<String> {
    if !x.is_finite() {
        let word = if x.is_nan() { "nan" } else { "inf" };
        return Some(if kind.is_ascii_uppercase() {
            word.to_uppercase()
        } else {
            word.to_string()
        });
    }
    let p = precision.unwrap_or(6);
    let out = match kind {
        'f' | 'F' => format!("{x:.p$}"),
        '%' => format!("{:.p$}%", x * 100.0),
        'e' | 'E' => {
            let s = python_exponent(&format!("{x:.p$e}"));
            if kind == 'E' { s.to_uppercase() } else { s }
        }
        'g' | 'G' => {
            let p = p.max(1);
            let sci = format!("{x:.prec$e}", prec = p - 1);
            let exp: i64 = sci
                .split_once('e')
                .and_then(|(_, e)| e.parse().ok())
                .unwrap_or(0);
            let s = if x != 0.0 && (exp < -4 || exp >= p as i64) {
                let (mantissa, _) = sci.split_once('e').unwrap_or((sci.as_str(), ""));
                python_exponent(&format!("{}e{exp}", trim_zeros(mantissa)))
            } else {
                let decimals = (p as i64 - 1 - exp).max(0) as usize;
                trim_zeros(&format!("{x:.decimals$}")).to_string()
            };
            if kind == 'G' { s.to_uppercase() } else { s }
        }
        _ => return None,
    };
    Some(out)
}

fn trim_zeros(s: &str) -> &str {
    if s.contains('.') {
        s.trim_end_matches('0').trim_end_matches('.')
    } else {
        s
    }
}

/// Rewrite Rust's `1.5e3` exponent form as Python's `1.5e+03`.
fn python_exponent(s: &str) -> String {
    match s.split_once('e') {
        Some((mantissa, exp)) => {
            let (sign, digits) = match exp.strip_prefix('-') {
                Some(d) => ('-', d),
                None => ('+', exp),
            };
            format!("{mantissa}e{sign}{digits:0>2}")
        }
        None => s.to_string(),
    }
}

fn group(digits: &str) -> String {
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(c);
    }
    out
}

fn group_number(body: &str) -> String {
    let split = body
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(body.len());
    format!("{}{}", group(&body[..split]), &body[split..])
}

fn pad(sign: &str, body: &str, spec: &Spec, numeric: bool) -> String {
    let len = sign.chars().count() + body.chars().count();
    if len >= spec.width {
        return format!("{sign}{body}");
    }
    let fill = spec.fill.unwrap_or(' ');
    let padding = spec.width - len;
    let repeat = |n: usize| std::iter::repeat_n(fill, n).collect::<String>();
    let align = spec.align.unwrap_or(if numeric { '>' } else { '<' });
    match align {
        '<' => format!("{sign}{body}{}", repeat(padding)),
        '^' => format!(
            "{}{sign}{body}{}",
            repeat(padding / 2),
            repeat(padding - padding / 2)
        ),
        '=' => format!("{sign}{}{body}", repeat(padding)),
        _ => format!("{}{sign}{body}", repeat(padding)),
    }
}

/// `template.format(*args, **kwargs)` with positional, indexed and named fields.
///
/// Fails with [`Error::SequenceLimit`] once the output would exceed `max_len`.
pub fn format_template(
    template: &str,
    args: &[Value],
    kwargs: &[(String, Value)],
    max_len: usize,
) -> Result<String> {
    let mut out = String::with_capacity(template.len());
    let mut chars = template.chars().peekable();
    let mut next_index = 0;
    while let Some(c) = chars.next() {
        match c {
            '{' if chars.peek() == Some(&'{') => {
                chars.next();
                out.push('{');
            }
            '{' => {
                let mut field = String::new();
                loop {
                    match chars.next() {
                        Some('}') => break,
                        Some(c) => field.push(c),
                        None => {
                            return Err(Error::value_error(
                                "expected '}' before end of string",
                            ));
                        }
                    }
                }
                let (head, spec) = field.split_once(':').unwrap_or((field.as_str(), ""));
                let (name, conversion) = match head.split_once('!') {
                    Some((name, conv)) => (name, Some(conv)),
                    None => (head, None),
                };
                let value = if name.is_empty() {
                    let index = next_index;
                    next_index += 1;
                    positional(args, index)?
                } else if let Ok(index) = name.parse::<usize>() {
                    positional(args, index)?
                } else {
                    kwargs
                        .iter()
                        .find(|(k, _)| k == name)
                        .map(|(_, v)| v.clone())
                        .ok_or_else(|| {
                            Error::runtime(ErrorKind::KeyError, Value::from(name).repr())
                        })?
                };
                let value = convert(value, conversion)?;
                out.push_str(&format_within(&value, spec, max_len)?);
                if out.len() > max_len {
                    return Err(Error::SequenceLimit(max_len));
                }
            }
            '}' if chars.peek() == Some(&'}') => {
                chars.next();
                out.push('}');
            }
            '}' => {
                return Err(Error::value_error(
                    "Single '}' encountered in format string",
                ));
            }
            c => out.push(c),
        }
    }
    Ok(out)
}

fn positional(args: &[Value], index: usize) -> Result<Value> {
    args.get(index).cloned().ok_or_else(|| {
        Error::runtime(
            ErrorKind::IndexError,
            format!("Replacement index {index} out of range for positional args tuple"),
        )
    })
}

/// Apply an `!r`/`!s` conversion.
pub(crate) fn convert(value: Value, conversion: Option<&str>) -> Result<Value> {
    match conversion {
        None => Ok(value),
        Some("s") => Ok(Value::Str(value.to_string())),
        Some("r" | "a") => Ok(Value::Str(value.repr())),
        Some(other) => Err(Error::value_error(format!(
            "Unknown conversion specifier {other}"
        ))),
    }
}

/// printf-style `template % values`, bounded by `max_len` like [`format_template`].
pub fn percent_format(template: &str, values: &Value, max_len: usize) -> Result<String> {
    let args = match values {
        Value::Tuple(items) => items.as_ref().clone(),
        other => vec![other.clone()],
    };
    let mut args = args.into_iter();
    let mut out = String::with_capacity(template.len());
    let mut chars = template.chars().peekable();
    while let Some(c) = chars.next() {
        if c != '%' {
            out.push(c);
            continue;
        }
        let mut spec = String::new();
        let mut flags = String::new();
        while let Some(&f) = chars.peek().filter(|f| matches!(f, '-' | '+' | ' ' | '0' | '#')) {
            flags.push(f);
            chars.next();
        }
        let mut width = String::new();
        while let Some(&d) = chars.peek().filter(|d| d.is_ascii_digit()) {
            width.push(d);
            chars.next();
        }
        let mut precision = String::new();
        if chars.peek() == Some(&'.') {
            chars.next();
            precision.push('.');
            while let Some(&d) = chars.peek().filter(|d| d.is_ascii_digit()) {
                precision.push(d);
                chars.next();
            }
            if precision == "." {
                precision.push('0');
            }
        }
        let kind = chars
            .next()
            .ok_or_else(|| Error::value_error("incomplete format"))?;
        if kind == '%' {
            out.push('%');
            continue;
        }
        let value = args
            .next()
            .ok_or_else(|| Error::type_error("not enough arguments for format string"))?;
        if flags.contains('-') {
            spec.push('<');
        } else if !flags.contains('0') && !width.is_empty() {
            spec.push('>');
        }
        if flags.contains('+') {
            spec.push('+');
        } else if flags.contains(' ') {
            spec.push(' ');
        }
        if flags.contains('0') && !flags.contains('-') {
            spec.push('0');
        }
        spec.push_str(&width);
        let formatted = match kind {
            's' | 'r' | 'a' => {
                let text = if kind == 's' {
                    value.to_string()
                } else {
                    value.repr()
                };
                spec.push_str(&precision);
                format_within(&Value::Str(text), &spec, max_len)?
            }
            'd' | 'i' | 'u' => {
                let int = match &value {
                    Value::Float(f) if f.is_finite() => Value::Int(f.trunc() as i64),
                    v if v.as_int().is_some() => v.clone(),
                    v => {
                        return Err(Error::type_error(format!(
                            "%{kind} format: a real number is required, not {}",
                            v.type_name()
                        )));
                    }
                };
                spec.push('d');
                format_within(&int, &spec, max_len)?
            }
            'f' | 'F' | 'e' | 'E' | 'g' | 'G' => {
                let number = value.as_float().map(Value::Float).ok_or_else(|| {
                    Error::type_error(format!(
                        "must be real number, not {}",
                        value.type_name()
                    ))
                })?;
                spec.push_str(&precision);
                spec.push(kind);
                format_within(&number, &spec, max_len)?
            }
            other => {
                return Err(Error::value_error(format!(
                    "unsupported format character '{other}'"
                )));
            }
        };
        out.push_str(&formatted);
        if out.len() > max_len {
            return Err(Error::SequenceLimit(max_len));
        }
    }
    if args.next().is_some() {
        return Err(Error::type_error(
            "not all arguments converted during string formatting",
        ));
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fmt(value: impl Into<Value>, spec: &str) -> String {
        format_value(&value.into(), spec).unwrap()
    }

    #[test]
    fn fixed_point() {
        assert_eq!(fmt(71.456, ".1f"), "71.5");
        assert_eq!(fmt(3_i64, ".2f"), "3.00");
        assert_eq!(fmt(-2.4, "+.0f"), "-2");
        assert_eq!(fmt(2.4, "+.1f"), "+2.4");
        assert_eq!(fmt(0.256, ".0%"), "26%");
    }

    #[test]
    fn widths_and_alignment() {
        assert_eq!(fmt("ab", ">5"), "   ab");
        assert_eq!(fmt("ab", "*^6"), "**ab**");
        assert_eq!(fmt(42_i64, "05"), "00042");
        assert_eq!(fmt(-42_i64, "05"), "-0042");
        assert_eq!(fmt(7_i64, "<3"), "7  ");
    }

    #[test]
    fn grouping_and_general() {
        assert_eq!(fmt(1234567_i64, ","), "1,234,567");
        assert_eq!(fmt(1234.5, ",.1f"), "1,234.5");
        assert_eq!(fmt(0.0001234, "g"), "0.0001234");
        assert_eq!(fmt(123456789.0, ".3g"), "1.23e+08");
        assert_eq!(fmt(1500.0, ".2e"), "1.50e+03");
    }

    #[test]
    fn string_precision_truncates() {
        assert_eq!(fmt("Washington", ".4"), "Wash");
    }

    #[test]
    fn template_fields() {
        let args = [Value::from("King County"), Value::Float(47.6062)];
        let kwargs = [("state".to_string(), Value::from("Washington"))];
        assert_eq!(
            format_template("{} in {state} at {1:.1f} {{deg}}", &args, &kwargs, usize::MAX).unwrap(),
            "King County in Washington at 47.6 {deg}"
        );
        assert_eq!(format_template("{0!r}", &args, &[], usize::MAX).unwrap(), "'King County'");
        assert!(format_template("{5}", &args, &[], usize::MAX).is_err());
        assert!(format_template("{missing}", &args, &[], usize::MAX).is_err());
    }

    #[test]
    fn percent_style() {
        let pair = Value::tuple(vec![Value::from("rain"), Value::Float(42.26)]);
        assert_eq!(percent_format("%s: %.1f%%", &pair, usize::MAX).unwrap(), "rain: 42.3%");
        assert_eq!(percent_format("%5d|", &Value::Int(42), usize::MAX).unwrap(), "   42|");
        assert_eq!(percent_format("%-4s|", &Value::from("a"), usize::MAX).unwrap(), "a   |");
        assert!(percent_format("%s %s", &Value::from("a"), usize::MAX).is_err());
        assert!(percent_format("%s", &pair, usize::MAX).is_err());
    }

    #[test]
    fn mismatched_codes_fail() {
        assert!(format_value(&Value::from("x"), "d").is_err());
        assert!(format_value(&Value::Float(1.0), "d").is_err());
        assert!(format_value(&Value::Int(1), ".2q").is_err());
    }

    #[test]
    fn oversized_width_and_precision_are_value_errors() {
        let too_many = Error::value_error("Too many decimal digits in format string");
        assert_eq!(format_value(&Value::Float(1.5), ".70000f"), Err(too_many.clone()));
        assert_eq!(format_value(&Value::Float(1.5), ".99999999999e"), Err(too_many.clone()));
        assert_eq!(format_value(&Value::from("a"), ">70000"), Err(too_many.clone()));
        assert_eq!(
            percent_format("%.70000f", &Value::Float(1.5), usize::MAX),
            Err(too_many.clone())
        );
        assert_eq!(percent_format("%70000d", &Value::Int(1), usize::MAX), Err(too_many));
        assert_eq!(fmt(1.5, ".3f"), "1.500");
    }

    #[test]
    fn padding_past_the_limit_fails_before_allocating() {
        assert_eq!(
            format_within(&Value::Int(1), ">60000", 1000),
            Err(Error::SequenceLimit(1000))
        );
        assert_eq!(format_within(&Value::Int(1), ">5", 1000).unwrap(), "    1");
        assert_eq!(
            percent_format("%60000s", &Value::from("x"), 1000),
            Err(Error::SequenceLimit(1000))
        );
        assert_eq!(
            format_template("{:>600}{:>600}", &[Value::Int(1), Value::Int(2)], &[], 1000),
            Err(Error::SequenceLimit(1000))
        );
        assert_eq!(
            format_template("{:>600}", &[Value::Int(1)], &[], 1000).unwrap().len(),
            600
        );
    }
}
