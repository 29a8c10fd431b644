//! Converter registry and built-in conversion rules.
//!
//! A conversion rule turns one [`RawValue`] into a typed [`Value`]. Rules
//! are registered per (target type, optional pattern) and resolved with
//! the exact pair first, then the type's pattern-less default.
//!
//! Built-ins cover text, integers, floats, booleans, UUIDs and the
//! pattern-driven temporal types. Temporal patterns use the familiar
//! letter form (`yyyy-MM-dd`, `dd/MM/yyyy HH:mm`, `HH:mm:ss.SSS`,
//! `'T'` literals); a pattern containing `%` is read as a `chrono`
//! strftime string instead. Temporal parsing is strict: the input must
//! re-format to itself under the same pattern.
//!
//! ```rust
//! use archimedes_binding::{ConverterRegistry, FieldDescriptor, RawValue, ScalarType, Value};
//!
//! let registry = ConverterRegistry::with_builtins();
//! let field = FieldDescriptor::date("dob").pattern("yyyy-MM-dd");
//! let rule = registry.resolve(&ScalarType::Date, Some("yyyy-MM-dd")).unwrap();
//!
//! let value = rule(&RawValue::from_text("dob", "2026-01-20"), &field).unwrap();
//! assert_eq!(value.as_date().unwrap().to_string(), "2026-01-20");
//! assert!(rule(&RawValue::from_text("dob", "2026-1-20"), &field).is_err());
//! ```

use std::collections::HashMap;
use std::fmt::{self, Write as _};
use std::sync::Arc;

use chrono::format::{Item, StrftimeItems};
use chrono::{NaiveDate, NaiveDateTime, NaiveTime};

use crate::descriptor::{FieldDescriptor, ScalarType};
use crate::error::ConversionError;
use crate::extract::RawValue;
use crate::value::Value;

/// A conversion function.
pub type ConversionRule =
    Arc<dyn Fn(&RawValue, &FieldDescriptor) -> Result<Value, ConversionError> + Send + Sync>;

type RuleKey = (ScalarType, Option<String>);

/// Registry of conversion rules.
///
/// Populated during setup and read-only afterwards; share it behind an
/// [`Arc`] (the [`Binder`](crate::Binder) does this).
#[derive(Clone, Default)]
pub struct ConverterRegistry {
    rules: HashMap<RuleKey, ConversionRule>,
}

impl ConverterRegistry {
    /// An empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry with the built-in rules.
    #[must_use]
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry
            .register(ScalarType::String, None, convert_string)
            .register(ScalarType::Integer, None, convert_integer)
            .register(ScalarType::Float, None, convert_float)
            .register(ScalarType::Boolean, None, convert_boolean)
            .register(ScalarType::Uuid, None, convert_uuid)
            .register(ScalarType::Date, None, convert_temporal)
            .register(ScalarType::DateTime, None, convert_temporal)
            .register(ScalarType::Time, None, convert_temporal);
        registry
    }

    /// Registers a rule for a target type, optionally for one pattern only.
    ///
    /// A later registration for the same key replaces the earlier one.
    pub fn register<F>(&mut self, scalar: ScalarType, pattern: Option<&str>, rule: F) -> &mut Self
    where
        F: Fn(&RawValue, &FieldDescriptor) -> Result<Value, ConversionError>
            + Send
            + Sync
            + 'static,
    {
        self.rules
            .insert((scalar, pattern.map(str::to_string)), Arc::new(rule));
        self
    }

    /// Resolves the rule for a type and pattern.
    ///
    /// Tries the exact (type, pattern) pair, then the type's default.
    #[must_use]
    pub fn resolve(&self, scalar: &ScalarType, pattern: Option<&str>) -> Option<ConversionRule> {
        pattern
            .and_then(|p| self.rules.get(&(scalar.clone(), Some(p.to_string()))))
            .or_else(|| self.rules.get(&(scalar.clone(), None)))
            .cloned()
    }

    /// Whether a rule is registered for exactly this (type, pattern) pair.
    #[must_use]
    pub fn has_exact(&self, scalar: &ScalarType, pattern: Option<&str>) -> bool {
        self.rules
            .contains_key(&(scalar.clone(), pattern.map(str::to_string)))
    }

    /// Number of registered rules.
    #[must_use]
    pub fn len(&self) -> usize {
        self.rules.len()
    }

    /// Whether no rules are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

impl fmt::Debug for ConverterRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut keys: Vec<String> = self
            .rules
            .keys()
            .map(|(scalar, pattern)| match pattern {
                Some(p) => format!("{scalar}[{p}]"),
                None => scalar.to_string(),
            })
            .collect();
        keys.sort();
        f.debug_struct("ConverterRegistry")
            .field("rules", &keys)
            .finish()
    }
}

/// Checks that the built-in rule for `scalar` can use `pattern`.
///
/// Temporal patterns must compile, apply to the type, and fully determine
/// a value. Number patterns may only use `#`, `0`, `,`, `.` and a
/// trailing `%` (floats only). Other types accept any pattern.
///
/// # Errors
///
/// Returns a description of why the pattern was rejected.
pub fn check_pattern(scalar: &ScalarType, pattern: &str) -> Result<(), String> {
    match scalar {
        ScalarType::Date | ScalarType::DateTime | ScalarType::Time => {
            let format = compile_temporal_pattern(pattern)?;
            check_temporal_format(scalar, &format)
        }
        ScalarType::Integer => {
            let number = NumberPattern::parse(pattern)?;
            if number.percent {
                return Err("percent patterns apply to floats only".to_string());
            }
            Ok(())
        }
        ScalarType::Float => NumberPattern::parse(pattern).map(|_| ()),
        _ => Ok(()),
    }
}

/// Translates a letter pattern into a `chrono` format string.
///
/// Patterns that already contain `%` are returned unchanged.
///
/// # Errors
///
/// Returns an error for unsupported letters or malformed format items.
pub fn compile_temporal_pattern(pattern: &str) -> Result<String, String> {
    let format = if pattern.contains('%') {
        pattern.to_string()
    } else {
        translate_letters(pattern)?
    };

    if StrftimeItems::new(&format).any(|item| matches!(item, Item::Error)) {
        return Err(format!("'{format}' is not a valid format"));
    }
    Ok(format)
}

fn translate_letters(pattern: &str) -> Result<String, String> {
    let chars: Vec<char> = pattern.chars().collect();
    let mut out = String::with_capacity(pattern.len() * 2);
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];

        if c == '\'' {
            // '' is a literal quote; otherwise copy up to the closing quote
            if chars.get(i + 1) == Some(&'\'') {
                out.push('\'');
                i += 2;
                continue;
            }
            let end = chars[i + 1..]
                .iter()
                .position(|&ch| ch == '\'')
                .ok_or_else(|| "unterminated quoted literal".to_string())?;
            out.extend(chars[i + 1..i + 1 + end].iter());
            i += end + 2;
            continue;
        }

        if !c.is_ascii_alphabetic() {
            out.push(c);
            i += 1;
            continue;
        }

        let run = chars[i..].iter().take_while(|&&ch| ch == c).count();
        let item = match (c, run) {
            ('y', 2) => "%y",
            ('y', _) => "%Y",
            ('M', 1) => "%-m",
            ('M', 2) => "%m",
            ('M', 3) => "%b",
            ('M', _) => "%B",
            ('d', 1) => "%-d",
            ('d', 2) => "%d",
            ('H', 1) => "%-H",
            ('H', 2) => "%H",
            ('h', 1) => "%-I",
            ('h', 2) => "%I",
            ('m', 1) => "%-M",
            ('m', 2) => "%M",
            ('s', 1) => "%-S",
            ('s', 2) => "%S",
            ('S', 3) => "%3f",
            ('S', 6) => "%6f",
            ('S', 9) => "%9f",
            ('a', 1) => "%p",
            ('E', 3) => "%a",
            ('E', 4) => "%A",
            _ => {
                return Err(format!(
                    "unsupported pattern letter '{c}' (repeated {run} times)"
                ))
            }
        };
        out.push_str(item);
        i += run;
    }

    Ok(out)
}

fn check_temporal_format(scalar: &ScalarType, format: &str) -> Result<(), String> {
    let sample_date = NaiveDate::from_ymd_opt(2001, 2, 3).unwrap_or_default();
    let sample_time = NaiveTime::from_hms_milli_opt(4, 5, 6, 789).unwrap_or_default();

    let mut rendered = String::new();
    let written = match scalar {
        ScalarType::Date => write!(rendered, "{}", sample_date.format(format)),
        ScalarType::Time => write!(rendered, "{}", sample_time.format(format)),
        _ => write!(
            rendered,
            "{}",
            NaiveDateTime::new(sample_date, sample_time).format(format)
        ),
    };
    if written.is_err() {
        return Err(format!("pattern contains fields that do not apply to {scalar}"));
    }

    let parsed = match scalar {
        ScalarType::Date => NaiveDate::parse_from_str(&rendered, format).map(|_| ()),
        ScalarType::Time => NaiveTime::parse_from_str(&rendered, format).map(|_| ()),
        _ => NaiveDateTime::parse_from_str(&rendered, format).map(|_| ()),
    };
    parsed.map_err(|e| format!("pattern does not determine a {scalar}: {e}"))
}

/// A parsed number pattern.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
struct NumberPattern {
    grouping: bool,
    percent: bool,
}

impl NumberPattern {
    fn parse(pattern: &str) -> Result<Self, String> {
        let (body, percent) = match pattern.strip_suffix('%') {
            Some(body) => (body, true),
            None => (pattern, false),
        };
        if body.is_empty() || !body.chars().all(|c| matches!(c, '#' | '0' | ',' | '.')) {
            return Err(format!("unsupported number pattern '{pattern}'"));
        }
        Ok(Self {
            grouping: body.contains(','),
            percent,
        })
    }

    fn from_field(field: &FieldDescriptor) -> Result<Self, ConversionError> {
        field
            .conversion_pattern()
            .map_or(Ok(Self::default()), Self::parse)
            .map_err(ConversionError::new)
    }

    /// Strips grouping separators and the percent sign.
    fn normalize<'a>(&self, text: &'a str) -> Option<std::borrow::Cow<'a, str>> {
        let text = if self.percent {
            text.strip_suffix('%')?.trim_end()
        } else {
            text
        };
        if self.grouping && text.contains(',') {
            if text.starts_with(',') || text.ends_with(',') || text.contains(",,") {
                return None;
            }
            Some(std::borrow::Cow::Owned(text.replace(',', "")))
        } else {
            Some(std::borrow::Cow::Borrowed(text))
        }
    }
}

fn text_of<'a>(raw: &'a RawValue, field: &FieldDescriptor) -> Result<&'a str, ConversionError> {
    raw.text().ok_or_else(|| {
        ConversionError::new(format!("field '{}' did not receive a text value", field.name()))
    })
}

fn convert_string(raw: &RawValue, field: &FieldDescriptor) -> Result<Value, ConversionError> {
    text_of(raw, field).map(|s| Value::Str(s.to_string()))
}

fn convert_integer(raw: &RawValue, field: &FieldDescriptor) -> Result<Value, ConversionError> {
    let text = text_of(raw, field)?.trim();
    let pattern = NumberPattern::from_field(field)?;
    pattern
        .normalize(text)
        .and_then(|t| t.parse::<i64>().ok())
        .map(Value::Int)
        .ok_or_else(|| ConversionError::invalid(text, &ScalarType::Integer))
}

fn convert_float(raw: &RawValue, field: &FieldDescriptor) -> Result<Value, ConversionError> {
    let text = text_of(raw, field)?.trim();
    let pattern = NumberPattern::from_field(field)?;
    let value = pattern
        .normalize(text)
        .and_then(|t| t.parse::<f64>().ok())
        .filter(|n| n.is_finite())
        .ok_or_else(|| ConversionError::invalid(text, &ScalarType::Float))?;

    Ok(Value::Float(if pattern.percent { value / 100.0 } else { value }))
}

fn convert_boolean(raw: &RawValue, field: &FieldDescriptor) -> Result<Value, ConversionError> {
    let text = text_of(raw, field)?.trim();
    if text.eq_ignore_ascii_case("true") || text == "1" {
        Ok(Value::Bool(true))
    } else if text.eq_ignore_ascii_case("false") || text == "0" {
        Ok(Value::Bool(false))
    } else {
        Err(ConversionError::invalid(text, &ScalarType::Boolean))
    }
}

fn convert_uuid(raw: &RawValue, field: &FieldDescriptor) -> Result<Value, ConversionError> {
    let text = text_of(raw, field)?.trim();
    uuid::Uuid::parse_str(text)
        .map(Value::Uuid)
        .map_err(|_| ConversionError::invalid(text, &ScalarType::Uuid))
}

fn convert_temporal(raw: &RawValue, field: &FieldDescriptor) -> Result<Value, ConversionError> {
    let text = text_of(raw, field)?.trim();
    let scalar = field
        .field_type()
        .scalar()
        .cloned()
        .unwrap_or(ScalarType::Date);
    let pattern = field.conversion_pattern().ok_or_else(|| {
        ConversionError::new(format!("field '{}' has no {scalar} pattern", field.name()))
    })?;
    let format = compile_temporal_pattern(pattern).map_err(ConversionError::new)?;

    let mismatch = || ConversionError::new(format!("'{text}' does not match pattern '{pattern}'"));

    let (value, rendered) = match scalar {
        ScalarType::Time => {
            let t = NaiveTime::parse_from_str(text, &format).map_err(|_| mismatch())?;
            (Value::Time(t), render(t.format(&format)))
        }
        ScalarType::DateTime => {
            let dt = NaiveDateTime::parse_from_str(text, &format).map_err(|_| mismatch())?;
            (Value::DateTime(dt), render(dt.format(&format)))
        }
        _ => {
            let d = NaiveDate::parse_from_str(text, &format).map_err(|_| mismatch())?;
            (Value::Date(d), render(d.format(&format)))
        }
    };

    // lenient parses (unpadded digits, other letter case) are rejected
    if rendered.as_deref() != Some(text) {
        return Err(mismatch());
    }
    Ok(value)
}

fn render(display: impl fmt::Display) -> Option<String> {
    let mut out = String::new();
    write!(out, "{display}").ok().map(|()| out)
}
