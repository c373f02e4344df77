//! Value decoders for archive fields
//!
//! MATLAB-style archives store text as arrays of character codes, often
//! with singleton dimensions (`[[82], [111]]`). Numeric datasets may also
//! carry singleton dimensions. These helpers flatten both.

use serde_json::Value;

use crate::store::{LogLevel, TextLogMessage};

/// Flatten a numeric value (number or arbitrarily nested arrays of numbers).
/// `null` stands for NaN, which JSON cannot spell.
pub fn decode_numbers(value: &Value) -> Result<Vec<f64>, String> {
    let mut out = Vec::new();
    flatten_numbers(value, &mut out)?;
    Ok(out)
}

fn flatten_numbers(value: &Value, out: &mut Vec<f64>) -> Result<(), String> {
    match value {
        Value::Number(n) => {
            out.push(n.as_f64().ok_or_else(|| format!("not representable as f64: {}", n))?);
            Ok(())
        }
        Value::Null => {
            out.push(f64::NAN);
            Ok(())
        }
        Value::Array(items) => items.iter().try_for_each(|item| flatten_numbers(item, out)),
        other => Err(format!("expected a number, found {}", kind(other))),
    }
}

/// Decode a sample matrix. Each top-level element is one row; a bare number
/// is a one-column row.
pub fn decode_rows(value: &Value) -> Result<Vec<Vec<f64>>, String> {
    match value {
        Value::Array(rows) => rows.iter().map(decode_numbers).collect(),
        other => Err(format!("expected an array of rows, found {}", kind(other))),
    }
}

/// Decode a text field: a string, a one-element list of strings, or an
/// array of character codes
pub fn decode_text(value: &Value) -> Result<String, String> {
    match value {
        Value::String(s) => Ok(s.clone()),
        Value::Array(items) if items.len() == 1 && items[0].is_string() => decode_text(&items[0]),
        Value::Array(_) => decode_numbers(value)?.into_iter().map(decode_char).collect(),
        other => Err(format!("expected text, found {}", kind(other))),
    }
}

/// A character code must be an integer naming a Unicode scalar value
fn decode_char(code: f64) -> Result<char, String> {
    let invalid = || format!("invalid character code {}", code);
    if code.fract() != 0.0 || !(0.0..=u32::MAX as f64).contains(&code) {
        return Err(invalid());
    }
    char::from_u32(code as u32).ok_or_else(invalid)
}

/// Decode a list of text fields (e.g. joint names)
pub fn decode_text_list(value: &Value) -> Result<Vec<String>, String> {
    match value {
        Value::Array(items) => items.iter().map(decode_text).collect(),
        other => Err(format!("expected a list of text, found {}", kind(other))),
    }
}

/// Decode text log messages.
///
/// Two encodings exist: an array with one `{level, text}` struct per
/// timestamp, or a single struct whose `level` and `text` fields are
/// parallel arrays with one entry per message. The encoding is detected by
/// comparing lengths with the number of timestamps.
pub fn decode_messages(value: &Value, timestamps: usize) -> Result<Vec<TextLogMessage>, String> {
    match value {
        Value::Array(items) if items.len() == timestamps => items.iter().map(decode_message).collect(),
        Value::Array(items) => Err(format!(
            "{} messages for {} timestamps",
            items.len(),
            timestamps
        )),
        Value::Object(fields) => {
            let levels = fields.get("level").ok_or("missing 'level' field")?;
            let texts = fields.get("text").ok_or("missing 'text' field")?;
            if timestamps == 1 && !is_text_array(levels) {
                return Ok(vec![decode_message(value)?]);
            }
            let levels = decode_text_list(levels)?;
            let texts = decode_text_list(texts)?;
            if levels.len() != timestamps || texts.len() != timestamps {
                return Err(format!(
                    "{} levels and {} texts for {} timestamps",
                    levels.len(),
                    texts.len(),
                    timestamps
                ));
            }
            Ok(levels
                .iter()
                .zip(texts)
                .map(|(level, text)| TextLogMessage::new(LogLevel::parse(level), text))
                .collect())
        }
        other => Err(format!("expected log messages, found {}", kind(other))),
    }
}

fn decode_message(value: &Value) -> Result<TextLogMessage, String> {
    let level = value.get("level").ok_or("missing 'level' field")?;
    let text = value.get("text").ok_or("missing 'text' field")?;
    Ok(TextLogMessage::new(
        LogLevel::parse(&decode_text(level)?),
        decode_text(text)?,
    ))
}

/// An array whose entries are themselves text values (not a single char array)
fn is_text_array(value: &Value) -> bool {
    match value {
        Value::Array(items) => items.iter().all(|item| item.is_string() || item.is_array()),
        _ => false,
    }
}

fn kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
