//! Turns a human-typed line into request values.
//!
//! Grammar, loosely: tokens are separated by whitespace or any of `,:;`.
//! `"..."`/`'...'` are strings with C-style escapes, `|cafe` is a byte blob,
//! `true`, `false`, `nan` and `inf` are what they look like, numbers are
//! decimal or `0x` hex, and anything else is a bare-word string. `[ ]` and
//! `{ }` nest.

use std::iter::Peekable;
use std::str::CharIndices;

use bytes::Bytes;
use sipc_codec::{Map, Value, MAX_DEPTH};

use crate::exit::{CliError, CliResult, USAGE};

enum Frame {
    Array(Vec<Value>),
    /// Keys and values interleaved; paired up when the map closes.
    Map(Vec<Value>),
}

pub fn parse_line(line: &str) -> CliResult<Vec<Value>> {
    let mut chars = line.char_indices().peekable();
    let mut top: Vec<Value> = Vec::new();
    let mut stack: Vec<(usize, Frame)> = Vec::new();

    while let Some(&(offset, c)) = chars.peek() {
        if is_separator(c) {
            chars.next();
            continue;
        }

        let value = match c {
            '[' | '{' => {
                chars.next();
                if stack.len() >= MAX_DEPTH {
                    return Err(usage(offset, format!("nesting exceeds {MAX_DEPTH} levels")));
                }
                let frame = if c == '[' {
                    Frame::Array(Vec::new())
                } else {
                    Frame::Map(Vec::new())
                };
                stack.push((offset, frame));
                continue;
            }
            ']' | '}' => {
                chars.next();
                close(&mut stack, c, offset)?
            }
            '"' | '\'' => {
                chars.next();
                quoted(&mut chars, c, offset)?
            }
            _ => word(take_word(&mut chars, line)),
        };

        match stack.last_mut() {
            Some((_, Frame::Array(items))) | Some((_, Frame::Map(items))) => items.push(value),
            None => top.push(value),
        }
    }

    if let Some((offset, frame)) = stack.last() {
        let open = match frame {
            Frame::Array(_) => '[',
            Frame::Map(_) => '{',
        };
        return Err(usage(*offset, format!("unclosed '{open}'")));
    }

    Ok(top)
}

fn is_separator(c: char) -> bool {
    c.is_whitespace() || matches!(c, ',' | ':' | ';')
}

fn is_delimiter(c: char) -> bool {
    is_separator(c) || matches!(c, '[' | ']' | '{' | '}' | '"' | '\'')
}

fn usage(offset: usize, message: impl std::fmt::Display) -> CliError {
    CliError::new(USAGE, format!("column {}: {message}", offset + 1))
}

fn close(stack: &mut Vec<(usize, Frame)>, c: char, offset: usize) -> CliResult<Value> {
    match (stack.pop(), c) {
        (Some((_, Frame::Array(items))), ']') => Ok(Value::Array(items)),
        (Some((_, Frame::Map(items))), '}') => {
            if items.len() % 2 != 0 {
                return Err(usage(offset, "map has a key without a value"));
            }
            let mut map = Map::with_capacity(items.len() / 2);
            let mut items = items.into_iter();
            while let (Some(key), Some(value)) = (items.next(), items.next()) {
                if map.contains_key(&key) {
                    return Err(usage(offset, format!("duplicate map key {key}")));
                }
                map.insert(key, value);
            }
            Ok(Value::Map(map))
        }
        (Some(_), _) => Err(usage(offset, format!("mismatched '{c}'"))),
        (None, _) => Err(usage(offset, format!("unexpected '{c}'"))),
    }
}

fn take_word<'a>(chars: &mut Peekable<CharIndices<'a>>, line: &'a str) -> &'a str {
    let start = chars.peek().map_or(line.len(), |&(i, _)| i);
    let mut end = line.len();
    while let Some(&(i, c)) = chars.peek() {
        if is_delimiter(c) {
            end = i;
            break;
        }
        chars.next();
    }
    &line[start..end]
}

/// A quoted string. Escapes may produce bytes that are not UTF-8, in which
/// case the token becomes a byte blob.
fn quoted(chars: &mut Peekable<CharIndices<'_>>, quote: char, start: usize) -> CliResult<Value> {
    let mut out: Vec<u8> = Vec::new();
    let mut utf8 = [0u8; 4];

    loop {
        let Some((offset, c)) = chars.next() else {
            return Err(usage(start, "unterminated string"));
        };
        if c == quote {
            break;
        }
        if c != '\\' {
            out.extend_from_slice(c.encode_utf8(&mut utf8).as_bytes());
            continue;
        }
        let Some((_, escaped)) = chars.next() else {
            return Err(usage(offset, "unterminated escape"));
        };
        match escaped {
            'n' => out.push(b'\n'),
            't' => out.push(b'\t'),
            'r' => out.push(b'\r'),
            '0' => out.push(0),
            '\\' | '"' | '\'' => out.push(escaped as u8),
            'x' => {
                let hi = chars.next().and_then(|(_, c)| c.to_digit(16));
                let lo = chars.next().and_then(|(_, c)| c.to_digit(16));
                match (hi, lo) {
                    (Some(hi), Some(lo)) => out.push((hi * 16 + lo) as u8),
                    _ => return Err(usage(offset, "\\x needs two hex digits")),
                }
            }
            'u' => {
                let ch = unicode_escape(chars).ok_or_else(|| usage(offset, "bad \\u{...} escape"))?;
                out.extend_from_slice(ch.encode_utf8(&mut utf8).as_bytes());
            }
            other => return Err(usage(offset, format!("unknown escape '\\{other}'"))),
        }
    }

    Ok(match String::from_utf8(out) {
        Ok(s) => Value::String(s),
        Err(err) => Value::Bytes(Bytes::from(err.into_bytes())),
    })
}

fn unicode_escape(chars: &mut Peekable<CharIndices<'_>>) -> Option<char> {
    if chars.next()?.1 != '{' {
        return None;
    }
    let mut code = 0u32;
    let mut digits = 0;
    loop {
        let (_, c) = chars.next()?;
        if c == '}' {
            break;
        }
        code = code.checked_mul(16)?.checked_add(c.to_digit(16)?)?;
        digits += 1;
    }
    if digits == 0 {
        return None;
    }
    char::from_u32(code)
}

fn word(text: &str) -> Value {
    if let Some(hex) = text.strip_prefix('|') {
        if let Some(bytes) = decode_hex(hex) {
            return Value::Bytes(Bytes::from(bytes));
        }
    }

    match text.to_ascii_lowercase().as_str() {
        "true" => return Value::Bool(true),
        "false" => return Value::Bool(false),
        "nan" => return Value::Float(f64::NAN),
        "inf" | "+inf" => return Value::Float(f64::INFINITY),
        "-inf" => return Value::Float(f64::NEG_INFINITY),
        _ => {}
    }

    number(text).unwrap_or_else(|| Value::String(text.to_string()))
}

fn number(text: &str) -> Option<Value> {
    let (negative, digits) = match text.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, text.strip_prefix('+').unwrap_or(text)),
    };

    if let Some(hex) = digits
        .strip_prefix("0x")
        .or_else(|| digits.strip_prefix("0X"))
    {
        let magnitude = u64::from_str_radix(hex, 16).ok()?;
        if !negative {
            return Some(Value::Uint(magnitude));
        }
        return i64::try_from(-i128::from(magnitude)).ok().map(Value::Int);
    }

    if !digits.starts_with(|c: char| c.is_ascii_digit() || c == '.') {
        return None;
    }
    if !negative {
        if let Ok(v) = digits.parse::<u64>() {
            return Some(Value::Uint(v));
        }
    }
    if let Ok(v) = text.parse::<i64>() {
        return Some(Value::Int(v));
    }
    text.parse::<f64>().ok().map(Value::Float)
}

fn decode_hex(hex: &str) -> Option<Vec<u8>> {
    if hex.len() % 2 != 0 {
        return None;
    }
    hex.as_bytes()
        .chunks(2)
        .map(|pair| {
            let hi = char::from(pair[0]).to_digit(16)?;
            let lo = char::from(pair[1]).to_digit(16)?;
            Some((hi * 16 + lo) as u8)
        })
        .collect()
}
