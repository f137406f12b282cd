use bytes::Bytes;

use crate::entry::{Entry, EntryType};
use crate::error::{CodecError, Result};
use crate::hex::{decode_hex, HexLiteral};
use crate::number::{build_f64, fits_f64, integral_magnitude, DIRECT_FORM_LIMIT};
use crate::value::{Map, Value};

/// Maximum array/map nesting accepted by the parser.
pub const MAX_DEPTH: usize = 16;

/// Forward-only reader over one message buffer.
///
/// The parser only accepts canonical encodings: every value has exactly one
/// accepted spelling, so re-encoding a parsed message reproduces its bytes.
/// A parser is bound to a single buffer and is spent once every entry has
/// been read.
#[derive(Debug, Clone)]
pub struct Parser<'a> {
    buf: &'a [u8],
    pos: usize,
    failed: bool,
}

impl<'a> Parser<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Self {
            buf,
            pos: 0,
            failed: false,
        }
    }

    /// Byte offset of the cursor.
    pub fn position(&self) -> usize {
        self.pos
    }

    /// Number of unconsumed bytes.
    pub fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    /// The unconsumed tail of the buffer.
    pub fn rest(&self) -> &'a [u8] {
        &self.buf[self.pos..]
    }

    pub fn is_finished(&self) -> bool {
        self.pos >= self.buf.len()
    }

    /// Peek at the type of the next entry. `None` is end of message.
    pub fn next_entry_type(&self) -> Result<Option<EntryType>> {
        match self.buf.get(self.pos) {
            None => Ok(None),
            Some(&tag) => EntryType::from_tag(tag)
                .map(Some)
                .ok_or(CodecError::InvalidEncoding { offset: self.pos }),
        }
    }

    /// Consume one entry: its type tag, its values and the closing newline.
    pub fn parse_entry(&mut self) -> Result<Vec<Value>> {
        self.next_entry_type()?
            .ok_or(CodecError::InvalidEncoding { offset: self.pos })?;
        self.pos += 1;

        let mut values = Vec::new();
        while let Some(value) = self.parse_value(0)? {
            values.push(value);
        }
        Ok(values)
    }

    /// Consume the next entry, or return `None` at end of message.
    pub fn next_entry(&mut self) -> Result<Option<Entry>> {
        let Some(kind) = self.next_entry_type()? else {
            return Ok(None);
        };
        let values = self.parse_entry()?;
        Ok(Some(Entry { kind, values }))
    }

    fn invalid(&self, offset: usize) -> CodecError {
        CodecError::InvalidEncoding { offset }
    }

    fn peek(&self) -> Option<u8> {
        self.buf.get(self.pos).copied()
    }

    fn next_byte(&mut self) -> Result<u8> {
        let b = self.peek().ok_or(self.invalid(self.pos))?;
        self.pos += 1;
        Ok(b)
    }

    fn eat(&mut self, literal: &[u8]) -> bool {
        if self.rest().starts_with(literal) {
            self.pos += literal.len();
            true
        } else {
            false
        }
    }

    fn hex(&mut self) -> Result<HexLiteral> {
        let lit = decode_hex(self.rest()).ok_or(self.invalid(self.pos))?;
        self.pos += lit.consumed;
        Ok(lit)
    }

    /// Read one space-prefixed value. `None` means the entry's newline was
    /// consumed instead. `depth` counts enclosing containers.
    fn parse_value(&mut self, depth: usize) -> Result<Option<Value>> {
        match self.next_byte()? {
            b'\n' => return Ok(None),
            b' ' => {}
            _ => return Err(self.invalid(self.pos - 1)),
        }

        let start = self.pos;
        let value = match self.peek() {
            Some(b'T') => {
                self.pos += 1;
                Value::Bool(true)
            }
            Some(b'F') => {
                self.pos += 1;
                Value::Bool(false)
            }
            Some(b'[') => {
                self.pos += 1;
                self.parse_array(enter(depth, start)?)?
            }
            Some(b'{') => {
                self.pos += 1;
                self.parse_map(enter(depth, start)?)?
            }
            Some(b'n') if self.eat(b"nan") => Value::Float(f64::NAN),
            Some(b'i') if self.eat(b"inf") => Value::Float(f64::INFINITY),
            Some(b'-') => {
                self.pos += 1;
                if self.eat(b"inf") {
                    Value::Float(f64::NEG_INFINITY)
                } else {
                    self.parse_number(true, start)?
                }
            }
            _ => self.parse_number(false, start)?,
        };
        Ok(Some(value))
    }

    fn parse_array(&mut self, depth: usize) -> Result<Value> {
        let mut items = Vec::new();
        loop {
            if self.eat(b" ]") {
                return Ok(Value::Array(items));
            }
            match self.parse_value(depth)? {
                Some(item) => items.push(item),
                None => return Err(self.invalid(self.pos - 1)),
            }
        }
    }

    fn parse_map(&mut self, depth: usize) -> Result<Value> {
        let mut map = Map::new();
        loop {
            if self.eat(b" }") {
                return Ok(Value::Map(map));
            }
            let key_offset = self.pos + 1;
            let key = self
                .parse_value(depth)?
                .ok_or(self.invalid(self.pos.saturating_sub(1)))?;
            let value = self
                .parse_value(depth)?
                .ok_or(self.invalid(self.pos.saturating_sub(1)))?;
            if map.contains_key(&key) {
                return Err(CodecError::DuplicateKey { offset: key_offset });
            }
            map.push_unchecked(key, value);
        }
    }

    /// Numbers, strings and byte blobs all start with a hex literal.
    fn parse_number(&mut self, negative: bool, start: usize) -> Result<Value> {
        let lit = self.hex()?;
        match self.peek() {
            Some(b'p') => {
                self.pos += 1;
                self.parse_exponent_form(negative, lit, start)
            }
            Some(separator @ (b':' | b'|')) if !negative => {
                self.pos += 1;
                self.parse_blob(separator, lit, start)
            }
            _ => self.direct_form(negative, lit, start),
        }
    }

    /// A bare magnitude is only canonical for zero or when its low byte is
    /// non-zero; anything else must have been written in exponent form.
    fn direct_form(&self, negative: bool, lit: HexLiteral, start: usize) -> Result<Value> {
        let magnitude = lit.value;
        if lit.overflow_bits > 0 {
            return Err(self.invalid(start));
        }
        if magnitude == 0 {
            return if negative {
                Err(self.invalid(start))
            } else {
                Ok(Value::Uint(0))
            };
        }
        if magnitude & 0xff == 0 {
            return Err(self.invalid(start));
        }
        if !negative {
            return Ok(Value::Uint(magnitude));
        }
        if magnitude <= 1 << 63 {
            Ok(Value::Int((magnitude as i64).wrapping_neg()))
        } else {
            Err(self.invalid(start))
        }
    }

    /// `<odd significand>p[-]<exponent>`, where the exponent lies outside
    /// the direct-form range.
    fn parse_exponent_form(&mut self, negative: bool, lit: HexLiteral, start: usize) -> Result<Value> {
        let significand = lit.value;
        if lit.overflow_bits > 0 || significand & 1 == 0 {
            return Err(self.invalid(start));
        }

        let negative_exponent = self.eat(b"-");
        let exp = self.hex()?;
        let exponent = if exp.overflow_bits > 0 || exp.value > i32::MAX as u64 {
            if negative_exponent {
                i32::MIN
            } else {
                i32::MAX
            }
        } else if negative_exponent {
            -(exp.value as i32)
        } else {
            exp.value as i32
        };

        if (0..DIRECT_FORM_LIMIT).contains(&exponent) {
            return Err(self.invalid(start));
        }

        if let Some(magnitude) = integral_magnitude(significand, exponent) {
            if !negative {
                return Ok(Value::Uint(magnitude));
            }
            if magnitude <= 1 << 63 {
                return Ok(Value::Int((magnitude as i64).wrapping_neg()));
            }
        }

        if !fits_f64(significand) {
            return Err(self.invalid(start));
        }
        Ok(Value::Float(build_f64(negative, significand, exponent)))
    }

    /// Length-prefixed data. At least one byte must remain after the data
    /// for the entry terminator, so an exact fit counts as truncated.
    fn parse_blob(&mut self, separator: u8, len: HexLiteral, start: usize) -> Result<Value> {
        let available = self.remaining();
        if len.overflow_bits > 0 || len.value >= available as u64 {
            return Err(CodecError::InsufficientData {
                needed: len.value.saturating_add(1),
                available,
            });
        }

        let data = &self.buf[self.pos..self.pos + len.value as usize];
        self.pos += data.len();
        if separator == b':' {
            let text = std::str::from_utf8(data).map_err(|_| self.invalid(start))?;
            Ok(Value::String(text.to_owned()))
        } else {
            Ok(Value::Bytes(Bytes::copy_from_slice(data)))
        }
    }
}

fn enter(depth: usize, offset: usize) -> Result<usize> {
    let depth = depth + 1;
    if depth > MAX_DEPTH {
        return Err(CodecError::TooDeep {
            max: MAX_DEPTH,
            offset,
        });
    }
    Ok(depth)
}

impl Iterator for Parser<'_> {
    type Item = Result<Entry>;

    /// Yields entries until end of message. Stops after the first error.
    fn next(&mut self) -> Option<Self::Item> {
        if self.failed {
            return None;
        }
        match self.next_entry() {
            Ok(entry) => entry.map(Ok),
            Err(err) => {
                self.failed = true;
                Some(Err(err))
            }
        }
    }
}

/// Parse every entry in `buf`.
pub fn parse_message(buf: &[u8]) -> Result<Vec<Entry>> {
    Parser::new(buf).collect()
}
