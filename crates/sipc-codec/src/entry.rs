use bytes::{BufMut, Bytes, BytesMut};

use crate::encode::append_value;
use crate::value::Value;

/// The one-byte tag that opens every entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntryType {
    /// `R`
    Request,
    /// `E`
    Error,
    /// `S`
    Success,
    /// `W`: carries one duplicated handle identifier. Reserved for the
    /// in-band transport and never exposed to applications.
    HandleCarrier,
}

impl EntryType {
    pub const fn tag(self) -> u8 {
        match self {
            EntryType::Request => b'R',
            EntryType::Error => b'E',
            EntryType::Success => b'S',
            EntryType::HandleCarrier => b'W',
        }
    }

    pub const fn from_tag(tag: u8) -> Option<Self> {
        match tag {
            b'R' => Some(EntryType::Request),
            b'E' => Some(EntryType::Error),
            b'S' => Some(EntryType::Success),
            b'W' => Some(EntryType::HandleCarrier),
            _ => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            EntryType::Request => "request",
            EntryType::Error => "error",
            EntryType::Success => "success",
            EntryType::HandleCarrier => "handle",
        }
    }
}

/// A tagged, newline-terminated group of values.
#[derive(Debug, Clone, PartialEq)]
pub struct Entry {
    pub kind: EntryType,
    pub values: Vec<Value>,
}

impl Entry {
    pub fn new(kind: EntryType, values: Vec<Value>) -> Self {
        Self { kind, values }
    }

    pub fn request(values: Vec<Value>) -> Self {
        Self::new(EntryType::Request, values)
    }

    pub fn success(values: Vec<Value>) -> Self {
        Self::new(EntryType::Success, values)
    }

    pub fn error(values: Vec<Value>) -> Self {
        Self::new(EntryType::Error, values)
    }

    /// Append this entry's wire form to `dst`.
    pub fn encode<B: BufMut>(&self, dst: &mut B) {
        append_entry_start(dst, self.kind);
        for value in &self.values {
            append_value(dst, value);
        }
        append_entry_end(dst);
    }
}

pub fn append_entry_start<B: BufMut>(dst: &mut B, kind: EntryType) {
    dst.put_u8(kind.tag());
}

pub fn append_entry_end<B: BufMut>(dst: &mut B) {
    dst.put_u8(b'\n');
}

/// Encode one complete entry.
pub fn build_entry(kind: EntryType, values: &[Value]) -> BytesMut {
    let mut buf = BytesMut::new();
    append_entry_start(&mut buf, kind);
    for value in values {
        append_value(&mut buf, value);
    }
    append_entry_end(&mut buf);
    buf
}

/// Accumulates application entries into one message buffer.
///
/// Handle-carrier entries belong to the transport and are refused here.
#[derive(Debug, Default)]
pub struct MessageBuilder {
    buf: BytesMut,
    entries: usize,
}

impl MessageBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an entry. Returns `false` (and appends nothing) for
    /// [`EntryType::HandleCarrier`].
    pub fn push(&mut self, entry: &Entry) -> bool {
        if entry.kind == EntryType::HandleCarrier {
            return false;
        }
        entry.encode(&mut self.buf);
        self.entries += 1;
        true
    }

    pub fn request(&mut self, values: &[Value]) -> &mut Self {
        self.append(EntryType::Request, values)
    }

    pub fn success(&mut self, values: &[Value]) -> &mut Self {
        self.append(EntryType::Success, values)
    }

    pub fn error(&mut self, values: &[Value]) -> &mut Self {
        self.append(EntryType::Error, values)
    }

    fn append(&mut self, kind: EntryType, values: &[Value]) -> &mut Self {
        append_entry_start(&mut self.buf, kind);
        for value in values {
            append_value(&mut self.buf, value);
        }
        append_entry_end(&mut self.buf);
        self.entries += 1;
        self
    }

    /// Number of entries appended so far.
    pub fn len(&self) -> usize {
        self.entries
    }

    pub fn is_empty(&self) -> bool {
        self.entries == 0
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.buf
    }

    pub fn finish(self) -> Bytes {
        self.buf.freeze()
    }
}
