//! Struct-like Keys
//!
//! Row keys are structured values described by a [`StructType`]. They are
//! compared by their serialized bytes, never by identity, so the encoding
//! below is deterministic, type-checked and order-preserving: comparing two
//! encoded keys byte-wise gives the same answer as comparing the rows field
//! by field (nulls first).
//!
//! ## Field Encoding
//! ```text
//! null                 0x00
//! present              0x01 + payload
//!   boolean            0x00 | 0x01
//!   int / date         u32 big-endian, sign bit flipped
//!   long / timestamp   u64 big-endian, sign bit flipped
//!   float / double     IEEE bits, negatives inverted, positives sign-set
//!   string / binary    bytes with 0x00 → 0x00 0xFF, then 0x00 0x01
//! ```

use serde::{Deserialize, Serialize};

use crate::error::{Result, SpillError};
use crate::serializer::Serializer;

const NULL_MARKER: u8 = 0x00;
const PRESENT_MARKER: u8 = 0x01;

const ESCAPE: u8 = 0x00;
const ESCAPED_ZERO: u8 = 0xFF;
const TERMINATOR: u8 = 0x01;

// =============================================================================
// Type Descriptors
// =============================================================================

/// Primitive type of one key field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FieldType {
    Boolean,
    Int,
    Long,
    Float,
    Double,
    /// Days since epoch
    Date,
    /// Microseconds since epoch
    Timestamp,
    String,
    Binary,
}

/// One named, typed field of a struct key
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StructField {
    pub id: i32,
    pub name: String,
    pub field_type: FieldType,
    /// Required fields reject nulls
    pub required: bool,
}

impl StructField {
    pub fn required(id: i32, name: impl Into<String>, field_type: FieldType) -> Self {
        Self {
            id,
            name: name.into(),
            field_type,
            required: true,
        }
    }

    pub fn optional(id: i32, name: impl Into<String>, field_type: FieldType) -> Self {
        Self {
            id,
            name: name.into(),
            field_type,
            required: false,
        }
    }
}

/// Structural type of a row key
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StructType {
    fields: Vec<StructField>,
}

impl StructType {
    pub fn new(fields: Vec<StructField>) -> Self {
        Self { fields }
    }

    pub fn fields(&self) -> &[StructField] {
        &self.fields
    }

    pub fn field(&self, position: usize) -> Option<&StructField> {
        self.fields.get(position)
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

// =============================================================================
// Values
// =============================================================================

/// A single field value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Datum {
    Null,
    Boolean(bool),
    Int(i32),
    Long(i64),
    Float(f32),
    Double(f64),
    Date(i32),
    Timestamp(i64),
    String(String),
    Binary(Vec<u8>),
}

impl Datum {
    pub fn is_null(&self) -> bool {
        matches!(self, Datum::Null)
    }

    /// True if this datum can be stored in a field of `field_type`
    pub fn matches(&self, field_type: FieldType) -> bool {
        matches!(
            (self, field_type),
            (Datum::Null, _)
                | (Datum::Boolean(_), FieldType::Boolean)
                | (Datum::Int(_), FieldType::Int)
                | (Datum::Long(_), FieldType::Long)
                | (Datum::Float(_), FieldType::Float)
                | (Datum::Double(_), FieldType::Double)
                | (Datum::Date(_), FieldType::Date)
                | (Datum::Timestamp(_), FieldType::Timestamp)
                | (Datum::String(_), FieldType::String)
                | (Datum::Binary(_), FieldType::Binary)
        )
    }
}

impl From<bool> for Datum {
    fn from(v: bool) -> Self {
        Datum::Boolean(v)
    }
}

impl From<i32> for Datum {
    fn from(v: i32) -> Self {
        Datum::Int(v)
    }
}

impl From<i64> for Datum {
    fn from(v: i64) -> Self {
        Datum::Long(v)
    }
}

impl From<f32> for Datum {
    fn from(v: f32) -> Self {
        Datum::Float(v)
    }
}

impl From<f64> for Datum {
    fn from(v: f64) -> Self {
        Datum::Double(v)
    }
}

impl From<&str> for Datum {
    fn from(v: &str) -> Self {
        Datum::String(v.to_string())
    }
}

impl From<String> for Datum {
    fn from(v: String) -> Self {
        Datum::String(v)
    }
}

impl From<Vec<u8>> for Datum {
    fn from(v: Vec<u8>) -> Self {
        Datum::Binary(v)
    }
}

impl<T: Into<Datum>> From<Option<T>> for Datum {
    fn from(v: Option<T>) -> Self {
        v.map_or(Datum::Null, Into::into)
    }
}

/// A row key: one datum per field of its [`StructType`]
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StructValue {
    values: Vec<Datum>,
}

impl StructValue {
    pub fn new(values: Vec<Datum>) -> Self {
        Self { values }
    }

    /// Build a row from anything convertible to datums
    ///
    /// ```
    /// use spillkv::struct_key::{Datum, StructValue};
    ///
    /// let row = StructValue::of([Datum::from(7), Datum::from("a")]);
    /// assert_eq!(row.len(), 2);
    /// ```
    pub fn of<I, D>(values: I) -> Self
    where
        I: IntoIterator<Item = D>,
        D: Into<Datum>,
    {
        Self {
            values: values.into_iter().map(Into::into).collect(),
        }
    }

    pub fn get(&self, position: usize) -> Option<&Datum> {
        self.values.get(position)
    }

    pub fn values(&self) -> &[Datum] {
        &self.values
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl From<Vec<Datum>> for StructValue {
    fn from(values: Vec<Datum>) -> Self {
        Self::new(values)
    }
}

// =============================================================================
// Serializer
// =============================================================================

/// Order-preserving serializer for rows of one [`StructType`]
#[derive(Debug, Clone)]
pub struct StructLikeSerializer {
    struct_type: StructType,
}

impl StructLikeSerializer {
    pub fn new(struct_type: StructType) -> Self {
        Self { struct_type }
    }

    pub fn struct_type(&self) -> &StructType {
        &self.struct_type
    }

    fn encode_datum(out: &mut Vec<u8>, datum: &Datum) {
        match datum {
            Datum::Null => {
                out.push(NULL_MARKER);
                return;
            }
            _ => out.push(PRESENT_MARKER),
        }

        match datum {
            Datum::Null => {}
            Datum::Boolean(v) => out.push(u8::from(*v)),
            Datum::Int(v) | Datum::Date(v) => {
                out.extend_from_slice(&((*v as u32) ^ 0x8000_0000).to_be_bytes());
            }
            Datum::Long(v) | Datum::Timestamp(v) => {
                out.extend_from_slice(&((*v as u64) ^ (1 << 63)).to_be_bytes());
            }
            Datum::Float(v) => out.extend_from_slice(&encode_f32(*v)),
            Datum::Double(v) => out.extend_from_slice(&encode_f64(*v)),
            Datum::String(v) => encode_bytes(out, v.as_bytes()),
            Datum::Binary(v) => encode_bytes(out, v),
        }
    }

    fn decode_datum(reader: &mut ByteReader<'_>, field: &StructField) -> Result<Datum> {
        match reader.byte()? {
            NULL_MARKER => return Ok(Datum::Null),
            PRESENT_MARKER => {}
            other => {
                return Err(SpillError::Serialization(format!(
                    "invalid presence marker {other:#04x} for field {}",
                    field.name
                )))
            }
        }

        let datum = match field.field_type {
            FieldType::Boolean => match reader.byte()? {
                0 => Datum::Boolean(false),
                1 => Datum::Boolean(true),
                other => {
                    return Err(SpillError::Serialization(format!(
                        "invalid boolean byte {other:#04x} for field {}",
                        field.name
                    )))
                }
            },
            FieldType::Int => Datum::Int(decode_i32(reader.array()?)),
            FieldType::Date => Datum::Date(decode_i32(reader.array()?)),
            FieldType::Long => Datum::Long(decode_i64(reader.array()?)),
            FieldType::Timestamp => Datum::Timestamp(decode_i64(reader.array()?)),
            FieldType::Float => Datum::Float(decode_f32(reader.array()?)),
            FieldType::Double => Datum::Double(decode_f64(reader.array()?)),
            FieldType::String => {
                let bytes = reader.escaped()?;
                let text = String::from_utf8(bytes).map_err(|e| {
                    SpillError::Serialization(format!("field {} is not UTF-8: {e}", field.name))
                })?;
                Datum::String(text)
            }
            FieldType::Binary => Datum::Binary(reader.escaped()?),
        };
        Ok(datum)
    }
}

impl Serializer<StructValue> for StructLikeSerializer {
    fn serialize(&self, value: &StructValue) -> Result<Vec<u8>> {
        let fields = self.struct_type.fields();
        if value.len() != fields.len() {
            return Err(SpillError::Serialization(format!(
                "row has {} values but the key type has {} fields",
                value.len(),
                fields.len()
            )));
        }

        let mut out = Vec::with_capacity(fields.len() * 9);
        for (field, datum) in fields.iter().zip(value.values()) {
            if datum.is_null() && field.required {
                return Err(SpillError::Serialization(format!(
                    "required field {} is null",
                    field.name
                )));
            }
            if !datum.matches(field.field_type) {
                return Err(SpillError::Serialization(format!(
                    "field {} expects {:?}, got {:?}",
                    field.name, field.field_type, datum
                )));
            }
            Self::encode_datum(&mut out, datum);
        }
        Ok(out)
    }

    fn deserialize(&self, bytes: &[u8]) -> Result<StructValue> {
        let mut reader = ByteReader { bytes, pos: 0 };
        let values = self
            .struct_type
            .fields()
            .iter()
            .map(|field| Self::decode_datum(&mut reader, field))
            .collect::<Result<Vec<_>>>()?;

        if reader.pos != bytes.len() {
            return Err(SpillError::Serialization(format!(
                "{} trailing bytes after struct key",
                bytes.len() - reader.pos
            )));
        }
        Ok(StructValue::new(values))
    }
}

// =============================================================================
// Encoding Helpers
// =============================================================================

fn encode_bytes(out: &mut Vec<u8>, bytes: &[u8]) {
    for &b in bytes {
        if b == ESCAPE {
            out.push(ESCAPE);
            out.push(ESCAPED_ZERO);
        } else {
            out.push(b);
        }
    }
    out.push(ESCAPE);
    out.push(TERMINATOR);
}

fn encode_f32(v: f32) -> [u8; 4] {
    let v = if v.is_nan() { f32::NAN } else { v };
    let bits = v.to_bits();
    let bits = if bits & 0x8000_0000 != 0 {
        !bits
    } else {
        bits | 0x8000_0000
    };
    bits.to_be_bytes()
}

fn encode_f64(v: f64) -> [u8; 8] {
    let v = if v.is_nan() { f64::NAN } else { v };
    let bits = v.to_bits();
    let bits = if bits & (1 << 63) != 0 {
        !bits
    } else {
        bits | (1 << 63)
    };
    bits.to_be_bytes()
}

fn decode_i32(bytes: [u8; 4]) -> i32 {
    (u32::from_be_bytes(bytes) ^ 0x8000_0000) as i32
}

fn decode_i64(bytes: [u8; 8]) -> i64 {
    (u64::from_be_bytes(bytes) ^ (1 << 63)) as i64
}

fn decode_f32(bytes: [u8; 4]) -> f32 {
    let bits = u32::from_be_bytes(bytes);
    let bits = if bits & 0x8000_0000 != 0 {
        bits & 0x7FFF_FFFF
    } else {
        !bits
    };
    f32::from_bits(bits)
}

fn decode_f64(bytes: [u8; 8]) -> f64 {
    let bits = u64::from_be_bytes(bytes);
    let bits = if bits & (1 << 63) != 0 {
        bits & !(1 << 63)
    } else {
        !bits
    };
    f64::from_bits(bits)
}

/// Cursor over an encoded key
struct ByteReader<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl ByteReader<'_> {
    fn byte(&mut self) -> Result<u8> {
        let b = *self
            .bytes
            .get(self.pos)
            .ok_or_else(|| SpillError::Serialization("struct key truncated".to_string()))?;
        self.pos += 1;
        Ok(b)
    }

    fn array<const N: usize>(&mut self) -> Result<[u8; N]> {
        let end = self.pos + N;
        let slice = self
            .bytes
            .get(self.pos..end)
            .ok_or_else(|| SpillError::Serialization("struct key truncated".to_string()))?;
        let mut out = [0u8; N];
        out.copy_from_slice(slice);
        self.pos = end;
        Ok(out)
    }

    fn escaped(&mut self) -> Result<Vec<u8>> {
        let mut out = Vec::new();
        loop {
            match self.byte()? {
                ESCAPE => match self.byte()? {
                    ESCAPED_ZERO => out.push(0),
                    TERMINATOR => return Ok(out),
                    other => {
                        return Err(SpillError::Serialization(format!(
                            "invalid escape sequence 0x00 {other:#04x}"
                        )))
                    }
                },
                b => out.push(b),
            }
        }
    }
}
