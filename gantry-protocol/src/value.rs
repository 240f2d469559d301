//! Tagged-union value type, the atomic wire element.

/// Binary wire tag constants.
///
/// Scalar tags occupy the low byte; `LIST` and `DICT` are group bits. A
/// list's wire tag is `LIST | subcode` where the subcode is the shared
/// element tag of a homogeneous primitive list (0 for mixed lists). A dict
/// always travels as `LIST | DICT`.
pub mod tag {
    pub const INT32: i32 = 1;
    pub const VOCAB: i32 = 1 + 8;
    pub const FLOAT64: i32 = 2 + 8;
    pub const STRING: i32 = 4;
    pub const BLOB: i32 = 4 + 8;
    pub const INT64: i32 = 1 + 16;
    pub const INT8: i32 = 32;
    pub const INT16: i32 = 64;
    pub const FLOAT32: i32 = 128;
    pub const LIST: i32 = 256;
    pub const DICT: i32 = 512;

    /// Mask of the aggregate group bits; group codes never specialize.
    pub const GROUP_MASK: i32 = LIST | DICT;
}

/// Pack four bytes into a vocab code, first byte in the low bits
pub const fn vocab32(a: u8, b: u8, c: u8, d: u8) -> i32 {
    (a as i32) | ((b as i32) << 8) | ((c as i32) << 16) | ((d as i32) << 24)
}

/// Encode up to the first four bytes of a string as a vocab code
pub fn vocab_encode(s: &str) -> i32 {
    let mut code: i32 = 0;
    for (i, b) in s.bytes().take(4).enumerate() {
        code |= (b as i32) << (8 * i);
    }
    code
}

/// Decode a vocab code back into its character form, stopping at the first nul
pub fn vocab_decode(x: i32) -> String {
    let mut s = String::new();
    for i in 0..4 {
        let b = ((x >> (8 * i)) & 0xff) as u8;
        if b == 0 {
            break;
        }
        s.push(b as char);
    }
    s
}

/// Vocab codes 0 and `'1'` are reserved as the boolean storage values;
/// a decoded vocab holding one of them surfaces as `Bool`.
pub(crate) const VOCAB_FALSE: i32 = 0;
pub(crate) const VOCAB_TRUE: i32 = '1' as i32;

/// A single tagged value.
///
/// Coercion accessors are total: on a kind mismatch they return a defined
/// default (zero, false, empty) instead of failing, so readers can pull
/// whatever shape they expect out of a message without checking first.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Value {
    /// No value; used only outside the wire ("nothing at this index")
    #[default]
    Null,
    Bool(bool),
    Int8(i8),
    Int16(i16),
    Int32(i32),
    Int64(i64),
    Float32(f32),
    Float64(f64),
    /// Compact 4-byte enumerated verb, for control messages
    Vocab(i32),
    String(String),
    /// Length-prefixed raw bytes
    Blob(Vec<u8>),
    /// Ordered sequence of values
    List(crate::message::Message),
    /// Ordered key/value pairs
    Dict(Vec<(Value, Value)>),
}

impl Value {
    /// Wire tag of this value's kind (lists report the bare LIST bit;
    /// the codec adds the specialization subcode)
    pub fn code(&self) -> i32 {
        match self {
            Value::Null => 0,
            Value::Bool(_) => tag::VOCAB,
            Value::Int8(_) => tag::INT8,
            Value::Int16(_) => tag::INT16,
            Value::Int32(_) => tag::INT32,
            Value::Int64(_) => tag::INT64,
            Value::Float32(_) => tag::FLOAT32,
            Value::Float64(_) => tag::FLOAT64,
            Value::Vocab(_) => tag::VOCAB,
            Value::String(_) => tag::STRING,
            Value::Blob(_) => tag::BLOB,
            Value::List(_) => tag::LIST,
            Value::Dict(_) => tag::LIST | tag::DICT,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn is_bool(&self) -> bool {
        matches!(self, Value::Bool(_))
    }

    pub fn is_int8(&self) -> bool {
        matches!(self, Value::Int8(_))
    }

    pub fn is_int16(&self) -> bool {
        matches!(self, Value::Int16(_))
    }

    pub fn is_int32(&self) -> bool {
        matches!(self, Value::Int32(_))
    }

    pub fn is_int64(&self) -> bool {
        matches!(self, Value::Int64(_))
    }

    pub fn is_float32(&self) -> bool {
        matches!(self, Value::Float32(_))
    }

    pub fn is_float64(&self) -> bool {
        matches!(self, Value::Float64(_))
    }

    pub fn is_vocab(&self) -> bool {
        matches!(self, Value::Vocab(_))
    }

    pub fn is_string(&self) -> bool {
        matches!(self, Value::String(_))
    }

    pub fn is_blob(&self) -> bool {
        matches!(self, Value::Blob(_))
    }

    pub fn is_list(&self) -> bool {
        matches!(self, Value::List(_))
    }

    pub fn is_dict(&self) -> bool {
        matches!(self, Value::Dict(_))
    }

    /// True for booleans and nonzero integers/vocabs, false for everything else
    pub fn as_bool(&self) -> bool {
        match self {
            Value::Bool(b) => *b,
            Value::Int8(x) => *x != 0,
            Value::Int16(x) => *x != 0,
            Value::Int32(x) => *x != 0,
            Value::Int64(x) => *x != 0,
            Value::Vocab(x) => *x != 0,
            _ => false,
        }
    }

    /// Numeric content widened to i64; floats truncate, non-numerics are 0
    pub fn as_i64(&self) -> i64 {
        match self {
            Value::Bool(b) => *b as i64,
            Value::Int8(x) => *x as i64,
            Value::Int16(x) => *x as i64,
            Value::Int32(x) => *x as i64,
            Value::Int64(x) => *x,
            Value::Float32(x) => *x as i64,
            Value::Float64(x) => *x as i64,
            Value::Vocab(x) => *x as i64,
            _ => 0,
        }
    }

    pub fn as_i32(&self) -> i32 {
        self.as_i64() as i32
    }

    pub fn as_i16(&self) -> i16 {
        self.as_i64() as i16
    }

    pub fn as_i8(&self) -> i8 {
        self.as_i64() as i8
    }

    /// Numeric content as f64; non-numerics are 0.0
    pub fn as_f64(&self) -> f64 {
        match self {
            Value::Bool(b) => *b as i64 as f64,
            Value::Int8(x) => *x as f64,
            Value::Int16(x) => *x as f64,
            Value::Int32(x) => *x as f64,
            Value::Int64(x) => *x as f64,
            Value::Float32(x) => *x as f64,
            Value::Float64(x) => *x,
            _ => 0.0,
        }
    }

    pub fn as_f32(&self) -> f32 {
        self.as_f64() as f32
    }

    /// Vocab code; booleans report their reserved storage codes
    pub fn as_vocab(&self) -> i32 {
        match self {
            Value::Vocab(x) => *x,
            Value::Bool(true) => VOCAB_TRUE,
            Value::Bool(false) => VOCAB_FALSE,
            _ => 0,
        }
    }

    /// String content, or "" for any other kind
    pub fn as_str(&self) -> &str {
        match self {
            Value::String(s) => s,
            _ => "",
        }
    }

    /// Blob content, or an empty slice for any other kind
    pub fn as_blob(&self) -> &[u8] {
        match self {
            Value::Blob(b) => b,
            _ => &[],
        }
    }

    /// List content; None for any other kind
    pub fn as_list(&self) -> Option<&crate::message::Message> {
        match self {
            Value::List(m) => Some(m),
            _ => None,
        }
    }

    /// Dict pairs; None for any other kind
    pub fn as_dict(&self) -> Option<&[(Value, Value)]> {
        match self {
            Value::Dict(pairs) => Some(pairs),
            _ => None,
        }
    }
}
