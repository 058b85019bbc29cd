//! Value tags and the payload width/alignment table.
//!
//! Byte 0 of every slot holds one of these tags. The tag alone determines
//! how wide the payload is, how it is aligned, and whether it is inline data
//! or a pointer into a separately allocated box.
//!
//! | Tag         | Payload                     | Width | Align |
//! |-------------|-----------------------------|-------|-------|
//! | `Undefined` | none                        | 0     | 1     |
//! | `Null`      | none                        | 0     | 1     |
//! | `Boolean`   | i32 (0 / 1)                 | 4     | 4     |
//! | `Int8`      | i8                          | 1     | 1     |
//! | `UInt8`     | u8                          | 1     | 1     |
//! | `Int16`     | i16                         | 2     | 2     |
//! | `UInt16`    | u16                         | 2     | 2     |
//! | `Int32`     | i32                         | 4     | 4     |
//! | `UInt32`    | u32                         | 4     | 4     |
//! | `Int64`     | i64                         | 8     | 8     |
//! | `UInt64`    | u64                         | 8     | 8     |
//! | `Float`     | f32                         | 4     | 4     |
//! | `Double`    | f64                         | 8     | 8     |
//! | `String`    | ptr → NUL-terminated text   | 4     | 4     |
//! | `Array`     | ptr → array block           | 4     | 4     |
//! | `StringRef` | ptr → box, box+8 → text     | 4     | 4     |
//! | `ArrayRef`  | ptr → box, block at box+8   | 4     | 4     |
//! | `BlobRef`   | ptr → box (+8 data, +12 len)| 4     | 4     |
//! | `Stream`    | u32 resource handle         | 4     | 4     |
//! | `Date`      | f64 ms since epoch          | 8     | 8     |

use std::fmt;

/// The tag byte stored at offset 0 of a slot.
///
/// Discriminants are the runtime's numbering; gaps belong to tags that never
/// cross the host boundary and decode as unknown.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum ValueTag {
    Undefined = 0,
    Null = 1,
    Boolean = 2,
    Int8 = 3,
    UInt8 = 4,
    Int16 = 5,
    UInt16 = 6,
    Int32 = 7,
    UInt32 = 8,
    Int64 = 9,
    UInt64 = 10,
    Float = 11,
    Double = 12,
    String = 13,
    Array = 15,
    StringRef = 17,
    ArrayRef = 18,
    BlobRef = 19,
    Stream = 20,
    Date = 21,
}

/// Width and alignment divisor of a slot payload, in bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PayloadLayout {
    pub width: u32,
    pub align: u32,
}

impl PayloadLayout {
    const NONE: Self = Self { width: 0, align: 1 };
    const B1: Self = Self { width: 1, align: 1 };
    const B2: Self = Self { width: 2, align: 2 };
    const B4: Self = Self { width: 4, align: 4 };
    const B8: Self = Self { width: 8, align: 8 };
}

impl ValueTag {
    /// Every tag, in discriminant order.
    pub const ALL: [ValueTag; 20] = [
        Self::Undefined,
        Self::Null,
        Self::Boolean,
        Self::Int8,
        Self::UInt8,
        Self::Int16,
        Self::UInt16,
        Self::Int32,
        Self::UInt32,
        Self::Int64,
        Self::UInt64,
        Self::Float,
        Self::Double,
        Self::String,
        Self::Array,
        Self::StringRef,
        Self::ArrayRef,
        Self::BlobRef,
        Self::Stream,
        Self::Date,
    ];

    /// Decode a raw tag byte. Returns `None` for bytes with no host mapping.
    pub fn from_byte(byte: u8) -> Option<Self> {
        Self::ALL.iter().copied().find(|tag| *tag as u8 == byte)
    }

    /// The raw tag byte.
    pub fn byte(self) -> u8 {
        self as u8
    }

    /// Payload width and alignment. This is the single source of truth for
    /// every read and write of a slot payload.
    pub fn payload(self) -> PayloadLayout {
        match self {
            Self::Undefined | Self::Null => PayloadLayout::NONE,
            Self::Int8 | Self::UInt8 => PayloadLayout::B1,
            Self::Int16 | Self::UInt16 => PayloadLayout::B2,
            Self::Boolean
            | Self::Int32
            | Self::UInt32
            | Self::Float
            | Self::String
            | Self::Array
            | Self::StringRef
            | Self::ArrayRef
            | Self::BlobRef
            | Self::Stream => PayloadLayout::B4,
            Self::Int64 | Self::UInt64 | Self::Double | Self::Date => PayloadLayout::B8,
        }
    }

    /// Whether the payload points at a ref-counted box.
    pub fn is_ref(self) -> bool {
        matches!(self, Self::StringRef | Self::ArrayRef | Self::BlobRef)
    }

    /// Whether the payload is a pointer (boxed or not).
    pub fn is_pointer(self) -> bool {
        self.is_ref() || matches!(self, Self::String | Self::Array)
    }

    /// The value-type name a decoded value of this tag reports.
    ///
    /// Array tags report `"array"` here; the decoder refines it with the
    /// element type from the catalog.
    pub fn value_type_name(self) -> &'static str {
        match self {
            Self::Undefined => "undefined",
            Self::Null => "null",
            Self::Boolean => "boolean",
            Self::Int8
            | Self::UInt8
            | Self::Int16
            | Self::UInt16
            | Self::Int32
            | Self::UInt32
            | Self::Int64
            | Self::UInt64 => "integer",
            Self::Float => "float",
            Self::Double => "double",
            Self::String | Self::StringRef => "string",
            Self::Array | Self::ArrayRef => "array",
            Self::BlobRef => "blob",
            Self::Stream => "stream",
            Self::Date => "date",
        }
    }
}

impl TryFrom<u8> for ValueTag {
    type Error = u8;

    fn try_from(byte: u8) -> Result<Self, u8> {
        Self::from_byte(byte).ok_or(byte)
    }
}

impl fmt::Display for ValueTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{self:?}({})", self.byte())
    }
}
