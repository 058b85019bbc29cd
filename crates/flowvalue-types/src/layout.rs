//! Binary layout of slots, array blocks and ref boxes.
//!
//! ```text
//! slot (16 bytes)
//!   +0  u8   tag
//!   +1  7 bytes padding
//!   +8  payload (width/alignment per ValueTag::payload)
//!
//! array block
//!   +0  u32  element count
//!   +4  u32  runtime type index
//!   +8  slot[0], +24 slot[1], +40 slot[2], ...
//!
//! ref box (StringRef / ArrayRef / BlobRef)
//!   +0  u32  reference count
//!   +4  u32  reserved
//!   +8  StringRef: text ptr | ArrayRef: array block | BlobRef: data ptr
//!   +12 BlobRef: u32 byte length
//! ```

use crate::memory::Ptr;

/// Total size of a slot, identical for every tag.
pub const SLOT_SIZE: u32 = 16;
/// Offset of the payload from the start of a slot.
pub const PAYLOAD_OFFSET: u32 = 8;

/// Offset of the element count in an array block.
pub const ARRAY_COUNT_OFFSET: u32 = 0;
/// Offset of the runtime type index in an array block.
pub const ARRAY_TYPE_OFFSET: u32 = 4;
/// Size of the array block header; element slots start here.
pub const ARRAY_HEADER_SIZE: u32 = 8;

/// Offset of the reference count in a ref box.
pub const REF_COUNT_OFFSET: u32 = 0;
/// Size of the ref box header.
pub const REF_HEADER_SIZE: u32 = 8;
/// Offset of the boxed data (text/data pointer, or the array block).
pub const REF_DATA_OFFSET: u32 = 8;
/// Offset of the byte length in a `BlobRef` box.
pub const BLOB_LEN_OFFSET: u32 = 12;
/// Size of a `StringRef` box.
pub const STRING_REF_SIZE: u32 = REF_DATA_OFFSET + 4;
/// Size of a `BlobRef` box.
pub const BLOB_REF_SIZE: u32 = BLOB_LEN_OFFSET + 4;

/// Start of the payload of the slot at `slot`.
pub fn payload(slot: Ptr) -> Ptr {
    slot.add(PAYLOAD_OFFSET)
}

/// Start of element slot `index` in the array block at `block`.
pub fn element_slot(block: Ptr, index: u32) -> Ptr {
    block
        .add(ARRAY_HEADER_SIZE)
        .add(index.wrapping_mul(SLOT_SIZE))
}

/// The array block embedded in an `ArrayRef` box.
pub fn ref_array_block(ref_box: Ptr) -> Ptr {
    ref_box.add(REF_DATA_OFFSET)
}

/// Bytes needed for an array block of `count` slots, or `None` when that
/// does not fit in 32 bits.
pub fn array_block_size(count: u32) -> Option<u32> {
    count.checked_mul(SLOT_SIZE)?.checked_add(ARRAY_HEADER_SIZE)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_element_offsets() {
        let block = Ptr(100);
        assert_eq!(element_slot(block, 0), Ptr(108));
        assert_eq!(element_slot(block, 1), Ptr(124));
        assert_eq!(element_slot(block, 2), Ptr(140));
    }

    #[test]
    fn test_box_sizes() {
        assert_eq!(STRING_REF_SIZE, 12);
        assert_eq!(BLOB_REF_SIZE, 16);
        assert_eq!(array_block_size(3), Some(56));
        assert_eq!(array_block_size(u32::MAX), None);
        assert_eq!(ref_array_block(Ptr(64)), Ptr(72));
    }
}
