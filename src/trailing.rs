//! Trailing data entries at the end of text records.
//!
//! Each bit of the extra data flags above bit 0 announces one trailing
//! entry.  Entries are stacked from the end of the record inward; each ends
//! with a backward variable-length size (7 bits per byte, least significant
//! group nearest the end, top bit set on the byte that stops the number).
//! Trailing entries are stored in the clear.
//!
//! Bit 0 marks multibyte overlap bytes.  Those are encrypted along with the
//! text, so they are not counted here.

/// Largest number of bits one size field may carry.
const MAX_SIZE_BITS: u32 = 28;

/// Read one backward size field from `record[..budget]`.
fn entry_size(record: &[u8], budget: usize) -> usize {
    let mut budget = budget.min(record.len());
    let mut bitpos = 0u32;
    let mut result = 0usize;
    while budget > 0 {
        let v = record[budget - 1];
        result |= ((v & 0x7F) as usize) << bitpos;
        bitpos += 7;
        budget -= 1;
        if v & 0x80 != 0 || bitpos >= MAX_SIZE_BITS {
            break;
        }
    }
    result
}

/// Total size of the trailing entries of `record` under `flags`.
///
/// May exceed `record.len()` on corrupt input; the caller decides how to
/// treat that.
pub fn trailing_size(record: &[u8], flags: u16) -> usize {
    let mut total = 0usize;
    let mut bits = flags >> 1;
    while bits != 0 {
        if bits & 1 != 0 {
            total += entry_size(record, record.len().saturating_sub(total));
        }
        bits >>= 1;
    }
    total
}
