//! Report descriptor items (HID 1.11, section 6.2.2).
//!
//! A short item is a one-byte prefix `[tag:4][type:2][size:2]` followed by
//! 0, 1, 2 or 4 little-endian data bytes. A long item starts with
//! [`LONG_ITEM_PREFIX`], then a data length byte and a long tag byte.

use std::fmt;

use byteorder::{ByteOrder, LittleEndian};
use thiserror::Error;

/// Prefix byte that introduces a long item.
pub const LONG_ITEM_PREFIX: u8 = 0xFE;

/// Bytes preceding the payload of a long item (prefix, length, tag).
pub const LONG_ITEM_HEADER_LEN: usize = 3;

/// Payload widths selected by the two size bits of a short item prefix.
const SHORT_SIZES: [usize; 4] = [0, 1, 2, 4];

/// Largest payload a long item can carry (one length byte).
pub const MAX_LONG_ITEM_DATA: usize = u8::MAX as usize;

/// An item that cannot be encoded.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ItemError {
    #[error("Short item payload must be 0, 1, 2 or 4 bytes, got {0}")]
    InvalidSize(u8),

    #[error("Value 0x{data:X} does not fit in {size} payload bytes")]
    ValueTooWide { size: u8, data: u32 },

    #[error("Long item payload is {0} bytes, at most 255 fit")]
    LongPayloadTooLarge(usize),
}

/// The `bType` field of a short item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ItemType {
    Main,
    Global,
    Local,
    Reserved,
}

impl ItemType {
    pub fn from_bits(bits: u8) -> Self {
        match bits & 0x03 {
            0 => ItemType::Main,
            1 => ItemType::Global,
            2 => ItemType::Local,
            _ => ItemType::Reserved,
        }
    }

    pub fn bits(self) -> u8 {
        match self {
            ItemType::Main => 0,
            ItemType::Global => 1,
            ItemType::Local => 2,
            ItemType::Reserved => 3,
        }
    }
}

/// Decoded item kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ItemTag {
    // Main items
    Input,
    Output,
    Feature,
    Collection,
    EndCollection,
    // Global items
    UsagePage,
    LogicalMinimum,
    LogicalMaximum,
    PhysicalMinimum,
    PhysicalMaximum,
    UnitExponent,
    Unit,
    ReportSize,
    ReportId,
    ReportCount,
    Push,
    Pop,
    // Local items
    Usage,
    UsageMinimum,
    UsageMaximum,
    DesignatorIndex,
    DesignatorMinimum,
    DesignatorMaximum,
    StringIndex,
    StringMinimum,
    StringMaximum,
    Delimiter,
    /// Short item whose type/tag pair has no assigned meaning.
    Reserved { item_type: ItemType, tag: u8 },
    /// Long item, identified by its `bLongItemTag`.
    Long { tag: u8 },
}

const SHORT_TAGS: &[(ItemType, u8, ItemTag)] = &[
    (ItemType::Main, 0x8, ItemTag::Input),
    (ItemType::Main, 0x9, ItemTag::Output),
    (ItemType::Main, 0xA, ItemTag::Collection),
    (ItemType::Main, 0xB, ItemTag::Feature),
    (ItemType::Main, 0xC, ItemTag::EndCollection),
    (ItemType::Global, 0x0, ItemTag::UsagePage),
    (ItemType::Global, 0x1, ItemTag::LogicalMinimum),
    (ItemType::Global, 0x2, ItemTag::LogicalMaximum),
    (ItemType::Global, 0x3, ItemTag::PhysicalMinimum),
    (ItemType::Global, 0x4, ItemTag::PhysicalMaximum),
    (ItemType::Global, 0x5, ItemTag::UnitExponent),
    (ItemType::Global, 0x6, ItemTag::Unit),
    (ItemType::Global, 0x7, ItemTag::ReportSize),
    (ItemType::Global, 0x8, ItemTag::ReportId),
    (ItemType::Global, 0x9, ItemTag::ReportCount),
    (ItemType::Global, 0xA, ItemTag::Push),
    (ItemType::Global, 0xB, ItemTag::Pop),
    (ItemType::Local, 0x0, ItemTag::Usage),
    (ItemType::Local, 0x1, ItemTag::UsageMinimum),
    (ItemType::Local, 0x2, ItemTag::UsageMaximum),
    (ItemType::Local, 0x3, ItemTag::DesignatorIndex),
    (ItemType::Local, 0x4, ItemTag::DesignatorMinimum),
    (ItemType::Local, 0x5, ItemTag::DesignatorMaximum),
    (ItemType::Local, 0x7, ItemTag::StringIndex),
    (ItemType::Local, 0x8, ItemTag::StringMinimum),
    (ItemType::Local, 0x9, ItemTag::StringMaximum),
    (ItemType::Local, 0xA, ItemTag::Delimiter),
];

impl ItemTag {
    /// Decode the type and tag fields of a short item prefix.
    pub fn from_short(item_type: ItemType, tag: u8) -> Self {
        SHORT_TAGS
            .iter()
            .find(|(t, code, _)| *t == item_type && *code == tag)
            .map(|(_, _, kind)| *kind)
            .unwrap_or(ItemTag::Reserved { item_type, tag })
    }

    /// The (type, tag) pair used in a short item prefix. `None` for long items.
    pub fn short_code(self) -> Option<(ItemType, u8)> {
        match self {
            ItemTag::Reserved { item_type, tag } => Some((item_type, tag & 0x0F)),
            ItemTag::Long { .. } => None,
            _ => SHORT_TAGS
                .iter()
                .find(|(_, _, kind)| *kind == self)
                .map(|(t, code, _)| (*t, *code)),
        }
    }

    pub fn item_type(self) -> ItemType {
        self.short_code()
            .map(|(t, _)| t)
            .unwrap_or(ItemType::Reserved)
    }

    /// Items whose data is a two's complement number of the payload width.
    pub fn has_signed_value(self) -> bool {
        matches!(
            self,
            ItemTag::LogicalMinimum
                | ItemTag::LogicalMaximum
                | ItemTag::PhysicalMinimum
                | ItemTag::PhysicalMaximum
                | ItemTag::UnitExponent
        )
    }

    /// Main items that define fields of a report.
    pub fn is_report_field(self) -> bool {
        matches!(self, ItemTag::Input | ItemTag::Output | ItemTag::Feature)
    }

    pub fn name(self) -> &'static str {
        match self {
            ItemTag::Input => "Input",
            ItemTag::Output => "Output",
            ItemTag::Feature => "Feature",
            ItemTag::Collection => "Collection",
            ItemTag::EndCollection => "EndCollection",
            ItemTag::UsagePage => "UsagePage",
            ItemTag::LogicalMinimum => "LogicalMinimum",
            ItemTag::LogicalMaximum => "LogicalMaximum",
            ItemTag::PhysicalMinimum => "PhysicalMinimum",
            ItemTag::PhysicalMaximum => "PhysicalMaximum",
            ItemTag::UnitExponent => "UnitExponent",
            ItemTag::Unit => "Unit",
            ItemTag::ReportSize => "ReportSize",
            ItemTag::ReportId => "ReportID",
            ItemTag::ReportCount => "ReportCount",
            ItemTag::Push => "Push",
            ItemTag::Pop => "Pop",
            ItemTag::Usage => "Usage",
            ItemTag::UsageMinimum => "UsageMinimum",
            ItemTag::UsageMaximum => "UsageMaximum",
            ItemTag::DesignatorIndex => "DesignatorIndex",
            ItemTag::DesignatorMinimum => "DesignatorMinimum",
            ItemTag::DesignatorMaximum => "DesignatorMaximum",
            ItemTag::StringIndex => "StringIndex",
            ItemTag::StringMinimum => "StringMinimum",
            ItemTag::StringMaximum => "StringMaximum",
            ItemTag::Delimiter => "Delimiter",
            ItemTag::Reserved { .. } => "Reserved",
            ItemTag::Long { .. } => "Long",
        }
    }
}

/// One item of a report descriptor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportItem {
    pub tag: ItemTag,
    /// Number of payload bytes.
    pub size: u8,
    /// Raw little-endian payload of a short item. Always zero for long items.
    pub data: u32,
    /// Offset of the item prefix in the source buffer.
    pub offset: usize,
    /// Payload of a long item. Empty for short items.
    pub long_data: Vec<u8>,
}

impl ReportItem {
    /// Build a short item. `size` must be 0, 1, 2 or 4 and `data` must fit
    /// in that many bytes.
    pub fn short(tag: ItemTag, size: u8, data: u32) -> Result<Self, ItemError> {
        if !SHORT_SIZES.contains(&(size as usize)) {
            return Err(ItemError::InvalidSize(size));
        }
        if size < 4 && data >> (8 * u32::from(size)) != 0 {
            return Err(ItemError::ValueTooWide { size, data });
        }
        Ok(Self {
            tag,
            size,
            data,
            offset: 0,
            long_data: Vec::new(),
        })
    }

    /// Build a long item carrying at most [`MAX_LONG_ITEM_DATA`] bytes.
    pub fn long(tag: u8, data: Vec<u8>) -> Result<Self, ItemError> {
        let size =
            u8::try_from(data.len()).map_err(|_| ItemError::LongPayloadTooLarge(data.len()))?;
        Ok(Self {
            tag: ItemTag::Long { tag },
            size,
            data: 0,
            offset: 0,
            long_data: data,
        })
    }

    pub fn is_long(&self) -> bool {
        matches!(self.tag, ItemTag::Long { .. })
    }

    /// Number of bytes this item occupies in a descriptor.
    pub fn encoded_len(&self) -> usize {
        if self.is_long() {
            LONG_ITEM_HEADER_LEN + self.long_data.len()
        } else {
            1 + self.size as usize
        }
    }

    /// The data interpreted as the item requires: sign-extended from the
    /// payload width for minimum/maximum and exponent items, unsigned otherwise.
    pub fn value(&self) -> i64 {
        if !self.tag.has_signed_value() {
            return self.data as i64;
        }
        match self.size {
            1 => self.data as u8 as i8 as i64,
            2 => self.data as u16 as i16 as i64,
            4 => self.data as i32 as i64,
            _ => self.data as i64,
        }
    }

    pub fn unsigned_value(&self) -> u32 {
        self.data
    }

    /// Append the encoded item to `out`, keeping the original payload width.
    pub fn encode(&self, out: &mut Vec<u8>) {
        if let ItemTag::Long { tag } = self.tag {
            debug_assert!(self.long_data.len() <= MAX_LONG_ITEM_DATA);
            out.push(LONG_ITEM_PREFIX);
            out.push(self.long_data.len() as u8);
            out.push(tag);
            out.extend_from_slice(&self.long_data);
            return;
        }

        let (item_type, tag) = self
            .tag
            .short_code()
            .unwrap_or((ItemType::Reserved, 0x0F));
        let size = self.size as usize;
        let size_bits = SHORT_SIZES.iter().position(|&s| s == size).unwrap_or(3) as u8;
        out.push((tag << 4) | (item_type.bits() << 2) | size_bits);

        let mut payload = [0u8; 4];
        LittleEndian::write_u32(&mut payload, self.data);
        out.extend_from_slice(&payload[..size.min(4)]);
    }

    /// Payload width encoded by a short item prefix.
    pub(crate) fn short_size(prefix: u8) -> usize {
        SHORT_SIZES[(prefix & 0x03) as usize]
    }
}

impl fmt::Display for ReportItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.tag {
            ItemTag::Long { tag } => {
                write!(f, "Long(tag=0x{:02X}, {} bytes)", tag, self.long_data.len())
            }
            ItemTag::Reserved { item_type, tag } => write!(
                f,
                "Reserved(type={}, tag=0x{:X}, data=0x{:X})",
                item_type.bits(),
                tag,
                self.data
            ),
            tag if self.size == 0 => write!(f, "{}", tag.name()),
            tag if tag.has_signed_value() => write!(f, "{}({})", tag.name(), self.value()),
            tag => write!(f, "{}(0x{:0width$X})", tag.name(), self.data, width = self.size as usize * 2),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_short_tag_table_is_consistent() {
        for &(item_type, code, kind) in SHORT_TAGS {
            assert_eq!(ItemTag::from_short(item_type, code), kind);
            assert_eq!(kind.short_code(), Some((item_type, code)));
        }
    }

    #[test]
    fn test_unknown_tag_is_reserved() {
        let tag = ItemTag::from_short(ItemType::Main, 0x1);
        assert_eq!(
            tag,
            ItemTag::Reserved {
                item_type: ItemType::Main,
                tag: 0x1
            }
        );
        assert_eq!(tag.short_code(), Some((ItemType::Main, 0x1)));
    }

    #[test]
    fn test_signed_values() {
        let min = ReportItem::short(ItemTag::LogicalMinimum, 1, 0x81).unwrap();
        assert_eq!(min.value(), -127);

        let max = ReportItem::short(ItemTag::LogicalMaximum, 2, 0x00FF).unwrap();
        assert_eq!(max.value(), 255);

        let wide = ReportItem::short(ItemTag::PhysicalMinimum, 4, 0xFFFF_FFFF).unwrap();
        assert_eq!(wide.value(), -1);

        // Usages are never sign-extended
        let usage = ReportItem::short(ItemTag::Usage, 1, 0xE0).unwrap();
        assert_eq!(usage.value(), 0xE0);
    }

    #[test]
    fn test_encode_preserves_width() {
        let mut out = Vec::new();
        ReportItem::short(ItemTag::LogicalMaximum, 2, 0x00FF).unwrap().encode(&mut out);
        ReportItem::short(ItemTag::EndCollection, 0, 0).unwrap().encode(&mut out);
        ReportItem::short(ItemTag::Unit, 4, 0x0000_1001).unwrap().encode(&mut out);
        assert_eq!(out, [0x26, 0xFF, 0x00, 0xC0, 0x67, 0x01, 0x10, 0x00, 0x00]);
    }

    #[test]
    fn test_encode_long_item() {
        let mut out = Vec::new();
        ReportItem::long(0x42, vec![1, 2, 3]).unwrap().encode(&mut out);
        assert_eq!(out, [LONG_ITEM_PREFIX, 3, 0x42, 1, 2, 3]);
    }

    #[test]
    fn test_display() {
        assert_eq!(
            ReportItem::short(ItemTag::UsagePage, 1, 0x01).unwrap().to_string(),
            "UsagePage(0x01)"
        );
        assert_eq!(
            ReportItem::short(ItemTag::LogicalMinimum, 1, 0x81).unwrap().to_string(),
            "LogicalMinimum(-127)"
        );
        assert_eq!(
            ReportItem::short(ItemTag::EndCollection, 0, 0).unwrap().to_string(),
            "EndCollection"
        );
    }

    #[test]
    fn test_unencodable_items_are_rejected() {
        assert_eq!(
            ReportItem::short(ItemTag::Usage, 3, 0).unwrap_err(),
            ItemError::InvalidSize(3)
        );
        assert_eq!(
            ReportItem::short(ItemTag::Usage, 1, 0x1FF).unwrap_err(),
            ItemError::ValueTooWide {
                size: 1,
                data: 0x1FF
            }
        );
        assert_eq!(
            ReportItem::long(0x42, vec![0; 256]).unwrap_err(),
            ItemError::LongPayloadTooLarge(256)
        );

        let mut out = Vec::new();
        ReportItem::long(0x42, vec![0; MAX_LONG_ITEM_DATA])
            .unwrap()
            .encode(&mut out);
        assert_eq!(out[1], 0xFF);
        assert_eq!(out.len(), LONG_ITEM_HEADER_LEN + MAX_LONG_ITEM_DATA);
    }
}
