//! Report descriptor parser.
//!
//! Produces the flat item stream of a descriptor. Global/local state is not
//! resolved here, except for the report size accounting in [`super::report`].

use byteorder::{ByteOrder, LittleEndian};
use thiserror::Error;
use tracing::{trace, warn};

use super::item::{
    ItemTag, ItemType, LONG_ITEM_HEADER_LEN, LONG_ITEM_PREFIX, ReportItem,
};
use super::report::{self, ReportSize};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    #[error("Truncated item at offset {offset}: needs {needed} bytes, {available} available")]
    TruncatedItem {
        offset: usize,
        needed: usize,
        available: usize,
    },
}

/// Collection nesting observed while parsing.
///
/// Devices with unbalanced collections exist, so an imbalance is recorded
/// here instead of failing the parse.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Nesting {
    pub max_depth: usize,
    /// End Collection items seen at depth zero.
    pub unmatched_ends: usize,
    /// Collections still open at the end of the buffer.
    pub unclosed: usize,
}

impl Nesting {
    pub fn is_balanced(&self) -> bool {
        self.unmatched_ends == 0 && self.unclosed == 0
    }
}

/// The parsed items of one report descriptor, in source order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ItemsDescriptor {
    items: Vec<ReportItem>,
    length: usize,
    nesting: Nesting,
}

impl ItemsDescriptor {
    pub fn items(&self) -> &[ReportItem] {
        &self.items
    }

    pub fn iter(&self) -> std::slice::Iter<'_, ReportItem> {
        self.items.iter()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Length of the source buffer in bytes.
    pub fn byte_len(&self) -> usize {
        self.length
    }

    pub fn nesting(&self) -> Nesting {
        self.nesting
    }

    /// Re-encode the items. For a parsed descriptor this reproduces the input.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(self.length);
        for item in &self.items {
            item.encode(&mut buf);
        }
        buf
    }

    /// Report IDs declared by the descriptor. `0` stands for fields defined
    /// before any Report ID item.
    pub fn report_ids(&self) -> Vec<u8> {
        report::tally(&self.items).into_keys().collect()
    }

    /// Byte sizes of the input, output and feature reports with the given ID.
    pub fn report_size(&self, report_id: u8) -> Option<ReportSize> {
        report::tally(&self.items)
            .get(&report_id)
            .map(|bits| bits.to_bytes(report_id))
    }
}

impl<'a> IntoIterator for &'a ItemsDescriptor {
    type Item = &'a ReportItem;
    type IntoIter = std::slice::Iter<'a, ReportItem>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.iter()
    }
}

/// Parse a raw report descriptor into its items.
pub fn parse_items(bytes: &[u8]) -> Result<ItemsDescriptor, ParseError> {
    let mut items = Vec::new();
    let mut nesting = Nesting::default();
    let mut depth = 0usize;
    let mut offset = 0usize;

    while offset < bytes.len() {
        let item = if bytes[offset] == LONG_ITEM_PREFIX {
            parse_long_item(bytes, offset)?
        } else {
            parse_short_item(bytes, offset)?
        };

        match item.tag {
            ItemTag::Collection => {
                depth += 1;
                nesting.max_depth = nesting.max_depth.max(depth);
            }
            ItemTag::EndCollection => {
                if depth == 0 {
                    nesting.unmatched_ends += 1;
                } else {
                    depth -= 1;
                }
            }
            _ => {}
        }

        offset += item.encoded_len();
        items.push(item);
    }
    nesting.unclosed = depth;

    if !nesting.is_balanced() {
        warn!(
            unmatched_ends = nesting.unmatched_ends,
            unclosed = nesting.unclosed,
            "Unbalanced collections in report descriptor"
        );
    }
    trace!(items = items.len(), bytes = bytes.len(), "Parsed report descriptor");

    Ok(ItemsDescriptor {
        items,
        length: bytes.len(),
        nesting,
    })
}

fn parse_short_item(bytes: &[u8], offset: usize) -> Result<ReportItem, ParseError> {
    let prefix = bytes[offset];
    let size = ReportItem::short_size(prefix);
    let available = bytes.len() - offset;
    if 1 + size > available {
        return Err(ParseError::TruncatedItem {
            offset,
            needed: 1 + size,
            available,
        });
    }

    let data = if size == 0 {
        0
    } else {
        LittleEndian::read_uint(&bytes[offset + 1..offset + 1 + size], size) as u32
    };
    let item_type = ItemType::from_bits(prefix >> 2);

    Ok(ReportItem {
        tag: ItemTag::from_short(item_type, prefix >> 4),
        size: size as u8,
        data,
        offset,
        long_data: Vec::new(),
    })
}

fn parse_long_item(bytes: &[u8], offset: usize) -> Result<ReportItem, ParseError> {
    let available = bytes.len() - offset;
    if available < LONG_ITEM_HEADER_LEN {
        return Err(ParseError::TruncatedItem {
            offset,
            needed: LONG_ITEM_HEADER_LEN,
            available,
        });
    }

    let data_len = bytes[offset + 1] as usize;
    let needed = LONG_ITEM_HEADER_LEN + data_len;
    if needed > available {
        return Err(ParseError::TruncatedItem {
            offset,
            needed,
            available,
        });
    }

    let start = offset + LONG_ITEM_HEADER_LEN;
    Ok(ReportItem {
        tag: ItemTag::Long {
            tag: bytes[offset + 2],
        },
        size: bytes[offset + 1],
        data: 0,
        offset,
        long_data: bytes[start..start + data_len].to_vec(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor::fixtures::BOOT_KEYBOARD;

    const MOUSE_BUTTONS: &[u8] = &[
        0x05, 0x01, 0x09, 0x06, 0x15, 0x00, 0x25, 0x01, 0x75, 0x01, 0x95, 0x08, 0x81, 0x02,
    ];

    #[test]
    fn test_parse_simple_descriptor() {
        let desc = parse_items(MOUSE_BUTTONS).unwrap();
        let summary: Vec<(ItemTag, i64)> = desc.iter().map(|i| (i.tag, i.value())).collect();
        assert_eq!(
            summary,
            vec![
                (ItemTag::UsagePage, 1),
                (ItemTag::Usage, 6),
                (ItemTag::LogicalMinimum, 0),
                (ItemTag::LogicalMaximum, 1),
                (ItemTag::ReportSize, 1),
                (ItemTag::ReportCount, 8),
                (ItemTag::Input, 0x02),
            ]
        );
        let offsets: Vec<usize> = desc.iter().map(|i| i.offset).collect();
        assert_eq!(offsets, vec![0, 2, 4, 6, 8, 10, 12]);
        assert_eq!(desc.byte_len(), MOUSE_BUTTONS.len());
    }

    #[test]
    fn test_empty_buffer() {
        let desc = parse_items(&[]).unwrap();
        assert!(desc.is_empty());
        assert!(desc.nesting().is_balanced());
    }

    #[test]
    fn test_item_spans_cover_input() {
        let desc = parse_items(BOOT_KEYBOARD).unwrap();
        let mut expected_offset = 0;
        for item in &desc {
            assert_eq!(item.offset, expected_offset);
            expected_offset += item.encoded_len();
        }
        assert_eq!(expected_offset, BOOT_KEYBOARD.len());
    }

    #[test]
    fn test_reencode_is_stable() {
        let desc = parse_items(BOOT_KEYBOARD).unwrap();
        let bytes = desc.to_bytes();
        assert_eq!(bytes, BOOT_KEYBOARD);
        assert_eq!(parse_items(&bytes).unwrap(), desc);
    }

    #[test]
    fn test_truncated_short_item() {
        // Logical Maximum declares 2 data bytes, only 1 follows
        let err = parse_items(&[0x05, 0x01, 0x26, 0xFF]).unwrap_err();
        assert_eq!(
            err,
            ParseError::TruncatedItem {
                offset: 2,
                needed: 3,
                available: 2
            }
        );
    }

    #[test]
    fn test_every_truncation_fails() {
        for len in 1..BOOT_KEYBOARD.len() {
            let cut = &BOOT_KEYBOARD[..len];
            let item_boundary = parse_items(BOOT_KEYBOARD)
                .unwrap()
                .iter()
                .any(|i| i.offset == len);
            match parse_items(cut) {
                Ok(_) => assert!(item_boundary, "len {} parsed mid-item", len),
                Err(ParseError::TruncatedItem { .. }) => assert!(!item_boundary),
            }
        }
    }

    #[test]
    fn test_long_items() {
        let bytes = [0x05, 0x01, LONG_ITEM_PREFIX, 0x02, 0x10, 0xAA, 0xBB, 0xC0];
        let desc = parse_items(&bytes).unwrap();
        assert_eq!(desc.len(), 3);
        assert_eq!(desc.items()[1].tag, ItemTag::Long { tag: 0x10 });
        assert_eq!(desc.items()[1].long_data, vec![0xAA, 0xBB]);
        assert_eq!(desc.items()[2].offset, 7);
        assert_eq!(desc.to_bytes(), bytes);
    }

    #[test]
    fn test_truncated_long_item() {
        assert!(matches!(
            parse_items(&[LONG_ITEM_PREFIX, 0x04]),
            Err(ParseError::TruncatedItem { needed: 3, .. })
        ));
        assert!(matches!(
            parse_items(&[LONG_ITEM_PREFIX, 0x04, 0x10, 0x01]),
            Err(ParseError::TruncatedItem { needed: 7, available: 4, .. })
        ));
    }

    #[test]
    fn test_reserved_tags_are_kept() {
        // Main item with tag 0xD is not assigned
        let desc = parse_items(&[0xD1, 0x33, 0x09, 0x01]).unwrap();
        assert_eq!(
            desc.items()[0].tag,
            ItemTag::Reserved {
                item_type: ItemType::Main,
                tag: 0xD
            }
        );
        assert_eq!(desc.items()[0].data, 0x33);
        assert_eq!(desc.items()[1].tag, ItemTag::Usage);
        assert_eq!(desc.to_bytes(), [0xD1, 0x33, 0x09, 0x01]);
    }

    #[test]
    fn test_unbalanced_nesting_is_tolerated() {
        // Collection, Collection, End Collection
        let desc = parse_items(&[0xA1, 0x01, 0xA1, 0x00, 0xC0]).unwrap();
        assert_eq!(
            desc.nesting(),
            Nesting {
                max_depth: 2,
                unmatched_ends: 0,
                unclosed: 1
            }
        );

        let desc = parse_items(&[0xC0, 0xA1, 0x01, 0xC0]).unwrap();
        assert_eq!(desc.nesting().unmatched_ends, 1);
        assert_eq!(desc.nesting().unclosed, 0);
        assert!(!desc.nesting().is_balanced());
    }

    #[test]
    fn test_four_byte_payload() {
        let desc = parse_items(&[0x27, 0xFF, 0xFF, 0x00, 0x00]).unwrap();
        assert_eq!(desc.items()[0].tag, ItemTag::LogicalMaximum);
        assert_eq!(desc.items()[0].size, 4);
        assert_eq!(desc.items()[0].value(), 0xFFFF);
    }
}
