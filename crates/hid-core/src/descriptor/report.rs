//! Report size accounting over the global item state.

use std::collections::BTreeMap;

use super::item::{ItemTag, ReportItem};

/// Sizes in bytes of the reports sharing one report ID, including the ID
/// prefix byte when the ID is non-zero. Zero means no such report.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReportSize {
    pub input: usize,
    pub output: usize,
    pub feature: usize,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub(crate) struct ReportBits {
    input: u64,
    output: u64,
    feature: u64,
}

impl ReportBits {
    pub(crate) fn to_bytes(self, report_id: u8) -> ReportSize {
        let bytes = |bits: u64| {
            if bits == 0 {
                0
            } else {
                bits.div_ceil(8) as usize + usize::from(report_id != 0)
            }
        };
        ReportSize {
            input: bytes(self.input),
            output: bytes(self.output),
            feature: bytes(self.feature),
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
struct GlobalState {
    report_size: u32,
    report_count: u32,
    report_id: u8,
}

/// Sum the bits each Input/Output/Feature item contributes, keyed by report ID.
pub(crate) fn tally(items: &[ReportItem]) -> BTreeMap<u8, ReportBits> {
    let mut reports: BTreeMap<u8, ReportBits> = BTreeMap::new();
    let mut state = GlobalState::default();
    let mut stack = Vec::new();

    for item in items {
        match item.tag {
            ItemTag::ReportSize => state.report_size = item.data,
            ItemTag::ReportCount => state.report_count = item.data,
            ItemTag::ReportId => {
                state.report_id = item.data as u8;
                reports.entry(state.report_id).or_default();
            }
            ItemTag::Push => stack.push(state),
            ItemTag::Pop => {
                if let Some(saved) = stack.pop() {
                    state = saved;
                }
            }
            tag if tag.is_report_field() => {
                let bits = u64::from(state.report_size) * u64::from(state.report_count);
                let entry = reports.entry(state.report_id).or_default();
                match tag {
                    ItemTag::Input => entry.input += bits,
                    ItemTag::Output => entry.output += bits,
                    _ => entry.feature += bits,
                }
            }
            _ => {}
        }
    }

    reports
}
