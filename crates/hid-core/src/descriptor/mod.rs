//! HID report descriptor decoding.

pub mod item;
pub mod parser;
pub mod report;

pub use item::{ItemError, ItemTag, ItemType, ReportItem};
pub use parser::{ItemsDescriptor, Nesting, ParseError, parse_items};
pub use report::ReportSize;
