// Axel '0vercl0k' Souchet - June 2 2025
#![allow(clippy::doc_markdown)]
#![doc = include_str!("../README.md")]
mod bits;
mod dump;
mod error;
mod gxa;
mod hilbert;
mod map;
mod page;
mod protection;
mod pxe;
mod record;
mod tape;
mod walker;

pub use bits::Bits;
pub use dump::{DumpView, PhysicalMemory};
pub use error::{ClairvoyanceError, Result};
pub use gxa::{Gpa, Gva, Gxa};
pub use hilbert::{coordinates_from_distance, distance_from_coordinates};
pub use kdmp_parser::DumpType;
pub use map::MappedFile;
pub use page::{Page, PageKind, RawPage};
pub use protection::Protection;
pub use pxe::{Pfn, Pxe, PxeFlags};
pub use record::{read_record, write_record};
pub use tape::{MAX_GAP_PIXELS, Region, Tape};
pub use walker::{LeafMapping, PageTableWalker};
