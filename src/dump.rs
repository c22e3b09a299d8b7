// Axel '0vercl0k' Souchet - June 7 2025
//! Everything needed to see a crash-dump as physical memory: the
//! [`PhysicalMemory`] trait the page-table walker consumes, and its
//! production implementation [`DumpView`] built on top of the `kdmp-parser`
//! crate & a read-only memory mapping of the dump file.
use std::collections::BTreeMap;
use std::path::Path;

use kdmp_parser::{DumpType, KernelDumpParser};
use log::warn;

use crate::error::Result;
use crate::gxa::{Gpa, Gxa};
use crate::map::MappedFile;
use crate::page::{Page, RawPage};

/// The physical memory captured by a crash-dump. This is the boundary between
/// the address-space reconstruction and the dump parsing: anything that can
/// serve 4KB physical pages can get its page tables walked, which is also how
/// the tests drive the walker over hand-crafted address spaces.
pub trait PhysicalMemory {
    /// Get the physical page backing `gpa`. Sparse / kernel-only dumps don't
    /// have every page, in which case this is `None`.
    fn physical_page(&self, gpa: Gpa) -> Option<&RawPage>;

    /// Get the directory table base the dump was taken with; the root of the
    /// page-table hierarchy (what CR3 held).
    fn directory_table_base(&self) -> Gpa;

    /// What kind of dump is it?
    fn dump_type(&self) -> DumpType;
}

/// The physical memory map maps a physical address to a file offset.
type PhysmemMap = BTreeMap<Gpa, u64>;

/// A crash-dump parsed & memory mapped, ready to serve physical pages as
/// slices of the mapping.
#[derive(Debug)]
pub struct DumpView<'map> {
    /// The dump file, memory mapped read-only.
    mapped: MappedFile<'map>,
    /// Where every physical page lives in the file.
    physmem: PhysmemMap,
    directory_table_base: Gpa,
    dump_type: DumpType,
}

impl DumpView<'_> {
    /// Parse the dump at `dump_path` and memory map it.
    pub fn new(dump_path: &Path) -> Result<Self> {
        // Have the parser make sense of the headers & of where the physical
        // pages are stored in the file..
        let parser = KernelDumpParser::new(&dump_path)?;
        let dump_type = parser.dump_type();
        if dump_type != DumpType::Full {
            warn!(
                "{} is not a full dump, some mappings might be missing",
                dump_path.display()
            );
        }

        let directory_table_base = Gpa::new(parser.headers().directory_table_base);
        let physmem = parser
            .physmem()
            .map(|(gpa, offset)| (Gpa::new(gpa.into()), offset))
            .collect();
        drop(parser);

        // ..and map the file to serve page content without copying it around.
        let mapped = MappedFile::new(dump_path)?;

        Ok(Self {
            mapped,
            physmem,
            directory_table_base,
            dump_type,
        })
    }
}

impl PhysicalMemory for DumpView<'_> {
    fn physical_page(&self, gpa: Gpa) -> Option<&RawPage> {
        let offset = *self.physmem.get(&gpa.page_align())?;
        let offset = usize::try_from(offset).ok()?;
        let end = offset.checked_add(Page::size() as usize)?;

        // A truncated dump could have a run pointing past the end of the
        // file; treat those pages as missing.
        self.mapped.data().get(offset..end)?.try_into().ok()
    }

    fn directory_table_base(&self) -> Gpa {
        self.directory_table_base
    }

    fn dump_type(&self) -> DumpType {
        self.dump_type
    }
}
