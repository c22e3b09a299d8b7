// Axel '0vercl0k' Souchet - June 16 2025
//! End-to-end runs of the walker / tape / record pipeline over hand-crafted
//! address spaces.
use std::collections::HashMap;

use clairvoyance::{
    ClairvoyanceError, DumpType, Gpa, Gva, Gxa, MAX_GAP_PIXELS, PageKind, PageTableWalker,
    PhysicalMemory, Protection, RawPage, Region, Tape, read_record, write_record,
};

const WRITE: u64 = 1 << 1;
const USER: u64 = 1 << 2;
const LARGE: u64 = 1 << 7;
const NX: u64 = 1 << 63;

/// An in-memory "dump" made of hand-crafted physical pages.
struct SyntheticDump {
    pages: HashMap<u64, Box<RawPage>>,
    directory_table_base: u64,
}

impl SyntheticDump {
    /// The PML4 lives at pfn 1; higher pfns are for the tests to assign.
    fn new() -> Self {
        Self {
            pages: HashMap::new(),
            directory_table_base: 0x1_000,
        }
    }

    /// Write the 64-bit `value` at the physical address `pa`, materializing
    /// the page it lives in if needed.
    fn write_entry(&mut self, pa: u64, value: u64) {
        let page = self
            .pages
            .entry(pa & !0xfff)
            .or_insert_with(|| Box::new([0; 0x1_000]));
        let offset = (pa & 0xfff) as usize;
        page[offset..offset + 8].copy_from_slice(&value.to_le_bytes());
    }

    /// Wire the entry `idx` of the directory at `table_pa` to `pfn`, present
    /// plus whatever `flags` say.
    fn wire(&mut self, table_pa: u64, idx: u64, pfn: u64, flags: u64) {
        self.write_entry(table_pa + (idx * 8), (pfn << 12) | flags | 1);
    }
}

impl PhysicalMemory for SyntheticDump {
    fn physical_page(&self, gpa: Gpa) -> Option<&RawPage> {
        self.pages.get(&gpa.page_align().u64()).map(|page| &**page)
    }

    fn directory_table_base(&self) -> Gpa {
        Gpa::new(self.directory_table_base)
    }

    fn dump_type(&self) -> DumpType {
        DumpType::Full
    }
}

fn walk(dump: &SyntheticDump) -> PageTableWalker<'_, SyntheticDump> {
    PageTableWalker::new(dump, dump.directory_table_base()).unwrap()
}

/// The smallest possible address space: one user RWX page at VA 0.
#[test]
fn single_normal_page() {
    let mut dump = SyntheticDump::new();
    dump.wire(0x1_000, 0, 2, WRITE | USER);
    dump.wire(0x2_000, 0, 3, WRITE | USER);
    dump.wire(0x3_000, 0, 4, WRITE | USER);
    dump.wire(0x4_000, 0, 0x1337, WRITE | USER);

    let leaves = walk(&dump).collect::<Vec<_>>();
    assert_eq!(leaves.len(), 1);
    let leaf = leaves[0];
    assert_eq!(leaf.kind, PageKind::Normal);
    assert_eq!(leaf.virtual_base, Gva::new(0));
    assert_eq!(leaf.physical_base, Gpa::new(0x1337_000));
    assert_eq!(leaf.pml4e_address, Gpa::new(0x1_000));
    assert_eq!(leaf.pdpte_address, Gpa::new(0x2_000));
    assert_eq!(leaf.pde_address, Gpa::new(0x3_000));
    assert_eq!(leaf.pte_address, Gpa::new(0x4_000));
    assert_eq!(leaf.protection(), Protection::UserReadWriteExec);

    let tape = Tape::build(walk(&dump));
    assert_eq!(tape.pixels(), [Protection::UserReadWriteExec].as_slice());
    assert_eq!(
        tape.regions(),
        [Region {
            virtual_base: Gva::new(0),
            end_distance: 1
        }]
        .as_slice()
    );

    let mut record = Vec::new();
    write_record(&mut record, &tape).unwrap();
    assert_eq!(record, b"1 1\n0x0\n4\n");
}

/// One kernel huge page expands into 1GB worth of pixels & sign-extends its
/// virtual base.
#[test]
fn huge_page_at_kernel_base() {
    let mut dump = SyntheticDump::new();
    dump.wire(0x1_000, 256, 2, WRITE);
    dump.wire(0x2_000, 0, 0x2400, WRITE | LARGE | NX);

    let leaves = walk(&dump).collect::<Vec<_>>();
    assert_eq!(leaves.len(), 1);
    let leaf = leaves[0];
    assert_eq!(leaf.kind, PageKind::Huge);
    assert_eq!(leaf.virtual_base, Gva::new(0xffff_8000_0000_0000));
    assert_eq!(leaf.physical_base, Gpa::new(0x2_400_000));
    assert_eq!(u64::from(leaf.pde), 0);
    assert_eq!(u64::from(leaf.pte), 0);

    let tape = Tape::build(walk(&dump));
    assert_eq!(tape.len(), 262_144);
    assert!(
        tape.pixels()
            .iter()
            .all(|&pixel| pixel == Protection::KernelReadWrite)
    );
    assert_eq!(
        tape.regions(),
        [Region {
            virtual_base: Gva::new(0xffff_8000_0000_0000),
            end_distance: 262_144
        }]
        .as_slice()
    );
    assert_eq!(tape.order(), 9);
}

/// A hole smaller than the cap is filled in-place and doesn't split the
/// region.
#[test]
fn gap_within_cap() {
    let mut dump = SyntheticDump::new();
    dump.wire(0x1_000, 0, 2, WRITE | USER);
    dump.wire(0x2_000, 0, 3, WRITE | USER);
    dump.wire(0x3_000, 0, 4, WRITE | USER);
    dump.wire(0x3_000, 2, 5, WRITE | USER);
    dump.wire(0x4_000, 0, 0x10, WRITE | USER);
    // 1'024 pages after the first one.
    dump.wire(0x5_000, 0, 0x11, WRITE | USER);

    let tape = Tape::build(walk(&dump));
    assert_eq!(tape.len(), 1 + 1_023 + 1);
    assert!(
        tape.pixels()[1..1_024]
            .iter()
            .all(|&pixel| pixel == Protection::None)
    );
    assert_eq!(tape.pixels()[1_024], Protection::UserReadWriteExec);
    assert_eq!(
        tape.regions(),
        [Region {
            virtual_base: Gva::new(0),
            end_distance: 1_025
        }]
        .as_slice()
    );
    // Fillers still reverse-map to meaningful addresses.
    assert_eq!(tape.virtual_address(1), Some(Gva::new(0x1_000)));
    assert_eq!(tape.virtual_address(1_024), Some(Gva::new(0x40_0000)));
}

/// A hole bigger than the cap stops filling and splits the region.
#[test]
fn gap_exceeding_cap() {
    let mut dump = SyntheticDump::new();
    dump.wire(0x1_000, 0, 2, WRITE | USER);
    dump.wire(0x2_000, 0, 3, WRITE | USER);
    dump.wire(0x3_000, 0, 4, WRITE | USER);
    dump.wire(0x3_000, 39, 5, WRITE | USER);
    dump.wire(0x4_000, 0, 0x10, WRITE | USER);
    // 20'000 pages after the first one.
    dump.wire(0x5_000, 32, 0x11, WRITE | USER);

    let tape = Tape::build(walk(&dump));
    assert_eq!(tape.len(), MAX_GAP_PIXELS + 2);
    assert!(
        tape.pixels()[1..=MAX_GAP_PIXELS as usize]
            .iter()
            .all(|&pixel| pixel == Protection::None)
    );
    assert_eq!(
        tape.regions(),
        [
            Region {
                virtual_base: Gva::new(0),
                end_distance: MAX_GAP_PIXELS + 1
            },
            Region {
                virtual_base: Gva::new(0x4e2_0000),
                end_distance: MAX_GAP_PIXELS + 2
            }
        ]
        .as_slice()
    );
    assert_eq!(
        tape.virtual_address(MAX_GAP_PIXELS + 1),
        Some(Gva::new(0x4e2_0000))
    );
}

/// Directories that the dump doesn't contain only take their own subtree
/// down.
#[test]
fn missing_directories_are_skipped() {
    let mut dump = SyntheticDump::new();
    // A PDPT that is not in the dump..
    dump.wire(0x1_000, 0, 0xdead, 0);
    // ..and a sibling hierarchy w/ a missing PT under PD[0].
    dump.wire(0x1_000, 1, 2, WRITE);
    dump.wire(0x2_000, 0, 3, WRITE);
    dump.wire(0x3_000, 0, 0xbeef, WRITE);
    dump.wire(0x3_000, 1, 4, WRITE);
    dump.wire(0x4_000, 0, 0x42, WRITE);

    let leaves = walk(&dump).collect::<Vec<_>>();
    assert_eq!(leaves.len(), 1);
    assert_eq!(leaves[0].virtual_base, Gva::from_indices(1, 0, 1, 0));
}

/// No PML4 page, no walk.
#[test]
fn missing_root() {
    let dump = SyntheticDump::new();
    assert!(matches!(
        PageTableWalker::new(&dump, dump.directory_table_base()),
        Err(ClairvoyanceError::RootMissing(_))
    ));
}

/// Leaves come out in ascending virtual-address order, whatever their kind,
/// and only present entries ever come out.
#[test]
fn ascending_order_across_kinds() {
    let mut dump = SyntheticDump::new();
    dump.wire(0x1_000, 0, 2, WRITE | USER);
    dump.wire(0x2_000, 0, 3, WRITE | USER);
    dump.wire(0x3_000, 0, 4, WRITE | USER);
    dump.wire(0x4_000, 5, 0x77, WRITE | USER);
    dump.wire(0x3_000, 7, 0x800, WRITE | LARGE);
    dump.wire(0x1_000, 256, 6, WRITE);
    dump.wire(0x6_000, 0, 0x2400, WRITE | LARGE | NX);

    let leaves = walk(&dump).collect::<Vec<_>>();
    assert_eq!(leaves.len(), 3);
    assert_eq!(leaves[0].kind, PageKind::Normal);
    assert_eq!(leaves[0].virtual_base, Gva::new(5 * 0x1_000));
    assert_eq!(leaves[1].kind, PageKind::Large);
    assert_eq!(leaves[1].physical_base, Gpa::new(0x80_0000));
    assert_eq!(leaves[1].virtual_base, Gva::new(7 * 0x20_0000));
    assert_eq!(leaves[2].kind, PageKind::Huge);
    for pair in leaves.windows(2) {
        assert!(pair[1].virtual_base.u64() >= pair[0].virtual_base.u64() + pair[0].kind.size());
    }

    assert!(leaves.iter().all(|leaf| {
        leaf.pml4e.present() && leaf.pdpte.present()
    }));
}

/// What the emitter writes, the viewer reads back, bit-for-bit.
#[test]
fn record_round_trip() {
    let mut dump = SyntheticDump::new();
    dump.wire(0x1_000, 0, 2, WRITE | USER);
    dump.wire(0x2_000, 0, 3, WRITE | USER);
    dump.wire(0x3_000, 0, 4, WRITE | USER);
    dump.wire(0x3_000, 39, 5, WRITE | USER);
    dump.wire(0x4_000, 0, 0x10, WRITE | USER);
    dump.wire(0x5_000, 32, 0x11, NX);
    dump.wire(0x1_000, 256, 6, WRITE);
    dump.wire(0x6_000, 0, 0x2400, WRITE | LARGE | NX);

    let tape = Tape::build(walk(&dump));
    // Regions partition the tape.
    let mut start = 0;
    for region in tape.regions() {
        assert!(region.end_distance > start);
        start = region.end_distance;
    }
    assert_eq!(start, tape.len());

    let mut record = Vec::new();
    write_record(&mut record, &tape).unwrap();
    let parsed = read_record(record.as_slice()).unwrap();
    assert_eq!(parsed, tape);
}
