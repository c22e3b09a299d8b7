// Axel '0vercl0k' Souchet - June 9 2025
//! This walks the four-level x86-64 page-table hierarchy stored in a dump and
//! streams out every present leaf mapping, in ascending virtual-address
//! order.
use log::warn;

use crate::dump::PhysicalMemory;
use crate::error::{ClairvoyanceError, Result};
use crate::gxa::{Gpa, Gva, Gxa};
use crate::page::{Page, PageKind, RawPage};
use crate::protection::Protection;
use crate::pxe::Pxe;

/// Number of PXEs in a directory page.
const NUMBER_ENTRIES: usize = (Page::size() as usize) / size_of::<u64>();

/// Read the PXE stored at index `idx` of a directory page.
fn pxe_at(directory: &RawPage, idx: usize) -> Pxe {
    let offset = idx * size_of::<u64>();

    Pxe::from(u64::from_le_bytes(
        directory[offset..offset + size_of::<u64>()].try_into().unwrap(),
    ))
}

/// A present leaf mapping: one virtual range that is backed by a physical
/// page, along with every PXE the hardware reads to get there and where those
/// PXEs live in physical memory.
///
/// For a [`PageKind::Huge`] mapping the PDE / PTE fields are zero, for a
/// [`PageKind::Large`] mapping the PTE fields are zero; the hardware walk
/// stops before reaching them.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub struct LeafMapping {
    pub pml4e: Pxe,
    pub pml4e_address: Gpa,
    pub pdpte: Pxe,
    pub pdpte_address: Gpa,
    pub pde: Pxe,
    pub pde_address: Gpa,
    pub pte: Pxe,
    pub pte_address: Gpa,
    /// The lowest physical address the leaf covers.
    pub physical_base: Gpa,
    /// The lowest virtual address the leaf covers; canonical, page-aligned.
    pub virtual_base: Gva,
    pub kind: PageKind,
}

impl LeafMapping {
    /// Compute the effective protection of the pages this leaf maps, folding
    /// the PXE levels the hardware actually used.
    pub fn protection(&self) -> Protection {
        match self.kind {
            PageKind::Huge => Protection::from_pxes(&[self.pml4e, self.pdpte]),
            PageKind::Large => Protection::from_pxes(&[self.pml4e, self.pdpte, self.pde]),
            PageKind::Normal => {
                Protection::from_pxes(&[self.pml4e, self.pdpte, self.pde, self.pte])
            }
        }
    }
}

/// Walks the page-table hierarchy rooted at a directory table base, yielding
/// a [`LeafMapping`] for every present leaf.
///
/// The walker keeps one cursor per level and resumes from where the last
/// [`Iterator::next`] stopped, so consumers get backpressure for free: no
/// leaf is decoded before it is asked for. Moving a cursor at some level
/// drops the directories borrowed below it; at most four pages are borrowed
/// at any time.
///
/// A present entry can point to a directory page that the dump doesn't
/// contain (sparse / kernel-only dumps); the walker logs it and skips the
/// parent entry, it is never fatal.
pub struct PageTableWalker<'dump, D> {
    dump: &'dump D,
    /// Physical address of the PML4 page, page-aligned.
    directory_base: Gpa,
    pml4: &'dump RawPage,
    pdpt: Option<&'dump RawPage>,
    pd: Option<&'dump RawPage>,
    pt: Option<&'dump RawPage>,
    pml4_idx: usize,
    pdpt_idx: usize,
    pd_idx: usize,
    pt_idx: usize,
}

impl<'dump, D> PageTableWalker<'dump, D>
where
    D: PhysicalMemory,
{
    /// Create a walker off `dump`, starting at `directory_base`.
    ///
    /// # Errors
    ///
    /// Fails with [`ClairvoyanceError::RootMissing`] if the PML4 page is not
    /// part of the dump; there is nothing to walk in that case.
    pub fn new(dump: &'dump D, directory_base: Gpa) -> Result<Self> {
        // Aligning in case PCID bits are set (bits 11:0).
        let directory_base = directory_base.page_align();
        let pml4 = dump
            .physical_page(directory_base)
            .ok_or(ClairvoyanceError::RootMissing(directory_base))?;

        Ok(Self {
            dump,
            directory_base,
            pml4,
            pdpt: None,
            pd: None,
            pt: None,
            pml4_idx: 0,
            pdpt_idx: 0,
            pd_idx: 0,
            pt_idx: 0,
        })
    }

    /// Move to the next PML4E; every directory below is stale.
    fn next_pml4e(&mut self) {
        self.pml4_idx += 1;
        self.pdpt = None;
        self.pd = None;
        self.pt = None;
    }

    /// Move to the next PDPTE.
    fn next_pdpte(&mut self) {
        self.pdpt_idx += 1;
        self.pd = None;
        self.pt = None;
    }

    /// Move to the next PDE.
    fn next_pde(&mut self) {
        self.pd_idx += 1;
        self.pt = None;
    }

    /// Physical address of the current PML4E.
    fn pml4e_address(&self) -> Gpa {
        Gpa::new(self.directory_base.u64() + (self.pml4_idx as u64 * 8))
    }

    /// Physical address of the current PDPTE.
    fn pdpte_address(&self, pml4e: Pxe) -> Gpa {
        Gpa::new(pml4e.pfn.gpa().u64() + (self.pdpt_idx as u64 * 8))
    }

    /// Physical address of the current PDE.
    fn pde_address(&self, pdpte: Pxe) -> Gpa {
        Gpa::new(pdpte.pfn.gpa().u64() + (self.pd_idx as u64 * 8))
    }

    /// Physical address of the current PTE.
    fn pte_address(&self, pde: Pxe) -> Gpa {
        Gpa::new(pde.pfn.gpa().u64() + (self.pt_idx as u64 * 8))
    }

    /// Build the leaf for a huge page (1GB); the walk stopped at the PDPTE.
    fn huge_leaf(&self, pml4e: Pxe, pdpte: Pxe) -> LeafMapping {
        LeafMapping {
            pml4e,
            pml4e_address: self.pml4e_address(),
            pdpte,
            pdpte_address: self.pdpte_address(pml4e),
            pde: Pxe::from(0),
            pde_address: Gpa::new(0),
            pte: Pxe::from(0),
            pte_address: Gpa::new(0),
            physical_base: pdpte.pfn.gpa(),
            virtual_base: Gva::from_indices(self.pml4_idx as u64, self.pdpt_idx as u64, 0, 0),
            kind: PageKind::Huge,
        }
    }

    /// Build the leaf for a large page (2MB); the walk stopped at the PDE.
    fn large_leaf(&self, pml4e: Pxe, pdpte: Pxe, pde: Pxe) -> LeafMapping {
        LeafMapping {
            pml4e,
            pml4e_address: self.pml4e_address(),
            pdpte,
            pdpte_address: self.pdpte_address(pml4e),
            pde,
            pde_address: self.pde_address(pdpte),
            pte: Pxe::from(0),
            pte_address: Gpa::new(0),
            physical_base: pde.pfn.gpa(),
            virtual_base: Gva::from_indices(
                self.pml4_idx as u64,
                self.pdpt_idx as u64,
                self.pd_idx as u64,
                0,
            ),
            kind: PageKind::Large,
        }
    }

    /// Build the leaf for a normal page (4KB).
    fn normal_leaf(&self, pml4e: Pxe, pdpte: Pxe, pde: Pxe, pte: Pxe) -> LeafMapping {
        LeafMapping {
            pml4e,
            pml4e_address: self.pml4e_address(),
            pdpte,
            pdpte_address: self.pdpte_address(pml4e),
            pde,
            pde_address: self.pde_address(pdpte),
            pte,
            pte_address: self.pte_address(pde),
            physical_base: pte.pfn.gpa(),
            virtual_base: Gva::from_indices(
                self.pml4_idx as u64,
                self.pdpt_idx as u64,
                self.pd_idx as u64,
                self.pt_idx as u64,
            ),
            kind: PageKind::Normal,
        }
    }
}

impl<'dump, D> Iterator for PageTableWalker<'dump, D>
where
    D: PhysicalMemory,
{
    type Item = LeafMapping;

    fn next(&mut self) -> Option<Self::Item> {
        // First level.
        while self.pml4_idx < NUMBER_ENTRIES {
            let pml4e = pxe_at(self.pml4, self.pml4_idx);
            // Note that the LargePage bit is reserved at this level, so it is
            // ignored.
            if !pml4e.present() {
                self.next_pml4e();
                continue;
            }

            let pdpt = match self.pdpt {
                Some(pdpt) => pdpt,
                None => {
                    let pdpt_base = pml4e.pfn.gpa();
                    let Some(pdpt) = self.dump.physical_page(pdpt_base) else {
                        warn!("PDPT at {pdpt_base} is not in the dump, skipping");
                        self.next_pml4e();
                        continue;
                    };

                    self.pdpt = Some(pdpt);
                    self.pdpt_idx = 0;
                    pdpt
                }
            };

            // Second level.
            while self.pdpt_idx < NUMBER_ENTRIES {
                let pdpte = pxe_at(pdpt, self.pdpt_idx);
                if !pdpte.present() {
                    self.next_pdpte();
                    continue;
                }

                // Huge page (1GB).
                if pdpte.large_page() {
                    let leaf = self.huge_leaf(pml4e, pdpte);
                    self.next_pdpte();
                    return Some(leaf);
                }

                let pd = match self.pd {
                    Some(pd) => pd,
                    None => {
                        let pd_base = pdpte.pfn.gpa();
                        let Some(pd) = self.dump.physical_page(pd_base) else {
                            warn!("PD at {pd_base} is not in the dump, skipping");
                            self.next_pdpte();
                            continue;
                        };

                        self.pd = Some(pd);
                        self.pd_idx = 0;
                        pd
                    }
                };

                // Third level.
                while self.pd_idx < NUMBER_ENTRIES {
                    let pde = pxe_at(pd, self.pd_idx);
                    if !pde.present() {
                        self.next_pde();
                        continue;
                    }

                    // Large page (2MB).
                    if pde.large_page() {
                        let leaf = self.large_leaf(pml4e, pdpte, pde);
                        self.next_pde();
                        return Some(leaf);
                    }

                    let pt = match self.pt {
                        Some(pt) => pt,
                        None => {
                            let pt_base = pde.pfn.gpa();
                            let Some(pt) = self.dump.physical_page(pt_base) else {
                                warn!("PT at {pt_base} is not in the dump, skipping");
                                self.next_pde();
                                continue;
                            };

                            self.pt = Some(pt);
                            self.pt_idx = 0;
                            pt
                        }
                    };

                    // Fourth level.
                    while self.pt_idx < NUMBER_ENTRIES {
                        let pte = pxe_at(pt, self.pt_idx);
                        if !pte.present() {
                            self.pt_idx += 1;
                            continue;
                        }

                        let leaf = self.normal_leaf(pml4e, pdpte, pde, pte);
                        self.pt_idx += 1;
                        return Some(leaf);
                    }

                    self.next_pde();
                }

                self.next_pdpte();
            }

            self.next_pml4e();
        }

        None
    }
}
