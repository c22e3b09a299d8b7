// Axel '0vercl0k' Souchet - June 12 2025
//! This flattens the stream of leaf mappings into the tape: one protection
//! per 4KB virtual page, indexed by the distance along the Hilbert curve the
//! viewer lays pixels on. Contiguous runs of pages are tracked as regions so
//! a distance can be mapped back to a virtual address.
use log::warn;

use crate::gxa::{Gva, Gxa};
use crate::page::Page;
use crate::protection::Protection;
use crate::walker::LeafMapping;

/// The maximum number of filler pixels a single gap materializes. A hole
/// bigger than this closes the current region and a new one starts at the
/// next mapping.
pub const MAX_GAP_PIXELS: u64 = 10_000;

/// A maximal run of consecutive 4KB virtual pages occupying consecutive
/// distances on the tape.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub struct Region {
    /// The virtual address of the region's first page. The page at distance
    /// `d` of the region is at `virtual_base + (d - start) * 4KB` where
    /// `start` is the previous region's [`Region::end_distance`] (zero for
    /// the first region).
    pub virtual_base: Gva,
    /// One past the region's last distance.
    pub end_distance: u64,
}

/// The tape and its regions. Distances index [`Tape::pixels`]; regions
/// partition it exactly.
#[derive(Debug, Default, Eq, PartialEq)]
pub struct Tape {
    pixels: Vec<Protection>,
    regions: Vec<Region>,
}

impl Tape {
    /// Drive `leaves` to exhaustion and build the tape. Super-pages are
    /// expanded into 4KB pixels sharing the leaf's protection; holes between
    /// mappings are filled with up to [`MAX_GAP_PIXELS`] pixels of
    /// [`Protection::None`].
    ///
    /// The address space usually starts with a hole; no filler is emitted for
    /// it, the first region starts at the first mapping. Same for whatever
    /// comes after the last mapping.
    pub fn build(leaves: impl Iterator<Item = LeafMapping>) -> Self {
        let mut tape = Self::default();
        let mut last_va = 0;
        let mut region_base = None;
        for leaf in leaves {
            let virtual_base = leaf.virtual_base.u64();
            match region_base {
                // The very first mapping opens the first region.
                None => region_base = Some(leaf.virtual_base),
                Some(base) => {
                    let next_va = last_va + Page::size();
                    debug_assert!(virtual_base >= next_va);
                    if virtual_base != next_va {
                        let gap_pixels = (virtual_base - next_va) / Page::size();
                        let filled = gap_pixels.min(MAX_GAP_PIXELS);
                        for _ in 0..filled {
                            tape.pixels.push(Protection::None);
                        }

                        last_va += filled * Page::size();
                        if gap_pixels > MAX_GAP_PIXELS {
                            warn!(
                                "gap from {next_va:#x} to {virtual_base:#x} is too large, starting a new region"
                            );
                            tape.regions.push(Region {
                                virtual_base: base,
                                end_distance: tape.len(),
                            });
                            region_base = Some(leaf.virtual_base);
                        }
                    }
                }
            }

            let protection = leaf.protection();
            for idx in 0..leaf.kind.pixels() {
                last_va = virtual_base + (idx * Page::size());
                tape.pixels.push(protection);
            }
        }

        if let Some(base) = region_base {
            tape.regions.push(Region {
                virtual_base: base,
                end_distance: tape.len(),
            });
        }

        tape
    }

    /// Reassemble a tape out of its parts; this is what parsing a record
    /// yields.
    pub(crate) fn from_parts(pixels: Vec<Protection>, regions: Vec<Region>) -> Self {
        Self { pixels, regions }
    }

    /// How many pixels is the tape made of?
    pub fn len(&self) -> u64 {
        self.pixels.len() as u64
    }

    pub fn is_empty(&self) -> bool {
        self.pixels.is_empty()
    }

    /// The protections, indexed by distance.
    pub fn pixels(&self) -> &[Protection] {
        &self.pixels
    }

    /// The regions, in distance order.
    pub fn regions(&self) -> &[Region] {
        &self.regions
    }

    /// The order of the Hilbert curve the tape gets laid out on.
    pub fn order(&self) -> u32 {
        if self.pixels.is_empty() {
            0
        } else {
            self.len().ilog2() / 2
        }
    }

    /// Map a distance back to the virtual address of its page; this is how
    /// the viewer answers "what virtual address is this pixel?".
    pub fn virtual_address(&self, distance: u64) -> Option<Gva> {
        let mut start = 0;
        for region in &self.regions {
            if distance < region.end_distance {
                return Some(Gva::new(
                    region.virtual_base.u64() + ((distance - start) * Page::size()),
                ));
            }

            start = region.end_distance;
        }

        None
    }
}
