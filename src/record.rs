// Axel '0vercl0k' Souchet - June 14 2025
//! Serialization of a tape into the record file the viewer consumes, and the
//! parsing back (which is also what the viewer implements).
//!
//! The record is newline-delimited ASCII. The first line carries the
//! dimensions of the grid; then, a line starting with `0x` opens a region
//! with that virtual base, any other line is the protection of the next
//! pixel, in hexadecimal without a `0x` prefix.
use std::io::{self, BufRead, Write};

use crate::error::{ClairvoyanceError, Result};
use crate::gxa::{Gva, Gxa};
use crate::hilbert;
use crate::protection::Protection;
use crate::tape::{Region, Tape};

/// Write `tape` out as a record.
pub fn write_record(w: &mut impl Write, tape: &Tape) -> io::Result<()> {
    let order = tape.order();
    writeln!(w, "{} {}", hilbert::width(order), hilbert::height(order))?;
    let mut start = 0;
    for region in tape.regions() {
        writeln!(w, "{:#x}", region.virtual_base.u64())?;
        for &pixel in &tape.pixels()[start..region.end_distance as usize] {
            writeln!(w, "{:x}", pixel as u8)?;
        }

        start = region.end_distance as usize;
    }

    Ok(())
}

/// Parse a record back into a [`Tape`].
///
/// # Errors
///
/// Fails if the dimension line is missing or inconsistent, if a protection
/// value is out of range or if a pixel shows up before any region opened.
pub fn read_record(r: impl BufRead) -> Result<Tape> {
    let mut lines = r.lines();
    let Some(dimensions) = lines.next() else {
        return Err(ClairvoyanceError::InvalidRecord("no dimension line"));
    };

    let dimensions = dimensions?;
    let (width, height) = dimensions
        .split_once(' ')
        .ok_or(ClairvoyanceError::InvalidRecord("malformed dimension line"))?;
    let width = width.parse::<u64>()?;
    let height = height.parse::<u64>()?;
    if width != height || !width.is_power_of_two() {
        return Err(ClairvoyanceError::InvalidRecord(
            "dimensions should be equal powers of two",
        ));
    }

    let mut pixels = Vec::new();
    let mut regions = Vec::new();
    // The base of the region being accumulated, if any.
    let mut open = None;
    for line in lines {
        let line = line?;
        if let Some(hex) = line.strip_prefix("0x") {
            let base = Gva::new(u64::from_str_radix(hex, 16)?);
            if let Some(virtual_base) = open.replace(base) {
                regions.push(Region {
                    virtual_base,
                    end_distance: pixels.len() as u64,
                });
            }
        } else {
            if open.is_none() {
                return Err(ClairvoyanceError::InvalidRecord(
                    "protection value before any region",
                ));
            }

            let value = u8::from_str_radix(&line, 16)?;
            pixels.push(Protection::try_from(value)?);
        }
    }

    if let Some(virtual_base) = open {
        regions.push(Region {
            virtual_base,
            end_distance: pixels.len() as u64,
        });
    }

    Ok(Tape::from_parts(pixels, regions))
}

#[cfg(test)]
mod tests {
    use super::{read_record, write_record};
    use crate::error::ClairvoyanceError;
    use crate::tape::Tape;

    /// An empty tape is a bare dimension line.
    #[test]
    fn empty() {
        let tape = Tape::default();
        let mut record = Vec::new();
        write_record(&mut record, &tape).unwrap();
        assert_eq!(record, b"1 1\n");
        assert_eq!(read_record(record.as_slice()).unwrap(), tape);
    }

    #[test]
    fn malformed() {
        assert!(matches!(
            read_record(b"1 2\n".as_slice()),
            Err(ClairvoyanceError::InvalidRecord(_))
        ));

        assert!(matches!(
            read_record(b"1 1\n4\n".as_slice()),
            Err(ClairvoyanceError::InvalidRecord(_))
        ));

        assert!(matches!(
            read_record(b"1 1\n0x1000\n9\n".as_slice()),
            Err(ClairvoyanceError::InvalidProtection(9))
        ));
    }
}
