// Axel '0vercl0k' Souchet - June 10 2025
//! The effective protection of a virtual page, folded over the PXEs the
//! hardware walks through to reach it.
use std::fmt::{self, Display};

use crate::error::ClairvoyanceError;
use crate::pxe::Pxe;

/// The effective protection of a 4KB virtual page. This is what colors a
/// pixel; the ordinals are the wire encoding of the record file and are
/// stable.
#[derive(Debug, Clone, Copy, Eq, Hash, PartialEq)]
#[repr(u8)]
pub enum Protection {
    /// Not backed by anything; this is what gap pixels are made of and it is
    /// never the protection of a mapped page.
    None = 0,
    UserRead = 1,
    UserReadExec = 2,
    UserReadWrite = 3,
    UserReadWriteExec = 4,
    KernelRead = 5,
    KernelReadExec = 6,
    KernelReadWrite = 7,
    KernelReadWriteExec = 8,
}

impl Protection {
    /// Fold the PXEs walked through to reach a page - root first, only the
    /// levels the hardware used - into the page's effective protection.
    ///
    /// The access check takes the minimum of the User/Write bits and the
    /// maximum of the NX bit across the walk.
    ///
    /// # Examples
    ///
    /// ```
    /// # use clairvoyance::{Protection, Pxe};
    /// let pxes = [Pxe::from(0x2709063), Pxe::from(0x270A063)];
    /// assert_eq!(Protection::from_pxes(&pxes), Protection::KernelReadWriteExec);
    /// ```
    pub fn from_pxes(pxes: &[Pxe]) -> Self {
        debug_assert!((2..=4).contains(&pxes.len()));
        let user_accessible = pxes.iter().all(Pxe::user_accessible);
        let writable = pxes.iter().all(Pxe::writable);
        let executable = pxes.iter().all(Pxe::executable);

        match (user_accessible, writable, executable) {
            (true, true, true) => Self::UserReadWriteExec,
            (true, true, false) => Self::UserReadWrite,
            (true, false, true) => Self::UserReadExec,
            (true, false, false) => Self::UserRead,
            (false, true, true) => Self::KernelReadWriteExec,
            (false, true, false) => Self::KernelReadWrite,
            (false, false, true) => Self::KernelReadExec,
            (false, false, false) => Self::KernelRead,
        }
    }
}

/// Decode a protection off its wire encoding.
impl TryFrom<u8> for Protection {
    type Error = ClairvoyanceError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Self::None),
            1 => Ok(Self::UserRead),
            2 => Ok(Self::UserReadExec),
            3 => Ok(Self::UserReadWrite),
            4 => Ok(Self::UserReadWriteExec),
            5 => Ok(Self::KernelRead),
            6 => Ok(Self::KernelReadExec),
            7 => Ok(Self::KernelReadWrite),
            8 => Ok(Self::KernelReadWriteExec),
            _ => Err(ClairvoyanceError::InvalidProtection(value)),
        }
    }
}

impl Display for Protection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::None => "None",
            Self::UserRead => "UserRead",
            Self::UserReadExec => "UserReadExec",
            Self::UserReadWrite => "UserReadWrite",
            Self::UserReadWriteExec => "UserReadWriteExec",
            Self::KernelRead => "KernelRead",
            Self::KernelReadExec => "KernelReadExec",
            Self::KernelReadWrite => "KernelReadWrite",
            Self::KernelReadWriteExec => "KernelReadWriteExec",
        };

        write!(f, "{s}")
    }
}

#[cfg(test)]
mod tests {
    use super::Protection;
    use crate::pxe::Pxe;

    const PRESENT: u64 = 1 << 0;
    const WRITE: u64 = 1 << 1;
    const USER: u64 = 1 << 2;
    const NX: u64 = 1 << 63;

    fn path(flags: [u64; 4]) -> [Pxe; 4] {
        flags.map(|f| Pxe::from(f | PRESENT))
    }

    /// Uniform paths fold onto themselves.
    #[test]
    fn uniform() {
        let rwx = path([WRITE | USER; 4]);
        assert_eq!(Protection::from_pxes(&rwx), Protection::UserReadWriteExec);

        let kr = path([NX; 4]);
        assert_eq!(Protection::from_pxes(&kr), Protection::KernelRead);
    }

    /// A single restrictive level restricts the whole path, wherever it sits.
    #[test]
    fn monotonic() {
        for level in 0..4 {
            let mut flags = [WRITE | USER; 4];
            flags[level] &= !USER;
            assert_eq!(
                Protection::from_pxes(&path(flags)),
                Protection::KernelReadWriteExec
            );

            let mut flags = [WRITE | USER; 4];
            flags[level] &= !WRITE;
            assert_eq!(Protection::from_pxes(&path(flags)), Protection::UserReadExec);

            let mut flags = [WRITE | USER; 4];
            flags[level] |= NX;
            assert_eq!(Protection::from_pxes(&path(flags)), Protection::UserReadWrite);
        }
    }

    /// Two-level paths are what huge pages fold.
    #[test]
    fn short_paths() {
        let pxes = [Pxe::from(PRESENT | WRITE), Pxe::from(PRESENT | WRITE | NX)];
        assert_eq!(Protection::from_pxes(&pxes), Protection::KernelReadWrite);
    }
}
