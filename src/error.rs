// Axel '0vercl0k' Souchet - June 3 2025
//! This is the error type used across the codebase.
use std::error::Error;
use std::fmt::{self, Display};
use std::io;
use std::num::ParseIntError;

use kdmp_parser::KdmpParserError;

use crate::Gpa;

pub type Result<R> = std::result::Result<R, ClairvoyanceError>;

#[derive(Debug)]
pub enum ClairvoyanceError {
    /// The crash-dump could not be parsed.
    Dump(KdmpParserError),
    /// The root PML4 page is not part of the dump; nothing can be walked.
    RootMissing(Gpa),
    /// A record file doesn't follow the expected format.
    InvalidRecord(&'static str),
    /// A record file carries a protection value outside `[0..8]`.
    InvalidProtection(u8),
    /// An integer in a record file failed to parse.
    Parse(ParseIntError),
    Io(io::Error),
}

impl From<KdmpParserError> for ClairvoyanceError {
    fn from(value: KdmpParserError) -> Self {
        Self::Dump(value)
    }
}

impl From<io::Error> for ClairvoyanceError {
    fn from(value: io::Error) -> Self {
        Self::Io(value)
    }
}

impl From<ParseIntError> for ClairvoyanceError {
    fn from(value: ParseIntError) -> Self {
        Self::Parse(value)
    }
}

impl Display for ClairvoyanceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Dump(_) => write!(f, "dump parsing"),
            Self::RootMissing(gpa) => {
                write!(f, "the root PML4 page {gpa} is not part of the dump")
            }
            Self::InvalidRecord(why) => write!(f, "invalid record: {why}"),
            Self::InvalidProtection(value) => {
                write!(f, "{value:#x} is not a protection value")
            }
            Self::Parse(_) => write!(f, "integer parsing"),
            Self::Io(_) => write!(f, "io"),
        }
    }
}

impl Error for ClairvoyanceError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Dump(e) => Some(e),
            Self::Parse(e) => Some(e),
            Self::Io(e) => Some(e),
            _ => None,
        }
    }
}
