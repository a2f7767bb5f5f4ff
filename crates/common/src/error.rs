#![allow(clippy::uninlined_format_args)]

//! Error related data structures to be shared and used.
//!
//! This module contains the [`Error`] enum, which is used to represent
//! errors that can occur within the core.

use std::fmt::{self, Display, Formatter};
use std::io;

/// Top level enum for error handling within the core.
///
/// Most of the time, you will want to use the `CustomError` variant
/// to provide a more detailed error message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Error {
    InvalidData,
    RomSize,
    UnsupportedCartridgeType,
    UnsupportedRamSize,
    HeaderChecksum,
    IncompatibleBootRom,
    SaveFormat,
    InvalidParameter(String),
    CustomError(String),
}

impl Error {
    pub fn description(&self) -> String {
        match self {
            Error::InvalidData => String::from("Invalid data format"),
            Error::RomSize => String::from("Invalid ROM size"),
            Error::UnsupportedCartridgeType => String::from("Unsupported cartridge type"),
            Error::UnsupportedRamSize => String::from("Unsupported RAM size code"),
            Error::HeaderChecksum => String::from("Invalid cartridge header checksum"),
            Error::IncompatibleBootRom => {
                String::from("Boot ROM is incompatible with the current mode")
            }
            Error::SaveFormat => String::from("Malformed or out-of-order save state section"),
            Error::InvalidParameter(message) => format!("Invalid parameter: {}", message),
            Error::CustomError(message) => String::from(message),
        }
    }
}

impl Display for Error {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.description())
    }
}

impl From<io::Error> for Error {
    fn from(value: io::Error) -> Self {
        Error::CustomError(format!("I/O error: {}", value))
    }
}
