// SPDX-License-Identifier: Apache-2.0 OR MIT

//! pdcaps-rs decodes USB Power Delivery "Source Capabilities" messages, as
//! captured by a PD sink controller, into a queryable capability table and
//! answers runtime questions about the attached adapter ("can it deliver 9V
//! at 2A?", "does it support PPS or AVS?").
//!
//! The crate is split in two layers:
//!
//! * [`capability::decode`] is a pure, total decoder from a
//!   [`pd::CapabilityMessage`] to a [`capability::CapabilityTable`].
//! * [`session::Session`] owns one decoded table, refreshes it from a
//!   [`controller::PdController`] and serves point queries.

#![cfg_attr(feature = "backtrace", feature(error_generic_member_access))]

use std::io::Cursor;

use bitstream_io::LittleEndian;

use controller::TransportError;

pub mod backends;
pub mod capability;
pub mod controller;
pub mod pd;
pub mod session;

pub type BitReader<'a> = bitstream_io::BitReader<Cursor<&'a [u8]>, LittleEndian>;
pub type Result<T> = std::result::Result<T, crate::Error>;

/// The maximum number of capability entries kept in a table.
pub const MAX_RESULTS: usize = 8;

/// A trait for deserializing an object from a byte stream.
///
/// This is used to read an object from a byte array when needed.
pub trait FromBytes {
    /// Deserializes the object from a byte stream.
    fn from_bytes(bit_reader: &mut BitReader) -> Result<Self>
    where
        Self: Sized;
}

#[derive(thiserror::Error)]
/// An error type for the library.
pub enum Error {
    #[error("{source}")]
    Transport {
        #[from]
        source: TransportError,
        #[cfg(feature = "backtrace")]
        backtrace: std::backtrace::Backtrace,
    },
    #[error("{source}")]
    IoError {
        #[from]
        source: std::io::Error,
        #[cfg(feature = "backtrace")]
        backtrace: std::backtrace::Backtrace,
    },
    #[error("No capabilities have been read yet")]
    NotReady {
        #[cfg(feature = "backtrace")]
        backtrace: std::backtrace::Backtrace,
    },
    #[error("{field} {value}mV is outside the supported range {min}mV..={max}mV")]
    OutOfRange {
        field: String,
        value: u32,
        min: u32,
        max: u32,
        #[cfg(feature = "backtrace")]
        backtrace: std::backtrace::Backtrace,
    },
    #[error("No capability covers {voltage:?}")]
    NotFound {
        voltage: Millivolt,
        #[cfg(feature = "backtrace")]
        backtrace: std::backtrace::Backtrace,
    },
    #[error("Could not parse field {field} with value {value}")]
    ParseError {
        field: String,
        value: u32,
        #[cfg(feature = "backtrace")]
        backtrace: std::backtrace::Backtrace,
    },
    #[error("Could not parse field {field} with value {value}")]
    ParseStringError {
        field: String,
        value: String,
        #[cfg(feature = "backtrace")]
        backtrace: std::backtrace::Backtrace,
    },
}

// Some boilerplate to make the backtraces more readable
impl std::fmt::Debug for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Transport {
                source,
                #[cfg(feature = "backtrace")]
                backtrace,
            } => {
                f.debug_struct("Transport")
                    .field("source", source)
                    .finish()?;

                #[cfg(feature = "backtrace")]
                write!(f, "\n\nerror stack backtrace:\n{}", backtrace)
            }
            Self::IoError {
                source,
                #[cfg(feature = "backtrace")]
                backtrace,
            } => {
                f.debug_struct("IoError").field("source", source).finish()?;

                #[cfg(feature = "backtrace")]
                write!(f, "\n\nerror stack backtrace:\n{}", backtrace)
            }
            Self::NotReady {
                #[cfg(feature = "backtrace")]
                backtrace,
            } => {
                f.debug_struct("NotReady").finish()?;

                #[cfg(feature = "backtrace")]
                write!(f, "\n\nerror stack backtrace:\n{}", backtrace)
            }
            Self::OutOfRange {
                field,
                value,
                min,
                max,
                #[cfg(feature = "backtrace")]
                backtrace,
            } => {
                f.debug_struct("OutOfRange")
                    .field("field", field)
                    .field("value", value)
                    .field("min", min)
                    .field("max", max)
                    .finish()?;

                #[cfg(feature = "backtrace")]
                write!(f, "\n\nerror stack backtrace:\n{}", backtrace)
            }
            Self::NotFound {
                voltage,
                #[cfg(feature = "backtrace")]
                backtrace,
            } => {
                f.debug_struct("NotFound")
                    .field("voltage", voltage)
                    .finish()?;

                #[cfg(feature = "backtrace")]
                write!(f, "\n\nerror stack backtrace:\n{}", backtrace)
            }
            Self::ParseError {
                field,
                value,
                #[cfg(feature = "backtrace")]
                backtrace,
            } => {
                f.debug_struct("ParseError")
                    .field("field", field)
                    .field("value", value)
                    .finish()?;

                #[cfg(feature = "backtrace")]
                write!(f, "\n\nerror stack backtrace:\n{}", backtrace)
            }
            Self::ParseStringError {
                field,
                value,
                #[cfg(feature = "backtrace")]
                backtrace,
            } => {
                f.debug_struct("ParseStringError")
                    .field("field", field)
                    .field("value", value)
                    .finish()?;

                #[cfg(feature = "backtrace")]
                write!(f, "\n\nerror stack backtrace:\n{}", backtrace)
            }
        }
        #[cfg(not(feature = "backtrace"))]
        Ok(())
    }
}

#[repr(transparent)]
#[derive(Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
/// A wrapper that can pretty-print the underlying millivolt value.
pub struct Millivolt(pub u32);

impl Millivolt {
    pub fn volts(self) -> f32 {
        self.0 as f32 / 1000.0
    }
}

impl std::fmt::Debug for Millivolt {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}mV", self.0)
    }
}

impl From<u32> for Millivolt {
    fn from(val: u32) -> Self {
        Millivolt(val)
    }
}

#[repr(transparent)]
#[derive(Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord)]
/// A wrapper that can pretty-print the underlying milliamp value.
pub struct Milliamp(pub u32);

impl Milliamp {
    pub fn amps(self) -> f32 {
        self.0 as f32 / 1000.0
    }
}

impl std::fmt::Debug for Milliamp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}mA", self.0)
    }
}

impl From<u32> for Milliamp {
    fn from(val: u32) -> Self {
        Milliamp(val)
    }
}

#[repr(transparent)]
#[derive(Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord)]
/// A wrapper that can pretty-print the underlying milliwatt value.
pub struct Milliwatt(pub u32);

impl Milliwatt {
    pub fn watts(self) -> f32 {
        self.0 as f32 / 1000.0
    }
}

impl std::fmt::Debug for Milliwatt {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}mW", self.0)
    }
}

impl From<u32> for Milliwatt {
    fn from(val: u32) -> Self {
        Milliwatt(val)
    }
}

/// Power in watts delivered at `voltage` and `current`.
pub fn watts(voltage: Millivolt, current: Milliamp) -> f32 {
    voltage.volts() * current.amps()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unit_debug() {
        assert_eq!(format!("{:?}", Millivolt(9000)), "9000mV");
        assert_eq!(format!("{:?}", Milliamp(3000)), "3000mA");
        assert_eq!(format!("{:?}", Milliwatt(250)), "250mW");
    }

    #[test]
    fn test_watts() {
        let power = watts(Millivolt(9000), Milliamp(3000));
        assert!((power - 27.0).abs() < 1e-4);
    }
}
