// SPDX-License-Identifier: Apache-2.0 OR MIT
// SPDX-FileCopyrightText: © 2024 Google

//! USB Power Delivery (PD) wire format.
//!
//! See "Universal Serial Bus Power Delivery Specification", section 6.2.1.1
//! "Message Header" and 6.4.1 "Capabilities Message".

use std::io::Cursor;

use bitstream_io::BitRead;
use enumn::N;

use crate::BitReader;
use crate::Error;
use crate::FromBytes;
use crate::Result;
use crate::MAX_RESULTS;

pub mod pdo;

pub use pdo::Apdo;
pub use pdo::Pdo;

/// The size of a captured capability block: a 16-bit header followed by up
/// to seven data objects, padded to the register window of the controller.
pub const CAPABILITY_BLOCK_SIZE: usize = 48;

/// Size of the message header in bytes.
const HEADER_SIZE: usize = 2;

/// Size of a single data object in bytes.
const OBJECT_SIZE: usize = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, N)]
/// See USB PD 3.2 - Table 6.1 "Message Header"
pub enum SpecRevision {
    #[default]
    Rev1p0,
    Rev2p0,
    Rev3p0,
    Reserved,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
/// The 16-bit header in front of every PD message.
pub struct MessageHeader {
    pub message_type: u8,
    /// 0: UFP, 1: DFP
    pub port_data_role: bool,
    pub spec_revision: SpecRevision,
    /// 0: Sink, 1: Source
    pub port_power_role: bool,
    pub message_id: u8,
    /// The number of 32-bit data objects that follow the header.
    pub number_of_data_objects: u8,
    pub extended: bool,
}

impl MessageHeader {
    /// Decodes a header from its raw 16-bit value.
    pub fn from_raw(raw: u16) -> Self {
        let bytes = raw.to_le_bytes();
        let mut reader = BitReader::new(Cursor::new(&bytes[..]));
        // Two bytes are always available.
        Self::from_bytes(&mut reader).unwrap_or_default()
    }
}

impl FromBytes for MessageHeader {
    fn from_bytes(reader: &mut BitReader) -> Result<Self>
    where
        Self: Sized,
    {
        let message_type = reader.read::<u8>(5)?;
        let port_data_role = reader.read_bit()?;
        let spec_revision_bits = reader.read::<u8>(2)?;
        let spec_revision =
            SpecRevision::n(spec_revision_bits).ok_or_else(|| Error::ParseError {
                field: "spec_revision".into(),
                value: spec_revision_bits.into(),
                #[cfg(feature = "backtrace")]
                backtrace: std::backtrace::Backtrace::capture(),
            })?;
        let port_power_role = reader.read_bit()?;
        let message_id = reader.read::<u8>(3)?;
        let number_of_data_objects = reader.read::<u8>(3)?;
        let extended = reader.read_bit()?;

        Ok(Self {
            message_type,
            port_data_role,
            spec_revision,
            port_power_role,
            message_id,
            number_of_data_objects,
            extended,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
/// A Source Capabilities message as handed over by the controller: the
/// header and the raw data objects, in advertised order.
pub struct CapabilityMessage {
    pub header: MessageHeader,
    pub objects: Vec<u32>,
}

impl CapabilityMessage {
    /// Splits a captured capability block into header and data objects.
    ///
    /// Never fails: a buffer too short for the header yields an empty
    /// message, and objects the buffer cannot hold are dropped, as are
    /// objects beyond [`MAX_RESULTS`].
    pub fn parse(bytes: &[u8]) -> Self {
        if bytes.len() < HEADER_SIZE {
            log::warn!("Capability block too short for a header ({} bytes)", bytes.len());
            return Self::default();
        }

        let mut reader = BitReader::new(Cursor::new(bytes));
        let header = match MessageHeader::from_bytes(&mut reader) {
            Ok(header) => header,
            Err(e) => {
                log::warn!("Could not read the message header: {e}");
                return Self::default();
            }
        };

        let available = (bytes.len() - HEADER_SIZE) / OBJECT_SIZE;
        let advertised = usize::from(header.number_of_data_objects);
        let count = advertised.min(available).min(MAX_RESULTS);
        if count < advertised {
            log::debug!("Header advertises {advertised} objects, only {count} are readable");
        }

        let mut objects = Vec::with_capacity(count);
        for _ in 0..count {
            match reader.read::<u32>(32) {
                Ok(word) => objects.push(word),
                Err(_) => break,
            }
        }

        Self { header, objects }
    }

    /// The number of objects the header advertises.
    pub fn object_count(&self) -> usize {
        usize::from(self.header.number_of_data_objects)
    }
}

impl FromBytes for CapabilityMessage {
    /// Strict variant of [`CapabilityMessage::parse`]: fails if the stream
    /// ends before all advertised objects were read.
    fn from_bytes(reader: &mut BitReader) -> Result<Self>
    where
        Self: Sized,
    {
        let header = MessageHeader::from_bytes(reader)?;
        let count = usize::from(header.number_of_data_objects).min(MAX_RESULTS);
        let objects = (0..count)
            .map(|_| reader.read::<u32>(32))
            .collect::<std::io::Result<Vec<_>>>()?;

        Ok(Self { header, objects })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn block(header: u16, words: &[u32]) -> Vec<u8> {
        let mut bytes = header.to_le_bytes().to_vec();
        for word in words {
            bytes.extend(word.to_le_bytes());
        }
        bytes.resize(CAPABILITY_BLOCK_SIZE.max(bytes.len()), 0);
        bytes
    }

    #[test]
    fn test_header_fields() {
        // Source_Capabilities, rev 3.0, source, message id 5, 3 objects
        let raw: u16 = 0x01 | (2 << 6) | (1 << 8) | (5 << 9) | (3 << 12);
        let header = MessageHeader::from_raw(raw);

        assert_eq!(header.message_type, 1);
        assert!(!header.port_data_role);
        assert_eq!(header.spec_revision, SpecRevision::Rev3p0);
        assert!(header.port_power_role);
        assert_eq!(header.message_id, 5);
        assert_eq!(header.number_of_data_objects, 3);
        assert!(!header.extended);
    }

    #[test]
    fn test_parse_little_endian_words() {
        let bytes = block(2 << 12, &[0x0001_912c, 0xc8dc_2164]);
        let message = CapabilityMessage::parse(&bytes);

        assert_eq!(message.object_count(), 2);
        assert_eq!(message.objects, vec![0x0001_912c, 0xc8dc_2164]);
    }

    #[test]
    fn test_parse_truncates_short_buffer() {
        let mut bytes = block(7 << 12, &[0x0001_912c, 0x0002_d12c]);
        bytes.truncate(HEADER_SIZE + OBJECT_SIZE + 3);
        let message = CapabilityMessage::parse(&bytes);

        assert_eq!(message.object_count(), 7);
        assert_eq!(message.objects, vec![0x0001_912c]);
    }

    #[test]
    fn test_parse_too_short_for_header() {
        let message = CapabilityMessage::parse(&[0x61]);
        assert_eq!(message, CapabilityMessage::default());
    }

    #[test]
    fn test_from_bytes_strict() {
        let bytes = block(1 << 12, &[0x0001_912c]);
        let mut reader = BitReader::new(Cursor::new(&bytes[..]));
        let message = CapabilityMessage::from_bytes(&mut reader).unwrap();
        assert_eq!(message.objects, vec![0x0001_912c]);

        let short = &bytes[..4];
        let mut reader = BitReader::new(Cursor::new(short));
        assert!(CapabilityMessage::from_bytes(&mut reader).is_err());
    }
}
