// SPDX-License-Identifier: Apache-2.0 OR MIT
// SPDX-FileCopyrightText: © 2024 Google

//! A backend that replays a recorded capability block.
//!
//! Captures are text files holding the bytes read from the controller as
//! hex, separated by whitespace or commas. `0x` prefixes are optional and
//! `#` starts a comment:
//!
//! ```text
//! # Source_Capabilities, 2 objects
//! 0x61 0x21
//! 2c 91 01 00   # 5V 3A
//! ```

use std::path::Path;

use crate::capability;
use crate::controller::ControllerStatus;
use crate::controller::CurrentInfo;
use crate::controller::PdController;
use crate::controller::StatusFlags;
use crate::controller::TransportError;
use crate::controller::VoltageSelector;
use crate::pd::CapabilityMessage;
use crate::pd::CAPABILITY_BLOCK_SIZE;
use crate::Error;
use crate::Millivolt;
use crate::Result;

/// A request the replayed controller received.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Request {
    SetVoltage(VoltageSelector),
    Pps(Millivolt),
    Avs(Millivolt),
}

pub struct CaptureBackend {
    block: [u8; CAPABILITY_BLOCK_SIZE],
    status: StatusFlags,
    voltage: VoltageSelector,
    requests: Vec<Request>,
}

impl CaptureBackend {
    /// Replays `bytes`, zero-padded or cut to a full capability block.
    pub fn new(bytes: &[u8]) -> Self {
        let mut block = [0u8; CAPABILITY_BLOCK_SIZE];
        let len = bytes.len().min(CAPABILITY_BLOCK_SIZE);
        block[..len].copy_from_slice(&bytes[..len]);
        if bytes.len() > CAPABILITY_BLOCK_SIZE {
            log::warn!(
                "Capture holds {} bytes, only the first {CAPABILITY_BLOCK_SIZE} are used",
                bytes.len()
            );
        }

        Self {
            block,
            status: StatusFlags::PD_ACTIVE,
            voltage: VoltageSelector::V5,
            requests: vec![],
        }
    }

    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Ok(Self::new(&parse_hex(&text)?))
    }

    /// Overrides the status register value reported by `read_status`.
    pub fn with_status(mut self, status: StatusFlags) -> Self {
        self.status = status;
        self
    }

    /// Requests received so far, oldest first.
    pub fn requests(&self) -> &[Request] {
        &self.requests
    }
}

/// Parses the textual hex dump format described in the module docs.
pub fn parse_hex(text: &str) -> Result<Vec<u8>> {
    text.lines()
        .map(|line| line.split('#').next().unwrap_or_default())
        .flat_map(|line| line.split(|c: char| c.is_whitespace() || c == ','))
        .filter(|token| !token.is_empty())
        .map(|token| {
            let digits = token
                .strip_prefix("0x")
                .or_else(|| token.strip_prefix("0X"))
                .unwrap_or(token);
            u8::from_str_radix(digits, 16).map_err(|_| Error::ParseStringError {
                field: "capture byte".into(),
                value: token.into(),
                #[cfg(feature = "backtrace")]
                backtrace: std::backtrace::Backtrace::capture(),
            })
        })
        .collect()
}

impl PdController for CaptureBackend {
    fn read_capability_bytes(
        &mut self,
        buffer: &mut [u8; CAPABILITY_BLOCK_SIZE],
    ) -> std::result::Result<(), TransportError> {
        buffer.copy_from_slice(&self.block);
        Ok(())
    }

    fn read_status(&mut self) -> std::result::Result<ControllerStatus, TransportError> {
        Ok(self.status.into())
    }

    /// The current advertised for the selected fixed voltage.
    fn read_current(&mut self) -> std::result::Result<CurrentInfo, TransportError> {
        if !self
            .status
            .intersects(StatusFlags::PD_ACTIVE | StatusFlags::EPR_ACTIVE)
        {
            return Err(TransportError::NotReady);
        }

        let table = capability::decode(&CapabilityMessage::parse(&self.block));
        let max_current = self
            .voltage
            .millivolts()
            .and_then(|voltage| table.find_by_voltage(voltage))
            .map(|entry| entry.max_current())
            .unwrap_or_default();

        Ok(CurrentInfo { max_current })
    }

    fn set_output_voltage(
        &mut self,
        selector: VoltageSelector,
    ) -> std::result::Result<(), TransportError> {
        self.voltage = selector;
        self.requests.push(Request::SetVoltage(selector));
        Ok(())
    }

    fn configure_pps(&mut self, voltage: Millivolt) -> std::result::Result<(), TransportError> {
        self.requests.push(Request::Pps(voltage));
        Ok(())
    }

    fn configure_avs(&mut self, voltage: Millivolt) -> std::result::Result<(), TransportError> {
        self.requests.push(Request::Avs(voltage));
        Ok(())
    }
}
