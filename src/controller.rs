// SPDX-License-Identifier: Apache-2.0 OR MIT
// SPDX-FileCopyrightText: © 2024 Google

//! The interface to the PD sink controller that captured the capabilities.

use std::str::FromStr;

use enumn::N;

use crate::pd::CAPABILITY_BLOCK_SIZE;
use crate::Error;
use crate::Milliamp;
use crate::Millivolt;
use crate::Result;

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
/// Errors reported by the controller transport.
pub enum TransportError {
    #[error("Register {register:#04x} was not acknowledged")]
    Nack { register: u8 },
    #[error("Timed out waiting for the controller")]
    Timeout,
    #[error("The controller has no PD contract")]
    NotReady,
    #[error("{0:?} is outside the controller's range")]
    OutOfRange(Millivolt),
    #[error("{0}")]
    Bus(String),
}

/// A voltage request as understood by the controller's voltage register.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, N)]
pub enum VoltageSelector {
    #[default]
    V5,
    V9,
    V12,
    V15,
    V20,
    V28,
    /// Programmable supply, the voltage is set by `configure_pps`.
    Pps,
    /// Adjustable supply, the voltage is set by `configure_avs`.
    Avs,
}

impl VoltageSelector {
    const FIXED_MILLIVOLTS: [u32; 6] = [5000, 9000, 12000, 15000, 20000, 28000];

    /// The output voltage of a fixed selection. PPS and AVS selections are
    /// variable and have none.
    pub fn millivolts(&self) -> Option<Millivolt> {
        Self::FIXED_MILLIVOLTS
            .get(*self as usize)
            .map(|&mv| Millivolt(mv))
    }

    /// The raw value of the voltage control register.
    pub fn register_value(&self) -> u8 {
        *self as u8
    }

    pub fn is_fixed(&self) -> bool {
        self.millivolts().is_some()
    }
}

impl FromStr for VoltageSelector {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim().to_lowercase();
        match s.trim_end_matches('v') {
            "5" => Ok(Self::V5),
            "9" => Ok(Self::V9),
            "12" => Ok(Self::V12),
            "15" => Ok(Self::V15),
            "20" => Ok(Self::V20),
            "28" => Ok(Self::V28),
            "pps" => Ok(Self::Pps),
            "avs" => Ok(Self::Avs),
            _ => Err(Error::ParseStringError {
                field: "voltage".into(),
                value: s,
                #[cfg(feature = "backtrace")]
                backtrace: std::backtrace::Backtrace::capture(),
            }),
        }
    }
}

/// The charging protocol negotiated by the controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Protocol {
    #[default]
    None,
    Bc12,
    Qc2,
    Qc3,
    Pd,
    PdEpr,
}

impl Protocol {
    pub fn name(&self) -> &'static str {
        match self {
            Protocol::None => "None",
            Protocol::Bc12 => "BC1.2",
            Protocol::Qc2 => "QC2.0",
            Protocol::Qc3 => "QC3.0",
            Protocol::Pd => "USB-PD",
            Protocol::PdEpr => "USB-PD EPR",
        }
    }
}

bitflags::bitflags! {
    /// The protocol status register.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct StatusFlags: u8 {
        const BC_ACTIVE = 1 << 0;
        const QC2_ACTIVE = 1 << 1;
        const QC3_ACTIVE = 1 << 2;
        const PD_ACTIVE = 1 << 3;
        const EPR_ACTIVE = 1 << 4;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ControllerStatus {
    pub flags: StatusFlags,
    pub protocol: Protocol,
    pub pd_active: bool,
    pub epr_active: bool,
}

impl From<StatusFlags> for ControllerStatus {
    fn from(flags: StatusFlags) -> Self {
        // EPR > PD > QC3 > QC2 > BC1.2
        let protocol = if flags.contains(StatusFlags::EPR_ACTIVE) {
            Protocol::PdEpr
        } else if flags.contains(StatusFlags::PD_ACTIVE) {
            Protocol::Pd
        } else if flags.contains(StatusFlags::QC3_ACTIVE) {
            Protocol::Qc3
        } else if flags.contains(StatusFlags::QC2_ACTIVE) {
            Protocol::Qc2
        } else if flags.contains(StatusFlags::BC_ACTIVE) {
            Protocol::Bc12
        } else {
            Protocol::None
        };

        Self {
            flags,
            protocol,
            pd_active: flags.contains(StatusFlags::PD_ACTIVE),
            epr_active: flags.contains(StatusFlags::EPR_ACTIVE),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CurrentInfo {
    /// The maximum current available under the current contract.
    pub max_current: Milliamp,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
/// Output voltages the controller accepts for PPS and AVS requests.
pub struct VoltageLimits {
    pub pps_min: Millivolt,
    pub pps_max: Millivolt,
    pub avs_min: Millivolt,
    pub avs_max: Millivolt,
}

impl Default for VoltageLimits {
    fn default() -> Self {
        Self {
            pps_min: Millivolt(5000),
            pps_max: Millivolt(21000),
            avs_min: Millivolt(5000),
            avs_max: Millivolt(28000),
        }
    }
}

impl VoltageLimits {
    pub fn check_pps(&self, voltage: Millivolt) -> Result<()> {
        check_range("pps_voltage", voltage, self.pps_min, self.pps_max)
    }

    pub fn check_avs(&self, voltage: Millivolt) -> Result<()> {
        check_range("avs_voltage", voltage, self.avs_min, self.avs_max)
    }
}

fn check_range(field: &str, value: Millivolt, min: Millivolt, max: Millivolt) -> Result<()> {
    if (min..=max).contains(&value) {
        Ok(())
    } else {
        Err(Error::OutOfRange {
            field: field.into(),
            value: value.0,
            min: min.0,
            max: max.0,
            #[cfg(feature = "backtrace")]
            backtrace: std::backtrace::Backtrace::capture(),
        })
    }
}

// A trait that abstracts the PD sink controller.
pub trait PdController {
    /// Reads the raw Source Capabilities block: a 16-bit message header
    /// followed by the data objects, little-endian.
    fn read_capability_bytes(
        &mut self,
        buffer: &mut [u8; CAPABILITY_BLOCK_SIZE],
    ) -> std::result::Result<(), TransportError>;

    fn read_status(&mut self) -> std::result::Result<ControllerStatus, TransportError>;

    /// Only meaningful while a PD contract is active.
    fn read_current(&mut self) -> std::result::Result<CurrentInfo, TransportError>;

    fn set_output_voltage(
        &mut self,
        selector: VoltageSelector,
    ) -> std::result::Result<(), TransportError>;

    fn configure_pps(&mut self, voltage: Millivolt) -> std::result::Result<(), TransportError>;

    fn configure_avs(&mut self, voltage: Millivolt) -> std::result::Result<(), TransportError>;

    fn limits(&self) -> VoltageLimits {
        VoltageLimits::default()
    }
}

impl<T: PdController + ?Sized> PdController for Box<T> {
    fn read_capability_bytes(
        &mut self,
        buffer: &mut [u8; CAPABILITY_BLOCK_SIZE],
    ) -> std::result::Result<(), TransportError> {
        (**self).read_capability_bytes(buffer)
    }

    fn read_status(&mut self) -> std::result::Result<ControllerStatus, TransportError> {
        (**self).read_status()
    }

    fn read_current(&mut self) -> std::result::Result<CurrentInfo, TransportError> {
        (**self).read_current()
    }

    fn set_output_voltage(
        &mut self,
        selector: VoltageSelector,
    ) -> std::result::Result<(), TransportError> {
        (**self).set_output_voltage(selector)
    }

    fn configure_pps(&mut self, voltage: Millivolt) -> std::result::Result<(), TransportError> {
        (**self).configure_pps(voltage)
    }

    fn configure_avs(&mut self, voltage: Millivolt) -> std::result::Result<(), TransportError> {
        (**self).configure_avs(voltage)
    }

    fn limits(&self) -> VoltageLimits {
        (**self).limits()
    }
}
