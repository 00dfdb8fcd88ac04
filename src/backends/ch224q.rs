// SPDX-License-Identifier: Apache-2.0 OR MIT
// SPDX-FileCopyrightText: © 2024 Google

//! The CH224Q/CH224A PD sink controller backend.
//!
//! The chip is driven through single-byte registers. The register bus
//! itself (usually I2C at address 0x22 or 0x23) is supplied by the caller.

use crate::controller::ControllerStatus;
use crate::controller::CurrentInfo;
use crate::controller::PdController;
use crate::controller::Protocol;
use crate::controller::StatusFlags;
use crate::controller::TransportError;
use crate::controller::VoltageLimits;
use crate::controller::VoltageSelector;
use crate::pd::CAPABILITY_BLOCK_SIZE;
use crate::Millivolt;

pub const I2C_ADDRESS_0: u8 = 0x22;
pub const I2C_ADDRESS_1: u8 = 0x23;

const REG_STATUS: u8 = 0x09;
const REG_VOLTAGE: u8 = 0x0a;
/// In 50mA units.
const REG_CURRENT: u8 = 0x50;
const REG_AVS_HIGH: u8 = 0x51;
const REG_AVS_LOW: u8 = 0x52;
const REG_PPS: u8 = 0x53;
/// 0x60..=0x8f
const REG_CAPABILITIES: u8 = 0x60;

const CURRENT_UNIT_MA: u32 = 50;
const AVS_UNIT_MV: u32 = 100;
const AVS_ENABLE: u8 = 0x80;
const PPS_UNIT_MV: u32 = 100;

const LIMITS: VoltageLimits = VoltageLimits {
    pps_min: Millivolt(5000),
    pps_max: Millivolt(21000),
    avs_min: Millivolt(5000),
    avs_max: Millivolt(28000),
};

/// Register level access to the controller.
pub trait RegisterBus {
    fn write_register(&mut self, register: u8, value: u8) -> Result<(), TransportError>;

    /// Reads `buffer.len()` consecutive registers starting at `register`.
    fn read_registers(&mut self, register: u8, buffer: &mut [u8]) -> Result<(), TransportError>;
}

pub struct Ch224q<B> {
    bus: B,
    /// The protocol seen by the last status read.
    protocol: Protocol,
    voltage: VoltageSelector,
}

impl<B: RegisterBus> Ch224q<B> {
    /// Wraps `bus`, checking that the chip answers.
    pub fn new(mut bus: B) -> Result<Self, TransportError> {
        let mut status = [0u8];
        bus.read_registers(REG_STATUS, &mut status)?;
        log::debug!("CH224Q status at init: {:#04x}", status[0]);

        Ok(Self {
            bus,
            protocol: Protocol::None,
            voltage: VoltageSelector::V5,
        })
    }

    /// The last voltage successfully requested.
    pub fn voltage(&self) -> VoltageSelector {
        self.voltage
    }

    pub fn into_inner(self) -> B {
        self.bus
    }

    fn read_register(&mut self, register: u8) -> Result<u8, TransportError> {
        let mut value = [0u8];
        self.bus.read_registers(register, &mut value)?;
        Ok(value[0])
    }
}

impl<B: RegisterBus> PdController for Ch224q<B> {
    fn read_capability_bytes(
        &mut self,
        buffer: &mut [u8; CAPABILITY_BLOCK_SIZE],
    ) -> Result<(), TransportError> {
        // The block holds SRC_CAP while the adapter is below 100W and
        // EPR_SRC_CAP once the 28V EPR contract is in place.
        self.bus.read_registers(REG_CAPABILITIES, buffer)
    }

    fn read_status(&mut self) -> Result<ControllerStatus, TransportError> {
        let raw = self.read_register(REG_STATUS)?;
        let status = ControllerStatus::from(StatusFlags::from_bits_truncate(raw));
        self.protocol = status.protocol;
        Ok(status)
    }

    fn read_current(&mut self) -> Result<CurrentInfo, TransportError> {
        if !matches!(self.protocol, Protocol::Pd | Protocol::PdEpr) {
            return Err(TransportError::NotReady);
        }

        let raw = self.read_register(REG_CURRENT)?;
        Ok(CurrentInfo {
            max_current: (u32::from(raw) * CURRENT_UNIT_MA).into(),
        })
    }

    fn set_output_voltage(&mut self, selector: VoltageSelector) -> Result<(), TransportError> {
        self.bus
            .write_register(REG_VOLTAGE, selector.register_value())?;
        self.voltage = selector;
        Ok(())
    }

    fn configure_pps(&mut self, voltage: Millivolt) -> Result<(), TransportError> {
        if !(LIMITS.pps_min..=LIMITS.pps_max).contains(&voltage) {
            return Err(TransportError::OutOfRange(voltage));
        }

        let units = (voltage.0 / PPS_UNIT_MV) as u8;
        self.bus.write_register(REG_PPS, units)
    }

    fn configure_avs(&mut self, voltage: Millivolt) -> Result<(), TransportError> {
        if !(LIMITS.avs_min..=LIMITS.avs_max).contains(&voltage) {
            return Err(TransportError::OutOfRange(voltage));
        }

        let units = voltage.0 / AVS_UNIT_MV;
        let low = (units & 0xff) as u8;
        let high = ((units >> 8) & 0x7f) as u8 | AVS_ENABLE;

        // The low byte must be written first.
        self.bus.write_register(REG_AVS_LOW, low)?;
        self.bus.write_register(REG_AVS_HIGH, high)
    }

    fn limits(&self) -> VoltageLimits {
        LIMITS
    }
}
