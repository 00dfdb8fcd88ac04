// SPDX-License-Identifier: Apache-2.0 OR MIT
// SPDX-FileCopyrightText: © 2024 Google

//! Source Power Data Objects.
//!
//! See USB PD 3.2 - Table 6.7 "Power Data Object" and the per-type tables
//! that follow it. Every field is pulled out of the 32-bit word with an
//! explicit shift and mask, so the layout does not depend on how the
//! bytes were stored.

use enumn::N;

use crate::Milliamp;
use crate::Millivolt;
use crate::Milliwatt;

/// Extracts bits `hi..=lo` of `word`.
const fn field(word: u32, hi: u32, lo: u32) -> u32 {
    (word >> lo) & ((1 << (hi - lo + 1)) - 1)
}

const fn bit(word: u32, pos: u32) -> bool {
    (word >> pos) & 1 == 1
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, N)]
/// Bits 31..30 of every PDO.
pub enum PdoKind {
    Fixed,
    Battery,
    Variable,
    Augmented,
}

impl PdoKind {
    pub fn name(&self) -> &'static str {
        match self {
            PdoKind::Fixed => "Fixed",
            PdoKind::Battery => "Battery",
            PdoKind::Variable => "Variable",
            PdoKind::Augmented => "APDO",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, N)]
/// Bits 29..28 of an Augmented PDO.
pub enum ApdoKind {
    SprPps,
    EprAvs,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
/// See USB PD 3.2 - Table 6.9 "Fixed Supply PDO – Source"
pub struct FixedSupplyPdo {
    pub dual_role_power: bool,
    pub usb_suspend_supported: bool,
    pub unconstrained_power: bool,
    pub usb_communications_capable: bool,
    pub dual_role_data: bool,
    pub unchunked_extended_messages: bool,
    pub epr_mode_capable: bool,
    pub peak_current: u8,
    pub voltage: Millivolt,
    pub max_current: Milliamp,
}

impl FixedSupplyPdo {
    pub fn from_word(word: u32) -> Self {
        Self {
            dual_role_power: bit(word, 29),
            usb_suspend_supported: bit(word, 28),
            unconstrained_power: bit(word, 27),
            usb_communications_capable: bit(word, 26),
            dual_role_data: bit(word, 25),
            unchunked_extended_messages: bit(word, 24),
            epr_mode_capable: bit(word, 23),
            peak_current: field(word, 21, 20) as u8,
            voltage: (field(word, 19, 10) * 50).into(),
            max_current: (field(word, 9, 0) * 10).into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
/// See USB PD 3.2 - Table 6.12 "Battery Supply PDO – Source"
pub struct BatterySupplyPdo {
    pub max_voltage: Millivolt,
    pub min_voltage: Millivolt,
    pub max_power: Milliwatt,
}

impl BatterySupplyPdo {
    pub fn from_word(word: u32) -> Self {
        Self {
            max_voltage: (field(word, 29, 20) * 50).into(),
            min_voltage: (field(word, 19, 10) * 50).into(),
            max_power: (field(word, 9, 0) * 250).into(),
        }
    }

    /// The current drawn at `max_voltage` when pulling `max_power`.
    ///
    /// Battery PDOs advertise power, not current: this is an estimate and
    /// not part of what the source promised.
    pub fn estimated_current(&self) -> Milliamp {
        if self.max_voltage.0 == 0 {
            return Milliamp(0);
        }
        let current = u64::from(self.max_power.0) * 1000 / u64::from(self.max_voltage.0);
        Milliamp(current as u32)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
/// See USB PD 3.2 - Table 6.11 "Variable Supply (non-Battery) PDO – Source"
pub struct VariableSupplyPdo {
    pub max_voltage: Millivolt,
    pub min_voltage: Millivolt,
    pub max_current: Milliamp,
}

impl VariableSupplyPdo {
    pub fn from_word(word: u32) -> Self {
        Self {
            max_voltage: (field(word, 29, 20) * 50).into(),
            min_voltage: (field(word, 19, 10) * 50).into(),
            max_current: (field(word, 9, 0) * 10).into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
/// See USB PD 3.2 - Table 6.13 "SPR Programmable Power Supply APDO – Source"
pub struct SprProgrammableSupplyPdo {
    pub power_limited: bool,
    pub max_voltage: Millivolt,
    pub min_voltage: Millivolt,
    pub max_current: Milliamp,
}

impl SprProgrammableSupplyPdo {
    pub fn from_word(word: u32) -> Self {
        Self {
            power_limited: bit(word, 27),
            max_voltage: (field(word, 24, 17) * 100).into(),
            min_voltage: (field(word, 15, 8) * 100).into(),
            max_current: (field(word, 6, 0) * 50).into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
/// See USB PD 3.2 - Table 6.15 "EPR Adjustable Voltage Supply APDO – Source"
pub struct EprAdjustableSupplyPdo {
    pub max_voltage: Millivolt,
    pub min_voltage: Millivolt,
    pub max_current: Milliamp,
}

impl EprAdjustableSupplyPdo {
    pub fn from_word(word: u32) -> Self {
        Self {
            max_voltage: (field(word, 27, 19) * 100).into(),
            min_voltage: (field(word, 17, 9) * 100).into(),
            max_current: (field(word, 7, 0) * 50).into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Apdo {
    SprPps(SprProgrammableSupplyPdo),
    EprAvs(EprAdjustableSupplyPdo),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
/// One decoded source capability.
pub enum Pdo {
    Fixed(FixedSupplyPdo),
    Battery(BatterySupplyPdo),
    Variable(VariableSupplyPdo),
    Apdo(Apdo),
    /// An APDO with a reserved sub-type, or a ranged PDO whose minimum
    /// voltage lies above its maximum. Carries the raw word only.
    Unknown(u32),
}

impl Pdo {
    /// Decodes a raw data object. The all-zero word is padding and yields
    /// `None`; anything else decodes to some variant.
    pub fn from_word(word: u32) -> Option<Self> {
        if word == 0 {
            return None;
        }

        let pdo = match PdoKind::n(field(word, 31, 30)) {
            Some(PdoKind::Fixed) => Pdo::Fixed(FixedSupplyPdo::from_word(word)),
            Some(PdoKind::Battery) => Pdo::Battery(BatterySupplyPdo::from_word(word)),
            Some(PdoKind::Variable) => Pdo::Variable(VariableSupplyPdo::from_word(word)),
            Some(PdoKind::Augmented) => match ApdoKind::n(field(word, 29, 28)) {
                Some(ApdoKind::SprPps) => {
                    Pdo::Apdo(Apdo::SprPps(SprProgrammableSupplyPdo::from_word(word)))
                }
                Some(ApdoKind::EprAvs) => {
                    Pdo::Apdo(Apdo::EprAvs(EprAdjustableSupplyPdo::from_word(word)))
                }
                None => {
                    log::warn!("Unknown APDO subtype: {}", field(word, 29, 28));
                    Pdo::Unknown(word)
                }
            },
            None => {
                log::warn!("Unknown PDO type: {}", field(word, 31, 30));
                Pdo::Unknown(word)
            }
        };

        match pdo.voltage_range() {
            Some((min, max)) if min > max => {
                log::warn!("PDO {word:#010x} has an inverted voltage range {min:?}..{max:?}");
                Some(Pdo::Unknown(word))
            }
            _ => Some(pdo),
        }
    }

    pub fn kind(&self) -> Option<PdoKind> {
        match self {
            Pdo::Fixed(_) => Some(PdoKind::Fixed),
            Pdo::Battery(_) => Some(PdoKind::Battery),
            Pdo::Variable(_) => Some(PdoKind::Variable),
            Pdo::Apdo(_) => Some(PdoKind::Augmented),
            Pdo::Unknown(_) => None,
        }
    }

    /// `(min, max)` voltage; both ends are the same for fixed supplies.
    pub fn voltage_range(&self) -> Option<(Millivolt, Millivolt)> {
        match self {
            Pdo::Fixed(pdo) => Some((pdo.voltage, pdo.voltage)),
            Pdo::Battery(pdo) => Some((pdo.min_voltage, pdo.max_voltage)),
            Pdo::Variable(pdo) => Some((pdo.min_voltage, pdo.max_voltage)),
            Pdo::Apdo(Apdo::SprPps(pdo)) => Some((pdo.min_voltage, pdo.max_voltage)),
            Pdo::Apdo(Apdo::EprAvs(pdo)) => Some((pdo.min_voltage, pdo.max_voltage)),
            Pdo::Unknown(_) => None,
        }
    }

    /// The voltage an entry is classified and rated at: its maximum.
    pub fn representative_voltage(&self) -> Millivolt {
        self.voltage_range()
            .map(|(_, max)| max)
            .unwrap_or_default()
    }

    /// Maximum current. For battery supplies this is derived from the
    /// advertised power, see [`BatterySupplyPdo::estimated_current`].
    pub fn max_current(&self) -> Milliamp {
        match self {
            Pdo::Fixed(pdo) => pdo.max_current,
            Pdo::Battery(pdo) => pdo.estimated_current(),
            Pdo::Variable(pdo) => pdo.max_current,
            Pdo::Apdo(Apdo::SprPps(pdo)) => pdo.max_current,
            Pdo::Apdo(Apdo::EprAvs(pdo)) => pdo.max_current,
            Pdo::Unknown(_) => Milliamp(0),
        }
    }
}
