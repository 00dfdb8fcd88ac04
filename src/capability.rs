// SPDX-License-Identifier: Apache-2.0 OR MIT
// SPDX-FileCopyrightText: © 2024 Google

//! Decoding of Source Capabilities into a capability table.
//!
//! [`decode`] is total over its input: malformed data objects degrade to
//! [`Pdo::Unknown`] entries and padding words are skipped. Nothing in here
//! performs I/O.

use crate::pd::Apdo;
use crate::pd::CapabilityMessage;
use crate::pd::Pdo;
use crate::Milliamp;
use crate::Millivolt;
use crate::MAX_RESULTS;

/// The Standard/Extended Power Range boundary. Anything above is EPR.
pub const SPR_MAX_VOLTAGE: Millivolt = Millivolt(20000);

/// Descriptions fit a 32-byte display buffer, terminator included.
pub const DESCRIPTION_LEN: usize = 31;

#[derive(Debug, Clone, PartialEq)]
/// A decoded capability along with the values derived from it.
pub struct CapabilityEntry {
    pub variant: Pdo,
    /// Power at the representative (maximum) voltage.
    pub power_watts: f32,
    pub is_epr: bool,
    pub is_pps: bool,
    pub is_avs: bool,
    pub description: String,
}

impl CapabilityEntry {
    pub fn new(variant: Pdo) -> Self {
        let power_watts = match &variant {
            Pdo::Battery(pdo) => pdo.max_power.watts(),
            Pdo::Unknown(_) => 0.0,
            other => crate::watts(other.representative_voltage(), other.max_current()),
        };

        let is_pps = matches!(variant, Pdo::Apdo(Apdo::SprPps(_)));
        let is_avs = matches!(variant, Pdo::Apdo(Apdo::EprAvs(_)));
        // PPS lives in the SPR whatever its voltage field says.
        let is_epr = !is_pps && variant.representative_voltage() > SPR_MAX_VOLTAGE;

        let mut description = describe(&variant, power_watts, is_epr);
        description.truncate(DESCRIPTION_LEN);

        Self {
            variant,
            power_watts,
            is_epr,
            is_pps,
            is_avs,
            description,
        }
    }

    pub fn min_voltage(&self) -> Millivolt {
        self.variant
            .voltage_range()
            .map(|(min, _)| min)
            .unwrap_or_default()
    }

    pub fn max_voltage(&self) -> Millivolt {
        self.variant.representative_voltage()
    }

    pub fn max_current(&self) -> Milliamp {
        self.variant.max_current()
    }

    /// Whether [`CapabilityEntry::max_current`] was derived rather than
    /// advertised.
    pub fn current_is_estimate(&self) -> bool {
        matches!(self.variant, Pdo::Battery(_))
    }

    /// Fixed supplies match their voltage exactly, ranged ones match
    /// anything within `min..=max`. Unknown entries never match.
    pub fn covers(&self, voltage: Millivolt) -> bool {
        match &self.variant {
            Pdo::Fixed(pdo) => pdo.voltage == voltage,
            other => other
                .voltage_range()
                .is_some_and(|(min, max)| (min..=max).contains(&voltage)),
        }
    }

    pub fn kind_name(&self) -> &'static str {
        self.variant.kind().map_or("Unknown", |kind| kind.name())
    }
}

impl std::fmt::Display for CapabilityEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.description)
    }
}

fn describe(variant: &Pdo, power_watts: f32, is_epr: bool) -> String {
    let whole_volts = |mv: Millivolt| mv.0 / 1000;
    match variant {
        Pdo::Fixed(pdo) => format!(
            "{} {}V {:.2}A {:.1}W",
            if is_epr { "EPR" } else { "SPR" },
            whole_volts(pdo.voltage),
            pdo.max_current.amps(),
            power_watts
        ),
        Pdo::Battery(pdo) => format!(
            "Battery {}-{}V {:.1}W",
            whole_volts(pdo.min_voltage),
            whole_volts(pdo.max_voltage),
            power_watts
        ),
        Pdo::Variable(pdo) => format!(
            "Variable {}-{}V {:.2}A",
            whole_volts(pdo.min_voltage),
            whole_volts(pdo.max_voltage),
            pdo.max_current.amps()
        ),
        Pdo::Apdo(Apdo::SprPps(pdo)) => format!(
            "PPS {}-{}V {:.2}A",
            whole_volts(pdo.min_voltage),
            whole_volts(pdo.max_voltage),
            pdo.max_current.amps()
        ),
        Pdo::Apdo(Apdo::EprAvs(pdo)) => format!(
            "AVS {}-{}V {:.2}A",
            whole_volts(pdo.min_voltage),
            whole_volts(pdo.max_voltage),
            pdo.max_current.amps()
        ),
        Pdo::Unknown(word) => format!("Unknown {word:#010x}"),
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
/// The decoded capabilities of one Source Capabilities message.
///
/// Tables are built once by [`decode`] and never edited afterwards.
pub struct CapabilityTable {
    entries: Vec<CapabilityEntry>,
    epr_capable: bool,
    pps_capable: bool,
    avs_capable: bool,
}

impl CapabilityTable {
    fn push(&mut self, entry: CapabilityEntry) {
        self.epr_capable |= entry.is_epr;
        self.pps_capable |= entry.is_pps;
        self.avs_capable |= entry.is_avs;
        self.entries.push(entry);
    }

    /// Entries in advertised order.
    pub fn entries(&self) -> &[CapabilityEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&CapabilityEntry> {
        self.entries.get(index)
    }

    pub fn epr_capable(&self) -> bool {
        self.epr_capable
    }

    pub fn pps_capable(&self) -> bool {
        self.pps_capable
    }

    pub fn avs_capable(&self) -> bool {
        self.avs_capable
    }

    /// The first entry covering `voltage`.
    ///
    /// Sources list their preferred capabilities first, so the first match
    /// is kept rather than the most powerful one.
    pub fn find_by_voltage(&self, voltage: Millivolt) -> Option<&CapabilityEntry> {
        self.entries.iter().find(|entry| entry.covers(voltage))
    }

    /// Power and maximum current of the entry covering `voltage`.
    pub fn power_at_voltage(&self, voltage: Millivolt) -> Option<(f32, Milliamp)> {
        self.find_by_voltage(voltage)
            .map(|entry| (entry.power_watts, entry.max_current()))
    }

    /// The aggregate flags as they appear in the summary, e.g. `"EPR AVS"`.
    pub fn capability_flags(&self) -> String {
        let flags: Vec<&str> = [
            (self.epr_capable, "EPR"),
            (self.pps_capable, "PPS"),
            (self.avs_capable, "AVS"),
        ]
        .into_iter()
        .filter_map(|(set, name)| set.then_some(name))
        .collect();

        if flags.is_empty() {
            "none".into()
        } else {
            flags.join(" ")
        }
    }
}

/// Decodes `message` into a table of at most [`MAX_RESULTS`] entries.
pub fn decode(message: &CapabilityMessage) -> CapabilityTable {
    decode_with_limit(message, MAX_RESULTS)
}

/// Like [`decode`], with a tighter cap on the number of data objects
/// considered. Limits above [`MAX_RESULTS`] are clamped.
pub fn decode_with_limit(message: &CapabilityMessage, max_results: usize) -> CapabilityTable {
    let mut table = CapabilityTable::default();

    let advertised = message.object_count();
    if advertised == 0 {
        log::debug!("No PDO objects found");
        return table;
    }

    let count = advertised
        .min(max_results.min(MAX_RESULTS))
        .min(message.objects.len());
    log::debug!("Parsing {count} PDO entries");

    for (index, &word) in message.objects.iter().take(count).enumerate() {
        let Some(pdo) = Pdo::from_word(word) else {
            log::trace!("[{index}] Empty PDO");
            continue;
        };

        let entry = CapabilityEntry::new(pdo);
        log::debug!("[{index}] {}: {}", entry.kind_name(), entry.description);
        table.push(entry);
    }

    log::debug!("Parsed {} valid PDO entries", table.len());
    table
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pd::MessageHeader;

    fn fixed(mv: u32, ma: u32) -> u32 {
        ((mv / 50) << 10) | (ma / 10)
    }

    fn variable(min_mv: u32, max_mv: u32, ma: u32) -> u32 {
        (2 << 30) | ((max_mv / 50) << 20) | ((min_mv / 50) << 10) | (ma / 10)
    }

    fn battery(min_mv: u32, max_mv: u32, mw: u32) -> u32 {
        (1 << 30) | ((max_mv / 50) << 20) | ((min_mv / 50) << 10) | (mw / 250)
    }

    fn pps(min_mv: u32, max_mv: u32, ma: u32) -> u32 {
        (3 << 30) | ((max_mv / 100) << 17) | ((min_mv / 100) << 8) | (ma / 50)
    }

    fn avs(min_mv: u32, max_mv: u32, ma: u32) -> u32 {
        (3 << 30) | (1 << 28) | ((max_mv / 100) << 19) | ((min_mv / 100) << 9) | (ma / 50)
    }

    fn message(words: &[u32]) -> CapabilityMessage {
        CapabilityMessage {
            header: MessageHeader {
                number_of_data_objects: words.len() as u8,
                ..Default::default()
            },
            objects: words.to_vec(),
        }
    }

    #[test]
    fn test_fixed_entry() {
        let table = decode(&message(&[fixed(9000, 3000)]));
        let entry = &table.entries()[0];

        assert_eq!(entry.max_voltage(), Millivolt(9000));
        assert_eq!(entry.min_voltage(), Millivolt(9000));
        assert_eq!(entry.max_current(), Milliamp(3000));
        assert!((entry.power_watts - 27.0).abs() < 1e-3);
        assert!(!entry.is_epr);
        assert_eq!(entry.description, "SPR 9V 3.00A 27.0W");
    }

    #[test]
    fn test_epr_fixed_entry() {
        let entry = CapabilityEntry::new(Pdo::from_word(fixed(28000, 5000)).unwrap());
        assert!(entry.is_epr);
        assert_eq!(entry.description, "EPR 28V 5.00A 140.0W");
    }

    #[test]
    fn test_battery_entry() {
        let entry = CapabilityEntry::new(Pdo::from_word(battery(5000, 20000, 45000)).unwrap());

        assert!((entry.power_watts - 45.0).abs() < 1e-3);
        assert_eq!(entry.max_current(), Milliamp(2250));
        assert!(entry.current_is_estimate());
        assert!(!entry.is_epr);
        assert_eq!(entry.description, "Battery 5-20V 45.0W");
    }

    #[test]
    fn test_variable_entry() {
        let entry = CapabilityEntry::new(Pdo::from_word(variable(9000, 12000, 2000)).unwrap());

        assert!((entry.power_watts - 24.0).abs() < 1e-3);
        assert!(!entry.current_is_estimate());
        assert_eq!(entry.description, "Variable 9-12V 2.00A");
    }

    #[test]
    fn test_pps_is_never_epr() {
        // A PPS APDO whose maximum field claims 25.5V
        let entry = CapabilityEntry::new(Pdo::from_word(pps(3300, 25500, 3000)).unwrap());

        assert!(entry.is_pps);
        assert!(!entry.is_avs);
        assert!(!entry.is_epr);
        assert_eq!(entry.description, "PPS 3-25V 3.00A");
    }

    #[test]
    fn test_avs_entry() {
        let entry = CapabilityEntry::new(Pdo::from_word(avs(15000, 28000, 5000)).unwrap());

        assert!(entry.is_avs);
        assert!(entry.is_epr);
        assert!((entry.power_watts - 140.0).abs() < 1e-3);
        assert_eq!(entry.description, "AVS 15-28V 5.00A");
    }

    #[test]
    fn test_fixed_and_avs_scenario() {
        let table = decode(&message(&[fixed(5000, 3000), avs(15000, 28000, 5000)]));

        assert_eq!(table.len(), 2);
        assert!(table.epr_capable());
        assert!(!table.pps_capable());
        assert!(table.avs_capable());
        assert_eq!(table.entries()[0].description, "SPR 5V 3.00A 15.0W");
        assert_eq!(table.entries()[1].description, "AVS 15-28V 5.00A");
        assert_eq!(table.capability_flags(), "EPR AVS");
    }

    #[test]
    fn test_zero_words_are_skipped() {
        let table = decode(&message(&[fixed(5000, 3000), 0, fixed(9000, 2000), 0]));

        assert_eq!(table.len(), 2);
        assert_eq!(table.entries()[1].max_voltage(), Millivolt(9000));
    }

    #[test]
    fn test_unknown_apdo_is_counted_without_flags() {
        let reserved = (3 << 30) | (2 << 28) | 0xabcd;
        let table = decode(&message(&[reserved]));

        assert_eq!(table.len(), 1);
        let entry = &table.entries()[0];
        assert_eq!(entry.variant, Pdo::Unknown(reserved));
        assert_eq!(entry.power_watts, 0.0);
        assert!(!entry.is_pps && !entry.is_avs && !entry.is_epr);
        assert!(!table.epr_capable() && !table.pps_capable() && !table.avs_capable());
        assert_eq!(table.capability_flags(), "none");
        assert!(!entry.covers(Millivolt(0)));
    }

    #[test]
    fn test_empty_header() {
        let mut message = message(&[fixed(5000, 3000)]);
        message.header.number_of_data_objects = 0;
        assert!(decode(&message).is_empty());
    }

    #[test]
    fn test_header_count_bounds_objects() {
        let mut message = message(&[fixed(5000, 3000), fixed(9000, 3000)]);
        message.header.number_of_data_objects = 1;
        assert_eq!(decode(&message).len(), 1);

        message.header.number_of_data_objects = 7;
        assert_eq!(decode(&message).len(), 2);
    }

    #[test]
    fn test_decode_with_limit() {
        let words = [fixed(5000, 3000), fixed(9000, 3000), fixed(12000, 3000)];
        assert_eq!(decode_with_limit(&message(&words), 2).len(), 2);
        assert_eq!(decode_with_limit(&message(&words), 100).len(), 3);
    }

    #[test]
    fn test_find_by_voltage_first_match() {
        let table = decode(&message(&[
            fixed(5000, 3000),
            variable(9000, 12000, 2000),
            pps(3300, 11000, 5000),
        ]));

        assert_eq!(table.find_by_voltage(Millivolt(5000)), table.get(0));
        assert_eq!(table.find_by_voltage(Millivolt(10000)), table.get(1));
        assert_eq!(table.find_by_voltage(Millivolt(4000)), table.get(2));
        assert_eq!(table.find_by_voltage(Millivolt(20000)), None);
        assert_eq!(table.find_by_voltage(Millivolt(5001)), table.get(2));
    }

    #[test]
    fn test_power_at_voltage() {
        let table = decode(&message(&[fixed(5000, 3000), battery(5000, 20000, 60000)]));

        let (watts, current) = table.power_at_voltage(Millivolt(5000)).unwrap();
        assert!((watts - 15.0).abs() < 1e-3);
        assert_eq!(current, Milliamp(3000));

        let (watts, current) = table.power_at_voltage(Millivolt(14000)).unwrap();
        assert!((watts - 60.0).abs() < 1e-3);
        assert_eq!(current, Milliamp(3000));

        assert_eq!(table.power_at_voltage(Millivolt(21000)), None);
    }
}
