// SPDX-License-Identifier: Apache-2.0 OR MIT
// SPDX-FileCopyrightText: © 2024 Google

//! The capability session: one controller, one published capability table.

use std::fmt::Write;
use std::sync::Arc;

use crate::capability;
use crate::capability::CapabilityEntry;
use crate::capability::CapabilityTable;
use crate::controller::ControllerStatus;
use crate::controller::PdController;
use crate::controller::Protocol;
use crate::controller::VoltageSelector;
use crate::pd::CapabilityMessage;
use crate::pd::CAPABILITY_BLOCK_SIZE;
use crate::Error;
use crate::Milliamp;
use crate::Millivolt;
use crate::Result;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// A controller is attached but no capabilities were read yet.
    Initialized,
    /// At least one refresh succeeded.
    Ready,
}

/// Owns a controller and the capabilities last read from it.
///
/// # Examples
///
/// ```
/// use pdcaps_rs::backends::capture::CaptureBackend;
/// use pdcaps_rs::session::Session;
/// use pdcaps_rs::Millivolt;
///
/// // Header with one object, then a 5V 3A fixed supply.
/// let capture = [0x61, 0x11, 0x2c, 0x91, 0x01, 0x00];
/// let mut session = Session::new(CaptureBackend::new(&capture));
/// session.refresh().unwrap();
///
/// assert!(session.is_voltage_supported(Millivolt(5000)).unwrap());
/// ```
pub struct Session<C> {
    controller: C,
    state: SessionState,
    /// Replaced as a whole on every refresh, never edited.
    table: Arc<CapabilityTable>,
    selected_voltage: Option<VoltageSelector>,
    /// Output voltage of the last fixed selection.
    voltage: Option<Millivolt>,
    protocol: Protocol,
    pd_active: bool,
    available_current: Milliamp,
    current_power_w: u32,
}

impl<C: PdController> Session<C> {
    pub fn new(controller: C) -> Self {
        Self {
            controller,
            state: SessionState::Initialized,
            table: Arc::default(),
            selected_voltage: None,
            voltage: None,
            protocol: Protocol::None,
            pd_active: false,
            available_current: Milliamp(0),
            current_power_w: 0,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn controller(&self) -> &C {
        &self.controller
    }

    pub fn controller_mut(&mut self) -> &mut C {
        &mut self.controller
    }

    pub fn into_inner(self) -> C {
        self.controller
    }

    /// Reads the capabilities from the controller and publishes a freshly
    /// decoded table. On failure the previous table stays in place.
    pub fn refresh(&mut self) -> Result<()> {
        let mut buffer = [0u8; CAPABILITY_BLOCK_SIZE];
        if let Err(e) = self.controller.read_capability_bytes(&mut buffer) {
            log::warn!("Could not read the source capabilities: {e}");
            return Err(e.into());
        }

        let table = capability::decode(&CapabilityMessage::parse(&buffer));
        log::info!(
            "Source offers {} capabilities ({})",
            table.len(),
            table.capability_flags()
        );

        self.table = Arc::new(table);
        self.state = SessionState::Ready;
        Ok(())
    }

    fn ready_table(&self) -> Result<&CapabilityTable> {
        match self.state {
            SessionState::Ready => Ok(&self.table),
            SessionState::Initialized => Err(Error::NotReady {
                #[cfg(feature = "backtrace")]
                backtrace: std::backtrace::Backtrace::capture(),
            }),
        }
    }

    /// A snapshot of the current table. It stays valid, and unchanged,
    /// across later refreshes.
    pub fn table(&self) -> Result<Arc<CapabilityTable>> {
        self.ready_table()?;
        Ok(Arc::clone(&self.table))
    }

    pub fn entry(&self, index: usize) -> Result<Option<&CapabilityEntry>> {
        Ok(self.ready_table()?.get(index))
    }

    /// The first entry, in advertised order, that can supply `voltage`.
    pub fn find_by_voltage(&self, voltage: Millivolt) -> Result<Option<&CapabilityEntry>> {
        Ok(self.ready_table()?.find_by_voltage(voltage))
    }

    /// Power and maximum current of the entry that can supply `voltage`.
    pub fn power_at_voltage(&self, voltage: Millivolt) -> Result<Option<(f32, Milliamp)>> {
        Ok(self.ready_table()?.power_at_voltage(voltage))
    }

    pub fn is_voltage_supported(&self, voltage: Millivolt) -> Result<bool> {
        Ok(self.find_by_voltage(voltage)?.is_some())
    }

    /// Requests `target` from the controller.
    pub fn select_voltage(&mut self, target: VoltageSelector) -> Result<()> {
        if self.state == SessionState::Ready {
            match target {
                VoltageSelector::Pps if !self.table.pps_capable() => {
                    log::warn!("Selecting PPS but the source does not advertise it")
                }
                VoltageSelector::Avs if !self.table.avs_capable() => {
                    log::warn!("Selecting AVS but the source does not advertise it")
                }
                _ => {}
            }
        }

        self.controller.set_output_voltage(target)?;
        log::info!("Selected {target:?}");

        self.selected_voltage = Some(target);
        if let Some(voltage) = target.millivolts() {
            self.voltage = Some(voltage);
        }
        Ok(())
    }

    /// Sets the PPS output voltage. The supply has to be switched to PPS
    /// with [`Session::select_voltage`] the first time around.
    pub fn configure_pps(&mut self, voltage: Millivolt) -> Result<()> {
        self.controller.limits().check_pps(voltage)?;
        self.controller.configure_pps(voltage)?;
        log::info!("PPS set to {voltage:?}");
        Ok(())
    }

    /// Sets the AVS output voltage. The supply has to be switched to AVS
    /// with [`Session::select_voltage`] the first time around.
    pub fn configure_avs(&mut self, voltage: Millivolt) -> Result<()> {
        self.controller.limits().check_avs(voltage)?;
        self.controller.configure_avs(voltage)?;
        log::info!("AVS set to {voltage:?}");
        Ok(())
    }

    /// Reads the protocol status and, under a PD contract, the available
    /// current.
    pub fn update_status(&mut self) -> Result<ControllerStatus> {
        let status = self.controller.read_status()?;
        self.protocol = status.protocol;
        self.pd_active = status.pd_active || status.epr_active;

        if self.pd_active {
            match self.controller.read_current() {
                Ok(current) => {
                    self.available_current = current.max_current;
                    if let Some(voltage) = self.voltage {
                        self.current_power_w =
                            crate::watts(voltage, self.available_current) as u32;
                    }
                }
                Err(e) => log::warn!("Could not read the available current: {e}"),
            }
        }

        Ok(status)
    }

    pub fn selected_voltage(&self) -> Option<VoltageSelector> {
        self.selected_voltage
    }

    /// The output voltage of the last fixed selection, if any.
    pub fn selected_voltage_mv(&self) -> Option<Millivolt> {
        self.voltage
    }

    pub fn protocol(&self) -> Protocol {
        self.protocol
    }

    pub fn pd_active(&self) -> bool {
        self.pd_active
    }

    /// Only meaningful while [`Session::pd_active`].
    pub fn available_current(&self) -> Milliamp {
        self.available_current
    }

    /// Whole watts at the selected voltage and available current.
    pub fn current_power_w(&self) -> u32 {
        self.current_power_w
    }

    pub fn render_summary(&self) -> Result<String> {
        let table = self.ready_table()?;

        let mut summary = String::new();
        // Writing to a String cannot fail.
        let _ = writeln!(summary, "=== PDO Information ===");
        let _ = writeln!(summary, "Protocol: {}", self.protocol.name());
        let _ = writeln!(summary, "Total PDOs: {}", table.len());
        let _ = writeln!(summary, "Capabilities: {}", table.capability_flags());
        let _ = writeln!(summary, "PDO Entries:");
        for (index, entry) in table.entries().iter().enumerate() {
            let _ = writeln!(summary, "[{index}] {entry}");
        }

        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::capture::CaptureBackend;
    use crate::backends::capture::Request;

    // Header with 2 objects: 5V 3A and 15-28V 5A AVS.
    const FIXED_AND_AVS: [u8; 10] = [
        0x61, 0x21, 0x2c, 0x91, 0x01, 0x00, 0x64, 0x2c, 0xc1, 0xd8,
    ];

    fn session() -> Session<CaptureBackend> {
        Session::new(CaptureBackend::new(&FIXED_AND_AVS))
    }

    #[test]
    fn test_queries_need_refresh() {
        let session = session();

        assert_eq!(session.state(), SessionState::Initialized);
        assert!(matches!(
            session.find_by_voltage(Millivolt(5000)),
            Err(Error::NotReady { .. })
        ));
        assert!(matches!(
            session.power_at_voltage(Millivolt(5000)),
            Err(Error::NotReady { .. })
        ));
        assert!(matches!(
            session.is_voltage_supported(Millivolt(5000)),
            Err(Error::NotReady { .. })
        ));
        assert!(matches!(session.entry(0), Err(Error::NotReady { .. })));
        assert!(matches!(session.table(), Err(Error::NotReady { .. })));
        assert!(matches!(
            session.render_summary(),
            Err(Error::NotReady { .. })
        ));
    }

    #[test]
    fn test_refresh() {
        let mut session = session();
        session.refresh().unwrap();

        assert_eq!(session.state(), SessionState::Ready);
        let table = session.table().unwrap();
        assert_eq!(table.len(), 2);
        assert!(table.epr_capable());
        assert!(table.avs_capable());
        assert!(!table.pps_capable());
        assert_eq!(
            session.entry(1).unwrap().unwrap().description,
            "AVS 15-28V 5.00A"
        );
        assert_eq!(session.entry(2).unwrap(), None);
    }

    #[test]
    fn test_queries() {
        let mut session = session();
        session.refresh().unwrap();

        assert!(session.is_voltage_supported(Millivolt(5000)).unwrap());
        assert!(session.is_voltage_supported(Millivolt(20000)).unwrap());
        assert!(!session.is_voltage_supported(Millivolt(9000)).unwrap());

        let (watts, current) = session.power_at_voltage(Millivolt(20000)).unwrap().unwrap();
        assert!((watts - 140.0).abs() < 1e-3);
        assert_eq!(current, Milliamp(5000));
    }

    #[test]
    fn test_select_voltage_updates_cache() {
        let mut session = session();
        assert_eq!(session.selected_voltage(), None);

        session.select_voltage(VoltageSelector::V28).unwrap();
        assert_eq!(session.selected_voltage(), Some(VoltageSelector::V28));
        assert_eq!(session.selected_voltage_mv(), Some(Millivolt(28000)));

        session.select_voltage(VoltageSelector::Avs).unwrap();
        assert_eq!(session.selected_voltage(), Some(VoltageSelector::Avs));
        assert_eq!(session.selected_voltage_mv(), Some(Millivolt(28000)));

        assert_eq!(
            session.controller().requests(),
            &[
                Request::SetVoltage(VoltageSelector::V28),
                Request::SetVoltage(VoltageSelector::Avs)
            ]
        );
    }

    #[test]
    fn test_configure_out_of_range() {
        let mut session = session();

        assert!(matches!(
            session.configure_avs(Millivolt(30000)),
            Err(Error::OutOfRange { .. })
        ));
        assert!(matches!(
            session.configure_pps(Millivolt(3300)),
            Err(Error::OutOfRange { .. })
        ));
        session.configure_avs(Millivolt(24000)).unwrap();

        assert_eq!(
            session.controller().requests(),
            &[Request::Avs(Millivolt(24000))]
        );
    }

    #[test]
    fn test_update_status() {
        let mut session = session();
        session.select_voltage(VoltageSelector::V5).unwrap();
        let status = session.update_status().unwrap();

        assert_eq!(status.protocol, Protocol::Pd);
        assert!(session.pd_active());
        assert_eq!(session.available_current(), Milliamp(3000));
        assert_eq!(session.current_power_w(), 15);
    }

    #[test]
    fn test_render_summary() {
        let mut session = session();
        session.refresh().unwrap();
        session.update_status().unwrap();

        assert_eq!(
            session.render_summary().unwrap(),
            "=== PDO Information ===\n\
             Protocol: USB-PD\n\
             Total PDOs: 2\n\
             Capabilities: EPR AVS\n\
             PDO Entries:\n\
             [0] SPR 5V 3.00A 15.0W\n\
             [1] AVS 15-28V 5.00A\n"
        );
    }
}
