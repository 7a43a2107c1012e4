//! Timing profiles of common CAN controllers.
//!
//! Limits are taken from the matching Linux drivers. The clock is the one found on the most
//! common boards, use [`TimingProfile::with_clock`] for other crystals.
use strum_macros::{Display, EnumIter, EnumString, IntoStaticStr};

use crate::bit_timing::{
    self, DataPhaseConfig, RegisterLayout, ResolvedBitTiming, ResolvedBitTimingFd, TimingConfig,
    TimingProfile,
};
use crate::Error;

/// NXP SJA1000 and compatible controllers, 16 MHz crystal divided by two.
pub const SJA1000: TimingProfile = TimingProfile {
    clock_hz: 8_000_000,
    tseg1_min: 1,
    tseg1_max: 16,
    tseg2_min: 1,
    tseg2_max: 8,
    sjw_max: 4,
    brp_min: 1,
    brp_max: 64,
    brp_inc: 1,
};

/// Microchip MCP2510/MCP2515.
pub const MCP2515: TimingProfile = TimingProfile {
    clock_hz: 8_000_000,
    tseg1_min: 3,
    tseg1_max: 16,
    tseg2_min: 2,
    tseg2_max: 8,
    sjw_max: 4,
    brp_min: 1,
    brp_max: 64,
    brp_inc: 1,
};

/// Atmel AT91 CAN controller.
pub const AT91: TimingProfile = TimingProfile {
    clock_hz: 100_000_000,
    tseg1_min: 4,
    tseg1_max: 16,
    tseg2_min: 2,
    tseg2_max: 8,
    sjw_max: 4,
    brp_min: 2,
    brp_max: 128,
    brp_inc: 1,
};

/// Freescale FlexCAN.
pub const FLEXCAN: TimingProfile = TimingProfile {
    clock_hz: 24_000_000,
    tseg1_min: 4,
    tseg1_max: 16,
    tseg2_min: 2,
    tseg2_max: 8,
    sjw_max: 4,
    brp_min: 1,
    brp_max: 256,
    brp_inc: 1,
};

/// TI High End CAN Controller.
pub const TI_HECC: TimingProfile = TimingProfile {
    clock_hz: 13_000_000,
    tseg1_min: 1,
    tseg1_max: 16,
    tseg2_min: 1,
    tseg2_max: 8,
    sjw_max: 4,
    brp_min: 1,
    brp_max: 256,
    brp_inc: 1,
};

/// Renesas R-Car CAN.
pub const RCAR_CAN: TimingProfile = TimingProfile {
    clock_hz: 48_000_000,
    tseg1_min: 4,
    tseg1_max: 16,
    tseg2_min: 2,
    tseg2_max: 8,
    sjw_max: 4,
    brp_min: 1,
    brp_max: 1024,
    brp_inc: 1,
};

/// CANFD-USB adapter (cfuc), classic CAN timing of its 144 MHz peripheral clock.
pub const CFUC: TimingProfile = TimingProfile {
    clock_hz: 144_000_000,
    tseg1_min: 1,
    tseg1_max: 16,
    tseg2_min: 1,
    tseg2_max: 8,
    sjw_max: 4,
    brp_min: 1,
    brp_max: 64,
    brp_inc: 1,
};

/// Bosch M_CAN (3.1 and later), arbitration phase.
pub const MCAN: TimingProfile = TimingProfile {
    clock_hz: 40_000_000,
    tseg1_min: 2,
    tseg1_max: 256,
    tseg2_min: 2,
    tseg2_max: 128,
    sjw_max: 128,
    brp_min: 1,
    brp_max: 512,
    brp_inc: 1,
};

/// Bosch M_CAN (3.1 and later), data phase.
pub const MCAN_DATA: TimingProfile = TimingProfile {
    clock_hz: 40_000_000,
    tseg1_min: 1,
    tseg1_max: 32,
    tseg2_min: 1,
    tseg2_max: 16,
    sjw_max: 16,
    brp_min: 1,
    brp_max: 32,
    brp_inc: 1,
};

/// Controller families with a built-in profile.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, EnumIter, EnumString, Display, IntoStaticStr)]
#[strum(serialize_all = "snake_case")]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum Controller {
    Sja1000,
    Mcp2515,
    At91,
    Flexcan,
    TiHecc,
    RcarCan,
    Cfuc,
    Mcan,
}

impl Controller {
    pub fn profile(&self) -> TimingProfile {
        match self {
            Controller::Sja1000 => SJA1000,
            Controller::Mcp2515 => MCP2515,
            Controller::At91 => AT91,
            Controller::Flexcan => FLEXCAN,
            Controller::TiHecc => TI_HECC,
            Controller::RcarCan => RCAR_CAN,
            Controller::Cfuc => CFUC,
            Controller::Mcan => MCAN,
        }
    }

    /// Data phase profile of CAN FD capable controllers.
    pub fn data_profile(&self) -> Option<TimingProfile> {
        match self {
            Controller::Mcan => Some(MCAN_DATA),
            _ => None,
        }
    }

    /// Register layout of the controller, `None` if the timing is handed over as raw fields.
    pub fn layout(&self) -> Option<RegisterLayout> {
        match self {
            Controller::Sja1000 => Some(RegisterLayout::Btr),
            Controller::Mcp2515 => Some(RegisterLayout::Cnf),
            Controller::At91 => Some(RegisterLayout::CanBr),
            Controller::Flexcan => Some(RegisterLayout::CanCtrl),
            Controller::TiHecc => Some(RegisterLayout::CanBtc),
            Controller::RcarCan => Some(RegisterLayout::Cibcr),
            Controller::Cfuc | Controller::Mcan => None,
        }
    }

    /// Look up a controller by its snake_case name, e.g. `"ti_hecc"`.
    pub fn from_name(name: &str) -> crate::Result<Controller> {
        name.parse()
            .map_err(|_| Error::UnknownController(name.to_string()))
    }

    /// Resolve `bitrate` with the CiA default sample point.
    pub fn resolve(&self, bitrate: u32) -> crate::Result<ResolvedBitTiming> {
        Ok(bit_timing::resolve(bitrate, None, &self.profile())?)
    }

    /// Resolve a CAN FD timing, the data phase with an 80% sample point.
    pub fn resolve_fd(
        &self,
        nominal_bitrate: u32,
        data_bitrate: u32,
    ) -> crate::Result<ResolvedBitTimingFd> {
        let config = TimingConfig {
            bitrate: nominal_bitrate,
            data: Some(DataPhaseConfig {
                bitrate: data_bitrate,
                ..Default::default()
            }),
            ..Default::default()
        };
        let data_profile = self
            .data_profile()
            .ok_or(bit_timing::InputError::MissingDataPhase)
            .map_err(bit_timing::Error::from)?;

        Ok(config.resolve_fd(&self.profile(), &data_profile)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use strum::IntoEnumIterator;

    #[test]
    fn names() {
        assert_eq!(Controller::TiHecc.to_string(), "ti_hecc");
        assert_eq!(Controller::RcarCan.to_string(), "rcar_can");
        let name: &'static str = Controller::Sja1000.into();
        assert_eq!(name, "sja1000");

        for controller in Controller::iter() {
            assert_eq!(Controller::from_name(&controller.to_string()), Ok(controller));
        }
    }

    #[test]
    fn unknown_name() {
        assert_eq!(
            Controller::from_name("c_can"),
            Err(Error::UnknownController("c_can".to_string()))
        );
    }

    #[test]
    fn profiles_are_valid() {
        for controller in Controller::iter() {
            assert_eq!(controller.profile().validate(), Ok(()), "{}", controller);
        }
    }

    #[test]
    fn resolve_known_bitrates() {
        let timing = Controller::Sja1000.resolve(500_000).unwrap();
        assert_eq!((timing.prescaler(), timing.tseg1(), timing.tseg2()), (1, 13, 2));

        let timing = Controller::At91.resolve(1_000_000).unwrap();
        assert_eq!((timing.prescaler(), timing.tseg1(), timing.tseg2()), (5, 14, 5));

        let timing = Controller::Flexcan.resolve(1_000_000).unwrap();
        assert_eq!((timing.prescaler(), timing.tseg1(), timing.tseg2()), (2, 8, 3));

        let timing = Controller::TiHecc.resolve(125_000).unwrap();
        assert_eq!((timing.prescaler(), timing.tseg1(), timing.tseg2()), (13, 6, 1));

        let timing = Controller::RcarCan.resolve(500_000).unwrap();
        assert_eq!((timing.prescaler(), timing.tseg1(), timing.tseg2()), (6, 13, 2));

        let timing = Controller::Cfuc.resolve(250_000).unwrap();
        assert_eq!((timing.prescaler(), timing.tseg1(), timing.tseg2()), (36, 13, 2));
    }

    #[test]
    fn resolve_errors_are_wrapped() {
        assert_eq!(
            Controller::At91.resolve(10_000),
            Err(Error::BitTiming(bit_timing::Error::NoFeasibleTiming { bitrate: 10_000 }))
        );
    }

    #[test]
    fn layouts() {
        assert_eq!(Controller::Mcp2515.layout(), Some(RegisterLayout::Cnf));
        assert_eq!(Controller::Cfuc.layout(), None);
    }

    #[test]
    fn data_profiles() {
        for controller in Controller::iter() {
            match controller.data_profile() {
                Some(profile) => {
                    assert_eq!(profile.validate(), Ok(()), "{}", controller);
                    assert_eq!(profile.clock_hz, controller.profile().clock_hz);
                }
                None => assert_ne!(controller, Controller::Mcan),
            }
        }
    }

    #[test]
    fn resolve_mcan() {
        let expected = [
            (125_000, (2, 139, 20)),
            (250_000, (1, 139, 20)),
            (500_000, (1, 69, 10)),
            (1_000_000, (1, 29, 10)),
        ];
        for (bitrate, fields) in expected {
            let timing = Controller::Mcan.resolve(bitrate).unwrap();
            assert_eq!((timing.prescaler(), timing.tseg1(), timing.tseg2()), fields);
        }

        let expected = [
            (1_000_000, (1, 31, 8)),
            (2_000_000, (1, 15, 4)),
            (4_000_000, (1, 7, 2)),
            (5_000_000, (2, 2, 1)),
            (8_000_000, (1, 3, 1)),
        ];
        for (bitrate, fields) in expected {
            let data = Controller::Mcan.resolve_fd(500_000, bitrate).unwrap().data();
            assert_eq!((data.prescaler(), data.tseg1(), data.tseg2()), fields, "{}", bitrate);
        }
    }

    #[test]
    fn resolve_fd_needs_a_data_profile() {
        assert_eq!(
            Controller::Sja1000.resolve_fd(500_000, 2_000_000),
            Err(Error::BitTiming(bit_timing::Error::InvalidInput(
                bit_timing::InputError::MissingDataPhase
            )))
        );
    }
}
