//! CAN bit timing calculation and register encoding.
//!
//! A [`TimingProfile`] describes what a controller can do, [`resolve`] or a
//! [`BitTimingCalculator`] turn a requested bitrate into a [`ResolvedBitTiming`], which can
//! then be encoded into the registers of the controller family.
//!
//! CAN FD controllers get a second profile for the data phase. Both phases together form a
//! [`ResolvedBitTimingFd`].

mod calculator;
pub mod constants;
mod error;
mod fd;
mod profile;
mod registers;
mod resolved;
pub mod sample_point;

pub use calculator::{default_sample_point, resolve, BitTimingCalculator};
pub use error::{Error, InputError};
pub use fd::{PhaseSegments, ResolvedBitTimingFd};
pub use profile::TimingProfile;
pub use registers::{Btr, Cnf, RegisterLayout, RegisterValue};
pub use resolved::{ResolvedBitTiming, SampleMode};
pub use sample_point::{from_sample_point, iter_from_sample_point};

const DEFAULT_BITRATE: u32 = 500_000;
const DEFAULT_DATA_BITRATE: u32 = 2_000_000;
/// SAE J2284-4 data phase sample point.
const DEFAULT_DATA_SAMPLE_POINT: u32 = 800;

/// Bit timing settings as an adapter backend keeps them in its configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct TimingConfig {
    pub bitrate: u32,
    /// Nominal sample point in permille. CiA recommendation if not set.
    pub sample_point: Option<u32>,
    pub sjw: Option<u32>,
    pub sample_mode: SampleMode,
    /// CAN FD data phase, `None` for classic CAN.
    pub data: Option<DataPhaseConfig>,
}

/// Data phase settings of a CAN FD configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct DataPhaseConfig {
    pub bitrate: u32,
    /// Data sample point in permille.
    pub sample_point: Option<u32>,
    pub sjw: Option<u32>,
}

impl Default for DataPhaseConfig {
    fn default() -> Self {
        DataPhaseConfig {
            bitrate: DEFAULT_DATA_BITRATE,
            sample_point: Some(DEFAULT_DATA_SAMPLE_POINT),
            sjw: None,
        }
    }
}

impl Default for TimingConfig {
    fn default() -> Self {
        TimingConfig {
            bitrate: DEFAULT_BITRATE,
            sample_point: None,
            sjw: None,
            sample_mode: SampleMode::Single,
            data: None,
        }
    }
}

impl TimingConfig {
    pub fn resolve(&self, profile: &TimingProfile) -> Result<ResolvedBitTiming, Error> {
        let mut calculator = BitTimingCalculator::new(*profile).sample_mode(self.sample_mode);
        if let Some(sample_point) = self.sample_point {
            calculator = calculator.sample_point(sample_point);
        }
        if let Some(sjw) = self.sjw {
            calculator = calculator.sjw(sjw);
        }
        calculator.resolve(self.bitrate)
    }

    /// Resolve both phases of a CAN FD configuration on their own controller profiles.
    pub fn resolve_fd(
        &self,
        nominal: &TimingProfile,
        data: &TimingProfile,
    ) -> Result<ResolvedBitTimingFd, Error> {
        let config = self.data.ok_or(InputError::MissingDataPhase)?;
        let nominal = self.resolve(nominal)?;

        let mut calculator = BitTimingCalculator::new(*data);
        if let Some(sample_point) = config.sample_point {
            calculator = calculator.sample_point(sample_point);
        }
        if let Some(sjw) = config.sjw {
            calculator = calculator.sjw(sjw);
        }
        let data = calculator.resolve(config.bitrate)?;

        ResolvedBitTimingFd::new(nominal, data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::controllers::{MCAN, MCAN_DATA};

    const PROFILE: TimingProfile = TimingProfile {
        clock_hz: 8_000_000,
        tseg1_min: 4,
        tseg1_max: 16,
        tseg2_min: 2,
        tseg2_max: 8,
        sjw_max: 4,
        brp_min: 1,
        brp_max: 64,
        brp_inc: 1,
    };

    #[test]
    fn default_config() {
        let timing = TimingConfig::default().resolve(&PROFILE).unwrap();
        assert_eq!(timing.achieved_bitrate(), 500_000);
        assert_eq!(timing.prescaler(), 1);
        assert_eq!(timing.tseg1(), 13);
        assert_eq!(timing.tseg2(), 2);
        assert_eq!(timing.sjw(), 1);
        assert_eq!(timing.sample_mode(), SampleMode::Single);
    }

    #[test]
    fn config_options_are_applied() {
        let config = TimingConfig {
            bitrate: 1_000_000,
            sample_point: Some(750),
            sjw: Some(4),
            sample_mode: SampleMode::Triple,
            data: None,
        };
        let timing = config.resolve(&PROFILE).unwrap();
        assert_eq!(timing.tseg1(), 5);
        assert_eq!(timing.tseg2(), 2);
        assert_eq!(timing.sjw(), 2);
        assert_eq!(timing.sample_mode(), SampleMode::Triple);
    }

    #[test]
    fn data_phase() {
        let config = TimingConfig {
            data: Some(DataPhaseConfig::default()),
            ..Default::default()
        };
        let timing = config.resolve_fd(&MCAN, &MCAN_DATA).unwrap();
        let (nominal, data) = (timing.nominal(), timing.data());
        assert_eq!(
            (nominal.prescaler(), nominal.tseg1(), nominal.tseg2(), nominal.sjw()),
            (1, 69, 10, 1)
        );
        assert_eq!(
            (data.prescaler(), data.tseg1(), data.tseg2(), data.sjw()),
            (1, 15, 4, 1)
        );
        assert_eq!(data.achieved_bitrate(), 2_000_000);
        assert_eq!(data.achieved_sample_point_percent(), 80.0);

        let config = TimingConfig {
            data: Some(DataPhaseConfig {
                bitrate: 5_000_000,
                sjw: Some(4),
                ..Default::default()
            }),
            ..Default::default()
        };
        let data = config.resolve_fd(&MCAN, &MCAN_DATA).unwrap().data();
        assert_eq!(
            (data.prescaler(), data.tseg1(), data.tseg2(), data.sjw()),
            (2, 2, 1, 1)
        );
    }

    #[test]
    fn data_phase_is_required_for_fd() {
        assert_eq!(
            TimingConfig::default().resolve_fd(&MCAN, &MCAN_DATA),
            Err(Error::InvalidInput(InputError::MissingDataPhase))
        );

        // the data phase may not be slower than the arbitration phase
        let config = TimingConfig {
            bitrate: 1_000_000,
            data: Some(DataPhaseConfig {
                bitrate: 500_000,
                ..Default::default()
            }),
            ..Default::default()
        };
        assert_eq!(
            config.resolve_fd(&MCAN, &MCAN_DATA),
            Err(Error::InvalidInput(InputError::DataBitrateBelowNominal {
                nominal: 1_000_000,
                data: 500_000
            }))
        );
    }

    #[test]
    fn config_errors_are_forwarded() {
        let config = TimingConfig {
            bitrate: 0,
            ..Default::default()
        };
        assert_eq!(
            config.resolve(&PROFILE),
            Err(Error::InvalidInput(InputError::InvalidBitrate))
        );
    }
}
