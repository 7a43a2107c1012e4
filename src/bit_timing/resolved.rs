use std::fmt;

use strum_macros::FromRepr;
use tracing::debug;

use crate::bit_timing::constants::{
    CAN_SYNC_SEG, DELAY_PER_METER_NS, ISO_BITRATE_MAX, ISO_BITRATE_MIN, ISO_BRP_MAX, ISO_NBT_MAX,
    ISO_NBT_MIN, NS_PER_SECOND,
};
use crate::bit_timing::error::{Error, InputError};
use crate::bit_timing::profile::TimingProfile;
use crate::bit_timing::sample_point;
use crate::controllers::SJA1000;

/// Number of times the bus level is sampled per bit.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash, FromRepr)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[repr(u8)]
pub enum SampleMode {
    #[default]
    Single = 1,
    /// Three samples in a row, the last one on the edge between TSEG1 and TSEG2.
    /// Only useful for slow bitrates.
    Triple = 3,
}

/// A quantized bit timing: prescaler, time segments and SJW for one controller clock.
///
/// Bitrate, sample point and time quantum are always derived from the stored integer fields.
/// Values are produced once, either by [`resolve`](crate::bit_timing::resolve) or by one of the
/// direct constructors, and never change afterwards.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(try_from = "RawBitTiming"))]
pub struct ResolvedBitTiming {
    clock_hz: u32,
    brp: u32,
    tseg1: u32,
    tseg2: u32,
    sjw: u32,
    sample_mode: SampleMode,
}

impl ResolvedBitTiming {
    /// Build a timing from known register fields, e.g. values read back from a controller.
    pub fn new(clock_hz: u32, brp: u32, tseg1: u32, tseg2: u32, sjw: u32) -> Result<Self, Error> {
        if clock_hz == 0 {
            return Err(InputError::InvalidClock.into());
        }
        for (field, value) in [("brp", brp), ("tseg1", tseg1), ("tseg2", tseg2), ("sjw", sjw)] {
            if value == 0 {
                return Err(InputError::ZeroField { field }.into());
            }
        }
        if sjw > tseg2 {
            return Err(InputError::SjwGreaterThanTseg2 { sjw, tseg2 }.into());
        }
        bit_time(tseg1, tseg2)?;

        Ok(Self {
            clock_hz,
            brp,
            tseg1,
            tseg2,
            sjw,
            sample_mode: SampleMode::Single,
        })
    }

    /// Decode the SJA1000 style BTR0/BTR1 register pair.
    pub fn from_btr(clock_hz: u32, btr0: u8, btr1: u8) -> Result<Self, Error> {
        let brp = u32::from(btr0 & 0x3f) + 1;
        let sjw = u32::from(btr0 >> 6) + 1;
        let tseg1 = u32::from(btr1 & 0xf) + 1;
        let tseg2 = u32::from((btr1 >> 4) & 0x7) + 1;
        // SAM bit set means three samples per bit
        let sample_mode = SampleMode::from_repr(1 + 2 * (btr1 >> 7)).unwrap_or_default();

        Ok(Self::new(clock_hz, brp, tseg1, tseg2, sjw)?.with_sample_mode(sample_mode))
    }

    /// Build a timing from a bitrate and segment lengths, deriving the prescaler.
    ///
    /// Fails if the effective bitrate diverges from `bitrate` by more than 1/256.
    pub fn from_bitrate_and_segments(
        clock_hz: u32,
        bitrate: u32,
        tseg1: u32,
        tseg2: u32,
        sjw: u32,
    ) -> Result<Self, Error> {
        if bitrate == 0 {
            return Err(InputError::InvalidBitrate.into());
        }

        let denom = u64::from(bitrate) * u64::from(bit_time(tseg1, tseg2)?);
        let brp = (u64::from(clock_hz) + denom / 2) / denom;
        let brp = u32::try_from(brp).map_err(|_| InputError::FieldOutOfRange {
            field: "brp",
            value: u32::MAX,
            min: 1,
            max: u32::MAX - 1,
        })?;

        let bt = Self::new(clock_hz, brp, tseg1, tseg2, sjw)?;
        let effective = bt.achieved_bitrate();
        if u64::from(effective.abs_diff(bitrate)) * 256 > u64::from(bitrate) {
            return Err(InputError::BitrateDiverges {
                requested: bitrate,
                effective,
            }
            .into());
        }

        Ok(bt)
    }

    /// Returns a copy using a different number of samples per bit.
    pub fn with_sample_mode(self, sample_mode: SampleMode) -> Self {
        Self {
            sample_mode,
            ..self
        }
    }

    /// The CAN system clock frequency in Hz.
    pub fn clock_hz(&self) -> u32 {
        self.clock_hz
    }

    /// Bit rate prescaler.
    pub fn prescaler(&self) -> u32 {
        self.brp
    }

    /// Time segment 1, the number of quanta from (but not including) the sync segment to the
    /// sample point.
    pub fn tseg1(&self) -> u32 {
        self.tseg1
    }

    /// Time segment 2, the number of quanta from the sample point to the end of the bit.
    pub fn tseg2(&self) -> u32 {
        self.tseg2
    }

    pub fn sjw(&self) -> u32 {
        self.sjw
    }

    pub fn sample_mode(&self) -> SampleMode {
        self.sample_mode
    }

    /// Nominal bit time in quanta.
    pub fn nbt(&self) -> u32 {
        CAN_SYNC_SEG + self.tseg1 + self.tseg2
    }

    /// Propagation segment, the lower half of tseg1.
    pub fn prop_seg(&self) -> u32 {
        self.tseg1 / 2
    }

    pub fn phase_seg1(&self) -> u32 {
        self.tseg1 - self.prop_seg()
    }

    pub fn phase_seg2(&self) -> u32 {
        self.tseg2
    }

    /// Actual bitrate in bits per second.
    pub fn achieved_bitrate(&self) -> u32 {
        (u64::from(self.clock_hz) / (u64::from(self.brp) * u64::from(self.nbt()))) as u32
    }

    /// Sample point in percent.
    pub fn achieved_sample_point_percent(&self) -> f64 {
        100.0 * f64::from(self.nbt() - self.tseg2) / f64::from(self.nbt())
    }

    /// Sample point in one-tenth of a percent, rounded down.
    pub fn sample_point_permille(&self) -> u32 {
        (1000 * u64::from(self.nbt() - self.tseg2) / u64::from(self.nbt())) as u32
    }

    /// Time quantum in nanoseconds, rounded down.
    pub fn time_quantum_ns(&self) -> u64 {
        u64::from(self.brp) * NS_PER_SECOND / u64::from(self.clock_hz)
    }

    fn time_quantum_ns_exact(&self) -> f64 {
        f64::from(self.brp) * NS_PER_SECOND as f64 / f64::from(self.clock_hz)
    }

    /// Checks that every field is within the register ranges of `profile`.
    pub fn check_profile(&self, profile: &TimingProfile) -> Result<(), Error> {
        if !profile.brp_in_range(self.brp) {
            return Err(out_of_range("brp", self.brp, profile.brp_min, profile.brp_max));
        }
        if profile.brp_inc == 0 || self.brp % profile.brp_inc != 0 {
            return Err(InputError::BrpNotAligned {
                brp: self.brp,
                brp_inc: profile.brp_inc,
            }
            .into());
        }
        if !profile.tseg1_in_range(self.tseg1) {
            return Err(out_of_range("tseg1", self.tseg1, profile.tseg1_min, profile.tseg1_max));
        }
        if !profile.tseg2_in_range(self.tseg2) {
            return Err(out_of_range("tseg2", self.tseg2, profile.tseg2_min, profile.tseg2_max));
        }

        let sjw_max = profile.sjw_max.max(1);
        if self.sjw > sjw_max {
            return Err(InputError::SjwGreaterThanMax {
                sjw: self.sjw,
                sjw_max,
            }
            .into());
        }

        Ok(())
    }

    /// Restrict the timing to the minimum range every ISO 11898 controller supports.
    pub fn check_iso_minimum(&self) -> Result<(), Error> {
        let nbt = self.nbt();
        if !(ISO_NBT_MIN..=ISO_NBT_MAX).contains(&nbt) {
            return Err(out_of_range("nbt", nbt, ISO_NBT_MIN, ISO_NBT_MAX));
        }
        if !(1..=ISO_BRP_MAX).contains(&self.brp) {
            return Err(out_of_range("brp", self.brp, 1, ISO_BRP_MAX));
        }
        let bitrate = self.achieved_bitrate();
        if !(ISO_BITRATE_MIN..=ISO_BITRATE_MAX).contains(&bitrate) {
            return Err(out_of_range("bitrate", bitrate, ISO_BITRATE_MIN, ISO_BITRATE_MAX));
        }
        Ok(())
    }

    /// Oscillator tolerance in percent according to ISO 11898-1.
    ///
    /// `node_loop_delay_ns` is the transceiver loop delay, `bus_length_m` the bus length.
    pub fn oscillator_tolerance(&self, node_loop_delay_ns: f64, bus_length_m: f64) -> f64 {
        let nbt = f64::from(self.nbt());
        let phase_seg1 = self.phase_seg1_after_propagation(node_loop_delay_ns, bus_length_m);
        let phase_seg2 = f64::from(self.tseg2);

        // resynchronization
        let df_resync = f64::from(self.sjw) / (2.0 * 10.0 * nbt);
        // sampling of the bit after an error flag
        let df_error_flag = phase_seg1.min(phase_seg2) / (2.0 * (13.0 * nbt - phase_seg2));

        (df_resync.min(df_error_flag) * 100.0).max(0.0)
    }

    /// What is left of tseg1 once the round trip bus delay is taken out, in quanta.
    pub(crate) fn phase_seg1_after_propagation(
        &self,
        node_loop_delay_ns: f64,
        bus_length_m: f64,
    ) -> f64 {
        let propagation_delay_ns =
            2.0 * (node_loop_delay_ns + DELAY_PER_METER_NS * bus_length_m);
        let prop_seg = (propagation_delay_ns / self.time_quantum_ns_exact()).ceil();
        f64::from(self.tseg1) - prop_seg
    }

    /// Returns a timing for another controller clock with the same bitrate and sample point.
    pub fn with_clock(&self, clock_hz: u32) -> Result<Self, Error> {
        let bitrate = self.achieved_bitrate();
        let limits = SJA1000.with_clock(clock_hz);

        // try another prescaler first
        let same_segments = Self::from_bitrate_and_segments(
            clock_hz,
            bitrate,
            self.tseg1,
            self.tseg2,
            self.sjw,
        )
        .and_then(|bt| {
            bt.check_profile(&limits)?;
            bt.check_iso_minimum()?;
            Ok(bt)
        });
        if let Ok(bt) = same_segments {
            debug!("Clock change to {} Hz kept segments, brp {}", clock_hz, bt.brp);
            return Ok(bt.with_sample_mode(self.sample_mode));
        }

        let sample_point = self.achieved_sample_point_percent();
        let bt = sample_point::from_sample_point(&limits, bitrate, sample_point)?;
        if (bt.achieved_sample_point_percent() - sample_point).abs() > 1.0 {
            return Err(InputError::SamplePointDiverges {
                from: sample_point,
                to: bt.achieved_sample_point_percent(),
            }
            .into());
        }

        // keep the same sjw relative to the bit time
        let sjw = (f64::from(self.sjw) / f64::from(self.nbt()) * f64::from(bt.nbt()))
            .round_ties_even() as u32;
        let sjw = sjw.min(4).min(bt.tseg2).max(1);
        debug!(
            "Clock change to {} Hz recalculated segments, brp {} tseg1 {} tseg2 {} sjw {}",
            clock_hz, bt.brp, bt.tseg1, bt.tseg2, sjw
        );

        Ok(Self {
            sjw,
            sample_mode: self.sample_mode,
            ..bt
        })
    }
}

/// Nominal bit time of `tseg1` and `tseg2`, if it fits a u32.
pub(crate) fn bit_time(tseg1: u32, tseg2: u32) -> Result<u32, InputError> {
    CAN_SYNC_SEG
        .checked_add(tseg1)
        .and_then(|t| t.checked_add(tseg2))
        .ok_or(InputError::BitTimeOverflow { tseg1, tseg2 })
}

pub(crate) fn out_of_range(field: &'static str, value: u32, min: u32, max: u32) -> Error {
    InputError::FieldOutOfRange {
        field,
        value,
        min,
        max,
    }
    .into()
}

impl fmt::Display for ResolvedBitTiming {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "BR: {} bit/s, SP: {:.2}%, BRP: {}, TSEG1: {}, TSEG2: {}, SJW: {}",
            self.achieved_bitrate(),
            self.achieved_sample_point_percent(),
            self.brp,
            self.tseg1,
            self.tseg2,
            self.sjw
        )?;
        if let Ok(btr) = self.btr0_btr1() {
            write!(f, ", BTR: {}h", hex::encode_upper([btr.btr0, btr.btr1]))?;
        }
        write!(f, ", CLK: {:.0}MHz", f64::from(self.clock_hz) / 1e6)
    }
}

#[cfg(feature = "serde")]
#[derive(serde::Deserialize)]
struct RawBitTiming {
    clock_hz: u32,
    brp: u32,
    tseg1: u32,
    tseg2: u32,
    sjw: u32,
    #[serde(default)]
    sample_mode: SampleMode,
}

#[cfg(feature = "serde")]
impl TryFrom<RawBitTiming> for ResolvedBitTiming {
    type Error = Error;

    fn try_from(raw: RawBitTiming) -> Result<Self, Self::Error> {
        Ok(Self::new(raw.clock_hz, raw.brp, raw.tseg1, raw.tseg2, raw.sjw)?
            .with_sample_mode(raw.sample_mode))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sja1000_reference_values() {
        let timing = ResolvedBitTiming::from_bitrate_and_segments(8_000_000, 125_000, 11, 4, 2)
            .unwrap()
            .with_sample_mode(SampleMode::Triple);
        assert_eq!(timing.clock_hz(), 8_000_000);
        assert_eq!(timing.achieved_bitrate(), 125_000);
        assert_eq!(timing.prescaler(), 4);
        assert_eq!(timing.nbt(), 16);
        assert_eq!(timing.sample_mode(), SampleMode::Triple);
        assert_eq!(timing.achieved_sample_point_percent(), 75.0);

        let timing =
            ResolvedBitTiming::from_bitrate_and_segments(8_000_000, 500_000, 13, 2, 1).unwrap();
        assert_eq!(timing.prescaler(), 1);
        assert_eq!(timing.nbt(), 16);
        assert_eq!(timing.achieved_sample_point_percent(), 87.5);
        assert_eq!(timing.sample_point_permille(), 875);

        let timing =
            ResolvedBitTiming::from_bitrate_and_segments(8_000_000, 1_000_000, 5, 2, 1).unwrap();
        assert_eq!(timing.prescaler(), 1);
        assert_eq!(timing.nbt(), 8);
        assert_eq!(timing.achieved_sample_point_percent(), 75.0);
    }

    #[test]
    fn large_segments() {
        let timing =
            ResolvedBitTiming::from_bitrate_and_segments(80_000_000, 500_000, 119, 40, 40)
                .unwrap();
        assert_eq!(timing.prescaler(), 1);
        assert_eq!(timing.nbt(), 160);
        assert_eq!(timing.achieved_sample_point_percent(), 75.0);

        let timing =
            ResolvedBitTiming::from_bitrate_and_segments(80_000_000, 2_000_000, 29, 10, 10)
                .unwrap();
        assert_eq!(timing.achieved_bitrate(), 2_000_000);
        assert_eq!(timing.nbt(), 40);
    }

    #[test]
    fn diverging_bitrate_rejected() {
        // 8 MHz / (1 * 16) = 500 kbit/s is nowhere near 300 kbit/s
        let err =
            ResolvedBitTiming::from_bitrate_and_segments(8_000_000, 300_000, 13, 2, 1).unwrap_err();
        assert!(matches!(
            err,
            Error::InvalidInput(InputError::BitrateDiverges {
                requested: 300_000,
                ..
            })
        ));
    }

    #[test]
    fn direct_construction_validates_fields() {
        assert_eq!(
            ResolvedBitTiming::new(0, 1, 13, 2, 1),
            Err(Error::InvalidInput(InputError::InvalidClock))
        );
        assert_eq!(
            ResolvedBitTiming::new(8_000_000, 0, 13, 2, 1),
            Err(Error::InvalidInput(InputError::ZeroField { field: "brp" }))
        );
        assert_eq!(
            ResolvedBitTiming::new(8_000_000, 1, 13, 2, 3),
            Err(Error::InvalidInput(InputError::SjwGreaterThanTseg2 { sjw: 3, tseg2: 2 }))
        );
    }

    #[test]
    fn bit_time_must_fit() {
        assert_eq!(
            ResolvedBitTiming::new(8_000_000, 1, u32::MAX, 1, 1),
            Err(Error::InvalidInput(InputError::BitTimeOverflow {
                tseg1: u32::MAX,
                tseg2: 1
            }))
        );
        assert!(matches!(
            ResolvedBitTiming::from_bitrate_and_segments(8_000_000, 500_000, u32::MAX, 1, 1),
            Err(Error::InvalidInput(InputError::BitTimeOverflow { .. }))
        ));

        // the longest representable bit time still yields derived values
        let timing = ResolvedBitTiming::new(8_000_000, 1, u32::MAX - 2, 1, 1).unwrap();
        assert_eq!(timing.nbt(), u32::MAX);
        assert_eq!(timing.achieved_bitrate(), 0);
        assert_eq!(timing.sample_point_permille(), 999);
        assert!(timing.to_string().starts_with("BR: 0 bit/s"));
    }

    #[test]
    fn derived_values() {
        let timing = ResolvedBitTiming::new(144_000_000, 9, 11, 4, 1).unwrap();
        assert_eq!(timing.achieved_bitrate(), 1_000_000);
        assert_eq!(timing.time_quantum_ns(), 62);
        assert_eq!(timing.prop_seg(), 5);
        assert_eq!(timing.phase_seg1(), 6);
        assert_eq!(timing.phase_seg2(), 4);
        assert_eq!(timing.sample_point_permille(), 750);
    }

    #[test]
    fn from_btr() {
        let timing = ResolvedBitTiming::from_btr(8_000_000, 0x00, 0x14).unwrap();
        assert_eq!(timing.achieved_bitrate(), 1_000_000);
        assert_eq!(timing.prescaler(), 1);
        assert_eq!(timing.nbt(), 8);
        assert_eq!(timing.tseg1(), 5);
        assert_eq!(timing.tseg2(), 2);
        assert_eq!(timing.sjw(), 1);
        assert_eq!(timing.achieved_sample_point_percent(), 75.0);

        let timing = ResolvedBitTiming::from_btr(8_000_000, 0x43, 0xBA).unwrap();
        assert_eq!(timing.prescaler(), 4);
        assert_eq!(timing.sjw(), 2);
        assert_eq!(timing.tseg1(), 11);
        assert_eq!(timing.tseg2(), 4);
        assert_eq!(timing.sample_mode(), SampleMode::Triple);
    }

    #[test]
    fn sample_mode_from_repr() {
        assert_eq!(SampleMode::from_repr(1), Some(SampleMode::Single));
        assert_eq!(SampleMode::from_repr(3), Some(SampleMode::Triple));
        assert_eq!(SampleMode::from_repr(2), None);
    }

    #[test]
    fn check_profile() {
        let profile = TimingProfile {
            clock_hz: 8_000_000,
            tseg1_min: 4,
            tseg1_max: 16,
            tseg2_min: 2,
            tseg2_max: 8,
            sjw_max: 4,
            brp_min: 2,
            brp_max: 64,
            brp_inc: 2,
        };

        let timing = ResolvedBitTiming::new(8_000_000, 2, 13, 2, 1).unwrap();
        assert_eq!(timing.check_profile(&profile), Ok(()));

        let timing = ResolvedBitTiming::new(8_000_000, 3, 13, 2, 1).unwrap();
        assert_eq!(
            timing.check_profile(&profile),
            Err(Error::InvalidInput(InputError::BrpNotAligned { brp: 3, brp_inc: 2 }))
        );

        let timing = ResolvedBitTiming::new(8_000_000, 2, 14, 1, 1).unwrap();
        assert_eq!(
            timing.check_profile(&profile),
            Err(Error::InvalidInput(InputError::FieldOutOfRange {
                field: "tseg2",
                value: 1,
                min: 2,
                max: 8
            }))
        );
    }

    #[test]
    fn iso_minimum() {
        let timing = ResolvedBitTiming::new(8_000_000, 1, 13, 2, 1).unwrap();
        assert!(timing.check_iso_minimum().is_ok());

        let timing = ResolvedBitTiming::new(8_000_000, 1, 4, 2, 1).unwrap();
        assert!(timing.check_iso_minimum().is_err());

        let timing = ResolvedBitTiming::new(8_000_000, 64, 13, 2, 1).unwrap();
        assert!(timing.check_iso_minimum().is_err());
    }

    #[test]
    fn oscillator_tolerance() {
        // tq = 125 ns, prop_seg = ceil(600 / 125) = 5
        let timing = ResolvedBitTiming::new(8_000_000, 1, 13, 2, 1).unwrap();
        let tolerance = timing.oscillator_tolerance(250.0, 10.0);
        assert!((tolerance - 0.3125).abs() < 1e-9);

        // the propagation delay eats all of tseg1
        let timing = ResolvedBitTiming::new(8_000_000, 1, 4, 2, 1).unwrap();
        assert_eq!(timing.oscillator_tolerance(250.0, 10.0), 0.0);
    }

    #[test]
    fn with_clock_keeps_segments() {
        let timing = ResolvedBitTiming::new(8_000_000, 1, 13, 2, 1)
            .unwrap()
            .with_sample_mode(SampleMode::Triple);
        let other = timing.with_clock(16_000_000).unwrap();
        assert_eq!(other.clock_hz(), 16_000_000);
        assert_eq!(other.prescaler(), 2);
        assert_eq!(other.tseg1(), 13);
        assert_eq!(other.tseg2(), 2);
        assert_eq!(other.achieved_bitrate(), 500_000);
        assert_eq!(other.sample_mode(), SampleMode::Triple);
    }

    #[test]
    fn display() {
        let timing = ResolvedBitTiming::new(8_000_000, 1, 5, 2, 1).unwrap();
        assert_eq!(
            timing.to_string(),
            "BR: 1000000 bit/s, SP: 75.00%, BRP: 1, TSEG1: 5, TSEG2: 2, SJW: 1, \
             BTR: 0014h, CLK: 8MHz"
        );

        // tseg1 does not fit BTR1, so the register part is left out
        let timing = ResolvedBitTiming::new(80_000_000, 1, 119, 40, 40).unwrap();
        assert_eq!(
            timing.to_string(),
            "BR: 500000 bit/s, SP: 75.00%, BRP: 1, TSEG1: 119, TSEG2: 40, SJW: 40, CLK: 80MHz"
        );
    }
}
