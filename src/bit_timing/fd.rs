//! CAN FD bit timing, an arbitration (nominal) phase and a faster data phase on one clock.

use std::fmt;

use tracing::{debug, warn};

use crate::bit_timing::constants::{
    CAN_SYNC_SEG, FD_ISO_DATA_SJW_MAX, FD_ISO_DATA_TSEG1, FD_ISO_DATA_TSEG2, FD_ISO_DBT_MAX,
    FD_ISO_DBT_MIN, FD_ISO_NBT_MAX, FD_ISO_NBT_MIN, FD_ISO_NOMINAL_TSEG_MIN,
    FD_ISO_SEPARATE_PRESCALER_MAX, FD_ISO_SHARED_PRESCALER_MAX,
};
use crate::bit_timing::error::{Error, InputError};
use crate::bit_timing::resolved::{out_of_range, ResolvedBitTiming};

const MIN_SAMPLE_POINT_PERCENT: f64 = 50.0;

/// Prescalers tried by the sample point search, for both phases.
const SEARCH_BRP_MAX: u32 = 256;
const SEARCH_NOMINAL_SJW_MAX: u32 = 128;
const SEARCH_DATA_SJW_MAX: u32 = 16;

/// Bitrate and segment lengths of one phase, see
/// [`ResolvedBitTimingFd::from_bitrate_and_segments`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PhaseSegments {
    pub bitrate: u32,
    pub tseg1: u32,
    pub tseg2: u32,
    pub sjw: u32,
}

/// A CAN FD bit timing.
///
/// Both phases run from the same clock, the data phase is at least as fast as the arbitration
/// phase and both sample points are at 50% or later.
///
/// ```rust
/// use can_bittiming::bit_timing::{PhaseSegments, ResolvedBitTimingFd};
///
/// let timing = ResolvedBitTimingFd::from_bitrate_and_segments(
///     80_000_000,
///     PhaseSegments { bitrate: 1_000_000, tseg1: 59, tseg2: 20, sjw: 10 },
///     PhaseSegments { bitrate: 8_000_000, tseg1: 6, tseg2: 3, sjw: 2 },
/// )
/// .unwrap();
///
/// assert_eq!(timing.nominal().prescaler(), 1);
/// assert_eq!(timing.data().achieved_sample_point_percent(), 70.0);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(try_from = "RawBitTimingFd"))]
pub struct ResolvedBitTimingFd {
    nominal: ResolvedBitTiming,
    data: ResolvedBitTiming,
}

impl ResolvedBitTimingFd {
    pub fn new(nominal: ResolvedBitTiming, data: ResolvedBitTiming) -> Result<Self, Error> {
        if nominal.clock_hz() != data.clock_hz() {
            return Err(InputError::ClockMismatch {
                nominal: nominal.clock_hz(),
                data: data.clock_hz(),
            }
            .into());
        }
        if data.achieved_bitrate() < nominal.achieved_bitrate() {
            return Err(InputError::DataBitrateBelowNominal {
                nominal: nominal.achieved_bitrate(),
                data: data.achieved_bitrate(),
            }
            .into());
        }
        for (phase, bt) in [("nominal", &nominal), ("data", &data)] {
            let sample_point = bt.achieved_sample_point_percent();
            if sample_point < MIN_SAMPLE_POINT_PERCENT {
                return Err(InputError::SamplePointBelowMinimum {
                    phase,
                    sample_point,
                }
                .into());
            }
        }

        Ok(Self { nominal, data })
    }

    /// Build a timing from bitrates and segment lengths, deriving both prescalers.
    ///
    /// Fails if either effective bitrate diverges from the request by more than 1/256.
    pub fn from_bitrate_and_segments(
        clock_hz: u32,
        nominal: PhaseSegments,
        data: PhaseSegments,
    ) -> Result<Self, Error> {
        let phase = |p: PhaseSegments| {
            ResolvedBitTiming::from_bitrate_and_segments(
                clock_hz, p.bitrate, p.tseg1, p.tseg2, p.sjw,
            )
        };
        Self::new(phase(nominal)?, phase(data)?)
    }

    /// Returns every timing reaching both bitrates within 1/256 that passes
    /// [`check_iso_minimum`](Self::check_iso_minimum), nominal prescaler first.
    pub fn iter_from_sample_point(
        clock_hz: u32,
        nominal_bitrate: u32,
        nominal_sample_point: f64,
        data_bitrate: u32,
        data_sample_point: f64,
    ) -> Result<impl Iterator<Item = ResolvedBitTimingFd>, Error> {
        if clock_hz == 0 {
            return Err(InputError::InvalidClock.into());
        }
        if nominal_bitrate == 0 || data_bitrate == 0 {
            return Err(InputError::InvalidBitrate.into());
        }
        for sample_point in [nominal_sample_point, data_sample_point] {
            if !sample_point.is_finite() || sample_point < MIN_SAMPLE_POINT_PERCENT {
                return Err(InputError::InvalidSamplePointPercent(sample_point).into());
            }
        }

        let nominal = phase_candidates(
            clock_hz,
            nominal_bitrate,
            nominal_sample_point,
            SEARCH_NOMINAL_SJW_MAX,
        );
        let data = phase_candidates(clock_hz, data_bitrate, data_sample_point, SEARCH_DATA_SJW_MAX);

        Ok(nominal.into_iter().flat_map(move |nominal| {
            data.clone().into_iter().filter_map(move |data| {
                let bt = Self::new(nominal, data).ok()?;
                bt.check_iso_minimum().ok()?;
                Some(bt)
            })
        }))
    }

    /// Returns the timing closest to both sample points.
    ///
    /// A shared prescaler is preferred whenever one exists. Ties go to the smaller prescaler
    /// difference, then to the lower prescalers.
    pub fn from_sample_point(
        clock_hz: u32,
        nominal_bitrate: u32,
        nominal_sample_point: f64,
        data_bitrate: u32,
        data_sample_point: f64,
    ) -> Result<Self, Error> {
        let candidates: Vec<_> = Self::iter_from_sample_point(
            clock_hz,
            nominal_bitrate,
            nominal_sample_point,
            data_bitrate,
            data_sample_point,
        )?
        .collect();

        let any_shared = candidates.iter().any(|bt| bt.shares_prescaler());
        let deviation = |bt: &ResolvedBitTimingFd| {
            (bt.nominal.achieved_sample_point_percent() - nominal_sample_point).abs()
                + (bt.data.achieved_sample_point_percent() - data_sample_point).abs()
        };
        let prescalers = |bt: &ResolvedBitTimingFd| {
            let (nominal, data) = (bt.nominal.prescaler(), bt.data.prescaler());
            (nominal.abs_diff(data), u64::from(nominal) + u64::from(data))
        };

        let best = candidates
            .into_iter()
            .filter(|bt| !any_shared || bt.shares_prescaler())
            .min_by(|a, b| {
                deviation(a)
                    .total_cmp(&deviation(b))
                    .then(prescalers(a).cmp(&prescalers(b)))
            });

        match best {
            Some(bt) => {
                debug!("CAN FD sample points resolved to {}", bt);
                Ok(bt)
            }
            None => {
                warn!(
                    "No CAN FD timing for {}/{} bit/s on a {} Hz clock",
                    nominal_bitrate, data_bitrate, clock_hz
                );
                Err(Error::NoFeasibleTiming {
                    bitrate: data_bitrate,
                })
            }
        }
    }

    /// Arbitration phase timing.
    pub fn nominal(&self) -> ResolvedBitTiming {
        self.nominal
    }

    /// Data phase timing.
    pub fn data(&self) -> ResolvedBitTiming {
        self.data
    }

    pub fn clock_hz(&self) -> u32 {
        self.nominal.clock_hz()
    }

    pub fn shares_prescaler(&self) -> bool {
        self.nominal.prescaler() == self.data.prescaler()
    }

    /// Restrict the timing to the minimum range every ISO 11898 CAN FD controller supports.
    pub fn check_iso_minimum(&self) -> Result<(), Error> {
        let (nominal, data) = (&self.nominal, &self.data);
        let (tseg1_max, tseg2_max, sjw_max) = if self.shares_prescaler() {
            FD_ISO_SHARED_PRESCALER_MAX
        } else {
            FD_ISO_SEPARATE_PRESCALER_MAX
        };

        for (field, value, min, max) in [
            ("nbt", nominal.nbt(), FD_ISO_NBT_MIN, FD_ISO_NBT_MAX),
            ("dbt", data.nbt(), FD_ISO_DBT_MIN, FD_ISO_DBT_MAX),
            ("data_tseg1", data.tseg1(), FD_ISO_DATA_TSEG1.0, FD_ISO_DATA_TSEG1.1),
            ("data_tseg2", data.tseg2(), FD_ISO_DATA_TSEG2.0, FD_ISO_DATA_TSEG2.1),
            ("data_sjw", data.sjw(), 1, FD_ISO_DATA_SJW_MAX),
            ("nom_tseg1", nominal.tseg1(), FD_ISO_NOMINAL_TSEG_MIN, tseg1_max),
            ("nom_tseg2", nominal.tseg2(), FD_ISO_NOMINAL_TSEG_MIN, tseg2_max),
            ("nom_sjw", nominal.sjw(), 1, sjw_max),
        ] {
            if !(min..=max).contains(&value) {
                return Err(out_of_range(field, value, min, max));
            }
        }

        Ok(())
    }

    /// Oscillator tolerance in percent according to ISO 11898-1, covering both phases and the
    /// bit rate switch.
    pub fn oscillator_tolerance(&self, node_loop_delay_ns: f64, bus_length_m: f64) -> f64 {
        let phase_seg1 = self
            .nominal
            .phase_seg1_after_propagation(node_loop_delay_ns, bus_length_m);
        let nbt = f64::from(self.nominal.nbt());
        let nominal_phase_seg2 = f64::from(self.nominal.tseg2());
        let nominal_brp = f64::from(self.nominal.prescaler());
        let dbt = f64::from(self.data.nbt());
        let data_phase_seg2 = f64::from(self.data.tseg2());
        let data_brp = f64::from(self.data.prescaler());
        let data_sjw = f64::from(self.data.sjw());

        // data phase resynchronization
        let df_resync = data_sjw / (2.0 * 10.0 * dbt);
        // sampling of the data phase bit after an error flag
        let df_error_flag = phase_seg1.min(nominal_phase_seg2)
            / (2.0 * ((6.0 * dbt - data_phase_seg2) * data_brp / nominal_brp + 7.0 * nbt));
        // bit rate switch
        let phase_shift = data_sjw - (nominal_brp / data_brp - 1.0).max(0.0);
        let df_switch = phase_shift
            / (2.0
                * ((2.0 * nbt - nominal_phase_seg2) * nominal_brp / data_brp
                    + data_phase_seg2
                    + 4.0 * dbt));

        let data_tolerance = df_resync.min(df_error_flag).min(df_switch) * 100.0;
        // the arbitration phase conditions, already clamped at 0
        let nominal_tolerance = self
            .nominal
            .oscillator_tolerance(node_loop_delay_ns, bus_length_m);

        data_tolerance.min(nominal_tolerance).max(0.0)
    }

    /// Returns a timing for another controller clock with the same bitrates and sample points.
    pub fn with_clock(&self, clock_hz: u32) -> Result<Self, Error> {
        let segments = |bt: &ResolvedBitTiming| PhaseSegments {
            bitrate: bt.achieved_bitrate(),
            tseg1: bt.tseg1(),
            tseg2: bt.tseg2(),
            sjw: bt.sjw(),
        };

        // try other prescalers first
        let same_segments =
            Self::from_bitrate_and_segments(clock_hz, segments(&self.nominal), segments(&self.data))
                .and_then(|bt| {
                    bt.check_iso_minimum()?;
                    Ok(bt)
                });
        if let Ok(bt) = same_segments {
            debug!(
                "CAN FD clock change to {} Hz kept segments, brp {}/{}",
                clock_hz,
                bt.nominal.prescaler(),
                bt.data.prescaler()
            );
            return Self::new(
                bt.nominal.with_sample_mode(self.nominal.sample_mode()),
                bt.data.with_sample_mode(self.data.sample_mode()),
            );
        }

        let bt = Self::from_sample_point(
            clock_hz,
            self.nominal.achieved_bitrate(),
            self.nominal.achieved_sample_point_percent(),
            self.data.achieved_bitrate(),
            self.data.achieved_sample_point_percent(),
        )?;
        for (from, to) in [(&self.nominal, &bt.nominal), (&self.data, &bt.data)] {
            let (from, to) = (
                from.achieved_sample_point_percent(),
                to.achieved_sample_point_percent(),
            );
            if (from - to).abs() > 1.0 {
                return Err(InputError::SamplePointDiverges { from, to }.into());
            }
        }

        let nominal = rescale_sjw(&self.nominal, &bt.nominal)?;
        let data = rescale_sjw(&self.data, &bt.data)?;
        debug!("CAN FD clock change to {} Hz recalculated segments, {}", clock_hz, bt);

        Self::new(nominal, data)
    }
}

/// `to` with the sjw of `from`, scaled to keep its share of the bit time.
fn rescale_sjw(
    from: &ResolvedBitTiming,
    to: &ResolvedBitTiming,
) -> Result<ResolvedBitTiming, Error> {
    let sjw = (f64::from(from.sjw()) / f64::from(from.nbt()) * f64::from(to.nbt()))
        .round_ties_even() as u32;
    let sjw = sjw.min(to.tseg2()).max(1);

    Ok(
        ResolvedBitTiming::new(to.clock_hz(), to.prescaler(), to.tseg1(), to.tseg2(), sjw)?
            .with_sample_mode(from.sample_mode()),
    )
}

/// Timings of one phase for every prescaler up to 256, before any cross-phase check.
fn phase_candidates(
    clock_hz: u32,
    bitrate: u32,
    sample_point: f64,
    sjw_max: u32,
) -> Vec<ResolvedBitTiming> {
    (1..=SEARCH_BRP_MAX)
        .map_while(|brp| {
            let bit_time = u64::from(clock_hz) / (u64::from(bitrate) * u64::from(brp));
            (bit_time >= 1).then_some((brp, bit_time as u32))
        })
        .filter_map(|(brp, bit_time)| {
            let effective = f64::from(clock_hz) / (f64::from(bit_time) * f64::from(brp));
            if (effective - f64::from(bitrate)).abs() > f64::from(bitrate) / 256.0 {
                return None;
            }

            let tseg1 = (sample_point / 100.0 * f64::from(bit_time)).round_ties_even() as i64 - 1;
            // leave at least 2 quanta for tseg2
            let tseg1 = tseg1.min(i64::from(bit_time) - i64::from(CAN_SYNC_SEG) - 2);
            let tseg1 = u32::try_from(tseg1).ok()?;
            let tseg2 = bit_time - tseg1 - CAN_SYNC_SEG;
            let sjw = tseg2.min(sjw_max);

            ResolvedBitTiming::new(clock_hz, brp, tseg1, tseg2, sjw).ok()
        })
        .collect()
}

impl fmt::Display for ResolvedBitTimingFd {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (n, d) = (&self.nominal, &self.data);
        write!(
            f,
            "NBR: {} bit/s, NSP: {:.2}%, NBRP: {}, NTSEG1: {}, NTSEG2: {}, NSJW: {}, ",
            n.achieved_bitrate(),
            n.achieved_sample_point_percent(),
            n.prescaler(),
            n.tseg1(),
            n.tseg2(),
            n.sjw()
        )?;
        write!(
            f,
            "DBR: {} bit/s, DSP: {:.2}%, DBRP: {}, DTSEG1: {}, DTSEG2: {}, DSJW: {}, ",
            d.achieved_bitrate(),
            d.achieved_sample_point_percent(),
            d.prescaler(),
            d.tseg1(),
            d.tseg2(),
            d.sjw()
        )?;
        write!(f, "CLK: {:.0}MHz", f64::from(self.clock_hz()) / 1e6)
    }
}

#[cfg(feature = "serde")]
#[derive(serde::Deserialize)]
struct RawBitTimingFd {
    nominal: ResolvedBitTiming,
    data: ResolvedBitTiming,
}

#[cfg(feature = "serde")]
impl TryFrom<RawBitTimingFd> for ResolvedBitTimingFd {
    type Error = Error;

    fn try_from(raw: RawBitTimingFd) -> Result<Self, Self::Error> {
        Self::new(raw.nominal, raw.data)
    }
}
