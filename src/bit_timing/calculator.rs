//! Search for the bit timing closest to a requested bitrate and sample point.
//!
//! The search walks every possible number of quanta per bit from long to short bit times,
//! derives the matching prescaler and keeps the candidate with the lowest bitrate error. Ties
//! on the bitrate error are broken by the sample point error. All arithmetic is integer math
//! with truncating division, so the resulting register values are reproducible bit for bit.

use tracing::{debug, trace, warn};

use crate::bit_timing::constants::{
    CAN_CALC_MAX_ERROR, CAN_SYNC_SEG, SAMPLE_POINT_ABOVE_500K, SAMPLE_POINT_ABOVE_800K,
    SAMPLE_POINT_DEFAULT, SAMPLE_POINT_MAX, SAMPLE_POINT_MIN,
};
use crate::bit_timing::error::{Error, InputError};
use crate::bit_timing::profile::TimingProfile;
use crate::bit_timing::resolved::{ResolvedBitTiming, SampleMode};

/// Resolve `bitrate` on `profile` with the default options of [`BitTimingCalculator`].
///
/// `sample_point` is the nominal sample point in permille. If `None`, the CiA recommendation
/// for the bitrate is used.
pub fn resolve(
    bitrate: u32,
    sample_point: Option<u32>,
    profile: &TimingProfile,
) -> Result<ResolvedBitTiming, Error> {
    let mut calculator = BitTimingCalculator::new(*profile);
    if let Some(sample_point) = sample_point {
        calculator = calculator.sample_point(sample_point);
    }
    calculator.resolve(bitrate)
}

/// CiA recommended sample point for `bitrate`, in permille.
pub fn default_sample_point(bitrate: u32) -> u32 {
    if bitrate > 800_000 {
        SAMPLE_POINT_ABOVE_800K
    } else if bitrate > 500_000 {
        SAMPLE_POINT_ABOVE_500K
    } else {
        SAMPLE_POINT_DEFAULT
    }
}

/// Builder for a bit timing search on one controller profile.
///
/// ```rust
/// use can_bittiming::bit_timing::{BitTimingCalculator, TimingProfile};
///
/// let profile = TimingProfile {
///     clock_hz: 8_000_000,
///     tseg1_min: 4,
///     tseg1_max: 16,
///     tseg2_min: 2,
///     tseg2_max: 8,
///     sjw_max: 4,
///     brp_min: 1,
///     brp_max: 64,
///     brp_inc: 1,
/// };
///
/// let timing = BitTimingCalculator::new(profile)
///     .sample_point(875)
///     .sjw(2)
///     .resolve(500_000)
///     .unwrap();
///
/// assert_eq!(timing.prescaler(), 1);
/// assert_eq!(timing.tseg1(), 13);
/// assert_eq!(timing.tseg2(), 2);
/// assert_eq!(timing.sjw(), 2);
/// assert_eq!(timing.achieved_bitrate(), 500_000);
/// ```
#[derive(Debug, Clone, Copy)]
pub struct BitTimingCalculator {
    profile: TimingProfile,
    sample_point: Option<u32>,
    sjw: Option<u32>,
    sample_mode: SampleMode,
    max_rate_error: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct SamplePointCandidate {
    sample_point: u32,
    sample_point_error: u32,
    tseg1: u32,
    tseg2: u32,
}

#[derive(Debug, Clone, Copy)]
struct BestCandidate {
    rate_error: u32,
    sample_point_error: u32,
    tseg: u32,
    brp: u32,
}

impl BitTimingCalculator {
    pub fn new(profile: TimingProfile) -> Self {
        Self {
            profile,
            sample_point: None,
            sjw: None,
            sample_mode: SampleMode::Single,
            max_rate_error: CAN_CALC_MAX_ERROR,
        }
    }

    /// Nominal sample point in permille, `1..=999`.
    pub fn sample_point(mut self, sample_point: u32) -> Self {
        self.sample_point = Some(sample_point);
        self
    }

    /// Preferred synchronization jump width. Clamped to the profile and to tseg2.
    pub fn sjw(mut self, sjw: u32) -> Self {
        self.sjw = Some(sjw);
        self
    }

    pub fn sample_mode(mut self, sample_mode: SampleMode) -> Self {
        self.sample_mode = sample_mode;
        self
    }

    /// Maximum allowed bitrate error in one-tenth of a percent.
    ///
    /// Default is `5.0%`
    pub fn max_rate_error(mut self, max_rate_error: u32) -> Self {
        self.max_rate_error = max_rate_error;
        self
    }

    pub fn resolve(&self, bitrate: u32) -> Result<ResolvedBitTiming, Error> {
        let btc = &self.profile;
        btc.validate()?;
        if bitrate == 0 {
            return Err(InputError::InvalidBitrate.into());
        }

        let sample_point_nominal = match self.sample_point {
            Some(sp) if !(SAMPLE_POINT_MIN..=SAMPLE_POINT_MAX).contains(&sp) => {
                return Err(InputError::InvalidSamplePoint(sp).into());
            }
            Some(sp) => sp,
            None => default_sample_point(bitrate),
        };

        let Some(best) = search(btc, bitrate, sample_point_nominal) else {
            warn!("No bit timing for {} bit/s on a {} Hz clock", bitrate, btc.clock_hz);
            return Err(Error::NoFeasibleTiming { bitrate });
        };

        if best.rate_error != 0 {
            // error in one-tenth of a percent
            let error = (u64::from(best.rate_error) * 1000 / u64::from(bitrate)) as u32;
            if error > self.max_rate_error {
                warn!("Bitrate error for {} bit/s is {} (1/10 percent)", bitrate, error);
                return Err(Error::RateErrorTooLarge {
                    bitrate,
                    error,
                    max: self.max_rate_error,
                });
            }
        }

        let split = update_sample_point(btc, sample_point_nominal, best.tseg)
            .ok_or(Error::NoFeasibleTiming { bitrate })?;

        let sjw = match self.sjw {
            Some(sjw) if sjw != 0 && btc.sjw_max != 0 => sjw.min(btc.sjw_max).min(split.tseg2),
            _ => 1,
        };

        let timing = ResolvedBitTiming::new(btc.clock_hz, best.brp, split.tseg1, split.tseg2, sjw)?
            .with_sample_mode(self.sample_mode);
        debug!(
            "Resolved {} bit/s: brp {} tseg1 {} tseg2 {} sjw {}, sample point {}",
            bitrate,
            timing.prescaler(),
            timing.tseg1(),
            timing.tseg2(),
            timing.sjw(),
            split.sample_point
        );

        Ok(timing)
    }
}

fn search(btc: &TimingProfile, bitrate: u32, sample_point_nominal: u32) -> Option<BestCandidate> {
    let clock_hz = u64::from(btc.clock_hz);
    let mut best: Option<BestCandidate> = None;

    let max_tseg = (u64::from(btc.tseg1_max) + u64::from(btc.tseg2_max)) * 2 + 1;
    let min_tseg = (u64::from(btc.tseg1_min) + u64::from(btc.tseg2_min)) * 2;

    // tseg even = round down, odd = round up
    for tseg in (min_tseg..=max_tseg).rev() {
        let tsegall = u64::from(CAN_SYNC_SEG) + tseg / 2;
        // at most tseg1_max + tseg2_max
        let half = (tseg / 2) as u32;

        let brp = clock_hz / (tsegall * u64::from(bitrate)) + tseg % 2;
        // choose a brp step which is possible in the system
        let brp = (brp / u64::from(btc.brp_inc)) * u64::from(btc.brp_inc);
        if brp < u64::from(btc.brp_min) || brp > u64::from(btc.brp_max) {
            continue;
        }
        let brp = brp as u32;

        let rate = (clock_hz / (u64::from(brp) * tsegall)) as u32;
        let rate_error = bitrate.abs_diff(rate);

        let mut best_sample_point_error = best.map(|b| b.sample_point_error);
        if let Some(b) = best {
            if rate_error > b.rate_error {
                continue;
            }
            // a better bitrate always wins
            if rate_error < b.rate_error {
                best_sample_point_error = None;
            }
        }

        let Some(candidate) = update_sample_point(btc, sample_point_nominal, half) else {
            continue;
        };
        if best_sample_point_error.is_some_and(|e| candidate.sample_point_error > e) {
            continue;
        }

        trace!(
            "Candidate tseg {} brp {} rate error {} sample point error {}",
            half,
            brp,
            rate_error,
            candidate.sample_point_error
        );
        best = Some(BestCandidate {
            rate_error,
            sample_point_error: candidate.sample_point_error,
            tseg: half,
            brp,
        });

        if rate_error == 0 && candidate.sample_point_error == 0 {
            break;
        }
    }

    best
}

/// Split `tseg` quanta into tseg1 and tseg2 with the sample point closest to, but not after,
/// `sample_point_nominal`.
fn update_sample_point(
    btc: &TimingProfile,
    sample_point_nominal: u32,
    tseg: u32,
) -> Option<SamplePointCandidate> {
    let mut best: Option<SamplePointCandidate> = None;
    let bit_time = u64::from(tseg) + u64::from(CAN_SYNC_SEG);

    for i in 0..=1 {
        let tseg2 = bit_time - u64::from(sample_point_nominal) * bit_time / 1000;
        let tseg2 = (tseg2.saturating_sub(i) as u32).clamp(btc.tseg2_min, btc.tseg2_max);

        let Some(mut tseg1) = tseg.checked_sub(tseg2) else {
            continue;
        };
        let mut tseg2 = tseg2;
        if tseg1 > btc.tseg1_max {
            tseg1 = btc.tseg1_max;
            tseg2 = tseg - tseg1;
        }
        if !btc.tseg1_in_range(tseg1) || !btc.tseg2_in_range(tseg2) {
            continue;
        }

        let sample_point = (1000 * (bit_time - u64::from(tseg2)) / bit_time) as u32;
        let sample_point_error = sample_point_nominal.abs_diff(sample_point);

        if sample_point <= sample_point_nominal
            && best.map_or(true, |b| sample_point_error < b.sample_point_error)
        {
            best = Some(SamplePointCandidate {
                sample_point,
                sample_point_error,
                tseg1,
                tseg2,
            });
        }
    }

    best
}
