//! Bit timing search driven by a sample point in percent.
//!
//! Unlike [`resolve`](crate::bit_timing::resolve), which favours the exact bitrate, this walks
//! every prescaler of the profile and places the sample point as close as possible to the
//! requested position. Every candidate has to fit the ISO 11898 minimum range.

use tracing::{debug, warn};

use crate::bit_timing::constants::{CAN_SYNC_SEG, ISO_NBT_MIN};
use crate::bit_timing::error::{Error, InputError};
use crate::bit_timing::profile::TimingProfile;
use crate::bit_timing::resolved::ResolvedBitTiming;

const MIN_SAMPLE_POINT_PERCENT: f64 = 50.0;

/// Returns every timing of `profile` that reaches `bitrate` within 1/256, in increasing
/// prescaler order.
pub fn iter_from_sample_point(
    profile: &TimingProfile,
    bitrate: u32,
    sample_point_percent: f64,
) -> Result<impl Iterator<Item = ResolvedBitTiming>, Error> {
    if bitrate == 0 {
        return Err(InputError::InvalidBitrate.into());
    }
    if !sample_point_percent.is_finite() || sample_point_percent < MIN_SAMPLE_POINT_PERCENT {
        return Err(InputError::InvalidSamplePointPercent(sample_point_percent).into());
    }
    profile.validate()?;

    let profile = *profile;
    let candidates = (profile.brp_min..=profile.brp_max)
        .step_by(profile.brp_inc as usize)
        .map_while(move |brp| {
            let nbt = u64::from(profile.clock_hz) / (u64::from(bitrate) * u64::from(brp));
            if nbt < u64::from(ISO_NBT_MIN) {
                return None;
            }
            Some(candidate(&profile, bitrate, sample_point_percent, brp, nbt as u32))
        })
        .flatten();

    Ok(candidates)
}

fn candidate(
    profile: &TimingProfile,
    bitrate: u32,
    sample_point_percent: f64,
    brp: u32,
    nbt: u32,
) -> Option<ResolvedBitTiming> {
    let effective = f64::from(profile.clock_hz) / (f64::from(nbt) * f64::from(brp));
    if (effective - f64::from(bitrate)).abs() > f64::from(bitrate) / 256.0 {
        return None;
    }

    let tseg1 = (sample_point_percent / 100.0 * f64::from(nbt)).round_ties_even() as u32;
    let tseg1 = tseg1.saturating_sub(1).min(nbt - 2);
    let tseg2 = nbt - tseg1 - CAN_SYNC_SEG;
    let sjw = tseg2.min(profile.sjw_max.max(1));

    let bt = ResolvedBitTiming::new(profile.clock_hz, brp, tseg1, tseg2, sjw).ok()?;
    if bt.check_profile(profile).is_err()
        || bt.achieved_sample_point_percent() < MIN_SAMPLE_POINT_PERCENT
        || bt.check_iso_minimum().is_err()
    {
        return None;
    }
    Some(bt)
}

/// Returns the timing whose sample point is closest to `sample_point_percent`, preferring the
/// lowest prescaler on a tie.
pub fn from_sample_point(
    profile: &TimingProfile,
    bitrate: u32,
    sample_point_percent: f64,
) -> Result<ResolvedBitTiming, Error> {
    let distance = |bt: &ResolvedBitTiming| {
        (bt.achieved_sample_point_percent() - sample_point_percent).abs()
    };

    let best = iter_from_sample_point(profile, bitrate, sample_point_percent)?.min_by(|a, b| {
        distance(a)
            .total_cmp(&distance(b))
            .then(a.prescaler().cmp(&b.prescaler()))
    });

    match best {
        Some(bt) => {
            debug!(
                "Sample point {}% at {} bit/s resolved to {}",
                sample_point_percent, bitrate, bt
            );
            Ok(bt)
        }
        None => {
            warn!(
                "No timing for {} bit/s with sample point {}%",
                bitrate, sample_point_percent
            );
            Err(Error::NoFeasibleTiming { bitrate })
        }
    }
}
