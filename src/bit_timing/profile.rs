use crate::bit_timing::error::InputError;

/// Hardware limits of one CAN controller family, used to calculate and validate bit timing.
///
/// Profiles are plain data and are normally declared as constants, see
/// [`Controller`](crate::controllers::Controller) for the built-in ones.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct TimingProfile {
    /// Controller input clock in Hz.
    pub clock_hz: u32,
    /// Time segment 1 = prop_seg + phase_seg1
    pub tseg1_min: u32,
    pub tseg1_max: u32,
    /// Time segment 2 = phase_seg2
    pub tseg2_min: u32,
    pub tseg2_max: u32,
    /// Synchronisation jump width, 0 if the controller can not be configured.
    pub sjw_max: u32,
    /// Bit-rate prescaler
    pub brp_min: u32,
    pub brp_max: u32,
    pub brp_inc: u32,
}

impl TimingProfile {
    /// Checks that every range is non-empty and that the minimums are usable.
    pub fn validate(&self) -> Result<(), InputError> {
        if self.clock_hz == 0 {
            return Err(InputError::InvalidClock);
        }
        if self.brp_inc == 0 {
            return Err(InputError::InvalidBrpIncrement);
        }

        for (name, min, max) in [
            ("tseg1", self.tseg1_min, self.tseg1_max),
            ("tseg2", self.tseg2_min, self.tseg2_max),
            ("brp", self.brp_min, self.brp_max),
        ] {
            if min == 0 {
                return Err(InputError::ZeroMinimum { name });
            }
            if min > max {
                return Err(InputError::EmptyRange { name, min, max });
            }
        }

        // the search walks up to 2 * (tseg1_max + tseg2_max) + 1 half quanta
        let max_tseg = 2 * (u64::from(self.tseg1_max) + u64::from(self.tseg2_max)) + 1;
        if max_tseg > u64::from(u32::MAX) {
            return Err(InputError::SegmentRangeTooLarge {
                tseg1_max: self.tseg1_max,
                tseg2_max: self.tseg2_max,
            });
        }

        Ok(())
    }

    /// Returns the same profile running from a different input clock.
    pub const fn with_clock(self, clock_hz: u32) -> Self {
        TimingProfile { clock_hz, ..self }
    }

    pub(crate) fn tseg1_in_range(&self, tseg1: u32) -> bool {
        (self.tseg1_min..=self.tseg1_max).contains(&tseg1)
    }

    pub(crate) fn tseg2_in_range(&self, tseg2: u32) -> bool {
        (self.tseg2_min..=self.tseg2_max).contains(&tseg2)
    }

    pub(crate) fn brp_in_range(&self, brp: u32) -> bool {
        (self.brp_min..=self.brp_max).contains(&brp)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

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
    fn valid_profile() {
        assert_eq!(PROFILE.validate(), Ok(()));
    }

    #[test]
    fn empty_range_rejected() {
        let profile = TimingProfile {
            tseg2_min: 9,
            ..PROFILE
        };
        assert_eq!(
            profile.validate(),
            Err(InputError::EmptyRange {
                name: "tseg2",
                min: 9,
                max: 8
            })
        );
    }

    #[test]
    fn zero_clock_and_increment_rejected() {
        let profile = PROFILE.with_clock(0);
        assert_eq!(profile.validate(), Err(InputError::InvalidClock));

        let profile = TimingProfile {
            brp_inc: 0,
            ..PROFILE
        };
        assert_eq!(profile.validate(), Err(InputError::InvalidBrpIncrement));
    }

    #[test]
    fn zero_minimum_rejected() {
        let profile = TimingProfile {
            brp_min: 0,
            ..PROFILE
        };
        assert_eq!(profile.validate(), Err(InputError::ZeroMinimum { name: "brp" }));
    }

    #[test]
    fn huge_segment_range_rejected() {
        let profile = TimingProfile {
            tseg1_max: u32::MAX / 2,
            ..PROFILE
        };
        assert_eq!(
            profile.validate(),
            Err(InputError::SegmentRangeTooLarge {
                tseg1_max: u32::MAX / 2,
                tseg2_max: 8
            })
        );

        let profile = TimingProfile {
            tseg1_max: u32::MAX / 4,
            ..PROFILE
        };
        assert!(profile.validate().is_ok());
    }

    #[test]
    fn sjw_max_zero_is_allowed() {
        let profile = TimingProfile {
            sjw_max: 0,
            ..PROFILE
        };
        assert!(profile.validate().is_ok());
    }
}
