//! Error types for the bit timing calculator and register encoders.
use thiserror::Error;

/// Reasons a bit rate, profile or set of raw timing fields is rejected before any search runs.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum InputError {
    #[error("bitrate must be greater than 0")]
    InvalidBitrate,
    #[error("clock_hz must be greater than 0")]
    InvalidClock,
    #[error("sample point {0} permille is out of range [1, 999]")]
    InvalidSamplePoint(u32),
    #[error("sample point {0}% must be a finite value of at least 50%")]
    InvalidSamplePointPercent(f64),
    #[error("{name} range [{min}, {max}] is empty")]
    EmptyRange {
        name: &'static str,
        min: u32,
        max: u32,
    },
    #[error("tseg1_max {tseg1_max} + tseg2_max {tseg2_max} is too large to search")]
    SegmentRangeTooLarge { tseg1_max: u32, tseg2_max: u32 },
    #[error("{name} minimum must be at least 1")]
    ZeroMinimum { name: &'static str },
    #[error("brp_inc must be at least 1")]
    InvalidBrpIncrement,
    #[error("{field} must be at least 1")]
    ZeroField { field: &'static str },
    #[error("bit time of tseg1 {tseg1} and tseg2 {tseg2} does not fit in 32 bits")]
    BitTimeOverflow { tseg1: u32, tseg2: u32 },
    #[error("{field} {value} is out of range [{min}, {max}]")]
    FieldOutOfRange {
        field: &'static str,
        value: u32,
        min: u32,
        max: u32,
    },
    #[error("brp {brp} is not a multiple of brp_inc {brp_inc}")]
    BrpNotAligned { brp: u32, brp_inc: u32 },
    #[error("sjw {sjw} is greater than tseg2 {tseg2}")]
    SjwGreaterThanTseg2 { sjw: u32, tseg2: u32 },
    #[error("sjw {sjw} is greater than max sjw {sjw_max}")]
    SjwGreaterThanMax { sjw: u32, sjw_max: u32 },
    #[error("effective bitrate {effective} diverges from the requested bitrate {requested}")]
    BitrateDiverges { requested: u32, effective: u32 },
    #[error("{phase} sample point {sample_point:.2}% is below 50%")]
    SamplePointBelowMinimum {
        phase: &'static str,
        sample_point: f64,
    },
    #[error("data phase clock {data} Hz differs from nominal phase clock {nominal} Hz")]
    ClockMismatch { nominal: u32, data: u32 },
    #[error("data bitrate {data} is lower than nominal bitrate {nominal}")]
    DataBitrateBelowNominal { nominal: u32, data: u32 },
    #[error("no data phase configured")]
    MissingDataPhase,
    #[error("sample point moved from {from:.2}% to {to:.2}% while changing clock")]
    SamplePointDiverges { from: f64, to: f64 },
}

/// Failures of the bit timing engine.
///
/// `NoFeasibleTiming` and `RateErrorTooLarge` are the two search outcomes; both are final, the
/// caller has to pick another profile or bitrate. `EncodingOverflow` means a resolved timing was
/// handed to a register layout it does not fit.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum Error {
    #[error("invalid input: {0}")]
    InvalidInput(#[from] InputError),
    #[error("unable to find a valid timing solution for bitrate {bitrate}")]
    NoFeasibleTiming { bitrate: u32 },
    #[error("bitrate error too high: {error} (1/10 percent), max {max}")]
    RateErrorTooLarge { bitrate: u32, error: u32, max: u32 },
    #[error("{register}: {field} value {value} does not fit in {width} bits")]
    EncodingOverflow {
        register: &'static str,
        field: &'static str,
        value: i64,
        width: u32,
    },
}
