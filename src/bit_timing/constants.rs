/// Length of the synchronization segment in time quanta.
pub const CAN_SYNC_SEG: u32 = 1;

/// Maximum bitrate error accepted by the search, in one-tenth of a percent (5.0%).
pub const CAN_CALC_MAX_ERROR: u32 = 50;

/// CiA recommended sample points, in permille of the bit time.
pub const SAMPLE_POINT_ABOVE_800K: u32 = 750;
pub const SAMPLE_POINT_ABOVE_500K: u32 = 800;
pub const SAMPLE_POINT_DEFAULT: u32 = 875;

pub(crate) const SAMPLE_POINT_MIN: u32 = 1;
pub(crate) const SAMPLE_POINT_MAX: u32 = 999;

/// Bit timing limits every ISO 11898 compliant controller has to support.
pub const ISO_NBT_MIN: u32 = 8;
pub const ISO_NBT_MAX: u32 = 25;
pub const ISO_BRP_MAX: u32 = 32;
pub const ISO_BITRATE_MIN: u32 = 5_000;
pub const ISO_BITRATE_MAX: u32 = 1_000_000;

/// Default transceiver loop delay used for the oscillator tolerance estimate.
pub const DEFAULT_NODE_LOOP_DELAY_NS: f64 = 250.0;
/// Default bus length used for the oscillator tolerance estimate.
pub const DEFAULT_BUS_LENGTH_M: f64 = 10.0;
/// Signal propagation delay on the bus, in ns per meter.
pub(crate) const DELAY_PER_METER_NS: f64 = 5.0;

pub(crate) const NS_PER_SECOND: u64 = 1_000_000_000;

/// CAN FD limits every ISO 11898 compliant controller has to support.
pub const FD_ISO_NBT_MIN: u32 = 8;
pub const FD_ISO_NBT_MAX: u32 = 80;
pub const FD_ISO_DBT_MIN: u32 = 5;
pub const FD_ISO_DBT_MAX: u32 = 25;
pub const FD_ISO_DATA_TSEG1: (u32, u32) = (1, 16);
pub const FD_ISO_DATA_TSEG2: (u32, u32) = (2, 8);
pub const FD_ISO_DATA_SJW_MAX: u32 = 8;
/// Nominal tseg1, tseg2 and sjw maximums when both phases share one prescaler.
pub const FD_ISO_SHARED_PRESCALER_MAX: (u32, u32, u32) = (128, 32, 32);
/// Nominal tseg1, tseg2 and sjw maximums with separate prescalers.
pub const FD_ISO_SEPARATE_PRESCALER_MAX: (u32, u32, u32) = (64, 16, 16);
pub const FD_ISO_NOMINAL_TSEG_MIN: u32 = 2;
