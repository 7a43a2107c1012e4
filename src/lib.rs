//! # The CAN Bit Timing Crate
//! Calculates the bit timing registers of a CAN controller for a requested bitrate. The same
//! calculation is shared by every adapter backend, so a given bitrate ends up in identical
//! register values no matter which driver asks for it.
//!
//! ## Example
//!
//! Resolve 500 kbit/s on a SJA1000 and encode the BTR0/BTR1 pair.
//!
//! ```rust
//! use can_bittiming::controllers::Controller;
//!
//! let timing = Controller::Sja1000.resolve(500_000).unwrap();
//! let btr = timing.btr0_btr1().unwrap();
//!
//! assert_eq!(timing.achieved_bitrate(), 500_000);
//! assert_eq!([btr.btr0, btr.btr1], [0x00, 0x1c]);
//! ```
//!
//! Custom hardware is described with a [`bit_timing::TimingProfile`] and resolved with a
//! [`bit_timing::BitTimingCalculator`].
//!
//! CAN FD controllers resolve an arbitration and a data phase together into a
//! [`bit_timing::ResolvedBitTimingFd`], e.g. `Controller::Mcan.resolve_fd(500_000, 2_000_000)`.
//!
//! ## Supported register layouts
//!  - NXP SJA1000 (BTR0/BTR1)
//!  - Microchip MCP251x (CNF1-3)
//!  - Atmel AT91 (CAN_BR)
//!  - Freescale FlexCAN (CAN_CTRL)
//!  - TI HECC (CANBTC)
//!  - Renesas R-Car (CiBCR)
//!

pub mod bit_timing;
pub mod controllers;
mod error;

pub use error::Error;
pub type Result<T> = std::result::Result<T, Error>;
