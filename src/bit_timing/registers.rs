//! Encoders from a [`ResolvedBitTiming`] into the bit timing registers of common CAN
//! controller families.
//!
//! Encoders never truncate. A field that does not fit its register bits is reported as
//! [`Error::EncodingOverflow`], it means the timing was resolved for a different controller.

use strum_macros::{Display, EnumIter};

use crate::bit_timing::error::Error;
use crate::bit_timing::resolved::{ResolvedBitTiming, SampleMode};

/// Bit timing registers 0 and 1 of the SJA1000 and compatible controllers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Btr {
    pub btr0: u8,
    pub btr1: u8,
}

/// Configuration registers 1 to 3 of the MCP251x.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Cnf {
    pub cnf1: u8,
    pub cnf2: u8,
    pub cnf3: u8,
}

/// Register layouts supported by [`ResolvedBitTiming::encode`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, EnumIter, Display)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum RegisterLayout {
    /// SJA1000 BTR0/BTR1
    Btr,
    /// Atmel AT91 CAN_BR
    CanBr,
    /// Freescale FlexCAN CAN_CTRL
    CanCtrl,
    /// Microchip MCP251x CNF1/CNF2/CNF3
    Cnf,
    /// TI HECC CANBTC
    CanBtc,
    /// Renesas R-Car CiBCR
    Cibcr,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum RegisterValue {
    Btr(Btr),
    CanBr(u32),
    CanCtrl(u32),
    Cnf(Cnf),
    CanBtc(u32),
    Cibcr(u32),
}

const MCP251X_CNF2_BTLMODE: u32 = 0x80;

/// Accumulates bit fields of one register, checking each field against its width.
struct Register {
    name: &'static str,
    value: u32,
}

impl Register {
    fn new(name: &'static str) -> Self {
        Register { name, value: 0 }
    }

    fn field(
        mut self,
        field: &'static str,
        value: i64,
        offset: u32,
        width: u32,
    ) -> Result<Self, Error> {
        if value < 0 || value >= (1_i64 << width) {
            return Err(Error::EncodingOverflow {
                register: self.name,
                field,
                value,
                width,
            });
        }
        self.value |= (value as u32) << offset;
        Ok(self)
    }

    fn flag(mut self, set: bool, offset: u32) -> Self {
        if set {
            self.value |= 1 << offset;
        }
        self
    }

    fn finish(self) -> u32 {
        self.value
    }
}

/// Register value of a segment length, which controllers store minus one.
fn minus_one(value: u32) -> i64 {
    i64::from(value) - 1
}

impl ResolvedBitTiming {
    fn triple_sampling(&self) -> bool {
        self.sample_mode() == SampleMode::Triple
    }

    /// SJA1000 bit timing registers.
    pub fn btr0_btr1(&self) -> Result<Btr, Error> {
        let btr0 = Register::new("btr0")
            .field("brp", minus_one(self.prescaler()), 0, 6)?
            .field("sjw", minus_one(self.sjw()), 6, 2)?
            .finish();
        let btr1 = Register::new("btr1")
            .field("tseg1", minus_one(self.tseg1()), 0, 4)?
            .field("tseg2", minus_one(self.tseg2()), 4, 3)?
            .flag(self.triple_sampling(), 7)
            .finish();

        Ok(Btr {
            btr0: btr0 as u8,
            btr1: btr1 as u8,
        })
    }

    /// AT91 CAN_BR register.
    pub fn can_br(&self) -> Result<u32, Error> {
        Ok(Register::new("can_br")
            .field("phase_seg2", minus_one(self.phase_seg2()), 0, 4)?
            .field("phase_seg1", minus_one(self.phase_seg1()), 4, 4)?
            .field("prop_seg", minus_one(self.prop_seg()), 8, 4)?
            .field("sjw", minus_one(self.sjw()), 12, 4)?
            .field("brp", minus_one(self.prescaler()), 16, 16)?
            .finish())
    }

    /// FlexCAN CAN_CTRL register, timing bits only.
    pub fn can_ctrl(&self) -> Result<u32, Error> {
        Ok(Register::new("can_ctrl")
            .field("prop_seg", minus_one(self.prop_seg()), 0, 3)?
            .field("phase_seg2", minus_one(self.phase_seg2()), 16, 3)?
            .field("phase_seg1", minus_one(self.phase_seg1()), 19, 3)?
            .field("sjw", minus_one(self.sjw()), 22, 2)?
            .field("brp", minus_one(self.prescaler()), 24, 8)?
            .finish())
    }

    /// MCP251x CNF1, CNF2 and CNF3 registers.
    pub fn cnf(&self) -> Result<Cnf, Error> {
        let cnf1 = Register::new("cnf1")
            .field("brp", minus_one(self.prescaler()), 0, 6)?
            .field("sjw", minus_one(self.sjw()), 6, 2)?
            .finish();
        let cnf2 = Register::new("cnf2")
            .field("prop_seg", minus_one(self.prop_seg()), 0, 3)?
            .field("phase_seg1", minus_one(self.phase_seg1()), 3, 3)?
            .flag(self.triple_sampling(), 6)
            .finish()
            | MCP251X_CNF2_BTLMODE;
        let cnf3 = Register::new("cnf3")
            .field("phase_seg2", minus_one(self.phase_seg2()), 0, 3)?
            .finish();

        Ok(Cnf {
            cnf1: cnf1 as u8,
            cnf2: cnf2 as u8,
            cnf3: cnf3 as u8,
        })
    }

    /// TI HECC CANBTC register.
    pub fn canbtc(&self) -> Result<u32, Error> {
        Ok(Register::new("canbtc")
            .field("phase_seg2", minus_one(self.phase_seg2()), 0, 3)?
            .field("tseg1", minus_one(self.phase_seg1() + self.prop_seg()), 3, 4)?
            .field("sjw", minus_one(self.sjw()), 8, 2)?
            .field("brp", minus_one(self.prescaler()), 16, 8)?
            .finish())
    }

    /// R-Car CiBCR register, already shifted into its 32 bit position.
    pub fn cibcr(&self) -> Result<u32, Error> {
        let bcr = Register::new("cibcr")
            .field("tseg2", minus_one(self.tseg2()), 0, 3)?
            .field("sjw", minus_one(self.sjw()), 4, 2)?
            .field("brp", minus_one(self.prescaler()), 8, 10)?
            .field("tseg1", minus_one(self.phase_seg1() + self.prop_seg()), 20, 4)?
            .finish();
        Ok(bcr << 8)
    }

    /// Encode for the given register layout.
    pub fn encode(&self, layout: RegisterLayout) -> Result<RegisterValue, Error> {
        Ok(match layout {
            RegisterLayout::Btr => RegisterValue::Btr(self.btr0_btr1()?),
            RegisterLayout::CanBr => RegisterValue::CanBr(self.can_br()?),
            RegisterLayout::CanCtrl => RegisterValue::CanCtrl(self.can_ctrl()?),
            RegisterLayout::Cnf => RegisterValue::Cnf(self.cnf()?),
            RegisterLayout::CanBtc => RegisterValue::CanBtc(self.canbtc()?),
            RegisterLayout::Cibcr => RegisterValue::Cibcr(self.cibcr()?),
        })
    }
}
