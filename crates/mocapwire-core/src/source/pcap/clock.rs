use super::layout;

/// Timestamp resolution of one pcapng interface (`if_tsresol`).
///
/// The high bit selects a power of two, otherwise a power of ten.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InterfaceClock {
    tsresol: u8,
}

impl InterfaceClock {
    pub fn new(tsresol: u8) -> Self {
        Self { tsresol }
    }

    fn units_per_second(self) -> Option<f64> {
        let exponent = i32::from(self.tsresol & !layout::TSRESOL_POWER_OF_TWO);
        let base: f64 = if self.tsresol & layout::TSRESOL_POWER_OF_TWO != 0 {
            2.0
        } else {
            10.0
        };
        let units = base.powi(exponent);
        units.is_finite().then_some(units)
    }

    /// Converts a high/low timestamp pair to seconds.
    pub fn seconds(self, ts_high: u32, ts_low: u32) -> Option<f64> {
        let ticks = ((ts_high as u64) << 32) | (ts_low as u64);
        self.units_per_second().map(|units| ticks as f64 / units)
    }
}

impl Default for InterfaceClock {
    fn default() -> Self {
        Self::new(layout::PCAPNG_DEFAULT_TSRESOL)
    }
}
