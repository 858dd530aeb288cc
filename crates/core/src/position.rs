use rust_decimal::Decimal;
use std::collections::BTreeMap;

/// Direction of a filled leg as seen by the gauge.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FillDirection {
    Buy,
    Sell,
}

/// In-memory net share count per instrument.
///
/// Buys add, sells subtract. Instruments whose net returns to zero are
/// dropped so that [`NetPositionGauge::is_flat`] reflects real exposure.
/// Nothing here is persisted.
#[derive(Debug, Clone, Default)]
pub struct NetPositionGauge {
    positions: BTreeMap<String, Decimal>,
}

impl NetPositionGauge {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Applies one filled leg and returns the instrument's new net size.
    pub fn record_fill(
        &mut self,
        instrument: &str,
        direction: FillDirection,
        quantity: Decimal,
    ) -> Decimal {
        let delta = match direction {
            FillDirection::Buy => quantity,
            FillDirection::Sell => -quantity,
        };

        let net = self.net(instrument) + delta;
        if net == Decimal::ZERO {
            self.positions.remove(instrument);
        } else {
            self.positions.insert(instrument.to_string(), net);
        }
        net
    }

    #[must_use]
    pub fn net(&self, instrument: &str) -> Decimal {
        self.positions
            .get(instrument)
            .copied()
            .unwrap_or(Decimal::ZERO)
    }

    #[must_use]
    pub fn is_flat(&self) -> bool {
        self.positions.is_empty()
    }

    #[must_use]
    pub const fn all_positions(&self) -> &BTreeMap<String, Decimal> {
        &self.positions
    }
}
