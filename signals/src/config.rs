//! `MtfConfig`: per-symbol override over a global default (`spec.md` §4.4:
//! "zone count per timeframe, threshold percentages, min/target/stretch
//! profit multipliers, expiry window").

use std::collections::HashMap;

use atlas_core::{Symbol, Timeframe};
use rust_decimal::Decimal;

/// Zone-detection and profit-target parameters for one symbol (or the
/// platform-wide default).
#[derive(Debug, Clone)]
pub struct MtfConfig {
    pub ltf_zone_count: usize,
    pub itf_zone_count: usize,
    pub htf_zone_count: usize,
    pub ltf_lookback: usize,
    pub itf_lookback: usize,
    pub htf_lookback: usize,
    /// Fraction of a timeframe's range, at each edge, that counts as a
    /// "trigger zone" (bottom = BUY, top = SELL).
    pub threshold_pct: Decimal,
    pub min_profit_multiplier: Decimal,
    pub target_multiplier: Decimal,
    pub stretch_multiplier: Decimal,
    pub expiry_minutes: i64,
}

impl MtfConfig {
    pub fn zone_count(&self, timeframe: Timeframe) -> usize {
        match timeframe {
            Timeframe::Ltf => self.ltf_zone_count,
            Timeframe::Itf => self.itf_zone_count,
            Timeframe::Htf => self.htf_zone_count,
            Timeframe::Daily => 0,
        }
    }

    pub fn lookback(&self, timeframe: Timeframe) -> usize {
        match timeframe {
            Timeframe::Ltf => self.ltf_lookback,
            Timeframe::Itf => self.itf_lookback,
            Timeframe::Htf => self.htf_lookback,
            Timeframe::Daily => 0,
        }
    }
}

impl Default for MtfConfig {
    fn default() -> Self {
        Self {
            ltf_zone_count: 5,
            itf_zone_count: 5,
            htf_zone_count: 5,
            ltf_lookback: 60,
            itf_lookback: 40,
            htf_lookback: 20,
            threshold_pct: Decimal::new(20, 2),
            min_profit_multiplier: Decimal::new(100, 2),
            target_multiplier: Decimal::new(200, 2),
            stretch_multiplier: Decimal::new(300, 2),
            expiry_minutes: 60,
        }
    }
}

/// Resolves the effective config for a symbol: a per-symbol override if one
/// was registered, the platform-wide default otherwise.
#[derive(Debug, Clone, Default)]
pub struct MtfConfigResolver {
    default: MtfConfig,
    overrides: HashMap<Symbol, MtfConfig>,
}

impl MtfConfigResolver {
    pub fn new(default: MtfConfig) -> Self {
        Self { default, overrides: HashMap::new() }
    }

    pub fn set_override(&mut self, symbol: Symbol, config: MtfConfig) {
        self.overrides.insert(symbol, config);
    }

    pub fn resolve(&self, symbol: &Symbol) -> &MtfConfig {
        self.overrides.get(symbol).unwrap_or(&self.default)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unregistered_symbol_falls_back_to_default() {
        let resolver = MtfConfigResolver::new(MtfConfig::default());
        let symbol = Symbol::new_unchecked("NSE", "RELIANCE");
        assert_eq!(resolver.resolve(&symbol).ltf_zone_count, 5);
    }

    #[test]
    fn registered_override_takes_precedence() {
        let mut resolver = MtfConfigResolver::new(MtfConfig::default());
        let symbol = Symbol::new_unchecked("NSE", "RELIANCE");
        resolver.set_override(symbol.clone(), MtfConfig { ltf_zone_count: 8, ..MtfConfig::default() });
        assert_eq!(resolver.resolve(&symbol).ltf_zone_count, 8);
    }
}
