use super::position::Side;
use rust_decimal::Decimal;

/// Signed pnl in pips for a price move against an entry, by side.
pub fn pnl_pips(side: Side, entry: Decimal, price: Decimal, pip_size: Decimal) -> Decimal {
    let diff = match side {
        Side::Long => price - entry,
        Side::Short => entry - price,
    };
    diff / pip_size
}

/// Unrealized pnl as a percentage of entry price, signed by side.
pub fn pnl_pct(side: Side, entry: Decimal, price: Decimal) -> Decimal {
    if entry.is_zero() {
        return Decimal::ZERO;
    }
    let diff = match side {
        Side::Long => price - entry,
        Side::Short => entry - price,
    };
    diff / entry * Decimal::from(100)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn pnl_pct_long() {
        let pct = pnl_pct(Side::Long, dec!(100), dec!(101));
        assert_eq!(pct, dec!(1.00));
    }

    #[test]
    fn pnl_pct_short() {
        let pct = pnl_pct(Side::Short, dec!(100), dec!(99));
        assert_eq!(pct, dec!(1.00));
    }
}
