//! Reserve Evaluator
//!
//! Pure predicate over a reserve price and the current price. Used by the
//! detail view and the end-of-auction decision; never writes.

use rust_decimal::Decimal;
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ReserveStatus {
    pub has_reserve: bool,
    pub met: bool,
    /// How far the current price is below the reserve; zero when met or no
    /// reserve is set.
    pub amount_to_reserve: Decimal,
}

pub fn evaluate(reserve_price: Option<Decimal>, current_price: Decimal) -> ReserveStatus {
    match reserve_price {
        None => ReserveStatus {
            has_reserve: false,
            met: true,
            amount_to_reserve: Decimal::ZERO,
        },
        Some(reserve) => ReserveStatus {
            has_reserve: true,
            met: current_price >= reserve,
            amount_to_reserve: (reserve - current_price).max(Decimal::ZERO),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn no_reserve_is_always_met() {
        let status = evaluate(None, dec!(0));
        assert!(!status.has_reserve);
        assert!(status.met);
        assert_eq!(status.amount_to_reserve, dec!(0));
    }

    #[test]
    fn below_reserve() {
        let status = evaluate(Some(dec!(5000)), dec!(4900));
        assert!(status.has_reserve);
        assert!(!status.met);
        assert_eq!(status.amount_to_reserve, dec!(100));
    }

    #[test]
    fn at_and_above_reserve() {
        assert!(evaluate(Some(dec!(5000)), dec!(5000)).met);
        let above = evaluate(Some(dec!(5000)), dec!(5100));
        assert!(above.met);
        assert_eq!(above.amount_to_reserve, dec!(0));
    }
}
