//! Positions, margins and market hours.

use std::fmt;

use chrono::{DateTime, Datelike, FixedOffset, NaiveDate, NaiveTime, Utc, Weekday};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::order::{Exchange, Product, Segment, Side};
use super::shared::AccountId;

/// Identity of a position within an account.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PositionKey {
    /// Trading symbol.
    pub symbol: String,
    /// Exchange.
    pub exchange: Exchange,
    /// Product.
    pub product: Product,
}

impl PositionKey {
    /// Build a key, normalising the symbol to upper case.
    #[must_use]
    pub fn new(symbol: impl AsRef<str>, exchange: Exchange, product: Product) -> Self {
        Self {
            symbol: symbol.as_ref().trim().to_ascii_uppercase(),
            exchange,
            product,
        }
    }
}

impl fmt::Display for PositionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.exchange, self.symbol, self.product)
    }
}

/// A net position in the local book.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Position {
    /// Account holding the position.
    pub account_id: AccountId,
    /// Symbol / exchange / product.
    pub key: PositionKey,
    /// Signed quantity (negative is short).
    pub quantity: Decimal,
    /// Average entry price of the open quantity.
    pub average_price: Decimal,
    /// Profit booked by closing fills.
    pub realized_pnl: Decimal,
    /// Last update.
    pub updated_at: DateTime<Utc>,
}

impl Position {
    /// A flat position.
    #[must_use]
    pub fn flat(account_id: AccountId, key: PositionKey) -> Self {
        Self {
            account_id,
            key,
            quantity: Decimal::ZERO,
            average_price: Decimal::ZERO,
            realized_pnl: Decimal::ZERO,
            updated_at: Utc::now(),
        }
    }

    /// Fold an execution into the position.
    pub fn apply_fill(&mut self, side: Side, quantity: Decimal, price: Decimal) {
        if quantity <= Decimal::ZERO {
            return;
        }
        let signed = match side {
            Side::Buy => quantity,
            Side::Sell => -quantity,
        };
        let current = self.quantity;

        if current.is_zero() || current.is_sign_positive() == signed.is_sign_positive() {
            let open = current.abs();
            self.average_price = (open * self.average_price + quantity * price) / (open + quantity);
            self.quantity = current + signed;
        } else {
            let closing = quantity.min(current.abs());
            let direction = if current.is_sign_positive() {
                Decimal::ONE
            } else {
                Decimal::NEGATIVE_ONE
            };
            self.realized_pnl += (price - self.average_price) * closing * direction;
            self.quantity = current + signed;

            if self.quantity.is_zero() {
                self.average_price = Decimal::ZERO;
            } else if self.quantity.is_sign_positive() != current.is_sign_positive() {
                // Flipped through flat: the remainder opened at this fill's price.
                self.average_price = price;
            }
        }
        self.updated_at = Utc::now();
    }

    /// Whether the position holds any quantity.
    #[must_use]
    pub fn is_open(&self) -> bool {
        !self.quantity.is_zero()
    }
}

/// Funds available in one margin segment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Margin {
    /// Account.
    pub account_id: AccountId,
    /// Segment.
    pub segment: Segment,
    /// Funds available for new orders.
    pub available: Decimal,
    /// Funds blocked by open orders and positions.
    pub used: Decimal,
    /// Net balance.
    pub net: Decimal,
}

/// Trading session of an exchange, in exchange-local time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MarketHours {
    /// Session open.
    pub open: NaiveTime,
    /// Session close.
    pub close: NaiveTime,
    /// Exchange offset from UTC.
    pub utc_offset: FixedOffset,
    /// Weekdays with a session.
    pub trading_days: Vec<Weekday>,
    /// Exchange holidays.
    pub holidays: Vec<NaiveDate>,
}

impl MarketHours {
    /// Whether the market is in session at `now`.
    #[must_use]
    pub fn is_open(&self, now: DateTime<Utc>) -> bool {
        let local = now.with_timezone(&self.utc_offset);
        if !self.is_trading_day(local.date_naive()) {
            return false;
        }
        let time = local.time();
        time >= self.open && time < self.close
    }

    /// Whether `date` has a session.
    #[must_use]
    pub fn is_trading_day(&self, date: NaiveDate) -> bool {
        self.trading_days.contains(&date.weekday()) && !self.holidays.contains(&date)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use rust_decimal_macros::dec;

    fn key() -> PositionKey {
        PositionKey::new("infy", Exchange::Nse, Product::Cnc)
    }

    fn nse_hours() -> MarketHours {
        MarketHours {
            open: NaiveTime::from_hms_opt(9, 15, 0).unwrap(),
            close: NaiveTime::from_hms_opt(15, 30, 0).unwrap(),
            utc_offset: FixedOffset::east_opt(330 * 60).unwrap(),
            trading_days: vec![
                Weekday::Mon,
                Weekday::Tue,
                Weekday::Wed,
                Weekday::Thu,
                Weekday::Fri,
            ],
            holidays: vec![NaiveDate::from_ymd_opt(2026, 1, 26).unwrap()],
        }
    }

    #[test]
    fn key_display() {
        assert_eq!(key().to_string(), "NSE:INFY:CNC");
    }

    #[test]
    fn buys_average_in() {
        let mut position = Position::flat(AccountId::new("AB1234"), key());
        position.apply_fill(Side::Buy, dec!(10), dec!(100));
        position.apply_fill(Side::Buy, dec!(10), dec!(110));

        assert_eq!(position.quantity, dec!(20));
        assert_eq!(position.average_price, dec!(105));
        assert_eq!(position.realized_pnl, Decimal::ZERO);
    }

    #[test]
    fn partial_close_books_pnl() {
        let mut position = Position::flat(AccountId::new("AB1234"), key());
        position.apply_fill(Side::Buy, dec!(10), dec!(100));
        position.apply_fill(Side::Sell, dec!(4), dec!(120));

        assert_eq!(position.quantity, dec!(6));
        assert_eq!(position.average_price, dec!(100));
        assert_eq!(position.realized_pnl, dec!(80));
    }

    #[test]
    fn flipping_through_flat_resets_average() {
        let mut position = Position::flat(AccountId::new("AB1234"), key());
        position.apply_fill(Side::Buy, dec!(5), dec!(100));
        position.apply_fill(Side::Sell, dec!(8), dec!(90));

        assert_eq!(position.quantity, dec!(-3));
        assert_eq!(position.average_price, dec!(90));
        assert_eq!(position.realized_pnl, dec!(-50));
    }

    #[test]
    fn closing_fully_goes_flat() {
        let mut position = Position::flat(AccountId::new("AB1234"), key());
        position.apply_fill(Side::Sell, dec!(5), dec!(100));
        position.apply_fill(Side::Buy, dec!(5), dec!(95));

        assert!(!position.is_open());
        assert_eq!(position.realized_pnl, dec!(25));
    }

    #[test]
    fn market_open_during_session() {
        let hours = nse_hours();
        // Wednesday 2026-10-14 10:00 IST
        let now = Utc.with_ymd_and_hms(2026, 10, 14, 4, 30, 0).unwrap();
        assert!(hours.is_open(now));
    }

    #[test]
    fn market_closed_after_close_and_on_weekends() {
        let hours = nse_hours();
        // Wednesday 15:30 IST exactly
        assert!(!hours.is_open(Utc.with_ymd_and_hms(2026, 10, 14, 10, 0, 0).unwrap()));
        // Saturday 11:00 IST
        assert!(!hours.is_open(Utc.with_ymd_and_hms(2026, 10, 17, 5, 30, 0).unwrap()));
    }

    #[test]
    fn market_closed_on_holiday() {
        let hours = nse_hours();
        // Monday 2026-01-26 11:00 IST
        assert!(!hours.is_open(Utc.with_ymd_and_hms(2026, 1, 26, 5, 30, 0).unwrap()));
    }
}
