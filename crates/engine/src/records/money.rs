use serde::{Deserialize, Serialize};

/// Money amount represented in cents to avoid floating point issues.
///
/// Stored records carry amounts as decimal strings (`"120"`, `"12.50"`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Money {
    /// Amount in cents (e.g., 1000 = $10.00)
    cents: i64,
}

impl Money {
    /// Creates a new Money amount from cents.
    pub fn from_cents(cents: i64) -> Self {
        Self { cents }
    }

    /// Creates a new Money amount from a whole-unit value.
    pub fn from_dollars(dollars: i64) -> Self {
        Self {
            cents: dollars * 100,
        }
    }

    /// Returns zero money.
    pub fn zero() -> Self {
        Self { cents: 0 }
    }

    /// Returns the amount in cents.
    pub fn cents(&self) -> i64 {
        self.cents
    }

    /// Returns the whole-unit portion.
    pub fn dollars(&self) -> i64 {
        self.cents / 100
    }

    /// Returns the cents portion (remainder after dollars).
    pub fn cents_part(&self) -> i64 {
        self.cents.abs() % 100
    }

    /// Returns true if the amount is negative.
    pub fn is_negative(&self) -> bool {
        self.cents < 0
    }

    /// Multiplies by a quantity, or `None` if the result does not fit.
    pub fn checked_multiply(&self, quantity: u32) -> Option<Money> {
        self.cents
            .checked_mul(i64::from(quantity))
            .map(Money::from_cents)
    }

    /// Adds two amounts, or `None` if the result does not fit.
    pub fn checked_add(&self, other: Money) -> Option<Money> {
        self.cents.checked_add(other.cents).map(Money::from_cents)
    }

    /// Parses a non-negative decimal amount with at most two fraction digits.
    pub fn parse_decimal(raw: &str) -> Option<Money> {
        let raw = raw.trim();
        let (whole, fraction) = match raw.split_once('.') {
            Some((_, "")) => return None,
            Some((whole, fraction)) => (whole, fraction),
            None => (raw, ""),
        };
        if whole.is_empty() || !whole.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        if fraction.len() > 2 || !fraction.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        let whole: i64 = whole.parse().ok()?;
        let fraction: i64 = match fraction.len() {
            0 => 0,
            1 => fraction.parse::<i64>().ok()? * 10,
            _ => fraction.parse().ok()?,
        };
        whole
            .checked_mul(100)
            .and_then(|cents| cents.checked_add(fraction))
            .map(Money::from_cents)
    }

    /// Formats the amount as a plain decimal string, e.g. `240.00`.
    pub fn to_decimal_string(&self) -> String {
        let sign = if self.is_negative() { "-" } else { "" };
        format!("{sign}{}.{:02}", self.dollars().abs(), self.cents_part())
    }
}

impl Default for Money {
    fn default() -> Self {
        Self::zero()
    }
}

impl std::fmt::Display for Money {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.cents < 0 {
            write!(f, "-${}.{:02}", self.dollars().abs(), self.cents_part())
        } else {
            write!(f, "${}.{:02}", self.dollars(), self.cents_part())
        }
    }
}

impl std::ops::Add for Money {
    type Output = Money;

    fn add(self, rhs: Self) -> Self::Output {
        Money {
            cents: self.cents + rhs.cents,
        }
    }
}

impl std::ops::AddAssign for Money {
    fn add_assign(&mut self, rhs: Self) {
        self.cents += rhs.cents;
    }
}

impl std::iter::Sum for Money {
    fn sum<I: Iterator<Item = Money>>(iter: I) -> Self {
        iter.fold(Money::zero(), |acc, m| acc + m)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display() {
        assert_eq!(Money::from_cents(1050).to_string(), "$10.50");
        assert_eq!(Money::from_cents(-250).to_string(), "-$2.50");
        assert_eq!(Money::zero().to_string(), "$0.00");
    }

    #[test]
    fn test_multiply_and_sum() {
        let unit = Money::from_dollars(120);
        let total: Money = [unit.checked_multiply(2).unwrap(), Money::from_cents(50)]
            .into_iter()
            .sum();
        assert_eq!(total.cents(), 24050);
    }

    #[test]
    fn test_checked_arithmetic_reports_overflow() {
        let price = Money::parse_decimal("10000000000").unwrap();
        assert_eq!(price.checked_multiply(u32::MAX), None);
        assert_eq!(Money::from_cents(i64::MAX).checked_add(Money::from_cents(1)), None);
        assert_eq!(
            Money::from_cents(100).checked_add(Money::from_cents(50)),
            Some(Money::from_cents(150))
        );
    }

    #[test]
    fn test_parse_decimal() {
        assert_eq!(Money::parse_decimal("120"), Some(Money::from_dollars(120)));
        assert_eq!(Money::parse_decimal("12.5"), Some(Money::from_cents(1250)));
        assert_eq!(Money::parse_decimal(" 12.05 "), Some(Money::from_cents(1205)));
        assert_eq!(Money::parse_decimal("0"), Some(Money::zero()));
    }

    #[test]
    fn test_parse_decimal_rejects_malformed() {
        for raw in ["", "abc", "-5", "1.234", "1.", ".5", "1,00"] {
            assert_eq!(Money::parse_decimal(raw), None, "{raw:?} should be rejected");
        }
    }

    #[test]
    fn test_decimal_string_round_trips_through_parse() {
        let money = Money::from_cents(24050);
        assert_eq!(money.to_decimal_string(), "240.50");
        assert_eq!(Money::parse_decimal(&money.to_decimal_string()), Some(money));
    }
}
