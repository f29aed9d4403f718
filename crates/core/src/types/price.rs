//! Integer price representation.
//!
//! Catalog prices are stored as whole numbers in the smallest unit the shop
//! trades in. The marketplace sells in Indonesian rupiah, which has no minor
//! unit in practice, so `350000` means Rp 350.000.

use core::fmt;
use core::iter::Sum;
use core::ops::Add;

use serde::{Deserialize, Serialize};

/// A non-negative amount of money in the storefront currency.
///
/// Arithmetic saturates instead of overflowing so a corrupt document cannot
/// panic the cart total.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Price(u64);

impl Price {
    /// A zero amount.
    pub const ZERO: Self = Self(0);

    /// Create a price from a whole amount.
    #[must_use]
    pub const fn new(amount: u64) -> Self {
        Self(amount)
    }

    /// The whole amount.
    #[must_use]
    pub const fn amount(self) -> u64 {
        self.0
    }

    /// Multiply by a line quantity.
    #[must_use]
    pub fn times(self, quantity: u32) -> Self {
        Self(self.0.saturating_mul(u64::from(quantity)))
    }

    /// Format with the given currency, e.g. `Rp 350.000`.
    #[must_use]
    pub fn display(self, currency: Currency) -> String {
        format!("{} {}", currency.symbol(), group_thousands(self.0, currency.separator()))
    }
}

impl Add for Price {
    type Output = Self;

    fn add(self, rhs: Self) -> Self {
        Self(self.0.saturating_add(rhs.0))
    }
}

impl Sum for Price {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(Self::ZERO, Add::add)
    }
}

impl fmt::Display for Price {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.display(Currency::default()))
    }
}

/// Currencies the storefront knows how to format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum Currency {
    #[default]
    IDR,
    USD,
}

impl Currency {
    /// Display symbol.
    #[must_use]
    pub const fn symbol(self) -> &'static str {
        match self {
            Self::IDR => "Rp",
            Self::USD => "$",
        }
    }

    /// Thousands separator.
    const fn separator(self) -> char {
        match self {
            Self::IDR => '.',
            Self::USD => ',',
        }
    }
}

fn group_thousands(amount: u64, separator: char) -> String {
    let digits = amount.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(separator);
        }
        out.push(ch);
    }
    out
}
