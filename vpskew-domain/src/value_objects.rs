//! Value Objects for the vpskew domain
//!
//! Immutable, validated domain primitives.
//! All value objects enforce invariants at construction time.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Domain errors for value object validation
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DomainError {
    /// Price must be positive
    #[error("Invalid price: {0}")]
    InvalidPrice(String),

    /// Quantity must be positive
    #[error("Invalid quantity: {0}")]
    InvalidQuantity(String),

    /// Symbol must be non-empty
    #[error("Invalid symbol: {0}")]
    InvalidSymbol(String),

    /// Instrument precision or grid is unusable
    #[error("Invalid instrument: {0}")]
    InvalidInstrument(String),

    /// Risk parameters rejected by a sizing policy
    #[error("Invalid risk params: {0}")]
    InvalidRiskParams(String),

    /// Position sizing error
    #[error("Position sizing error: {0}")]
    PositionSizingError(String),

    /// A stop revision would loosen protection
    #[error("Stop would loosen: {0}")]
    StopWouldLoosen(String),

    /// Invalid state transition
    #[error("Invalid state transition: {0}")]
    InvalidStateTransition(String),
}

// =============================================================================
// Price
// =============================================================================

/// Price represents a positive decimal price
///
/// # Invariants
/// - Must be > 0
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Price(Decimal);

impl Price {
    /// Create a new Price with validation
    ///
    /// # Errors
    /// Returns `DomainError::InvalidPrice` if value <= 0
    pub fn new(value: Decimal) -> Result<Self, DomainError> {
        if value <= Decimal::ZERO {
            return Err(DomainError::InvalidPrice(format!("Price must be positive, got {value}")));
        }
        Ok(Self(value))
    }

    /// Get the underlying Decimal value
    pub fn as_decimal(&self) -> Decimal {
        self.0
    }
}

impl fmt::Display for Price {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// =============================================================================
// Quantity
// =============================================================================

/// Quantity represents a positive position volume (lots)
///
/// # Invariants
/// - Must be > 0
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Quantity(Decimal);

impl Quantity {
    /// Create a new Quantity with validation
    ///
    /// # Errors
    /// Returns `DomainError::InvalidQuantity` if value <= 0
    pub fn new(value: Decimal) -> Result<Self, DomainError> {
        if value <= Decimal::ZERO {
            return Err(DomainError::InvalidQuantity(format!(
                "Quantity must be positive, got {value}"
            )));
        }
        Ok(Self(value))
    }

    /// Get the underlying Decimal value
    pub fn as_decimal(&self) -> Decimal {
        self.0
    }
}

impl fmt::Display for Quantity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// =============================================================================
// Symbol
// =============================================================================

/// Symbol is the venue's instrument name (e.g., XAUUSDm)
///
/// Venue naming is free-form (broker suffixes are common),
/// so only emptiness and whitespace are rejected.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Symbol(String);

impl Symbol {
    /// Create a Symbol
    ///
    /// # Errors
    /// Returns `DomainError::InvalidSymbol` if empty or containing whitespace
    pub fn new(name: impl Into<String>) -> Result<Self, DomainError> {
        let name = name.into();
        if name.is_empty() || name.chars().any(char::is_whitespace) {
            return Err(DomainError::InvalidSymbol(format!("'{name}'")));
        }
        Ok(Self(name))
    }

    /// Get the symbol name
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// =============================================================================
// Direction
// =============================================================================

/// Direction of a signal or position
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Direction {
    /// Long (buy low, sell high)
    Buy,
    /// Short (sell high, buy low)
    Sell,
}

impl Direction {
    /// +1 for Buy, -1 for Sell
    ///
    /// Multiplying a raw price move by the sign yields the holder's P&L direction.
    pub fn sign(&self) -> Decimal {
        match self {
            Direction::Buy => Decimal::ONE,
            Direction::Sell => Decimal::NEGATIVE_ONE,
        }
    }

    /// The direction of the order that closes a position opened in this direction
    pub fn opposite(&self) -> Direction {
        match self {
            Direction::Buy => Direction::Sell,
            Direction::Sell => Direction::Buy,
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Buy => write!(f, "BUY"),
            Direction::Sell => write!(f, "SELL"),
        }
    }
}

// =============================================================================
// Instrument
// =============================================================================

/// Quoting precision of the traded instrument.
///
/// `point` (10^-digits) is the price-grid unit used by every threshold
/// expressed "in points". `price_step` is the histogram bin width and
/// is usually, but not necessarily, equal to `point`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Instrument {
    symbol: Symbol,
    digits: u32,
    price_step: Decimal,
}

impl Instrument {
    /// Largest precision accepted (beyond this venues do not quote).
    pub const MAX_DIGITS: u32 = 10;

    /// Create an instrument description
    ///
    /// # Errors
    /// Returns `DomainError::InvalidInstrument` if digits is out of range
    /// or price_step is not positive
    pub fn new(symbol: Symbol, digits: u32, price_step: Decimal) -> Result<Self, DomainError> {
        if digits > Self::MAX_DIGITS {
            return Err(DomainError::InvalidInstrument(format!(
                "digits must be <= {}, got {digits}",
                Self::MAX_DIGITS
            )));
        }
        if price_step <= Decimal::ZERO {
            return Err(DomainError::InvalidInstrument(format!(
                "price_step must be positive, got {price_step}"
            )));
        }
        Ok(Self { symbol, digits, price_step })
    }

    /// Instrument whose bin grid equals its point size
    pub fn with_point_grid(symbol: Symbol, digits: u32) -> Result<Self, DomainError> {
        Self::new(symbol, digits, Decimal::new(1, digits.min(Self::MAX_DIGITS)))
    }

    /// Venue symbol
    pub fn symbol(&self) -> &Symbol {
        &self.symbol
    }

    /// Quoted decimal places
    pub fn digits(&self) -> u32 {
        self.digits
    }

    /// Smallest price increment (10^-digits)
    pub fn point(&self) -> Decimal {
        Decimal::new(1, self.digits)
    }

    /// Histogram bin width
    pub fn price_step(&self) -> Decimal {
        self.price_step
    }

    /// Convert a count of points to a price distance
    pub fn points(&self, count: Decimal) -> Decimal {
        count * self.point()
    }

    /// Round a price to the quoted precision
    pub fn normalize(&self, value: Decimal) -> Decimal {
        value.round_dp(self.digits)
    }
}

// =============================================================================
// Tests
// =============================================================================
