//! Normalized government ID number type.

use core::fmt;

use serde::{Deserialize, Serialize};

/// Errors that can occur when parsing a [`GovernmentId`].
#[derive(thiserror::Error, Debug, Clone)]
pub enum GovernmentIdError {
    /// The input string is empty after normalization.
    #[error("government ID cannot be empty")]
    Empty,
    /// The input contains characters other than digits and separators.
    #[error("government ID must contain only digits (found {0:?})")]
    InvalidCharacter(char),
    /// The normalized number has an invalid length.
    #[error("government ID must be {min}-{max} digits (got {len})")]
    InvalidLength {
        /// Minimum digit count.
        min: usize,
        /// Maximum digit count.
        max: usize,
        /// Actual digit count after normalization.
        len: usize,
    },
}

/// A normalized government-issued ID number.
///
/// The same physical document can be typed with dots, dashes or spaces
/// (`30.111.222`, `30-111-222`, `30111222`); all of these normalize to the
/// same registry key so that one document can never back two accounts under
/// different spellings.
///
/// ## Constraints
///
/// - Separators `.`, `-`, and whitespace are stripped
/// - Only digits may remain after stripping
/// - 7 to 10 digits (national ID card range)
///
/// ## Examples
///
/// ```
/// use cargaruta_identity_core::GovernmentId;
///
/// let a = GovernmentId::parse("30.111.222").unwrap();
/// let b = GovernmentId::parse(" 30111222 ").unwrap();
/// assert_eq!(a, b);
/// assert_eq!(a.as_str(), "30111222");
///
/// assert!(GovernmentId::parse("").is_err());
/// assert!(GovernmentId::parse("12AB56789").is_err());
/// assert!(GovernmentId::parse("123").is_err()); // too short
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(transparent)]
pub struct GovernmentId(String);

impl GovernmentId {
    /// Minimum number of digits.
    pub const MIN_DIGITS: usize = 7;
    /// Maximum number of digits.
    pub const MAX_DIGITS: usize = 10;

    /// Parse a `GovernmentId` from a raw user- or provider-supplied string.
    ///
    /// # Errors
    ///
    /// Returns an error if the input:
    /// - Is empty after stripping separators
    /// - Contains non-digit, non-separator characters
    /// - Has fewer than 7 or more than 10 digits
    pub fn parse(s: &str) -> Result<Self, GovernmentIdError> {
        let mut digits = String::with_capacity(s.len());
        for c in s.chars() {
            if c.is_ascii_digit() {
                digits.push(c);
            } else if c == '.' || c == '-' || c.is_whitespace() {
                continue;
            } else {
                return Err(GovernmentIdError::InvalidCharacter(c));
            }
        }

        if digits.is_empty() {
            return Err(GovernmentIdError::Empty);
        }

        let len = digits.len();
        if !(Self::MIN_DIGITS..=Self::MAX_DIGITS).contains(&len) {
            return Err(GovernmentIdError::InvalidLength {
                min: Self::MIN_DIGITS,
                max: Self::MAX_DIGITS,
                len,
            });
        }

        Ok(Self(digits))
    }

    /// Returns the normalized number as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Consume the wrapper and return the normalized `String`.
    #[must_use]
    pub fn into_inner(self) -> String {
        self.0
    }
}

impl fmt::Display for GovernmentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
