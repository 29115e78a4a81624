//! SCPI text helpers.
//!
//! Argument formatting shared by every driver, plus parsers for the two
//! replies all SCPI instruments have in common: `*IDN?` and `SYST:ERR?`.

pub mod address;
pub mod block;

pub use address::ResourceAddress;
pub use block::{BlockValue, ByteOrder};

use serde::Serialize;
use std::fmt;

use crate::error::{DriverError, DriverResult};

/// Format a numeric argument.
///
/// Integral values are written without a fractional part (`1e9` becomes
/// `1000000000`, `-5.0` becomes `-5`); everything else uses the shortest
/// decimal representation that round-trips.
///
/// # Errors
/// `InvalidParameter` for NaN or infinite values.
pub fn number(value: f64) -> DriverResult<String> {
    if !value.is_finite() {
        return Err(DriverError::InvalidParameter(format!(
            "non-finite numeric argument: {}",
            value
        )));
    }
    if value.fract() == 0.0 && value.abs() < 1e15 {
        // -0.0 prints as "-0"
        Ok(format!("{:.0}", value + 0.0))
    } else {
        Ok(format!("{}", value))
    }
}

/// `ON` / `OFF` boolean argument.
pub fn on_off(state: bool) -> &'static str {
    if state {
        "ON"
    } else {
        "OFF"
    }
}

/// Single-quoted string argument.
///
/// # Errors
/// `InvalidParameter` if the value itself contains a quote.
pub fn quoted(value: &str) -> DriverResult<String> {
    if value.contains('\'') || value.contains('"') {
        return Err(DriverError::InvalidParameter(format!(
            "string argument may not contain quotes: {}",
            value
        )));
    }
    Ok(format!("'{}'", value))
}

/// Parse a numeric reply such as `1.000000000E+09`.
pub fn parse_f64(reply: &str) -> DriverResult<f64> {
    let trimmed = reply.trim();
    trimmed
        .parse::<f64>()
        .map_err(|_| DriverError::Parse(format!("expected a number, got '{}'", trimmed)))
}

/// Parse a boolean reply (`1`, `0`, `ON`, `OFF`).
pub fn parse_bool(reply: &str) -> DriverResult<bool> {
    match reply.trim().to_ascii_uppercase().as_str() {
        "1" | "ON" => Ok(true),
        "0" | "OFF" => Ok(false),
        other => {
            // Some firmware answers "+1" or "1.0"
            match other.parse::<f64>() {
                Ok(v) if v == 1.0 => Ok(true),
                Ok(v) if v == 0.0 => Ok(false),
                _ => Err(DriverError::Parse(format!(
                    "expected a boolean, got '{}'",
                    other
                ))),
            }
        }
    }
}

/// Parsed `*IDN?` reply
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Identity {
    /// Manufacturer field
    pub manufacturer: String,
    /// Model field
    pub model: String,
    /// Serial number field
    pub serial: String,
    /// Firmware version field
    pub firmware: String,
}

impl Identity {
    /// Split an `*IDN?` reply into its four comma-separated fields.
    ///
    /// Missing fields are left empty; a reply without commas is taken as the
    /// manufacturer.
    pub fn parse(reply: &str) -> Self {
        let mut fields = reply.trim().splitn(4, ',').map(|f| f.trim().to_string());
        Self {
            manufacturer: fields.next().unwrap_or_default(),
            model: fields.next().unwrap_or_default(),
            serial: fields.next().unwrap_or_default(),
            firmware: fields.next().unwrap_or_default(),
        }
    }

    /// Upper-cased manufacturer, used for vendor-specific command variants.
    pub fn vendor(&self) -> String {
        self.manufacturer.to_ascii_uppercase()
    }

    /// Rohde & Schwarz reports itself in several spellings.
    pub fn is_rohde_schwarz(&self) -> bool {
        let vendor = self.vendor();
        vendor.contains("ROHDE") || vendor.contains("R&S")
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{},{},{},{}",
            self.manufacturer, self.model, self.serial, self.firmware
        )
    }
}

/// One entry from the SCPI error queue
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ErrorEntry {
    /// Error code; 0 means the queue is empty
    pub code: i32,
    /// Message text without surrounding quotes
    pub message: String,
}

impl ErrorEntry {
    /// Parse a `SYST:ERR?` reply such as `-113,"Undefined header"`.
    pub fn parse(reply: &str) -> DriverResult<Self> {
        let trimmed = reply.trim();
        let (code, message) = trimmed.split_once(',').unwrap_or((trimmed, ""));
        let code = code
            .trim()
            .parse::<i32>()
            .map_err(|_| DriverError::Parse(format!("malformed error queue entry '{}'", trimmed)))?;
        Ok(Self {
            code,
            message: message.trim().trim_matches('"').to_string(),
        })
    }

    /// `true` for the "0, No error" terminator.
    pub fn is_no_error(&self) -> bool {
        self.code == 0
    }
}

impl fmt::Display for ErrorEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{},\"{}\"", self.code, self.message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_number_integral() {
        assert_eq!(number(1e9).unwrap(), "1000000000");
        assert_eq!(number(-5.0).unwrap(), "-5");
        assert_eq!(number(50.0).unwrap(), "50");
        assert_eq!(number(-0.0).unwrap(), "0");
    }

    #[test]
    fn test_number_fractional() {
        assert_eq!(number(0.001).unwrap(), "0.001");
        assert_eq!(number(-12.5).unwrap(), "-12.5");
        assert_eq!(number(6.0125e9).unwrap(), "6012500000");
    }

    #[test]
    fn test_number_rejects_non_finite() {
        assert!(number(f64::NAN).is_err());
        assert!(number(f64::INFINITY).is_err());
    }

    #[test]
    fn test_quoted() {
        assert_eq!(quoted("Trc1").unwrap(), "'Trc1'");
        assert!(quoted("a'b").is_err());
    }

    #[test]
    fn test_parse_bool_variants() {
        assert!(parse_bool("1\n").unwrap());
        assert!(parse_bool("ON").unwrap());
        assert!(!parse_bool(" 0").unwrap());
        assert!(parse_bool("+1").unwrap());
        assert!(parse_bool("maybe").is_err());
    }

    #[test]
    fn test_identity_parse() {
        let idn = Identity::parse("Rohde-Schwarz,ZNL20-2Port,1323.0012K20/101234,1.40\n");
        assert_eq!(idn.manufacturer, "Rohde-Schwarz");
        assert_eq!(idn.model, "ZNL20-2Port");
        assert_eq!(idn.firmware, "1.40");
        assert!(idn.is_rohde_schwarz());

        let short = Identity::parse("AnaPico");
        assert_eq!(short.manufacturer, "AnaPico");
        assert!(short.model.is_empty());
        assert!(!short.is_rohde_schwarz());
    }

    #[test]
    fn test_error_entry_parse() {
        let entry = ErrorEntry::parse("-113,\"Undefined header\"").unwrap();
        assert_eq!(entry.code, -113);
        assert_eq!(entry.message, "Undefined header");
        assert!(!entry.is_no_error());

        let ok = ErrorEntry::parse("0,\"No error\"\n").unwrap();
        assert!(ok.is_no_error());

        assert!(ErrorEntry::parse("garbage").is_err());
    }
}
