use std::fmt::{Display, Formatter};

use serde::{Deserialize, Serialize};

use crate::ValidationError;

/// Normalized ticker as the data source spells it, always uppercase.
///
/// Index, FX and exchange-suffixed tickers (`^GSPC`, `EURUSD=X`, `7203.T`) are
/// valid; only whitespace and control characters are rejected.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Symbol(String);

impl Symbol {
    /// Trim and uppercase a ticker.
    pub fn parse(input: &str) -> Result<Self, ValidationError> {
        let trimmed = input.trim();
        if trimmed.is_empty() {
            return Err(ValidationError::EmptySymbol);
        }

        if let Some((index, ch)) = trimmed
            .chars()
            .enumerate()
            .find(|(_, ch)| ch.is_whitespace() || ch.is_control())
        {
            return Err(ValidationError::SymbolInvalidChar { ch, index });
        }

        Ok(Self(trimmed.to_uppercase()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for Symbol {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl TryFrom<String> for Symbol {
    type Error = ValidationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl TryFrom<&str> for Symbol {
    type Error = ValidationError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        Self::parse(value)
    }
}

impl From<Symbol> for String {
    fn from(value: Symbol) -> Self {
        value.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_and_uppercases_lowercase_ticker() {
        let parsed = Symbol::parse(" msft ").expect("symbol should parse");
        assert_eq!(parsed.as_str(), "MSFT");
    }

    #[test]
    fn accepts_share_class_suffix() {
        let parsed = Symbol::parse("brk.b").expect("symbol should parse");
        assert_eq!(parsed.as_str(), "BRK.B");
    }

    #[test]
    fn accepts_ticker_starting_with_digit() {
        let parsed = Symbol::parse("7203.t").expect("symbol should parse");
        assert_eq!(parsed.as_str(), "7203.T");
    }

    #[test]
    fn accepts_caret_prefixed_index_ticker() {
        let parsed = Symbol::parse("^gspc").expect("symbol should parse");
        assert_eq!(parsed.as_str(), "^GSPC");
    }

    #[test]
    fn accepts_fx_pair_ticker() {
        let parsed = Symbol::parse(" eurusd=x\n").expect("symbol should parse");
        assert_eq!(parsed.as_str(), "EURUSD=X");
    }

    #[test]
    fn rejects_blank_input() {
        let err = Symbol::parse(" \t ").expect_err("must fail");
        assert_eq!(err, ValidationError::EmptySymbol);
    }

    #[test]
    fn rejects_embedded_whitespace() {
        let err = Symbol::parse("BRK B").expect_err("must fail");
        assert!(matches!(
            err,
            ValidationError::SymbolInvalidChar { ch: ' ', index: 3 }
        ));
    }

    #[test]
    fn rejects_embedded_control_character() {
        let err = Symbol::parse("SP\u{0}Y").expect_err("must fail");
        assert!(matches!(
            err,
            ValidationError::SymbolInvalidChar { ch: '\u{0}', index: 2 }
        ));
    }

    #[test]
    fn symbols_order_alphabetically() {
        let a = Symbol::parse("AAPL").expect("symbol");
        let b = Symbol::parse("MSFT").expect("symbol");
        assert!(a < b);
    }
}
