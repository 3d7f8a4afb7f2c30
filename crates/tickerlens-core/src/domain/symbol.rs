use std::fmt::{Display, Formatter};

use serde::{Deserialize, Serialize};

use crate::ValidationError;

pub const MAX_SYMBOL_LEN: usize = 20;

/// Exchange suffix carried by listing-qualified symbols (e.g. `HDFCBANK.NS`).
///
/// Price and news endpoints accept the bare form; the vector store keeps
/// documents under the suffixed form, so retrieval must try both.
pub const EXCHANGE_SUFFIX: &str = ".NS";

/// Normalized market symbol/ticker.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Symbol(String);

impl Symbol {
    /// Parse and normalize a symbol to uppercase.
    pub fn parse(input: &str) -> Result<Self, ValidationError> {
        let trimmed = input.trim();
        if trimmed.is_empty() {
            return Err(ValidationError::EmptySymbol);
        }

        let normalized = trimmed.to_ascii_uppercase();
        let len = normalized.chars().count();
        if len > MAX_SYMBOL_LEN {
            return Err(ValidationError::SymbolTooLong {
                len,
                max: MAX_SYMBOL_LEN,
            });
        }

        if let Some(first) = normalized.chars().next() {
            if !first.is_ascii_alphabetic() {
                return Err(ValidationError::SymbolInvalidStart { ch: first });
            }
        }

        for (index, ch) in normalized.chars().enumerate() {
            let valid = ch.is_ascii_alphanumeric() || ch == '.' || ch == '-' || ch == '&';
            if !valid {
                return Err(ValidationError::SymbolInvalidChar { ch, index });
            }
        }

        Ok(Self(normalized))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The bare form without the exchange suffix, used by backend endpoints.
    pub fn display_form(&self) -> &str {
        self.0
            .strip_suffix(EXCHANGE_SUFFIX)
            .filter(|bare| !bare.is_empty())
            .unwrap_or(&self.0)
    }

    /// The form guaranteed to carry the exchange suffix, preferred by the
    /// vector store.
    pub fn suffixed_form(&self) -> String {
        if self.0.ends_with(EXCHANGE_SUFFIX) {
            self.0.clone()
        } else {
            format!("{}{EXCHANGE_SUFFIX}", self.0)
        }
    }

    /// Equivalent spellings to try across systems, suffixed form first,
    /// each appearing once.
    pub fn variants(&self) -> Vec<String> {
        let suffixed = self.suffixed_form();
        let bare = self.display_form().to_owned();
        let mut ordered = vec![suffixed];
        if !ordered.contains(&bare) {
            ordered.push(bare);
        }
        ordered
    }

    /// Heuristic company-name phrases derived from the bare form, used to
    /// widen retrieval recall ("HDFCBANK" -> "Hdfc Bank").
    pub fn alias_terms(&self) -> Vec<String> {
        let bare = self.display_form();
        let mut terms = Vec::new();
        for suffix in ["BANK", "LIFE"] {
            if bare.len() > suffix.len() {
                if let Some(stem) = bare.strip_suffix(suffix) {
                    terms.push(title_case(&format!("{stem} {suffix}")));
                }
            }
        }
        terms
    }
}

fn title_case(input: &str) -> String {
    input
        .split_whitespace()
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => {
                    first.to_ascii_uppercase().to_string() + &chars.as_str().to_ascii_lowercase()
                }
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
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
    fn parses_and_normalizes_symbol() {
        let parsed = Symbol::parse(" hdfcbank ").expect("symbol should parse");
        assert_eq!(parsed.as_str(), "HDFCBANK");
    }

    #[test]
    fn rejects_empty_symbol() {
        let err = Symbol::parse("   ").expect_err("must fail");
        assert!(matches!(err, ValidationError::EmptySymbol));
    }

    #[test]
    fn rejects_invalid_start() {
        let err = Symbol::parse("1AAPL").expect_err("must fail");
        assert!(matches!(err, ValidationError::SymbolInvalidStart { .. }));
    }

    #[test]
    fn bare_symbol_yields_suffixed_variant_first() {
        let symbol = Symbol::parse("HDFCBANK").expect("valid");
        assert_eq!(symbol.variants(), vec!["HDFCBANK.NS", "HDFCBANK"]);
    }

    #[test]
    fn suffixed_symbol_yields_same_ordered_variants() {
        let symbol = Symbol::parse("hdfcbank.ns").expect("valid");
        assert_eq!(symbol.display_form(), "HDFCBANK");
        assert_eq!(symbol.variants(), vec!["HDFCBANK.NS", "HDFCBANK"]);
    }

    #[test]
    fn variants_never_duplicate() {
        for input in ["SBIN", "SBIN.NS", "TCS"] {
            let symbol = Symbol::parse(input).expect("valid");
            let variants = symbol.variants();
            let mut unique = variants.clone();
            unique.dedup();
            assert_eq!(variants, unique, "variants for {input} must be unique");
        }
    }

    #[test]
    fn alias_terms_cover_bank_and_life_suffixes() {
        let bank = Symbol::parse("HDFCBANK").expect("valid");
        assert_eq!(bank.alias_terms(), vec!["Hdfc Bank"]);

        let life = Symbol::parse("SBILIFE.NS").expect("valid");
        assert_eq!(life.alias_terms(), vec!["Sbi Life"]);

        let plain = Symbol::parse("TCS").expect("valid");
        assert!(plain.alias_terms().is_empty());
    }
}
