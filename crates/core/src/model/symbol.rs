use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

// ─── SYMBOL PALETTE ────────────────────────────────────────────────────────────

/// One of the selectable glyphs a participant taps to build a session code.
///
/// The palette is fixed. Each symbol carries a stable ordinal (`0..16`) and
/// the hex nibble it contributes to a `SessionCode`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Symbol {
    Smile,
    Heart,
    Star,
    Sun,
    Moon,
    Cloud,
    Fire,
    Leaf,
    Cat,
    Dog,
    Fish,
    Bird,
    Apple,
    Pizza,
    Rocket,
    Music,
}

impl Symbol {
    /// Every symbol in ordinal order.
    pub const ALL: [Symbol; 16] = [
        Symbol::Smile,
        Symbol::Heart,
        Symbol::Star,
        Symbol::Sun,
        Symbol::Moon,
        Symbol::Cloud,
        Symbol::Fire,
        Symbol::Leaf,
        Symbol::Cat,
        Symbol::Dog,
        Symbol::Fish,
        Symbol::Bird,
        Symbol::Apple,
        Symbol::Pizza,
        Symbol::Rocket,
        Symbol::Music,
    ];

    /// Stable position of the symbol in the palette.
    #[must_use]
    pub fn ordinal(self) -> usize {
        self as usize
    }

    /// Looks up a symbol by its ordinal.
    #[must_use]
    pub fn from_ordinal(ordinal: usize) -> Option<Self> {
        Self::ALL.get(ordinal).copied()
    }

    /// Nibble value (`0x0..=0xF`) contributed to a session code.
    #[must_use]
    pub fn hex(self) -> u8 {
        // The palette has exactly 16 entries, so the ordinal always fits a nibble.
        (self as u8) & 0x0F
    }

    /// Uppercase hex digit for this symbol.
    #[must_use]
    pub fn hex_digit(self) -> char {
        char::from_digit(u32::from(self.hex()), 16)
            .map_or('0', |digit| digit.to_ascii_uppercase())
    }

    /// Looks up the symbol carrying the given nibble.
    #[must_use]
    pub fn from_hex(nibble: u8) -> Option<Self> {
        Self::ALL.into_iter().find(|symbol| symbol.hex() == nibble)
    }

    /// Glyph shown on the selection grid.
    #[must_use]
    pub fn glyph(self) -> &'static str {
        match self {
            Symbol::Smile => "😀",
            Symbol::Heart => "❤️",
            Symbol::Star => "⭐",
            Symbol::Sun => "☀️",
            Symbol::Moon => "🌙",
            Symbol::Cloud => "☁️",
            Symbol::Fire => "🔥",
            Symbol::Leaf => "🍃",
            Symbol::Cat => "🐱",
            Symbol::Dog => "🐶",
            Symbol::Fish => "🐟",
            Symbol::Bird => "🐦",
            Symbol::Apple => "🍎",
            Symbol::Pizza => "🍕",
            Symbol::Rocket => "🚀",
            Symbol::Music => "🎵",
        }
    }

    /// Lowercase name, as accepted by `FromStr`.
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Symbol::Smile => "smile",
            Symbol::Heart => "heart",
            Symbol::Star => "star",
            Symbol::Sun => "sun",
            Symbol::Moon => "moon",
            Symbol::Cloud => "cloud",
            Symbol::Fire => "fire",
            Symbol::Leaf => "leaf",
            Symbol::Cat => "cat",
            Symbol::Dog => "dog",
            Symbol::Fish => "fish",
            Symbol::Bird => "bird",
            Symbol::Apple => "apple",
            Symbol::Pizza => "pizza",
            Symbol::Rocket => "rocket",
            Symbol::Music => "music",
        }
    }
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.glyph())
    }
}

/// Error type for parsing a `Symbol` from a name or hex digit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseSymbolError {
    raw: String,
}

impl fmt::Display for ParseSymbolError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown symbol: {}", self.raw)
    }
}

impl std::error::Error for ParseSymbolError {}

impl FromStr for Symbol {
    type Err = ParseSymbolError;

    /// Accepts a symbol name (`"rocket"`) or a single hex digit (`"e"`).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        let lowered = trimmed.to_ascii_lowercase();

        if let Some(symbol) = Self::ALL.into_iter().find(|symbol| symbol.name() == lowered) {
            return Ok(symbol);
        }

        let mut chars = trimmed.chars();
        if let (Some(digit), None) = (chars.next(), chars.next()) {
            if let Some(symbol) = digit
                .to_digit(16)
                .and_then(|value| u8::try_from(value).ok())
                .and_then(Self::from_hex)
            {
                return Ok(symbol);
            }
        }

        Err(ParseSymbolError {
            raw: trimmed.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ordinals_and_nibbles_cover_the_palette() {
        for (index, symbol) in Symbol::ALL.into_iter().enumerate() {
            assert_eq!(symbol.ordinal(), index);
            assert_eq!(usize::from(symbol.hex()), index);
            assert_eq!(Symbol::from_ordinal(index), Some(symbol));
        }
        assert_eq!(Symbol::from_ordinal(16), None);
    }

    #[test]
    fn hex_digit_is_uppercase() {
        assert_eq!(Symbol::Fish.hex_digit(), 'A');
        assert_eq!(Symbol::Music.hex_digit(), 'F');
        assert_eq!(Symbol::Smile.hex_digit(), '0');
    }

    #[test]
    fn parses_names_and_hex_digits() {
        assert_eq!("rocket".parse::<Symbol>().unwrap(), Symbol::Rocket);
        assert_eq!(" Cat ".parse::<Symbol>().unwrap(), Symbol::Cat);
        assert_eq!("b".parse::<Symbol>().unwrap(), Symbol::Bird);
        assert!("zebra".parse::<Symbol>().is_err());
        assert!("10".parse::<Symbol>().is_err());
    }
}
