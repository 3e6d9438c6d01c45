//! Bounded text buffers for names reported by plugins.
//!
//! Plugins report names as fixed-size UTF-16 or 8-bit C strings. Harbor keeps
//! them in [`FixedText`], a fixed-capacity UTF-8 byte buffer. Conversion
//! truncates at a character boundary (one byte is reserved for a terminator so
//! the buffer can be handed to C unchanged) and replaces code units that have
//! no UTF-8 representation with [`PLACEHOLDER`].

use std::fmt;

use serde::{Serialize, Serializer};

/// Substitute for code units that cannot be represented (unpaired surrogates,
/// invalid UTF-8 sequences).
pub const PLACEHOLDER: char = char::REPLACEMENT_CHARACTER;

/// Capacity of plugin and vendor names.
pub const NAME_CAPACITY: usize = 128;
/// Capacity of parameter titles.
pub const TITLE_CAPACITY: usize = 128;
/// Capacity of parameter short titles.
pub const SHORT_TITLE_CAPACITY: usize = 32;
/// Capacity of parameter unit labels.
pub const UNITS_CAPACITY: usize = 32;

/// Fixed-capacity UTF-8 text.
///
/// Holds at most `N - 1` bytes of text; the last byte is always free for a
/// NUL terminator.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct FixedText<const N: usize> {
    bytes: [u8; N],
    len: usize,
}

impl<const N: usize> FixedText<N> {
    /// Empty text.
    pub const fn new() -> Self {
        Self {
            bytes: [0; N],
            len: 0,
        }
    }

    /// Copy `text`, truncating at the last character boundary that fits.
    pub fn from_str_truncated(text: &str) -> Self {
        let mut out = Self::new();
        for c in text.chars() {
            if !out.push(c) {
                break;
            }
        }
        out
    }

    /// Decode NUL-terminated UTF-16.
    ///
    /// Decoding stops at the first NUL or at the end of `units`.
    pub fn from_utf16(units: &[u16]) -> Self {
        let end = units.iter().position(|&u| u == 0).unwrap_or(units.len());
        let mut out = Self::new();
        for decoded in char::decode_utf16(units[..end].iter().copied()) {
            if !out.push(decoded.unwrap_or(PLACEHOLDER)) {
                break;
            }
        }
        out
    }

    /// Decode a NUL-terminated 8-bit string, interpreted as UTF-8.
    pub fn from_c_bytes(bytes: &[u8]) -> Self {
        let end = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
        let lossy = String::from_utf8_lossy(&bytes[..end]);
        Self::from_str_truncated(&lossy)
    }

    fn push(&mut self, c: char) -> bool {
        let width = c.len_utf8();
        if N == 0 || self.len + width > N - 1 {
            return false;
        }
        c.encode_utf8(&mut self.bytes[self.len..self.len + width]);
        self.len += width;
        true
    }

    /// View as a string slice.
    pub fn as_str(&self) -> &str {
        // Only whole encoded characters are ever written.
        std::str::from_utf8(&self.bytes[..self.len]).unwrap_or_default()
    }

    /// Bytes including the NUL terminator.
    pub fn as_bytes_with_nul(&self) -> &[u8] {
        let end = (self.len + 1).min(N);
        &self.bytes[..end]
    }

    /// Length of the text in bytes.
    pub const fn len(&self) -> usize {
        self.len
    }

    /// Whether the text is empty.
    pub const fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Buffer capacity including the terminator byte.
    pub const fn capacity(&self) -> usize {
        N
    }
}

impl<const N: usize> Default for FixedText<N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<const N: usize> fmt::Debug for FixedText<N> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self.as_str(), f)
    }
}

impl<const N: usize> fmt::Display for FixedText<N> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl<const N: usize> PartialEq<str> for FixedText<N> {
    fn eq(&self, other: &str) -> bool {
        self.as_str() == other
    }
}

impl<const N: usize> PartialEq<&str> for FixedText<N> {
    fn eq(&self, other: &&str) -> bool {
        self.as_str() == *other
    }
}

impl<const N: usize> Serialize for FixedText<N> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn utf16(s: &str) -> Vec<u16> {
        s.encode_utf16().collect()
    }

    #[test]
    fn test_roundtrip_short_text() {
        let text = FixedText::<32>::from_utf16(&utf16("Gain"));
        assert_eq!(text, "Gain");
        assert_eq!(text.len(), 4);
        assert_eq!(text.as_bytes_with_nul(), b"Gain\0");
    }

    #[test]
    fn test_stops_at_nul() {
        let mut units = utf16("Cutoff");
        units.push(0);
        units.extend(utf16("garbage"));
        assert_eq!(FixedText::<32>::from_utf16(&units), "Cutoff");
    }

    #[test]
    fn test_truncates_leaving_room_for_terminator() {
        let text = FixedText::<8>::from_str_truncated("abcdefghij");
        assert_eq!(text, "abcdefg");
        assert_eq!(text.as_bytes_with_nul().len(), 8);
    }

    #[test]
    fn test_truncates_at_char_boundary() {
        // 'é' is two bytes in UTF-8; only three bytes of payload fit.
        let text = FixedText::<4>::from_str_truncated("aéé");
        assert_eq!(text, "aé");
        let text = FixedText::<3>::from_str_truncated("aé");
        assert_eq!(text, "a");
    }

    #[test]
    fn test_unpaired_surrogate_becomes_placeholder() {
        let units = [0x0041, 0xD800, 0x0042];
        let text = FixedText::<32>::from_utf16(&units);
        assert_eq!(text.as_str(), "A\u{FFFD}B");
    }

    #[test]
    fn test_surrogate_pair_decodes() {
        let text = FixedText::<32>::from_utf16(&utf16("🎹 Keys"));
        assert_eq!(text, "🎹 Keys");
    }

    #[test]
    fn test_c_bytes_invalid_utf8() {
        let text = FixedText::<32>::from_c_bytes(b"Ven\xffdor\0tail");
        assert_eq!(text.as_str(), "Ven\u{FFFD}dor");
    }

    #[test]
    fn test_zero_capacity() {
        let text = FixedText::<0>::from_str_truncated("abc");
        assert!(text.is_empty());
        assert!(text.as_bytes_with_nul().is_empty());
    }

    #[test]
    fn test_serializes_as_string() {
        let text = FixedText::<16>::from_str_truncated("Harbor");
        assert_eq!(serde_json::to_string(&text).unwrap(), "\"Harbor\"");
    }
}
