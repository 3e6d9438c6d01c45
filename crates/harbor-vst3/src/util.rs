//! Conversions between VST3 string/ID buffers and host types.
//!
//! VST3 hands text around as fixed `char` arrays (class info) and fixed
//! UTF-16 arrays (`String128`). Incoming text is decoded into [`FixedText`];
//! outgoing text is written NUL-terminated and truncated to fit.

use std::ffi::c_char;

use harbor_core::FixedText;
use vst3::com_scrape_types::Guid;
use vst3::Steinberg::Vst::TChar;
use vst3::Steinberg::TUID;

/// Convert an interface `Guid` into the `TUID` layout `createInstance` expects.
pub fn guid_to_tuid(guid: &Guid) -> TUID {
    let mut tuid: TUID = [0; 16];
    for (dst, src) in tuid.iter_mut().zip(guid.iter()) {
        *dst = *src as c_char;
    }
    tuid
}

/// Decode a NUL-terminated `char` array (class names, categories).
pub fn text_from_chars<const N: usize>(chars: &[c_char]) -> FixedText<N> {
    let end = chars.iter().position(|&c| c == 0).unwrap_or(chars.len());
    let bytes: Vec<u8> = chars[..end].iter().map(|&c| c as u8).collect();
    FixedText::from_c_bytes(&bytes)
}

/// Decode a NUL-terminated UTF-16 array (`String128` and friends).
pub fn text_from_wide<const N: usize>(chars: &[TChar]) -> FixedText<N> {
    FixedText::from_utf16(chars)
}

/// Copy a string into a `char` buffer, truncating and NUL-terminating.
pub fn copy_cstring(src: &str, dst: &mut [c_char]) {
    let Some(room) = dst.len().checked_sub(1) else {
        return;
    };
    let mut len = src.len().min(room);
    while !src.is_char_boundary(len) {
        len -= 1;
    }
    for (dst, src) in dst.iter_mut().zip(&src.as_bytes()[..len]) {
        *dst = *src as c_char;
    }
    dst[len] = 0;
}

/// Copy a string into a UTF-16 buffer, truncating and NUL-terminating.
pub fn copy_wstring(src: &str, dst: &mut [TChar]) {
    let Some(room) = dst.len().checked_sub(1) else {
        return;
    };
    let mut len = 0;
    let mut units = [0u16; 2];
    for c in src.chars() {
        let encoded = c.encode_utf16(&mut units);
        // A surrogate pair is copied whole or not at all.
        if len + encoded.len() > room {
            break;
        }
        for unit in encoded.iter() {
            dst[len] = *unit as TChar;
            len += 1;
        }
    }
    dst[len] = 0;
}
