//! Modified UTF-8 as used by `string_data_item`.
//!
//! Well formed data goes through `cesu8`. Anything it rejects (lone
//! surrogates, stray continuation bytes) is decoded by hand so that a string
//! table never fails to load; unpaired surrogates come out as `\uXXXX`.

use std::borrow::Cow;

use cesu8::{from_java_cesu8, to_java_cesu8};
use log::trace;

pub fn decode(bytes: &[u8]) -> String
{
    match from_java_cesu8(bytes)
    {
        Ok(s) => s.into_owned(),
        Err(_) => {
            trace!("[mutf8] falling back to lenient decode for {} bytes", bytes.len());
            decode_lenient(bytes)
        }
    }
}

pub fn encode(s: &str) -> Vec<u8>
{
    match to_java_cesu8(s)
    {
        Cow::Borrowed(b) => b.to_vec(),
        Cow::Owned(v) => v,
    }
}

/// Number of UTF-16 code units, the value stored in the `utf16_size` prefix.
pub fn utf16_len(s: &str) -> u32
{
    s.encode_utf16().count() as u32
}

/// Replaces every non-ASCII character with its `\uXXXX` escape (two escapes
/// for characters outside the BMP).
pub fn escape_non_ascii(s: &str) -> String
{
    if s.is_ascii()
    {
        return s.to_string();
    }
    let mut out = String::with_capacity(s.len() + 8);
    for c in s.chars()
    {
        if c.is_ascii()
        {
            out.push(c);
        }
        else
        {
            let mut units = [0u16; 2];
            for u in c.encode_utf16(&mut units)
            {
                out.push_str(&format!("\\u{:04x}", u));
            }
        }
    }
    out
}

fn decode_lenient(bytes: &[u8]) -> String
{
    // First pass: MUTF-8 sequences to UTF-16 code units. Undecodable bytes are
    // carried through as Err(byte).
    let mut units: Vec<Result<u16, u8>> = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len()
    {
        let x = bytes[i];
        if x >> 7 == 0
        {
            units.push(Ok((x & 0x7f) as u16));
            i += 1;
        }
        else if x >> 5 == 0b110 && i + 1 < bytes.len() && bytes[i + 1] >> 6 == 0b10
        {
            units.push(Ok(((x as u16 & 0x1f) << 6) | (bytes[i + 1] as u16 & 0x3f)));
            i += 2;
        }
        else if x >> 4 == 0b1110 && i + 2 < bytes.len() && bytes[i + 1] >> 6 == 0b10 && bytes[i + 2] >> 6 == 0b10
        {
            units.push(Ok(((x as u16 & 0x0f) << 12) | ((bytes[i + 1] as u16 & 0x3f) << 6) | (bytes[i + 2] as u16 & 0x3f)));
            i += 3;
        }
        else
        {
            units.push(Err(x));
            i += 1;
        }
    }

    // Second pass: pair surrogates, escape whatever is left unpaired.
    let mut out = String::with_capacity(units.len());
    let mut j = 0;
    while j < units.len()
    {
        match units[j]
        {
            Ok(c) if (0xd800..0xdc00).contains(&c) => {
                if let Some(Ok(n)) = units.get(j + 1)
                {
                    if (0xdc00..0xe000).contains(n)
                    {
                        let cp = 0x10000 + (((c as u32) & 0x3ff) << 10) + ((*n as u32) & 0x3ff);
                        if let Some(ch) = char::from_u32(cp)
                        {
                            out.push(ch);
                            j += 2;
                            continue;
                        }
                    }
                }
                out.push_str(&format!("\\u{:04x}", c));
            }
            Ok(c) if (0xdc00..0xe000).contains(&c) => out.push_str(&format!("\\u{:04x}", c)),
            Ok(c) => match char::from_u32(c as u32)
            {
                Some(ch) => out.push(ch),
                None => out.push_str(&format!("\\u{:04x}", c)),
            },
            Err(b) => out.push_str(&format!("\\x{:02x}", b)),
        }
        j += 1;
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn embedded_nul_uses_two_bytes()
    {
        let s = "a\u{0}b";
        let enc = encode(s);
        assert_eq!(enc, vec![b'a', 0xc0, 0x80, b'b']);
        assert_eq!(decode(&enc), s);
    }

    #[test]
    fn supplementary_character_is_a_surrogate_pair()
    {
        let s = "\u{1F600}";
        let enc = encode(s);
        assert_eq!(enc.len(), 6);
        assert_eq!(decode(&enc), s);
        assert_eq!(utf16_len(s), 2);
    }

    #[test]
    fn lone_surrogate_is_escaped()
    {
        // 0xd83d encoded on its own, followed by 'x'
        let bytes = [0xed, 0xa0, 0xbd, b'x'];
        assert_eq!(decode(&bytes), "\\ud83dx");
    }

    #[test]
    fn escape_non_ascii_only_touches_non_ascii()
    {
        assert_eq!(escape_non_ascii("Lcom/a;"), "Lcom/a;");
        assert_eq!(escape_non_ascii("é"), "\\u00e9");
        assert_eq!(escape_non_ascii("\u{1F600}"), "\\ud83d\\ude00");
    }
}
