//! Stored values and their encoding tag.
//!
//! A value that arrives as a double-quoted literal (for example the bulk
//! string `"line1\nline2"`, quotes included) is tagged [`ValueEncoding::Quoted`]
//! when it is written, and GET replies with its unescaped form. Everything
//! else, including text that merely starts with a quote, is kept verbatim.

use bytes::Bytes;

/// How the raw bytes of a value are interpreted on read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueEncoding {
    /// Returned exactly as stored
    Raw,
    /// A valid quoted literal, returned unescaped
    Quoted,
}

/// A value held in the store: the bytes as written plus their encoding tag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredValue {
    raw: Bytes,
    encoding: ValueEncoding,
}

impl StoredValue {
    /// Classifies `raw` and builds the value.
    pub fn new(raw: Bytes) -> Self {
        let encoding = if raw.first() == Some(&b'"') && unquote(&raw).is_some() {
            ValueEncoding::Quoted
        } else {
            ValueEncoding::Raw
        };
        Self { raw, encoding }
    }

    /// The bytes to send back on GET.
    pub fn decoded(&self) -> Bytes {
        match self.encoding {
            ValueEncoding::Raw => self.raw.clone(),
            ValueEncoding::Quoted => match unquote(&self.raw) {
                Some(decoded) => Bytes::from(decoded),
                None => self.raw.clone(),
            },
        }
    }
}

impl From<&str> for StoredValue {
    fn from(s: &str) -> Self {
        StoredValue::new(Bytes::copy_from_slice(s.as_bytes()))
    }
}

/// Unescapes a double-quoted literal.
///
/// Supports `\a \b \f \n \r \t \v \\ \"`, `\xHH`, three-digit octal
/// `\ooo`, `\uXXXX` and `\UXXXXXXXX`. Returns `None` if `input` is not
/// exactly one well-formed literal.
pub fn unquote(input: &[u8]) -> Option<Vec<u8>> {
    if input.len() < 2 || input[0] != b'"' || input[input.len() - 1] != b'"' {
        return None;
    }

    let body = &input[1..input.len() - 1];
    let mut out = Vec::with_capacity(body.len());
    let mut i = 0;

    while i < body.len() {
        let byte = body[i];
        match byte {
            b'"' | b'\n' => return None,
            b'\\' => {
                let escape = *body.get(i + 1)?;
                i += 2;
                match escape {
                    b'a' => out.push(0x07),
                    b'b' => out.push(0x08),
                    b'f' => out.push(0x0c),
                    b'n' => out.push(b'\n'),
                    b'r' => out.push(b'\r'),
                    b't' => out.push(b'\t'),
                    b'v' => out.push(0x0b),
                    b'\\' => out.push(b'\\'),
                    b'"' => out.push(b'"'),
                    b'x' => {
                        out.push(parse_radix(body.get(i..i + 2)?, 16)? as u8);
                        i += 2;
                    }
                    b'0'..=b'7' => {
                        let value = parse_radix(body.get(i - 1..i + 2)?, 8)?;
                        if value > 0xff {
                            return None;
                        }
                        out.push(value as u8);
                        i += 2;
                    }
                    b'u' | b'U' => {
                        let width = if escape == b'u' { 4 } else { 8 };
                        let code = parse_radix(body.get(i..i + width)?, 16)?;
                        let ch = char::from_u32(code)?;
                        let mut buf = [0u8; 4];
                        out.extend_from_slice(ch.encode_utf8(&mut buf).as_bytes());
                        i += width;
                    }
                    _ => return None,
                }
            }
            _ => {
                out.push(byte);
                i += 1;
            }
        }
    }

    Some(out)
}

fn parse_radix(digits: &[u8], radix: u32) -> Option<u32> {
    let text = std::str::from_utf8(digits).ok()?;
    if !text.chars().all(|c| c.is_digit(radix)) {
        return None;
    }
    u32::from_str_radix(text, radix).ok()
}
