//! Bounded, early-stopping lookup of one top-level field in a JSON object.
//!
//! The scanner never materializes the document. Skipped values are walked
//! structurally with a depth counter and skipped strings are never copied.

use std::io::{self, Read};

/// Default bound on how much of a body is examined
pub const DEFAULT_MAX_SCAN_BYTES: u64 = 1024 * 1024;

const CHUNK_SIZE: usize = 8 * 1024;

#[derive(Debug)]
enum ScanError {
    Eof,
    Syntax,
    LimitExceeded,
    Io(io::Error),
}

type ScanResult<T> = Result<T, ScanError>;

/// Find `field` among the top-level keys of the JSON object in `reader`.
///
/// Strings come back verbatim, integers as written, other numbers in plain
/// decimal form and booleans as `true`/`false`. Null, nested values, a
/// non-object document, malformed input and input longer than `max_bytes`
/// all yield `None`.
pub fn scan<R: Read>(reader: R, field: &str, max_bytes: u64) -> Option<String> {
    let mut scanner = Scanner::new(reader, max_bytes);
    match scanner.find_field(field) {
        Ok(value) => value,
        Err(ScanError::Io(e)) => {
            tracing::debug!(error = %e, "response code scan aborted");
            None
        }
        Err(_) => None,
    }
}

pub fn scan_slice(bytes: &[u8], field: &str, max_bytes: u64) -> Option<String> {
    scan(bytes, field, max_bytes)
}

struct Scanner<R> {
    reader: io::Take<R>,
    buf: Box<[u8; CHUNK_SIZE]>,
    pos: usize,
    len: usize,
    /// Bytes still allowed before the limit trips
    remaining: u64,
    limit_hit: bool,
}

impl<R: Read> Scanner<R> {
    fn new(reader: R, max_bytes: u64) -> Self {
        Self {
            reader: reader.take(max_bytes.saturating_add(1)),
            buf: Box::new([0; CHUNK_SIZE]),
            pos: 0,
            len: 0,
            remaining: max_bytes,
            limit_hit: false,
        }
    }

    fn fill(&mut self) -> ScanResult<()> {
        if self.limit_hit {
            return Err(ScanError::LimitExceeded);
        }
        let read = loop {
            match self.reader.read(&mut self.buf[..]) {
                Ok(n) => break n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
                Err(e) => return Err(ScanError::Io(e)),
            }
        };
        if read == 0 {
            return Err(ScanError::Eof);
        }

        let mut usable = read;
        if read as u64 > self.remaining {
            usable = self.remaining as usize;
            self.limit_hit = true;
        }
        self.remaining -= usable as u64;
        self.pos = 0;
        self.len = usable;
        if usable == 0 {
            return Err(ScanError::LimitExceeded);
        }
        Ok(())
    }

    fn peek(&mut self) -> ScanResult<u8> {
        if self.pos == self.len {
            self.fill()?;
        }
        Ok(self.buf[self.pos])
    }

    fn next(&mut self) -> ScanResult<u8> {
        let byte = self.peek()?;
        self.pos += 1;
        Ok(byte)
    }

    fn skip_whitespace(&mut self) -> ScanResult<()> {
        while matches!(self.peek()?, b' ' | b'\t' | b'\n' | b'\r') {
            self.pos += 1;
        }
        Ok(())
    }

    fn expect(&mut self, expected: u8) -> ScanResult<()> {
        if self.next()? == expected {
            Ok(())
        } else {
            Err(ScanError::Syntax)
        }
    }

    fn expect_literal(&mut self, rest: &[u8]) -> ScanResult<()> {
        for &byte in rest {
            self.expect(byte)?;
        }
        Ok(())
    }

    fn find_field(&mut self, field: &str) -> ScanResult<Option<String>> {
        self.skip_whitespace()?;
        if self.next()? != b'{' {
            return Ok(None);
        }
        self.skip_whitespace()?;
        if self.peek()? == b'}' {
            return Ok(None);
        }

        loop {
            self.skip_whitespace()?;
            self.expect(b'"')?;
            let key = self.read_string()?;
            self.skip_whitespace()?;
            self.expect(b':')?;
            self.skip_whitespace()?;

            if key == field {
                return self.read_scalar();
            }
            self.skip_value()?;

            self.skip_whitespace()?;
            match self.next()? {
                b',' => {}
                b'}' => return Ok(None),
                _ => return Err(ScanError::Syntax),
            }
        }
    }

    fn read_scalar(&mut self) -> ScanResult<Option<String>> {
        match self.peek()? {
            b'"' => {
                self.pos += 1;
                self.read_string().map(Some)
            }
            b'-' | b'0'..=b'9' => {
                let literal = self.read_number()?;
                Ok(Some(normalize_number(&literal)?))
            }
            b't' => {
                self.pos += 1;
                self.expect_literal(b"rue")?;
                Ok(Some("true".to_string()))
            }
            b'f' => {
                self.pos += 1;
                self.expect_literal(b"alse")?;
                Ok(Some("false".to_string()))
            }
            b'n' => {
                self.pos += 1;
                self.expect_literal(b"ull")?;
                Ok(None)
            }
            b'{' | b'[' => Ok(None),
            _ => Err(ScanError::Syntax),
        }
    }

    fn read_number(&mut self) -> ScanResult<String> {
        let mut literal = String::new();
        loop {
            match self.peek() {
                Ok(byte @ (b'0'..=b'9' | b'-' | b'+' | b'.' | b'e' | b'E')) => {
                    literal.push(byte as char);
                    self.pos += 1;
                }
                Ok(_) | Err(ScanError::Eof) => return Ok(literal),
                Err(e) => return Err(e),
            }
        }
    }

    fn skip_number(&mut self) -> ScanResult<()> {
        loop {
            match self.peek() {
                Ok(b'0'..=b'9' | b'-' | b'+' | b'.' | b'e' | b'E') => self.pos += 1,
                Ok(_) | Err(ScanError::Eof) => return Ok(()),
                Err(e) => return Err(e),
            }
        }
    }

    /// Skip one complete value without recursion
    fn skip_value(&mut self) -> ScanResult<()> {
        let mut depth = 0usize;
        loop {
            self.skip_whitespace()?;
            match self.next()? {
                b'{' | b'[' => depth += 1,
                b'}' | b']' => {
                    depth = depth.checked_sub(1).ok_or(ScanError::Syntax)?;
                }
                b'"' => self.skip_string()?,
                b',' | b':' if depth > 0 => {}
                b't' => self.expect_literal(b"rue")?,
                b'f' => self.expect_literal(b"alse")?,
                b'n' => self.expect_literal(b"ull")?,
                b'-' | b'0'..=b'9' => self.skip_number()?,
                _ => return Err(ScanError::Syntax),
            }
            if depth == 0 {
                return Ok(());
            }
        }
    }

    fn skip_string(&mut self) -> ScanResult<()> {
        loop {
            match self.next()? {
                b'"' => return Ok(()),
                b'\\' => match self.next()? {
                    b'"' | b'\\' | b'/' | b'b' | b'f' | b'n' | b'r' | b't' => {}
                    b'u' => {
                        self.read_hex4()?;
                    }
                    _ => return Err(ScanError::Syntax),
                },
                0x00..=0x1f => return Err(ScanError::Syntax),
                _ => {}
            }
        }
    }

    /// Read the rest of a string whose opening quote was consumed
    fn read_string(&mut self) -> ScanResult<String> {
        let mut out = Vec::new();
        loop {
            match self.next()? {
                b'"' => break,
                b'\\' => {
                    let unescaped = match self.next()? {
                        b'"' => '"',
                        b'\\' => '\\',
                        b'/' => '/',
                        b'b' => '\u{8}',
                        b'f' => '\u{c}',
                        b'n' => '\n',
                        b'r' => '\r',
                        b't' => '\t',
                        b'u' => self.read_unicode_escape()?,
                        _ => return Err(ScanError::Syntax),
                    };
                    let mut utf8 = [0u8; 4];
                    out.extend_from_slice(unescaped.encode_utf8(&mut utf8).as_bytes());
                }
                0x00..=0x1f => return Err(ScanError::Syntax),
                byte => out.push(byte),
            }
        }
        String::from_utf8(out).map_err(|_| ScanError::Syntax)
    }

    fn read_unicode_escape(&mut self) -> ScanResult<char> {
        let first = self.read_hex4()?;
        let code = match first {
            0xD800..=0xDBFF => {
                self.expect(b'\\')?;
                self.expect(b'u')?;
                let second = self.read_hex4()?;
                if !(0xDC00..=0xDFFF).contains(&second) {
                    return Err(ScanError::Syntax);
                }
                0x10000 + ((first - 0xD800) << 10) + (second - 0xDC00)
            }
            0xDC00..=0xDFFF => return Err(ScanError::Syntax),
            _ => first,
        };
        char::from_u32(code).ok_or(ScanError::Syntax)
    }

    fn read_hex4(&mut self) -> ScanResult<u32> {
        let mut value = 0u32;
        for _ in 0..4 {
            let digit = (self.next()? as char).to_digit(16).ok_or(ScanError::Syntax)?;
            value = (value << 4) | digit;
        }
        Ok(value)
    }
}

/// Integers stay as written; other numbers are rendered without an exponent
fn normalize_number(literal: &str) -> ScanResult<String> {
    let digits = literal.strip_prefix('-').unwrap_or(literal);
    if !digits.is_empty() && digits.bytes().all(|b| b.is_ascii_digit()) {
        return Ok(literal.to_string());
    }
    let value: f64 = literal.parse().map_err(|_| ScanError::Syntax)?;
    if !value.is_finite() {
        return Err(ScanError::Syntax);
    }
    Ok(format!("{}", value))
}
