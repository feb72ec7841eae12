use std::collections::BTreeMap;

use bytes::Bytes;

use super::error::BencodeError;
use super::value::Value;

const MAX_DEPTH: usize = 64;

/// Decodes a single bencode value.
///
/// The input must contain exactly one complete value; trailing bytes are an
/// error.
pub fn decode(data: &[u8]) -> Result<Value, BencodeError> {
    let mut parser = Parser { rest: data };
    let value = parser.value(0)?;
    if !parser.rest.is_empty() {
        return Err(BencodeError::TrailingData);
    }
    Ok(value)
}

/// A parser that consumes its input slice from the front.
struct Parser<'a> {
    rest: &'a [u8],
}

impl Parser<'_> {
    fn peek(&self) -> Result<u8, BencodeError> {
        self.rest.first().copied().ok_or(BencodeError::UnexpectedEof)
    }

    fn bump(&mut self) {
        self.rest = &self.rest[1..];
    }

    fn value(&mut self, depth: usize) -> Result<Value, BencodeError> {
        if depth > MAX_DEPTH {
            return Err(BencodeError::TooDeep);
        }
        match self.peek()? {
            b'i' => self.integer(),
            b'l' => self.list(depth),
            b'd' => self.dict(depth),
            b'0'..=b'9' => Ok(Value::Bytes(self.byte_string()?)),
            other => Err(BencodeError::UnexpectedByte(other)),
        }
    }

    fn integer(&mut self) -> Result<Value, BencodeError> {
        self.bump();
        let end = self
            .rest
            .iter()
            .position(|&b| b == b'e')
            .ok_or(BencodeError::UnexpectedEof)?;
        let digits = &self.rest[..end];
        self.rest = &self.rest[end + 1..];

        // "i-0e", "i03e" and friends are not canonical and are rejected.
        if digits.is_empty()
            || digits == b"-"
            || digits.starts_with(b"-0")
            || (digits[0] == b'0' && digits.len() > 1)
        {
            return Err(BencodeError::InvalidInteger);
        }
        std::str::from_utf8(digits)
            .ok()
            .and_then(|s| s.parse().ok())
            .map(Value::Integer)
            .ok_or(BencodeError::InvalidInteger)
    }

    fn byte_string(&mut self) -> Result<Bytes, BencodeError> {
        let colon = self
            .rest
            .iter()
            .position(|&b| b == b':')
            .ok_or(BencodeError::UnexpectedEof)?;
        let len: usize = std::str::from_utf8(&self.rest[..colon])
            .ok()
            .and_then(|s| s.parse().ok())
            .ok_or(BencodeError::InvalidLength)?;
        let body = &self.rest[colon + 1..];
        if body.len() < len {
            return Err(BencodeError::UnexpectedEof);
        }
        let bytes = Bytes::copy_from_slice(&body[..len]);
        self.rest = &body[len..];
        Ok(bytes)
    }

    fn list(&mut self, depth: usize) -> Result<Value, BencodeError> {
        self.bump();
        let mut items = Vec::new();
        while self.peek()? != b'e' {
            items.push(self.value(depth + 1)?);
        }
        self.bump();
        Ok(Value::List(items))
    }

    fn dict(&mut self, depth: usize) -> Result<Value, BencodeError> {
        self.bump();
        let mut entries = BTreeMap::new();
        while self.peek()? != b'e' {
            if !self.peek()?.is_ascii_digit() {
                return Err(BencodeError::InvalidKey);
            }
            let key = self.byte_string()?;
            let value = self.value(depth + 1)?;
            entries.insert(key, value);
        }
        self.bump();
        Ok(Value::Dict(entries))
    }
}
