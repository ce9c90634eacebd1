//! The subset of XDR (RFC 4506) that libvirt's remote protocol needs.

use crate::utils::error::{JugglerError, Result};

fn padding(len: usize) -> usize {
    (4 - len % 4) % 4
}

#[derive(Debug, Default)]
pub struct XdrWriter {
    buf: Vec<u8>,
}

impl XdrWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put_u32(&mut self, value: u32) -> &mut Self {
        self.buf.extend_from_slice(&value.to_be_bytes());
        self
    }

    pub fn put_i32(&mut self, value: i32) -> &mut Self {
        self.buf.extend_from_slice(&value.to_be_bytes());
        self
    }

    pub fn put_u64(&mut self, value: u64) -> &mut Self {
        self.buf.extend_from_slice(&value.to_be_bytes());
        self
    }

    pub fn put_bool(&mut self, value: bool) -> &mut Self {
        self.put_u32(u32::from(value))
    }

    /// Fixed-length opaque data: no length prefix, padded to 4 bytes.
    pub fn put_fixed_opaque(&mut self, bytes: &[u8]) -> &mut Self {
        self.buf.extend_from_slice(bytes);
        self.buf.resize(self.buf.len() + padding(bytes.len()), 0);
        self
    }

    pub fn put_string(&mut self, value: &str) -> &mut Self {
        self.put_u32(value.len() as u32);
        self.put_fixed_opaque(value.as_bytes())
    }

    /// An optional string, encoded as a zero- or one-element array.
    pub fn put_opt_string(&mut self, value: Option<&str>) -> &mut Self {
        match value {
            Some(value) => self.put_bool(true).put_string(value),
            None => self.put_bool(false),
        }
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.buf
    }
}

#[derive(Debug)]
pub struct XdrReader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> XdrReader<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    pub fn remaining(&self) -> &'a [u8] {
        &self.buf[self.pos..]
    }

    fn take(&mut self, len: usize) -> Result<&'a [u8]> {
        let end = self
            .pos
            .checked_add(len)
            .filter(|end| *end <= self.buf.len())
            .ok_or_else(|| JugglerError::Protocol {
                message: format!(
                    "truncated message: wanted {} bytes at offset {}, have {}",
                    len,
                    self.pos,
                    self.buf.len()
                ),
            })?;
        let bytes = &self.buf[self.pos..end];
        self.pos = end;
        Ok(bytes)
    }

    fn word(&mut self) -> Result<[u8; 4]> {
        let bytes = self.take(4)?;
        Ok([bytes[0], bytes[1], bytes[2], bytes[3]])
    }

    pub fn get_u32(&mut self) -> Result<u32> {
        Ok(u32::from_be_bytes(self.word()?))
    }

    pub fn get_i32(&mut self) -> Result<i32> {
        Ok(i32::from_be_bytes(self.word()?))
    }

    pub fn get_u64(&mut self) -> Result<u64> {
        let high = u64::from(self.get_u32()?);
        let low = u64::from(self.get_u32()?);
        Ok(high << 32 | low)
    }

    pub fn get_bool(&mut self) -> Result<bool> {
        match self.get_u32()? {
            0 => Ok(false),
            1 => Ok(true),
            other => Err(JugglerError::Protocol {
                message: format!("invalid boolean {}", other),
            }),
        }
    }

    pub fn get_fixed_opaque(&mut self, len: usize) -> Result<&'a [u8]> {
        let bytes = self.take(len)?;
        self.take(padding(len))?;
        Ok(bytes)
    }

    pub fn get_string(&mut self) -> Result<String> {
        let len = self.get_u32()? as usize;
        let bytes = self.get_fixed_opaque(len)?;
        String::from_utf8(bytes.to_vec()).map_err(|e| JugglerError::Protocol {
            message: format!("string is not valid utf-8: {}", e),
        })
    }

    pub fn get_opt_string(&mut self) -> Result<Option<String>> {
        if self.get_bool()? {
            self.get_string().map(Some)
        } else {
            Ok(None)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_string_is_length_prefixed_and_padded() {
        let mut writer = XdrWriter::new();
        writer.put_string("vm1");
        assert_eq!(writer.into_bytes(), vec![0, 0, 0, 3, b'v', b'm', b'1', 0]);
    }

    #[test]
    fn test_reads_mixed_fields() {
        let mut writer = XdrWriter::new();
        writer
            .put_i32(-1)
            .put_opt_string(Some("hello"))
            .put_opt_string(None)
            .put_u64(10_002_000);
        let bytes = writer.into_bytes();

        let mut reader = XdrReader::new(&bytes);
        assert_eq!(reader.get_i32().unwrap(), -1);
        assert_eq!(reader.get_opt_string().unwrap().as_deref(), Some("hello"));
        assert_eq!(reader.get_opt_string().unwrap(), None);
        assert_eq!(reader.get_u64().unwrap(), 10_002_000);
        assert!(reader.remaining().is_empty());
    }

    #[test]
    fn test_truncated_input_is_a_protocol_error() {
        let bytes = [0, 0, 0, 9, b'a', b'b'];
        let mut reader = XdrReader::new(&bytes);
        assert!(matches!(
            reader.get_string(),
            Err(JugglerError::Protocol { .. })
        ));
    }
}
