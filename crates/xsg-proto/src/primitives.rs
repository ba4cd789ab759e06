//! Field-level readers and writers shared by every packet layout.

use bytes::{Buf, BufMut};

use crate::error::DecodeError;

/// Bounds-checked cursor over a received buffer.
///
/// Every read reports [`DecodeError::Truncated`] instead of panicking on a
/// short buffer.
#[derive(Debug)]
pub struct Reader<'a> {
    buf: &'a [u8],
}

impl<'a> Reader<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf }
    }

    pub fn remaining(&self) -> usize {
        self.buf.remaining()
    }

    fn ensure(&self, needed: usize) -> Result<(), DecodeError> {
        if self.buf.remaining() < needed {
            return Err(DecodeError::Truncated {
                needed,
                remaining: self.buf.remaining(),
            });
        }
        Ok(())
    }

    pub fn u8(&mut self) -> Result<u8, DecodeError> {
        self.ensure(1)?;
        Ok(self.buf.get_u8())
    }

    pub fn u16(&mut self) -> Result<u16, DecodeError> {
        self.ensure(2)?;
        Ok(self.buf.get_u16())
    }

    pub fn u32(&mut self) -> Result<u32, DecodeError> {
        self.ensure(4)?;
        Ok(self.buf.get_u32())
    }

    pub fn u64(&mut self) -> Result<u64, DecodeError> {
        self.ensure(8)?;
        Ok(self.buf.get_u64())
    }

    pub fn f32(&mut self) -> Result<f32, DecodeError> {
        self.ensure(4)?;
        Ok(self.buf.get_f32())
    }

    pub fn bytes(&mut self, len: usize) -> Result<&'a [u8], DecodeError> {
        self.ensure(len)?;
        let (head, tail) = self.buf.split_at(len);
        self.buf = tail;
        Ok(head)
    }

    pub fn array16(&mut self) -> Result<[u8; 16], DecodeError> {
        let mut out = [0u8; 16];
        out.copy_from_slice(self.bytes(16)?);
        Ok(out)
    }

    /// u16-length-prefixed UTF-8 string followed by a NUL terminator.
    pub fn sgstring(&mut self, field: &'static str) -> Result<String, DecodeError> {
        let len = self.u16()? as usize;
        let raw = self.bytes(len)?;
        if self.u8()? != 0 {
            return Err(DecodeError::malformed(field, "missing string terminator"));
        }
        String::from_utf8(raw.to_vec()).map_err(|_| DecodeError::malformed(field, "invalid utf-8"))
    }

    pub fn prefixed_bytes(&mut self) -> Result<Vec<u8>, DecodeError> {
        let len = self.u16()? as usize;
        Ok(self.bytes(len)?.to_vec())
    }

    /// u32-count-prefixed list of u32 values.
    pub fn u32_list(&mut self) -> Result<Vec<u32>, DecodeError> {
        let count = self.u32()? as usize;
        // Each entry takes 4 bytes; reject counts the buffer can't hold.
        self.ensure(count.saturating_mul(4))?;
        (0..count).map(|_| self.u32()).collect()
    }

    pub fn rest(&mut self) -> &'a [u8] {
        let rest = self.buf;
        self.buf = &[];
        rest
    }
}

/// Writes a u16 length or count, rejecting values the prefix can't carry.
pub fn put_len16(out: &mut Vec<u8>, field: &'static str, len: usize) -> Result<(), DecodeError> {
    let len = u16::try_from(len).map_err(|_| DecodeError::malformed(field, "length exceeds 65535"))?;
    out.put_u16(len);
    Ok(())
}

pub fn put_sgstring(out: &mut Vec<u8>, value: &str) -> Result<(), DecodeError> {
    put_len16(out, "string", value.len())?;
    out.extend_from_slice(value.as_bytes());
    out.put_u8(0);
    Ok(())
}

pub fn put_prefixed_bytes(out: &mut Vec<u8>, value: &[u8]) -> Result<(), DecodeError> {
    put_len16(out, "bytes", value.len())?;
    out.extend_from_slice(value);
    Ok(())
}

pub fn put_u32_list(out: &mut Vec<u8>, values: &[u32]) {
    out.put_u32(values.len() as u32);
    for v in values {
        out.put_u32(*v);
    }
}
