//! Opaque chip state blobs.
//!
//! A blob carries a four-byte tag naming the chip kind, a layout version,
//! and a payload only the owning chip understands. The framing written by
//! [`ChipState::write_to`] is:
//!
//! | Bytes | Field                        |
//! |-------|------------------------------|
//! | 4     | tag                          |
//! | 1     | version                      |
//! | 4     | payload length (u32, LE)     |
//! | n     | payload                      |

use std::io::{self, Read, Write};

use crate::StateError;

/// Largest payload accepted when reading a blob back (16 MiB).
pub const MAX_STATE_LEN: usize = 16 * 1024 * 1024;

/// A captured chip state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChipState {
    tag: [u8; 4],
    version: u8,
    data: Vec<u8>,
}

impl ChipState {
    #[must_use]
    pub fn new(tag: [u8; 4], version: u8, data: Vec<u8>) -> Self {
        Self { tag, version, data }
    }

    #[must_use]
    pub fn tag(&self) -> [u8; 4] {
        self.tag
    }

    #[must_use]
    pub fn version(&self) -> u8 {
        self.version
    }

    #[must_use]
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Check tag and version, returning a reader over the payload.
    pub fn expect(&self, tag: [u8; 4], version: u8) -> Result<StateReader<'_>, StateError> {
        if self.tag != tag {
            return Err(StateError::TagMismatch {
                expected: tag,
                found: self.tag,
            });
        }
        if self.version != version {
            return Err(StateError::VersionMismatch {
                expected: version,
                found: self.version,
            });
        }
        Ok(StateReader::new(&self.data))
    }

    /// Write the framed blob.
    pub fn write_to<W: Write>(&self, w: &mut W) -> io::Result<()> {
        let len = u32::try_from(self.data.len())
            .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "state blob too large"))?;
        w.write_all(&self.tag)?;
        w.write_all(&[self.version])?;
        w.write_all(&len.to_le_bytes())?;
        w.write_all(&self.data)
    }

    /// Read a framed blob.
    ///
    /// A short read surfaces as `UnexpectedEof`; an implausible length as
    /// `InvalidData`.
    pub fn read_from<R: Read>(r: &mut R) -> io::Result<Self> {
        let mut tag = [0u8; 4];
        r.read_exact(&mut tag)?;
        let mut version = [0u8; 1];
        r.read_exact(&mut version)?;
        let mut len = [0u8; 4];
        r.read_exact(&mut len)?;
        let len = u32::from_le_bytes(len) as usize;
        if len > MAX_STATE_LEN {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("state blob length {len} exceeds limit"),
            ));
        }
        let mut data = vec![0u8; len];
        r.read_exact(&mut data)?;
        Ok(Self {
            tag,
            version: version[0],
            data,
        })
    }
}

/// Little-endian payload builder.
#[derive(Debug, Default)]
pub struct StateWriter {
    buf: Vec<u8>,
}

impl StateWriter {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn u8(&mut self, v: u8) -> &mut Self {
        self.buf.push(v);
        self
    }

    pub fn bool(&mut self, v: bool) -> &mut Self {
        self.u8(u8::from(v))
    }

    pub fn u16(&mut self, v: u16) -> &mut Self {
        self.buf.extend_from_slice(&v.to_le_bytes());
        self
    }

    pub fn u32(&mut self, v: u32) -> &mut Self {
        self.buf.extend_from_slice(&v.to_le_bytes());
        self
    }

    pub fn u64(&mut self, v: u64) -> &mut Self {
        self.buf.extend_from_slice(&v.to_le_bytes());
        self
    }

    /// Finish into a tagged blob.
    #[must_use]
    pub fn finish(self, tag: [u8; 4], version: u8) -> ChipState {
        ChipState::new(tag, version, self.buf)
    }
}

/// Little-endian payload cursor. Every getter fails with
/// [`StateError::Truncated`] past the end.
#[derive(Debug)]
pub struct StateReader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> StateReader<'a> {
    #[must_use]
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8], StateError> {
        let end = self.pos.checked_add(n).ok_or(StateError::Truncated)?;
        let slice = self.data.get(self.pos..end).ok_or(StateError::Truncated)?;
        self.pos = end;
        Ok(slice)
    }

    fn array<const N: usize>(&mut self) -> Result<[u8; N], StateError> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.take(N)?);
        Ok(out)
    }

    pub fn u8(&mut self) -> Result<u8, StateError> {
        Ok(self.take(1)?[0])
    }

    pub fn bool(&mut self) -> Result<bool, StateError> {
        match self.u8()? {
            0 => Ok(false),
            1 => Ok(true),
            other => Err(StateError::Malformed(format!("invalid bool byte {other}"))),
        }
    }

    pub fn u16(&mut self) -> Result<u16, StateError> {
        Ok(u16::from_le_bytes(self.array()?))
    }

    pub fn u32(&mut self) -> Result<u32, StateError> {
        Ok(u32::from_le_bytes(self.array()?))
    }

    pub fn u64(&mut self) -> Result<u64, StateError> {
        Ok(u64::from_le_bytes(self.array()?))
    }

    /// Bytes not yet consumed.
    #[must_use]
    pub fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }
}
