use bytes::Buf;

use crate::error::WkbError;

/// Little-endian cursor that never reads past the end of its buffer.
#[derive(Debug, Clone)]
pub(crate) struct ByteReader<'a> {
    data: &'a [u8],
    offset: usize,
}

impl<'a> ByteReader<'a> {
    pub(crate) fn new(data: &'a [u8]) -> Self {
        Self { data, offset: 0 }
    }

    pub(crate) fn offset(&self) -> usize {
        self.offset
    }

    pub(crate) fn remaining(&self) -> usize {
        self.data.len() - self.offset
    }

    pub(crate) fn read_u32(&mut self) -> Result<u32, WkbError> {
        let mut chunk = self.take(4)?;
        Ok(chunk.get_u32_le())
    }

    pub(crate) fn read_f32(&mut self) -> Result<f32, WkbError> {
        let mut chunk = self.take(4)?;
        Ok(chunk.get_f32_le())
    }

    pub(crate) fn read_point(&mut self) -> Result<(f64, f64), WkbError> {
        let x = self.read_f32()?;
        let y = self.read_f32()?;
        Ok((x as f64, y as f64))
    }

    /// Reads a `u32` length field followed by that many bytes.
    pub(crate) fn read_sized(&mut self) -> Result<&'a [u8], WkbError> {
        let size = self.read_u32()? as usize;
        self.take(size)
    }

    pub(crate) fn take(&mut self, size: usize) -> Result<&'a [u8], WkbError> {
        if self.remaining() < size {
            return Err(WkbError::Truncated {
                offset: self.offset,
                needed: size,
                remaining: self.remaining(),
            });
        }

        let chunk = &self.data[self.offset..self.offset + size];
        self.offset += size;
        Ok(chunk)
    }

    /// Advances over `count` fixed-size items, checking that all of them are present.
    pub(crate) fn skip_items(&mut self, count: u32, item_size: usize) -> Result<(), WkbError> {
        let size = (count as usize).checked_mul(item_size).ok_or(WkbError::Truncated {
            offset: self.offset,
            needed: usize::MAX,
            remaining: self.remaining(),
        })?;
        self.take(size).map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    #[test]
    fn reads_little_endian() {
        let data = [1, 0, 0, 0, 0, 0, 128, 63];
        let mut reader = ByteReader::new(&data);
        assert_eq!(reader.read_u32(), Ok(1));
        assert_eq!(reader.read_f32(), Ok(1.0));
        assert_eq!(reader.remaining(), 0);
    }

    #[test]
    fn reports_truncation() {
        let data = [1, 0];
        let mut reader = ByteReader::new(&data);
        assert_matches!(
            reader.read_u32(),
            Err(WkbError::Truncated {
                offset: 0,
                needed: 4,
                remaining: 2
            })
        );
    }
}
