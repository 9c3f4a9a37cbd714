//! Reader for the length-prefixed, tag-keyed record encoding used inside note blobs.
//!
//! Every record starts with a varint key: the field tag in the upper bits and
//! a three-bit wire type in the lower bits. The wire type alone tells the
//! reader how far to advance, which is what lets callers skip tags they do
//! not recognise.

use crate::DecodeError;

/// Deepest group nesting accepted while skipping.
const MAX_GROUP_DEPTH: usize = 64;

/// How a record's payload is laid out on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WireType {
    Varint,
    Fixed64,
    LengthDelimited,
    StartGroup,
    EndGroup,
    Fixed32,
}

impl WireType {
    fn from_bits(field: u32, bits: u8) -> Result<Self, DecodeError> {
        match bits {
            0 => Ok(Self::Varint),
            1 => Ok(Self::Fixed64),
            2 => Ok(Self::LengthDelimited),
            3 => Ok(Self::StartGroup),
            4 => Ok(Self::EndGroup),
            5 => Ok(Self::Fixed32),
            _ => Err(DecodeError::UnknownRecordTag { field, wire_type: bits }),
        }
    }
}

/// Cursor over one message's worth of records.
pub struct WireReader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> WireReader<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    pub fn is_empty(&self) -> bool {
        self.pos >= self.buf.len()
    }

    /// Reads the next record key, or `None` at the end of the buffer.
    pub fn next_key(&mut self) -> Result<Option<(u32, WireType)>, DecodeError> {
        if self.is_empty() {
            return Ok(None);
        }
        let key = self.read_varint()?;
        let field = u32::try_from(key >> 3).map_err(|_| {
            DecodeError::CorruptStream(format!("record tag {} out of range", key >> 3))
        })?;
        if field == 0 {
            return Err(DecodeError::CorruptStream(format!(
                "record tag 0 at byte {}",
                self.pos
            )));
        }
        let wire_type = WireType::from_bits(field, (key & 0x7) as u8)?;
        Ok(Some((field, wire_type)))
    }

    pub fn read_varint(&mut self) -> Result<u64, DecodeError> {
        let mut value = 0u64;
        for shift in (0..64).step_by(7) {
            let byte = *self
                .buf
                .get(self.pos)
                .ok_or(DecodeError::TruncatedRecord { offset: self.pos })?;
            self.pos += 1;
            value |= u64::from(byte & 0x7f) << shift;
            if byte & 0x80 == 0 {
                return Ok(value);
            }
        }
        Err(DecodeError::CorruptStream(format!(
            "varint longer than ten bytes ending at byte {}",
            self.pos
        )))
    }

    /// Reads a length prefix and returns the payload it covers.
    pub fn read_bytes(&mut self) -> Result<&'a [u8], DecodeError> {
        let start = self.pos;
        let len = self.read_varint()?;
        let len = usize::try_from(len).map_err(|_| DecodeError::TruncatedRecord { offset: start })?;
        let end = self
            .pos
            .checked_add(len)
            .filter(|end| *end <= self.buf.len())
            .ok_or(DecodeError::TruncatedRecord { offset: start })?;
        let payload = &self.buf[self.pos..end];
        self.pos = end;
        Ok(payload)
    }

    /// Reads a length-delimited UTF-8 string.
    pub fn read_string(&mut self, field: u32) -> Result<String, DecodeError> {
        let start = self.pos;
        let bytes = self.read_bytes()?;
        String::from_utf8(bytes.to_vec()).map_err(|_| {
            DecodeError::CorruptStream(format!("invalid UTF-8 in field {field} at byte {start}"))
        })
    }

    /// Advances past a record of the given wire type without interpreting it.
    pub fn skip(&mut self, field: u32, wire_type: WireType) -> Result<(), DecodeError> {
        match wire_type {
            WireType::Varint => {
                self.read_varint()?;
            }
            WireType::Fixed64 => self.advance(8)?,
            WireType::Fixed32 => self.advance(4)?,
            WireType::LengthDelimited => {
                self.read_bytes()?;
            }
            WireType::StartGroup => self.skip_group(field)?,
            WireType::EndGroup => {
                return Err(DecodeError::CorruptStream(format!(
                    "unmatched end of group {field} at byte {}",
                    self.pos
                )))
            }
        }
        Ok(())
    }

    /// Skips to the end of the group opened by `field`, tracking nested
    /// groups on an explicit stack.
    fn skip_group(&mut self, field: u32) -> Result<(), DecodeError> {
        let mut open = vec![field];
        while let Some(&innermost) = open.last() {
            match self.next_key()? {
                Some((inner, WireType::EndGroup)) if inner == innermost => {
                    open.pop();
                }
                Some((inner, WireType::StartGroup)) => {
                    if open.len() >= MAX_GROUP_DEPTH {
                        return Err(DecodeError::CorruptStream(format!(
                            "groups nested deeper than {MAX_GROUP_DEPTH} at byte {}",
                            self.pos
                        )));
                    }
                    open.push(inner);
                }
                Some((inner, inner_type)) => self.skip(inner, inner_type)?,
                None => return Err(DecodeError::TruncatedRecord { offset: self.pos }),
            }
        }
        Ok(())
    }

    fn advance(&mut self, n: usize) -> Result<(), DecodeError> {
        if self.buf.len() - self.pos < n {
            return Err(DecodeError::TruncatedRecord { offset: self.pos });
        }
        self.pos += n;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_read_multibyte_varint() {
        let mut reader = WireReader::new(&[0xac, 0x02]);
        assert_eq!(reader.read_varint().unwrap(), 300);
        assert!(reader.is_empty());
    }

    #[test]
    fn test_truncated_varint() {
        let mut reader = WireReader::new(&[0x80, 0x80]);
        assert_eq!(
            reader.read_varint(),
            Err(DecodeError::TruncatedRecord { offset: 2 })
        );
    }

    #[test]
    fn test_overlong_varint_is_corrupt() {
        let mut reader = WireReader::new(&[0xff; 11]);
        assert!(matches!(reader.read_varint(), Err(DecodeError::CorruptStream(_))));
    }

    #[test]
    fn test_key_splits_field_and_wire_type() {
        // field 5, length-delimited
        let mut reader = WireReader::new(&[0x2a, 0x00]);
        assert_eq!(
            reader.next_key().unwrap(),
            Some((5, WireType::LengthDelimited))
        );
    }

    #[test]
    fn test_reserved_wire_type_is_unknown_record_tag() {
        // field 1, wire type 7
        let mut reader = WireReader::new(&[0x0f]);
        assert_eq!(
            reader.next_key(),
            Err(DecodeError::UnknownRecordTag { field: 1, wire_type: 7 })
        );
    }

    #[test]
    fn test_length_past_end_is_truncated() {
        let mut reader = WireReader::new(&[0x05, b'a', b'b']);
        assert_eq!(reader.read_bytes(), Err(DecodeError::TruncatedRecord { offset: 0 }));
    }

    #[test]
    fn test_skip_each_wire_type() {
        let buf = [
            0x08, 0x96, 0x01, // field 1 varint
            0x11, 1, 2, 3, 4, 5, 6, 7, 8, // field 2 fixed64
            0x1a, 0x02, b'h', b'i', // field 3 bytes
            0x23, 0x08, 0x01, 0x24, // field 4 group holding a varint
            0x2d, 1, 2, 3, 4, // field 5 fixed32
        ];
        let mut reader = WireReader::new(&buf);
        while let Some((field, wire_type)) = reader.next_key().unwrap() {
            reader.skip(field, wire_type).unwrap();
        }
        assert!(reader.is_empty());
    }

    #[test]
    fn test_skip_nested_groups_within_limit() {
        // field 1 groups nested ten deep, then closed
        let mut buf = vec![0x0b; 10];
        buf.extend(vec![0x0c; 10]);
        let mut reader = WireReader::new(&buf);
        let (field, wire_type) = reader.next_key().unwrap().unwrap();
        reader.skip(field, wire_type).unwrap();
        assert!(reader.is_empty());
    }

    #[test]
    fn test_deeply_nested_groups_are_corrupt() {
        let buf = vec![0x0b; 400_000];
        let mut reader = WireReader::new(&buf);
        let (field, wire_type) = reader.next_key().unwrap().unwrap();
        assert!(matches!(
            reader.skip(field, wire_type),
            Err(DecodeError::CorruptStream(_))
        ));
    }

    #[test]
    fn test_mismatched_end_group_is_corrupt() {
        // open field 1, close field 2
        let mut reader = WireReader::new(&[0x0b, 0x14]);
        let (field, wire_type) = reader.next_key().unwrap().unwrap();
        assert!(matches!(
            reader.skip(field, wire_type),
            Err(DecodeError::CorruptStream(_))
        ));
    }

    #[test]
    fn test_invalid_utf8_string_is_corrupt() {
        let mut reader = WireReader::new(&[0x02, 0xff, 0xfe]);
        assert!(matches!(reader.read_string(2), Err(DecodeError::CorruptStream(_))));
    }
}
