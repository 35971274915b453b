//! Request, response and callback packets, plus a little-endian payload reader.

use byteorder::{LittleEndian, ReadBytesExt};
use std::io::{Cursor, Read};

use super::constants::{DEVICE_ERROR_OK, MAX_PAYLOAD_LEN};
use crate::device::{Error, Result};

/// One outgoing request: function selector, payload and response-expected flag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    pub function_id: u8,
    pub payload: Vec<u8>,
    pub response_expected: bool,
}

impl Request {
    pub fn new(function_id: u8, payload: &[u8], response_expected: bool) -> Result<Self> {
        if payload.len() > MAX_PAYLOAD_LEN {
            return Err(Error::InvalidParameter(format!(
                "payload of {} bytes exceeds packet limit of {}",
                payload.len(),
                MAX_PAYLOAD_LEN
            )));
        }
        Ok(Self {
            function_id,
            payload: payload.to_vec(),
            response_expected,
        })
    }
}

/// A response as read from the receive buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    /// Device-reported error code, 0 on success.
    pub error_code: u8,
    pub payload: Vec<u8>,
}

impl Response {
    pub fn ok(payload: impl Into<Vec<u8>>) -> Self {
        Self {
            error_code: DEVICE_ERROR_OK,
            payload: payload.into(),
        }
    }

    pub fn error(error_code: u8) -> Self {
        Self {
            error_code,
            payload: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.payload.len()
    }

    pub fn is_empty(&self) -> bool {
        self.payload.is_empty()
    }
}

/// Unsolicited notification from a peripheral.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallbackPacket {
    pub function_id: u8,
    pub payload: Vec<u8>,
}

/// Sequential reader over a response payload.
///
/// Reads past the end surface as [`Error::WrongResponseLength`], never as a panic.
#[derive(Debug)]
pub struct PayloadReader<'a> {
    cursor: Cursor<&'a [u8]>,
    len: usize,
}

impl<'a> PayloadReader<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self {
            cursor: Cursor::new(data),
            len: data.len(),
        }
    }

    fn short(&self, wanted: usize) -> Error {
        Error::WrongResponseLength {
            expected: self.cursor.position() as usize + wanted,
            actual: self.len,
        }
    }

    pub fn remaining(&self) -> usize {
        self.len.saturating_sub(self.cursor.position() as usize)
    }

    pub fn read_u8(&mut self) -> Result<u8> {
        let err = self.short(1);
        self.cursor.read_u8().map_err(|_| err)
    }

    pub fn read_bool(&mut self) -> Result<bool> {
        Ok(self.read_u8()? != 0)
    }

    pub fn read_char(&mut self) -> Result<char> {
        Ok(self.read_u8()? as char)
    }

    pub fn read_u16(&mut self) -> Result<u16> {
        let err = self.short(2);
        self.cursor.read_u16::<LittleEndian>().map_err(|_| err)
    }

    pub fn read_u32(&mut self) -> Result<u32> {
        let err = self.short(4);
        self.cursor.read_u32::<LittleEndian>().map_err(|_| err)
    }

    pub fn read_i32(&mut self) -> Result<i32> {
        let err = self.short(4);
        self.cursor.read_i32::<LittleEndian>().map_err(|_| err)
    }

    pub fn read_f32(&mut self) -> Result<f32> {
        let err = self.short(4);
        self.cursor.read_f32::<LittleEndian>().map_err(|_| err)
    }

    pub fn read_array<const N: usize>(&mut self) -> Result<[u8; N]> {
        let err = self.short(N);
        let mut buf = [0u8; N];
        self.cursor.read_exact(&mut buf).map_err(|_| err)?;
        Ok(buf)
    }

    /// Read a fixed-width, NUL-padded string field.
    pub fn read_str<const N: usize>(&mut self) -> Result<String> {
        let raw = self.read_array::<N>()?;
        let end = raw.iter().position(|&b| b == 0).unwrap_or(N);
        Ok(String::from_utf8_lossy(&raw[..end]).into_owned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reader_little_endian() {
        let data = [0x34, 0x12, 0xFE, 0xFF, 0xFF, 0xFF, 1];
        let mut reader = PayloadReader::new(&data);
        assert_eq!(reader.read_u16().unwrap(), 0x1234);
        assert_eq!(reader.read_i32().unwrap(), -2);
        assert!(reader.read_bool().unwrap());
        assert_eq!(reader.remaining(), 0);
    }

    #[test]
    fn test_reader_short_payload() {
        let data = [1, 2];
        let mut reader = PayloadReader::new(&data);
        assert_eq!(
            reader.read_u32(),
            Err(Error::WrongResponseLength {
                expected: 4,
                actual: 2
            })
        );
    }

    #[test]
    fn test_reader_padded_string() {
        let data = *b"Tf3\0\0\0\0\0";
        let mut reader = PayloadReader::new(&data);
        assert_eq!(reader.read_str::<8>().unwrap(), "Tf3");
    }

    #[test]
    fn test_request_rejects_oversized_payload() {
        let payload = vec![0u8; MAX_PAYLOAD_LEN + 1];
        assert!(matches!(
            Request::new(1, &payload, true),
            Err(Error::InvalidParameter(_))
        ));
    }
}
