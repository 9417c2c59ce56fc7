use thiserror::Error;

use crate::limits::MAX_BODY;

/// Fixed wire magic byte. Any header not starting with this value is a fatal
/// framing error.
pub const MAGIC: u8 = 0x27;

/// Size of the fixed header in bytes: magic(1) + req_type(1) + body_len(4) +
/// req_id(8) + func_id(4).
pub const HEADER_LEN: usize = 20;

/// Request kind carried in the header. `SubPub` is used both for
/// subscribe-from-client and publish-delivery-from-server frames.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ReqType {
    ReqRes = 0,
    SubPub = 1,
}

impl ReqType {
    fn from_u8(byte: u8) -> Result<Self, HeaderError> {
        match byte {
            0 => Ok(ReqType::ReqRes),
            1 => Ok(ReqType::SubPub),
            other => Err(HeaderError::BadReqType(other)),
        }
    }
}

/// Errors decoding a fixed header. All are fatal: the connection must close
/// without dispatching anything.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum HeaderError {
    #[error("bad magic byte: expected {MAGIC:#04x}, got {0:#04x}")]
    BadMagic(u8),

    #[error("bad request type byte: {0}")]
    BadReqType(u8),

    #[error("body length {0} at or above MAX_BODY ({MAX_BODY})")]
    BadBodyLen(u32),

    #[error("buffer too short to hold a header: need {HEADER_LEN} bytes, got {0}")]
    Truncated(usize),
}

/// The fixed 20-byte wire header, decoded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    pub req_type: ReqType,
    pub body_len: u32,
    pub req_id: u64,
    pub func_id: u32,
}

impl Header {
    pub fn new(req_type: ReqType, body_len: u32, req_id: u64, func_id: u32) -> Self {
        Self {
            req_type,
            body_len,
            req_id,
            func_id,
        }
    }

    /// Returns `true` for a zero-body heartbeat frame.
    pub fn is_heartbeat(&self) -> bool {
        self.body_len == 0
    }

    /// Encode this header into its 20-byte little-endian wire form.
    pub fn encode(&self) -> [u8; HEADER_LEN] {
        let mut buf = [0u8; HEADER_LEN];
        buf[0] = MAGIC;
        buf[1] = self.req_type as u8;
        buf[2..6].copy_from_slice(&self.body_len.to_le_bytes());
        buf[6..14].copy_from_slice(&self.req_id.to_le_bytes());
        buf[14..18].copy_from_slice(&self.func_id.to_le_bytes());
        // bytes 18..20 reserved/padding, kept zeroed.
        buf
    }

    /// Decode a header from exactly [`HEADER_LEN`] bytes.
    ///
    /// Fails with [`HeaderError::BadMagic`] or [`HeaderError::BadBodyLen`] on
    /// malformed input, per the wire-format invariants.
    pub fn decode(bytes: &[u8]) -> Result<Self, HeaderError> {
        if bytes.len() < HEADER_LEN {
            return Err(HeaderError::Truncated(bytes.len()));
        }

        if bytes[0] != MAGIC {
            return Err(HeaderError::BadMagic(bytes[0]));
        }

        let req_type = ReqType::from_u8(bytes[1])?;
        let body_len = u32::from_le_bytes(bytes[2..6].try_into().unwrap());
        if body_len >= MAX_BODY {
            return Err(HeaderError::BadBodyLen(body_len));
        }
        let req_id = u64::from_le_bytes(bytes[6..14].try_into().unwrap());
        let func_id = u32::from_le_bytes(bytes[14..18].try_into().unwrap());

        Ok(Header {
            req_type,
            body_len,
            req_id,
            func_id,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips() {
        let h = Header::new(ReqType::ReqRes, 128, 0xdead_beef_0000_1234, 0x0102_0304);
        let bytes = h.encode();
        let decoded = Header::decode(&bytes).unwrap();
        assert_eq!(h, decoded);
    }

    #[test]
    fn heartbeat_is_zero_body() {
        let h = Header::new(ReqType::ReqRes, 0, 1, 0);
        assert!(h.is_heartbeat());
    }

    #[test]
    fn rejects_bad_magic() {
        let mut bytes = Header::new(ReqType::ReqRes, 0, 0, 0).encode();
        bytes[0] = 0x00;
        assert_eq!(Header::decode(&bytes), Err(HeaderError::BadMagic(0x00)));
    }

    #[test]
    fn rejects_oversized_body() {
        let bytes = Header::new(ReqType::ReqRes, MAX_BODY, 0, 0).encode();
        assert_eq!(
            Header::decode(&bytes),
            Err(HeaderError::BadBodyLen(MAX_BODY))
        );
    }

    #[test]
    fn rejects_truncated_buffer() {
        let bytes = Header::new(ReqType::ReqRes, 0, 0, 0).encode();
        assert_eq!(
            Header::decode(&bytes[..HEADER_LEN - 1]),
            Err(HeaderError::Truncated(HEADER_LEN - 1))
        );
    }

    proptest::proptest! {
        #[test]
        fn header_round_trip_prop(
            req_is_sub in proptest::bool::ANY,
            body_len in 0u32..MAX_BODY,
            req_id in proptest::num::u64::ANY,
            func_id in proptest::num::u32::ANY,
        ) {
            let req_type = if req_is_sub { ReqType::SubPub } else { ReqType::ReqRes };
            let h = Header::new(req_type, body_len, req_id, func_id);
            let bytes = h.encode();
            let decoded = Header::decode(&bytes).unwrap();
            proptest::prop_assert_eq!(h, decoded);
        }
    }
}
