use facet::Facet;
use thiserror::Error;

/// Result code carried as the first element of every response body tuple.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Facet)]
#[repr(u16)]
pub enum ResultCode {
    Ok = 0,
    Fail = 1,
}

/// Errors from packing or unpacking a codec payload.
#[derive(Debug, Error)]
pub enum CodecError {
    #[error("failed to unpack arguments: {0}")]
    BadArguments(String),

    #[error("failed to unpack response body: {0}")]
    BadResponse(String),
}

/// The codec boundary: packs a heterogeneous argument list into a
/// self-describing byte buffer and unpacks it back, per `spec.md` §4.1.
///
/// Backed by `facet_postcard`; deterministic on `pack`, the exact inverse of
/// `pack` on well-formed input for `unpack`.
pub struct Codec;

impl Codec {
    /// Serialize a value (typically an argument tuple) to bytes.
    #[track_caller]
    pub fn pack<T: Facet<'static>>(value: &T) -> Vec<u8> {
        facet_postcard::to_vec(value)
            .unwrap_or_else(|e| panic!("failed to serialize to postcard: {e}"))
    }

    /// Deserialize bytes into `T`, failing with [`CodecError::BadArguments`]
    /// if the layout does not match.
    pub fn unpack<T: Facet<'static>>(bytes: &[u8]) -> Result<T, CodecError> {
        facet_postcard::from_slice(bytes).map_err(|e| CodecError::BadArguments(e.to_string()))
    }

    /// Pack a successful response body: `(OK, value)`.
    ///
    /// The value is nested as its own postcard-encoded byte string rather
    /// than inlined into the outer tuple, so the envelope shape —
    /// `(ResultCode, Vec<u8>)` — never depends on the success type. That
    /// lets a reader decode the envelope first and only then decode the
    /// inner bytes against whichever type the result code says it should
    /// be (`T` on `Ok`, `String` on `Fail`).
    pub fn pack_ok<T: Facet<'static>>(value: &T) -> Vec<u8> {
        Self::pack(&(ResultCode::Ok, Self::pack(value)))
    }

    /// Pack a `(OK, ())` response body for handlers that return nothing.
    pub fn pack_ok_unit() -> Vec<u8> {
        Self::pack_ok(&())
    }

    /// Pack a failure response body: `(FAIL, message)`.
    pub fn pack_fail(message: &str) -> Vec<u8> {
        Self::pack(&(ResultCode::Fail, Self::pack(&message.to_string())))
    }

    /// Unpack just the envelope: the result code and the still-packed inner
    /// bytes. Callers then use [`Self::unpack`] on `.1` against `T` (on
    /// `Ok`) or `String` (on `Fail`).
    pub fn unpack_envelope(bytes: &[u8]) -> Result<(ResultCode, Vec<u8>), CodecError> {
        facet_postcard::from_slice(bytes).map_err(|e| CodecError::BadResponse(e.to_string()))
    }

    /// Unpack a response body into `(ResultCode, T)`, decoding the inner
    /// bytes as `T` regardless of the code. Only meaningful when the caller
    /// already knows the code is `Ok` (or that `T = String` on `Fail`); use
    /// [`Self::unpack_envelope`] when the two cases carry different types.
    pub fn unpack_response<T: Facet<'static>>(bytes: &[u8]) -> Result<(ResultCode, T), CodecError> {
        let (code, inner) = Self::unpack_envelope(bytes)?;
        let value = Self::unpack(&inner).map_err(|e| CodecError::BadResponse(e.to_string()))?;
        Ok((code, value))
    }
}
