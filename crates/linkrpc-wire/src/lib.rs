//! Wire-level types for linkrpc: the fixed header, frame encode/decode, and
//! the argument/result codec boundary.
//!
//! Nothing in this crate knows about sockets or handlers; it only turns
//! bytes into typed frames and back.

mod codec;
mod frame;
mod header;
mod limits;

pub use codec::{Codec, CodecError, ResultCode};
pub use frame::{decode_header, encode_publish, encode_request, encode_response, Frame};
pub use header::{Header, ReqType, HEADER_LEN, MAGIC};
pub use limits::MAX_BODY;
