use crate::header::{Header, HeaderError, ReqType, HEADER_LEN};

/// A fully decoded frame: header plus its body bytes.
#[derive(Debug, Clone)]
pub struct Frame {
    pub header: Header,
    pub body: Vec<u8>,
}

/// Decode just the header portion of a frame. The caller is responsible for
/// then reading exactly `header.body_len` further bytes; the decoder never
/// reads past that.
pub fn decode_header(bytes: &[u8]) -> Result<Header, HeaderError> {
    Header::decode(bytes)
}

/// Build a request frame: `header || body`, with `req_type = req_res`.
pub fn encode_request(req_id: u64, func_id: u32, body: &[u8]) -> Vec<u8> {
    encode_frame(ReqType::ReqRes, req_id, func_id, body)
}

/// Build a response frame. `func_id` is unused on responses and set to zero.
pub fn encode_response(req_id: u64, req_type: ReqType, body: &[u8]) -> Vec<u8> {
    encode_frame(req_type, req_id, 0, body)
}

/// Build a publish frame: a response-shaped frame with `req_id = 0` and
/// `req_type = sub_pub`.
pub fn encode_publish(body: &[u8]) -> Vec<u8> {
    encode_frame(ReqType::SubPub, 0, 0, body)
}

fn encode_frame(req_type: ReqType, req_id: u64, func_id: u32, body: &[u8]) -> Vec<u8> {
    let header = Header::new(req_type, body.len() as u32, req_id, func_id);
    let mut out = Vec::with_capacity(HEADER_LEN + body.len());
    out.extend_from_slice(&header.encode());
    out.extend_from_slice(body);
    out
}
