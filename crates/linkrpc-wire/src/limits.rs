/// Maximum body length in bytes. Frames at or above this length are a fatal
/// framing error; see [`crate::decode_header`].
pub const MAX_BODY: u32 = 1024 * 1024 * 10;
