//! Audio loading pipeline: source retrieval, decoding, and the decoded
//! clip type.

pub mod decode;
pub mod fetch;
pub mod types;
