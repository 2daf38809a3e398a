//! Source handles, decoding and background supply.

pub(crate) mod backgrounds;
pub(crate) mod decode;
pub(crate) mod source;
