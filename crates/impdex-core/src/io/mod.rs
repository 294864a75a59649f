//! IO modules - side effects (network, archive decoding)

pub mod codec;
pub mod fetch;
