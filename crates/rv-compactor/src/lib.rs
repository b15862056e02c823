//! repovault compactor: shrinks repository snapshots for key-value storage.
//!
//! Layers:
//! 1. Preprocess: lossy whitespace/comment/quote normalization (opt-in)
//! 2. Dictionary: frequent tokens and repeated substrings → short codes
//! 3. Binary: JSON envelope, LZ4 then zlib at maximum level
//!
//! [`pipeline`] picks multi-stage or single-stage zlib by payload size and
//! [`storage_codec`] turns blobs into base64 text for storage.

pub mod layer1_preprocess;
pub mod layer2_dictionary;
pub mod layer3_binary;
pub mod pipeline;
pub mod storage_codec;

pub use layer2_dictionary::{Dictionary, DELIMITER};
pub use pipeline::{compress_auto, decompress_auto, CompressionPipeline, CompressionResult};
pub use storage_codec::{from_storable, to_storable};

#[cfg(test)]
mod tests;
