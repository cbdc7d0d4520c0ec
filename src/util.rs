use anyhow::Result;
use chrono::Local;
use fern::Dispatch;
use num_bigint_dig::BigUint;
use sha2::{Digest, Sha256};
use std::path::Path;

/// Hex SHA-256 digest of the given bytes.
pub fn sha256_hex(data: &[u8]) -> String {
    hex::encode(Sha256::digest(data))
}

/// Big-endian encoding of `value`, left-padded with zeros to `len` bytes.
///
/// A 2048-bit modulus yields at most 256 bytes; shorter values are padded so
/// signatures always travel at the fixed wire length.
pub fn to_fixed_be_bytes(value: &BigUint, len: usize) -> Vec<u8> {
    let bytes = value.to_bytes_be();
    if bytes.len() >= len {
        return bytes;
    }
    let mut padded = vec![0u8; len - bytes.len()];
    padded.extend_from_slice(&bytes);
    padded
}

/// Initialize logger function
pub fn setup_logger<P: AsRef<Path>>(level: log::LevelFilter, log_file_path: P) -> Result<()> {
    Dispatch::new()
        .format(|out, message, record| {
            out.finish(format_args!(
                "[{}] [{}] - {}",
                Local::now().format("%Y-%m-%d %H:%M:%S"),
                record.level(),
                message
            ))
        })
        .level(level)
        .chain(fern::log_file(log_file_path)?)
        .apply()?;
    Ok(())
}
