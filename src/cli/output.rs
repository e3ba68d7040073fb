//! Output formatting and file I/O for the operator tool.
//!
//! Results print as single lines with a sentinel prefix
//! (`ENCRYPT;success;…`) so external scripts can parse them.

use std::fs;
use std::path::Path;

/// Print a successful result line for the given command sentinel.
pub fn success(sentinel: &str, payload: &str) {
    println!("{sentinel};success;{payload}");
}

/// Write JSON data to a file with pretty formatting.
pub fn write_json<T: serde::Serialize>(
    path: &Path,
    data: &T,
) -> Result<(), Box<dyn std::error::Error>> {
    let json = serde_json::to_string_pretty(data)?;
    fs::write(path, json)?;
    Ok(())
}

/// Read and deserialize JSON from a file.
pub fn read_json<T: serde::de::DeserializeOwned>(
    path: &Path,
) -> Result<T, Box<dyn std::error::Error>> {
    let json = fs::read_to_string(path)?;
    let data = serde_json::from_str(&json)?;
    Ok(data)
}
