use thiserror::Error;

pub const KB: u64 = 1024;
pub const MB: u64 = 1024 * KB;
pub const GB: u64 = 1024 * MB;

/// Converts bytes to mebibytes for display, truncating.
pub fn bytes_to_mb(bytes: u64) -> u64 {
    bytes / MB
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ByteSizeError {
    #[error("byte size is empty")]
    Empty,
    #[error("invalid byte size number `{0}`")]
    InvalidNumber(String),
    #[error("unknown byte size unit `{0}`")]
    UnknownUnit(String),
    #[error("byte size overflows u64")]
    Overflow,
}

/// Parse a human-friendly byte size such as `50MiB`, `64 MB`, `1g` or `4096`.
///
/// Units are binary regardless of spelling (`MB` == `MiB`), matching how the
/// ceiling is reported.
pub fn parse_byte_size(input: &str) -> Result<u64, ByteSizeError> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Err(ByteSizeError::Empty);
    }

    let split = trimmed
        .find(|c: char| !c.is_ascii_digit() && c != '_')
        .unwrap_or(trimmed.len());
    let (number, unit) = trimmed.split_at(split);
    let number: String = number.chars().filter(|c| *c != '_').collect();
    if number.is_empty() {
        return Err(ByteSizeError::InvalidNumber(trimmed.to_owned()));
    }
    let value = number
        .parse::<u64>()
        .map_err(|_| ByteSizeError::InvalidNumber(number.clone()))?;

    let multiplier = match unit.trim().to_ascii_lowercase().as_str() {
        "" | "b" => 1,
        "k" | "kb" | "kib" => KB,
        "m" | "mb" | "mib" => MB,
        "g" | "gb" | "gib" => GB,
        other => return Err(ByteSizeError::UnknownUnit(other.to_owned())),
    };

    value.checked_mul(multiplier).ok_or(ByteSizeError::Overflow)
}
