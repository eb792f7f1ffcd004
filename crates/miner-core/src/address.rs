//! Payout address validation.
//!
//! Addresses are the network's bech32-style strings: the `kaspa:`
//! prefix followed by a payload in the bech32 alphabet. Validation
//! here is a configuration-time sanity check for payout strings; the
//! node performs full checksum verification when it builds the
//! coinbase output.

use thiserror::Error;

/// Required address prefix, including the separator.
pub const ADDRESS_PREFIX: &str = "kaspa:";

/// Accepted payload lengths (schnorr, ecdsa and script-hash payloads).
const PAYLOAD_LEN_RANGE: core::ops::RangeInclusive<usize> = 61..=63;

/// Bech32 alphabet used by address payloads.
const CHARSET: &str = "qpzry9x8gf2tvdw0s3jn54khce6mua7l";

/// Address validation errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum AddressError {
    #[error("address must start with '{ADDRESS_PREFIX}'")]
    MissingPrefix,
    #[error("address payload has invalid length {0}")]
    InvalidLength(usize),
    #[error("address payload contains invalid character '{0}'")]
    InvalidChar(char),
}

/// A syntactically valid payout address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatedAddress {
    /// The full address string as given.
    pub display: String,
}

impl ValidatedAddress {
    /// The payload part, without the prefix.
    pub fn payload(&self) -> &str {
        &self.display[ADDRESS_PREFIX.len()..]
    }
}

impl core::fmt::Display for ValidatedAddress {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}", self.display)
    }
}

/// Validate a payout address string.
pub fn validate_address(address: &str) -> Result<ValidatedAddress, AddressError> {
    let trimmed = address.trim();

    let payload = trimmed
        .strip_prefix(ADDRESS_PREFIX)
        .ok_or(AddressError::MissingPrefix)?;

    if !PAYLOAD_LEN_RANGE.contains(&payload.len()) {
        return Err(AddressError::InvalidLength(payload.len()));
    }

    for c in payload.chars() {
        if !CHARSET.contains(c) {
            return Err(AddressError::InvalidChar(c));
        }
    }

    Ok(ValidatedAddress {
        display: trimmed.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const VALID: &str = "kaspa:qqggvdrxjqdgwql4aac8hg0pq2v4z5p46l86f98hq7ax29k7x55v7sycs9kvm";

    #[test]
    fn test_valid_address() {
        let addr = validate_address(VALID).unwrap();
        assert_eq!(addr.display, VALID);
        assert_eq!(addr.payload().len(), 61);
    }

    #[test]
    fn test_whitespace_is_trimmed() {
        let addr = validate_address(&format!("  {}\n", VALID)).unwrap();
        assert_eq!(addr.display, VALID);
    }

    #[test]
    fn test_missing_prefix() {
        assert_eq!(
            validate_address("qqggvdrxjqdgwql4aac8hg0pq2v4z5p46l86f98hq7ax29k7x55v7sycs9kvm"),
            Err(AddressError::MissingPrefix)
        );
        assert_eq!(
            validate_address("bitcoin:qqggvdrx"),
            Err(AddressError::MissingPrefix)
        );
    }

    #[test]
    fn test_bad_length() {
        assert_eq!(
            validate_address("kaspa:qqggvdrx"),
            Err(AddressError::InvalidLength(8))
        );
    }

    #[test]
    fn test_bad_charset() {
        // 'b' and '1' are not in the bech32 alphabet
        let mut payload = VALID[ADDRESS_PREFIX.len()..].to_string();
        payload.replace_range(0..1, "b");
        assert_eq!(
            validate_address(&format!("kaspa:{}", payload)),
            Err(AddressError::InvalidChar('b'))
        );
    }
}
