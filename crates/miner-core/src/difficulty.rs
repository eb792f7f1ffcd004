//! Compact difficulty target conversion and comparison.
//!
//! The node reports difficulty in the compact form
//! `[exponent (1 byte)][mantissa (3 bytes)]` packed into a u32.
//! The full target is `mantissa * 256^(exponent - 3)`, expressed here
//! as a 32-byte big-endian integer. The expansion must be exact: an
//! off-by-one shift silently mines at the wrong difficulty.

/// Width of a digest/target in bytes.
pub const TARGET_WIDTH: usize = 32;

/// Convert compact bits to a 256-bit big-endian target.
pub fn bits_to_target(bits: u32) -> [u8; TARGET_WIDTH] {
    let exponent = ((bits >> 24) & 0xFF) as usize;
    let mantissa = bits & 0x007F_FFFF;

    // Bit 23 is the sign flag in the compact encoding; a negative
    // target is never valid for proof of work.
    if bits & 0x0080_0000 != 0 {
        return [0u8; TARGET_WIDTH];
    }

    let mut target = [0u8; TARGET_WIDTH];

    if exponent == 0 {
        return target;
    }

    if exponent <= 3 {
        // mantissa >> (8 * (3 - exponent)), placed at the least
        // significant end
        let value = mantissa >> (8 * (3 - exponent));
        if exponent >= 1 {
            target[31] = (value & 0xFF) as u8;
        }
        if exponent >= 2 {
            target[30] = ((value >> 8) & 0xFF) as u8;
        }
        if exponent == 3 {
            target[29] = ((value >> 16) & 0xFF) as u8;
        }
    } else {
        // mantissa << (8 * (exponent - 3)): the three mantissa bytes
        // land at offset 32 - exponent, clamped into the digest width
        let pos = TARGET_WIDTH.saturating_sub(exponent);
        if pos < TARGET_WIDTH {
            target[pos] = ((mantissa >> 16) & 0xFF) as u8;
        }
        if pos + 1 < TARGET_WIDTH {
            target[pos + 1] = ((mantissa >> 8) & 0xFF) as u8;
        }
        if pos + 2 < TARGET_WIDTH {
            target[pos + 2] = (mantissa & 0xFF) as u8;
        }
    }

    target
}

/// Check whether a digest satisfies a target.
///
/// Both are 256-bit big-endian integers; the digest must be strictly
/// below the target.
#[inline]
pub fn digest_below_target(digest: &[u8; TARGET_WIDTH], target: &[u8; TARGET_WIDTH]) -> bool {
    for i in 0..TARGET_WIDTH {
        if digest[i] < target[i] {
            return true;
        }
        if digest[i] > target[i] {
            return false;
        }
    }
    // Equal is not below
    false
}

/// Approximate numeric difficulty for display, relative to the
/// easiest-possible compact target `0x1d00ffff`.
pub fn bits_to_difficulty(bits: u32) -> f64 {
    const BASE_BITS: u32 = 0x1d00ffff;

    let current = target_to_f64(&bits_to_target(bits));
    let base = target_to_f64(&bits_to_target(BASE_BITS));

    if current == 0.0 {
        return f64::INFINITY;
    }
    base / current
}

fn target_to_f64(target: &[u8; TARGET_WIDTH]) -> f64 {
    let mut first_nonzero = 0;
    while first_nonzero < TARGET_WIDTH && target[first_nonzero] == 0 {
        first_nonzero += 1;
    }
    if first_nonzero == TARGET_WIDTH {
        return 0.0;
    }

    // Up to 8 bytes of precision, scaled back by byte position
    let mut value: u64 = 0;
    for i in 0..8 {
        if first_nonzero + i < TARGET_WIDTH {
            value = (value << 8) | target[first_nonzero + i] as u64;
        }
    }
    let shift = (31 - first_nonzero) as i32 * 8 - 56;
    value as f64 * 2f64.powi(shift)
}

/// Format a difficulty value with a magnitude suffix.
pub fn format_difficulty(difficulty: f64) -> String {
    if difficulty >= 1e15 {
        format!("{:.2}P", difficulty / 1e15)
    } else if difficulty >= 1e12 {
        format!("{:.2}T", difficulty / 1e12)
    } else if difficulty >= 1e9 {
        format!("{:.2}G", difficulty / 1e9)
    } else if difficulty >= 1e6 {
        format!("{:.2}M", difficulty / 1e6)
    } else if difficulty >= 1e3 {
        format!("{:.2}K", difficulty / 1e3)
    } else {
        format!("{:.2}", difficulty)
    }
}
