//! Modular arithmetic over 16-bit packet sequence numbers.

use crate::ACK_WINDOW;

const HALF_RANGE: u16 = 32768;

/// Returns true if `s1` is newer than `s2`, treating the space as a ring of 65536.
#[inline]
pub fn sequence_greater_than(s1: u16, s2: u16) -> bool {
    ((s1 > s2) && (s1 - s2 <= HALF_RANGE)) || ((s1 < s2) && (s2 - s1 > HALF_RANGE))
}

#[inline]
pub fn sequence_less_than(s1: u16, s2: u16) -> bool {
    sequence_greater_than(s2, s1)
}

/// True when an `(ack, ack_bits)` pair reports `sequence` as received.
///
/// `ack` itself is always covered; bit `k - 1` of `ack_bits` covers `ack - k`
/// for `k` in `1..=32`.
#[inline]
pub fn ack_covers(ack: u16, ack_bits: u32, sequence: u16) -> bool {
    if sequence == ack {
        return true;
    }
    if !sequence_greater_than(ack, sequence) {
        return false;
    }
    let offset = ack.wrapping_sub(sequence) as u32;
    offset <= ACK_WINDOW && ack_bits & (1 << (offset - 1)) != 0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sequence_comparison() {
        assert!(sequence_greater_than(2, 1));
        assert!(!sequence_greater_than(1, 2));
        assert!(!sequence_greater_than(7, 7));
    }

    #[test]
    fn test_sequence_comparison_wraparound() {
        assert!(sequence_greater_than(2, 65535));
        assert!(sequence_less_than(65535, 2));
        assert!(sequence_greater_than(0, u16::MAX));
        assert!(!sequence_greater_than(u16::MAX, 0));
    }

    #[test]
    fn test_sequence_comparison_half_range_boundary() {
        assert!(sequence_greater_than(32768, 0));
        assert!(!sequence_greater_than(32769, 0));
        assert!(sequence_greater_than(0, 32769));
    }

    #[test]
    fn test_ack_covers_exact_and_bits() {
        let bits = 0b101;
        assert!(ack_covers(100, bits, 100));
        assert!(ack_covers(100, bits, 99));
        assert!(!ack_covers(100, bits, 98));
        assert!(ack_covers(100, bits, 97));
        assert!(!ack_covers(100, bits, 101));
    }

    #[test]
    fn test_ack_covers_window_edge() {
        let bits = 1 << 31;
        assert!(ack_covers(40, bits, 8));
        assert!(!ack_covers(40, u32::MAX, 7));
    }

    #[test]
    fn test_ack_covers_across_wrap() {
        // ack 1 reports 65535 at offset 2
        assert!(ack_covers(1, 0b10, 65535));
        assert!(!ack_covers(1, 0b10, 0));
    }
}
