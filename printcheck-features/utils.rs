/// Utility functions for corner detection algorithms

/// Pack 16 circle tests into a bitmask, bit `i` set when `pixels[i]` holds
#[inline]
pub fn circle_mask(pixels: &[bool; 16]) -> u16 {
    pixels
        .iter()
        .enumerate()
        .fold(0u16, |mask, (i, &set)| mask | ((set as u16) << i))
}

/// Check if there are at least `min_count` consecutive set bits in the circular
/// 16-bit mask using a branch-free rotate-and-AND reduction
#[inline]
pub fn has_consecutive_bits(mask: u16, min_count: usize) -> bool {
    if min_count > 16 || min_count == 0 {
        return false;
    }
    if mask == u16::MAX {
        return true;
    }

    // For a run of length n, we need: mask & rotl(mask, 1) & ... & rotl(mask, n-1)
    let mut test_mask = mask;
    for i in 1..min_count {
        test_mask &= mask.rotate_left(i as u32);
        if test_mask == 0 {
            return false;
        }
    }

    test_mask != 0
}

/// Main function for checking consecutive pixels on the FAST circle
pub fn has_consecutive_pixels(pixels: &[bool; 16], min_count: usize) -> bool {
    has_consecutive_bits(circle_mask(pixels), min_count)
}
