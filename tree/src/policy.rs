//! 16-bit compression for policy priors.
//!
//! A prior `p` in `[0, 1]` is stored as bits 27..12 of its IEEE-754
//! representation. The sign bit and the exponent's top bit are always clear
//! for such values, and the two exponent bits below them are set for
//! anything >= ~4.7e-10, so only the remaining exponent bits and the top of
//! the significand need to survive. Encoding adds half of the dropped
//! precision up front so the truncation rounds to nearest; inputs too small
//! to carry the assumed exponent bits drop to code 0.
//!
//! The raw 16-bit codes order the same way as the decoded floats, so edge
//! arrays sort on the codes directly.

/// Round-to-nearest bias combined with the subtraction of the two
/// assumed-set exponent bits.
const ROUNDING_BIAS: i32 = (1 << 11) - (3 << 28);

pub fn compress(p: f32) -> u16 {
    let tmp = (p.to_bits() as i32).wrapping_add(ROUNDING_BIAS);
    if tmp < 0 {
        0
    } else {
        (tmp >> 12) as u16
    }
}

pub fn decompress(code: u16) -> f32 {
    f32::from_bits((u32::from(code) << 12) | (3 << 28))
}
