//! Fixed-point helpers for proportional redemption.
//!
//! All division rounds toward zero. A redemption therefore never pays out
//! more than its exact pro-rata share, and the dust stays in the pool for
//! the remaining holders.

use crate::types::Amount;

/// Computes `floor(a * b / d)` without losing precision.
///
/// The product is formed in 256 bits, so the only failure cases are
/// `d == 0` and a quotient that does not fit in `u128`.
pub fn mul_div_floor(a: u128, b: u128, d: u128) -> Option<u128> {
    if d == 0 {
        return None;
    }
    if let Some(product) = a.checked_mul(b) {
        return Some(product / d);
    }

    let (hi, lo) = widening_mul(a, b);
    if hi >= d {
        return None;
    }

    // Schoolbook binary long division of (hi, lo) by d. `rem < d` holds at
    // the top of every iteration, so the quotient fits in 128 bits.
    let mut rem = hi;
    let mut quotient: u128 = 0;
    for i in (0..128).rev() {
        let carry = rem >> 127;
        rem = (rem << 1) | ((lo >> i) & 1);
        quotient <<= 1;
        if carry == 1 || rem >= d {
            rem = rem.wrapping_sub(d);
            quotient |= 1;
        }
    }
    Some(quotient)
}

/// Full 128x128 -> 256 bit multiplication, returned as `(high, low)`.
fn widening_mul(a: u128, b: u128) -> (u128, u128) {
    const MASK: u128 = u64::MAX as u128;

    let (a_hi, a_lo) = (a >> 64, a & MASK);
    let (b_hi, b_lo) = (b >> 64, b & MASK);

    let ll = a_lo * b_lo;
    let lh = a_lo * b_hi;
    let hl = a_hi * b_lo;
    let hh = a_hi * b_hi;

    let mid = (ll >> 64) + (lh & MASK) + (hl & MASK);
    let lo = (ll & MASK) | (mid << 64);
    let hi = hh + (lh >> 64) + (hl >> 64) + (mid >> 64);
    (hi, lo)
}

/// Native value owed for redeeming `shares` out of `total_shares`, against a
/// pool currently holding `pool`.
///
/// Returns `None` when `total_shares` is zero. Callers only reach this after
/// checking `0 < shares <= balance <= total_shares`, in which case the result
/// is always `<= pool`.
pub fn redemption_payout(shares: Amount, pool: Amount, total_shares: Amount) -> Option<Amount> {
    mul_div_floor(shares, pool, total_shares)
}
