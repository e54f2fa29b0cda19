//! Fraction approximation for `# ?/?` style formats.
//!
//! Continued-fraction convergents with digit budgets on both the numerator
//! and the denominator; when a budget is exceeded the last admissible
//! convergent is returned.

const EPS: f64 = 1e-10;

/// Approximates `0 <= f < 1` by `num/den` with `num < maxn`, `den < maxd`.
fn convergent(f: f64, maxn: i64, maxd: i64) -> (i64, i64) {
    if f < EPS {
        return (0, 1);
    }
    // p/q convergents of the continued fraction [0; a1, a2, ...]
    let (mut p0, mut q0) = (1i64, 0i64);
    let (mut p1, mut q1) = (0i64, 1i64);
    let mut x = f;
    loop {
        let recip = 1.0 / x;
        if !recip.is_finite() || recip >= 1e18 {
            return (p1, q1);
        }
        let a = recip.floor();
        let p2 = a as i64 * p1 + p0;
        let q2 = a as i64 * q1 + q0;
        if p2 >= maxn || q2 >= maxd {
            return (p1, q1);
        }
        p0 = p1;
        q0 = q1;
        p1 = p2;
        q1 = q2;
        if (f - p1 as f64 / q1 as f64).abs() < EPS {
            return (p1, q1);
        }
        x = recip - a;
        if x < EPS {
            return (p1, q1);
        }
    }
}

/// Converts a float into a signed numerator and positive denominator in
/// lowest terms, with at most `nn` numerator and `nd` denominator digits.
pub fn decimal_to_fraction(val: f64, nn: u32, nd: u32) -> (i64, i64) {
    let (whole, num, den) = decimal_to_whole_fraction(val, nn, nd);
    let sign = if val < 0.0 { -1 } else { 1 };
    (sign * (whole.abs() * den + num), den)
}

/// Converts a float into a signed whole part plus a non-negative proper
/// fraction. `nn`/`nd` are the digit budgets (0 defaults to 2).
pub fn decimal_to_whole_fraction(val: f64, nn: u32, nd: u32) -> (i64, i64, i64) {
    let nn = if nn == 0 { 2 } else { nn };
    let nd = if nd == 0 { 2 } else { nd };
    let maxn = 10i64.pow(nn.min(18));
    let maxd = 10i64.pow(nd.min(18));

    let whole = val.trunc();
    let frac = (val - whole).abs();
    let (num, den) = convergent(frac, maxn, maxd);
    // a convergent can round up to 1/1; carry it into the whole part
    if num == den {
        let carry = if val < 0.0 { -1.0 } else { 1.0 };
        return ((whole + carry) as i64, 0, 1);
    }
    (whole as i64, num, den)
}
