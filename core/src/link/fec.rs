/// Reed–Solomon forward error correction over GF(2^8)
///
/// Systematic code: each codeword is the data followed by `parity` check
/// symbols. Field arithmetic comes from `reed_solomon_erasure::galois_8`
/// (primitive polynomial 0x11D, generator α = 2); the error-locating
/// decoder is implemented here because the erasure coder only repairs
/// shards at known positions, while a radio receiver has to find the
/// corrupted bytes itself.
///
/// A decoder corrects up to `parity / 2` symbol errors per codeword.
/// Inputs longer than one codeword (255 bytes total) are split into
/// consecutive codewords of `255 - parity` data bytes each.

use super::LinkError;
use reed_solomon_erasure::galois_8::{add, div, exp, mul};

/// Codeword length for GF(2^8)
pub const CODEWORD_LEN: usize = 255;

const GENERATOR: u8 = 2;

/// α^i
fn alpha_pow(i: usize) -> u8 {
    exp(GENERATOR, i % 255)
}

/// Generator polynomial ∏ (x - α^i) for i in 0..parity, highest degree first
fn generator_poly(parity: usize) -> Vec<u8> {
    let mut g = vec![1u8];
    for i in 0..parity {
        let root = alpha_pow(i);
        let mut next = vec![0u8; g.len() + 1];
        for (j, &coef) in g.iter().enumerate() {
            next[j] = add(next[j], coef);
            next[j + 1] = add(next[j + 1], mul(coef, root));
        }
        g = next;
    }
    g
}

/// Evaluate a highest-degree-first polynomial at `x`
fn eval_desc(poly: &[u8], x: u8) -> u8 {
    poly.iter().fold(0u8, |acc, &c| add(mul(acc, x), c))
}

/// Evaluate a lowest-degree-first polynomial at `x`
fn eval_asc(poly: &[u8], x: u8) -> u8 {
    poly.iter().rev().fold(0u8, |acc, &c| add(mul(acc, x), c))
}

fn data_per_codeword(parity: usize) -> usize {
    CODEWORD_LEN - parity
}

/// Largest usable parity count; a codeword needs at least one data byte
pub const MAX_PARITY: usize = CODEWORD_LEN - 1;

fn check_parity(parity: usize) -> Result<(), LinkError> {
    if parity == 0 || parity > MAX_PARITY {
        return Err(LinkError::InvalidParity(parity));
    }
    Ok(())
}

/// Encode one block of at most `255 - parity` bytes
fn encode_block(data: &[u8], gen: &[u8]) -> Vec<u8> {
    let parity = gen.len() - 1;
    let mut out = vec![0u8; data.len() + parity];
    out[..data.len()].copy_from_slice(data);

    // Polynomial long division; the remainder is the parity
    for i in 0..data.len() {
        let coef = out[i];
        if coef != 0 {
            for (j, &g) in gen.iter().enumerate().skip(1) {
                out[i + j] = add(out[i + j], mul(g, coef));
            }
        }
    }

    out[..data.len()].copy_from_slice(data);
    out
}

fn syndromes(codeword: &[u8], parity: usize) -> Vec<u8> {
    (0..parity)
        .map(|i| eval_desc(codeword, alpha_pow(i)))
        .collect()
}

/// Berlekamp–Massey: error locator Λ(x), lowest degree first
fn error_locator(synd: &[u8]) -> Vec<u8> {
    let mut c = vec![1u8];
    let mut b = vec![1u8];
    let mut l = 0usize;
    let mut m = 1usize;
    let mut last_d = 1u8;

    for n in 0..synd.len() {
        let mut d = synd[n];
        for i in 1..=l.min(c.len() - 1) {
            d = add(d, mul(c[i], synd[n - i]));
        }

        if d == 0 {
            m += 1;
            continue;
        }

        let scale = div(d, last_d);
        let mut adjusted = c.clone();
        if adjusted.len() < b.len() + m {
            adjusted.resize(b.len() + m, 0);
        }
        for (i, &coef) in b.iter().enumerate() {
            adjusted[i + m] = add(adjusted[i + m], mul(scale, coef));
        }

        if 2 * l <= n {
            b = c;
            l = n + 1 - l;
            last_d = d;
            m = 1;
        } else {
            m += 1;
        }
        c = adjusted;
    }

    c.truncate(l + 1);
    c.resize(l + 1, 0);
    c
}

/// Correct one codeword in place, returning the number of repaired symbols
fn correct_block(codeword: &mut [u8], parity: usize) -> Result<usize, LinkError> {
    let n = codeword.len();
    let synd = syndromes(codeword, parity);
    if synd.iter().all(|&s| s == 0) {
        return Ok(0);
    }

    let locator = error_locator(&synd);
    let errors = locator.len() - 1;
    if errors == 0 || 2 * errors > parity {
        return Err(LinkError::Uncorrectable);
    }

    // Chien search: position j holds the coefficient of x^(n-1-j)
    let mut positions = Vec::with_capacity(errors);
    for j in 0..n {
        let x_inv = div(1, alpha_pow(n - 1 - j));
        if eval_asc(&locator, x_inv) == 0 {
            positions.push(j);
        }
    }
    if positions.len() != errors {
        return Err(LinkError::Uncorrectable);
    }

    // Ω(x) = S(x)·Λ(x) mod x^parity
    let mut omega = vec![0u8; parity];
    for (i, &s) in synd.iter().enumerate() {
        for (k, &lam) in locator.iter().enumerate() {
            if i + k < parity {
                omega[i + k] = add(omega[i + k], mul(s, lam));
            }
        }
    }

    // Forney with first consecutive root α^0: e = X·Ω(X⁻¹) / Λ'(X⁻¹)
    for &j in &positions {
        let x = alpha_pow(n - 1 - j);
        let x_inv = div(1, x);

        let mut derivative = 0u8;
        for (k, &lam) in locator.iter().enumerate().skip(1).step_by(2) {
            derivative = add(derivative, mul(lam, exp(x_inv, k - 1)));
        }
        if derivative == 0 {
            return Err(LinkError::Uncorrectable);
        }

        let magnitude = div(mul(x, eval_asc(&omega, x_inv)), derivative);
        codeword[j] = add(codeword[j], magnitude);
    }

    if syndromes(codeword, parity).iter().any(|&s| s != 0) {
        return Err(LinkError::Uncorrectable);
    }
    Ok(errors)
}

/// Append Reed–Solomon parity to `data`
///
/// Fails with [`LinkError::InvalidParity`] if `parity` is outside `1..255`.
pub fn fec_encode(data: &[u8], parity: usize) -> Result<Vec<u8>, LinkError> {
    check_parity(parity)?;
    let gen = generator_poly(parity);
    let chunk = data_per_codeword(parity);

    let blocks = (data.len() + chunk - 1) / chunk;
    let mut out = Vec::with_capacity(data.len() + blocks * parity);
    for block in data.chunks(chunk) {
        out.extend(encode_block(block, &gen));
    }
    Ok(out)
}

/// Correct and strip Reed–Solomon parity
///
/// Fails with [`LinkError::Uncorrectable`] when any codeword carries more
/// than `parity / 2` symbol errors.
pub fn fec_decode(encoded: &[u8], parity: usize) -> Result<Vec<u8>, LinkError> {
    check_parity(parity)?;
    let mut out = Vec::with_capacity(encoded.len());
    let mut repaired = 0usize;

    for block in encoded.chunks(CODEWORD_LEN) {
        if block.len() <= parity {
            return Err(LinkError::TooShort {
                need: parity + 1,
                got: block.len(),
            });
        }
        let mut codeword = block.to_vec();
        repaired += correct_block(&mut codeword, parity)?;
        out.extend_from_slice(&codeword[..codeword.len() - parity]);
    }

    if repaired > 0 {
        tracing::debug!(repaired, "FEC corrected symbol errors");
    }
    Ok(out)
}
