//! Run-Length Pass
//!
//! Optional byte-level compression applied to a whole packet body.
//! Sparse input packets are mostly zero flag bytes, so runs dominate.
//!
//! ```text
//! literal  b            a byte not followed by itself
//! run      b b extra    (2 + extra) copies of b, extra in 0..=255
//! ```
//!
//! Two equal bytes in a row always start a run, so the decoder never has
//! to guess.

use super::wire::DecodeError;

/// Longest run one triple can express.
pub const MAX_RUN: usize = 2 + u8::MAX as usize;

/// Refuse to inflate beyond this many bytes.
pub const MAX_DECODED_LEN: usize = 4 << 20;

/// Compress `data`.
pub fn encode(data: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(data.len());
    let mut i = 0;
    while i < data.len() {
        let b = data[i];
        let mut run = 1;
        while i + run < data.len() && data[i + run] == b {
            run += 1;
        }
        i += run;

        while run >= 2 {
            let n = run.min(MAX_RUN);
            out.extend_from_slice(&[b, b, (n - 2) as u8]);
            run -= n;
        }
        if run == 1 {
            out.push(b);
        }
    }
    out
}

/// Inflate `data`. A run triple cut short is an error.
pub fn decode(data: &[u8]) -> Result<Vec<u8>, DecodeError> {
    let mut out = Vec::with_capacity(data.len() * 2);
    let mut i = 0;
    while i < data.len() {
        let b = data[i];
        if i + 1 < data.len() && data[i + 1] == b {
            let extra = *data.get(i + 2).ok_or(DecodeError::BadRun(i))?;
            let n = 2 + extra as usize;
            if out.len() + n > MAX_DECODED_LEN {
                return Err(DecodeError::TooLarge {
                    field: "decoded body",
                    count: (out.len() + n) as u64,
                    limit: MAX_DECODED_LEN as u64,
                });
            }
            out.resize(out.len() + n, b);
            i += 3;
        } else {
            out.push(b);
            i += 1;
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_encode_examples() {
        assert_eq!(encode(&[]), Vec::<u8>::new());
        assert_eq!(encode(&[1, 2, 3]), vec![1, 2, 3]);
        assert_eq!(encode(&[0, 0]), vec![0, 0, 0]);
        assert_eq!(encode(&[0, 0, 0, 0, 0, 7]), vec![0, 0, 3, 7]);
    }

    #[test]
    fn test_long_run_splits() {
        let data = vec![9u8; MAX_RUN + 1];
        // One full triple, then a lone literal
        assert_eq!(encode(&data), vec![9, 9, 255, 9]);
        assert_eq!(decode(&encode(&data)).unwrap(), data);

        let data = vec![9u8; MAX_RUN + 2];
        assert_eq!(encode(&data), vec![9, 9, 255, 9, 9, 0]);
    }

    #[test]
    fn test_zeros_compress() {
        let data = vec![0u8; 1000];
        assert!(encode(&data).len() <= 12);
    }

    #[test]
    fn test_truncated_run_rejected() {
        assert_eq!(decode(&[5, 5]), Err(DecodeError::BadRun(0)));
        assert_eq!(decode(&[1, 5, 5]), Err(DecodeError::BadRun(1)));
    }

    #[test]
    fn test_bomb_rejected() {
        let bomb: Vec<u8> = std::iter::repeat([1u8, 1, 255]).take(20_000).flatten().collect();
        // Adjacent triples of the same byte look like runs too; any error is fine
        assert!(decode(&bomb).is_err());
    }

    proptest! {
        #[test]
        fn prop_round_trip(data in proptest::collection::vec(prop_oneof![Just(0u8), Just(1u8), any::<u8>()], 0..2048)) {
            prop_assert_eq!(decode(&encode(&data)).unwrap(), data);
        }
    }
}
