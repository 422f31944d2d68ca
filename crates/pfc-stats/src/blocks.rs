//! Equal-population slicing along a sorted variable

use pfc_core::{Error, Result};

/// Consecutive group of `(x, y)` pairs after sorting by x.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Block {
    pub x: Vec<f64>,
    pub y: Vec<f64>,
}

impl Block {
    pub fn len(&self) -> usize {
        self.x.len()
    }

    pub fn is_empty(&self) -> bool {
        self.x.is_empty()
    }
}

/// Sort pairs by x and cut them into blocks of `block_size` entries.
///
/// The number of blocks is `round(n / block_size)`: a trailing remainder of
/// less than half a block is dropped, a larger one forms a short last block.
pub fn sorted_blocks(x: &[f64], y: &[f64], block_size: usize) -> Result<Vec<Block>> {
    if block_size == 0 {
        return Err(Error::Validation("block size must be > 0".to_string()));
    }
    if x.len() != y.len() {
        return Err(Error::Validation(format!(
            "x/y length mismatch: {} != {}",
            x.len(),
            y.len()
        )));
    }

    let n = x.len();
    let mut order: Vec<usize> = (0..n).collect();
    order.sort_by(|&a, &b| x[a].total_cmp(&x[b]));

    let nblocks = (n as f64 / block_size as f64).round() as usize;
    let blocks = (0..nblocks)
        .map(|b| {
            let idx = &order[b * block_size..((b + 1) * block_size).min(n)];
            Block { x: idx.iter().map(|&i| x[i]).collect(), y: idx.iter().map(|&i| y[i]).collect() }
        })
        .collect();
    Ok(blocks)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ramp(n: usize) -> (Vec<f64>, Vec<f64>) {
        let x: Vec<f64> = (0..n).rev().map(|i| i as f64).collect();
        let y = x.iter().map(|v| v * 10.0).collect();
        (x, y)
    }

    #[test]
    fn exact_multiple() {
        let (x, y) = ramp(9);
        let b = sorted_blocks(&x, &y, 3).unwrap();
        assert_eq!(b.len(), 3);
        assert_eq!(b[0].x, vec![0.0, 1.0, 2.0]);
        assert_eq!(b[2].y, vec![60.0, 70.0, 80.0]);
    }

    #[test]
    fn short_remainder_dropped() {
        let (x, y) = ramp(10);
        let b = sorted_blocks(&x, &y, 4).unwrap();
        // 10 / 4 = 2.5 rounds to 3, so the remainder of 2 forms a block
        assert_eq!(b.len(), 3);
        assert_eq!(b[2].len(), 2);

        let (x, y) = ramp(9);
        let b = sorted_blocks(&x, &y, 4).unwrap();
        assert_eq!(b.len(), 2);
        assert_eq!(b.iter().map(Block::len).sum::<usize>(), 8);
    }

    #[test]
    fn tiny_input_gives_no_block() {
        let (x, y) = ramp(1);
        assert!(sorted_blocks(&x, &y, 3).unwrap().is_empty());
        assert_eq!(sorted_blocks(&x, &y, 2).unwrap().len(), 1);
    }

    #[test]
    fn errors() {
        assert!(sorted_blocks(&[1.0], &[1.0], 0).is_err());
        assert!(sorted_blocks(&[1.0], &[], 1).is_err());
    }
}
