//! Byte alphabet for next-symbol prediction.
//!
//! The alphabet spans the corpus from its smallest to its largest byte value.
//! Symbols are laid out on the smallest square input field that holds them and
//! written as a one-hot vector at `symbol - min`.

use ndarray::Array1;

use crate::core::{GridSize, SdrError, SdrResult};
use crate::utils::argmax;

/// Contiguous byte range `[min, max]` observed in a corpus.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Alphabet {
    min: u8,
    max: u8,
}

impl Alphabet {
    /// Size the alphabet from a corpus.
    ///
    /// # Errors
    /// `InvalidConfig` if the corpus is empty.
    pub fn from_corpus(corpus: &[u8]) -> SdrResult<Self> {
        let min = corpus.iter().copied().min();
        let max = corpus.iter().copied().max();
        match (min, max) {
            (Some(min), Some(max)) => Ok(Self { min, max }),
            _ => Err(SdrError::InvalidConfig("corpus is empty".to_string())),
        }
    }

    /// Alphabet covering `[min, max]`.
    ///
    /// # Errors
    /// `InvalidConfig` if `min > max`.
    pub fn from_range(min: u8, max: u8) -> SdrResult<Self> {
        if min > max {
            return Err(SdrError::InvalidConfig(format!(
                "alphabet range inverted: {min} > {max}"
            )));
        }
        Ok(Self { min, max })
    }

    #[must_use]
    pub fn min(&self) -> u8 {
        self.min
    }

    #[must_use]
    pub fn max(&self) -> u8 {
        self.max
    }

    /// Number of distinct symbols: `max - min + 1`.
    #[must_use]
    pub fn num_inputs(&self) -> usize {
        usize::from(self.max - self.min) + 1
    }

    /// Side of the square input field: `ceil(sqrt(num_inputs))`.
    #[must_use]
    pub fn inputs_root(&self) -> usize {
        (self.num_inputs() as f32).sqrt().ceil() as usize
    }

    /// The square input field holding every symbol.
    #[must_use]
    pub fn input_size(&self) -> GridSize {
        let root = self.inputs_root();
        GridSize::new(root, root)
    }

    /// Input index of `symbol`, or `None` if it lies outside the alphabet.
    #[must_use]
    pub fn index_of(&self, symbol: u8) -> Option<usize> {
        (self.min..=self.max)
            .contains(&symbol)
            .then(|| usize::from(symbol - self.min))
    }

    /// Symbol at input index `index`, or `None` if out of range.
    #[must_use]
    pub fn symbol_of(&self, index: usize) -> Option<u8> {
        (index < self.num_inputs()).then(|| self.min + index as u8)
    }

    /// One-hot encode `symbol` over the whole input field.
    /// Returns a zero vector if the symbol is not in the alphabet.
    #[must_use]
    pub fn one_hot(&self, symbol: u8) -> Array1<f32> {
        let mut v = Array1::zeros(self.input_size().len());
        if let Some(idx) = self.index_of(symbol) {
            v[idx] = 1.0;
        }
        v
    }

    /// Decode a prediction over the input field to the most likely symbol.
    /// Padding cells past `num_inputs` are ignored.
    #[must_use]
    pub fn decode_argmax(&self, prediction: &Array1<f32>) -> Option<u8> {
        let n = self.num_inputs().min(prediction.len());
        let values: Vec<f32> = prediction.iter().take(n).copied().collect();
        argmax(&values).and_then(|i| self.symbol_of(i))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_corpus() {
        let alphabet = Alphabet::from_corpus(b"ABAC").unwrap();
        assert_eq!(alphabet.min(), b'A');
        assert_eq!(alphabet.max(), b'C');
        assert_eq!(alphabet.num_inputs(), 3);
        assert_eq!(alphabet.inputs_root(), 2);
        assert_eq!(alphabet.input_size(), GridSize::new(2, 2));
    }

    #[test]
    fn test_empty_corpus() {
        assert!(Alphabet::from_corpus(b"").is_err());
        assert!(Alphabet::from_range(10, 5).is_err());
    }

    #[test]
    fn test_inputs_root_is_ceil_sqrt() {
        assert_eq!(Alphabet::from_range(0, 0).unwrap().inputs_root(), 1);
        assert_eq!(Alphabet::from_range(0, 3).unwrap().inputs_root(), 2);
        assert_eq!(Alphabet::from_range(0, 4).unwrap().inputs_root(), 3);
        assert_eq!(Alphabet::from_range(0, 255).unwrap().inputs_root(), 16);
    }

    #[test]
    fn test_symbol_round_trip() {
        let alphabet = Alphabet::from_range(b'a', b'z').unwrap();
        assert_eq!(alphabet.index_of(b'a'), Some(0));
        assert_eq!(alphabet.index_of(b'z'), Some(25));
        assert_eq!(alphabet.index_of(b'A'), None);
        assert_eq!(alphabet.symbol_of(2), Some(b'c'));
        assert_eq!(alphabet.symbol_of(26), None);
    }

    #[test]
    fn test_one_hot() {
        let alphabet = Alphabet::from_corpus(b"ABAC").unwrap();
        let v = alphabet.one_hot(b'B');
        assert_eq!(v.len(), 4);
        assert_eq!(v[1], 1.0);
        assert_eq!(v.sum(), 1.0);
        assert_eq!(alphabet.one_hot(b'Z').sum(), 0.0);
    }

    #[test]
    fn test_decode_ignores_padding() {
        let alphabet = Alphabet::from_corpus(b"ABAC").unwrap();
        let prediction = ndarray::arr1(&[0.1, 0.3, 0.2, 0.9]);
        assert_eq!(alphabet.decode_argmax(&prediction), Some(b'B'));
    }
}
