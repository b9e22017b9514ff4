//! Symbol alphabets and input encoding.
//!
//! ## Submodules
//!
//! - [`alphabet`]: Byte alphabet sizing, one-hot encoding and argmax decoding

pub mod alphabet;

pub use alphabet::Alphabet;

/// Clear `field` and write a single `1.0` at `index`.
/// Out-of-range indices leave the field all zeros.
pub fn write_one_hot(field: &mut [f32], index: Option<usize>) {
    field.iter_mut().for_each(|v| *v = 0.0);
    if let Some(slot) = index.and_then(|i| field.get_mut(i)) {
        *slot = 1.0;
    }
}
