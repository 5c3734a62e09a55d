pub mod biquad;
pub mod crossover;
pub mod utils;

pub use biquad::Biquad;
pub use crossover::{mix_bands, BandSplitter};
