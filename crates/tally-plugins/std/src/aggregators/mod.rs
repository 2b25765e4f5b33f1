pub mod minmax;

pub use minmax::MinMax;
