mod shape;

pub use shape::{matching_dim, TensorShape};
