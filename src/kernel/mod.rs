pub mod conv;
pub mod gemm;
pub mod im2col;
pub mod matrix;
pub mod params;
pub mod reference;

pub use conv::{conv_per_channel, conv_per_channel_packed_int4};
pub use gemm::{MatMul, ScalarGemm, TiledGemm};
pub use im2col::ConvScratch;
pub use matrix::Matrix;
pub use params::{ConvGeometry, ConvParams, Padding};
