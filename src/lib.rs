pub mod arch;
pub mod case;
pub mod config;
pub mod error;
pub mod kernel;
pub mod quant;
pub mod tensor;
pub mod utils;

pub use arch::cfu::{Cfu, CfuModel, CfuOp, CfuSession, CfuStats, Funct};
pub use case::{run_case, CaseReport, ConvCase};
pub use config::{AppConfig, EngineKind};
pub use error::ConvError;
pub use kernel::conv::{conv_per_channel, conv_per_channel_packed_int4};
pub use kernel::gemm::{MatMul, ScalarGemm, TiledGemm};
pub use kernel::im2col::ConvScratch;
pub use kernel::params::{ConvParams, Padding};
pub use quant::PerChannelQuantization;
pub use tensor::TensorShape;
pub use utils::log;
