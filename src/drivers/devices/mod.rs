//! 基于 GPIO 与 SPI 核心构建的外设模型

pub mod inputs;
pub mod w25qxx;

pub use inputs::{AnalogInput, EndStop};
pub use w25qxx::W25QxxFlash;
