/// 设备协作者 (Device collaborators)
///
/// - Calibration:     标定数据读取
/// - SimulatedDevice: 无硬件时的五路数据模拟源
pub mod calibration;
pub mod simulated;

pub use calibration::Calibration;
pub use simulated::{DeviceHandle, SimulatedDevice, SimulationConfig};
