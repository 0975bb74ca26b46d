pub mod class;
pub mod processing;
pub mod storage;

pub use class::{NOISE_CLASSIFICATION, get_class_name, is_noise};
