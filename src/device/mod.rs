pub mod adapter;
pub mod error;
pub mod frame;
pub mod transport;
