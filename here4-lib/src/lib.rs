#![doc = include_str!("../README.md")]

mod error;

pub mod auxiliary;
pub mod dsdl;
pub mod frame;
pub mod gate;
pub mod message;
pub mod normalize;
pub mod pump;
pub mod sink;
pub mod transport;

pub use error::{Error, Result};
pub use frame::NodeId;
