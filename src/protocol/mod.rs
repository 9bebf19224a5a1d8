//! Protocol module for interpreting characteristic payloads.
//!
//! This module contains the payload decoder for the heart-rate, LSM330
//! temperature and generic characteristics of the peripheral.

pub mod decoder;

pub use decoder::decode;
