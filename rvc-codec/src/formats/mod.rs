//! Capture file parsers
//!
//! This module contains parsers for CAN capture formats. Each parser
//! implements an iterator pattern over CanFrame objects.

use crate::frame::CanFrame;
use crate::types::Result;
use std::path::Path;

pub mod candump;

pub use candump::{CandumpFileIterator, CandumpFrameIterator, CandumpParser};

/// Common trait for capture file parsers
pub trait CaptureParser: Iterator<Item = Result<CanFrame>> + Sized {
    /// Open a capture file and return an iterator over CAN frames
    fn parse(path: &Path) -> Result<Self>;
}
