// This file is part of the Divolte session-binning core.
// SPDX-License-Identifier: Apache-2.0

//! Small pieces shared by the rest of the workspace: a testable clock
//! abstraction and a typed error used at every fallible boundary.

pub mod clock;
mod error;

pub use crate::error::{Error, ErrorKind};
