//! Response models shared by every endpoint.
//!
//! This module contains the envelope helpers used to project records out of
//! responses and the choice-list cache resource wrappers use to render
//! coded fields.

mod choices;
mod common;

pub use choices::*;
pub use common::*;
