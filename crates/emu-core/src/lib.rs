//! Core traits and types for cycle-accurate chip scheduling.
//!
//! Every emulated chip satisfies the same small contract: advance one
//! cycle, advance one line, and produce or consume an opaque state blob.
//! Schedulers only ever talk to chips through these traits.

mod chip;
mod error;
mod interrupt;
mod observable;
mod state;
mod ticks;

pub use chip::{Chip, Processor, Stateful};
pub use error::{ChipFault, StateError};
pub use interrupt::InterruptLine;
pub use observable::{Observable, Value};
pub use state::{ChipState, MAX_STATE_LEN, StateReader, StateWriter};
pub use ticks::Ticks;
