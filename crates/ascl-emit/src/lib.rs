/*! Text rendering of lowered ASCL modules.
 *
 * The bytecode backend consumes the lowered module directly. This crate prints the same module for
 * people: the data segment as hex, each function's register table and frame usage, and its basic
 * blocks with every operand shown at its assigned location.
 */

pub mod config;
pub mod emitter;
pub mod formatter;
pub mod text_emitter;

pub use config::{EmitterConfig, IndentStyle};
pub use emitter::{EmitContext, EmitResult, Emitter, LineRole};
pub use formatter::{block_name, IrFormatter};
pub use text_emitter::TextEmitter;
