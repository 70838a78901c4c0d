/*! Checking and lowering passes of the ASCL compiler middle stage.
 *
 * The checker validates statements and rewrites loops into labeled jumps over the whole tree. Each
 * function is then translated on its own: locals get registers, expressions get storage locations,
 * and statements are placed into basic blocks ready for bytecode emission.
 */

pub mod check;
pub mod lower;
pub mod pipeline;
pub mod translate;

pub use check::{check_module, Checker};
pub use lower::{ExpressionLowering, LowerCtx, CALL_RESULT_NAME};
pub use pipeline::{
    compile, CheckPass, CompileUnit, LayoutPass, Pass, TransformationPipeline, TranslatePass,
};
pub use translate::{translate_function, FunctionTranslator};

#[cfg(test)]
mod tests;
