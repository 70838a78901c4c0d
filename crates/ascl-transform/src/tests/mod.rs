/*! Unit tests of checking, lowering and translation.
 *
 * Trees are built with `AstBuilder`, run through the pass under test, and then inspected node by node.
 */

mod lower_tests;

use ascl_core::{AstBuilder, BlockId, IdentId, Meta};

/// Builder holding one contract with a single function `f`.
pub(crate) fn one_function(ret: Vec<Meta>) -> (AstBuilder, BlockId, IdentId, BlockId) {
    let mut b = AstBuilder::new();
    let (_, cblk) = b.contract("C");
    let (func, body) = b.function(cblk, "f", vec![], ret);
    (b, cblk, func, body)
}
