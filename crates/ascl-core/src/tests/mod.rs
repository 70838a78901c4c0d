/*! Tests of the tree arena and the builder working together.
 *
 * Lowering relies on the arena keeping ids stable while nodes are rewritten. These tests build small
 * contracts through `AstBuilder` and check the invariants later passes depend on.
 */

mod builder_tests;
