/*! Arena-backed syntax tree shared by the checker and the lowering passes.
 *
 * Every node lives in one of the `Ast` vectors and is addressed by a typed index. Parents refer to
 * children by index and blocks refer to their lexical parent by index, so passes can rewrite nodes
 * in place without shared ownership. Nothing is freed before the whole arena is dropped.
 */

use crate::source_location::SrcPos;
use crate::types::Meta;
use crate::values::{Location, MemRef, Value};
use crate::{CompileError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

macro_rules! arena_id {
    ($name:ident, $prefix:literal) => {
        #[derive(
            Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
        )]
        pub struct $name(pub u32);

        impl $name {
            #[inline]
            pub fn index(self) -> usize {
                self.0 as usize
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, concat!($prefix, "{}"), self.0)
            }
        }
    };
}

arena_id!(ExprId, "e");
arena_id!(StmtId, "s");
arena_id!(BlockId, "blk");
arena_id!(IdentId, "id");

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum UnaryOp {
    Inc,
    Dec,
    Neg,
    Not,
}

impl UnaryOp {
    pub fn symbol(self) -> &'static str {
        match self {
            UnaryOp::Inc => "++",
            UnaryOp::Dec => "--",
            UnaryOp::Neg => "-",
            UnaryOp::Not => "!",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    BitAnd,
    BitOr,
    BitXor,
    Shl,
    Shr,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    And,
    Or,
    Assign,
}

impl BinaryOp {
    pub fn is_relational(self) -> bool {
        matches!(
            self,
            BinaryOp::Eq | BinaryOp::Ne | BinaryOp::Lt | BinaryOp::Le | BinaryOp::Gt | BinaryOp::Ge
        )
    }

    pub fn is_logical(self) -> bool {
        matches!(self, BinaryOp::And | BinaryOp::Or)
    }

    pub fn symbol(self) -> &'static str {
        match self {
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
            BinaryOp::Mod => "%",
            BinaryOp::BitAnd => "&",
            BinaryOp::BitOr => "|",
            BinaryOp::BitXor => "^",
            BinaryOp::Shl => "<<",
            BinaryOp::Shr => ">>",
            BinaryOp::Eq => "==",
            BinaryOp::Ne => "!=",
            BinaryOp::Lt => "<",
            BinaryOp::Le => "<=",
            BinaryOp::Gt => ">",
            BinaryOp::Ge => ">=",
            BinaryOp::And => "&&",
            BinaryOp::Or => "||",
            BinaryOp::Assign => "=",
        }
    }
}

/// Conversion the backend must synthesize a call for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Helper {
    StringConvert,
    StringConcat,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ExprKind {
    Null,
    Lit(Value),
    Id(String),
    Array {
        base: ExprId,
        index: ExprId,
    },
    Cast {
        operand: ExprId,
        to: Meta,
    },
    Unary {
        op: UnaryOp,
        operand: ExprId,
        prefix: bool,
    },
    Binary {
        op: BinaryOp,
        lhs: ExprId,
        rhs: ExprId,
    },
    Ternary {
        cond: ExprId,
        then: ExprId,
        otherwise: ExprId,
    },
    Access {
        qual: ExprId,
        field: String,
    },
    Call {
        callee: ExprId,
        args: Vec<ExprId>,
    },
    Tuple(Vec<ExprId>),
    Init {
        elems: Vec<ExprId>,
        slot: Option<MemRef>,
    },
    Alloc {
        slot: Option<MemRef>,
    },
    Global(String),
    Register(u32),
    Memory(MemRef),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Expr {
    pub kind: ExprKind,
    pub meta: Meta,
    /// Declaration this expression refers to, as resolved by the parser.
    pub ident: Option<IdentId>,
    pub helper: Option<Helper>,
    pub pos: SrcPos,
}

impl Expr {
    pub fn new(kind: ExprKind, meta: Meta, pos: SrcPos) -> Self {
        Self {
            kind,
            meta,
            ident: None,
            helper: None,
            pos,
        }
    }

    pub fn location(&self) -> Option<Location> {
        match &self.kind {
            ExprKind::Global(name) => Some(Location::Global(name.clone())),
            ExprKind::Register(idx) => Some(Location::Register(*idx)),
            ExprKind::Memory(mem) => Some(Location::Memory(mem.clone())),
            ExprKind::Init {
                slot: Some(mem), ..
            }
            | ExprKind::Alloc { slot: Some(mem) } => Some(Location::Memory(mem.clone())),
            _ => None,
        }
    }

    pub fn is_located(&self) -> bool {
        matches!(
            self.kind,
            ExprKind::Global(_) | ExprKind::Register(_) | ExprKind::Memory(_)
        )
    }

    pub fn is_lit(&self) -> bool {
        matches!(self.kind, ExprKind::Lit(_))
    }

    pub fn lit(&self) -> Option<&Value> {
        match &self.kind {
            ExprKind::Lit(v) => Some(v),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum StmtKind {
    Null,
    Break,
    Continue,
    Exp(ExprId),
    /// Produced by lowering only.
    Assign {
        lhs: ExprId,
        rhs: ExprId,
    },
    If {
        cond: ExprId,
        then_blk: Option<BlockId>,
        elifs: Vec<StmtId>,
        else_blk: Option<BlockId>,
    },
    /// `for init; cond; step`. Declared loop variables go to `init_ids`,
    /// otherwise an init expression may be given.
    For {
        init_ids: Vec<IdentId>,
        init: Option<ExprId>,
        cond: Option<ExprId>,
        step: Option<ExprId>,
        blk: Option<BlockId>,
    },
    /// `for x in seq`. Declared targets go to `targets`, otherwise `target`
    /// names an existing variable.
    Each {
        targets: Vec<IdentId>,
        target: Option<ExprId>,
        seq: ExprId,
        blk: Option<BlockId>,
    },
    Switch {
        selector: Option<ExprId>,
        cases: Vec<StmtId>,
    },
    /// `value == None` is the default case.
    Case {
        value: Option<ExprId>,
        stmts: Vec<StmtId>,
    },
    Return(Option<ExprId>),
    Goto(String),
    Block(BlockId),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Stmt {
    pub kind: StmtKind,
    pub label: Option<String>,
    pub pos: SrcPos,
}

impl Stmt {
    pub fn new(kind: StmtKind, pos: SrcPos) -> Self {
        Self {
            kind,
            label: None,
            pos,
        }
    }
}

/// Labels synthesized for a desugared loop.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoopLabels {
    pub begin: String,
    pub end: String,
    pub cont: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Block {
    pub stmts: Vec<StmtId>,
    pub ids: Vec<IdentId>,
    pub up: Option<BlockId>,
    pub num: u32,
    pub loop_labels: Option<LoopLabels>,
    pub pos: SrcPos,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Scope {
    Global,
    Param,
    Local,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FuncDecl {
    pub params: Vec<IdentId>,
    pub ret: Vec<Meta>,
    pub is_ctor: bool,
    pub body: Option<BlockId>,
}

impl FuncDecl {
    /// Shape of the value a call to this function produces.
    pub fn ret_meta(&self) -> Meta {
        match self.ret.as_slice() {
            [] => Meta::void(),
            [single] => single.clone(),
            many => Meta::tuple(many.to_vec()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum IdentKind {
    Var,
    Func(FuncDecl),
    Contract { blk: BlockId },
    Field,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Ident {
    pub name: String,
    pub kind: IdentKind,
    pub meta: Meta,
    pub scope: Scope,
    /// Register slot, assigned when the owning function is translated.
    pub slot: Option<u32>,
    /// Fixed address inside the contract instance, for globals.
    pub addr: Option<u32>,
    pub init: Option<ExprId>,
    pub pos: SrcPos,
}

impl Ident {
    pub fn is_var(&self) -> bool {
        matches!(self.kind, IdentKind::Var)
    }

    pub fn is_global(&self) -> bool {
        self.scope == Scope::Global
    }

    pub fn func(&self) -> Option<&FuncDecl> {
        match &self.kind {
            IdentKind::Func(decl) => Some(decl),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Ast {
    exprs: Vec<Expr>,
    stmts: Vec<Stmt>,
    blocks: Vec<Block>,
    idents: Vec<Ident>,
    pub contracts: Vec<IdentId>,
    next_block_num: u32,
}

impl Ast {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_expr(&mut self, expr: Expr) -> ExprId {
        let id = ExprId(self.exprs.len() as u32);
        self.exprs.push(expr);
        id
    }

    pub fn expr(&self, id: ExprId) -> &Expr {
        &self.exprs[id.index()]
    }

    pub fn expr_mut(&mut self, id: ExprId) -> &mut Expr {
        &mut self.exprs[id.index()]
    }

    pub fn add_stmt(&mut self, stmt: Stmt) -> StmtId {
        let id = StmtId(self.stmts.len() as u32);
        self.stmts.push(stmt);
        id
    }

    pub fn stmt(&self, id: StmtId) -> &Stmt {
        &self.stmts[id.index()]
    }

    pub fn stmt_mut(&mut self, id: StmtId) -> &mut Stmt {
        &mut self.stmts[id.index()]
    }

    /// Creates an empty block nested in `up`. Block numbers increase
    /// monotonically across the whole tree and seed synthesized labels.
    pub fn new_block(&mut self, up: Option<BlockId>, pos: SrcPos) -> BlockId {
        let id = BlockId(self.blocks.len() as u32);
        self.blocks.push(Block {
            stmts: Vec::new(),
            ids: Vec::new(),
            up,
            num: self.next_block_num,
            loop_labels: None,
            pos,
        });
        self.next_block_num += 1;
        id
    }

    pub fn block(&self, id: BlockId) -> &Block {
        &self.blocks[id.index()]
    }

    pub fn block_mut(&mut self, id: BlockId) -> &mut Block {
        &mut self.blocks[id.index()]
    }

    pub fn add_ident(&mut self, ident: Ident) -> IdentId {
        let id = IdentId(self.idents.len() as u32);
        self.idents.push(ident);
        id
    }

    pub fn ident(&self, id: IdentId) -> &Ident {
        &self.idents[id.index()]
    }

    pub fn ident_mut(&mut self, id: IdentId) -> &mut Ident {
        &mut self.idents[id.index()]
    }

    pub fn expr_count(&self) -> usize {
        self.exprs.len()
    }

    pub fn stmt_label(&self, id: StmtId) -> Option<&str> {
        self.stmt(id).label.as_deref()
    }

    /// Copies a single node; the copy shares the original's children.
    pub fn dup_expr(&mut self, id: ExprId) -> ExprId {
        let copy = self.expr(id).clone();
        self.add_expr(copy)
    }

    /// Copies a whole subtree so that the copy can be rewritten independently.
    pub fn clone_expr(&mut self, id: ExprId) -> ExprId {
        let mut copy = self.expr(id).clone();

        copy.kind = match copy.kind {
            ExprKind::Array { base, index } => ExprKind::Array {
                base: self.clone_expr(base),
                index: self.clone_expr(index),
            },
            ExprKind::Cast { operand, to } => ExprKind::Cast {
                operand: self.clone_expr(operand),
                to,
            },
            ExprKind::Unary {
                op,
                operand,
                prefix,
            } => ExprKind::Unary {
                op,
                operand: self.clone_expr(operand),
                prefix,
            },
            ExprKind::Binary { op, lhs, rhs } => ExprKind::Binary {
                op,
                lhs: self.clone_expr(lhs),
                rhs: self.clone_expr(rhs),
            },
            ExprKind::Ternary {
                cond,
                then,
                otherwise,
            } => ExprKind::Ternary {
                cond: self.clone_expr(cond),
                then: self.clone_expr(then),
                otherwise: self.clone_expr(otherwise),
            },
            ExprKind::Access { qual, field } => ExprKind::Access {
                qual: self.clone_expr(qual),
                field,
            },
            ExprKind::Call { callee, args } => ExprKind::Call {
                callee: self.clone_expr(callee),
                args: args.into_iter().map(|a| self.clone_expr(a)).collect(),
            },
            ExprKind::Tuple(elems) => {
                ExprKind::Tuple(elems.into_iter().map(|e| self.clone_expr(e)).collect())
            }
            ExprKind::Init { elems, slot } => ExprKind::Init {
                elems: elems.into_iter().map(|e| self.clone_expr(e)).collect(),
                slot,
            },
            other => other,
        };

        self.add_expr(copy)
    }

    /// Replaces the contents of `dst` with those of `src`. The position of
    /// `dst` is kept, and so is its shape when `keep_meta` is set.
    pub fn replace_expr(&mut self, dst: ExprId, src: ExprId, keep_meta: bool) {
        let mut replacement = self.expr(src).clone();
        let old = self.expr_mut(dst);

        replacement.pos = old.pos;
        if keep_meta {
            replacement.meta = std::mem::take(&mut old.meta);
        }
        *old = replacement;
    }

    /// Gives an expression its storage location. A node is located at most
    /// once; the only later change allowed is `reinterpret`.
    pub fn locate(&mut self, id: ExprId, location: Location) -> Result<()> {
        let expr = self.expr_mut(id);

        if expr.location().is_some() {
            return Err(CompileError::internal(format!(
                "expression {} at {} is already located",
                id, expr.pos
            )));
        }

        expr.kind = match location {
            Location::Global(name) => ExprKind::Global(name),
            Location::Register(idx) => ExprKind::Register(idx),
            Location::Memory(mem) => ExprKind::Memory(mem),
        };
        Ok(())
    }

    /// Takes the address of a memory operand: the node now denotes the base
    /// register the memory reference is relative to.
    pub fn reinterpret(&mut self, id: ExprId) -> Result<()> {
        let expr = self.expr_mut(id);

        match &expr.kind {
            ExprKind::Memory(mem) => {
                expr.kind = ExprKind::Register(mem.base);
                Ok(())
            }
            other => Err(CompileError::internal(format!(
                "cannot reinterpret {:?} at {} as an address",
                other, expr.pos
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::BaseType;

    fn int_lit(ast: &mut Ast, v: i64) -> ExprId {
        ast.add_expr(Expr::new(
            ExprKind::Lit(Value::Int(v)),
            Meta::untyped_int(),
            SrcPos::default(),
        ))
    }

    #[test]
    fn test_block_numbers_are_monotonic() {
        let mut ast = Ast::new();
        let a = ast.new_block(None, SrcPos::default());
        let b = ast.new_block(Some(a), SrcPos::default());

        assert!(ast.block(b).num > ast.block(a).num);
        assert_eq!(ast.block(b).up, Some(a));
    }

    #[test]
    fn test_clone_expr_is_deep() {
        let mut ast = Ast::new();
        let lhs = int_lit(&mut ast, 1);
        let rhs = int_lit(&mut ast, 2);
        let sum = ast.add_expr(Expr::new(
            ExprKind::Binary {
                op: BinaryOp::Add,
                lhs,
                rhs,
            },
            Meta::new(BaseType::Int32),
            SrcPos::default(),
        ));

        let copy = ast.clone_expr(sum);
        let ExprKind::Binary { lhs: clhs, .. } = ast.expr(copy).kind.clone() else {
            panic!("expected binary copy");
        };

        assert_ne!(copy, sum);
        assert_ne!(clhs, lhs);
        assert_eq!(ast.expr(clhs).kind, ast.expr(lhs).kind);
    }

    #[test]
    fn test_locate_only_once() {
        let mut ast = Ast::new();
        let e = int_lit(&mut ast, 0);

        ast.locate(e, Location::Register(3)).unwrap();
        assert_eq!(ast.expr(e).location(), Some(Location::Register(3)));

        let err = ast.locate(e, Location::Register(4)).unwrap_err();
        assert!(err.is_fatal());
    }

    #[test]
    fn test_reinterpret_memory_as_base_register() {
        let mut ast = Ast::new();
        let e = int_lit(&mut ast, 0);

        ast.locate(e, Location::Memory(MemRef::new(5, 8, 4))).unwrap();
        ast.reinterpret(e).unwrap();
        assert_eq!(ast.expr(e).kind, ExprKind::Register(5));

        assert!(ast.reinterpret(e).is_err());
    }
}
