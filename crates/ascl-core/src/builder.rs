/*! Fluent construction of syntax trees.
 *
 * The parser produces trees through the same calls, and tests use them to describe small contracts
 * without spelling out arena bookkeeping. Expressions get the shape a resolved parser would give them;
 * system-function calls are left untyped for the checker to complete.
 */

use crate::ast::{
    Ast, BinaryOp, BlockId, Expr, ExprId, ExprKind, FuncDecl, Ident, IdentId, IdentKind, Scope,
    Stmt, StmtId, StmtKind, UnaryOp,
};
use crate::source_location::SrcPos;
use crate::types::{BaseType, Meta};
use crate::values::Value;

#[derive(Debug, Default)]
pub struct AstBuilder {
    ast: Ast,
    pos: SrcPos,
}

impl AstBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn finish(self) -> Ast {
        self.ast
    }

    pub fn ast(&self) -> &Ast {
        &self.ast
    }

    pub fn ast_mut(&mut self) -> &mut Ast {
        &mut self.ast
    }

    /// Source position stamped on every node created afterwards.
    pub fn at(&mut self, line: u32, column: u32) -> &mut Self {
        self.pos = SrcPos::at(line, column);
        self
    }

    fn ident(&mut self, name: &str, kind: IdentKind, meta: Meta, scope: Scope) -> IdentId {
        self.ast.add_ident(Ident {
            name: name.to_string(),
            kind,
            meta,
            scope,
            slot: None,
            addr: None,
            init: None,
            pos: self.pos,
        })
    }

    pub fn contract(&mut self, name: &str) -> (IdentId, BlockId) {
        let blk = self.ast.new_block(None, self.pos);
        let id = self.ident(
            name,
            IdentKind::Contract { blk },
            Meta::new(BaseType::Account).named(name),
            Scope::Global,
        );
        self.ast.contracts.push(id);
        (id, blk)
    }

    pub fn global(&mut self, contract_blk: BlockId, name: &str, meta: Meta) -> IdentId {
        let id = self.ident(name, IdentKind::Var, meta, Scope::Global);
        self.ast.block_mut(contract_blk).ids.push(id);
        id
    }

    /// Declares a function of the contract and returns it with its body block.
    pub fn function(
        &mut self,
        contract_blk: BlockId,
        name: &str,
        params: Vec<(&str, Meta)>,
        ret: Vec<Meta>,
    ) -> (IdentId, BlockId) {
        self.declare_fn(contract_blk, name, params, ret, false)
    }

    pub fn constructor(
        &mut self,
        contract_blk: BlockId,
        name: &str,
        params: Vec<(&str, Meta)>,
    ) -> (IdentId, BlockId) {
        self.declare_fn(contract_blk, name, params, Vec::new(), true)
    }

    fn declare_fn(
        &mut self,
        contract_blk: BlockId,
        name: &str,
        params: Vec<(&str, Meta)>,
        ret: Vec<Meta>,
        is_ctor: bool,
    ) -> (IdentId, BlockId) {
        let params = params
            .into_iter()
            .map(|(pname, meta)| self.ident(pname, IdentKind::Var, meta, Scope::Param))
            .collect();
        let body = self.ast.new_block(Some(contract_blk), self.pos);
        let decl = FuncDecl {
            params,
            ret,
            is_ctor,
            body: Some(body),
        };
        let meta = decl.ret_meta();
        let id = self.ident(name, IdentKind::Func(decl), meta, Scope::Global);
        self.ast.block_mut(contract_blk).ids.push(id);
        (id, body)
    }

    pub fn block(&mut self, up: Option<BlockId>) -> BlockId {
        self.ast.new_block(up, self.pos)
    }

    /// Declares a local variable at the top of `blk`.
    pub fn local(&mut self, blk: BlockId, name: &str, meta: Meta, init: Option<ExprId>) -> IdentId {
        let id = self.var(name, meta, init);
        self.ast.block_mut(blk).ids.push(id);
        id
    }

    /// Declares a local variable that is not yet attached to any block, such
    /// as a loop variable.
    pub fn var(&mut self, name: &str, meta: Meta, init: Option<ExprId>) -> IdentId {
        let id = self.ident(name, IdentKind::Var, meta, Scope::Local);
        self.ast.ident_mut(id).init = init;
        id
    }

    fn expr(&mut self, kind: ExprKind, meta: Meta) -> ExprId {
        self.ast.add_expr(Expr::new(kind, meta, self.pos))
    }

    fn meta_of(&self, id: ExprId) -> Meta {
        self.ast.expr(id).meta.clone()
    }

    pub fn int(&mut self, v: i64) -> ExprId {
        self.expr(ExprKind::Lit(Value::Int(v)), Meta::untyped_int())
    }

    pub fn typed_int(&mut self, v: i64, ty: BaseType) -> ExprId {
        self.expr(ExprKind::Lit(Value::Int(v)), Meta::new(ty))
    }

    pub fn boolean(&mut self, v: bool) -> ExprId {
        self.expr(ExprKind::Lit(Value::Bool(v)), Meta::new(BaseType::Bool))
    }

    pub fn string(&mut self, s: &str) -> ExprId {
        self.expr(
            ExprKind::Lit(Value::Str(s.to_string())),
            Meta::new(BaseType::String),
        )
    }

    pub fn null(&mut self) -> ExprId {
        self.expr(ExprKind::Lit(Value::Null), Meta::new(BaseType::Object))
    }

    /// Reference to a declared identifier.
    pub fn id(&mut self, ident: IdentId) -> ExprId {
        let decl = self.ast.ident(ident);
        let (name, meta) = (decl.name.clone(), decl.meta.clone());
        let e = self.expr(ExprKind::Id(name), meta);
        self.ast.expr_mut(e).ident = Some(ident);
        e
    }

    /// Unresolved name, e.g. a qualified system function.
    pub fn name(&mut self, name: &str) -> ExprId {
        self.expr(ExprKind::Id(name.to_string()), Meta::undefined())
    }

    pub fn index(&mut self, base: ExprId, index: ExprId) -> ExprId {
        let meta = self.meta_of(base).strip_dim();
        self.expr(ExprKind::Array { base, index }, meta)
    }

    pub fn cast(&mut self, operand: ExprId, to: Meta) -> ExprId {
        self.expr(
            ExprKind::Cast {
                operand,
                to: to.clone(),
            },
            to,
        )
    }

    pub fn unary(&mut self, op: UnaryOp, operand: ExprId, prefix: bool) -> ExprId {
        let meta = match op {
            UnaryOp::Not => Meta::new(BaseType::Bool),
            _ => self.meta_of(operand),
        };
        self.expr(
            ExprKind::Unary {
                op,
                operand,
                prefix,
            },
            meta,
        )
    }

    pub fn pre_inc(&mut self, operand: ExprId) -> ExprId {
        self.unary(UnaryOp::Inc, operand, true)
    }

    pub fn post_inc(&mut self, operand: ExprId) -> ExprId {
        self.unary(UnaryOp::Inc, operand, false)
    }

    pub fn post_dec(&mut self, operand: ExprId) -> ExprId {
        self.unary(UnaryOp::Dec, operand, false)
    }

    pub fn not(&mut self, operand: ExprId) -> ExprId {
        self.unary(UnaryOp::Not, operand, true)
    }

    pub fn binary(&mut self, op: BinaryOp, lhs: ExprId, rhs: ExprId) -> ExprId {
        let meta = if op.is_relational() || op.is_logical() {
            Meta::new(BaseType::Bool)
        } else {
            let lhs_meta = self.meta_of(lhs);
            if lhs_meta.untyped {
                self.meta_of(rhs)
            } else {
                lhs_meta
            }
        };
        self.expr(ExprKind::Binary { op, lhs, rhs }, meta)
    }

    pub fn assign(&mut self, lhs: ExprId, rhs: ExprId) -> ExprId {
        self.binary(BinaryOp::Assign, lhs, rhs)
    }

    pub fn ternary(&mut self, cond: ExprId, then: ExprId, otherwise: ExprId) -> ExprId {
        let meta = self.meta_of(then);
        self.expr(
            ExprKind::Ternary {
                cond,
                then,
                otherwise,
            },
            meta,
        )
    }

    /// Access to the `idx`-th declared element of a struct-shaped qualifier.
    pub fn field(&mut self, qual: ExprId, name: &str, idx: usize) -> ExprId {
        let meta = self
            .meta_of(qual)
            .elems
            .get(idx)
            .cloned()
            .unwrap_or_else(Meta::undefined);
        let field = self.ident(name, IdentKind::Field, meta.clone(), Scope::Local);
        let e = self.expr(
            ExprKind::Access {
                qual,
                field: name.to_string(),
            },
            meta,
        );
        self.ast.expr_mut(e).ident = Some(field);
        e
    }

    /// `qual.func` where `func` is a function of the qualifier's contract.
    pub fn method(&mut self, qual: ExprId, func: IdentId) -> ExprId {
        let decl = self.ast.ident(func);
        let (name, meta) = (decl.name.clone(), decl.meta.clone());
        let e = self.expr(ExprKind::Access { qual, field: name }, meta);
        self.ast.expr_mut(e).ident = Some(func);
        e
    }

    pub fn call(&mut self, callee: ExprId, args: Vec<ExprId>) -> ExprId {
        let meta = self
            .ast
            .expr(callee)
            .ident
            .and_then(|id| self.ast.ident(id).func().map(FuncDecl::ret_meta))
            .unwrap_or_else(Meta::undefined);
        self.expr(ExprKind::Call { callee, args }, meta)
    }

    pub fn tuple(&mut self, elems: Vec<ExprId>) -> ExprId {
        let metas = elems.iter().map(|e| self.meta_of(*e)).collect();
        self.expr(ExprKind::Tuple(elems), Meta::tuple(metas))
    }

    pub fn init(&mut self, elems: Vec<ExprId>, meta: Meta) -> ExprId {
        self.expr(ExprKind::Init { elems, slot: None }, meta)
    }

    pub fn alloc(&mut self, meta: Meta) -> ExprId {
        self.expr(ExprKind::Alloc { slot: None }, meta)
    }

    pub fn stmt(&mut self, kind: StmtKind) -> StmtId {
        self.ast.add_stmt(Stmt::new(kind, self.pos))
    }

    /// Appends `stmt` to the statement list of `blk`.
    pub fn push(&mut self, blk: BlockId, stmt: StmtId) -> StmtId {
        self.ast.block_mut(blk).stmts.push(stmt);
        stmt
    }

    pub fn label(&mut self, stmt: StmtId, label: &str) -> StmtId {
        self.ast.stmt_mut(stmt).label = Some(label.to_string());
        stmt
    }

    pub fn exp(&mut self, e: ExprId) -> StmtId {
        self.stmt(StmtKind::Exp(e))
    }

    pub fn if_stmt(
        &mut self,
        cond: ExprId,
        then_blk: Option<BlockId>,
        elifs: Vec<StmtId>,
        else_blk: Option<BlockId>,
    ) -> StmtId {
        self.stmt(StmtKind::If {
            cond,
            then_blk,
            elifs,
            else_blk,
        })
    }

    pub fn for_stmt(
        &mut self,
        init: Option<ExprId>,
        cond: Option<ExprId>,
        step: Option<ExprId>,
        blk: Option<BlockId>,
    ) -> StmtId {
        self.stmt(StmtKind::For {
            init_ids: Vec::new(),
            init,
            cond,
            step,
            blk,
        })
    }

    /// `for` whose init clause declares loop variables.
    pub fn for_decl(
        &mut self,
        init_ids: Vec<IdentId>,
        cond: Option<ExprId>,
        step: Option<ExprId>,
        blk: Option<BlockId>,
    ) -> StmtId {
        self.stmt(StmtKind::For {
            init_ids,
            init: None,
            cond,
            step,
            blk,
        })
    }

    pub fn each(&mut self, targets: Vec<IdentId>, seq: ExprId, blk: Option<BlockId>) -> StmtId {
        self.stmt(StmtKind::Each {
            targets,
            target: None,
            seq,
            blk,
        })
    }

    /// Iteration over existing variables instead of fresh declarations.
    pub fn each_into(&mut self, target: ExprId, seq: ExprId, blk: Option<BlockId>) -> StmtId {
        self.stmt(StmtKind::Each {
            targets: Vec::new(),
            target: Some(target),
            seq,
            blk,
        })
    }

    pub fn switch(&mut self, selector: Option<ExprId>, cases: Vec<StmtId>) -> StmtId {
        self.stmt(StmtKind::Switch { selector, cases })
    }

    pub fn case(&mut self, value: Option<ExprId>, stmts: Vec<StmtId>) -> StmtId {
        self.stmt(StmtKind::Case { value, stmts })
    }

    pub fn ret(&mut self, value: Option<ExprId>) -> StmtId {
        self.stmt(StmtKind::Return(value))
    }

    pub fn goto(&mut self, label: &str) -> StmtId {
        self.stmt(StmtKind::Goto(label.to_string()))
    }

    pub fn brk(&mut self) -> StmtId {
        self.stmt(StmtKind::Break)
    }

    pub fn cont(&mut self) -> StmtId {
        self.stmt(StmtKind::Continue)
    }

    pub fn null_stmt(&mut self) -> StmtId {
        self.stmt(StmtKind::Null)
    }

    pub fn block_stmt(&mut self, blk: BlockId) -> StmtId {
        self.stmt(StmtKind::Block(blk))
    }
}
