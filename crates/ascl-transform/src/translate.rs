use crate::lower::{ExpressionLowering, LowerCtx};
use ascl_core::{
    Ast, BaseType, BasicBlockId, BinaryOp, BlockId, CompileError, CompileOptions, DataSegment,
    Expr, ExprId, ExprKind, IdentId, IrFn, MemRef, Meta, Result, SrcPos, Stmt, StmtId, StmtKind,
    Terminator, Value,
};
use tracing::debug;

/// Where `break` and `continue` go inside the construct being translated.
#[derive(Debug, Clone)]
enum JumpTarget {
    Loop { end: String, cont: String },
    Switch { join: BasicBlockId },
}

/// Turns one checked function body into basic blocks of lowered statements.
pub struct FunctionTranslator<'a> {
    ast: &'a mut Ast,
    segment: &'a mut DataSegment,
    options: &'a CompileOptions,
    func: IrFn,
    lowering: ExpressionLowering,
    targets: Vec<JumpTarget>,
}

impl<'a> FunctionTranslator<'a> {
    pub fn new(
        ast: &'a mut Ast,
        segment: &'a mut DataSegment,
        options: &'a CompileOptions,
        func_id: IdentId,
    ) -> Result<Self> {
        let ident = ast.ident(func_id);
        let decl = ident.func().ok_or_else(|| {
            CompileError::internal(format!("'{}' is not a function", ident.name))
        })?;

        let params: Vec<IdentId> = decl.params.clone();
        let func = IrFn::new(
            ident.name.clone(),
            func_id,
            decl.ret_meta(),
            params.iter().map(|&p| {
                let param = ast.ident(p);
                (param.name.clone(), param.meta.clone())
            }),
        );

        for (i, &p) in params.iter().enumerate() {
            ast.ident_mut(p).slot = Some(i as u32 + 1);
        }

        Ok(Self {
            ast,
            segment,
            options,
            func,
            lowering: ExpressionLowering::new(),
            targets: Vec::new(),
        })
    }

    pub fn translate(mut self) -> Result<IrFn> {
        let body = self
            .ast
            .ident(self.func.ident)
            .func()
            .and_then(|decl| decl.body);

        if let Some(body) = body {
            self.translate_block(body)?;
        }
        self.func.finish();

        debug!(
            function = %self.func.name,
            blocks = self.func.blocks.len(),
            registers = self.func.registers.len(),
            stack = self.func.stack_usage,
            heap = self.func.heap_usage,
            "translated function"
        );
        Ok(self.func)
    }

    fn lower(&mut self, id: ExprId) -> Result<()> {
        let mut ctx = LowerCtx::new(self.ast, self.segment, &mut self.func, self.options);
        self.lowering.lower(&mut ctx, id)
    }

    fn lower_on_heap(&mut self, id: ExprId) -> Result<()> {
        let mut ctx = LowerCtx::new(self.ast, self.segment, &mut self.func, self.options);
        self.lowering.lower_on_heap(&mut ctx, id)
    }

    fn new_expr(&mut self, kind: ExprKind, meta: Meta, pos: SrcPos) -> ExprId {
        self.ast.add_expr(Expr::new(kind, meta, pos))
    }

    fn emit_assign(&mut self, lhs: ExprId, rhs: ExprId, pos: SrcPos) {
        let stmt = self
            .ast
            .add_stmt(Stmt::new(StmtKind::Assign { lhs, rhs }, pos));
        self.func.add_stmt(stmt);
    }

    /// Copies the value of `id` into a fresh register when postfix side
    /// effects are pending, so they can run before the value is used.
    fn settle(&mut self, id: ExprId, name: &str) -> ExprId {
        if !self.func.has_piggybacks() {
            return id;
        }

        let expr = self.ast.expr(id);
        let (meta, pos) = (expr.meta.clone(), expr.pos);
        let reg = self.func.add_reg(name, meta.clone());
        let lhs = self.new_expr(ExprKind::Register(reg), meta.clone(), pos);
        self.emit_assign(lhs, id, pos);
        self.func.flush_piggybacks();
        self.new_expr(ExprKind::Register(reg), meta, pos)
    }

    fn translate_block(&mut self, blk: BlockId) -> Result<()> {
        let ids = self.ast.block(blk).ids.clone();
        for id in ids {
            self.declare_local(id)?;
        }

        let labels = self.ast.block(blk).loop_labels.clone();
        if let Some(labels) = &labels {
            self.targets.push(JumpTarget::Loop {
                end: labels.end.clone(),
                cont: labels.cont.clone(),
            });
        }

        let stmts = self.ast.block(blk).stmts.clone();
        let result = stmts.into_iter().try_for_each(|s| self.translate_stmt(s));

        if labels.is_some() {
            self.targets.pop();
        }
        result
    }

    /// Gives a block-level variable its register and runs its initializer.
    fn declare_local(&mut self, id: IdentId) -> Result<()> {
        let ident = self.ast.ident(id);
        if !ident.is_var() {
            return Ok(());
        }

        let (name, meta, init, pos) = (ident.name.clone(), ident.meta.clone(), ident.init, ident.pos);
        let reg = self.func.add_reg(name, meta.clone());
        self.ast.ident_mut(id).slot = Some(reg);

        if meta.is_aggregate() {
            // The register holds the address of the variable's own storage.
            let slot = self.func.alloc(&meta);
            let uint32 = Meta::new(BaseType::Uint32);
            let lhs = self.new_expr(ExprKind::Register(reg), uint32.clone(), pos);
            let base = self.new_expr(ExprKind::Register(slot.base), uint32.clone(), pos);
            let addr = self.new_expr(
                ExprKind::Lit(Value::Int(i64::from(slot.addr))),
                Meta::new(BaseType::Int32),
                pos,
            );
            let rhs = self.new_expr(
                ExprKind::Binary {
                    op: BinaryOp::Add,
                    lhs: base,
                    rhs: addr,
                },
                uint32,
                pos,
            );
            self.emit_assign(lhs, rhs, pos);
        }

        let Some(init) = init else {
            return Ok(());
        };

        self.lower(init)?;
        let lhs = if meta.is_aggregate() {
            self.new_expr(ExprKind::Memory(MemRef::new(reg, 0, 0)), meta, pos)
        } else {
            self.new_expr(ExprKind::Register(reg), meta, pos)
        };
        self.emit_assign(lhs, init, pos);
        self.func.flush_piggybacks();
        Ok(())
    }

    fn translate_stmt(&mut self, id: StmtId) -> Result<()> {
        let stmt = self.ast.stmt(id).clone();

        if let Some(label) = &stmt.label {
            let bb = self.func.label_block(label);
            self.func.switch_to(bb);
        }

        match stmt.kind {
            StmtKind::Null => Ok(()),
            StmtKind::Exp(e) => self.translate_exp(id, e),
            StmtKind::Assign { lhs, rhs } => {
                self.lower(lhs)?;
                self.lower(rhs)?;
                self.func.add_stmt(id);
                self.func.flush_piggybacks();
                Ok(())
            }
            StmtKind::If {
                cond,
                then_blk,
                elifs,
                else_blk,
            } => self.translate_if(cond, then_blk, &elifs, else_blk),
            StmtKind::Switch { selector, cases } => self.translate_switch(selector, &cases),
            StmtKind::Return(arg) => self.translate_return(arg),
            StmtKind::Goto(label) => {
                let target = self.func.label_block(&label);
                self.end_with(Terminator::Jump(target));
                Ok(())
            }
            StmtKind::Break => {
                let target = match self.targets.last() {
                    Some(JumpTarget::Loop { end, .. }) => {
                        let end = end.clone();
                        self.func.label_block(&end)
                    }
                    Some(JumpTarget::Switch { join }) => *join,
                    None => {
                        return Err(CompileError::internal(format!(
                            "break outside of a loop or switch at {}",
                            stmt.pos
                        )))
                    }
                };
                self.end_with(Terminator::Jump(target));
                Ok(())
            }
            StmtKind::Continue => {
                let cont = self.targets.iter().rev().find_map(|t| match t {
                    JumpTarget::Loop { cont, .. } => Some(cont.clone()),
                    JumpTarget::Switch { .. } => None,
                });
                let Some(cont) = cont else {
                    return Err(CompileError::internal(format!(
                        "continue outside of a loop at {}",
                        stmt.pos
                    )));
                };
                let target = self.func.label_block(&cont);
                self.end_with(Terminator::Jump(target));
                Ok(())
            }
            StmtKind::Block(blk) => self.translate_block(blk),
            StmtKind::For { .. } | StmtKind::Each { .. } => Err(CompileError::internal(format!(
                "loop at {} reached translation without being desugared",
                stmt.pos
            ))),
            StmtKind::Case { .. } => Err(CompileError::internal(format!(
                "case statement outside of a switch at {}",
                stmt.pos
            ))),
        }
    }

    /// Terminates the current block; anything after it lands in a fresh,
    /// unlabeled block.
    fn end_with(&mut self, term: Terminator) {
        self.func.terminate(term);
        self.func.open_block();
    }

    fn translate_exp(&mut self, id: StmtId, e: ExprId) -> Result<()> {
        self.lower(e)?;

        // A call still unlocated after lowering has placed itself; a bare
        // location has no effect.
        let expr = self.ast.expr(e);
        let placed =
            matches!(expr.kind, ExprKind::Call { .. }) || expr.is_located() || expr.is_lit();
        if !placed {
            self.func.add_stmt(id);
        }
        self.func.flush_piggybacks();
        Ok(())
    }

    fn translate_if(
        &mut self,
        cond: ExprId,
        then_blk: Option<BlockId>,
        elifs: &[StmtId],
        else_blk: Option<BlockId>,
    ) -> Result<()> {
        self.lower(cond)?;
        let pending = self.func.take_piggybacks();

        let then_bb = self.func.new_block(None);
        let else_bb = self.func.new_block(None);
        let join = self.func.new_block(None);
        self.func.terminate(Terminator::Branch {
            cond,
            then_bb,
            else_bb,
        });

        self.func.switch_to(then_bb);
        self.func.add_stmts(&pending);
        if let Some(blk) = then_blk {
            self.translate_block(blk)?;
        }
        self.func.jump(join);

        self.func.switch_to(else_bb);
        self.func.add_stmts(&pending);
        match elifs.split_first() {
            Some((&first, rest)) => {
                let StmtKind::If {
                    cond: elif_cond,
                    then_blk: elif_blk,
                    ..
                } = self.ast.stmt(first).kind.clone()
                else {
                    return Err(CompileError::internal(format!(
                        "else-if branch {} is not a conditional",
                        first
                    )));
                };
                self.translate_if(elif_cond, elif_blk, rest, else_blk)?;
            }
            None => {
                if let Some(blk) = else_blk {
                    self.translate_block(blk)?;
                }
            }
        }
        self.func.jump(join);

        self.func.switch_to(join);
        Ok(())
    }

    /// Lowers a switch into a chain of equality tests in case order, with
    /// the default arm reached when every test fails. Arms do not fall through.
    fn translate_switch(&mut self, selector: Option<ExprId>, cases: &[StmtId]) -> Result<()> {
        let selector = match selector {
            Some(sel) => {
                self.lower(sel)?;
                Some(self.settle(sel, "switch$val"))
            }
            None => None,
        };

        let join = self.func.new_block(None);
        self.targets.push(JumpTarget::Switch { join });

        let mut default = None;
        for &case in cases {
            let case_stmt = self.ast.stmt(case);
            let pos = case_stmt.pos;
            let StmtKind::Case { value, stmts } = case_stmt.kind.clone() else {
                return Err(CompileError::internal(format!(
                    "switch arm {} is not a case",
                    case
                )));
            };

            let Some(value) = value else {
                default = Some(stmts);
                continue;
            };

            self.lower(value)?;
            let cond = match selector {
                Some(sel) => {
                    let lhs = self.ast.dup_expr(sel);
                    self.new_expr(
                        ExprKind::Binary {
                            op: BinaryOp::Eq,
                            lhs,
                            rhs: value,
                        },
                        Meta::new(BaseType::Bool),
                        pos,
                    )
                }
                None => value,
            };
            let pending = self.func.take_piggybacks();

            let body_bb = self.func.new_block(None);
            let next_bb = self.func.new_block(None);
            self.func.terminate(Terminator::Branch {
                cond,
                then_bb: body_bb,
                else_bb: next_bb,
            });

            self.func.switch_to(body_bb);
            self.func.add_stmts(&pending);
            for s in stmts {
                self.translate_stmt(s)?;
            }
            self.func.jump(join);

            self.func.switch_to(next_bb);
            self.func.add_stmts(&pending);
        }

        if let Some(stmts) = default {
            for s in stmts {
                self.translate_stmt(s)?;
            }
        }
        self.func.jump(join);
        self.func.switch_to(join);

        self.targets.pop();
        Ok(())
    }

    fn translate_return(&mut self, arg: Option<ExprId>) -> Result<()> {
        let value = match arg {
            Some(e) => {
                if self.options.heap_return_values {
                    self.lower_on_heap(e)?;
                } else {
                    self.lower(e)?;
                }
                Some(self.settle(e, "ret$val"))
            }
            None => None,
        };

        self.end_with(Terminator::Return(value));
        Ok(())
    }
}

/// Translates the function declared as `func_id`. The function must have
/// been checked.
pub fn translate_function(
    ast: &mut Ast,
    segment: &mut DataSegment,
    options: &CompileOptions,
    func_id: IdentId,
) -> Result<IrFn> {
    FunctionTranslator::new(ast, segment, options, func_id)?.translate()
}
