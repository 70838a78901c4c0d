/*! Expression lowering.
 *
 * Lowering rewrites a checked expression bottom-up until every operand names where its value lives: a
 * global, a register of the enclosing function, or a memory reference relative to a register. Side
 * effects that do not fit in an expression (increments, call results, aggregate copies) are emitted
 * as statements into the function's current basic block.
 */

use ascl_core::{
    align_to, AllocMode, Ast, BaseType, BinaryOp, CompileError, CompileOptions, DataSegment,
    DiagnosticKind, DynOffset, Expr, ExprId, ExprKind, Helper, IdentKind, IrFn, Location, MemRef,
    Meta, Result, Scope, SrcPos, Stmt, StmtId, StmtKind, UnaryOp, Value, RECEIVER_REG,
};
use tracing::trace;

/// Name of the temporary register a call result is captured in.
pub const CALL_RESULT_NAME: &str = "func$val";

/// Everything one function's lowering reads and writes.
pub struct LowerCtx<'a> {
    pub ast: &'a mut Ast,
    pub segment: &'a mut DataSegment,
    pub func: &'a mut IrFn,
    pub options: &'a CompileOptions,
}

impl<'a> LowerCtx<'a> {
    pub fn new(
        ast: &'a mut Ast,
        segment: &'a mut DataSegment,
        func: &'a mut IrFn,
        options: &'a CompileOptions,
    ) -> Self {
        Self {
            ast,
            segment,
            func,
            options,
        }
    }

    fn new_expr(&mut self, kind: ExprKind, meta: Meta, pos: SrcPos) -> ExprId {
        self.ast.add_expr(Expr::new(kind, meta, pos))
    }

    fn assign_stmt(&mut self, lhs: ExprId, rhs: ExprId, pos: SrcPos) -> StmtId {
        self.ast.add_stmt(Stmt::new(StmtKind::Assign { lhs, rhs }, pos))
    }

    /// Appends `lhs = rhs` to the current block.
    fn emit_assign(&mut self, lhs: ExprId, rhs: ExprId, pos: SrcPos) {
        let stmt = self.assign_stmt(lhs, rhs, pos);
        self.func.add_stmt(stmt);
    }
}

fn lit_index(value: &Value, pos: SrcPos) -> Result<u32> {
    value
        .as_int()
        .and_then(|v| u32::try_from(v).ok())
        .ok_or_else(|| CompileError::internal(format!("invalid literal index {} at {}", value, pos)))
}

#[derive(Debug, Default)]
pub struct ExpressionLowering;

impl ExpressionLowering {
    pub fn new() -> Self {
        Self
    }

    /// Lowers `id` and its children in place. Lowering an expression that
    /// already has a location does nothing.
    pub fn lower(&mut self, ctx: &mut LowerCtx, id: ExprId) -> Result<()> {
        let expr = ctx.ast.expr(id);
        if expr.location().is_some() {
            return Ok(());
        }

        match expr.kind.clone() {
            ExprKind::Null => Ok(()),
            ExprKind::Lit(value) => self.lower_lit(ctx, id, value),
            ExprKind::Id(_) => self.lower_id(ctx, id),
            ExprKind::Array { base, index } => self.lower_array(ctx, id, base, index),
            ExprKind::Cast { operand, to } => self.lower_cast(ctx, id, operand, &to),
            ExprKind::Unary {
                op,
                operand,
                prefix,
            } => self.lower_unary(ctx, id, op, operand, prefix),
            ExprKind::Binary { op, lhs, rhs } => self.lower_binary(ctx, id, op, lhs, rhs),
            ExprKind::Ternary {
                cond,
                then,
                otherwise,
            } => self.lower_ternary(ctx, id, cond, then, otherwise),
            ExprKind::Access { qual, .. } => self.lower_access(ctx, id, qual),
            ExprKind::Call { callee, args } => self.lower_call(ctx, id, callee, args),
            ExprKind::Tuple(elems) => {
                for e in elems {
                    self.lower(ctx, e)?;
                }
                Ok(())
            }
            ExprKind::Init { .. } => self.lower_init(ctx, id, false),
            ExprKind::Alloc { .. } => {
                let slot = ctx.func.alloc(&ctx.ast.expr(id).meta);
                ctx.ast.expr_mut(id).kind = ExprKind::Alloc { slot: Some(slot) };
                Ok(())
            }
            ExprKind::Global(_) | ExprKind::Register(_) | ExprKind::Memory(_) => Ok(()),
        }
    }

    fn lower_lit(&mut self, ctx: &mut LowerCtx, id: ExprId, value: Value) -> Result<()> {
        if value.is_scalar() {
            return Ok(());
        }

        let bytes = value.to_bytes(&ctx.ast.expr(id).meta);
        let addr = ctx.segment.add_blob(&bytes);
        ctx.ast.expr_mut(id).kind = ExprKind::Lit(Value::Addr(addr));
        Ok(())
    }

    fn lower_id(&mut self, ctx: &mut LowerCtx, id: ExprId) -> Result<()> {
        let expr = ctx.ast.expr(id);
        let Some(ident_id) = expr.ident else {
            return Err(CompileError::internal(format!(
                "unresolved identifier {:?} at {}",
                expr.kind, expr.pos
            )));
        };
        let ident = ctx.ast.ident(ident_id).clone();

        let location = match &ident.kind {
            IdentKind::Var if ident.scope == Scope::Global => {
                let addr = ident.addr.ok_or_else(|| {
                    CompileError::internal(format!("global '{}' has no address", ident.name))
                })?;
                Location::Memory(MemRef::new(RECEIVER_REG, addr, 0))
            }
            IdentKind::Var => {
                let slot = ident.slot.ok_or_else(|| {
                    CompileError::internal(format!("'{}' has no register", ident.name))
                })?;
                Location::Register(slot)
            }
            IdentKind::Func(_) | IdentKind::Contract { .. } => {
                ctx.ast.expr_mut(id).meta = Meta::new(BaseType::Uint32);
                Location::Register(RECEIVER_REG)
            }
            IdentKind::Field => {
                return Err(CompileError::internal(format!(
                    "field '{}' referenced without a qualifier",
                    ident.name
                )))
            }
        };

        ctx.ast.locate(id, location)
    }

    fn lower_array(
        &mut self,
        ctx: &mut LowerCtx,
        id: ExprId,
        base: ExprId,
        index: ExprId,
    ) -> Result<()> {
        self.lower(ctx, base)?;
        self.lower(ctx, index)?;

        let base_expr = ctx.ast.expr(base);
        if base_expr.meta.is_map() {
            return Err(CompileError::diagnostic(
                DiagnosticKind::NotSupported("map indexing".to_string()),
                base_expr.pos,
            ));
        }

        if !base_expr.meta.is_array() {
            return Ok(());
        }

        let stride = base_expr.meta.strip_dim().size();
        let mut mem = match base_expr.location() {
            Some(Location::Memory(mem)) => mem,
            Some(Location::Register(reg)) => MemRef::new(reg, 0, 0),
            _ => {
                return Err(CompileError::internal(format!(
                    "array base {} at {} is not addressable",
                    base, base_expr.pos
                )))
            }
        };

        let index_expr = ctx.ast.expr(index);
        match index_expr.lit() {
            Some(value) => {
                let pos = index_expr.pos;
                let idx = lit_index(value, pos)?;
                let dim = base_expr.meta.dims[0];
                if dim > 0 && idx >= dim {
                    return Err(CompileError::diagnostic(
                        DiagnosticKind::IndexOutOfRange {
                            index: idx,
                            size: dim,
                        },
                        pos,
                    ));
                }
                mem.offset = idx
                    .checked_mul(stride)
                    .and_then(|delta| mem.offset.checked_add(delta))
                    .ok_or_else(|| {
                        CompileError::internal(format!("array offset overflows at {}", pos))
                    })?;
            }
            None => mem.dynamic.push(DynOffset { index, stride }),
        }

        ctx.ast.locate(id, Location::Memory(mem))
    }

    fn lower_cast(&mut self, ctx: &mut LowerCtx, id: ExprId, operand: ExprId, to: &Meta) -> Result<()> {
        self.lower(ctx, operand)?;

        if to.is_string() || ctx.ast.expr(operand).meta.is_string() {
            ctx.ast.expr_mut(id).helper = Some(Helper::StringConvert);
        }
        Ok(())
    }

    fn lower_unary(
        &mut self,
        ctx: &mut LowerCtx,
        id: ExprId,
        op: UnaryOp,
        operand: ExprId,
        prefix: bool,
    ) -> Result<()> {
        let bin_op = match op {
            UnaryOp::Inc => BinaryOp::Add,
            UnaryOp::Dec => BinaryOp::Sub,
            UnaryOp::Neg | UnaryOp::Not => return self.lower(ctx, operand),
        };

        let target = ctx.ast.clone_expr(operand);
        self.lower(ctx, operand)?;
        self.lower(ctx, target)?;

        let pos = ctx.ast.expr(id).pos;
        let meta = ctx.ast.expr(operand).meta.clone();
        let read = ctx.ast.dup_expr(target);
        let one = ctx.new_expr(ExprKind::Lit(Value::Int(1)), meta.clone(), pos);
        let value = ctx.new_expr(
            ExprKind::Binary {
                op: bin_op,
                lhs: read,
                rhs: one,
            },
            meta,
            pos,
        );
        let update = ctx.assign_stmt(target, value, pos);

        if prefix {
            ctx.func.add_stmt(update);
        } else {
            ctx.func.add_piggyback(update);
        }

        ctx.ast.replace_expr(id, operand, true);
        Ok(())
    }

    fn lower_binary(
        &mut self,
        ctx: &mut LowerCtx,
        id: ExprId,
        op: BinaryOp,
        lhs: ExprId,
        rhs: ExprId,
    ) -> Result<()> {
        self.lower(ctx, lhs)?;
        self.lower(ctx, rhs)?;

        let is_string = |e: ExprId| ctx.ast.expr(e).meta.is_string();
        if op == BinaryOp::Add && (is_string(lhs) || is_string(rhs)) {
            ctx.ast.expr_mut(id).helper = Some(Helper::StringConcat);
        }
        Ok(())
    }

    fn lower_ternary(
        &mut self,
        ctx: &mut LowerCtx,
        id: ExprId,
        cond: ExprId,
        then: ExprId,
        otherwise: ExprId,
    ) -> Result<()> {
        self.lower(ctx, cond)?;
        self.lower(ctx, then)?;
        self.lower(ctx, otherwise)?;

        if let Some(taken) = ctx.ast.expr(cond).lit().and_then(Value::as_bool) {
            let chosen = if taken { then } else { otherwise };
            ctx.ast.replace_expr(id, chosen, true);
        }
        Ok(())
    }

    fn lower_access(&mut self, ctx: &mut LowerCtx, id: ExprId, qual: ExprId) -> Result<()> {
        self.lower(ctx, qual)?;

        let expr = ctx.ast.expr(id);
        let pos = expr.pos;
        let field = expr
            .ident
            .ok_or_else(|| CompileError::internal(format!("unresolved field access at {}", pos)))?;
        let field = ctx.ast.ident(field);
        let qual_expr = ctx.ast.expr(qual);

        if field.func().is_some() {
            // A method is addressed through the contract instance the
            // qualifier's memory reference is based on.
            if let ExprKind::Memory(mem) = &qual_expr.kind {
                let mem = mem.clone();
                ctx.ast.locate(id, Location::Memory(mem))?;
                ctx.ast.reinterpret(id)?;
                ctx.ast.expr_mut(id).meta = Meta::new(BaseType::Uint32);
            }
            return Ok(());
        }

        let offset = field.meta.offset;
        let location = match &qual_expr.kind {
            ExprKind::Register(reg) => Location::Memory(MemRef::new(*reg, 0, offset)),
            ExprKind::Memory(mem) => Location::Memory(mem.with_offset(offset)),
            // Address arithmetic over an aggregate produced by a call.
            ExprKind::Binary { .. } => return Ok(()),
            other => {
                return Err(CompileError::internal(format!(
                    "cannot access field '{}' of {:?} at {}",
                    field.name, other, pos
                )))
            }
        };

        ctx.ast.locate(id, location)
    }

    fn lower_call(
        &mut self,
        ctx: &mut LowerCtx,
        id: ExprId,
        callee: ExprId,
        args: Vec<ExprId>,
    ) -> Result<()> {
        let call = ctx.ast.expr(id);
        let (pos, meta) = (call.pos, call.meta.clone());

        if meta.is_map() {
            return Err(CompileError::diagnostic(
                DiagnosticKind::NotSupported("map-valued call".to_string()),
                pos,
            ));
        }

        let callee_expr = ctx.ast.expr(callee);
        let is_system = matches!(callee_expr.kind, ExprKind::Id(_)) && callee_expr.ident.is_none();
        let method_qual = match callee_expr.kind {
            ExprKind::Access { qual, .. } => Some(qual),
            _ => None,
        };

        let receiver = if is_system {
            None
        } else {
            let func_id = callee_expr
                .ident
                .ok_or_else(|| CompileError::internal(format!("unresolved callee at {}", pos)))?;
            let func = ctx.ast.ident(func_id);
            let is_ctor = func
                .func()
                .ok_or_else(|| {
                    CompileError::internal(format!(
                        "'{}' called at {} is not a function",
                        func.name, pos
                    ))
                })?
                .is_ctor;

            match method_qual {
                _ if is_ctor => None,
                Some(qual) => Some(qual),
                None => Some(ctx.new_expr(
                    ExprKind::Register(RECEIVER_REG),
                    Meta::new(BaseType::Uint32),
                    pos,
                )),
            }
        };

        if !is_system {
            self.lower(ctx, callee)?;
        }

        let args: Vec<ExprId> = receiver.into_iter().chain(args).collect();
        for &arg in &args {
            self.lower(ctx, arg)?;
        }
        ctx.ast.expr_mut(id).kind = ExprKind::Call { callee, args };

        if ctx.func.stack_usage > 0 {
            let frame = align_to(ctx.func.stack_usage, ctx.options.frame_align);
            let symbol = ctx.options.stack_offset_symbol.clone();
            let uint32 = Meta::new(BaseType::Uint32);

            let offset = ctx.new_expr(ExprKind::Global(symbol), uint32.clone(), pos);
            let stack_idx = ctx.func.stack_idx;
            let base = ctx.new_expr(ExprKind::Register(stack_idx), uint32.clone(), pos);
            let size = ctx.new_expr(
                ExprKind::Lit(Value::Int(i64::from(frame))),
                Meta::new(BaseType::Int32),
                pos,
            );
            let adjusted = ctx.new_expr(
                ExprKind::Binary {
                    op: BinaryOp::Sub,
                    lhs: base,
                    rhs: size,
                },
                uint32,
                pos,
            );
            ctx.emit_assign(offset, adjusted, pos);
        }

        if meta.is_void() || meta.is_undefined() {
            let stmt = ctx.ast.add_stmt(Stmt::new(StmtKind::Exp(id), pos));
            ctx.func.add_stmt(stmt);
            return Ok(());
        }

        let tmp = ctx.func.add_reg(CALL_RESULT_NAME, meta.clone());
        let result = ctx.new_expr(ExprKind::Register(tmp), meta.clone(), pos);
        let invocation = ctx.ast.dup_expr(id);
        ctx.emit_assign(result, invocation, pos);

        if meta.is_aggregate() {
            // Aggregates never alias across the call boundary.
            let slot = ctx.func.alloc(&meta);
            let copies = self.copy_aggregate(ctx, tmp, &slot, 0, &meta, pos);
            trace!(register = tmp, copies, mode = ?ctx.func.alloc_mode, "copied aggregate call result");
            ctx.ast.locate(id, Location::Memory(slot))
        } else {
            ctx.ast.locate(id, Location::Register(tmp))
        }
    }

    /// Emits one assignment per scalar leaf of `meta`, from the memory the
    /// `src` register points at into `dst`. Returns the number of copies.
    pub fn copy_aggregate(
        &mut self,
        ctx: &mut LowerCtx,
        src: u32,
        dst: &MemRef,
        offset: u32,
        meta: &Meta,
        pos: SrcPos,
    ) -> usize {
        if meta.is_array() {
            let elem = meta.element();
            let stride = elem.size();
            return (0..meta.elem_count())
                .map(|i| self.copy_aggregate(ctx, src, dst, offset + i * stride, &elem, pos))
                .sum();
        }

        if meta.is_struct() {
            return meta
                .elems
                .iter()
                .map(|field| self.copy_aggregate(ctx, src, dst, offset + field.offset, field, pos))
                .sum();
        }

        let to = ctx.new_expr(
            ExprKind::Memory(dst.with_offset(offset)),
            meta.clone(),
            pos,
        );
        let from = ctx.new_expr(
            ExprKind::Memory(MemRef::new(src, 0, offset)),
            meta.clone(),
            pos,
        );
        ctx.emit_assign(to, from, pos);
        1
    }

    fn lower_init(&mut self, ctx: &mut LowerCtx, id: ExprId, nested: bool) -> Result<()> {
        let ExprKind::Init { elems, slot } = ctx.ast.expr(id).kind.clone() else {
            return Ok(());
        };
        if slot.is_some() {
            return Ok(());
        }

        for &e in &elems {
            if matches!(ctx.ast.expr(e).kind, ExprKind::Init { .. }) {
                self.lower_init(ctx, e, true)?;
            } else {
                self.lower(ctx, e)?;
            }
        }

        let meta = ctx.ast.expr(id).meta.clone();
        if elems.iter().all(|&e| ctx.ast.expr(e).is_lit()) {
            let pos = ctx.ast.expr(id).pos;
            let bytes = pack_literals(ctx.ast, &meta, &elems, pos)?;
            let value = if nested {
                // Packed inline by the enclosing initializer.
                Value::Object(bytes)
            } else {
                Value::Addr(ctx.segment.add_blob(&bytes))
            };
            ctx.ast.expr_mut(id).kind = ExprKind::Lit(value);
            return Ok(());
        }

        // Packed nested literals become data-segment constants of their own.
        for &e in &elems {
            if let Some(value @ Value::Object(_)) = ctx.ast.expr(e).lit().cloned() {
                self.lower_lit(ctx, e, value)?;
            }
        }

        let slot = ctx.func.alloc(&meta);
        ctx.ast.expr_mut(id).kind = ExprKind::Init {
            elems,
            slot: Some(slot),
        };
        Ok(())
    }

    /// Lowers `id` with aggregates allocated on the heap, so that they stay
    /// valid after the current frame is popped.
    pub fn lower_on_heap(&mut self, ctx: &mut LowerCtx, id: ExprId) -> Result<()> {
        let saved = std::mem::replace(&mut ctx.func.alloc_mode, AllocMode::Heap);
        let result = self.lower(ctx, id);
        ctx.func.alloc_mode = saved;
        result
    }
}

/// Position and declared shape of the `idx`-th element of an initializer
/// shaped `meta`. `cursor` tracks the packing offset for shapes without a
/// declared layout.
fn element_slot(meta: &Meta, idx: usize, actual: &Meta, cursor: &mut u32) -> Option<(u32, Meta)> {
    if meta.is_array() {
        let elem = meta.strip_dim();
        return Some((idx as u32 * elem.size(), elem));
    }

    if meta.is_struct() || meta.is_tuple() {
        return meta.elems.get(idx).map(|field| (field.offset, field.clone()));
    }

    let offset = align_to(*cursor, actual.align.max(1));
    *cursor = offset + actual.size();
    Some((offset, actual.clone()))
}

fn pack_literals(ast: &Ast, meta: &Meta, elems: &[ExprId], pos: SrcPos) -> Result<Vec<u8>> {
    let mut buf = vec![0u8; meta.size() as usize];
    let mut cursor = 0;

    for (i, &e) in elems.iter().enumerate() {
        let expr = ast.expr(e);
        let (offset, slot_meta) = element_slot(meta, i, &expr.meta, &mut cursor).ok_or_else(|| {
            CompileError::internal(format!("too many initializer elements for {} at {}", meta, pos))
        })?;
        let value = expr
            .lit()
            .ok_or_else(|| CompileError::internal(format!("non-literal element {} at {}", e, pos)))?;

        let bytes = value.to_bytes(&slot_meta);
        let start = offset as usize;
        let end = start + bytes.len();
        if end > buf.len() {
            return Err(CompileError::internal(format!(
                "initializer element {} overflows {} at {}",
                i, meta, pos
            )));
        }
        buf[start..end].copy_from_slice(&bytes);
    }

    Ok(buf)
}
