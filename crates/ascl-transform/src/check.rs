/*! Statement checking and loop desugaring.
 *
 * Checking walks each function body once, completes expression shapes, and rejects the first statement
 * that breaks a typing rule. Loops are rewritten in place into plain blocks of labeled null statements,
 * guards and gotos, so later passes only ever see straight-line code and jumps.
 */

use ascl_core::{
    Ast, BaseType, BinaryOp, BlockId, CompileError, DiagnosticKind, Expr, ExprId, ExprKind, Ident,
    IdentId, IdentKind, LoopLabels, Meta, Result, Scope, SrcPos, Stmt, StmtId, StmtKind, SysLib,
    UnaryOp, Value,
};
use tracing::debug;

fn diag(kind: DiagnosticKind, pos: SrcPos) -> CompileError {
    CompileError::diagnostic(kind, pos)
}

pub struct Checker<'a> {
    ast: &'a mut Ast,
    syslib: &'a SysLib,
    func: Option<IdentId>,
    blk: Option<BlockId>,
}

impl<'a> Checker<'a> {
    pub fn new(ast: &'a mut Ast, syslib: &'a SysLib) -> Self {
        Self {
            ast,
            syslib,
            func: None,
            blk: None,
        }
    }

    pub fn check_contract(&mut self, contract: IdentId) -> Result<()> {
        let IdentKind::Contract { blk } = self.ast.ident(contract).kind else {
            return Err(CompileError::internal(format!(
                "'{}' is not a contract",
                self.ast.ident(contract).name
            )));
        };

        let ids = self.ast.block(blk).ids.clone();
        for id in ids {
            if let Some(init) = self.ast.ident(id).init {
                self.check_expr(init)?;
            }
            if self.ast.ident(id).func().is_some() {
                self.check_function(id)?;
            }
        }
        Ok(())
    }

    pub fn check_function(&mut self, func: IdentId) -> Result<()> {
        let Some(decl) = self.ast.ident(func).func() else {
            return Err(CompileError::internal(format!(
                "'{}' is not a function",
                self.ast.ident(func).name
            )));
        };
        let body = decl.body;

        debug!(function = %self.ast.ident(func).name, "checking function");

        let saved = self.func.replace(func);
        let result = match body {
            Some(body) => self.check_block(body),
            None => Ok(()),
        };
        self.func = saved;
        result
    }

    pub fn check_block(&mut self, blk: BlockId) -> Result<()> {
        let saved = self.blk.replace(blk);
        let result = self.check_block_contents(blk);
        self.blk = saved;
        result
    }

    fn check_block_contents(&mut self, blk: BlockId) -> Result<()> {
        let ids = self.ast.block(blk).ids.clone();
        for id in ids {
            if let Some(init) = self.ast.ident(id).init {
                self.check_expr(init)?;
            }
        }

        // Desugaring never changes the length of the list it is iterating.
        let mut i = 0;
        while i < self.ast.block(blk).stmts.len() {
            let stmt = self.ast.block(blk).stmts[i];
            self.check_stmt(stmt)?;
            i += 1;
        }
        Ok(())
    }

    /// Nested blocks are linked to the block their statement appears in.
    fn check_child_block(&mut self, blk: BlockId) -> Result<()> {
        self.ast.block_mut(blk).up = self.blk;
        self.check_block(blk)
    }

    pub fn check_stmt(&mut self, id: StmtId) -> Result<()> {
        let stmt = self.ast.stmt(id);
        let pos = stmt.pos;

        match stmt.kind.clone() {
            StmtKind::Null | StmtKind::Break | StmtKind::Continue => Ok(()),
            StmtKind::Exp(e) => self.check_expr(e),
            StmtKind::Assign { lhs, rhs } => {
                self.check_expr(lhs)?;
                self.check_expr(rhs)
            }
            StmtKind::If {
                cond,
                then_blk,
                elifs,
                else_blk,
            } => self.check_if(cond, then_blk, elifs, else_blk),
            StmtKind::For { .. } => self.check_for(id),
            StmtKind::Each { .. } => self.check_each(id),
            StmtKind::Switch { selector, cases } => self.check_switch(selector, cases),
            StmtKind::Case { .. } => Err(CompileError::internal(format!(
                "case statement outside of a switch at {}",
                pos
            ))),
            StmtKind::Return(arg) => self.check_return(arg, pos),
            StmtKind::Goto(label) => self.check_goto(&label, pos),
            StmtKind::Block(blk) => self.check_child_block(blk),
        }
    }

    fn check_if(
        &mut self,
        cond: ExprId,
        then_blk: Option<BlockId>,
        elifs: Vec<StmtId>,
        else_blk: Option<BlockId>,
    ) -> Result<()> {
        self.check_cond(cond)?;

        if let Some(blk) = then_blk {
            self.check_child_block(blk)?;
        }

        for elif in elifs {
            if !matches!(self.ast.stmt(elif).kind, StmtKind::If { .. }) {
                return Err(CompileError::internal(format!(
                    "else-if branch {} is not a conditional",
                    elif
                )));
            }
            self.check_stmt(elif)?;
        }

        if let Some(blk) = else_blk {
            self.check_child_block(blk)?;
        }
        Ok(())
    }

    fn check_cond(&mut self, cond: ExprId) -> Result<()> {
        self.check_expr(cond)?;

        let expr = self.ast.expr(cond);
        if !expr.meta.is_bool() {
            return Err(diag(
                DiagnosticKind::InvalidCondType(expr.meta.to_string()),
                expr.pos,
            ));
        }
        Ok(())
    }

    /// Returns the loop's block, creating an empty one for a bodiless loop,
    /// and links it to the current block.
    fn loop_block(&mut self, blk: Option<BlockId>, pos: SrcPos) -> BlockId {
        let blk = blk.unwrap_or_else(|| self.ast.new_block(self.blk, pos));
        self.ast.block_mut(blk).up = self.blk;
        blk
    }

    fn loop_labels(&self, blk: BlockId) -> LoopLabels {
        let num = self.ast.block(blk).num;
        LoopLabels {
            begin: format!("loop_begin_{}", num),
            end: format!("loop_end_{}", num),
            cont: format!("loop_cont_{}", num),
        }
    }

    fn new_expr(&mut self, kind: ExprKind, meta: Meta, pos: SrcPos) -> ExprId {
        self.ast.add_expr(Expr::new(kind, meta, pos))
    }

    fn new_stmt(&mut self, kind: StmtKind, label: Option<&str>, pos: SrcPos) -> StmtId {
        let id = self.ast.add_stmt(Stmt::new(kind, pos));
        self.ast.stmt_mut(id).label = label.map(str::to_string);
        id
    }

    fn check_for(&mut self, id: StmtId) -> Result<()> {
        let pos = self.ast.stmt(id).pos;
        let StmtKind::For {
            init_ids,
            init,
            cond,
            step,
            blk,
        } = self.ast.stmt(id).kind.clone()
        else {
            return Err(CompileError::internal(format!("{} is not a for loop", id)));
        };

        if init.is_some() && !init_ids.is_empty() {
            return Err(CompileError::internal(format!(
                "for loop at {} has both declarations and an init expression",
                pos
            )));
        }

        if let Some(cond) = cond {
            self.check_cond(cond)?;
        }

        let blk = self.loop_block(blk, pos);
        let mut labels = self.loop_labels(blk);
        let body = std::mem::take(&mut self.ast.block_mut(blk).stmts);
        let mut stmts = Vec::with_capacity(body.len() + 6);

        if let Some(init) = init {
            let init_pos = self.ast.expr(init).pos;
            stmts.push(self.new_stmt(StmtKind::Exp(init), None, init_pos));
        }
        let block = self.ast.block_mut(blk);
        block.ids = init_ids.into_iter().chain(block.ids.drain(..)).collect();

        stmts.push(self.new_stmt(StmtKind::Null, Some(&labels.begin), pos));

        if let Some(cond) = cond {
            let cond_pos = self.ast.expr(cond).pos;
            let not = self.new_expr(
                ExprKind::Unary {
                    op: UnaryOp::Not,
                    operand: cond,
                    prefix: true,
                },
                Meta::new(BaseType::Bool),
                cond_pos,
            );
            let guard_blk = self.ast.new_block(Some(blk), cond_pos);
            let exit = self.new_stmt(StmtKind::Goto(labels.end.clone()), None, cond_pos);
            self.ast.block_mut(guard_blk).stmts.push(exit);

            stmts.push(self.new_stmt(
                StmtKind::If {
                    cond: not,
                    then_blk: Some(guard_blk),
                    elifs: Vec::new(),
                    else_blk: None,
                },
                None,
                cond_pos,
            ));
        }

        stmts.extend(body);

        match step {
            Some(step) => {
                let step_pos = self.ast.expr(step).pos;
                stmts.push(self.new_stmt(StmtKind::Exp(step), Some(&labels.cont), step_pos));
            }
            None => labels.cont = labels.begin.clone(),
        }

        stmts.push(self.new_stmt(StmtKind::Goto(labels.begin.clone()), None, pos));
        stmts.push(self.new_stmt(StmtKind::Null, Some(&labels.end), pos));

        debug!(block = %blk, begin = %labels.begin, "desugared counted loop");
        self.finish_loop(id, blk, stmts, labels)
    }

    /// Rewrites `for x in seq` into a block indexed by a hidden
    /// `loop_idx_<block>` counter. Each target reads `seq[idx++]`, so the
    /// counter advances once per target per iteration. No exit guard is
    /// generated: stopping after the last element is left to the backend
    /// and the runtime bounds check.
    fn check_each(&mut self, id: StmtId) -> Result<()> {
        let pos = self.ast.stmt(id).pos;
        let StmtKind::Each {
            targets,
            target,
            seq,
            blk,
        } = self.ast.stmt(id).kind.clone()
        else {
            return Err(CompileError::internal(format!("{} is not an each loop", id)));
        };

        self.check_expr(seq)?;

        let seq_meta = self.ast.expr(seq).meta.clone();
        let seq_pos = self.ast.expr(seq).pos;
        if seq_meta.is_map() {
            return Err(diag(
                DiagnosticKind::NotSupported("map iteration".to_string()),
                seq_pos,
            ));
        }

        if let Some(target) = target {
            let target_expr = self.ast.expr(target);
            if matches!(target_expr.kind, ExprKind::Tuple(_)) {
                return Err(diag(
                    DiagnosticKind::NotSupported("map iteration".to_string()),
                    target_expr.pos,
                ));
            }
            self.check_expr(target)?;
        }

        if !seq_meta.is_array() {
            return Err(diag(
                DiagnosticKind::MismatchedType {
                    expected: "array".to_string(),
                    found: seq_meta.to_string(),
                },
                seq_pos,
            ));
        }

        let blk = self.loop_block(blk, pos);
        let labels = self.loop_labels(blk);
        let num = self.ast.block(blk).num;

        let idx_meta = Meta::new(BaseType::Int32);
        let zero = self.new_expr(ExprKind::Lit(Value::Int(0)), idx_meta.clone(), pos);
        let idx = self.ast.add_ident(Ident {
            name: format!("loop_idx_{}", num),
            kind: IdentKind::Var,
            meta: idx_meta.clone(),
            scope: Scope::Local,
            slot: None,
            addr: None,
            init: Some(zero),
            pos,
        });

        let block = self.ast.block_mut(blk);
        block.ids = targets
            .iter()
            .copied()
            .chain(block.ids.drain(..))
            .chain(std::iter::once(idx))
            .collect();

        let lhs_list: Vec<ExprId> = if targets.is_empty() {
            target.into_iter().collect()
        } else {
            targets
                .iter()
                .map(|&t| {
                    let decl = self.ast.ident(t);
                    let (name, meta) = (decl.name.clone(), decl.meta.clone());
                    let e = self.new_expr(ExprKind::Id(name), meta, pos);
                    self.ast.expr_mut(e).ident = Some(t);
                    e
                })
                .collect()
        };

        if lhs_list.is_empty() {
            return Err(CompileError::internal(format!(
                "each loop at {} has no target",
                pos
            )));
        }

        let elem_meta = seq_meta.strip_dim();
        let mut stmts = vec![self.new_stmt(StmtKind::Null, Some(&labels.begin), pos)];

        // Every target reads `seq[idx++]`, so the index advances once per target.
        for (i, lhs) in lhs_list.into_iter().enumerate() {
            let lhs_meta = self.ast.expr(lhs).meta.clone();
            if !lhs_meta.equals(&elem_meta) {
                return Err(diag(
                    DiagnosticKind::MismatchedType {
                        expected: lhs_meta.to_string(),
                        found: elem_meta.to_string(),
                    },
                    self.ast.expr(lhs).pos,
                ));
            }

            let base = if i == 0 { seq } else { self.ast.clone_expr(seq) };
            let idx_ref = self.new_expr(
                ExprKind::Id(format!("loop_idx_{}", num)),
                idx_meta.clone(),
                seq_pos,
            );
            self.ast.expr_mut(idx_ref).ident = Some(idx);
            let inc = self.new_expr(
                ExprKind::Unary {
                    op: UnaryOp::Inc,
                    operand: idx_ref,
                    prefix: false,
                },
                idx_meta.clone(),
                seq_pos,
            );
            let elem = self.new_expr(
                ExprKind::Array { base, index: inc },
                elem_meta.clone(),
                seq_pos,
            );
            let assign = self.new_expr(
                ExprKind::Binary {
                    op: BinaryOp::Assign,
                    lhs,
                    rhs: elem,
                },
                lhs_meta,
                seq_pos,
            );
            stmts.push(self.new_stmt(StmtKind::Exp(assign), None, pos));
        }

        let body = std::mem::take(&mut self.ast.block_mut(blk).stmts);
        stmts.extend(body);
        stmts.push(self.new_stmt(StmtKind::Goto(labels.begin.clone()), None, pos));
        stmts.push(self.new_stmt(StmtKind::Null, Some(&labels.end), pos));

        debug!(block = %blk, begin = %labels.begin, "desugared iteration loop");
        let labels = LoopLabels {
            cont: labels.begin.clone(),
            ..labels
        };
        self.finish_loop(id, blk, stmts, labels)
    }

    /// Installs the rewritten statement list and turns the loop statement
    /// into a plain block statement, then checks the block.
    fn finish_loop(
        &mut self,
        id: StmtId,
        blk: BlockId,
        stmts: Vec<StmtId>,
        labels: LoopLabels,
    ) -> Result<()> {
        let block = self.ast.block_mut(blk);
        block.stmts = stmts;
        block.loop_labels = Some(labels);

        self.ast.stmt_mut(id).kind = StmtKind::Block(blk);
        self.check_block(blk)
    }

    fn check_switch(&mut self, selector: Option<ExprId>, cases: Vec<StmtId>) -> Result<()> {
        let selector_meta = match selector {
            Some(sel) => {
                self.check_expr(sel)?;
                let expr = self.ast.expr(sel);
                if !expr.meta.is_comparable() {
                    return Err(diag(
                        DiagnosticKind::NotComparableType(expr.meta.to_string()),
                        expr.pos,
                    ));
                }
                Some(expr.meta.clone())
            }
            None => None,
        };

        for case in cases {
            let StmtKind::Case { value, stmts } = self.ast.stmt(case).kind.clone() else {
                return Err(CompileError::internal(format!(
                    "switch arm {} is not a case",
                    case
                )));
            };

            if let Some(value) = value {
                self.check_expr(value)?;
                let expr = self.ast.expr(value);

                match &selector_meta {
                    Some(meta) if !meta.equals(&expr.meta) => {
                        return Err(diag(
                            DiagnosticKind::MismatchedType {
                                expected: meta.to_string(),
                                found: expr.meta.to_string(),
                            },
                            expr.pos,
                        ));
                    }
                    None if !expr.meta.is_bool() => {
                        return Err(diag(
                            DiagnosticKind::InvalidCondType(expr.meta.to_string()),
                            expr.pos,
                        ));
                    }
                    _ => {}
                }
            }

            for stmt in stmts {
                self.check_stmt(stmt)?;
            }
        }
        Ok(())
    }

    fn check_return(&mut self, arg: Option<ExprId>, pos: SrcPos) -> Result<()> {
        let func = self
            .func
            .ok_or_else(|| CompileError::internal(format!("return outside a function at {}", pos)))?;
        let ret = match self.ast.ident(func).func() {
            Some(decl) => decl.ret.clone(),
            None => {
                return Err(CompileError::internal(format!(
                    "enclosing '{}' is not a function",
                    self.ast.ident(func).name
                )))
            }
        };

        let Some(arg) = arg else {
            if !ret.is_empty() {
                return Err(diag(
                    DiagnosticKind::MismatchedCount {
                        expected: ret.len(),
                        found: 0,
                    },
                    pos,
                ));
            }
            return Ok(());
        };

        self.check_expr(arg)?;
        let expr = self.ast.expr(arg);
        let arg_pos = expr.pos;

        if ret.is_empty() {
            return Err(diag(
                DiagnosticKind::MismatchedCount {
                    expected: 0,
                    found: expr.meta.count().max(1),
                },
                arg_pos,
            ));
        }

        if expr.meta.is_tuple() {
            let found = &expr.meta.elems;
            if found.len() != ret.len() {
                return Err(diag(
                    DiagnosticKind::MismatchedCount {
                        expected: ret.len(),
                        found: found.len(),
                    },
                    arg_pos,
                ));
            }

            for (want, got) in ret.iter().zip(found) {
                if !want.equals(got) {
                    return Err(diag(
                        DiagnosticKind::MismatchedType {
                            expected: want.to_string(),
                            found: got.to_string(),
                        },
                        arg_pos,
                    ));
                }
            }
            return Ok(());
        }

        if ret.len() != 1 {
            return Err(diag(
                DiagnosticKind::MismatchedCount {
                    expected: ret.len(),
                    found: 1,
                },
                arg_pos,
            ));
        }

        if !ret[0].equals(&expr.meta) {
            return Err(diag(
                DiagnosticKind::MismatchedType {
                    expected: ret[0].to_string(),
                    found: expr.meta.to_string(),
                },
                arg_pos,
            ));
        }
        Ok(())
    }

    fn check_goto(&self, label: &str, pos: SrcPos) -> Result<()> {
        let mut cursor = self.blk;

        while let Some(blk) = cursor {
            let block = self.ast.block(blk);
            if block
                .stmts
                .iter()
                .any(|&s| self.ast.stmt_label(s) == Some(label))
            {
                return Ok(());
            }
            cursor = block.up;
        }

        Err(diag(DiagnosticKind::UndefinedLabel(label.to_string()), pos))
    }

    /// Completes the shape of `id` and its children. Shapes the parser
    /// already resolved are kept.
    pub fn check_expr(&mut self, id: ExprId) -> Result<()> {
        let expr = self.ast.expr(id);
        let (kind, ident) = (expr.kind.clone(), expr.ident);

        let inferred = match kind {
            ExprKind::Null
            | ExprKind::Lit(_)
            | ExprKind::Alloc { .. }
            | ExprKind::Global(_)
            | ExprKind::Register(_)
            | ExprKind::Memory(_) => None,
            ExprKind::Id(_) => ident.map(|i| self.ast.ident(i).meta.clone()),
            ExprKind::Array { base, index } => {
                self.check_expr(base)?;
                self.check_expr(index)?;
                Some(self.ast.expr(base).meta.strip_dim())
            }
            ExprKind::Cast { operand, to } => {
                self.check_expr(operand)?;
                Some(to)
            }
            ExprKind::Unary { op, operand, .. } => {
                self.check_expr(operand)?;
                match op {
                    UnaryOp::Not => Some(Meta::new(BaseType::Bool)),
                    _ => Some(self.ast.expr(operand).meta.clone()),
                }
            }
            ExprKind::Binary { op, lhs, rhs } => {
                self.check_expr(lhs)?;
                self.check_expr(rhs)?;
                if op.is_relational() || op.is_logical() {
                    Some(Meta::new(BaseType::Bool))
                } else {
                    let lhs_meta = &self.ast.expr(lhs).meta;
                    if lhs_meta.untyped && op != BinaryOp::Assign {
                        Some(self.ast.expr(rhs).meta.clone())
                    } else {
                        Some(lhs_meta.clone())
                    }
                }
            }
            ExprKind::Ternary {
                cond,
                then,
                otherwise,
            } => {
                self.check_cond(cond)?;
                self.check_expr(then)?;
                self.check_expr(otherwise)?;
                Some(self.ast.expr(then).meta.clone())
            }
            ExprKind::Access { qual, .. } => {
                self.check_expr(qual)?;
                ident.map(|i| self.ast.ident(i).meta.clone())
            }
            ExprKind::Call { callee, args } => self.check_call(id, callee, &args)?,
            ExprKind::Tuple(elems) => {
                for &e in &elems {
                    self.check_expr(e)?;
                }
                Some(Meta::tuple(
                    elems.iter().map(|&e| self.ast.expr(e).meta.clone()).collect(),
                ))
            }
            ExprKind::Init { elems, .. } => {
                for e in elems {
                    self.check_expr(e)?;
                }
                None
            }
        };

        let expr = self.ast.expr_mut(id);
        if let (true, Some(meta)) = (expr.meta.is_undefined(), inferred) {
            expr.meta = meta;
        }
        Ok(())
    }

    fn check_call(&mut self, id: ExprId, callee: ExprId, args: &[ExprId]) -> Result<Option<Meta>> {
        for &arg in args {
            self.check_expr(arg)?;
        }

        let callee_expr = self.ast.expr(callee);
        if let (ExprKind::Id(name), None) = (&callee_expr.kind, callee_expr.ident) {
            if let Some(sys) = self.syslib.lookup(name) {
                let pos = self.ast.expr(id).pos;
                if sys.params.len() != args.len() {
                    return Err(diag(
                        DiagnosticKind::MismatchedCount {
                            expected: sys.params.len(),
                            found: args.len(),
                        },
                        pos,
                    ));
                }

                for (&param, &arg) in sys.params.iter().zip(args) {
                    let want = Meta::new(param);
                    let got = &self.ast.expr(arg).meta;
                    if !want.equals(got) {
                        return Err(diag(
                            DiagnosticKind::MismatchedType {
                                expected: want.to_string(),
                                found: got.to_string(),
                            },
                            self.ast.expr(arg).pos,
                        ));
                    }
                }
                return Ok(Some(Meta::new(sys.result)));
            }
            return Err(CompileError::internal(format!(
                "call to unresolved '{}' at {}",
                name,
                self.ast.expr(id).pos
            )));
        }

        self.check_expr(callee)?;
        let ret = self
            .ast
            .expr(callee)
            .ident
            .and_then(|i| self.ast.ident(i).func().map(|decl| decl.ret_meta()));
        Ok(ret)
    }
}

/// Checks every contract of the tree, stopping at the first error.
pub fn check_module(ast: &mut Ast, syslib: &SysLib) -> Result<()> {
    let contracts = ast.contracts.clone();
    let mut checker = Checker::new(ast, syslib);
    for contract in contracts {
        checker.check_contract(contract)?;
    }
    Ok(())
}
