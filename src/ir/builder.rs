//! Op builder with an insertion point.
//!
//! A builder inserts ops one after another at a fixed point in a region and
//! remembers what it created, so a rewrite driver can classify the new ops
//! afterwards.

use super::op::{global_cell, OpId, OpKind, Operation, Visibility};
use super::types::{IntType, Type};
use super::value::ValueId;
use super::{IrError, IrResult, Module};
use crate::debug::SourceLoc;

/// Inserts operations at an insertion point.
pub struct Builder<'m> {
    module: &'m mut Module,
    parent: Option<OpId>,
    index: usize,
    loc: Option<SourceLoc>,
    created: Vec<OpId>,
}

impl<'m> Builder<'m> {
    /// Insert at the end of a region (`None` is the module body).
    pub fn at_end(module: &'m mut Module, parent: Option<OpId>) -> IrResult<Self> {
        let index = module.region(parent)?.len();
        Ok(Self { module, parent, index, loc: None, created: Vec::new() })
    }

    /// Insert immediately before `anchor`, inheriting its location.
    pub fn before(module: &'m mut Module, anchor: OpId) -> IrResult<Self> {
        let (parent, index) = module.position(anchor).ok_or(IrError::DeadOp(anchor))?;
        let loc = module.op(anchor).and_then(|op| op.loc.clone());
        Ok(Self { module, parent, index, loc, created: Vec::new() })
    }

    /// Insert at the very start of the module body.
    pub fn at_module_start(module: &'m mut Module) -> Self {
        Self { module, parent: None, index: 0, loc: None, created: Vec::new() }
    }

    /// Set the location attached to subsequently created ops.
    pub fn with_loc(mut self, loc: Option<SourceLoc>) -> Self {
        self.loc = loc;
        self
    }

    /// Access the module.
    pub fn module(&self) -> &Module {
        self.module
    }

    /// Access the module mutably.
    pub fn module_mut(&mut self) -> &mut Module {
        self.module
    }

    /// Ops created so far, in creation order.
    pub fn created(&self) -> &[OpId] {
        &self.created
    }

    /// Consume the builder, returning the ops it created.
    pub fn into_created(self) -> Vec<OpId> {
        self.created
    }

    /// Insert an op at the insertion point and advance past it.
    pub fn insert(&mut self, kind: OpKind, operands: Vec<ValueId>, result_types: Vec<Type>) -> IrResult<OpId> {
        let op = Operation::new(kind).operands(operands).at(self.loc.clone());
        let id = self.module.insert_op(self.parent, self.index, op, result_types)?;
        self.index += 1;
        self.created.push(id);
        Ok(id)
    }

    fn insert_value(&mut self, kind: OpKind, operands: Vec<ValueId>, ty: Type) -> IrResult<ValueId> {
        let id = self.insert(kind, operands, vec![ty])?;
        self.module
            .op(id)
            .and_then(|op| op.result())
            .ok_or(IrError::DeadOp(id))
    }

    /// `arith.constant`; the value is truncated to the type width.
    pub fn constant(&mut self, value: u128, ty: IntType) -> IrResult<ValueId> {
        self.insert_value(OpKind::Constant { value: value & ty.mask() }, Vec::new(), Type::Int(ty))
    }

    /// `arith.addi`
    pub fn addi(&mut self, lhs: ValueId, rhs: ValueId) -> IrResult<ValueId> {
        let ty = self.module.value_type(lhs)?.clone();
        self.insert_value(OpKind::AddI, vec![lhs, rhs], ty)
    }

    /// `arith.shrui`
    pub fn shrui(&mut self, value: ValueId, amount: ValueId) -> IrResult<ValueId> {
        let ty = self.module.value_type(value)?.clone();
        self.insert_value(OpKind::ShRUI, vec![value, amount], ty)
    }

    /// `arith.trunci`
    pub fn trunci(&mut self, value: ValueId, to: IntType) -> IrResult<ValueId> {
        self.insert_value(OpKind::TruncI, vec![value], Type::Int(to))
    }

    /// `arith.extui`
    pub fn extui(&mut self, value: ValueId, to: IntType) -> IrResult<ValueId> {
        self.insert_value(OpKind::ExtUI, vec![value], Type::Int(to))
    }

    /// `arith.extsi`
    pub fn extsi(&mut self, value: ValueId, to: IntType) -> IrResult<ValueId> {
        self.insert_value(OpKind::ExtSI, vec![value], Type::Int(to))
    }

    /// `memref.global` (mutable cell).
    pub fn global(&mut self, sym: &str, elem: IntType, init: u128, visibility: Visibility) -> IrResult<OpId> {
        self.insert(global_cell(sym, elem, init & elem.mask(), visibility), Vec::new(), Vec::new())
    }

    /// `memref.get_global`
    pub fn get_global(&mut self, sym: &str, ty: Type) -> IrResult<ValueId> {
        self.insert_value(OpKind::GetGlobal { sym: sym.to_string() }, Vec::new(), ty)
    }

    /// `memref.load`
    pub fn load(&mut self, memref: ValueId) -> IrResult<ValueId> {
        let elem = self.module.value_type(memref)?.element_type();
        self.insert_value(OpKind::Load, vec![memref], Type::Int(elem))
    }

    /// `memref.store value, memref`
    pub fn store(&mut self, value: ValueId, memref: ValueId) -> IrResult<OpId> {
        self.insert(OpKind::Store, vec![value, memref], Vec::new())
    }

    /// `tensor.from_elements`
    pub fn from_elements(&mut self, elements: Vec<ValueId>, ty: Type) -> IrResult<ValueId> {
        self.insert_value(OpKind::FromElements, elements, ty)
    }

    /// `builtin.unrealized_conversion_cast`
    pub fn unrealized_cast(&mut self, value: ValueId, ty: Type) -> IrResult<ValueId> {
        self.insert_value(OpKind::UnrealizedCast, vec![value], ty)
    }

    /// `mhlo.rng_get_and_update_state`
    pub fn rng_get_and_update_state(&mut self, delta: ValueId, ty: Type) -> IrResult<ValueId> {
        self.insert_value(OpKind::RngGetAndUpdateState, vec![delta], ty)
    }

    /// `func.return`
    pub fn ret(&mut self, values: Vec<ValueId>) -> IrResult<OpId> {
        self.insert(OpKind::Return, values, Vec::new())
    }

    /// An op this crate has no model for.
    pub fn opaque(&mut self, name: &str, operands: Vec<ValueId>, result_types: Vec<Type>) -> IrResult<OpId> {
        let kind = OpKind::Opaque { name: name.to_string(), sym: None, attrs: Vec::new() };
        self.insert(kind, operands, result_types)
    }
}
