//! Pass-scoped context objects threaded through an expression tree.
//!
//! Each code-generation pass creates fresh contexts and drops them at the end:
//! - [`BindContext`] maps identity handles to shared descriptors and composite
//!   nodes to their temporaries.
//! - [`EnqueueContext`] numbers runtime arguments and skips handles already emitted.
//! - [`GenContext`] memoizes per-slot values materialized by `fetch`.

use std::collections::{HashMap, HashSet};
use std::rc::Rc;

use linacc_device::{ArgSink, BufferId, KernelArg};
use linacc_dtype::ScalarType;

use crate::expr::NodeId;

/// Identity of the storage behind a bound node.
///
/// Device-resident operands are identified by their allocation, host values by
/// the node that owns them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Handle {
    Buffer(BufferId),
    Host(NodeId),
}

/// Descriptor shared by every node bound to the same handle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SharedInfo {
    /// Position among distinct handles of the pass, in depth-first order.
    pub index: usize,
    pub scalar: ScalarType,
    /// Elements per packed access.
    pub alignment: usize,
    /// Parameter name in generated source.
    pub name: String,
}

impl SharedInfo {
    pub fn scalar_size(&self) -> usize {
        self.scalar.bytes()
    }

    /// Declared element type, `float4` style when packed.
    pub fn c_type(&self) -> String {
        self.scalar.c_vector(self.alignment)
    }
}

#[derive(Debug)]
pub struct BindContext {
    alignment: usize,
    shared: HashMap<Handle, Rc<SharedInfo>>,
    order: Vec<Handle>,
    temporaries: HashMap<NodeId, Handle>,
}

impl BindContext {
    /// Fresh pass where vectors and matrices are accessed `alignment` elements at a time.
    pub fn new(alignment: usize) -> Self {
        Self { alignment, shared: HashMap::new(), order: Vec::new(), temporaries: HashMap::new() }
    }

    pub fn alignment(&self) -> usize {
        self.alignment
    }

    /// Descriptor for `handle`, created on first sight.
    pub fn register(&mut self, handle: Handle, scalar: ScalarType, alignment: usize) -> Rc<SharedInfo> {
        if let Some(info) = self.shared.get(&handle) {
            return Rc::clone(info);
        }

        let index = self.order.len();
        let info = Rc::new(SharedInfo { index, scalar, alignment, name: format!("arg{index}") });
        tracing::trace!(?handle, index, scalar = %scalar, alignment, "shared info registered");
        self.shared.insert(handle, Rc::clone(&info));
        self.order.push(handle);
        info
    }

    /// Record the private temporary of a composite node.
    pub fn register_temporary(&mut self, node: NodeId, handle: Handle) -> Handle {
        *self.temporaries.entry(node).or_insert(handle)
    }

    pub fn get(&self, handle: &Handle) -> Option<&Rc<SharedInfo>> {
        self.shared.get(handle)
    }

    pub fn temporary(&self, node: NodeId) -> Option<Handle> {
        self.temporaries.get(&node).copied()
    }

    /// Distinct handles in registration order.
    pub fn order(&self) -> &[Handle] {
        &self.order
    }

    /// Distinct device buffers in registration order.
    pub fn buffers(&self) -> Vec<BufferId> {
        self.order
            .iter()
            .filter_map(|h| match h {
                Handle::Buffer(id) => Some(*id),
                Handle::Host(_) => None,
            })
            .collect()
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}

pub struct EnqueueContext<'a> {
    next: u32,
    emitted: HashSet<Handle>,
    sink: &'a mut dyn ArgSink,
}

impl<'a> EnqueueContext<'a> {
    pub fn new(sink: &'a mut dyn ArgSink) -> Self {
        Self { next: 0, emitted: HashSet::new(), sink }
    }

    /// Claim `handle`. False when its arguments were already emitted.
    pub fn claim(&mut self, handle: Handle) -> bool {
        self.emitted.insert(handle)
    }

    pub fn push(&mut self, arg: KernelArg) {
        self.sink.set_arg(self.next, arg);
        self.next += 1;
    }

    /// Number of arguments emitted so far.
    pub fn count(&self) -> u32 {
        self.next
    }
}

#[derive(Debug, Default)]
pub struct GenContext {
    private: HashMap<(NodeId, u32), String>,
}

impl GenContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn private(&self, node: NodeId, slot: u32) -> Option<&str> {
        self.private.get(&(node, slot)).map(String::as_str)
    }

    pub fn set_private(&mut self, node: NodeId, slot: u32, name: String) {
        self.private.insert((node, slot), name);
    }

    pub fn clear_private(&mut self, node: NodeId, slot: u32) {
        self.private.remove(&(node, slot));
    }

    pub fn is_empty(&self) -> bool {
        self.private.is_empty()
    }
}
