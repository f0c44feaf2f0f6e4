use crate::dirty::DirtyBits;
use crate::dom::NodeId;
use crate::value::Value;
use crate::RuntimeError;

/// Rendered output of a component or a keyed block.
///
/// A fragment is built once and then patched in place. `mount` doubles as
/// "move": inserting nodes that already have a parent relocates them before
/// `anchor`.
pub trait Fragment {
    fn create(&mut self) -> Result<(), RuntimeError> {
        Ok(())
    }

    fn mount(&mut self, target: NodeId, anchor: Option<NodeId>) -> Result<(), RuntimeError>;

    fn patch(&mut self, ctx: &[Value], dirty: &DirtyBits) -> Result<(), RuntimeError>;

    fn destroy(&mut self, detaching: bool);

    /// First node owned by the fragment. Used as the insertion anchor for
    /// whatever precedes it.
    fn first(&self) -> Option<NodeId> {
        None
    }

    fn intro(&mut self, _local: bool) {}

    /// Starts exit transitions. Runs inside the runtime's current outro group.
    fn outro(&mut self, _local: bool) {}

    /// Whether `outro` does anything. Targets without one are destroyed
    /// immediately instead of joining a group.
    fn has_outro(&self) -> bool {
        false
    }
}

/// A fragment that renders nothing.
#[derive(Debug, Default, Clone, Copy)]
pub struct EmptyFragment;

impl Fragment for EmptyFragment {
    fn mount(&mut self, _target: NodeId, _anchor: Option<NodeId>) -> Result<(), RuntimeError> {
        Ok(())
    }

    fn patch(&mut self, _ctx: &[Value], _dirty: &DirtyBits) -> Result<(), RuntimeError> {
        Ok(())
    }

    fn destroy(&mut self, _detaching: bool) {}
}
