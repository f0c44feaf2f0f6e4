//! Shared fixtures for the unit tests of this crate.

use std::cell::RefCell;
use std::rc::Rc;

use crate::{
    Component, ComponentDefinition, DirtyBits, Fragment, NodeId, Props, RuntimeError, Value,
};

pub(crate) type Log = Rc<RefCell<Vec<String>>>;

pub(crate) fn new_log() -> Log {
    Rc::new(RefCell::new(Vec::new()))
}

pub(crate) fn entries(log: &Log) -> Vec<String> {
    log.borrow().clone()
}

pub(crate) fn dirty_slots(dirty: &DirtyBits) -> Vec<usize> {
    dirty.iter().collect()
}

/// Fragment that records every call and optionally claims to have an outro.
pub(crate) struct LogFragment {
    pub name: String,
    pub log: Log,
    pub first: Option<NodeId>,
    pub has_outro: bool,
}

impl LogFragment {
    pub(crate) fn new(name: &str, log: &Log) -> Self {
        Self {
            name: name.to_string(),
            log: log.clone(),
            first: None,
            has_outro: false,
        }
    }

    pub(crate) fn with_outro(mut self) -> Self {
        self.has_outro = true;
        self
    }

    fn record(&self, entry: String) {
        self.log.borrow_mut().push(entry);
    }
}

impl Fragment for LogFragment {
    fn mount(&mut self, _target: NodeId, _anchor: Option<NodeId>) -> Result<(), RuntimeError> {
        self.record(format!("mount {}", self.name));
        Ok(())
    }

    fn patch(&mut self, ctx: &[Value], dirty: &DirtyBits) -> Result<(), RuntimeError> {
        let values: Vec<String> = ctx.iter().map(Value::display_text).collect();
        self.record(format!(
            "patch {} {:?} {}",
            self.name,
            dirty_slots(dirty),
            values.join(",")
        ));
        Ok(())
    }

    fn destroy(&mut self, detaching: bool) {
        self.record(format!("destroy {} {detaching}", self.name));
    }

    fn first(&self) -> Option<NodeId> {
        self.first
    }

    fn intro(&mut self, local: bool) {
        self.record(format!("intro {} {local}", self.name));
    }

    fn outro(&mut self, local: bool) {
        self.record(format!("outro {} {local}", self.name));
    }

    fn has_outro(&self) -> bool {
        self.has_outro
    }
}

/// Two-slot component: `count` in slot 0 and `label` in slot 1. Patching
/// with `count == fail_on` fails.
pub(crate) struct Counter {
    pub log: Log,
    pub fail_on: Option<i64>,
}

impl Counter {
    pub(crate) fn new(log: &Log) -> Self {
        Self {
            log: log.clone(),
            fail_on: None,
        }
    }
}

struct CounterFragment {
    log: Log,
    fail_on: Option<i64>,
}

impl Fragment for CounterFragment {
    fn mount(&mut self, target: NodeId, _anchor: Option<NodeId>) -> Result<(), RuntimeError> {
        self.log.borrow_mut().push(format!("mount into {target}"));
        Ok(())
    }

    fn patch(&mut self, ctx: &[Value], dirty: &DirtyBits) -> Result<(), RuntimeError> {
        let count = ctx.first().and_then(Value::as_int).unwrap_or_default();
        if Some(count) == self.fail_on {
            return Err(RuntimeError::Patch {
                component: 0,
                reason: format!("count {count} rejected"),
            });
        }
        self.log
            .borrow_mut()
            .push(format!("patch count={count} dirty={:?}", dirty_slots(dirty)));
        Ok(())
    }

    fn destroy(&mut self, detaching: bool) {
        self.log.borrow_mut().push(format!("destroy {detaching}"));
    }
}

impl ComponentDefinition for Counter {
    fn name(&self) -> &str {
        "Counter"
    }

    fn props(&self) -> &[(&'static str, usize)] {
        &[("count", 0), ("label", 1)]
    }

    fn instance(&self, _component: &Component, props: &Props) -> Vec<Value> {
        vec![
            props.get("count").cloned().unwrap_or(Value::Int(0)),
            props.get("label").cloned().unwrap_or_else(|| Value::from("")),
        ]
    }

    fn create_fragment(&self, _component: &Component, _ctx: &[Value]) -> Box<dyn Fragment> {
        Box::new(CounterFragment {
            log: self.log.clone(),
            fail_on: self.fail_on,
        })
    }
}
