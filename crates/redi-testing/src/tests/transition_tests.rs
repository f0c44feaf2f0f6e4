use super::*;

use redi_animation::{fade, ElementTransitions, TransitionHost, TransitionParams};
use redi_core::{
    DestroyStrategy, DirtyBits, Fragment, KeyedEach, NodeId, RuntimeError, SharedDom, Value,
};

/// `<li>` that fades in and out around its label.
struct FadingItem {
    name: String,
    label: String,
    dom: SharedDom,
    host: TransitionHost,
    recorder: Recorder,
    element: Option<NodeId>,
    text: Option<NodeId>,
    transitions: Option<ElementTransitions>,
}

impl Fragment for FadingItem {
    fn create(&mut self) -> Result<(), RuntimeError> {
        let mut dom = self.dom.borrow_mut();
        let element = dom.create_element("li");
        let text = dom.create_text(&self.label);
        dom.insert(element, text, None)?;
        let params = TransitionParams::new().duration(100.0);
        self.transitions = Some(
            ElementTransitions::new(&self.host, element)
                .with_intro(fade, params)
                .with_outro(fade, params),
        );
        self.element = Some(element);
        self.text = Some(text);
        Ok(())
    }

    fn mount(&mut self, target: NodeId, anchor: Option<NodeId>) -> Result<(), RuntimeError> {
        if let Some(element) = self.element {
            self.dom.borrow_mut().insert(target, element, anchor)?;
        }
        Ok(())
    }

    fn patch(&mut self, ctx: &[Value], dirty: &DirtyBits) -> Result<(), RuntimeError> {
        if dirty.contains(1) {
            self.label = ctx.get(1).map(Value::display_text).unwrap_or_default();
            if let Some(text) = self.text {
                self.dom.borrow_mut().set_text(text, &self.label)?;
            }
        }
        Ok(())
    }

    fn destroy(&mut self, detaching: bool) {
        if let Some(transitions) = &self.transitions {
            transitions.destroy(detaching);
        }
        if detaching {
            if let Some(element) = self.element {
                let _ = self.dom.borrow_mut().detach(element);
            }
        }
        self.recorder
            .record(format!("destroy {} {detaching}", self.name));
    }

    fn first(&self) -> Option<NodeId> {
        self.element
    }

    fn intro(&mut self, local: bool) {
        if let Some(transitions) = &self.transitions {
            transitions.intro(local);
        }
    }

    fn outro(&mut self, local: bool) {
        if let Some(transitions) = &self.transitions {
            transitions.outro(local);
        }
    }

    fn has_outro(&self) -> bool {
        true
    }
}

struct FadingList {
    harness: Harness,
    host: TransitionHost,
    recorder: Recorder,
    each: KeyedEach<i64>,
}

impl FadingList {
    fn new(keys: &[i64]) -> Self {
        let harness = Harness::new();
        let host = TransitionHost::new(harness.handle(), harness.shared_dom());
        let each = KeyedEach::new(harness.handle()).with_strategy(DestroyStrategy::Outro);
        let mut list = Self {
            harness,
            host,
            recorder: Recorder::new(),
            each,
        };
        list.render(keys).expect("initial render");
        list.harness
            .run_frames_until_idle(50.0)
            .expect("intros finish");
        list
    }

    fn render(&mut self, keys: &[i64]) -> Result<(), RuntimeError> {
        let dom = self.harness.shared_dom();
        let host = self.host.clone();
        let recorder = self.recorder.clone();
        self.each.reconcile(
            &DirtyBits::all(),
            keys.len(),
            |index| vec![Value::Int(keys[index]), Value::from(format!("<{}>", keys[index]))],
            |ctx| ctx[0].as_int().unwrap_or_default(),
            self.harness.root(),
            None,
            |key, ctx| {
                Box::new(FadingItem {
                    name: format!("item{key}"),
                    label: ctx.get(1).map(Value::display_text).unwrap_or_default(),
                    dom: dom.clone(),
                    host: host.clone(),
                    recorder: recorder.clone(),
                    element: None,
                    text: None,
                    transitions: None,
                }) as Box<dyn Fragment>
            },
        )
    }

    fn block_id(&self, key: i64) -> usize {
        self.each
            .blocks()
            .iter()
            .find(|block| *block.key() == key)
            .map(|block| block.id())
            .expect("block for key")
    }
}

#[test]
fn removed_item_stays_until_its_outro_ends() {
    let mut list = FadingList::new(&[1, 2, 3]);
    assert_eq!(list.harness.text(), "<1><2><3>");

    list.render(&[1, 3]).expect("remove");

    assert_eq!(list.each.keys(), vec![1, 3]);
    assert!(list.each.contains_key(&2));
    assert_eq!(list.harness.text(), "<1><2><3>");

    list.harness.advance_by(100.0, 50.0).expect("frames");

    assert_eq!(list.harness.text(), "<1><3>");
    assert!(!list.each.contains_key(&2));
    assert_eq!(list.recorder.entries(), vec!["destroy item2 true"]);
    assert_eq!(list.host.styles().active(), 0);
}

#[test]
fn readded_item_survives_while_its_group_finishes() {
    let mut list = FadingList::new(&[1, 2, 3]);
    let two = list.block_id(2);

    list.render(&[1]).expect("remove two");
    list.harness.advance_frame(50.0).expect("frame");
    list.render(&[1, 2]).expect("re-add");

    assert_eq!(list.block_id(2), two);
    list.harness.advance_by(100.0, 50.0).expect("frames");

    assert_eq!(list.harness.text(), "<1><2>");
    assert!(list.each.contains_key(&2));
    assert!(!list.each.contains_key(&3));
    assert_eq!(list.recorder.count("destroy item3"), 1);
    assert_eq!(list.recorder.count("destroy item2"), 0);
    assert!(!list.harness.runtime().needs_frame());
}
