use super::*;

use std::cell::Cell;

use redi_core::MemoryDom;
use redi_testing::Harness;

type Ticks = Rc<RefCell<Vec<(f64, f64)>>>;

struct Fixture {
    harness: Harness,
    host: TransitionHost,
    dom: Rc<RefCell<MemoryDom>>,
}

impl Fixture {
    fn new() -> Self {
        let harness = Harness::new();
        let host = TransitionHost::new(harness.handle(), harness.shared_dom());
        let dom = harness.dom();
        Self { harness, host, dom }
    }

    fn element(&self) -> NodeId {
        let mut dom = self.dom.borrow_mut();
        let node = dom.create_element("div");
        dom.insert(self.harness.root(), node, None)
            .expect("insert element");
        node
    }

    fn events(&self, node: NodeId) -> Vec<String> {
        self.dom.borrow().events_for(node)
    }
}

fn recording(
    ticks: &Ticks,
    config: TransitionConfig,
) -> impl Fn(&dyn Dom, NodeId, &TransitionParams, &TransitionOptions) -> TransitionSource + 'static
{
    let ticks = ticks.clone();
    move |_: &dyn Dom, _: NodeId, _: &TransitionParams, _: &TransitionOptions| {
        let ticks = ticks.clone();
        config
            .clone()
            .tick(move |t, u| ticks.borrow_mut().push((t, u)))
            .into()
    }
}

fn plain(duration: f64) -> TransitionConfig {
    TransitionConfig::new().duration(duration)
}

#[test]
fn intro_ticks_from_hidden_to_visible() {
    let fixture = Fixture::new();
    let node = fixture.element();
    let ticks = Ticks::default();
    let intro = create_in_transition(
        &fixture.host,
        node,
        recording(&ticks, plain(100.0)),
        TransitionParams::new(),
    );

    intro.start();
    assert!(intro.is_running());
    assert_eq!(*ticks.borrow(), vec![(0.0, 1.0)]);

    fixture.harness.advance_frame(50.0).expect("frame");
    assert_eq!(fixture.events(node), vec!["introstart"]);
    fixture.harness.advance_frame(50.0).expect("frame");

    assert_eq!(*ticks.borrow(), vec![(0.0, 1.0), (0.5, 0.5), (1.0, 0.0)]);
    assert_eq!(fixture.events(node), vec!["introstart", "introend"]);
    assert!(!intro.is_running());
    assert!(!fixture.harness.runtime().needs_frame());
}

#[test]
fn intro_waits_out_its_delay() {
    let fixture = Fixture::new();
    let node = fixture.element();
    let ticks = Ticks::default();
    let intro = create_in_transition(
        &fixture.host,
        node,
        recording(&ticks, plain(100.0).delay(50.0)),
        TransitionParams::new(),
    );
    intro.start();

    fixture.harness.advance_frame(25.0).expect("frame");
    assert_eq!(ticks.borrow().len(), 1);
    fixture.harness.advance_frame(50.0).expect("frame");
    fixture.harness.advance_frame(75.0).expect("frame");

    assert_eq!(*ticks.borrow(), vec![(0.0, 1.0), (0.25, 0.75), (1.0, 0.0)]);
}

#[test]
fn starting_twice_is_a_no_op_until_invalidated() {
    let fixture = Fixture::new();
    let node = fixture.element();
    let ticks = Ticks::default();
    let intro = create_in_transition(
        &fixture.host,
        node,
        recording(&ticks, plain(100.0)),
        TransitionParams::new(),
    );

    intro.start();
    intro.start();
    assert_eq!(ticks.borrow().len(), 1);

    intro.invalidate();
    assert!(!intro.is_started());
    intro.start();
    assert_eq!(ticks.borrow().len(), 2);
}

#[test]
fn css_intro_runs_through_a_generated_rule() {
    let fixture = Fixture::new();
    let node = fixture.element();
    let ticks = Ticks::default();
    let config = plain(100.0).css(|t, _| format!("opacity: {t}"));
    let intro = create_in_transition(
        &fixture.host,
        node,
        recording(&ticks, config),
        TransitionParams::new(),
    );

    intro.start();
    let name = intro.animation_name().expect("generated rule");
    assert!(ticks.borrow().is_empty());
    {
        let dom = fixture.dom.borrow();
        assert!(dom.keyframes(&name).is_some());
        let animation = dom.style(node, "animation").expect("animation");
        assert!(animation.starts_with(&name));
    }

    fixture.harness.advance_by(100.0, 50.0).expect("frames");

    assert_eq!(*ticks.borrow(), vec![(0.5, 0.5), (1.0, 0.0)]);
    assert_eq!(fixture.dom.borrow().style(node, "animation"), None);
    assert_eq!(fixture.dom.borrow().keyframe_count(), 0);
    assert_eq!(fixture.host.styles().active(), 0);
}

#[test]
fn deferred_intro_resolves_on_the_next_microtask() {
    let fixture = Fixture::new();
    let node = fixture.element();
    let ticks = Ticks::default();
    let captured = ticks.clone();
    let intro = create_in_transition(
        &fixture.host,
        node,
        move |_, _, _, _| {
            let ticks = captured.clone();
            TransitionSource::deferred(move |options| {
                assert_eq!(options.direction, Direction::In);
                let ticks = ticks.clone();
                plain(100.0).tick(move |t, u| ticks.borrow_mut().push((t, u)))
            })
        },
        TransitionParams::new(),
    );

    intro.start();
    assert!(ticks.borrow().is_empty());
    assert!(!intro.is_running());

    fixture.harness.pump_until_idle().expect("microtasks");
    assert_eq!(*ticks.borrow(), vec![(0.0, 1.0)]);
    assert!(intro.is_running());
}

#[test]
fn invalidated_deferred_intro_never_begins() {
    let fixture = Fixture::new();
    let node = fixture.element();
    let resolved = Rc::new(Cell::new(false));
    let flag = resolved.clone();
    let intro = create_in_transition(
        &fixture.host,
        node,
        move |_, _, _, _| {
            let flag = flag.clone();
            TransitionSource::deferred(move |_| {
                flag.set(true);
                plain(100.0)
            })
        },
        TransitionParams::new(),
    );

    intro.start();
    intro.invalidate();
    fixture.harness.pump_until_idle().expect("microtasks");

    assert!(!resolved.get());
    assert!(!intro.is_running());
}

#[test]
fn ended_intro_stops_ticking() {
    let fixture = Fixture::new();
    let node = fixture.element();
    let ticks = Ticks::default();
    let intro = create_in_transition(
        &fixture.host,
        node,
        recording(&ticks, plain(100.0)),
        TransitionParams::new(),
    );
    intro.start();
    fixture.harness.advance_frame(50.0).expect("frame");

    intro.end();
    fixture.harness.advance_by(100.0, 25.0).expect("frames");

    assert_eq!(*ticks.borrow(), vec![(0.0, 1.0), (0.5, 0.5)]);
    assert_eq!(fixture.events(node), vec!["introstart"]);
}

#[test]
fn outro_ticks_from_visible_to_hidden() {
    let fixture = Fixture::new();
    let node = fixture.element();
    let ticks = Ticks::default();
    let handle = fixture.harness.handle();

    handle.group_outros();
    let outro = create_out_transition(
        &fixture.host,
        node,
        recording(&ticks, plain(100.0)),
        TransitionParams::new(),
    );
    handle.check_outros();
    assert!(ticks.borrow().is_empty());

    fixture.harness.advance_frame(25.0).expect("frame");
    fixture.harness.advance_frame(75.0).expect("frame");

    assert_eq!(*ticks.borrow(), vec![(0.75, 0.25), (0.0, 1.0)]);
    assert_eq!(fixture.events(node), vec!["outrostart", "outroend"]);
    assert!(!outro.is_running());
    assert!(!outro.holds_group());
}

#[test]
fn group_completes_only_after_every_outro() {
    let fixture = Fixture::new();
    let handle = fixture.harness.handle();
    let done = Rc::new(Cell::new(false));

    handle.group_outros();
    let group = handle.current_outro_group().expect("open group");
    let flag = done.clone();
    group.on_all_complete(move || flag.set(true));
    let outros: Vec<OutroTransition> = [100.0, 200.0, 300.0]
        .into_iter()
        .map(|duration| {
            create_out_transition(
                &fixture.host,
                fixture.element(),
                move |_, _, _, _| plain(duration).into(),
                TransitionParams::new(),
            )
        })
        .collect();
    handle.check_outros();
    assert_eq!(group.remaining(), 3);

    fixture.harness.advance_frame(150.0).expect("frame");
    assert_eq!(group.remaining(), 2);
    fixture.harness.advance_frame(100.0).expect("frame");
    assert!(!done.get());
    fixture.harness.advance_frame(50.0).expect("frame");

    assert!(done.get());
    assert!(outros.iter().all(|outro| !outro.holds_group()));
}

#[test]
fn cancelled_outro_releases_its_group_exactly_once() {
    let fixture = Fixture::new();
    let handle = fixture.harness.handle();
    let completions = Rc::new(Cell::new(0));

    handle.group_outros();
    let group = handle.current_outro_group().expect("open group");
    let counter = completions.clone();
    group.on_all_complete(move || counter.set(counter.get() + 1));
    let outros: Vec<OutroTransition> = (0..3)
        .map(|_| {
            create_out_transition(
                &fixture.host,
                fixture.element(),
                |_, _, _, _| plain(100.0).into(),
                TransitionParams::new(),
            )
        })
        .collect();
    handle.check_outros();

    outros[1].end(false);
    outros[1].end(false);
    assert_eq!(group.remaining(), 2);

    fixture.harness.advance_frame(100.0).expect("frame");

    assert_eq!(group.remaining(), 0);
    assert_eq!(completions.get(), 1);
}

#[test]
fn reset_outro_ticks_back_to_visible() {
    let fixture = Fixture::new();
    let node = fixture.element();
    let ticks = Ticks::default();
    let handle = fixture.harness.handle();

    handle.group_outros();
    let group = handle.current_outro_group().expect("open group");
    let outro = create_out_transition(
        &fixture.host,
        node,
        recording(&ticks, plain(100.0)),
        TransitionParams::new(),
    );
    handle.check_outros();
    fixture.harness.advance_frame(50.0).expect("frame");

    outro.end(true);

    assert_eq!(*ticks.borrow(), vec![(0.5, 0.5), (1.0, 0.0)]);
    assert!(group.is_complete());
    fixture.harness.advance_by(100.0, 25.0).expect("frames");
    assert_eq!(ticks.borrow().len(), 2);
}

#[test]
fn dropped_outro_does_not_wedge_its_group() {
    let fixture = Fixture::new();
    let handle = fixture.harness.handle();

    handle.group_outros();
    let group = handle.current_outro_group().expect("open group");
    let outro = create_out_transition(
        &fixture.host,
        fixture.element(),
        |_, _, _, _| plain(100.0).into(),
        TransitionParams::new(),
    );
    handle.check_outros();
    assert_eq!(group.remaining(), 1);

    drop(outro);

    assert!(group.is_complete());
}

#[test]
fn deferred_outro_ended_early_never_begins() {
    let fixture = Fixture::new();
    let node = fixture.element();
    let handle = fixture.harness.handle();

    handle.group_outros();
    let group = handle.current_outro_group().expect("open group");
    let outro = create_out_transition(
        &fixture.host,
        node,
        |_, _, _, _| TransitionSource::deferred(|_| plain(100.0)),
        TransitionParams::new(),
    );
    handle.check_outros();

    outro.end(false);
    fixture.harness.pump_until_idle().expect("microtasks");

    assert!(group.is_complete());
    assert!(fixture.events(node).is_empty());
    assert!(!fixture.harness.runtime().needs_frame());
}

#[test]
fn outro_outside_a_group_still_runs() {
    let fixture = Fixture::new();
    let node = fixture.element();
    let outro = create_out_transition(
        &fixture.host,
        node,
        |_, _, _, _| plain(100.0).into(),
        TransitionParams::new(),
    );
    assert!(!outro.holds_group());

    fixture.harness.advance_frame(100.0).expect("frame");

    assert!(!outro.is_running());
    assert_eq!(fixture.events(node), vec!["outrostart", "outroend"]);
}
