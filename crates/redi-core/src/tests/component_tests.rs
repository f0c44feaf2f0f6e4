use super::*;

use crate::runtime::TestRuntime;
use crate::test_support::{entries, new_log, Counter, Log, LogFragment};

struct Tracked {
    log: Log,
    policy: ChangePolicy,
}

impl Tracked {
    fn new(log: &Log) -> Self {
        Self {
            log: log.clone(),
            policy: ChangePolicy::Identity,
        }
    }
}

impl ComponentDefinition for Tracked {
    fn name(&self) -> &str {
        "Tracked"
    }

    fn props(&self) -> &[(&'static str, usize)] {
        &[("value", 0)]
    }

    fn change_policy(&self) -> ChangePolicy {
        self.policy
    }

    fn instance(&self, component: &Component, props: &Props) -> Vec<Value> {
        let log = self.log.clone();
        component.set_update_hook(move |_| log.borrow_mut().push("hook".to_string()));
        let log = self.log.clone();
        component.before_update(move || log.borrow_mut().push("before".to_string()));
        let log = self.log.clone();
        component.after_update(move || log.borrow_mut().push("after".to_string()));
        let log = self.log.clone();
        component.on_mount(move || {
            log.borrow_mut().push("mounted".to_string());
            let log = log.clone();
            Some(Box::new(move || log.borrow_mut().push("teardown".to_string())) as Teardown)
        });
        let log = self.log.clone();
        component.on_destroy(move || log.borrow_mut().push("on_destroy".to_string()));
        vec![props.get("value").cloned().unwrap_or(Value::Int(0))]
    }

    fn create_fragment(&self, _component: &Component, _ctx: &[Value]) -> Box<dyn Fragment> {
        Box::new(LogFragment::new("tracked", &self.log))
    }
}

/// Slot 1 is derived from slot 0 by the reactive hook.
struct Doubler {
    log: Log,
}

impl ComponentDefinition for Doubler {
    fn instance(&self, component: &Component, _props: &Props) -> Vec<Value> {
        component.set_update_hook(|component| {
            if component.dirty().contains(0) {
                let value = component.get(0).as_int().unwrap_or_default();
                component.invalidate(1, value * 2);
            }
        });
        vec![Value::Int(1), Value::Int(0)]
    }

    fn create_fragment(&self, _component: &Component, _ctx: &[Value]) -> Box<dyn Fragment> {
        Box::new(LogFragment::new("doubler", &self.log))
    }
}

#[test]
fn lifecycle_runs_in_order() {
    let test = TestRuntime::new();
    let log = new_log();
    let component = init(
        &test.handle(),
        &Tracked::new(&log),
        ComponentOptions::new().target(0),
    )
    .expect("init");
    assert_eq!(
        entries(&log),
        vec!["hook", "before", "mount tracked", "mounted", "after"]
    );
    assert!(component.is_ready());

    log.borrow_mut().clear();
    component.invalidate(0, 5);
    test.runtime.run_microtasks().expect("drain");
    assert_eq!(
        entries(&log),
        vec!["hook", "before", "patch tracked [0] 5", "after"]
    );

    log.borrow_mut().clear();
    component.destroy();
    component.destroy();
    assert_eq!(
        entries(&log),
        vec!["on_destroy", "teardown", "destroy tracked true"]
    );
    assert!(component.is_destroyed());
}

#[test]
fn reactive_hook_writes_join_the_same_patch() {
    let test = TestRuntime::new();
    let log = new_log();
    let component =
        init(&test.handle(), &Doubler { log: log.clone() }, ComponentOptions::new()).expect("init");
    assert_eq!(component.get(1).as_int(), Some(2));

    component.invalidate(0, 4);
    test.runtime.run_microtasks().expect("drain");
    assert_eq!(entries(&log), vec!["patch doubler [0, 1] 4,8"]);
}

#[test]
fn mount_hooks_skip_destroyed_components() {
    let test = TestRuntime::new();
    let log = new_log();
    let component = init(&test.handle(), &Tracked::new(&log), ComponentOptions::new()).expect("init");
    component.mount(0, None).expect("mount");
    component.destroy();
    test.runtime.run_microtasks().expect("drain");

    let log = entries(&log);
    assert!(!log.contains(&"mounted".to_string()));
    assert!(matches!(
        component.mount(0, None),
        Err(RuntimeError::Destroyed { .. })
    ));
}

#[test]
fn invalidate_after_destroy_is_ignored() {
    let test = TestRuntime::new();
    let log = new_log();
    let component = init(&test.handle(), &Counter::new(&log), ComponentOptions::new()).expect("init");
    component.destroy();
    component.invalidate(0, 9);
    assert_eq!(test.microtask_requests(), 0);
    assert!(component.get(0).is_empty());
}

#[test]
fn always_changed_references_patch_on_reassignment() {
    let test = TestRuntime::new();
    let log = new_log();
    let shared = Value::shared(vec![1, 2]);

    let identity = init(
        &test.handle(),
        &Tracked::new(&log),
        ComponentOptions::new().props(Props::new().with("value", shared.clone())),
    )
    .expect("init");
    identity.invalidate(0, shared.clone());
    assert!(!identity.is_pending());

    let mut definition = Tracked::new(&log);
    definition.policy = ChangePolicy::AlwaysChangedReferences;
    let strict = init(
        &test.handle(),
        &definition,
        ComponentOptions::new().props(Props::new().with("value", shared.clone())),
    )
    .expect("init");
    strict.invalidate(0, shared);
    assert!(strict.is_pending());
    assert_eq!(strict.dirty().iter().collect::<Vec<_>>(), vec![0]);
}

#[test]
fn binding_reports_child_writes_but_not_parent_writes() {
    let test = TestRuntime::new();
    let log = new_log();
    let child = init(&test.handle(), &Counter::new(&log), ComponentOptions::new()).expect("init");
    let seen: Rc<RefCell<Vec<Value>>> = Rc::new(RefCell::new(Vec::new()));

    let sink = seen.clone();
    assert_eq!(
        child.bind("count", move |value| sink.borrow_mut().push(value.clone())),
        Ok(true)
    );
    assert_eq!(seen.borrow().len(), 1, "bind reports the current value");

    child.invalidate(0, 3);
    assert_eq!(seen.borrow().last().and_then(Value::as_int), Some(3));

    child.set_props(Props::new().with("count", 4));
    assert_eq!(seen.borrow().len(), 2);
    assert_eq!(child.get(0).as_int(), Some(4));

    assert_eq!(child.bind("nope", |_| {}), Ok(false));
    child.destroy();
    assert!(matches!(
        child.bind("count", |_| {}),
        Err(RuntimeError::Destroyed { .. })
    ));
}

#[test]
fn events_reach_subscribers_until_unsubscribed() {
    let test = TestRuntime::new();
    let log = new_log();
    let component = init(&test.handle(), &Counter::new(&log), ComponentOptions::new()).expect("init");
    let dispatcher = component.dispatcher();

    let sink = log.clone();
    let subscription = component.on("select", move |event| {
        sink.borrow_mut()
            .push(format!("{} {}", event.name(), event.detail().display_text()));
        event.prevent_default();
    });

    assert!(dispatcher.dispatch("select", 1), "non-cancelable ignores prevent_default");
    assert!(!dispatcher.dispatch_cancelable("select", 2));
    assert!(dispatcher.dispatch("other", 3));
    subscription.unsubscribe();
    assert!(dispatcher.dispatch_cancelable("select", 4));
    assert_eq!(entries(&log), vec!["select 1", "select 2"]);
}

#[test]
fn bubbled_events_reach_the_parent_with_the_same_detail() {
    let test = TestRuntime::new();
    let log = new_log();
    let parent = init(&test.handle(), &Counter::new(&log), ComponentOptions::new()).expect("init");
    let child = init(&test.handle(), &Counter::new(&log), ComponentOptions::new()).expect("init");
    let seen = Rc::new(RefCell::new(Vec::new()));

    let sink = seen.clone();
    let _outer = parent.on("select", move |event| {
        sink.borrow_mut()
            .push(format!("parent {}", event.detail().display_text()));
        event.prevent_default();
    });
    let forward = parent.dispatcher();
    let sink = seen.clone();
    let _inner = child.on("select", move |event| {
        sink.borrow_mut().push(format!("child {}", event.name()));
        forward.bubble(event);
    });

    assert!(!child.dispatcher().dispatch_cancelable("select", 7));
    assert!(child.dispatcher().dispatch("select", 8));
    assert!(parent.dispatcher().bubble(&ComponentEvent {
        name: "other".to_string(),
        detail: Value::Int(9),
        cancelable: true,
        default_prevented: Cell::new(false),
    }));
    assert_eq!(
        *seen.borrow(),
        vec!["child select", "parent 7", "child select", "parent 8"]
    );
}

#[test]
fn context_is_inherited_as_a_snapshot() {
    let test = TestRuntime::new();
    let log = new_log();
    let theme: ContextKey<&'static str> = ContextKey::new();
    let depth: ContextKey<u32> = ContextKey::new();

    let parent = init(&test.handle(), &Counter::new(&log), ComponentOptions::new()).expect("init");
    parent.set_context(theme, "dark");

    let child = {
        let _scope = parent.enter();
        init(&test.handle(), &Counter::new(&log), ComponentOptions::new()).expect("init")
    };
    assert_eq!(child.get_context(theme), Some("dark"));
    child.set_context(depth, 1);
    assert!(!parent.has_context(depth));

    let isolated = {
        let _scope = parent.enter();
        init(
            &test.handle(),
            &Counter::new(&log),
            ComponentOptions::new().context(ContextMap::new().with(depth, 7)),
        )
        .expect("init")
    };
    assert_eq!(isolated.get_context(depth), Some(7));
    assert!(!isolated.has_context(theme));
}

#[test]
fn child_fragment_forwards_props_and_destroy() {
    let test = TestRuntime::new();
    let log = new_log();
    let child = init(&test.handle(), &Counter::new(&log), ComponentOptions::new()).expect("init");
    let mut fragment = ChildFragment::new(child.clone())
        .with_props(|ctx| Props::new().with("count", ctx[0].clone()));

    fragment.patch(&[Value::Int(6)], &DirtyBits::from_slots([0])).expect("patch");
    assert_eq!(child.get(0).as_int(), Some(6));
    assert!(child.is_pending());

    fragment.destroy(false);
    assert!(child.is_destroyed());
    assert_eq!(entries(&log), vec!["destroy false"]);
}

#[test]
fn props_insert_replaces_and_merge_overrides() {
    let mut props = Props::new().with("a", 1).with("b", 2);
    props.insert("a", 3);
    props.merge(Props::new().with("b", 4).with("c", 5));
    let pairs: Vec<(String, i64)> = props
        .iter()
        .map(|(name, value)| (name.to_string(), value.as_int().unwrap_or_default()))
        .collect();
    assert_eq!(
        pairs,
        vec![("a".into(), 3), ("b".into(), 4), ("c".into(), 5)]
    );
}
