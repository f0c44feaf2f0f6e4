use super::*;

use redi_core::{init, Callback, Component, ComponentOptions, Props, RuntimeError, SchedulerState, Value};

fn mount(
    harness: &Harness,
    recorder: &Recorder,
    definition: &RecordingComponent,
    props: Props,
) -> Component {
    let component = init(
        &harness.handle(),
        definition,
        ComponentOptions::new().target(harness.root()).props(props),
    )
    .expect("mount");
    harness.pump_until_idle().expect("settle");
    recorder.take();
    component
}

fn counter(harness: &Harness, recorder: &Recorder, name: &str) -> RecordingComponent {
    RecordingComponent::new(
        name,
        &[("count", Value::Int(0)), ("label", Value::from(""))],
        &harness.shared_dom(),
        recorder,
    )
}

#[test]
fn invalidations_in_one_task_share_a_single_drain() {
    let harness = Harness::new();
    let recorder = Recorder::new();
    let component = mount(&harness, &recorder, &counter(&harness, &recorder, "Counter"), Props::new());
    let before = harness.scheduler().microtask_requests();

    component.invalidate(0, 1);
    component.invalidate(1, "one");
    component.invalidate(0, 2);

    assert_eq!(harness.scheduler().microtask_requests(), before + 1);
    harness.pump_until_idle().expect("drain");
    assert_eq!(recorder.entries(), vec!["patch Counter [0, 1]"]);
    assert_eq!(harness.text(), "2");
}

#[test]
fn repeated_requests_patch_once() {
    let harness = Harness::new();
    let recorder = Recorder::new();
    let component = mount(&harness, &recorder, &counter(&harness, &recorder, "Counter"), Props::new());

    for _ in 0..100 {
        component.request_update();
    }
    assert_eq!(harness.handle().pending_components(), 1);

    harness.pump_until_idle().expect("drain");
    assert_eq!(recorder.count("patch Counter"), 1);
}

#[test]
fn failed_patch_leaves_scheduler_idle_for_later_updates() {
    let harness = Harness::new();
    let recorder = Recorder::new();
    let fragile = counter(&harness, &recorder, "Fragile")
        .failing_when(|ctx| ctx.first().and_then(Value::as_int) == Some(13));
    let fragile = mount(&harness, &recorder, &fragile, Props::new());
    let steady = mount(&harness, &recorder, &counter(&harness, &recorder, "Steady"), Props::new());

    fragile.invalidate(0, 13);
    steady.invalidate(0, 1);
    let result = harness.pump_until_idle();

    assert!(matches!(result, Err(RuntimeError::Patch { .. })));
    assert_eq!(harness.runtime().state(), SchedulerState::Idle);
    assert_eq!(recorder.count("patch Steady"), 0);

    steady.invalidate(0, 2);
    harness.pump_until_idle().expect("later drain");
    assert_eq!(recorder.entries(), vec!["patch Steady [0]"]);
}

#[test]
fn failed_drain_still_resolves_flush_waiters() {
    let harness = Harness::new();
    let recorder = Recorder::new();
    let fragile = counter(&harness, &recorder, "Fragile")
        .failing_when(|ctx| ctx.first().and_then(Value::as_int) == Some(13));
    let fragile = mount(&harness, &recorder, &fragile, Props::new());

    fragile.invalidate(0, 13);
    let waiter = harness.handle().await_flush();
    assert!(harness.pump_until_idle().is_err());

    assert_eq!(harness.block_on(waiter), Ok(Some(())));
}

#[test]
fn patch_errors_name_the_failing_component() {
    let harness = Harness::new();
    let recorder = Recorder::new();
    let fragile = counter(&harness, &recorder, "Fragile")
        .failing_when(|ctx| ctx.first().and_then(Value::as_int) == Some(13));
    let fragile = mount(&harness, &recorder, &fragile, Props::new());

    fragile.invalidate(0, 13);

    match harness.pump_until_idle() {
        Err(RuntimeError::Patch { component, .. }) => assert_eq!(component, fragile.id()),
        other => panic!("expected a patch error, got {other:?}"),
    }
}

#[test]
fn binding_callbacks_run_after_every_patch_once_per_drain() {
    let harness = Harness::new();
    let recorder = Recorder::new();
    let first = mount(&harness, &recorder, &counter(&harness, &recorder, "First"), Props::new());
    let second = mount(&harness, &recorder, &counter(&harness, &recorder, "Second"), Props::new());

    let log = recorder.clone();
    let binding = Callback::new(move || log.record("binding"));
    let handle = harness.handle();
    first.set_update_hook(move |_| {
        handle.add_binding_callback(binding.clone());
        handle.add_binding_callback(binding.clone());
        handle.add_binding_callback(binding.clone());
    });

    first.invalidate(0, 1);
    second.invalidate(0, 1);
    harness.pump_until_idle().expect("drain");

    assert_eq!(
        recorder.entries(),
        vec!["patch First [0]", "patch Second [0]", "binding"]
    );
}

#[test]
fn component_destroyed_while_pending_is_skipped() {
    let harness = Harness::new();
    let recorder = Recorder::new();
    let component = mount(&harness, &recorder, &counter(&harness, &recorder, "Doomed"), Props::new());

    component.invalidate(0, 5);
    component.destroy();
    harness.pump_until_idle().expect("drain");

    assert_eq!(recorder.count("patch Doomed"), 0);
    assert_eq!(recorder.count("destroy Doomed"), 1);
    assert_eq!(harness.text(), "");
}

#[test]
fn set_props_updates_only_the_named_slots() {
    let harness = Harness::new();
    let recorder = Recorder::new();
    let component = mount(
        &harness,
        &recorder,
        &counter(&harness, &recorder, "Counter"),
        Props::new().with("count", 3),
    );
    assert_eq!(harness.text(), "3");

    component.set_props(Props::new().with("label", "three"));
    harness.pump_until_idle().expect("drain");

    assert_eq!(recorder.entries(), vec!["patch Counter [1]"]);
    assert_eq!(harness.text(), "3");
}
