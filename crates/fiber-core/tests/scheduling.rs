use std::cell::RefCell;
use std::rc::Rc;
use std::time::Duration;

use fiber_core::{
    children, component, host, use_state, Child, Component, Dispatch, EffectTag, Element,
    EngineError, EngineOptions, FiberId, FixedDeadline, HostError, Props, SliceOutcome,
};
use fiber_testing::{
    engine_with_memory, engine_with_recorder, run_to_commit, settle, ScriptedDeadline,
};

// root, ul, li, TEXT, li, TEXT
const LIST_FIBERS: usize = 6;

fn list() -> Element {
    host(
        "ul",
        Props::new(),
        children![
            host("li", Props::new(), children!["one"]),
            host("li", Props::new(), children!["two"]),
        ],
    )
}

fn digits(n: usize) -> Element {
    host("ul", Props::new(), (0..n).map(|i| Child::from(i.to_string())))
}

fn ticker(slot: Rc<RefCell<Option<Dispatch<i32>>>>) -> Component {
    Component::new("Ticker", move |_| {
        let (ticks, set_ticks) = use_state(0);
        slot.replace(Some(set_ticks));
        host(
            "section",
            Props::new(),
            children![
                host("span", Props::new(), children![ticks]),
                host("span", Props::new(), children!["tail"]),
            ],
        )
    })
}

#[test]
fn commit_happens_once_after_every_unit() {
    let (mut engine, container, _) = engine_with_recorder();
    engine.render(list(), container);

    let mut outcomes = Vec::new();
    loop {
        let outcome = engine.work_loop(&ScriptedDeadline::units(1)).unwrap();
        outcomes.push(outcome);
        if outcome.is_committed() {
            break;
        }
        assert_eq!(engine.stats().commits, 0);
        assert!(engine.host().ops().is_empty(), "host touched before commit");
    }

    assert_eq!(outcomes.len(), LIST_FIBERS);
    assert!(outcomes[..LIST_FIBERS - 1]
        .iter()
        .all(|o| *o == SliceOutcome::Suspended { units: 1 }));
    assert_eq!(outcomes[LIST_FIBERS - 1], SliceOutcome::Committed { units: 1 });
    assert_eq!(engine.stats().commits, 1);
    assert_eq!(engine.host().memory().text_content(container), "onetwo");

    let idle = engine.work_loop(&FixedDeadline(Duration::from_millis(5))).unwrap();
    assert_eq!(idle, SliceOutcome::Idle);
    assert_eq!(engine.stats().commits, 1);
}

#[test]
fn suspension_resumes_at_the_exact_fiber() {
    // Reference order, one unit at a time.
    let (mut reference, ref_container) = engine_with_memory();
    reference.render(list(), ref_container);
    let mut order = Vec::new();
    while let Some(unit) = reference.next_unit_of_work() {
        order.push(unit);
        reference.perform_next_unit().unwrap();
    }
    assert_eq!(order.len(), LIST_FIBERS);

    let (mut engine, container) = engine_with_memory();
    engine.render(list(), container);
    let shrinking = ScriptedDeadline::new([
        Duration::from_millis(5),
        Duration::from_millis(3),
        Duration::from_millis(2),
        Duration::from_micros(500),
        Duration::from_millis(40),
    ]);
    let outcome = engine.work_loop(&shrinking).unwrap();
    assert_eq!(outcome, SliceOutcome::Suspended { units: 4 });
    assert_eq!(shrinking.reads(), 4, "no unit after the budget dropped");
    assert_eq!(engine.next_unit_of_work(), Some(order[4]));
    assert!(engine.host().children(container).is_empty());

    let outcome = engine.work_loop(&FixedDeadline(Duration::from_millis(50))).unwrap();
    assert_eq!(outcome, SliceOutcome::Committed { units: 2 });
    assert_eq!(engine.stats().units_performed, LIST_FIBERS as u64);
    assert_eq!(
        engine.host().dump_tree(Some(container)),
        reference.host().dump_tree(Some(ref_container))
    );
}

#[test]
fn at_least_one_unit_runs_per_slice() {
    let (mut engine, container) = engine_with_memory();
    engine.render(list(), container);
    let outcome = engine.work_loop(&FixedDeadline(Duration::ZERO)).unwrap();
    assert_eq!(outcome, SliceOutcome::Suspended { units: 1 });
    assert_eq!(settle(&mut engine, &FixedDeadline(Duration::ZERO)).unwrap(), LIST_FIBERS - 1);
}

#[test]
fn unit_cap_bounds_a_slice() {
    let (engine, container) = engine_with_memory();
    let mut engine = engine.with_options(EngineOptions::new().with_max_units_per_slice(4));
    engine.render(list(), container);
    let outcome = engine.work_loop(&FixedDeadline(Duration::from_secs(1))).unwrap();
    assert_eq!(outcome, SliceOutcome::Suspended { units: 4 });
    let outcome = engine.work_loop(&FixedDeadline(Duration::from_secs(1))).unwrap();
    assert_eq!(outcome, SliceOutcome::Committed { units: 2 });
}

#[test]
fn every_slice_rearms_the_scheduler() {
    let (mut engine, container, scheduler) = engine_with_recorder();
    assert_eq!(scheduler.requests(), 0);
    engine.render(list(), container);
    assert_eq!(scheduler.requests(), 1);

    run_to_commit(&mut engine).unwrap();
    assert_eq!(scheduler.requests(), 2);

    for expected in 3..6 {
        let outcome = engine.work_loop(&FixedDeadline(Duration::from_millis(5))).unwrap();
        assert_eq!(outcome, SliceOutcome::Idle);
        assert_eq!(scheduler.requests(), expected);
    }
    assert_eq!(engine.runtime().slice_requests(), 5);
}

#[test]
fn new_render_abandons_the_pass_in_flight() {
    let (mut engine, container, _) = engine_with_recorder();
    engine.render(list(), container);
    engine.work_loop(&ScriptedDeadline::units(3)).unwrap();
    assert!(engine.work_in_progress_root().is_some());

    engine.render(host("p", Props::new(), children!["replaced"]), container);
    let report = run_to_commit(&mut engine).unwrap();
    assert_eq!(engine.stats().passes_abandoned, 1);
    assert_eq!(report.placements(), 2);
    assert_eq!(engine.host().memory().text_content(container), "replaced");
    assert_eq!(engine.host().created().len(), 2, "abandoned pass created nothing");
    // root, p, TEXT
    assert_eq!(engine.fiber_count(), 3);
}

#[test]
fn dispatch_mid_pass_restarts_from_the_committed_tree() {
    let slot = Rc::new(RefCell::new(None));
    let (mut engine, container, _) = engine_with_recorder();
    engine.render(component(&ticker(slot.clone()), Props::new()), container);
    run_to_commit(&mut engine).unwrap();
    let committed_root = engine.current_root();
    let dispatch = slot.borrow().clone().unwrap();

    dispatch.update(|t| t + 1);
    assert!(engine.has_pending_work());
    let outcome = engine.work_loop(&ScriptedDeadline::units(3)).unwrap();
    assert_eq!(outcome, SliceOutcome::Suspended { units: 3 });
    let wip = engine.work_in_progress_root().unwrap();
    assert_eq!(engine.fiber(wip).unwrap().alternate(), committed_root);
    assert_eq!(engine.host().memory().text_content(container), "0tail");

    // This handle still points at the committed cell.
    dispatch.update(|t| t + 1);
    assert_eq!(dispatch.pending(), 2);
    run_to_commit(&mut engine).unwrap();

    assert_eq!(engine.stats().passes_abandoned, 1);
    assert_eq!(engine.host().memory().text_content(container), "2tail");
    let fresh = slot.borrow().clone().unwrap();
    assert_eq!(fresh.pending(), 0);
    assert_eq!(dispatch.pending(), 0, "retired cell is dropped");
    assert!(!engine.has_pending_work());
}

#[test]
fn failed_slice_abandons_the_pass() {
    let (mut engine, container) = engine_with_memory();
    let missing = container + 100;
    engine.render(list(), missing);
    let err = run_to_commit(&mut engine).unwrap_err();
    assert_eq!(err, EngineError::Host(HostError::Missing { id: missing }));
    assert!(engine.current_root().is_none());
    assert!(engine.work_in_progress_root().is_none());
    assert!(!engine.has_pending_work());
    assert_eq!(engine.fiber_count(), 0);

    engine.render(list(), container);
    run_to_commit(&mut engine).unwrap();
    assert_eq!(engine.host().text_content(container), "onetwo");
    assert_eq!(engine.fiber_count(), LIST_FIBERS);
}

#[test]
fn render_after_a_dispatch_wins() {
    let slot = Rc::new(RefCell::new(None));
    let (mut engine, container, _) = engine_with_recorder();
    engine.render(component(&ticker(slot.clone()), Props::new()), container);
    run_to_commit(&mut engine).unwrap();

    slot.borrow().clone().unwrap().update(|t| t + 1);
    assert!(engine.has_pending_work());
    engine.render(host("p", Props::new(), children!["replaced"]), container);
    run_to_commit(&mut engine).unwrap();

    assert_eq!(engine.host().memory().text_content(container), "replaced");
    assert_eq!(engine.stats().passes_started, 2);
    assert_eq!(engine.stats().passes_abandoned, 0);
    assert!(!engine.has_pending_work());
}

#[test]
fn render_after_a_dispatch_folds_the_queued_update() {
    let slot = Rc::new(RefCell::new(None));
    let (mut engine, container, _) = engine_with_recorder();
    engine.render(component(&ticker(slot.clone()), Props::new()), container);
    run_to_commit(&mut engine).unwrap();

    slot.borrow().clone().unwrap().update(|t| t + 1);
    engine.render(component(&ticker(slot.clone()), Props::new()), container);
    let report = run_to_commit(&mut engine).unwrap();

    assert_eq!(engine.host().memory().text_content(container), "1tail");
    assert_eq!(report.changed_updates(), 1);
    assert_eq!(engine.stats().passes_started, 2);
}

#[test]
fn abandoned_pass_drops_the_deletions_it_tagged() {
    let (mut engine, container) = engine_with_memory();
    engine.render(digits(3), container);
    run_to_commit(&mut engine).unwrap();
    let ul = engine.fiber(engine.current_root().unwrap()).unwrap().child();
    let first = ul.and_then(|ul| engine.fiber(ul)).and_then(|f| f.child());
    let items: Vec<FiberId> =
        std::iter::successors(first, |id| engine.fiber(*id).and_then(|f| f.sibling())).collect();
    assert_eq!(items.len(), 3);
    let tail = &items[1..];

    engine.render(digits(1), container);
    let outcome = engine.work_loop(&ScriptedDeadline::units(2)).unwrap();
    assert_eq!(outcome, SliceOutcome::Suspended { units: 2 });
    assert!(tail
        .iter()
        .all(|id| engine.fiber(*id).unwrap().effect() == EffectTag::Deletion));

    engine.render(digits(3), container);
    assert_eq!(engine.stats().passes_abandoned, 1);
    assert!(tail
        .iter()
        .all(|id| engine.fiber(*id).unwrap().effect() == EffectTag::None));

    let report = run_to_commit(&mut engine).unwrap();
    assert_eq!(report.deletions(), 0);
    assert_eq!(report.placements(), 0);
    assert!(report.is_noop());
    assert_eq!(engine.host().text_content(container), "012");
    assert!(!engine
        .dump_fiber_tree(engine.current_root())
        .contains("Deletion"));
}
