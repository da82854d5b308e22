use fiber_core::{
    children, host, Child, EffectTag, Element, Engine, FiberId, FiberKind, FixedDeadline, Props,
    SliceOutcome, Tag,
};
use fiber_testing::{engine_with_recorder, run_to_commit, HostOp, RecordingHost};
use std::time::Duration;

fn item(id: &str, text: &str) -> Element {
    host("li", Props::new().with("id", id), children![text])
}

fn list(items: &[(&str, &str)]) -> Element {
    let children = items.iter().map(|(id, text)| Child::from(item(id, text)));
    host("ul", Props::new().with("class", "items"), children)
}

fn chain(engine: &Engine<RecordingHost>, first: Option<FiberId>) -> Vec<FiberId> {
    std::iter::successors(first, |id| engine.fiber(*id).and_then(|f| f.sibling())).collect()
}

#[test]
fn identical_rerender_is_a_no_op() {
    let (mut engine, container, _) = engine_with_recorder();
    engine.render(list(&[("a", "A"), ("b", "B")]), container);
    let first = run_to_commit(&mut engine).unwrap();
    assert_eq!(first.placements(), 5);
    engine.host_mut().clear();

    engine.render(list(&[("a", "A"), ("b", "B")]), container);
    let report = run_to_commit(&mut engine).unwrap();
    assert_eq!(report.placements(), 0);
    assert_eq!(report.deletions(), 0);
    assert_eq!(report.updates(), 5);
    assert!(report.is_noop());
    assert!(engine.host().ops().is_empty());
}

#[test]
fn rerender_touches_only_changed_properties() {
    let (mut engine, container, _) = engine_with_recorder();
    engine.render(list(&[("a", "A"), ("b", "B")]), container);
    run_to_commit(&mut engine).unwrap();
    engine.host_mut().clear();

    engine.render(list(&[("a", "A"), ("b", "Bee")]), container);
    let report = run_to_commit(&mut engine).unwrap();
    assert_eq!(report.changed_updates(), 1);
    let changed: Vec<_> = report.effects.iter().filter(|e| !e.changed.is_empty()).collect();
    assert_eq!(changed[0].label, "TEXT");
    assert_eq!(changed[0].changed, vec!["nodeValue".to_owned()]);
    assert_eq!(
        engine.host().ops(),
        &[HostOp::SetProperty {
            node: changed[0].node.unwrap(),
            name: "nodeValue".into(),
            value: "\"Bee\"".into(),
        }]
    );
}

#[test]
fn positional_diff_updates_by_slot_and_deletes_the_tail() {
    let (mut engine, container, _) = engine_with_recorder();
    engine.render(list(&[("a", "A"), ("b", "B"), ("c", "C")]), container);
    run_to_commit(&mut engine).unwrap();

    let old_ul = engine.fiber(engine.current_root().unwrap()).unwrap().child().unwrap();
    let old_items = chain(&engine, engine.fiber(old_ul).unwrap().child());
    assert_eq!(old_items.len(), 3);
    let old_nodes: Vec<_> = old_items
        .iter()
        .map(|id| engine.fiber(*id).unwrap().host_node().unwrap())
        .collect();

    engine.render(list(&[("a", "A"), ("c", "C")]), container);
    while engine.perform_next_unit().unwrap().is_some() {}

    let wip_root = engine.work_in_progress_root().unwrap();
    let new_ul = engine.fiber(wip_root).unwrap().child().unwrap();
    let new_items = chain(&engine, engine.fiber(new_ul).unwrap().child());
    assert_eq!(new_items.len(), 2);

    let slot0 = engine.fiber(new_items[0]).unwrap();
    assert_eq!(slot0.effect(), EffectTag::Update);
    assert_eq!(slot0.alternate(), Some(old_items[0]));

    // Position 1 pairs C's props with B's old fiber.
    let slot1 = engine.fiber(new_items[1]).unwrap();
    assert_eq!(slot1.effect(), EffectTag::Update);
    assert_eq!(slot1.alternate(), Some(old_items[1]));
    assert_eq!(slot1.host_node(), Some(old_nodes[1]));
    assert_eq!(slot1.props().get("id").and_then(|v| v.as_text()), Some("c"));

    assert_eq!(engine.fiber(old_items[2]).unwrap().effect(), EffectTag::Deletion);
    assert!(!new_items.contains(&old_items[2]));

    let outcome = engine.work_loop(&FixedDeadline(Duration::from_millis(10))).unwrap();
    assert_eq!(outcome, SliceOutcome::Committed { units: 0 });
    let report = engine.last_commit().unwrap();
    assert_eq!(report.deletions(), 1);
    assert_eq!(report.placements(), 0);
    let deleted = report
        .effects
        .iter()
        .find(|e| e.effect == EffectTag::Deletion)
        .unwrap();
    assert_eq!(deleted.node, Some(old_nodes[2]));

    let memory = engine.host().memory();
    assert_eq!(memory.children(memory.children(container)[0]), old_nodes[..2].to_vec());
    assert_eq!(memory.text_content(container), "AC");
    assert!(engine.fiber(old_items[1]).is_none(), "previous tree is retired");
}

#[test]
fn kind_change_replaces_the_subtree() {
    let (mut engine, container, _) = engine_with_recorder();
    let before = host("div", Props::new(), children![host("p", Props::new(), children!["x"])]);
    engine.render(before, container);
    run_to_commit(&mut engine).unwrap();
    let div = engine.host().memory().children(container)[0];
    let p = engine.host().memory().children(div)[0];

    let after = host("div", Props::new(), children![host("span", Props::new(), children!["y"])]);
    engine.render(after, container);
    let report = run_to_commit(&mut engine).unwrap();
    assert_eq!(report.deletions(), 1);
    assert_eq!(report.placements(), 2);

    let memory = engine.host().memory();
    let span = memory.children(div)[0];
    assert_eq!(memory.node(span).unwrap().tag().unwrap().as_str(), "span");
    assert_eq!(memory.children(div).len(), 1);
    // The slots freed by `p` and its text are reused.
    assert_eq!(memory.len(), 4);
    assert!(memory.node(p).map_or(true, |node| node.tag().map(Tag::as_str) != Some("p")));
    assert_eq!(memory.text_content(container), "y");
}

#[test]
fn root_fiber_carries_the_container() {
    let (mut engine, container, _) = engine_with_recorder();
    engine.render(item("a", "A"), container);
    let root = engine.work_in_progress_root().unwrap();
    let fiber = engine.fiber(root).unwrap();
    assert_eq!(fiber.kind(), &FiberKind::Root);
    assert_eq!(fiber.host_node(), Some(container));
    assert_eq!(engine.next_unit_of_work(), Some(root));
}
