use fiber_core::{children, component, host, use_state, Component, Engine, MemoryHost, Props};
use fiber_runtime_std::{StdRuntime, StdRuntimeOptions};
use std::time::Duration;

const CLICKS: usize = 3;

fn counter() -> Component {
    Component::new("Counter", |_props| {
        let (count, set_count) = use_state(1);
        let on_click = move || {
            set_count.update(|c| c + 1);
            set_count.update(|c| c + 1);
        };
        host("h1", Props::new().on("click", on_click), children![format!("Count: {count}")])
    })
}

fn main() {
    env_logger::init();

    println!("=== Fiber Counter Example ===");
    println!("Each click queues two increments; both fold into the next render.");
    println!();

    let runtime = StdRuntime::with_options(
        StdRuntimeOptions::new().with_slice(Duration::from_millis(4)),
    );
    runtime.set_slice_waker(|| log::trace!("idle slice requested"));

    let mut memory = MemoryHost::new();
    let container = memory.create_container();
    let mut engine = Engine::with_runtime(memory, runtime.runtime());

    engine.render(component(&counter(), Props::new()), container);
    match runtime.run_until_settled(&mut engine) {
        Ok(slices) => println!("initial render settled after {slices} slice(s)"),
        Err(err) => {
            log::error!("initial render failed: {err}");
            return;
        }
    }
    print!("{}", engine.host().dump_tree(Some(container)));

    for click in 1..=CLICKS {
        let Some(h1) = engine.host().find_by_tag(container, "h1") else {
            log::error!("no <h1> to click");
            return;
        };
        if let Err(err) = engine.host().dispatch_event(h1, "click") {
            log::error!("click dispatch failed: {err}");
            return;
        }
        if let Err(err) = runtime.run_until_settled(&mut engine) {
            log::error!("render after click {click} failed: {err}");
            return;
        }
        if let Some(report) = engine.last_commit() {
            println!("click {click}: {report}");
        }
        print!("{}", engine.host().dump_tree(Some(container)));
    }

    let stats = engine.stats();
    println!();
    println!(
        "passes: {} started, {} abandoned; units: {}; commits: {}",
        stats.passes_started, stats.passes_abandoned, stats.units_performed, stats.commits
    );
}
