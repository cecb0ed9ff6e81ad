//! Timing, ordering and fault handling of whole runs on virtual time.

use taskrig::adapters::SimClock;
use taskrig::config::FrameworkConfig;
use taskrig::error::{Error, Result};
use taskrig::events::{EventInbox, Millis};
use taskrig::fsm::context::Ctx;
use taskrig::fsm::{TaskDefinition, Trigger};
use taskrig::output::OutputRecord;
use taskrig::scheduler::Framework;
use taskrig::variables::Value;

use crate::lagging_clock::LaggingClock;
use crate::recorder::RecordingHost;

// ── Tasks ─────────────────────────────────────────────────────

/// Alternates A/B every 500 ms.
struct Toggle;

fn toggle_a(_: &mut Toggle, ctx: &mut Ctx<'_>, trigger: Trigger) -> Result<()> {
    if trigger == Trigger::Entry {
        ctx.timed_goto("B", 500)?;
    }
    Ok(())
}

fn toggle_b(_: &mut Toggle, ctx: &mut Ctx<'_>, trigger: Trigger) -> Result<()> {
    if trigger == Trigger::Entry {
        ctx.timed_goto("A", 500)?;
    }
    Ok(())
}

fn toggle() -> TaskDefinition<Toggle> {
    TaskDefinition::new("toggle", &["A", "B"], &[], "A")
        .state("A", toggle_a)
        .state("B", toggle_b)
}

/// Records `(time, event)` for every event it sees, with configurable
/// behaviour on entry.
#[derive(Default)]
struct Probe {
    seen: Vec<(Millis, &'static str)>,
    ended: bool,
}

fn record(probe: &mut Probe, ctx: &Ctx<'_>, trigger: Trigger) {
    if let Some(event) = trigger.event() {
        probe.seen.push((ctx.now(), event));
    }
}

fn probe_end(probe: &mut Probe, _ctx: &mut Ctx<'_>) -> Result<()> {
    probe.ended = true;
    Ok(())
}

const PROBE_EVENTS: [&str; 4] = ["a", "b", "c", "lever"];

fn probe(entry: fn(&mut Probe, &mut Ctx<'_>, Trigger) -> Result<()>) -> TaskDefinition<Probe> {
    TaskDefinition::new("probe", &["idle"], &PROBE_EVENTS, "idle")
        .state("idle", entry)
        .run_end(probe_end)
}

fn framework(inbox: &EventInbox) -> Framework<'_> {
    Framework::new(FrameworkConfig::default(), inbox).unwrap()
}

// ── Timing ────────────────────────────────────────────────────

#[test]
fn timed_transitions_alternate_until_duration_inclusive() {
    let inbox = EventInbox::new();
    let mut fw = framework(&inbox);
    fw.register(toggle(), Toggle).unwrap();

    let mut host = RecordingHost::new();
    let report = fw.run(&mut SimClock::new(), &mut host, Some(2000)).unwrap();

    assert_eq!(
        host.states(fw.names()),
        vec![(0, "A"), (500, "B"), (1000, "A"), (1500, "B"), (2000, "A")]
    );
    assert_eq!(report.fault, None);
    assert_eq!(report.end_time, 2000);
    assert_eq!(report.events_processed, 4);
    // Timed transitions are not reported as events.
    assert!(host.events(fw.names()).is_empty());
}

#[test]
fn disarmed_timer_never_fires() {
    fn arm_then_disarm(p: &mut Probe, ctx: &mut Ctx<'_>, trigger: Trigger) -> Result<()> {
        record(p, ctx, trigger);
        if trigger == Trigger::Entry {
            ctx.set_timer("a", 100)?;
            ctx.disarm_timer("a")?;
        }
        Ok(())
    }
    let inbox = EventInbox::new();
    let mut fw = framework(&inbox);
    let m = fw.register(probe(arm_then_disarm), Probe::default()).unwrap();

    let mut host = RecordingHost::new();
    let report = fw.run(&mut SimClock::new(), &mut host, Some(1000)).unwrap();

    assert_eq!(report.events_processed, 0);
    assert!(fw.task::<Probe>(m).unwrap().seen.is_empty());
    assert!(host.events(fw.names()).is_empty());
}

#[test]
fn reset_timer_keeps_only_the_latest() {
    fn rearm(p: &mut Probe, ctx: &mut Ctx<'_>, trigger: Trigger) -> Result<()> {
        record(p, ctx, trigger);
        if trigger == Trigger::Entry {
            ctx.set_timer("a", 100)?;
            ctx.set_timer("a", 200)?;
            ctx.reset_timer("a", 300)?;
        }
        Ok(())
    }
    let inbox = EventInbox::new();
    let mut fw = framework(&inbox);
    let m = fw.register(probe(rearm), Probe::default()).unwrap();

    fw.run(&mut SimClock::new(), &mut RecordingHost::new(), Some(1000))
        .unwrap();
    assert_eq!(fw.task::<Probe>(m).unwrap().seen, vec![(300, "a")]);
}

#[test]
fn periodic_timer_stops_at_duration() {
    fn tick(p: &mut Probe, ctx: &mut Ctx<'_>, trigger: Trigger) -> Result<()> {
        record(p, ctx, trigger);
        if matches!(trigger, Trigger::Entry | Trigger::Event("a")) {
            ctx.set_timer("a", 400)?;
        }
        Ok(())
    }
    let inbox = EventInbox::new();
    let mut fw = framework(&inbox);
    let m = fw.register(probe(tick), Probe::default()).unwrap();

    let report = fw
        .run(&mut SimClock::new(), &mut RecordingHost::new(), Some(1000))
        .unwrap();
    assert_eq!(fw.task::<Probe>(m).unwrap().seen, vec![(400, "a"), (800, "a")]);
    assert_eq!(report.end_time, 800);
}

// ── Ordering ──────────────────────────────────────────────────

#[test]
fn equal_timestamps_resolve_in_arrival_order() {
    fn arm_two(p: &mut Probe, ctx: &mut Ctx<'_>, trigger: Trigger) -> Result<()> {
        record(p, ctx, trigger);
        if trigger == Trigger::Entry {
            ctx.set_timer("a", 100)?;
            ctx.set_timer("b", 100)?;
        }
        Ok(())
    }
    let inbox = EventInbox::new();
    let mut fw = framework(&inbox);
    let m = fw.register(probe(arm_two), Probe::default()).unwrap();

    // An interrupt at the same instant is collected before the timers.
    let mut clock = SimClock::new();
    clock.inject(100, fw.names().event_id("c").unwrap());

    let mut host = RecordingHost::new();
    fw.run(&mut clock, &mut host, Some(500)).unwrap();

    let expected = vec![(100, "c"), (100, "a"), (100, "b")];
    assert_eq!(fw.task::<Probe>(m).unwrap().seen, expected);
    assert_eq!(host.events(fw.names()), expected);
}

#[test]
fn interrupt_events_keep_their_capture_time() {
    fn passive(p: &mut Probe, ctx: &mut Ctx<'_>, trigger: Trigger) -> Result<()> {
        record(p, ctx, trigger);
        Ok(())
    }
    let inbox = EventInbox::new();
    let mut fw = framework(&inbox);
    let m = fw.register(probe(passive), Probe::default()).unwrap();

    let lever = fw.names().event_id("lever").unwrap();
    let mut clock = SimClock::new();
    clock.inject(250, lever);
    clock.inject(900, lever);

    let report = fw.run(&mut clock, &mut RecordingHost::new(), None).unwrap();
    assert_eq!(
        fw.task::<Probe>(m).unwrap().seen,
        vec![(250, "lever"), (900, "lever")]
    );
    assert_eq!(report.end_time, 900);
    assert_eq!(clock.pending(), 0);
}

#[test]
fn published_event_carries_publish_time() {
    fn relay(p: &mut Probe, ctx: &mut Ctx<'_>, trigger: Trigger) -> Result<()> {
        record(p, ctx, trigger);
        match trigger {
            Trigger::Entry => ctx.set_timer("a", 150),
            Trigger::Event("a") => ctx.publish_event("b"),
            _ => Ok(()),
        }
    }
    let inbox = EventInbox::new();
    let mut fw = framework(&inbox);
    let m = fw.register(probe(relay), Probe::default()).unwrap();

    let mut host = RecordingHost::new();
    fw.run(&mut SimClock::new(), &mut host, Some(1000)).unwrap();

    assert_eq!(fw.task::<Probe>(m).unwrap().seen, vec![(150, "a"), (150, "b")]);
    assert_eq!(host.events(fw.names()), vec![(150, "a"), (150, "b")]);
}

#[test]
fn event_record_precedes_the_transition_it_causes() {
    fn go(p: &mut Probe, ctx: &mut Ctx<'_>, trigger: Trigger) -> Result<()> {
        record(p, ctx, trigger);
        match trigger {
            Trigger::Entry if ctx.current_state() == "idle" => ctx.set_timer("a", 10),
            Trigger::Event("a") => ctx.goto("busy"),
            _ => Ok(()),
        }
    }
    let def = TaskDefinition::new("probe", &["idle", "busy"], &PROBE_EVENTS, "idle")
        .state("idle", go)
        .state("busy", go);
    let inbox = EventInbox::new();
    let mut fw = framework(&inbox);
    fw.register(def, Probe::default()).unwrap();

    let mut host = RecordingHost::new();
    fw.run(&mut SimClock::new(), &mut host, Some(100)).unwrap();

    let a = fw.names().event_id("a").unwrap();
    let busy = fw.names().state_id("busy").unwrap();
    let tail: Vec<_> = host.records.iter().skip(1).cloned().collect();
    assert_eq!(
        tail,
        vec![
            OutputRecord::EventFired { time: 10, event: a },
            OutputRecord::StateEntered { time: 10, state: busy },
        ]
    );
}

#[test]
fn broadcast_reaches_only_declaring_machines_in_order() {
    #[derive(Default)]
    struct Listener {
        heard: Vec<Millis>,
    }
    fn listen(l: &mut Listener, ctx: &mut Ctx<'_>, trigger: Trigger) -> Result<()> {
        if trigger == Trigger::Event("tone") {
            l.heard.push(ctx.now());
        }
        Ok(())
    }
    fn announce(_: &mut Listener, ctx: &mut Ctx<'_>, trigger: Trigger) -> Result<()> {
        match trigger {
            Trigger::Entry => ctx.set_timer("cue", 50),
            Trigger::Event("cue") => ctx.publish_event("tone"),
            _ => Ok(()),
        }
    }

    let inbox = EventInbox::new();
    let mut fw = framework(&inbox);
    let speaker = fw
        .register(
            TaskDefinition::new("speaker", &["on"], &["cue"], "on").state("on", announce),
            Listener::default(),
        )
        .unwrap();
    let first = fw
        .register(
            TaskDefinition::new("first", &["wait"], &["tone"], "wait").state("wait", listen),
            Listener::default(),
        )
        .unwrap();
    let second = fw
        .register(
            TaskDefinition::new("second", &["wait"], &["tone"], "wait").state("wait", listen),
            Listener::default(),
        )
        .unwrap();

    fw.run(&mut SimClock::new(), &mut RecordingHost::new(), Some(100))
        .unwrap();
    assert!(fw.task::<Listener>(speaker).unwrap().heard.is_empty());
    assert_eq!(fw.task::<Listener>(first).unwrap().heard, vec![50]);
    assert_eq!(fw.task::<Listener>(second).unwrap().heard, vec![50]);
}

#[test]
fn all_states_sees_entry_and_exit() {
    #[derive(Default)]
    struct Watcher {
        seen: Vec<Trigger>,
    }
    fn watch(w: &mut Watcher, _: &mut Ctx<'_>, trigger: Trigger) -> Result<bool> {
        w.seen.push(trigger);
        Ok(false)
    }
    fn flip(_: &mut Watcher, ctx: &mut Ctx<'_>, trigger: Trigger) -> Result<()> {
        if trigger == Trigger::Entry && ctx.current_state() == "A" {
            ctx.timed_goto("B", 10)?;
        }
        Ok(())
    }
    let def = TaskDefinition::new("w", &["A", "B"], &[], "A")
        .state("A", flip)
        .state("B", flip)
        .all_states(watch);
    let inbox = EventInbox::new();
    let mut fw = framework(&inbox);
    let m = fw.register(def, Watcher::default()).unwrap();

    fw.run(&mut SimClock::new(), &mut RecordingHost::new(), Some(50))
        .unwrap();
    assert_eq!(
        fw.task::<Watcher>(m).unwrap().seen,
        vec![Trigger::Entry, Trigger::Exit, Trigger::Entry]
    );
    assert_eq!(fw.current_state(m), Some("B"));
}

// ── Cancellation ──────────────────────────────────────────────

#[test]
fn late_interrupt_can_still_disarm_an_earlier_timer() {
    fn guard(p: &mut Probe, ctx: &mut Ctx<'_>, trigger: Trigger) -> Result<()> {
        record(p, ctx, trigger);
        match trigger {
            Trigger::Entry => ctx.set_timer("a", 100),
            Trigger::Event("lever") => ctx.disarm_timer("a"),
            _ => Ok(()),
        }
    }
    let inbox = EventInbox::new();
    let mut fw = framework(&inbox);
    let m = fw.register(probe(guard), Probe::default()).unwrap();

    // The loop wakes at 150 to find a lever press captured at 50.
    let lever = fw.names().event_id("lever").unwrap();
    let mut clock = LaggingClock::new([(150, Some((lever, 50)))]);
    let mut host = RecordingHost::new();
    fw.run(&mut clock, &mut host, None).unwrap();

    assert_eq!(fw.task::<Probe>(m).unwrap().seen, vec![(50, "lever")]);
    assert_eq!(host.events(fw.names()), vec![(50, "lever")]);
}

/// A: times out to B after 100 ms, unless a lever press sends it to C,
/// which times out to D after 1000 ms.
fn staged(p: &mut Probe, ctx: &mut Ctx<'_>, trigger: Trigger) -> Result<()> {
    record(p, ctx, trigger);
    match (ctx.current_state(), trigger) {
        ("A", Trigger::Entry) => ctx.timed_goto("B", 100),
        ("A", Trigger::Event("lever")) => ctx.goto("C"),
        ("C", Trigger::Entry) => ctx.timed_goto("D", 1000),
        _ => Ok(()),
    }
}

fn four_states(handler: fn(&mut Probe, &mut Ctx<'_>, Trigger) -> Result<()>) -> TaskDefinition<Probe> {
    TaskDefinition::new("staged", &["A", "B", "C", "D"], &PROBE_EVENTS, "A")
        .state("A", handler)
        .state("B", handler)
        .state("C", handler)
        .state("D", handler)
}

#[test]
fn superseded_timed_goto_never_fires_at_equal_timestamp() {
    let inbox = EventInbox::new();
    let mut fw = framework(&inbox);
    fw.register(four_states(staged), Probe::default()).unwrap();

    let mut clock = SimClock::new();
    clock.inject(100, fw.names().event_id("lever").unwrap());
    let mut host = RecordingHost::new();
    fw.run(&mut clock, &mut host, None).unwrap();

    assert_eq!(
        host.states(fw.names()),
        vec![(0, "A"), (100, "C"), (1100, "D")]
    );
}

#[test]
fn superseded_timed_goto_never_fires_under_latency() {
    let inbox = EventInbox::new();
    let mut fw = framework(&inbox);
    fw.register(four_states(staged), Probe::default()).unwrap();

    let lever = fw.names().event_id("lever").unwrap();
    let mut clock = LaggingClock::new([(150, Some((lever, 50))), (2000, None)]);
    let mut host = RecordingHost::new();
    fw.run(&mut clock, &mut host, None).unwrap();

    assert_eq!(
        host.states(fw.names()),
        vec![(0, "A"), (50, "C"), (1050, "D")]
    );
}

#[test]
fn timed_goto_after_goto_in_one_handler_is_kept() {
    fn hop(p: &mut Probe, ctx: &mut Ctx<'_>, trigger: Trigger) -> Result<()> {
        record(p, ctx, trigger);
        if ctx.current_state() == "A" && trigger == Trigger::Event("lever") {
            ctx.goto("C")?;
            ctx.timed_goto("D", 100)?;
        }
        Ok(())
    }
    let inbox = EventInbox::new();
    let mut fw = framework(&inbox);
    fw.register(four_states(hop), Probe::default()).unwrap();

    let mut clock = SimClock::new();
    clock.inject(10, fw.names().event_id("lever").unwrap());
    let mut host = RecordingHost::new();
    fw.run(&mut clock, &mut host, None).unwrap();

    assert_eq!(
        host.states(fw.names()),
        vec![(0, "A"), (10, "C"), (110, "D")]
    );
}

// ── Lifecycle ─────────────────────────────────────────────────

#[test]
fn stop_ends_run_after_current_event() {
    fn stopper(p: &mut Probe, ctx: &mut Ctx<'_>, trigger: Trigger) -> Result<()> {
        record(p, ctx, trigger);
        match trigger {
            Trigger::Entry => {
                ctx.set_timer("a", 300)?;
                ctx.set_timer("b", 300)?;
                ctx.set_timer("c", 600)
            }
            Trigger::Event("a") => {
                ctx.stop();
                Ok(())
            }
            _ => Ok(()),
        }
    }
    let inbox = EventInbox::new();
    let mut fw = framework(&inbox);
    let m = fw.register(probe(stopper), Probe::default()).unwrap();

    let report = fw.run(&mut SimClock::new(), &mut RecordingHost::new(), None).unwrap();
    let probe = fw.task::<Probe>(m).unwrap();
    assert_eq!(probe.seen, vec![(300, "a")]);
    assert!(probe.ended);
    assert_eq!(report.end_time, 300);
    assert!(!fw.is_running());
}

#[test]
fn run_without_pending_work_ends_immediately() {
    fn passive(_: &mut Probe, _: &mut Ctx<'_>, _: Trigger) -> Result<()> {
        Ok(())
    }
    let inbox = EventInbox::new();
    let mut fw = framework(&inbox);
    let m = fw.register(probe(passive), Probe::default()).unwrap();
    let report = fw.run(&mut SimClock::new(), &mut RecordingHost::new(), None).unwrap();
    assert_eq!(report.end_time, 0);
    assert!(fw.task::<Probe>(m).unwrap().ended);
}

#[test]
fn runs_can_be_repeated() {
    let inbox = EventInbox::new();
    let mut fw = framework(&inbox);
    fw.register(toggle(), Toggle).unwrap();

    let mut first = RecordingHost::new();
    fw.run(&mut SimClock::new(), &mut first, Some(1000)).unwrap();
    let mut second = RecordingHost::new();
    fw.run(&mut SimClock::new(), &mut second, Some(1000)).unwrap();
    assert_eq!(first.records, second.records);
}

#[test]
fn missing_hardware_variable_blocks_the_run() {
    fn passive(_: &mut Probe, _: &mut Ctx<'_>, _: Trigger) -> Result<()> {
        Ok(())
    }
    let inbox = EventInbox::new();
    let mut fw = framework(&inbox);
    let m = fw
        .register(probe(passive).hardware_variable("hw_lever_pin"), Probe::default())
        .unwrap();

    let err = fw
        .run(&mut SimClock::new(), &mut RecordingHost::new(), Some(10))
        .unwrap_err();
    assert!(matches!(
        &err,
        Error::UndefinedHardwareVariable { task: "probe", variable } if variable == "hw_lever_pin"
    ));
    assert!(err.to_string().contains("hw_lever_pin"));
    assert!(!fw.task::<Probe>(m).unwrap().ended);

    fw.set_variable("hw_lever_pin", Value::Int(4)).unwrap();
    assert!(fw
        .run(&mut SimClock::new(), &mut RecordingHost::new(), Some(10))
        .is_ok());
}

#[test]
fn silent_when_data_output_is_off() {
    let inbox = EventInbox::new();
    let config = FrameworkConfig {
        data_output: false,
        ..FrameworkConfig::default()
    };
    let mut fw = Framework::new(config, &inbox).unwrap();
    fw.register(toggle(), Toggle).unwrap();

    let mut host = RecordingHost::new();
    let report = fw.run(&mut SimClock::new(), &mut host, Some(1000)).unwrap();
    assert!(host.records.is_empty());
    assert_eq!(report.events_processed, 2);
}

// ── Faults ────────────────────────────────────────────────────

#[test]
fn handler_error_faults_the_run_and_still_runs_run_end() {
    fn jam(p: &mut Probe, ctx: &mut Ctx<'_>, trigger: Trigger) -> Result<()> {
        record(p, ctx, trigger);
        match trigger {
            Trigger::Entry => {
                ctx.set_timer("a", 100)?;
                ctx.set_timer("b", 200)
            }
            Trigger::Event("a") => Err(Error::task("lever jammed")),
            _ => Ok(()),
        }
    }
    let inbox = EventInbox::new();
    let mut fw = framework(&inbox);
    let m = fw.register(probe(jam), Probe::default()).unwrap();

    let mut host = RecordingHost::new();
    let report = fw.run(&mut SimClock::new(), &mut host, Some(1000)).unwrap();

    assert_eq!(report.fault, Some(Error::task("lever jammed")));
    let probe = fw.task::<Probe>(m).unwrap();
    assert_eq!(probe.seen, vec![(100, "a")]);
    assert!(probe.ended);
    let faults = host.faults();
    assert_eq!(faults.len(), 1);
    assert_eq!(faults[0].0, 100);
    assert!(faults[0].1.contains("lever jammed"));
}

#[test]
fn handler_panic_is_caught_and_reported() {
    fn explode(_: &mut Probe, _: &mut Ctx<'_>, trigger: Trigger) -> Result<()> {
        if trigger == Trigger::Entry {
            panic!("sensor exploded");
        }
        Ok(())
    }
    let inbox = EventInbox::new();
    let mut fw = framework(&inbox);
    let m = fw.register(probe(explode), Probe::default()).unwrap();

    let mut host = RecordingHost::new();
    let report = fw.run(&mut SimClock::new(), &mut host, Some(1000)).unwrap();

    assert!(matches!(&report.fault, Some(Error::Panic(msg)) if msg.contains("sensor exploded")));
    assert!(fw.task::<Probe>(m).unwrap().ended);
    assert_eq!(host.faults().len(), 1);
}

#[test]
fn unknown_goto_target_is_a_fault() {
    fn lost(_: &mut Probe, ctx: &mut Ctx<'_>, trigger: Trigger) -> Result<()> {
        if trigger == Trigger::Entry {
            ctx.goto("nowhere")?;
        }
        Ok(())
    }
    let inbox = EventInbox::new();
    let mut fw = framework(&inbox);
    fw.register(probe(lost), Probe::default()).unwrap();
    let report = fw
        .run(&mut SimClock::new(), &mut RecordingHost::new(), Some(10))
        .unwrap();
    assert!(matches!(report.fault, Some(Error::UnknownState(_))));
}

#[test]
fn event_queue_overflow_is_a_fault() {
    fn flood(_: &mut Probe, ctx: &mut Ctx<'_>, trigger: Trigger) -> Result<()> {
        match trigger {
            Trigger::Entry => ctx.set_timer("a", 1),
            Trigger::Event("a") => {
                for _ in 0..100 {
                    ctx.publish_event("b")?;
                }
                Ok(())
            }
            _ => Ok(()),
        }
    }
    let inbox = EventInbox::new();
    let mut fw = framework(&inbox);
    fw.register(probe(flood), Probe::default()).unwrap();
    let report = fw
        .run(&mut SimClock::new(), &mut RecordingHost::new(), Some(10))
        .unwrap();
    assert_eq!(report.fault, Some(Error::EventQueueFull));
}

#[test]
fn inbox_overflow_is_a_fault() {
    fn passive(_: &mut Probe, _: &mut Ctx<'_>, _: Trigger) -> Result<()> {
        Ok(())
    }
    let inbox = EventInbox::new();
    let mut fw = framework(&inbox);
    fw.register(probe(passive), Probe::default()).unwrap();

    let lever = fw.names().event_id("lever").unwrap();
    let mut clock = SimClock::new();
    for _ in 0..taskrig::events::INBOX_CAP + 5 {
        clock.inject(100, lever);
    }
    let report = fw.run(&mut clock, &mut RecordingHost::new(), None).unwrap();
    assert_eq!(report.fault, Some(Error::InboxOverflow(5)));
}

// ── Output channel ────────────────────────────────────────────

#[test]
fn output_overflow_is_reported_with_a_marker() {
    fn chatty(_: &mut Probe, ctx: &mut Ctx<'_>, trigger: Trigger) -> Result<()> {
        if trigger == Trigger::Entry {
            for i in 0..100 {
                ctx.print(&format!("line {i}"));
            }
        }
        Ok(())
    }
    let inbox = EventInbox::new();
    let mut fw = framework(&inbox);
    fw.register(probe(chatty), Probe::default()).unwrap();

    let mut host = RecordingHost::new();
    let report = fw.run(&mut SimClock::new(), &mut host, None).unwrap();

    let cap = taskrig::output::OUTPUT_CAP;
    assert_eq!(host.prints().len(), cap - 1);
    assert_eq!(host.records.last(), Some(&OutputRecord::Dropped { count: 37 }));
    assert_eq!(report.output_dropped, 37);
}

#[test]
fn refused_records_are_offered_again_in_order() {
    let inbox = EventInbox::new();
    let mut fw = framework(&inbox);
    fw.register(toggle(), Toggle).unwrap();

    let mut host = RecordingHost {
        refuse: 2,
        ..RecordingHost::new()
    };
    fw.run(&mut SimClock::new(), &mut host, Some(1000)).unwrap();
    assert_eq!(host.refused, 2);
    assert_eq!(
        host.states(fw.names()),
        vec![(0, "A"), (500, "B"), (1000, "A")]
    );
}

#[test]
fn records_refused_at_run_end_count_as_dropped() {
    fn passive(_: &mut Probe, _: &mut Ctx<'_>, _: Trigger) -> Result<()> {
        Ok(())
    }
    let inbox = EventInbox::new();
    let mut fw = framework(&inbox);
    fw.register(probe(passive), Probe::default()).unwrap();

    for _ in 0..2 {
        let mut host = RecordingHost {
            refuse: 1000,
            ..RecordingHost::new()
        };
        let report = fw.run(&mut SimClock::new(), &mut host, None).unwrap();
        assert!(host.records.is_empty());
        // The initial state record never got out.
        assert_eq!(report.output_dropped, 1);
    }
}
