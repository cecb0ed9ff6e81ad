//! The bundled blink task end to end.

use taskrig::adapters::SimClock;
use taskrig::config::FrameworkConfig;
use taskrig::error::Error;
use taskrig::events::EventInbox;
use taskrig::output::OutputRecord;
use taskrig::scheduler::Framework;
use taskrig::tasks::blink::{self, Blink};
use taskrig::variables::Value;

use crate::recorder::RecordingHost;

fn blink_framework(inbox: &EventInbox) -> (Framework<'_>, u8) {
    let mut fw = Framework::new(FrameworkConfig::default(), inbox).unwrap();
    let m = fw.register(blink::definition(), Blink::default()).unwrap();
    (fw, m)
}

#[test]
fn alternates_then_finishes_after_count() {
    let inbox = EventInbox::new();
    let (mut fw, m) = blink_framework(&inbox);
    fw.set_variable("count", Value::Int(2)).unwrap();

    let mut host = RecordingHost::new();
    let report = fw.run(&mut SimClock::new(), &mut host, None).unwrap();

    assert_eq!(report.fault, None);
    assert_eq!(
        host.states(fw.names()),
        vec![
            (0, "red"),
            (250, "green"),
            (500, "red"),
            (750, "green"),
            (1000, "red"),
            (1000, "done"),
        ]
    );
    assert_eq!(report.end_time, 1000);
    assert_eq!(fw.task::<Blink>(m).unwrap().flashes, 2);
    assert_eq!(host.prints(), vec![(1000, "blink finished".to_string())]);

    let data = host.records.iter().find_map(|r| match r {
        OutputRecord::Data {
            name,
            type_tag,
            payload,
            ..
        } => Some((name.to_string(), *type_tag, payload.to_vec())),
        _ => None,
    });
    assert_eq!(data, Some(("flashes".to_string(), 'I', vec![2, 0, 0, 0])));
}

#[test]
fn rate_variable_sets_the_period() {
    let inbox = EventInbox::new();
    let (mut fw, _) = blink_framework(&inbox);
    fw.set_variable("blink_rate", Value::Float(5.0)).unwrap();

    let mut host = RecordingHost::new();
    fw.run(&mut SimClock::new(), &mut host, Some(300)).unwrap();
    assert_eq!(
        host.states(fw.names()),
        vec![(0, "red"), (100, "green"), (200, "red"), (300, "green")]
    );
}

#[test]
fn button_stops_the_run_early() {
    let inbox = EventInbox::new();
    let (mut fw, m) = blink_framework(&inbox);

    let mut clock = SimClock::new();
    clock.inject(300, fw.names().event_id("button").unwrap());
    let mut host = RecordingHost::new();
    let report = fw.run(&mut clock, &mut host, None).unwrap();

    assert_eq!(report.end_time, 300);
    assert_eq!(fw.current_state(m), Some("green"));
    assert_eq!(
        host.prints(),
        vec![(300, "button pressed, stopping".to_string())]
    );
}

#[test]
fn non_positive_rate_is_a_task_fault() {
    let inbox = EventInbox::new();
    let (mut fw, _) = blink_framework(&inbox);
    fw.set_variable("blink_rate", Value::Float(0.0)).unwrap();

    let mut host = RecordingHost::new();
    let report = fw.run(&mut SimClock::new(), &mut host, None).unwrap();
    assert_eq!(report.fault, Some(Error::task("blink_rate must be positive")));
    assert_eq!(host.faults().len(), 1);
}
