//! Setup store and persistent variables against a live framework.

use taskrig::adapters::SimClock;
use taskrig::config::FrameworkConfig;
use taskrig::error::Result;
use taskrig::events::EventInbox;
use taskrig::fsm::context::Ctx;
use taskrig::fsm::{TaskDefinition, Trigger};
use taskrig::persist::PersistentVariables;
use taskrig::scheduler::Framework;
use taskrig::setup::{source_hardware_variables, SetupError, SetupStore};
use taskrig::variables::Value;

use crate::recorder::RecordingHost;

#[derive(Default)]
struct Rig {
    pin_seen: Option<i64>,
}

fn rig_entry(task: &mut Rig, ctx: &mut Ctx<'_>, trigger: Trigger) -> Result<()> {
    if trigger == Trigger::Entry {
        task.pin_seen = Some(ctx.vars().int("hw_lever_pin")?);
        let stage = ctx.vars().int("stage")?;
        ctx.vars_mut().set("stage", Value::Int(stage + 1))?;
    }
    Ok(())
}

fn rig() -> TaskDefinition<Rig> {
    TaskDefinition::new("lever_press", &["trial"], &[], "trial")
        .state("trial", rig_entry)
        .variable("stage", 1)
        .hardware_variable("hw_lever_pin")
}

const STORE: &str = r#"{
    "/dev/ttyACM0": { "name": "box_1", "variables": { "hw_lever_pin": 7 } },
    "/dev/ttyACM1": { "name": "box_2", "variables": {} }
}"#;

#[test]
fn setup_values_reach_the_task() {
    let store = SetupStore::from_json(STORE).unwrap();
    let inbox = EventInbox::new();
    let mut fw = Framework::new(FrameworkConfig::default(), &inbox).unwrap();
    let m = fw.register(rig(), Rig::default()).unwrap();

    assert_eq!(store.apply("/dev/ttyACM0", &mut fw).unwrap(), 1);
    fw.run(&mut SimClock::new(), &mut RecordingHost::new(), Some(10))
        .unwrap();
    assert_eq!(fw.task::<Rig>(m).unwrap().pin_seen, Some(7));
}

#[test]
fn setup_missing_a_task_variable_is_refused() {
    let store = SetupStore::from_json(STORE).unwrap();
    let inbox = EventInbox::new();
    let mut fw = Framework::new(FrameworkConfig::default(), &inbox).unwrap();
    fw.register(rig(), Rig::default()).unwrap();

    let err = store.apply("/dev/ttyACM1", &mut fw).unwrap_err();
    assert!(matches!(&err, SetupError::UndefinedVariable { task, .. } if task == "lever_press"));
    assert!(err
        .to_string()
        .starts_with("\"hw_lever_pin\" is not defined in the box_2 setup"));
    // Nothing was applied, so the run itself still refuses to start.
    assert!(fw
        .run(&mut SimClock::new(), &mut RecordingHost::new(), Some(10))
        .is_err());
}

#[test]
fn bundled_task_source_declares_no_hardware_variables() {
    let source = include_str!("../../src/tasks/blink.rs");
    assert!(source_hardware_variables(source).is_empty());
    let this_file = include_str!("setup_tests.rs");
    assert!(source_hardware_variables(this_file).contains(&"hw_lever_pin".to_string()));
}

#[test]
fn persistent_variables_carry_over_between_sessions() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("persistent_variables.json");
    let store = SetupStore::from_json(STORE).unwrap();

    for expected_stage in [1, 2, 3] {
        let inbox = EventInbox::new();
        let mut fw = Framework::new(FrameworkConfig::default(), &inbox).unwrap();
        fw.register(rig(), Rig::default()).unwrap();
        store.apply("/dev/ttyACM0", &mut fw).unwrap();

        let mut pv = PersistentVariables::load(&path).unwrap();
        pv.restore(&mut fw, "m01", &["stage"]).unwrap();
        assert_eq!(fw.get_variable("stage"), Ok(Value::Int(expected_stage)));

        fw.run(&mut SimClock::new(), &mut RecordingHost::new(), Some(10))
            .unwrap();
        pv.capture(&fw, "m01", &["stage"]).unwrap();
        pv.save().unwrap();
    }

    let pv = PersistentVariables::load(&path).unwrap();
    assert_eq!(pv.value("stage", "m01"), Some(Value::Int(4)));
    assert_eq!(pv.value("stage", "m02"), None);
}
