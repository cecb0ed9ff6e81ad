//! Alternating red/green blink.
//!
//! The smallest useful task: flips between `red` and `green` with timed
//! transitions at `blink_rate` Hz, and ends in `done` after `count` red
//! flashes.  A `button` event at any time ends the run early.
//!
//! | Variable     | Default | Meaning                         |
//! |--------------|---------|---------------------------------|
//! | `blink_rate` | 2.0     | full red+green cycles per second |
//! | `count`      | 10      | red flashes before `done`        |

use crate::error::{Error, Result};
use crate::events::Millis;
use crate::fsm::context::Ctx;
use crate::fsm::{TaskDefinition, Trigger};

pub const NAME: &str = "blink";
pub const STATES: [&str; 3] = ["red", "green", "done"];
pub const EVENTS: [&str; 1] = ["button"];

#[derive(Debug, Default)]
pub struct Blink {
    /// Red flashes so far this run.
    pub flashes: u32,
}

pub fn definition() -> TaskDefinition<Blink> {
    TaskDefinition::new(NAME, &STATES, &EVENTS, "red")
        .variable("blink_rate", 2.0)
        .variable("count", 10)
        .state("red", red)
        .state("green", green)
        .state("done", done)
        .all_states(any_state)
        .run_start(run_start)
        .run_end(run_end)
}

/// Time spent in each colour.
fn half_period(ctx: &Ctx<'_>) -> Result<Millis> {
    let rate = ctx.vars().float("blink_rate")?;
    if rate.is_nan() || rate <= 0.0 {
        return Err(Error::task("blink_rate must be positive"));
    }
    Ok((500.0 / rate).round().max(1.0) as Millis)
}

fn run_start(task: &mut Blink, _ctx: &mut Ctx<'_>) -> Result<()> {
    task.flashes = 0;
    Ok(())
}

fn any_state(_task: &mut Blink, ctx: &mut Ctx<'_>, trigger: Trigger) -> Result<bool> {
    if trigger == Trigger::Event("button") {
        ctx.print("button pressed, stopping");
        ctx.stop();
        return Ok(true);
    }
    Ok(false)
}

fn red(task: &mut Blink, ctx: &mut Ctx<'_>, trigger: Trigger) -> Result<()> {
    if trigger != Trigger::Entry {
        return Ok(());
    }
    let count = ctx.vars().int("count")?;
    if i64::from(task.flashes) >= count {
        return ctx.goto("done");
    }
    task.flashes += 1;
    let wait = half_period(ctx)?;
    ctx.timed_goto("green", wait)
}

fn green(_task: &mut Blink, ctx: &mut Ctx<'_>, trigger: Trigger) -> Result<()> {
    if trigger == Trigger::Entry {
        let wait = half_period(ctx)?;
        ctx.timed_goto("red", wait)?;
    }
    Ok(())
}

fn done(_task: &mut Blink, ctx: &mut Ctx<'_>, trigger: Trigger) -> Result<()> {
    if trigger == Trigger::Entry {
        ctx.print("blink finished");
        ctx.stop();
    }
    Ok(())
}

fn run_end(task: &mut Blink, ctx: &mut Ctx<'_>) -> Result<()> {
    ctx.emit_data("flashes", 'I', &task.flashes.to_le_bytes());
    Ok(())
}
