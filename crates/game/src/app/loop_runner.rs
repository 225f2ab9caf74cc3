use std::process::ExitCode;
use std::thread;
use std::time::{Duration, Instant};

use tracing::{error, info, warn};

use super::bootstrap::AppWiring;
use super::driver::{DriverError, ScriptDriver, TickStatus, TICKS_PER_SECOND};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct LoopConfig {
    pub(crate) fixed_dt: Duration,
    pub(crate) max_ticks_per_frame: u32,
    pub(crate) max_frame_delta: Duration,
    /// Paces ticks against the wall clock instead of replaying as fast as possible.
    pub(crate) realtime: bool,
}

impl Default for LoopConfig {
    fn default() -> Self {
        Self {
            fixed_dt: Duration::from_secs(1) / TICKS_PER_SECOND,
            max_ticks_per_frame: 5,
            max_frame_delta: Duration::from_millis(250),
            realtime: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct StepPlan {
    ticks_to_run: u32,
    remaining_accumulator: Duration,
    dropped_backlog: Duration,
}

pub(crate) fn run(app: AppWiring) -> ExitCode {
    let AppWiring {
        mut driver,
        loop_config,
    } = app;

    let result = if loop_config.realtime {
        run_realtime(&mut driver, loop_config)
    } else {
        run_headless(&mut driver)
    };
    if let Err(err) = result {
        error!(error = %err, "script_failed");
        return ExitCode::FAILURE;
    }

    let summary = driver.summary();
    info!(
        frames = summary.frames,
        map = %summary.final_map,
        commits = summary.commits.len(),
        arrivals = summary.arrivals.len(),
        "run_complete"
    );
    match serde_json::to_string_pretty(&summary) {
        Ok(json) => {
            println!("{json}");
            ExitCode::SUCCESS
        }
        Err(err) => {
            error!(error = %err, "summary_encode_failed");
            ExitCode::FAILURE
        }
    }
}

fn run_headless(driver: &mut ScriptDriver) -> Result<(), DriverError> {
    while driver.tick()? == TickStatus::Running {}
    Ok(())
}

fn run_realtime(
    driver: &mut ScriptDriver,
    config: LoopConfig,
) -> Result<(), DriverError> {
    let mut accumulator = Duration::ZERO;
    let mut last = Instant::now();

    loop {
        let now = Instant::now();
        let frame_dt = clamp_frame_delta(now.saturating_duration_since(last), config.max_frame_delta);
        last = now;
        accumulator = accumulator.saturating_add(frame_dt);

        let plan = plan_sim_steps(accumulator, config.fixed_dt, config.max_ticks_per_frame);
        accumulator = plan.remaining_accumulator;
        if plan.dropped_backlog > Duration::ZERO {
            warn!(
                dropped_ms = plan.dropped_backlog.as_millis() as u64,
                "sim_backlog_dropped"
            );
        }
        for _ in 0..plan.ticks_to_run {
            if driver.tick()? == TickStatus::Finished {
                return Ok(());
            }
        }

        thread::sleep(config.fixed_dt.saturating_sub(accumulator));
    }
}

fn plan_sim_steps(
    mut accumulator: Duration,
    fixed_dt: Duration,
    max_ticks_per_frame: u32,
) -> StepPlan {
    let mut ticks_to_run = 0u32;
    while accumulator >= fixed_dt && ticks_to_run < max_ticks_per_frame {
        accumulator = accumulator.saturating_sub(fixed_dt);
        ticks_to_run = ticks_to_run.saturating_add(1);
    }

    let dropped_backlog = if accumulator >= fixed_dt {
        std::mem::take(&mut accumulator)
    } else {
        Duration::ZERO
    };
    StepPlan {
        ticks_to_run,
        remaining_accumulator: accumulator,
        dropped_backlog,
    }
}

fn clamp_frame_delta(frame_dt: Duration, max_frame_delta: Duration) -> Duration {
    frame_dt.min(max_frame_delta)
}
