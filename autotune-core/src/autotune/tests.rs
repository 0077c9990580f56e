use std::cell::{Cell, RefCell};
use std::rc::Rc;

use approx::assert_relative_eq;
use embassy_futures::select::{Either, select};
use embassy_futures::yield_now;
use embedded_hal_async::delay::DelayNs;

use super::*;
use crate::config::AutotuneConfig;
use crate::io::{AutotunePublisher, FlightSignals, Watchdog};
use crate::readings::{
    ActuatorDesired, ArmedState, FlightMode, FlightStatus, GyroData, ManualControlCommand,
};
use crate::record::SystemIdent;
use crate::sample_queue::SampleQueue;
use crate::sampler::GyroSampler;
use crate::stabilization::{StabilizationDesired, StabilizationMode};
use crate::system_ident::State;
use crate::tests::init_logger;
use crate::time::Clock;

const N: usize = 18;

#[derive(Default)]
struct PublisherLog {
    records: Vec<SystemIdent>,
    stabilization: Vec<StabilizationDesired>,
    saves: usize,
}

#[derive(Clone, Default)]
struct RecordingPublisher {
    log: Rc<RefCell<PublisherLog>>,
    fail_register: bool,
}

impl RecordingPublisher {
    fn records(&self) -> Vec<SystemIdent> {
        self.log.borrow().records.clone()
    }

    fn saves(&self) -> usize {
        self.log.borrow().saves
    }
}

impl AutotunePublisher for RecordingPublisher {
    type Error = &'static str;

    fn register(&mut self) -> Result<(), Self::Error> {
        if self.fail_register {
            Err("object store full")
        } else {
            Ok(())
        }
    }

    fn publish_system_ident(&mut self, record: &SystemIdent) {
        self.log.borrow_mut().records.push(record.clone());
    }

    fn publish_stabilization_desired(&mut self, desired: &StabilizationDesired) {
        self.log.borrow_mut().stabilization.push(desired.clone());
    }

    fn request_save(&mut self) {
        self.log.borrow_mut().saves += 1;
    }
}

fn test_config() -> AutotuneConfig {
    AutotuneConfig {
        warmup_ms: 20,
        measure_ms: 100,
        publish_every: 16,
        ..AutotuneConfig::default()
    }
}

fn armed() -> FlightStatus {
    FlightStatus::new(ArmedState::Armed, FlightMode::Autotune)
}

fn disarmed() -> FlightStatus {
    FlightStatus::new(ArmedState::Disarmed, FlightMode::Autotune)
}

fn gyro() -> GyroData {
    GyroData {
        x: 3.0,
        y: -2.0,
        z: 1.0,
    }
}

fn actuator() -> ActuatorDesired {
    ActuatorDesired {
        roll: 0.05,
        pitch: -0.02,
        yaw: 0.01,
        thrust: 0.5,
    }
}

/// Arm and tick through the warmup, returns the time `Run` was entered.
fn enter_run(autotune: &mut Autotune<'_, RecordingPublisher, N>, start_us: u64) -> u64 {
    autotune.tick(start_us, &armed());
    assert_eq!(autotune.state(), AutotuneState::Start);
    let run_us = start_us + (autotune.config().warmup_ms as u64 + 1) * 1_000;
    autotune.tick(run_us, &armed());
    assert_eq!(autotune.state(), AutotuneState::Run);
    run_us
}

#[test]
fn full_identification_cycle() {
    init_logger();
    let mut queue = SampleQueue::<N>::new();
    let (producer, consumer) = queue.split();
    let mut sampler = GyroSampler::new(producer);
    let publisher = RecordingPublisher::default();
    let mut autotune = Autotune::new(test_config(), consumer, publisher.clone()).unwrap();

    assert_eq!(
        autotune.tick(0, &disarmed()),
        TickOutcome::Active {
            identifying: false,
            can_sleep: true,
        }
    );
    assert_eq!(autotune.state(), AutotuneState::Init);
    assert!(publisher.records().is_empty());

    autotune.tick(1_000, &armed());
    assert_eq!(autotune.state(), AutotuneState::Start);
    let records = publisher.records();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].noise, None);
    assert_eq!(records[0].num_updates, 0);
    assert_eq!(records[0].log_gain, [10.0, 10.0, 7.0]);

    // warmup samples never reach the filter
    for t in [5_000, 7_000, 9_000] {
        sampler.on_gyro(t, &gyro(), &actuator());
    }
    autotune.tick(10_000, &armed());
    assert_eq!(autotune.state(), AutotuneState::Start);

    let mut now = 22_000;
    autotune.tick(now, &armed());
    assert_eq!(autotune.state(), AutotuneState::Run);
    assert_eq!(autotune.update_counter(), 0);

    let mut pushed = 0;
    while autotune.state() == AutotuneState::Run {
        now += 2_000;
        sampler.on_gyro(now, &gyro(), &actuator());
        pushed += 1;
        let outcome = autotune.tick(now, &armed());
        assert_eq!(
            outcome,
            TickOutcome::Active {
                identifying: true,
                can_sleep: true,
            }
        );
    }
    assert_eq!(autotune.state(), AutotuneState::Finished);
    assert_eq!(autotune.update_counter(), pushed);
    assert!(!autotune.save_needed());

    autotune.tick(now + 2_000, &armed());
    assert_eq!(autotune.state(), AutotuneState::Waiting);
    assert!(autotune.save_needed());

    let records = publisher.records();
    let intermediate: Vec<u32> = records[1..records.len() - 1]
        .iter()
        .map(|r| r.num_updates)
        .collect();
    let expected: Vec<u32> = (0..pushed).step_by(16).map(|c| c + 1).collect();
    assert_eq!(intermediate, expected);
    assert_relative_eq!(records[1].period_ms, 2.0, epsilon = 1e-4);

    let last = records.last().unwrap();
    assert_eq!(last.num_updates, pushed);
    assert_eq!(last.period_ms, 0.0);
    assert!(last.noise.is_some());
    assert_relative_eq!(last.hover_throttle, 0.5, epsilon = 1e-6);
    assert_eq!(last.num_spilled, 0);

    // still armed, nothing is saved yet
    autotune.tick(now + 4_000, &armed());
    assert_eq!(autotune.state(), AutotuneState::Waiting);
    assert_eq!(publisher.saves(), 0);

    autotune.tick(now + 6_000, &disarmed());
    assert_eq!(publisher.saves(), 1);
    assert_eq!(autotune.state(), AutotuneState::Init);
    assert!(!autotune.save_needed());

    autotune.tick(now + 8_000, &disarmed());
    autotune.tick(now + 10_000, &disarmed());
    assert_eq!(publisher.saves(), 1);
}

#[test]
fn leaving_autotune_mode_aborts_and_restarts_from_prior() {
    init_logger();
    let mut queue = SampleQueue::<N>::new();
    let (producer, consumer) = queue.split();
    let mut sampler = GyroSampler::new(producer);
    let publisher = RecordingPublisher::default();
    let mut autotune = Autotune::new(test_config(), consumer, publisher.clone()).unwrap();

    let mut now = enter_run(&mut autotune, 0);
    for _ in 0..20 {
        now += 2_000;
        sampler.on_gyro(now, &gyro(), &actuator());
        autotune.tick(now, &armed());
    }
    assert_ne!(autotune.filter().state(), &State::initial());

    let manual = FlightStatus::new(ArmedState::Armed, FlightMode::Stabilized1);
    assert_eq!(autotune.tick(now + 2_000, &manual), TickOutcome::Inactive);
    assert_eq!(autotune.state(), AutotuneState::Init);
    assert_eq!(publisher.saves(), 0);

    autotune.tick(now + 4_000, &armed());
    assert_eq!(autotune.state(), AutotuneState::Start);
    assert_eq!(autotune.filter().state(), &State::initial());
    let last = publisher.records().last().cloned().unwrap();
    assert_eq!(last.log_gain, [10.0, 10.0, 7.0]);
    assert_eq!(last.noise, None);

    // and a disarm later still has nothing to save
    autotune.tick(now + 6_000, &disarmed());
    assert_eq!(publisher.saves(), 0);
}

#[test]
fn disarm_before_finish_discards_results() {
    init_logger();
    let mut queue = SampleQueue::<N>::new();
    let (producer, consumer) = queue.split();
    let mut sampler = GyroSampler::new(producer);
    let publisher = RecordingPublisher::default();
    let mut autotune = Autotune::new(test_config(), consumer, publisher.clone()).unwrap();

    let mut now = enter_run(&mut autotune, 0);
    now += 2_000;
    sampler.on_gyro(now, &gyro(), &actuator());
    autotune.tick(now, &armed());

    autotune.tick(now + 2_000, &disarmed());
    assert_eq!(autotune.state(), AutotuneState::Init);
    assert!(!autotune.save_needed());
    autotune.tick(now + 4_000, &disarmed());
    assert_eq!(publisher.saves(), 0);
}

#[test]
fn disarm_during_warmup_returns_to_init() {
    let mut queue = SampleQueue::<N>::new();
    let (_, consumer) = queue.split();
    let mut autotune =
        Autotune::new(test_config(), consumer, RecordingPublisher::default()).unwrap();

    autotune.tick(0, &armed());
    autotune.tick(5_000, &disarmed());
    assert_eq!(autotune.state(), AutotuneState::Init);

    // arming is not enough to start
    let arming = FlightStatus::new(ArmedState::Arming, FlightMode::Autotune);
    autotune.tick(6_000, &arming);
    assert_eq!(autotune.state(), AutotuneState::Init);
}

#[test]
fn finished_result_is_saved_after_leaving_autotune() {
    let mut queue = SampleQueue::<N>::new();
    let (_, consumer) = queue.split();
    let publisher = RecordingPublisher::default();
    let mut autotune = Autotune::new(test_config(), consumer, publisher.clone()).unwrap();

    let run_us = enter_run(&mut autotune, 0);
    autotune.tick(run_us + 101_000, &armed());
    assert_eq!(autotune.state(), AutotuneState::Finished);
    autotune.tick(run_us + 102_000, &armed());
    assert!(autotune.save_needed());

    let manual = FlightStatus::new(ArmedState::Armed, FlightMode::Manual);
    autotune.tick(run_us + 104_000, &manual);
    assert!(autotune.save_needed());
    assert_eq!(publisher.saves(), 0);

    let landed = FlightStatus::new(ArmedState::Disarmed, FlightMode::Manual);
    assert_eq!(autotune.tick(run_us + 106_000, &landed), TickOutcome::Inactive);
    assert_eq!(publisher.saves(), 1);
    assert!(!autotune.save_needed());
}

#[test]
fn backlog_is_drained_a_few_samples_per_period() {
    let mut queue = SampleQueue::<N>::new();
    let (producer, consumer) = queue.split();
    let mut sampler = GyroSampler::new(producer);
    let mut autotune =
        Autotune::new(test_config(), consumer, RecordingPublisher::default()).unwrap();

    let mut now = enter_run(&mut autotune, 0);
    for _ in 0..6 {
        now += 1_000;
        sampler.on_gyro(now, &gyro(), &actuator());
    }

    assert_eq!(
        autotune.tick(now, &armed()),
        TickOutcome::Active {
            identifying: true,
            can_sleep: false,
        }
    );
    assert_eq!(autotune.update_counter(), 4);

    assert_eq!(
        autotune.tick(now, &armed()),
        TickOutcome::Active {
            identifying: true,
            can_sleep: true,
        }
    );
    assert_eq!(autotune.update_counter(), 6);
}

#[test]
fn samples_without_time_step_are_skipped_and_gaps_clamped() {
    let mut queue = SampleQueue::<N>::new();
    let (producer, consumer) = queue.split();
    let mut sampler = GyroSampler::new(producer);
    let publisher = RecordingPublisher::default();
    let mut autotune = Autotune::new(test_config(), consumer, publisher.clone()).unwrap();

    let run_us = enter_run(&mut autotune, 0);
    sampler.on_gyro(run_us, &gyro(), &actuator());
    sampler.on_gyro(run_us - 500, &gyro(), &actuator());
    autotune.tick(run_us, &armed());
    assert_eq!(autotune.update_counter(), 0);

    // 50 ms gap, the filter sees the dt ceiling
    sampler.on_gyro(run_us + 50_000, &gyro(), &actuator());
    autotune.tick(run_us + 50_000, &armed());
    assert_eq!(autotune.update_counter(), 1);
    let last = publisher.records().last().cloned().unwrap();
    assert_relative_eq!(last.period_ms, 10.0, epsilon = 1e-4);
}

#[test]
fn spills_are_reported() {
    let mut queue = SampleQueue::<N>::new();
    let (producer, consumer) = queue.split();
    let mut sampler = GyroSampler::new(producer);
    let publisher = RecordingPublisher::default();
    let mut autotune = Autotune::new(test_config(), consumer, publisher.clone()).unwrap();

    let run_us = enter_run(&mut autotune, 0);
    // capacity is N - 1, the remaining ones go through the retry and spill
    for i in 1..=(N as u64 + 2) {
        sampler.on_gyro(run_us + i * 1_000, &gyro(), &actuator());
    }

    autotune.tick(run_us + 30_000, &armed());
    let first = publisher.records().last().cloned().unwrap();
    assert_eq!(first.num_updates, 1);
    assert_eq!(first.num_spilled, 2);
}

#[test]
fn disabled_module_does_not_start() {
    let mut queue = SampleQueue::<N>::new();
    let (_, consumer) = queue.split();
    let config = AutotuneConfig {
        enabled: false,
        ..AutotuneConfig::default()
    };
    let result = Autotune::new(config, consumer, RecordingPublisher::default());
    assert!(matches!(result, Err(AutotuneInitError::Disabled)));
}

#[test]
fn registration_failure_is_reported() {
    let mut queue = SampleQueue::<N>::new();
    let (_, consumer) = queue.split();
    let publisher = RecordingPublisher {
        fail_register: true,
        ..RecordingPublisher::default()
    };
    let result = Autotune::new(AutotuneConfig::default(), consumer, publisher);
    assert!(matches!(
        result,
        Err(AutotuneInitError::Registration("object store full"))
    ));
}

#[derive(Clone)]
struct MockClock(Rc<Cell<u64>>);

impl Clock for MockClock {
    fn now_us(&self) -> u64 {
        self.0.get()
    }
}

/// Advances the mock clock instead of waiting.
struct MockDelay(MockClock);

impl DelayNs for MockDelay {
    async fn delay_ns(&mut self, ns: u32) {
        let now = &(self.0).0;
        now.set(now.get() + ns as u64 / 1_000);
        yield_now().await;
    }
}

struct MockSignals {
    status: Rc<Cell<FlightStatus>>,
    manual: ManualControlCommand,
}

impl FlightSignals for MockSignals {
    fn flight_status(&mut self) -> FlightStatus {
        self.status.get()
    }

    fn manual_control(&mut self) -> ManualControlCommand {
        self.manual
    }
}

#[derive(Default)]
struct CountingWatchdog(u32);

impl Watchdog for CountingWatchdog {
    fn feed(&mut self) {
        self.0 += 1;
    }
}

#[tokio::test]
async fn task_runs_a_tune_and_saves_on_disarm() {
    init_logger();
    let mut queue = SampleQueue::<N>::new();
    let (producer, consumer) = queue.split();
    let mut sampler = GyroSampler::new(producer);
    let publisher = RecordingPublisher::default();
    let mut autotune = Autotune::new(test_config(), consumer, publisher.clone()).unwrap();

    let clock = MockClock(Rc::new(Cell::new(0)));
    let mut delay = MockDelay(clock.clone());
    let status = Rc::new(Cell::new(armed()));
    let mut signals = MockSignals {
        status: status.clone(),
        manual: ManualControlCommand {
            roll: 0.2,
            throttle: 0.5,
            ..ManualControlCommand::default()
        },
    };
    let mut watchdog = CountingWatchdog::default();

    let log = publisher.log.clone();
    let pilot = async {
        let mut last_sample_us = None;
        loop {
            let now = clock.now_us();
            if last_sample_us != Some(now) {
                sampler.on_gyro(now, &gyro(), &actuator());
                last_sample_us = Some(now);
            }
            let finished = log
                .borrow()
                .records
                .last()
                .is_some_and(|r| r.noise.is_some() && r.period_ms == 0.0);
            if finished {
                break;
            }
            yield_now().await;
        }

        status.set(disarmed());
        while log.borrow().saves == 0 {
            yield_now().await;
        }
    };

    let outcome = select(
        autotune.run(&mut signals, clock.clone(), &mut delay, &mut watchdog),
        pilot,
    )
    .await;
    assert!(matches!(outcome, Either::Second(())));

    assert!(watchdog.0 > 0);
    assert_eq!(publisher.saves(), 1);

    let log = publisher.log.borrow();
    assert!(log.records.last().unwrap().num_updates > 0);
    assert!(
        log.stabilization
            .iter()
            .any(|s| s.mode == [StabilizationMode::Estimation; 3])
    );
    let last_desired = log.stabilization.last().unwrap();
    assert_eq!(last_desired.mode[2], StabilizationMode::Rate);
    assert_relative_eq!(last_desired.roll, 11.0);
    assert_eq!(last_desired.thrust, 0.5);
}
