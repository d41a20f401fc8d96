// TiltRemote — Sensor Task
//
// Owns the sensor, the orientation estimate and the gesture debounce.  Every
// period it checks the mode bit, then seeds (first activation only) or reads
// one combined sample, fuses it, and classifies.  Wake-ups are scheduled at
// fixed absolute offsets so bus-wait jitter does not accumulate.

use std::sync::mpsc::Sender;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use crate::config::RemoteConfig;
use crate::drivers::bus::{FaultMonitor, FaultPolicy, TwiPeripheral};
use crate::drivers::imu::Mpu6050;
use crate::error::BusResult;
use crate::events::{GestureCommand, RemoteEvent, SensorSample};
use crate::fusion::{gravity_angles, AngleEstimator, KalmanAngle};
use crate::gesture::{classify, GestureState, GestureThresholds};
use crate::input::ModeSignal;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopState {
    Suspended,
    Seeding,
    Running,
}

/// Fused roll/pitch plus the estimators that produce them.
#[derive(Debug, Clone, Copy, Default)]
pub struct OrientationState<E> {
    roll_filter: E,
    pitch_filter: E,
    roll: f32,
    pitch: f32,
}

impl<E: AngleEstimator> OrientationState<E> {
    pub fn new(roll_filter: E, pitch_filter: E) -> Self {
        Self {
            roll_filter,
            pitch_filter,
            roll: 0.0,
            pitch: 0.0,
        }
    }

    /// Start from the accelerometer angles rather than a zero state.
    pub fn seed(&mut self, roll: f32, pitch: f32) {
        self.roll_filter.initialize();
        self.pitch_filter.initialize();
        self.roll_filter.seed(roll);
        self.pitch_filter.seed(pitch);
        self.roll = roll;
        self.pitch = pitch;
    }

    /// Fuse one period.  Rates in °/s, angles in degrees.
    pub fn update(&mut self, roll: f32, pitch: f32, roll_rate: f32, pitch_rate: f32, dt: f32) {
        // Accelerometer roll jumps between ±180°; filtering across the jump
        // would sweep through every angle in between.
        let crossed = (roll < -90.0 && self.roll > 90.0) || (roll > 90.0 && self.roll < -90.0);
        if crossed {
            self.roll_filter.seed(roll);
            self.roll = roll;
        } else {
            self.roll = self.roll_filter.fuse(roll, roll_rate, dt);
        }

        // Accelerometer pitch only covers ±90°.
        let pitch_rate = if self.roll.abs() > 90.0 {
            -pitch_rate
        } else {
            pitch_rate
        };
        self.pitch = self.pitch_filter.fuse(pitch, pitch_rate, dt);
    }

    pub fn roll(&self) -> f32 {
        self.roll
    }

    pub fn pitch(&self) -> f32 {
        self.pitch
    }
}

/// What one period did.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TickOutcome {
    Suspended,
    Seeded {
        roll: f32,
        pitch: f32,
    },
    Ran {
        roll: f32,
        pitch: f32,
        gesture: GestureCommand,
        confirmed: Option<GestureCommand>,
    },
}

/// Everything the sensor task owns, passed through each stage by reference.
pub struct RemotePipeline<P, E = KalmanAngle> {
    imu: Mpu6050<P>,
    orientation: OrientationState<E>,
    gesture: GestureState,
    thresholds: GestureThresholds,
    sample: Option<SensorSample>,
    state: LoopState,
    seeded: bool,
    dt: f32,
    faults: Arc<FaultMonitor>,
    fault_policy: FaultPolicy,
}

impl<P: TwiPeripheral, E: AngleEstimator + Default> RemotePipeline<P, E> {
    pub fn new(imu: Mpu6050<P>, cfg: &RemoteConfig, faults: Arc<FaultMonitor>) -> Self {
        Self {
            imu,
            orientation: OrientationState::new(E::default(), E::default()),
            gesture: GestureState::default(),
            thresholds: GestureThresholds::default(),
            sample: None,
            state: LoopState::Suspended,
            seeded: false,
            dt: cfg.integration_interval_s,
            faults,
            fault_policy: cfg.fault_policy,
        }
    }
}

impl<P: TwiPeripheral, E: AngleEstimator> RemotePipeline<P, E> {
    pub fn with_thresholds(mut self, thresholds: GestureThresholds) -> Self {
        self.thresholds = thresholds;
        self
    }

    pub fn state(&self) -> LoopState {
        self.state
    }

    pub fn orientation(&self) -> &OrientationState<E> {
        &self.orientation
    }

    pub fn gesture(&self) -> &GestureState {
        &self.gesture
    }

    pub fn last_sample(&self) -> Option<&SensorSample> {
        self.sample.as_ref()
    }

    pub fn imu(&self) -> &Mpu6050<P> {
        &self.imu
    }

    pub fn imu_mut(&mut self) -> &mut Mpu6050<P> {
        &mut self.imu
    }

    /// Run one period.  `mode_active` is the mode bit read at the top of the
    /// period.  A failed read leaves all state as it was.
    pub fn tick(&mut self, mode_active: bool) -> BusResult<TickOutcome> {
        self.imu
            .bus_mut()
            .service_faults(&self.faults, self.fault_policy);

        if !mode_active {
            if self.state != LoopState::Suspended {
                log::info!("Sensor task suspended");
            }
            self.state = LoopState::Suspended;
            return Ok(TickOutcome::Suspended);
        }

        if self.state == LoopState::Suspended {
            self.state = if self.seeded {
                LoopState::Running
            } else {
                LoopState::Seeding
            };
            log::info!("Sensor task active ({:?})", self.state);
        }

        match self.state {
            LoopState::Seeding => self.seed(),
            _ => self.run(),
        }
    }

    fn seed(&mut self) -> BusResult<TickOutcome> {
        let [x, y, z] = self.imu.read_accelerometer()?.map(f32::from);
        let (roll, pitch) = gravity_angles(x, y, z);

        self.orientation.seed(roll, pitch);
        self.seeded = true;
        self.state = LoopState::Running;
        log::debug!("Seeded roll {:.1}° pitch {:.1}°", roll, pitch);

        Ok(TickOutcome::Seeded { roll, pitch })
    }

    fn run(&mut self) -> BusResult<TickOutcome> {
        let sample = self.imu.read_combined()?;
        self.sample = Some(sample);

        let [x, y, z] = sample.accel.map(f32::from);
        let (roll, pitch) = gravity_angles(x, y, z);
        let rates = sample.physical();

        self.orientation.update(roll, pitch, rates.gx, rates.gy, self.dt);

        let gesture = classify(sample.accel, self.orientation.pitch(), &self.thresholds);
        let confirmed = self.gesture.update(gesture);
        if let Some(cmd) = confirmed {
            log::info!("{}", cmd);
        }

        Ok(TickOutcome::Ran {
            roll: self.orientation.roll(),
            pitch: self.orientation.pitch(),
            gesture,
            confirmed,
        })
    }
}

/// Absolute-deadline period timer.
#[derive(Debug, Clone, Copy)]
pub struct PeriodicSchedule {
    next: Instant,
    period: Duration,
}

impl PeriodicSchedule {
    pub fn new(start: Instant, period: Duration) -> Self {
        Self {
            next: start,
            period,
        }
    }

    /// Advance to the next deadline and return how long to sleep from `now`.
    /// An overrun returns zero; the deadline grid itself never shifts.
    pub fn advance(&mut self, now: Instant) -> Duration {
        self.next += self.period;
        self.next.saturating_duration_since(now)
    }

    pub fn next_deadline(&self) -> Instant {
        self.next
    }
}

pub fn sensor_task<P, E>(
    mut pipeline: RemotePipeline<P, E>,
    mode: &ModeSignal,
    events: Sender<RemoteEvent>,
    period: Duration,
) where
    P: TwiPeripheral,
    E: AngleEstimator,
{
    log::info!("Sensor task started");

    let mut schedule = PeriodicSchedule::new(Instant::now(), period);
    let mut was_active = false;

    loop {
        let active = mode.is_active();
        if active != was_active {
            was_active = active;
            if events.send(RemoteEvent::ModeChanged(active)).is_err() {
                log::warn!("Event channel closed — exiting sensor task");
                return;
            }
        }

        match pipeline.tick(active) {
            Ok(TickOutcome::Ran {
                confirmed: Some(cmd),
                ..
            }) => {
                if events.send(RemoteEvent::Command(cmd)).is_err() {
                    log::warn!("Event channel closed — exiting sensor task");
                    return;
                }
            }
            Ok(_) => {}
            Err(e) => log::warn!("IMU read error: {}", e),
        }

        thread::sleep(schedule.advance(Instant::now()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BUS_ADDR_MPU6050;
    use crate::drivers::bus::{BusEngine, Status};
    use crate::drivers::sim::SimPeripheral;
    use crate::error::BusFault;
    use approx::assert_relative_eq;
    use std::sync::mpsc;

    fn pipeline() -> RemotePipeline<SimPeripheral> {
        let bus = BusEngine::new(SimPeripheral::new(BUS_ADDR_MPU6050), 64);
        let mut imu = Mpu6050::new(bus, BUS_ADDR_MPU6050);
        let cfg = RemoteConfig::default();
        imu.init(&cfg).unwrap();
        RemotePipeline::new(imu, &cfg, Arc::new(FaultMonitor::new()))
    }

    fn sim(p: &mut RemotePipeline<SimPeripheral>) -> &mut SimPeripheral {
        p.imu_mut().bus_mut().peripheral_mut()
    }

    /// Gravity vector (raw counts at ±4 g) for a given roll, face down.
    fn accel_for_roll(roll_deg: f32) -> [i16; 3] {
        let r = roll_deg.to_radians();
        [0, (-r.sin() * 8192.0) as i16, (-r.cos() * 8192.0) as i16]
    }

    #[test]
    fn wrap_around_resets_roll_instead_of_fusing() {
        let mut o = OrientationState::new(KalmanAngle::default(), KalmanAngle::default());
        o.seed(95.0, 0.0);
        o.update(-95.0, 0.0, 0.0, 0.0, 0.3);
        assert_eq!(o.roll(), -95.0);

        o.update(95.0, 0.0, 0.0, 0.0, 0.3);
        assert_eq!(o.roll(), 95.0);
    }

    #[test]
    fn pitch_rate_is_inverted_past_ninety_degrees_roll() {
        let mut upright = OrientationState::new(KalmanAngle::default(), KalmanAngle::default());
        let mut flipped = upright;
        upright.seed(0.0, 0.0);
        flipped.seed(170.0, 0.0);

        upright.update(0.0, 0.0, 0.0, 20.0, 0.3);
        flipped.update(170.0, 0.0, 0.0, 20.0, 0.3);

        assert!(upright.pitch() > 0.0);
        assert_relative_eq!(flipped.pitch(), -upright.pitch());
    }

    #[test]
    fn suspended_period_touches_nothing() {
        let mut p = pipeline();
        sim(&mut p).reset_polls();

        assert_eq!(p.tick(false).unwrap(), TickOutcome::Suspended);
        assert_eq!(p.imu().bus().peripheral().polls(), 0);
        assert!(p.last_sample().is_none());
    }

    #[test]
    fn first_activation_seeds_then_runs() {
        let mut p = pipeline();
        sim(&mut p).set_accel(accel_for_roll(30.0));

        match p.tick(true).unwrap() {
            TickOutcome::Seeded { roll, .. } => assert_relative_eq!(roll, 30.0, epsilon = 0.05),
            other => panic!("expected seeding, got {other:?}"),
        }
        assert_eq!(p.state(), LoopState::Running);
        assert!(matches!(p.tick(true).unwrap(), TickOutcome::Ran { .. }));
    }

    #[test]
    fn resume_skips_seeding() {
        let mut p = pipeline();
        p.tick(true).unwrap();
        p.tick(false).unwrap();
        assert_eq!(p.state(), LoopState::Suspended);

        let before = p.imu().bus().peripheral().acknowledged_reads();
        assert!(matches!(p.tick(true).unwrap(), TickOutcome::Ran { .. }));
        // One 14-byte burst, not a 6-byte seeding read.
        assert_eq!(p.imu().bus().peripheral().acknowledged_reads() - before, 13);
    }

    #[test]
    fn wrap_around_through_the_pipeline_is_exact() {
        let mut p = pipeline();
        sim(&mut p).set_accel(accel_for_roll(95.0));
        p.tick(true).unwrap();
        assert!(p.orientation().roll() > 90.0);

        let flipped = accel_for_roll(-95.0);
        sim(&mut p).set_accel(flipped);
        let [x, y, z] = flipped.map(f32::from);
        let expected = gravity_angles(x, y, z).0;

        match p.tick(true).unwrap() {
            TickOutcome::Ran { roll, .. } => {
                assert_eq!(roll, expected);
                assert_relative_eq!(roll, -95.0, epsilon = 0.05);
            }
            other => panic!("expected a run, got {other:?}"),
        }
    }

    #[test]
    fn failed_read_keeps_previous_state() {
        let mut p = pipeline();
        p.tick(true).unwrap();
        p.tick(true).unwrap();
        let roll = p.orientation().roll();
        let sample = *p.last_sample().unwrap();

        sim(&mut p).stall(Status::RX_NOT_EMPTY);
        assert!(p.tick(true).is_err());

        assert_eq!(p.orientation().roll(), roll);
        assert_eq!(*p.last_sample().unwrap(), sample);
        assert_eq!(p.gesture().count(), 0);
    }

    #[test]
    fn faults_are_drained_every_period_per_policy() {
        let monitor = Arc::new(FaultMonitor::new());
        let bus = BusEngine::new(SimPeripheral::new(BUS_ADDR_MPU6050), 64);
        let imu = Mpu6050::new(bus, BUS_ADDR_MPU6050);
        let cfg = RemoteConfig {
            fault_policy: FaultPolicy::ReinitializeBus,
            ..RemoteConfig::default()
        };
        let mut p: RemotePipeline<SimPeripheral> = RemotePipeline::new(imu, &cfg, Arc::clone(&monitor));

        monitor.report(BusFault::Overrun);
        p.tick(false).unwrap();

        assert!(monitor.peek().is_empty());
        assert_eq!(p.imu().bus().peripheral().reinitializations(), 1);
    }

    #[test]
    fn schedule_keeps_absolute_deadlines() {
        let start = Instant::now();
        let period = Duration::from_millis(100);
        let mut schedule = PeriodicSchedule::new(start, period);

        // 30 ms of work in the first period.
        let sleep = schedule.advance(start + Duration::from_millis(30));
        assert_eq!(sleep, Duration::from_millis(70));

        // Overrun: work ran past the second deadline.
        let sleep = schedule.advance(start + Duration::from_millis(250));
        assert_eq!(sleep, Duration::ZERO);
        assert_eq!(schedule.next_deadline(), start + 2 * period);

        let sleep = schedule.advance(start + Duration::from_millis(260));
        assert_eq!(sleep, Duration::from_millis(40));
    }

    #[test]
    fn custom_thresholds_change_the_classification() {
        let mut p = pipeline().with_thresholds(GestureThresholds {
            side_counts: 7500,
            ..GestureThresholds::default()
        });
        sim(&mut p).set_accel([0, -7000, -4000]);
        p.tick(true).unwrap();

        match p.tick(true).unwrap() {
            TickOutcome::Ran { gesture, .. } => assert_eq!(gesture, GestureCommand::Suspend),
            other => panic!("expected a run, got {other:?}"),
        }
    }

    const WAIT: Duration = Duration::from_secs(5);

    #[test]
    fn worker_reports_mode_changes_and_commands_until_hung_up() {
        let mut p = pipeline();
        sim(&mut p).set_accel([0, -7000, -4000]);
        let signal = ModeSignal::new(0);
        let mode = &signal;
        mode.toggle();
        let (tx, rx) = mpsc::channel();

        thread::scope(|s| {
            let worker = s.spawn(move || sensor_task(p, mode, tx, Duration::from_millis(1)));

            assert_eq!(rx.recv_timeout(WAIT).unwrap(), RemoteEvent::ModeChanged(true));
            assert_eq!(
                rx.recv_timeout(WAIT).unwrap(),
                RemoteEvent::Command(GestureCommand::MoveRight)
            );

            mode.toggle();
            // Confirmations from periods before the toggle may still be queued.
            loop {
                match rx.recv_timeout(WAIT).unwrap() {
                    RemoteEvent::Command(GestureCommand::MoveRight) => continue,
                    other => {
                        assert_eq!(other, RemoteEvent::ModeChanged(false));
                        break;
                    }
                }
            }

            drop(rx);
            mode.toggle();
            worker.join().unwrap();
        });
    }

    #[test]
    fn worker_keeps_running_through_read_errors() {
        let mut p = pipeline();
        sim(&mut p).set_present(false);
        let signal = ModeSignal::new(0);
        let mode = &signal;
        mode.toggle();
        let (tx, rx) = mpsc::channel();

        thread::scope(|s| {
            let worker = s.spawn(move || sensor_task(p, mode, tx, Duration::from_millis(1)));

            assert_eq!(rx.recv_timeout(WAIT).unwrap(), RemoteEvent::ModeChanged(true));
            thread::sleep(Duration::from_millis(20));
            mode.toggle();
            assert_eq!(rx.recv_timeout(WAIT).unwrap(), RemoteEvent::ModeChanged(false));

            drop(rx);
            mode.toggle();
            worker.join().unwrap();
        });
    }
}
