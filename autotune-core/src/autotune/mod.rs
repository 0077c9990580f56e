use crate::config::AutotuneConfig;
use crate::io::AutotunePublisher;
use crate::readings::FlightStatus;
use crate::record::SystemIdent;
use crate::sample_queue::{Sample, SampleConsumer};
use crate::stats::{DecayingMeanSquare, RunningMean};
use crate::system_ident::SystemIdentFilter;

mod task;
#[cfg(test)]
mod tests;

#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AutotuneState {
    /// Waiting to be armed in autotune mode
    Init,
    /// Armed, flying in normal stabilization until the warmup passes
    Start,
    /// Feeding samples through the filter
    Run,
    /// Measurement window closed, final record not published yet
    Finished,
    /// Result published, waiting for a disarm to save it
    Waiting,
}

#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Debug)]
pub enum AutotuneInitError<E> {
    /// Module turned off in the settings
    Disabled,
    Registration(E),
}

/// What the task loop should do after a tick.
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// Not in autotune mode, leave the stabilization setpoint alone and idle
    Inactive,
    Active {
        /// Stabilization should run in estimation mode
        identifying: bool,
        /// False when samples are still queued and the task should only yield
        can_sleep: bool,
    },
}

/// Lifecycle of an autotune run: warm up, measure, publish and save.
///
/// Owns the filter and the consumer half of the sample queue. Everything in
/// here is only touched from the autotune task.
pub struct Autotune<'a, P: AutotunePublisher, const N: usize> {
    config: AutotuneConfig,
    consumer: SampleConsumer<'a, N>,
    publisher: P,
    filter: SystemIdentFilter,
    state: AutotuneState,
    save_needed: bool,
    window_start_us: u64,
    last_sample_us: u64,
    update_counter: u32,
    hover_throttle: RunningMean,
    noise: DecayingMeanSquare<3>,
}

impl<'a, P: AutotunePublisher, const N: usize> Autotune<'a, P, N> {
    pub fn new(
        config: AutotuneConfig,
        consumer: SampleConsumer<'a, N>,
        mut publisher: P,
    ) -> Result<Self, AutotuneInitError<P::Error>> {
        if !config.enabled {
            log_warn!("autotune disabled");
            return Err(AutotuneInitError::Disabled);
        }
        publisher
            .register()
            .map_err(AutotuneInitError::Registration)?;

        let noise = DecayingMeanSquare::new(config.noise_alpha);
        Ok(Self {
            config,
            consumer,
            publisher,
            filter: SystemIdentFilter::new(),
            state: AutotuneState::Init,
            save_needed: false,
            window_start_us: 0,
            last_sample_us: 0,
            update_counter: 0,
            hover_throttle: RunningMean::new(),
            noise,
        })
    }

    /// One scheduling period of the lifecycle. `status` is the flight status
    /// snapshot for this period.
    pub fn tick(&mut self, now_us: u64, status: &FlightStatus) -> TickOutcome {
        if self.save_needed && status.is_disarmed() {
            log_info!("saving identified parameters");
            self.publisher.request_save();
            self.save_needed = false;
            self.transition(AutotuneState::Init);
        }

        if !status.is_autotune() {
            self.transition(AutotuneState::Init);
            return TickOutcome::Inactive;
        }

        let mut identifying = false;
        let mut can_sleep = true;

        match self.state {
            AutotuneState::Init => {
                // only a run that completes gets saved
                self.save_needed = false;
                self.window_start_us = now_us;

                if status.is_armed() {
                    self.filter.reset();
                    self.publish(None, 0.0);
                    self.transition(AutotuneState::Start);
                }
            }
            AutotuneState::Start => {
                if status.is_disarmed() {
                    self.transition(AutotuneState::Init);
                } else if self.elapsed_ms(now_us) > self.config.warmup_ms as u64 {
                    self.last_sample_us = now_us;
                    let dropped = self.consumer.clear();
                    log_debug!("dropped {} warmup samples", dropped);

                    self.update_counter = 0;
                    self.consumer.reset_spilled();
                    self.hover_throttle.clear();
                    self.noise.clear();

                    self.window_start_us = now_us;
                    self.transition(AutotuneState::Run);
                }
            }
            AutotuneState::Run => {
                if status.is_disarmed() {
                    log_info!("disarmed before the measurement finished");
                    self.transition(AutotuneState::Init);
                } else {
                    identifying = true;
                    can_sleep = self.drain_samples();

                    if self.elapsed_ms(now_us) > self.config.measure_ms as u64 {
                        self.transition(AutotuneState::Finished);
                    }
                }
            }
            AutotuneState::Finished => {
                self.publish(Some(self.noise.value()), 0.0);
                self.save_needed = true;
                log_info!(
                    "identification finished after {} updates, {} spilled",
                    self.update_counter,
                    self.consumer.spilled()
                );
                self.transition(AutotuneState::Waiting);
            }
            AutotuneState::Waiting => {}
        }

        TickOutcome::Active {
            identifying,
            can_sleep,
        }
    }

    /// Feed at most `max_samples_per_period` queued samples through the
    /// filter. Returns true once the queue ran empty.
    fn drain_samples(&mut self) -> bool {
        for _ in 0..self.config.max_samples_per_period {
            let Some(sample) = self.consumer.dequeue() else {
                return true;
            };
            self.process(&sample);
        }
        false
    }

    fn process(&mut self, sample: &Sample) {
        let dt_us = match sample.timestamp_us.checked_sub(self.last_sample_us) {
            Some(dt_us) if dt_us > 0 => dt_us,
            _ => {
                log_trace!("skipping sample without forward time step");
                return;
            }
        };
        self.last_sample_us = sample.timestamp_us;
        let dt_s = (dt_us as f32 * 1e-6).min(self.config.dt_ceiling_s);

        self.filter.predict_update(
            &sample.actuator_desired,
            &sample.gyro,
            dt_s,
            sample.throttle_desired,
        );

        let rates = self.filter.state().rates();
        self.noise
            .update(core::array::from_fn(|i| sample.gyro[i] - rates[i]));
        self.hover_throttle.update(sample.throttle_desired);

        let publish_due = self.update_counter % self.config.publish_every.max(1) == 0;
        self.update_counter = self.update_counter.wrapping_add(1);
        if publish_due {
            self.publish(Some(self.noise.value()), dt_s);
        }
    }

    fn publish(&mut self, noise: Option<[f32; 3]>, period_s: f32) {
        let record = SystemIdent::from_state(
            self.filter.state(),
            noise,
            period_s,
            self.update_counter,
            self.consumer.spilled(),
            self.hover_throttle.mean(),
        );
        self.publisher.publish_system_ident(&record);
    }

    fn elapsed_ms(&self, now_us: u64) -> u64 {
        now_us.saturating_sub(self.window_start_us) / 1_000
    }

    fn transition(&mut self, next: AutotuneState) {
        if self.state != next {
            log_info!("autotune {:?} -> {:?}", self.state, next);
            self.state = next;
        }
    }

    pub fn state(&self) -> AutotuneState {
        self.state
    }

    pub fn save_needed(&self) -> bool {
        self.save_needed
    }

    pub fn update_counter(&self) -> u32 {
        self.update_counter
    }

    pub fn filter(&self) -> &SystemIdentFilter {
        &self.filter
    }

    pub fn config(&self) -> &AutotuneConfig {
        &self.config
    }

    pub fn publisher(&self) -> &P {
        &self.publisher
    }

    pub fn publisher_mut(&mut self) -> &mut P {
        &mut self.publisher
    }
}
