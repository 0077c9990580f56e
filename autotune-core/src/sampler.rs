use crate::readings::{ActuatorDesired, GyroData};
use crate::sample_queue::SampleProducer;

/// Sensor side of the autotune queue, called for every new gyro reading.
///
/// A sample whose commit failed stays staged and gets one more
/// chance on the next reading. If the queue is still full by then the stale
/// sample is counted as spilled and overwritten.
pub struct GyroSampler<'a, const N: usize> {
    producer: SampleProducer<'a, N>,
    unpushed: bool,
}

impl<'a, const N: usize> GyroSampler<'a, N> {
    pub fn new(producer: SampleProducer<'a, N>) -> Self {
        Self {
            producer,
            unpushed: false,
        }
    }

    /// Snapshot the gyro reading together with the actuator command that
    /// produced it. Constant time, never blocks.
    pub fn on_gyro(&mut self, timestamp_us: u64, gyro: &GyroData, actuator: &ActuatorDesired) {
        if self.unpushed && self.producer.commit_write().is_err() {
            self.producer.record_spill();
        }

        let slot = self.producer.write_slot();
        slot.timestamp_us = timestamp_us;
        slot.gyro = gyro.as_array();
        slot.actuator_desired = [actuator.roll, actuator.pitch, actuator.yaw];
        slot.throttle_desired = actuator.thrust;

        self.unpushed = self.producer.commit_write().is_err();
    }

    /// True while the last sample is staged but not committed.
    pub fn has_unpushed(&self) -> bool {
        self.unpushed
    }
}
