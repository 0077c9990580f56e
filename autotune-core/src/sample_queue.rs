//! Single producer / single consumer queue of gyro samples, on top of
//! `heapless::spsc`.
//!
//! The producer fills a staged sample and then commits it. A commit fails
//! instead of overwriting when the consumer has not caught up; the staged
//! data is kept for the next attempt. The consumer looks at the oldest
//! committed sample and frees it explicitly once done with it. One slot of
//! the ring is always kept free, so at most `N - 1` samples wait.

use core::sync::atomic::{AtomicU32, Ordering};

use heapless::spsc::{Consumer, Producer, Queue};

/// One gyro callback worth of data.
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Sample {
    /// deg/s
    pub gyro: [f32; 3],
    /// roll, pitch, yaw command at the time of the gyro reading
    pub actuator_desired: [f32; 3],
    pub throttle_desired: f32,
    pub timestamp_us: u64,
}

impl Sample {
    pub const ZERO: Self = Self {
        gyro: [0.0; 3],
        actuator_desired: [0.0; 3],
        throttle_desired: 0.0,
        timestamp_us: 0,
    };
}

#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueueFull;

/// Owned by whoever wires up the sensor callback and the autotune task,
/// which each get one half from `split`.
pub struct SampleQueue<const N: usize> {
    queue: Queue<Sample, N>,
    spilled: AtomicU32,
}

impl<const N: usize> SampleQueue<N> {
    pub const fn new() -> Self {
        Self {
            queue: Queue::new(),
            spilled: AtomicU32::new(0),
        }
    }

    /// Hand out the producer and consumer halves. Borrowing mutably makes
    /// sure there is only ever one of each.
    pub fn split(&mut self) -> (SampleProducer<'_, N>, SampleConsumer<'_, N>) {
        let Self { queue, spilled } = self;
        let spilled: &AtomicU32 = spilled;
        let (producer, consumer) = queue.split();
        (
            SampleProducer {
                producer,
                staged: Sample::ZERO,
                spilled,
            },
            SampleConsumer { consumer, spilled },
        )
    }

    /// Maximum number of committed, unread samples.
    pub const fn capacity(&self) -> usize {
        N - 1
    }
}

impl<const N: usize> Default for SampleQueue<N> {
    fn default() -> Self {
        Self::new()
    }
}

pub struct SampleProducer<'a, const N: usize> {
    producer: Producer<'a, Sample, N>,
    staged: Sample,
    spilled: &'a AtomicU32,
}

impl<'a, const N: usize> SampleProducer<'a, N> {
    /// The sample the next commit publishes. Calling this again before a
    /// successful commit returns the same sample with its previous contents.
    pub fn write_slot(&mut self) -> &mut Sample {
        &mut self.staged
    }

    /// Publish the staged sample.
    pub fn commit_write(&mut self) -> Result<(), QueueFull> {
        self.producer.enqueue(self.staged).map_err(|_| QueueFull)
    }

    /// Count a sample that was dropped because the queue stayed full.
    pub fn record_spill(&mut self) {
        self.spilled.fetch_add(1, Ordering::Relaxed);
    }
}

pub struct SampleConsumer<'a, const N: usize> {
    consumer: Consumer<'a, Sample, N>,
    spilled: &'a AtomicU32,
}

impl<'a, const N: usize> SampleConsumer<'a, N> {
    /// Oldest committed sample, without freeing it.
    pub fn read_slot(&self) -> Option<&Sample> {
        self.consumer.peek()
    }

    /// Free the oldest committed sample. Does nothing on an empty queue.
    pub fn complete_read(&mut self) {
        self.consumer.dequeue();
    }

    /// Remove and return the oldest committed sample.
    pub fn dequeue(&mut self) -> Option<Sample> {
        self.consumer.dequeue()
    }

    /// Drop everything committed so far, returns how many samples that was.
    pub fn clear(&mut self) -> usize {
        let mut drained = 0;
        while self.consumer.dequeue().is_some() {
            drained += 1;
        }
        drained
    }

    pub fn len(&self) -> usize {
        self.consumer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub const fn capacity(&self) -> usize {
        N - 1
    }

    pub fn spilled(&self) -> u32 {
        self.spilled.load(Ordering::Relaxed)
    }

    pub fn reset_spilled(&mut self) {
        self.spilled.store(0, Ordering::Relaxed);
    }
}
