use embassy_futures::yield_now;
use embedded_hal_async::delay::DelayNs;

use super::{Autotune, TickOutcome};
use crate::io::{AutotunePublisher, FlightSignals, Watchdog};
use crate::stabilization::StabilizationDesired;
use crate::time::Clock;

impl<'a, P: AutotunePublisher, const N: usize> Autotune<'a, P, N> {
    /// The autotune task. Never returns.
    ///
    /// While autotune is the active flight mode the stabilization setpoint
    /// is derived from the sticks every period. The task only sleeps when
    /// the sample queue is drained, otherwise it yields so the backlog is
    /// worked off as fast as the scheduler allows.
    pub async fn run(
        &mut self,
        signals: &mut impl FlightSignals,
        clock: impl Clock,
        delay: &mut impl DelayNs,
        watchdog: &mut impl Watchdog,
    ) {
        loop {
            watchdog.feed();

            let status = signals.flight_status();
            match self.tick(clock.now_us(), &status) {
                TickOutcome::Inactive => {
                    delay.delay_ms(self.config.idle_period_ms).await;
                }
                TickOutcome::Active {
                    identifying,
                    can_sleep,
                } => {
                    let manual = signals.manual_control();
                    let desired = StabilizationDesired::from_manual(
                        &manual,
                        &self.config.stabilization,
                        identifying,
                    );
                    self.publisher.publish_stabilization_desired(&desired);

                    if can_sleep {
                        delay.delay_ms(self.config.period_ms).await;
                    } else {
                        yield_now().await;
                    }
                }
            }
        }
    }
}
