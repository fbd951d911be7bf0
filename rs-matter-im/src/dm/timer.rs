/*
 *
 *    Copyright (c) 2020-2022 Project CHIP Authors
 *
 *    Licensed under the Apache License, Version 2.0 (the "License");
 *    you may not use this file except in compliance with the License.
 *    You may obtain a copy of the License at
 *
 *        http://www.apache.org/licenses/LICENSE-2.0
 *
 *    Unless required by applicable law or agreed to in writing, software
 *    distributed under the License is distributed on an "AS IS" BASIS,
 *    WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
 *    See the License for the specific language governing permissions and
 *    limitations under the License.
 */

//! The single report timer of the engine and its time source.

use core::cell::Cell;

use embassy_time::{Duration, Instant};

/// Arms and cancels the one timer the report scheduler needs.
///
/// When the deadline passes, the platform calls `Engine::on_timer` with the
/// current time. Starting the timer again replaces the previous deadline.
pub trait TimerDelegate {
    fn start_timer(&self, deadline: Instant);

    fn cancel_timer(&self);

    fn is_timer_active(&self) -> bool;

    fn now(&self) -> Instant;
}

impl<T> TimerDelegate for &T
where
    T: TimerDelegate,
{
    fn start_timer(&self, deadline: Instant) {
        (**self).start_timer(deadline)
    }

    fn cancel_timer(&self) {
        (**self).cancel_timer()
    }

    fn is_timer_active(&self) -> bool {
        (**self).is_timer_active()
    }

    fn now(&self) -> Instant {
        (**self).now()
    }
}

/// A timer with an explicitly advanced clock.
#[derive(Debug)]
pub struct ManualTimer {
    now: Cell<Instant>,
    deadline: Cell<Option<Instant>>,
}

impl ManualTimer {
    pub const fn new() -> Self {
        Self {
            now: Cell::new(Instant::from_ticks(0)),
            deadline: Cell::new(None),
        }
    }

    pub fn advance(&self, by: Duration) -> Instant {
        self.now.set(self.now.get() + by);

        self.now.get()
    }

    pub fn set_now(&self, now: Instant) {
        self.now.set(now);
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline.get()
    }

    /// Return `true` if the timer is armed and its deadline has passed.
    pub fn is_due(&self) -> bool {
        self.deadline
            .get()
            .is_some_and(|deadline| deadline <= self.now.get())
    }
}

impl Default for ManualTimer {
    fn default() -> Self {
        Self::new()
    }
}

impl TimerDelegate for ManualTimer {
    fn start_timer(&self, deadline: Instant) {
        self.deadline.set(Some(deadline));
    }

    fn cancel_timer(&self) {
        self.deadline.set(None);
    }

    fn is_timer_active(&self) -> bool {
        self.deadline.get().is_some()
    }

    fn now(&self) -> Instant {
        self.now.get()
    }
}

/// A timer on the `embassy-time` clock.
///
/// The platform loop awaits [`EmbassyTimer::wait`] and then calls `Engine::on_timer`.
#[cfg(feature = "std")]
#[derive(Debug, Default)]
pub struct EmbassyTimer {
    deadline: Cell<Option<Instant>>,
}

#[cfg(feature = "std")]
impl EmbassyTimer {
    pub const fn new() -> Self {
        Self {
            deadline: Cell::new(None),
        }
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline.get()
    }

    /// Wait until the armed deadline; pends forever while disarmed.
    pub async fn wait(&self) -> Instant {
        match self.deadline.get() {
            Some(deadline) => {
                embassy_time::Timer::at(deadline).await;
                Instant::now()
            }
            None => core::future::pending().await,
        }
    }
}

#[cfg(feature = "std")]
impl TimerDelegate for EmbassyTimer {
    fn start_timer(&self, deadline: Instant) {
        self.deadline.set(Some(deadline));
    }

    fn cancel_timer(&self) {
        self.deadline.set(None);
    }

    fn is_timer_active(&self) -> bool {
        self.deadline.get().is_some()
    }

    fn now(&self) -> Instant {
        Instant::now()
    }
}

#[cfg(test)]
mod tests {
    use embassy_time::{Duration, Instant};

    use super::{ManualTimer, TimerDelegate};

    #[test]
    fn test_manual_timer() {
        let timer = ManualTimer::new();

        assert!(!timer.is_timer_active());

        timer.start_timer(Instant::from_secs(10));
        assert!(timer.is_timer_active());
        assert!(!timer.is_due());

        assert_eq!(timer.advance(Duration::from_secs(10)), Instant::from_secs(10));
        assert!(timer.is_due());

        timer.cancel_timer();
        assert!(!timer.is_timer_active());
        assert!(!timer.is_due());
    }

    #[cfg(feature = "std")]
    #[test]
    fn test_embassy_timer_arming() {
        let timer = super::EmbassyTimer::new();
        assert!(!timer.is_timer_active());

        let start = timer.now();
        let deadline = start + Duration::from_millis(5);

        timer.start_timer(deadline);
        assert!(timer.is_timer_active());
        assert_eq!(timer.deadline(), Some(deadline));

        // Re-arming replaces the deadline
        timer.start_timer(start + Duration::from_secs(1));
        assert_eq!(timer.deadline(), Some(start + Duration::from_secs(1)));

        timer.cancel_timer();
        assert!(!timer.is_timer_active());
        assert_eq!(timer.deadline(), None);

        assert!(timer.now() >= start);
    }
}
