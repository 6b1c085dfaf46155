//! Injectable time source.
use crate::util::now_epoch_ms;
use anyhow::Result;

pub trait Clock: Send + Sync {
    fn now_epoch_ms(&self) -> Result<u128>;
}

/// Wall-clock time.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_epoch_ms(&self) -> Result<u128> {
        now_epoch_ms()
    }
}

/// Manually advanced clock for tests.
#[cfg(test)]
#[derive(Debug, Default)]
pub struct ManualClock {
    now: std::sync::Mutex<u128>,
}

#[cfg(test)]
impl ManualClock {
    pub fn at(now: u128) -> Self {
        Self {
            now: std::sync::Mutex::new(now),
        }
    }

    pub fn advance_ms(&self, delta: u128) {
        let mut now = self.now.lock().unwrap_or_else(|err| err.into_inner());
        *now += delta;
    }
}

#[cfg(test)]
impl Clock for ManualClock {
    fn now_epoch_ms(&self) -> Result<u128> {
        Ok(*self.now.lock().unwrap_or_else(|err| err.into_inner()))
    }
}

impl<C: Clock + ?Sized> Clock for &C {
    fn now_epoch_ms(&self) -> Result<u128> {
        (**self).now_epoch_ms()
    }
}
