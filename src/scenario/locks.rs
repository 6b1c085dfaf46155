//! Named resource locks shared by concurrently running scenarios.
use std::collections::BTreeSet;
use std::sync::{Condvar, Mutex, MutexGuard};
use std::time::{Duration, Instant};

/// At most one scenario holds a given resource name at a time.
#[derive(Debug, Default)]
pub struct ResourceLocks {
    held: Mutex<BTreeSet<String>>,
    released: Condvar,
}

impl ResourceLocks {
    pub fn new() -> Self {
        Self::default()
    }

    fn held(&self) -> MutexGuard<'_, BTreeSet<String>> {
        self.held.lock().unwrap_or_else(|err| err.into_inner())
    }

    /// Take every named resource at once, waiting up to `wait` for all of
    /// them to be free. `None` means the wait elapsed.
    pub fn acquire(&self, names: &[String], wait: Duration) -> Option<ResourceGuard<'_>> {
        let wanted: BTreeSet<String> = names.iter().cloned().collect();
        let deadline = Instant::now() + wait;
        let mut held = self.held();
        loop {
            if wanted.iter().all(|name| !held.contains(name)) {
                held.extend(wanted.iter().cloned());
                return Some(ResourceGuard {
                    locks: self,
                    names: wanted,
                });
            }
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return None;
            }
            held = match self.released.wait_timeout(held, remaining) {
                Ok((guard, _)) => guard,
                Err(poisoned) => poisoned.into_inner().0,
            };
        }
    }

    #[cfg(test)]
    pub fn is_held(&self, name: &str) -> bool {
        self.held().contains(name)
    }
}

/// Releases its resources on drop, whatever state the scenario ended in.
#[derive(Debug)]
pub struct ResourceGuard<'a> {
    locks: &'a ResourceLocks,
    names: BTreeSet<String>,
}

impl ResourceGuard<'_> {
    #[cfg(test)]
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.names.iter().map(String::as_str)
    }
}

impl Drop for ResourceGuard<'_> {
    fn drop(&mut self) {
        let mut held = self.locks.held();
        for name in &self.names {
            held.remove(name);
        }
        drop(held);
        self.locks.released.notify_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(list: &[&str]) -> Vec<String> {
        list.iter().map(|name| name.to_string()).collect()
    }

    #[test]
    fn contended_resource_times_out_then_frees_on_drop() {
        let locks = ResourceLocks::new();
        let guard = locks
            .acquire(&names(&["test_site"]), Duration::ZERO)
            .expect("first acquire");
        assert!(locks.is_held("test_site"));
        assert!(locks
            .acquire(&names(&["test_site", "db"]), Duration::from_millis(20))
            .is_none());
        assert!(!locks.is_held("db"));

        drop(guard);
        assert!(!locks.is_held("test_site"));
        assert!(locks
            .acquire(&names(&["test_site"]), Duration::ZERO)
            .is_some());
    }

    #[test]
    fn waiter_acquires_after_holder_releases() {
        let locks = ResourceLocks::new();
        let guard = locks
            .acquire(&names(&["test_site"]), Duration::ZERO)
            .expect("first acquire");
        std::thread::scope(|scope| {
            let waiter = scope.spawn(|| {
                locks
                    .acquire(&names(&["test_site"]), Duration::from_secs(5))
                    .map(|guard| guard.names().map(str::to_string).collect::<Vec<_>>())
            });
            std::thread::sleep(Duration::from_millis(50));
            drop(guard);
            let acquired = waiter.join().expect("waiter thread");
            assert_eq!(acquired, Some(vec!["test_site".to_string()]));
        });
    }

    #[test]
    fn empty_resource_list_always_acquires() {
        let locks = ResourceLocks::new();
        assert!(locks.acquire(&[], Duration::ZERO).is_some());
    }
}
