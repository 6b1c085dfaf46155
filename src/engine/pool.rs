//! Bounded worker pool for one wave of independent items.
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

/// Apply `work` to every input on at most `jobs` scoped threads.
///
/// Results come back in input order regardless of completion order.
pub fn run_bounded<T, R, F>(inputs: &[T], jobs: usize, work: F) -> Vec<R>
where
    T: Sync,
    R: Send,
    F: Fn(&T) -> R + Sync,
{
    let workers = jobs.max(1).min(inputs.len());
    if workers <= 1 {
        return inputs.iter().map(&work).collect();
    }
    let next = AtomicUsize::new(0);
    let slots: Mutex<Vec<Option<R>>> = Mutex::new(inputs.iter().map(|_| None).collect());
    std::thread::scope(|scope| {
        for _ in 0..workers {
            scope.spawn(|| loop {
                let index = next.fetch_add(1, Ordering::Relaxed);
                let Some(input) = inputs.get(index) else {
                    break;
                };
                let result = work(input);
                let mut slots = slots.lock().unwrap_or_else(|err| err.into_inner());
                slots[index] = Some(result);
            });
        }
    });
    slots
        .into_inner()
        .unwrap_or_else(|err| err.into_inner())
        .into_iter()
        .flatten()
        .collect()
}
