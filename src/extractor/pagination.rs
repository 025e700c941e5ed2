use std::future::Future;
use std::ops::Range;

use futures::stream::{self, StreamExt};

use crate::config::EngineConfig;
use crate::models::{Technique, Window};

/// Row indices to fetch for `count` rows under the configured window.
pub fn row_indices(count: u64, window: Window) -> Range<usize> {
    window.indices(usize::try_from(count).unwrap_or(usize::MAX))
}

/// Workers allowed for independent rows. Time-based extraction stays
/// sequential so concurrent sleeps do not blur the signal.
pub fn pool_size(config: &EngineConfig, technique: Technique) -> usize {
    match technique {
        Technique::Time => 1,
        _ => config.threads.max(1),
    }
}

/// Run `job` over `items` with at most `workers` in flight. Results keep
/// the order of `items`.
pub async fn run_pool<T, R, F, Fut>(items: Vec<T>, workers: usize, job: F) -> Vec<R>
where
    F: FnMut(T) -> Fut,
    Fut: Future<Output = R>,
{
    stream::iter(items).map(job).buffered(workers.max(1)).collect().await
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    use super::*;

    #[test]
    fn test_row_indices_window() {
        assert_eq!(row_indices(10, Window::new(2, Some(5))), 2..5);
        assert_eq!(row_indices(3, Window::new(0, Some(50))), 0..3);
        assert_eq!(row_indices(3, Window::new(7, None)), 3..3);
    }

    #[test]
    fn test_time_pool_is_sequential() {
        let config = EngineConfig { threads: 8, ..Default::default() };
        assert_eq!(pool_size(&config, Technique::Time), 1);
        assert_eq!(pool_size(&config, Technique::Boolean), 8);
    }

    #[tokio::test]
    async fn test_run_pool_bounds_concurrency_and_keeps_order() {
        let in_flight = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));
        let results = run_pool((0..12).collect(), 3, |i: u64| {
            let in_flight = in_flight.clone();
            let peak = peak.clone();
            async move {
                let now = in_flight.fetch_add(1, Ordering::SeqCst) + 1;
                peak.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(5 * (12 - i))).await;
                in_flight.fetch_sub(1, Ordering::SeqCst);
                i * 10
            }
        })
        .await;
        assert_eq!(results, (0..12).map(|i| i * 10).collect::<Vec<_>>());
        assert!(peak.load(Ordering::SeqCst) <= 3);
    }
}
