use std::time::Duration;

use tokio::sync::{Mutex, MutexGuard};
use tokio::time::Instant;

// ─── Lane ─────────────────────────────────────────────────────────────────

/// Single-slot execution lane with minimum spacing between occupants.
///
/// Callers queue on a fair (FIFO) async mutex, so the order in which
/// `acquire` is first polled is the order in which callers are admitted.
/// The slot records when the previous occupant left; a new occupant is only
/// released once `min_interval` has passed since then.
pub struct Lane {
    last_settled: Mutex<Option<Instant>>,
    min_interval: Duration,
}

/// Exclusive right to run one call through the lane.
///
/// Dropping the ticket stamps the settle time, including on error or
/// cancellation of the holder.
pub struct LaneTicket<'a> {
    guard: MutexGuard<'a, Option<Instant>>,
}

impl Lane {
    pub fn new(min_interval: Duration) -> Self {
        Self {
            last_settled: Mutex::new(None),
            min_interval,
        }
    }

    pub fn min_interval(&self) -> Duration {
        self.min_interval
    }

    /// Wait for the lane to be free and the spacing interval to elapse.
    pub async fn acquire(&self) -> LaneTicket<'_> {
        let guard = self.last_settled.lock().await;
        if let Some(last) = *guard {
            tokio::time::sleep_until(last + self.min_interval).await;
        }
        LaneTicket { guard }
    }
}

impl Drop for LaneTicket<'_> {
    fn drop(&mut self) {
        *self.guard = Some(Instant::now());
    }
}

// ─── Tests ────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[tokio::test(start_paused = true)]
    async fn first_acquire_does_not_wait() {
        let lane = Lane::new(Duration::from_secs(1));
        let start = Instant::now();
        let _t = lane.acquire().await;
        assert_eq!(start.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn second_acquire_waits_for_interval_after_settle() {
        let lane = Lane::new(Duration::from_millis(500));
        {
            let _t = lane.acquire().await;
            tokio::time::sleep(Duration::from_millis(200)).await;
        }
        let settled = Instant::now();
        let _t = lane.acquire().await;
        assert_eq!(settled.elapsed(), Duration::from_millis(500));
    }

    #[tokio::test(start_paused = true)]
    async fn occupants_never_overlap_and_keep_fifo_order() {
        let lane = Arc::new(Lane::new(Duration::from_millis(100)));
        let log = Arc::new(std::sync::Mutex::new(Vec::new()));

        let mut handles = Vec::new();
        for i in 0..4u32 {
            let lane = Arc::clone(&lane);
            let log = Arc::clone(&log);
            handles.push(tokio::spawn(async move {
                let _t = lane.acquire().await;
                let entered = Instant::now();
                tokio::time::sleep(Duration::from_millis(50)).await;
                log.lock().unwrap().push((i, entered, Instant::now()));
            }));
            // make queue order deterministic
            tokio::task::yield_now().await;
        }
        for h in handles {
            h.await.unwrap();
        }

        let log = log.lock().unwrap();
        let order: Vec<u32> = log.iter().map(|(i, _, _)| *i).collect();
        assert_eq!(order, vec![0, 1, 2, 3]);
        for pair in log.windows(2) {
            let (_, _, left_prev) = pair[0];
            let (_, entered_next, _) = pair[1];
            assert!(entered_next >= left_prev + Duration::from_millis(100));
        }
    }
}
