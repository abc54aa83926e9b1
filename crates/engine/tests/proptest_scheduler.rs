use chrono::NaiveDate;
use proptest::prelude::*;

use engine::ScanScheduler;

proptest! {
    /// Popping chunks of `k` over a universe of `M` refills exactly once all
    /// `M` symbols have been dequeued, and the next pass keeps the order.
    #[test]
    fn scan_queue_refills_after_full_pass(m in 1usize..60, k in 1usize..25, passes in 1usize..4) {
        let today = NaiveDate::from_ymd_opt(2024, 3, 4).unwrap();
        let universe: Vec<String> = (0..m).map(|i| format!("SYM{i:03}")).collect();
        let mut scheduler = ScanScheduler::new(k, None);
        scheduler.reset(today, universe.clone());

        for _ in 0..passes {
            let mut pass = Vec::new();
            while pass.len() < m {
                let chunk = scheduler.next_chunk();
                prop_assert!(!chunk.is_empty());
                prop_assert!(chunk.len() <= k);
                pass.extend(chunk);
            }
            // Chunks never straddle a refill.
            prop_assert_eq!(pass.len(), m);
            prop_assert_eq!(&pass, &universe);
            prop_assert!(scheduler.state().unwrap().remaining.is_empty());
        }
    }

    /// Requeueing the unfinished tail of a chunk loses and duplicates nothing.
    #[test]
    fn requeue_preserves_pass(m in 2usize..40, k in 1usize..10, fail_at in 0usize..10) {
        let today = NaiveDate::from_ymd_opt(2024, 3, 4).unwrap();
        let universe: Vec<String> = (0..m).map(|i| format!("SYM{i:03}")).collect();
        let mut scheduler = ScanScheduler::new(k, None);
        scheduler.reset(today, universe.clone());

        let chunk = scheduler.next_chunk();
        let failed = fail_at.min(chunk.len() - 1);
        let mut done: Vec<String> = chunk[..failed].to_vec();
        scheduler.requeue_front(&chunk[failed..]);

        while done.len() < m {
            done.extend(scheduler.next_chunk());
        }
        prop_assert_eq!(done, universe);
    }
}
