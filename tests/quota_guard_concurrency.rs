use std::sync::Barrier;
use std::thread;

use persona_lab::{ClientKey, MonetizationConfig, Plan, QuotaGuard};
use time::macros::datetime;

fn admitted(threads: usize, cap: u64) -> (usize, u64) {
    let guard = QuotaGuard::new(MonetizationConfig::enabled_with_cap(cap));
    let client = ClientKey::new("shared").unwrap();
    let now = datetime!(2025-03-14 12:00:00 UTC);
    let barrier = Barrier::new(threads);

    let admitted = thread::scope(|scope| {
        let handles: Vec<_> = (0..threads)
            .map(|_| {
                scope.spawn(|| {
                    barrier.wait();
                    guard.check_and_increment(&client, Plan::Free, now).allowed
                })
            })
            .collect();
        handles
            .into_iter()
            .map(|handle| handle.join().unwrap())
            .filter(|allowed| *allowed)
            .count()
    });

    let usage = guard.status(&client, Plan::Free, now).usage_today;
    (admitted, usage)
}

#[test]
fn concurrent_callers_never_exceed_the_cap() {
    assert_eq!(admitted(32, 10), (10, 10));
}

#[test]
fn concurrent_callers_below_the_cap_are_all_admitted() {
    assert_eq!(admitted(8, 20), (8, 8));
}

#[test]
fn distinct_clients_are_metered_independently() {
    let guard = QuotaGuard::new(MonetizationConfig::enabled_with_cap(3));
    let now = datetime!(2025-03-14 12:00:00 UTC);

    thread::scope(|scope| {
        for id in 0..8 {
            let guard = &guard;
            scope.spawn(move || {
                let client = ClientKey::new(format!("client-{id}")).unwrap();
                let decisions: Vec<bool> = (0..5)
                    .map(|_| guard.check_and_increment(&client, Plan::Free, now).allowed)
                    .collect();
                assert_eq!(decisions, vec![true, true, true, false, false]);
            });
        }
    });
}
