use std::sync::mpsc;
use std::time::Duration;

use dining::{AcquirePolicy, Config, Event, Fork, ForkError, MillisRange, Phase, Table};

const SAFE: [AcquirePolicy; 3] = [
    AcquirePolicy::LastReversed,
    AcquirePolicy::Alternating,
    AcquirePolicy::Backoff,
];

// ジャーナルを受信順に再生し、フォークの排他と「食べている間は両方持っている」を確かめる
fn replay(n: usize, meals: usize, events: &[Event]) {
    let mut owner: Vec<Option<usize>> = vec![None; n];
    let mut eating = vec![false; n];
    let mut eaten = vec![0; n];
    let mut terminated = vec![false; n];

    for ev in events {
        match *ev {
            Event::Acquired { philosopher, fork } => {
                assert_eq!(owner[fork], None, "fork {fork} taken while held: {ev:?}");
                assert!(fork == philosopher || fork == (philosopher + 1) % n);
                owner[fork] = Some(philosopher);
            }
            Event::Released { philosopher, fork } => {
                assert_eq!(owner[fork], Some(philosopher), "{ev:?}");
                assert!(!eating[philosopher], "released while eating: {ev:?}");
                owner[fork] = None;
            }
            Event::StartedEating { philosopher } => {
                assert_eq!(owner[philosopher], Some(philosopher));
                assert_eq!(owner[(philosopher + 1) % n], Some(philosopher));
                assert!(!eating[philosopher]);
                eating[philosopher] = true;
                eaten[philosopher] += 1;
            }
            Event::FinishedEating { philosopher } => {
                assert!(eating[philosopher]);
                eating[philosopher] = false;
            }
            Event::Terminated { philosopher } => {
                assert!(!terminated[philosopher]);
                terminated[philosopher] = true;
            }
        }
    }

    assert_eq!(eaten, vec![meals; n]);
    assert!(terminated.iter().all(|t| *t));
    assert!(owner.iter().all(|o| o.is_none()));
}

fn run_with_journal(config: &Config) -> Vec<Event> {
    let (tx, rx) = mpsc::channel();
    let table = Table::with_journal(config, tx).unwrap();
    let running = table.start().unwrap();
    assert!(
        running.wait_timeout(Duration::from_secs(30)),
        "table with {} did not finish",
        config.policy
    );
    running.join().unwrap();
    rx.try_iter().collect()
}

#[test]
fn test_five_philosophers_one_meal() {
    let events = run_with_journal(&Config::instant(5, 1));

    let eaters: Vec<usize> = events
        .iter()
        .filter_map(|ev| match ev {
            Event::StartedEating { philosopher } => Some(*philosopher),
            _ => None,
        })
        .collect();
    assert_eq!(eaters.len(), 5);
    let mut sorted = eaters.clone();
    sorted.sort();
    assert_eq!(sorted, vec![0, 1, 2, 3, 4]);

    let terminated = events
        .iter()
        .filter(|ev| matches!(ev, Event::Terminated { .. }))
        .count();
    assert_eq!(terminated, 5);

    replay(5, 1, &events);
}

#[test]
fn test_invariants_under_contention() {
    // 食事に時間をかけて、取り合いが起きるようにする
    for policy in SAFE {
        let config = Config::instant(6, 4)
            .eat(MillisRange::new(0, 2))
            .policy(policy);
        let events = run_with_journal(&config);
        replay(6, 4, &events);
    }
}

#[test]
fn test_two_philosophers() {
    for policy in SAFE {
        let events = run_with_journal(&Config::instant(2, 5).policy(policy));
        replay(2, 5, &events);
    }
}

#[test]
fn test_zero_meals() {
    let table = Table::new(&Config::instant(3, 0)).unwrap();
    let view = table.view();
    let summary = table.run().unwrap();

    assert_eq!(summary.meals, vec![0, 0, 0]);
    assert!(view
        .snapshot()
        .philosophers
        .iter()
        .all(|p| p.phase == Phase::Terminated));
}

#[test]
fn test_left_first_deadlocks() {
    // 全員が左を取ったあと右を取りに行く前に少し待たせると、確実に全員が左を持った状態になる
    let config = Config::instant(5, 1)
        .policy(AcquirePolicy::LeftFirst)
        .grab_pause(Duration::from_millis(300));
    let running = Table::new(&config).unwrap().start().unwrap();

    assert!(!running.wait_timeout(Duration::from_millis(1500)));

    let snapshot = running.snapshot();
    for (i, f) in snapshot.forks.iter().enumerate() {
        assert_eq!(f.owner, Some(i), "fork {i} should be held by its left user");
    }
    for p in &snapshot.philosophers {
        assert_eq!(p.phase, Phase::Requesting);
        assert_eq!(p.meals, 0);
        assert!(!p.eating);
    }

    // まだ止まったまま
    assert!(!running.wait_timeout(Duration::from_millis(200)));
    // スレッドは永久にブロックしているので join せずに捨てる
}

#[test]
fn test_last_reversed_survives_grab_pause() {
    let config = Config::instant(5, 2).grab_pause(Duration::from_millis(20));
    let events = run_with_journal(&config);
    replay(5, 2, &events);
}

#[test]
fn test_release_without_holding() {
    let fork = Fork::new(2);
    assert_eq!(fork.release(2), Err(ForkError::NotHeld { fork: 2, by: 2 }));

    fork.acquire(1);
    assert_eq!(
        fork.release(2),
        Err(ForkError::NotOwner {
            fork: 2,
            by: 2,
            owner: 1
        })
    );
    assert_eq!(fork.owner(), Some(1));
    assert!(fork.is_held());
}
