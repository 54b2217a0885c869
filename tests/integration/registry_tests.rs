//! Registry behaviour seen from connected channels.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use rpmsg_resmgr::error::ENOENT;
use rpmsg_resmgr::provider::ResourceKind;
use rpmsg_resmgr::{Error, Registry};

use crate::mock_provider::{MockProvider, Remote, timer_registry};

#[test]
fn duplicate_registration_keeps_the_first_manager() {
    let (registry, first) = timer_registry();
    let second = MockProvider::new(0, 100, 0);
    let err = registry
        .register("timer-mgr", vec![ResourceKind::new("other", second.clone())])
        .unwrap_err();
    assert_eq!(err, Error::DuplicateName);

    let mut remote = Remote::new(&registry, 1);
    remote.connect("timer-mgr");
    remote.request(0, &[]);
    assert_eq!(first.request_count(), 1);
    assert_eq!(second.request_count(), 0);
}

#[test]
fn unregister_waits_for_every_session() {
    let (registry, _provider) = timer_registry();
    let manager = registry.find("timer-mgr").unwrap();

    let mut a = Remote::new(&registry, 1);
    let mut b = Remote::new(&registry, 2);
    a.connect("timer-mgr");
    b.connect("timer-mgr");
    assert_eq!(manager.active_sessions(), 2);

    a.channel.remove();
    assert_eq!(registry.unregister(&manager), Err(Error::Busy));

    drop(b);
    registry.unregister(&manager).unwrap();

    // Gone for new connections.
    let mut c = Remote::new(&registry, 3);
    assert_eq!(c.connect("timer-mgr"), -ENOENT);
}

#[test]
fn only_one_concurrent_registration_wins() {
    let registry = Arc::new(Registry::new());
    let wins = AtomicUsize::new(0);

    std::thread::scope(|s| {
        for i in 0..8 {
            let registry = &registry;
            let wins = &wins;
            s.spawn(move || {
                let p = MockProvider::new(0, i, 0);
                match registry.register("shared", vec![ResourceKind::new("k", p)]) {
                    Ok(_) => {
                        wins.fetch_add(1, Ordering::Relaxed);
                    }
                    Err(e) => assert_eq!(e, Error::DuplicateName),
                }
            });
        }
    });

    assert_eq!(wins.load(Ordering::Relaxed), 1);
    assert_eq!(registry.names(), vec!["shared".to_string()]);
}

#[test]
fn unregister_never_races_a_connect() {
    let (registry, provider) = timer_registry();
    let manager = registry.find("timer-mgr").unwrap();

    std::thread::scope(|s| {
        let reg = &registry;
        s.spawn(move || {
            for addr in 0..200 {
                let mut remote = Remote::new(reg, addr);
                if remote.connect("timer-mgr") == 0 {
                    // A bound session always reaches a live manager.
                    assert_eq!(remote.request(0, &[]).status, 0);
                }
            }
        });
        s.spawn(|| {
            while registry.unregister(&manager).is_err() {
                std::thread::yield_now();
            }
        });
    });

    assert!(registry.is_empty());
    assert_eq!(manager.active_sessions(), 0);
    assert_eq!(provider.request_count(), provider.released().len());
}
