//! End-to-end protocol behaviour through `ResmgrChannel`.

use std::io::Read;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use rpmsg_resmgr::diagnostics::{self, ReportReader};
use rpmsg_resmgr::error::{EINVAL, ENOENT, ENOTCONN, ERANGE};
use rpmsg_resmgr::provider::ResourceKind;
use rpmsg_resmgr::rpc::codec::{self, Action};
use rpmsg_resmgr::{ChannelState, ProviderError, Registry};

use crate::mock_provider::{MockProvider, ProviderCall, Remote, TIMER_BASE, timer_registry};

#[test]
fn session_local_id_replaces_provider_handle() {
    let (registry, provider) = timer_registry();
    let mut remote = Remote::new(&registry, 1024);
    assert_eq!(remote.connect("timer-mgr"), 0);

    let ack = remote.request(0, &[]);
    assert_eq!(ack.action, Action::Request.tag());
    assert_eq!(ack.status, 0);
    assert_eq!(ack.grant, Some((1, TIMER_BASE)), "id 1, not provider handle 7");

    remote.release(1);
    assert_eq!(provider.released(), vec![7]);

    // Second release: NotFound locally, no ack, no provider call.
    remote.release(1);
    assert_eq!(provider.released(), vec![7]);
    assert_eq!(provider.calls().len(), 2);
}

#[test]
fn unknown_manager_acks_error_and_allows_retry() {
    let (registry, _provider) = timer_registry();
    let mut remote = Remote::new(&registry, 1024);

    assert_eq!(remote.connect("clock-mgr"), -ENOENT);
    assert_eq!(remote.channel.state(), ChannelState::Unconnected);
    assert_eq!(remote.connect("timer-mgr"), 0);
    assert_eq!(remote.channel.state(), ChannelState::Connected);
}

#[test]
fn second_connect_is_rejected() {
    let (registry, _provider) = timer_registry();
    let mut remote = Remote::new(&registry, 1024);
    assert_eq!(remote.connect("timer-mgr"), 0);
    assert_eq!(remote.connect("timer-mgr"), -EINVAL);
    assert_eq!(registry.find("timer-mgr").unwrap().active_sessions(), 1);
}

#[test]
fn request_before_connect_is_not_connected() {
    let (registry, provider) = timer_registry();
    let mut remote = Remote::new(&registry, 1024);

    let ack = remote.request(0, &[]);
    assert_eq!(ack.status, -ENOTCONN);
    assert_eq!(ack.grant, None, "header-only reply");
    assert!(ack.reply.is_empty());
    remote.release(1);
    assert!(provider.calls().is_empty());
}

#[test]
fn foreign_source_is_rejected_without_state_change() {
    let (registry, provider) = timer_registry();
    let mut remote = Remote::new(&registry, 1024);
    remote.connect("timer-mgr");
    remote.request(0, &[]);

    let acks = remote.send_raw_from(2048, &codec::encode_request(0, &[]).unwrap());
    assert_eq!(acks.len(), 1);
    assert_eq!((acks[0].status, acks[0].grant), (-ENOTCONN, None));

    // Malformed and unknown frames from the stranger: still ENOTCONN.
    let acks = remote.send_raw_from(2048, &[1, 0, 0, 0, 0]);
    assert_eq!((acks[0].action, acks[0].status), (1, -ENOTCONN));
    let acks = remote.send_raw_from(2048, &[7, 0, 0, 0]);
    assert_eq!((acks[0].action, acks[0].status), (7, -ENOTCONN));

    let acks = remote.send_raw_from(2048, &codec::encode_release(1).unwrap());
    assert!(acks.is_empty());

    assert_eq!(provider.request_count(), 1);
    assert!(provider.released().is_empty());
    assert_eq!(remote.channel.session().unwrap().ids(), vec![1]);
}

#[test]
fn kind_index_out_of_range() {
    let (registry, provider) = timer_registry();
    let mut remote = Remote::new(&registry, 1024);
    remote.connect("timer-mgr");

    let ack = remote.request(3, &[]);
    assert_eq!(ack.status, -ERANGE);
    assert!(ack.reply.is_empty());
    assert!(provider.calls().is_empty());
}

#[test]
fn wrong_argument_length_never_reaches_provider() {
    let registry = Arc::new(Registry::new());
    let provider = MockProvider::new(8, 1, 0);
    registry
        .register("args-mgr", vec![ResourceKind::new("fixed8", provider.clone())])
        .unwrap();
    let mut remote = Remote::new(&registry, 5);
    remote.connect("args-mgr");

    for len in [0usize, 4, 7, 9, 128] {
        let ack = remote.request(0, &vec![0u8; len]);
        assert_eq!(ack.status, -EINVAL, "length {len}");
    }
    assert_eq!(provider.request_count(), 0);

    let ack = remote.request(0, &[1, 2, 3, 4, 5, 6, 7, 8]);
    assert_eq!(ack.status, 0);
    assert_eq!(ack.reply, vec![0xA5, 2, 3, 4, 5, 6, 7, 8], "provider-filled reply");
    assert_eq!(
        provider.calls(),
        vec![ProviderCall::Request {
            args: vec![1, 2, 3, 4, 5, 6, 7, 8]
        }]
    );
}

#[test]
fn oversized_request_is_invalid_argument() {
    let (registry, provider) = timer_registry();
    let mut remote = Remote::new(&registry, 1024);
    remote.connect("timer-mgr");

    let mut frame = Vec::from(&codec::encode_request(0, &[]).unwrap()[..]);
    frame.extend_from_slice(&[0u8; 129]);
    let acks = remote.send_raw(&frame);
    assert_eq!(acks.len(), 1);
    assert_eq!(acks[0].status, -EINVAL);
    assert!(provider.calls().is_empty());
}

#[test]
fn provider_errors_pass_through_verbatim() {
    let (registry, provider) = timer_registry();
    let mut remote = Remote::new(&registry, 1024);
    remote.connect("timer-mgr");

    provider.fail_next_request(ProviderError::from_errno(-11));
    let ack = remote.request(0, &[]);
    assert_eq!(ack.status, -11);
    assert!(remote.channel.session().unwrap().is_empty());

    let ack = remote.request(0, &[]);
    assert_eq!(ack.grant, Some((1, TIMER_BASE)));
}

#[test]
fn unknown_action_and_short_frames() {
    let (registry, _provider) = timer_registry();
    let mut remote = Remote::new(&registry, 1024);
    remote.connect("timer-mgr");

    let acks = remote.send_raw(&[7, 0, 0, 0, 1, 2, 3, 4]);
    assert_eq!(acks.len(), 1);
    assert_eq!((acks[0].action, acks[0].status, acks[0].grant), (7, -EINVAL, None));

    assert!(remote.send_raw(&[]).is_empty());
    assert!(remote.send_raw(&[1, 0, 0]).is_empty());
}

#[test]
fn teardown_releases_in_reverse_order() {
    let (registry, provider) = timer_registry();
    let mut remote = Remote::new(&registry, 1024);
    remote.connect("timer-mgr");
    for expected in 1..=3 {
        assert_eq!(remote.request(0, &[]).grant, Some((expected, TIMER_BASE)));
    }

    assert_eq!(remote.channel.remove(), 0);
    assert_eq!(provider.released(), vec![9, 8, 7]);
    assert_eq!(remote.channel.state(), ChannelState::Closed);

    // Anything after removal is dropped.
    assert!(remote.send_raw(&codec::encode_request(0, &[]).unwrap()).is_empty());
    assert_eq!(provider.request_count(), 3);
}

#[test]
fn stuck_release_is_kept_then_skipped_at_teardown() {
    let (registry, provider) = timer_registry();
    let mut remote = Remote::new(&registry, 1024);
    remote.connect("timer-mgr");
    remote.request(0, &[]);
    remote.request(0, &[]);

    provider.set_release_failure(Some(ProviderError::BUSY));
    remote.release(1);
    assert_eq!(remote.channel.session().unwrap().ids(), vec![1, 2]);

    // Teardown keeps going past failures and still unbinds the manager.
    assert_eq!(remote.channel.remove(), 2);
    assert_eq!(provider.released(), vec![7, 8, 7]);
    let manager = registry.find("timer-mgr").unwrap();
    assert_eq!(manager.active_sessions(), 0);
    registry.unregister(&manager).unwrap();
}

#[test]
fn failing_transport_does_not_lose_state() {
    let (registry, _provider) = timer_registry();
    let mut remote = Remote::new(&registry, 1024);
    remote.connect("timer-mgr");

    remote.outbox.set_failing(true);
    remote.channel.on_message(1024, &codec::encode_request(0, &[]).unwrap());
    assert!(remote.outbox.is_empty());
    assert_eq!(remote.channel.session().unwrap().ids(), vec![1]);

    remote.outbox.set_failing(false);
    assert_eq!(remote.request(0, &[]).grant, Some((2, TIMER_BASE)));
}

#[test]
fn concurrent_sessions_get_independent_ids() {
    let (registry, provider) = timer_registry();

    let results: Vec<(u32, u32)> = std::thread::scope(|s| {
        let handles: Vec<_> = [1024u32, 1025]
            .into_iter()
            .map(|addr| {
                let registry = &registry;
                s.spawn(move || {
                    let mut remote = Remote::new(registry, addr);
                    assert_eq!(remote.connect("timer-mgr"), 0);
                    let ack = remote.request(0, &[]);
                    let handle: u32 = remote
                        .channel
                        .session()
                        .unwrap()
                        .describe_to_string()
                        .lines()
                        .find_map(|l| l.strip_prefix("Handle:").map(str::to_owned))
                        .unwrap()
                        .parse()
                        .unwrap();
                    (ack.grant.unwrap().0, handle)
                })
            })
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    });

    // Both sessions see id 1; the provider handed out distinct handles.
    assert_eq!(results[0].0, 1);
    assert_eq!(results[1].0, 1);
    assert_ne!(results[0].1, results[1].1);
    assert_eq!(provider.request_count(), 2);
    assert_eq!(provider.released().len(), 2, "remotes dropped at thread end");
}

#[test]
fn diagnostics_read_alongside_dispatch() {
    let (registry, provider) = timer_registry();
    let mut remote = Remote::new(&registry, 1024);
    assert_eq!(remote.connect("timer-mgr"), 0);
    let session = Arc::clone(remote.channel.session().unwrap());
    let done = AtomicBool::new(false);

    let reports = std::thread::scope(|s| {
        let reader = s.spawn(|| {
            let mut reader = ReportReader::new(Arc::clone(&session));
            let mut reports = 0usize;
            loop {
                let finished = done.load(Ordering::Acquire);
                reader.rewind();
                let mut text = String::new();
                reader.read_to_string(&mut text).unwrap();
                assert!(
                    text.starts_with("Resource list for remote endpoint 1024:\n"),
                    "report without header: {text:?}"
                );
                reports += 1;
                if finished {
                    break reports;
                }
            }
        });

        for round in 0..200u32 {
            let ack = remote.request(0, &[]);
            assert_eq!(ack.status, 0);
            if round % 2 == 1 {
                remote.release(ack.grant.unwrap().0);
            }
        }
        done.store(true, Ordering::Release);
        reader.join().unwrap()
    });

    assert!(reports >= 1);
    assert_eq!(provider.request_count(), 200);
    assert_eq!(session.len(), 100);
    let report = diagnostics::render(&session);
    assert_eq!(report.matches("Resource Name:gptimer").count(), 100);
}

trait DescribeExt {
    fn describe_to_string(&self) -> String;
}

impl DescribeExt for rpmsg_resmgr::Session {
    fn describe_to_string(&self) -> String {
        let mut text = String::new();
        self.describe(&mut text).unwrap();
        text
    }
}
