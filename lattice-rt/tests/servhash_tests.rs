//! End-to-end service-registration scenarios for the router service hash.
//!
//! A scripted upstream stands in for the broker: registrations can be told
//! to fail per name, and every upstream call is logged so the open-loop
//! unregister guarantee is observable.

#![allow(clippy::unwrap_used)]
#![allow(clippy::panic)]

use async_trait::async_trait;
use lattice_rt::message::Message;
use lattice_rt::servhash::{
    EntryState, ServhashError, ServiceHash, Upstream, UpstreamError,
};
use lattice_rt::util::errnum;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;

// ============================================================================
// Scripted upstream
// ============================================================================

#[derive(Default)]
struct ScriptedUpstream {
    fail_register: Mutex<HashMap<String, i32>>,
    fail_unregister: Mutex<HashMap<String, i32>>,
    log: Mutex<Vec<String>>,
}

impl ScriptedUpstream {
    fn log_snapshot(&self) -> Vec<String> {
        self.log.lock().clone()
    }
}

#[async_trait]
impl Upstream for ScriptedUpstream {
    async fn service_register(&self, name: &str) -> Result<(), UpstreamError> {
        self.log.lock().push(format!("register:{name}"));
        match self.fail_register.lock().get(name) {
            Some(e) => Err(UpstreamError::new(*e)),
            None => Ok(()),
        }
    }

    async fn service_unregister(&self, name: &str) -> Result<(), UpstreamError> {
        self.log.lock().push(format!("unregister:{name}"));
        match self.fail_unregister.lock().get(name) {
            Some(e) => Err(UpstreamError::new(*e)),
            None => Ok(()),
        }
    }
}

type Responses = Arc<Mutex<Vec<(String, String, i32)>>>;

fn fixture() -> (ServiceHash, Arc<ScriptedUpstream>, Responses) {
    let upstream = Arc::new(ScriptedUpstream::default());
    let hash = ServiceHash::new(Arc::clone(&upstream) as Arc<dyn Upstream>);
    let responses: Responses = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&responses);
    hash.set_respond(Arc::new(move |req, owner, errnum| {
        sink.lock()
            .push((req.topic.clone(), owner.to_string(), errnum));
    }));
    (hash, upstream, responses)
}

async fn settle() {
    for _ in 0..50 {
        tokio::task::yield_now().await;
    }
}

// ============================================================================
// Scenario: add/remove happy path
// ============================================================================

#[tokio::test]
async fn test_add_remove_happy_path() {
    let (hash, upstream, responses) = fixture();

    // add: upstream register succeeds, responder sees (req1, ownerA, 0),
    // entry becomes live.
    hash.add("svc", "ownerA", Message::request("service.add"))
        .unwrap();
    settle().await;
    assert_eq!(hash.entry_state("svc"), Some(EntryState::Live));
    assert_eq!(
        responses.lock().clone(),
        vec![("service.add".to_string(), "ownerA".to_string(), 0)]
    );

    // Requests for the service resolve to the owner while it is live.
    assert_eq!(
        hash.match_owner(&Message::request("svc.method")).unwrap(),
        "ownerA"
    );

    // remove: upstream unregister succeeds, responder sees (req2, ownerA, 0),
    // entry gone.
    hash.remove("svc", "ownerA", Message::request("service.remove"))
        .unwrap();
    settle().await;
    assert!(hash.is_empty());
    assert_eq!(
        responses.lock().clone(),
        vec![
            ("service.add".to_string(), "ownerA".to_string(), 0),
            ("service.remove".to_string(), "ownerA".to_string(), 0),
        ]
    );
    assert_eq!(
        upstream.log_snapshot(),
        vec!["register:svc", "unregister:svc"]
    );
}

#[tokio::test]
async fn test_add_forwards_upstream_errno_and_deletes() {
    let (hash, upstream, responses) = fixture();
    upstream
        .fail_register
        .lock()
        .insert("svc".into(), errnum::EEXIST);

    hash.add("svc", "ownerA", Message::request("service.add"))
        .unwrap();
    settle().await;

    assert!(hash.is_empty());
    assert_eq!(
        responses.lock().clone(),
        vec![(
            "service.add".to_string(),
            "ownerA".to_string(),
            errnum::EEXIST
        )]
    );
    // Nothing was registered, so nothing is unregistered.
    assert_eq!(upstream.log_snapshot(), vec!["register:svc"]);
}

#[tokio::test]
async fn test_remove_forwards_upstream_errno_and_deletes_anyway() {
    let (hash, upstream, responses) = fixture();
    upstream
        .fail_unregister
        .lock()
        .insert("svc".into(), errnum::ENOSYS);

    hash.add("svc", "ownerA", Message::request("service.add"))
        .unwrap();
    settle().await;
    hash.remove("svc", "ownerA", Message::request("service.remove"))
        .unwrap();
    settle().await;

    // Deletion is unconditional on remove completion.
    assert!(hash.is_empty());
    assert_eq!(
        responses.lock().last().cloned(),
        Some((
            "service.remove".to_string(),
            "ownerA".to_string(),
            errnum::ENOSYS
        ))
    );
}

#[tokio::test]
async fn test_duplicate_add_rejected_locally() {
    let (hash, _upstream, _responses) = fixture();
    hash.add("svc", "ownerA", Message::request("service.add"))
        .unwrap();
    assert_eq!(
        hash.add("svc", "ownerB", Message::request("service.add")),
        Err(ServhashError::Exists("svc".into()))
    );
}

// ============================================================================
// Scenario: disconnect sweep
// ============================================================================

#[tokio::test]
async fn test_disconnect_sweep_unregisters_open_loop() {
    let (hash, upstream, responses) = fixture();

    hash.add("s1", "owner", Message::request("service.add.1"))
        .unwrap();
    hash.add("s2", "owner", Message::request("service.add.2"))
        .unwrap();
    settle().await;
    assert_eq!(hash.entry_state("s1"), Some(EntryState::Live));
    assert_eq!(hash.entry_state("s2"), Some(EntryState::Live));
    responses.lock().clear();

    hash.disconnect("owner");
    settle().await;

    // Both entries destroyed; each issued an open-loop upstream
    // unregister; no responses were sent to the retained requests.
    assert!(hash.is_empty());
    let log = upstream.log_snapshot();
    assert!(log.contains(&"unregister:s1".to_string()));
    assert!(log.contains(&"unregister:s2".to_string()));
    assert!(responses.lock().is_empty());
}

#[tokio::test]
async fn test_disconnect_ignores_other_owners() {
    let (hash, _upstream, _responses) = fixture();
    hash.add("mine", "me", Message::request("service.add"))
        .unwrap();
    hash.add("yours", "you", Message::request("service.add"))
        .unwrap();
    settle().await;

    hash.disconnect("nobody");
    assert_eq!(hash.len(), 2);

    hash.disconnect("me");
    settle().await;
    assert_eq!(hash.len(), 1);
    assert!(hash.entry_state("yours").is_some());
}

// ============================================================================
// Router shutdown
// ============================================================================

#[tokio::test]
async fn test_destroy_unwinds_live_registrations() {
    let (hash, upstream, _responses) = fixture();
    hash.add("s1", "a", Message::request("service.add"))
        .unwrap();
    hash.add("s2", "b", Message::request("service.add"))
        .unwrap();
    settle().await;

    hash.destroy();
    settle().await;

    assert!(hash.is_empty());
    let log = upstream.log_snapshot();
    assert!(log.contains(&"unregister:s1".to_string()));
    assert!(log.contains(&"unregister:s2".to_string()));
}

#[tokio::test]
async fn test_open_loop_unregister_failure_is_discarded() {
    let (hash, upstream, responses) = fixture();
    upstream
        .fail_unregister
        .lock()
        .insert("svc".into(), errnum::ENOSYS);

    hash.add("svc", "owner", Message::request("service.add"))
        .unwrap();
    settle().await;
    responses.lock().clear();

    // Disconnect-driven cleanup is best-effort: the failing unregister is
    // discarded and never surfaces to a client.
    hash.disconnect("owner");
    settle().await;
    assert!(hash.is_empty());
    assert!(responses.lock().is_empty());
}
