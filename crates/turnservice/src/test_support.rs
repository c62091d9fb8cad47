// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shared test infrastructure: credential builders, a scripted fetcher, and a
//! mock issuer served over real HTTP.

use std::collections::{HashMap, VecDeque};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use axum::http::{HeaderMap, StatusCode};
use axum::routing::post;
use axum::{Form, Router};
use parking_lot::Mutex;
use tokio::net::TcpListener;

use crate::credential::fetch::{FetchFuture, Fetcher, CREDENTIALS_PATH};
use crate::credential::{CredentialSet, Identity, ServerGroup};
use crate::error::Error;

/// Build a credential set with one relay group.
pub fn credential_set(username: &str, ttl: u64) -> CredentialSet {
    CredentialSet {
        ttl,
        username: username.to_owned(),
        password: format!("{username}-pw"),
        servers: vec![ServerGroup {
            id: "default".to_owned(),
            urns: vec!["turn:turn.example.com:3478?transport=udp".to_owned()],
            prio: 0,
        }],
        geo_uri: None,
        session: None,
    }
}

/// Fetcher that replays scripted results and counts invocations.
///
/// When the script runs dry the last result repeats.
pub struct MockFetcher {
    script: Mutex<VecDeque<Result<CredentialSet, Error>>>,
    last: Mutex<Option<Result<CredentialSet, Error>>>,
    calls: AtomicU32,
    delay: Duration,
    identities: Mutex<Vec<Identity>>,
}

impl MockFetcher {
    pub fn new(script: Vec<Result<CredentialSet, Error>>) -> Arc<Self> {
        Self::with_delay(script, Duration::ZERO)
    }

    /// Each fetch sleeps for `delay` before answering.
    pub fn with_delay(script: Vec<Result<CredentialSet, Error>>, delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            script: Mutex::new(script.into()),
            last: Mutex::new(None),
            calls: AtomicU32::new(0),
            delay,
            identities: Mutex::new(Vec::new()),
        })
    }

    /// Always succeed with a fresh set of the given TTL.
    pub fn succeeding(ttl: u64) -> Arc<Self> {
        Self::new(vec![Ok(credential_set("user", ttl))])
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }

    /// Identities presented on each fetch, in order.
    pub fn identities(&self) -> Vec<Identity> {
        self.identities.lock().clone()
    }

    fn next(&self) -> Result<CredentialSet, Error> {
        let mut script = self.script.lock();
        let mut last = self.last.lock();
        if let Some(next) = script.pop_front() {
            *last = Some(next);
        }
        last.clone().unwrap_or(Err(Error::Transport("mock fetcher has no script".into())))
    }
}

impl Fetcher for MockFetcher {
    fn fetch<'a>(&'a self, identity: &'a Identity) -> FetchFuture<'a> {
        Box::pin(async move {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.identities.lock().push(identity.clone());
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            self.next()
        })
    }
}

/// How the mock issuer answers one request.
#[derive(Debug, Clone)]
pub enum IssuerReply {
    /// `success=true`, echoed nonce, username `user-<n>` for the n-th call.
    Success { ttl: u64, session: Option<String> },
    /// `success=false` with the correct nonce.
    Unsuccessful,
    /// `success=true` with a nonce the client never sent.
    WrongNonce,
    /// Raw status and body.
    Status { code: u16, body: String },
}

/// A request observed by the mock issuer.
#[derive(Debug, Clone)]
pub struct SeenRequest {
    pub nonce: String,
    pub client_id: String,
    pub authorization: String,
}

/// A running mock issuer bound to an ephemeral local port.
pub struct MockIssuer {
    pub addr: SocketAddr,
    pub calls: Arc<AtomicU32>,
    requests: Arc<Mutex<Vec<SeenRequest>>>,
}

impl MockIssuer {
    pub fn base_url(&self) -> String {
        format!("http://{}", self.addr)
    }

    pub fn last_request(&self) -> Option<SeenRequest> {
        self.requests.lock().last().cloned()
    }
}

/// Start a mock TURN credential issuer answering with `replies` in order,
/// repeating the last one.
pub async fn mock_issuer(replies: Vec<IssuerReply>) -> MockIssuer {
    let calls = Arc::new(AtomicU32::new(0));
    let requests = Arc::new(Mutex::new(Vec::new()));
    let replies = Arc::new(replies);

    let app = Router::new().route(
        CREDENTIALS_PATH,
        post({
            let calls = Arc::clone(&calls);
            let requests = Arc::clone(&requests);
            move |headers: HeaderMap, Form(form): Form<HashMap<String, String>>| {
                let calls = Arc::clone(&calls);
                let requests = Arc::clone(&requests);
                let replies = Arc::clone(&replies);
                async move {
                    let idx = calls.fetch_add(1, Ordering::SeqCst) as usize;
                    let nonce = form.get("nonce").cloned().unwrap_or_default();
                    requests.lock().push(SeenRequest {
                        nonce: nonce.clone(),
                        client_id: form.get("client_id").cloned().unwrap_or_default(),
                        authorization: headers
                            .get(axum::http::header::AUTHORIZATION)
                            .and_then(|v| v.to_str().ok())
                            .unwrap_or_default()
                            .to_owned(),
                    });
                    let reply = replies.get(idx).or_else(|| replies.last()).cloned();
                    render_reply(reply, &nonce, idx + 1)
                }
            }
        }),
    );

    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("local addr");
    tokio::spawn(async move {
        axum::serve(listener, app).await.ok();
    });

    MockIssuer { addr, calls, requests }
}

fn render_reply(reply: Option<IssuerReply>, nonce: &str, n: usize) -> (StatusCode, String) {
    let turn = |ttl: u64| {
        serde_json::json!({
            "ttl": ttl,
            "username": format!("user-{n}"),
            "password": format!("pw-{n}"),
            "servers": [{ "id": "eu", "urns": ["turn:eu.example.com:443?transport=tcp"], "prio": 1 }],
        })
    };
    match reply {
        Some(IssuerReply::Success { ttl, session }) => {
            let body = serde_json::json!({
                "success": true,
                "nonce": nonce,
                "turn": turn(ttl),
                "session": session,
            });
            (StatusCode::OK, body.to_string())
        }
        Some(IssuerReply::Unsuccessful) => {
            let body = serde_json::json!({ "success": false, "nonce": nonce });
            (StatusCode::OK, body.to_string())
        }
        Some(IssuerReply::WrongNonce) => {
            let body = serde_json::json!({ "success": true, "nonce": "replayed", "turn": turn(60) });
            (StatusCode::OK, body.to_string())
        }
        Some(IssuerReply::Status { code, body }) => {
            (StatusCode::from_u16(code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR), body)
        }
        None => (StatusCode::INTERNAL_SERVER_ERROR, "{}".to_owned()),
    }
}

/// Assert that an expression returns `Err` whose message contains a substring.
#[macro_export]
macro_rules! assert_err_contains {
    ($expr:expr, $substr:expr) => {{
        let result = $expr;
        let err = result.expect_err(concat!("expected Err for: ", stringify!($expr)));
        let msg = err.to_string();
        assert!(msg.contains($substr), "expected error containing {:?}, got: {msg:?}", $substr);
    }};
}
