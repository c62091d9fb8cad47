// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Test harness for end-to-end binary smoke tests.
//!
//! Runs the real `turnservicecli` binary as a subprocess against a local
//! credential issuer.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::process::{Output, Stdio};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use axum::http::StatusCode;
use axum::routing::post;
use axum::{Form, Router};
use tokio::net::TcpListener;
use tokio::process::{Child, Command};

/// Resolve the path to the compiled `turnservicecli` binary.
pub fn cli_binary() -> PathBuf {
    let manifest = Path::new(env!("CARGO_MANIFEST_DIR"));
    // tests/specs → tests → workspace root
    let workspace = manifest.parent().and_then(|p| p.parent()).unwrap_or(manifest);
    workspace.join("target").join("debug").join("turnservicecli")
}

/// A local issuer answering every request the same way.
pub struct Issuer {
    addr: SocketAddr,
    calls: Arc<AtomicU32>,
}

impl Issuer {
    /// Issue credentials with the given TTL, echoing the request nonce.
    pub async fn granting(ttl: u64) -> anyhow::Result<Self> {
        Self::spawn(Some(ttl)).await
    }

    /// Reject every request with 403.
    pub async fn forbidding() -> anyhow::Result<Self> {
        Self::spawn(None).await
    }

    async fn spawn(ttl: Option<u64>) -> anyhow::Result<Self> {
        let calls = Arc::new(AtomicU32::new(0));
        let app = Router::new().route(
            "/api/v1/turn/credentials",
            post({
                let calls = Arc::clone(&calls);
                move |Form(form): Form<HashMap<String, String>>| {
                    let calls = Arc::clone(&calls);
                    async move {
                        calls.fetch_add(1, Ordering::SeqCst);
                        let Some(ttl) = ttl else {
                            return (StatusCode::FORBIDDEN, "access denied".to_owned());
                        };
                        let body = serde_json::json!({
                            "success": true,
                            "nonce": form.get("nonce").cloned().unwrap_or_default(),
                            "turn": {
                                "ttl": ttl,
                                "username": "smoke-user",
                                "password": "smoke-pass",
                                "servers": [{ "id": "local", "urns": ["turn:127.0.0.1:3478"], "prio": 0 }],
                            },
                            "session": "smoke-session",
                        });
                        (StatusCode::OK, body.to_string())
                    }
                }
            }),
        );

        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;
        tokio::spawn(async move {
            axum::serve(listener, app).await.ok();
        });
        Ok(Self { addr, calls })
    }

    pub fn base_url(&self) -> String {
        format!("http://{}", self.addr)
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }

    /// Wait until the issuer has served at least `n` requests.
    pub async fn wait_for_calls(&self, n: u32, timeout: Duration) -> anyhow::Result<()> {
        let deadline = tokio::time::Instant::now() + timeout;
        while self.calls() < n {
            if tokio::time::Instant::now() > deadline {
                anyhow::bail!("issuer saw {} calls, wanted {n}", self.calls());
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        Ok(())
    }
}

fn command(args: &[&str]) -> anyhow::Result<Command> {
    let binary = cli_binary();
    anyhow::ensure!(binary.exists(), "turnservicecli binary not found at {}", binary.display());

    let mut cmd = Command::new(&binary);
    cmd.args(args)
        .args(["--log-format", "text", "--log-level", "warn"])
        .env_remove("TURNSERVICE_URI")
        .env_remove("TURNSERVICE_HMAC_SECRET")
        .kill_on_drop(true);
    Ok(cmd)
}

/// Run the binary to completion and capture its output.
pub async fn run_cli(args: &[&str], timeout: Duration) -> anyhow::Result<Output> {
    let mut cmd = command(args)?;
    cmd.stdout(Stdio::piped()).stderr(Stdio::piped());
    let output = tokio::time::timeout(timeout, cmd.output()).await??;
    Ok(output)
}

/// Start the binary in the background; it is killed on drop.
pub fn spawn_cli(args: &[&str]) -> anyhow::Result<Child> {
    let mut cmd = command(args)?;
    cmd.stdout(Stdio::null()).stderr(Stdio::null());
    Ok(cmd.spawn()?)
}
