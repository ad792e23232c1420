//! In-process Stratum v1 pool for tests.
//!
//! Accepts connections on a loopback port and answers subscribe/authorize
//! according to a [`MockPoolBehavior`], then does whatever
//! [`AfterAuthorize`] says.

use std::time::Duration;

use serde_json::{json, Value};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::tcp::OwnedWriteHalf;
use tokio::net::TcpListener;

#[derive(Debug, Clone)]
pub enum AfterAuthorize {
    /// Send one `mining.notify` with these coinbase fragments.
    Notify { coinbase1: String, coinbase2: String },
    /// Send nothing and keep the connection open.
    Silent,
    /// Close the connection.
    Disconnect,
}

#[derive(Debug, Clone)]
pub struct MockPoolBehavior {
    pub extranonce1: String,
    pub extranonce2_size: usize,
    pub authorize: bool,
    pub difficulty: Option<f64>,
    pub after_authorize: AfterAuthorize,
}

impl Default for MockPoolBehavior {
    fn default() -> Self {
        Self {
            extranonce1: "f000000f".to_string(),
            extranonce2_size: 4,
            authorize: true,
            difficulty: None,
            after_authorize: AfterAuthorize::Silent,
        }
    }
}

pub struct MockPool {
    pub port: u16,
}

impl MockPool {
    /// Bind to an ephemeral loopback port and serve every connection with
    /// the same behavior.
    pub async fn spawn(behavior: MockPoolBehavior) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        tokio::spawn(async move {
            while let Ok((socket, _)) = listener.accept().await {
                tokio::spawn(serve(socket, behavior.clone()));
            }
        });

        Self { port }
    }
}

async fn serve(socket: tokio::net::TcpStream, behavior: MockPoolBehavior) {
    let (read, mut write) = socket.into_split();
    let mut lines = BufReader::new(read).lines();

    while let Ok(Some(line)) = lines.next_line().await {
        let Ok(req) = serde_json::from_str::<Value>(&line) else {
            continue;
        };
        let id = req["id"].clone();

        match req["method"].as_str() {
            Some("mining.subscribe") => {
                let result = json!([
                    [["mining.notify", "deadbeef"]],
                    behavior.extranonce1,
                    behavior.extranonce2_size
                ]);
                send(&mut write, json!({"id": id, "result": result, "error": null})).await;
            }
            Some("mining.authorize") => {
                send(
                    &mut write,
                    json!({"id": id, "result": behavior.authorize, "error": null}),
                )
                .await;
                if !behavior.authorize {
                    continue;
                }
                if let Some(diff) = behavior.difficulty {
                    send(
                        &mut write,
                        json!({"id": null, "method": "mining.set_difficulty", "params": [diff]}),
                    )
                    .await;
                }
                match &behavior.after_authorize {
                    AfterAuthorize::Notify {
                        coinbase1,
                        coinbase2,
                    } => {
                        let params = json!([
                            "1",
                            "0000000000000000000000000000000000000000000000000000000000000000",
                            coinbase1,
                            coinbase2,
                            [],
                            "20000000",
                            "17023a04",
                            "685468d7",
                            true
                        ]);
                        send(
                            &mut write,
                            json!({"id": null, "method": "mining.notify", "params": params}),
                        )
                        .await;
                    }
                    AfterAuthorize::Silent => {}
                    AfterAuthorize::Disconnect => {
                        let _ = write.shutdown().await;
                        return;
                    }
                }
            }
            _ => {
                send(&mut write, json!({"id": id, "result": null, "error": [20, "Unknown method", null]})).await;
            }
        }
    }

    // Hold the socket briefly so the client observes replies before EOF.
    tokio::time::sleep(Duration::from_millis(50)).await;
}

async fn send(write: &mut OwnedWriteHalf, msg: Value) {
    let _ = write.write_all(format!("{}\n", msg).as_bytes()).await;
}
