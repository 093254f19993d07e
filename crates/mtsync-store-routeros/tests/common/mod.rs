//! A RouterOS API server good enough for session tests
//!
//! Speaks the wire protocol on a loopback port and keeps address lists and
//! static DNS records in memory.

#![allow(dead_code)]

use mtsync_core::config::RouterConfig;
use mtsync_store_routeros::proto::{read_sentence, write_sentence};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::net::{TcpListener, TcpStream};

pub const PASSWORD: &str = "test-password";

#[derive(Debug, Clone)]
struct Record {
    id: String,
    menu: String,
    fields: Vec<(String, String)>,
}

#[derive(Default)]
struct Shared {
    records: Mutex<Vec<Record>>,
    next_id: AtomicUsize,
    logins: AtomicUsize,
    commands: Mutex<Vec<String>>,
    /// Close the socket instead of answering the next command
    hang_up_next: AtomicBool,
    /// Accept the next command but never answer it
    stall_next: AtomicBool,
}

/// Handle to a running fake router
#[derive(Clone)]
pub struct FakeRouterOs {
    port: u16,
    shared: Arc<Shared>,
}

impl FakeRouterOs {
    pub async fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let shared = Arc::new(Shared::default());

        let server = shared.clone();
        tokio::spawn(async move {
            while let Ok((socket, _)) = listener.accept().await {
                tokio::spawn(serve(socket, server.clone()));
            }
        });

        Self { port, shared }
    }

    pub fn config(&self) -> RouterConfig {
        let mut config = RouterConfig::new(PASSWORD);
        config.host = "127.0.0.1".to_string();
        config.port = self.port;
        config.timeout_secs = 1;
        config
    }

    pub fn seed(&self, menu: &str, fields: &[(&str, &str)]) -> String {
        let id = format!("*{:X}", self.shared.next_id.fetch_add(1, Ordering::SeqCst) + 1);
        self.shared.records.lock().unwrap().push(Record {
            id: id.clone(),
            menu: menu.to_string(),
            fields: fields
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        });
        id
    }

    /// Values of `field` for every record in `menu`, sorted
    pub fn values(&self, menu: &str, field: &str) -> Vec<String> {
        let records = self.shared.records.lock().unwrap();
        let mut values: Vec<String> = records
            .iter()
            .filter(|r| r.menu == menu)
            .filter_map(|r| r.fields.iter().find(|(k, _)| k == field).map(|(_, v)| v.clone()))
            .collect();
        values.sort();
        values
    }

    pub fn logins(&self) -> usize {
        self.shared.logins.load(Ordering::SeqCst)
    }

    pub fn commands(&self) -> Vec<String> {
        self.shared.commands.lock().unwrap().clone()
    }

    pub fn hang_up_next(&self) {
        self.shared.hang_up_next.store(true, Ordering::SeqCst);
    }

    pub fn stall_next(&self) {
        self.shared.stall_next.store(true, Ordering::SeqCst);
    }
}

async fn serve(mut socket: TcpStream, shared: Arc<Shared>) {
    let mut logged_in = false;

    while let Ok(sentence) = read_sentence(&mut socket).await {
        let Some(command) = sentence.first().cloned() else {
            continue;
        };
        shared.commands.lock().unwrap().push(command.clone());

        if shared.hang_up_next.swap(false, Ordering::SeqCst) {
            return;
        }
        if shared.stall_next.swap(false, Ordering::SeqCst) {
            futures_pending().await;
        }

        let attrs: Vec<(String, String)> = sentence[1..]
            .iter()
            .filter_map(|w| w.strip_prefix('='))
            .filter_map(|w| w.split_once('='))
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        let queries: Vec<(String, String)> = sentence[1..]
            .iter()
            .filter_map(|w| w.strip_prefix('?'))
            .filter_map(|w| w.split_once('='))
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        let attr = |key: &str| {
            attrs
                .iter()
                .find(|(k, _)| k == key)
                .map(|(_, v)| v.clone())
                .unwrap_or_default()
        };

        let mut replies: Vec<Vec<String>> = Vec::new();

        if command == "/login" {
            if attr("password") == PASSWORD {
                logged_in = true;
                shared.logins.fetch_add(1, Ordering::SeqCst);
            } else {
                replies.push(vec!["!trap".into(), "=message=invalid user name or password (6)".into()]);
            }
        } else if !logged_in {
            replies.push(vec!["!fatal".into(), "not logged in".into()]);
            for reply in replies {
                let _ = write_sentence(&mut socket, reply.as_slice()).await;
            }
            return;
        } else if let Some((menu, action)) = command.rsplit_once('/') {
            match action {
                "print" => {
                    let records = shared.records.lock().unwrap().clone();
                    for record in records.iter().filter(|r| r.menu == menu) {
                        let matches = queries.iter().all(|(k, v)| {
                            record.fields.iter().any(|(fk, fv)| fk == k && fv == v)
                        });
                        if !matches {
                            continue;
                        }
                        let mut reply = vec!["!re".to_string(), format!("=.id={}", record.id)];
                        for (k, v) in &record.fields {
                            reply.push(format!("={}={}", k, v));
                        }
                        replies.push(reply);
                    }
                }
                "add" => {
                    let id = format!("*{:X}", shared.next_id.fetch_add(1, Ordering::SeqCst) + 1);
                    shared.records.lock().unwrap().push(Record {
                        id: id.clone(),
                        menu: menu.to_string(),
                        fields: attrs.clone(),
                    });
                    replies.push(vec!["!done".into(), format!("=ret={}", id)]);
                }
                "remove" => {
                    let id = attr(".id");
                    let mut records = shared.records.lock().unwrap();
                    let before = records.len();
                    records.retain(|r| !(r.menu == menu && r.id == id));
                    if records.len() == before {
                        replies.push(vec!["!trap".into(), "=message=no such item".into()]);
                    }
                }
                _ => replies.push(vec!["!trap".into(), "=message=no such command".into()]),
            }
        }

        if !replies.iter().any(|r| r[0] == "!done") {
            replies.push(vec!["!done".into()]);
        }
        for reply in replies {
            if write_sentence(&mut socket, reply.as_slice()).await.is_err() {
                return;
            }
        }
    }
}

async fn futures_pending() {
    std::future::pending::<()>().await
}
