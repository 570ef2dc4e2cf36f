use super::{Transport, TransportEvent, TransportEvents, TransportFactory, TransportOptions};
use crate::types::constants::methods;
use crate::types::protocol::{ConnectRequest, PushEnvelope};
use crate::types::{CentrifugeError, Result};
use futures::future::BoxFuture;
use serde_json::{Value, json};
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};

enum Scripted {
    Accept(Value),
    Reject(u32, String),
    Close(String, bool),
}

#[derive(Default)]
struct MockInner {
    opens: usize,
    fail_opens: usize,
    connect_replies: VecDeque<Scripted>,
    replies: HashMap<u8, Value>,
    rejections: HashMap<u8, (u32, String)>,
    failures: HashMap<u8, CentrifugeError>,
    commands: Vec<(u8, Value)>,
    events: Option<TransportEvents>,
    closes: usize,
}

/// In-memory transport that records commands and lets tests inject pushes.
#[derive(Clone, Default)]
pub(crate) struct MockTransportFactory {
    inner: Arc<Mutex<MockInner>>,
}

impl MockTransportFactory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Result payload for the next handshake.
    pub fn script_connect(&self, result: Value) {
        let mut inner = self.inner.lock().unwrap();
        inner.connect_replies.push_back(Scripted::Accept(result));
    }

    pub fn reject_next_connect(&self, code: u32, message: &str) {
        let mut inner = self.inner.lock().unwrap();
        inner
            .connect_replies
            .push_back(Scripted::Reject(code, message.to_string()));
    }

    /// The next handshake is answered by the server closing the connection.
    pub fn close_during_next_connect(&self, reason: &str, reconnect: bool) {
        let mut inner = self.inner.lock().unwrap();
        inner
            .connect_replies
            .push_back(Scripted::Close(reason.to_string(), reconnect));
    }

    pub fn fail_next_opens(&self, count: usize) {
        self.inner.lock().unwrap().fail_opens = count;
    }

    pub fn reply_with(&self, method: u8, result: Value) {
        self.inner.lock().unwrap().replies.insert(method, result);
    }

    pub fn reject(&self, method: u8, code: u32, message: &str) {
        self.inner
            .lock()
            .unwrap()
            .rejections
            .insert(method, (code, message.to_string()));
    }

    /// The next command of `method` fails with `error` at the transport level.
    pub fn fail_next(&self, method: u8, error: CentrifugeError) {
        self.inner.lock().unwrap().failures.insert(method, error);
    }

    pub fn opens(&self) -> usize {
        self.inner.lock().unwrap().opens
    }

    pub fn closes(&self) -> usize {
        self.inner.lock().unwrap().closes
    }

    pub fn commands(&self, method: u8) -> Vec<Value> {
        self.inner
            .lock()
            .unwrap()
            .commands
            .iter()
            .filter(|(m, _)| *m == method)
            .map(|(_, params)| params.clone())
            .collect()
    }

    pub fn connect_requests(&self) -> Vec<ConnectRequest> {
        self.commands(methods::CONNECT)
            .into_iter()
            .map(|params| serde_json::from_value(params).unwrap())
            .collect()
    }

    fn emit(&self, event: TransportEvent) {
        let inner = self.inner.lock().unwrap();
        if let Some(events) = &inner.events {
            let _ = events.send(event);
        }
    }

    pub fn push(&self, push_type: u8, channel: &str, data: Value) {
        self.emit(TransportEvent::Push(PushEnvelope {
            push_type,
            channel: channel.to_string(),
            data,
        }));
    }

    /// Simulates the server going away.
    pub fn drop_connection(&self, reason: &str) {
        self.close_connection(reason, true);
    }

    pub fn error(&self, message: &str) {
        self.emit(TransportEvent::Error(message.to_string()));
    }

    pub fn close_connection(&self, reason: &str, reconnect: bool) {
        self.emit(TransportEvent::Closed {
            reason: reason.to_string(),
            reconnect,
        });
    }
}

struct MockTransport {
    inner: Arc<Mutex<MockInner>>,
}

impl Transport for MockTransport {
    fn send(&self, method: u8, params: Value) -> BoxFuture<'_, Result<Value>> {
        let outcome = {
            let mut inner = self.inner.lock().unwrap();
            inner.commands.push((method, params));
            if method == methods::CONNECT {
                let client = format!("client-{}", inner.opens);
                match inner.connect_replies.pop_front() {
                    Some(Scripted::Accept(mut result)) => {
                        if result.get("client").is_none() {
                            result["client"] = json!(client);
                        }
                        Ok(result)
                    }
                    Some(Scripted::Reject(code, message)) => {
                        Err(CentrifugeError::Server { code, message })
                    }
                    Some(Scripted::Close(reason, reconnect)) => {
                        if let Some(events) = &inner.events {
                            let _ = events.send(TransportEvent::Closed { reason, reconnect });
                        }
                        Err(CentrifugeError::Closed)
                    }
                    None => Ok(json!({ "client": client })),
                }
            } else if let Some(error) = inner.failures.remove(&method) {
                Err(error)
            } else if let Some((code, message)) = inner.rejections.get(&method) {
                Err(CentrifugeError::Server {
                    code: *code,
                    message: message.clone(),
                })
            } else {
                Ok(inner.replies.get(&method).cloned().unwrap_or(json!({})))
            }
        };
        Box::pin(async move { outcome })
    }

    fn close(&self) -> BoxFuture<'_, ()> {
        self.inner.lock().unwrap().closes += 1;
        Box::pin(async {})
    }
}

impl TransportFactory for MockTransportFactory {
    fn open<'a>(
        &'a self,
        _url: &'a str,
        _options: &'a TransportOptions,
        events: TransportEvents,
    ) -> BoxFuture<'a, Result<Arc<dyn Transport>>> {
        let outcome = {
            let mut inner = self.inner.lock().unwrap();
            inner.opens += 1;
            if inner.fail_opens > 0 {
                inner.fail_opens -= 1;
                Err(CentrifugeError::Connection("connection refused".to_string()))
            } else {
                inner.events = Some(events);
                Ok(Arc::new(MockTransport {
                    inner: Arc::clone(&self.inner),
                }) as Arc<dyn Transport>)
            }
        };
        Box::pin(async move { outcome })
    }
}
