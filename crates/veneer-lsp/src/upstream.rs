// Dweve Veneer - Surface Syntax Language Bridge
//
// Copyright (c) 2025 Dweve IP B.V. and individual contributors.
//
// SPDX-License-Identifier: Apache-2.0
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License in the LICENSE file at the
// root of this repository or at: http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! JSON-RPC client for one analysis tool session.
//!
//! The channel is a single multiplexed stream. A writer task serializes
//! outgoing frames; a reader task routes responses to the waiting request by
//! id, so overlapping requests complete in whatever order the tool answers.
//! Requests the tool sends to us are answered inline with neutral results.

use crate::error::{BridgeError, BridgeResult};
use crate::protocol::{read_message, write_message, JsonRpcRequest, JsonRpcResponse, Message};
use dashmap::DashMap;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite, BufReader};
use tokio::sync::{mpsc, oneshot, watch};
use tracing::{debug, trace, warn};

/// A notification sent by the analysis tool.
#[derive(Debug, Clone, PartialEq)]
pub struct Notification {
    pub method: String,
    pub params: Value,
}

type Pending = Arc<DashMap<i64, oneshot::Sender<JsonRpcResponse>>>;

/// Client half of a connection to the analysis tool.
pub struct UpstreamClient {
    outgoing: mpsc::UnboundedSender<Message>,
    pending: Pending,
    next_id: AtomicI64,
    closed: watch::Receiver<bool>,
    request_timeout: Duration,
}

impl UpstreamClient {
    /// Start reader and writer tasks over the given streams.
    pub fn connect<R, W>(
        reader: R,
        writer: W,
        request_timeout: Duration,
    ) -> (Self, mpsc::UnboundedReceiver<Notification>)
    where
        R: AsyncRead + Send + Unpin + 'static,
        W: AsyncWrite + Send + Unpin + 'static,
    {
        let (outgoing_tx, outgoing_rx) = mpsc::unbounded_channel();
        let (notify_tx, notify_rx) = mpsc::unbounded_channel();
        let (closed_tx, closed_rx) = watch::channel(false);
        let pending: Pending = Arc::new(DashMap::new());

        tokio::spawn(write_loop(writer, outgoing_rx));
        tokio::spawn(read_loop(
            reader,
            Arc::clone(&pending),
            outgoing_tx.clone(),
            notify_tx,
            closed_tx,
        ));

        let client = Self {
            outgoing: outgoing_tx,
            pending,
            next_id: AtomicI64::new(1),
            closed: closed_rx,
            request_timeout,
        };
        (client, notify_rx)
    }

    /// Send a request and wait for its response.
    ///
    /// Dropping the returned future cancels the request: the pending slot is
    /// released and `$/cancelRequest` is sent, so a late response is discarded.
    pub async fn request(&self, method: &str, params: Value) -> BridgeResult<Value> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = oneshot::channel();
        self.pending.insert(id, tx);

        let mut guard = CancelGuard {
            id,
            pending: Arc::clone(&self.pending),
            outgoing: self.outgoing.clone(),
            armed: true,
        };
        // The reader clears pending slots after flagging closed; re-check so
        // a slot inserted after that clear is not left waiting.
        if self.is_closed() {
            guard.armed = false;
            self.pending.remove(&id);
            return Err(BridgeError::SubprocessCrashed(format!(
                "connection closed before '{}'",
                method
            )));
        }

        trace!("-> {} #{}", method, id);
        if self
            .outgoing
            .send(Message::Request(JsonRpcRequest::request(id, method, params)))
            .is_err()
        {
            guard.armed = false;
            self.pending.remove(&id);
            return Err(BridgeError::SubprocessCrashed(format!(
                "writer stopped before '{}'",
                method
            )));
        }

        match tokio::time::timeout(self.request_timeout, rx).await {
            Ok(Ok(response)) => {
                guard.armed = false;
                trace!("<- {} #{}", method, id);
                response.into_result()
            }
            Ok(Err(_)) => {
                guard.armed = false;
                Err(BridgeError::SubprocessCrashed(format!(
                    "connection closed while waiting for '{}'",
                    method
                )))
            }
            Err(_) => {
                warn!("Request '{}' #{} timed out", method, id);
                Err(BridgeError::Timeout {
                    method: method.to_string(),
                    seconds: self.request_timeout.as_secs(),
                })
            }
        }
    }

    /// Send a notification.
    pub fn notify(&self, method: &str, params: Value) -> BridgeResult<()> {
        trace!("-> {} (notification)", method);
        self.outgoing
            .send(Message::Request(JsonRpcRequest::notification(method, params)))
            .map_err(|_| {
                BridgeError::SubprocessCrashed(format!("writer stopped before '{}'", method))
            })
    }

    pub fn is_closed(&self) -> bool {
        *self.closed.borrow()
    }

    /// Wait until the connection closes.
    pub async fn closed(&self) {
        let mut closed = self.closed.clone();
        // Sender dropped also means closed.
        let _ = closed.wait_for(|c| *c).await;
    }

    /// Requests still waiting for a response.
    pub fn pending_requests(&self) -> usize {
        self.pending.len()
    }
}

/// Releases a pending slot and cancels the remote request on drop.
struct CancelGuard {
    id: i64,
    pending: Pending,
    outgoing: mpsc::UnboundedSender<Message>,
    armed: bool,
}

impl Drop for CancelGuard {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        if self.pending.remove(&self.id).is_some() {
            debug!("Cancelling request #{}", self.id);
            let _ = self.outgoing.send(Message::Request(JsonRpcRequest::notification(
                "$/cancelRequest",
                json!({ "id": self.id }),
            )));
        }
    }
}

async fn write_loop<W>(mut writer: W, mut outgoing: mpsc::UnboundedReceiver<Message>)
where
    W: AsyncWrite + Unpin,
{
    while let Some(message) = outgoing.recv().await {
        if let Err(e) = write_message(&mut writer, &message).await {
            warn!("Failed to write to analysis tool: {}", e);
            break;
        }
    }
    debug!("Analysis tool writer stopped");
}

async fn read_loop<R>(
    reader: R,
    pending: Pending,
    outgoing: mpsc::UnboundedSender<Message>,
    notifications: mpsc::UnboundedSender<Notification>,
    closed: watch::Sender<bool>,
) where
    R: AsyncRead + Unpin,
{
    let mut reader = BufReader::new(reader);
    loop {
        match read_message(&mut reader).await {
            Ok(Some(Message::Response(response))) => {
                let id = response.id.as_ref().and_then(Value::as_i64);
                match id.and_then(|id| pending.remove(&id)) {
                    Some((_, waiter)) => {
                        let _ = waiter.send(response);
                    }
                    None => debug!("Discarding response for unknown or cancelled id {:?}", id),
                }
            }
            Ok(Some(Message::Request(request))) if request.is_notification() => {
                let notification = Notification {
                    method: request.method,
                    params: request.params.unwrap_or(Value::Null),
                };
                if notifications.send(notification).is_err() {
                    trace!("Notification receiver dropped");
                }
            }
            Ok(Some(Message::Request(request))) => {
                let result = reply_to_server_request(&request);
                let _ = outgoing.send(Message::Response(JsonRpcResponse::success(
                    request.id.clone(),
                    result,
                )));
            }
            Ok(None) => {
                debug!("Analysis tool closed its output");
                break;
            }
            Err(e) => {
                warn!("Failed to read from analysis tool: {}", e);
                break;
            }
        }
    }

    let _ = closed.send(true);
    // Dropping the waiters fails every in-flight request.
    pending.clear();
}

/// Neutral answers to requests the analysis tool sends to its client.
fn reply_to_server_request(request: &JsonRpcRequest) -> Value {
    match request.method.as_str() {
        "workspace/configuration" => {
            let items = request
                .params
                .as_ref()
                .and_then(|p| p.get("items"))
                .and_then(Value::as_array)
                .map_or(0, Vec::len);
            Value::Array(vec![Value::Null; items])
        }
        "workspace/workspaceFolders" => Value::Array(Vec::new()),
        method => {
            trace!("Acknowledging server request '{}'", method);
            Value::Null
        }
    }
}
