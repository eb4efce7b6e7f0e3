//! Realtime change streams. Each watched table gets its own phoenix
//! channel over the shared websocket endpoint; parsed change frames are
//! funneled into one mpsc channel for the merge loop.

use std::time::Duration;

use futures::{SinkExt, StreamExt};
use serde_json::{Value, json};
use tokio::sync::mpsc::Sender;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message as WsMessage;

use crate::remote::{RemoteManager, Result};

const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(30);
const RECONNECT_DELAY: Duration = Duration::from_secs(5);

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Table {
    Users,
    Events,
}

impl Table {
    pub fn as_str(&self) -> &'static str {
        match self {
            Table::Users => "users",
            Table::Events => "events",
        }
    }

    fn topic(&self) -> String {
        format!("realtime:public:{}", self.as_str())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ChangeType {
    Insert,
    Update,
    Delete,
}

/// One row-level change as delivered on the wire. Deletes carry only the
/// old row; inserts only the new one.
#[derive(Clone, Debug)]
pub struct TableChange {
    pub table: Table,
    pub change: ChangeType,
    pub new_row: Option<Value>,
    pub old_row: Option<Value>,
}

impl RemoteManager {
    /// Spawns a background task streaming changes for one table into
    /// `sender`. The task reconnects on connection loss and exits once
    /// the receiving side is dropped.
    pub(crate) fn spawn_subscription(&self, table: Table, sender: Sender<TableChange>) {
        let manager = self.clone();
        tokio::spawn(async move {
            loop {
                if sender.is_closed() {
                    tracing::debug!(
                        target: "orbit::remote::subscriptions",
                        "Change receiver dropped, stopping {} stream",
                        table.as_str()
                    );
                    return;
                }
                if let Err(e) = run_subscription(&manager, table, &sender).await {
                    tracing::warn!(
                        target: "orbit::remote::subscriptions",
                        "{} stream failed: {}; reconnecting",
                        table.as_str(),
                        e
                    );
                }
                tokio::time::sleep(RECONNECT_DELAY).await;
            }
        });
    }
}

async fn run_subscription(
    manager: &RemoteManager,
    table: Table,
    sender: &Sender<TableChange>,
) -> Result<()> {
    let (mut stream, _response) = connect_async(manager.websocket_url()).await?;

    let join = json!({
        "topic": table.topic(),
        "event": "phx_join",
        "payload": {},
        "ref": "1",
    });
    stream.send(WsMessage::Text(join.to_string())).await?;
    tracing::debug!(
        target: "orbit::remote::subscriptions",
        "Joined {} channel",
        table.topic()
    );

    let mut heartbeat = tokio::time::interval(HEARTBEAT_INTERVAL);
    heartbeat.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    heartbeat.tick().await;

    loop {
        tokio::select! {
            _ = heartbeat.tick() => {
                let beat = json!({
                    "topic": "phoenix",
                    "event": "heartbeat",
                    "payload": {},
                    "ref": null,
                });
                stream.send(WsMessage::Text(beat.to_string())).await?;
            }
            frame = stream.next() => {
                let Some(frame) = frame else {
                    tracing::debug!(
                        target: "orbit::remote::subscriptions",
                        "{} stream closed by server",
                        table.as_str()
                    );
                    return Ok(());
                };
                match frame? {
                    WsMessage::Text(text) => {
                        if let Some(change) = parse_change_frame(table, &text)
                            && sender.send(change).await.is_err()
                        {
                            return Ok(());
                        }
                    }
                    WsMessage::Ping(payload) => {
                        stream.send(WsMessage::Pong(payload)).await?;
                    }
                    WsMessage::Close(_) => return Ok(()),
                    _ => {}
                }
            }
        }
    }
}

/// Extracts a row change from a phoenix frame. Control frames (joins,
/// replies, heartbeats) and frames for other topics return `None`.
fn parse_change_frame(table: Table, text: &str) -> Option<TableChange> {
    let frame: Value = serde_json::from_str(text).ok()?;
    if frame.get("topic")?.as_str()? != table.topic() {
        return None;
    }
    let change = match frame.get("event")?.as_str()? {
        "INSERT" => ChangeType::Insert,
        "UPDATE" => ChangeType::Update,
        "DELETE" => ChangeType::Delete,
        _ => return None,
    };
    let payload = frame.get("payload")?;
    Some(TableChange {
        table,
        change,
        new_row: payload.get("record").cloned(),
        old_row: payload.get("old_record").cloned(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parses_update_frame() {
        let text = r#"{
            "topic": "realtime:public:users",
            "event": "UPDATE",
            "payload": {
                "record": {"id": "u1", "status": "busy"},
                "old_record": {"id": "u1", "status": "online"}
            },
            "ref": null
        }"#;

        let change = parse_change_frame(Table::Users, text).expect("frame parses");
        assert_eq!(change.change, ChangeType::Update);
        assert_eq!(change.new_row.unwrap()["status"], "busy");
        assert_eq!(change.old_row.unwrap()["id"], "u1");
    }

    #[test]
    fn test_delete_frame_has_only_old_row() {
        let text = r#"{
            "topic": "realtime:public:events",
            "event": "DELETE",
            "payload": {"old_record": {"id": "e1"}},
            "ref": null
        }"#;

        let change = parse_change_frame(Table::Events, text).expect("frame parses");
        assert_eq!(change.change, ChangeType::Delete);
        assert!(change.new_row.is_none());
        assert_eq!(change.old_row.unwrap()["id"], "e1");
    }

    #[test]
    fn test_ignores_control_frames_and_other_topics() {
        let reply = r#"{
            "topic": "realtime:public:users",
            "event": "phx_reply",
            "payload": {"status": "ok"},
            "ref": "1"
        }"#;
        assert!(parse_change_frame(Table::Users, reply).is_none());

        let other_topic = r#"{
            "topic": "realtime:public:events",
            "event": "INSERT",
            "payload": {"record": {"id": "e1"}},
            "ref": null
        }"#;
        assert!(parse_change_frame(Table::Users, other_topic).is_none());

        assert!(parse_change_frame(Table::Users, "not json").is_none());
    }
}
