//! Engine events.
//!
//! Every mutating operation emits events after all state mutation and before
//! returning. Events are buffered in the engine and drainable by the caller;
//! an optional [`EventSink`] additionally receives each event as it is
//! emitted (best-effort: sink errors are logged, never fail the operation).

use crate::{AccountId, Bps, ItemId, PositionId, PositionState, TokenRef, Units, Value};
use serde::{Deserialize, Serialize};
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum MarketEvent {
    ItemCreated {
        item_id: ItemId,
        token: TokenRef,
        creator: AccountId,
    },
    PositionUpdate {
        position_id: PositionId,
        item_id: ItemId,
        owner: AccountId,
        amount: Units,
        price: Value,
        fee_snapshot: Bps,
        state: PositionState,
    },
    PositionDelete {
        position_id: PositionId,
    },
    MarketItemSold {
        item_id: ItemId,
        token: TokenRef,
        seller: AccountId,
        buyer: AccountId,
        price: Value,
        amount: Units,
    },
    MarketFeeChanged {
        prev: Bps,
        new: Bps,
    },
    RoyaltiesPaid {
        token: TokenRef,
        value: Value,
    },
}

/// Receiver for emitted events.
///
/// Implementations MUST be bounded on the hot path; errors are best-effort
/// (logged by the engine, never propagated to the caller).
pub trait EventSink {
    fn publish(&mut self, event: &MarketEvent) -> std::io::Result<()>;
}

/// Append-only JSONL event log. One JSON-encoded event per line.
#[derive(Debug)]
pub struct FileEventSink {
    path: PathBuf,
}

impl FileEventSink {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }
}

impl EventSink for FileEventSink {
    fn publish(&mut self, event: &MarketEvent) -> std::io::Result<()> {
        let line = serde_json::to_string(event)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        writeln!(file, "{line}")
    }
}

/// Sink that keeps events in memory; useful for assertions in tests.
#[derive(Debug, Default)]
pub struct VecEventSink {
    pub events: Vec<MarketEvent>,
}

impl EventSink for VecEventSink {
    fn publish(&mut self, event: &MarketEvent) -> std::io::Result<()> {
        self.events.push(event.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ContractId;

    #[test]
    fn events_serialize_with_tag() {
        let ev = MarketEvent::PositionDelete {
            position_id: PositionId(4),
        };
        let json = serde_json::to_string(&ev).unwrap();
        assert!(json.contains("\"event\":\"position_delete\""));
        let back: MarketEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(back, ev);
    }

    #[test]
    fn file_sink_appends_jsonl() {
        let dir = std::env::temp_dir().join("agora-events-test");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join(format!("log-{}.jsonl", std::process::id()));
        let _ = std::fs::remove_file(&path);

        let mut sink = FileEventSink::new(&path);
        let ev = MarketEvent::ItemCreated {
            item_id: ItemId(1),
            token: TokenRef::new(ContractId(2), 3),
            creator: AccountId(4),
        };
        sink.publish(&ev).unwrap();
        sink.publish(&ev).unwrap();

        let body = std::fs::read_to_string(&path).unwrap();
        assert_eq!(body.lines().count(), 2);
        let back: MarketEvent = serde_json::from_str(body.lines().next().unwrap()).unwrap();
        assert_eq!(back, ev);
        let _ = std::fs::remove_file(&path);
    }
}
