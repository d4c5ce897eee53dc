use chrono::NaiveDateTime;
use serde::{Serialize, Serializer, ser::SerializeMap};

/// Discriminator carried by events on the top-level stream
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum EventKind {
    #[serde(rename = "apicall")]
    ApiCall,
    #[serde(rename = "process")]
    Process,
}

/// A decoded call argument
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum ArgValue {
    Scalar(String),
    Array(Vec<ArgValue>),
}

impl ArgValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            ArgValue::Scalar(s) => Some(s),
            ArgValue::Array(_) => None,
        }
    }
}

impl From<&str> for ArgValue {
    fn from(s: &str) -> Self {
        ArgValue::Scalar(s.to_string())
    }
}

/// Positional arguments, keyed `p0`, `p1`, ... in call order
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Arguments(Vec<ArgValue>);

impl Arguments {
    pub fn push(&mut self, value: ArgValue) {
        self.0.push(value);
    }

    /// Look up an argument by slot name (`"p0"`, `"p1"`, ...)
    pub fn get(&self, key: &str) -> Option<&ArgValue> {
        let index: usize = key.strip_prefix('p')?.parse().ok()?;
        self.0.get(index)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (String, &ArgValue)> {
        self.0
            .iter()
            .enumerate()
            .map(|(i, value)| (format!("p{}", i), value))
    }
}

impl Serialize for Arguments {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for (key, value) in self.iter() {
            map.serialize_entry(&key, value)?;
        }
        map.end()
    }
}

/// One decoded trace line
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CallEvent {
    #[serde(rename = "time")]
    pub timestamp: NaiveDateTime,
    pub process_name: String,
    pub pid: i64,
    pub instruction_pointer: String,
    pub api: String,
    pub arguments: Arguments,
    pub return_value: String,
    pub status: String,
    /// Cleared when the event is re-exposed through a per-process view
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub kind: Option<EventKind>,
    pub raw: String,
}

/// Synthetic event announcing a process the first time its pid shows up
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProcessEvent {
    pub pid: i64,
    pub ppid: Option<i64>,
    pub process_name: String,
    pub first_seen: NaiveDateTime,
    #[serde(rename = "type")]
    pub kind: EventKind,
}

/// Items of the correlated stream
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum TraceEvent {
    Process(ProcessEvent),
    ApiCall(CallEvent),
}

impl TraceEvent {
    pub fn pid(&self) -> i64 {
        match self {
            TraceEvent::Process(p) => p.pid,
            TraceEvent::ApiCall(c) => c.pid,
        }
    }
}
