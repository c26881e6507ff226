use serde_json::Value;

/// One report row as delivered by the backend. The server makes no schema
/// promises beyond "a JSON object", so rows stay schemaless and every field
/// access goes through the fallback rules in [`cell_value`].
pub type Record = serde_json::Map<String, Value>;

/// Where a table cell takes its text from.
///
/// The backend is inconsistent about which of `{field, field_formatted}` is
/// populated, so the precedence lives here once instead of at every call
/// site: formatted-if-present-and-valid, else raw, else empty.
#[derive(Clone, Copy, Debug)]
pub enum CellSource {
    /// 1-based row number, not a record field.
    Serial,
    /// Plain field, raw value only.
    Raw(&'static str),
    /// Prefers `<key>_formatted` unless missing, empty, or the literal
    /// string "undefined"; falls back to the raw field.
    Formatted(&'static str),
    /// Nested history array, flattened to a single line of text.
    History(&'static str),
}

#[derive(Clone, Copy, Debug)]
pub struct Column {
    pub header: &'static str,
    pub source: CellSource,
}

/// Exported column set, in exactly the order the CSV and the table use it.
pub const COLUMNS: [Column; 31] = [
    Column { header: "S.No", source: CellSource::Serial },
    Column { header: "Record Type", source: CellSource::Raw("record_type") },
    Column { header: "Agent Name", source: CellSource::Raw("agent_name") },
    Column { header: "Extension", source: CellSource::Raw("extension") },
    Column { header: "Queue/Campaign", source: CellSource::Raw("queue_name") },
    Column { header: "Called Time", source: CellSource::Formatted("called_time") },
    Column { header: "Caller Number", source: CellSource::Raw("caller_number") },
    Column { header: "Callee Number", source: CellSource::Raw("callee_number") },
    Column { header: "Answered Time", source: CellSource::Formatted("answered_time") },
    Column { header: "Hangup Time", source: CellSource::Formatted("hangup_time") },
    Column { header: "Wait Duration", source: CellSource::Formatted("wait_duration") },
    Column { header: "Talk Duration", source: CellSource::Formatted("talk_duration") },
    Column { header: "Hold Duration", source: CellSource::Formatted("hold_duration") },
    Column { header: "Hold Intervals", source: CellSource::Raw("hold_intervals") },
    Column { header: "Agent Disposition", source: CellSource::Raw("agent_disposition") },
    Column { header: "Sub Disposition 1", source: CellSource::Raw("sub_disposition1") },
    Column { header: "Sub Disposition 2", source: CellSource::Raw("sub_disposition2") },
    Column { header: "Follow Up Notes", source: CellSource::Raw("followup_notes") },
    Column { header: "Agent Hangup", source: CellSource::Raw("agent_hangup") },
    Column { header: "Status", source: CellSource::Raw("status") },
    Column { header: "Campaign Type", source: CellSource::Raw("campaign_type") },
    Column { header: "Abandoned", source: CellSource::Raw("abandoned") },
    Column { header: "Country", source: CellSource::Raw("country") },
    Column { header: "Transfer", source: CellSource::Raw("transfer") },
    Column { header: "Transfer Extension", source: CellSource::Raw("transfer_extension") },
    Column { header: "Transfer Type", source: CellSource::Raw("transfer_type") },
    Column { header: "Agent History", source: CellSource::History("agent_history") },
    Column { header: "Queue History", source: CellSource::History("queue_history") },
    Column { header: "Recording Id", source: CellSource::Raw("recording_id") },
    Column { header: "Call Id", source: CellSource::Raw("call_id") },
    Column { header: "System Disposition", source: CellSource::Raw("system_disposition") },
];

fn value_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        _ => String::new(),
    }
}

fn raw_text(record: &Record, key: &str) -> String {
    record.get(key).map(value_text).unwrap_or_default()
}

fn formatted_text(record: &Record, key: &str) -> String {
    let formatted_key = format!("{key}_formatted");
    if let Some(Value::String(s)) = record.get(&formatted_key) {
        let s = s.trim();
        if !s.is_empty() && s != "undefined" {
            return s.to_string();
        }
    }
    raw_text(record, key)
}

/// Flattens a nested history array to one line: object entries become
/// `k=v` pairs, entries are joined with `"; "`.
pub fn flatten_history(value: &Value) -> String {
    let entries = match value {
        Value::Array(entries) => entries,
        other => return value_text(other),
    };
    let mut out: Vec<String> = Vec::with_capacity(entries.len());
    for entry in entries {
        match entry {
            Value::Object(fields) => {
                let pairs: Vec<String> = fields
                    .iter()
                    .map(|(k, v)| format!("{}={}", k, value_text(v)))
                    .collect();
                out.push(pairs.join(" "));
            }
            other => out.push(value_text(other)),
        }
    }
    out.join("; ")
}

/// Resolves one cell's text. `serial` is the 1-based row number.
pub fn cell_value(record: &Record, source: CellSource, serial: usize) -> String {
    match source {
        CellSource::Serial => serial.to_string(),
        CellSource::Raw(key) => raw_text(record, key),
        CellSource::Formatted(key) => formatted_text(record, key),
        CellSource::History(key) => record
            .get(key)
            .map(flatten_history)
            .unwrap_or_default(),
    }
}

/// Summary bucket for a record. Rows without a `record_type` land in a
/// catch-all bucket rather than being dropped from the breakdown.
pub fn record_category(record: &Record) -> String {
    match record.get("record_type") {
        Some(Value::String(s)) if !s.trim().is_empty() => s.trim().to_string(),
        _ => "unknown".to_string(),
    }
}
