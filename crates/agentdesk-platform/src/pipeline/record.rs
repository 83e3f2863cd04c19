//! Records flowing through the upload pipeline.

use serde::{Deserialize, Serialize};

/// Opaque agent identifier, unique per agent and scoped to its admin.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AgentId(String);

impl AgentId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for AgentId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Minimal agent projection used for distribution and response grouping.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentRef {
    pub id: AgentId,
    pub name: String,
}

impl AgentRef {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: AgentId::new(id),
            name: name.into(),
        }
    }
}

/// A single cell as read from the uploaded file.
#[derive(Debug, Clone, PartialEq)]
pub enum CellValue {
    Text(String),
    Number(f64),
    Blank,
    /// Booleans, dates, error cells: anything already rendered to text.
    Other(String),
}

impl CellValue {
    /// Stringify and trim, whatever the source variant.
    pub fn normalize(&self) -> String {
        match self {
            CellValue::Text(s) | CellValue::Other(s) => s.trim().to_string(),
            // f64 Display never switches to exponent notation, and integral
            // values print without a fractional part.
            CellValue::Number(n) if *n == 0.0 => "0".to_string(),
            CellValue::Number(n) => n.to_string(),
            CellValue::Blank => String::new(),
        }
    }
}

impl From<&calamine::Data> for CellValue {
    fn from(cell: &calamine::Data) -> Self {
        use calamine::Data;
        match cell {
            Data::Empty => CellValue::Blank,
            Data::String(s) => CellValue::Text(s.clone()),
            Data::Float(f) => CellValue::Number(*f),
            Data::Int(i) => CellValue::Number(*i as f64),
            other => CellValue::Other(other.to_string()),
        }
    }
}

/// One row of the upload: header name → cell, in column order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawRecord {
    fields: Vec<(String, CellValue)>,
}

impl RawRecord {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, name: impl Into<String>, value: CellValue) {
        self.fields.push((name.into(), value));
    }

    /// First cell under `name`.
    pub fn get(&self, name: &str) -> Option<&CellValue> {
        self.fields
            .iter()
            .find(|(field, _)| field == name)
            .map(|(_, value)| value)
    }

    /// Normalized value, or empty when the column is absent.
    fn text(&self, name: &str) -> String {
        self.get(name).map(CellValue::normalize).unwrap_or_default()
    }
}

/// Column names recognised in uploads.
pub const FIRST_NAME: &str = "FirstName";
pub const PHONE: &str = "Phone";
pub const NOTES: &str = "Notes";

/// A contact row waiting for (or carrying) an agent assignment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskRecord {
    #[serde(rename = "FirstName")]
    pub first_name: String,
    #[serde(rename = "Phone")]
    pub phone: String,
    #[serde(rename = "Notes")]
    pub notes: String,
    #[serde(rename = "assignedAgentId")]
    pub assigned_agent_id: Option<AgentId>,
}

impl TaskRecord {
    pub fn new(first_name: impl Into<String>, phone: impl Into<String>, notes: impl Into<String>) -> Self {
        Self {
            first_name: first_name.into(),
            phone: phone.into(),
            notes: notes.into(),
            assigned_agent_id: None,
        }
    }

    /// Build a task from a raw row. Returns `None` when `FirstName` or
    /// `Phone` is missing or blank after trimming.
    pub fn from_raw(raw: &RawRecord) -> Option<Self> {
        let first_name = raw.text(FIRST_NAME);
        let phone = raw.text(PHONE);
        if first_name.is_empty() || phone.is_empty() {
            return None;
        }
        Some(Self::new(first_name, phone, raw.text(NOTES)))
    }
}

/// A task after insertion, carrying its durable id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersistedTask {
    pub id: String,
    #[serde(rename = "FirstName")]
    pub first_name: String,
    #[serde(rename = "Phone")]
    pub phone: String,
    #[serde(rename = "Notes")]
    pub notes: String,
    #[serde(rename = "assignedAgentId")]
    pub assigned_agent_id: AgentId,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(cells: &[(&str, CellValue)]) -> RawRecord {
        let mut raw = RawRecord::new();
        for (name, value) in cells {
            raw.push(*name, value.clone());
        }
        raw
    }

    #[test]
    fn test_normalize_numbers() {
        assert_eq!(CellValue::Number(5551234567.0).normalize(), "5551234567");
        assert_eq!(CellValue::Number(12.5).normalize(), "12.5");
        assert_eq!(CellValue::Number(1e21).normalize(), "1000000000000000000000");
        assert_eq!(CellValue::Number(0.0).normalize(), "0");
        assert_eq!(CellValue::Number(-0.0).normalize(), "0");
        assert_eq!(CellValue::Number(-12.0).normalize(), "-12");
    }

    #[test]
    fn test_normalize_trims_text() {
        assert_eq!(CellValue::Text("  Ana \t".into()).normalize(), "Ana");
        assert_eq!(CellValue::Other(" true ".into()).normalize(), "true");
        assert_eq!(CellValue::Blank.normalize(), "");
    }

    #[test]
    fn test_from_calamine_cells() {
        assert_eq!(CellValue::from(&calamine::Data::Empty), CellValue::Blank);
        assert_eq!(
            CellValue::from(&calamine::Data::Float(5551234567.0)).normalize(),
            "5551234567"
        );
        assert_eq!(CellValue::from(&calamine::Data::Int(42)).normalize(), "42");
        assert_eq!(
            CellValue::from(&calamine::Data::String(" x ".into())),
            CellValue::Text(" x ".into())
        );
    }

    #[test]
    fn test_from_raw_requires_name_and_phone() {
        let ok = row(&[
            (FIRST_NAME, CellValue::Text(" Ana ".into())),
            (PHONE, CellValue::Number(5551234567.0)),
        ]);
        let task = TaskRecord::from_raw(&ok).unwrap();
        assert_eq!(task.first_name, "Ana");
        assert_eq!(task.phone, "5551234567");
        assert_eq!(task.notes, "");
        assert!(task.assigned_agent_id.is_none());

        let blank_phone = row(&[
            (FIRST_NAME, CellValue::Text("Ana".into())),
            (PHONE, CellValue::Text("   ".into())),
        ]);
        assert!(TaskRecord::from_raw(&blank_phone).is_none());

        let no_name = row(&[(PHONE, CellValue::Text("555".into()))]);
        assert!(TaskRecord::from_raw(&no_name).is_none());
    }

    #[test]
    fn test_from_raw_keeps_notes() {
        let raw = row(&[
            (FIRST_NAME, CellValue::Text("Bo".into())),
            (PHONE, CellValue::Text("555-0101".into())),
            (NOTES, CellValue::Text("  call after 5pm ".into())),
        ]);
        assert_eq!(TaskRecord::from_raw(&raw).unwrap().notes, "call after 5pm");
    }

    #[test]
    fn test_task_serializes_with_upload_column_names() {
        let json = serde_json::to_value(TaskRecord::new("Ana", "555", "")).unwrap();
        assert_eq!(json["FirstName"], "Ana");
        assert_eq!(json["Phone"], "555");
        assert!(json["assignedAgentId"].is_null());
    }
}
