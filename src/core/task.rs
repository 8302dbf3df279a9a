use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{Error, Result};

pub const DATE_FORMAT: &str = "%Y-%m-%d";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    /// Stable identity. Nil for records saved before ids existed, until the
    /// store assigns one.
    #[serde(default)]
    pub id: Uuid,
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(alias = "dueDate")]
    pub due_date: NaiveDate,
    #[serde(default = "now_local")]
    pub created: NaiveDateTime,
}

fn now_local() -> NaiveDateTime {
    chrono::Local::now().naive_local()
}

impl Task {
    pub fn new(title: impl Into<String>, description: impl Into<String>, due_date: NaiveDate) -> Self {
        Self {
            id: Uuid::new_v4(),
            title: title.into(),
            description: description.into(),
            due_date,
            created: now_local(),
        }
    }

    /// Build a task from form input; every field is required.
    pub fn from_input(title: &str, description: &str, due_date: &str) -> Result<Self> {
        let (title, description, due_date) = validate_input(title, description, due_date)?;
        Ok(Self::new(title, description, due_date))
    }

    pub fn due_date_string(&self) -> String {
        self.due_date.format(DATE_FORMAT).to_string()
    }
}

/// Trim and check the three user-entered fields.
pub fn validate_input(title: &str, description: &str, due_date: &str) -> Result<(String, String, NaiveDate)> {
    let title = title.trim();
    let description = description.trim();
    if title.is_empty() {
        return Err(Error::InvalidTask("title is required".into()));
    }
    if description.is_empty() {
        return Err(Error::InvalidTask("description is required".into()));
    }
    Ok((title.to_string(), description.to_string(), parse_date(due_date)?))
}

pub fn parse_date(s: &str) -> Result<NaiveDate> {
    let s = s.trim();
    NaiveDate::parse_from_str(s, DATE_FORMAT).map_err(|_| Error::InvalidDate(s.to_string()))
}
