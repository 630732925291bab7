use serde::{Deserialize, Serialize};

use crate::domain::normalize_tag;
use crate::error::EngineError;

const DEFAULT_TAGS: [&str; 4] = ["Work", "Study", "Project", "Personal"];
const DEFAULT_THEME: &str = "blue";

/// Goal targets, in hours.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Goals {
    pub daily: f64,
    pub weekly: f64,
    pub global: f64,
}

impl Default for Goals {
    fn default() -> Self {
        Self {
            daily: 6.0,
            weekly: 35.0,
            global: 1000.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub theme: String,
    pub tags: Vec<String>,
    pub goals: Goals,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            theme: DEFAULT_THEME.to_string(),
            tags: DEFAULT_TAGS.iter().map(|tag| tag.to_string()).collect(),
            goals: Goals::default(),
        }
    }
}

impl Settings {
    pub fn has_tag(&self, tag: &str) -> bool {
        let tag = normalize_tag(tag);
        self.tags.iter().any(|known| known == &tag)
    }

    pub fn add_tag(&mut self, raw: &str) -> Result<String, EngineError> {
        if raw.trim().is_empty() {
            return Err(EngineError::Validation("tag name cannot be empty".to_string()));
        }
        let tag = normalize_tag(raw);
        if self.has_tag(&tag) {
            return Err(EngineError::DuplicateTag(tag));
        }
        self.tags.push(tag.clone());
        Ok(tag)
    }

    /// Drops a name from the known set. Entries already logged under it keep it.
    pub fn remove_tag(&mut self, raw: &str) -> Result<String, EngineError> {
        let tag = normalize_tag(raw);
        let position = self
            .tags
            .iter()
            .position(|known| known == &tag)
            .ok_or_else(|| EngineError::UnknownTag(tag.clone()))?;
        self.tags.remove(position);
        Ok(tag)
    }

    /// Parses all three inputs before touching anything.
    pub fn set_goals(&mut self, daily: &str, weekly: &str, global: &str) -> Result<(), EngineError> {
        let goals = Goals {
            daily: parse_goal_hours(daily, "daily")?,
            weekly: parse_goal_hours(weekly, "weekly")?,
            global: parse_goal_hours(global, "global")?,
        };
        self.goals = goals;
        Ok(())
    }

    /// Repairs values a hand-edited file may carry: tags are normalized and
    /// de-duplicated, goals that are not positive numbers fall back.
    pub fn sanitized(mut self) -> Self {
        let mut tags: Vec<String> = Vec::with_capacity(self.tags.len());
        for tag in self.tags.iter().filter(|tag| !tag.trim().is_empty()) {
            let tag = normalize_tag(tag);
            if !tags.contains(&tag) {
                tags.push(tag);
            }
        }
        self.tags = tags;

        let defaults = Goals::default();
        if !valid_goal(self.goals.daily) {
            self.goals.daily = defaults.daily;
        }
        if !valid_goal(self.goals.weekly) {
            self.goals.weekly = defaults.weekly;
        }
        if !valid_goal(self.goals.global) {
            self.goals.global = defaults.global;
        }
        self
    }
}

fn valid_goal(hours: f64) -> bool {
    hours.is_finite() && hours > 0.0
}

fn parse_goal_hours(input: &str, name: &str) -> Result<f64, EngineError> {
    let hours = input
        .trim()
        .parse::<f64>()
        .map_err(|_| EngineError::Validation(format!("{name} goal must be a number of hours, got {input:?}")))?;
    if !valid_goal(hours) {
        return Err(EngineError::Validation(format!(
            "{name} goal must be greater than zero, got {input:?}"
        )));
    }
    Ok(hours)
}
