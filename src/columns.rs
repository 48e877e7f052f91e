//! Column Detector: map semantic roles onto whatever the source called its
//! columns. Detection runs once; the resolved map is threaded through every
//! later stage.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::LazyLock;

use log::{info, warn};
use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};

use crate::error::{Result, ScreenError};

/// Semantic role a column can play.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Title,
    Amount,
    Status,
    Start,
    End,
    Target,
    Year,
    Region,
    Province,
    City,
    Barangay,
    Contractor,
    Length,
    Area,
    /// Free-form location used when no administrative column exists.
    Location,
    Latitude,
    Longitude,
}

impl Role {
    pub const ALL: [Role; 17] = [
        Role::Title,
        Role::Amount,
        Role::Status,
        Role::Start,
        Role::End,
        Role::Target,
        Role::Year,
        Role::Region,
        Role::Province,
        Role::City,
        Role::Barangay,
        Role::Contractor,
        Role::Length,
        Role::Area,
        Role::Location,
        Role::Latitude,
        Role::Longitude,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Title => "title",
            Self::Amount => "amount",
            Self::Status => "status",
            Self::Start => "start",
            Self::End => "end",
            Self::Target => "target",
            Self::Year => "year",
            Self::Region => "region",
            Self::Province => "province",
            Self::City => "city",
            Self::Barangay => "barangay",
            Self::Contractor => "contractor",
            Self::Length => "length",
            Self::Area => "area",
            Self::Location => "location",
            Self::Latitude => "latitude",
            Self::Longitude => "longitude",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|r| r.as_str() == s.to_lowercase())
    }

    fn pattern(&self) -> &'static str {
        match self {
            Self::Title => r"(project|title|scope|description|name)",
            Self::Amount => {
                r"(amount|contract.*amount|abc|cost|budget|approved.*budget|project.*cost)"
            }
            Self::Status => r"(status|physical|accomplish|progress|%|percent)",
            Self::Start => {
                r"(start|commence|ntp|notice\s*to\s*proceed|date\s*started|date\s*start)"
            }
            Self::End => r"(end|completion|date\s*completed|actual\s*completion)",
            Self::Target => r"(target\s*completion|target\s*date)",
            Self::Year => r"\byear\b",
            Self::Region => r"\bregion\b",
            Self::Province => r"\bprovince\b",
            Self::City => r"(city|municipality|muni|lgu)",
            Self::Barangay => r"(barangay|brgy)",
            Self::Contractor => r"(contractor|supplier|winning\s*bidder|provider|vendor)",
            Self::Length => r"(\blength\b|linear\s*(m|meter|metre|lm|km)|\bkm\b|\bm\b)",
            Self::Area => r"(area|sq.?km|sqm|m2|hect|ha)",
            Self::Location => r"(location|site|river|barangay|place)",
            Self::Latitude => r"\b(lat|latitude)\b",
            Self::Longitude => r"\b(lon|lng|long|longitude)\b",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

static ROLE_PATTERNS: LazyLock<Vec<(Role, Regex)>> = LazyLock::new(|| {
    Role::ALL
        .iter()
        .map(|r| {
            let re = RegexBuilder::new(r.pattern())
                .case_insensitive(true)
                .build()
                .expect("role patterns are valid");
            (*r, re)
        })
        .collect()
});

/// First column (in declaration order) whose name matches `pattern`,
/// case-insensitively.
pub fn find_column<'a>(columns: &'a [String], pattern: &Regex) -> Option<(usize, &'a str)> {
    columns
        .iter()
        .enumerate()
        .find(|(_, c)| pattern.is_match(c))
        .map(|(i, c)| (i, c.as_str()))
}

/// Every column whose name matches `pattern`, in declaration order.
pub fn find_columns<'a>(columns: &'a [String], pattern: &Regex) -> Vec<&'a str> {
    columns
        .iter()
        .filter(|c| pattern.is_match(c))
        .map(String::as_str)
        .collect()
}

/// Case-insensitive regex for ad hoc column searches.
pub fn column_pattern(pattern: &str) -> Regex {
    RegexBuilder::new(pattern)
        .case_insensitive(true)
        .build()
        .unwrap_or_else(|_| Regex::new(&regex::escape(pattern)).expect("escaped pattern is valid"))
}

/// Caller's instruction for one role.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Override {
    /// Use pattern detection.
    Auto,
    /// Force this column.
    Column(String),
    /// Force "no column for this role".
    Disabled,
}

impl Override {
    fn from_option(v: Option<String>) -> Self {
        match v {
            None => Self::Disabled,
            Some(s) if s.eq_ignore_ascii_case("auto") => Self::Auto,
            Some(s) => Self::Column(s),
        }
    }

    fn to_option(&self) -> Option<String> {
        match self {
            Self::Auto => Some("auto".into()),
            Self::Column(c) => Some(c.clone()),
            Self::Disabled => None,
        }
    }
}

/// Per-role overrides, written as `{"title": "Project Name", "contractor": null, "status": "auto"}`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(
    from = "BTreeMap<Role, Option<String>>",
    into = "BTreeMap<Role, Option<String>>"
)]
pub struct ColumnOverrides(BTreeMap<Role, Override>);

impl From<BTreeMap<Role, Option<String>>> for ColumnOverrides {
    fn from(m: BTreeMap<Role, Option<String>>) -> Self {
        Self(m.into_iter().map(|(r, v)| (r, Override::from_option(v))).collect())
    }
}

impl From<ColumnOverrides> for BTreeMap<Role, Option<String>> {
    fn from(o: ColumnOverrides) -> Self {
        o.0.iter().map(|(r, v)| (*r, v.to_option())).collect()
    }
}

impl ColumnOverrides {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(mut self, role: Role, value: Override) -> Self {
        self.0.insert(role, value);
        self
    }

    pub fn column(self, role: Role, name: &str) -> Self {
        self.set(role, Override::Column(name.to_string()))
    }

    pub fn disable(self, role: Role) -> Self {
        self.set(role, Override::Disabled)
    }

    pub fn get(&self, role: Role) -> &Override {
        self.0.get(&role).unwrap_or(&Override::Auto)
    }
}

/// A role resolved to a concrete column.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolvedColumn {
    pub name: String,
    pub index: usize,
}

/// Resolved `role → column` table. Every role is present; unmatched roles map
/// to `None`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnMap {
    roles: BTreeMap<Role, Option<ResolvedColumn>>,
}

impl ColumnMap {
    pub fn get(&self, role: Role) -> Option<&ResolvedColumn> {
        self.roles.get(&role).and_then(|c| c.as_ref())
    }

    pub fn index(&self, role: Role) -> Option<usize> {
        self.get(role).map(|c| c.index)
    }

    pub fn name(&self, role: Role) -> Option<&str> {
        self.get(role).map(|c| c.name.as_str())
    }

    pub fn has(&self, role: Role) -> bool {
        self.get(role).is_some()
    }

    pub fn missing(&self) -> Vec<Role> {
        self.roles
            .iter()
            .filter(|(_, c)| c.is_none())
            .map(|(r, _)| *r)
            .collect()
    }

    /// `role → column name | null`, for operator inspection.
    pub fn to_json(&self) -> serde_json::Value {
        let map: serde_json::Map<String, serde_json::Value> = self
            .roles
            .iter()
            .map(|(r, c)| {
                let v = c
                    .as_ref()
                    .map(|c| serde_json::Value::String(c.name.clone()))
                    .unwrap_or(serde_json::Value::Null);
                (r.as_str().to_string(), v)
            })
            .collect();
        serde_json::Value::Object(map)
    }
}

/// Resolve every role against `columns`. Overrides win over detection; an
/// override naming a column that does not exist is an error.
pub fn detect(columns: &[String], overrides: &ColumnOverrides) -> Result<ColumnMap> {
    let mut roles = BTreeMap::new();
    for (role, pattern) in ROLE_PATTERNS.iter() {
        let resolved = match overrides.get(*role) {
            Override::Disabled => None,
            Override::Column(name) => {
                let index = columns.iter().position(|c| c == name).ok_or_else(|| {
                    ScreenError::UnknownColumn {
                        role: *role,
                        column: name.clone(),
                    }
                })?;
                Some(ResolvedColumn {
                    name: name.clone(),
                    index,
                })
            }
            Override::Auto => find_column(columns, pattern).map(|(index, name)| ResolvedColumn {
                name: name.to_string(),
                index,
            }),
        };
        roles.insert(*role, resolved);
    }

    let map = ColumnMap { roles };
    info!(
        "Resolved {} of {} column roles",
        Role::ALL.len() - map.missing().len(),
        Role::ALL.len()
    );
    for role in [Role::Title, Role::Amount, Role::Contractor] {
        if !map.has(role) {
            warn!("No column detected for role '{role}'; dependent checks will not fire");
        }
    }
    Ok(map)
}
