// ABOUTME: Replication topology from configuration and regex-based connection filtering
//
// Groups list their members and each member its inbound connections. Filters
// select which (group, source, destination) triples a command evaluates.

use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};

use crate::session::{GroupId, ServerName};

/// A replication group
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct GroupConfig {
    /// Display name
    pub name: String,

    /// Group identifier
    pub id: GroupId,

    /// Replicated folders, in the order servers report backlog for them
    #[serde(default)]
    pub folders: Vec<String>,

    /// Servers participating in the group
    #[serde(default)]
    pub members: Vec<MemberConfig>,
}

/// A server participating in a group
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct MemberConfig {
    /// Fully qualified host name
    pub host: ServerName,

    /// Inbound replication connections to this member
    #[serde(default)]
    pub connections: Vec<ConnectionConfig>,
}

/// An inbound connection from another member
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ConnectionConfig {
    /// Sending member
    pub from: ServerName,

    /// Disabled connections are never evaluated
    #[serde(default = "default_true")]
    pub enabled: bool,
}

const fn default_true() -> bool {
    true
}

/// One selected (group, source, destination) triple
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Connection {
    /// Group name
    pub group: String,
    /// Group identifier
    pub group_id: GroupId,
    /// Replicated folders of the group
    pub folders: Vec<String>,
    /// Sending member
    pub from: ServerName,
    /// Receiving member
    pub to: ServerName,
}

// === Filters ===

/// Regex filters over groups and members
///
/// An empty list imposes no restriction except for `skip`, where an empty list
/// skips nothing.
#[derive(Debug, Clone, Default)]
pub struct Filters {
    /// Group names to include
    pub groups: Vec<Regex>,
    /// Source hosts to include
    pub from: Vec<Regex>,
    /// Destination hosts to include
    pub to: Vec<Regex>,
    /// Hosts that must appear on either end
    pub member: Vec<Regex>,
    /// Hosts to exclude entirely
    pub skip: Vec<Regex>,
}

impl Filters {
    /// Compile a list of case-insensitive patterns
    pub fn compile(patterns: &[String]) -> Result<Vec<Regex>, regex::Error> {
        patterns
            .iter()
            .map(|p| RegexBuilder::new(p).case_insensitive(true).build())
            .collect()
    }
}

fn is_match(value: &str, patterns: &[Regex], when_empty: bool) -> bool {
    if patterns.is_empty() {
        return when_empty;
    }
    patterns.iter().any(|re| re.is_match(value))
}

// === Topology ===

/// Read-only view over configured groups
#[derive(Debug, Clone, Copy)]
pub struct Topology<'a> {
    groups: &'a [GroupConfig],
}

impl<'a> Topology<'a> {
    /// Wrap a list of groups
    pub const fn new(groups: &'a [GroupConfig]) -> Self {
        Self { groups }
    }

    /// Find a group by identifier or case-insensitive name
    pub fn group(&self, name_or_id: &str) -> Option<&'a GroupConfig> {
        if let Ok(id) = name_or_id.parse::<GroupId>() {
            if let Some(group) = self.groups.iter().find(|g| g.id == id) {
                return Some(group);
            }
        }
        self.groups
            .iter()
            .find(|g| g.name.eq_ignore_ascii_case(name_or_id))
    }

    /// All enabled connections selected by `filters`
    pub fn connections(&self, filters: &Filters) -> Vec<Connection> {
        let mut selected = Vec::new();

        for group in self.groups {
            if !is_match(&group.name, &filters.groups, true) {
                continue;
            }

            for member in &group.members {
                let to = &member.host;
                if to.as_str().is_empty()
                    || is_match(to.as_str(), &filters.skip, false)
                    || !is_match(to.as_str(), &filters.to, true)
                {
                    continue;
                }

                for conn in member.connections.iter().filter(|c| c.enabled) {
                    let from = &conn.from;
                    if from.as_str().is_empty()
                        || is_match(from.as_str(), &filters.skip, false)
                        || !is_match(from.as_str(), &filters.from, true)
                    {
                        continue;
                    }
                    if !is_match(from.as_str(), &filters.member, true)
                        && !is_match(to.as_str(), &filters.member, true)
                    {
                        continue;
                    }

                    selected.push(Connection {
                        group: group.name.clone(),
                        group_id: group.id,
                        folders: group.folders.clone(),
                        from: from.clone(),
                        to: to.clone(),
                    });
                }
            }
        }

        selected
    }
}
