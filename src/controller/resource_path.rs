//! # Resource Path Parsing
//!
//! Classifies an Azure Resource Manager ID as either a resource group or a
//! resource, extracting the fields the authorization API needs.
//!
//! Both grammars are case-insensitive and anchored at both ends:
//!
//! - `/subscriptions/{guid}/resourcegroups/{group}`
//! - `/subscriptions/{guid}/resourcegroups/{group}/providers/{provider}[/{parent}]/{type}/{name}`
//!
//! This is a purely syntactic check; nothing is looked up in Azure.

use regex::Regex;
use std::fmt;
use std::sync::LazyLock;

const SUBSCRIPTION_PATTERN: &str =
    r"(?P<subscription>[0-9a-f]{8}-[0-9a-f]{4}-[0-9a-f]{4}-[0-9a-f]{4}-[0-9a-f]{12})";
const GROUP_PATTERN: &str = r"(?P<group>[-a-z0-9_.()]+)";

static RESOURCE_PATH_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(
        r"(?i)^/subscriptions/{SUBSCRIPTION_PATTERN}/resourcegroups/{GROUP_PATTERN}/providers/(?P<provider>[a-z0-9_.]+)(?P<parent>/.*?)?/(?P<type>[a-z0-9_]+)/(?P<name>[-a-z0-9_]+)$"
    ))
    .expect("resource path pattern is a valid regex")
});

static RESOURCE_GROUP_PATH_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(
        r"(?i)^/subscriptions/{SUBSCRIPTION_PATTERN}/resourcegroups/{GROUP_PATTERN}$"
    ))
    .expect("resource group path pattern is a valid regex")
});

/// A resource group identified by a resource path
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceGroupRef {
    pub subscription: String,
    pub group: String,
}

/// A single resource identified by a resource path
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceRef {
    pub subscription: String,
    pub group: String,
    /// Resource provider namespace, e.g. `Microsoft.Compute`
    pub provider: String,
    /// Segments between the provider and the resource type, without
    /// surrounding slashes. Empty for top-level resources.
    pub parent_path: String,
    pub resource_type: String,
    pub resource_name: String,
}

/// Result of classifying a resource path
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResourcePath {
    ResourceGroup(ResourceGroupRef),
    Resource(ResourceRef),
}

impl ResourcePath {
    /// Classify `path`, returning `None` when it matches neither grammar
    pub fn parse(path: &str) -> Option<Self> {
        if let Some(captures) = RESOURCE_PATH_REGEX.captures(path) {
            let field = |name: &str| {
                captures
                    .name(name)
                    .map(|m| m.as_str().to_string())
                    .unwrap_or_default()
            };
            let parent_path = captures
                .name("parent")
                .map(|m| m.as_str().trim_matches('/').to_string())
                .unwrap_or_default();

            return Some(ResourcePath::Resource(ResourceRef {
                subscription: field("subscription"),
                group: field("group"),
                provider: field("provider"),
                parent_path,
                resource_type: field("type"),
                resource_name: field("name"),
            }));
        }

        RESOURCE_GROUP_PATH_REGEX.captures(path).map(|captures| {
            ResourcePath::ResourceGroup(ResourceGroupRef {
                subscription: captures["subscription"].to_string(),
                group: captures["group"].to_string(),
            })
        })
    }

    pub fn group(&self) -> &str {
        match self {
            ResourcePath::ResourceGroup(rg) => &rg.group,
            ResourcePath::Resource(r) => &r.group,
        }
    }
}

impl fmt::Display for ResourcePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResourcePath::ResourceGroup(rg) => {
                write!(f, "resource group {}", rg.group)
            }
            ResourcePath::Resource(r) if r.parent_path.is_empty() => write!(
                f,
                "resource {}/{}/{} in group {}",
                r.provider, r.resource_type, r.resource_name, r.group
            ),
            ResourcePath::Resource(r) => write!(
                f,
                "resource {}/{}/{}/{} in group {}",
                r.provider, r.parent_path, r.resource_type, r.resource_name, r.group
            ),
        }
    }
}
