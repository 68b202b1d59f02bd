//! Registry of entity types tracked by the name cache

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::core::cache::CacheError;

/// Remote entity categories the cache knows how to refresh
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EntityType {
    /// Provider account (AHV, AWS, VMware, ...)
    Account,
    /// Calm project
    Project,
    /// Project environment
    Environment,
    /// AHV subnet (names repeat across clusters)
    AhvSubnet,
    /// AHV disk image
    AhvDiskImage,
    /// Prism Element cluster
    AhvCluster,
    /// Virtual private cloud
    AhvVpc,
    /// Directory user
    User,
    /// Directory user group
    UserGroup,
    /// RBAC role
    Role,
    /// Directory service
    DirectoryService,
    /// Marketplace application icon
    AppIcon,
}

/// Where a type-specific attribute lives in a v3 entity document
struct AttributeSource {
    key: &'static str,
    pointer: &'static str,
}

impl EntityType {
    /// Get the string representation stored in the cache
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityType::Account => "ACCOUNT",
            EntityType::Project => "PROJECT",
            EntityType::Environment => "ENVIRONMENT",
            EntityType::AhvSubnet => "AHV_SUBNET",
            EntityType::AhvDiskImage => "AHV_DISK_IMAGE",
            EntityType::AhvCluster => "AHV_CLUSTER",
            EntityType::AhvVpc => "AHV_VPC",
            EntityType::User => "USER",
            EntityType::UserGroup => "USER_GROUP",
            EntityType::Role => "ROLE",
            EntityType::DirectoryService => "DIRECTORY_SERVICE",
            EntityType::AppIcon => "APP_ICON",
        }
    }

    /// All registered types, in registration (sync) order
    pub fn all() -> &'static [EntityType] {
        &[
            EntityType::Account,
            EntityType::Project,
            EntityType::Environment,
            EntityType::AhvSubnet,
            EntityType::AhvDiskImage,
            EntityType::AhvCluster,
            EntityType::AhvVpc,
            EntityType::User,
            EntityType::UserGroup,
            EntityType::Role,
            EntityType::DirectoryService,
            EntityType::AppIcon,
        ]
    }

    /// Position in the registry, used to order listings
    pub fn registration_index(&self) -> usize {
        Self::all()
            .iter()
            .position(|t| t == self)
            .unwrap_or(usize::MAX)
    }

    /// REST resource path (relative to the v3 API root)
    pub fn resource_path(&self) -> &'static str {
        match self {
            EntityType::Account => "accounts",
            EntityType::Project => "projects",
            EntityType::Environment => "environments",
            EntityType::AhvSubnet => "subnets",
            EntityType::AhvDiskImage => "images",
            EntityType::AhvCluster => "clusters",
            EntityType::AhvVpc => "vpcs",
            EntityType::User => "users",
            EntityType::UserGroup => "user_groups",
            EntityType::Role => "roles",
            EntityType::DirectoryService => "directory_services",
            EntityType::AppIcon => "app_icons",
        }
    }

    /// Suffix of the "list all" endpoint for this type
    pub fn list_api_suffix(&self) -> String {
        format!("{}/list", self.resource_path())
    }

    /// The `kind` sent in list request bodies
    pub fn api_kind(&self) -> &'static str {
        match self {
            EntityType::Account => "account",
            EntityType::Project => "project",
            EntityType::Environment => "environment",
            EntityType::AhvSubnet => "subnet",
            EntityType::AhvDiskImage => "image",
            EntityType::AhvCluster => "cluster",
            EntityType::AhvVpc => "vpc",
            EntityType::User => "user",
            EntityType::UserGroup => "user_group",
            EntityType::Role => "role",
            EntityType::DirectoryService => "directory_service",
            EntityType::AppIcon => "app_icon",
        }
    }

    fn attribute_sources(&self) -> &'static [AttributeSource] {
        match self {
            EntityType::Account => &[
                AttributeSource {
                    key: "provider_type",
                    pointer: "/status/resources/type",
                },
                AttributeSource {
                    key: "state",
                    pointer: "/status/resources/state",
                },
            ],
            EntityType::Environment => &[AttributeSource {
                key: "project_uuid",
                pointer: "/metadata/project_reference/uuid",
            }],
            EntityType::AhvSubnet => &[
                AttributeSource {
                    key: "cluster",
                    pointer: "/status/cluster_reference/name",
                },
                AttributeSource {
                    key: "cluster_uuid",
                    pointer: "/status/cluster_reference/uuid",
                },
            ],
            EntityType::AhvDiskImage => &[AttributeSource {
                key: "image_type",
                pointer: "/status/resources/image_type",
            }],
            EntityType::User | EntityType::UserGroup => &[AttributeSource {
                key: "display_name",
                pointer: "/status/resources/display_name",
            }],
            _ => &[],
        }
    }

    /// Attribute keys stored alongside name and UUID for this type
    pub fn attribute_keys(&self) -> Vec<&'static str> {
        self.attribute_sources().iter().map(|s| s.key).collect()
    }

    /// Pull this type's attributes out of a v3 entity document
    ///
    /// Missing or non-scalar values are skipped, so a row only carries the
    /// attributes the API actually returned.
    pub fn extract_attributes(
        &self,
        entity: &serde_json::Value,
    ) -> std::collections::BTreeMap<String, String> {
        self.attribute_sources()
            .iter()
            .filter_map(|source| {
                let value = match entity.pointer(source.pointer)? {
                    serde_json::Value::String(s) => s.clone(),
                    serde_json::Value::Number(n) => n.to_string(),
                    serde_json::Value::Bool(b) => b.to_string(),
                    _ => return None,
                };
                Some((source.key.to_string(), value))
            })
            .collect()
    }
}

impl fmt::Display for EntityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for EntityType {
    type Err = CacheError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_uppercase().replace('-', "_");
        Self::all()
            .iter()
            .copied()
            .find(|t| t.as_str() == normalized)
            .ok_or_else(|| CacheError::InvalidEntityType(s.to_string()))
    }
}
