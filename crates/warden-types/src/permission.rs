//! The closed permission set.
//!
//! Permissions are `"resource:action"` capability values drawn from a
//! closed, versioned enumeration. Stores reject anything outside this set
//! at write time, so a serialized grant can always be interpreted.

use std::fmt::{self, Display};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::AccessError;

/// Capability that can be granted through a role or a resource grant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Permission {
    /// Read report definitions and rendered output.
    ReportRead,
    /// Create new reports.
    ReportCreate,
    /// Modify existing reports.
    ReportUpdate,
    /// Delete reports.
    ReportDelete,
    /// Run a report against its data source.
    ReportExecute,
    /// Export rendered report data outside the platform.
    ///
    /// High-risk: exported data leaves the audit perimeter.
    ReportExport,

    /// View dashboards.
    DashboardRead,
    /// Create, edit, and delete dashboards.
    DashboardManage,

    /// View report schedules.
    ScheduleRead,
    /// Create, edit, and delete report schedules.
    ScheduleManage,

    /// View data source definitions.
    DatasourceRead,
    /// Create, edit, and delete data source definitions.
    DatasourceManage,

    /// Read the audit trail.
    AuditRead,

    /// Manage user accounts and role assignments.
    AdminUsers,
    /// Manage role definitions.
    AdminRoles,
    /// Manage ABAC policies.
    AdminPolicies,
}

impl Permission {
    /// All permissions in the current version of the capability set.
    pub const ALL: [Permission; 16] = [
        Permission::ReportRead,
        Permission::ReportCreate,
        Permission::ReportUpdate,
        Permission::ReportDelete,
        Permission::ReportExecute,
        Permission::ReportExport,
        Permission::DashboardRead,
        Permission::DashboardManage,
        Permission::ScheduleRead,
        Permission::ScheduleManage,
        Permission::DatasourceRead,
        Permission::DatasourceManage,
        Permission::AuditRead,
        Permission::AdminUsers,
        Permission::AdminRoles,
        Permission::AdminPolicies,
    ];

    /// The canonical `"resource:action"` string form.
    pub fn as_str(self) -> &'static str {
        match self {
            Permission::ReportRead => "report:read",
            Permission::ReportCreate => "report:create",
            Permission::ReportUpdate => "report:update",
            Permission::ReportDelete => "report:delete",
            Permission::ReportExecute => "report:execute",
            Permission::ReportExport => "report:export",
            Permission::DashboardRead => "dashboard:read",
            Permission::DashboardManage => "dashboard:manage",
            Permission::ScheduleRead => "schedule:read",
            Permission::ScheduleManage => "schedule:manage",
            Permission::DatasourceRead => "datasource:read",
            Permission::DatasourceManage => "datasource:manage",
            Permission::AuditRead => "audit:read",
            Permission::AdminUsers => "admin:users",
            Permission::AdminRoles => "admin:roles",
            Permission::AdminPolicies => "admin:policies",
        }
    }

    /// Returns whether this permission is high-risk.
    ///
    /// High-risk permissions can exfiltrate data or escalate privileges
    /// and carry extra audit weight.
    pub fn is_high_risk(self) -> bool {
        matches!(
            self,
            Permission::ReportDelete
                | Permission::ReportExport
                | Permission::AdminUsers
                | Permission::AdminRoles
                | Permission::AdminPolicies
        )
    }
}

impl Display for Permission {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Permission {
    type Err = AccessError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Permission::ALL
            .into_iter()
            .find(|p| p.as_str() == s)
            .ok_or_else(|| AccessError::Validation {
                reason: format!("unknown permission '{s}'"),
            })
    }
}

impl TryFrom<String> for Permission {
    type Error = AccessError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Permission> for String {
    fn from(p: Permission) -> Self {
        p.as_str().to_string()
    }
}
