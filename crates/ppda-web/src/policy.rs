//! Declarative access policy: which groups may read or write each resource.

use ppda_core::Group;

use crate::auth::Caller;
use crate::error::AppError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Resource {
    Organizations,
    Plans,
    Measures,
    ProgressRecords,
    Indicators,
    CriticalAlerts,
    Activities,
    AnnualReports,
    ConsolidatedReports,
    UserProfiles,
    Ingestion,
}

impl Resource {
    pub const ALL: &'static [Resource] = &[
        Resource::Organizations,
        Resource::Plans,
        Resource::Measures,
        Resource::ProgressRecords,
        Resource::Indicators,
        Resource::CriticalAlerts,
        Resource::Activities,
        Resource::AnnualReports,
        Resource::ConsolidatedReports,
        Resource::UserProfiles,
        Resource::Ingestion,
    ];

    /// Path segment under `/api`.
    pub fn path(&self) -> &'static str {
        match self {
            Self::Organizations => "organizations",
            Self::Plans => "plans",
            Self::Measures => "measures",
            Self::ProgressRecords => "progress-records",
            Self::Indicators => "indicators",
            Self::CriticalAlerts => "critical-alerts",
            Self::Activities => "activities",
            Self::AnnualReports => "annual-reports",
            Self::ConsolidatedReports => "consolidated-reports",
            Self::UserProfiles => "user-profiles",
            Self::Ingestion => "ingest",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Access {
    Read,
    Write,
}

const ADMIN: &[Group] = &[Group::Admin];
const STAFF: &[Group] = &[Group::Admin, Group::User];
const ANY_GROUP: &[Group] = &[Group::Admin, Group::User, Group::Auditor];

/// `(resource, access) → groups allowed`. A pair missing from the table is denied.
pub static POLICY: &[(Resource, Access, &[Group])] = &[
    (Resource::Organizations, Access::Read, ADMIN),
    (Resource::Organizations, Access::Write, ADMIN),
    (Resource::Plans, Access::Read, ADMIN),
    (Resource::Plans, Access::Write, ADMIN),
    (Resource::Measures, Access::Read, ANY_GROUP),
    (Resource::Measures, Access::Write, ADMIN),
    (Resource::ProgressRecords, Access::Read, STAFF),
    (Resource::ProgressRecords, Access::Write, STAFF),
    (Resource::Indicators, Access::Read, ANY_GROUP),
    (Resource::Indicators, Access::Write, STAFF),
    (Resource::CriticalAlerts, Access::Read, ANY_GROUP),
    (Resource::CriticalAlerts, Access::Write, STAFF),
    (Resource::Activities, Access::Read, STAFF),
    (Resource::Activities, Access::Write, STAFF),
    (Resource::AnnualReports, Access::Read, ANY_GROUP),
    (Resource::AnnualReports, Access::Write, STAFF),
    (Resource::ConsolidatedReports, Access::Read, ANY_GROUP),
    (Resource::ConsolidatedReports, Access::Write, ADMIN),
    (Resource::UserProfiles, Access::Read, ADMIN),
    (Resource::UserProfiles, Access::Write, ADMIN),
    (Resource::Ingestion, Access::Write, ADMIN),
];

pub fn allowed_groups(resource: Resource, access: Access) -> &'static [Group] {
    POLICY
        .iter()
        .find(|(r, a, _)| *r == resource && *a == access)
        .map(|(_, _, groups)| *groups)
        .unwrap_or(&[])
}

pub fn permits(caller: &Caller, resource: Resource, access: Access) -> bool {
    caller.in_any(allowed_groups(resource, access))
}

pub fn authorize(caller: &Caller, resource: Resource, access: Access) -> Result<(), AppError> {
    if permits(caller, resource, access) {
        Ok(())
    } else {
        tracing::debug!(?resource, ?access, account_id = ?caller.account_id, "access denied");
        Err(AppError::Forbidden)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    fn caller(groups: &[Group]) -> Caller {
        Caller {
            account_id: Some(7),
            groups: groups.to_vec(),
        }
    }

    #[test]
    fn every_crud_resource_has_read_and_write_entries() {
        for resource in Resource::ALL.iter().filter(|r| **r != Resource::Ingestion) {
            for access in [Access::Read, Access::Write] {
                assert!(
                    !allowed_groups(*resource, access).is_empty(),
                    "{resource:?} {access:?}"
                );
            }
        }
    }

    #[test]
    fn table_has_no_duplicate_pairs() {
        let pairs: HashSet<_> = POLICY.iter().map(|(r, a, _)| (*r, *a)).collect();
        assert_eq!(pairs.len(), POLICY.len());
    }

    #[test]
    fn admin_may_do_everything_listed() {
        let admin = caller(&[Group::Admin]);
        for (resource, access, _) in POLICY {
            assert!(permits(&admin, *resource, *access));
        }
    }

    #[test]
    fn auditors_only_read_reports_and_measurements() {
        let auditor = caller(&[Group::Auditor]);
        assert!(permits(&auditor, Resource::AnnualReports, Access::Read));
        assert!(permits(&auditor, Resource::Indicators, Access::Read));
        assert!(!permits(&auditor, Resource::AnnualReports, Access::Write));
        assert!(!permits(&auditor, Resource::Plans, Access::Read));
        assert!(!permits(&auditor, Resource::Ingestion, Access::Write));
    }

    #[test]
    fn users_write_progress_but_not_plans() {
        let user = caller(&[Group::User]);
        assert!(permits(&user, Resource::ProgressRecords, Access::Write));
        assert!(!permits(&user, Resource::Plans, Access::Write));
        assert!(!permits(&user, Resource::Organizations, Access::Read));
    }

    #[test]
    fn no_groups_means_no_access() {
        let nobody = caller(&[]);
        assert!(Resource::ALL
            .iter()
            .all(|r| !permits(&nobody, *r, Access::Read) && !permits(&nobody, *r, Access::Write)));
        assert!(matches!(
            authorize(&nobody, Resource::Measures, Access::Read),
            Err(AppError::Forbidden)
        ));
    }

    #[test]
    fn ingestion_has_no_read_access() {
        assert!(allowed_groups(Resource::Ingestion, Access::Read).is_empty());
    }
}
