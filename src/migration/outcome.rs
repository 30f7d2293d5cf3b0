//! Per-visit classification.

use serde_json::Value as JsonValue;
use thiserror::Error;

use crate::error::AppError;
use crate::store::{Document, DocumentStore};

/// Field holding the owning admin's id, on both visits and employees.
pub const ADMIN_ID_FIELD: &str = "adminId";

/// Field on a visit referencing the employee who made it.
pub const EMPLOYEE_ID_FIELD: &str = "employeeId";

/// Why a visit could not be migrated.
#[derive(Error, Debug)]
pub enum VisitError {
    #[error("Visit {visit_id} has no employeeId")]
    MissingEmployeeId { visit_id: String },

    #[error("Employee {employee_id} not found for visit {visit_id}")]
    EmployeeNotFound {
        visit_id: String,
        employee_id: String,
    },

    #[error("Employee {employee_id} has no adminId for visit {visit_id}")]
    EmployeeWithoutAdmin {
        visit_id: String,
        employee_id: String,
    },

    #[error("Error processing visit {visit_id}: {source}")]
    Lookup {
        visit_id: String,
        #[source]
        source: AppError,
    },
}

/// What the runner decided for one visit.
#[derive(Debug)]
pub enum VisitOutcome {
    /// The visit already carries an admin id; nothing is written.
    AlreadyMigrated { admin_id: JsonValue },
    /// The employee's admin id is to be written onto the visit.
    Update { admin_id: JsonValue },
    /// Counted as an error; the run continues.
    Failed(VisitError),
}

impl VisitOutcome {
    pub fn is_success(&self) -> bool {
        !matches!(self, VisitOutcome::Failed(_))
    }
}

/// Decide what to do with `visit`, looking up its employee if needed.
///
/// Never fails: lookup errors are folded into [`VisitOutcome::Failed`].
pub async fn classify_visit<S>(store: &S, users_collection: &str, visit: &Document) -> VisitOutcome
where
    S: DocumentStore + ?Sized,
{
    if let Some(admin_id) = visit.get_set(ADMIN_ID_FIELD) {
        return VisitOutcome::AlreadyMigrated {
            admin_id: admin_id.clone(),
        };
    }

    let Some(employee_id) = visit.get_str(EMPLOYEE_ID_FIELD).filter(|id| !id.is_empty()) else {
        return VisitOutcome::Failed(VisitError::MissingEmployeeId {
            visit_id: visit.id.clone(),
        });
    };

    let employee = match store.fetch_one(users_collection, employee_id).await {
        Ok(Some(employee)) => employee,
        Ok(None) => {
            return VisitOutcome::Failed(VisitError::EmployeeNotFound {
                visit_id: visit.id.clone(),
                employee_id: employee_id.to_string(),
            })
        }
        Err(source) => {
            return VisitOutcome::Failed(VisitError::Lookup {
                visit_id: visit.id.clone(),
                source,
            })
        }
    };

    match employee.get_set(ADMIN_ID_FIELD) {
        Some(admin_id) => VisitOutcome::Update {
            admin_id: admin_id.clone(),
        },
        None => VisitOutcome::Failed(VisitError::EmployeeWithoutAdmin {
            visit_id: visit.id.clone(),
            employee_id: employee_id.to_string(),
        }),
    }
}
