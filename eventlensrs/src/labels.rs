//! Display labels of the standard row-list headers.

use crate::model::{Program, ProgramStage};

pub const EVENT_DATE_LABEL: &str = "Event date";
pub const ENROLLMENT_DATE_LABEL: &str = "Enrollment date";
pub const INCIDENT_DATE_LABEL: &str = "Incident date";

/// Label of a standard header. Programs and stages may rename the date
/// columns; every other header has a fixed label.
pub fn header_label(name: &str, program: &Program, stage: Option<&ProgramStage>) -> String {
    let custom = match name {
        "executiondate" => stage.and_then(|s| s.execution_date_label.as_deref()),
        "enrollmentdate" => program.enrollment_date_label.as_deref(),
        "incidentdate" => program.incident_date_label.as_deref(),
        _ => None,
    };
    if let Some(label) = custom.filter(|l| !l.trim().is_empty()) {
        return label.to_string();
    }
    default_label(name).to_string()
}

fn default_label(name: &str) -> &str {
    match name {
        "psi" => "Event",
        "ps" => "Program stage",
        "pi" => "Enrollment",
        "tei" => "Tracked entity instance",
        "executiondate" => EVENT_DATE_LABEL,
        "enrollmentdate" => ENROLLMENT_DATE_LABEL,
        "incidentdate" => INCIDENT_DATE_LABEL,
        "duedate" => "Scheduled date",
        "storedby" => "Stored by",
        "lastupdated" => "Last updated on",
        "geometry" => "Geometry",
        "longitude" => "Longitude",
        "latitude" => "Latitude",
        "ouname" => "Organisation unit name",
        "oucode" => "Organisation unit code",
        "eventstatus" => "Event status",
        "enrollmentstatus" => "Program status",
        other => other,
    }
}
