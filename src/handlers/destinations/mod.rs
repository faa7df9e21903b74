//! Study destinations and their rules and metadata.

pub mod list;
pub mod meta;
pub mod record;
pub mod rules;

use crate::auth::RoleTier;
use crate::database::record::{FieldKind, FieldMap};
use crate::error::ApiError;
use crate::filter::Row;
use crate::state::AppState;

pub use list::{get as destinations_get, filter_options as destination_filter_options};
pub use record::{
    delete as destination_delete, patch as destination_patch, post as destination_post,
    put as destination_put, show as destination_show, status as destination_status,
};

pub const VIEW_TIERS: &[RoleTier] = &[RoleTier::SuperAdmin];
pub const VIEW_CAPABILITIES: &[&str] = &["show destination", "manage destination"];

pub const STATUSES: &[&str] = &["active", "paused", "high_risk"];

pub const TRENDS: &[&str] = &[
    "high_availability",
    "moderate_availability",
    "limited_availability",
    "high_risk",
];

pub const DESTINATION_FIELDS: FieldMap = FieldMap::new(&[
    ("name", FieldKind::Text),
    ("official_name", FieldKind::Text),
    ("continent", FieldKind::Text),
    ("currency", FieldKind::Text),
    ("language", FieldKind::Text),
    ("flag", FieldKind::Text),
    ("english_proficiency_required", FieldKind::Bool),
    ("popular_study_cities", FieldKind::List),
    ("living_expense_per_month", FieldKind::Text),
    ("elt_requirements", FieldKind::List),
    ("available_intakes", FieldKind::List),
    ("part_time_work_availability", FieldKind::Text),
    ("success_rate", FieldKind::Int),
    ("total_international_students", FieldKind::Text),
    ("top_source_countries", FieldKind::List),
    ("visa_approval_rate", FieldKind::Text),
    ("popular_universities", FieldKind::List),
    ("dropout_refusal_risk_level", FieldKind::Text),
    ("post_study_visa_name", FieldKind::Text),
    ("post_study_visa_duration_ug", FieldKind::Text),
    ("post_study_visa_duration_pg", FieldKind::Text),
    ("post_study_visa_eligibility", FieldKind::Text),
    ("post_study_visa_extension_options", FieldKind::Bool),
    ("work_rights_during_study", FieldKind::Text),
    ("dependents_allowed", FieldKind::Bool),
    ("academic_documents_required", FieldKind::Text),
    ("english_test_requirements", FieldKind::Text),
    ("financial_requirements", FieldKind::Text),
    ("minimum_funds", FieldKind::Text),
    ("source_of_funds_rules", FieldKind::Text),
    ("sponsor_rules", FieldKind::Text),
    ("bank_statement_duration", FieldKind::Text),
    ("medical_requirements", FieldKind::Text),
    ("police_clearance_required", FieldKind::Bool),
    ("insurance_requirement", FieldKind::Text),
    ("biometrics_requirement", FieldKind::Bool),
    ("sop_rules", FieldKind::Text),
    ("gte_interview_requirement", FieldKind::Bool),
    ("education_system_overview", FieldKind::Text),
    ("why_study_here", FieldKind::Text),
    ("popular_fields_of_study", FieldKind::List),
    ("average_tuition_range_ug", FieldKind::Text),
    ("average_tuition_range_pg", FieldKind::Text),
    ("average_living_cost_monthly", FieldKind::Text),
    ("work_opportunities_overview", FieldKind::Text),
    ("key_challenges_red_flags", FieldKind::Text),
    ("best_student_profile", FieldKind::Text),
    ("education_levels", FieldKind::List),
    ("intake_months", FieldKind::List),
    ("application_deadlines", FieldKind::Text),
    ("credit_transfer_policy", FieldKind::Text),
    ("gap_acceptance_rules", FieldKind::Text),
    ("vac_provider", FieldKind::Text),
    ("vac_cities", FieldKind::List),
    ("vac_address", FieldKind::Text),
    ("vac_appointment_url", FieldKind::Text),
    ("vac_service_charges", FieldKind::Text),
    ("vac_processing_time", FieldKind::Text),
    ("pre_departure_sop", FieldKind::Text),
    ("overall_trend", FieldKind::Text),
    ("status", FieldKind::Text),
]);

/// Destination table for a rule or metadata `type`: 1 international, 2 home
pub fn destination_table(kind: i64) -> &'static str {
    if kind == 2 {
        "home_destinations"
    } else {
        "destinations"
    }
}

pub fn type_label(kind: i64) -> &'static str {
    if kind == 2 {
        "home"
    } else {
        "international"
    }
}

pub async fn require_destination(state: &AppState, table: &str, id: i64) -> Result<Row, ApiError> {
    state
        .store
        .find(table, id)
        .await?
        .ok_or_else(|| ApiError::not_found("Destination not found."))
}
