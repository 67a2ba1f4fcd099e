use utoipa::openapi::security::{ApiKey, ApiKeyValue, HttpAuthScheme, HttpBuilder, SecurityScheme};
use utoipa::{Modify, OpenApi};

use crate::models::{
    ClassDefinition, ClassInput, ClassTotals, MonthSummary, MonthView, RuleInput,
    SaveSessionsRequest, ScheduleRule, ScheduleSlot, Session, SessionEdit, SessionStatus,
};

pub struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        let Some(components) = openapi.components.as_mut() else {
            return;
        };
        components.add_security_scheme(
            "bearer_auth",
            SecurityScheme::Http(HttpBuilder::new().scheme(HttpAuthScheme::Bearer).build()),
        );
        components.add_security_scheme(
            "query_token",
            SecurityScheme::ApiKey(ApiKey::Query(ApiKeyValue::new("token"))),
        );
    }
}

#[derive(OpenApi)]
#[openapi(
    paths(
        crate::handlers::root,
        crate::handlers::healthz_live,
        crate::handlers::healthz_ready,
        crate::handlers::list_classes,
        crate::handlers::create_class,
        crate::handlers::update_class,
        crate::handlers::delete_class,
        crate::handlers::list_rules,
        crate::handlers::create_rule,
        crate::handlers::delete_rule,
        crate::handlers::get_month_sessions,
        crate::handlers::save_month_sessions,
        crate::handlers::reset_month_sessions,
        crate::handlers::get_month_summary,
        crate::handlers::get_month_ical
    ),
    components(schemas(
        ScheduleSlot,
        ClassDefinition,
        ClassInput,
        ScheduleRule,
        RuleInput,
        SessionStatus,
        Session,
        SessionEdit,
        SaveSessionsRequest,
        ClassTotals,
        MonthSummary,
        MonthView
    )),
    tags(
        (name = "schedule", description = "Service endpoints"),
        (name = "classes", description = "Class definitions and weekly rules"),
        (name = "sessions", description = "Monthly session ledger, totals and calendar export")
    ),
    modifiers(&SecurityAddon),
)]
pub struct ApiDoc;
