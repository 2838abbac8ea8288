//! End-to-end flows through the public engine API.

use std::sync::Arc;

use chrono::{Duration, TimeZone, Utc};
use serde_json::{Map, json};

use warden::{
    AccessControl, AuditSink, Condition, ConditionOperator, Effect, EvaluationContext,
    MemoryAuditSink, Permission, Policy, PolicyRule, ResourceRef, UserId,
};

fn engine() -> (AccessControl, Arc<MemoryAuditSink>) {
    let sink = Arc::new(MemoryAuditSink::new());
    let engine = AccessControl::builder()
        .audit_sink(Arc::clone(&sink) as Arc<dyn AuditSink>)
        .build();
    (engine, sink)
}

#[test]
fn analyst_inherits_viewer_and_gains_temporary_export() {
    let (engine, _) = engine();
    let admin = UserId::from("admin");
    let user = UserId::from("analyst-1");

    engine
        .create_role("viewer", "Read-only", [Permission::ReportRead], &[])
        .unwrap();
    engine
        .create_role(
            "analyst",
            "Authoring",
            [Permission::ReportCreate, Permission::ReportExecute],
            &["viewer"],
        )
        .unwrap();
    engine.assign_role(&user, "analyst").unwrap();

    // Inherited and direct permissions both hold.
    assert!(engine.has_permission(&user, Permission::ReportRead, None));
    assert!(engine.has_permission(&user, Permission::ReportExecute, None));
    assert!(!engine.has_permission(&user, Permission::ReportExport, None));

    // Time-bounded export elevation on one report.
    let report = ResourceRef::new("report", "q3-revenue");
    engine
        .grant(
            &user,
            &report,
            [Permission::ReportExport],
            &admin,
            Some(Utc::now() + Duration::hours(1)),
        )
        .unwrap();

    assert!(engine.has_permission(&user, Permission::ReportExport, Some(&report)));
    // Scoped to that report only.
    let other = ResourceRef::new("report", "q4-forecast");
    assert!(!engine.has_permission(&user, Permission::ReportExport, Some(&other)));

    engine
        .revoke_grant(&user, &report, [Permission::ReportExport])
        .unwrap();
    assert!(!engine.has_permission(&user, Permission::ReportExport, Some(&report)));
}

#[test]
fn expired_grant_is_denied_then_swept() {
    let (engine, sink) = engine();
    let admin = UserId::from("admin");
    let user = UserId::from("u-1");
    let report = ResourceRef::new("report", "r-1");

    engine
        .grant(
            &user,
            &report,
            [Permission::ReportRead],
            &admin,
            Some(Utc::now() - Duration::minutes(5)),
        )
        .unwrap();

    // Denied lazily before any sweep runs.
    assert!(!engine.has_permission(&user, Permission::ReportRead, Some(&report)));

    assert_eq!(engine.cleanup_expired_grants().unwrap(), 1);
    assert_eq!(engine.cleanup_expired_grants().unwrap(), 0);

    let types: Vec<&str> = sink
        .events()
        .iter()
        .map(|e| e.action.event_type())
        .collect();
    assert!(types.contains(&"grant.expired"));
}

#[test]
fn deny_policy_outranks_allow_and_default_is_deny() {
    let (engine, _) = engine();
    let admin = UserId::from("admin");

    engine
        .create_policy(
            Policy::new("allow-business-hours", "", 50, admin.clone()).with_rule(
                PolicyRule::new("in-hours", Effect::Allow)
                    .with_condition(Condition::new(
                        "environment.hour",
                        ConditionOperator::Gte,
                        json!(9),
                    ))
                    .with_condition(Condition::new(
                        "environment.hour",
                        ConditionOperator::Lt,
                        json!(17),
                    )),
            ),
        )
        .unwrap();
    engine
        .create_policy(
            Policy::new("deny-restricted-offshore", "", 100, admin).with_rule(
                PolicyRule::new("offshore", Effect::Deny)
                    .with_condition(Condition::new(
                        "resource.sensitivity",
                        ConditionOperator::Eq,
                        json!("restricted"),
                    ))
                    .with_condition(
                        Condition::new(
                            "environment.country",
                            ConditionOperator::In,
                            json!(["US", "DE"]),
                        )
                        .negated(),
                    ),
            ),
        )
        .unwrap();

    let ctx_at = |sensitivity: &str, country: &str| {
        let mut resource_data = Map::new();
        resource_data.insert("sensitivity".to_string(), json!(sensitivity));
        let mut request = Map::new();
        request.insert("country".to_string(), json!(country));
        EvaluationContext::new(
            UserId::from("u-1"),
            "read",
            ResourceRef::new("report", "r-1"),
        )
        .with_resource_data(resource_data)
        .with_request_context(request)
        .at(Utc.with_ymd_and_hms(2025, 1, 8, 11, 0, 0).unwrap())
    };

    // Restricted data from an unlisted country: the higher-priority deny
    // fires before the business-hours allow is consulted.
    let decision = engine.evaluate_access(&ctx_at("restricted", "BR"));
    assert!(!decision.is_allowed());
    assert_eq!(decision.policy_results[0].policy, "deny-restricted-offshore");

    // Same request from an allowed country during business hours.
    assert!(engine.evaluate_access(&ctx_at("restricted", "DE")).is_allowed());

    // Outside business hours nothing applies: default deny.
    let mut resource_data = Map::new();
    resource_data.insert("sensitivity".to_string(), json!("internal"));
    let late = EvaluationContext::new(
        UserId::from("u-1"),
        "read",
        ResourceRef::new("report", "r-1"),
    )
    .with_resource_data(resource_data)
    .at(Utc.with_ymd_and_hms(2025, 1, 8, 22, 0, 0).unwrap());
    let decision = engine.evaluate_access(&late);
    assert!(!decision.is_allowed());
    assert!(decision.default_applied);
}

#[test]
fn dry_run_lists_candidate_policies_without_deciding() {
    let (engine, sink) = engine();
    let admin = UserId::from("admin");

    engine
        .create_policy(
            Policy::new("report-exports", "", 10, admin.clone()).with_rule(
                PolicyRule::new("r", Effect::Deny)
                    .with_condition(Condition::new(
                        "action.type",
                        ConditionOperator::Eq,
                        json!("export"),
                    ))
                    .with_condition(Condition::new(
                        "resource.type",
                        ConditionOperator::Eq,
                        json!("report"),
                    )),
            ),
        )
        .unwrap();
    engine
        .create_policy(
            Policy::new("baseline", "", 1, admin)
                .with_rule(PolicyRule::new("any", Effect::Allow)),
        )
        .unwrap();

    let before = sink.len();
    let names: Vec<String> = engine
        .applicable_policies("export", "report")
        .unwrap()
        .into_iter()
        .map(|p| p.name)
        .collect();
    assert_eq!(names, ["report-exports", "baseline"]);

    let names: Vec<String> = engine
        .applicable_policies("read", "dashboard")
        .unwrap()
        .into_iter()
        .map(|p| p.name)
        .collect();
    assert_eq!(names, ["baseline"]);

    // A dry run is not a decision and leaves no audit events.
    assert_eq!(sink.len(), before);
}

#[test]
fn system_role_survives_tampering_attempts() {
    let (engine, _) = engine();
    engine
        .create_system_role("platform-admin", "Root", Permission::ALL, &[])
        .unwrap();

    assert!(engine.delete_role("platform-admin").is_err());
    assert!(
        engine
            .update_role(
                "platform-admin",
                warden::RoleUpdate::new().permissions([Permission::ReportRead]),
            )
            .is_err()
    );

    // Assignment to system roles still works.
    let root = UserId::from("root");
    engine.assign_role(&root, "platform-admin").unwrap();
    assert!(engine.has_permission(&root, Permission::AdminPolicies, None));
}
