//! End-to-end checks of the resolve/backup/apply/rollback protocol against
//! real files and the bundled XDT engine.

use config_transform::apply::backup::hash_file;
use config_transform::apply::{
    backup_path, ApplyFailure, ApplyOptions, ApplyOutcome, RejectionPolicy, RollbackStatus,
    SafeTransformApplier,
};
use config_transform::engine::XdtEngine;
use config_transform::resolver::ConventionResolver;
use config_transform::testing::{
    MockUserInteraction, RecordingReload, ScriptedEngine, TestContext, NON_MATCHING_TRANSFORM,
    SAMPLE_TRANSFORM, SAMPLE_WEB_CONFIG,
};
use config_transform::workflow::{ApplyTransformCommand, CommandStatus, ConfirmOptions};
use std::fs;

const SET_ONE_ATTRIBUTE: &str = r#"<?xml version="1.0" encoding="utf-8"?>
<configuration xmlns:xdt="http://schemas.microsoft.com/XML-Document-Transform">
  <appSettings>
    <add key="FeatureFlag" value="true" xdt:Transform="SetAttributes(value)" xdt:Locator="Match(key)" />
  </appSettings>
</configuration>
"#;

#[test]
fn test_staging_scenario_changes_one_attribute() {
    let ctx = TestContext::new().unwrap();
    let base = ctx.create_test_file("web.config", SAMPLE_WEB_CONFIG).unwrap();
    let xform = ctx
        .create_test_file("web.staging-HLG.config", SET_ONE_ATTRIBUTE)
        .unwrap();

    let resolved = ConventionResolver::default().resolve(&xform).unwrap();
    assert_eq!(resolved.base, base);
    assert_eq!(resolved.environment.as_str(), "HLG");

    let applier = SafeTransformApplier::new(XdtEngine::new());
    let outcome = applier.apply(&resolved.base, &xform);
    assert!(outcome.is_applied(), "unexpected outcome: {outcome:?}");

    let expected = SAMPLE_WEB_CONFIG.replace(
        r#"<add key="FeatureFlag" value="false" />"#,
        r#"<add key="FeatureFlag" value="true" />"#,
    );
    assert_eq!(ctx.read_file("web.config").unwrap(), expected);
    assert_eq!(ctx.read_file("web.config.backup").unwrap(), SAMPLE_WEB_CONFIG);
}

#[test]
fn test_full_sample_transform() {
    let ctx = TestContext::new().unwrap();
    let (base, xform) = ctx.with_sample_pair("web.pestana-stg.config").unwrap();

    let outcome = SafeTransformApplier::new(XdtEngine::new()).apply(&base, &xform);
    match outcome {
        ApplyOutcome::Applied { report, .. } => assert_eq!(report.applied, 4),
        other => panic!("unexpected outcome: {other:?}"),
    }

    let updated = ctx.read_file("web.config").unwrap();
    assert!(updated.contains(r#"<add key="Environment" value="Staging" />"#));
    assert!(updated.contains(r#"<add key="CacheSeconds" value="300" />"#));
    assert!(updated.contains("Server=staging-db;Database=App"));
    assert!(updated.contains(r#"<compilation targetFramework="4.8" />"#));
    assert!(!updated.contains("xdt:"));
    assert!(updated.contains(r#"<add key="FeatureFlag" value="false" />"#));
}

#[test]
fn test_apply_is_idempotent_from_restored_base() {
    let ctx = TestContext::new().unwrap();
    let base = ctx.create_test_file("web.config", SAMPLE_WEB_CONFIG).unwrap();
    let xform = ctx
        .create_test_file("web.staging-HLG.config", SET_ONE_ATTRIBUTE)
        .unwrap();
    let applier = SafeTransformApplier::new(XdtEngine::new());

    assert!(applier.apply(&base, &xform).is_applied());
    let first = fs::read(&base).unwrap();

    fs::write(&base, SAMPLE_WEB_CONFIG).unwrap();
    assert!(applier.apply(&base, &xform).is_applied());
    let second = fs::read(&base).unwrap();

    assert_eq!(first, second);
}

#[test]
fn test_failed_apply_leaves_base_hash_unchanged() {
    let ctx = TestContext::new().unwrap();
    let base = ctx.create_test_file("web.config", SAMPLE_WEB_CONFIG).unwrap();
    let xform = ctx
        .create_test_file("web.staging-HLG.config", "<configuration><appSettings>")
        .unwrap();
    let before = hash_file(&base).unwrap();

    let outcome = SafeTransformApplier::new(XdtEngine::new()).apply(&base, &xform);
    assert!(matches!(
        outcome,
        ApplyOutcome::Failed {
            reason: ApplyFailure::Engine(_),
            rollback: RollbackStatus::Restored,
            ..
        }
    ));
    assert_eq!(hash_file(&base).unwrap(), before);
    assert_eq!(hash_file(&backup_path(&base)).unwrap(), before);
}

#[test]
fn test_engine_throws_mid_transform() {
    let ctx = TestContext::new().unwrap();
    let base = ctx.create_test_file("web.config", SAMPLE_WEB_CONFIG).unwrap();
    let xform = ctx
        .create_test_file("web.staging-HLG.config", SAMPLE_TRANSFORM)
        .unwrap();
    let before = hash_file(&base).unwrap();

    for engine in [
        ScriptedEngine::corrupts_then_fails("<configuration><half"),
        ScriptedEngine::corrupts_then_panics("<configuration><half"),
    ] {
        let outcome = SafeTransformApplier::new(engine).apply(&base, &xform);
        assert!(matches!(outcome, ApplyOutcome::Failed { .. }));
        assert_eq!(outcome.rollback(), &RollbackStatus::Restored);
        assert_eq!(hash_file(&base).unwrap(), before);
        assert_eq!(hash_file(&backup_path(&base)).unwrap(), before);
    }
}

#[test]
fn test_unsupported_directive_fails_and_restores() {
    let ctx = TestContext::new().unwrap();
    let base = ctx.create_test_file("web.config", SAMPLE_WEB_CONFIG).unwrap();
    let xform = ctx
        .create_test_file(
            "web.staging-HLG.config",
            r#"<configuration xmlns:xdt="http://schemas.microsoft.com/XML-Document-Transform">
  <appSettings>
    <add key="X" xdt:Transform="InsertAfter(/configuration/appSettings/add)" />
  </appSettings>
</configuration>"#,
        )
        .unwrap();

    let outcome = SafeTransformApplier::new(XdtEngine::new()).apply(&base, &xform);
    match &outcome {
        ApplyOutcome::Failed {
            reason: ApplyFailure::Engine(e),
            ..
        } => assert!(e.is_descriptor_error()),
        other => panic!("unexpected outcome: {other:?}"),
    }
    assert_eq!(ctx.read_file("web.config").unwrap(), SAMPLE_WEB_CONFIG);
}

#[test]
fn test_non_matching_transform_is_rejected_under_both_policies() {
    for policy in [RejectionPolicy::Keep, RejectionPolicy::Restore] {
        let ctx = TestContext::new().unwrap();
        let base = ctx.create_test_file("web.config", SAMPLE_WEB_CONFIG).unwrap();
        let xform = ctx
            .create_test_file("web.staging-HLG.config", NON_MATCHING_TRANSFORM)
            .unwrap();

        let applier = SafeTransformApplier::with_options(
            XdtEngine::new(),
            ApplyOptions {
                rejection_policy: policy,
                lock_base_file: true,
            },
        );
        let outcome = applier.apply(&base, &xform);
        let expected_rollback = match policy {
            RejectionPolicy::Keep => RollbackStatus::NotAttempted,
            RejectionPolicy::Restore => RollbackStatus::Restored,
        };
        assert!(matches!(outcome, ApplyOutcome::TransformRejected { .. }));
        assert_eq!(outcome.rollback(), &expected_rollback);
        assert_eq!(ctx.read_file("web.config").unwrap(), SAMPLE_WEB_CONFIG);
        assert!(backup_path(&base).exists());
    }
}

#[test]
fn test_missing_base_never_invokes_apply() {
    let ctx = TestContext::new().unwrap();
    let xform = ctx
        .create_test_file("web.staging-HLG.config", SAMPLE_TRANSFORM)
        .unwrap();

    let resolver = ConventionResolver::default();
    assert!(resolver.find_base_file(&xform).is_none());

    let applier = SafeTransformApplier::new(ScriptedEngine::applies("<configuration />"));
    let ui = MockUserInteraction::new();
    let reload = RecordingReload::default();
    let status = ApplyTransformCommand::new(&resolver, &applier, &ui, &reload).execute(
        &xform,
        ConfirmOptions {
            assume_yes: true,
            force: false,
        },
    );

    assert_eq!(status, CommandStatus::BaseNotFound);
    assert!(!ctx.temp_path().join("web.config.backup").exists());
    assert!(reload.reloaded().is_empty());
}

#[test]
fn test_app_config_is_found_when_no_web_config() {
    let ctx = TestContext::new().unwrap();
    ctx.create_test_file("App.config", SAMPLE_WEB_CONFIG).unwrap();
    let xform = ctx
        .create_test_file("App.release-PRD.config", SET_ONE_ATTRIBUTE)
        .unwrap();

    let resolved = ConventionResolver::default().resolve(&xform).unwrap();
    let name = resolved.base.file_name().unwrap().to_string_lossy().to_lowercase();
    assert_eq!(name, "app.config");
    assert_eq!(resolved.environment.as_str(), "PRD");

    let outcome = SafeTransformApplier::new(XdtEngine::new()).apply(&resolved.base, &xform);
    assert!(outcome.is_applied());
    assert!(ctx.temp_path().join("App.config.backup").exists());
}

#[test]
fn test_untouched_attribute_layout_survives_apply() {
    let original = "<?xml version=\"1.0\" encoding=\"utf-8\"?>\n<configuration>\n  <appSettings>\n    <add key='Env' value='DEV' />\n    <add key=\"Url\"\n         value=\"http://dev\" />\n  </appSettings>\n</configuration>\n";
    let ctx = TestContext::new().unwrap();
    let base = ctx.create_test_file("web.config", original).unwrap();
    let xform = ctx
        .create_test_file(
            "web.staging-HLG.config",
            r#"<configuration xmlns:xdt="http://schemas.microsoft.com/XML-Document-Transform">
  <appSettings>
    <add key="Env" value="HLG" xdt:Transform="SetAttributes(value)" xdt:Locator="Match(key)" />
  </appSettings>
</configuration>"#,
        )
        .unwrap();

    let outcome = SafeTransformApplier::new(XdtEngine::new()).apply(&base, &xform);
    assert!(outcome.is_applied(), "unexpected outcome: {outcome:?}");
    assert_eq!(
        ctx.read_file("web.config").unwrap(),
        original.replace("value='DEV'", "value='HLG'")
    );
}
