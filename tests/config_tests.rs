use std::fs;

use anyhow::Result;
use fastpath::build::*;
use fastpath::{
    Action, AnnotatedTemplate, FailurePolicy, Retention, RunnerConfig, Scope, SimpleBuilder, SpecializedRunner,
    Value, load_template, save_template,
};

fn temp_dir() -> tempfile::TempDir {
    tempfile::Builder::new()
        .prefix("fastpath-config-test")
        .tempdir()
        .expect("failed to create temp dir")
}

#[test]
fn runner_config_loads_from_yaml() -> Result<()> {
    let dir = temp_dir();
    let path = dir.path().join("runner.yaml");
    fs::write(
        &path,
        "verify: true\nretention:\n  kind: most_recent\n  count: 3\nfailure_policy: serve_last_good\nbuild_timeout_ms: 50\n",
    )?;

    let config = RunnerConfig::load(&path)?;
    assert!(config.verify);
    assert_eq!(config.retention, Retention::MostRecent(3));
    assert_eq!(config.failure_policy, FailurePolicy::ServeLastGood);
    assert_eq!(config.build_timeout_ms, Some(50));
    assert_eq!(config.max_failed_entries, RunnerConfig::default().max_failed_entries);
    Ok(())
}

#[test]
fn runner_config_loads_from_json() -> Result<()> {
    let dir = temp_dir();
    let path = dir.path().join("runner.json");
    fs::write(&path, r#"{ "retention": { "kind": "unbounded" }, "retry_failed": true }"#)?;

    let config = RunnerConfig::load(&path)?;
    assert_eq!(config.retention, Retention::Unbounded);
    assert!(config.retry_failed);
    assert!(!config.verify);
    Ok(())
}

#[test]
fn unknown_config_formats_are_rejected() -> Result<()> {
    let dir = temp_dir();
    let path = dir.path().join("runner.ini");
    fs::write(&path, "verify = true\n")?;

    let err = RunnerConfig::load(&path).expect_err("ini is not supported");
    assert!(err.to_string().contains("unsupported config format"));
    assert!(RunnerConfig::load(dir.path().join("missing.yaml")).is_err());
    Ok(())
}

#[test]
fn saved_templates_drive_a_runner() -> Result<()> {
    let dir = temp_dir();
    let template = AnnotatedTemplate::new(
        "scale",
        ["factor", "x"],
        vec![
            region(1, vec![expr(call("len", vec![list(vec![var("x")])]))]),
            region(2, vec![ret(mul(var("x"), var("factor")))]),
        ],
    )
    .with_directive(1, Action::DropIf(eq(var("factor"), int(1))))
    .with_directive(2, Action::Inline);

    for name in ["scale.json", "scale.yaml"] {
        let path = dir.path().join(name);
        save_template(&template, &path)?;
        let loaded = load_template(&path)?;
        assert_eq!(loaded, template);

        let runner = SpecializedRunner::new(loaded, SimpleBuilder::new(["factor"]), Scope::with_prelude())?;
        assert_eq!(runner.call(&[Value::Int(1), Value::Int(7)])?, Value::Int(7));
        assert!(runner.current_source().is_some_and(|source| !source.contains("len")));
    }
    Ok(())
}
