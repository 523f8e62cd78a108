use std::sync::atomic::{AtomicUsize, Ordering};

use fastpath::build::*;
use fastpath::errors::BuildFailure;
use fastpath::{
    Action, AnnotatedTemplate, Node, RegionId, Dispatch, FailurePolicy, FallbackReason, Fingerprint, FingerprintError, Generation,
    GenerationId, RecalculationMode, Retention, RunnerConfig, Scope, SimpleBuilder, SpecializationBuilder,
    SpecializedRunner, StableInputs, Value, VerificationMismatchError,
};

fn clamp_template() -> AnnotatedTemplate {
    AnnotatedTemplate::new(
        "clamp",
        ["threshold", "x"],
        vec![region(
            1,
            vec![ret(call("min", vec![add(var("x"), var("threshold")), mul(var("threshold"), int(2))]))],
        )],
    )
    .with_directive(1, Action::Inline)
}

fn args(threshold: i64, x: i64) -> Vec<Value> {
    vec![Value::Int(threshold), Value::Int(x)]
}

#[test]
fn threshold_change_triggers_exactly_one_rebuild() {
    let runner = SpecializedRunner::new(clamp_template(), SimpleBuilder::new(["threshold"]), Scope::with_prelude())
        .expect("valid template");

    let first = runner.call(&args(10, 5)).expect("call");
    assert_eq!(first, runner.call_original(&args(10, 5)).expect("original"));
    assert_eq!(first, Value::Int(15));
    assert_eq!(
        runner.current_source().as_deref(),
        Some("fn clamp(x) {\n    return min((x + 10), 20);\n}\n")
    );

    runner.call(&args(10, 7)).expect("call");
    assert_eq!(runner.cache_stats().builds_started, 1);

    let second = runner.call(&args(20, 5)).expect("call");
    assert_eq!(second, runner.call_original(&args(20, 5)).expect("original"));
    assert_eq!(second, Value::Int(25));
    assert_eq!(runner.cache_stats().builds_started, 2);
    assert!(runner.current_source().is_some_and(|source| source.contains("min((x + 20), 40)")));
}

#[test]
fn broken_specialization_falls_back_to_the_original() {
    // Killing the `let` leaves the specialized body referring to an unbound local.
    let template = AnnotatedTemplate::new(
        "shift",
        ["k", "x"],
        vec![region(1, vec![let_("limit", var("k"))]), ret(add(var("x"), var("limit")))],
    )
    .with_directive(1, Action::Kill);
    let runner = SpecializedRunner::new(template, SimpleBuilder::new(["k"]), Scope::new()).expect("valid template");

    let outcome = runner.call_with_outcome(&args(3, 4)).expect("call");
    assert_eq!(outcome.value, runner.call_original(&args(3, 4)).expect("original"));
    match &outcome.dispatch {
        Dispatch::Original(FallbackReason::Build(err)) => {
            assert!(matches!(err.cause, BuildFailure::Compile(_)));
            assert!(err.source_text.as_deref().is_some_and(|text| text.contains("(x + limit)")));
        }
        other => panic!("expected a fallback, got {other:?}"),
    }

    // The failure is cached: no second build for the same inputs.
    assert_eq!(runner.call(&args(3, 1)).expect("call"), Value::Int(4));
    let stats = runner.cache_stats();
    assert_eq!(stats.builds_started, 1);
    assert_eq!(stats.builds_failed, 1);
    assert!(runner.current_generation().is_none());
}

fn weighted_template() -> AnnotatedTemplate {
    AnnotatedTemplate::new(
        "weighted",
        ["weights", "x"],
        vec![
            let_("total", int(0)),
            region(
                1,
                vec![for_(
                    "w",
                    var("weights"),
                    vec![assign("total", add(var("total"), mul(var("w"), var("x"))))],
                )],
            ),
            ret(var("total")),
        ],
    )
    .with_directive(1, Action::Unroll)
}

#[test]
fn last_good_generation_is_served_when_opted_in() {
    let builder = SimpleBuilder::new(["weights"]).failure_policy(FailurePolicy::ServeLastGood);
    let runner = SpecializedRunner::new(weighted_template(), builder, Scope::new()).expect("valid template");

    let weights = Value::list([Value::Int(1), Value::Int(2)]);
    assert_eq!(runner.call(&[weights, Value::Int(3)]).expect("call"), Value::Int(9));

    // An int cannot be unrolled; the previous generation answers instead.
    let outcome = runner.call_with_outcome(&[Value::Int(5), Value::Int(3)]).expect("call");
    assert_eq!(outcome.value, Value::Int(9));
    assert!(matches!(
        outcome.dispatch,
        Dispatch::LastGood {
            generation: GenerationId(1),
            reason: FallbackReason::Build(_)
        }
    ));
}

#[test]
fn fallback_surfaces_errors_of_the_original() {
    let runner =
        SpecializedRunner::new(weighted_template(), SimpleBuilder::new(["weights"]), Scope::new()).expect("valid");
    let weights = Value::list([Value::Int(1), Value::Int(2)]);
    runner.call(&[weights, Value::Int(3)]).expect("call");

    // Both the specialization and the original reject a non-list.
    assert!(runner.call(&[Value::Int(5), Value::Int(3)]).is_err());
}

#[test]
fn equivalent_specializations_verify_cleanly() {
    let builder = SimpleBuilder::new(["threshold"]).verify(true);
    let runner = SpecializedRunner::new(clamp_template(), builder, Scope::with_prelude()).expect("valid template");
    assert!(runner.verification_enabled());

    for threshold in [0, 10, -4] {
        for x in [-20, 0, 3, 100] {
            let outcome = runner.call_with_outcome(&args(threshold, x)).expect("call");
            assert!(outcome.mismatch.is_none());
        }
    }
    assert_eq!(runner.mismatch_count(), 0);
}

#[derive(Default)]
struct Recording {
    generated: AtomicUsize,
    mismatches: AtomicUsize,
}

impl SpecializationBuilder for Recording {
    fn stable_params(&self) -> Vec<String> {
        vec!["k".into()]
    }

    fn fingerprint(&self, stable: &StableInputs) -> Result<Fingerprint, FingerprintError> {
        match stable.get("k") {
            Some(Value::Int(k)) if *k < 0 => Err(FingerprintError::new(format!("negative k: {k}"))),
            _ => Ok(Fingerprint::of_values(stable.values())),
        }
    }

    fn verification_enabled(&self) -> bool {
        true
    }

    fn on_generated(&self, _generation: &Generation) {
        self.generated.fetch_add(1, Ordering::SeqCst);
    }

    fn on_mismatch(&self, _mismatch: &VerificationMismatchError) {
        self.mismatches.fetch_add(1, Ordering::SeqCst);
    }
}

fn counting_template() -> AnnotatedTemplate {
    AnnotatedTemplate::new(
        "count",
        ["k", "x"],
        vec![
            let_("total", var("x")),
            region(1, vec![assign("total", add(var("total"), int(1)))]),
            ret(add(var("total"), var("k"))),
        ],
    )
    .with_directive(1, Action::Kill)
}

#[test]
fn mismatches_are_reported_without_changing_the_result() {
    let runner = SpecializedRunner::new(counting_template(), Recording::default(), Scope::new()).expect("valid");

    let outcome = runner.call_with_outcome(&args(2, 5)).expect("call");
    assert_eq!(outcome.value, Value::Int(7));
    let mismatch = outcome.mismatch.expect("mismatch detected");
    assert_eq!(mismatch.specialized, Ok(Value::Int(7)));
    assert_eq!(mismatch.original, Ok(Value::Int(8)));
    assert_eq!(mismatch.args, args(2, 5));

    assert_eq!(runner.builder().generated.load(Ordering::SeqCst), 1);
    assert_eq!(runner.builder().mismatches.load(Ordering::SeqCst), 1);
    assert_eq!(runner.take_mismatches().len(), 1);
    assert!(runner.take_mismatches().is_empty());

    runner.set_verification(false);
    let outcome = runner.call_with_outcome(&args(2, 5)).expect("call");
    assert!(outcome.mismatch.is_none());
    assert_eq!(runner.mismatch_count(), 1);
}

#[test]
fn fingerprint_failures_run_the_original() {
    let runner = SpecializedRunner::new(counting_template(), Recording::default(), Scope::new()).expect("valid");

    let outcome = runner.call_with_outcome(&args(-1, 5)).expect("call");
    assert_eq!(outcome.value, Value::Int(5));
    assert!(matches!(outcome.dispatch, Dispatch::Original(FallbackReason::Fingerprint(_))));
    assert!(outcome.mismatch.is_none());
    assert_eq!(runner.cache_stats().builds_started, 0);
}

#[test]
fn manual_mode_rebuilds_only_on_refresh() {
    let builder = SimpleBuilder::new(["threshold"]).mode(RecalculationMode::Manual);
    let runner = SpecializedRunner::new(clamp_template(), builder, Scope::with_prelude()).expect("valid template");

    assert_eq!(runner.call(&args(10, 5)).expect("call"), Value::Int(15));
    // Stale on purpose: the threshold of 10 is still baked in.
    assert_eq!(runner.call(&args(20, 5)).expect("call"), Value::Int(15));
    assert_eq!(runner.cache_stats().builds_started, 1);

    let refreshed = runner.refresh(&args(20, 0)).expect("refresh");
    assert_eq!(refreshed, GenerationId(2));
    assert_eq!(runner.call(&args(20, 5)).expect("call"), Value::Int(25));
    assert_eq!(runner.builder().last_source(), runner.current_source());
}

#[test]
fn config_reaches_the_cache_and_builder_overrides_win() {
    let config = RunnerConfig {
        retention: Retention::Unbounded,
        verify: true,
        ..RunnerConfig::default()
    };
    let builder = SimpleBuilder::new(["threshold"]).retention(Retention::MostRecent(2));
    let runner = SpecializedRunner::with_config(clamp_template(), builder, Scope::with_prelude(), config)
        .expect("valid template");

    assert!(runner.verification_enabled());
    assert_eq!(runner.config().retention, Retention::MostRecent(2));
    for threshold in 0..4 {
        runner.call(&args(threshold, 1)).expect("call");
    }
    assert_eq!(runner.cache_stats().entries, 2);
    assert_eq!(runner.cache_stats().evictions, 2);
}

#[test]
fn current_source_follows_the_inputs_back_to_cached_generations() {
    let builder = SimpleBuilder::new(["threshold"]).retention(Retention::MostRecent(2));
    let runner = SpecializedRunner::new(clamp_template(), builder, Scope::with_prelude()).expect("valid template");

    runner.call(&args(10, 5)).expect("call");
    runner.call(&args(20, 5)).expect("call");
    let outcome = runner.call_with_outcome(&args(10, 5)).expect("call");
    assert_eq!(outcome.dispatch.generation(), Some(GenerationId(1)));
    assert_eq!(runner.cache_stats().builds_started, 2);

    let current = runner.current_generation().expect("a generation is current");
    assert_eq!(current.id, GenerationId(1));
    assert_eq!(
        runner.current_source().as_deref(),
        Some("fn clamp(x) {\n    return min((x + 10), 20);\n}\n")
    );
    let snapshot = runner.snapshot();
    assert_eq!(snapshot.current_generation.map(|summary| summary.id), Some(GenerationId(1)));
}

/// Supplies `x * x * ...` for the `power` region, `degree` factors deep.
#[derive(Default)]
struct Powers {
    asked: AtomicUsize,
}

impl SpecializationBuilder for Powers {
    fn stable_params(&self) -> Vec<String> {
        vec!["degree".into()]
    }

    fn fingerprint(&self, stable: &StableInputs) -> Result<Fingerprint, FingerprintError> {
        Ok(Fingerprint::of_values(stable.values()))
    }

    fn template(&self, region: RegionId, label: Option<&str>, stable: &StableInputs) -> Option<Vec<Node>> {
        assert_eq!((region, label), (RegionId(1), Some("power")));
        self.asked.fetch_add(1, Ordering::SeqCst);
        let Some(Value::Int(degree)) = stable.get("degree") else {
            return None;
        };
        let product = (1..*degree).fold(var("x"), |acc, _| mul(acc, var("x")));
        (*degree > 1).then(|| vec![ret(product)])
    }
}

fn power_template() -> AnnotatedTemplate {
    AnnotatedTemplate::new(
        "power",
        ["degree", "x"],
        vec![Node::Region(fastpath::ast::Region::new(1, vec![ret(var("x"))]).with_label("power"))],
    )
    .with_directive(1, Action::Template)
}

#[test]
fn builder_supplies_template_region_bodies_once_per_fingerprint() {
    let runner =
        SpecializedRunner::new(power_template(), Powers::default(), Scope::with_prelude()).expect("valid template");

    assert_eq!(runner.call(&[Value::Int(3), Value::Int(2)]).expect("call"), Value::Int(8));
    assert_eq!(runner.call(&[Value::Int(3), Value::Int(4)]).expect("call"), Value::Int(64));
    assert_eq!(runner.builder().asked.load(Ordering::SeqCst), 1);
    assert_eq!(
        runner.current_source().as_deref(),
        Some("fn power(x) {\n    return ((x * x) * x);\n}\n")
    );

    // No body supplied: the region's own body is specialized.
    assert_eq!(runner.call(&[Value::Int(1), Value::Int(5)]).expect("call"), Value::Int(5));
    assert_eq!(runner.builder().asked.load(Ordering::SeqCst), 2);
    assert_eq!(runner.call_original(&[Value::Int(3), Value::Int(2)]).expect("call"), Value::Int(2));
}
