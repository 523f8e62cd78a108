use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Barrier, mpsc};
use std::thread;
use std::time::Duration;

use fastpath::build::*;
use fastpath::cache::CacheOptions;
use fastpath::{
    Action, AnnotatedTemplate, CacheError, ConversionRoutine, Fingerprint, FingerprintError, Generation, Generator,
    Scope, SpecializationBuilder, SpecializationCache, SpecializedRunner, StableInputs, Value,
};

fn template() -> AnnotatedTemplate {
    AnnotatedTemplate::new(
        "affine",
        ["a", "b", "x"],
        vec![region(1, vec![ret(add(mul(var("a"), var("x")), var("b")))])],
    )
    .with_directive(1, Action::Inline)
}

/// Builder whose builds take long enough for callers to pile up behind them.
#[derive(Default)]
struct SlowBuilder {
    builds: AtomicUsize,
}

impl SpecializationBuilder for SlowBuilder {
    fn stable_params(&self) -> Vec<String> {
        vec!["a".into(), "b".into()]
    }

    fn fingerprint(&self, stable: &StableInputs) -> Result<Fingerprint, FingerprintError> {
        Ok(Fingerprint::hashed(stable.values()))
    }

    fn on_generated(&self, _generation: &Generation) {
        self.builds.fetch_add(1, Ordering::SeqCst);
        thread::sleep(Duration::from_millis(50));
    }
}

#[test]
fn concurrent_callers_share_one_build() {
    const THREADS: usize = 8;
    let runner = Arc::new(SpecializedRunner::new(template(), SlowBuilder::default(), Scope::new()).expect("valid"));
    let barrier = Arc::new(Barrier::new(THREADS));

    let handles: Vec<_> = (0..THREADS)
        .map(|x| {
            let runner = Arc::clone(&runner);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                let x = i64::try_from(x).expect("small");
                let outcome = runner
                    .call_with_outcome(&[Value::Int(3), Value::Int(1), Value::Int(x)])
                    .expect("call");
                (x, outcome)
            })
        })
        .collect();

    let mut generations = Vec::new();
    for handle in handles {
        let (x, outcome) = handle.join().expect("thread panicked");
        assert_eq!(outcome.value, Value::Int(3 * x + 1));
        generations.push(outcome.dispatch.generation().expect("specialized"));
    }

    generations.dedup();
    assert_eq!(generations.len(), 1);
    assert_eq!(runner.builder().builds.load(Ordering::SeqCst), 1);
    let stats = runner.cache_stats();
    assert_eq!(stats.builds_started, 1);
    assert_eq!(stats.builds_failed, 0);
}

#[test]
fn distinct_fingerprints_build_independently() {
    let runner = Arc::new(SpecializedRunner::new(template(), SlowBuilder::default(), Scope::new()).expect("valid"));
    let handles: Vec<_> = (0..4)
        .map(|a| {
            let runner = Arc::clone(&runner);
            thread::spawn(move || runner.call(&[Value::Int(a), Value::Int(0), Value::Int(10)]))
        })
        .collect();
    for (a, handle) in handles.into_iter().enumerate() {
        let a = i64::try_from(a).expect("small");
        assert_eq!(handle.join().expect("thread panicked"), Ok(Value::Int(a * 10)));
    }
    assert_eq!(runner.builder().builds.load(Ordering::SeqCst), 4);
}

#[test]
fn timed_out_waiters_never_build() {
    let conversion = ConversionRoutine::build(Arc::new(template()), &["a".to_string(), "b".to_string()])
        .expect("valid template");
    let generator = Generator::new(Arc::new(conversion), Arc::new(Scope::new()), "affine");
    let cache = Arc::new(SpecializationCache::new(
        "affine",
        CacheOptions {
            build_timeout: Some(Duration::from_millis(20)),
            ..CacheOptions::default()
        },
    ));
    let stable: StableInputs = [("a", Value::Int(2)), ("b", Value::Int(5))].into_iter().collect();
    let fp = Fingerprint::hashed(stable.values());

    let (started_tx, started_rx) = mpsc::channel();
    let (release_tx, release_rx) = mpsc::channel::<()>();
    let leader = {
        let cache = Arc::clone(&cache);
        let fp = fp.clone();
        thread::spawn(move || {
            cache.get_or_build(&fp, false, |id| {
                started_tx.send(()).expect("test alive");
                release_rx.recv().expect("released");
                generator.generate(&fp, &stable, id)
            })
        })
    };

    started_rx.recv().expect("leader started");
    let err = cache
        .get_or_build(&fp, false, |_| panic!("a waiter must not start a build"))
        .expect_err("waiter times out");
    assert!(matches!(err, CacheError::Timeout { .. }));

    release_tx.send(()).expect("leader alive");
    let generation = leader.join().expect("leader panicked").expect("leader builds");
    assert_eq!(generation.call(&[Value::Int(4)]), Ok(Value::Int(13)));

    let stats = cache.stats();
    assert_eq!(stats.builds_started, 1);
    assert_eq!(stats.timeouts, 1);
    assert_eq!(stats.waits, 1);
}
