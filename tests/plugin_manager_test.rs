//! Plugin manager integration tests
//! Run with: cargo test --test plugin_manager_test

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Once};
use std::time::Duration;

use serde_json::{json, Value};

use nocto::application::errors::{HookError, Operation, PluginError};
use nocto::domain::traits::NullApi;
use nocto::infrastructure::plugins::StaticModuleLoader;
use nocto::plugins::{
    AppInfo, InvokeOptions, LoadContext, PluginEvent, PluginHandlers, PluginManager,
    PluginManagerOptions, PluginResources, ServiceConsumerContext, ServiceFactory, ServiceHandle,
    StateChange, HANDLE_MESSAGE,
};

static INIT: Once = Once::new();

fn ensure_init() {
    INIT.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    });
}

/// Counts hook and handler invocations of one test plugin
#[derive(Default)]
struct HookCounts {
    loads: AtomicUsize,
    enables: AtomicUsize,
    disables: AtomicUsize,
    messages: AtomicUsize,
}

impl HookCounts {
    fn count(counter: &AtomicUsize) -> usize {
        counter.load(Ordering::SeqCst)
    }
}

fn counting_plugin(
    counts: Arc<HookCounts>,
) -> impl Fn(&LoadContext) -> Result<PluginHandlers, HookError> + Send + Sync + 'static {
    move |_context| {
        counts.loads.fetch_add(1, Ordering::SeqCst);
        let on_enable = counts.clone();
        let on_disable = counts.clone();
        let on_message = counts.clone();
        Ok(PluginHandlers::new()
            .on_enable(move || {
                let counts = on_enable.clone();
                async move {
                    tokio::time::sleep(Duration::from_millis(5)).await;
                    counts.enables.fetch_add(1, Ordering::SeqCst);
                    Ok(())
                }
            })
            .on_disable(move || {
                let counts = on_disable.clone();
                async move {
                    counts.disables.fetch_add(1, Ordering::SeqCst);
                    Ok(())
                }
            })
            .on(HANDLE_MESSAGE, move |_args| {
                on_message.messages.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }))
    }
}

fn manager_at(loader: StaticModuleLoader, names: &[&str], base_path: &Path) -> PluginManager {
    manager_with_overrides(loader, names, base_path, HashMap::new())
}

fn manager_with_overrides(
    loader: StaticModuleLoader,
    names: &[&str],
    base_path: &Path,
    overrides: HashMap<String, Value>,
) -> PluginManager {
    ensure_init();
    let options = PluginManagerOptions {
        base_path: base_path.to_path_buf(),
        names: names.iter().map(|n| n.to_string()).collect(),
        overrides,
    };
    PluginManager::new(
        options,
        Arc::new(loader),
        PluginResources::new(Arc::new(NullApi), AppInfo::default()),
    )
}

fn manager(loader: StaticModuleLoader, names: &[&str]) -> PluginManager {
    manager_at(loader, names, &PathBuf::from("/nonexistent/plugins"))
}

fn names(list: &[&str]) -> Vec<String> {
    list.iter().map(|n| n.to_string()).collect()
}

#[tokio::test]
async fn test_load_makes_plugin_loaded_but_not_enabled() {
    let counts = Arc::new(HookCounts::default());
    let plugins = manager(
        StaticModuleLoader::new().with("alpha", counting_plugin(counts.clone())),
        &["alpha"],
    );

    let outcomes = plugins.load(None).await;

    assert!(outcomes.is_clean());
    assert!(plugins.is_loaded("alpha"));
    assert!(!plugins.is_enabled("alpha"));
    assert!(plugins.get_units().contains_key("alpha"));
    assert_eq!(HookCounts::count(&counts.loads), 1);
    assert_eq!(HookCounts::count(&counts.enables), 0);
    assert!(plugins.unit("alpha").unwrap().config().is_none());
}

#[tokio::test]
async fn test_double_load_reports_already_loaded() {
    let counts = Arc::new(HookCounts::default());
    let plugins = manager(
        StaticModuleLoader::new().with("alpha", counting_plugin(counts.clone())),
        &["alpha"],
    );
    let list = names(&["alpha"]);
    assert!(plugins.load(Some(list.as_slice())).await.is_clean());

    let again = plugins.load(Some(list.as_slice())).await;
    assert!(matches!(
        again.get("alpha"),
        Some(Err(PluginError::AlreadyLoaded(name))) if name == "alpha"
    ));
    assert_eq!(HookCounts::count(&counts.loads), 1);
}

#[tokio::test]
async fn test_concurrent_load_of_same_name_loads_once() {
    let counts = Arc::new(HookCounts::default());
    let plugins = manager(
        StaticModuleLoader::new().with("alpha", counting_plugin(counts.clone())),
        &["alpha"],
    );
    let list = names(&["alpha"]);

    let (first, second) = tokio::join!(
        plugins.load(Some(list.as_slice())),
        plugins.load(Some(list.as_slice()))
    );

    let results = [first.get("alpha").unwrap(), second.get("alpha").unwrap()];
    assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
    assert!(results
        .iter()
        .any(|r| matches!(r, Err(PluginError::AlreadyLoaded(_)))));
    assert_eq!(HookCounts::count(&counts.loads), 1);
}

#[tokio::test]
async fn test_enable_runs_hook_exactly_once() {
    let counts = Arc::new(HookCounts::default());
    let plugins = manager(
        StaticModuleLoader::new().with("alpha", counting_plugin(counts.clone())),
        &["alpha"],
    );
    plugins.load(None).await;

    let first = plugins.enable(None).await;
    assert!(matches!(first.get("alpha"), Some(Ok(StateChange::Changed(_)))));
    assert!(plugins.is_enabled("alpha"));

    let second = plugins.enable(None).await;
    assert!(matches!(second.get("alpha"), Some(Ok(StateChange::Unchanged(_)))));
    assert_eq!(HookCounts::count(&counts.enables), 1);
}

#[tokio::test]
async fn test_concurrent_enable_invokes_hook_once() {
    let counts = Arc::new(HookCounts::default());
    let plugins = manager(
        StaticModuleLoader::new().with("alpha", counting_plugin(counts.clone())),
        &["alpha"],
    );
    plugins.load(None).await;

    let (first, second) = tokio::join!(plugins.enable(None), plugins.enable(None));

    let changed = [first.get("alpha").unwrap(), second.get("alpha").unwrap()]
        .iter()
        .filter(|r| matches!(r, Ok(change) if change.is_changed()))
        .count();
    assert_eq!(changed, 1);
    assert_eq!(HookCounts::count(&counts.enables), 1);
    assert!(plugins.is_enabled("alpha"));
}

#[tokio::test]
async fn test_failed_enable_leaves_plugin_disabled() {
    let plugins = manager(
        StaticModuleLoader::new().with("grumpy", |_: &LoadContext| {
            Ok(PluginHandlers::new().on_enable(|| async { Err(HookError::new("not today")) }))
        }),
        &["grumpy"],
    );
    plugins.load(None).await;

    let outcomes = plugins.enable(None).await;

    match outcomes.get("grumpy") {
        Some(Err(PluginError::OperationFailed {
            operation, unit, source,
        })) => {
            assert_eq!(*operation, Operation::Enable);
            assert_eq!(unit.name(), "grumpy");
            assert_eq!(source.to_string(), "not today");
        }
        other => panic!("unexpected outcome: {:?}", other),
    }
    assert!(!plugins.is_enabled("grumpy"));
}

#[tokio::test]
async fn test_failed_disable_still_marks_disabled() {
    let plugins = manager(
        StaticModuleLoader::new().with("sticky", |_: &LoadContext| {
            Ok(PluginHandlers::new()
                .on_enable(|| async { Ok(()) })
                .on_disable(|| async { Err(HookError::new("still busy")) }))
        }),
        &["sticky"],
    );
    plugins.load(None).await;
    plugins.enable(None).await;
    assert!(plugins.is_enabled("sticky"));

    let outcomes = plugins.disable(None).await;

    assert!(matches!(
        outcomes.get("sticky"),
        Some(Err(PluginError::OperationFailed { operation: Operation::Disable, .. }))
    ));
    assert!(!plugins.is_enabled("sticky"));
}

#[tokio::test]
async fn test_panicking_hook_is_reported_as_failure() {
    let plugins = manager(
        StaticModuleLoader::new().with("wild", |_: &LoadContext| {
            Ok(PluginHandlers::new().on_enable(|| async {
                if true {
                    panic!("hook exploded");
                }
                Ok(())
            }))
        }),
        &["wild"],
    );
    plugins.load(None).await;

    let outcomes = plugins.enable(None).await;

    let error = outcomes.get("wild").unwrap().as_ref().unwrap_err();
    assert!(error.to_string().contains("hook exploded"));
    assert!(!plugins.is_enabled("wild"));
}

#[tokio::test]
async fn test_batch_failures_are_isolated() {
    let counts = Arc::new(HookCounts::default());
    let plugins = manager(
        StaticModuleLoader::new()
            .with("good", counting_plugin(counts.clone()))
            .with("broken", |_: &LoadContext| Err(HookError::new("bad wiring"))),
        &["good", "broken", "missing"],
    );

    let loaded = plugins.load(None).await;

    assert_eq!(loaded.len(), 3);
    assert!(loaded.get("good").unwrap().is_ok());
    assert!(matches!(loaded.get("broken"), Some(Err(PluginError::Load { .. }))));
    assert!(matches!(loaded.get("missing"), Some(Err(PluginError::Load { .. }))));
    assert_eq!(loaded.succeeded(), vec!["good"]);

    let enabled = plugins.enable(None).await;
    assert!(enabled.get("good").unwrap().is_ok());
    assert!(matches!(enabled.get("broken"), Some(Err(PluginError::NotLoaded(_)))));
    assert!(plugins.is_enabled("good"));
}

#[tokio::test]
async fn test_operations_on_unknown_plugins() {
    let plugins = manager(StaticModuleLoader::new(), &[]);
    let ghost = names(&["ghost"]);

    assert!(matches!(
        plugins.enable(Some(ghost.as_slice())).await.get("ghost"),
        Some(Err(PluginError::NotLoaded(_)))
    ));
    assert!(matches!(
        plugins.disable(Some(ghost.as_slice())).await.get("ghost"),
        Some(Err(PluginError::NotLoaded(_)))
    ));
    assert!(matches!(
        plugins.unload(Some(ghost.as_slice())).await.get("ghost"),
        Some(Err(PluginError::NotLoaded(_)))
    ));
    assert!(plugins.load(Some(&[] as &[String])).await.is_empty());
}

#[tokio::test]
async fn test_unload_skips_disable_hook() {
    let counts = Arc::new(HookCounts::default());
    let plugins = manager(
        StaticModuleLoader::new().with("alpha", counting_plugin(counts.clone())),
        &["alpha"],
    );
    plugins.load(None).await;
    plugins.enable(None).await;

    let outcomes = plugins.unload(None).await;

    assert!(outcomes.is_clean());
    assert!(!plugins.is_loaded("alpha"));
    assert!(!plugins.is_enabled("alpha"));
    assert_eq!(HookCounts::count(&counts.disables), 0);
}

#[tokio::test]
async fn test_invoke_handler_survives_failing_plugins() {
    let counts = Arc::new(HookCounts::default());
    let plugins = manager(
        StaticModuleLoader::new()
            .with("failing", |_: &LoadContext| {
                Ok(PluginHandlers::new().on(HANDLE_MESSAGE, |_| Err(HookError::new("nope"))))
            })
            .with("panicking", |_: &LoadContext| {
                Ok(PluginHandlers::new().on(HANDLE_MESSAGE, |_| -> Result<(), HookError> {
                    panic!("handler exploded")
                }))
            })
            .with("counting", counting_plugin(counts.clone())),
        &["failing", "panicking", "counting"],
    );
    plugins.load(None).await;
    plugins.enable(None).await;

    plugins.invoke_handler(HANDLE_MESSAGE, InvokeOptions::default(), &[json!({}), json!({})]);
    plugins.invoke_handler("handle_callback", InvokeOptions::default(), &[]);

    assert_eq!(HookCounts::count(&counts.messages), 1);
}

#[tokio::test]
async fn test_invoke_handler_respects_require_enabled() {
    let counts = Arc::new(HookCounts::default());
    let plugins = manager(
        StaticModuleLoader::new().with("alpha", counting_plugin(counts.clone())),
        &["alpha"],
    );
    plugins.load(None).await;

    plugins.invoke_handler(HANDLE_MESSAGE, InvokeOptions::default(), &[]);
    assert_eq!(HookCounts::count(&counts.messages), 0);

    plugins.invoke_handler(
        HANDLE_MESSAGE,
        InvokeOptions {
            require_enabled: false,
        },
        &[],
    );
    assert_eq!(HookCounts::count(&counts.messages), 1);
}

#[tokio::test]
async fn test_enable_queue_is_a_union_and_drains() {
    let counts: Vec<Arc<HookCounts>> = (0..3).map(|_| Arc::new(HookCounts::default())).collect();
    let loader = StaticModuleLoader::new()
        .with("a", counting_plugin(counts[0].clone()))
        .with("b", counting_plugin(counts[1].clone()))
        .with("c", counting_plugin(counts[2].clone()));
    let plugins = manager(loader, &["a", "b", "c"]);
    plugins.load(None).await;

    plugins.enable_later(&["a", "b"]);
    plugins.enable_later(&["b", "c"]);
    assert_eq!(plugins.get_enable_queue_size(), 3);

    let outcomes = plugins.enable_queued().await;

    assert_eq!(outcomes.names().collect::<Vec<_>>(), vec!["a", "b", "c"]);
    assert!(outcomes.is_clean());
    assert_eq!(plugins.get_enable_queue_size(), 0);
    assert_eq!(plugins.enabled_names(), vec!["a", "b", "c"]);
    for counter in &counts {
        assert_eq!(HookCounts::count(&counter.enables), 1);
    }

    assert!(plugins.enable_queued().await.is_empty());
    for counter in &counts {
        assert_eq!(HookCounts::count(&counter.enables), 1);
    }
}

#[tokio::test]
async fn test_hot_reload_rereads_config() {
    let dir = tempfile::tempdir().unwrap();
    let plugin_dir = dir.path().join("alpha");
    std::fs::create_dir_all(&plugin_dir).unwrap();
    std::fs::write(plugin_dir.join("config.yaml"), "greeting: hi\nlimits:\n  max: 1\n").unwrap();

    let counts = Arc::new(HookCounts::default());
    let mut overrides = HashMap::new();
    overrides.insert("alpha".to_string(), json!({ "limits": { "max": 5 } }));
    let plugins = manager_with_overrides(
        StaticModuleLoader::new().with("alpha", counting_plugin(counts.clone())),
        &["alpha"],
        dir.path(),
        overrides,
    );

    plugins.load(None).await;
    let unit = plugins.unit("alpha").unwrap();
    assert_eq!(
        unit.config(),
        Some(&json!({ "greeting": "hi", "limits": { "max": 5 } }))
    );
    assert_eq!(unit.location(), plugin_dir.as_path());

    std::fs::write(plugin_dir.join("config.yaml"), "greeting: bye\n").unwrap();
    assert!(plugins.unload(None).await.is_clean());
    assert!(plugins.load(None).await.is_clean());
    assert!(plugins.enable(None).await.is_clean());

    let reloaded = plugins.unit("alpha").unwrap();
    assert_eq!(
        reloaded.config(),
        Some(&json!({ "greeting": "bye", "limits": { "max": 5 } }))
    );
    assert!(!Arc::ptr_eq(&unit, &reloaded));
    assert!(plugins.is_enabled("alpha"));
    assert_eq!(HookCounts::count(&counts.loads), 2);
}

#[tokio::test]
async fn test_override_ignored_without_local_config() {
    let dir = tempfile::tempdir().unwrap();
    let mut overrides = HashMap::new();
    overrides.insert("alpha".to_string(), json!({ "greeting": "override" }));
    let plugins = manager_with_overrides(
        StaticModuleLoader::new().with("alpha", |_: &LoadContext| Ok(PluginHandlers::new())),
        &["alpha"],
        dir.path(),
        overrides,
    );

    plugins.load(None).await;

    assert!(plugins.unit("alpha").unwrap().config().is_none());
}

#[tokio::test]
async fn test_malformed_config_fails_load() {
    let dir = tempfile::tempdir().unwrap();
    let plugin_dir = dir.path().join("alpha");
    std::fs::create_dir_all(&plugin_dir).unwrap();
    std::fs::write(plugin_dir.join("config.yaml"), "greeting: [unclosed\n").unwrap();

    let counts = Arc::new(HookCounts::default());
    let plugins = manager_at(
        StaticModuleLoader::new().with("alpha", counting_plugin(counts.clone())),
        &["alpha"],
        dir.path(),
    );

    let outcomes = plugins.load(None).await;

    assert!(matches!(
        outcomes.get("alpha"),
        Some(Err(PluginError::ConfigParse { .. }))
    ));
    assert!(!plugins.is_loaded("alpha"));
    assert_eq!(HookCounts::count(&counts.loads), 0);
}

#[tokio::test]
async fn test_lifecycle_events_are_broadcast() {
    let counts = Arc::new(HookCounts::default());
    let plugins = manager(
        StaticModuleLoader::new().with("alpha", counting_plugin(counts)),
        &["alpha", "ghost"],
    );
    let mut events = plugins.subscribe();

    plugins.load(None).await;
    plugins.enable(Some(names(&["alpha"]).as_slice())).await;
    plugins.disable(Some(names(&["alpha"]).as_slice())).await;
    plugins.unload(Some(names(&["alpha"]).as_slice())).await;

    let mut seen = Vec::new();
    while let Ok(event) = events.try_recv() {
        seen.push((event.kind(), event.plugin_name().to_string()));
    }
    seen.sort();
    assert_eq!(
        seen,
        vec![
            ("pluginDisabled", "alpha".to_string()),
            ("pluginEnabled", "alpha".to_string()),
            ("pluginLoadFailed", "ghost".to_string()),
            ("pluginLoaded", "alpha".to_string()),
            ("pluginUnloaded", "alpha".to_string()),
        ]
    );
}

#[tokio::test]
async fn test_enable_failure_event_carries_error() {
    let plugins = manager(
        StaticModuleLoader::new().with("grumpy", |_: &LoadContext| {
            Ok(PluginHandlers::new().on_enable(|| async { Err(HookError::new("not today")) }))
        }),
        &["grumpy"],
    );
    plugins.load(None).await;
    let mut events = plugins.subscribe();

    plugins.enable(None).await;

    match events.try_recv().unwrap() {
        PluginEvent::EnableFailed { unit, error } => {
            assert_eq!(unit.name(), "grumpy");
            assert!(error.to_string().contains("not today"));
        }
        other => panic!("unexpected event: {:?}", other),
    }
}

/// Provides only the `clock` service
struct ClockOnly;

impl ServiceFactory for ClockOnly {
    fn provide(&self, _consumer: &ServiceConsumerContext, service: &str) -> Option<ServiceHandle> {
        (service == "clock").then(|| Arc::new(0u64) as ServiceHandle)
    }
}

#[tokio::test]
async fn test_load_requires_declared_services() {
    let dir = tempfile::tempdir().unwrap();
    for (name, metadata) in [
        ("timed", "dependencies: [clock]\n"),
        ("needy", "dependencies: [clock, weather]\n"),
    ] {
        let plugin_dir = dir.path().join(name);
        std::fs::create_dir_all(&plugin_dir).unwrap();
        std::fs::write(plugin_dir.join("plugin.yaml"), metadata).unwrap();
    }
    let loader = StaticModuleLoader::new()
        .with("timed", |_: &LoadContext| Ok(PluginHandlers::new()))
        .with("needy", |_: &LoadContext| Ok(PluginHandlers::new()));
    let plugins = manager_at(loader, &["timed", "needy"], dir.path())
        .with_service_factory(Arc::new(ClockOnly));

    let outcomes = plugins.load(None).await;

    assert!(outcomes.get("timed").unwrap().is_ok());
    assert!(matches!(
        outcomes.get("needy"),
        Some(Err(PluginError::Load { message, .. })) if message.contains("weather") && !message.contains("clock")
    ));
    assert!(!plugins.is_loaded("needy"));
}
