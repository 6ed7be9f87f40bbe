/* tests/settings_tests.rs */

use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};
use settle::holder::Origin;
use settle::loader::FmtError;
use settle::{Instance, Operations, Registry, Settings, SettingsError, check};
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default, rename_all = "PascalCase")]
struct Basic {
	name: String,
	value: i32,
}

impl Default for Basic {
	fn default() -> Self {
		Self {
			name: "default".into(),
			value: 42,
		}
	}
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default, rename_all = "PascalCase")]
struct Pool {
	max_connections: u32,
	endpoint: Endpoint,
}

impl Default for Pool {
	fn default() -> Self {
		Self {
			max_connections: 10,
			endpoint: Endpoint::default(),
		}
	}
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
#[serde(default, rename_all = "PascalCase")]
struct Endpoint {
	host: String,
	token: String,
}

fn basic(path: &Path) -> Settings<Basic> {
	Settings::single(
		Instance::builder("default")
			.path(path)
			.whole_file()
			.build()
			.unwrap(),
	)
}

fn pool(path: &Path) -> Settings<Pool> {
	Settings::single(
		Instance::builder("default")
			.path(path)
			.section("Database:Pool")
			.validator(check("MaxConnections must be at least 1", |p: &Pool| {
				p.max_connections >= 1
			}))
			.validator(|p: &Pool| {
				if p.max_connections == 0 && p.endpoint.host.is_empty() {
					vec!["Endpoint:Host is required".to_string()]
				} else {
					Vec::new()
				}
			})
			.build()
			.unwrap(),
	)
}

async fn read_json(path: &Path) -> serde_json::Value {
	serde_json::from_str(&tokio::fs::read_to_string(path).await.unwrap()).unwrap()
}

#[tokio::test]
async fn defaults_then_save_then_read_back() {
	let dir = tempfile::tempdir().unwrap();
	let path = dir.path().join("basic.json");
	let settings = basic(&path);

	let current = settings.get("default").await.unwrap();
	assert_eq!(*current, Basic::default());
	assert!(!path.exists());

	settings
		.update("default", |s| s.name = "x".to_string())
		.await
		.unwrap();

	assert_eq!(
		read_json(&path).await,
		serde_json::json!({"Name": "x", "Value": 42})
	);
	let current = settings.get("default").await.unwrap();
	assert_eq!(
		*current,
		Basic {
			name: "x".into(),
			value: 42
		}
	);
}

#[tokio::test]
async fn repeated_reads_share_one_snapshot() {
	let dir = tempfile::tempdir().unwrap();
	let settings = basic(&dir.path().join("basic.json"));

	let a = settings.get("default").await.unwrap();
	let b = settings.get("default").await.unwrap();
	assert!(Arc::ptr_eq(&a, &b));
	assert_eq!(settings.entry("default").unwrap().meta.origin, Origin::Default);
}

#[tokio::test]
async fn every_save_notifies_exactly_once() {
	let dir = tempfile::tempdir().unwrap();
	let settings = basic(&dir.path().join("basic.json"));

	let named = Arc::new(AtomicUsize::new(0));
	let seen: Arc<Mutex<Vec<(String, i32)>>> = Arc::default();

	let n = named.clone();
	let _named = settings
		.listen("default", move |_, _| {
			n.fetch_add(1, Ordering::SeqCst);
		})
		.unwrap();
	let s = seen.clone();
	let _all = settings.listen_all(move |value, name| {
		s.lock().unwrap().push((name.to_string(), value.value));
	});

	settings.update("default", |s| s.value = 1).await.unwrap();
	assert_eq!(named.load(Ordering::SeqCst), 1);

	settings.map("default", |s| Basic { value: s.value + 1, ..s }).await.unwrap();
	settings.save("default", Basic::default()).await.unwrap();

	assert_eq!(named.load(Ordering::SeqCst), 3);
	assert_eq!(
		*seen.lock().unwrap(),
		vec![
			("default".to_string(), 1),
			("default".to_string(), 2),
			("default".to_string(), 42)
		]
	);
}

#[tokio::test]
async fn failed_validation_changes_nothing() {
	let dir = tempfile::tempdir().unwrap();
	let path = dir.path().join("pool.json");
	let settings = pool(&path);
	let before = settings.get("default").await.unwrap();

	let err = settings
		.update("default", |p| p.max_connections = 0)
		.await
		.unwrap_err();

	match err {
		SettingsError::Validation(e) => {
			assert_eq!(e.instance, "default");
			assert!(e.type_name.ends_with("Pool"));
			assert_eq!(
				e.failures,
				vec![
					"MaxConnections must be at least 1".to_string(),
					"Endpoint:Host is required".to_string()
				]
			);
		}
		other => panic!("unexpected {other:?}"),
	}
	assert!(!path.exists());
	assert!(Arc::ptr_eq(&before, &settings.get("default").await.unwrap()));

	// Same with an existing file.
	settings.update("default", |p| p.max_connections = 5).await.unwrap();
	let on_disk = tokio::fs::read(&path).await.unwrap();
	let cached = settings.get("default").await.unwrap();

	assert!(settings.update("default", |p| p.max_connections = 0).await.is_err());
	assert_eq!(tokio::fs::read(&path).await.unwrap(), on_disk);
	assert!(Arc::ptr_eq(&cached, &settings.get("default").await.unwrap()));
}

#[tokio::test]
async fn instances_are_isolated() {
	let dir = tempfile::tempdir().unwrap();
	let first = dir.path().join("first.json");
	let second = dir.path().join("second.json");

	let registry = Registry::new()
		.with(Instance::builder("First").path(&first).whole_file().build().unwrap())
		.and_then(|r| r.with(Instance::builder("Second").path(&second).whole_file().build().unwrap()))
		.unwrap();
	let settings: Settings<Basic> = Settings::new(registry);

	settings.update("First", |s| s.value = 1).await.unwrap();
	settings.update("Second", |s| s.name = "two".into()).await.unwrap();

	assert_eq!(settings.get("First").await.unwrap().value, 1);
	assert_eq!(settings.get("First").await.unwrap().name, "default");
	assert_eq!(settings.get("Second").await.unwrap().value, 42);
	assert_eq!(settings.get("Second").await.unwrap().name, "two");
	assert_eq!(read_json(&first).await["Name"], "default");
	assert_eq!(read_json(&second).await["Value"], 42);

	assert!(matches!(
		settings.get_default().await,
		Err(SettingsError::AmbiguousInstance(2))
	));
	assert!(matches!(
		settings.get("Third").await,
		Err(SettingsError::UnknownInstance(_))
	));
}

#[tokio::test]
async fn sections_of_one_file_do_not_interfere() {
	let dir = tempfile::tempdir().unwrap();
	let path = dir.path().join("shared.json");

	let registry = Registry::new()
		.with(Instance::builder("ui").path(&path).section("App:Ui").build().unwrap())
		.and_then(|r| r.with(Instance::builder("net").path(&path).section("App:Net").build().unwrap()))
		.unwrap();
	let settings: Settings<Basic> = Settings::new(registry);

	settings.update("ui", |s| s.value = 1).await.unwrap();
	settings.update("net", |s| s.value = 2).await.unwrap();
	settings.update("ui", |s| s.name = "ui".into()).await.unwrap();

	assert_eq!(
		read_json(&path).await,
		serde_json::json!({
			"App": {
				"Ui": {"Name": "ui", "Value": 1},
				"Net": {"Name": "default", "Value": 2}
			}
		})
	);
}

#[tokio::test]
async fn cancelled_saves_leave_everything_untouched() {
	let dir = tempfile::tempdir().unwrap();
	let path = dir.path().join("basic.json");
	let settings = basic(&path);
	let before = settings.get("default").await.unwrap();

	let cancel = CancellationToken::new();
	cancel.cancel();
	let err = settings
		.apply_with_cancel("default", Operations::mutate(|s: &mut Basic| s.value = 0), &cancel)
		.await
		.unwrap_err();

	assert!(err.is_cancelled());
	assert!(!path.exists());
	assert!(Arc::ptr_eq(&before, &settings.cached("default").unwrap()));
}

#[tokio::test]
async fn concurrent_saves_are_serialized() {
	let dir = tempfile::tempdir().unwrap();
	let path = dir.path().join("basic.json");
	let settings = basic(&path);

	let mut tasks = Vec::new();
	for _ in 0..20 {
		let settings = settings.clone();
		tasks.push(tokio::spawn(async move {
			settings.update("default", |s| s.value += 1).await
		}));
	}
	for task in tasks {
		task.await.unwrap().unwrap();
	}

	assert_eq!(settings.get("default").await.unwrap().value, 62);
	assert_eq!(read_json(&path).await["Value"], 62);
}

#[tokio::test]
async fn deleted_keys_fall_back_to_defaults() {
	let dir = tempfile::tempdir().unwrap();
	let path = dir.path().join("pool.json");
	let settings = pool(&path);

	settings
		.update("default", |p| {
			p.endpoint.host = "db".into();
			p.endpoint.token = "secret".into();
		})
		.await
		.unwrap();

	let value = settings
		.apply(
			"default",
			Operations::mutate(|p: &mut Pool| p.max_connections = 20).delete("Endpoint__Token"),
		)
		.await
		.unwrap();
	assert_eq!(value.endpoint.token, "");
	assert_eq!(value.max_connections, 20);

	// A later save does not bring the key back.
	settings.update("default", |p| p.max_connections = 30).await.unwrap();
	let written = read_json(&path).await;
	assert_eq!(
		written,
		serde_json::json!({
			"Database": {"Pool": {"MaxConnections": 30, "Endpoint": {"Host": "db"}}}
		})
	);
}

#[tokio::test]
async fn unsubscribed_listeners_stay_silent() {
	let dir = tempfile::tempdir().unwrap();
	let settings = basic(&dir.path().join("basic.json"));
	let calls = Arc::new(AtomicUsize::new(0));

	let c = calls.clone();
	let sub = settings.listen_all(move |_, _| {
		c.fetch_add(1, Ordering::SeqCst);
	});
	settings.update("default", |s| s.value = 1).await.unwrap();
	sub.unsubscribe();
	sub.unsubscribe();
	settings.update("default", |s| s.value = 2).await.unwrap();

	assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn silent_updates_clear_and_reload() {
	let dir = tempfile::tempdir().unwrap();
	let path = dir.path().join("basic.json");
	let settings = basic(&path);
	let calls = Arc::new(AtomicUsize::new(0));
	let c = calls.clone();
	let _sub = settings.listen_all(move |_, _| {
		c.fetch_add(1, Ordering::SeqCst);
	});

	settings.update("default", |s| s.value = 1).await.unwrap();
	settings
		.update_silently(
			"default",
			Basic {
				name: "memory".into(),
				value: 5,
			},
		)
		.unwrap();
	assert_eq!(settings.cached("default").unwrap().name, "memory");
	assert_eq!(read_json(&path).await["Value"], 1);
	assert_eq!(calls.load(Ordering::SeqCst), 1);

	settings.clear("default").unwrap();
	assert!(settings.cached("default").is_none());
	assert_eq!(settings.get("default").await.unwrap().value, 1);

	tokio::fs::write(&path, r#"{"Name": "edited", "Value": 9}"#)
		.await
		.unwrap();
	let reloaded = settings.reload("default").await.unwrap();
	assert_eq!(reloaded.name, "edited");
	assert_eq!(calls.load(Ordering::SeqCst), 2);

	// Nothing changed on disk, nobody is told.
	settings.reload("default").await.unwrap();
	assert_eq!(calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn malformed_files_read_as_defaults_but_block_saves() {
	let dir = tempfile::tempdir().unwrap();
	let path = dir.path().join("basic.json");
	tokio::fs::write(&path, "{ not json").await.unwrap();
	let settings = basic(&path);

	assert_eq!(*settings.get("default").await.unwrap(), Basic::default());
	assert!(matches!(
		settings.reload("default").await,
		Err(SettingsError::Load(FmtError::ParseError(_)))
	));
	assert!(matches!(
		settings.update("default", |s| s.value = 1).await,
		Err(SettingsError::Load(FmtError::ParseError(_)))
	));
	assert_eq!(tokio::fs::read_to_string(&path).await.unwrap(), "{ not json");
}

#[cfg(feature = "xml")]
#[tokio::test]
async fn xml_sections_round_trip() {
	let dir = tempfile::tempdir().unwrap();
	let path = dir.path().join("app.xml");
	tokio::fs::write(&path, "<Settings><Other><Keep>yes</Keep></Other></Settings>")
		.await
		.unwrap();
	let settings = pool(&path);

	settings
		.update("default", |p| {
			p.max_connections = 3;
			p.endpoint.host = "db".into();
		})
		.await
		.unwrap();
	settings.clear("default").unwrap();

	let loaded = settings.get("default").await.unwrap();
	assert_eq!(loaded.max_connections, 3);
	assert_eq!(loaded.endpoint.host, "db");
	let text = tokio::fs::read_to_string(&path).await.unwrap();
	assert!(text.contains("<Keep>yes</Keep>"));
}

#[cfg(feature = "validate")]
#[tokio::test]
async fn declarative_rules_run_before_custom_validators() {
	use validator::Validate;

	#[derive(Debug, Clone, Serialize, Deserialize, Default, Validate)]
	#[serde(default, rename_all = "PascalCase")]
	struct Account {
		#[validate(length(min = 3, message = "too short"))]
		user: String,
	}

	let dir = tempfile::tempdir().unwrap();
	let settings = Settings::single(
		Instance::<Account>::builder("default")
			.path(dir.path().join("account.json"))
			.validator(check("user must be lowercase", |a: &Account| {
				a.user == a.user.to_lowercase()
			}))
			.validate_fields()
			.build()
			.unwrap(),
	);

	let err = settings
		.update("default", |a| a.user = "AB".into())
		.await
		.unwrap_err();
	match err {
		SettingsError::Validation(e) => assert_eq!(
			e.failures,
			vec!["user: too short".to_string(), "user must be lowercase".to_string()]
		),
		other => panic!("unexpected {other:?}"),
	}

	settings
		.update("default", |a| a.user = "abc".into())
		.await
		.unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_saves_to_sibling_sections_keep_both() {
	#[derive(Debug, Clone, Serialize, Deserialize, Default)]
	#[serde(default, rename_all = "PascalCase")]
	struct Count {
		value: u32,
	}

	let dir = tempfile::tempdir().unwrap();
	let path = dir.path().join("shared.json");
	let registry = Registry::new()
		.with(Instance::builder("a").path(&path).section("App:A").build().unwrap())
		.and_then(|r| r.with(Instance::builder("b").path(&path).section("App:B").build().unwrap()))
		.unwrap();
	let settings: Settings<Count> = Settings::new(registry);

	let mut tasks = Vec::new();
	for i in 0..40 {
		let settings = settings.clone();
		let name = if i % 2 == 0 { "a" } else { "b" };
		tasks.push(tokio::spawn(async move {
			settings.update(name, |c| c.value += 1).await
		}));
	}
	for task in tasks {
		task.await.unwrap().unwrap();
	}

	assert_eq!(
		read_json(&path).await,
		serde_json::json!({"App": {"A": {"Value": 20}, "B": {"Value": 20}}})
	);
	assert_eq!(settings.get("a").await.unwrap().value, 20);
	assert_eq!(settings.get("b").await.unwrap().value, 20);
}

#[tokio::test]
async fn a_write_cancelled_in_flight_changes_nothing() {
	use async_trait::async_trait;
	use settle::loader::{FileSource, Source};
	use tokio::sync::Notify;

	/// Blocks every write until its token is cancelled.
	struct Gated {
		inner: FileSource,
		started: Arc<Notify>,
	}

	#[async_trait]
	impl Source for Gated {
		async fn read(&self, path: &Path) -> Result<Vec<u8>, FmtError> {
			self.inner.read(path).await
		}

		async fn exists(&self, path: &Path) -> bool {
			self.inner.exists(path).await
		}

		async fn write(
			&self,
			path: &Path,
			bytes: &[u8],
			cancel: &CancellationToken,
		) -> Result<(), FmtError> {
			self.started.notify_one();
			cancel.cancelled().await;
			self.inner.write(path, bytes, cancel).await
		}
	}

	let dir = tempfile::tempdir().unwrap();
	let path = dir.path().join("basic.json");
	tokio::fs::write(&path, r#"{"Name": "disk", "Value": 1}"#)
		.await
		.unwrap();
	let started = Arc::new(Notify::new());
	let settings = Settings::single(
		Instance::<Basic>::builder("default")
			.path(&path)
			.whole_file()
			.source(Gated {
				inner: FileSource::new(),
				started: started.clone(),
			})
			.build()
			.unwrap(),
	);
	let before = settings.get("default").await.unwrap();
	let calls = Arc::new(AtomicUsize::new(0));
	let c = calls.clone();
	let _sub = settings.listen_all(move |_, _| {
		c.fetch_add(1, Ordering::SeqCst);
	});

	let cancel = CancellationToken::new();
	let task = {
		let settings = settings.clone();
		let cancel = cancel.clone();
		tokio::spawn(async move {
			settings
				.apply_with_cancel(
					"default",
					Operations::mutate(|s: &mut Basic| s.value = 2),
					&cancel,
				)
				.await
		})
	};
	started.notified().await;
	cancel.cancel();

	assert!(task.await.unwrap().unwrap_err().is_cancelled());
	assert_eq!(
		read_json(&path).await,
		serde_json::json!({"Name": "disk", "Value": 1})
	);
	assert!(Arc::ptr_eq(&before, &settings.cached("default").unwrap()));
	assert_eq!(calls.load(Ordering::SeqCst), 0);

	let mut entries = tokio::fs::read_dir(dir.path()).await.unwrap();
	let mut names = Vec::new();
	while let Some(entry) = entries.next_entry().await.unwrap() {
		names.push(entry.file_name());
	}
	assert_eq!(names, vec![std::ffi::OsString::from("basic.json")]);
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
#[serde(default, rename_all = "PascalCase")]
struct Wide {
	id: u64,
	port: u8,
}

#[tokio::test]
async fn large_integers_load_back_exactly() {
	let dir = tempfile::tempdir().unwrap();
	let path = dir.path().join("wide.json");
	let settings = Settings::single(
		Instance::<Wide>::builder("default")
			.path(&path)
			.build()
			.unwrap(),
	);

	let saved = Wide {
		id: 9_223_372_036_854_775_809,
		port: 1,
	};
	settings.save("default", saved.clone()).await.unwrap();
	settings.clear("default").unwrap();

	assert_eq!(*settings.get("default").await.unwrap(), saved);
}

#[tokio::test]
async fn out_of_range_numbers_are_rejected() {
	let dir = tempfile::tempdir().unwrap();
	let path = dir.path().join("wide.json");
	tokio::fs::write(&path, r#"{"Wide": {"Id": 1, "Port": 300.0}}"#)
		.await
		.unwrap();
	let settings = Settings::single(
		Instance::<Wide>::builder("default")
			.path(&path)
			.build()
			.unwrap(),
	);

	assert_eq!(*settings.get("default").await.unwrap(), Wide::default());
	assert!(matches!(
		settings.reload("default").await,
		Err(SettingsError::Load(FmtError::Shape(_)))
	));

	tokio::fs::write(&path, r#"{"Wide": {"Id": 1, "Port": 80.0}}"#)
		.await
		.unwrap();
	let reloaded = settings.reload("default").await.unwrap();
	assert_eq!(*reloaded, Wide { id: 1, port: 80 });
}
