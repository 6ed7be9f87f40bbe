/* tests/migration_tests.rs */

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use settle::loader::{
	AnyFormat, FmtError, LoadResult, MemorySource, MigrationError, Migrations, Provider, Versioned,
};
use settle::tree::KeyPath;
use settle::{Instance, Settings, SettingsError};

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
#[serde(default, rename_all = "PascalCase")]
struct ProfileV1 {
	version: u32,
	name: String,
}

impl Versioned for ProfileV1 {
	const VERSION: u32 = 1;
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
#[serde(default, rename_all = "PascalCase")]
struct ProfileV2 {
	version: u32,
	title: String,
	retries: u32,
}

impl Versioned for ProfileV2 {
	const VERSION: u32 = 2;
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
#[serde(default, rename_all = "PascalCase")]
struct Display {
	title: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
#[serde(default, rename_all = "PascalCase")]
struct ProfileV3 {
	version: u32,
	display: Display,
	retries: u32,
}

impl Versioned for ProfileV3 {
	const VERSION: u32 = 3;
}

fn v1_to_v2(old: ProfileV1) -> ProfileV2 {
	ProfileV2 {
		version: 2,
		title: old.name.to_uppercase(),
		retries: 3,
	}
}

fn v2_to_v3(old: ProfileV2) -> ProfileV3 {
	ProfileV3 {
		version: 3,
		display: Display { title: old.title },
		retries: old.retries * 2,
	}
}

fn chain() -> Migrations {
	Migrations::new::<ProfileV3>()
		.step(v1_to_v2)
		.and_then(|m| m.step(v2_to_v3))
		.unwrap()
}

fn provider(memory: &MemorySource, migrations: Option<Migrations>) -> Provider {
	let p = Provider::new(
		Arc::new(AnyFormat::Json),
		Arc::new(memory.clone()),
		"profile.json",
		KeyPath::parse("Profile"),
	);
	match migrations {
		Some(m) => p.with_migrations(m),
		None => p,
	}
}

#[tokio::test]
async fn old_documents_are_upgraded_step_by_step() {
	let memory = MemorySource::new();
	memory.insert("profile.json", r#"{"Profile": {"Version": 1, "Name": "ada"}}"#);
	let v1 = ProfileV1 {
		version: 1,
		name: "ada".into(),
	};

	match provider(&memory, Some(chain())).load::<ProfileV3>().await {
		LoadResult::Ok {
			value, migrated, ..
		} => {
			assert_eq!(migrated, 2);
			assert_eq!(value, v2_to_v3(v1_to_v2(v1)));
		}
		other => panic!("unexpected {other:?}"),
	}
}

#[tokio::test]
async fn current_documents_are_not_transformed() {
	let memory = MemorySource::new();
	memory.insert(
		"profile.json",
		r#"{"Profile": {"Version": 3, "Display": {"Title": "T"}, "Retries": 1}}"#,
	);

	match provider(&memory, Some(chain())).load::<ProfileV3>().await {
		LoadResult::Ok {
			value, migrated, ..
		} => {
			assert_eq!(migrated, 0);
			assert_eq!(value.retries, 1);
		}
		other => panic!("unexpected {other:?}"),
	}
}

#[tokio::test]
async fn unresolvable_versions_fail_hard() {
	let memory = MemorySource::new();
	memory.insert("profile.json", r#"{"Profile": {"Name": "no version"}}"#);

	match provider(&memory, Some(chain())).load::<ProfileV3>().await {
		LoadResult::Invalid(FmtError::Migration(MigrationError::MissingStep { found, target })) => {
			assert_eq!((found, target), (0, 3));
		}
		other => panic!("unexpected {other:?}"),
	}

	// Without a chain the version field is never consulted.
	memory.insert("profile.json", r#"{"Profile": {"Version": 99, "Retries": 4}}"#);
	match provider(&memory, None).load::<ProfileV3>().await {
		LoadResult::Ok { value, migrated, .. } => {
			assert_eq!(migrated, 0);
			assert_eq!(value.retries, 4);
		}
		other => panic!("unexpected {other:?}"),
	}
}

#[test]
fn misconfigured_chains_are_rejected_at_setup() {
	let backwards = Migrations::new::<ProfileV3>().step(|v: ProfileV2| ProfileV1 {
		version: 1,
		name: v.title,
	});
	assert!(matches!(
		backwards,
		Err(MigrationError::NotAnUpgrade { from: 2, to: 1 })
	));

	let duplicate = Migrations::new::<ProfileV3>()
		.step(v1_to_v2)
		.and_then(|m| m.step(|v: ProfileV1| ProfileV3 {
			version: 3,
			display: Display { title: v.name },
			retries: 0,
		}));
	assert!(matches!(
		duplicate,
		Err(MigrationError::DuplicateStep { from: 1 })
	));
}

#[tokio::test]
async fn saving_writes_the_current_schema() {
	let dir = tempfile::tempdir().unwrap();
	let path = dir.path().join("profile.json");
	tokio::fs::write(&path, r#"{"Profile": {"Version": 1, "Name": "ada"}, "Other": 1}"#)
		.await
		.unwrap();

	let settings = Settings::single(
		Instance::<ProfileV3>::builder("default")
			.path(&path)
			.section("Profile")
			.migrations(chain())
			.build()
			.unwrap(),
	);

	let loaded = settings.get_default().await.unwrap();
	assert_eq!(loaded.display.title, "ADA");

	settings
		.update("default", |p| p.retries += 1)
		.await
		.unwrap();

	let written: serde_json::Value =
		serde_json::from_str(&tokio::fs::read_to_string(&path).await.unwrap()).unwrap();
	assert_eq!(
		written,
		serde_json::json!({
			"Profile": {"Version": 3, "Display": {"Title": "ADA"}, "Retries": 7},
			"Other": 1
		})
	);
}

#[tokio::test]
async fn migration_failures_propagate_from_get() {
	let dir = tempfile::tempdir().unwrap();
	let path = dir.path().join("profile.json");
	tokio::fs::write(&path, r#"{"Profile": {"Version": 7}}"#)
		.await
		.unwrap();

	let settings = Settings::single(
		Instance::<ProfileV3>::builder("default")
			.path(&path)
			.section("Profile")
			.migrations(chain())
			.build()
			.unwrap(),
	);

	assert!(matches!(
		settings.get("default").await,
		Err(SettingsError::Migration(MigrationError::MissingStep { found: 7, .. }))
	));
	assert!(settings.cached("default").is_none());
}
