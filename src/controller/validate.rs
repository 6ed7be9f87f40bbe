/* src/controller/validate.rs */

//!
//! Pluggable validation. Every validator reports a list of failure messages;
//! an empty list means the value is accepted.

use std::fmt;

/// Checks a candidate value before it is persisted.
pub trait Validator<T>: Send + Sync {
	fn validate(&self, value: &T) -> Vec<String>;
}

impl<T, F> Validator<T> for F
where
	F: Fn(&T) -> Vec<String> + Send + Sync,
{
	fn validate(&self, value: &T) -> Vec<String> {
		self(value)
	}
}

/// A validator that reports `message` whenever `predicate` is false.
pub fn check<T, P>(message: impl Into<String>, predicate: P) -> impl Validator<T>
where
	P: Fn(&T) -> bool + Send + Sync,
{
	let message = message.into();
	move |value: &T| {
		if predicate(value) {
			Vec::new()
		} else {
			vec![message.clone()]
		}
	}
}

/// Runs the rules declared with `#[derive(validator::Validate)]`.
#[cfg(feature = "validate")]
pub struct Declarative;

#[cfg(feature = "validate")]
impl<T: validator::Validate> Validator<T> for Declarative {
	fn validate(&self, value: &T) -> Vec<String> {
		match value.validate() {
			Ok(()) => Vec::new(),
			Err(errors) => flatten(&errors, ""),
		}
	}
}

#[cfg(feature = "validate")]
fn flatten(errors: &validator::ValidationErrors, prefix: &str) -> Vec<String> {
	use validator::ValidationErrorsKind;

	let mut failures = Vec::new();
	let mut fields: Vec<_> = errors.errors().iter().collect();
	fields.sort_by(|a, b| a.0.cmp(b.0));

	for (field, kind) in fields {
		let path = if prefix.is_empty() {
			field.to_string()
		} else {
			format!("{prefix}:{field}")
		};
		match kind {
			ValidationErrorsKind::Field(list) => {
				failures.extend(list.iter().map(|e| match &e.message {
					Some(message) => format!("{path}: {message}"),
					None => format!("{path}: failed '{}'", e.code),
				}));
			}
			ValidationErrorsKind::Struct(nested) => failures.extend(flatten(nested, &path)),
			ValidationErrorsKind::List(items) => {
				for (index, nested) in items {
					failures.extend(flatten(nested, &format!("{path}:{index}")));
				}
			}
		}
	}
	failures
}

/// Aggregate of every failure reported for one candidate value.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub struct ValidationError {
	pub instance: String,
	pub type_name: &'static str,
	pub failures: Vec<String>,
}

impl fmt::Display for ValidationError {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(
			f,
			"validation of {} '{}' failed: {}",
			self.type_name,
			self.instance,
			self.failures.join("; ")
		)
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn check_reports_message_only_on_failure() {
		let positive = check("must be positive", |v: &i32| *v > 0);
		assert!(positive.validate(&1).is_empty());
		assert_eq!(positive.validate(&0), vec!["must be positive".to_string()]);
	}

	#[test]
	fn closures_can_report_several_failures() {
		let v = |s: &String| {
			let mut failures = Vec::new();
			if s.is_empty() {
				failures.push("empty".to_string());
			}
			if !s.is_ascii() {
				failures.push("not ascii".to_string());
			}
			failures
		};
		assert_eq!(v.validate(&String::new()), vec!["empty".to_string()]);
	}

	#[cfg(feature = "validate")]
	#[test]
	fn declarative_rules_are_flattened() {
		use validator::Validate;

		#[derive(Validate)]
		struct Limits {
			#[validate(range(min = 1, message = "at least one"))]
			max_connections: u32,
			#[validate(length(min = 1))]
			name: String,
		}

		let failures = Declarative.validate(&Limits {
			max_connections: 0,
			name: String::new(),
		});
		assert_eq!(
			failures,
			vec![
				"max_connections: at least one".to_string(),
				"name: failed 'length'".to_string()
			]
		);
	}
}
