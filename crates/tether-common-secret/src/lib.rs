// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights
// reserved. SPDX-License-Identifier: Proprietary

//! Secret wrapper type that prevents accidental logging of sensitive values.
//!
//! [`SecretString`] wraps a `String` so that `Debug` and `Display` render a
//! fixed redaction marker instead of the value. The inner value is only
//! reachable through [`SecretString::expose`], which makes every use site
//! greppable, and is zeroized when the wrapper is dropped.

use zeroize::Zeroizing;

/// Marker rendered in place of a secret by `Debug` and `Display`.
pub const REDACTED: &str = "[REDACTED]";

/// A string whose value must never appear in logs or error messages.
#[derive(Clone)]
pub struct SecretString(Zeroizing<String>);

impl SecretString {
	/// Wrap a sensitive value.
	pub fn new(value: impl Into<String>) -> Self {
		Self(Zeroizing::new(value.into()))
	}

	/// Access the underlying value. Call sites are deliberate and auditable.
	pub fn expose(&self) -> &str {
		&self.0
	}

	/// True if the wrapped value is empty.
	pub fn is_empty(&self) -> bool {
		self.0.is_empty()
	}
}

impl std::fmt::Debug for SecretString {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.write_str(REDACTED)
	}
}

impl std::fmt::Display for SecretString {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.write_str(REDACTED)
	}
}

impl From<String> for SecretString {
	fn from(value: String) -> Self {
		Self::new(value)
	}
}

impl From<&str> for SecretString {
	fn from(value: &str) -> Self {
		Self::new(value)
	}
}

impl PartialEq for SecretString {
	fn eq(&self, other: &Self) -> bool {
		// Not constant time; used only in tests and idempotence checks,
		// never for authentication decisions.
		self.0.as_str() == other.0.as_str()
	}
}

impl Eq for SecretString {}

#[cfg(feature = "serde")]
impl serde::Serialize for SecretString {
	fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
		serializer.serialize_str(self.expose())
	}
}

#[cfg(feature = "serde")]
impl<'de> serde::Deserialize<'de> for SecretString {
	fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
		let value = String::deserialize(deserializer)?;
		Ok(Self::new(value))
	}
}
