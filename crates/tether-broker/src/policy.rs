// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights
// reserved. SPDX-License-Identifier: Proprietary

//! Typed authorization policy documents.
//!
//! The broker consumes declarative YAML describing the authorization graph.
//! Building documents from typed statements instead of string templates keeps
//! ids, references, and nesting structurally valid; the broker's policy
//! engine guarantees that reloading an identical document converges without
//! duplicating resources or grants.

use std::fmt::Write as _;

/// A reference to a role or resource, e.g. `!group admins`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Ref {
	kind: &'static str,
	id: String,
}

impl Ref {
	pub fn group(id: impl Into<String>) -> Self {
		Self { kind: "group", id: id.into() }
	}

	pub fn host(id: impl Into<String>) -> Self {
		Self { kind: "host", id: id.into() }
	}

	pub fn variable(id: impl Into<String>) -> Self {
		Self { kind: "variable", id: id.into() }
	}

	/// The enclosing webservice; an empty id refers to the statement's own
	/// policy scope.
	pub fn webservice() -> Self {
		Self {
			kind: "webservice",
			id: String::new(),
		}
	}

	fn render(&self) -> String {
		if self.id.is_empty() {
			format!("!{}", self.kind)
		} else {
			format!("!{} {}", self.kind, self.id)
		}
	}
}

/// One declarative statement in a policy document.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Statement {
	/// Nested sub-policy for namespacing.
	Policy { id: String, body: Vec<Statement> },
	/// An authenticator or service endpoint resource.
	Webservice,
	/// A role group.
	Group { id: String },
	/// A workload identity principal.
	Host {
		id: String,
		annotations: Vec<(String, String)>,
	},
	/// A secret placeholder; values are written separately.
	Variable { id: String },
	/// role x privilege-set x resource permission edge.
	Permit {
		role: Ref,
		privileges: Vec<String>,
		resource: Ref,
	},
	/// Role-membership edge.
	Grant { role: Ref, member: Ref },
}

/// A declarative document submitted under a base role.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PolicyDocument {
	statements: Vec<Statement>,
}

impl PolicyDocument {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn with(mut self, statement: Statement) -> Self {
		self.statements.push(statement);
		self
	}

	pub fn is_empty(&self) -> bool {
		self.statements.is_empty()
	}

	/// Render the document as broker policy YAML.
	pub fn render(&self) -> String {
		let mut out = String::new();
		render_statements(&mut out, &self.statements, 0);
		out
	}
}

fn indent(out: &mut String, level: usize) {
	for _ in 0..level {
		out.push_str("  ");
	}
}

fn render_statements(out: &mut String, statements: &[Statement], level: usize) {
	for statement in statements {
		match statement {
			Statement::Policy { id, body } => {
				indent(out, level);
				out.push_str("- !policy\n");
				indent(out, level + 1);
				let _ = writeln!(out, "id: {id}");
				if !body.is_empty() {
					indent(out, level + 1);
					out.push_str("body:\n");
					render_statements(out, body, level + 2);
				}
			}
			Statement::Webservice => {
				indent(out, level);
				out.push_str("- !webservice\n");
			}
			Statement::Group { id } => {
				indent(out, level);
				out.push_str("- !group\n");
				indent(out, level + 1);
				let _ = writeln!(out, "id: {id}");
			}
			Statement::Host { id, annotations } => {
				indent(out, level);
				out.push_str("- !host\n");
				indent(out, level + 1);
				let _ = writeln!(out, "id: {id}");
				if !annotations.is_empty() {
					indent(out, level + 1);
					out.push_str("annotations:\n");
					for (key, value) in annotations {
						indent(out, level + 2);
						let _ = writeln!(out, "{key}: {value}");
					}
				}
			}
			Statement::Variable { id } => {
				indent(out, level);
				out.push_str("- !variable\n");
				indent(out, level + 1);
				let _ = writeln!(out, "id: {id}");
			}
			Statement::Permit {
				role,
				privileges,
				resource,
			} => {
				indent(out, level);
				out.push_str("- !permit\n");
				indent(out, level + 1);
				let _ = writeln!(out, "role: {}", role.render());
				indent(out, level + 1);
				let _ = writeln!(out, "privileges: [ {} ]", privileges.join(", "));
				indent(out, level + 1);
				let _ = writeln!(out, "resource: {}", resource.render());
			}
			Statement::Grant { role, member } => {
				indent(out, level);
				out.push_str("- !grant\n");
				indent(out, level + 1);
				let _ = writeln!(out, "role: {}", role.render());
				indent(out, level + 1);
				let _ = writeln!(out, "member: {}", member.render());
			}
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	/// Test: an authenticator webservice policy renders the expected YAML.
	///
	/// Why this test is important: this exact shape (webservice + admin group
	/// + read/authenticate permit) is the precondition for any workload
	/// identity to authenticate; a rendering drift would be rejected by the
	/// broker or, worse, accepted with the wrong grants.
	#[test]
	fn test_authenticator_policy_renders() {
		let doc = PolicyDocument::new().with(Statement::Policy {
			id: "conjur/authn-k8s/dev-cluster".to_string(),
			body: vec![
				Statement::Webservice,
				Statement::Group {
					id: "admins".to_string(),
				},
				Statement::Permit {
					role: Ref::group("admins"),
					privileges: vec!["read".to_string(), "authenticate".to_string()],
					resource: Ref::webservice(),
				},
			],
		});

		let expected = "\
- !policy
  id: conjur/authn-k8s/dev-cluster
  body:
    - !webservice
    - !group
      id: admins
    - !permit
      role: !group admins
      privileges: [ read, authenticate ]
      resource: !webservice
";
		assert_eq!(doc.render(), expected);
	}

	/// Test: hosts render annotations and grants reference typed members.
	#[test]
	fn test_host_and_grant_render() {
		let doc = PolicyDocument::new()
			.with(Statement::Host {
				id: "app-namespace:app-sa".to_string(),
				annotations: vec![(
					"authn-k8s/authentication-container-name".to_string(),
					"authenticator".to_string(),
				)],
			})
			.with(Statement::Grant {
				role: Ref::group("conjur/authn-k8s/dev-cluster/admins"),
				member: Ref::host("app-namespace:app-sa"),
			});

		let expected = "\
- !host
  id: app-namespace:app-sa
  annotations:
    authn-k8s/authentication-container-name: authenticator
- !grant
  role: !group conjur/authn-k8s/dev-cluster/admins
  member: !host app-namespace:app-sa
";
		assert_eq!(doc.render(), expected);
	}

	/// Test: rendering is a pure function of the document.
	///
	/// Why this test is important: policy idempotence relies on an identical
	/// document producing byte-identical YAML on every run, so the broker
	/// sees no change to converge on.
	#[test]
	fn test_render_is_deterministic() {
		let doc = PolicyDocument::new()
			.with(Statement::Variable {
				id: "db/creds/url".to_string(),
			})
			.with(Statement::Webservice);
		assert_eq!(doc.render(), doc.render());
		assert_eq!(doc.clone(), doc);
	}

	/// Test: nested sub-policies indent their bodies correctly.
	#[test]
	fn test_nested_policy_indentation() {
		let doc = PolicyDocument::new().with(Statement::Policy {
			id: "app".to_string(),
			body: vec![Statement::Policy {
				id: "db".to_string(),
				body: vec![Statement::Variable {
					id: "creds/url".to_string(),
				}],
			}],
		});

		let expected = "\
- !policy
  id: app
  body:
    - !policy
      id: db
      body:
        - !variable
          id: creds/url
";
		assert_eq!(doc.render(), expected);
	}

	/// Test: an empty document renders to an empty string and reports empty.
	#[test]
	fn test_empty_document() {
		let doc = PolicyDocument::new();
		assert!(doc.is_empty());
		assert_eq!(doc.render(), "");
	}
}
