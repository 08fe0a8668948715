#![forbid(unsafe_code)]

use core::fmt;
use core::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors for parsing identifiers from strings.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ParseIdError {
	#[error("empty value")]
	Empty,
	#[error("invalid label: {0}")]
	InvalidLabel(String),
	#[error("invalid did: {0}")]
	InvalidDid(String),
}

/// Requested subdomain label (left-hand part of a handle).
///
/// Valid iff non-empty and every character is ASCII alphanumeric, `-` or `.`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Label(String);

impl Label {
	/// Create a `Label`, validating the character set.
	pub fn new(s: impl Into<String>) -> Result<Self, ParseIdError> {
		let s = s.into();
		if s.is_empty() {
			return Err(ParseIdError::Empty);
		}
		if !s.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '.') {
			return Err(ParseIdError::InvalidLabel(s));
		}
		Ok(Self(s))
	}
	pub fn as_str(&self) -> &str {
		&self.0
	}
}

impl fmt::Display for Label {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(&self.0)
	}
}

impl FromStr for Label {
	type Err = ParseIdError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		Label::new(s)
	}
}

/// Decentralized identifier bound to a handle.
///
/// Valid iff it is `did:plc:` followed by one or more lowercase ASCII
/// alphanumerics.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Did(String);

impl Did {
	/// Prefix for the supported DID method.
	pub const PLC_PREFIX: &'static str = "did:plc:";

	/// Create a `Did`, validating the `did:plc:` grammar.
	pub fn new(s: impl Into<String>) -> Result<Self, ParseIdError> {
		let s = s.into();
		if s.is_empty() {
			return Err(ParseIdError::Empty);
		}
		let Some(id) = s.strip_prefix(Self::PLC_PREFIX) else {
			return Err(ParseIdError::InvalidDid(s));
		};
		if id.is_empty() || !id.chars().all(|c| c.is_ascii_lowercase() || c.is_ascii_digit()) {
			return Err(ParseIdError::InvalidDid(s));
		}
		Ok(Self(s))
	}
	pub fn as_str(&self) -> &str {
		&self.0
	}
}

impl fmt::Display for Did {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(&self.0)
	}
}

impl FromStr for Did {
	type Err = ParseIdError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		Did::new(s)
	}
}

/// Fully-qualified handle: `<label>.<base domain>`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Handle(String);

impl Handle {
	/// Join a label with the base domain.
	pub fn new(label: &Label, domain: &str) -> Self {
		Self(format!("{}.{}", label.as_str(), domain))
	}

	/// Wrap an already-joined handle string (store keys).
	pub fn from_full(s: impl Into<String>) -> Self {
		Self(s.into())
	}

	pub fn as_str(&self) -> &str {
		&self.0
	}

	/// Fully-qualified DNS name of the handle itself (trailing dot).
	pub fn fqdn(&self) -> String {
		format!("{}.", self.0)
	}

	/// DNS name of the TXT record publishing the DID binding (trailing dot).
	pub fn dns_name(&self) -> String {
		format!("_atproto.{}.", self.0)
	}
}

impl fmt::Display for Handle {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(&self.0)
	}
}

/// Matrix event identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EventId(String);

impl EventId {
	/// Create a non-empty `EventId`.
	pub fn new(id: impl Into<String>) -> Result<Self, ParseIdError> {
		let id = id.into();
		if id.trim().is_empty() {
			return Err(ParseIdError::Empty);
		}
		Ok(Self(id))
	}
	pub fn as_str(&self) -> &str {
		&self.0
	}
	pub fn into_string(self) -> String {
		self.0
	}
}

impl fmt::Display for EventId {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(&self.0)
	}
}

/// Matrix user identifier (mxid of a message sender).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(String);

impl UserId {
	/// Create a non-empty `UserId`.
	pub fn new(id: impl Into<String>) -> Result<Self, ParseIdError> {
		let id = id.into();
		if id.trim().is_empty() {
			return Err(ParseIdError::Empty);
		}
		Ok(Self(id))
	}
	pub fn as_str(&self) -> &str {
		&self.0
	}
}

impl fmt::Display for UserId {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(&self.0)
	}
}

/// Matrix room identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RoomId(String);

impl RoomId {
	/// Create a non-empty `RoomId`.
	pub fn new(id: impl Into<String>) -> Result<Self, ParseIdError> {
		let id = id.into();
		if id.trim().is_empty() {
			return Err(ParseIdError::Empty);
		}
		Ok(Self(id))
	}
	pub fn as_str(&self) -> &str {
		&self.0
	}
}

impl fmt::Display for RoomId {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(&self.0)
	}
}

/// Outcome of matching a message body against the handle command grammar.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HandleCommand {
	/// `!handle <label> [did=]<did:plc:ID>` matched in full.
	Command { label: Label, did: Did },

	/// Body starts with the command keyword but does not match the grammar.
	Usage,

	/// Body is not a handle command at all.
	NotCommand,
}

impl HandleCommand {
	/// Command keyword.
	pub const PREFIX: &'static str = "!handle";

	/// Match a message body against the command grammar.
	///
	/// Grammar: the keyword, one space, a label, one space, an identifier
	/// with an optional `did=` prefix, nothing else.
	pub fn parse(body: &str) -> Self {
		if !body.starts_with(Self::PREFIX) {
			return Self::NotCommand;
		}

		let fields: Vec<&str> = body.split(' ').collect();
		if fields.len() != 3 || fields[0] != Self::PREFIX {
			return Self::Usage;
		}

		let Ok(label) = Label::new(fields[1]) else {
			return Self::Usage;
		};

		let did_field = fields[2].strip_prefix("did=").unwrap_or(fields[2]);
		let Ok(did) = Did::new(did_field) else {
			return Self::Usage;
		};

		Self::Command { label, did }
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn label_accepts_letters_digits_hyphen_dot() {
		assert_eq!(Label::new("tree").unwrap().as_str(), "tree");
		assert_eq!(Label::new("a-B.9").unwrap().as_str(), "a-B.9");
		assert_eq!(Label::new("").unwrap_err(), ParseIdError::Empty);
		assert!(matches!(Label::new("no spaces"), Err(ParseIdError::InvalidLabel(_))));
		assert!(matches!(Label::new("über"), Err(ParseIdError::InvalidLabel(_))));
	}

	#[test]
	fn did_requires_plc_prefix_and_lowercase_alnum() {
		assert!(Did::new("did:plc:524tuhdhh3m7li5gycdn6boe").is_ok());
		assert!(matches!(Did::new("did:plc:"), Err(ParseIdError::InvalidDid(_))));
		assert!(matches!(Did::new("did:web:example.com"), Err(ParseIdError::InvalidDid(_))));
		assert!(matches!(Did::new("did:plc:ABC"), Err(ParseIdError::InvalidDid(_))));
		assert_eq!(Did::new("").unwrap_err(), ParseIdError::Empty);
	}

	#[test]
	fn handle_joins_label_and_domain() {
		let label = Label::new("tree").unwrap();
		let handle = Handle::new(&label, "example.social");
		assert_eq!(handle.as_str(), "tree.example.social");
		assert_eq!(handle.fqdn(), "tree.example.social.");
		assert_eq!(handle.dns_name(), "_atproto.tree.example.social.");
	}

	#[test]
	fn command_parses_with_and_without_did_prefix() {
		let parsed = HandleCommand::parse("!handle tree did:plc:524tuhdhh3m7li5gycdn6boe");
		let HandleCommand::Command { label, did } = parsed else {
			panic!("expected Command, got: {parsed:?}");
		};
		assert_eq!(label.as_str(), "tree");
		assert_eq!(did.as_str(), "did:plc:524tuhdhh3m7li5gycdn6boe");

		let parsed = HandleCommand::parse("!handle tree did=did:plc:524tuhdhh3m7li5gycdn6boe");
		assert!(matches!(parsed, HandleCommand::Command { .. }));
	}

	#[test]
	fn command_prefix_without_grammar_match_is_usage() {
		assert_eq!(HandleCommand::parse("!handle"), HandleCommand::Usage);
		assert_eq!(HandleCommand::parse("!handle tree"), HandleCommand::Usage);
		assert_eq!(HandleCommand::parse("!handle tree extra did:plc:abc"), HandleCommand::Usage);
		assert_eq!(HandleCommand::parse("!handle tree did:web:x"), HandleCommand::Usage);
		assert_eq!(HandleCommand::parse("!handle bad label did:plc:abc"), HandleCommand::Usage);
		assert_eq!(HandleCommand::parse("!handlefoo"), HandleCommand::Usage);
		assert_eq!(HandleCommand::parse("!handle  tree did:plc:abc"), HandleCommand::Usage);
	}

	#[test]
	fn non_command_bodies_are_ignored() {
		assert_eq!(HandleCommand::parse("hello there"), HandleCommand::NotCommand);
		assert_eq!(HandleCommand::parse("!other tree did:plc:abc"), HandleCommand::NotCommand);
		assert_eq!(HandleCommand::parse(""), HandleCommand::NotCommand);
	}
}
