#![forbid(unsafe_code)]

pub mod gcp;
pub mod matrix;

use core::fmt;

use handlebot_domain::{EventId, RoomId};
use serde::{Deserialize, Serialize};

/// Wrapper that redacts in logs.
#[derive(Clone)]
pub struct SecretString(String);

impl SecretString {
	pub fn new(s: impl Into<String>) -> Self {
		Self(s.into())
	}

	/// Access the inner secret string.
	pub fn expose(&self) -> &str {
		&self.0
	}
}

impl fmt::Debug for SecretString {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str("SecretString(<redacted>)")
	}
}

impl fmt::Display for SecretString {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str("<redacted>")
	}
}

impl serde::Serialize for SecretString {
	fn serialize<S>(&self, serializer: S) -> Result<<S as serde::Serializer>::Ok, <S as serde::Serializer>::Error>
	where
		S: serde::Serializer,
	{
		serializer.serialize_str("")
	}
}

impl<'de> serde::Deserialize<'de> for SecretString {
	fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
	where
		D: serde::Deserializer<'de>,
	{
		let s = String::deserialize(deserializer)?;
		Ok(SecretString::new(s))
	}
}

/// One record set in the managed zone, as the provider reports it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DnsRecordSet {
	pub name: String,

	#[serde(rename = "type")]
	pub rtype: String,

	#[serde(default)]
	pub ttl: Option<u32>,

	#[serde(default)]
	pub rrdatas: Vec<String>,
}

/// DNS record-management operations the bot consumes.
#[async_trait::async_trait]
pub trait DnsProvisioner: Send + Sync {
	/// Full current record set of the zone.
	async fn list_records(&self) -> anyhow::Result<Vec<DnsRecordSet>>;

	/// Create a TXT record set with a single value.
	async fn create_txt(&self, name: &str, value: &str) -> anyhow::Result<()>;

	/// Delete a record set by name and type.
	async fn delete_record(&self, name: &str, rtype: &str) -> anyhow::Result<()>;
}

/// Outbound chat operations the bot consumes.
#[async_trait::async_trait]
pub trait Messenger: Send + Sync {
	/// Send a plain-text message into a room, optionally threaded as a
	/// reply to a prior event.
	async fn send_message(&self, room: &RoomId, body: &str, reply_to: Option<&EventId>) -> anyhow::Result<()>;
}
