#![forbid(unsafe_code)]

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::Context;
use chrono::{DateTime, Utc};
use handlebot_domain::{Did, EventId, Handle, UserId};
use serde::{Deserialize, Serialize};
use tracing::info;

/// One handle binding held by the bot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HandleRecord {
	pub user: UserId,
	pub did: Did,

	#[serde(rename = "createdAt")]
	pub created_at: DateTime<Utc>,
}

/// On-disk shape of the state file (`db.json`).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct StoreData {
	#[serde(default)]
	handles: BTreeMap<String, HandleRecord>,

	#[serde(default)]
	answered: Vec<String>,
}

/// Owned bot state: handle bindings plus the processed-message log.
///
/// Mutation is in-memory only; persistence is the explicit [`Store::save`]
/// call. Answered event ids are append-only.
#[derive(Debug)]
pub struct Store {
	path: Option<PathBuf>,
	data: StoreData,
}

impl Store {
	/// Load the state file, or start empty if it does not exist yet.
	pub fn load(path: &Path) -> anyhow::Result<Self> {
		let data = match std::fs::read_to_string(path) {
			Ok(raw) => serde_json::from_str(&raw).with_context(|| format!("parse state file {}", path.display()))?,
			Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
				info!(path = %path.display(), "state file not found; starting with empty store");
				StoreData::default()
			}
			Err(e) => {
				return Err(anyhow::anyhow!(e).context(format!("read state file {}", path.display())));
			}
		};

		Ok(Self {
			path: Some(path.to_path_buf()),
			data,
		})
	}

	/// Store with no backing file (tests); `save` is a no-op.
	pub fn in_memory() -> Self {
		Self {
			path: None,
			data: StoreData::default(),
		}
	}

	/// Rewrite the whole state file (pretty-printed).
	pub fn save(&self) -> anyhow::Result<()> {
		let Some(path) = self.path.as_deref() else {
			return Ok(());
		};
		let raw = serde_json::to_string_pretty(&self.data).context("serialize state")?;
		std::fs::write(path, raw).with_context(|| format!("write state file {}", path.display()))
	}

	pub fn get(&self, handle: &Handle) -> Option<&HandleRecord> {
		self.data.handles.get(handle.as_str())
	}

	/// The handle currently owned by `user`, if any.
	pub fn handle_owned_by(&self, user: &UserId) -> Option<Handle> {
		self.data
			.handles
			.iter()
			.find(|(_, rec)| &rec.user == user)
			.map(|(h, _)| Handle::from_full(h.clone()))
	}

	pub fn insert(&mut self, handle: Handle, record: HandleRecord) {
		self.data.handles.insert(handle.as_str().to_string(), record);
	}

	pub fn remove(&mut self, handle: &Handle) -> Option<HandleRecord> {
		self.data.handles.remove(handle.as_str())
	}

	pub fn handle_count(&self) -> usize {
		self.data.handles.len()
	}

	pub fn is_answered(&self, event_id: &str) -> bool {
		self.data.answered.iter().any(|id| id == event_id)
	}

	pub fn mark_answered(&mut self, event_id: &EventId) {
		if !self.is_answered(event_id.as_str()) {
			self.data.answered.push(event_id.as_str().to_string());
		}
	}
}
