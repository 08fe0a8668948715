#![forbid(unsafe_code)]

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context as _, anyhow};
use handlebot_platform::SecretString;
use serde::Deserialize;
use tracing::{info, warn};

/// Default config path: `~/.handlebot/config.toml`.
pub fn default_config_path() -> anyhow::Result<PathBuf> {
	let home = dirs::home_dir().ok_or_else(|| anyhow!("could not determine home directory"))?;
	Ok(home.join(".handlebot").join("config.toml"))
}

/// Load the bot config from TOML and env overrides.
pub fn load_bot_config_from_path(path: &Path) -> anyhow::Result<BotConfig> {
	let file_cfg = read_toml_if_exists(path)
		.with_context(|| format!("read config from {}", path.display()))?
		.unwrap_or_default();

	let mut cfg = BotConfig::from_file(file_cfg);

	apply_env_overrides(&mut cfg);

	Ok(cfg)
}

/// Bot config (v1).
#[derive(Debug, Clone, Default)]
pub struct BotConfig {
	/// Base domain suffix handles are minted under.
	pub handle_domain: Option<String>,
	/// Path of the JSON state file.
	pub state_path: PathBuf,
	/// Optional metrics exporter bind address (host:port).
	pub metrics_bind: Option<String>,
	pub matrix: MatrixSettings,
	pub dns: DnsSettings,
}

/// Matrix homeserver settings.
#[derive(Debug, Clone, Default)]
pub struct MatrixSettings {
	/// Homeserver base URL.
	pub homeserver: Option<String>,
	/// Access token of the bot account.
	pub access_token: Option<SecretString>,
	/// Expected mxid of the bot account (checked against whoami).
	pub user_id: Option<String>,
	/// Room the bot watches and replies in.
	pub room_id: Option<String>,
	/// Long-poll timeout for /sync, in milliseconds.
	pub sync_timeout_ms: u64,
}

/// Cloud DNS settings.
#[derive(Debug, Clone, Default)]
pub struct DnsSettings {
	pub project: Option<String>,
	pub zone: Option<String>,
	/// Service-account key file path.
	pub service_account_path: PathBuf,
	/// TTL for records the bot creates.
	pub record_ttl: u32,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct FileConfig {
	handle_domain: Option<String>,
	state_path: Option<String>,
	metrics_bind: Option<String>,

	#[serde(default)]
	matrix: FileMatrixSettings,

	#[serde(default)]
	dns: FileDnsSettings,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct FileMatrixSettings {
	homeserver: Option<String>,
	access_token: Option<String>,
	user_id: Option<String>,
	room_id: Option<String>,
	sync_timeout_ms: Option<u64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct FileDnsSettings {
	project: Option<String>,
	zone: Option<String>,
	service_account_path: Option<String>,
	record_ttl: Option<u32>,
}

impl BotConfig {
	fn from_file(file: FileConfig) -> Self {
		Self {
			handle_domain: file.handle_domain.filter(|s| !s.trim().is_empty()),
			state_path: file
				.state_path
				.filter(|s| !s.trim().is_empty())
				.map(PathBuf::from)
				.unwrap_or_else(|| PathBuf::from("db.json")),
			metrics_bind: file.metrics_bind.filter(|s| !s.trim().is_empty()),
			matrix: MatrixSettings {
				homeserver: file.matrix.homeserver.filter(|s| !s.trim().is_empty()),
				access_token: file
					.matrix
					.access_token
					.filter(|s| !s.trim().is_empty())
					.map(SecretString::new),
				user_id: file.matrix.user_id.filter(|s| !s.trim().is_empty()),
				room_id: file.matrix.room_id.filter(|s| !s.trim().is_empty()),
				sync_timeout_ms: file.matrix.sync_timeout_ms.unwrap_or(30_000),
			},
			dns: DnsSettings {
				project: file.dns.project.filter(|s| !s.trim().is_empty()),
				zone: file.dns.zone.filter(|s| !s.trim().is_empty()),
				service_account_path: file
					.dns
					.service_account_path
					.filter(|s| !s.trim().is_empty())
					.map(PathBuf::from)
					.unwrap_or_else(|| PathBuf::from("gcloud.json")),
				record_ttl: file.dns.record_ttl.unwrap_or(300),
			},
		}
	}
}

fn read_toml_if_exists(path: &Path) -> anyhow::Result<Option<FileConfig>> {
	match fs::read_to_string(path) {
		Ok(s) => {
			let cfg: FileConfig = toml::from_str(&s).context("parse TOML")?;
			Ok(Some(cfg))
		}
		Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
		Err(e) => Err(anyhow!(e).context("read config file")),
	}
}

fn apply_env_overrides(cfg: &mut BotConfig) {
	if let Ok(v) = std::env::var("HANDLEBOT_MATRIX_HOMESERVER") {
		let v = v.trim().to_string();
		if !v.is_empty() {
			cfg.matrix.homeserver = Some(v);
			info!("matrix config: homeserver overridden by env");
		}
	}

	if let Ok(v) = std::env::var("HANDLEBOT_MATRIX_TOKEN") {
		let v = v.trim().to_string();
		if !v.is_empty() {
			cfg.matrix.access_token = Some(SecretString::new(v));
			info!("matrix config: access_token overridden by env");
		}
	}

	if let Ok(v) = std::env::var("HANDLEBOT_MATRIX_USER") {
		let v = v.trim().to_string();
		if !v.is_empty() {
			cfg.matrix.user_id = Some(v);
			info!("matrix config: user_id overridden by env");
		}
	}

	if let Ok(v) = std::env::var("HANDLEBOT_MATRIX_ROOM") {
		let v = v.trim().to_string();
		if !v.is_empty() {
			cfg.matrix.room_id = Some(v);
			info!("matrix config: room_id overridden by env");
		}
	}

	if let Ok(v) = std::env::var("HANDLEBOT_SYNC_TIMEOUT_MS")
		&& let Ok(ms) = v.trim().parse::<u64>()
	{
		cfg.matrix.sync_timeout_ms = ms;
		info!(ms, "matrix config: sync_timeout_ms overridden by env");
	}

	if let Ok(v) = std::env::var("HANDLEBOT_DNS_PROJECT") {
		let v = v.trim().to_string();
		if !v.is_empty() {
			cfg.dns.project = Some(v);
			info!("dns config: project overridden by env");
		}
	}

	if let Ok(v) = std::env::var("HANDLEBOT_DNS_ZONE") {
		let v = v.trim().to_string();
		if !v.is_empty() {
			cfg.dns.zone = Some(v);
			info!("dns config: zone overridden by env");
		}
	}

	if let Ok(v) = std::env::var("HANDLEBOT_DNS_SERVICE_ACCOUNT") {
		let v = v.trim().to_string();
		if !v.is_empty() {
			cfg.dns.service_account_path = PathBuf::from(v);
			info!("dns config: service_account_path overridden by env");
		}
	}

	if let Ok(v) = std::env::var("HANDLEBOT_DNS_RECORD_TTL")
		&& let Ok(ttl) = v.trim().parse::<u32>()
	{
		cfg.dns.record_ttl = ttl;
		info!(ttl, "dns config: record_ttl overridden by env");
	}

	if let Ok(v) = std::env::var("HANDLEBOT_HANDLE_DOMAIN") {
		let v = v.trim().to_string();
		if !v.is_empty() {
			cfg.handle_domain = Some(v);
			info!("config: handle_domain overridden by env");
		}
	}

	if let Ok(v) = std::env::var("HANDLEBOT_STATE_PATH") {
		let v = v.trim().to_string();
		if !v.is_empty() {
			cfg.state_path = PathBuf::from(v);
			info!("config: state_path overridden by env");
		}
	}

	if let Ok(v) = std::env::var("HANDLEBOT_METRICS_BIND") {
		let v = v.trim().to_string();
		if !v.is_empty() {
			cfg.metrics_bind = Some(v);
			info!("config: metrics_bind overridden by env");
		}
	}

	if cfg.matrix.access_token.is_none() {
		warn!("matrix config: no access token configured (set HANDLEBOT_MATRIX_TOKEN)");
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn file_config_maps_into_bot_config() {
		let raw = r#"
handle_domain = "example.social"
state_path = "/var/lib/handlebot/db.json"

[matrix]
homeserver = "https://matrix.example.org"
access_token = "syt_secret"
room_id = "!room:example.org"

[dns]
project = "my-project"
zone = "example-social"
record_ttl = 600
"#;
		let file: FileConfig = toml::from_str(raw).unwrap();
		let cfg = BotConfig::from_file(file);

		assert_eq!(cfg.handle_domain.as_deref(), Some("example.social"));
		assert_eq!(cfg.state_path, PathBuf::from("/var/lib/handlebot/db.json"));
		assert_eq!(cfg.matrix.homeserver.as_deref(), Some("https://matrix.example.org"));
		assert_eq!(cfg.matrix.room_id.as_deref(), Some("!room:example.org"));
		assert_eq!(cfg.matrix.sync_timeout_ms, 30_000);
		assert_eq!(cfg.dns.project.as_deref(), Some("my-project"));
		assert_eq!(cfg.dns.record_ttl, 600);
		assert_eq!(cfg.dns.service_account_path, PathBuf::from("gcloud.json"));
	}

	#[test]
	fn empty_file_config_yields_defaults() {
		let cfg = BotConfig::from_file(FileConfig::default());
		assert!(cfg.handle_domain.is_none());
		assert_eq!(cfg.state_path, PathBuf::from("db.json"));
		assert_eq!(cfg.dns.record_ttl, 300);
		assert!(cfg.matrix.access_token.is_none());
	}

	#[test]
	fn blank_strings_are_treated_as_unset() {
		let raw = r#"
handle_domain = "  "

[matrix]
homeserver = ""
"#;
		let file: FileConfig = toml::from_str(raw).unwrap();
		let cfg = BotConfig::from_file(file);
		assert!(cfg.handle_domain.is_none());
		assert!(cfg.matrix.homeserver.is_none());
	}
}
