#![forbid(unsafe_code)]

mod config;
mod dispatcher;
mod store;
mod workflow;

#[cfg(test)]
mod test_support;



use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context as _;
use handlebot_domain::RoomId;
use handlebot_platform::gcp::{CloudDnsClient, CloudDnsConfig, ServiceAccountKey, TokenProvider};
use handlebot_platform::matrix::MatrixClient;
use tracing::{info, warn};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use crate::store::Store;
use crate::workflow::WorkflowContext;

const SYNC_ERROR_BACKOFF: Duration = Duration::from_secs(5);

fn usage_and_exit() -> ! {
	eprintln!(
		"Usage: handlebot [--config path]\n\
\n\
Options:\n\
\t--config  Config file path (default: ~/.handlebot/config.toml)\n\
\t--help    Show this help\n\
"
	);
	std::process::exit(2)
}

fn parse_args() -> Option<PathBuf> {
	let mut config_path: Option<PathBuf> = None;

	let mut it = std::env::args().skip(1);
	while let Some(arg) = it.next() {
		match arg.as_str() {
			"--help" | "-h" => usage_and_exit(),
			"--config" => {
				let v = it.next().unwrap_or_else(|| usage_and_exit());
				if v.trim().is_empty() {
					eprintln!("--config must be non-empty");
					usage_and_exit();
				}
				config_path = Some(PathBuf::from(v));
			}
			other => {
				eprintln!("Unknown argument: {other}");
				usage_and_exit();
			}
		}
	}

	config_path
}

fn init_tracing() {
	let filter = std::env::var("RUST_LOG").unwrap_or_else(|_| "info,handlebot=debug".to_string());

	tracing_subscriber::registry()
		.with(tracing_subscriber::EnvFilter::new(filter))
		.with(tracing_subscriber::fmt::layer().with_target(false))
		.init();
}

fn init_metrics(bind: Option<&str>) {
	let Some(bind) = bind else {
		return;
	};

	match bind.parse::<std::net::SocketAddr>() {
		Ok(addr) => {
			if let Err(e) = metrics_exporter_prometheus::PrometheusBuilder::new()
				.with_http_listener(addr)
				.install()
			{
				warn!(error = %e, "failed to start metrics exporter");
			} else {
				info!(%addr, "metrics exporter listening");
			}
		}
		Err(e) => {
			warn!(error = %e, %bind, "invalid metrics bind address (expected host:port)");
		}
	}
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
	init_tracing();

	let config_path = match parse_args() {
		Some(path) => path,
		None => config::default_config_path()?,
	};
	let cfg = config::load_bot_config_from_path(&config_path)?;
	info!(path = %config_path.display(), "loaded bot config (toml + env overrides)");

	init_metrics(cfg.metrics_bind.as_deref());

	let homeserver = cfg.matrix.homeserver.as_deref().context("matrix.homeserver is required")?;
	let access_token = cfg.matrix.access_token.clone().context("matrix.access_token is required")?;
	let room_id = cfg.matrix.room_id.as_deref().context("matrix.room_id is required")?;
	let handle_domain = cfg.handle_domain.as_deref().context("handle_domain is required")?;
	let project = cfg.dns.project.clone().context("dns.project is required")?;
	let zone = cfg.dns.zone.clone().context("dns.zone is required")?;

	let room = RoomId::new(room_id.to_string())?;

	let mut store = Store::load(&cfg.state_path)?;

	let matrix = MatrixClient::new(homeserver, access_token)?;
	let whoami = matrix.whoami().await.context("matrix whoami check")?;
	info!(user = %whoami, room = %room, "matrix credentials valid");
	if let Some(expected) = cfg.matrix.user_id.as_deref()
		&& expected != whoami
	{
		warn!(expected, actual = %whoami, "matrix token belongs to a different user than configured");
	}

	let http = reqwest::Client::builder()
		.user_agent("handlebot/0.x (clouddns)")
		.build()
		.context("build reqwest client")?;
	let key = ServiceAccountKey::from_file(&cfg.dns.service_account_path)?;
	let tokens = TokenProvider::new(http.clone(), key)?;
	let dns = CloudDnsClient::new(
		http,
		tokens,
		CloudDnsConfig {
			project,
			zone,
			record_ttl: cfg.dns.record_ttl,
		},
	);

	let ctx = WorkflowContext {
		room: &room,
		handle_domain,
	};

	info!(domain = handle_domain, "handlebot ready; entering sync loop");

	// All events are handled to completion on this one task, in delivery
	// order; that is what keeps "at most one owner per handle" race-free.
	let mut since: Option<String> = None;
	loop {
		let batch = match matrix.sync(&room, since.as_deref(), cfg.matrix.sync_timeout_ms).await {
			Ok(batch) => batch,
			Err(e) => {
				metrics::counter!("handlebot_sync_errors_total").increment(1);
				warn!(error = %e, "sync failed; backing off");
				tokio::time::sleep(SYNC_ERROR_BACKOFF).await;
				continue;
			}
		};

		for event in &batch.events {
			metrics::counter!("handlebot_events_total").increment(1);
			if let Err(e) = dispatcher::handle_event(&mut store, &dns, &matrix, &ctx, event).await {
				// The event stays unanswered: no reply, not marked processed.
				warn!(event_id = %event.event_id, error = %e, "event handler failed");
			}
		}

		since = Some(batch.next_batch);
	}
}
