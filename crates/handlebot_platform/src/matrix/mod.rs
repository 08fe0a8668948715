#![forbid(unsafe_code)]

use anyhow::Context;
use handlebot_domain::{EventId, RoomId};
use serde::{Deserialize, Serialize};
use url::Url;
use uuid::Uuid;

use crate::{Messenger, SecretString};

const SYNC_PATH: &str = "/_matrix/client/v3/sync";
const WHOAMI_PATH: &str = "/_matrix/client/v3/account/whoami";

/// Client-server API client for a single homeserver.
#[derive(Clone)]
pub struct MatrixClient {
	http: reqwest::Client,
	base_url: Url,
	access_token: SecretString,
}

/// One batch of room timeline events from `/sync`.
#[derive(Debug, Clone)]
pub struct SyncBatch {
	/// Token to resume from on the next sync.
	pub next_batch: String,

	/// Timeline events of the requested room, in delivery order.
	pub events: Vec<RoomEvent>,
}

/// A room timeline event, reduced to the fields the bot inspects.
#[derive(Debug, Clone, Deserialize)]
pub struct RoomEvent {
	pub event_id: String,
	pub sender: String,

	#[serde(rename = "type")]
	pub kind: String,

	#[serde(default)]
	pub content: EventContent,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct EventContent {
	#[serde(default)]
	pub msgtype: Option<String>,

	#[serde(default)]
	pub body: Option<String>,
}

#[derive(Debug, Serialize)]
struct MessageContent<'a> {
	msgtype: &'static str,
	body: &'a str,

	#[serde(rename = "m.relates_to", skip_serializing_if = "Option::is_none")]
	relates_to: Option<RelatesTo<'a>>,
}

#[derive(Debug, Serialize)]
struct RelatesTo<'a> {
	#[serde(rename = "m.in_reply_to")]
	in_reply_to: InReplyTo<'a>,
}

#[derive(Debug, Serialize)]
struct InReplyTo<'a> {
	event_id: &'a str,
}

#[derive(Debug, Deserialize)]
struct SyncResponse {
	next_batch: String,

	#[serde(default)]
	rooms: Option<SyncRooms>,
}

#[derive(Debug, Deserialize)]
struct SyncRooms {
	#[serde(default)]
	join: std::collections::BTreeMap<String, JoinedRoom>,
}

#[derive(Debug, Deserialize)]
struct JoinedRoom {
	#[serde(default)]
	timeline: Timeline,
}

#[derive(Debug, Default, Deserialize)]
struct Timeline {
	#[serde(default)]
	events: Vec<RoomEvent>,
}

#[derive(Debug, Deserialize)]
struct WhoamiResponse {
	user_id: String,
}

impl MatrixClient {
	pub fn new(homeserver: &str, access_token: SecretString) -> anyhow::Result<Self> {
		let http = reqwest::Client::builder()
			.user_agent("handlebot/0.x (client-server)")
			.build()
			.context("build reqwest client")?;

		let base_url = Url::parse(homeserver).context("parse homeserver url")?;

		Ok(Self {
			http,
			base_url,
			access_token,
		})
	}

	fn authed(&self, req: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
		req.header("Authorization", format!("Bearer {}", self.access_token.expose()))
	}

	fn url(&self, path_and_query: &str) -> anyhow::Result<Url> {
		self.base_url.join(path_and_query).context("join matrix url")
	}

	/// Resolve the mxid the access token belongs to.
	pub async fn whoami(&self) -> anyhow::Result<String> {
		let url = self.url(WHOAMI_PATH)?;

		let resp = self
			.authed(self.http.get(url))
			.send()
			.await
			.context("matrix GET /account/whoami send")?;

		let status = resp.status();
		let body = resp.text().await.context("matrix GET /account/whoami read body")?;

		if !status.is_success() {
			anyhow::bail!("matrix whoami failed: status={status} body={body}");
		}

		let parsed: WhoamiResponse = serde_json::from_str(&body).context("matrix whoami parse json")?;
		Ok(parsed.user_id)
	}

	/// Long-poll `/sync` and return the timeline events of `room`.
	///
	/// Events of other joined rooms in the response are dropped here; the
	/// bot only ever watches one room.
	pub async fn sync(&self, room: &RoomId, since: Option<&str>, timeout_ms: u64) -> anyhow::Result<SyncBatch> {
		let mut path = format!("{SYNC_PATH}?timeout={timeout_ms}");
		if let Some(since) = since {
			path.push_str("&since=");
			path.push_str(&urlencoding::encode(since));
		}
		let url = self.url(&path)?;

		let resp = self.authed(self.http.get(url)).send().await.context("matrix GET /sync send")?;

		let status = resp.status();
		let body = resp.text().await.context("matrix GET /sync read body")?;

		if !status.is_success() {
			anyhow::bail!("matrix sync failed: status={status} body={body}");
		}

		let parsed: SyncResponse = serde_json::from_str(&body).context("matrix sync parse json")?;

		let events = parsed
			.rooms
			.and_then(|mut rooms| rooms.join.remove(room.as_str()))
			.map(|joined| joined.timeline.events)
			.unwrap_or_default();

		Ok(SyncBatch {
			next_batch: parsed.next_batch,
			events,
		})
	}
}

#[async_trait::async_trait]
impl Messenger for MatrixClient {
	async fn send_message(&self, room: &RoomId, body: &str, reply_to: Option<&EventId>) -> anyhow::Result<()> {
		let txn_id = Uuid::new_v4();
		let url = self.url(&format!(
			"/_matrix/client/v3/rooms/{}/send/m.room.message/{}",
			urlencoding::encode(room.as_str()),
			txn_id
		))?;

		let content = MessageContent {
			msgtype: "m.text",
			body,
			relates_to: reply_to.map(|ev| RelatesTo {
				in_reply_to: InReplyTo { event_id: ev.as_str() },
			}),
		};

		let resp = self
			.authed(self.http.put(url))
			.json(&content)
			.send()
			.await
			.context("matrix PUT /send send")?;

		let status = resp.status();
		let body = resp.text().await.unwrap_or_default();
		if !status.is_success() {
			anyhow::bail!("matrix send message failed: status={status} body={body}");
		}
		Ok(())
	}
}
