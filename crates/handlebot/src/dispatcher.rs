#![forbid(unsafe_code)]

use anyhow::Context;
use handlebot_domain::{EventId, HandleCommand, UserId};
use handlebot_platform::matrix::RoomEvent;
use handlebot_platform::{DnsProvisioner, Messenger};
use tracing::debug;

use crate::store::Store;
use crate::workflow::{AssignRequest, WorkflowContext, assign_handle};

const USAGE_REPLY: &str = "Invalid command! Use the form: \"!handle name did\", \
for example: \"!handle tree did:plc:524tuhdhh3m7li5gycdn6boe\"";

/// Handle one room timeline event.
///
/// Replay guard: event ids already in the answered log are skipped, so a
/// redelivered event never triggers a second reply or mutation. The id is
/// marked answered (and the store persisted) only after the command was
/// handled; an error propagating out of the workflow leaves the event
/// unanswered on purpose.
pub async fn handle_event(
	store: &mut Store,
	dns: &dyn DnsProvisioner,
	messenger: &dyn Messenger,
	ctx: &WorkflowContext<'_>,
	event: &RoomEvent,
) -> anyhow::Result<()> {
	if event.kind != "m.room.message" {
		return Ok(());
	}

	if store.is_answered(&event.event_id) {
		debug!(event_id = %event.event_id, "event already answered; skipping");
		return Ok(());
	}

	let Some(body) = event.content.body.as_deref() else {
		return Ok(());
	};

	let event_id = EventId::new(event.event_id.clone()).context("event id must be non-empty")?;

	match HandleCommand::parse(body) {
		HandleCommand::NotCommand => return Ok(()),

		HandleCommand::Usage => {
			metrics::counter!("handlebot_commands_total", "result" => "usage_error").increment(1);
			messenger.send_message(ctx.room, USAGE_REPLY, Some(&event_id)).await?;
			metrics::counter!("handlebot_replies_total").increment(1);
		}

		HandleCommand::Command { label, did } => {
			metrics::counter!("handlebot_commands_total", "result" => "parsed").increment(1);
			let user = UserId::new(event.sender.clone()).context("event sender must be non-empty")?;
			let req = AssignRequest {
				label,
				user,
				did,
				reply_to: Some(event_id.clone()),
			};
			assign_handle(store, dns, messenger, ctx, &req).await?;
			metrics::counter!("handlebot_replies_total").increment(1);
		}
	}

	store.mark_answered(&event_id);
	store.save()?;
	Ok(())
}
