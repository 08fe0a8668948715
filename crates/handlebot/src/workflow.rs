#![forbid(unsafe_code)]

use chrono::Utc;
use handlebot_domain::{Did, EventId, Handle, Label, RoomId, UserId};
use handlebot_platform::{DnsProvisioner, Messenger};
use tracing::{info, warn};

use crate::store::{HandleRecord, Store};

/// Shared request context: the room replies go to and the base domain
/// handles are minted under.
pub struct WorkflowContext<'a> {
	pub room: &'a RoomId,
	pub handle_domain: &'a str,
}

/// A parsed handle request, ready for assignment.
#[derive(Debug, Clone)]
pub struct AssignRequest {
	pub label: Label,
	pub user: UserId,
	pub did: Did,
	pub reply_to: Option<EventId>,
}

/// How an assignment request was resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AssignmentOutcome {
	/// Same owner, same DID: nothing to do.
	AlreadySet,

	/// Handle owned by a different user.
	Taken,

	/// A conflicting record already exists in the zone outside the bot's
	/// bookkeeping.
	Unavailable,

	/// Handle assigned. `replaced` names the user's previous handle when
	/// this was an ownership transfer; `stale_dns` is set when the previous
	/// handle's DNS record could not be deleted and is now orphaned.
	Assigned { replaced: Option<Handle>, stale_dns: bool },
}

/// The handle-assignment transaction: validate the request, reconcile the
/// user's previous binding, provision the DNS record, persist, acknowledge.
///
/// Provisioner failures on the list/create path propagate before any store
/// mutation is persisted. A failed deletion of the previous handle's record
/// is reported (`stale_dns`) but does not abort the transfer.
pub async fn assign_handle(
	store: &mut Store,
	dns: &dyn DnsProvisioner,
	messenger: &dyn Messenger,
	ctx: &WorkflowContext<'_>,
	req: &AssignRequest,
) -> anyhow::Result<AssignmentOutcome> {
	let handle = Handle::new(&req.label, ctx.handle_domain);
	info!(user = %req.user, did = %req.did, handle = %handle, "handle request");

	if let Some(existing) = store.get(&handle) {
		if existing.user != req.user {
			messenger
				.send_message(
					ctx.room,
					&format!("Sorry, this handle ({handle}) is already taken."),
					req.reply_to.as_ref(),
				)
				.await?;
			return Ok(AssignmentOutcome::Taken);
		}
		if existing.did == req.did {
			messenger
				.send_message(
					ctx.room,
					&format!("You already have this handle ({handle}) set!"),
					req.reply_to.as_ref(),
				)
				.await?;
			return Ok(AssignmentOutcome::AlreadySet);
		}
		// Same owner, new DID: treat as an update and fall through.
	}

	let records = dns.list_records().await?;

	// Guards against records created outside the bot's bookkeeping.
	let fqdn = handle.fqdn();
	if records.iter().any(|r| r.name == fqdn) {
		messenger
			.send_message(
				ctx.room,
				&format!("Sorry, this handle ({handle}) is not available :("),
				req.reply_to.as_ref(),
			)
			.await?;
		return Ok(AssignmentOutcome::Unavailable);
	}

	let previous = store.handle_owned_by(&req.user);
	let mut stale_dns = false;
	if let Some(prev) = previous.as_ref() {
		let prev_name = prev.dns_name();
		if records.iter().any(|r| r.name == prev_name && r.rtype == "TXT") {
			if let Err(e) = dns.delete_record(&prev_name, "TXT").await {
				// Ownership transfer is prioritized over guaranteed deletion;
				// the orphaned record is surfaced, not retried.
				warn!(record = %prev_name, error = %e, "failed to delete previous handle record; leaving it orphaned");
				stale_dns = true;
			}
		}
		store.remove(prev);
	}

	dns.create_txt(&handle.dns_name(), &format!("\"did={}\"", req.did)).await?;

	store.insert(
		handle.clone(),
		HandleRecord {
			user: req.user.clone(),
			did: req.did.clone(),
			created_at: Utc::now(),
		},
	);
	store.save()?;

	metrics::counter!("handlebot_assignments_total").increment(1);
	info!(user = %req.user, handle = %handle, stale_dns, "handle assigned");

	messenger
		.send_message(
			ctx.room,
			&format!("Done! Your handle is now set ({handle}). You can now verify the handle change on Bluesky."),
			req.reply_to.as_ref(),
		)
		.await?;

	let replaced = previous.filter(|p| *p != handle);
	Ok(AssignmentOutcome::Assigned { replaced, stale_dns })
}
