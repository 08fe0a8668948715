#![forbid(unsafe_code)]

use std::sync::Mutex;

use async_trait::async_trait;
use handlebot_domain::{EventId, RoomId};
use handlebot_platform::{DnsProvisioner, DnsRecordSet, Messenger};

/// In-memory zone standing in for the DNS provider.
#[derive(Default)]
pub struct FakeDns {
	pub records: Mutex<Vec<DnsRecordSet>>,
	pub created: Mutex<Vec<(String, String)>>,
	pub deleted: Mutex<Vec<(String, String)>>,
	pub fail_create: bool,
	pub fail_delete: bool,
	pub list_calls: Mutex<usize>,
}

impl FakeDns {
	pub fn with_records(records: Vec<DnsRecordSet>) -> Self {
		Self {
			records: Mutex::new(records),
			..Self::default()
		}
	}

	pub fn txt(name: &str, value: &str) -> DnsRecordSet {
		DnsRecordSet {
			name: name.to_string(),
			rtype: "TXT".to_string(),
			ttl: Some(300),
			rrdatas: vec![value.to_string()],
		}
	}
}

#[async_trait]
impl DnsProvisioner for FakeDns {
	async fn list_records(&self) -> anyhow::Result<Vec<DnsRecordSet>> {
		*self.list_calls.lock().unwrap() += 1;
		Ok(self.records.lock().unwrap().clone())
	}

	async fn create_txt(&self, name: &str, value: &str) -> anyhow::Result<()> {
		if self.fail_create {
			anyhow::bail!("create refused (fake)");
		}
		self.created.lock().unwrap().push((name.to_string(), value.to_string()));
		self.records.lock().unwrap().push(Self::txt(name, value));
		Ok(())
	}

	async fn delete_record(&self, name: &str, rtype: &str) -> anyhow::Result<()> {
		if self.fail_delete {
			anyhow::bail!("delete refused (fake)");
		}
		self.deleted.lock().unwrap().push((name.to_string(), rtype.to_string()));
		self.records.lock().unwrap().retain(|r| !(r.name == name && r.rtype == rtype));
		Ok(())
	}
}

/// Captures outbound replies.
#[derive(Default)]
pub struct FakeMessenger {
	pub sent: Mutex<Vec<SentMessage>>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentMessage {
	pub room: String,
	pub body: String,
	pub reply_to: Option<String>,
}

impl FakeMessenger {
	pub fn sent(&self) -> Vec<SentMessage> {
		self.sent.lock().unwrap().clone()
	}
}

#[async_trait]
impl Messenger for FakeMessenger {
	async fn send_message(&self, room: &RoomId, body: &str, reply_to: Option<&EventId>) -> anyhow::Result<()> {
		self.sent.lock().unwrap().push(SentMessage {
			room: room.as_str().to_string(),
			body: body.to_string(),
			reply_to: reply_to.map(|ev| ev.as_str().to_string()),
		});
		Ok(())
	}
}
