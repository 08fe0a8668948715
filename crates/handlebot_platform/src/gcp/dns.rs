#![forbid(unsafe_code)]

use anyhow::Context;
use serde::{Deserialize, Serialize};

use crate::gcp::TokenProvider;
use crate::{DnsProvisioner, DnsRecordSet};

const DNS_API_BASE: &str = "https://dns.googleapis.com/dns/v1";

/// Zone coordinates for the managed zone the bot writes to.
#[derive(Debug, Clone)]
pub struct CloudDnsConfig {
	pub project: String,
	pub zone: String,

	/// TTL applied to records the bot creates.
	pub record_ttl: u32,
}

/// Cloud DNS v1 REST client for a single managed zone.
pub struct CloudDnsClient {
	http: reqwest::Client,
	tokens: TokenProvider,
	config: CloudDnsConfig,
}

#[derive(Debug, Deserialize)]
struct RrsetsListResponse {
	#[serde(default)]
	rrsets: Vec<DnsRecordSet>,

	#[serde(default, rename = "nextPageToken")]
	next_page_token: Option<String>,
}

#[derive(Debug, Serialize)]
struct RrsetCreateRequest<'a> {
	name: &'a str,

	#[serde(rename = "type")]
	rtype: &'a str,

	ttl: u32,
	rrdatas: [&'a str; 1],
}

impl CloudDnsClient {
	pub fn new(http: reqwest::Client, tokens: TokenProvider, config: CloudDnsConfig) -> Self {
		Self { http, tokens, config }
	}

	fn rrsets_url(&self) -> String {
		format!(
			"{DNS_API_BASE}/projects/{}/managedZones/{}/rrsets",
			urlencoding::encode(&self.config.project),
			urlencoding::encode(&self.config.zone),
		)
	}

	async fn bearer(&self) -> anyhow::Result<String> {
		Ok(format!("Bearer {}", self.tokens.token().await?))
	}
}

#[async_trait::async_trait]
impl DnsProvisioner for CloudDnsClient {
	async fn list_records(&self) -> anyhow::Result<Vec<DnsRecordSet>> {
		let mut out: Vec<DnsRecordSet> = Vec::new();
		let mut page_token: Option<String> = None;

		loop {
			let mut url = self.rrsets_url();
			if let Some(token) = page_token.as_deref() {
				url.push_str("?pageToken=");
				url.push_str(&urlencoding::encode(token));
			}

			let resp = self
				.http
				.get(url)
				.header("Authorization", self.bearer().await?)
				.send()
				.await
				.context("clouddns GET rrsets send")?;

			let status = resp.status();
			let body = resp.text().await.context("clouddns GET rrsets read body")?;

			if !status.is_success() {
				anyhow::bail!("clouddns list rrsets failed: status={status} body={body}");
			}

			let page: RrsetsListResponse = serde_json::from_str(&body).context("clouddns rrsets parse json")?;
			out.extend(page.rrsets);

			if page.next_page_token.is_none() {
				break;
			}
			page_token = page.next_page_token;
		}

		Ok(out)
	}

	async fn create_txt(&self, name: &str, value: &str) -> anyhow::Result<()> {
		let req = RrsetCreateRequest {
			name,
			rtype: "TXT",
			ttl: self.config.record_ttl,
			rrdatas: [value],
		};

		let resp = self
			.http
			.post(self.rrsets_url())
			.header("Authorization", self.bearer().await?)
			.json(&req)
			.send()
			.await
			.context("clouddns POST rrsets send")?;

		let status = resp.status();
		let body = resp.text().await.unwrap_or_default();
		if !status.is_success() {
			anyhow::bail!("clouddns create rrset failed (name={name}): status={status} body={body}");
		}
		Ok(())
	}

	async fn delete_record(&self, name: &str, rtype: &str) -> anyhow::Result<()> {
		let url = format!(
			"{}/{}/{}",
			self.rrsets_url(),
			urlencoding::encode(name),
			urlencoding::encode(rtype),
		);

		let resp = self
			.http
			.delete(url)
			.header("Authorization", self.bearer().await?)
			.send()
			.await
			.context("clouddns DELETE rrset send")?;

		let status = resp.status();
		let body = resp.text().await.unwrap_or_default();
		if !status.is_success() {
			anyhow::bail!("clouddns delete rrset failed (name={name} type={rtype}): status={status} body={body}");
		}
		Ok(())
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn rrset_create_request_shape() {
		let req = RrsetCreateRequest {
			name: "_atproto.tree.example.social.",
			rtype: "TXT",
			ttl: 300,
			rrdatas: ["\"did=did:plc:abc\""],
		};

		let json = serde_json::to_value(&req).unwrap();
		assert_eq!(json["name"], "_atproto.tree.example.social.");
		assert_eq!(json["type"], "TXT");
		assert_eq!(json["ttl"], 300);
		assert_eq!(json["rrdatas"][0], "\"did=did:plc:abc\"");
	}

	#[test]
	fn rrsets_list_response_tolerates_missing_fields() {
		let raw = r#"{"rrsets": [{"name": "example.social.", "type": "SOA"}]}"#;
		let parsed: RrsetsListResponse = serde_json::from_str(raw).unwrap();
		assert_eq!(parsed.rrsets.len(), 1);
		assert_eq!(parsed.rrsets[0].rtype, "SOA");
		assert!(parsed.rrsets[0].rrdatas.is_empty());
		assert!(parsed.next_page_token.is_none());
	}
}
