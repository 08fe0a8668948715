#![forbid(unsafe_code)]

use std::path::Path;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use anyhow::Context;
use base64::Engine as _;
use base64::engine::general_purpose::URL_SAFE_NO_PAD as BASE64_URL;
use rsa::RsaPrivateKey;
use rsa::pkcs8::DecodePrivateKey;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::debug;

use crate::SecretString;

const DEFAULT_TOKEN_URI: &str = "https://oauth2.googleapis.com/token";
const CLOUD_DNS_SCOPE: &str = "https://www.googleapis.com/auth/ndev.clouddns.readwrite";
const JWT_GRANT_TYPE: &str = "urn:ietf:params:oauth:grant-type:jwt-bearer";
const JWT_LIFETIME_SECS: i64 = 3600;
const REFRESH_BUFFER: Duration = Duration::from_secs(60);

/// Service-account key, as exported by the cloud console (`gcloud.json`).
#[derive(Debug, Clone, Deserialize)]
pub struct ServiceAccountKey {
	pub client_email: String,
	pub private_key: SecretString,

	#[serde(default)]
	pub token_uri: Option<String>,
}

impl ServiceAccountKey {
	/// Read and parse a key file.
	pub fn from_file(path: &Path) -> anyhow::Result<Self> {
		let raw = std::fs::read_to_string(path)
			.with_context(|| format!("read service account key from {}", path.display()))?;
		serde_json::from_str(&raw).context("parse service account key json")
	}

	fn token_uri(&self) -> &str {
		self.token_uri.as_deref().unwrap_or(DEFAULT_TOKEN_URI)
	}
}

#[derive(Debug, Serialize)]
struct JwtHeader {
	alg: &'static str,
	typ: &'static str,
}

#[derive(Debug, Serialize)]
struct JwtClaims<'a> {
	iss: &'a str,
	scope: &'a str,
	aud: &'a str,
	iat: i64,
	exp: i64,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
	access_token: String,
	expires_in: u64,
}

struct CachedToken {
	access_token: String,
	expires_at: Instant,
}

/// Bearer-token source for Google API calls.
///
/// Signs a self-issued RS256 JWT with the service-account key, exchanges it
/// at the token endpoint, and caches the access token until shortly before
/// expiry.
pub struct TokenProvider {
	http: reqwest::Client,
	key: ServiceAccountKey,
	signing_key: RsaPrivateKey,
	cached: Mutex<Option<CachedToken>>,
}

impl TokenProvider {
	pub fn new(http: reqwest::Client, key: ServiceAccountKey) -> anyhow::Result<Self> {
		let signing_key =
			RsaPrivateKey::from_pkcs8_pem(key.private_key.expose()).context("parse service account private key pem")?;

		Ok(Self {
			http,
			key,
			signing_key,
			cached: Mutex::new(None),
		})
	}

	/// Current access token, fetching a fresh one if the cache is stale.
	pub async fn token(&self) -> anyhow::Result<String> {
		{
			let cached = self.cached.lock().unwrap_or_else(|e| e.into_inner());
			if let Some(tok) = cached.as_ref()
				&& Instant::now() + REFRESH_BUFFER < tok.expires_at
			{
				return Ok(tok.access_token.clone());
			}
		}

		let assertion = self.signed_assertion()?;
		let fetched = self.exchange(&assertion).await?;

		let access_token = fetched.access_token.clone();
		let expires_at = Instant::now() + Duration::from_secs(fetched.expires_in);
		debug!(expires_in = fetched.expires_in, "fetched cloud dns access token");

		let mut cached = self.cached.lock().unwrap_or_else(|e| e.into_inner());
		*cached = Some(CachedToken {
			access_token: fetched.access_token,
			expires_at,
		});

		Ok(access_token)
	}

	fn signed_assertion(&self) -> anyhow::Result<String> {
		let now = chrono::Utc::now().timestamp();
		let header = JwtHeader {
			alg: "RS256",
			typ: "JWT",
		};
		let claims = JwtClaims {
			iss: &self.key.client_email,
			scope: CLOUD_DNS_SCOPE,
			aud: self.key.token_uri(),
			iat: now,
			exp: now + JWT_LIFETIME_SECS,
		};

		let header_b64 = BASE64_URL.encode(serde_json::to_vec(&header).context("encode jwt header")?);
		let claims_b64 = BASE64_URL.encode(serde_json::to_vec(&claims).context("encode jwt claims")?);
		let signing_input = format!("{header_b64}.{claims_b64}");

		let digest = Sha256::digest(signing_input.as_bytes());
		let signature = self
			.signing_key
			.sign(rsa::pkcs1v15::Pkcs1v15Sign::new::<Sha256>(), &digest)
			.context("sign jwt assertion")?;

		Ok(format!("{signing_input}.{}", BASE64_URL.encode(signature)))
	}

	async fn exchange(&self, assertion: &str) -> anyhow::Result<TokenResponse> {
		let resp = self
			.http
			.post(self.key.token_uri())
			.form(&[("grant_type", JWT_GRANT_TYPE), ("assertion", assertion)])
			.send()
			.await
			.context("google token exchange request")?;

		let status = resp.status();
		let body = resp.text().await.context("google token exchange read body")?;

		if !status.is_success() {
			anyhow::bail!("google token exchange failed: status={status} body={body}");
		}

		serde_json::from_str(&body).context("google token exchange parse json")
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn key_file_defaults_token_uri() {
		let raw = r#"{"client_email": "bot@project.iam.gserviceaccount.com", "private_key": "pem"}"#;
		let key: ServiceAccountKey = serde_json::from_str(raw).unwrap();
		assert_eq!(key.token_uri(), DEFAULT_TOKEN_URI);
		assert_eq!(key.client_email, "bot@project.iam.gserviceaccount.com");
	}

	#[test]
	fn jwt_claims_serialize_with_scope_and_audience() {
		let claims = JwtClaims {
			iss: "bot@project.iam.gserviceaccount.com",
			scope: CLOUD_DNS_SCOPE,
			aud: DEFAULT_TOKEN_URI,
			iat: 1000,
			exp: 1000 + JWT_LIFETIME_SECS,
		};

		let json = serde_json::to_value(&claims).unwrap();
		assert_eq!(json["scope"], CLOUD_DNS_SCOPE);
		assert_eq!(json["aud"], DEFAULT_TOKEN_URI);
		assert_eq!(json["exp"], 4600);
	}
}
