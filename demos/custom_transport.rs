//! Demonstrates running the pipeline over a custom [`HttpTransport`] instead of reqwest.
//!
//! 1. Implement [`HttpTransport`] so every request resolves to an [`HttpResponse`], or to a
//!    [`TransportError`] when nothing was received.
//! 2. Wrap the transport in `Arc` and pass it to [`Pipeline::with_transport`]; identity exchanges
//!    use the same transport.
//! 3. Seed a credential close to expiry and watch the pipeline refresh it before the call.
//! 4. Observe every failure as one [`NormalizedError`].

// std
use std::{
	error::Error as StdError,
	fmt::{Display, Formatter, Result as FmtResult},
	sync::Arc,
};
// crates.io
use color_eyre::Result;
use time::{Duration, OffsetDateTime};
// self
use plantgate::{
	auth::Credential,
	config::PipelineConfig,
	error::TransportError,
	http::{HttpResponse, HttpTransport, RequestDescriptor, TransportFuture},
	pipeline::{NoopListener, Pipeline},
	reqwest::{StatusCode, header::AUTHORIZATION},
	store::MemoryStore,
	url::Url,
};

const API_BASE: &str = "https://plant.example.co/rest/v1";
const IDENTITY_URL: &str = "https://plant.example.co/auth/v1/token";

#[tokio::main]
async fn main() -> Result<()> {
	color_eyre::install()?;

	let config = PipelineConfig::builder(API_BASE, Url::parse(IDENTITY_URL)?, "demo-anon-key")
		.request_timeout_ms(1_000)
		.build()?;
	let pipeline = Pipeline::with_transport(
		&config,
		Arc::new(MemoryStore::default()),
		Arc::new(CannedTransport),
		Arc::new(NoopListener),
	)?;
	let expires_at = (OffsetDateTime::now_utc() + Duration::minutes(2)).unix_timestamp();

	pipeline.lifecycle().store().write(&Credential::new("demo-access", "demo-refresh", expires_at))?;

	let response = pipeline.send(RequestDescriptor::get("/devices")).await?;

	println!("Devices fetched with a refreshed token: {}.", String::from_utf8_lossy(&response.body));

	match pipeline.send(RequestDescriptor::get("/offline")).await {
		Ok(_) => println!("Canned transport unexpectedly reached the offline route."),
		Err(e) => println!("Transport failure surfaced as status {}: {}.", e.status, e.message),
	}

	match pipeline.send(RequestDescriptor::get("/work_orders?id=eq.404")).await {
		Ok(_) => println!("Canned transport unexpectedly found the work order."),
		Err(e) => println!("Server rejection surfaced as status {}: {}.", e.status, e.message),
	}

	Ok(())
}

#[derive(Clone, Debug)]
struct LinkDown {
	host: &'static str,
}
impl Display for LinkDown {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		write!(f, "link to {} is down", self.host)
	}
}
impl StdError for LinkDown {}

/// Answers from fixed routes; only the rotated access token is accepted by the API.
struct CannedTransport;
impl HttpTransport for CannedTransport {
	fn send(&self, request: RequestDescriptor) -> TransportFuture<'_> {
		Box::pin(async move {
			let url = request.url();

			if url.starts_with(IDENTITY_URL) {
				return Ok(HttpResponse::new(
					StatusCode::OK,
					b"{\"access_token\":\"demo-access-2\",\"refresh_token\":\"demo-refresh-2\",\"expires_in\":3600}"
						.to_vec(),
				));
			}
			if url.ends_with("/offline") {
				return Err(TransportError::network(LinkDown { host: "plant.example.co" }));
			}

			let authorized = request
				.headers()
				.get(AUTHORIZATION)
				.is_some_and(|value| value.as_bytes() == b"Bearer demo-access-2");

			if !authorized {
				return Ok(HttpResponse::new(StatusCode::UNAUTHORIZED, Vec::new()));
			}
			if url.contains("/work_orders") {
				return Ok(HttpResponse::new(
					StatusCode::NOT_FOUND,
					b"{\"message\":\"Work order 404 does not exist\"}".to_vec(),
				));
			}

			Ok(HttpResponse::new(StatusCode::OK, b"[{\"id\":1,\"name\":\"Press\"}]".to_vec()))
		})
	}
}
