//! Remote insight service.
//!
//! [`InsightService`] is the seam between the pipeline and the transport. The
//! pipeline only needs the three calls below; [`GrpcInsightService`] implements
//! them over tonic.

use std::sync::Arc;

use async_trait::async_trait;
use http::Uri;
use tonic::Request;
use tonic::metadata::{Ascii, MetadataValue};
use tonic::transport::{Channel, ClientTlsConfig, Endpoint};
use tracing::{debug, info};
use uuid::Uuid;

use crate::config::SyncConfig;
use crate::error::{Result, SyncError};
use crate::proto::{
    CompleteToolSessionRequest, CompletionStatus, CreateToolSessionRequest,
    PublishPackageInsightRequest, ToolServiceClient, ToolSession,
};

/// Header name for request ID
const REQUEST_ID_HEADER: &str = "x-request-id";

/// Operations the pipeline needs from the aggregation service.
///
/// Implementations must bound every call with their own deadline; the pipeline
/// waits on in-flight publishes during shutdown and imposes none itself.
#[async_trait]
pub trait InsightService: Send + Sync {
    /// Opens a session and returns its id.
    async fn create_session(&self, request: CreateToolSessionRequest) -> Result<String>;

    /// Publishes the insight of one package version.
    async fn publish_insight(&self, request: PublishPackageInsightRequest) -> Result<()>;

    /// Marks a session as finished.
    async fn complete_session(&self, session_id: &str, status: CompletionStatus) -> Result<()>;
}

/// Shared handle to an insight service.
pub type InsightClient = Arc<dyn InsightService>;

/// gRPC implementation of [`InsightService`].
#[derive(Debug, Clone)]
pub struct GrpcInsightService {
    client: ToolServiceClient<Channel>,
    metadata: Vec<(&'static str, MetadataValue<Ascii>)>,
}

impl GrpcInsightService {
    /// Connects to the configured endpoint.
    ///
    /// `https` endpoints use TLS with the webpki roots. A missing port defaults to
    /// 443 for `https` and 80 for `http`.
    ///
    /// # Errors
    /// Returns an error if the URL is invalid or the connection cannot be established.
    pub async fn connect(config: &SyncConfig) -> Result<Self> {
        let uri: Uri = config
            .base_url
            .parse()
            .map_err(|e| SyncError::Config(format!("Invalid base URL {}: {e}", config.base_url)))?;

        let host = uri
            .host()
            .ok_or_else(|| SyncError::Config(format!("Base URL has no host: {}", config.base_url)))?
            .to_string();
        let tls = uri.scheme_str() != Some("http");
        let port = uri.port_u16().unwrap_or(if tls { 443 } else { 80 });
        let scheme = if tls { "https" } else { "http" };

        debug!(host = %host, port = port, tls = tls, "Connecting to insight service");

        let mut endpoint = Endpoint::from_shared(format!("{scheme}://{host}:{port}"))?
            .timeout(config.request_timeout())
            .connect_timeout(config.connect_timeout());
        if tls {
            endpoint = endpoint
                .tls_config(ClientTlsConfig::new().with_webpki_roots().domain_name(host.clone()))?;
        }

        let channel = endpoint.connect().await?;
        info!(host = %host, port = port, "Connected to insight service");

        Ok(Self { client: ToolServiceClient::new(channel), metadata: Self::build_metadata(config)? })
    }

    fn build_metadata(config: &SyncConfig) -> Result<Vec<(&'static str, MetadataValue<Ascii>)>> {
        let mut metadata = Vec::new();
        let mut push = |key: &'static str, value: String| -> Result<()> {
            let value = MetadataValue::try_from(value)
                .map_err(|e| SyncError::Config(format!("Invalid value for {key}: {e}")))?;
            metadata.push((key, value));
            Ok(())
        };

        if let Some(token) = &config.token {
            push("authorization", format!("Bearer {token}"))?;
        }
        if let Some(tenant) = &config.tenant_id {
            push("x-tenant-id", tenant.clone())?;
        }
        if let Some(user) = &config.mock_user {
            push("x-mock-user", user.clone())?;
        }
        Ok(metadata)
    }

    fn request<T>(&self, message: T) -> (Request<T>, String) {
        let request_id = Uuid::new_v4().to_string();
        let mut request = Request::new(message);
        for (key, value) in &self.metadata {
            request.metadata_mut().insert(*key, value.clone());
        }
        if let Ok(value) = MetadataValue::try_from(request_id.as_str()) {
            request.metadata_mut().insert(REQUEST_ID_HEADER, value);
        }
        (request, request_id)
    }
}

#[async_trait]
impl InsightService for GrpcInsightService {
    async fn create_session(&self, request: CreateToolSessionRequest) -> Result<String> {
        let (request, request_id) = self.request(request);
        debug!(request_id = %request_id, "CreateToolSession");

        let response = self.client.clone().create_tool_session(request).await?;
        response
            .into_inner()
            .tool_session
            .map(|session| session.tool_session_id)
            .ok_or_else(|| SyncError::Rpc(tonic::Status::internal("response carried no tool session")))
    }

    async fn publish_insight(&self, request: PublishPackageInsightRequest) -> Result<()> {
        let (request, request_id) = self.request(request);
        debug!(request_id = %request_id, "PublishPackageInsight");

        self.client.clone().publish_package_insight(request).await?;
        Ok(())
    }

    async fn complete_session(&self, session_id: &str, status: CompletionStatus) -> Result<()> {
        let (request, request_id) = self.request(CompleteToolSessionRequest {
            tool_session: Some(ToolSession { tool_session_id: session_id.to_string() }),
            status: status as i32,
        });
        debug!(request_id = %request_id, session_id = %session_id, "CompleteToolSession");

        self.client.clone().complete_tool_session(request).await?;
        Ok(())
    }
}
