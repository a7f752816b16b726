//! Generated wire types and client for the `controltower.v1.ToolService` gRPC API.
#![allow(clippy::similar_names)]
#![allow(clippy::doc_markdown)]

tonic::include_proto!("controltower.v1");

pub use tool_service_client::ToolServiceClient;
