//! Shared helpers for streamgate integration tests

use std::sync::Arc;

pub use streamgate::{
    canonical_string, AdmissionRequest, AuthorizationEnvelope, GateConfig, HmacAuthorizer,
    PlaybackRequest, RequestAuthorizer, Services, StaticPlaybackUrl,
};

pub const TEST_SECRET: &str = "integration-shared-secret";
pub const TEST_BASE_URL: &str = "wss://origin.example:3333/app/stream";

/// Config with a fresh signing key and the test shared secret
pub fn test_config(expires_time_ms: u64) -> GateConfig {
    let mut config = GateConfig::default();
    config.authorization.secret_key = TEST_SECRET.to_string();
    config.stream_token.jwt_signing.private_key = streamgate::generate_private_key_pem()
        .expect("key generation")
        .to_string();
    config.stream_token.jwt_signing.expires_time_ms = expires_time_ms;
    config.playback.base_url = TEST_BASE_URL.to_string();
    config
}

pub fn build_services(config: &GateConfig) -> Services {
    let source = Arc::new(StaticPlaybackUrl::new(config.playback.base_url.clone()));
    Services::from_config(config, source).expect("services from config")
}

/// A playback request signed the way a management API client would sign it
pub fn signed_playback_request(table: &str, service: &str, user: &str) -> PlaybackRequest {
    let signature = HmacAuthorizer::new(TEST_SECRET.as_bytes())
        .expect("authorizer")
        .sign(&canonical_string(table, service, user))
        .expect("sign");
    PlaybackRequest {
        table_id: table.to_string(),
        service_id: service.to_string(),
        user_id: user.to_string(),
        authorization: AuthorizationEnvelope {
            signature,
            timestamp: chrono::Utc::now().timestamp_millis(),
        },
    }
}

pub fn outgoing(url: &str) -> AdmissionRequest {
    AdmissionRequest {
        status: "opening".to_string(),
        direction: "outgoing".to_string(),
        url: Some(url.to_string()),
    }
}
