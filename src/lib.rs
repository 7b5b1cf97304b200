mod admission;
mod authorization;
mod config;
mod error;
mod playback;
mod secrets;
mod services;
mod signer;
mod stream_token;

pub use admission::{
    AdmissionDecision, AdmissionDirection, AdmissionError, AdmissionGate, AdmissionRequest,
    AdmissionStatus, REASON_AUTHORIZED, REASON_INCOMING_PASS,
};
pub use authorization::{
    authorizer_from_config, canonical_string, check_freshness, AuthorizationEnvelope,
    AuthorizationError, DisabledAuthorizer, HmacAuthorizer, RequestAuthorizer,
    CANONICAL_DELIMITER, FRESHNESS_WINDOW_MS,
};
pub use config::{
    AuthorizationConfig, ConfigError, GateConfig, JwtSigningConfig, PlaybackConfig,
    StreamTokenConfig, AUTHORIZATION_SECRET_KEY, DEFAULT_PLAYBACK_URL, STREAM_TOKEN_PRIVATE_KEY,
};
pub use error::GateError;
pub use playback::{
    with_stream_token, PlaybackError, PlaybackRequest, PlaybackService, PlaybackUrl,
    PlaybackUrlSource, StaticPlaybackUrl, STATUS_OK,
};
pub use secrets::{
    ChainLookup, DefaultLookup, EnvLookup, MapLookup, SecretError, SecretLookup,
};
pub use services::Services;
pub use signer::{generate_private_key_pem, Claims, Signer, SignerError, Token};
pub use stream_token::{
    stream_token_from_config, DisabledStreamToken, SignedStreamToken, StreamAccessToken,
    StreamTokenError, STREAM_ACCESS_TOKEN_TYPE, STREAM_TOKEN_QUERY_PARAM,
};
