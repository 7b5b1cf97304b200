//! Wiring of the gate components from configuration

use std::sync::Arc;

use crate::admission::AdmissionGate;
use crate::authorization::{authorizer_from_config, RequestAuthorizer};
use crate::config::GateConfig;
use crate::error::GateError;
use crate::playback::{PlaybackService, PlaybackUrlSource};
use crate::stream_token::{stream_token_from_config, StreamAccessToken};

/// Every gate component, built once and shared by request handlers
pub struct Services {
    pub authorizer: Arc<dyn RequestAuthorizer>,
    pub stream_token: Arc<dyn StreamAccessToken>,
    pub admission: AdmissionGate,
    pub playback: PlaybackService,
}

impl Services {
    pub fn from_config(
        config: &GateConfig,
        source: Arc<dyn PlaybackUrlSource>,
    ) -> Result<Self, GateError> {
        let authorizer = authorizer_from_config(&config.authorization)?;
        let stream_token = stream_token_from_config(&config.stream_token)?;
        let admission = AdmissionGate::new(Arc::clone(&stream_token));
        let playback =
            PlaybackService::new(Arc::clone(&authorizer), Arc::clone(&stream_token), source);

        Ok(Self {
            authorizer,
            stream_token,
            admission,
            playback,
        })
    }
}
