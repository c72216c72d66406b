use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{MediaError, Result};
use crate::video::backend::EncoderFactory;
use crate::video::types::{ContainerFormat, VideoCodec};

/// One output encoding: a container plus an optional codec hint
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncodingCandidate {
    pub container: ContainerFormat,

    /// `None` leaves the codec choice to the encoder
    #[serde(default)]
    pub codec: Option<VideoCodec>,
}

impl EncodingCandidate {
    pub fn new(container: ContainerFormat, codec: Option<VideoCodec>) -> Self {
        Self { container, codec }
    }

    /// MIME type with codec parameter, e.g. `video/webm;codecs=vp9`
    pub fn mime_type(&self) -> String {
        match self.codec {
            Some(codec) => format!("{};codecs={}", self.container.mime_type(), codec),
            None => self.container.mime_type().to_string(),
        }
    }
}

impl fmt::Display for EncodingCandidate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.mime_type())
    }
}

/// Pick the first candidate the factory supports, in priority order
pub async fn negotiate(candidates: &[EncodingCandidate], factory: &dyn EncoderFactory) -> Result<EncodingCandidate> {
    for candidate in candidates {
        if factory.is_supported(candidate).await {
            info!("Encoding as {}", candidate);
            return Ok(*candidate);
        }
        debug!("{} not supported, trying next candidate", candidate);
    }

    let tried: Vec<String> = candidates.iter().map(|c| c.to_string()).collect();
    Err(MediaError::VideoEncoding {
        reason: format!("no supported output encoding among [{}]", tried.join(", ")),
    }
    .into())
}
