//! Argument composition for the external publisher.
//!
//! Nothing here spawns anything; the publisher receives the target endpoint
//! and a GStreamer pipeline description bound to one capture device and SSRC.

use crate::session::Role;

pub const WIDTH: u32 = 960;
pub const HEIGHT: u32 = 720;
pub const FRAMERATE: u32 = 30;
/// x264enc bitrate in kbit/s.
pub const BITRATE_KBPS: u32 = 1500;
pub const SPEED_PRESET: &str = "ultrafast";
pub const PAYLOAD_TYPE: u8 = 96;
pub const CONFIG_INTERVAL: u32 = 5;

/// Identifier of a role's endpoint on the signalling service.
pub fn endpoint_id(room: &str, role: Role) -> String {
    format!("{room}{role}")
}

/// Publishing URL for a role: `<base>/endpoint/<room><role>`.
pub fn endpoint_url(base_url: &str, room: &str, role: Role) -> String {
    format!(
        "{}/endpoint/{}",
        base_url.trim_end_matches('/'),
        endpoint_id(room, role)
    )
}

pub fn video_pipeline(device: &str, ssrc: u32) -> String {
    format!(
        "v4l2src device={device} \
         ! video/x-raw,width={WIDTH},height={HEIGHT},framerate={FRAMERATE}/1 \
         ! videoconvert ! queue \
         ! x264enc tune=zerolatency bitrate={BITRATE_KBPS} speed-preset={SPEED_PRESET} \
         ! rtph264pay config-interval={CONFIG_INTERVAL} pt={PAYLOAD_TYPE} ssrc={ssrc} ! queue \
         ! application/x-rtp,media=video,encoding-name=H264,payload={PAYLOAD_TYPE}"
    )
}

/// Everything needed to (re)launch the publisher for one role.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublisherArgs {
    pub role: Role,
    pub device: String,
    pub ssrc: u32,
    pub endpoint_url: String,
}

impl PublisherArgs {
    pub fn new(role: Role, device: impl Into<String>, endpoint_url: impl Into<String>) -> Self {
        PublisherArgs {
            role,
            device: device.into(),
            ssrc: role.ssrc(),
            endpoint_url: endpoint_url.into(),
        }
    }

    pub fn argv(&self) -> Vec<String> {
        vec![
            "-u".to_owned(),
            self.endpoint_url.clone(),
            "-V".to_owned(),
            video_pipeline(&self.device, self.ssrc),
        ]
    }
}
