//! Connect-state publish request model.
//!
//! Mirrors the JSON shape accepted by `PUT connect-state/v1/devices/{id}`.
//! Enums serialize in SCREAMING_SNAKE_CASE.

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum MemberType {
    SpircV2,
    SpircV3,
    ConnectState,
    ConnectStateExtended,
    ActiveDeviceTracker,
    PlayTokenLostPlay,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum PutStateReason {
    UnknownPutStateReason,
    SpircHello,
    SpircNotify,
    NewDevice,
    PlayerStateChanged,
    VolumeChanged,
    PickedUpPlayToken,
    BecameInactive,
    AliasChanged,
    NewConnection,
    PullPlayback,
    AudioDriverInfoChanged,
    PutStateRateLimited,
    BackendMetadataApplied,
}

/// Device category reported to the backend.
///
/// Parses case-insensitively from configuration, e.g. `"speaker"`.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE", ascii_case_insensitive)]
pub enum DeviceType {
    Unknown,
    Computer,
    Tablet,
    Smartphone,
    #[default]
    Speaker,
    Tv,
    Avr,
    Stb,
    AudioDongle,
    GameConsole,
    CastVideo,
    CastAudio,
    Automobile,
    Smartwatch,
    Chromebook,
    UnknownSpotify,
    CarThing,
    Observer,
    HomeThing,
}

// ── Request ──────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PutStateRequest {
    /// Unix milliseconds.
    pub client_side_timestamp: u64,
    pub member_type: MemberType,
    pub put_state_reason: PutStateReason,
    pub device: Device,
    pub is_active: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Device {
    pub device_info: DeviceInfo,
    pub player_state: PlayerState,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceInfo {
    pub can_play: bool,
    pub volume: u32,
    pub name: String,
    pub device_id: String,
    pub device_type: DeviceType,
    pub device_software_version: String,
    pub client_id: String,
    pub spirc_version: String,
    pub capabilities: Capabilities,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Capabilities {
    pub can_be_player: bool,
    pub restrict_to_local: bool,
    pub gaia_eq_connect_id: bool,
    pub supports_logout: bool,
    pub is_observable: bool,
    pub volume_steps: u32,
    pub supported_types: Vec<String>,
    pub command_acks: bool,
    pub supports_rename: bool,
    pub hidden: bool,
    pub disable_volume: bool,
    pub connect_disabled: bool,
    pub supports_playlist_v2: bool,
    pub is_controllable: bool,
    pub supports_external_episodes: bool,
    pub supports_set_backend_metadata: bool,
    pub supports_transfer_command: bool,
    pub supports_command_request: bool,
    pub is_voice_enabled: bool,
    pub needs_full_player_state: bool,
    pub supports_gzip_pushes: bool,
    pub supports_set_options_command: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub supports_hifi: Option<serde_json::Value>,
    pub connect_capabilities: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PlayerState {
    pub is_system_initiated: bool,
}
