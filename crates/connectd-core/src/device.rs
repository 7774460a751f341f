// ── Device descriptor ──
//
// The static description of this device that goes into every connect-state
// publish. Built once per session from `SessionConfig`; never mutated.

use connectd_api::VERSION_STRING;
use connectd_api::connect_state::{
    Capabilities, Device, DeviceInfo, DeviceType, MemberType, PlayerState, PutStateReason,
    PutStateRequest,
};

use crate::config::SessionConfig;

/// Protocol compatibility version reported in `DeviceInfo`.
pub const SPIRC_VERSION: &str = "3.2.6";
/// Number of discrete volume steps the device advertises.
pub const VOLUME_STEPS: u32 = 64;
/// Placeholder until volume synchronization exists.
pub const INITIAL_VOLUME: u32 = 0;

/// Capability flags advertised to the backend.
pub mod capabilities {
    pub const CAN_BE_PLAYER: bool = true;
    pub const RESTRICT_TO_LOCAL: bool = false;
    pub const GAIA_EQ_CONNECT_ID: bool = true;
    pub const SUPPORTS_LOGOUT: bool = true;
    pub const IS_OBSERVABLE: bool = true;
    pub const SUPPORTED_TYPES: &[&str] = &["audio/track"];
    pub const COMMAND_ACKS: bool = true;
    pub const SUPPORTS_RENAME: bool = false;
    pub const HIDDEN: bool = false;
    pub const DISABLE_VOLUME: bool = false;
    pub const CONNECT_DISABLED: bool = false;
    pub const SUPPORTS_PLAYLIST_V2: bool = true;
    pub const IS_CONTROLLABLE: bool = true;
    pub const SUPPORTS_EXTERNAL_EPISODES: bool = false;
    pub const SUPPORTS_SET_BACKEND_METADATA: bool = false;
    pub const SUPPORTS_TRANSFER_COMMAND: bool = true;
    pub const SUPPORTS_COMMAND_REQUEST: bool = true;
    pub const IS_VOICE_ENABLED: bool = false;
    pub const NEEDS_FULL_PLAYER_STATE: bool = false;
    // Advertised, but pushes are not decompressed yet.
    pub const SUPPORTS_GZIP_PUSHES: bool = true;
    pub const SUPPORTS_SET_OPTIONS_COMMAND: bool = false;
    pub const CONNECT_CAPABILITIES: &str = "";
}

fn advertised_capabilities() -> Capabilities {
    use capabilities as c;

    Capabilities {
        can_be_player: c::CAN_BE_PLAYER,
        restrict_to_local: c::RESTRICT_TO_LOCAL,
        gaia_eq_connect_id: c::GAIA_EQ_CONNECT_ID,
        supports_logout: c::SUPPORTS_LOGOUT,
        is_observable: c::IS_OBSERVABLE,
        volume_steps: VOLUME_STEPS,
        supported_types: c::SUPPORTED_TYPES.iter().map(|t| (*t).to_owned()).collect(),
        command_acks: c::COMMAND_ACKS,
        supports_rename: c::SUPPORTS_RENAME,
        hidden: c::HIDDEN,
        disable_volume: c::DISABLE_VOLUME,
        connect_disabled: c::CONNECT_DISABLED,
        supports_playlist_v2: c::SUPPORTS_PLAYLIST_V2,
        is_controllable: c::IS_CONTROLLABLE,
        supports_external_episodes: c::SUPPORTS_EXTERNAL_EPISODES,
        supports_set_backend_metadata: c::SUPPORTS_SET_BACKEND_METADATA,
        supports_transfer_command: c::SUPPORTS_TRANSFER_COMMAND,
        supports_command_request: c::SUPPORTS_COMMAND_REQUEST,
        is_voice_enabled: c::IS_VOICE_ENABLED,
        needs_full_player_state: c::NEEDS_FULL_PLAYER_STATE,
        supports_gzip_pushes: c::SUPPORTS_GZIP_PUSHES,
        supports_set_options_command: c::SUPPORTS_SET_OPTIONS_COMMAND,
        supports_hifi: None,
        connect_capabilities: c::CONNECT_CAPABILITIES.to_owned(),
    }
}

/// Identity and capabilities of this device.
#[derive(Debug, Clone, PartialEq)]
pub struct DeviceDescriptor {
    pub id: String,
    pub name: String,
    pub device_type: DeviceType,
    pub software_version: String,
    pub client_id: String,
    pub spirc_version: &'static str,
    pub volume: u32,
    pub capabilities: Capabilities,
}

impl DeviceDescriptor {
    pub fn from_config(config: &SessionConfig) -> Self {
        Self {
            id: config.device_id.clone(),
            name: config.device_name.clone(),
            device_type: config.device_type,
            software_version: VERSION_STRING.to_owned(),
            client_id: config.client_id.clone(),
            spirc_version: SPIRC_VERSION,
            volume: INITIAL_VOLUME,
            capabilities: advertised_capabilities(),
        }
    }

    /// Build a connect-state publish for this device.
    pub fn put_state_request(
        &self,
        reason: PutStateReason,
        is_active: bool,
        timestamp_ms: u64,
    ) -> PutStateRequest {
        PutStateRequest {
            client_side_timestamp: timestamp_ms,
            member_type: MemberType::ConnectState,
            put_state_reason: reason,
            device: Device {
                device_info: DeviceInfo {
                    can_play: true,
                    volume: self.volume,
                    name: self.name.clone(),
                    device_id: self.id.clone(),
                    device_type: self.device_type,
                    device_software_version: self.software_version.clone(),
                    client_id: self.client_id.clone(),
                    spirc_version: self.spirc_version.to_owned(),
                    capabilities: self.capabilities.clone(),
                },
                player_state: PlayerState {
                    is_system_initiated: true,
                },
            },
            is_active,
        }
    }
}
