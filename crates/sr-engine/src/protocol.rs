//! Engine command protocol
//!
//! JSON shape: `{"type": "PARAM_SET", "payload": {"moduleId": ..., ...}}`.
//! Commands without a payload omit it.

use serde::{Deserialize, Serialize};
use sr_core::{ModuleType, ParamValue, RackModule};

/// Strip id that addresses the master bus
pub const MASTER_ID: &str = "MASTER";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(
    tag = "type",
    content = "payload",
    rename_all = "SCREAMING_SNAKE_CASE",
    rename_all_fields = "camelCase"
)]
pub enum EngineCommand {
    TrackAdd {
        id: String,
        #[serde(default)]
        name: String,
    },
    TrackRemove {
        id: String,
    },
    ModuleAdd {
        track_id: String,
        module_id: String,
        #[serde(rename = "type")]
        module_type: ModuleType,
    },
    ModuleRemove {
        track_id: String,
        module_id: String,
    },
    ParamSet {
        module_id: String,
        param: String,
        value: ParamValue,
    },
    TransportPlay,
    TransportPause,
    TransportSeek {
        time: f64,
    },

    /// Replace a strip's whole rack (reorder, bypass, insert)
    RackUpdate {
        track_id: String,
        modules: Vec<RackModule>,
    },
    ModuleBypass {
        track_id: String,
        module_id: String,
        bypassed: bool,
    },
    /// Fader gain (linear)
    TrackVolume {
        id: String,
        value: f64,
    },
    TrackPan {
        id: String,
        value: f64,
    },
    /// Assign a loaded asset as a track's source
    TrackSource {
        id: String,
        asset_id: String,
    },
}

impl EngineCommand {
    /// Wire tag of this command
    pub fn kind(&self) -> &'static str {
        match self {
            EngineCommand::TrackAdd { .. } => "TRACK_ADD",
            EngineCommand::TrackRemove { .. } => "TRACK_REMOVE",
            EngineCommand::ModuleAdd { .. } => "MODULE_ADD",
            EngineCommand::ModuleRemove { .. } => "MODULE_REMOVE",
            EngineCommand::ParamSet { .. } => "PARAM_SET",
            EngineCommand::TransportPlay => "TRANSPORT_PLAY",
            EngineCommand::TransportPause => "TRANSPORT_PAUSE",
            EngineCommand::TransportSeek { .. } => "TRANSPORT_SEEK",
            EngineCommand::RackUpdate { .. } => "RACK_UPDATE",
            EngineCommand::ModuleBypass { .. } => "MODULE_BYPASS",
            EngineCommand::TrackVolume { .. } => "TRACK_VOLUME",
            EngineCommand::TrackPan { .. } => "TRACK_PAN",
            EngineCommand::TrackSource { .. } => "TRACK_SOURCE",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_wire_commands() {
        let json = r#"[
            {"type": "TRACK_ADD", "payload": {"id": "t1", "name": "Vocals"}},
            {"type": "MODULE_ADD", "payload": {"trackId": "t1", "moduleId": "c1", "type": "COMPRESSOR"}},
            {"type": "PARAM_SET", "payload": {"moduleId": "c1", "param": "ratio", "value": 8}},
            {"type": "PARAM_SET", "payload": {"moduleId": "cab", "param": "irAssetId", "value": "ir-57"}},
            {"type": "TRANSPORT_PLAY"},
            {"type": "TRANSPORT_SEEK", "payload": {"time": 12.5}}
        ]"#;
        let commands: Vec<EngineCommand> = serde_json::from_str(json).unwrap();
        assert_eq!(
            commands[0],
            EngineCommand::TrackAdd {
                id: "t1".into(),
                name: "Vocals".into()
            }
        );
        assert_eq!(
            commands[1],
            EngineCommand::ModuleAdd {
                track_id: "t1".into(),
                module_id: "c1".into(),
                module_type: ModuleType::Compressor
            }
        );
        assert!(matches!(
            &commands[2],
            EngineCommand::ParamSet { value: ParamValue::Number(v), .. } if *v == 8.0
        ));
        assert!(matches!(
            &commands[3],
            EngineCommand::ParamSet { value: ParamValue::Text(id), .. } if id == "ir-57"
        ));
        assert_eq!(commands[4], EngineCommand::TransportPlay);
        assert_eq!(commands[5], EngineCommand::TransportSeek { time: 12.5 });
    }

    #[test]
    fn test_rack_update_payload() {
        let json = r#"{"type": "RACK_UPDATE", "payload": {"trackId": "MASTER", "modules": [
            {"id": "lim", "type": "LIMITER", "bypass": false, "parameters": {"ceiling": -1}}
        ]}}"#;
        let command: EngineCommand = serde_json::from_str(json).unwrap();
        let EngineCommand::RackUpdate { track_id, modules } = command else {
            panic!("wrong variant");
        };
        assert_eq!(track_id, MASTER_ID);
        assert_eq!(modules[0].number("ceiling"), Some(-1.0));
    }

    #[test]
    fn test_serialized_tag_matches_kind() {
        let command = EngineCommand::TrackVolume {
            id: "t1".into(),
            value: 0.5,
        };
        let value = serde_json::to_value(&command).unwrap();
        assert_eq!(value["type"], command.kind());
        assert_eq!(value["payload"]["value"], 0.5);
    }
}
