pub mod audio;
pub mod common;
pub mod items;
pub mod response;
pub mod session;
pub mod tools;

pub use audio::{
    AudioConfig, AudioFormat, InputAudioConfig, OutputAudioConfig, TurnDetection,
    TurnDetectionMode,
};
pub use common::{
    ArbitraryJson, DEFAULT_MODEL, DEFAULT_VOICE, ItemStatus, JsonSchema, Modality, Nullable,
    OutputModalities, Role, Voice,
};
pub use items::Item;
pub use response::{Response, ResponseConfig, ResponseStatus};
pub use session::{SessionKind, SessionUpdate};
pub use tools::{Tool, ToolChoice};
