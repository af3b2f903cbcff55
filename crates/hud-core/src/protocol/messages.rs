//! All director protocol command codes and frame payloads.
//!
//! A frame on the wire is a command code followed either by a fixed set of
//! fields whose shape is implied by the code, or (for
//! [`Command::WidgetsConfiguration`] only) by a 4-byte length and an opaque
//! payload.  There is no frame header and no resynchronisation marker.

use serde::{Deserialize, Serialize};

use crate::domain::roster::Driver;
use crate::domain::widget_state::EffectiveWidgetState;

// ── Protocol constants ────────────────────────────────────────────────────────

/// Length in bytes of the identity token sent by the connecting side.
pub const IDENTITY_TOKEN_LEN: usize = 32;

/// Length in bytes of the MD5 password digest.
pub const PASSWORD_DIGEST_LEN: usize = 16;

/// Longest string representable on the wire (1-byte length prefix).
pub const MAX_NAME_LEN: usize = u8::MAX as usize;

/// Largest configuration blob the decoder accepts.
pub const MAX_BLOB_LEN: usize = 16 * 1024 * 1024;

// ── Command code space ────────────────────────────────────────────────────────

/// Width of the command code on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CodeWidth {
    /// One byte per code.
    Byte,
    /// Two bytes per code, big-endian.
    Short,
}

impl CodeWidth {
    /// Number of bytes a code occupies.
    pub fn byte_len(self) -> usize {
        match self {
            CodeWidth::Byte => 1,
            CodeWidth::Short => 2,
        }
    }
}

/// Where the director commands live inside the code space of the host
/// protocol they share a stream with.
///
/// The wire code of a command is `offset + command`.  Both variants of the
/// protocol (standalone and embedded in a host protocol) differ only in this
/// value, so one codec serves both.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommandSpace {
    pub width: CodeWidth,
    pub offset: u16,
}

impl CommandSpace {
    /// 1-byte codes starting above the host protocol's reserved range.
    pub const STANDALONE: Self = Self {
        width: CodeWidth::Byte,
        offset: 0x20,
    };

    /// 2-byte codes embedded in a host protocol's command table.
    pub const EMBEDDED: Self = Self {
        width: CodeWidth::Short,
        offset: 0x0400,
    };

    /// Returns the conventional space for a code width.
    pub fn for_width(width: CodeWidth) -> Self {
        match width {
            CodeWidth::Byte => Self::STANDALONE,
            CodeWidth::Short => Self::EMBEDDED,
        }
    }

    /// Returns the wire code for `command`.
    pub fn wire_code(self, command: Command) -> u16 {
        self.offset + command as u16
    }

    /// Maps a wire code back to a [`Command`], or `None` if it is not one of ours.
    pub fn command_for(self, wire_code: u16) -> Option<Command> {
        let raw = wire_code.checked_sub(self.offset)?;
        let raw = u8::try_from(raw).ok()?;
        Command::try_from(raw).ok()
    }
}

impl Default for CommandSpace {
    fn default() -> Self {
        Self::STANDALONE
    }
}

// ── Command codes ─────────────────────────────────────────────────────────────

/// Every command understood by the director protocol, before the
/// [`CommandSpace`] offset is applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Command {
    // Handshake
    Identity = 0x01,
    PasswordRequest = 0x02,
    PasswordDigest = 0x03,
    ConnectionRefused = 0x04,
    ConnectionEstablished = 0x05,
    // Director → plugin
    WidgetsConfiguration = 0x06,
    ResetWidgetStates = 0x07,
    WidgetState = 0x08,
    // Plugin → director: roster
    DriversList = 0x09,
    DriversPositions = 0x0A,
    // Plugin → director: session notifications
    SessionStarted = 0x0B,
    SessionEnded = 0x0C,
    RealtimeEntered = 0x0D,
    RealtimeExited = 0x0E,
    LapStarted = 0x0F,
    PitEntered = 0x10,
    PitExited = 0x11,
    GarageEntered = 0x12,
    GarageExited = 0x13,
    VehicleControlChanged = 0x14,
    PauseToggled = 0x15,
    PlayerJoined = 0x16,
    PlayerLeft = 0x17,
    SessionTime = 0x18,
}

impl TryFrom<u8> for Command {
    type Error = ();

    fn try_from(value: u8) -> Result<Self, ()> {
        match value {
            0x01 => Ok(Command::Identity),
            0x02 => Ok(Command::PasswordRequest),
            0x03 => Ok(Command::PasswordDigest),
            0x04 => Ok(Command::ConnectionRefused),
            0x05 => Ok(Command::ConnectionEstablished),
            0x06 => Ok(Command::WidgetsConfiguration),
            0x07 => Ok(Command::ResetWidgetStates),
            0x08 => Ok(Command::WidgetState),
            0x09 => Ok(Command::DriversList),
            0x0A => Ok(Command::DriversPositions),
            0x0B => Ok(Command::SessionStarted),
            0x0C => Ok(Command::SessionEnded),
            0x0D => Ok(Command::RealtimeEntered),
            0x0E => Ok(Command::RealtimeExited),
            0x0F => Ok(Command::LapStarted),
            0x10 => Ok(Command::PitEntered),
            0x11 => Ok(Command::PitExited),
            0x12 => Ok(Command::GarageEntered),
            0x13 => Ok(Command::GarageExited),
            0x14 => Ok(Command::VehicleControlChanged),
            0x15 => Ok(Command::PauseToggled),
            0x16 => Ok(Command::PlayerJoined),
            0x17 => Ok(Command::PlayerLeft),
            0x18 => Ok(Command::SessionTime),
            _ => Err(()),
        }
    }
}

// ── Session type ──────────────────────────────────────────────────────────────

/// Kind of session announced by SESSION_STARTED.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum SessionType {
    TestDay = 0x00,
    Practice = 0x01,
    Qualifying = 0x02,
    Warmup = 0x03,
    Race = 0x04,
}

impl TryFrom<u8> for SessionType {
    type Error = ();

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0x00 => Ok(SessionType::TestDay),
            0x01 => Ok(SessionType::Practice),
            0x02 => Ok(SessionType::Qualifying),
            0x03 => Ok(SessionType::Warmup),
            0x04 => Ok(SessionType::Race),
            _ => Err(()),
        }
    }
}

// ── Per-frame payload structs ─────────────────────────────────────────────────

/// LAP_STARTED: a driver crossed the line and began a new lap.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LapStartedMessage {
    pub driver_id: i32,
    pub lap: i32,
}

/// PLAYER_JOINED: a driver entered the session mid-race.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlayerJoinedMessage {
    pub name: String,
    pub driver_id: i32,
    /// 1-based running position.
    pub place: u16,
}

/// PLAYER_LEFT: a driver left the session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlayerLeftMessage {
    pub name: String,
    pub driver_id: i32,
}

// ── Top-level frame enum ──────────────────────────────────────────────────────

/// One decoded director protocol frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    Identity([u8; IDENTITY_TOKEN_LEN]),
    PasswordRequest,
    PasswordDigest([u8; PASSWORD_DIGEST_LEN]),
    ConnectionRefused { message: String },
    ConnectionEstablished { in_driving: bool },
    /// Opaque widget layout; never interpreted by the protocol layer.
    WidgetsConfiguration(Vec<u8>),
    ResetWidgetStates,
    WidgetState(EffectiveWidgetState),
    DriversList(Vec<Driver>),
    /// Driver ids in running order.
    DriversPositions(Vec<i32>),
    SessionStarted(SessionType),
    SessionEnded,
    RealtimeEntered,
    RealtimeExited,
    LapStarted(LapStartedMessage),
    PitEntered { driver_id: i32 },
    PitExited { driver_id: i32 },
    GarageEntered,
    GarageExited,
    VehicleControlChanged { driver_id: i32 },
    PauseToggled { paused: bool },
    PlayerJoined(PlayerJoinedMessage),
    PlayerLeft(PlayerLeftMessage),
    /// Session clock in milliseconds; may move backwards during replay.
    SessionTime(i64),
}

impl Frame {
    /// Returns the [`Command`] discriminant for this frame.
    pub fn command(&self) -> Command {
        match self {
            Frame::Identity(_) => Command::Identity,
            Frame::PasswordRequest => Command::PasswordRequest,
            Frame::PasswordDigest(_) => Command::PasswordDigest,
            Frame::ConnectionRefused { .. } => Command::ConnectionRefused,
            Frame::ConnectionEstablished { .. } => Command::ConnectionEstablished,
            Frame::WidgetsConfiguration(_) => Command::WidgetsConfiguration,
            Frame::ResetWidgetStates => Command::ResetWidgetStates,
            Frame::WidgetState(_) => Command::WidgetState,
            Frame::DriversList(_) => Command::DriversList,
            Frame::DriversPositions(_) => Command::DriversPositions,
            Frame::SessionStarted(_) => Command::SessionStarted,
            Frame::SessionEnded => Command::SessionEnded,
            Frame::RealtimeEntered => Command::RealtimeEntered,
            Frame::RealtimeExited => Command::RealtimeExited,
            Frame::LapStarted(_) => Command::LapStarted,
            Frame::PitEntered { .. } => Command::PitEntered,
            Frame::PitExited { .. } => Command::PitExited,
            Frame::GarageEntered => Command::GarageEntered,
            Frame::GarageExited => Command::GarageExited,
            Frame::VehicleControlChanged { .. } => Command::VehicleControlChanged,
            Frame::PauseToggled { .. } => Command::PauseToggled,
            Frame::PlayerJoined(_) => Command::PlayerJoined,
            Frame::PlayerLeft(_) => Command::PlayerLeft,
            Frame::SessionTime(_) => Command::SessionTime,
        }
    }

    /// Returns `true` for frames that only make sense before the connection
    /// is established.
    pub fn is_handshake(&self) -> bool {
        matches!(
            self,
            Frame::Identity(_)
                | Frame::PasswordRequest
                | Frame::PasswordDigest(_)
                | Frame::ConnectionRefused { .. }
                | Frame::ConnectionEstablished { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_space_wire_code_applies_offset() {
        assert_eq!(
            CommandSpace::STANDALONE.wire_code(Command::Identity),
            0x21
        );
        assert_eq!(
            CommandSpace::EMBEDDED.wire_code(Command::SessionTime),
            0x0418
        );
    }

    #[test]
    fn test_command_space_rejects_codes_below_offset() {
        assert_eq!(CommandSpace::STANDALONE.command_for(0x05), None);
        assert_eq!(CommandSpace::EMBEDDED.command_for(0x0021), None);
    }

    #[test]
    fn test_command_space_maps_every_command_back() {
        for raw in 0x01..=0x18u8 {
            let command = Command::try_from(raw).expect("known command");
            for space in [CommandSpace::STANDALONE, CommandSpace::EMBEDDED] {
                assert_eq!(space.command_for(space.wire_code(command)), Some(command));
            }
        }
    }

    #[test]
    fn test_unknown_command_byte_is_rejected() {
        assert!(Command::try_from(0x00).is_err());
        assert!(Command::try_from(0x19).is_err());
    }

    #[test]
    fn test_handshake_frames_are_flagged() {
        assert!(Frame::PasswordRequest.is_handshake());
        assert!(Frame::ConnectionEstablished { in_driving: true }.is_handshake());
        assert!(!Frame::ResetWidgetStates.is_handshake());
        assert!(!Frame::SessionTime(0).is_handshake());
    }

    #[test]
    fn test_code_width_byte_len() {
        assert_eq!(CodeWidth::Byte.byte_len(), 1);
        assert_eq!(CodeWidth::Short.byte_len(), 2);
    }
}
