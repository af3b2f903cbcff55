//! Binary codec for director protocol frames.
//!
//! Wire format:
//! ```text
//! inline frame:    [code:1|2][fixed fields implied by code]
//! variable frame:  [code:1|2][payload_len:4][payload:N]
//! ```
//! All multi-byte integers are big-endian.  Strings carry a 1-byte length
//! prefix.  Only WIDGETS_CONFIGURATION uses the variable form.
//!
//! Because there is no outer length, the decoder walks the fields of the
//! frame and reports [`FrameError::InsufficientData`] when the buffer ends
//! early; any other error means the stream can no longer be trusted.

use thiserror::Error;

use crate::domain::roster::Driver;
use crate::domain::widget_state::EffectiveWidgetState;
use crate::protocol::messages::{
    CodeWidth, Command, CommandSpace, Frame, LapStartedMessage, PlayerJoinedMessage,
    PlayerLeftMessage, SessionType, IDENTITY_TOKEN_LEN, MAX_BLOB_LEN, MAX_NAME_LEN,
    PASSWORD_DIGEST_LEN,
};

/// Errors that can occur during frame encoding or decoding.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum FrameError {
    /// The buffer ends before the frame does; read more bytes and retry.
    #[error("insufficient data: need at least {needed} bytes, got {available}")]
    InsufficientData { needed: usize, available: usize },

    /// The command code is not part of this protocol's code space.
    #[error("unknown command code: 0x{0:04X}")]
    UnknownCommand(u16),

    /// A field could not be parsed (value out of range, invalid UTF-8, oversize blob).
    #[error("malformed frame: {0}")]
    Malformed(String),
}

impl FrameError {
    /// Returns `true` if more input could turn this into a successful decode.
    pub fn is_incomplete(&self) -> bool {
        matches!(self, FrameError::InsufficientData { .. })
    }
}

// ── Field writer ──────────────────────────────────────────────────────────────

/// Append-only buffer of big-endian wire fields.
///
/// Used both by [`encode_frame`] and by callers composing a command field by
/// field inside a write transaction.
#[derive(Debug, Default, Clone)]
pub struct FieldWriter {
    buf: Vec<u8>,
}

impl FieldWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buf: Vec::with_capacity(capacity),
        }
    }

    /// Writes the wire code for `command` using the width of `space`.
    pub fn put_command(&mut self, space: CommandSpace, command: Command) {
        let code = space.wire_code(command);
        match space.width {
            CodeWidth::Byte => self.buf.push(code as u8),
            CodeWidth::Short => self.buf.extend_from_slice(&code.to_be_bytes()),
        }
    }

    pub fn put_u8(&mut self, value: u8) {
        self.buf.push(value);
    }

    pub fn put_bool(&mut self, value: bool) {
        self.buf.push(u8::from(value));
    }

    pub fn put_u16(&mut self, value: u16) {
        self.buf.extend_from_slice(&value.to_be_bytes());
    }

    pub fn put_i16(&mut self, value: i16) {
        self.buf.extend_from_slice(&value.to_be_bytes());
    }

    pub fn put_i32(&mut self, value: i32) {
        self.buf.extend_from_slice(&value.to_be_bytes());
    }

    pub fn put_u32(&mut self, value: u32) {
        self.buf.extend_from_slice(&value.to_be_bytes());
    }

    pub fn put_i64(&mut self, value: i64) {
        self.buf.extend_from_slice(&value.to_be_bytes());
    }

    /// Writes raw bytes with no length prefix.
    pub fn put_bytes(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    /// Writes a 1-byte length prefix followed by the UTF-8 bytes.
    ///
    /// Strings longer than 255 bytes are cut at the last character boundary
    /// that fits.
    pub fn put_str(&mut self, s: &str) {
        let s = truncate_utf8(s, MAX_NAME_LEN);
        self.buf.push(s.len() as u8);
        self.buf.extend_from_slice(s.as_bytes());
    }

    /// Writes a 4-byte length prefix followed by the bytes.
    ///
    /// # Errors
    ///
    /// Returns [`FrameError::Malformed`] if the blob exceeds [`MAX_BLOB_LEN`].
    pub fn put_blob(&mut self, blob: &[u8]) -> Result<(), FrameError> {
        if blob.len() > MAX_BLOB_LEN {
            return Err(FrameError::Malformed(format!(
                "configuration blob of {} bytes exceeds limit of {MAX_BLOB_LEN}",
                blob.len()
            )));
        }
        self.put_u32(blob.len() as u32);
        self.buf.extend_from_slice(blob);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.buf
    }

    pub fn into_inner(self) -> Vec<u8> {
        self.buf
    }
}

// ── Field reader ──────────────────────────────────────────────────────────────

/// Cursor over a byte slice that reads big-endian wire fields.
#[derive(Debug)]
pub struct FieldReader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> FieldReader<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    /// Number of bytes consumed so far.
    pub fn position(&self) -> usize {
        self.pos
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8], FrameError> {
        let end = self.pos + n;
        if self.buf.len() < end {
            return Err(FrameError::InsufficientData {
                needed: end,
                available: self.buf.len(),
            });
        }
        let slice = &self.buf[self.pos..end];
        self.pos = end;
        Ok(slice)
    }

    fn take_array<const N: usize>(&mut self) -> Result<[u8; N], FrameError> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.take(N)?);
        Ok(out)
    }

    /// Reads a command code of the given width.
    pub fn get_code(&mut self, width: CodeWidth) -> Result<u16, FrameError> {
        match width {
            CodeWidth::Byte => self.get_u8().map(u16::from),
            CodeWidth::Short => self.get_u16(),
        }
    }

    pub fn get_u8(&mut self) -> Result<u8, FrameError> {
        Ok(self.take(1)?[0])
    }

    pub fn get_bool(&mut self) -> Result<bool, FrameError> {
        Ok(self.get_u8()? != 0)
    }

    pub fn get_u16(&mut self) -> Result<u16, FrameError> {
        Ok(u16::from_be_bytes(self.take_array()?))
    }

    pub fn get_i16(&mut self) -> Result<i16, FrameError> {
        Ok(i16::from_be_bytes(self.take_array()?))
    }

    pub fn get_i32(&mut self) -> Result<i32, FrameError> {
        Ok(i32::from_be_bytes(self.take_array()?))
    }

    pub fn get_u32(&mut self) -> Result<u32, FrameError> {
        Ok(u32::from_be_bytes(self.take_array()?))
    }

    pub fn get_i64(&mut self) -> Result<i64, FrameError> {
        Ok(i64::from_be_bytes(self.take_array()?))
    }

    pub fn get_array<const N: usize>(&mut self) -> Result<[u8; N], FrameError> {
        self.take_array()
    }

    /// Reads a 1-byte length prefix and then that many UTF-8 bytes.
    pub fn get_str(&mut self) -> Result<String, FrameError> {
        let len = self.get_u8()? as usize;
        let bytes = self.take(len)?;
        std::str::from_utf8(bytes)
            .map(str::to_owned)
            .map_err(|e| FrameError::Malformed(format!("invalid UTF-8 in string field: {e}")))
    }

    /// Reads a 4-byte length prefix and then that many bytes.
    pub fn get_blob(&mut self) -> Result<Vec<u8>, FrameError> {
        let len = self.get_u32()? as usize;
        if len > MAX_BLOB_LEN {
            return Err(FrameError::Malformed(format!(
                "configuration blob length {len} exceeds limit of {MAX_BLOB_LEN}"
            )));
        }
        Ok(self.take(len)?.to_vec())
    }
}

// ── Public API ────────────────────────────────────────────────────────────────

/// Encodes a [`Frame`], code included, into a byte vector.
///
/// # Errors
///
/// Returns [`FrameError::Malformed`] if a WIDGETS_CONFIGURATION blob is too large.
///
/// # Examples
///
/// ```rust
/// use hud_core::protocol::{decode_frame, encode_frame};
/// use hud_core::protocol::messages::{CommandSpace, Frame};
///
/// let frame = Frame::SessionTime(120_000);
/// let bytes = encode_frame(&frame, CommandSpace::STANDALONE).unwrap();
/// let (decoded, consumed) = decode_frame(&bytes, CommandSpace::STANDALONE).unwrap();
/// assert_eq!(decoded, frame);
/// assert_eq!(consumed, bytes.len());
/// ```
pub fn encode_frame(frame: &Frame, space: CommandSpace) -> Result<Vec<u8>, FrameError> {
    let mut w = FieldWriter::with_capacity(32);
    w.put_command(space, frame.command());
    write_payload(&mut w, frame)?;
    Ok(w.into_inner())
}

/// Appends the fields of `frame` (without the command code) to `w`.
///
/// # Errors
///
/// Returns [`FrameError::Malformed`] if a WIDGETS_CONFIGURATION blob is too large.
pub fn write_payload(w: &mut FieldWriter, frame: &Frame) -> Result<(), FrameError> {
    match frame {
        Frame::Identity(token) => w.put_bytes(token),
        Frame::PasswordRequest
        | Frame::ResetWidgetStates
        | Frame::SessionEnded
        | Frame::RealtimeEntered
        | Frame::RealtimeExited
        | Frame::GarageEntered
        | Frame::GarageExited => {}
        Frame::PasswordDigest(digest) => w.put_bytes(digest),
        Frame::ConnectionRefused { message } => w.put_str(message),
        Frame::ConnectionEstablished { in_driving } => w.put_bool(*in_driving),
        Frame::WidgetsConfiguration(blob) => w.put_blob(blob)?,
        Frame::WidgetState(state) => encode_widget_state(w, state),
        Frame::DriversList(drivers) => encode_drivers_list(w, drivers),
        Frame::DriversPositions(ids) => encode_drivers_positions(w, ids),
        Frame::SessionStarted(session_type) => w.put_u8(*session_type as u8),
        Frame::LapStarted(m) => {
            w.put_i32(m.driver_id);
            w.put_i32(m.lap);
        }
        Frame::PitEntered { driver_id }
        | Frame::PitExited { driver_id }
        | Frame::VehicleControlChanged { driver_id } => w.put_i32(*driver_id),
        Frame::PauseToggled { paused } => w.put_bool(*paused),
        Frame::PlayerJoined(m) => {
            w.put_str(&m.name);
            w.put_i32(m.driver_id);
            w.put_u16(m.place);
        }
        Frame::PlayerLeft(m) => {
            w.put_str(&m.name);
            w.put_i32(m.driver_id);
        }
        Frame::SessionTime(time) => w.put_i64(*time),
    }
    Ok(())
}

/// Decodes one [`Frame`] from the beginning of `bytes`.
///
/// Returns the decoded frame and the number of bytes consumed, so the caller
/// can advance its read cursor.
///
/// # Errors
///
/// [`FrameError::InsufficientData`] if `bytes` holds only part of a frame;
/// any other variant if the stream is corrupt.
pub fn decode_frame(bytes: &[u8], space: CommandSpace) -> Result<(Frame, usize), FrameError> {
    let mut r = FieldReader::new(bytes);
    let code = r.get_code(space.width)?;
    let command = space
        .command_for(code)
        .ok_or(FrameError::UnknownCommand(code))?;
    let frame = decode_payload(command, &mut r)?;
    Ok((frame, r.position()))
}

// ── Payload decoding ──────────────────────────────────────────────────────────

fn decode_payload(command: Command, r: &mut FieldReader<'_>) -> Result<Frame, FrameError> {
    let frame = match command {
        Command::Identity => Frame::Identity(r.get_array::<IDENTITY_TOKEN_LEN>()?),
        Command::PasswordRequest => Frame::PasswordRequest,
        Command::PasswordDigest => Frame::PasswordDigest(r.get_array::<PASSWORD_DIGEST_LEN>()?),
        Command::ConnectionRefused => Frame::ConnectionRefused {
            message: r.get_str()?,
        },
        Command::ConnectionEstablished => Frame::ConnectionEstablished {
            in_driving: r.get_bool()?,
        },
        Command::WidgetsConfiguration => Frame::WidgetsConfiguration(r.get_blob()?),
        Command::ResetWidgetStates => Frame::ResetWidgetStates,
        Command::WidgetState => Frame::WidgetState(decode_widget_state(r)?),
        Command::DriversList => Frame::DriversList(decode_drivers_list(r)?),
        Command::DriversPositions => Frame::DriversPositions(decode_drivers_positions(r)?),
        Command::SessionStarted => {
            let raw = r.get_u8()?;
            let session_type = SessionType::try_from(raw)
                .map_err(|_| FrameError::Malformed(format!("unknown session type: {raw}")))?;
            Frame::SessionStarted(session_type)
        }
        Command::SessionEnded => Frame::SessionEnded,
        Command::RealtimeEntered => Frame::RealtimeEntered,
        Command::RealtimeExited => Frame::RealtimeExited,
        Command::LapStarted => Frame::LapStarted(LapStartedMessage {
            driver_id: r.get_i32()?,
            lap: r.get_i32()?,
        }),
        Command::PitEntered => Frame::PitEntered {
            driver_id: r.get_i32()?,
        },
        Command::PitExited => Frame::PitExited {
            driver_id: r.get_i32()?,
        },
        Command::GarageEntered => Frame::GarageEntered,
        Command::GarageExited => Frame::GarageExited,
        Command::VehicleControlChanged => Frame::VehicleControlChanged {
            driver_id: r.get_i32()?,
        },
        Command::PauseToggled => Frame::PauseToggled {
            paused: r.get_bool()?,
        },
        Command::PlayerJoined => Frame::PlayerJoined(PlayerJoinedMessage {
            name: r.get_str()?,
            driver_id: r.get_i32()?,
            place: r.get_u16()?,
        }),
        Command::PlayerLeft => Frame::PlayerLeft(PlayerLeftMessage {
            name: r.get_str()?,
            driver_id: r.get_i32()?,
        }),
        Command::SessionTime => Frame::SessionTime(r.get_i64()?),
    };
    Ok(frame)
}

// ── Per-frame helpers ─────────────────────────────────────────────────────────

fn encode_widget_state(w: &mut FieldWriter, s: &EffectiveWidgetState) {
    w.put_str(&s.widget_name);
    w.put_i64(s.window_start);
    w.put_i64(s.window_end);
    w.put_i16(s.pos_x);
    w.put_i16(s.pos_y);
    w.put_i32(s.for_driver_id);
    w.put_i32(s.compare_driver_id);
}

fn decode_widget_state(r: &mut FieldReader<'_>) -> Result<EffectiveWidgetState, FrameError> {
    Ok(EffectiveWidgetState {
        widget_name: r.get_str()?,
        window_start: r.get_i64()?,
        window_end: r.get_i64()?,
        pos_x: r.get_i16()?,
        pos_y: r.get_i16()?,
        for_driver_id: r.get_i32()?,
        compare_driver_id: r.get_i32()?,
    })
}

fn encode_drivers_list(w: &mut FieldWriter, drivers: &[Driver]) {
    let count = drivers.len().min(u16::MAX as usize);
    w.put_u16(count as u16);
    for driver in &drivers[..count] {
        w.put_i32(driver.id);
        w.put_str(&driver.name);
    }
}

fn decode_drivers_list(r: &mut FieldReader<'_>) -> Result<Vec<Driver>, FrameError> {
    let count = r.get_u16()? as usize;
    let mut drivers = Vec::with_capacity(count);
    for _ in 0..count {
        let id = r.get_i32()?;
        let name = r.get_str()?;
        drivers.push(Driver { id, name });
    }
    Ok(drivers)
}

fn encode_drivers_positions(w: &mut FieldWriter, ids: &[i32]) {
    let count = ids.len().min(u16::MAX as usize);
    w.put_u16(count as u16);
    for id in &ids[..count] {
        w.put_i32(*id);
    }
}

fn decode_drivers_positions(r: &mut FieldReader<'_>) -> Result<Vec<i32>, FrameError> {
    let count = r.get_u16()? as usize;
    let mut ids = Vec::with_capacity(count);
    for _ in 0..count {
        ids.push(r.get_i32()?);
    }
    Ok(ids)
}

/// Cuts `s` to at most `max` bytes without splitting a character.
fn truncate_utf8(s: &str, max: usize) -> &str {
    if s.len() <= max {
        return s;
    }
    let mut end = max;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}

// ── Tests ─────────────────────────────────────────────────────────────────────
