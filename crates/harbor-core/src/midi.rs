//! Musical events injected into a plugin.
//!
//! Events are validated when they are built from caller input, so nothing
//! out of range ever reaches the plugin boundary.

use crate::error::RangeError;

/// Number of MIDI channels.
pub const MIDI_CHANNELS: u8 = 16;
/// Exclusive upper bound of 7-bit MIDI data (notes, velocities, CC values).
pub const MIDI_DATA_LIMIT: u8 = 128;

/// Controller number used for bank select MSB.
pub const BANK_SELECT_MSB: u8 = 0;
/// Controller number carrying the program value when a program change is
/// expanded into control changes.
pub const PROGRAM_CONTROLLER: u8 = 32;

/// A musical event without timing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MidiEvent {
    /// Key pressed.
    NoteOn {
        /// Channel (0-15).
        channel: u8,
        /// Note number (0-127).
        note: u8,
        /// Velocity (0-127).
        velocity: u8,
    },
    /// Key released.
    NoteOff {
        /// Channel (0-15).
        channel: u8,
        /// Note number (0-127).
        note: u8,
    },
    /// Control change.
    ControlChange {
        /// Channel (0-15).
        channel: u8,
        /// Controller number (0-127).
        controller: u8,
        /// Controller value (0-127).
        value: u8,
    },
    /// Program change. Expanded into two control changes when queued.
    ProgramChange {
        /// Channel (0-15).
        channel: u8,
        /// Program number (0-127).
        program: u8,
    },
}

impl MidiEvent {
    /// Build a validated note-on event.
    pub fn note_on(channel: u8, note: u8, velocity: u8) -> Result<Self, RangeError> {
        check_channel(channel)?;
        check_data("note", note)?;
        check_data("velocity", velocity)?;
        Ok(Self::NoteOn {
            channel,
            note,
            velocity,
        })
    }

    /// Build a validated note-off event.
    pub fn note_off(channel: u8, note: u8) -> Result<Self, RangeError> {
        check_channel(channel)?;
        check_data("note", note)?;
        Ok(Self::NoteOff { channel, note })
    }

    /// Build a validated control change.
    pub fn control_change(channel: u8, controller: u8, value: u8) -> Result<Self, RangeError> {
        check_channel(channel)?;
        check_data("controller", controller)?;
        check_data("value", value)?;
        Ok(Self::ControlChange {
            channel,
            controller,
            value,
        })
    }

    /// Build a validated program change.
    pub fn program_change(channel: u8, program: u8) -> Result<Self, RangeError> {
        check_channel(channel)?;
        check_data("program", program)?;
        Ok(Self::ProgramChange { channel, program })
    }

    /// Check every field of an event built directly from its variant.
    pub fn validate(&self) -> Result<(), RangeError> {
        match *self {
            Self::NoteOn {
                channel,
                note,
                velocity,
            } => Self::note_on(channel, note, velocity).map(drop),
            Self::NoteOff { channel, note } => Self::note_off(channel, note).map(drop),
            Self::ControlChange {
                channel,
                controller,
                value,
            } => Self::control_change(channel, controller, value).map(drop),
            Self::ProgramChange { channel, program } => {
                Self::program_change(channel, program).map(drop)
            }
        }
    }

    /// Channel the event is addressed to.
    pub const fn channel(&self) -> u8 {
        match *self {
            Self::NoteOn { channel, .. }
            | Self::NoteOff { channel, .. }
            | Self::ControlChange { channel, .. }
            | Self::ProgramChange { channel, .. } => channel,
        }
    }

    /// The two control changes standing in for a program change: bank select
    /// MSB reset to zero, then controller 32 carrying the program.
    ///
    /// VST3 has no native program-change event. This is a best-effort shim;
    /// plugins that expose a program-change parameter will not react to it.
    pub const fn program_change_as_controls(channel: u8, program: u8) -> [Self; 2] {
        [
            Self::ControlChange {
                channel,
                controller: BANK_SELECT_MSB,
                value: 0,
            },
            Self::ControlChange {
                channel,
                controller: PROGRAM_CONTROLLER,
                value: program,
            },
        ]
    }
}

/// Rescale a 7-bit velocity to the normalized `0.0..=1.0` range.
#[inline]
pub fn normalize_velocity(velocity: u8) -> f32 {
    f32::from(velocity.min(MIDI_DATA_LIMIT - 1)) / 127.0
}

/// An event scheduled at a sample offset within the next block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimedEvent {
    /// Sample index within the block.
    pub sample_offset: u32,
    /// The event.
    pub event: MidiEvent,
}

fn check_channel(channel: u8) -> Result<(), RangeError> {
    RangeError::check("channel", i64::from(channel), i64::from(MIDI_CHANNELS))
}

fn check_data(field: &'static str, value: u8) -> Result<(), RangeError> {
    RangeError::check(field, i64::from(value), i64::from(MIDI_DATA_LIMIT))
}
