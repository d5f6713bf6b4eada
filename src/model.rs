//! Live device model for a monitored reel/winder station
//!
//! One `ReelState` instance exists per monitored device. The poll cycle
//! mutates it in place; fields without a configured tag keep their previous
//! value. Field keys are resolved from tag-table names once at startup.

use serde::Serialize;

use crate::convert::TagValue;
use crate::error::{PlcPollError, Result};

/// Upper bound on the roll slot list
pub const MAX_ROLL_SLOTS: usize = 4;

/// Scalar fields of the reel model addressable from the tag table
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReelField {
    RollCounter,
    RollFinished,
    MachineSpeed,
    ReelDiameter,
    RollLength,
    RollWidth,
    Grammage,
    Moisture,
    GradeCode,
}

impl ReelField {
    /// Resolve a tag-table field name to a model field
    pub fn from_name(name: &str) -> Result<Self> {
        match name {
            "roll_counter" => Ok(ReelField::RollCounter),
            "roll_finished" => Ok(ReelField::RollFinished),
            "machine_speed" => Ok(ReelField::MachineSpeed),
            "reel_diameter" => Ok(ReelField::ReelDiameter),
            "roll_length" => Ok(ReelField::RollLength),
            "roll_width" => Ok(ReelField::RollWidth),
            "grammage" => Ok(ReelField::Grammage),
            "moisture" => Ok(ReelField::Moisture),
            "grade_code" => Ok(ReelField::GradeCode),
            other => Err(PlcPollError::config(format!("unknown model field '{other}'"))),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            ReelField::RollCounter => "roll_counter",
            ReelField::RollFinished => "roll_finished",
            ReelField::MachineSpeed => "machine_speed",
            ReelField::ReelDiameter => "reel_diameter",
            ReelField::RollLength => "roll_length",
            ReelField::RollWidth => "roll_width",
            ReelField::Grammage => "grammage",
            ReelField::Moisture => "moisture",
            ReelField::GradeCode => "grade_code",
        }
    }
}

/// Fields of one roll slot sub-record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RollSlotField {
    RollId,
    Diameter,
    Length,
    Weight,
}

impl RollSlotField {
    pub fn from_name(name: &str) -> Result<Self> {
        match name {
            "roll_id" => Ok(RollSlotField::RollId),
            "diameter" => Ok(RollSlotField::Diameter),
            "length" => Ok(RollSlotField::Length),
            "weight" => Ok(RollSlotField::Weight),
            other => Err(PlcPollError::config(format!("unknown slot field '{other}'"))),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            RollSlotField::RollId => "roll_id",
            RollSlotField::Diameter => "diameter",
            RollSlotField::Length => "length",
            RollSlotField::Weight => "weight",
        }
    }
}

/// One finished roll sitting on the winder
///
/// `roll_id == 0` means the slot is empty and terminates the slot list.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RollSlot {
    pub roll_id: u32,
    pub diameter: f32,
    pub length: f32,
    pub weight: f32,
}

impl RollSlot {
    /// Write a decoded value into the named slot field
    pub fn apply(&mut self, field: RollSlotField, value: TagValue) -> Result<()> {
        match field {
            RollSlotField::RollId => self.roll_id = value.as_u32()?,
            RollSlotField::Diameter => self.diameter = value.as_f32()?,
            RollSlotField::Length => self.length = value.as_f32()?,
            RollSlotField::Weight => self.weight = value.as_f32()?,
        }
        Ok(())
    }
}

/// Live state of one reel/winder station
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ReelState {
    /// Monotonically assigned roll number of the roll currently on the reel
    pub roll_counter: u32,
    /// Set by the controller while a finished roll waits for ejection
    pub roll_finished: bool,
    /// Machine speed in m/min
    pub machine_speed: f32,
    /// Reel drum diameter in mm
    pub reel_diameter: f32,
    /// Length of the current roll in m
    pub roll_length: f32,
    /// Sheet width in mm
    pub roll_width: u16,
    /// Basis weight in g/m2
    pub grammage: f32,
    /// Sheet moisture in percent
    pub moisture: f32,
    /// Short code of the paper grade currently produced
    pub grade_code: String,
    /// Finished rolls currently on the winder, first empty slot terminates
    pub slots: Vec<RollSlot>,
}

impl ReelState {
    /// Write a decoded value into the named scalar field, coercing the
    /// primitive's natural type into the field's declared type.
    pub fn apply(&mut self, field: ReelField, value: TagValue) -> Result<()> {
        match field {
            ReelField::RollCounter => self.roll_counter = value.as_u32()?,
            ReelField::RollFinished => self.roll_finished = value.as_bool()?,
            ReelField::MachineSpeed => self.machine_speed = value.as_f32()?,
            ReelField::ReelDiameter => self.reel_diameter = value.as_f32()?,
            ReelField::RollLength => self.roll_length = value.as_f32()?,
            ReelField::RollWidth => self.roll_width = value.as_u16()?,
            ReelField::Grammage => self.grammage = value.as_f32()?,
            ReelField::Moisture => self.moisture = value.as_f32()?,
            ReelField::GradeCode => self.grade_code = value.into_text()?,
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_field_name_round_trip() {
        for field in [
            ReelField::RollCounter,
            ReelField::RollFinished,
            ReelField::MachineSpeed,
            ReelField::ReelDiameter,
            ReelField::RollLength,
            ReelField::RollWidth,
            ReelField::Grammage,
            ReelField::Moisture,
            ReelField::GradeCode,
        ] {
            assert_eq!(ReelField::from_name(field.name()).unwrap(), field);
        }
        assert!(ReelField::from_name("no_such_field").is_err());
    }

    #[test]
    fn test_apply_coerces_types() {
        let mut state = ReelState::default();
        state.apply(ReelField::RollCounter, TagValue::Word(1201)).unwrap();
        state.apply(ReelField::RollFinished, TagValue::Bit(true)).unwrap();
        state.apply(ReelField::MachineSpeed, TagValue::Real(1450.5)).unwrap();
        state.apply(ReelField::RollWidth, TagValue::Word(6600)).unwrap();
        state.apply(ReelField::GradeCode, TagValue::Text("SC".into())).unwrap();

        assert_eq!(state.roll_counter, 1201);
        assert!(state.roll_finished);
        assert_eq!(state.machine_speed, 1450.5);
        assert_eq!(state.roll_width, 6600);
        assert_eq!(state.grade_code, "SC");
    }

    #[test]
    fn test_apply_rejects_bad_coercion() {
        let mut state = ReelState::default();
        let err = state.apply(ReelField::RollCounter, TagValue::Int(-3));
        assert!(err.is_err());
        // Failed apply leaves the field untouched
        assert_eq!(state.roll_counter, 0);
    }

    #[test]
    fn test_unbound_fields_keep_previous_values() {
        let mut state = ReelState {
            grade_code: "LWC".to_string(),
            ..ReelState::default()
        };
        state.apply(ReelField::RollCounter, TagValue::Word(9)).unwrap();
        assert_eq!(state.grade_code, "LWC");
    }

    #[test]
    fn test_slot_apply() {
        let mut slot = RollSlot::default();
        slot.apply(RollSlotField::RollId, TagValue::DWord(88)).unwrap();
        slot.apply(RollSlotField::Diameter, TagValue::Real(1250.0)).unwrap();
        assert_eq!(slot.roll_id, 88);
        assert_eq!(slot.diameter, 1250.0);
    }
}
