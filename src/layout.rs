//! Tag layout building
//!
//! Validates the flat tag-record list once at startup and groups it into
//! per-register-block layouts with computed buffer sizes. The poll cycle
//! only ever works against the prebuilt layouts; nothing here runs per cycle.

use std::collections::BTreeMap;

use crate::config::TagRecord;
use crate::convert::{ConversionCatalog, MAX_DECODE_WIDTH};
use crate::error::{PlcPollError, Result};
use crate::model::{ReelField, RollSlotField, MAX_ROLL_SLOTS};

/// A validated scalar tag within one register block
#[derive(Debug, Clone)]
pub struct ScalarTag {
    pub field: ReelField,
    pub function: String,
    pub byte: usize,
    pub bit: Option<u8>,
}

/// A validated per-element tag of the roll slot list
#[derive(Debug, Clone)]
pub struct SlotTag {
    pub field: RollSlotField,
    pub function: String,
    pub byte: usize,
    pub bit: Option<u8>,
}

/// The repeated-record portion of a block layout
///
/// Element `i` of the slot list decodes its fields at `byte + i * stride`.
/// The presence tag is decoded first per element; a zero value terminates
/// the list.
#[derive(Debug, Clone)]
pub struct SlotGroup {
    pub presence: SlotTag,
    pub tags: Vec<SlotTag>,
    pub stride: usize,
    pub count: usize,
}

/// Read plan for one register block
#[derive(Debug, Clone)]
pub struct BlockLayout {
    pub db: u16,
    pub scalars: Vec<ScalarTag>,
    pub slots: Option<SlotGroup>,
    pub buffer_len: usize,
}

/// Build per-block layouts from the flat tag-record list.
///
/// Fails fast on any configuration problem: unknown field or decode-function
/// name, undeclared register block, bit index out of range, or inconsistent
/// slot strides within a block.
pub fn build_layouts(
    records: &[TagRecord],
    blocks: &[u16],
    catalog: &ConversionCatalog,
) -> Result<Vec<BlockLayout>> {
    if records.is_empty() {
        return Err(PlcPollError::config("tag table is empty"));
    }

    struct Group {
        scalars: Vec<ScalarTag>,
        slot_tags: Vec<SlotTag>,
        stride: Option<usize>,
    }

    let mut groups: BTreeMap<u16, Group> = BTreeMap::new();

    for record in records {
        if !catalog.contains(&record.function) {
            return Err(PlcPollError::config(format!(
                "tag '{}' names unknown decode function '{}'",
                record.field, record.function
            )));
        }
        if let Some(bit) = record.bit {
            if bit > 7 {
                return Err(PlcPollError::config(format!(
                    "tag '{}' has bit index {bit} out of range 0..=7",
                    record.field
                )));
            }
        }
        if !blocks.contains(&record.db) {
            return Err(PlcPollError::config(format!(
                "tag '{}' references undeclared register block DB{}",
                record.field, record.db
            )));
        }

        let group = groups.entry(record.db).or_insert_with(|| Group {
            scalars: Vec::new(),
            slot_tags: Vec::new(),
            stride: None,
        });

        match record.repeat {
            None => {
                let field = ReelField::from_name(&record.field)?;
                group.scalars.push(ScalarTag {
                    field,
                    function: record.function.clone(),
                    byte: record.byte,
                    bit: record.bit,
                });
            },
            Some(stride) => {
                if stride == 0 {
                    return Err(PlcPollError::config(format!(
                        "tag '{}' has zero repeat stride",
                        record.field
                    )));
                }
                match group.stride {
                    None => group.stride = Some(stride),
                    Some(existing) if existing != stride => {
                        return Err(PlcPollError::config(format!(
                            "register block DB{} mixes repeat strides {existing} and {stride}",
                            record.db
                        )));
                    },
                    Some(_) => {},
                }
                let field = RollSlotField::from_name(&record.field)?;
                group.slot_tags.push(SlotTag {
                    field,
                    function: record.function.clone(),
                    byte: record.byte,
                    bit: record.bit,
                });
            },
        }
    }

    let mut layouts = Vec::with_capacity(groups.len());
    for (db, group) in groups {
        let slots = match group.stride {
            None => None,
            Some(stride) => {
                let mut tags = group.slot_tags;
                let presence_idx = tags
                    .iter()
                    .position(|t| t.field == RollSlotField::RollId)
                    .ok_or_else(|| {
                        PlcPollError::config(format!(
                            "register block DB{db} declares slot tags without a roll_id presence tag"
                        ))
                    })?;
                let presence = tags.remove(presence_idx);
                Some(SlotGroup {
                    presence,
                    tags,
                    stride,
                    count: MAX_ROLL_SLOTS,
                })
            },
        };

        let mut max_start = 0usize;
        for tag in &group.scalars {
            max_start = max_start.max(tag.byte);
        }
        if let Some(group) = &slots {
            // The last slot element is the furthest read in the block
            let last_base = (group.count - 1) * group.stride;
            max_start = max_start.max(group.presence.byte + last_base);
            for tag in &group.tags {
                max_start = max_start.max(tag.byte + last_base);
            }
        }

        layouts.push(BlockLayout {
            db,
            scalars: group.scalars,
            slots,
            buffer_len: max_start + MAX_DECODE_WIDTH,
        });
    }

    Ok(layouts)
}
