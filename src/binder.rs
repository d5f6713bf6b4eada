//! Model binding
//!
//! Decodes one raw block buffer into the live reel model: scalar tags
//! through the conversion catalog, then the repeated roll slot list. A
//! failing tag is logged and skipped; the remaining tags of the cycle still
//! bind.

use std::sync::Arc;

use tracing::warn;

use crate::convert::{ConversionCatalog, TagValue};
use crate::error::{PlcPollError, Result};
use crate::layout::{BlockLayout, SlotGroup, SlotTag};
use crate::model::{ReelState, RollSlot};

/// Per-cycle binding counters
#[derive(Debug, Default, Clone, Copy)]
pub struct BindReport {
    pub bound: usize,
    pub failed: usize,
}

impl BindReport {
    pub fn merge(&mut self, other: BindReport) {
        self.bound += other.bound;
        self.failed += other.failed;
    }
}

/// Binds decoded buffers into the reel model
pub struct ModelBinder {
    catalog: Arc<ConversionCatalog>,
}

impl ModelBinder {
    pub fn new(catalog: Arc<ConversionCatalog>) -> Self {
        Self { catalog }
    }

    /// Decode every tag of `layout` out of `buf` into `state`.
    ///
    /// Scalar fields without a tag in this layout keep their previous value.
    pub fn bind_block(&self, state: &mut ReelState, layout: &BlockLayout, buf: &[u8]) -> BindReport {
        let mut report = BindReport::default();

        for tag in &layout.scalars {
            let outcome = self
                .decode(&tag.function, buf, tag.byte, tag.bit)
                .and_then(|value| state.apply(tag.field, value));
            match outcome {
                Ok(()) => report.bound += 1,
                Err(e) => {
                    warn!(db = layout.db, field = tag.field.name(), "tag skipped: {e}");
                    report.failed += 1;
                },
            }
        }

        if let Some(group) = &layout.slots {
            let slot_report = self.extract_slots(state, layout.db, group, buf);
            report.merge(slot_report);
        }

        report
    }

    fn decode(
        &self,
        function: &str,
        buf: &[u8],
        byte: usize,
        bit: Option<u8>,
    ) -> Result<TagValue> {
        let func = self
            .catalog
            .get(function)
            .ok_or_else(|| PlcPollError::tag(format!("unknown decode function '{function}'")))?;
        func(buf, byte, bit)
    }

    fn decode_slot_tag(&self, tag: &SlotTag, base: usize, buf: &[u8]) -> Result<TagValue> {
        self.decode(&tag.function, buf, tag.byte + base, tag.bit)
    }

    /// Rebuild the roll slot list from the repeated records in `buf`.
    ///
    /// The presence field decodes first for each element; a zero value stops
    /// extraction of the whole list, leaving later elements unread.
    fn extract_slots(
        &self,
        state: &mut ReelState,
        db: u16,
        group: &SlotGroup,
        buf: &[u8],
    ) -> BindReport {
        let mut report = BindReport::default();
        let mut slots = Vec::with_capacity(group.count);

        for index in 0..group.count {
            let base = index * group.stride;

            let roll_id = match self
                .decode_slot_tag(&group.presence, base, buf)
                .and_then(|value| value.as_u32())
            {
                Ok(id) => id,
                Err(e) => {
                    warn!(db, index, "slot presence tag failed, list truncated: {e}");
                    report.failed += 1;
                    break;
                },
            };
            if roll_id == 0 {
                break;
            }
            report.bound += 1;

            let mut slot = RollSlot {
                roll_id,
                ..RollSlot::default()
            };
            for tag in &group.tags {
                let outcome = self
                    .decode_slot_tag(tag, base, buf)
                    .and_then(|value| slot.apply(tag.field, value));
                match outcome {
                    Ok(()) => report.bound += 1,
                    Err(e) => {
                        warn!(db, index, field = tag.field.name(), "slot tag skipped: {e}");
                        report.failed += 1;
                    },
                }
            }
            slots.push(slot);
        }

        state.slots = slots;
        report
    }
}
