//! Pending per-stage resource bindings.

use crate::format::Format;
use crate::resource::Buffer;
use crate::state::SamplerState;
use crate::view::ShaderResourceView;

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct VertexBufferBinding {
    pub(crate) buffer: Buffer,
    pub(crate) stride: u32,
    pub(crate) offset: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct IndexBufferBinding {
    pub(crate) buffer: Buffer,
    pub(crate) format: Format,
    pub(crate) offset: u32,
}

/// Writes `value` into `slot`, growing the table as needed. Returns whether anything changed.
pub(crate) fn set_slot<T: PartialEq + Clone>(slots: &mut Vec<Option<T>>, slot: u32, value: Option<T>) -> bool {
    let slot = slot as usize;
    if slots.len() <= slot {
        if value.is_none() {
            return false;
        }
        slots.resize(slot + 1, None);
    }
    if slots[slot] != value {
        slots[slot] = value;
        true
    } else {
        false
    }
}

fn get_slot<T>(slots: &[Option<T>], slot: u32) -> Option<&T> {
    slots.get(slot as usize).and_then(Option::as_ref)
}

/// `b#`, `t#` and `s#` slots of one shader stage.
#[derive(Debug, Default, Clone)]
pub(crate) struct StageBindings {
    constant_buffers: Vec<Option<Buffer>>,
    shader_resources: Vec<Option<ShaderResourceView>>,
    samplers: Vec<Option<SamplerState>>,
}

impl StageBindings {
    pub(crate) fn constant_buffer(&self, slot: u32) -> Option<&Buffer> {
        get_slot(&self.constant_buffers, slot)
    }

    pub(crate) fn shader_resource(&self, slot: u32) -> Option<&ShaderResourceView> {
        get_slot(&self.shader_resources, slot)
    }

    pub(crate) fn sampler(&self, slot: u32) -> Option<&SamplerState> {
        get_slot(&self.samplers, slot)
    }

    pub(crate) fn set_constant_buffer(&mut self, slot: u32, value: Option<Buffer>) -> bool {
        set_slot(&mut self.constant_buffers, slot, value)
    }

    pub(crate) fn set_shader_resource(&mut self, slot: u32, value: Option<ShaderResourceView>) -> bool {
        set_slot(&mut self.shader_resources, slot, value)
    }

    pub(crate) fn set_sampler(&mut self, slot: u32, value: Option<SamplerState>) -> bool {
        set_slot(&mut self.samplers, slot, value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unchanged_writes_report_no_change() {
        let mut slots: Vec<Option<u32>> = Vec::new();
        assert!(!set_slot(&mut slots, 3, None));
        assert!(slots.is_empty());
        assert!(set_slot(&mut slots, 3, Some(7)));
        assert_eq!(slots.len(), 4);
        assert!(!set_slot(&mut slots, 3, Some(7)));
        assert!(set_slot(&mut slots, 3, None));
    }
}
