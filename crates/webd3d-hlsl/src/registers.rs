//! Post-parse register resolution.
//!
//! Resources with an explicit `register(...)` keep it. Every other resource receives the lowest
//! index not yet claimed for its register kind, visiting resources in declaration order, so the
//! backend binding slots are deterministic.

use std::collections::BTreeMap;

use crate::ast::{ConstantBuffer, SamplerDecl, TextureDecl, UNASSIGNED_REGISTER};
use crate::error::HlslError;
use crate::limits::{MAX_CONSTANT_BUFFER_SLOTS, MAX_SAMPLER_SLOTS, MAX_SHADER_RESOURCE_SLOTS};

pub(crate) trait RegisterSlot {
    fn name(&self) -> &str;
    fn line(&self) -> u32;
    fn register(&self) -> i32;
    fn set_register(&mut self, register: i32);
}

macro_rules! impl_register_slot {
    ($ty:ty) => {
        impl RegisterSlot for $ty {
            fn name(&self) -> &str {
                &self.name
            }
            fn line(&self) -> u32 {
                self.line
            }
            fn register(&self) -> i32 {
                self.register
            }
            fn set_register(&mut self, register: i32) {
                self.register = register;
            }
        }
    };
}

impl_register_slot!(ConstantBuffer);
impl_register_slot!(TextureDecl);
impl_register_slot!(SamplerDecl);

pub fn resolve_registers(
    constant_buffers: &mut [ConstantBuffer],
    textures: &mut [TextureDecl],
    samplers: &mut [SamplerDecl],
) -> Result<(), HlslError> {
    resolve_kind('b', MAX_CONSTANT_BUFFER_SLOTS, constant_buffers)?;
    resolve_kind('t', MAX_SHADER_RESOURCE_SLOTS, textures)?;
    resolve_kind('s', MAX_SAMPLER_SLOTS, samplers)?;
    Ok(())
}

fn resolve_kind<T: RegisterSlot>(kind: char, max: u32, slots: &mut [T]) -> Result<(), HlslError> {
    let mut claimed: BTreeMap<u32, String> = BTreeMap::new();

    for slot in slots.iter().filter(|s| s.register() != UNASSIGNED_REGISTER) {
        let index = slot.register() as u32;
        if index >= max {
            return Err(HlslError::RegisterOutOfRange {
                line: slot.line(),
                kind,
                index,
                max,
            });
        }
        if let Some(other) = claimed.get(&index) {
            return Err(HlslError::RegisterConflict {
                line: slot.line(),
                kind,
                index,
                other: other.clone(),
            });
        }
        claimed.insert(index, slot.name().to_string());
    }

    let mut next = 0u32;
    for slot in slots
        .iter_mut()
        .filter(|s| s.register() == UNASSIGNED_REGISTER)
    {
        while claimed.contains_key(&next) {
            next += 1;
        }
        if next >= max {
            return Err(HlslError::RegisterOutOfRange {
                line: slot.line(),
                kind,
                index: next,
                max,
            });
        }
        slot.set_register(next as i32);
        claimed.insert(next, slot.name().to_string());
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cbuffer(name: &str, register: i32) -> ConstantBuffer {
        ConstantBuffer {
            name: name.to_string(),
            register,
            variables: Vec::new(),
            line: 1,
        }
    }

    #[test]
    fn implicit_registers_fill_lowest_free_slots_in_order() {
        let mut cbs = vec![
            cbuffer("A", 1),
            cbuffer("B", UNASSIGNED_REGISTER),
            cbuffer("C", UNASSIGNED_REGISTER),
        ];
        resolve_kind('b', MAX_CONSTANT_BUFFER_SLOTS, &mut cbs).unwrap();
        let regs: Vec<i32> = cbs.iter().map(|c| c.register).collect();
        assert_eq!(regs, [1, 0, 2]);
    }

    #[test]
    fn explicit_registers_claimed_later_in_source_are_still_respected() {
        let mut cbs = vec![cbuffer("A", UNASSIGNED_REGISTER), cbuffer("B", 0)];
        resolve_kind('b', MAX_CONSTANT_BUFFER_SLOTS, &mut cbs).unwrap();
        assert_eq!(cbs[0].register, 1);
        assert_eq!(cbs[1].register, 0);
    }

    #[test]
    fn duplicate_explicit_registers_conflict() {
        let mut cbs = vec![cbuffer("A", 3), cbuffer("B", 3)];
        let err = resolve_kind('b', MAX_CONSTANT_BUFFER_SLOTS, &mut cbs).unwrap_err();
        assert!(matches!(
            err,
            HlslError::RegisterConflict { index: 3, ref other, .. } if other == "A"
        ));
    }

    #[test]
    fn running_out_of_slots_is_an_error_not_a_wrap() {
        let mut cbs: Vec<_> = (0..=MAX_CONSTANT_BUFFER_SLOTS)
            .map(|i| cbuffer(&format!("cb{i}"), UNASSIGNED_REGISTER))
            .collect();
        let err = resolve_kind('b', MAX_CONSTANT_BUFFER_SLOTS, &mut cbs).unwrap_err();
        assert!(matches!(
            err,
            HlslError::RegisterOutOfRange { kind: 'b', index: 14, max: 14, .. }
        ));
    }
}
