//! The resource factory.
//!
//! [`Device`] owns the backend and hands out resources, views, shaders and state objects.
//! Creation methods live next to the types they create (`resource`, `view`, `shader`,
//! `state`); this module holds the shared device core and [`create_device`].

use std::cell::{Cell, RefCell, RefMut};
use std::rc::Rc;

use tracing::{debug, warn};

use crate::backend::{BackendLimits, GlBackend};
use crate::config::DeviceConfig;
use crate::context::{DeviceContext, DirtyFlags};
use crate::error::Result;
use crate::format::{Format, FormatInfo};
use crate::gl;
use crate::object::{impl_unknown, RefCount, Unknown};
use crate::shader::ShaderId;

pub(crate) struct DeviceShared {
    pub(crate) refs: RefCount,
    gl: RefCell<Box<dyn GlBackend>>,
    limits: BackendLimits,
    config: DeviceConfig,
    /// Backend state the context must re-resolve because a device call changed it.
    perturbed: Cell<DirtyFlags>,
    /// Shaders released since the context last looked; their programs must go.
    retired_shaders: RefCell<Vec<ShaderId>>,
    next_shader_id: Cell<u64>,
}

#[derive(Clone)]
pub struct Device(pub(crate) Rc<DeviceShared>);

impl_unknown!(Device, "Device");

/// Creates a device and its immediate context on `backend`.
pub fn create_device(
    backend: impl GlBackend + 'static,
    config: DeviceConfig,
) -> Result<(Device, DeviceContext)> {
    let config = config.with_env_overrides();
    let limits = config.effective_limits(backend.limits());
    let mut backend: Box<dyn GlBackend> = Box::new(backend);
    // Uploads are repacked to tight rows.
    backend.pixel_store_i32(gl::UNPACK_ALIGNMENT, 1);

    let device = Device(Rc::new(DeviceShared {
        refs: RefCount::new(),
        gl: RefCell::new(backend),
        limits,
        config,
        perturbed: Cell::new(DirtyFlags::empty()),
        retired_shaders: RefCell::new(Vec::new()),
        next_shader_id: Cell::new(1),
    }));
    let context = DeviceContext::new(device.clone())?;
    debug!(?limits, log_shader_source = config.log_shader_source, "created device");
    Ok((device, context))
}

impl Device {
    pub fn limits(&self) -> BackendLimits {
        self.0.limits
    }

    pub fn config(&self) -> DeviceConfig {
        self.0.config
    }

    /// Backend formats and capabilities for `format`, or `None` when the format is outside the
    /// supported subset.
    pub fn format_info(&self, format: Format) -> Option<FormatInfo> {
        format.info()
    }

    pub(crate) fn gl(&self) -> RefMut<'_, Box<dyn GlBackend>> {
        self.0.gl.borrow_mut()
    }

    pub(crate) fn ensure_alive(&self) -> Result<()> {
        self.0.refs.ensure_alive("Device")
    }

    /// Reference taken by every device child at construction.
    pub(crate) fn add_child_ref(&self) -> Result<()> {
        self.0.refs.add_ref("Device").map(|_| ())
    }

    pub(crate) fn release_child_ref(&self) {
        if let Err(err) = self.release() {
            warn!(%err, "device child released a device it no longer referenced");
        }
    }

    pub(crate) fn perturb(&self, flags: DirtyFlags) {
        self.0.perturbed.set(self.0.perturbed.get() | flags);
    }

    pub(crate) fn take_perturbed(&self) -> DirtyFlags {
        self.0.perturbed.replace(DirtyFlags::empty())
    }

    pub(crate) fn next_shader_id(&self) -> ShaderId {
        let id = self.0.next_shader_id.get();
        self.0.next_shader_id.set(id + 1);
        ShaderId(id)
    }

    pub(crate) fn retire_shader(&self, id: ShaderId) {
        self.0.retired_shaders.borrow_mut().push(id);
    }

    pub(crate) fn take_retired_shaders(&self) -> Vec<ShaderId> {
        std::mem::take(&mut *self.0.retired_shaders.borrow_mut())
    }

    fn destroy(&self) {
        debug!("device destroyed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{GlCall, TraceBackend};

    #[test]
    fn device_creation_sets_tight_unpack_alignment() {
        let (backend, log) = TraceBackend::new();
        let (device, _context) = create_device(backend, DeviceConfig::default()).unwrap();
        assert!(log.calls().contains(&GlCall::PixelStore {
            pname: gl::UNPACK_ALIGNMENT,
            value: 1,
        }));
        assert_eq!(device.ref_count(), 1);
    }

    #[test]
    fn configured_limits_clamp_reported_ones() {
        let (backend, _log) = TraceBackend::new();
        let config = DeviceConfig {
            limits: Some(BackendLimits::WEBGL2_MINIMUM),
            ..DeviceConfig::default()
        };
        let (device, _context) = create_device(backend, config).unwrap();
        assert_eq!(device.limits(), BackendLimits::WEBGL2_MINIMUM);
    }

    #[test]
    fn released_device_refuses_new_objects() {
        let (backend, _log) = TraceBackend::new();
        let (device, _context) = create_device(backend, DeviceConfig::default()).unwrap();
        assert_eq!(device.release().unwrap(), 0);
        assert!(device.ensure_alive().is_err());
        assert!(device.release().is_err());
    }
}
